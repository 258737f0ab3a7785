//! Pass-through decorators for streamed responses.
//!
//! Chunks reach the caller unchanged and in order. The accumulator sees each
//! successful chunk and is finalized once, when the source is exhausted.
//! Dropping a stream early ends its spans without evaluating guardrails.

use std::marker::PhantomData;

use futures::stream::{BoxStream, Stream, StreamExt};
use opentelemetry::KeyValue;
use opentelemetry::trace::SpanRef;
use tracing::{debug, warn};

use super::guard::GuardStep;
use super::span_scope::SpanScope;
use crate::guardrails::span_attributes::GUARDRAILS_BLOCKED;
use crate::guardrails::types::GuardInput;
use crate::semconv::LLM_STREAM_CANCELLED;

/// Rebuilds one logical response out of streamed chunks.
pub trait StreamAccumulator {
    type Chunk;

    fn accumulate(&mut self, chunk: &Self::Chunk);

    /// Writes the accumulated response onto the completion span.
    fn record(&self, span: &SpanRef<'_>);

    /// Text submitted to response guardrails.
    fn text(&self) -> Option<String>;
}

/// Accumulator for calls that never stream.
pub struct Unstreamed<C>(PhantomData<fn(&C)>);

impl<C> Default for Unstreamed<C> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<C> StreamAccumulator for Unstreamed<C> {
    type Chunk = C;

    fn accumulate(&mut self, _chunk: &C) {}

    fn record(&self, _span: &SpanRef<'_>) {}

    fn text(&self) -> Option<String> {
        None
    }
}

/// Owns the spans of a streaming interaction until the stream ends.
pub struct StreamFinalizer<A> {
    accumulator: A,
    completion: Option<SpanScope>,
    interaction: Option<SpanScope>,
    guard: Option<GuardStep>,
    prompt: Option<String>,
    chunks: usize,
    finalized: bool,
}

impl<A: StreamAccumulator> StreamFinalizer<A> {
    pub fn new(
        accumulator: A,
        completion: SpanScope,
        interaction: SpanScope,
        guard: Option<GuardStep>,
        prompt: Option<String>,
    ) -> Self {
        Self {
            accumulator,
            completion: Some(completion),
            interaction: Some(interaction),
            guard,
            prompt,
            chunks: 0,
            finalized: false,
        }
    }

    pub fn observe(&mut self, chunk: &A::Chunk) {
        self.chunks += 1;
        self.accumulator.accumulate(chunk);
    }

    pub fn accumulator(&self) -> &A {
        &self.accumulator
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Emits the accumulated response and closes the completion span.
    /// Returns the interaction scope and response text on the first call only.
    fn close_completion(&mut self) -> Option<(SpanScope, Option<String>)> {
        if self.finalized {
            return None;
        }
        self.finalized = true;
        debug!(chunks = self.chunks, "Stream exhausted, finalizing response");

        if let Some(completion) = self.completion.take() {
            self.accumulator.record(&completion.span());
            completion.end_ok();
        }
        let interaction = self.interaction.take()?;
        Some((interaction, self.accumulator.text()))
    }

    pub async fn finish(&mut self) {
        let Some((interaction, text)) = self.close_completion() else {
            return;
        };
        if let (Some(guard), Some(text)) = (&self.guard, text) {
            let input = GuardInput::Response {
                prompt: self.prompt.as_deref(),
                response: &text,
            };
            if let Some(evaluation) = guard.check(input, interaction.context()).await {
                if evaluation.is_blocked() {
                    flag_delivered_block(&interaction);
                }
            }
        }
        interaction.end_ok();
    }

    pub fn finish_blocking(&mut self) {
        let Some((interaction, text)) = self.close_completion() else {
            return;
        };
        if let (Some(guard), Some(text)) = (&self.guard, text) {
            let input = GuardInput::Response {
                prompt: self.prompt.as_deref(),
                response: &text,
            };
            if let Some(evaluation) = guard.check_blocking(input, interaction.context()) {
                if evaluation.is_blocked() {
                    flag_delivered_block(&interaction);
                }
            }
        }
        interaction.end_ok();
    }
}

// The chunks are already with the caller, so a streamed block is only recorded.
fn flag_delivered_block(interaction: &SpanScope) {
    warn!("Streamed response was blocked by guardrails after delivery");
    interaction.set_attribute(KeyValue::new(GUARDRAILS_BLOCKED, "response"));
}

impl<A> Drop for StreamFinalizer<A> {
    fn drop(&mut self) {
        if self.finalized {
            return;
        }
        debug!(chunks = self.chunks, "Stream dropped before exhaustion");
        for scope in [&self.completion, &self.interaction].into_iter().flatten() {
            scope.set_attribute(KeyValue::new(LLM_STREAM_CANCELLED, true));
        }
    }
}

/// Wraps an async chunk stream.
pub fn traced_stream<S, SE, A>(stream: S, mut finalizer: StreamFinalizer<A>) -> BoxStream<'static, Result<A::Chunk, SE>>
where
    S: Stream<Item = Result<A::Chunk, SE>> + Send + 'static,
    A: StreamAccumulator + Send + 'static,
    A::Chunk: Send + 'static,
    SE: Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut inner = Box::pin(stream);
        while let Some(item) = inner.next().await {
            if let Ok(chunk) = &item {
                finalizer.observe(chunk);
            }
            yield item;
        }
        finalizer.finish().await;
    })
}

/// Wraps a blocking chunk iterator.
pub struct TracedIter<I, A> {
    inner: I,
    finalizer: StreamFinalizer<A>,
}

impl<I, A: StreamAccumulator> TracedIter<I, A> {
    pub fn new(inner: I, finalizer: StreamFinalizer<A>) -> Self {
        Self { inner, finalizer }
    }

    pub fn finalizer(&self) -> &StreamFinalizer<A> {
        &self.finalizer
    }
}

impl<I, SE, A> Iterator for TracedIter<I, A>
where
    I: Iterator<Item = Result<A::Chunk, SE>>,
    A: StreamAccumulator,
{
    type Item = Result<A::Chunk, SE>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.next() {
            Some(item) => {
                if let Ok(chunk) = &item {
                    self.finalizer.observe(chunk);
                }
                Some(item)
            }
            None => {
                self.finalizer.finish_blocking();
                None
            }
        }
    }
}
