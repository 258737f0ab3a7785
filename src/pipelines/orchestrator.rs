//! Per-call interaction state machine.
//!
//! ```text
//! START -> PROMPT_EVAL -> BLOCKED_BY_PROMPT
//!                      -> INVOKING -> STREAMING (finalized on exhaustion)
//!                                  -> BLOCKED_BY_RESPONSE | COMPLETED
//! ```
//!
//! Every span opened here is a [`SpanScope`], so each exit path (return,
//! block, error or an abandoned stream) closes it.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use futures::stream::{BoxStream, Stream};
use opentelemetry::global::BoxedTracer;
use opentelemetry::trace::{FutureExt, SpanKind, SpanRef};
use opentelemetry::{Context, KeyValue};
use tracing::{debug, info};

use super::guard::GuardStep;
use super::span_scope::SpanScope;
use super::stream::{StreamAccumulator, StreamFinalizer, TracedIter, traced_stream};
use crate::guardrails::providers::GuardrailClient;
use crate::guardrails::span_attributes::GUARDRAILS_BLOCKED;
use crate::guardrails::types::{EvaluationResult, GuardInput, GuardPhase};
use crate::semconv::{
    INTERACTION_SPAN_NAME, LLM_REQUEST_TYPE, LLM_STREAMING, LLM_VENDOR, LlmRequestType,
    SPAN_TYPE, SPAN_TYPE_COMPLETION, SPAN_TYPE_INTERACTION,
};

/// One vendor call, described to the orchestrator.
pub trait Interaction: Send + Sync {
    type Response: Send + 'static;
    type Chunk: Send + 'static;
    type Accumulator: StreamAccumulator<Chunk = Self::Chunk> + Send + 'static;

    fn vendor(&self) -> &'static str;

    fn request_type(&self) -> LlmRequestType;

    fn completion_span_name(&self) -> &'static str;

    /// Outbound prompt text, if one can be extracted.
    fn prompt(&self) -> Option<String>;

    fn record_request(&self, span: &SpanRef<'_>);

    fn record_response(&self, span: &SpanRef<'_>, response: &Self::Response);

    fn response_text(&self, response: &Self::Response) -> Option<String>;

    /// Vendor-shaped response carrying the block message. `replaced` is the
    /// real response when the block happened after invocation.
    fn blocked_response(
        &self,
        evaluation: &EvaluationResult,
        phase: GuardPhase,
        replaced: Option<&Self::Response>,
    ) -> Self::Response;

    fn accumulator(&self) -> Self::Accumulator;
}

/// What the vendor call produced.
pub enum Invocation<R, S> {
    Complete(R),
    Stream(S),
}

/// What the caller gets back.
pub enum InteractionOutcome<R, S> {
    Completed(R),
    Streaming(S),
    Blocked { response: R, phase: GuardPhase },
}

impl<R, S> InteractionOutcome<R, S> {
    pub fn is_blocked(&self) -> bool {
        matches!(self, InteractionOutcome::Blocked { .. })
    }

    pub fn blocked_phase(&self) -> Option<GuardPhase> {
        match self {
            InteractionOutcome::Blocked { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

pub type ChunkStream<C, SE> = BoxStream<'static, Result<C, SE>>;

#[derive(Clone)]
pub struct Orchestrator {
    tracer: Arc<BoxedTracer>,
    guard: Option<GuardStep>,
}

impl Orchestrator {
    pub fn new(tracer: Arc<BoxedTracer>, guardrails: Option<Arc<dyn GuardrailClient>>) -> Self {
        let guard = guardrails.map(|client| GuardStep::new(tracer.clone(), client));
        Self { tracer, guard }
    }

    pub fn has_guardrails(&self) -> bool {
        self.guard.is_some()
    }

    fn open_interaction<I: Interaction>(&self, interaction: &I) -> SpanScope {
        SpanScope::start(
            &self.tracer,
            INTERACTION_SPAN_NAME,
            SpanKind::Client,
            vec![
                KeyValue::new(LLM_REQUEST_TYPE, interaction.request_type().as_str()),
                KeyValue::new(SPAN_TYPE, SPAN_TYPE_INTERACTION),
                KeyValue::new(LLM_VENDOR, interaction.vendor()),
            ],
            &Context::current(),
        )
    }

    fn open_completion<I: Interaction>(&self, interaction: &I, parent: &Context) -> SpanScope {
        let scope = SpanScope::start(
            &self.tracer,
            interaction.completion_span_name(),
            SpanKind::Client,
            vec![
                KeyValue::new(LLM_REQUEST_TYPE, interaction.request_type().as_str()),
                KeyValue::new(SPAN_TYPE, SPAN_TYPE_COMPLETION),
            ],
            parent,
        );
        interaction.record_request(&scope.span());
        scope
    }

    fn block<I: Interaction, S>(
        scope: SpanScope,
        interaction: &I,
        evaluation: &EvaluationResult,
        replaced: Option<&I::Response>,
    ) -> InteractionOutcome<I::Response, S> {
        let phase = if replaced.is_some() {
            GuardPhase::Response
        } else {
            GuardPhase::Prompt
        };
        info!(
            vendor = interaction.vendor(),
            phase = phase.as_str(),
            message = evaluation.block_message().unwrap_or_default(),
            "Interaction blocked by guardrails"
        );
        scope.set_attribute(KeyValue::new(GUARDRAILS_BLOCKED, phase.as_str()));
        let response = interaction.blocked_response(evaluation, phase, replaced);
        scope.end_ok();
        InteractionOutcome::Blocked { response, phase }
    }

    fn log_missing_prompt<I: Interaction>(interaction: &I) {
        debug!(
            vendor = interaction.vendor(),
            "No prompt extracted, skipping prompt guardrails"
        );
    }

    /// Async interaction. The only suspension points are the guardrail calls
    /// and `invoke`, which runs with the completion span as current context.
    pub async fn run<I, F, Fut, S, SE, E>(
        &self,
        interaction: I,
        invoke: F,
    ) -> Result<InteractionOutcome<I::Response, ChunkStream<I::Chunk, SE>>, E>
    where
        I: Interaction,
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Result<Invocation<I::Response, S>, E>>,
        S: Stream<Item = Result<I::Chunk, SE>> + Send + 'static,
        SE: Send + 'static,
        E: Display,
    {
        let scope = self.open_interaction(&interaction);
        let prompt = interaction.prompt();
        if prompt.is_none() {
            Self::log_missing_prompt(&interaction);
        }

        if let (Some(guard), Some(text)) = (&self.guard, prompt.as_deref()) {
            if let Some(evaluation) = guard.check(GuardInput::Prompt(text), scope.context()).await {
                if evaluation.is_blocked() {
                    return Ok(Self::block(scope, &interaction, &evaluation, None));
                }
            }
        }

        let completion = self.open_completion(&interaction, scope.context());
        let completion_cx = completion.context().clone();
        let invocation = match invoke(completion_cx.clone()).with_context(completion_cx).await {
            Ok(invocation) => invocation,
            Err(err) => {
                let description = err.to_string();
                completion.end_error(description.clone());
                scope.end_error(description);
                return Err(err);
            }
        };

        let response = match invocation {
            Invocation::Stream(stream) => {
                completion.set_attribute(KeyValue::new(LLM_STREAMING, true));
                let finalizer = StreamFinalizer::new(
                    interaction.accumulator(),
                    completion,
                    scope,
                    self.guard.clone(),
                    prompt,
                );
                return Ok(InteractionOutcome::Streaming(traced_stream(stream, finalizer)));
            }
            Invocation::Complete(response) => response,
        };

        interaction.record_response(&completion.span(), &response);
        completion.end_ok();

        if let (Some(guard), Some(text)) = (&self.guard, interaction.response_text(&response)) {
            let input = GuardInput::Response {
                prompt: prompt.as_deref(),
                response: &text,
            };
            if let Some(evaluation) = guard.check(input, scope.context()).await {
                if evaluation.is_blocked() {
                    return Ok(Self::block(scope, &interaction, &evaluation, Some(&response)));
                }
            }
        }

        scope.end_ok();
        Ok(InteractionOutcome::Completed(response))
    }

    /// Blocking interaction with the same state sequence as [`Orchestrator::run`].
    pub fn run_blocking<I, F, It, SE, E>(
        &self,
        interaction: I,
        invoke: F,
    ) -> Result<InteractionOutcome<I::Response, TracedIter<It, I::Accumulator>>, E>
    where
        I: Interaction,
        F: FnOnce(Context) -> Result<Invocation<I::Response, It>, E>,
        It: Iterator<Item = Result<I::Chunk, SE>>,
        E: Display,
    {
        let scope = self.open_interaction(&interaction);
        let prompt = interaction.prompt();
        if prompt.is_none() {
            Self::log_missing_prompt(&interaction);
        }

        if let (Some(guard), Some(text)) = (&self.guard, prompt.as_deref()) {
            if let Some(evaluation) = guard.check_blocking(GuardInput::Prompt(text), scope.context()) {
                if evaluation.is_blocked() {
                    return Ok(Self::block(scope, &interaction, &evaluation, None));
                }
            }
        }

        let completion = self.open_completion(&interaction, scope.context());
        let invoked = {
            let _attached = completion.context().clone().attach();
            invoke(completion.context().clone())
        };
        let invocation = match invoked {
            Ok(invocation) => invocation,
            Err(err) => {
                let description = err.to_string();
                completion.end_error(description.clone());
                scope.end_error(description);
                return Err(err);
            }
        };

        let response = match invocation {
            Invocation::Stream(iter) => {
                completion.set_attribute(KeyValue::new(LLM_STREAMING, true));
                let finalizer = StreamFinalizer::new(
                    interaction.accumulator(),
                    completion,
                    scope,
                    self.guard.clone(),
                    prompt,
                );
                return Ok(InteractionOutcome::Streaming(TracedIter::new(iter, finalizer)));
            }
            Invocation::Complete(response) => response,
        };

        interaction.record_response(&completion.span(), &response);
        completion.end_ok();

        if let (Some(guard), Some(text)) = (&self.guard, interaction.response_text(&response)) {
            let input = GuardInput::Response {
                prompt: prompt.as_deref(),
                response: &text,
            };
            if let Some(evaluation) = guard.check_blocking(input, scope.context()) {
                if evaluation.is_blocked() {
                    return Ok(Self::block(scope, &interaction, &evaluation, Some(&response)));
                }
            }
        }

        scope.end_ok();
        Ok(InteractionOutcome::Completed(response))
    }
}
