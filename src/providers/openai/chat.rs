use std::sync::Arc;

use chrono::Utc;
use opentelemetry::trace::SpanRef;
use uuid::Uuid;

use crate::config::TraceSettings;
use crate::guardrails::types::{EvaluationResult, GuardPhase};
use crate::models::chat::{
    ChatCompletion, ChatCompletionChoice, ChatCompletionMessage, ChatCompletionRequest,
};
use crate::models::streaming::ChatCompletionChunk;
use crate::models::usage::Usage;
use crate::pipelines::otel::{RecordSpan, set_completion, set_span_attribute};
use crate::pipelines::{Interaction, StreamAccumulator};
use crate::semconv::{LLM_RESPONSE_MODEL, LlmRequestType};

pub const CHAT_SPAN_NAME: &str = "openai.chat";
pub const CONTENT_FILTER_FINISH_REASON: &str = "content_filter";

pub struct ChatInteraction {
    request: ChatCompletionRequest,
    settings: Arc<TraceSettings>,
}

impl ChatInteraction {
    pub fn new(request: ChatCompletionRequest, settings: Arc<TraceSettings>) -> Self {
        Self { request, settings }
    }
}

impl Interaction for ChatInteraction {
    type Response = ChatCompletion;
    type Chunk = ChatCompletionChunk;
    type Accumulator = ChatStreamAccumulator;

    fn vendor(&self) -> &'static str {
        super::VENDOR
    }

    fn request_type(&self) -> LlmRequestType {
        LlmRequestType::Chat
    }

    fn completion_span_name(&self) -> &'static str {
        CHAT_SPAN_NAME
    }

    fn prompt(&self) -> Option<String> {
        self.request.last_user_message()
    }

    fn record_request(&self, span: &SpanRef<'_>) {
        self.request.record_span(span, self.settings.trace_content);
    }

    fn record_response(&self, span: &SpanRef<'_>, response: &ChatCompletion) {
        response.record_span(span, self.settings.trace_content);
    }

    fn response_text(&self, response: &ChatCompletion) -> Option<String> {
        response.first_content()
    }

    fn blocked_response(
        &self,
        evaluation: &EvaluationResult,
        phase: GuardPhase,
        _replaced: Option<&ChatCompletion>,
    ) -> ChatCompletion {
        let message = self
            .settings
            .blocked_message(phase, evaluation.block_message());
        blocked_chat_completion(&self.request.model, message)
    }

    fn accumulator(&self) -> ChatStreamAccumulator {
        ChatStreamAccumulator::new(self.settings.trace_content)
    }
}

/// A completion whose single assistant message is `message`.
pub fn blocked_chat_completion(model: &str, message: String) -> ChatCompletion {
    ChatCompletion {
        id: format!("chatcmpl-{}", Uuid::new_v4().simple()),
        object: Some("chat.completion".to_string()),
        created: u64::try_from(Utc::now().timestamp()).ok(),
        model: model.to_string(),
        choices: vec![ChatCompletionChoice {
            index: 0,
            message: ChatCompletionMessage::new("assistant", message),
            finish_reason: Some(CONTENT_FILTER_FINISH_REASON.to_string()),
            logprobs: None,
        }],
        usage: None,
        system_fingerprint: None,
    }
}

/// One choice rebuilt from its deltas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccumulatedChoice {
    pub index: u32,
    pub role: Option<String>,
    pub content: String,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default)]
pub struct ChatStreamAccumulator {
    model: Option<String>,
    usage: Option<Usage>,
    choices: Vec<AccumulatedChoice>,
    trace_content: bool,
}

impl ChatStreamAccumulator {
    pub fn new(trace_content: bool) -> Self {
        Self {
            trace_content,
            ..Self::default()
        }
    }

    pub fn choices(&self) -> &[AccumulatedChoice] {
        &self.choices
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    fn choice_mut(&mut self, index: u32) -> &mut AccumulatedChoice {
        let position = match self.choices.iter().position(|c| c.index == index) {
            Some(position) => position,
            None => {
                self.choices.push(AccumulatedChoice {
                    index,
                    ..AccumulatedChoice::default()
                });
                self.choices.len() - 1
            }
        };
        &mut self.choices[position]
    }
}

fn first_non_empty(slot: &mut Option<String>, value: Option<&String>) {
    if slot.is_none() {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            *slot = Some(value.clone());
        }
    }
}

impl StreamAccumulator for ChatStreamAccumulator {
    type Chunk = ChatCompletionChunk;

    fn accumulate(&mut self, chunk: &ChatCompletionChunk) {
        first_non_empty(&mut self.model, Some(&chunk.model));
        if chunk.usage.is_some() {
            self.usage = chunk.usage.clone();
        }
        for delta in &chunk.choices {
            let choice = self.choice_mut(delta.index);
            first_non_empty(&mut choice.role, delta.delta.role.as_ref());
            first_non_empty(&mut choice.finish_reason, delta.finish_reason.as_ref());
            if let Some(content) = &delta.delta.content {
                choice.content.push_str(content);
            }
        }
    }

    fn record(&self, span: &SpanRef<'_>) {
        set_span_attribute(span, LLM_RESPONSE_MODEL, self.model.clone());
        if let Some(usage) = &self.usage {
            usage.record_span(span, self.trace_content);
        }
        if !self.trace_content {
            return;
        }
        for choice in &self.choices {
            set_completion(
                span,
                choice.index as usize,
                choice.role.as_deref(),
                Some(&choice.content),
                choice.finish_reason.as_deref(),
            );
        }
    }

    fn text(&self) -> Option<String> {
        self.choices
            .iter()
            .find(|choice| choice.index == 0)
            .or_else(|| self.choices.first())
            .map(|choice| choice.content.clone())
            .filter(|content| !content.is_empty())
    }
}
