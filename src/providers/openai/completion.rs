use std::sync::Arc;

use chrono::Utc;
use opentelemetry::trace::SpanRef;
use uuid::Uuid;

use super::chat::CONTENT_FILTER_FINISH_REASON;
use crate::config::TraceSettings;
use crate::guardrails::types::{EvaluationResult, GuardPhase};
use crate::models::completion::{CompletionChoice, CompletionRequest, CompletionResponse};
use crate::models::usage::Usage;
use crate::pipelines::otel::{RecordSpan, set_completion, set_span_attribute};
use crate::pipelines::{Interaction, StreamAccumulator};
use crate::semconv::{LLM_RESPONSE_MODEL, LlmRequestType};

pub const COMPLETION_SPAN_NAME: &str = "openai.completion";

pub struct CompletionInteraction {
    request: CompletionRequest,
    settings: Arc<TraceSettings>,
}

impl CompletionInteraction {
    pub fn new(request: CompletionRequest, settings: Arc<TraceSettings>) -> Self {
        Self { request, settings }
    }
}

impl Interaction for CompletionInteraction {
    type Response = CompletionResponse;
    type Chunk = CompletionResponse;
    type Accumulator = CompletionStreamAccumulator;

    fn vendor(&self) -> &'static str {
        super::VENDOR
    }

    fn request_type(&self) -> LlmRequestType {
        LlmRequestType::Completion
    }

    fn completion_span_name(&self) -> &'static str {
        COMPLETION_SPAN_NAME
    }

    fn prompt(&self) -> Option<String> {
        self.request.prompt.primary().map(str::to_string)
    }

    fn record_request(&self, span: &SpanRef<'_>) {
        self.request.record_span(span, self.settings.trace_content);
    }

    fn record_response(&self, span: &SpanRef<'_>, response: &CompletionResponse) {
        response.record_span(span, self.settings.trace_content);
    }

    fn response_text(&self, response: &CompletionResponse) -> Option<String> {
        response.first_text()
    }

    fn blocked_response(
        &self,
        evaluation: &EvaluationResult,
        phase: GuardPhase,
        _replaced: Option<&CompletionResponse>,
    ) -> CompletionResponse {
        let message = self
            .settings
            .blocked_message(phase, evaluation.block_message());
        CompletionResponse {
            id: format!("cmpl-{}", Uuid::new_v4().simple()),
            object: "text_completion".to_string(),
            created: u64::try_from(Utc::now().timestamp()).unwrap_or_default(),
            model: self.request.model.clone(),
            choices: vec![CompletionChoice {
                text: message,
                index: 0,
                logprobs: None,
                finish_reason: Some(CONTENT_FILTER_FINISH_REASON.to_string()),
            }],
            usage: None,
        }
    }

    fn accumulator(&self) -> CompletionStreamAccumulator {
        CompletionStreamAccumulator::new(self.settings.trace_content)
    }
}

/// Streamed legacy completions: text is concatenated per choice index.
#[derive(Debug, Default)]
pub struct CompletionStreamAccumulator {
    model: Option<String>,
    usage: Option<Usage>,
    choices: Vec<CompletionChoice>,
    trace_content: bool,
}

impl CompletionStreamAccumulator {
    pub fn new(trace_content: bool) -> Self {
        Self {
            trace_content,
            ..Self::default()
        }
    }

    pub fn choices(&self) -> &[CompletionChoice] {
        &self.choices
    }
}

impl StreamAccumulator for CompletionStreamAccumulator {
    type Chunk = CompletionResponse;

    fn accumulate(&mut self, chunk: &CompletionResponse) {
        if self.model.is_none() && !chunk.model.is_empty() {
            self.model = Some(chunk.model.clone());
        }
        if chunk.usage.is_some() {
            self.usage = chunk.usage.clone();
        }
        for fragment in &chunk.choices {
            let existing = self.choices.iter_mut().find(|c| c.index == fragment.index);
            match existing {
                Some(choice) => {
                    choice.text.push_str(&fragment.text);
                    if fragment.finish_reason.is_some() {
                        choice.finish_reason = fragment.finish_reason.clone();
                    }
                }
                None => self.choices.push(CompletionChoice {
                    text: fragment.text.clone(),
                    index: fragment.index,
                    logprobs: None,
                    finish_reason: fragment.finish_reason.clone(),
                }),
            }
        }
    }

    fn record(&self, span: &SpanRef<'_>) {
        set_span_attribute(span, LLM_RESPONSE_MODEL, self.model.clone());
        if let Some(usage) = &self.usage {
            usage.record_span(span, self.trace_content);
        }
        if self.trace_content {
            for choice in &self.choices {
                set_completion(
                    span,
                    choice.index as usize,
                    None,
                    Some(&choice.text),
                    choice.finish_reason.as_deref(),
                );
            }
        }
    }

    fn text(&self) -> Option<String> {
        self.choices
            .iter()
            .find(|choice| choice.index == 0)
            .map(|choice| choice.text.clone())
            .filter(|text| !text.is_empty())
    }
}
