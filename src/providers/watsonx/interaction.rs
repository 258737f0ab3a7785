use std::sync::Arc;

use opentelemetry::KeyValue;
use opentelemetry::trace::SpanRef;

use super::models::{GenerateOutput, GenerateRequest, GenerateResponse};
use crate::config::TraceSettings;
use crate::guardrails::types::{EvaluationResult, GuardPhase};
use crate::pipelines::otel::{set_completion, set_count_attribute, set_prompt, set_span_attribute};
use crate::pipelines::{Interaction, StreamAccumulator};
use crate::semconv::{
    LLM_DECODING_METHOD, LLM_MAX_NEW_TOKENS, LLM_MIN_NEW_TOKENS, LLM_RANDOM_SEED,
    LLM_REPETITION_PENALTY, LLM_REQUEST_MODEL, LLM_REQUEST_TEMPERATURE, LLM_REQUEST_TOP_P,
    LLM_RESPONSE_MODEL, LLM_RESPONSE_STOP_REASON, LLM_TOP_K, LLM_USAGE_COMPLETION_TOKENS,
    LLM_USAGE_PROMPT_TOKENS, LLM_USAGE_TOTAL_TOKENS, LlmRequestType,
};

pub const WATSONX_SPAN_NAME: &str = "watsonx.generate";

pub struct WatsonxInteraction {
    request: GenerateRequest,
    settings: Arc<TraceSettings>,
}

impl WatsonxInteraction {
    pub fn new(request: GenerateRequest, settings: Arc<TraceSettings>) -> Self {
        Self { request, settings }
    }
}

fn record_usage(span: &SpanRef<'_>, prompt_tokens: u64, completion_tokens: u64) {
    let total = prompt_tokens.saturating_add(completion_tokens);
    if total == 0 {
        return;
    }
    set_count_attribute(span, LLM_USAGE_PROMPT_TOKENS, Some(prompt_tokens));
    set_count_attribute(span, LLM_USAGE_COMPLETION_TOKENS, Some(completion_tokens));
    set_count_attribute(span, LLM_USAGE_TOTAL_TOKENS, Some(total));
}

impl Interaction for WatsonxInteraction {
    type Response = GenerateOutput;
    type Chunk = GenerateResponse;
    type Accumulator = WatsonxStreamAccumulator;

    fn vendor(&self) -> &'static str {
        super::VENDOR
    }

    fn request_type(&self) -> LlmRequestType {
        LlmRequestType::Completion
    }

    fn completion_span_name(&self) -> &'static str {
        WATSONX_SPAN_NAME
    }

    fn prompt(&self) -> Option<String> {
        self.request.prompt.guarded().map(str::to_string)
    }

    fn record_request(&self, span: &SpanRef<'_>) {
        span.set_attribute(KeyValue::new("watsonx.api_type", "watsonx.ai"));
        span.set_attribute(KeyValue::new("watsonx.api_version", "1.0"));
        set_span_attribute(span, LLM_REQUEST_MODEL, Some(self.request.model_id.clone()));

        if let Some(params) = &self.request.parameters {
            set_span_attribute(span, LLM_DECODING_METHOD, params.decoding_method.clone());
            set_span_attribute(span, LLM_RANDOM_SEED, params.random_seed);
            set_count_attribute(span, LLM_MAX_NEW_TOKENS, params.max_new_tokens);
            set_count_attribute(span, LLM_MIN_NEW_TOKENS, params.min_new_tokens);
            set_count_attribute(span, LLM_TOP_K, params.top_k);
            set_span_attribute(span, LLM_REPETITION_PENALTY, params.repetition_penalty);
            set_span_attribute(span, LLM_REQUEST_TEMPERATURE, params.temperature);
            set_span_attribute(span, LLM_REQUEST_TOP_P, params.top_p);
        }

        if self.settings.trace_content {
            for (i, prompt) in self.request.prompt.all().into_iter().enumerate() {
                set_prompt(span, i, "user", Some(prompt));
            }
        }
    }

    fn record_response(&self, span: &SpanRef<'_>, response: &GenerateOutput) {
        let responses = response.responses();
        let Some(last) = responses.last() else {
            return;
        };
        set_span_attribute(span, LLM_RESPONSE_MODEL, Some(last.model_id.clone()));
        set_span_attribute(
            span,
            LLM_RESPONSE_STOP_REASON,
            last.first_result().map(|r| r.stop_reason.clone()),
        );

        let (prompt_tokens, completion_tokens) = responses
            .iter()
            .filter_map(GenerateResponse::first_result)
            .fold((0u64, 0u64), |(p, c), r| {
                (
                    p.saturating_add(r.input_token_count.into()),
                    c.saturating_add(r.generated_token_count.into()),
                )
            });
        record_usage(span, prompt_tokens, completion_tokens);

        if self.settings.trace_content {
            for (i, result) in responses.iter().filter_map(GenerateResponse::first_result).enumerate() {
                set_completion(span, i, None, Some(&result.generated_text), Some(&result.stop_reason));
            }
        }
    }

    fn response_text(&self, response: &GenerateOutput) -> Option<String> {
        response
            .responses()
            .last()
            .and_then(GenerateResponse::first_result)
            .map(|result| result.generated_text.clone())
    }

    fn blocked_response(
        &self,
        evaluation: &EvaluationResult,
        phase: GuardPhase,
        _replaced: Option<&GenerateOutput>,
    ) -> GenerateOutput {
        let message = self
            .settings
            .blocked_message(phase, evaluation.block_message());
        GenerateOutput::Single(GenerateResponse::blocked(message))
    }

    fn accumulator(&self) -> WatsonxStreamAccumulator {
        WatsonxStreamAccumulator::new(self.settings.trace_content)
    }
}

/// Rebuilds a streamed generation: text is concatenated, input tokens are
/// summed, the last generated token count and stop reason win.
#[derive(Debug, Default)]
pub struct WatsonxStreamAccumulator {
    model_id: Option<String>,
    generated_text: String,
    input_token_count: u64,
    generated_token_count: u32,
    stop_reason: Option<String>,
    trace_content: bool,
}

impl WatsonxStreamAccumulator {
    pub fn new(trace_content: bool) -> Self {
        Self {
            trace_content,
            ..Self::default()
        }
    }

    pub fn generated_text(&self) -> &str {
        &self.generated_text
    }

    pub fn input_token_count(&self) -> u64 {
        self.input_token_count
    }

    pub fn generated_token_count(&self) -> u32 {
        self.generated_token_count
    }

    pub fn stop_reason(&self) -> Option<&str> {
        self.stop_reason.as_deref()
    }
}

impl StreamAccumulator for WatsonxStreamAccumulator {
    type Chunk = GenerateResponse;

    fn accumulate(&mut self, chunk: &GenerateResponse) {
        self.model_id = Some(chunk.model_id.clone());
        if let Some(result) = chunk.first_result() {
            self.generated_text.push_str(&result.generated_text);
            self.input_token_count = self
                .input_token_count
                .saturating_add(result.input_token_count.into());
            self.generated_token_count = result.generated_token_count;
            self.stop_reason = Some(result.stop_reason.clone());
        }
    }

    fn record(&self, span: &SpanRef<'_>) {
        set_span_attribute(span, LLM_RESPONSE_MODEL, self.model_id.clone());
        set_span_attribute(span, LLM_RESPONSE_STOP_REASON, self.stop_reason.clone());
        record_usage(span, self.input_token_count, self.generated_token_count.into());
        if self.trace_content {
            set_completion(
                span,
                0,
                None,
                Some(&self.generated_text),
                self.stop_reason.as_deref(),
            );
        }
    }

    fn text(&self) -> Option<String> {
        if self.generated_text.is_empty() {
            None
        } else {
            Some(self.generated_text.clone())
        }
    }
}
