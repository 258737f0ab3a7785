use opentelemetry::trace::SpanRef;
use tracing::warn;

use crate::models::chat::{ChatCompletion, ChatCompletionRequest};
use crate::models::completion::{CompletionRequest, CompletionResponse};
use crate::models::embeddings::{EmbeddingsInput, EmbeddingsRequest, EmbeddingsResponse};
use crate::models::usage::{EmbeddingUsage, Usage};
use crate::pipelines::otel::{
    RecordSpan, set_completion, set_count_attribute, set_prompt, set_span_attribute,
};
use crate::semconv::{
    LLM_FREQUENCY_PENALTY, LLM_HEADERS, LLM_PRESENCE_PENALTY, LLM_REQUEST_MAX_TOKENS,
    LLM_REQUEST_MODEL, LLM_RESPONSE_MODEL, LLM_TEMPERATURE, LLM_TOP_P,
    LLM_USAGE_COMPLETION_TOKENS, LLM_USAGE_PROMPT_TOKENS, LLM_USAGE_TOTAL_TOKENS, LLM_USER,
    completion_attribute, function_attribute,
};

struct SamplingParams<'a> {
    model: &'a str,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    frequency_penalty: Option<f32>,
    presence_penalty: Option<f32>,
    user: Option<&'a str>,
}

impl SamplingParams<'_> {
    fn record(&self, span: &SpanRef<'_>) {
        set_span_attribute(span, LLM_REQUEST_MODEL, Some(self.model.to_string()));
        set_count_attribute(span, LLM_REQUEST_MAX_TOKENS, self.max_tokens);
        set_span_attribute(span, LLM_TEMPERATURE, self.temperature.map(f64::from));
        set_span_attribute(span, LLM_TOP_P, self.top_p.map(f64::from));
        set_span_attribute(span, LLM_FREQUENCY_PENALTY, self.frequency_penalty.map(f64::from));
        set_span_attribute(span, LLM_PRESENCE_PENALTY, self.presence_penalty.map(f64::from));
        set_span_attribute(span, LLM_USER, self.user.map(str::to_string));
    }
}

impl RecordSpan for ChatCompletionRequest {
    fn record_span(&self, span: &SpanRef<'_>, trace_content: bool) {
        SamplingParams {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            frequency_penalty: self.frequency_penalty,
            presence_penalty: self.presence_penalty,
            user: self.user.as_deref(),
        }
        .record(span);
        if let Some(headers) = &self.headers {
            set_span_attribute(span, LLM_HEADERS, Some(format!("{headers:?}")));
        }

        if !trace_content {
            return;
        }
        for (i, message) in self.messages.iter().enumerate() {
            set_prompt(span, i, &message.role, message.text().as_deref());
        }
        for (i, tool) in self.tools.iter().flatten().enumerate() {
            let function = &tool.function;
            set_span_attribute(span, function_attribute(i, "name"), Some(function.name.clone()));
            set_span_attribute(
                span,
                function_attribute(i, "description"),
                function.description.clone(),
            );
            match serde_json::to_string(&function.parameters) {
                Ok(parameters) => {
                    set_span_attribute(span, function_attribute(i, "parameters"), Some(parameters))
                }
                Err(err) => warn!(error = %err, function = %function.name, "Failed to serialize function parameters"),
            }
        }
    }
}

impl RecordSpan for ChatCompletion {
    fn record_span(&self, span: &SpanRef<'_>, trace_content: bool) {
        set_span_attribute(span, LLM_RESPONSE_MODEL, Some(self.model.clone()));
        if let Some(usage) = &self.usage {
            usage.record_span(span, trace_content);
        }

        if !trace_content {
            return;
        }
        for choice in &self.choices {
            let index = choice.index as usize;
            set_completion(
                span,
                index,
                Some(&choice.message.role),
                choice.message.text().as_deref(),
                choice.finish_reason.as_deref(),
            );
            if let Some(call) = choice.message.tool_calls.iter().flatten().next() {
                set_span_attribute(
                    span,
                    completion_attribute(index, "function_call.name"),
                    Some(call.function.name.clone()),
                );
                set_span_attribute(
                    span,
                    completion_attribute(index, "function_call.arguments"),
                    Some(call.function.arguments.clone()),
                );
            }
        }
    }
}

impl RecordSpan for CompletionRequest {
    fn record_span(&self, span: &SpanRef<'_>, trace_content: bool) {
        SamplingParams {
            model: &self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            frequency_penalty: self.frequency_penalty,
            presence_penalty: self.presence_penalty,
            user: self.user.as_deref(),
        }
        .record(span);
        if trace_content {
            set_prompt(span, 0, "user", self.prompt.primary());
        }
    }
}

impl RecordSpan for CompletionResponse {
    fn record_span(&self, span: &SpanRef<'_>, trace_content: bool) {
        set_span_attribute(span, LLM_RESPONSE_MODEL, Some(self.model.clone()));
        if let Some(usage) = &self.usage {
            usage.record_span(span, trace_content);
        }
        if trace_content {
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
}

impl RecordSpan for EmbeddingsRequest {
    fn record_span(&self, span: &SpanRef<'_>, trace_content: bool) {
        set_span_attribute(span, LLM_REQUEST_MODEL, Some(self.model.clone()));
        set_span_attribute(span, LLM_USER, self.user.clone());

        if !trace_content {
            return;
        }
        match &self.input {
            EmbeddingsInput::Single(text) => set_prompt(span, 0, "user", Some(text)),
            EmbeddingsInput::Multiple(texts) => {
                for (i, text) in texts.iter().enumerate() {
                    set_prompt(span, i, "user", Some(text));
                }
            }
            EmbeddingsInput::SingleTokenIds(token_ids) => {
                set_prompt(span, 0, "user", Some(&format!("{token_ids:?}")));
            }
            EmbeddingsInput::MultipleTokenIds(token_ids) => {
                for (i, ids) in token_ids.iter().enumerate() {
                    set_prompt(span, i, "user", Some(&format!("{ids:?}")));
                }
            }
        }
    }
}

impl RecordSpan for EmbeddingsResponse {
    fn record_span(&self, span: &SpanRef<'_>, trace_content: bool) {
        set_span_attribute(span, LLM_RESPONSE_MODEL, Some(self.model.clone()));
        self.usage.record_span(span, trace_content);
    }
}

impl RecordSpan for Usage {
    fn record_span(&self, span: &SpanRef<'_>, _trace_content: bool) {
        set_count_attribute(span, LLM_USAGE_PROMPT_TOKENS, Some(self.prompt_tokens));
        set_count_attribute(span, LLM_USAGE_COMPLETION_TOKENS, Some(self.completion_tokens));
        set_count_attribute(span, LLM_USAGE_TOTAL_TOKENS, Some(self.total_tokens));
    }
}

impl RecordSpan for EmbeddingUsage {
    fn record_span(&self, span: &SpanRef<'_>, _trace_content: bool) {
        set_count_attribute(span, LLM_USAGE_PROMPT_TOKENS, self.prompt_tokens);
        set_count_attribute(span, LLM_USAGE_TOTAL_TOKENS, self.total_tokens);
    }
}
