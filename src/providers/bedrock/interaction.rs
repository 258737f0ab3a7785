use std::sync::Arc;

use opentelemetry::KeyValue;
use opentelemetry::trace::SpanRef;
use tracing::{debug, warn};
use uuid::Uuid;

use super::blocked::blocked_body;
use super::models::{BedrockRequestBody, BedrockResponseBody, ModelId};
use crate::config::TraceSettings;
use crate::guardrails::types::{EvaluationResult, GuardPhase};
use crate::pipelines::Interaction;
use crate::pipelines::otel::{set_completion, set_count_attribute, set_prompt, set_span_attribute};
use crate::pipelines::stream::Unstreamed;
use crate::semconv::{
    LLM_REQUEST_MAX_TOKENS, LLM_REQUEST_MODEL, LLM_TEMPERATURE, LLM_TOP_P,
    LLM_USAGE_COMPLETION_TOKENS, LLM_USAGE_PROMPT_TOKENS, LLM_USAGE_TOTAL_TOKENS, LLM_VENDOR,
    LlmRequestType,
};

pub const BEDROCK_SPAN_NAME: &str = "bedrock.completion";
const JSON_CONTENT_TYPE: &str = "application/json";

/// Arguments of one `InvokeModel` call.
#[derive(Debug, Clone)]
pub struct BedrockRequest {
    pub model_id: String,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub accept: Option<String>,
}

impl BedrockRequest {
    pub fn new(model_id: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            model_id: model_id.into(),
            body,
            content_type: Some(JSON_CONTENT_TYPE.to_string()),
            accept: Some(JSON_CONTENT_TYPE.to_string()),
        }
    }
}

/// Result of one `InvokeModel` call.
#[derive(Debug, Clone, PartialEq)]
pub struct BedrockResponse {
    pub request_id: Option<String>,
    pub content_type: String,
    pub body: Vec<u8>,
}

pub struct BedrockInteraction {
    model_id: ModelId,
    request: Option<BedrockRequestBody>,
    settings: Arc<TraceSettings>,
}

impl BedrockInteraction {
    pub fn new(request: &BedrockRequest, settings: Arc<TraceSettings>) -> Self {
        let model_id = ModelId::parse(&request.model_id);
        let body = match BedrockRequestBody::parse(&model_id, &request.body) {
            Ok(body) => body,
            Err(err) => {
                warn!(model_id = %request.model_id, error = %err, "Failed to decode Bedrock request body");
                None
            }
        };
        if model_id.vendor.is_none() {
            debug!(model_id = %request.model_id, "Unsupported Bedrock model family");
        }
        Self {
            model_id,
            request: body,
            settings,
        }
    }

    fn decode_response(&self, response: &BedrockResponse) -> Option<BedrockResponseBody> {
        match BedrockResponseBody::parse(&self.model_id, &response.body) {
            Ok(body) => body,
            Err(err) => {
                warn!(model = %self.model_id.model, error = %err, "Failed to decode Bedrock response body");
                None
            }
        }
    }
}

impl Interaction for BedrockInteraction {
    type Response = BedrockResponse;
    type Chunk = BedrockResponse;
    type Accumulator = Unstreamed<BedrockResponse>;

    fn vendor(&self) -> &'static str {
        super::VENDOR
    }

    fn request_type(&self) -> LlmRequestType {
        LlmRequestType::Completion
    }

    fn completion_span_name(&self) -> &'static str {
        BEDROCK_SPAN_NAME
    }

    fn prompt(&self) -> Option<String> {
        self.request.as_ref().and_then(BedrockRequestBody::prompt)
    }

    fn record_request(&self, span: &SpanRef<'_>) {
        set_span_attribute(span, LLM_VENDOR, self.model_id.vendor.map(|v| v.as_str()));
        set_span_attribute(span, LLM_REQUEST_MODEL, Some(self.model_id.model.clone()));

        let Some(request) = &self.request else {
            return;
        };
        let (temperature, top_p, max_tokens) = match request {
            BedrockRequestBody::Claude(r) => {
                set_span_attribute(span, "anthropic_version", r.anthropic_version.clone());
                (r.temperature, r.top_p, r.max_tokens.or(r.max_tokens_to_sample))
            }
            BedrockRequestBody::Titan(r) => match &r.text_generation_config {
                Some(config) => (config.temperature, config.top_p, config.max_token_count),
                None => (None, None, None),
            },
            BedrockRequestBody::Llama(r) => (r.temperature, r.top_p, r.max_gen_len),
            BedrockRequestBody::Cohere(r) => (r.temperature, r.p, r.max_tokens),
            BedrockRequestBody::Jurassic(r) => (r.temperature, r.top_p, r.max_tokens),
        };
        set_span_attribute(span, LLM_TEMPERATURE, temperature);
        set_span_attribute(span, LLM_TOP_P, top_p);
        set_count_attribute(span, LLM_REQUEST_MAX_TOKENS, max_tokens);

        if self.settings.trace_content {
            set_prompt(span, 0, "user", request.prompt().as_deref());
        }
    }

    fn record_response(&self, span: &SpanRef<'_>, response: &BedrockResponse) {
        let Some(body) = self.decode_response(response) else {
            return;
        };
        let (prompt_tokens, completion_tokens, total_tokens) = match &body {
            BedrockResponseBody::Claude(r) => {
                span.set_attribute(KeyValue::new("response.id", r.id.clone()));
                let usage = r.usage;
                (
                    Some(usage.input_tokens),
                    Some(usage.output_tokens),
                    Some(u64::from(usage.input_tokens) + u64::from(usage.output_tokens)),
                )
            }
            // Titan reports the result's token count as the total.
            BedrockResponseBody::Titan(r) => {
                let total = r.results.first().map(|result| result.token_count);
                (
                    Some(r.input_text_token_count),
                    total.map(|t| t.saturating_sub(r.input_text_token_count)),
                    total.map(u64::from),
                )
            }
            BedrockResponseBody::Llama(r) => (
                Some(r.prompt_token_count),
                Some(r.generation_token_count),
                Some(u64::from(r.prompt_token_count) + u64::from(r.generation_token_count)),
            ),
            BedrockResponseBody::Cohere(_) | BedrockResponseBody::Jurassic(_) => (None, None, None),
        };
        set_count_attribute(span, LLM_USAGE_PROMPT_TOKENS, prompt_tokens);
        set_count_attribute(span, LLM_USAGE_COMPLETION_TOKENS, completion_tokens);
        set_count_attribute(span, LLM_USAGE_TOTAL_TOKENS, total_tokens);

        if !self.settings.trace_content {
            return;
        }
        match &body {
            BedrockResponseBody::Cohere(r) => {
                for (i, generation) in r.generations.iter().enumerate() {
                    set_completion(span, i, None, Some(&generation.text), generation.finish_reason.as_deref());
                }
            }
            BedrockResponseBody::Jurassic(r) => {
                for (i, completion) in r.completions.iter().enumerate() {
                    set_completion(span, i, None, Some(&completion.data.text), None);
                }
            }
            _ => set_completion(span, 0, None, body.text().as_deref(), None),
        }
    }

    fn response_text(&self, response: &BedrockResponse) -> Option<String> {
        self.decode_response(response)?.text()
    }

    fn blocked_response(
        &self,
        evaluation: &EvaluationResult,
        phase: GuardPhase,
        replaced: Option<&BedrockResponse>,
    ) -> BedrockResponse {
        let message = self
            .settings
            .blocked_message(phase, evaluation.block_message());
        let request_id = replaced
            .and_then(|response| response.request_id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        BedrockResponse {
            request_id: Some(request_id),
            content_type: JSON_CONTENT_TYPE.to_string(),
            body: blocked_body(&self.model_id, &message),
        }
    }

    fn accumulator(&self) -> Unstreamed<BedrockResponse> {
        Unstreamed::default()
    }
}
