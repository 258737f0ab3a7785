use std::sync::Arc;

use opentelemetry::trace::SpanRef;
use tracing::debug;

use crate::config::TraceSettings;
use crate::guardrails::types::{EvaluationResult, GuardPhase};
use crate::models::embeddings::{EmbeddingsRequest, EmbeddingsResponse};
use crate::models::usage::EmbeddingUsage;
use crate::pipelines::Interaction;
use crate::pipelines::otel::RecordSpan;
use crate::pipelines::stream::Unstreamed;
use crate::semconv::LlmRequestType;

pub const EMBEDDINGS_SPAN_NAME: &str = "openai.embeddings";

/// Embeddings are prompt-guarded only; vectors carry no text to evaluate.
pub struct EmbeddingsInteraction {
    request: EmbeddingsRequest,
    settings: Arc<TraceSettings>,
}

impl EmbeddingsInteraction {
    pub fn new(request: EmbeddingsRequest, settings: Arc<TraceSettings>) -> Self {
        Self { request, settings }
    }
}

impl Interaction for EmbeddingsInteraction {
    type Response = EmbeddingsResponse;
    type Chunk = EmbeddingsResponse;
    type Accumulator = Unstreamed<EmbeddingsResponse>;

    fn vendor(&self) -> &'static str {
        super::VENDOR
    }

    fn request_type(&self) -> LlmRequestType {
        LlmRequestType::Embedding
    }

    fn completion_span_name(&self) -> &'static str {
        EMBEDDINGS_SPAN_NAME
    }

    fn prompt(&self) -> Option<String> {
        self.request.input.text()
    }

    fn record_request(&self, span: &SpanRef<'_>) {
        self.request.record_span(span, self.settings.trace_content);
    }

    fn record_response(&self, span: &SpanRef<'_>, response: &EmbeddingsResponse) {
        response.record_span(span, self.settings.trace_content);
    }

    fn response_text(&self, _response: &EmbeddingsResponse) -> Option<String> {
        None
    }

    /// An empty embedding list; the block message is only logged.
    fn blocked_response(
        &self,
        evaluation: &EvaluationResult,
        phase: GuardPhase,
        _replaced: Option<&EmbeddingsResponse>,
    ) -> EmbeddingsResponse {
        let message = self
            .settings
            .blocked_message(phase, evaluation.block_message());
        debug!(model = %self.request.model, message = %message, "Returning empty embeddings for blocked input");
        EmbeddingsResponse {
            object: "list".to_string(),
            data: Vec::new(),
            model: self.request.model.clone(),
            usage: EmbeddingUsage::default(),
        }
    }

    fn accumulator(&self) -> Unstreamed<EmbeddingsResponse> {
        Unstreamed::default()
    }
}
