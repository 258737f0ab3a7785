pub mod whylabs;

use std::sync::Arc;

use async_trait::async_trait;
use opentelemetry::Context;
use tracing::warn;

use self::whylabs::WhyLabsClient;
use super::types::{EvaluationResult, GuardInput, GuardrailError};
use crate::config::GuardrailConfig;

/// Remote evaluator. Implementations fail soft: any transport, timeout or
/// parse problem is logged and surfaces as `None`.
///
/// `cx` carries the guardrail span; its trace context is propagated to the
/// evaluator and the span receives error and version attributes.
#[async_trait]
pub trait GuardrailClient: Send + Sync {
    async fn evaluate(&self, input: GuardInput<'_>, cx: &Context) -> Option<EvaluationResult>;

    fn evaluate_blocking(&self, input: GuardInput<'_>, cx: &Context) -> Option<EvaluationResult>;

    async fn evaluate_prompt(&self, prompt: &str, cx: &Context) -> Option<EvaluationResult> {
        self.evaluate(GuardInput::Prompt(prompt), cx).await
    }

    async fn evaluate_response(
        &self,
        prompt: Option<&str>,
        response: &str,
        cx: &Context,
    ) -> Option<EvaluationResult> {
        self.evaluate(GuardInput::Response { prompt, response }, cx)
            .await
    }

    async fn evaluate_chunk(&self, chunk: &str, cx: &Context) -> Option<EvaluationResult> {
        self.evaluate(GuardInput::Chunk(chunk), cx).await
    }

    fn evaluate_prompt_blocking(&self, prompt: &str, cx: &Context) -> Option<EvaluationResult> {
        self.evaluate_blocking(GuardInput::Prompt(prompt), cx)
    }

    fn evaluate_response_blocking(
        &self,
        prompt: Option<&str>,
        response: &str,
        cx: &Context,
    ) -> Option<EvaluationResult> {
        self.evaluate_blocking(GuardInput::Response { prompt, response }, cx)
    }

    fn evaluate_chunk_blocking(&self, chunk: &str, cx: &Context) -> Option<EvaluationResult> {
        self.evaluate_blocking(GuardInput::Chunk(chunk), cx)
    }
}

/// Builds the evaluator client. `Ok(None)` means tracing-only mode: the config
/// lacks an endpoint or key.
pub fn create_guardrail_client(
    config: &GuardrailConfig,
) -> Result<Option<Arc<dyn GuardrailClient>>, GuardrailError> {
    if !config.is_enabled() {
        warn!("Guardrails endpoint or API key not configured, running in tracing-only mode");
        return Ok(None);
    }
    let client = WhyLabsClient::new(config)?;
    Ok(Some(Arc::new(client)))
}
