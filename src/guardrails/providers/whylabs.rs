use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use http::HeaderMap;
use opentelemetry::Context;
use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::trace::TraceContextExt;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use tracing::{debug, warn};

use super::GuardrailClient;
use crate::config::GuardrailConfig;
use crate::guardrails::content_id::{ContentIdProvider, resolve_content_id};
use crate::guardrails::response_parser::parse_evaluation_http_response;
use crate::guardrails::span_attributes::record_guardrail_error;
use crate::guardrails::types::{EvaluateRequest, EvaluationResult, GuardInput, GuardrailError};
use crate::guardrails::version_check::VersionCheck;

/// HTTP client for the WhyLabs guardrails container.
/// Calls `POST {endpoint}/evaluate?log={log_profile}`.
pub struct WhyLabsClient {
    evaluate_url: String,
    api_key: String,
    api_key_header: String,
    log_profile: bool,
    config: GuardrailConfig,
    timeout: Duration,
    content_id_provider: Option<Arc<dyn ContentIdProvider>>,
    http_client: reqwest::Client,
    blocking_client: OnceLock<reqwest::blocking::Client>,
    version_check: VersionCheck,
}

/// Everything needed to send one evaluation, independent of the HTTP mode.
struct PreparedRequest {
    body: EvaluateRequest,
    trace_headers: HashMap<String, String>,
}

impl WhyLabsClient {
    pub fn new(config: &GuardrailConfig) -> Result<Self, GuardrailError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| GuardrailError::Configuration("missing guardrails endpoint".into()))?;
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GuardrailError::Configuration("missing guardrails API key".into()))?;
        let timeout = config.timeout();
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GuardrailError::Configuration(e.to_string()))?;

        Ok(Self {
            evaluate_url: format!("{}/evaluate", endpoint.trim_end_matches('/')),
            api_key,
            api_key_header: config.api_key_header.clone(),
            log_profile: config.log_profile,
            config: config.clone(),
            timeout,
            content_id_provider: config.content_id_provider.clone(),
            http_client,
            blocking_client: OnceLock::new(),
            version_check: VersionCheck::default(),
        })
    }

    /// Replaces the version-check schedule, mainly so tests can check every call.
    pub fn with_version_check(mut self, version_check: VersionCheck) -> Self {
        self.version_check = version_check;
        self
    }

    fn prepare(&self, input: GuardInput<'_>, cx: &Context) -> Result<PreparedRequest, GuardrailError> {
        let phase = input.phase();
        let dataset_id = self.config.dataset_for(phase).ok_or_else(|| {
            GuardrailError::Configuration(format!(
                "{} evaluation requires a dataset_id",
                phase.as_str()
            ))
        })?;
        debug!(dataset_id, phase = phase.as_str(), "Evaluating with guardrails");

        let content_id = resolve_content_id(self.content_id_provider.as_deref(), &input.texts());
        let body = EvaluateRequest::new(input, dataset_id).with_id(content_id);

        let mut trace_headers = HashMap::new();
        TraceContextPropagator::new().inject_context(cx, &mut trace_headers);

        Ok(PreparedRequest {
            body,
            trace_headers,
        })
    }

    async fn send(&self, input: GuardInput<'_>, cx: &Context) -> Result<EvaluationResult, GuardrailError> {
        let prepared = self.prepare(input, cx)?;
        let mut request = self
            .http_client
            .post(&self.evaluate_url)
            .query(&[("log", self.log_profile)])
            .header(self.api_key_header.as_str(), self.api_key.as_str())
            .json(&prepared.body);
        for (name, value) in &prepared.trace_headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;

        self.finish(status, &headers, &body, cx)
    }

    fn send_blocking(&self, input: GuardInput<'_>, cx: &Context) -> Result<EvaluationResult, GuardrailError> {
        let prepared = self.prepare(input, cx)?;
        let client = self.blocking_client()?;
        let mut request = client
            .post(&self.evaluate_url)
            .query(&[("log", self.log_profile)])
            .header(self.api_key_header.as_str(), self.api_key.as_str())
            .json(&prepared.body);
        for (name, value) in &prepared.trace_headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send()?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text()?;

        self.finish(status, &headers, &body, cx)
    }

    // Built on first use: the blocking client must not be created inside an
    // async runtime.
    fn blocking_client(&self) -> Result<&reqwest::blocking::Client, GuardrailError> {
        if let Some(client) = self.blocking_client.get() {
            return Ok(client);
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| GuardrailError::Configuration(e.to_string()))?;
        Ok(self.blocking_client.get_or_init(|| client))
    }

    fn finish(
        &self,
        status: u16,
        headers: &HeaderMap,
        body: &str,
        cx: &Context,
    ) -> Result<EvaluationResult, GuardrailError> {
        self.version_check.inspect(headers, &cx.span());
        parse_evaluation_http_response(status, body)
    }

    fn soften(
        &self,
        input: GuardInput<'_>,
        result: Result<EvaluationResult, GuardrailError>,
        started: Instant,
        cx: &Context,
    ) -> Option<EvaluationResult> {
        let phase = input.phase().as_str();
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match result {
            Ok(evaluation) => {
                debug!(
                    phase,
                    elapsed_ms,
                    blocked = evaluation.is_blocked(),
                    "Guardrail evaluation completed"
                );
                Some(evaluation)
            }
            Err(GuardrailError::Configuration(reason)) => {
                warn!(phase, reason = %reason, "Skipping guardrail evaluation");
                None
            }
            Err(GuardrailError::Validation(body)) => {
                warn!(
                    phase,
                    elapsed_ms,
                    body = %body,
                    "Guardrail request validation failure, possible version mismatch"
                );
                record_guardrail_error(&cx.span());
                None
            }
            Err(err) => {
                warn!(phase, elapsed_ms, error = %err, "Guardrail evaluation failed, continuing unguarded");
                record_guardrail_error(&cx.span());
                None
            }
        }
    }
}

#[async_trait]
impl GuardrailClient for WhyLabsClient {
    async fn evaluate(&self, input: GuardInput<'_>, cx: &Context) -> Option<EvaluationResult> {
        let started = Instant::now();
        let result = self.send(input, cx).await;
        self.soften(input, result, started, cx)
    }

    fn evaluate_blocking(&self, input: GuardInput<'_>, cx: &Context) -> Option<EvaluationResult> {
        let started = Instant::now();
        let result = self.send_blocking(input, cx);
        self.soften(input, result, started, cx)
    }
}
