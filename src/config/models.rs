use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants::{
    DEFAULT_API_KEY_HEADER, DEFAULT_GUARDRAILS_TIMEOUT_SECS, DEFAULT_SERVICE_NAME,
    DEFAULT_TRACER_NAME, DEFAULT_WHYLABS_ENDPOINT,
};
use crate::guardrails::content_id::ContentIdProvider;
use crate::guardrails::types::GuardPhase;

fn default_whylabs_endpoint() -> String {
    DEFAULT_WHYLABS_ENDPOINT.to_string()
}

fn default_api_key_header() -> String {
    DEFAULT_API_KEY_HEADER.to_string()
}

fn default_timeout_secs() -> f64 {
    DEFAULT_GUARDRAILS_TIMEOUT_SECS
}

fn default_log_profile() -> bool {
    true
}

/// Process-wide telemetry settings, loaded once by [`crate::config::load_config`].
#[derive(Deserialize, Serialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_whylabs_endpoint")]
    pub whylabs_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whylabs_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_dataset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    /// `application.name` resource attribute; defaults to the service name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracer_name: Option<String>,
    /// Export each span as it ends instead of batching.
    #[serde(default)]
    pub disable_batching: bool,
    /// Log every exported span at `debug`.
    #[serde(default)]
    pub debug_export: bool,
    #[serde(default)]
    pub trace_prompt_and_response: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_message_override: Option<String>,
    #[serde(default)]
    pub guardrails: GuardrailConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            whylabs_endpoint: default_whylabs_endpoint(),
            whylabs_api_key: None,
            default_dataset_id: None,
            service_name: None,
            application_name: None,
            tracer_name: None,
            disable_batching: false,
            debug_export: false,
            trace_prompt_and_response: false,
            blocked_message_override: None,
            guardrails: GuardrailConfig::default(),
        }
    }
}

impl TelemetryConfig {
    pub fn service_name(&self) -> &str {
        self.service_name.as_deref().unwrap_or(DEFAULT_SERVICE_NAME)
    }

    pub fn application_name(&self) -> &str {
        self.application_name.as_deref().unwrap_or(self.service_name())
    }

    pub fn tracer_name(&self) -> &str {
        self.tracer_name.as_deref().unwrap_or(DEFAULT_TRACER_NAME)
    }

    pub fn traces_endpoint(&self) -> String {
        format!("{}/v1/traces", self.whylabs_endpoint.trim_end_matches('/'))
    }

    pub fn trace_settings(&self) -> TraceSettings {
        TraceSettings {
            trace_content: self.trace_prompt_and_response,
            blocked_message_override: self.blocked_message_override.clone(),
        }
    }
}

impl fmt::Debug for TelemetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryConfig")
            .field("whylabs_endpoint", &self.whylabs_endpoint)
            .field("whylabs_api_key", &self.whylabs_api_key.as_deref().map(mask_secret))
            .field("default_dataset_id", &self.default_dataset_id)
            .field("service_name", &self.service_name)
            .field("application_name", &self.application_name)
            .field("tracer_name", &self.tracer_name)
            .field("disable_batching", &self.disable_batching)
            .field("debug_export", &self.debug_export)
            .field("trace_prompt_and_response", &self.trace_prompt_and_response)
            .field("blocked_message_override", &self.blocked_message_override)
            .field("guardrails", &self.guardrails)
            .finish()
    }
}

/// Connection settings for the remote guardrails service.
///
/// A config without both `endpoint` and `api_key` leaves the pipeline in
/// tracing-only mode.
#[derive(Deserialize, Serialize, Clone)]
pub struct GuardrailConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<String>,
    /// Dataset used for response and chunk evaluations when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_dataset_id: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
    #[serde(default = "default_log_profile")]
    pub log_profile: bool,
    #[serde(skip)]
    pub content_id_provider: Option<Arc<dyn ContentIdProvider>>,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            api_key_header: default_api_key_header(),
            dataset_id: None,
            response_dataset_id: None,
            timeout_secs: default_timeout_secs(),
            log_profile: default_log_profile(),
            content_id_provider: None,
        }
    }
}

impl GuardrailConfig {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    pub fn with_dataset_id(mut self, dataset_id: impl Into<String>) -> Self {
        self.dataset_id = Some(dataset_id.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs_f64();
        self
    }

    pub fn with_content_id_provider(mut self, provider: Arc<dyn ContentIdProvider>) -> Self {
        self.content_id_provider = Some(provider);
        self
    }

    pub fn dataset_for(&self, phase: GuardPhase) -> Option<&str> {
        match phase {
            GuardPhase::Prompt => self.dataset_id.as_deref(),
            GuardPhase::Response => self
                .response_dataset_id
                .as_deref()
                .or(self.dataset_id.as_deref()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());
        present(&self.endpoint) && present(&self.api_key)
    }

    pub fn timeout(&self) -> Duration {
        if self.timeout_secs.is_finite() && self.timeout_secs > 0.0 {
            Duration::from_secs_f64(self.timeout_secs)
        } else {
            Duration::from_secs_f64(DEFAULT_GUARDRAILS_TIMEOUT_SECS)
        }
    }
}

impl fmt::Debug for GuardrailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardrailConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_deref().map(mask_secret))
            .field("api_key_header", &self.api_key_header)
            .field("dataset_id", &self.dataset_id)
            .field("response_dataset_id", &self.response_dataset_id)
            .field("timeout_secs", &self.timeout_secs)
            .field("log_profile", &self.log_profile)
            .field("content_id_provider", &self.content_id_provider.is_some())
            .finish()
    }
}

/// Per-call settings derived from [`TelemetryConfig`] and shared by every adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceSettings {
    /// Record prompt and completion text on spans.
    pub trace_content: bool,
    pub blocked_message_override: Option<String>,
}

impl TraceSettings {
    /// Human-readable text placed in a synthesized blocked response.
    pub fn blocked_message(&self, phase: GuardPhase, message: Option<&str>) -> String {
        if let Some(text) = &self.blocked_message_override {
            return text.clone();
        }
        let subject = match phase {
            GuardPhase::Prompt => "Prompt",
            GuardPhase::Response => "Response",
        };
        match message.filter(|m| !m.is_empty()) {
            Some(message) => format!("{subject} blocked by WhyLabs: {message}"),
            None => format!("{subject} blocked by WhyLabs"),
        }
    }
}

pub(crate) fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}
