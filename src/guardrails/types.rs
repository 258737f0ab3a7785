use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Which side of the LLM call a guardrail evaluation covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardPhase {
    Prompt,
    Response,
}

impl GuardPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardPhase::Prompt => "prompt",
            GuardPhase::Response => "response",
        }
    }

    pub fn span_name(&self) -> &'static str {
        match self {
            GuardPhase::Prompt => "guardrails.request",
            GuardPhase::Response => "guardrails.response",
        }
    }
}

/// Text sent to the evaluator for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardInput<'a> {
    Prompt(&'a str),
    Response {
        prompt: Option<&'a str>,
        response: &'a str,
    },
    /// A single streamed fragment, evaluated response-only.
    Chunk(&'a str),
}

impl<'a> GuardInput<'a> {
    pub fn phase(&self) -> GuardPhase {
        match self {
            GuardInput::Prompt(_) => GuardPhase::Prompt,
            GuardInput::Response { .. } | GuardInput::Chunk(_) => GuardPhase::Response,
        }
    }

    /// Texts fed to the content-id hook, prompt first.
    pub fn texts(&self) -> Vec<&'a str> {
        match *self {
            GuardInput::Prompt(prompt) => vec![prompt],
            GuardInput::Response {
                prompt: Some(prompt),
                response,
            } => vec![prompt, response],
            GuardInput::Response {
                prompt: None,
                response,
            } => vec![response],
            GuardInput::Chunk(chunk) => vec![chunk],
        }
    }
}

/// Guardrail verdict.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(tag = "action_type", rename_all = "snake_case")]
pub enum Action {
    Block {
        #[serde(default, alias = "message", skip_serializing_if = "Option::is_none")]
        block_message: Option<String>,
    },
    #[default]
    #[serde(rename = "pass", other)]
    Allow,
}

/// One row of an evaluation's failure report.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ValidationFailure {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub metric: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub upper_threshold: Option<f64>,
    #[serde(default)]
    pub lower_threshold: Option<f64>,
    #[serde(default)]
    pub allowed_values: Option<Vec<Value>>,
    #[serde(default)]
    pub disallowed_values: Option<Vec<Value>>,
    #[serde(default)]
    pub must_be_none: Option<bool>,
    #[serde(default)]
    pub must_be_non_none: Option<bool>,
    #[serde(default)]
    pub failure_level: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ValidationReport {
    #[serde(default)]
    pub report: Vec<ValidationFailure>,
}

/// Result of one guardrail evaluation. Never mutated after parsing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct EvaluationResult {
    #[serde(default)]
    pub metrics: Vec<Map<String, Value>>,
    #[serde(default)]
    pub scores: Vec<Map<String, Value>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub action: Action,
    #[serde(default)]
    pub validation_results: ValidationReport,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Map<String, Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl EvaluationResult {
    pub fn is_blocked(&self) -> bool {
        matches!(self.action, Action::Block { .. })
    }

    pub fn block_message(&self) -> Option<&str> {
        match &self.action {
            Action::Block { block_message } => block_message.as_deref(),
            Action::Allow => None,
        }
    }

    pub fn failures(&self) -> &[ValidationFailure] {
        &self.validation_results.report
    }

    pub fn policy_id(&self) -> Option<String> {
        self.metadata.get("policy_id").map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Server-side metric filter sent with response evaluations.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct EvaluateOptions {
    pub metric_filter: MetricFilter,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MetricFilter {
    pub by_required_inputs: Vec<Vec<String>>,
}

impl EvaluateOptions {
    /// Only metrics computable from `{response}` or `{prompt, response}`.
    pub fn response_metrics() -> Self {
        Self {
            metric_filter: MetricFilter {
                by_required_inputs: vec![
                    vec!["response".to_string()],
                    vec!["prompt".to_string(), "response".to_string()],
                ],
            },
        }
    }
}

/// Body of `POST /evaluate`.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct EvaluateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    pub dataset_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<EvaluateOptions>,
}

impl EvaluateRequest {
    pub fn new(input: GuardInput<'_>, dataset_id: impl Into<String>) -> Self {
        let (prompt, response, options) = match input {
            GuardInput::Prompt(prompt) => (Some(prompt.to_string()), None, None),
            GuardInput::Response { prompt, response } => (
                prompt.map(str::to_string),
                Some(response.to_string()),
                Some(EvaluateOptions::response_metrics()),
            ),
            GuardInput::Chunk(chunk) => (None, Some(chunk.to_string()), None),
        };
        Self {
            prompt,
            response,
            dataset_id: dataset_id.into(),
            id: None,
            options,
        }
    }

    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }
}

#[derive(Debug, Error)]
pub enum GuardrailError {
    #[error("Evaluator service unavailable: {0}")]
    Unavailable(String),
    #[error("Evaluator returned HTTP {status}: {body}")]
    HttpError { status: u16, body: String },
    #[error("Evaluator rejected the request: {0}")]
    Validation(String),
    #[error("Evaluator request timed out: {0}")]
    Timeout(String),
    #[error("Failed to parse evaluator response: {0}")]
    ParseError(String),
    #[error("Guardrails client misconfigured: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for GuardrailError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GuardrailError::Timeout(err.to_string())
        } else {
            GuardrailError::Unavailable(err.to_string())
        }
    }
}
