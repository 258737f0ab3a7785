use chrono::Utc;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::streaming::StreamError;

pub const BLOCKED_MODEL_ID: &str = "whylabs/guardrails";
pub const BLOCKED_STOP_REASON: &str = "blocked";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum WatsonxPrompt {
    Single(String),
    Batch(Vec<String>),
}

impl WatsonxPrompt {
    /// The string, or the last prompt of a batch.
    pub fn guarded(&self) -> Option<&str> {
        match self {
            WatsonxPrompt::Single(prompt) => Some(prompt),
            WatsonxPrompt::Batch(prompts) => prompts.last().map(String::as_str),
        }
    }

    pub fn all(&self) -> Vec<&str> {
        match self {
            WatsonxPrompt::Single(prompt) => vec![prompt.as_str()],
            WatsonxPrompt::Batch(prompts) => prompts.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GenerateParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoding_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_new_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_new_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerateRequest {
    pub model_id: String,
    #[serde(rename = "input")]
    pub prompt: WatsonxPrompt,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<GenerateParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl GenerateRequest {
    pub fn new(model_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            prompt: WatsonxPrompt::Single(prompt.into()),
            parameters: None,
            project_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationResult {
    pub generated_text: String,
    pub generated_token_count: u32,
    #[serde(default)]
    pub input_token_count: u32,
    pub stop_reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SystemDetails {
    #[serde(default)]
    pub warnings: Vec<Value>,
}

/// One `/ml/v1/text/generation` response, or one streamed event of it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerateResponse {
    pub model_id: String,
    pub created_at: String,
    pub results: Vec<GenerationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<SystemDetails>,
}

impl GenerateResponse {
    pub fn first_result(&self) -> Option<&GenerationResult> {
        self.results.first()
    }

    /// Response carrying `message` in place of generated text.
    pub fn blocked(message: String) -> Self {
        Self {
            model_id: BLOCKED_MODEL_ID.to_string(),
            created_at: Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            results: vec![GenerationResult {
                generated_text: message,
                generated_token_count: 0,
                input_token_count: 0,
                stop_reason: BLOCKED_STOP_REASON.to_string(),
            }],
            system: Some(SystemDetails::default()),
        }
    }
}

/// A generation for a single prompt or a batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum GenerateOutput {
    Single(GenerateResponse),
    Batch(Vec<GenerateResponse>),
}

impl GenerateOutput {
    pub fn responses(&self) -> &[GenerateResponse] {
        match self {
            GenerateOutput::Single(response) => std::slice::from_ref(response),
            GenerateOutput::Batch(responses) => responses,
        }
    }

    pub fn into_responses(self) -> Vec<GenerateResponse> {
        match self {
            GenerateOutput::Single(response) => vec![response],
            GenerateOutput::Batch(responses) => responses,
        }
    }
}

pub type GenerateStream = BoxStream<'static, Result<GenerateResponse, StreamError>>;

pub type BlockingGenerateStream =
    Box<dyn Iterator<Item = Result<GenerateResponse, StreamError>> + Send>;
