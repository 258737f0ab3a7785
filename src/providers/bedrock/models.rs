use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Model families reachable through `invoke_model`, keyed by the vendor
/// segment of the model id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BedrockVendor {
    Anthropic,
    Amazon,
    Meta,
    Cohere,
    Ai21,
}

impl BedrockVendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            BedrockVendor::Anthropic => "anthropic",
            BedrockVendor::Amazon => "amazon",
            BedrockVendor::Meta => "meta",
            BedrockVendor::Cohere => "cohere",
            BedrockVendor::Ai21 => "ai21",
        }
    }

    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "anthropic" => Some(BedrockVendor::Anthropic),
            "amazon" => Some(BedrockVendor::Amazon),
            "meta" => Some(BedrockVendor::Meta),
            "cohere" => Some(BedrockVendor::Cohere),
            "ai21" => Some(BedrockVendor::Ai21),
            _ => None,
        }
    }
}

/// `[region.]vendor.model`, e.g. `us.anthropic.claude-3-haiku-20240307-v1:0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelId {
    pub vendor: Option<BedrockVendor>,
    pub model: String,
}

impl ModelId {
    pub fn parse(model_id: &str) -> Self {
        let segments: Vec<&str> = model_id.split('.').collect();
        for (i, segment) in segments.iter().enumerate() {
            if let Some(vendor) = BedrockVendor::from_segment(segment) {
                if i + 1 < segments.len() {
                    return Self {
                        vendor: Some(vendor),
                        model: segments[i + 1..].join("."),
                    };
                }
            }
        }
        Self {
            vendor: None,
            model: model_id.to_string(),
        }
    }

    pub fn is_titan_text(&self) -> bool {
        self.vendor == Some(BedrockVendor::Amazon) && self.model.starts_with("titan-text-")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ClaudeContent {
    Text(String),
    Blocks(Vec<ClaudeContentBlock>),
}

impl ClaudeContent {
    pub fn text(&self) -> Option<String> {
        match self {
            ClaudeContent::Text(text) => Some(text.clone()),
            ClaudeContent::Blocks(blocks) => {
                let texts: Vec<&str> = blocks.iter().filter_map(|b| b.text.as_deref()).collect();
                if texts.is_empty() {
                    None
                } else {
                    Some(texts.join("\n"))
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClaudeContentBlock {
    #[serde(rename = "type")]
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClaudeMessage {
    pub role: String,
    pub content: ClaudeContent,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaudeRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_version: Option<String>,
    #[serde(default)]
    pub messages: Vec<ClaudeMessage>,
    /// Text Completions API prompt, for pre-Messages models.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens_to_sample: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ClaudeUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClaudeResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub r#type: String,
    pub role: String,
    pub model: String,
    pub content: Vec<ClaudeContentBlock>,
    pub stop_reason: Option<String>,
    pub stop_sequence: Option<String>,
    pub usage: ClaudeUsage,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextGenerationConfig {
    #[serde(rename = "maxTokenCount", default, skip_serializing_if = "Option::is_none")]
    pub max_token_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(rename = "topP", default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(rename = "stopSequences", default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitanRequest {
    #[serde(rename = "inputText")]
    pub input_text: String,
    #[serde(rename = "textGenerationConfig", default, skip_serializing_if = "Option::is_none")]
    pub text_generation_config: Option<TextGenerationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TitanResult {
    #[serde(rename = "tokenCount")]
    pub token_count: u32,
    #[serde(rename = "outputText")]
    pub output_text: String,
    #[serde(rename = "completionReason")]
    pub completion_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TitanResponse {
    #[serde(rename = "inputTextTokenCount")]
    pub input_text_token_count: u32,
    pub results: Vec<TitanResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlamaRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_gen_len: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlamaResponse {
    pub generation: String,
    pub prompt_token_count: u32,
    pub generation_token_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohereRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CohereGeneration {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CohereResponse {
    pub generations: Vec<CohereGeneration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JurassicRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(rename = "topP", default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(rename = "maxTokens", default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JurassicCompletionData {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JurassicCompletion {
    pub data: JurassicCompletionData,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JurassicResponse {
    pub completions: Vec<JurassicCompletion>,
}

/// A request body decoded according to its model family.
#[derive(Debug, Clone)]
pub enum BedrockRequestBody {
    Claude(ClaudeRequest),
    Titan(TitanRequest),
    Llama(LlamaRequest),
    Cohere(CohereRequest),
    Jurassic(JurassicRequest),
}

impl BedrockRequestBody {
    pub fn parse(model_id: &ModelId, body: &[u8]) -> Result<Option<Self>, serde_json::Error> {
        let parsed = match model_id.vendor {
            Some(BedrockVendor::Anthropic) => Self::Claude(serde_json::from_slice(body)?),
            Some(BedrockVendor::Amazon) if model_id.is_titan_text() => {
                Self::Titan(serde_json::from_slice(body)?)
            }
            Some(BedrockVendor::Meta) => Self::Llama(serde_json::from_slice(body)?),
            Some(BedrockVendor::Cohere) => Self::Cohere(serde_json::from_slice(body)?),
            Some(BedrockVendor::Ai21) => Self::Jurassic(serde_json::from_slice(body)?),
            Some(BedrockVendor::Amazon) | None => return Ok(None),
        };
        Ok(Some(parsed))
    }

    /// Claude uses its last message; other families carry a raw prompt.
    pub fn prompt(&self) -> Option<String> {
        match self {
            Self::Claude(request) => match request.messages.last() {
                Some(message) => message.content.text(),
                None => request.prompt.clone(),
            },
            Self::Titan(request) => Some(request.input_text.clone()),
            Self::Llama(request) => Some(request.prompt.clone()),
            Self::Cohere(request) => Some(request.prompt.clone()),
            Self::Jurassic(request) => Some(request.prompt.clone()),
        }
    }
}

/// A response body decoded according to its model family.
#[derive(Debug, Clone)]
pub enum BedrockResponseBody {
    Claude(ClaudeResponse),
    Titan(TitanResponse),
    Llama(LlamaResponse),
    Cohere(CohereResponse),
    Jurassic(JurassicResponse),
}

impl BedrockResponseBody {
    pub fn parse(model_id: &ModelId, body: &[u8]) -> Result<Option<Self>, serde_json::Error> {
        let parsed = match model_id.vendor {
            Some(BedrockVendor::Anthropic) => Self::Claude(serde_json::from_slice(body)?),
            Some(BedrockVendor::Amazon) if model_id.is_titan_text() => {
                Self::Titan(serde_json::from_slice(body)?)
            }
            Some(BedrockVendor::Meta) => Self::Llama(serde_json::from_slice(body)?),
            Some(BedrockVendor::Cohere) => Self::Cohere(serde_json::from_slice(body)?),
            Some(BedrockVendor::Ai21) => Self::Jurassic(serde_json::from_slice(body)?),
            Some(BedrockVendor::Amazon) | None => return Ok(None),
        };
        Ok(Some(parsed))
    }

    pub fn text(&self) -> Option<String> {
        match self {
            Self::Claude(response) => response.content.first().and_then(|b| b.text.clone()),
            Self::Titan(response) => response.results.first().map(|r| r.output_text.clone()),
            Self::Llama(response) => Some(response.generation.clone()),
            Self::Cohere(response) => response.generations.first().map(|g| g.text.clone()),
            Self::Jurassic(response) => response.completions.first().map(|c| c.data.text.clone()),
        }
    }
}
