use std::error::Error;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::chat::ChatCompletion;
use super::tools::ToolCall;
use super::usage::Usage;

/// Error type carried by vendor chunk streams.
pub type StreamError = Box<dyn Error + Send + Sync>;

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct ChoiceDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Choice {
    pub delta: ChoiceDelta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<Value>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub choices: Vec<Choice>,
    pub created: i64,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_tier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl From<ChatCompletion> for ChatCompletionChunk {
    /// Collapses a full completion into one chunk carrying each message whole.
    fn from(completion: ChatCompletion) -> Self {
        let choices = completion
            .choices
            .into_iter()
            .map(|choice| Choice {
                delta: ChoiceDelta {
                    content: choice.message.text(),
                    role: Some(choice.message.role),
                    tool_calls: choice.message.tool_calls,
                },
                finish_reason: choice.finish_reason,
                index: choice.index,
                logprobs: None,
            })
            .collect();
        Self {
            id: completion.id,
            choices,
            created: completion.created.and_then(|c| i64::try_from(c).ok()).unwrap_or_default(),
            model: completion.model,
            service_tier: None,
            system_fingerprint: completion.system_fingerprint,
            usage: completion.usage,
        }
    }
}
