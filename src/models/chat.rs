use std::collections::HashMap;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

pub use super::content::ChatCompletionMessage;
use super::streaming::{ChatCompletionChunk, StreamError};
use super::tools::ToolDefinition;
use super::usage::Usage;

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatCompletionMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logit_bias: Option<HashMap<String, i32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Extra HTTP headers the caller sends with the request.
    #[serde(skip)]
    pub headers: Option<HashMap<String, String>>,
}

impl ChatCompletionRequest {
    pub fn is_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    /// Content of the last `user` message.
    pub fn last_user_message(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == "user")
            .and_then(ChatCompletionMessage::text)
    }
}

pub type ChatCompletionStream = BoxStream<'static, Result<ChatCompletionChunk, StreamError>>;

pub type BlockingChatCompletionStream =
    Box<dyn Iterator<Item = Result<ChatCompletionChunk, StreamError>> + Send>;

pub enum ChatCompletionResponse<S = ChatCompletionStream> {
    Stream(S),
    NonStream(ChatCompletion),
}

pub type BlockingChatCompletionResponse = ChatCompletionResponse<BlockingChatCompletionStream>;

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ChatCompletion {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<u64>,
    pub model: String,
    pub choices: Vec<ChatCompletionChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
}

impl ChatCompletion {
    /// Content of the first choice.
    pub fn first_content(&self) -> Option<String> {
        self.choices.first().and_then(|choice| choice.message.text())
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ChatCompletionChoice {
    pub index: u32,
    pub message: ChatCompletionMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    /// Passed through untouched; never recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<serde_json::Value>,
}
