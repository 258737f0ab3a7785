use serde::{Deserialize, Serialize};

use super::tools::ToolCall;

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum ChatMessageContent {
    String(String),
    Array(Vec<ChatMessageContentPart>),
}

impl ChatMessageContent {
    /// Text of the message; multi-part content joins its text parts.
    pub fn text(&self) -> String {
        match self {
            ChatMessageContent::String(text) => text.clone(),
            ChatMessageContent::Array(parts) => parts
                .iter()
                .filter_map(|part| part.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl From<&str> for ChatMessageContent {
    fn from(text: &str) -> Self {
        ChatMessageContent::String(text.to_string())
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ChatMessageContentPart {
    #[serde(rename = "type")]
    pub r#type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ChatCompletionMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<ChatMessageContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refusal: Option<String>,
}

impl ChatCompletionMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Some(ChatMessageContent::String(content.into())),
            name: None,
            tool_calls: None,
            refusal: None,
        }
    }

    pub fn text(&self) -> Option<String> {
        self.content.as_ref().map(ChatMessageContent::text)
    }
}
