use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::usage::EmbeddingUsage;

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct EmbeddingsRequest {
    pub model: String,
    pub input: EmbeddingsInput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum EmbeddingsInput {
    Single(String),
    Multiple(Vec<String>),
    SingleTokenIds(Vec<i32>),
    MultipleTokenIds(Vec<Vec<i32>>),
}

impl EmbeddingsInput {
    /// Text submitted to prompt guardrails. Token ids carry no text.
    pub fn text(&self) -> Option<String> {
        match self {
            EmbeddingsInput::Single(text) => Some(text.clone()),
            EmbeddingsInput::Multiple(texts) => Some(texts.join("\n")),
            EmbeddingsInput::SingleTokenIds(_) | EmbeddingsInput::MultipleTokenIds(_) => None,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct EmbeddingsResponse {
    pub object: String,
    pub data: Vec<Embeddings>,
    pub model: String,
    pub usage: EmbeddingUsage,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Embeddings {
    pub object: String,
    pub embedding: Embedding,
    pub index: usize,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum Embedding {
    String(String),
    Float(Vec<f32>),
    Json(Value),
}
