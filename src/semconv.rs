//! Span attribute vocabulary shared by every vendor adapter.
//!
//! Dashboards key off these names, so they are part of the wire contract.

use std::fmt;

pub const LLM_REQUEST_TYPE: &str = "llm.request.type";
pub const LLM_VENDOR: &str = "llm.vendor";
pub const LLM_SYSTEM: &str = "llm.system";
pub const LLM_REQUEST_MODEL: &str = "llm.request.model";
pub const LLM_RESPONSE_MODEL: &str = "llm.response.model";
pub const LLM_REQUEST_MAX_TOKENS: &str = "llm.request.max_tokens";
pub const LLM_REQUEST_TEMPERATURE: &str = "llm.request.temperature";
pub const LLM_REQUEST_TOP_P: &str = "llm.request.top_p";
pub const LLM_REQUEST_FUNCTIONS: &str = "llm.request.functions";
pub const LLM_RESPONSE_STOP_REASON: &str = "llm.response.stop_reason";
pub const LLM_USAGE_TOTAL_TOKENS: &str = "llm.usage.total_tokens";
pub const LLM_USAGE_COMPLETION_TOKENS: &str = "llm.usage.completion_tokens";
pub const LLM_USAGE_PROMPT_TOKENS: &str = "llm.usage.prompt_tokens";
pub const LLM_TEMPERATURE: &str = "llm.temperature";
pub const LLM_TOP_P: &str = "llm.top_p";
pub const LLM_TOP_K: &str = "llm.top_k";
pub const LLM_FREQUENCY_PENALTY: &str = "llm.frequency_penalty";
pub const LLM_PRESENCE_PENALTY: &str = "llm.presence_penalty";
pub const LLM_REPETITION_PENALTY: &str = "llm.repetition_penalty";
pub const LLM_USER: &str = "llm.user";
pub const LLM_HEADERS: &str = "llm.headers";
pub const LLM_PROMPTS: &str = "llm.prompts";
pub const LLM_COMPLETIONS: &str = "llm.completions";
pub const LLM_STREAMING: &str = "llm.streaming";
pub const LLM_STREAM_CANCELLED: &str = "llm.stream.cancelled";
pub const LLM_DECODING_METHOD: &str = "llm.decoding_method";
pub const LLM_RANDOM_SEED: &str = "llm.random_seed";
pub const LLM_MAX_NEW_TOKENS: &str = "llm.max_new_tokens";
pub const LLM_MIN_NEW_TOKENS: &str = "llm.min_new_tokens";

pub const SPAN_TYPE: &str = "span.type";
pub const SPAN_TYPE_INTERACTION: &str = "interaction";
pub const SPAN_TYPE_COMPLETION: &str = "completion";
pub const SPAN_TYPE_GUARDRAILS: &str = "guardrails";

pub const INTERACTION_SPAN_NAME: &str = "interaction";
pub const TASK_DECORATED_FUNCTION: &str = "task.decorated.function";

/// Kind of LLM request an interaction represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmRequestType {
    Completion,
    Chat,
    Rerank,
    Embedding,
    Unknown,
}

impl LlmRequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmRequestType::Completion => "completion",
            LlmRequestType::Chat => "chat",
            LlmRequestType::Rerank => "rerank",
            LlmRequestType::Embedding => "embedding",
            LlmRequestType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LlmRequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `llm.prompts.{index}.{field}`
pub fn prompt_attribute(index: usize, field: &str) -> String {
    format!("{LLM_PROMPTS}.{index}.{field}")
}

/// `llm.completions.{index}.{field}`
pub fn completion_attribute(index: usize, field: &str) -> String {
    format!("{LLM_COMPLETIONS}.{index}.{field}")
}

pub fn function_attribute(index: usize, field: &str) -> String {
    format!("{LLM_REQUEST_FUNCTIONS}.{index}.{field}")
}
