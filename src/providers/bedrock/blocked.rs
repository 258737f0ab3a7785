use tracing::warn;
use uuid::Uuid;

use super::models::{
    BedrockVendor, ClaudeContentBlock, ClaudeResponse, ClaudeUsage, LlamaResponse, ModelId,
    TitanResponse, TitanResult,
};

/// Response body in the invoked family's format carrying `message`.
/// Families without their own format get the Titan shape.
pub fn blocked_body(model_id: &ModelId, message: &str) -> Vec<u8> {
    let encoded = match model_id.vendor {
        Some(BedrockVendor::Meta) => serde_json::to_vec(&LlamaResponse {
            generation: message.to_string(),
            prompt_token_count: 0,
            generation_token_count: 0,
            stop_reason: None,
        }),
        Some(BedrockVendor::Anthropic) => serde_json::to_vec(&ClaudeResponse {
            id: Uuid::new_v4().to_string(),
            r#type: "message".to_string(),
            role: "assistant".to_string(),
            model: model_id.model.clone(),
            content: vec![ClaudeContentBlock {
                r#type: "text".to_string(),
                text: Some(message.to_string()),
            }],
            stop_reason: Some("end_turn".to_string()),
            stop_sequence: None,
            usage: ClaudeUsage::default(),
        }),
        _ => serde_json::to_vec(&TitanResponse {
            input_text_token_count: 0,
            results: vec![TitanResult {
                token_count: 0,
                output_text: message.to_string(),
                completion_reason: Some("FINISH".to_string()),
            }],
        }),
    };
    match encoded {
        Ok(body) => body,
        Err(err) => {
            warn!(error = %err, "Failed to encode blocked Bedrock body");
            message.as_bytes().to_vec()
        }
    }
}
