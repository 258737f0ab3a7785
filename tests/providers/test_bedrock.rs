use std::sync::Arc;

use opentelemetry::Value;
use serde_json::{Value as Json, json};
use traceguard_lib::providers::bedrock::{BedrockRequest, BedrockResponse};
use traceguard_lib::providers::{BlockingInterceptor, Interceptor};

use super::helpers::*;

fn claude_request(prompt: &str) -> BedrockRequest {
    let body = json!({
        "anthropic_version": "bedrock-2023-05-31",
        "max_tokens": 200,
        "temperature": 0.5,
        "messages": [{"role": "user", "content": prompt}]
    });
    BedrockRequest::new(
        "us.anthropic.claude-3-haiku-20240307-v1:0",
        serde_json::to_vec(&body).unwrap(),
    )
}

fn claude_response(text: &str) -> BedrockResponse {
    let body = json!({
        "id": "msg_01",
        "type": "message",
        "role": "assistant",
        "model": "claude-3-haiku-20240307",
        "content": [{"type": "text", "text": text}],
        "stop_reason": "end_turn",
        "stop_sequence": null,
        "usage": {"input_tokens": 12, "output_tokens": 8}
    });
    BedrockResponse {
        request_id: Some("req-123".to_string()),
        content_type: "application/json".to_string(),
        body: serde_json::to_vec(&body).unwrap(),
    }
}

fn titan_request(prompt: &str) -> BedrockRequest {
    let body = json!({
        "inputText": prompt,
        "textGenerationConfig": {"maxTokenCount": 100, "temperature": 0.2, "topP": 0.9}
    });
    BedrockRequest::new("amazon.titan-text-express-v1", serde_json::to_vec(&body).unwrap())
}

fn decode(response: &BedrockResponse) -> Json {
    serde_json::from_slice(&response.body).unwrap()
}

#[tokio::test]
async fn test_claude_round_trip_records_usage() {
    let guard = Arc::new(MockGuardrailClient::allowing());
    let harness = Harness::new(Some(guard.clone()), true);

    let response: Result<BedrockResponse, String> = harness
        .instrumentation
        .bedrock()
        .intercept(claude_request("What is Rust?"), |_req| async {
            Ok(claude_response("A systems language."))
        })
        .await;
    assert_eq!(response.unwrap(), claude_response("A systems language."));

    let completion = harness.span("bedrock.completion");
    assert_eq!(attribute(&completion, "llm.vendor"), Some(Value::from("anthropic")));
    assert_eq!(
        attribute(&completion, "llm.request.model"),
        Some(Value::from("claude-3-haiku-20240307-v1:0"))
    );
    assert_eq!(attribute(&completion, "llm.request.max_tokens"), Some(Value::I64(200)));
    assert_eq!(attribute(&completion, "llm.usage.prompt_tokens"), Some(Value::I64(12)));
    assert_eq!(attribute(&completion, "llm.usage.completion_tokens"), Some(Value::I64(8)));
    assert_eq!(attribute(&completion, "llm.usage.total_tokens"), Some(Value::I64(20)));
    assert_eq!(
        attribute(&completion, "llm.completions.0.content"),
        Some(Value::from("A systems language."))
    );
    assert_eq!(
        attribute(&harness.span("interaction"), "llm.vendor"),
        Some(Value::from("bedrock"))
    );

    let texts: Vec<String> = guard.calls().into_iter().map(|(_, text)| text).collect();
    assert_eq!(texts, vec!["What is Rust?", "A systems language."]);
}

#[tokio::test]
async fn test_blocked_prompt_returns_claude_shaped_body() {
    let guard = Arc::new(MockGuardrailClient::new(Some(block("pii")), None));
    let harness = Harness::new(Some(guard), false);
    let calls = &CallCounter::default();

    let response: Result<BedrockResponse, String> = harness
        .instrumentation
        .bedrock()
        .intercept(claude_request("my ssn is 123-45-6789"), move |_req| async move {
            calls.hit();
            Ok(claude_response("ok"))
        })
        .await;

    let response = response.unwrap();
    assert_eq!(calls.count(), 0);
    let body = decode(&response);
    assert_eq!(body["type"], "message");
    assert_eq!(body["role"], "assistant");
    assert_eq!(body["stop_reason"], "end_turn");
    assert_eq!(body["content"][0]["text"], "Prompt blocked by WhyLabs: pii");
    // Prompt-phase blocks have no real request id to keep.
    assert_ne!(response.request_id.as_deref(), Some("req-123"));
    assert!(response.request_id.is_some());
}

#[tokio::test]
async fn test_blocked_response_keeps_request_id() {
    let guard = Arc::new(MockGuardrailClient::new(Some(allow()), Some(block("toxic"))));
    let harness = Harness::new(Some(guard), false);

    let response: Result<BedrockResponse, String> = harness
        .instrumentation
        .bedrock()
        .intercept(titan_request("insult me"), |_req| async {
            let body = json!({
                "inputTextTokenCount": 3,
                "results": [{"tokenCount": 10, "outputText": "rude words", "completionReason": "FINISH"}]
            });
            Ok(BedrockResponse {
                request_id: Some("req-456".to_string()),
                content_type: "application/json".to_string(),
                body: serde_json::to_vec(&body).unwrap(),
            })
        })
        .await;

    let response = response.unwrap();
    assert_eq!(response.request_id.as_deref(), Some("req-456"));
    let body = decode(&response);
    assert_eq!(body["results"][0]["outputText"], "Response blocked by WhyLabs: toxic");
    assert_eq!(body["results"][0]["completionReason"], "FINISH");

    let completion = harness.span("bedrock.completion");
    assert_eq!(attribute(&completion, "llm.usage.total_tokens"), Some(Value::I64(10)));
    assert_eq!(attribute(&completion, "llm.usage.completion_tokens"), Some(Value::I64(7)));
}

#[test]
fn test_blocking_llama_prompt_block() {
    let guard = Arc::new(MockGuardrailClient::new(Some(block("nope")), None));
    let harness = Harness::new(Some(guard), false);
    let body = json!({"prompt": "hello llama", "max_gen_len": 64});
    let request = BedrockRequest::new("meta.llama3-8b-instruct-v1:0", serde_json::to_vec(&body).unwrap());

    let response = harness
        .instrumentation
        .bedrock()
        .intercept_blocking(request, |_req| -> Result<BedrockResponse, String> {
            panic!("a blocked prompt must not reach the model")
        })
        .unwrap();

    let body = decode(&response);
    assert_eq!(body["generation"], "Prompt blocked by WhyLabs: nope");
    assert_eq!(body["prompt_token_count"], 0);
}

#[tokio::test]
async fn test_undecodable_body_is_traced_without_guardrails() {
    let guard = Arc::new(MockGuardrailClient::allowing());
    let harness = Harness::new(Some(guard.clone()), false);
    let request = BedrockRequest::new("anthropic.claude-v2", b"not json".to_vec());

    let response: Result<BedrockResponse, String> = harness
        .instrumentation
        .bedrock()
        .intercept(request, |_req| async {
            Ok(BedrockResponse {
                request_id: None,
                content_type: "application/json".to_string(),
                body: b"{}".to_vec(),
            })
        })
        .await;

    assert!(response.is_ok());
    assert!(guard.calls().is_empty());
    assert!(harness.has_span("bedrock.completion"));
}

#[tokio::test]
async fn test_llama_usage_near_u32_max_is_summed_wide() {
    let harness = Harness::new(None, false);
    let request = BedrockRequest::new(
        "meta.llama3-8b-instruct-v1:0",
        serde_json::to_vec(&json!({"prompt": "hi", "max_gen_len": 10})).unwrap(),
    );
    let body = json!({
        "generation": "hello",
        "prompt_token_count": u32::MAX,
        "generation_token_count": 2,
        "stop_reason": "stop"
    });
    let response = BedrockResponse {
        request_id: Some("req-789".to_string()),
        content_type: "application/json".to_string(),
        body: serde_json::to_vec(&body).unwrap(),
    };

    let result: Result<BedrockResponse, String> = harness
        .instrumentation
        .bedrock()
        .intercept(request, move |_req| async move { Ok(response) })
        .await;
    assert!(result.is_ok());

    let completion = harness.span("bedrock.completion");
    assert_eq!(
        attribute(&completion, "llm.usage.total_tokens"),
        Some(Value::I64(i64::from(u32::MAX) + 2))
    );
}
