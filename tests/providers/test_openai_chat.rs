use opentelemetry::Value;
use serde_json::json;
use traceguard_lib::models::chat::{ChatCompletion, ChatCompletionRequest, ChatCompletionResponse};
use traceguard_lib::providers::Interceptor;

use super::helpers::*;

fn tool_request() -> ChatCompletionRequest {
    serde_json::from_value(json!({
        "model": "gpt-4o",
        "messages": [{"role": "user", "content": "What's the weather in Paris?"}],
        "tools": [{
            "type": "function",
            "function": {
                "name": "get_weather",
                "description": "Current weather for a city",
                "parameters": {"type": "object", "properties": {"city": {"type": "string"}}},
                "strict": true
            }
        }]
    }))
    .unwrap()
}

fn tool_call_completion() -> ChatCompletion {
    serde_json::from_value(json!({
        "id": "chatcmpl-tool",
        "object": "chat.completion",
        "created": 1700000000,
        "model": "gpt-4o-2024-08-06",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "get_weather", "arguments": "{\"city\":\"Paris\"}"}
                }]
            },
            "finish_reason": "tool_calls",
            "logprobs": {"content": [{"token": "x", "logprob": -0.1, "bytes": [120], "top_logprobs": []}]}
        }],
        "usage": {
            "prompt_tokens": 20,
            "completion_tokens": 7,
            "total_tokens": 27,
            "completion_tokens_details": {"reasoning_tokens": 0},
            "prompt_tokens_details": {"cached_tokens": 0}
        }
    }))
    .unwrap()
}

#[tokio::test]
async fn test_tool_definitions_and_calls_are_recorded() {
    let harness = Harness::new(None, true);

    let response: Result<ChatCompletionResponse, String> = harness
        .instrumentation
        .openai()
        .intercept(tool_request(), |_req| async {
            Ok(ChatCompletionResponse::NonStream(tool_call_completion()))
        })
        .await;

    let ChatCompletionResponse::NonStream(completion) = response.unwrap() else {
        panic!("expected a non-streaming response");
    };
    assert_eq!(completion, tool_call_completion());
    assert!(completion.choices[0].logprobs.is_some());

    let span = harness.span("openai.chat");
    assert_eq!(
        attribute(&span, "llm.request.functions.0.name"),
        Some(Value::from("get_weather"))
    );
    assert_eq!(
        attribute(&span, "llm.request.functions.0.description"),
        Some(Value::from("Current weather for a city"))
    );
    assert_eq!(
        attribute(&span, "llm.completions.0.function_call.name"),
        Some(Value::from("get_weather"))
    );
    assert_eq!(
        attribute(&span, "llm.completions.0.function_call.arguments"),
        Some(Value::from("{\"city\":\"Paris\"}"))
    );
    assert_eq!(attribute(&span, "llm.usage.total_tokens"), Some(Value::I64(27)));
}

#[test]
fn test_tool_kind_defaults_to_function() {
    let request: ChatCompletionRequest = serde_json::from_value(json!({
        "model": "gpt-4o",
        "messages": [],
        "tools": [{"function": {"name": "lookup"}}]
    }))
    .unwrap();

    let tools = request.tools.unwrap();
    assert_eq!(tools[0].kind, "function");
    assert_eq!(tools[0].function.parameters, None);
}
