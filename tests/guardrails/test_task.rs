use std::sync::Arc;

use opentelemetry::Value;
use traceguard_lib::models::chat::ChatCompletionResponse;
use traceguard_lib::pipelines::Task;
use traceguard_lib::providers::{BlockingInterceptor, Interceptor};

use super::helpers::*;

#[tokio::test]
async fn test_task_parents_interactions() {
    let harness = Harness::new(Some(Arc::new(MockGuardrailClient::allowing())), false);
    let openai = &harness.instrumentation.openai();
    let task = Task::new("answer_ticket")
        .with_metadata("team", "support")
        .with_parameter("ticket_id", 42);

    let response = harness
        .instrumentation
        .trace_task(task, move || async move {
            openai
                .intercept(create_test_chat_request("hi"), move |_req| async move {
                    Ok::<_, String>(ChatCompletionResponse::NonStream(create_test_chat_completion("hello")))
                })
                .await
        })
        .await;
    assert!(response.is_ok());

    let task = harness.span("answer_ticket");
    assert_eq!(
        attribute(&task, "task.decorated.function"),
        Some(Value::from("answer_ticket"))
    );
    assert_eq!(attribute(&task, "team"), Some(Value::from("support")));
    assert_eq!(attribute(&task, "ticket_id"), Some(Value::from("42")));

    let interaction = harness.span("interaction");
    assert_eq!(interaction.parent_span_id, span_id(&task));
    assert_eq!(
        interaction.span_context.trace_id(),
        task.span_context.trace_id()
    );
}

#[test]
fn test_blocking_task_returns_work_output() {
    let harness = Harness::new(None, false);
    let openai = harness.instrumentation.openai();

    let output = harness.instrumentation.trace_task_blocking(Task::new("summarize"), || {
        let response = openai.intercept_blocking(create_test_chat_request("hi"), |_req| {
            Ok::<_, String>(ChatCompletionResponse::NonStream(create_test_chat_completion("hello")))
        });
        response.map(|_| 7)
    });
    assert_eq!(output, Ok(7));

    let task = harness.span("summarize");
    assert_eq!(harness.span("interaction").parent_span_id, span_id(&task));
    assert_eq!(harness.spans().len(), 3);
}

#[test]
fn test_task_without_interactions_still_exports() {
    let harness = Harness::new(None, false);
    let value = harness
        .instrumentation
        .trace_task_blocking(Task::new("noop"), || "done");
    assert_eq!(value, "done");
    assert_eq!(harness.spans().len(), 1);
}
