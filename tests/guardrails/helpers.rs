use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use opentelemetry::trace::SpanId;
use opentelemetry::{Context, Value};
use opentelemetry_sdk::export::trace::SpanData;
use opentelemetry_sdk::testing::trace::InMemorySpanExporter;
use opentelemetry_sdk::trace::TracerProvider;
use std::sync::Arc;
use traceguard_lib::Instrumentation;
use traceguard_lib::config::TraceSettings;
use traceguard_lib::guardrails::{Action, EvaluationResult, GuardInput, GuardPhase, GuardrailClient};
use traceguard_lib::models::chat::{ChatCompletion, ChatCompletionChoice, ChatCompletionRequest};
use traceguard_lib::models::content::ChatCompletionMessage;
use traceguard_lib::models::streaming::{ChatCompletionChunk, Choice, ChoiceDelta};
use traceguard_lib::models::usage::Usage;

// ---------------------------------------------------------------------------
// Evaluation builders
// ---------------------------------------------------------------------------

pub fn allow() -> EvaluationResult {
    EvaluationResult::default()
}

pub fn block(message: &str) -> EvaluationResult {
    EvaluationResult {
        action: Action::Block {
            block_message: Some(message.to_string()),
        },
        ..EvaluationResult::default()
    }
}

// ---------------------------------------------------------------------------
// Mock GuardrailClient
// ---------------------------------------------------------------------------

/// Answers every prompt and response evaluation with a fixed result and
/// remembers what it was asked.
#[derive(Default)]
pub struct MockGuardrailClient {
    pub prompt_result: Option<EvaluationResult>,
    pub response_result: Option<EvaluationResult>,
    pub calls: Mutex<Vec<(GuardPhase, String)>>,
}

impl MockGuardrailClient {
    pub fn new(prompt_result: Option<EvaluationResult>, response_result: Option<EvaluationResult>) -> Self {
        Self {
            prompt_result,
            response_result,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn allowing() -> Self {
        Self::new(Some(allow()), Some(allow()))
    }

    pub fn calls(&self) -> Vec<(GuardPhase, String)> {
        self.calls.lock().unwrap().clone()
    }

    fn answer(&self, input: GuardInput<'_>) -> Option<EvaluationResult> {
        let text = match input {
            GuardInput::Prompt(prompt) => prompt,
            GuardInput::Response { response, .. } => response,
            GuardInput::Chunk(chunk) => chunk,
        };
        self.calls
            .lock()
            .unwrap()
            .push((input.phase(), text.to_string()));
        match input.phase() {
            GuardPhase::Prompt => self.prompt_result.clone(),
            GuardPhase::Response => self.response_result.clone(),
        }
    }
}

#[async_trait]
impl GuardrailClient for MockGuardrailClient {
    async fn evaluate(&self, input: GuardInput<'_>, _cx: &Context) -> Option<EvaluationResult> {
        self.answer(input)
    }

    fn evaluate_blocking(&self, input: GuardInput<'_>, _cx: &Context) -> Option<EvaluationResult> {
        self.answer(input)
    }
}

// ---------------------------------------------------------------------------
// Tracing harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub instrumentation: Instrumentation,
    pub exporter: InMemorySpanExporter,
}

impl Harness {
    pub fn new(guardrails: Option<Arc<dyn GuardrailClient>>, trace_content: bool) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let exporter = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let settings = TraceSettings {
            trace_content,
            blocked_message_override: None,
        };
        Self {
            instrumentation: Instrumentation::with_provider(provider, guardrails, settings),
            exporter,
        }
    }

    pub fn spans(&self) -> Vec<SpanData> {
        self.exporter.get_finished_spans().unwrap()
    }

    pub fn span(&self, name: &str) -> SpanData {
        self.spans()
            .into_iter()
            .find(|span| span.name == name)
            .unwrap_or_else(|| panic!("no span named {name}"))
    }

    pub fn has_span(&self, name: &str) -> bool {
        self.spans().iter().any(|span| span.name == name)
    }
}

pub fn attribute(span: &SpanData, key: &str) -> Option<Value> {
    span.attributes
        .iter()
        .find(|kv| kv.key.as_str() == key)
        .map(|kv| kv.value.clone())
}

pub fn span_id(span: &SpanData) -> SpanId {
    span.span_context.span_id()
}

// ---------------------------------------------------------------------------
// Vendor call counter
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct CallCounter(AtomicUsize);

impl CallCounter {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Chat request/response builders
// ---------------------------------------------------------------------------

pub fn create_test_chat_request(user_message: &str) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: "gpt-4".to_string(),
        messages: vec![ChatCompletionMessage::new("user", user_message)],
        ..ChatCompletionRequest::default()
    }
}

pub fn create_test_chat_completion(response_text: &str) -> ChatCompletion {
    ChatCompletion {
        id: "chatcmpl-test".to_string(),
        object: Some("chat.completion".to_string()),
        created: Some(1234567890),
        model: "gpt-4".to_string(),
        choices: vec![ChatCompletionChoice {
            index: 0,
            message: ChatCompletionMessage::new("assistant", response_text),
            finish_reason: Some("stop".to_string()),
            logprobs: None,
        }],
        usage: Some(Usage {
            prompt_tokens: 4,
            completion_tokens: 6,
            total_tokens: 10,
        }),
        system_fingerprint: None,
    }
}

pub fn chunk(role: Option<&str>, content: Option<&str>, finish_reason: Option<&str>) -> ChatCompletionChunk {
    ChatCompletionChunk {
        id: "chatcmpl-stream".to_string(),
        choices: vec![Choice {
            delta: ChoiceDelta {
                content: content.map(str::to_string),
                role: role.map(str::to_string),
                tool_calls: None,
            },
            finish_reason: finish_reason.map(str::to_string),
            index: 0,
            logprobs: None,
        }],
        created: 1234567890,
        model: "gpt-4".to_string(),
        service_tier: None,
        system_fingerprint: None,
        usage: None,
    }
}

pub fn three_chunks() -> Vec<ChatCompletionChunk> {
    vec![
        chunk(Some("assistant"), None, None),
        chunk(None, Some("Hi"), None),
        chunk(None, Some(" there"), Some("stop")),
    ]
}
