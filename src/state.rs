use std::future::Future;
use std::sync::Arc;

use opentelemetry::Context;
use opentelemetry::global::{self, BoxedTracer};
use opentelemetry::trace::{FutureExt, TraceError, TracerProvider as _};
use opentelemetry_sdk::trace::TracerProvider;
use tracing::{debug, warn};

use crate::config::TraceSettings;
use crate::config::constants::DEFAULT_TRACER_NAME;
use crate::guardrails::GuardrailClient;
use crate::pipelines::{Orchestrator, Task};

/// Everything an interaction needs: tracer, optional guardrail client and
/// the immutable per-call settings. Built once by [`crate::instrument`] and
/// cloned into every adapter.
#[derive(Clone)]
pub struct Instrumentation {
    tracer: Arc<BoxedTracer>,
    guardrails: Option<Arc<dyn GuardrailClient>>,
    settings: Arc<TraceSettings>,
    provider: Option<TracerProvider>,
}

impl Instrumentation {
    /// Uses the globally installed tracer provider.
    pub fn new(guardrails: Option<Arc<dyn GuardrailClient>>, settings: TraceSettings) -> Self {
        Self {
            tracer: Arc::new(global::tracer(DEFAULT_TRACER_NAME)),
            guardrails,
            settings: Arc::new(settings),
            provider: None,
        }
    }

    /// Binds to `provider` without touching the global one.
    pub fn with_provider(
        provider: TracerProvider,
        guardrails: Option<Arc<dyn GuardrailClient>>,
        settings: TraceSettings,
    ) -> Self {
        Self::with_named_provider(provider, DEFAULT_TRACER_NAME, guardrails, settings)
    }

    pub fn with_named_provider(
        provider: TracerProvider,
        tracer_name: impl Into<std::borrow::Cow<'static, str>>,
        guardrails: Option<Arc<dyn GuardrailClient>>,
        settings: TraceSettings,
    ) -> Self {
        let tracer = BoxedTracer::new(Box::new(provider.tracer(tracer_name)));
        Self {
            tracer: Arc::new(tracer),
            guardrails,
            settings: Arc::new(settings),
            provider: Some(provider),
        }
    }

    pub fn tracer(&self) -> &Arc<BoxedTracer> {
        &self.tracer
    }

    pub fn settings(&self) -> &Arc<TraceSettings> {
        &self.settings
    }

    pub fn guardrails_enabled(&self) -> bool {
        self.guardrails.is_some()
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.tracer.clone(), self.guardrails.clone())
    }

    #[cfg(feature = "openai")]
    pub fn openai(&self) -> crate::providers::openai::OpenAIInstrumentor {
        crate::providers::openai::OpenAIInstrumentor::new(self.orchestrator(), self.settings.clone())
    }

    #[cfg(feature = "bedrock")]
    pub fn bedrock(&self) -> crate::providers::bedrock::BedrockInstrumentor {
        crate::providers::bedrock::BedrockInstrumentor::new(self.orchestrator(), self.settings.clone())
    }

    #[cfg(feature = "watsonx")]
    pub fn watsonx(&self) -> crate::providers::watsonx::WatsonxInstrumentor {
        crate::providers::watsonx::WatsonxInstrumentor::new(self.orchestrator(), self.settings.clone())
    }

    /// Runs `work` inside a task span. Interactions it starts become children
    /// of the task.
    pub async fn trace_task<F, Fut, T>(&self, task: Task, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let scope = task.start(&self.tracer, &Context::current());
        let output = work().with_context(scope.context().clone()).await;
        scope.end();
        output
    }

    pub fn trace_task_blocking<F, T>(&self, task: Task, work: F) -> T
    where
        F: FnOnce() -> T,
    {
        let scope = task.start(&self.tracer, &Context::current());
        let output = {
            let _attached = scope.context().clone().attach();
            work()
        };
        scope.end();
        output
    }

    /// Flushes pending spans and shuts the owned provider down. A no-op when
    /// the context was built on the global provider.
    pub fn shutdown(&self) -> Result<(), TraceError> {
        let Some(provider) = &self.provider else {
            debug!("No owned tracer provider to shut down");
            return Ok(());
        };
        for result in provider.force_flush() {
            if let Err(err) = result {
                warn!(error = %err, "Failed to flush spans");
            }
        }
        provider.shutdown()
    }
}

impl std::fmt::Debug for Instrumentation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrumentation")
            .field("guardrails", &self.guardrails.is_some())
            .field("settings", &self.settings)
            .field("owns_provider", &self.provider.is_some())
            .finish()
    }
}
