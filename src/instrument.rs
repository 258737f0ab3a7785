use std::sync::Arc;

use opentelemetry::trace::TraceError;
use thiserror::Error;
use tracing::info;

use crate::config::validation::validate_export_config;
use crate::config::{ConfigError, TelemetryConfig, load_config};
use crate::guardrails::{GuardrailClient, GuardrailError, create_guardrail_client};
use crate::pipelines::otel::init_tracer_provider;
use crate::state::Instrumentation;

#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to build trace exporter: {0}")]
    Exporter(#[from] TraceError),
    #[error("failed to build guardrails client: {0}")]
    Guardrails(#[from] GuardrailError),
}

/// Inputs to [`instrument`]. Anything left unset comes from [`load_config`].
#[derive(Default)]
pub struct InstrumentOptions {
    pub config: Option<TelemetryConfig>,
    /// Takes precedence over `WHYLABS_DEFAULT_DATASET_ID`.
    pub dataset_id: Option<String>,
    /// Replaces the client built from the guardrails config.
    pub guardrail_client: Option<Arc<dyn GuardrailClient>>,
    pub application_name: Option<String>,
    /// Takes precedence over `WHYLABS_TRACER_NAME`.
    pub tracer_name: Option<String>,
    pub disable_batching: bool,
    /// Logs every exported span; `WHYLABS_DEBUG_TRACE` turns this on too.
    pub debug: bool,
}

impl InstrumentOptions {
    pub fn with_config(mut self, config: TelemetryConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_dataset_id(mut self, dataset_id: impl Into<String>) -> Self {
        self.dataset_id = Some(dataset_id.into());
        self
    }

    pub fn with_guardrail_client(mut self, client: Arc<dyn GuardrailClient>) -> Self {
        self.guardrail_client = Some(client);
        self
    }

    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    pub fn with_tracer_name(mut self, name: impl Into<String>) -> Self {
        self.tracer_name = Some(name.into());
        self
    }

    pub fn with_disable_batching(mut self, disable_batching: bool) -> Self {
        self.disable_batching = disable_batching;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    fn apply(&mut self, config: &mut TelemetryConfig) {
        if let Some(name) = self.application_name.take() {
            config.application_name = Some(name);
        }
        if let Some(name) = self.tracer_name.take() {
            config.tracer_name = Some(name);
        }
        config.disable_batching |= self.disable_batching;
        config.debug_export |= self.debug;
    }
}

/// Sets up span export and the guardrail client, and installs the tracer
/// provider globally.
///
/// Fails when the dataset id or the export API key is missing. Missing
/// guardrails settings only downgrade to tracing-only mode.
pub fn instrument(mut options: InstrumentOptions) -> Result<Instrumentation, InstrumentError> {
    let mut config = match options.config.take() {
        Some(config) => config,
        None => load_config()?,
    };
    options.apply(&mut config);
    let credentials = validate_export_config(&config, options.dataset_id.as_deref())?;

    let guardrails = match options.guardrail_client {
        Some(client) => Some(client),
        None => create_guardrail_client(&config.guardrails)?,
    };
    let provider = init_tracer_provider(&config, &credentials)?;

    info!(
        dataset_id = %credentials.dataset_id,
        service_name = config.service_name(),
        tracer_name = config.tracer_name(),
        guardrails = guardrails.is_some(),
        trace_content = config.trace_prompt_and_response,
        "Instrumentation ready"
    );
    Ok(Instrumentation::with_named_provider(
        provider,
        config.tracer_name().to_string(),
        guardrails,
        config.trace_settings(),
    ))
}
