use std::path::Path;

use tracing::{debug, warn};

use super::constants::{
    self, CURRENT_DATASET_ID, GUARDRAILS_API_KEY, GUARDRAILS_API_KEY_HEADER, GUARDRAILS_ENDPOINT,
    GUARDRAILS_BLOCKED_MESSAGE_OVERRIDE, GUARDRAILS_LOG_PROFILE, OTEL_SERVICE_NAME,
    TRACE_PROMPT_AND_RESPONSE, WHYLABS_API_KEY, WHYLABS_DEBUG_TRACE, WHYLABS_DEFAULT_DATASET_ID,
    WHYLABS_ENDPOINT, WHYLABS_TRACER_NAME,
};
use super::models::TelemetryConfig;
use super::validation::ConfigError;

/// Loads the config file (when one exists) and layers environment variables on top.
///
/// An unreadable or malformed file is logged and skipped; only the export
/// credentials checked later by `validate_export_config` are fatal.
pub fn load_config() -> Result<TelemetryConfig, ConfigError> {
    let base = match constants::default_config_path() {
        Some(path) if Path::new(&path).exists() => match load_config_file(&path) {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, "Ignoring guardrails config file, using environment only");
                TelemetryConfig::default()
            }
        },
        Some(path) => {
            debug!(path = %path, "No guardrails config file, using environment only");
            TelemetryConfig::default()
        }
        None => TelemetryConfig::default(),
    };
    Ok(apply_env_overrides(base))
}

pub fn load_config_from(path: &str) -> Result<TelemetryConfig, ConfigError> {
    load_config_file(path).map(apply_env_overrides)
}

fn load_config_file(path: &str) -> Result<TelemetryConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_string(),
        source,
    })?;
    let config: TelemetryConfig =
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Yaml {
            path: path.to_string(),
            source,
        })?;
    debug!(path = %path, "Loaded guardrails config file");
    Ok(config)
}

/// Environment variables win over file values.
pub fn apply_env_overrides(mut config: TelemetryConfig) -> TelemetryConfig {
    if let Some(endpoint) = constants::env_string(WHYLABS_ENDPOINT) {
        config.whylabs_endpoint = endpoint;
    }
    if let Some(key) = constants::env_string(WHYLABS_API_KEY) {
        config.whylabs_api_key = Some(key);
    }
    if let Some(dataset_id) = constants::env_string(WHYLABS_DEFAULT_DATASET_ID) {
        config.default_dataset_id = Some(dataset_id);
    }
    if let Some(service_name) = constants::env_string(OTEL_SERVICE_NAME) {
        config.service_name = Some(service_name);
    }
    if let Some(tracer_name) = constants::env_string(WHYLABS_TRACER_NAME) {
        config.tracer_name = Some(tracer_name);
    }
    if let Some(debug_export) = constants::env_flag(WHYLABS_DEBUG_TRACE) {
        config.debug_export = debug_export;
    }
    if let Some(trace_content) = constants::env_flag(TRACE_PROMPT_AND_RESPONSE) {
        config.trace_prompt_and_response = trace_content;
    }
    if let Some(message) = constants::env_string(GUARDRAILS_BLOCKED_MESSAGE_OVERRIDE) {
        config.blocked_message_override = Some(message);
    }

    let guardrails = &mut config.guardrails;
    if let Some(endpoint) = constants::env_string(GUARDRAILS_ENDPOINT) {
        guardrails.endpoint = Some(endpoint);
    }
    if let Some(key) = constants::env_string(GUARDRAILS_API_KEY) {
        guardrails.api_key = Some(key);
    }
    if let Some(header) = constants::env_string(GUARDRAILS_API_KEY_HEADER) {
        guardrails.api_key_header = header;
    }
    if let Some(log_profile) = constants::env_flag(GUARDRAILS_LOG_PROFILE) {
        guardrails.log_profile = log_profile;
    }
    if let Some(timeout) = constants::guardrails_api_timeout() {
        guardrails.timeout_secs = timeout.as_secs_f64();
    }
    if let Some(dataset_id) = constants::env_string(CURRENT_DATASET_ID) {
        guardrails.response_dataset_id = Some(dataset_id);
    }
    if guardrails.dataset_id.is_none() {
        guardrails.dataset_id = config.default_dataset_id.clone();
    }

    config
}
