use thiserror::Error;

use super::models::TelemetryConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(
        "missing dataset id: pass one explicitly or set WHYLABS_DEFAULT_DATASET_ID"
    )]
    MissingDatasetId,
    #[error("missing API key: set WHYLABS_API_KEY")]
    MissingApiKey,
    #[error("invalid guardrails timeout: {0}")]
    InvalidTimeout(String),
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Credentials required before spans can be exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportCredentials {
    pub dataset_id: String,
    pub api_key: String,
}

/// Checks that tracing can be initialized. `dataset_id` takes precedence over
/// the configured default.
pub fn validate_export_config(
    config: &TelemetryConfig,
    dataset_id: Option<&str>,
) -> Result<ExportCredentials, ConfigError> {
    let dataset_id = dataset_id
        .filter(|id| !id.trim().is_empty())
        .map(str::to_string)
        .or_else(|| config.default_dataset_id.clone())
        .filter(|id| !id.trim().is_empty())
        .ok_or(ConfigError::MissingDatasetId)?;

    let api_key = config
        .whylabs_api_key
        .clone()
        .filter(|key| !key.trim().is_empty())
        .ok_or(ConfigError::MissingApiKey)?;

    if !(config.guardrails.timeout_secs.is_finite() && config.guardrails.timeout_secs > 0.0) {
        return Err(ConfigError::InvalidTimeout(
            config.guardrails.timeout_secs.to_string(),
        ));
    }

    Ok(ExportCredentials {
        dataset_id,
        api_key,
    })
}
