use std::env;
use std::time::Duration;

use tracing::warn;

pub const WHYLABS_ENDPOINT: &str = "WHYLABS_ENDPOINT";
pub const WHYLABS_API_KEY: &str = "WHYLABS_API_KEY";
pub const WHYLABS_DEFAULT_DATASET_ID: &str = "WHYLABS_DEFAULT_DATASET_ID";
pub const WHYLABS_GUARDRAILS_CONFIG: &str = "WHYLABS_GUARDRAILS_CONFIG";
pub const GUARDRAILS_ENDPOINT: &str = "GUARDRAILS_ENDPOINT";
pub const GUARDRAILS_API_KEY: &str = "GUARDRAILS_API_KEY";
pub const GUARDRAILS_API_KEY_HEADER: &str = "GUARDRAILS_API_KEY_HEADER";
pub const GUARDRAILS_LOG_PROFILE: &str = "GUARDRAILS_LOG_PROFILE";
pub const GUARDRAILS_API_TIMEOUT: &str = "GUARDRAILS_API_TIMEOUT";
pub const CURRENT_DATASET_ID: &str = "CURRENT_DATASET_ID";
pub const TRACE_PROMPT_AND_RESPONSE: &str = "TRACE_PROMPT_AND_RESPONSE";
pub const GUARDRAILS_BLOCKED_MESSAGE_OVERRIDE: &str = "GUARDRAILS_BLOCKED_MESSAGE_OVERRIDE";
pub const OTEL_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";
pub const WHYLABS_TRACER_NAME: &str = "WHYLABS_TRACER_NAME";
pub const WHYLABS_DEBUG_TRACE: &str = "WHYLABS_DEBUG_TRACE";

pub const DEFAULT_WHYLABS_ENDPOINT: &str = "https://api.whylabsapp.com";
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";
pub const DEFAULT_SERVICE_NAME: &str = "unknown-llm-app";
pub const DEFAULT_TRACER_NAME: &str = "traceguard";
pub const DEFAULT_GUARDRAILS_TIMEOUT_SECS: f64 = 15.0;
pub const DEFAULT_CONFIG_RELATIVE_PATH: &str = ".whylabs/guardrails-config.yaml";

/// Non-empty value of an environment variable.
pub fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

pub fn env_flag(name: &str) -> Option<bool> {
    let value = env_string(name)?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            warn!(variable = name, value = other, "Ignoring unrecognized boolean value");
            None
        }
    }
}

/// Guardrails request timeout from `GUARDRAILS_API_TIMEOUT`, in (fractional) seconds.
pub fn guardrails_api_timeout() -> Option<Duration> {
    let raw = env_string(GUARDRAILS_API_TIMEOUT)?;
    match parse_timeout_secs(&raw) {
        Some(timeout) => Some(timeout),
        None => {
            warn!(
                value = %raw,
                default_secs = DEFAULT_GUARDRAILS_TIMEOUT_SECS,
                "Invalid GUARDRAILS_API_TIMEOUT, using default"
            );
            None
        }
    }
}

pub fn parse_timeout_secs(raw: &str) -> Option<Duration> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(Duration::from_secs_f64)
}

pub fn default_config_path() -> Option<String> {
    if let Some(path) = env_string(WHYLABS_GUARDRAILS_CONFIG) {
        return Some(path);
    }
    dirs::home_dir().map(|home| home.join(DEFAULT_CONFIG_RELATIVE_PATH).to_string_lossy().into_owned())
}
