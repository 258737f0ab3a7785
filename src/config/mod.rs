pub mod constants;
pub mod lib;
pub mod models;
pub mod validation;

pub use lib::{apply_env_overrides, load_config, load_config_from};
pub use models::{GuardrailConfig, TelemetryConfig, TraceSettings};
pub use validation::ConfigError;
