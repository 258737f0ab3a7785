pub mod content_id;
pub mod providers;
pub mod response_parser;
pub mod span_attributes;
pub mod types;
pub mod version_check;

pub use providers::{GuardrailClient, create_guardrail_client};
pub use types::{Action, EvaluationResult, GuardInput, GuardPhase, GuardrailError, ValidationFailure};
