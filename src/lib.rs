pub mod config;
pub mod guardrails;
pub mod instrument;
pub mod models;
pub mod pipelines;
pub mod providers;
pub mod semconv;
pub mod state;

pub use instrument::{InstrumentError, InstrumentOptions, instrument};
pub use providers::{BlockingInterceptor, Interceptor};
pub use pipelines::Task;
pub use state::Instrumentation;

pub use reqwest;
pub use serde_json;
