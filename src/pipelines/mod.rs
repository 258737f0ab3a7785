pub mod debug_exporter;
pub mod guard;
pub mod orchestrator;
pub mod otel;
pub mod span_scope;
pub mod stream;
pub mod task;

pub use orchestrator::{Interaction, InteractionOutcome, Invocation, Orchestrator};
pub use stream::{StreamAccumulator, TracedIter};
pub use task::Task;
