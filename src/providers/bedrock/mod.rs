pub mod blocked;
pub mod instrumentor;
pub mod interaction;
pub mod models;

pub use instrumentor::BedrockInstrumentor;
pub use interaction::{BedrockInteraction, BedrockRequest, BedrockResponse};
pub use models::{BedrockVendor, ModelId};

pub const VENDOR: &str = "bedrock";
