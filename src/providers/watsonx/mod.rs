pub mod instrumentor;
pub mod interaction;
pub mod models;

pub use instrumentor::WatsonxInstrumentor;
pub use interaction::{WatsonxInteraction, WatsonxStreamAccumulator};
pub use models::{GenerateOutput, GenerateRequest, GenerateResponse};

pub const VENDOR: &str = "watsonx";
