pub mod chat;
pub mod completion;
pub mod embeddings;
pub mod instrumentor;
pub mod spans;

pub use chat::{ChatInteraction, ChatStreamAccumulator};
pub use completion::{CompletionInteraction, CompletionStreamAccumulator};
pub use embeddings::EmbeddingsInteraction;
pub use instrumentor::OpenAIInstrumentor;

pub const VENDOR: &str = "openai";
