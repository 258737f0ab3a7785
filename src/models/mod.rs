//! OpenAI wire models shared by the OpenAI adapter.

pub mod chat;
pub mod completion;
pub mod content;
pub mod embeddings;
pub mod streaming;
pub mod tools;
pub mod usage;
