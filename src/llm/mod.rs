pub mod openai;
pub mod provider;
pub mod types;

pub use openai::OpenAiProvider;
pub use provider::{ChatModel, Embedder};
pub use types::{ChatMessage, ChatRequest, ChatRole};
