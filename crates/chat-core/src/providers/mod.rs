//! Built-in provider adapters.

pub mod anthropic;
pub mod ollama;
pub mod openai;

pub use anthropic::Anthropic;
pub use ollama::Ollama;
pub use openai::OpenAiCompatible;
