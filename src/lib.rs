//! notechat - chat with language models from inside a Markdown note.
//!
//! The note is the conversation. Each run reads the transcript, sends it to
//! the configured model through [`chat_core`], and streams the reply back
//! into the file.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌─────────────┐
//! │     CLI     │──▶│  chat-core   │──▶│  providers  │
//! └──────┬──────┘   └──────┬───────┘   └─────────────┘
//!        │                 │
//!  transcript,       FileSurface, vault tools,
//!  config, keychain  terminal approval
//! ```

pub mod cli;
pub mod config;
pub mod keychain;
pub mod surface;
pub mod transcript;
pub mod vault;

pub use config::Config;
pub use surface::FileSurface;
pub use transcript::Transcript;
