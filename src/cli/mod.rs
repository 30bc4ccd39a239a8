//! CLI command parsing and execution.

pub mod approval;
pub mod auth;
pub mod chat;
pub mod models;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// notechat - chat with language models from inside a Markdown note.
#[derive(Parser)]
#[command(name = "notechat")]
#[command(about = "Chat with language models from inside a Markdown note")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send the note to the model and stream the reply into it.
    #[command(visible_alias = "c")]
    Chat(ChatArgs),

    /// List the models each provider offers.
    Models {
        /// Only list this provider.
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// Manage configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Manage provider API keys.
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Note holding the conversation.
    pub file: PathBuf,

    /// Model to use, optionally as `provider@model`.
    #[arg(short, long)]
    pub model: Option<String>,

    /// Wait for the whole reply instead of streaming it.
    #[arg(long)]
    pub no_stream: bool,

    /// Do not offer tools to the model.
    #[arg(long)]
    pub no_tools: bool,

    /// Approve every tool call without asking.
    #[arg(short, long)]
    pub yes: bool,

    /// Notes directory the vault tools read from.
    #[arg(long, env = "NOTECHAT_VAULT")]
    pub vault: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the current configuration.
    Show,

    /// Show the configuration file path.
    Path,
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Store an API key in the system keychain.
    Login(LoginArgs),

    /// Remove a stored API key.
    Logout {
        /// Provider id.
        provider: String,
    },
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Provider id; prompts when omitted.
    pub provider: Option<String>,

    /// API key; prompts when omitted.
    #[arg(long)]
    pub api_key: Option<String>,
}
