use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use notechat_cli::{
    Config,
    cli::{AuthCommands, Cli, Commands, ConfigCommands},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Chat(args) => notechat_cli::cli::chat::run(args).await?,

        Commands::Models { provider } => notechat_cli::cli::models::run(provider).await?,

        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let config = Config::load()?;
                println!("{}", toml::to_string_pretty(&config)?);
            }
            ConfigCommands::Path => {
                let path = Config::config_path()?;
                println!("{}", path.display());
            }
        },

        Commands::Auth { command } => match command {
            AuthCommands::Login(args) => notechat_cli::cli::auth::auth_login(args)?,
            AuthCommands::Logout { provider } => notechat_cli::cli::auth::auth_logout(&provider)?,
        },
    }

    Ok(())
}
