//! The `chat` command: send a note, stream the reply back into it.

use std::sync::Arc;

use chat_core::{
    ApprovalClient, ApprovalGate, AutoApprove, ChatOutcome, ExecuteOptions, Orchestrator,
    ProviderConfig, ToolRegistry, TransportClient,
};

use crate::config::Config;
use crate::keychain::KeychainCredentials;
use crate::surface::FileSurface;
use crate::transcript::{self, Transcript};

use super::ChatArgs;

/// Orchestrator wired to the real transport and the user's credentials.
#[must_use]
pub fn orchestrator(config: &Config) -> Orchestrator {
    Orchestrator::new(
        Arc::new(TransportClient::new()),
        Arc::new(KeychainCredentials::from_config(config)),
    )
    .with_settings(config.orchestrator_settings())
}

/// Merge settings, note front matter, and command-line flags.
#[must_use]
pub fn request_config(
    config: &Config,
    note: &Transcript,
    args: &ChatArgs,
) -> ProviderConfig {
    let mut merged = ProviderConfig::merged(&[&config.chat, &note.front_matter]);
    if let Some(model) = &args.model {
        merged.model.clone_from(model);
    }
    if args.no_stream {
        merged.stream = false;
    }
    merged
}

pub async fn run(args: ChatArgs) -> anyhow::Result<()> {
    let config = Config::load()?;
    let mut surface = FileSurface::open(&args.file)?.with_echo(true);

    let note = transcript::parse(&surface.text())?;
    if !note.awaits_reply() {
        anyhow::bail!(
            "{} does not end with a user turn; write your message first",
            args.file.display()
        );
    }
    let request = request_config(&config, &note, &args);

    let tools = match args.vault.as_ref().or(config.tools.vault.as_ref()) {
        Some(vault) if !args.no_tools => crate::vault::registry(vault)?,
        _ => ToolRegistry::new(),
    };

    let mut approval_ui = None;
    let gate: Arc<dyn ApprovalGate> = if args.yes {
        Arc::new(AutoApprove)
    } else {
        let (client, requests) = ApprovalClient::new();
        approval_ui = Some(tokio::spawn(super::approval::run(requests)));
        Arc::new(client)
    };

    let orchestrator = Arc::new(
        orchestrator(&config)
            .with_tools(Arc::new(tools))
            .with_gate(gate),
    );
    let target = args.file.display().to_string();

    let header = transcript::reply_header(&surface.text());
    surface.append(&header)?;

    let ctrl_c = {
        let orchestrator = Arc::clone(&orchestrator);
        let target = target.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\ncancelling...");
                orchestrator.cancel(&target);
            }
        })
    };

    let outcome = orchestrator
        .execute(
            note.messages,
            &request,
            ExecuteOptions::new(target)
                .tools_enabled(!args.no_tools)
                .with_surface(&mut surface),
        )
        .await;

    ctrl_c.abort();
    if let Some(ui) = approval_ui {
        ui.abort();
    }

    let footer = transcript::next_turn_header(&surface.text());
    surface.append(&footer)?;
    println!();

    report(&outcome);
    match outcome.error {
        Some(error) => Err(error.into()),
        None => Ok(()),
    }
}

fn report(outcome: &ChatOutcome) {
    for result in &outcome.tool_results {
        tracing::info!(
            tool = %result.tool_name,
            call_id = %result.call_id,
            failed = result.is_failure(),
            "tool call finished"
        );
    }
    if outcome.aborted {
        eprintln!("request cancelled; partial reply kept");
    }
}
