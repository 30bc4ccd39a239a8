//! The `models` command.

use chat_core::registry::qualified_model;

use crate::config::Config;

pub async fn run(provider: Option<String>) -> anyhow::Result<()> {
    let config = Config::load()?;
    let orchestrator = super::chat::orchestrator(&config);

    let models = match provider {
        Some(id) => orchestrator
            .list_models(&id)
            .await?
            .iter()
            .map(|m| qualified_model(&id, m))
            .collect(),
        None => orchestrator.list_all_models().await,
    };

    if models.is_empty() {
        eprintln!("no models found; check `notechat auth login` or that local servers are running");
    }
    for model in models {
        println!("{model}");
    }
    Ok(())
}
