use chat_core::ProviderRegistry;
use dialoguer::{Password, Select, theme::ColorfulTheme};

use crate::keychain;

use super::LoginArgs;

/// Providers that take an API key, sorted.
#[must_use]
pub fn keyed_providers() -> Vec<String> {
    let registry = ProviderRegistry::with_defaults();
    registry
        .ids()
        .filter(|id| registry.get(id).is_some_and(|a| a.requires_credential()))
        .map(str::to_string)
        .collect()
}

fn validate_provider(provider: &str) -> anyhow::Result<()> {
    let known = keyed_providers();
    if !known.iter().any(|p| p == provider) {
        anyhow::bail!(
            "Unknown provider '{provider}'. Providers that take a key: {}",
            known.join(", ")
        );
    }
    Ok(())
}

pub fn auth_login(args: LoginArgs) -> anyhow::Result<()> {
    let provider = match args.provider {
        Some(p) => {
            validate_provider(&p)?;
            p
        }
        None => prompt_provider_selection(&keyed_providers())?,
    };

    let api_key = match args.api_key {
        Some(key) if !key.trim().is_empty() => key,
        Some(_) => anyhow::bail!("API key cannot be empty"),
        None => prompt_api_key(&provider)?,
    };

    keychain::store_api_key(&provider, api_key.trim())?;

    println!("Stored API key for '{provider}' in the system keychain");
    Ok(())
}

pub fn auth_logout(provider: &str) -> anyhow::Result<()> {
    validate_provider(provider)?;
    keychain::delete_api_key(provider)?;
    println!("Removed API key for '{provider}'");
    Ok(())
}

fn prompt_provider_selection(providers: &[String]) -> anyhow::Result<String> {
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select a provider")
        .items(providers)
        .default(0)
        .interact()?;

    Ok(providers[selection].clone())
}

fn prompt_api_key(provider: &str) -> anyhow::Result<String> {
    let api_key = Password::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Enter API key for {provider}"))
        .interact()?;

    if api_key.trim().is_empty() {
        anyhow::bail!("API key cannot be empty");
    }

    Ok(api_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyed_providers_exclude_local_ones() {
        let providers = keyed_providers();
        assert_eq!(providers, ["anthropic", "openai", "openrouter"]);
    }

    #[test]
    fn login_rejects_unknown_provider() {
        let args = LoginArgs {
            provider: Some("unknown_provider".to_string()),
            api_key: Some("sk-test".to_string()),
        };

        let err = auth_login(args).unwrap_err();
        assert!(err.to_string().contains("Unknown provider"));
        assert!(err.to_string().contains("openai"));
    }

    #[test]
    fn login_rejects_local_provider() {
        let args = LoginArgs {
            provider: Some("ollama".to_string()),
            api_key: Some("sk-test".to_string()),
        };
        assert!(auth_login(args).is_err());
    }

    #[test]
    fn login_rejects_blank_key() {
        let args = LoginArgs {
            provider: Some("openai".to_string()),
            api_key: Some("   ".to_string()),
        };
        let err = auth_login(args).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }
}
