//! API key storage in the OS keychain.

use std::collections::HashMap;

use keyring::Entry;

use chat_core::CredentialStore;

use crate::config::Config;

const SERVICE_NAME: &str = "notechat";

pub fn store_api_key(provider: &str, api_key: &str) -> anyhow::Result<()> {
    let entry = Entry::new(SERVICE_NAME, provider)?;
    entry.set_password(api_key)?;
    Ok(())
}

pub fn get_api_key(provider: &str) -> Option<String> {
    let entry = Entry::new(SERVICE_NAME, provider).ok()?;
    entry.get_password().ok()
}

pub fn delete_api_key(provider: &str) -> anyhow::Result<()> {
    let entry = Entry::new(SERVICE_NAME, provider)?;
    entry.delete_credential()?;
    Ok(())
}

/// Resolves keys from the configured environment variable, then the keychain.
#[derive(Debug, Clone, Default)]
pub struct KeychainCredentials {
    env_vars: HashMap<String, String>,
    use_keychain: bool,
}

impl KeychainCredentials {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let env_vars = config
            .providers
            .iter()
            .filter_map(|(id, p)| p.api_key_env.clone().map(|env| (id.clone(), env)))
            .collect();
        Self {
            env_vars,
            use_keychain: true,
        }
    }

    /// Only consult environment variables.
    #[must_use]
    pub const fn without_keychain(mut self) -> Self {
        self.use_keychain = false;
        self
    }
}

impl CredentialStore for KeychainCredentials {
    fn credential(&self, provider_id: &str) -> Option<String> {
        // Environment first: avoids keychain prompts for freshly built binaries
        if let Some(env_name) = self.env_vars.get(provider_id) {
            if let Ok(key) = std::env::var(env_name) {
                if !key.trim().is_empty() {
                    return Some(key);
                }
            }
        }

        if self.use_keychain {
            return get_api_key(provider_id);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSettings;

    #[test]
    fn test_keychain_roundtrip() {
        let test_provider = "notechat-test-provider";
        let test_key = "test-api-key-12345";

        let _ = delete_api_key(test_provider);

        if store_api_key(test_provider, test_key).is_err() {
            eprintln!("Keychain not available in test environment, skipping");
            return;
        }

        let retrieved = get_api_key(test_provider);
        if retrieved.is_none() {
            eprintln!("Keychain read failed (mock backend?), skipping");
            return;
        }

        assert_eq!(retrieved, Some(test_key.to_string()));

        delete_api_key(test_provider).expect("should delete key");
        assert_eq!(get_api_key(test_provider), None);
    }

    #[test]
    fn env_var_takes_precedence() {
        // HOME is set in every test environment
        let mut config = Config::default();
        config.providers.insert(
            "test-provider".to_string(),
            ProviderSettings {
                base_url: None,
                api_key_env: Some("HOME".to_string()),
            },
        );

        let credentials = KeychainCredentials::from_config(&config).without_keychain();
        assert_eq!(
            credentials.credential("test-provider"),
            std::env::var("HOME").ok()
        );
        assert_eq!(credentials.credential("ollama"), None);
    }
}
