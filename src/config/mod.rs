//! Configuration management for notechat.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use chat_core::flush::{DEFAULT_FLUSH_INTERVAL, DEFAULT_MAX_BUFFER_BYTES};
use chat_core::{ApprovalPolicy, ConfigLayer, FlushSettings, OrchestratorSettings, ToolSettings};

/// Per-provider settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Endpoint override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Environment variable checked for the API key before the keychain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

/// Tool offering and approval.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Tool names to offer; unset offers all of them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<Vec<String>>,

    /// Models allowed to receive tools (`*` suffix matches by prefix).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,

    /// Notes directory the vault tools read from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vault: Option<PathBuf>,

    /// Approval presets.
    pub approval: ApprovalPolicy,
}

/// Streaming cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Milliseconds between flushes.
    pub flush_interval_ms: u64,

    /// Pending bytes that force an immediate flush.
    pub max_buffer_bytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: u64::try_from(DEFAULT_FLUSH_INTERVAL.as_millis()).unwrap_or(50),
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Request defaults; the note's front matter overrides them.
    pub chat: ConfigLayer,

    /// Provider definitions keyed by id.
    #[serde(default = "Config::default_providers")]
    pub providers: BTreeMap<String, ProviderSettings>,

    pub tools: ToolsConfig,

    pub stream: StreamConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chat: ConfigLayer::default(),
            providers: Self::default_providers(),
            tools: ToolsConfig::default(),
            stream: StreamConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// Loads global config first, then merges project-local config if present.
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file cannot be read or parsed.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;

        if let Ok(project_path) = Self::project_config_path() {
            if project_path.exists() {
                let contents = std::fs::read_to_string(&project_path)?;
                let project: Self = toml::from_str(&contents)?;
                tracing::debug!(path = %project_path.display(), "merging project config");
                config.merge(project);
            }
        }

        Ok(config)
    }

    /// Load one file, or defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))
    }

    /// Get the project-local configuration file path.
    ///
    /// Looks for `.notechat/config.toml` in the current directory.
    pub fn project_config_path() -> anyhow::Result<PathBuf> {
        let cwd = std::env::current_dir()?;
        Ok(cwd.join(".notechat").join("config.toml"))
    }

    /// Merge another config into this one (project overrides global).
    pub fn merge(&mut self, other: Self) {
        overlay(&mut self.chat, other.chat);

        for (id, settings) in other.providers {
            if Self::default_providers().get(&id) != Some(&settings) {
                self.providers.insert(id, settings);
            }
        }

        if other.tools.enabled.is_some() {
            self.tools.enabled = other.tools.enabled;
        }
        if !other.tools.models.is_empty() {
            self.tools.models = other.tools.models;
        }
        if other.tools.vault.is_some() {
            self.tools.vault = other.tools.vault;
        }
        if other.tools.approval.default != ApprovalPolicy::default().default {
            self.tools.approval.default = other.tools.approval.default;
        }
        self.tools.approval.tools.extend(other.tools.approval.tools);

        let default_stream = StreamConfig::default();
        if other.stream.flush_interval_ms != default_stream.flush_interval_ms {
            self.stream.flush_interval_ms = other.stream.flush_interval_ms;
        }
        if other.stream.max_buffer_bytes != default_stream.max_buffer_bytes {
            self.stream.max_buffer_bytes = other.stream.max_buffer_bytes;
        }
    }

    /// Get the configuration file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined.
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Get the config directory path (`~/.config/notechat/`).
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined.
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
            return Ok(PathBuf::from(xdg_config_home).join("notechat"));
        }

        if cfg!(target_os = "macos") {
            if let Ok(home) = std::env::var("HOME") {
                return Ok(PathBuf::from(home).join(".config").join("notechat"));
            }
        }

        let base = directories::BaseDirs::new()
            .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?;

        Ok(base.config_dir().join("notechat"))
    }

    /// Settings handed to the orchestrator.
    #[must_use]
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        let base_urls: HashMap<String, String> = self
            .providers
            .iter()
            .filter_map(|(id, p)| p.base_url.clone().map(|url| (id.clone(), url)))
            .collect();

        OrchestratorSettings {
            base_urls,
            flush: FlushSettings {
                interval: Duration::from_millis(self.stream.flush_interval_ms.max(1)),
                max_buffer_bytes: self.stream.max_buffer_bytes,
            },
            tools: ToolSettings {
                enabled: self.tools.enabled.clone(),
                models: self.tools.models.clone(),
            },
            approval: self.tools.approval.clone(),
        }
    }

    /// Environment variable holding the key for `provider`, if any.
    #[must_use]
    pub fn api_key_env(&self, provider: &str) -> Option<&str> {
        self.providers
            .get(provider)
            .and_then(|p| p.api_key_env.as_deref())
    }

    /// Save a provider entry to the config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save_provider(name: &str, settings: &ProviderSettings) -> anyhow::Result<()> {
        Self::save_provider_to_path(name, settings, &Self::config_path()?)
    }

    /// Save a provider entry, keeping everything else in the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or written.
    pub fn save_provider_to_path(
        name: &str,
        settings: &ProviderSettings,
        path: &Path,
    ) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut config_value = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<toml::Value>(&contents)?
        } else {
            toml::Value::Table(toml::map::Map::new())
        };

        let config_table = config_value
            .as_table_mut()
            .ok_or_else(|| anyhow::anyhow!("config root must be a table"))?;

        let providers_table = config_table
            .entry("providers")
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()))
            .as_table_mut()
            .ok_or_else(|| anyhow::anyhow!("providers section must be a table"))?;

        providers_table.insert(name.to_string(), toml::Value::try_from(settings)?);

        std::fs::write(path, toml::to_string_pretty(&config_value)?)?;
        Ok(())
    }

    fn default_providers() -> BTreeMap<String, ProviderSettings> {
        let keyed = |env: &str| ProviderSettings {
            base_url: None,
            api_key_env: Some(env.to_string()),
        };

        let mut providers = BTreeMap::new();
        providers.insert("openai".to_string(), keyed("OPENAI_API_KEY"));
        providers.insert("openrouter".to_string(), keyed("OPENROUTER_API_KEY"));
        providers.insert("anthropic".to_string(), keyed("ANTHROPIC_API_KEY"));
        providers.insert("lmstudio".to_string(), ProviderSettings::default());
        providers.insert("ollama".to_string(), ProviderSettings::default());
        providers
    }
}

/// Apply the set fields of `top` onto `base`.
fn overlay(base: &mut ConfigLayer, top: ConfigLayer) {
    let ConfigLayer {
        model,
        url,
        temperature,
        max_tokens,
        top_p,
        presence_penalty,
        frequency_penalty,
        stream,
        system_commands,
        title,
    } = top;

    base.model = model.or(base.model.take());
    base.url = url.or(base.url.take());
    base.temperature = temperature.or(base.temperature);
    base.max_tokens = max_tokens.or(base.max_tokens);
    base.top_p = top_p.or(base.top_p);
    base.presence_penalty = presence_penalty.or(base.presence_penalty);
    base.frequency_penalty = frequency_penalty.or(base.frequency_penalty);
    base.stream = stream.or(base.stream);
    base.system_commands = system_commands.or(base.system_commands.take());
    base.title = title.or(base.title.take());
}
