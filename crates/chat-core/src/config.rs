//! Request configuration and layered merging.
//!
//! A request's [`ProviderConfig`] is built from built-in defaults, then the
//! stored settings layer, then per-document overrides. Later layers win.

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};

/// Model used when no layer names one.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Merged configuration for one request.
///
/// Immutable for the duration of a request, including its continuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Model identifier, optionally prefixed with `provider@`.
    pub model: String,
    /// Explicit endpoint override; `None` uses stored or default URLs.
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    /// Stream tokens into the document as they arrive.
    pub stream: bool,
    /// System-level instructions, joined in order.
    pub system_commands: Vec<String>,
    /// Document title, when the host knows one.
    pub title: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: None,
            temperature: 1.0,
            max_tokens: 4096,
            top_p: 1.0,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            stream: true,
            system_commands: Vec::new(),
            title: None,
        }
    }
}

/// One configuration layer; unset fields leave lower layers untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigLayer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(alias = "base_url", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_commands: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl ProviderConfig {
    /// Merge `layers` over the defaults, in order.
    #[must_use]
    pub fn merged(layers: &[&ConfigLayer]) -> Self {
        let mut config = Self::default();
        for layer in layers {
            config.apply(layer);
        }
        config
    }

    /// Apply one layer on top of this configuration.
    pub fn apply(&mut self, layer: &ConfigLayer) {
        if let Some(model) = &layer.model {
            self.model.clone_from(model);
        }
        if let Some(url) = &layer.url {
            self.base_url = Some(url.clone());
        }
        if let Some(v) = layer.temperature {
            self.temperature = v;
        }
        if let Some(v) = layer.max_tokens {
            self.max_tokens = v;
        }
        if let Some(v) = layer.top_p {
            self.top_p = v;
        }
        if let Some(v) = layer.presence_penalty {
            self.presence_penalty = v;
        }
        if let Some(v) = layer.frequency_penalty {
            self.frequency_penalty = v;
        }
        if let Some(v) = layer.stream {
            self.stream = v;
        }
        if let Some(commands) = &layer.system_commands {
            self.system_commands.clone_from(commands);
        }
        if let Some(title) = &layer.title {
            self.title = Some(title.clone());
        }
    }

    /// Joined system instructions, if any.
    #[must_use]
    pub fn system_instructions(&self) -> Option<String> {
        let joined = self
            .system_commands
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        (!joined.is_empty()).then_some(joined)
    }

    /// Check value ranges before any request is built.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Config`] naming the first out-of-range field.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(ChatError::Config("model must not be empty".to_string()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ChatError::Config(format!(
                "temperature must be between 0 and 2, got {}",
                self.temperature
            )));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(ChatError::Config(format!(
                "top_p must be between 0 and 1, got {}",
                self.top_p
            )));
        }
        if self.max_tokens == 0 {
            return Err(ChatError::Config("max_tokens must be positive".to_string()));
        }
        for (name, value) in [
            ("presence_penalty", self.presence_penalty),
            ("frequency_penalty", self.frequency_penalty),
        ] {
            if !(-2.0..=2.0).contains(&value) {
                return Err(ChatError::Config(format!(
                    "{name} must be between -2 and 2, got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_layers_win() {
        let settings = ConfigLayer {
            model: Some("anthropic@claude-sonnet-4-20250514".to_string()),
            temperature: Some(0.2),
            ..Default::default()
        };
        let document = ConfigLayer {
            temperature: Some(0.7),
            stream: Some(false),
            ..Default::default()
        };

        let config = ProviderConfig::merged(&[&settings, &document]);
        assert_eq!(config.model, "anthropic@claude-sonnet-4-20250514");
        assert!((config.temperature - 0.7).abs() < f32::EPSILON);
        assert!(!config.stream);
        assert_eq!(config.max_tokens, ProviderConfig::default().max_tokens);
    }

    #[test]
    fn system_instructions_skip_blanks() {
        let config = ProviderConfig {
            system_commands: vec!["Be brief.".to_string(), "  ".to_string(), "Use Markdown.".to_string()],
            ..Default::default()
        };
        assert_eq!(
            config.system_instructions().as_deref(),
            Some("Be brief.\n\nUse Markdown.")
        );
        assert!(ProviderConfig::default().system_instructions().is_none());
    }

    #[test]
    fn validate_rejects_out_of_range() {
        let config = ProviderConfig {
            temperature: 3.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ChatError::Config(msg)) if msg.contains("temperature")));

        let config = ProviderConfig {
            max_tokens: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(ProviderConfig::default().validate().is_ok());
    }

    #[test]
    fn layer_accepts_base_url_alias() {
        let layer: ConfigLayer =
            serde_json::from_str(r#"{"base_url": "http://localhost:11434"}"#).unwrap();
        assert_eq!(layer.url.as_deref(), Some("http://localhost:11434"));
    }
}
