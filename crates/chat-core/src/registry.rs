//! Provider registry and model resolution.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::provider::ProviderAdapter;
use crate::providers::{Anthropic, Ollama, OpenAiCompatible};

/// Separator between provider id and model id.
pub const PROVIDER_SEPARATOR: char = '@';

/// Adapter chosen for a model identifier.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub adapter: Arc<dyn ProviderAdapter>,
    /// Model id to send upstream.
    pub model: String,
}

/// Adapters keyed by provider id.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    adapters: BTreeMap<String, Arc<dyn ProviderAdapter>>,
    primary: String,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ProviderRegistry {
    /// An empty registry whose primary provider is `primary`.
    #[must_use]
    pub fn new(primary: Arc<dyn ProviderAdapter>) -> Self {
        let id = primary.id().to_string();
        let mut adapters = BTreeMap::new();
        adapters.insert(id.clone(), primary);
        Self {
            adapters,
            primary: id,
        }
    }

    /// Registry with every built-in adapter; `openai` is primary.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new(Arc::new(OpenAiCompatible::openai()));
        registry.register(Arc::new(OpenAiCompatible::openrouter()));
        registry.register(Arc::new(OpenAiCompatible::lmstudio()));
        registry.register(Arc::new(Anthropic));
        registry.register(Arc::new(Ollama));
        registry
    }

    /// Add or replace an adapter.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.id().to_string(), adapter);
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(id).cloned()
    }

    #[must_use]
    pub fn primary(&self) -> Arc<dyn ProviderAdapter> {
        // The primary id is inserted at construction and never removed.
        self.adapters
            .get(&self.primary)
            .cloned()
            .unwrap_or_else(|| Arc::new(OpenAiCompatible::openai()))
    }

    /// Registered provider ids, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }

    /// Resolve the adapter for a model identifier.
    ///
    /// `provider@model` selects `provider` and sends `model`. Without a prefix
    /// the primary provider is used. An unknown prefix also falls back to the
    /// primary provider, and the identifier is sent unchanged.
    #[must_use]
    pub fn resolve(&self, model_id: &str) -> Resolved {
        if let Some((prefix, model)) = model_id.split_once(PROVIDER_SEPARATOR) {
            if let Some(adapter) = self.get(prefix) {
                return Resolved {
                    adapter,
                    model: model.to_string(),
                };
            }
            tracing::warn!(prefix, model_id, "unknown provider prefix, using primary provider");
        }

        Resolved {
            adapter: self.primary(),
            model: model_id.to_string(),
        }
    }
}

/// Prefix a model id with its provider.
#[must_use]
pub fn qualified_model(provider: &str, model: &str) -> String {
    format!("{provider}{PROVIDER_SEPARATOR}{model}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_contain_every_family() {
        let registry = ProviderRegistry::with_defaults();
        let ids: Vec<_> = registry.ids().collect();
        assert_eq!(ids, vec!["anthropic", "lmstudio", "ollama", "openai", "openrouter"]);
    }

    #[test]
    fn prefix_selects_provider() {
        let registry = ProviderRegistry::with_defaults();
        let resolved = registry.resolve("ollama@llama3.2:latest");
        assert_eq!(resolved.adapter.id(), "ollama");
        assert_eq!(resolved.model, "llama3.2:latest");
    }

    #[test]
    fn bare_model_uses_primary() {
        let resolved = ProviderRegistry::with_defaults().resolve("gpt-4o");
        assert_eq!(resolved.adapter.id(), "openai");
        assert_eq!(resolved.model, "gpt-4o");
    }

    #[test]
    fn unknown_prefix_falls_back_to_primary() {
        let resolved = ProviderRegistry::with_defaults().resolve("mystery@model-x");
        assert_eq!(resolved.adapter.id(), "openai");
        assert_eq!(resolved.model, "mystery@model-x");
    }

    #[test]
    fn qualified_model_round_trips_through_resolve() {
        let id = qualified_model("anthropic", "claude-sonnet-4-20250514");
        let resolved = ProviderRegistry::with_defaults().resolve(&id);
        assert_eq!(resolved.adapter.id(), "anthropic");
        assert_eq!(resolved.model, "claude-sonnet-4-20250514");
    }
}
