use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::executor::ToolHandler;
use crate::error::{ChatError, Result};
use crate::types::ToolDefinition;

/// Which tools are offered, and to which models.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    /// Tool names to offer; `None` offers every registered tool.
    pub enabled: Option<Vec<String>>,
    /// Model ids allowed to receive tools. Entries ending in `*` match by
    /// prefix. An empty list allows every model.
    pub models: Vec<String>,
}

impl ToolSettings {
    /// Whether `model` may receive tools.
    #[must_use]
    pub fn allows_model(&self, model: &str) -> bool {
        model_allowed(&self.models, model)
    }
}

/// Whether `model` passes the allow-list.
#[must_use]
pub fn model_allowed(allow_list: &[String], model: &str) -> bool {
    if allow_list.is_empty() {
        return true;
    }
    allow_list.iter().any(|pattern| match pattern.strip_suffix('*') {
        Some(prefix) => model.starts_with(prefix),
        None => pattern == model,
    })
}

struct Entry {
    definition: ToolDefinition,
    handler: Arc<dyn ToolHandler>,
}

/// Registered tools, keyed by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Entry>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Config`] if a tool with the same name exists.
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) -> Result<()> {
        let definition = handler.definition();
        if self.tools.contains_key(&definition.name) {
            return Err(ChatError::Config(format!(
                "tool '{}' is already registered",
                definition.name
            )));
        }
        tracing::debug!(tool = %definition.name, "registered tool");
        self.tools.insert(
            definition.name.clone(),
            Entry {
                definition,
                handler,
            },
        );
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).map(|entry| Arc::clone(&entry.handler))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Every registered definition, sorted by name.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|e| e.definition.clone()).collect()
    }

    /// Definitions enabled by `settings`.
    ///
    /// The model allow-list is checked separately with
    /// [`ToolSettings::allows_model`].
    #[must_use]
    pub fn enabled_definitions(&self, settings: &ToolSettings) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .filter(|entry| {
                settings
                    .enabled
                    .as_ref()
                    .is_none_or(|names| names.iter().any(|n| n == &entry.definition.name))
            })
            .map(|entry| entry.definition.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::tools::ToolContext;

    struct Named(&'static str);

    #[async_trait]
    impl ToolHandler for Named {
        fn definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: self.0.to_string(),
                description: format!("The {} tool", self.0),
                parameters: serde_json::json!({"type": "object"}),
            }
        }

        async fn execute(
            &self,
            _arguments: serde_json::Value,
            _context: &ToolContext,
        ) -> anyhow::Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Named("search_notes"))).unwrap();
        registry.register(Arc::new(Named("read_note"))).unwrap();
        registry
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = registry();
        let err = registry.register(Arc::new(Named("read_note"))).unwrap_err();
        assert!(matches!(err, ChatError::Config(msg) if msg.contains("read_note")));
    }

    #[test]
    fn allow_list_matches_exact_and_prefix() {
        let list = vec!["gpt-4o".to_string(), "claude-*".to_string()];
        assert!(model_allowed(&list, "gpt-4o"));
        assert!(!model_allowed(&list, "gpt-4o-mini"));
        assert!(model_allowed(&list, "claude-sonnet-4-20250514"));
        assert!(!model_allowed(&list, "llama3.2"));
        assert!(model_allowed(&[], "anything"));
    }

    #[test]
    fn enabled_subset_respects_settings() {
        let registry = registry();
        let all = registry.enabled_definitions(&ToolSettings::default());
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "read_note");

        let settings = ToolSettings {
            enabled: Some(vec!["search_notes".to_string()]),
            models: vec!["gpt-*".to_string()],
        };
        let some = registry.enabled_definitions(&settings);
        assert_eq!(some.len(), 1);
        assert_eq!(some[0].name, "search_notes");
        assert!(settings.allows_model("gpt-4o"));
        assert!(!settings.allows_model("llama3.2"));
    }

    #[test]
    fn lookup_by_name() {
        let registry = registry();
        assert!(registry.get("read_note").is_some());
        assert!(registry.get("write_note").is_none());
    }
}
