//! Tools that read from a directory of notes.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use regex::RegexBuilder;
use serde::Deserialize;
use serde_json::json;

use chat_core::{ToolContext, ToolDefinition, ToolHandler, ToolRegistry};

/// Longest note body returned to the model.
const MAX_NOTE_CHARS: usize = 20_000;
const DEFAULT_SEARCH_LIMIT: usize = 20;
const NOTE_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// Registry holding both vault tools rooted at `root`.
///
/// # Errors
///
/// Returns an error if `root` is not a directory.
pub fn registry(root: &Path) -> anyhow::Result<ToolRegistry> {
    let root = root
        .canonicalize()
        .with_context(|| format!("vault directory {} not found", root.display()))?;
    anyhow::ensure!(root.is_dir(), "vault {} is not a directory", root.display());

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ReadNote { root: root.clone() }))?;
    registry.register(Arc::new(SearchNotes { root }))?;
    Ok(registry)
}

/// Resolve `relative` inside `root`, refusing anything that escapes it.
///
/// `root` must already be canonical. Symlinks are followed before the
/// containment check.
fn resolve(root: &Path, relative: &str) -> anyhow::Result<PathBuf> {
    let relative = Path::new(relative.trim());
    anyhow::ensure!(
        relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir)),
        "path must be relative to the vault and must not contain '..'"
    );
    let resolved = root
        .join(relative)
        .canonicalize()
        .with_context(|| format!("cannot read {}", relative.display()))?;
    anyhow::ensure!(
        resolved.starts_with(root),
        "{} points outside the vault",
        relative.display()
    );
    Ok(resolved)
}

fn is_note(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| NOTE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
}

/// Reads one note.
#[derive(Debug)]
pub struct ReadNote {
    root: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ReadNoteArgs {
    path: String,
}

#[async_trait]
impl ToolHandler for ReadNote {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "read_note".to_string(),
            description: "Read a note from the user's vault by its relative path.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path relative to the vault root, e.g. projects/todo.md"
                    }
                },
                "required": ["path"]
            }),
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> anyhow::Result<serde_json::Value> {
        let args: ReadNoteArgs =
            serde_json::from_value(arguments).context("expected {\"path\": string}")?;
        let path = resolve(&self.root, &args.path)?;
        tracing::debug!(call_id = %context.call_id, path = %path.display(), "reading note");

        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("cannot read {}", args.path))?;
        let truncated = content.chars().count() > MAX_NOTE_CHARS;
        let content: String = content.chars().take(MAX_NOTE_CHARS).collect();

        Ok(json!({
            "path": args.path,
            "content": content,
            "truncated": truncated,
        }))
    }
}

/// Searches note contents with a case-insensitive pattern.
#[derive(Debug)]
pub struct SearchNotes {
    root: PathBuf,
}

#[derive(Debug, Deserialize)]
struct SearchNotesArgs {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
}

#[async_trait]
impl ToolHandler for SearchNotes {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "search_notes".to_string(),
            description: "Search the user's notes for lines matching a query. \
                          The query is a case-insensitive regular expression."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Text or regex to look for"},
                    "limit": {"type": "integer", "description": "Maximum matches to return"}
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> anyhow::Result<serde_json::Value> {
        let args: SearchNotesArgs =
            serde_json::from_value(arguments).context("expected {\"query\": string}")?;
        anyhow::ensure!(!args.query.trim().is_empty(), "query must not be empty");

        let pattern = RegexBuilder::new(&args.query)
            .case_insensitive(true)
            .build()
            .or_else(|_| {
                RegexBuilder::new(&regex::escape(&args.query))
                    .case_insensitive(true)
                    .build()
            })?;
        let limit = args.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).max(1);
        let root = self.root.clone();
        let cancel = context.cancel.clone();

        let matches = tokio::task::spawn_blocking(move || {
            let mut matches = Vec::new();
            let walker = ignore::WalkBuilder::new(&root)
                .hidden(true)
                .git_ignore(true)
                .standard_filters(true)
                .build();

            for entry in walker.flatten() {
                if cancel.is_cancelled() || matches.len() >= limit {
                    break;
                }
                let path = entry.path();
                if !path.is_file() || !is_note(path) {
                    continue;
                }
                let Ok(content) = std::fs::read_to_string(path) else {
                    continue;
                };
                let relative = path.strip_prefix(&root).unwrap_or(path);
                for (number, line) in content.lines().enumerate() {
                    if pattern.is_match(line) {
                        matches.push(json!({
                            "path": relative.display().to_string(),
                            "line": number + 1,
                            "text": line.trim(),
                        }));
                        if matches.len() >= limit {
                            break;
                        }
                    }
                }
            }
            matches
        })
        .await?;

        tracing::debug!(call_id = %context.call_id, count = matches.len(), "searched notes");
        Ok(json!({ "query": args.query, "matches": matches }))
    }
}
