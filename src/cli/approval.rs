//! Terminal approval prompt for tool calls.

use dialoguer::{Input, Select, theme::ColorfulTheme};
use tokio::sync::mpsc;

use chat_core::{ApprovalDecision, ApprovalMessage, ApprovalRequest};

/// What the user picked for a pending call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Choice {
    Approve,
    Edit,
    Cancel,
}

const CHOICES: [(Choice, &str); 3] = [
    (Choice::Approve, "Approve"),
    (Choice::Edit, "Edit arguments"),
    (Choice::Cancel, "Cancel"),
];

/// Answer approval requests until the channel closes.
///
/// Prompts block, so each one runs on the blocking pool.
pub async fn run(mut requests: mpsc::UnboundedReceiver<ApprovalMessage>) {
    while let Some(ApprovalMessage {
        request,
        response_tx,
    }) = requests.recv().await
    {
        let call_id = request.call_id.clone();
        let decision = tokio::task::spawn_blocking(move || prompt(&request))
            .await
            .unwrap_or_else(|error| {
                tracing::warn!(%call_id, %error, "approval prompt failed");
                ApprovalDecision::cancel()
            });

        if response_tx.send(decision).is_err() {
            tracing::debug!(%call_id, "request ended before the decision arrived");
        }
    }
}

fn prompt(request: &ApprovalRequest) -> ApprovalDecision {
    eprintln!();
    eprintln!("{}", describe(request));

    let theme = ColorfulTheme::default();
    let labels: Vec<&str> = CHOICES.iter().map(|(_, label)| *label).collect();
    let mut arguments = request.arguments.clone();

    loop {
        let selection = Select::with_theme(&theme)
            .with_prompt(format!("Run {}?", request.tool_name))
            .items(&labels)
            .default(0)
            .interact();

        let choice = match selection {
            Ok(index) => CHOICES[index].0,
            Err(error) => {
                tracing::warn!(%error, "approval prompt unavailable, cancelling call");
                Choice::Cancel
            }
        };

        match choice {
            Choice::Approve => return ApprovalDecision::approve(arguments),
            Choice::Cancel => return ApprovalDecision::cancel(),
            Choice::Edit => {
                let edited = Input::<String>::with_theme(&theme)
                    .with_prompt("Arguments (JSON)")
                    .with_initial_text(arguments.to_string())
                    .interact_text();
                match edited.map(|text| parse_arguments(&text)) {
                    Ok(Ok(value)) => arguments = value,
                    Ok(Err(message)) => eprintln!("{message}"),
                    Err(error) => {
                        tracing::warn!(%error, "could not read edited arguments");
                        return ApprovalDecision::cancel();
                    }
                }
            }
        }
    }
}

/// Summary shown above the prompt.
fn describe(request: &ApprovalRequest) -> String {
    let arguments = serde_json::to_string_pretty(&request.arguments)
        .unwrap_or_else(|_| request.arguments.to_string());
    format!(
        "{} wants to call `{}` (call {}) with:\n{arguments}",
        request.model, request.tool_name, request.call_id
    )
}

/// Edited arguments must be a JSON object.
fn parse_arguments(text: &str) -> Result<serde_json::Value, String> {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) if value.is_object() => Ok(value),
        Ok(_) => Err("arguments must be a JSON object".to_string()),
        Err(e) => Err(format!("invalid JSON: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ApprovalRequest {
        ApprovalRequest {
            call_id: "call_7".to_string(),
            tool_name: "read_note".to_string(),
            arguments: serde_json::json!({"path": "todo.md"}),
            model: "gpt-4o".to_string(),
        }
    }

    #[test]
    fn description_names_tool_and_call() {
        let text = describe(&request());
        assert!(text.starts_with("gpt-4o wants to call `read_note` (call call_7)"));
        assert!(text.contains("\"path\": \"todo.md\""));
    }

    #[test]
    fn edited_arguments_must_be_objects() {
        assert_eq!(
            parse_arguments(r#"{"path": "done.md"}"#),
            Ok(serde_json::json!({"path": "done.md"}))
        );
        assert!(parse_arguments("[1, 2]").unwrap_err().contains("object"));
        assert!(parse_arguments("{oops").unwrap_err().contains("invalid JSON"));
    }

    #[tokio::test]
    async fn closed_channel_ends_the_loop() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(tx);
        run(rx).await;
    }
}
