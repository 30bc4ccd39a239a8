//! A note sent through the real transport to a mock provider.

use std::path::Path;
use std::sync::Arc;

use mockito::Matcher;
use tempfile::TempDir;

use chat_core::{
    ApprovalClient, ApprovalDecision, ChatError, ExecuteOptions, Orchestrator, ProviderConfig,
    StaticCredentials, ToolOutcome, TransportClient,
};
use notechat_cli::{FileSurface, transcript, vault};

fn sse(chunks: &[serde_json::Value]) -> String {
    let mut body: String = chunks.iter().map(|c| format!("data: {c}\n\n")).collect();
    body.push_str("data: [DONE]\n\n");
    body
}

fn tool_call_stream() -> String {
    sse(&[
        serde_json::json!({"choices": [{"delta": {"tool_calls": [{
            "index": 0,
            "id": "call_1",
            "type": "function",
            "function": {"name": "read_note", "arguments": "{\"path\":\"todo.md\"}"}
        }]}}]}),
        serde_json::json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}),
    ])
}

fn text_stream(fragments: &[&str]) -> String {
    let mut chunks: Vec<serde_json::Value> = fragments
        .iter()
        .map(|f| serde_json::json!({"choices": [{"delta": {"content": f}}]}))
        .collect();
    chunks.push(serde_json::json!({"choices": [{"delta": {}, "finish_reason": "stop"}]}));
    sse(&chunks)
}

fn write_note(dir: &Path, server_url: &str, question: &str) -> std::path::PathBuf {
    let path = dir.join("note.md");
    std::fs::write(
        &path,
        format!("---\nmodel: openai@gpt-4o-mini\nurl: {server_url}\n---\n{question}\n"),
    )
    .unwrap();
    path
}

fn vault_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("todo.md"), "- renew passport\n").unwrap();
    dir
}

fn orchestrator(vault: &Path, gate: ApprovalClient) -> Orchestrator {
    Orchestrator::new(
        Arc::new(TransportClient::new()),
        Arc::new(StaticCredentials::new().with("openai", "sk-test")),
    )
    .with_tools(Arc::new(vault::registry(vault).unwrap()))
    .with_gate(Arc::new(gate))
}

#[tokio::test]
async fn approved_tool_call_round_trip() {
    let mut server = mockito::Server::new_async().await;
    let first = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer sk-test")
        .match_body(Matcher::Regex("\"tools\"".to_string()))
        .with_header("content-type", "text/event-stream")
        .with_body(tool_call_stream())
        .create_async()
        .await;
    let second = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::Regex("renew passport".to_string()))
        .with_header("content-type", "text/event-stream")
        .with_body(text_stream(&["You need to ", "renew your passport.\n"]))
        .create_async()
        .await;

    let vault = vault_dir();
    let notes = TempDir::new().unwrap();
    let path = write_note(notes.path(), &server.url(), "What is on my todo list?");

    let mut surface = FileSurface::open(&path).unwrap();
    let note = transcript::parse(&surface.text()).unwrap();
    let config = ProviderConfig::merged(&[&note.front_matter]);
    assert_eq!(config.base_url.as_deref(), Some(server.url().as_str()));

    let (client, mut requests) = ApprovalClient::new();
    let ui = tokio::spawn(async move {
        let message = requests.recv().await.unwrap();
        assert_eq!(message.request.tool_name, "read_note");
        assert_eq!(message.request.model, "openai@gpt-4o-mini");
        let arguments = message.request.arguments.clone();
        message
            .response_tx
            .send(ApprovalDecision::approve(arguments))
            .unwrap();
    });

    let orchestrator = orchestrator(vault.path(), client);
    let header = transcript::reply_header(&surface.text());
    surface.append(&header).unwrap();
    let outcome = orchestrator
        .execute(
            note.messages,
            &config,
            ExecuteOptions::new("note").with_surface(&mut surface),
        )
        .await;
    ui.await.unwrap();

    first.assert_async().await;
    second.assert_async().await;
    assert!(outcome.error.is_none(), "{:?}", outcome.error);
    assert_eq!(outcome.text, "You need to renew your passport.\n");
    assert!(matches!(
        &outcome.tool_results[0].outcome,
        ToolOutcome::Success(payload) if payload["path"] == "todo.md"
    ));

    let saved = std::fs::read_to_string(&path).unwrap();
    assert!(saved.ends_with("role::assistant\n\nYou need to renew your passport.\n"));
    let reparsed = transcript::parse(&saved).unwrap();
    assert_eq!(reparsed.messages.len(), 2);
    assert_eq!(
        reparsed.messages[1].content,
        "You need to renew your passport."
    );
}

#[tokio::test]
async fn closed_approval_ui_cancels_the_call_but_continues() {
    let mut server = mockito::Server::new_async().await;
    let first = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::Regex("\"tools\"".to_string()))
        .with_body(tool_call_stream())
        .create_async()
        .await;
    let second = server
        .mock("POST", "/chat/completions")
        .match_body(Matcher::Regex("cancelled by user".to_string()))
        .with_body(text_stream(&["Okay, I won't look.\n"]))
        .create_async()
        .await;

    let vault = vault_dir();
    let notes = TempDir::new().unwrap();
    let path = write_note(notes.path(), &server.url(), "Read my todo list");

    let mut surface = FileSurface::open(&path).unwrap();
    let note = transcript::parse(&surface.text()).unwrap();
    let config = ProviderConfig::merged(&[&note.front_matter]);

    let (client, requests) = ApprovalClient::new();
    drop(requests);

    let outcome = orchestrator(vault.path(), client)
        .execute(
            note.messages,
            &config,
            ExecuteOptions::new("note").with_surface(&mut surface),
        )
        .await;

    first.assert_async().await;
    second.assert_async().await;
    assert!(outcome.tool_results[0].is_failure());
    assert!(
        std::fs::read_to_string(&path)
            .unwrap()
            .ends_with("Okay, I won't look.\n")
    );
}

#[tokio::test]
async fn rejected_key_is_written_into_the_note() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .with_status(401)
        .with_body(r#"{"error": {"message": "Incorrect API key provided: sk-test"}}"#)
        .create_async()
        .await;

    let vault = vault_dir();
    let notes = TempDir::new().unwrap();
    let path = write_note(notes.path(), &server.url(), "Hello?");

    let mut surface = FileSurface::open(&path).unwrap();
    let note = transcript::parse(&surface.text()).unwrap();
    let config = ProviderConfig::merged(&[&note.front_matter]);
    let (client, _requests) = ApprovalClient::new();

    let outcome = orchestrator(vault.path(), client)
        .execute(
            note.messages,
            &config,
            ExecuteOptions::new("note").with_surface(&mut surface),
        )
        .await;

    mock.assert_async().await;
    assert!(matches!(
        outcome.error,
        Some(ChatError::AuthenticationFailed { status: 401, .. })
    ));
    let saved = std::fs::read_to_string(&path).unwrap();
    assert!(saved.contains("**Error:** authentication failed (401)"));
    assert!(saved.contains(&format!("Endpoint: {}/chat/completions", server.url())));
}
