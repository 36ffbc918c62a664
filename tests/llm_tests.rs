//! Integration tests for the remote clients against a mock server

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shellpilot::agent::{
    CommandProposer, Intent, IntentClassifier, IntentSource, ProposalContext, RemoteProposer,
};
use shellpilot::llm::{ChatClient, ChatError, ChatMessage, CompletionOptions, ImageClient, ImageOptions};
use shellpilot::shell::{LaunchMode, SessionId, SessionStatus, ShellKind};
use shellpilot::{AgentConfig, ProposedAction};

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }]
    }))
}

fn status() -> SessionStatus {
    SessionStatus {
        id: SessionId::new(1, ShellKind::Bash),
        kind: ShellKind::Bash,
        working_dir: std::env::temp_dir(),
        mode: LaunchMode::Background,
        is_active: true,
        command_count: 0,
        created_at: chrono::Local::now(),
        last_command: None,
    }
}

#[tokio::test]
async fn test_complete_sends_request_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai"))
        .and(header("Authorization", "Bearer secret"))
        .and(query_param("token", "secret"))
        .and(body_partial_json(json!({
            "model": "openai",
            "max_tokens": 10,
            "messages": [{ "role": "user", "content": "hi" }]
        })))
        .respond_with(completion("  hello there  "))
        .expect(1)
        .mount(&server)
        .await;

    let client = ChatClient::new(server.uri(), Some("secret".to_string()));
    let options = CompletionOptions::new("openai", "chat").max_tokens(10);
    let reply = client
        .complete(&[ChatMessage::user("hi")], &options)
        .await
        .unwrap();

    assert_eq!(reply, "hello there");
}

#[tokio::test]
async fn test_complete_maps_http_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let client = ChatClient::new(server.uri(), None);
    let err = client
        .complete(&[ChatMessage::user("hi")], &CompletionOptions::new("openai", "chat"))
        .await
        .unwrap_err();

    assert!(matches!(err, ChatError::Status { status: 500, ref body } if body == "boom"));
}

#[tokio::test]
async fn test_complete_rejects_empty_choices() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let client = ChatClient::new(server.uri(), None);
    let err = client
        .complete(&[ChatMessage::user("hi")], &CompletionOptions::new("openai", "chat"))
        .await
        .unwrap_err();

    assert!(matches!(err, ChatError::EmptyResponse));
}

#[tokio::test]
async fn test_proposer_parses_command() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai"))
        .and(body_partial_json(json!({ "model": "openai-large", "max_tokens": 200 })))
        .respond_with(completion("```bash\nmkdir demo\n```"))
        .mount(&server)
        .await;

    let proposer = RemoteProposer::new(
        ChatClient::new(server.uri(), None),
        "openai-large",
        AgentConfig::default(),
    );
    let ctx = ProposalContext {
        task: "make a demo folder",
        session: status(),
        history: &[],
        last_output: "",
        step: 1,
        max_steps: 10,
    };

    let action = proposer.propose(&ctx, &[]).await;
    assert_eq!(action, ProposedAction::Command("mkdir demo".to_string()));
}

#[tokio::test]
async fn test_proposer_turns_failures_into_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let proposer = RemoteProposer::new(
        ChatClient::new(server.uri(), None),
        "openai-large",
        AgentConfig::default(),
    );
    let ctx = ProposalContext {
        task: "anything",
        session: status(),
        history: &[],
        last_output: "",
        step: 1,
        max_steps: 10,
    };

    match proposer.propose(&ctx, &[]).await {
        ProposedAction::Error { reason } => assert!(reason.contains("503")),
        other => panic!("expected error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_classifier_uses_model_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "max_tokens": 10 })))
        .respond_with(completion("task"))
        .mount(&server)
        .await;

    let classifier = IntentClassifier::new(ChatClient::new(server.uri(), None), "openai-large");
    // the keyword heuristic would say chat here
    let c = classifier.classify("tidy up please", &[]).await;
    assert_eq!(c.intent, Intent::Task);
    assert_eq!(c.source, IntentSource::Model);
}

#[tokio::test]
async fn test_image_is_saved() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/prompt/a%20red%20fox"))
        .and(query_param("model", "flux"))
        .and(query_param("width", "1024"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8, 0xFF]))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = ImageClient::new(format!("{}/prompt", server.uri()), None);
    let path = client
        .generate("a red fox", "flux", &ImageOptions::default(), dir.path())
        .await
        .unwrap();

    assert!(path.starts_with(dir.path()));
    assert_eq!(std::fs::read(&path).unwrap(), vec![0xFF, 0xD8, 0xFF]);
}
