// OpenAI-compatible client tests against a mock HTTP server
//
// Covers request payload shape, response mapping, bearer auth and error
// statuses.

use serde_json::{Value, json};
use std::time::Duration;
use toolrelay_core::catalogue;
use toolrelay_core::config::ModelConfig;
use toolrelay_core::model::{
    ModelBackend, ModelError, ModelRequest, ModelToolSpec, OpenAIClient, ToolChoice,
};
use toolrelay_core::tooling::ToolDescriptor;
use toolrelay_core::types::{ChatMessage, ToolCallRequest};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(endpoint: &str, api_key: Option<&str>) -> ModelConfig {
    ModelConfig {
        name: "test-model".into(),
        endpoint: endpoint.to_string(),
        api_path: "chat/completions".into(),
        api_key: api_key.map(str::to_string),
        timeout: Duration::from_secs(5),
    }
}

fn greeting_tool() -> Vec<ModelToolSpec> {
    catalogue::adapt(&[ToolDescriptor {
        name: "generate_welcome_message".into(),
        description: Some("Greeting".into()),
        input_schema: Some(json!({
            "type": "object",
            "properties": {"user_name": {"type": "string"}},
            "required": ["user_name"]
        })),
    }])
}

fn request(messages: Vec<ChatMessage>, tools: Vec<ModelToolSpec>, choice: ToolChoice) -> ModelRequest {
    ModelRequest {
        model: "test-model".into(),
        messages,
        tools,
        tool_choice: choice,
    }
}

fn text_reply(content: &str) -> Value {
    json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
}

#[tokio::test]
async fn sends_tools_with_auto_choice_and_maps_tool_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "tool_choice": "auto",
            "messages": [{"role": "user", "content": "Greet Chorn"}],
            "tools": [{"type": "function", "function": {"name": "generate_welcome_message"}}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "generate_welcome_message",
                            "arguments": "{\"user_name\": \"Chorn\", \"context\": \"login\"}"
                        }
                    }]
                }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAIClient::from_config("openai", &config(&format!("{}/v1", server.uri()), None))
        .expect("client");
    let response = client
        .complete(request(
            vec![ChatMessage::user("Greet Chorn")],
            greeting_tool(),
            ToolChoice::Auto,
        ))
        .await
        .expect("completion");

    assert!(response.content.is_none());
    assert_eq!(
        response.tool_calls,
        vec![ToolCallRequest::new(
            "call_1",
            "generate_welcome_message",
            "{\"user_name\": \"Chorn\", \"context\": \"login\"}"
        )]
    );
}

#[tokio::test]
async fn finalization_replays_tool_turn_with_choice_none() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("Welcome back!")))
        .mount(&server)
        .await;

    let client = OpenAIClient::from_config("openai", &config(&server.uri(), None)).expect("client");
    let call = ToolCallRequest::new("call_1", "generate_welcome_message", "{}");
    let messages = vec![
        ChatMessage::user("Greet Chorn"),
        ChatMessage::assistant(None, vec![call]),
        ChatMessage::tool("call_1", "Welcome back, Chorn!"),
    ];
    let response = client
        .complete(request(messages, greeting_tool(), ToolChoice::None))
        .await
        .expect("completion");
    assert_eq!(response.non_empty_text(), Some("Welcome back!"));

    let received = server.received_requests().await.expect("recording enabled");
    let body: Value = received[0].body_json().expect("json body");
    assert_eq!(body["tool_choice"], "none");
    assert_eq!(body["stream"], false);
    assert_eq!(body["messages"][1]["role"], "assistant");
    assert_eq!(body["messages"][1]["tool_calls"][0]["id"], "call_1");
    assert_eq!(body["messages"][1]["tool_calls"][0]["type"], "function");
    assert_eq!(body["messages"][2]["role"], "tool");
    assert_eq!(body["messages"][2]["tool_call_id"], "call_1");
}

#[tokio::test]
async fn empty_catalogue_omits_tools_and_choice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("hi")))
        .mount(&server)
        .await;

    let client = OpenAIClient::from_config("openai", &config(&server.uri(), None)).expect("client");
    client
        .complete(request(vec![ChatMessage::user("hi")], Vec::new(), ToolChoice::Auto))
        .await
        .expect("completion");

    let received = server.received_requests().await.expect("recording enabled");
    let body: Value = received[0].body_json().expect("json body");
    assert!(body.get("tools").is_none());
    assert!(body.get("tool_choice").is_none());
}

#[tokio::test]
async fn sends_bearer_token_from_named_env_var() {
    // SAFETY: the variable name is unique to this test.
    unsafe { std::env::set_var("TOOLRELAY_TEST_BEARER_KEY", "sk-test") };

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAIClient::from_config(
        "openrouter",
        &config(&server.uri(), Some("TOOLRELAY_TEST_BEARER_KEY")),
    )
    .expect("client");
    let response = client
        .complete(request(vec![ChatMessage::user("hi")], Vec::new(), ToolChoice::Auto))
        .await
        .expect("completion");
    assert_eq!(response.non_empty_text(), Some("ok"));
}

#[tokio::test]
async fn missing_api_key_fails_before_sending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_reply("unused")))
        .expect(0)
        .mount(&server)
        .await;

    let client = OpenAIClient::from_config(
        "openrouter",
        &config(&server.uri(), Some("TOOLRELAY_TEST_KEY_THAT_IS_NOT_SET")),
    )
    .expect("client");
    let err = client
        .complete(request(vec![ChatMessage::user("hi")], Vec::new(), ToolChoice::Auto))
        .await
        .expect_err("should fail");
    assert!(matches!(err, ModelError::MissingApiKey { .. }), "{err:?}");
}

#[tokio::test]
async fn rate_limit_status_is_reported_with_provider_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"message": "Rate limit exceeded: free-models-per-min"}
        })))
        .mount(&server)
        .await;

    let client = OpenAIClient::from_config("openrouter", &config(&server.uri(), None)).expect("client");
    let err = client
        .complete(request(vec![ChatMessage::user("hi")], Vec::new(), ToolChoice::Auto))
        .await
        .expect_err("should fail");

    assert!(err.is_rate_limited());
    match &err {
        ModelError::Status { message, .. } => {
            assert_eq!(message, "Rate limit exceeded: free-models-per-min")
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.user_message().contains("rate limiting"));
}

#[tokio::test]
async fn response_without_choices_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let client = OpenAIClient::from_config("openai", &config(&server.uri(), None)).expect("client");
    let err = client
        .complete(request(vec![ChatMessage::user("hi")], Vec::new(), ToolChoice::Auto))
        .await
        .expect_err("should fail");
    assert!(matches!(err, ModelError::InvalidResponse { .. }), "{err:?}");
}
