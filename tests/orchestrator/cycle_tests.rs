// Query cycle tests - scripted backend and tool session doubles
//
// Each test scripts the model replies and the peer's tool results, then checks
// the outcome, the requests sent to the backend, and the session lifecycle.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use toolrelay_core::agent::{CycleError, CycleOutcome, ErrorKind, Orchestrator};
use toolrelay_core::model::{ModelBackend, ModelError, ModelRequest, ModelResponse, ToolChoice};
use toolrelay_core::tooling::{SessionConnector, ToolDescriptor, ToolSession, TransportError};
use toolrelay_core::types::{MessageRole, ToolCallRequest};

const GREETING: &str = "Welcome back, Chorn! Ready to dive into your MCP dashboard?";

/// Ordered record of everything the doubles observed.
#[derive(Default)]
struct Journal {
    events: Mutex<Vec<String>>,
}

impl Journal {
    fn push(&self, event: impl Into<String>) {
        self.events.lock().expect("journal").push(event.into());
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().expect("journal").clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.events()
            .iter()
            .filter(|event| event.starts_with(prefix))
            .count()
    }
}

struct ScriptedBackend {
    journal: Arc<Journal>,
    replies: Mutex<VecDeque<Result<ModelResponse, ModelError>>>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        self.journal
            .push(format!("complete:{:?}", request.tool_choice));
        self.requests.lock().expect("requests").push(request);
        self.replies
            .lock()
            .expect("replies")
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::invalid_response("scripted", "script exhausted")))
    }
}

type ToolHandler = dyn Fn(&str, &Value) -> Result<String, TransportError> + Send + Sync;

struct ScriptedSession {
    journal: Arc<Journal>,
    tools: Vec<ToolDescriptor>,
    list_failure: Mutex<Option<TransportError>>,
    handler: Arc<ToolHandler>,
}

#[async_trait]
impl ToolSession for ScriptedSession {
    fn server_name(&self) -> &str {
        "scripted-peer"
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, TransportError> {
        self.journal.push("list");
        match self.list_failure.lock().expect("failure").take() {
            Some(err) => Err(err),
            None => Ok(self.tools.clone()),
        }
    }

    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<String, TransportError> {
        self.journal.push(format!("call:{tool}:{arguments}"));
        (self.handler)(tool, &arguments)
    }

    async fn close(&self) {
        self.journal.push("close");
    }
}

struct ScriptedConnector {
    journal: Arc<Journal>,
    session: Mutex<Option<ScriptedSession>>,
}

#[async_trait]
impl SessionConnector for ScriptedConnector {
    async fn connect(&self) -> Result<Box<dyn ToolSession>, TransportError> {
        self.journal.push("connect");
        match self.session.lock().expect("session").take() {
            Some(session) => Ok(Box::new(session)),
            None => Err(TransportError::Spawn {
                server: "scripted-peer".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such peer"),
            }),
        }
    }
}

struct Harness {
    journal: Arc<Journal>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
    orchestrator: Orchestrator<ScriptedBackend, ScriptedConnector>,
}

impl Harness {
    fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().expect("requests").clone()
    }

    fn tool_calls(&self) -> Vec<String> {
        self.journal
            .events()
            .into_iter()
            .filter(|event| event.starts_with("call:"))
            .collect()
    }
}

struct Script {
    replies: Vec<Result<ModelResponse, ModelError>>,
    handler: Arc<ToolHandler>,
    list_failure: Option<TransportError>,
    connect_fails: bool,
}

impl Script {
    fn replies(replies: Vec<Result<ModelResponse, ModelError>>) -> Self {
        Self {
            replies,
            handler: Arc::new(default_tool),
            list_failure: None,
            connect_fails: false,
        }
    }

    fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, &Value) -> Result<String, TransportError> + Send + Sync + 'static,
    {
        self.handler = Arc::new(handler);
        self
    }

    fn with_list_failure(mut self, err: TransportError) -> Self {
        self.list_failure = Some(err);
        self
    }

    fn with_failed_connect(mut self) -> Self {
        self.connect_fails = true;
        self
    }

    fn build(self) -> Harness {
        let journal = Arc::new(Journal::default());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let backend = ScriptedBackend {
            journal: journal.clone(),
            replies: Mutex::new(self.replies.into_iter().collect()),
            requests: requests.clone(),
        };
        let session = (!self.connect_fails).then(|| ScriptedSession {
            journal: journal.clone(),
            tools: catalogue(),
            list_failure: Mutex::new(self.list_failure),
            handler: self.handler,
        });
        let connector = ScriptedConnector {
            journal: journal.clone(),
            session: Mutex::new(session),
        };
        Harness {
            journal,
            requests,
            orchestrator: Orchestrator::new(backend, connector, "test-model"),
        }
    }
}

fn catalogue() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "get_knowledge_base".into(),
            description: Some("Company policy Q&A".into()),
            input_schema: None,
        },
        ToolDescriptor {
            name: "generate_welcome_message".into(),
            description: Some("Personalised greeting".into()),
            input_schema: Some(json!({
                "type": "object",
                "properties": {
                    "user_name": {"type": "string"},
                    "context": {"type": "string"}
                },
                "required": ["user_name"]
            })),
        },
    ]
}

fn default_tool(tool: &str, arguments: &Value) -> Result<String, TransportError> {
    let text = match tool {
        "generate_welcome_message" => {
            let name = arguments["user_name"].as_str().unwrap_or_default();
            format!("Welcome back, {name}! Ready to dive into your MCP dashboard?")
        }
        "get_knowledge_base" => "Here is the retrieved knowledge base:\n\n".to_string(),
        other => format!("ran {other}"),
    };
    Ok(text)
}

fn call(id: &str, name: &str, arguments: &str) -> ToolCallRequest {
    ToolCallRequest::new(id, name, arguments)
}

fn text(content: &str) -> Result<ModelResponse, ModelError> {
    Ok(ModelResponse::text(content))
}

fn tools(calls: Vec<ToolCallRequest>) -> Result<ModelResponse, ModelError> {
    Ok(ModelResponse::with_tool_calls(calls))
}

#[tokio::test]
async fn direct_answer_uses_one_completion_and_no_tools() {
    let harness = Script::replies(vec![text("Paris is the capital of France.")]).build();

    let outcome = harness
        .orchestrator
        .run("What is the capital of France?")
        .await
        .expect("cycle");

    assert_eq!(
        outcome,
        CycleOutcome::Direct {
            answer: "Paris is the capital of France.".into()
        }
    );
    let requests = harness.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].tool_choice, ToolChoice::Auto);
    assert_eq!(requests[0].tools.len(), 2);
    assert_eq!(requests[0].model, "test-model");
    assert!(harness.tool_calls().is_empty());
    assert_eq!(harness.journal.count("close"), 1);
}

#[tokio::test]
async fn chorn_login_greeting_round_trip() {
    let harness = Script::replies(vec![
        tools(vec![call(
            "call_1",
            "generate_welcome_message",
            r#"{"user_name": "Chorn", "context": "login"}"#,
        )]),
        text(GREETING),
    ])
    .build();

    let outcome = harness
        .orchestrator
        .run("Generate a welcome message for Chorn in the login context")
        .await
        .expect("cycle");

    assert_eq!(outcome.answer(), GREETING);
    assert_eq!(outcome.tool_results().len(), 1);
    assert_eq!(outcome.tool_results()[0].call_id, "call_1");
    assert_eq!(outcome.tool_results()[0].content, GREETING);

    assert_eq!(
        harness.journal.events(),
        vec![
            "connect".to_string(),
            "list".into(),
            "complete:Auto".into(),
            format!(
                "call:generate_welcome_message:{}",
                json!({"user_name": "Chorn", "context": "login"})
            ),
            "complete:None".into(),
            "close".into(),
        ]
    );
}

#[tokio::test]
async fn finalization_sees_user_assistant_and_tool_messages_in_order() {
    let harness = Script::replies(vec![
        tools(vec![call(
            "call_1",
            "generate_welcome_message",
            r#"{"user_name": "Chorn"}"#,
        )]),
        text("Done."),
    ])
    .build();

    harness.orchestrator.run("greet Chorn").await.expect("cycle");

    let requests = harness.requests();
    assert_eq!(requests.len(), 2);
    let first = &requests[0].messages;
    let second = &requests[1].messages;
    assert_eq!(first.len(), 1);
    assert_eq!(&second[..1], &first[..]);

    let roles: Vec<_> = second.iter().map(|message| message.role).collect();
    assert_eq!(
        roles,
        [MessageRole::User, MessageRole::Assistant, MessageRole::Tool]
    );
    assert_eq!(second[1].tool_calls[0].id, "call_1");
    assert_eq!(second[2].tool_call_id.as_deref(), Some("call_1"));
    assert_eq!(second[2].text(), Some(GREETING));
}

#[tokio::test]
async fn multiple_calls_execute_and_reply_in_request_order() {
    let harness = Script::replies(vec![
        tools(vec![
            call("c1", "get_knowledge_base", ""),
            call("c2", "generate_welcome_message", r#"{"user_name": "Ana"}"#),
            call("c3", "generate_welcome_message", r#"{"user_name": "Bob"}"#),
        ]),
        text("All done."),
    ])
    .build();

    let outcome = harness.orchestrator.run("do three things").await.expect("cycle");

    let executed: Vec<_> = harness
        .tool_calls()
        .iter()
        .map(|event| event.split(':').nth(1).unwrap_or_default().to_string())
        .collect();
    assert_eq!(
        executed,
        [
            "get_knowledge_base",
            "generate_welcome_message",
            "generate_welcome_message"
        ]
    );
    assert_eq!(harness.tool_calls()[0], "call:get_knowledge_base:{}");

    let ids: Vec<_> = outcome
        .tool_results()
        .iter()
        .map(|result| result.call_id.as_str())
        .collect();
    assert_eq!(ids, ["c1", "c2", "c3"]);

    let final_messages = &harness.requests()[1].messages;
    let tool_ids: Vec<_> = final_messages
        .iter()
        .filter(|message| message.role == MessageRole::Tool)
        .filter_map(|message| message.tool_call_id.as_deref())
        .collect();
    assert_eq!(tool_ids, ["c1", "c2", "c3"]);
}

#[tokio::test]
async fn malformed_arguments_abort_before_any_tool_runs() {
    let harness = Script::replies(vec![tools(vec![
        call("c1", "generate_welcome_message", r#"{"user_name": "Ana"}"#),
        call("c2", "generate_welcome_message", r#"{"user_name": "#),
    ])])
    .build();

    let err = harness
        .orchestrator
        .run("greet two people")
        .await
        .expect_err("cycle should fail");

    match &err {
        CycleError::Argument { call_id, tool, .. } => {
            assert_eq!(call_id, "c2");
            assert_eq!(tool, "generate_welcome_message");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(harness.tool_calls().is_empty());
    assert_eq!(harness.requests().len(), 1);
    assert_eq!(harness.journal.count("close"), 1);
}

#[tokio::test]
async fn finalization_requesting_tools_is_a_protocol_error() {
    let harness = Script::replies(vec![
        tools(vec![call("c1", "get_knowledge_base", "{}")]),
        tools(vec![call("c2", "get_knowledge_base", "{}")]),
    ])
    .build();

    let err = harness
        .orchestrator
        .run("what is the vacation policy?")
        .await
        .expect_err("cycle should fail");

    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(err.payload().is_some());
    assert_eq!(harness.tool_calls().len(), 1);
    assert_eq!(harness.requests()[1].tool_choice, ToolChoice::None);
    assert_eq!(harness.journal.count("close"), 1);
}

#[tokio::test]
async fn finalization_without_text_is_a_protocol_error() {
    let harness = Script::replies(vec![
        tools(vec![call("c1", "get_knowledge_base", "{}")]),
        text("   "),
    ])
    .build();

    let err = harness
        .orchestrator
        .run("what is the vacation policy?")
        .await
        .expect_err("cycle should fail");

    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert_eq!(harness.tool_calls().len(), 1);
    assert_eq!(harness.requests().len(), 2);
    assert_eq!(harness.journal.count("close"), 1);
}

#[tokio::test]
async fn empty_proposal_is_a_protocol_error() {
    let harness = Script::replies(vec![Ok(ModelResponse::default())]).build();

    let err = harness.orchestrator.run("hello").await.expect_err("fail");

    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert_eq!(harness.journal.count("close"), 1);
}

#[tokio::test]
async fn unknown_tool_is_a_protocol_error() {
    let harness = Script::replies(vec![tools(vec![call("c1", "delete_everything", "{}")])]).build();

    let err = harness.orchestrator.run("oops").await.expect_err("fail");

    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(harness.tool_calls().is_empty());
    assert_eq!(harness.journal.count("close"), 1);
}

#[tokio::test]
async fn connection_failure_never_reaches_backend() {
    let harness = Script::replies(vec![text("unused")])
        .with_failed_connect()
        .build();

    let err = harness.orchestrator.run("hello").await.expect_err("fail");

    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(harness.requests().is_empty());
    assert_eq!(harness.journal.count("close"), 0);
}

#[tokio::test]
async fn listing_failure_closes_session_once() {
    let harness = Script::replies(vec![text("unused")])
        .with_list_failure(TransportError::Malformed {
            server: "scripted-peer".into(),
            reason: "no tools array".into(),
            payload: json!({"unexpected": true}),
        })
        .build();

    let err = harness.orchestrator.run("hello").await.expect_err("fail");

    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert_eq!(err.payload(), Some(&json!({"unexpected": true})));
    assert!(harness.requests().is_empty());
    assert_eq!(harness.journal.count("close"), 1);
}

#[tokio::test]
async fn backend_failure_is_reported_and_session_closed() {
    let harness = Script::replies(vec![Err(ModelError::missing_api_key("scripted"))]).build();

    let err = harness.orchestrator.run("hello").await.expect_err("fail");

    assert_eq!(err.kind(), ErrorKind::Backend);
    assert!(err.user_message().contains("API key"));
    assert_eq!(harness.journal.count("close"), 1);
}

#[tokio::test]
async fn backend_failure_during_finalization_closes_session_once() {
    let harness = Script::replies(vec![
        tools(vec![call("c1", "get_knowledge_base", "{}")]),
        Err(ModelError::invalid_response("scripted", "garbled")),
    ])
    .build();

    let err = harness.orchestrator.run("policy?").await.expect_err("fail");

    assert_eq!(err.kind(), ErrorKind::Backend);
    assert_eq!(harness.tool_calls().len(), 1);
    assert_eq!(harness.journal.count("close"), 1);
}

#[tokio::test]
async fn tool_failure_stops_the_batch() {
    let harness = Script::replies(vec![tools(vec![
        call("c1", "get_knowledge_base", "{}"),
        call("c2", "generate_welcome_message", r#"{"user_name": "Ana"}"#),
    ])])
    .with_handler(|tool, _| {
        Err(TransportError::ToolFailed {
            server: "scripted-peer".into(),
            tool: tool.into(),
            message: "Knowledge base file not found".into(),
        })
    })
    .build();

    let err = harness.orchestrator.run("policy?").await.expect_err("fail");

    match &err {
        CycleError::ToolExecution { tool, call_id, .. } => {
            assert_eq!(tool, "get_knowledge_base");
            assert_eq!(call_id, "c1");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(harness.tool_calls().len(), 1);
    assert_eq!(harness.requests().len(), 1);
    assert_eq!(harness.journal.count("close"), 1);
}

#[tokio::test]
async fn tool_timeout_is_not_retried() {
    let harness = Script::replies(vec![tools(vec![call(
        "c1",
        "get_knowledge_base",
        "{}",
    )])])
    .with_handler(|_, _| {
        Err(TransportError::Timeout {
            server: "scripted-peer".into(),
            method: "tools/call".into(),
            after: Duration::from_secs(30),
        })
    })
    .build();

    let err = harness.orchestrator.run("policy?").await.expect_err("fail");

    assert_eq!(err.kind(), ErrorKind::ToolExecution);
    assert!(err.is_tool_timeout());
    assert_eq!(harness.tool_calls().len(), 1);
    assert_eq!(harness.journal.count("close"), 1);
}
