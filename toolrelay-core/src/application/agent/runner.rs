use super::errors::CycleError;
use super::models::CycleOutcome;
use super::state::{CycleState, StateTracker};
use crate::application::catalogue;
use crate::application::tooling::{SessionConnector, StdioConnector, ToolDescriptor, ToolSession};
use crate::config::AppConfig;
use crate::model::{
    ModelBackend, ModelError, ModelRequest, ModelResponse, ModelToolSpec, OpenAIClient, ToolChoice,
};
use crate::domain::Conversation;
use crate::types::{ChatMessage, ToolCallRequest, ToolCallResult};
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

/// Drives one query through catalogue → proposal → tools → finalization.
///
/// The orchestrator keeps no per-cycle state, so one instance can serve
/// many concurrent cycles; each cycle opens and closes its own session.
pub struct Orchestrator<B, C> {
    backend: B,
    connector: C,
    model: String,
}

/// A validated tool call, ready to send to the peer.
struct PreparedCall<'a> {
    request: &'a ToolCallRequest,
    arguments: Value,
}

impl<B, C> Orchestrator<B, C>
where
    B: ModelBackend,
    C: SessionConnector,
{
    pub fn new(backend: B, connector: C, model: impl Into<String>) -> Self {
        Self {
            backend,
            connector,
            model: model.into(),
        }
    }

    /// Run one full cycle for `query`.
    pub async fn run(&self, query: &str) -> Result<CycleOutcome, CycleError> {
        let cycle_id = Uuid::new_v4();
        let span = info_span!("cycle", id = %cycle_id);
        self.run_cycle(query).instrument(span).await
    }

    async fn run_cycle(&self, query: &str) -> Result<CycleOutcome, CycleError> {
        info!(
            backend = self.backend.id(),
            model = self.model.as_str(),
            query = %summarise(query),
            "Cycle started"
        );
        let mut tracker = StateTracker::new();

        let session = match self.connector.connect().await {
            Ok(session) => session,
            Err(err) => {
                return Err(Self::fail(&mut tracker, CycleError::Connection(err)));
            }
        };

        let result = self.drive(session.as_ref(), query, &mut tracker).await;
        session.close().await;

        match result {
            Ok(outcome) => {
                tracker.advance(CycleState::Done);
                debug!(states = ?tracker.history(), "Cycle finished");
                info!(
                    used_tools = outcome.used_tools(),
                    tool_calls = outcome.tool_results().len(),
                    "Cycle completed"
                );
                Ok(outcome)
            }
            Err(err) => Err(Self::fail(&mut tracker, err)),
        }
    }

    async fn drive(
        &self,
        session: &dyn ToolSession,
        query: &str,
        tracker: &mut StateTracker,
    ) -> Result<CycleOutcome, CycleError> {
        let descriptors = session
            .list_tools()
            .await
            .map_err(CycleError::from_listing)?;
        info!(
            server = session.server_name(),
            tools = descriptors.len(),
            "Connected to server with tools"
        );
        for tool in &descriptors {
            debug!(
                tool = tool.name.as_str(),
                description = tool.description.as_deref().unwrap_or_default(),
                "Available tool"
            );
        }
        let specs = catalogue::adapt(&descriptors);
        tracker.advance(CycleState::Catalogued);

        let mut conversation = Conversation::seed(query);
        tracker.advance(CycleState::AwaitingProposal);
        let proposal = self
            .complete(&conversation, &specs, ToolChoice::Auto)
            .await?;

        if !proposal.has_tool_calls() {
            let answer = proposal.non_empty_text().ok_or_else(|| {
                CycleError::protocol("response carried neither text nor tool calls", None)
            })?;
            info!("Model answered without tools");
            return Ok(CycleOutcome::Direct {
                answer: answer.to_string(),
            });
        }

        tracker.advance(CycleState::ExecutingTools);
        let ModelResponse {
            content,
            tool_calls,
        } = proposal;
        let prepared = prepare_calls(&tool_calls, &descriptors)?;
        conversation.append_assistant(ChatMessage::assistant(content, tool_calls.clone()));

        let mut results = Vec::with_capacity(prepared.len());
        for call in prepared {
            let request = call.request;
            info!(
                tool = request.name.as_str(),
                call_id = request.id.as_str(),
                "Calling tool"
            );
            let content = session
                .call_tool(&request.name, call.arguments)
                .await
                .map_err(|err| CycleError::from_call(&request.name, &request.id, err))?;
            debug!(
                tool = request.name.as_str(),
                result = %summarise(&content),
                "Tool returned"
            );
            conversation.append_tool_result(request.id.clone(), content.clone());
            results.push(ToolCallResult {
                call_id: request.id.clone(),
                tool: request.name.clone(),
                content,
            });
        }

        tracker.advance(CycleState::AwaitingFinal);
        let finalization = self
            .complete(&conversation, &specs, ToolChoice::None)
            .await?;

        if finalization.has_tool_calls() {
            let payload = serde_json::to_value(&finalization.tool_calls).ok();
            return Err(CycleError::protocol(
                "finalization response requested tools although tool use was disabled",
                payload,
            ));
        }
        let answer = finalization.non_empty_text().ok_or_else(|| {
            CycleError::protocol("finalization response carried no text", None)
        })?;

        Ok(CycleOutcome::ToolAssisted {
            answer: answer.to_string(),
            results,
        })
    }

    async fn complete(
        &self,
        conversation: &Conversation,
        tools: &[ModelToolSpec],
        tool_choice: ToolChoice,
    ) -> Result<ModelResponse, CycleError> {
        debug!(
            messages = conversation.len(),
            tools = ?tools.iter().map(ModelToolSpec::name).collect::<Vec<_>>(),
            ?tool_choice,
            "Requesting completion"
        );
        let request = ModelRequest {
            model: self.model.clone(),
            messages: conversation.messages().to_vec(),
            tools: tools.to_vec(),
            tool_choice,
        };
        Ok(self.backend.complete(request).await?)
    }

    fn fail(tracker: &mut StateTracker, err: CycleError) -> CycleError {
        let failed_in = tracker.current();
        tracker.advance(CycleState::Failed);
        match err.payload() {
            Some(payload) => warn!(
                state = %failed_in,
                kind = %err.kind(),
                error = %err,
                %payload,
                "Cycle failed"
            ),
            None => warn!(
                state = %failed_in,
                kind = %err.kind(),
                error = %err,
                "Cycle failed"
            ),
        }
        err
    }
}

impl Orchestrator<OpenAIClient, StdioConnector> {
    /// Wire the HTTP backend and the stdio connector described by `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self, ModelError> {
        let backend = OpenAIClient::from_config("openai", &config.model)?;
        let connector = StdioConnector::new(config.server.clone());
        Ok(Self::new(backend, connector, config.model.name.clone()))
    }
}

/// Validate every call of the turn before any is executed.
///
/// Ids must be unique, tools must exist in the catalogue and arguments must
/// be a JSON object (an empty payload counts as `{}`).
fn prepare_calls<'a>(
    calls: &'a [ToolCallRequest],
    catalogue: &[ToolDescriptor],
) -> Result<Vec<PreparedCall<'a>>, CycleError> {
    let known: HashSet<&str> = catalogue.iter().map(|tool| tool.name.as_str()).collect();
    let mut seen_ids = HashSet::new();

    calls
        .iter()
        .map(|request| {
            if !seen_ids.insert(request.id.as_str()) {
                return Err(CycleError::protocol(
                    format!("duplicate tool call id '{}'", request.id),
                    Some(json!({ "id": request.id, "name": request.name })),
                ));
            }
            if !known.contains(request.name.as_str()) {
                return Err(CycleError::protocol(
                    format!("model requested unknown tool '{}'", request.name),
                    Some(json!({ "id": request.id, "name": request.name })),
                ));
            }
            let arguments = parse_arguments(request)?;
            Ok(PreparedCall { request, arguments })
        })
        .collect()
}

fn parse_arguments(request: &ToolCallRequest) -> Result<Value, CycleError> {
    let raw = request.arguments.trim();
    if raw.is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    let invalid = |reason: String| CycleError::Argument {
        tool: request.name.clone(),
        call_id: request.id.clone(),
        reason,
    };
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(Value::Object(map)),
        Ok(Value::Null) => Ok(Value::Object(Map::new())),
        Ok(other) => Err(invalid(format!("expected a JSON object, got {other}"))),
        Err(err) => Err(invalid(err.to_string())),
    }
}

fn summarise(text: &str) -> String {
    const SNIPPET_LIMIT: usize = 160;
    let single_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.is_empty() {
        return "(empty)".to_string();
    }
    let mut chars = single_line.chars();
    let mut result: String = chars.by_ref().take(SNIPPET_LIMIT).collect();
    if chars.next().is_some() {
        result.push('…');
    }
    result
}
