//! OpenAI-compatible client implementation (OpenAI, OpenRouter, vLLM, ...)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::base::{HttpClientBase, resolve_api_key};
use crate::config::ModelConfig;
use crate::infrastructure::model::traits::ModelBackend;
use crate::infrastructure::model::types::{
    ModelError, ModelRequest, ModelResponse, ModelToolSpec,
};
use crate::types::{ChatMessage, ToolCallRequest};

#[derive(Clone)]
pub struct OpenAIClient {
    base: HttpClientBase,
    api_path: String,
    auth_required: bool,
}

impl OpenAIClient {
    pub fn from_config(id: impl Into<String>, config: &ModelConfig) -> Result<Self, ModelError> {
        let id = id.into();
        let api_key = resolve_api_key(&id, config.api_key.as_deref());
        Ok(Self {
            base: HttpClientBase::new(id, config.endpoint.clone(), api_key, config.timeout)?,
            api_path: config.api_path.clone(),
            auth_required: config.api_key.is_some(),
        })
    }
}

#[async_trait]
impl ModelBackend for OpenAIClient {
    fn id(&self) -> &str {
        &self.base.id
    }

    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let url = self.base.build_url(&self.api_path);
        let payload = build_payload(&request);

        info!(
            provider = self.base.id.as_str(),
            model = request.model.as_str(),
            messages = request.messages.len(),
            tools = request.tools.len(),
            tool_choice = ?request.tool_choice,
            "Sending request to OpenAI-compatible provider"
        );

        let response: OpenAIResponse = if self.auth_required {
            self.base.post_with_bearer(&url, &payload).await?
        } else {
            self.base.post_no_auth(&url, &payload).await?
        };
        debug!("Received response from OpenAI-compatible provider");

        into_model_response(&self.base.id, response)
    }
}

fn build_payload(request: &ModelRequest) -> OpenAIRequest<'_> {
    let has_tools = !request.tools.is_empty();
    OpenAIRequest {
        model: &request.model,
        messages: request.messages.iter().map(OpenAIMessage::from).collect(),
        tools: has_tools.then_some(request.tools.as_slice()),
        tool_choice: has_tools.then(|| request.tool_choice.to_wire()),
        stream: false,
    }
}

fn into_model_response(provider: &str, response: OpenAIResponse) -> Result<ModelResponse, ModelError> {
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or_else(|| ModelError::invalid_response(provider, "response contained no choices"))?;

    let tool_calls = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| ToolCallRequest {
            id: call.id,
            name: call.function.name,
            arguments: call.function.arguments,
        })
        .collect();

    Ok(ModelResponse {
        content: message.content,
        tool_calls,
    })
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ModelToolSpec]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
    stream: bool,
}

#[derive(Serialize)]
struct OpenAIMessage<'a> {
    role: &'static str,
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OpenAIToolCallOut<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

impl<'a> From<&'a ChatMessage> for OpenAIMessage<'a> {
    fn from(message: &'a ChatMessage) -> Self {
        Self {
            role: message.role.as_str(),
            content: message.content.as_deref(),
            tool_calls: message
                .tool_calls
                .iter()
                .map(|call| OpenAIToolCallOut {
                    id: &call.id,
                    kind: "function",
                    function: OpenAIFunctionOut {
                        name: &call.name,
                        arguments: &call.arguments,
                    },
                })
                .collect(),
            tool_call_id: message.tool_call_id.as_deref(),
        }
    }
}

#[derive(Serialize)]
struct OpenAIToolCallOut<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: OpenAIFunctionOut<'a>,
}

#[derive(Serialize)]
struct OpenAIFunctionOut<'a> {
    name: &'a str,
    arguments: &'a str,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIAssistantMessage,
}

#[derive(Deserialize)]
struct OpenAIAssistantMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAIToolCallIn>>,
}

#[derive(Deserialize)]
struct OpenAIToolCallIn {
    id: String,
    function: OpenAIFunctionIn,
}

#[derive(Deserialize)]
struct OpenAIFunctionIn {
    name: String,
    #[serde(default)]
    arguments: String,
}
