//! `generate_welcome_message`: a greeting tailored to the user's context.

use crate::registry::{Tool, ToolError};
use serde_json::{Value, json};
use toolrelay_core::tooling::ToolDescriptor;

pub const NAME: &str = "generate_welcome_message";

const DESCRIPTION: &str = "Generate a personalized welcome message based on user name and \
context. The context is the occasion of the greeting, e.g. 'login', 'event', 'support' or 'general'.";

const DEFAULT_CONTEXT: &str = "general";

pub struct WelcomeTool;

impl Tool for WelcomeTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: NAME.to_string(),
            description: Some(DESCRIPTION.to_string()),
            input_schema: Some(json!({
                "type": "object",
                "properties": {
                    "user_name": {
                        "type": "string",
                        "description": "The name of the user to include in the message."
                    },
                    "context": {
                        "type": "string",
                        "description": "The context of the greeting.",
                        "default": DEFAULT_CONTEXT
                    }
                },
                "required": ["user_name"]
            })),
        }
    }

    fn call(&self, arguments: &Value) -> Result<String, ToolError> {
        let user_name = match arguments.get("user_name") {
            Some(Value::String(name)) => name.as_str(),
            Some(other) => {
                return Err(ToolError::InvalidArguments(format!(
                    "'user_name' must be a string, got {other}"
                )));
            }
            None => {
                return Err(ToolError::InvalidArguments(
                    "missing required argument 'user_name'".into(),
                ));
            }
        };
        let context = match arguments.get("context") {
            None | Some(Value::Null) => DEFAULT_CONTEXT,
            Some(Value::String(context)) => context.as_str(),
            Some(other) => {
                return Err(ToolError::InvalidArguments(format!(
                    "'context' must be a string, got {other}"
                )));
            }
        };
        Ok(welcome_message(user_name, context))
    }
}

pub fn welcome_message(user_name: &str, context: &str) -> String {
    if user_name.is_empty() {
        return "Hello! Please provide a name for a personalized greeting.".to_string();
    }

    match context.to_lowercase().as_str() {
        "login" => format!("Welcome back, {user_name}! Ready to dive into your MCP dashboard?"),
        "event" => format!("Hello {user_name}! Excited to see you at the MCP event today!"),
        "support" => format!("Hi {user_name}, the MCP support team is here to assist you!"),
        _ => format!("Greetings, {user_name}! Welcome to the MCP server!"),
    }
}
