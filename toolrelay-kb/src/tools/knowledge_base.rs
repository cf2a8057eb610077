//! `get_knowledge_base`: renders the Q&A document as plain text.

use crate::registry::{Tool, ToolError};
use serde_json::{Value, json};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use toolrelay_core::tooling::ToolDescriptor;
use tracing::debug;

pub const NAME: &str = "get_knowledge_base";

const DESCRIPTION: &str = "Answers questions about company policies and procedures such as \
vacation, remote work, expenses, software, and security protocols by querying the knowledge base. \
Returns a formatted string containing all Q&A pairs from the knowledge base.";

/// Reads the document on every call so edits show up without a restart.
pub struct KnowledgeBaseTool {
    path: PathBuf,
}

impl KnowledgeBaseTool {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<Value, ToolError> {
        let content = fs::read_to_string(&self.path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => ToolError::Failed(format!(
                "Knowledge base file not found: {}",
                self.path.display()
            )),
            _ => ToolError::Failed(format!(
                "Failed to read knowledge base file {}: {err}",
                self.path.display()
            )),
        })?;
        serde_json::from_str(&content)
            .map_err(|err| ToolError::Failed(format!("Invalid JSON in knowledge base file: {err}")))
    }
}

impl Tool for KnowledgeBaseTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: NAME.to_string(),
            description: Some(DESCRIPTION.to_string()),
            input_schema: Some(json!({ "type": "object", "properties": {} })),
        }
    }

    fn call(&self, _arguments: &Value) -> Result<String, ToolError> {
        let document = self.load()?;
        debug!(path = %self.path.display(), "Knowledge base loaded");
        Ok(render(&document))
    }
}

pub fn render(document: &Value) -> String {
    let mut text = String::from("Here is the retrieved knowledge base:\n\n");

    let Some(entries) = document.as_array() else {
        let pretty = serde_json::to_string_pretty(document).unwrap_or_else(|_| document.to_string());
        text.push_str(&format!("Knowledge base content: {pretty}\n\n"));
        return text;
    };

    for (offset, entry) in entries.iter().enumerate() {
        let i = offset + 1;
        let (question, answer) = match entry.as_object() {
            Some(fields) => (
                field_text(fields.get("question")).unwrap_or_else(|| "Unknown question".into()),
                field_text(fields.get("answer")).unwrap_or_else(|| "Unknown answer".into()),
            ),
            None => (format!("Item {i}"), plain_text(entry)),
        };
        text.push_str(&format!("Q{i}: {question}\nA{i}: {answer}\n\n"));
    }
    text
}

fn field_text(value: Option<&Value>) -> Option<String> {
    value.map(plain_text)
}

fn plain_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
