use crate::types::ToolCallResult;
use serde::Serialize;

/// Successful end of a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "path", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// The model answered without requesting any tool.
    Direct { answer: String },
    /// The model requested tools; `results` are in request order.
    ToolAssisted {
        answer: String,
        results: Vec<ToolCallResult>,
    },
}

impl CycleOutcome {
    pub fn answer(&self) -> &str {
        match self {
            CycleOutcome::Direct { answer } | CycleOutcome::ToolAssisted { answer, .. } => answer,
        }
    }

    pub fn tool_results(&self) -> &[ToolCallResult] {
        match self {
            CycleOutcome::Direct { .. } => &[],
            CycleOutcome::ToolAssisted { results, .. } => results,
        }
    }

    pub fn used_tools(&self) -> bool {
        matches!(self, CycleOutcome::ToolAssisted { .. })
    }
}
