pub mod knowledge_base;
pub mod welcome;

use crate::registry::ToolRegistry;
use std::path::PathBuf;

pub use knowledge_base::KnowledgeBaseTool;
pub use welcome::WelcomeTool;

/// Registry holding the knowledge-base and greeting tools.
pub fn default_registry(kb_path: impl Into<PathBuf>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(KnowledgeBaseTool::new(kb_path));
    registry.register(WelcomeTool);
    registry
}
