//! Tool registry keyed by tool name, listed in registration order.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use toolrelay_core::tooling::ToolDescriptor;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Failed(String),
}

pub trait Tool: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    fn call(&self, arguments: &Value) -> Result<String, ToolError>;
}

/// Adapter turning a plain function into a [`Tool`].
pub struct FunctionTool<F> {
    descriptor: ToolDescriptor,
    handler: F,
}

impl<F> FunctionTool<F>
where
    F: Fn(&Value) -> Result<String, ToolError> + Send + Sync,
{
    pub fn new(descriptor: ToolDescriptor, handler: F) -> Self {
        Self {
            descriptor,
            handler,
        }
    }
}

impl<F> Tool for FunctionTool<F>
where
    F: Fn(&Value) -> Result<String, ToolError> + Send + Sync,
{
    fn descriptor(&self) -> ToolDescriptor {
        self.descriptor.clone()
    }

    fn call(&self, arguments: &Value) -> Result<String, ToolError> {
        (self.handler)(arguments)
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tool`; a tool with the same name is replaced in place.
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        let name = tool.descriptor().name;
        let tool: Arc<dyn Tool> = Arc::new(tool);
        match self.index.get(&name) {
            Some(&slot) => self.tools[slot] = tool,
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn register_fn<F>(&mut self, descriptor: ToolDescriptor, handler: F)
    where
        F: Fn(&Value) -> Result<String, ToolError> + Send + Sync + 'static,
    {
        self.register(FunctionTool::new(descriptor, handler));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&slot| self.tools[slot].clone())
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|tool| tool.descriptor()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
