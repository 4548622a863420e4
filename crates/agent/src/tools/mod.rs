//! Tool contract and registry

pub mod calculator;
pub mod tasks;

pub use calculator::CalculatorTool;
pub use tasks::{
    CloseTaskTool, CreateTaskTool, DeleteTaskTool, GetTasksTool, TaskApiClient, UpdateTaskTool,
};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use synthia_provider::{Provider, Tool};

/// Unexpected tool failures; expected failures are returned as text
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("tool '{0}' is not available")]
    NotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Failed(String),
}

type BoxedTool = Box<dyn ToolTrait + Send + Sync>;

/// A capability the model may invoke
#[async_trait]
pub trait ToolTrait: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema of the argument object
    fn parameters(&self) -> Value;
    async fn execute(&self, args: Value) -> Result<String, ToolError>;
}

pub fn to_provider_tool(tool: &dyn ToolTrait) -> Tool {
    Tool::new(tool.name(), tool.description(), tool.parameters())
}

/// Deserialize an argument object into a typed struct; a mismatch becomes
/// the error text handed back to the model
pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, String> {
    serde_json::from_value(args).map_err(|e| format!("Error: invalid arguments: {}", e))
}

/// Tools in registration order
pub struct ToolRegistry {
    tools: Vec<BoxedTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// The built-in catalogue: calculator and task management
    pub fn with_defaults(
        tasks: TaskApiClient,
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        lookup_timeout: Duration,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(CalculatorTool);
        registry.register(CreateTaskTool::new(tasks.clone()));
        registry.register(GetTasksTool::new(tasks.clone()));
        registry.register(UpdateTaskTool::new(tasks.clone()));
        registry.register(CloseTaskTool::new(tasks.clone(), provider, model, lookup_timeout));
        registry.register(DeleteTaskTool::new(tasks));
        registry
    }

    /// Add a tool; a tool with the same name is replaced in place
    pub fn register<T: ToolTrait + 'static>(&mut self, tool: T) {
        let name = tool.name().to_string();
        match self.index.get(&name) {
            Some(&slot) => self.tools[slot] = Box::new(tool),
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(Box::new(tool));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&(dyn ToolTrait + Send + Sync)> {
        self.index.get(name).map(|&slot| self.tools[slot].as_ref())
    }

    pub fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool catalogue offered to the model
    pub fn definitions(&self) -> Vec<Tool> {
        self.tools
            .iter()
            .map(|t| to_provider_tool(t.as_ref()))
            .collect()
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<String, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(args).await
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
