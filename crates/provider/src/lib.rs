//! Completion service contract
//!
//! The agent loop talks to a language model only through [`Provider`].
//! Tool-call arguments are carried as the raw string the model produced;
//! parsing them is the caller's job.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use thiserror::Error;
use tracing::{debug, trace};

pub mod openai;

pub use openai::OpenAiProvider;

/// Completion service errors
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("provider rejected request: {0}")]
    Api(String),

    #[error("no API key configured")]
    NoApiKey,

    #[error("invalid response from provider")]
    InvalidResponse,

    #[error("rate limited by provider")]
    RateLimited,
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw argument payload; not guaranteed to be valid JSON
    pub arguments: String,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Wire form used when the call is echoed back in an assistant message
    pub fn to_def(&self) -> ToolCallDef {
        ToolCallDef::new(&self.id, &self.name, self.arguments.clone())
    }
}

/// Completion result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub finish_reason: String,
    #[serde(default)]
    pub usage: Usage,
}

impl ChatResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
            finish_reason: "stop".to_string(),
            usage: Usage::default(),
        }
    }

    pub fn with_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content,
            tool_calls,
            finish_reason: "tool_calls".to_string(),
            usage: Usage::default(),
        }
    }

    /// The assistant message to append to the running conversation
    pub fn to_message(&self) -> Message {
        let mut msg = Message::new(Role::Assistant, self.content.clone());
        if self.has_tool_calls() {
            msg.tool_calls = Some(self.tool_calls.iter().map(ToolCall::to_def).collect());
        }
        msg
    }
}

/// Token accounting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One role-tagged message submitted to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: Option<String>) -> Self {
        Self {
            role,
            content,
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, Some(content.into()))
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, Some(content.into()))
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, Some(content.into()))
    }

    pub fn tool(
        call_id: impl Into<String>,
        name: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: Some(result.into()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
            name: Some(name.into()),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// Ids of the tool calls carried by an assistant message
    pub fn tool_call_ids(&self) -> Vec<&str> {
        self.tool_calls
            .iter()
            .flatten()
            .map(|c| c.id.as_str())
            .collect()
    }
}

/// Tool call as echoed in an assistant message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDef {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

impl ToolCallDef {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// Function name and raw arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// Tool specification offered to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDef,
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionDef {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

/// Function schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Completion request
#[derive(Debug, Clone)]
pub struct ChatParams {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<Tool>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub tool_choice: ToolChoice,
}

impl Default for ChatParams {
    fn default() -> Self {
        Self {
            model: String::new(),
            messages: Vec::new(),
            tools: Vec::new(),
            max_tokens: 4096,
            temperature: 0.7,
            tool_choice: ToolChoice::Auto,
        }
    }
}

/// Tool selection mode
#[derive(Debug, Clone, PartialEq)]
pub enum ToolChoice {
    Auto,
    None,
}

/// Language-model completion service
#[async_trait]
pub trait Provider: Send + Sync {
    async fn chat(&self, params: ChatParams) -> Result<ChatResponse>;
    /// Speech to text, for voice input handled by callers
    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String>;
    fn default_model(&self) -> String;
    fn is_configured(&self) -> bool;
}

/// Text embedding service
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Send a single prompt without tools and return the text answer
pub async fn complete_text(
    provider: &dyn Provider,
    model: &str,
    messages: Vec<Message>,
) -> Result<String> {
    trace!("One-shot completion with {} messages", messages.len());
    let params = ChatParams {
        model: model.to_string(),
        messages,
        tool_choice: ToolChoice::None,
        ..Default::default()
    };
    let response = provider.chat(params).await?;
    debug!("One-shot completion finished: {}", response.finish_reason);
    response.content.ok_or(ProviderError::InvalidResponse)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_provider_error_display() {
        assert_eq!(ProviderError::NoApiKey.to_string(), "no API key configured");
        assert_eq!(
            ProviderError::Api("bad key".to_string()).to_string(),
            "provider rejected request: bad key"
        );
        assert_eq!(
            ProviderError::InvalidResponse.to_string(),
            "invalid response from provider"
        );
        assert_eq!(
            ProviderError::RateLimited.to_string(),
            "rate limited by provider"
        );
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), "\"tool\"");
        let role: Role = serde_json::from_str("\"assistant\"").unwrap();
        assert_eq!(role, Role::Assistant);
        assert_eq!(Role::System.to_string(), "system");
    }

    #[test]
    fn test_chat_response_text_builder() {
        let response = ChatResponse::text("Hello, world!");
        assert_eq!(response.content.as_deref(), Some("Hello, world!"));
        assert!(!response.has_tool_calls());
        assert_eq!(response.finish_reason, "stop");
    }

    #[test]
    fn test_chat_response_to_message_keeps_calls_verbatim() {
        let response = ChatResponse::with_tool_calls(
            None,
            vec![
                ToolCall::new("call_1", "Calculator", "{\"operation\":\"add\"}"),
                ToolCall::new("call_2", "GetTasks", "not json"),
            ],
        );

        let msg = response.to_message();
        assert_eq!(msg.role, Role::Assistant);
        assert!(msg.content.is_none());
        assert_eq!(msg.tool_call_ids(), vec!["call_1", "call_2"]);

        let calls = msg.tool_calls.unwrap();
        assert_eq!(calls[0].function.arguments, "{\"operation\":\"add\"}");
        assert_eq!(calls[1].function.arguments, "not json");
        assert_eq!(calls[1].call_type, "function");
    }

    #[test]
    fn test_text_response_to_message_has_no_calls() {
        let msg = ChatResponse::text("done").to_message();
        assert!(msg.tool_calls.is_none());
        assert!(!msg.has_tool_calls());
        assert_eq!(msg.content.as_deref(), Some("done"));
    }

    #[test]
    fn test_message_builders() {
        let msg = Message::system("You are helpful");
        assert_eq!(msg.role, Role::System);
        assert!(msg.tool_call_id.is_none());

        let msg = Message::tool("call_123", "Calculator", "4");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.content.as_deref(), Some("4"));
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_123"));
        assert_eq!(msg.name.as_deref(), Some("Calculator"));
    }

    #[test]
    fn test_message_serialization_skips_empty_fields() {
        let json_str = serde_json::to_string(&Message::user("Hello")).unwrap();
        assert_eq!(json_str, r#"{"role":"user","content":"Hello"}"#);
    }

    #[test]
    fn test_tool_call_def_serialization() {
        let def = ToolCallDef::new("call_1", "Calculator", "{}");
        let value = serde_json::to_value(&def).unwrap();
        assert_eq!(
            value,
            json!({"id": "call_1", "type": "function", "function": {"name": "Calculator", "arguments": "{}"}})
        );
    }

    #[test]
    fn test_tool_new() {
        let params = json!({"type": "object", "properties": {}});
        let tool = Tool::new("Calculator", "Arithmetic", params.clone());
        assert_eq!(tool.tool_type, "function");
        assert_eq!(tool.function.name, "Calculator");
        assert_eq!(tool.function.parameters, params);
    }

    #[test]
    fn test_chat_params_default() {
        let params = ChatParams::default();
        assert!(params.model.is_empty());
        assert!(params.tools.is_empty());
        assert_eq!(params.max_tokens, 4096);
        assert_eq!(params.tool_choice, ToolChoice::Auto);
    }
}
