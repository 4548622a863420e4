//! Agent loop - bounded completion / tool execution cycle

use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use synthia_config::Config;
use synthia_provider::{ChatParams, ChatResponse, Message, Provider, Tool, ToolCall, ToolChoice};
use synthia_session::{ConversationStore, Turn};

use crate::context::ContextAssembler;
use crate::tools::{ToolError, ToolRegistry};
use crate::{AgentError, Result};

/// Reply when the tool iteration limit runs out
pub const ABORT_NOTICE: &str =
    "Sorry, I couldn't finish that request within the allowed number of steps. Please try rephrasing it.";

/// Reply when the turn fails outright
pub const FAILURE_NOTICE: &str =
    "Sorry, something went wrong while preparing a reply. Please try again later.";

/// Loop-wide knobs taken from the configuration
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub default_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub completion_timeout: Duration,
    pub tool_timeout: Duration,
    pub max_parallel_tools: usize,
}

impl LoopSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_model: config.default_model(),
            max_tokens: config.agent.max_tokens,
            temperature: config.agent.temperature,
            completion_timeout: config.completion_timeout(),
            tool_timeout: config.tool_timeout(),
            max_parallel_tools: config.agent.max_parallel_tools.max(1),
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// How a turn ended
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Reply(String),
    LimitExceeded { iterations: u32 },
}

impl TurnOutcome {
    /// Text to show the user
    pub fn text(&self) -> &str {
        match self {
            TurnOutcome::Reply(content) => content,
            TurnOutcome::LimitExceeded { .. } => ABORT_NOTICE,
        }
    }
}

/// Result of one turn, with the full exchange for auditing
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub outcome: TurnOutcome,
    /// Every message submitted or received, starting with the system message
    pub transcript: Vec<Message>,
    /// Completion requests issued
    pub completions: u32,
    pub model: String,
    /// Log name of the persona in effect
    pub prompt_name: String,
}

/// Parse raw tool arguments; anything but a JSON object becomes `{}`
pub fn parse_arguments(call: &ToolCall) -> Value {
    match serde_json::from_str::<Value>(&call.arguments) {
        Ok(value @ Value::Object(_)) => value,
        Ok(other) => {
            warn!(
                "Arguments for {} ({}) are not an object: {}",
                call.name, call.id, other
            );
            Value::Object(Map::new())
        }
        Err(e) => {
            warn!(
                "Unparsable arguments for {} ({}): {}",
                call.name, call.id, e
            );
            Value::Object(Map::new())
        }
    }
}

/// The agent loop processes messages and handles tool calls
pub struct AgentLoop<P: Provider> {
    provider: Arc<P>,
    tools: Arc<ToolRegistry>,
    assembler: ContextAssembler,
    store: Arc<dyn ConversationStore>,
    settings: LoopSettings,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<P: Provider> AgentLoop<P> {
    pub fn new(
        provider: Arc<P>,
        tools: Arc<ToolRegistry>,
        assembler: ContextAssembler,
        store: Arc<dyn ConversationStore>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            provider,
            tools,
            assembler,
            store,
            settings,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    async fn conversation_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Reply text, abort notice or the generic failure notice
    pub async fn process_direct(&self, key: &str, text: &str) -> String {
        match self.handle_message(key, text).await {
            Ok(report) => report.outcome.text().to_string(),
            Err(e) => {
                error!("Turn for {} failed: {}", key, e);
                FAILURE_NOTICE.to_string()
            }
        }
    }

    /// Drop the lock entry once no other turn holds or awaits it
    async fn release_lock(&self, key: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        drop(lock);
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }

    /// Conversations with a turn running or queued
    pub async fn active_conversations(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// Run one full turn for a conversation
    pub async fn handle_message(&self, key: &str, text: &str) -> Result<TurnReport> {
        let lock = self.conversation_lock(key).await;
        let report = {
            let _guard = lock.lock().await;
            self.run_turn(key, text).await
        };
        self.release_lock(key, lock).await;
        report
    }

    async fn run_turn(&self, key: &str, text: &str) -> Result<TurnReport> {
        info!("Processing message for {}", key);
        debug!("Content: {}", text.chars().take(100).collect::<String>());

        let conversation = self.store.load_or_create(key).await?;
        let profile = self.assembler.resolve_profile(&conversation).await;
        let model = conversation
            .model
            .clone()
            .or_else(|| profile.model.clone())
            .unwrap_or_else(|| self.settings.default_model.clone());

        let context = self.assembler.assemble(&conversation, &profile, text).await;
        self.store.append(key, Turn::user(text)).await?;

        let mut messages = context.messages(text);
        let catalogue = self.tools.definitions();
        let limit = profile.tool_iteration_limit.max(1);
        let mut completions = 0;

        while completions < limit {
            completions += 1;
            debug!("Iteration {}/{} for {} with {}", completions, limit, key, model);

            let response = self.complete(&model, &messages, &catalogue).await?;
            messages.push(response.to_message());

            if !response.has_tool_calls() {
                let content = response.content.unwrap_or_default();
                self.store
                    .append(
                        key,
                        Turn::assistant(content.clone()).with_audit(&model, &profile.name),
                    )
                    .await?;

                return Ok(TurnReport {
                    outcome: TurnOutcome::Reply(content),
                    transcript: messages,
                    completions,
                    model,
                    prompt_name: profile.name,
                });
            }

            let results = self.dispatch(&response.tool_calls).await;
            for (call, result) in response.tool_calls.iter().zip(results) {
                messages.push(Message::tool(&call.id, &call.name, result));
            }
        }

        warn!(
            "Tool iteration limit ({}) reached for {}, aborting turn",
            limit, key
        );
        Ok(TurnReport {
            outcome: TurnOutcome::LimitExceeded { iterations: limit },
            transcript: messages,
            completions,
            model,
            prompt_name: profile.name,
        })
    }

    async fn complete(
        &self,
        model: &str,
        messages: &[Message],
        catalogue: &[Tool],
    ) -> Result<ChatResponse> {
        let params = ChatParams {
            model: model.to_string(),
            messages: messages.to_vec(),
            tools: catalogue.to_vec(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            tool_choice: ToolChoice::Auto,
        };

        match tokio::time::timeout(self.settings.completion_timeout, self.provider.chat(params)).await
        {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                error!("Completion request failed: {}", e);
                Err(e.into())
            }
            Err(_) => {
                error!(
                    "Completion request timed out after {:?}",
                    self.settings.completion_timeout
                );
                Err(AgentError::CompletionTimeout(self.settings.completion_timeout))
            }
        }
    }

    /// Execute calls concurrently; results keep the call order
    async fn dispatch(&self, calls: &[ToolCall]) -> Vec<String> {
        let pending: Vec<_> = calls.iter().map(|call| self.run_tool(call)).collect();
        stream::iter(pending)
            .buffered(self.settings.max_parallel_tools.max(1))
            .collect()
            .await
    }

    async fn run_tool(&self, call: &ToolCall) -> String {
        let args = parse_arguments(call);

        let Some(tool) = self.tools.get(&call.name) else {
            warn!("Model requested unknown tool {}", call.name);
            return format!("Error: {}", ToolError::NotFound(call.name.clone()));
        };

        debug!("Executing tool: {} ({})", call.name, call.id);
        match tokio::time::timeout(self.settings.tool_timeout, tool.execute(args)).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!("Tool {} failed: {}", call.name, e);
                format!("Error: {}", e)
            }
            Err(_) => {
                warn!("Tool {} timed out", call.name);
                format!(
                    "Error: tool '{}' timed out after {:?}",
                    call.name, self.settings.tool_timeout
                )
            }
        }
    }
}
