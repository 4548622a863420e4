//! Task management tools backed by a Todoist-style REST API
//!
//! Every outcome the model should see, including mistyped arguments and
//! HTTP or transport failures, is returned as text.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use synthia_config::Config;
use synthia_provider::{complete_text, Message, Provider};

use super::{parse_args, ToolError, ToolTrait};

const PAGE_SIZE: &str = "20";
const MAX_PAGES: usize = 50;

const LOOKUP_INSTRUCTION: &str = "You match a task name to one of the listed tasks. \
Reply with the ID of the matching task only, or NONE if no task matches.";

/// Task API failures, rendered as the text handed back to the model
#[derive(Error, Debug)]
pub enum TaskApiError {
    #[error("Error: task API key not configured")]
    NotConfigured,

    #[error("Error: invalid task id '{0}'")]
    InvalidId(String),

    #[error("Error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("System Error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Due date as returned by the API
#[derive(Debug, Clone, Deserialize)]
pub struct Due {
    pub date: String,
}

/// An active task
#[derive(Debug, Clone, Deserialize)]
pub struct Task {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub due: Option<Due>,
}

fn default_priority() -> u8 {
    1
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

impl Task {
    /// `[ID:…] content, Due: date|no deadline, Priority:n`
    pub fn render(&self) -> String {
        let due = self
            .due
            .as_ref()
            .map(|d| d.date.as_str())
            .unwrap_or("no deadline");
        format!(
            "[ID:{}] {}, Due: {}, Priority:{}",
            self.id, self.content, due, self.priority
        )
    }
}

#[derive(Deserialize)]
struct TaskPage {
    #[serde(default)]
    results: Vec<Task>,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// Writable task fields; blank strings count as absent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_string: Option<String>,
}

impl TaskFields {
    fn normalized(self) -> Self {
        let keep = |s: Option<String>| s.filter(|v| !v.trim().is_empty());
        Self {
            content: keep(self.content),
            description: keep(self.description),
            priority: self.priority,
            due_string: keep(self.due_string),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.due_string.is_none()
    }

    fn priority_error(&self) -> Option<String> {
        match self.priority {
            Some(p) if !(1..=4).contains(&p) => {
                Some(format!("Error: priority must be between 1 and 4, got {}", p))
            }
            _ => None,
        }
    }
}

/// `task_id` may arrive as a string or a bare number
fn task_id_arg(args: &Value) -> Option<String> {
    match args.get("task_id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn missing_id(action: &str) -> String {
    format!(
        "Error: Argument 'task_id' is missing. Please provide the ID of the task you want to {}.",
        action
    )
}

/// Shared HTTP client for the task API
#[derive(Clone)]
pub struct TaskApiClient {
    client: Client,
    api_base: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl TaskApiClient {
    pub fn new(api_key: Option<String>, api_base: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.task_api_key(),
            config.tasks.api_base.clone(),
            config.task_timeout(),
        )
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, TaskApiError> {
        let key = self.api_key.as_deref().ok_or(TaskApiError::NotConfigured)?;
        let url = format!("{}/{}", self.api_base, path);
        debug!("Task API {} {}", method, url);
        Ok(self
            .client
            .request(method, url)
            .bearer_auth(key)
            .timeout(self.timeout))
    }

    fn task_path(id: &str, suffix: &str) -> Result<String, TaskApiError> {
        if id.is_empty()
            || !id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(TaskApiError::InvalidId(id.to_string()));
        }
        Ok(format!("tasks/{}{}", id, suffix))
    }

    async fn send(builder: RequestBuilder) -> Result<Response, TaskApiError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!("Task API returned {}: {}", status, body);
        Err(TaskApiError::Status {
            status: status.as_u16(),
            body,
        })
    }

    pub async fn create(&self, fields: &TaskFields) -> Result<Task, TaskApiError> {
        let builder = self.request(Method::POST, "tasks")?.json(fields);
        Ok(Self::send(builder).await?.json().await?)
    }

    /// Active tasks; with a filter the filter endpoint is used, otherwise all
    /// pages are followed
    pub async fn list(&self, filter: Option<&str>) -> Result<Vec<Task>, TaskApiError> {
        if let Some(query) = filter {
            let builder = self
                .request(Method::GET, "tasks/filter")?
                .query(&[("query", query)]);
            let page: TaskPage = Self::send(builder).await?.json().await?;
            return Ok(page.results);
        }

        let mut tasks = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let mut builder = self
                .request(Method::GET, "tasks")?
                .query(&[("limit", PAGE_SIZE)]);
            if let Some(c) = &cursor {
                builder = builder.query(&[("cursor", c.as_str())]);
            }

            let page: TaskPage = Self::send(builder).await?.json().await?;
            debug!("Fetched task page with {} tasks", page.results.len());
            tasks.extend(page.results);

            match page.next_cursor.filter(|c| !c.is_empty()) {
                Some(next) => cursor = Some(next),
                None => return Ok(tasks),
            }
        }

        warn!("Stopped task pagination after {} pages", MAX_PAGES);
        Ok(tasks)
    }

    pub async fn update(&self, id: &str, fields: &TaskFields) -> Result<(), TaskApiError> {
        let builder = self
            .request(Method::POST, &Self::task_path(id, "")?)?
            .json(fields);
        Self::send(builder).await?;
        Ok(())
    }

    pub async fn close(&self, id: &str) -> Result<(), TaskApiError> {
        let builder = self.request(Method::POST, &Self::task_path(id, "/close")?)?;
        Self::send(builder).await?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<(), TaskApiError> {
        let builder = self.request(Method::DELETE, &Self::task_path(id, "")?)?;
        Self::send(builder).await?;
        Ok(())
    }
}

fn priority_schema(description: &str) -> Value {
    json!({ "type": "integer", "enum": [1, 2, 3, 4], "description": description })
}

/// Create a task
pub struct CreateTaskTool {
    api: TaskApiClient,
}

impl CreateTaskTool {
    pub fn new(api: TaskApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ToolTrait for CreateTaskTool {
    fn name(&self) -> &str {
        "CreateTask"
    }

    fn description(&self) -> &str {
        "Create a new task on the to-do list."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "A short, concise title of the task. Do not include date, time or priority here."
                },
                "description": {
                    "type": "string",
                    "description": "Extra details beyond the title. Leave empty when there are none; never repeat the title."
                },
                "priority": priority_schema("Priority level. 4 is highest (urgent), 1 is lowest. Default is 1."),
                "due_string": {
                    "type": "string",
                    "description": "Natural language date/time such as \"tomorrow\" or \"next Monday at 10am\", taken strictly from the user's words."
                }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let fields = match parse_args::<TaskFields>(args) {
            Ok(fields) => fields.normalized(),
            Err(text) => return Ok(text),
        };
        if fields.content.is_none() {
            return Ok("Error: Argument 'content' is missing. Please provide the task title.".to_string());
        }
        if let Some(error) = fields.priority_error() {
            return Ok(error);
        }

        Ok(match self.api.create(&fields).await {
            Ok(task) => {
                info!("Created task {}", task.id);
                format!(
                    "Task created. ID: {}, Content: {}, Priority: {}",
                    task.id, task.content, task.priority
                )
            }
            Err(e) => e.to_string(),
        })
    }
}

#[derive(Deserialize)]
struct GetTasksArgs {
    #[serde(default)]
    filter: Option<String>,
}

/// List active tasks
pub struct GetTasksTool {
    api: TaskApiClient,
}

impl GetTasksTool {
    pub fn new(api: TaskApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ToolTrait for GetTasksTool {
    fn name(&self) -> &str {
        "GetTasks"
    }

    fn description(&self) -> &str {
        "Retrieve active tasks."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "filter": {
                    "type": "string",
                    "description": "A single native filter such as \"today\", \"tomorrow\" or \"overdue\". \
To search by keyword or topic, leave this empty, fetch all tasks and pick the matching ones yourself."
                }
            },
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let args: GetTasksArgs = match parse_args(args) {
            Ok(args) => args,
            Err(text) => return Ok(text),
        };
        let filter = args.filter.as_deref().map(str::trim).filter(|f| !f.is_empty());

        Ok(match self.api.list(filter).await {
            Ok(tasks) if tasks.is_empty() => "No active tasks.".to_string(),
            Ok(tasks) => tasks
                .iter()
                .map(Task::render)
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => e.to_string(),
        })
    }
}

/// Change fields of an existing task
pub struct UpdateTaskTool {
    api: TaskApiClient,
}

impl UpdateTaskTool {
    pub fn new(api: TaskApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ToolTrait for UpdateTaskTool {
    fn name(&self) -> &str {
        "UpdateTask"
    }

    fn description(&self) -> &str {
        "Update an existing task. If you don't know the task ID, use GetTasks to find it."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_id": {
                    "type": "string",
                    "description": "ID of the task to update. Don't guess it; use GetTasks."
                },
                "content": { "type": "string", "description": "New title. Omit to keep it unchanged." },
                "description": { "type": "string", "description": "New description. Omit to keep it unchanged." },
                "priority": priority_schema("New priority (1-4, 4 is highest). Omit to keep it unchanged."),
                "due_string": { "type": "string", "description": "New natural language due date. Omit to keep it unchanged." }
            },
            "required": ["task_id"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let Some(task_id) = task_id_arg(&args) else {
            return Ok(missing_id("update"));
        };
        let fields = match parse_args::<TaskFields>(args) {
            Ok(fields) => fields.normalized(),
            Err(text) => return Ok(text),
        };
        if fields.is_empty() {
            return Ok("No data to update".to_string());
        }
        if let Some(error) = fields.priority_error() {
            return Ok(error);
        }

        Ok(match self.api.update(&task_id, &fields).await {
            Ok(()) => format!("Successfully updated task (ID: {}).", task_id),
            Err(e) => e.to_string(),
        })
    }
}

#[derive(Deserialize)]
struct CloseTaskArgs {
    #[serde(default)]
    task_name: Option<String>,
}

/// Mark a task as completed, by id or by name
pub struct CloseTaskTool {
    api: TaskApiClient,
    provider: Arc<dyn Provider>,
    model: String,
    lookup_timeout: Duration,
}

impl CloseTaskTool {
    pub fn new(
        api: TaskApiClient,
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            api,
            provider,
            model: model.into(),
            lookup_timeout,
        }
    }

    /// Ask the model which active task `name` refers to
    async fn resolve_by_name(&self, name: &str) -> Result<String, String> {
        let tasks = self.api.list(None).await.map_err(|e| e.to_string())?;
        if tasks.is_empty() {
            return Err("No active tasks.".to_string());
        }

        let listing = tasks
            .iter()
            .map(Task::render)
            .collect::<Vec<_>>()
            .join("\n");
        let messages = vec![
            Message::system(LOOKUP_INSTRUCTION),
            Message::user(format!("Task name: {}\n\nActive tasks:\n{}", name, listing)),
        ];

        debug!("Resolving task '{}' among {} tasks", name, tasks.len());
        let answer = match tokio::time::timeout(
            self.lookup_timeout,
            complete_text(self.provider.as_ref(), &self.model, messages),
        )
        .await
        {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => return Err(format!("Error: task lookup failed: {}", e)),
            Err(_) => {
                return Err(format!(
                    "Error: task lookup timed out after {}s",
                    self.lookup_timeout.as_secs()
                ))
            }
        };

        let candidate = answer
            .trim()
            .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '[' | ']' | '.'))
            .trim_start_matches("ID:")
            .trim();

        if candidate.eq_ignore_ascii_case("NONE") {
            return Err(format!("Error: no active task matches '{}'", name));
        }
        match tasks.iter().find(|t| t.id == candidate) {
            Some(task) => Ok(task.id.clone()),
            None => {
                warn!("Task lookup answered with unknown id {:?}", candidate);
                Err(format!(
                    "Error: could not identify a task named '{}' (lookup answered '{}')",
                    name, candidate
                ))
            }
        }
    }
}

#[async_trait]
impl ToolTrait for CloseTaskTool {
    fn name(&self) -> &str {
        "CloseTask"
    }

    fn description(&self) -> &str {
        "Mark a task as completed. Pass task_id when known, otherwise task_name."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_id": {
                    "type": "string",
                    "description": "ID of the task to close. Don't guess it; use GetTasks or task_name."
                },
                "task_name": {
                    "type": "string",
                    "description": "Name of the task to close when its ID is unknown."
                }
            },
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let task_id = match task_id_arg(&args) {
            Some(id) => id,
            None => {
                let CloseTaskArgs { task_name } = match parse_args(args) {
                    Ok(args) => args,
                    Err(text) => return Ok(text),
                };
                match task_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
                    Some(name) => match self.resolve_by_name(name).await {
                        Ok(id) => id,
                        Err(text) => return Ok(text),
                    },
                    None => return Ok(missing_id("close")),
                }
            }
        };

        Ok(match self.api.close(&task_id).await {
            Ok(()) => {
                info!("Closed task {}", task_id);
                format!("Successfully closed task (ID: {}).", task_id)
            }
            Err(e) => e.to_string(),
        })
    }
}

/// Delete a task
pub struct DeleteTaskTool {
    api: TaskApiClient,
}

impl DeleteTaskTool {
    pub fn new(api: TaskApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ToolTrait for DeleteTaskTool {
    fn name(&self) -> &str {
        "DeleteTask"
    }

    fn description(&self) -> &str {
        "Delete a task that is unnecessary or outdated. If you don't know the task ID, use GetTasks to find it."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_id": {
                    "type": "string",
                    "description": "ID of the task to delete. Don't guess it; use GetTasks."
                }
            },
            "required": ["task_id"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let Some(task_id) = task_id_arg(&args) else {
            return Ok(missing_id("delete"));
        };

        Ok(match self.api.delete(&task_id).await {
            Ok(()) => format!("Successfully deleted task (ID: {}).", task_id),
            Err(e) => e.to_string(),
        })
    }
}
