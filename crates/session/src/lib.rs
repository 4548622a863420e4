//! Conversation storage
//!
//! A [`Conversation`] is an append-only log of [`Turn`]s. The agent loop only
//! sees the [`ConversationStore`] trait; [`FileConversationStore`] keeps one
//! JSON file per conversation.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use synthia_provider::{Message, Role, ToolCall};

/// Storage errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupted conversation file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("conversation file for {expected} holds {found}")]
    KeyMismatch { expected: String, found: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// One role-tagged entry in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    pub timestamp: DateTime<Local>,
    /// Calls requested by an assistant turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Call answered by a tool turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_model_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_used_name: Option<String>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Local::now(),
            tool_calls: Vec::new(),
            call_id: None,
            ai_model_used: None,
            prompt_used_name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Record which model and persona produced this turn
    pub fn with_audit(mut self, model: impl Into<String>, prompt_name: impl Into<String>) -> Self {
        self.ai_model_used = Some(model.into());
        self.prompt_used_name = Some(prompt_name.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Local>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Render for the model as `[YYYY-MM-DD HH:MM] content`
    pub fn to_context_message(&self) -> Message {
        let stamped = format!("[{}] {}", self.timestamp.format("%Y-%m-%d %H:%M"), self.content);
        Message::new(self.role, Some(stamped))
    }
}

/// A conversation and its per-conversation overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub key: String,
    /// Profile key overriding the default persona
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    /// Model overriding the persona/default model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub created_at: DateTime<Local>,
    pub updated_at: DateTime<Local>,
    #[serde(default)]
    pub turns: Vec<Turn>,
}

impl Conversation {
    pub fn new(key: impl Into<String>) -> Self {
        let now = Local::now();
        Self {
            key: key.into(),
            profile: None,
            model: None,
            created_at: now,
            updated_at: now,
            turns: Vec::new(),
        }
    }

    /// Append a turn; existing turns are never modified
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.updated_at = Local::now();
    }

    /// Up to `limit` most recent turns, oldest first
    pub fn recent(&self, limit: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(limit);
        &self.turns[start..]
    }
}

/// Persistence contract consumed by the agent loop
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Fetch a conversation, creating an empty one when unknown
    async fn load_or_create(&self, key: &str) -> Result<Conversation>;

    /// Append a turn to a conversation
    async fn append(&self, key: &str, turn: Turn) -> Result<()>;

    /// Up to `limit` most recent turns in chronological order
    async fn recent(&self, key: &str, limit: usize) -> Result<Vec<Turn>>;

    async fn set_profile(&self, key: &str, profile: Option<String>) -> Result<()>;

    async fn set_model(&self, key: &str, model: Option<String>) -> Result<()>;

    /// Keys of all stored conversations
    async fn list(&self) -> Result<Vec<String>>;
}

/// Map a conversation key to a file stem
///
/// ASCII letters, digits, `.` and `-` are kept; every other byte, `_`
/// included, becomes `_xx` hex, so distinct keys never share a file.
pub fn safe_file_stem(key: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let re = UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9.-]").unwrap());
    re.replace_all(key, |caps: &Captures| {
        caps[0].bytes().map(|b| format!("_{:02x}", b)).collect::<String>()
    })
    .into_owned()
}

/// One JSON file per conversation
///
/// Every call reads the file, so overrides written by another process are
/// seen on the next turn. Read-modify-write cycles are serialized.
pub struct FileConversationStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileConversationStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).ok();

        Self {
            dir,
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", safe_file_stem(key)))
    }

    /// `None` only when the conversation has no file yet
    async fn read(&self, key: &str) -> Result<Option<Conversation>> {
        let path = self.path_for(key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!("Failed to read conversation {}: {}", key, e);
                return Err(e.into());
            }
        };

        let conversation: Conversation = serde_json::from_str(&content).map_err(|e| {
            warn!("Failed to parse conversation {} at {:?}: {}", key, path, e);
            e
        })?;
        if conversation.key != key {
            warn!(
                "Conversation file {:?} belongs to {}, not {}",
                path, conversation.key, key
            );
            return Err(StoreError::KeyMismatch {
                expected: key.to_string(),
                found: conversation.key,
            });
        }

        debug!("Loaded conversation: {}", key);
        Ok(Some(conversation))
    }

    async fn write(&self, conversation: &Conversation) -> Result<()> {
        let content = serde_json::to_string_pretty(conversation)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.path_for(&conversation.key), content).await?;
        debug!("Saved conversation: {}", conversation.key);
        Ok(())
    }

    /// Run `f` against the stored conversation, then persist it
    async fn update<F>(&self, key: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut Conversation) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut conversation = self
            .read(key)
            .await?
            .unwrap_or_else(|| Conversation::new(key));
        f(&mut conversation);
        self.write(&conversation).await
    }
}

#[async_trait]
impl ConversationStore for FileConversationStore {
    async fn load_or_create(&self, key: &str) -> Result<Conversation> {
        Ok(self
            .read(key)
            .await?
            .unwrap_or_else(|| Conversation::new(key)))
    }

    async fn append(&self, key: &str, turn: Turn) -> Result<()> {
        self.update(key, |c| c.push(turn)).await
    }

    async fn recent(&self, key: &str, limit: usize) -> Result<Vec<Turn>> {
        let conversation = self.load_or_create(key).await?;
        Ok(conversation.recent(limit).to_vec())
    }

    async fn set_profile(&self, key: &str, profile: Option<String>) -> Result<()> {
        self.update(key, |c| c.profile = profile).await
    }

    async fn set_model(&self, key: &str, model: Option<String>) -> Result<()> {
        self.update(key, |c| c.model = model).await
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str::<Conversation>(&content) {
                Ok(conversation) => keys.push(conversation.key),
                Err(e) => warn!("Skipping unreadable conversation {:?}: {}", path, e),
            }
        }

        keys.sort();
        Ok(keys)
    }
}
