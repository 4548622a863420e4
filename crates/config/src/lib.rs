//! Configuration management for Synthia
//!
//! Runtime settings live in `~/.synthia/config.json`; persona definitions in
//! `~/.synthia/profiles.json` (see [`profile`]).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod paths;
pub mod profile;

pub use paths::{config_path, conversations_dir, data_dir, memory_path, profiles_path};
pub use profile::{
    AgentMode, AgentProfile, IdentityModule, PersonalityTrait, ProfileCatalog, ProfileStore,
    FALLBACK_INSTRUCTION, FALLBACK_PROFILE_NAME,
};

/// Environment variable overriding the completion service key
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable overriding the task API key
pub const TASK_API_KEY_ENV: &str = "TODOIST_API_KEY";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown profile: {0}")]
    UnknownProfile(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Completion service connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: None,
            timeout_secs: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// Agent loop defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefaults {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_completion_timeout")]
    pub completion_timeout_secs: u64,
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,
    #[serde(default = "default_max_parallel_tools")]
    pub max_parallel_tools: usize,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            completion_timeout_secs: default_completion_timeout(),
            tool_timeout_secs: default_tool_timeout(),
            max_parallel_tools: default_max_parallel_tools(),
        }
    }
}

fn default_model() -> String {
    "gpt-5-nano".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.7
}

fn default_completion_timeout() -> u64 {
    60
}

fn default_tool_timeout() -> u64 {
    30
}

fn default_max_parallel_tools() -> usize {
    4
}

/// Task management API access
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskApiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_task_api_base")]
    pub api_base: String,
    #[serde(default = "default_task_timeout")]
    pub timeout_secs: u64,
}

impl Default for TaskApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_task_api_base(),
            timeout_secs: default_task_timeout(),
        }
    }
}

fn default_task_api_base() -> String {
    "https://api.todoist.com/api/v1".to_string()
}

fn default_task_timeout() -> u64 {
    15
}

/// Long-term memory settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            embedding_model: default_embedding_model(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub agent: AgentDefaults,
    #[serde(default)]
    pub tasks: TaskApiConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

impl Config {
    /// Load from the default location
    pub async fn load() -> Result<Self> {
        let path = config_path();
        Self::load_from(&path).await
    }

    /// Load from specific location
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        debug!("Reading config from {:?}", path);
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save to the default location
    pub async fn save(&self) -> Result<()> {
        let path = config_path();
        self.save_to(&path).await
    }

    /// Save to specific location
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        debug!("Writing config to {:?}", path);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Completion service key; the environment wins over the file
    pub fn api_key(&self) -> Option<String> {
        non_empty_env(OPENAI_API_KEY_ENV).or_else(|| non_empty(&self.provider.api_key))
    }

    /// Completion service base URL, if overridden
    pub fn api_base(&self) -> Option<String> {
        self.provider
            .api_base
            .as_deref()
            .and_then(non_empty)
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }

    /// Task API key; the environment wins over the file
    pub fn task_api_key(&self) -> Option<String> {
        non_empty_env(TASK_API_KEY_ENV).or_else(|| non_empty(&self.tasks.api_key))
    }

    pub fn default_model(&self) -> String {
        self.agent.model.clone()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.timeout_secs.max(1))
    }

    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.agent.completion_timeout_secs.max(1))
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.agent.tool_timeout_secs.max(1))
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.tasks.timeout_secs.max(1))
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().as_deref().and_then(non_empty)
}

/// Create the data directory, default config and default persona catalogue
pub async fn init() -> Result<Config> {
    let config_path = config_path();

    if config_path.exists() {
        warn!("Config already exists at {:?}", config_path);
    } else {
        Config::default().save().await?;
        info!("Config written to {:?}", config_path);
    }

    let profiles_path = profiles_path();
    if !profiles_path.exists() {
        ProfileCatalog::starter().save_to(&profiles_path).await?;
        info!("Profile catalogue written to {:?}", profiles_path);
    }

    paths::ensure_dir(&conversations_dir()).await?;

    Config::load().await
}
