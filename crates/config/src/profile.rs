//! Persona profiles ("modes")
//!
//! A mode combines identity modules and personality traits into a system
//! instruction and carries the per-persona loop limits. At most one mode is
//! the default; [`ProfileStore::activate`] is the only writer of that flag.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{ConfigError, Result};

/// Log name recorded when no profile is configured at all
pub const FALLBACK_PROFILE_NAME: &str = "Hardcoded Fallback";

/// Instruction used when no profile is configured at all
pub const FALLBACK_INSTRUCTION: &str = "You are Synthia, a helpful AI assistant.";

/// A block of persona text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityModule {
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub content: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

/// A named character trait, rendered as a bullet in the instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalityTrait {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Stored persona definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMode {
    pub key: String,
    pub name: String,
    /// Identity module names, in instruction order
    #[serde(default)]
    pub identity_modules: Vec<String>,
    /// Trait names, in bullet order
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub is_default: bool,
    /// Preferred model; the configured default is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_tool_iteration_limit")]
    pub tool_iteration_limit: u32,
    #[serde(default = "default_context_message_limit")]
    pub context_message_limit: usize,
    #[serde(default = "default_rag_result_limit")]
    pub rag_result_limit: usize,
}

impl AgentMode {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            identity_modules: Vec::new(),
            traits: Vec::new(),
            is_default: false,
            model: None,
            tool_iteration_limit: default_tool_iteration_limit(),
            context_message_limit: default_context_message_limit(),
            rag_result_limit: default_rag_result_limit(),
        }
    }
}

fn default_tool_iteration_limit() -> u32 {
    5
}

fn default_context_message_limit() -> usize {
    10
}

fn default_rag_result_limit() -> usize {
    3
}

/// Resolved persona, read-only to the agent loop
#[derive(Debug, Clone, PartialEq)]
pub struct AgentProfile {
    pub key: String,
    pub name: String,
    pub system_instruction: String,
    pub model: Option<String>,
    pub tool_iteration_limit: u32,
    pub context_message_limit: usize,
    pub rag_result_limit: usize,
}

impl AgentProfile {
    /// Profile used when neither an override nor a default exists
    pub fn fallback() -> Self {
        Self {
            key: "fallback".to_string(),
            name: FALLBACK_PROFILE_NAME.to_string(),
            system_instruction: FALLBACK_INSTRUCTION.to_string(),
            model: None,
            tool_iteration_limit: default_tool_iteration_limit(),
            context_message_limit: default_context_message_limit(),
            rag_result_limit: default_rag_result_limit(),
        }
    }
}

/// All persona records
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileCatalog {
    #[serde(default)]
    pub identities: Vec<IdentityModule>,
    #[serde(default)]
    pub traits: Vec<PersonalityTrait>,
    #[serde(default)]
    pub modes: Vec<AgentMode>,
}

impl ProfileCatalog {
    /// Catalogue written by `synthia init`
    pub fn starter() -> Self {
        let mut mode = AgentMode::new("default", "Synthia");
        mode.identity_modules = vec!["core".to_string()];
        mode.traits = vec!["concise".to_string(), "honest".to_string()];
        mode.is_default = true;

        Self {
            identities: vec![IdentityModule {
                name: "core".to_string(),
                category: "identity".to_string(),
                content: FALLBACK_INSTRUCTION.to_string(),
                is_active: true,
            }],
            traits: vec![
                PersonalityTrait {
                    name: "concise".to_string(),
                    description: "answer briefly unless asked for detail".to_string(),
                    is_active: true,
                },
                PersonalityTrait {
                    name: "honest".to_string(),
                    description: "say so when a tool fails or you do not know".to_string(),
                    is_active: true,
                },
            ],
            modes: vec![mode],
        }
    }

    /// Load from disk; a missing file is an empty catalogue
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No profile catalogue at {:?}", path);
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub fn mode(&self, key: &str) -> Option<&AgentMode> {
        self.modes.iter().find(|m| m.key == key)
    }

    pub fn default_mode(&self) -> Option<&AgentMode> {
        self.modes.iter().find(|m| m.is_default)
    }

    /// Insert or replace a mode; a default mode clears the flag on the others
    pub fn upsert_mode(&mut self, mode: AgentMode) {
        if mode.is_default {
            for other in &mut self.modes {
                other.is_default = false;
            }
        }
        match self.modes.iter_mut().find(|m| m.key == mode.key) {
            Some(existing) => *existing = mode,
            None => self.modes.push(mode),
        }
    }

    /// Make `key` the only default mode
    pub fn activate(&mut self, key: &str) -> Result<()> {
        if self.mode(key).is_none() {
            return Err(ConfigError::UnknownProfile(key.to_string()));
        }
        for mode in &mut self.modes {
            mode.is_default = mode.key == key;
        }
        Ok(())
    }

    /// Derive the runtime profile for a stored mode
    pub fn build(&self, mode: &AgentMode) -> AgentProfile {
        let mut sections: Vec<String> = mode
            .identity_modules
            .iter()
            .filter_map(|name| self.identities.iter().find(|i| &i.name == name))
            .filter(|i| i.is_active)
            .map(|i| i.content.clone())
            .collect();

        let traits: Vec<String> = mode
            .traits
            .iter()
            .filter_map(|name| self.traits.iter().find(|t| &t.name == name))
            .filter(|t| t.is_active)
            .map(|t| {
                if t.description.is_empty() {
                    format!("- {}", t.name)
                } else {
                    format!("- {}: {}", t.name, t.description)
                }
            })
            .collect();

        if !traits.is_empty() {
            sections.push(format!("Personality traits:\n{}", traits.join("\n")));
        }

        let system_instruction = if sections.is_empty() {
            debug!("Mode {} has no active identity, using fallback text", mode.key);
            FALLBACK_INSTRUCTION.to_string()
        } else {
            sections.join("\n\n")
        };

        AgentProfile {
            key: mode.key.clone(),
            name: mode.name.clone(),
            system_instruction,
            model: mode.model.clone(),
            tool_iteration_limit: mode.tool_iteration_limit.max(1),
            context_message_limit: mode.context_message_limit,
            rag_result_limit: mode.rag_result_limit,
        }
    }
}

/// Shared persona store with a single writer
pub struct ProfileStore {
    catalog: RwLock<ProfileCatalog>,
    path: Option<PathBuf>,
}

impl ProfileStore {
    /// In-memory store, nothing is written to disk
    pub fn new(catalog: ProfileCatalog) -> Self {
        Self {
            catalog: RwLock::new(catalog),
            path: None,
        }
    }

    /// Store backed by a JSON file
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let catalog = ProfileCatalog::load_from(&path).await?;
        Ok(Self {
            catalog: RwLock::new(catalog),
            path: Some(path),
        })
    }

    /// Re-read the catalogue file; in-memory stores are left as they are
    pub async fn reload(&self) -> Result<()> {
        if let Some(path) = &self.path {
            let fresh = ProfileCatalog::load_from(path).await?;
            *self.catalog.write().await = fresh;
        }
        Ok(())
    }

    /// Resolve a profile by key
    pub async fn profile(&self, key: &str) -> Option<AgentProfile> {
        let catalog = self.catalog.read().await;
        catalog.mode(key).map(|m| catalog.build(m))
    }

    /// Resolve the current default profile
    pub async fn default_profile(&self) -> Option<AgentProfile> {
        let catalog = self.catalog.read().await;
        catalog.default_mode().map(|m| catalog.build(m))
    }

    /// Stored modes, in catalogue order
    pub async fn modes(&self) -> Vec<AgentMode> {
        self.catalog.read().await.modes.clone()
    }

    /// Set `key` as the default and clear every sibling, atomically
    pub async fn activate(&self, key: &str) -> Result<()> {
        let mut catalog = self.catalog.write().await;
        if let Some(path) = &self.path {
            *catalog = ProfileCatalog::load_from(path).await?;
        }
        catalog.activate(key)?;
        if let Some(path) = &self.path {
            catalog.save_to(path).await?;
        }
        info!("Profile {} is now the default", key);
        Ok(())
    }

    /// Insert or replace a mode
    pub async fn upsert(&self, mode: AgentMode) -> Result<()> {
        let mut catalog = self.catalog.write().await;
        if let Some(path) = &self.path {
            *catalog = ProfileCatalog::load_from(path).await?;
        }
        catalog.upsert_mode(mode);
        if let Some(path) = &self.path {
            catalog.save_to(path).await?;
        }
        Ok(())
    }
}
