//! Context assembler: system persona, related memories and recent history

use chrono::{DateTime, Local};
use std::sync::Arc;
use tracing::{debug, warn};

use synthia_config::{AgentProfile, ProfileStore};
use synthia_memory::MemorySearch;
use synthia_provider::{Message, Role};
use synthia_session::Conversation;

/// Prompt material for one turn
#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub system_content: String,
    pub prior_turns: Vec<Message>,
}

impl AssembledContext {
    /// `[system, ...history, user]`
    pub fn messages(&self, user_text: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.prior_turns.len() + 2);
        messages.push(Message::system(self.system_content.clone()));
        messages.extend(self.prior_turns.iter().cloned());
        messages.push(Message::user(user_text));
        messages
    }
}

/// Persona instruction, then the related threads block, then the clock
pub fn build_system_content(instruction: &str, memories: &[String], now: DateTime<Local>) -> String {
    format!(
        "{}\n\nRelated Threads:\n{}\n\nCurrent date and time: {}",
        instruction,
        memories.join("\n"),
        now.format("%Y-%m-%d %H:%M (%A)")
    )
}

/// Builds the prompt for a conversation; never writes anything
pub struct ContextAssembler {
    profiles: Arc<ProfileStore>,
    memory: Arc<dyn MemorySearch>,
}

impl ContextAssembler {
    pub fn new(profiles: Arc<ProfileStore>, memory: Arc<dyn MemorySearch>) -> Self {
        Self { profiles, memory }
    }

    /// Override profile if known, else the default, else the fallback
    ///
    /// The catalogue is re-read first so activations made elsewhere apply to
    /// the next turn; a failed read keeps the last good catalogue.
    pub async fn resolve_profile(&self, conversation: &Conversation) -> AgentProfile {
        if let Err(e) = self.profiles.reload().await {
            warn!("Failed to reload profiles, keeping the loaded ones: {}", e);
        }

        if let Some(key) = &conversation.profile {
            match self.profiles.profile(key).await {
                Some(profile) => return profile,
                None => warn!(
                    "Conversation {} names unknown profile {}, using default",
                    conversation.key, key
                ),
            }
        }

        match self.profiles.default_profile().await {
            Some(profile) => profile,
            None => {
                debug!("No default profile configured, using fallback");
                AgentProfile::fallback()
            }
        }
    }

    pub async fn assemble(
        &self,
        conversation: &Conversation,
        profile: &AgentProfile,
        user_text: &str,
    ) -> AssembledContext {
        let memories = match self.memory.search(user_text, profile.rag_result_limit).await {
            Ok(hits) => hits.into_iter().map(|h| h.content).collect(),
            Err(e) => {
                warn!("Memory search failed, continuing without: {}", e);
                Vec::new()
            }
        };
        debug!("Related threads: {}", memories.len());

        // Only plain user/assistant turns are replayed as history
        let prior_turns: Vec<Message> = conversation
            .recent(profile.context_message_limit)
            .iter()
            .filter(|t| matches!(t.role, Role::User | Role::Assistant))
            .map(|t| t.to_context_message())
            .collect();

        AssembledContext {
            system_content: build_system_content(
                &profile.system_instruction,
                &memories,
                Local::now(),
            ),
            prior_turns,
        }
    }
}
