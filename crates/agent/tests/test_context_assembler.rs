//! Tests for prompt assembly

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;

use synthia_agent::ContextAssembler;
use synthia_config::{
    AgentMode, AgentProfile, ProfileCatalog, ProfileStore, FALLBACK_INSTRUCTION,
    FALLBACK_PROFILE_NAME,
};
use synthia_memory::{EmptyMemory, MemoryError, MemoryHit, MemorySearch};
use synthia_provider::{ProviderError, Role};
use synthia_session::{Conversation, Turn};

/// Returns canned hits and records the requested limit
struct CannedMemory {
    hits: Vec<&'static str>,
    last_limit: Mutex<Option<usize>>,
}

#[async_trait]
impl MemorySearch for CannedMemory {
    async fn search(&self, _query: &str, limit: usize) -> synthia_memory::Result<Vec<MemoryHit>> {
        *self.last_limit.lock().unwrap() = Some(limit);
        Ok(self
            .hits
            .iter()
            .take(limit)
            .enumerate()
            .map(|(i, content)| MemoryHit {
                content: content.to_string(),
                distance: i as f32 * 0.1,
            })
            .collect())
    }
}

struct FailingMemory;

#[async_trait]
impl MemorySearch for FailingMemory {
    async fn search(&self, _query: &str, _limit: usize) -> synthia_memory::Result<Vec<MemoryHit>> {
        Err(MemoryError::Embedding(ProviderError::RateLimited))
    }
}

fn profiles_with_coder() -> Arc<ProfileStore> {
    let mut catalog = ProfileCatalog::starter();
    let mut coder = AgentMode::new("coder", "Code Helper");
    coder.context_message_limit = 2;
    coder.rag_result_limit = 1;
    catalog.upsert_mode(coder);
    Arc::new(ProfileStore::new(catalog))
}

fn conversation_with(turns: usize) -> Conversation {
    let mut conversation = Conversation::new("cli:ctx");
    for i in 0..turns {
        if i % 2 == 0 {
            conversation.push(Turn::user(format!("question {}", i)));
        } else {
            conversation.push(Turn::assistant(format!("answer {}", i)));
        }
    }
    conversation
}

#[tokio::test]
async fn test_resolve_default_profile() {
    let assembler = ContextAssembler::new(profiles_with_coder(), Arc::new(EmptyMemory));
    let profile = assembler.resolve_profile(&Conversation::new("c")).await;
    assert_eq!(profile.key, "default");
    assert_eq!(profile.name, "Synthia");
}

#[tokio::test]
async fn test_resolve_override_profile() {
    let assembler = ContextAssembler::new(profiles_with_coder(), Arc::new(EmptyMemory));
    let mut conversation = Conversation::new("c");
    conversation.profile = Some("coder".to_string());

    let profile = assembler.resolve_profile(&conversation).await;
    assert_eq!(profile.name, "Code Helper");
}

#[tokio::test]
async fn test_unknown_override_falls_back_to_default() {
    let assembler = ContextAssembler::new(profiles_with_coder(), Arc::new(EmptyMemory));
    let mut conversation = Conversation::new("c");
    conversation.profile = Some("deleted".to_string());

    let profile = assembler.resolve_profile(&conversation).await;
    assert_eq!(profile.key, "default");
}

#[tokio::test]
async fn test_profile_activated_elsewhere_applies_next_turn() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("profiles.json");
    let mut catalog = ProfileCatalog::starter();
    catalog.upsert_mode(AgentMode::new("coder", "Code Helper"));
    catalog.save_to(&path).await.unwrap();

    let assembler = ContextAssembler::new(
        Arc::new(ProfileStore::open(&path).await.unwrap()),
        Arc::new(EmptyMemory),
    );
    let conversation = Conversation::new("c");
    assert_eq!(assembler.resolve_profile(&conversation).await.key, "default");

    ProfileStore::open(&path)
        .await
        .unwrap()
        .activate("coder")
        .await
        .unwrap();
    assert_eq!(assembler.resolve_profile(&conversation).await.key, "coder");
}

#[tokio::test]
async fn test_unreadable_catalogue_keeps_loaded_profiles() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("profiles.json");
    ProfileCatalog::starter().save_to(&path).await.unwrap();

    let assembler = ContextAssembler::new(
        Arc::new(ProfileStore::open(&path).await.unwrap()),
        Arc::new(EmptyMemory),
    );
    tokio::fs::write(&path, "{ broken").await.unwrap();

    let profile = assembler.resolve_profile(&Conversation::new("c")).await;
    assert_eq!(profile.name, "Synthia");
}

#[tokio::test]
async fn test_no_profiles_uses_fallback() {
    let assembler = ContextAssembler::new(
        Arc::new(ProfileStore::new(ProfileCatalog::default())),
        Arc::new(EmptyMemory),
    );
    let profile = assembler.resolve_profile(&Conversation::new("c")).await;
    assert_eq!(profile.name, FALLBACK_PROFILE_NAME);
    assert_eq!(profile.system_instruction, FALLBACK_INSTRUCTION);
}

#[tokio::test]
async fn test_empty_memory_keeps_related_threads_section() {
    let assembler = ContextAssembler::new(profiles_with_coder(), Arc::new(EmptyMemory));
    let profile = AgentProfile::fallback();

    let context = assembler
        .assemble(&Conversation::new("c"), &profile, "hello")
        .await;

    assert!(context
        .system_content
        .starts_with(&format!("{}\n\nRelated Threads:\n\n", FALLBACK_INSTRUCTION)));
    assert!(context.system_content.contains("Current date and time: "));
    assert!(context.prior_turns.is_empty());
}

#[tokio::test]
async fn test_memory_failure_is_zero_results() {
    let assembler = ContextAssembler::new(profiles_with_coder(), Arc::new(FailingMemory));
    let context = assembler
        .assemble(&Conversation::new("c"), &AgentProfile::fallback(), "hello")
        .await;
    assert!(context.system_content.contains("Related Threads:\n\n"));
}

#[tokio::test]
async fn test_related_threads_use_rag_limit() {
    let memory = Arc::new(CannedMemory {
        hits: vec!["Owns a cat", "Likes jazz", "Lives in Gdańsk"],
        last_limit: Mutex::new(None),
    });
    let assembler = ContextAssembler::new(profiles_with_coder(), memory.clone());
    let mut profile = AgentProfile::fallback();
    profile.rag_result_limit = 2;

    let context = assembler
        .assemble(&Conversation::new("c"), &profile, "music?")
        .await;

    assert_eq!(*memory.last_limit.lock().unwrap(), Some(2));
    assert!(context
        .system_content
        .contains("Related Threads:\nOwns a cat\nLikes jazz\n\n"));
    assert!(!context.system_content.contains("Gdańsk"));
}

#[tokio::test]
async fn test_history_bounded_and_chronological() {
    let assembler = ContextAssembler::new(profiles_with_coder(), Arc::new(EmptyMemory));
    let mut profile = AgentProfile::fallback();
    profile.context_message_limit = 3;

    let context = assembler
        .assemble(&conversation_with(6), &profile, "next")
        .await;

    let roles: Vec<Role> = context.prior_turns.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::Assistant, Role::User, Role::Assistant]);
    let contents: Vec<&str> = context
        .prior_turns
        .iter()
        .map(|m| m.content.as_deref().unwrap())
        .collect();
    assert!(contents[0].ends_with("] answer 3"));
    assert!(contents[2].ends_with("] answer 5"));

    let messages = context.messages("next");
    assert_eq!(messages.len(), 5);
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(messages[4].content.as_deref(), Some("next"));
}
