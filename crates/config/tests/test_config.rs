//! Tests for Config serialization, defaults and environment overrides

use serial_test::serial;
use std::time::Duration;
use synthia_config::{
    AgentDefaults, Config, MemoryConfig, ProviderConfig, TaskApiConfig, OPENAI_API_KEY_ENV,
    TASK_API_KEY_ENV,
};
use tempfile::TempDir;

fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

#[test]
fn test_config_defaults() {
    let config = Config::default();

    assert_eq!(config.agent.model, "gpt-5-nano");
    assert_eq!(config.agent.max_tokens, 4096);
    assert_eq!(config.agent.temperature, 0.7);
    assert_eq!(config.agent.completion_timeout_secs, 60);
    assert_eq!(config.agent.tool_timeout_secs, 30);
    assert_eq!(config.agent.max_parallel_tools, 4);

    assert!(config.provider.api_key.is_empty());
    assert!(config.provider.api_base.is_none());
    assert_eq!(config.provider.timeout_secs, 60);

    assert!(config.tasks.api_key.is_empty());
    assert_eq!(config.tasks.api_base, "https://api.todoist.com/api/v1");
    assert_eq!(config.tasks.timeout_secs, 15);

    assert_eq!(config.memory.embedding_model, "text-embedding-3-small");
}

#[test]
fn test_section_defaults_match_root() {
    let config = Config::default();
    assert_eq!(AgentDefaults::default().model, config.agent.model);
    assert_eq!(ProviderConfig::default().timeout_secs, config.provider.timeout_secs);
    assert_eq!(TaskApiConfig::default().api_base, config.tasks.api_base);
    assert_eq!(
        MemoryConfig::default().embedding_model,
        config.memory.embedding_model
    );
}

#[test]
fn test_partial_json_fills_defaults() {
    let json = r#"{"agent": {"model": "gpt-4o-mini"}, "tasks": {"api_key": "tk"}}"#;
    let config: Config = serde_json::from_str(json).unwrap();

    assert_eq!(config.agent.model, "gpt-4o-mini");
    assert_eq!(config.agent.tool_timeout_secs, 30);
    assert_eq!(config.tasks.api_key, "tk");
    assert_eq!(config.tasks.timeout_secs, 15);
    assert_eq!(config.provider.timeout_secs, 60);
}

#[test]
fn test_empty_json_is_default() {
    let config: Config = serde_json::from_str("{}").unwrap();
    assert_eq!(config.agent.model, Config::default().agent.model);
}

#[tokio::test]
async fn test_save_and_load_roundtrip() {
    let dir = temp_dir();
    let path = dir.path().join("nested").join("config.json");

    let mut config = Config::default();
    config.agent.model = "custom-model".to_string();
    config.provider.api_base = Some("http://localhost:8000/v1".to_string());
    config.save_to(&path).await.unwrap();

    let loaded = Config::load_from(&path).await.unwrap();
    assert_eq!(loaded.agent.model, "custom-model");
    assert_eq!(
        loaded.provider.api_base.as_deref(),
        Some("http://localhost:8000/v1")
    );
}

#[tokio::test]
async fn test_load_missing_file_returns_defaults() {
    let dir = temp_dir();
    let config = Config::load_from(&dir.path().join("absent.json"))
        .await
        .unwrap();
    assert_eq!(config.agent.model, "gpt-5-nano");
}

#[tokio::test]
async fn test_load_malformed_file_is_error() {
    let dir = temp_dir();
    let path = dir.path().join("config.json");
    tokio::fs::write(&path, "{ not json").await.unwrap();

    let err = Config::load_from(&path).await.unwrap_err();
    assert!(err.to_string().contains("malformed config"));
}

#[test]
fn test_timeouts_are_never_zero() {
    let mut config = Config::default();
    config.agent.completion_timeout_secs = 0;
    config.agent.tool_timeout_secs = 0;
    config.tasks.timeout_secs = 0;

    assert_eq!(config.completion_timeout(), Duration::from_secs(1));
    assert_eq!(config.tool_timeout(), Duration::from_secs(1));
    assert_eq!(config.task_timeout(), Duration::from_secs(1));
}

#[test]
fn test_api_base_empty_is_none() {
    let mut config = Config::default();
    config.provider.api_base = Some(String::new());
    assert!(config.api_base().is_none());
}

#[test]
#[serial]
fn test_api_key_from_file() {
    std::env::remove_var(OPENAI_API_KEY_ENV);
    let mut config = Config::default();
    assert!(!config.has_api_key());

    config.provider.api_key = "sk-file".to_string();
    assert_eq!(config.api_key().as_deref(), Some("sk-file"));
}

#[test]
#[serial]
fn test_api_key_env_overrides_file() {
    std::env::set_var(OPENAI_API_KEY_ENV, "sk-env");
    let mut config = Config::default();
    config.provider.api_key = "sk-file".to_string();

    assert_eq!(config.api_key().as_deref(), Some("sk-env"));
    std::env::remove_var(OPENAI_API_KEY_ENV);
}

#[test]
#[serial]
fn test_task_api_key_env_override() {
    std::env::remove_var(TASK_API_KEY_ENV);
    let mut config = Config::default();
    assert!(config.task_api_key().is_none());

    config.tasks.api_key = "file-token".to_string();
    assert_eq!(config.task_api_key().as_deref(), Some("file-token"));

    std::env::set_var(TASK_API_KEY_ENV, "env-token");
    assert_eq!(config.task_api_key().as_deref(), Some("env-token"));
    std::env::remove_var(TASK_API_KEY_ENV);
}
