//! CLI tests for the synthia binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

/// A synthia command whose home directory is a fresh temp dir
fn synthia(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_synthia"));
    cmd.env("HOME", home)
        .env_remove("OPENAI_API_KEY")
        .env_remove("TODOIST_API_KEY")
        .env_remove("RUST_LOG");
    cmd
}

fn initialized_home() -> TempDir {
    let home = TempDir::new().unwrap();
    synthia(home.path()).arg("init").assert().success();
    home
}

#[test]
fn test_help_flag() {
    let home = TempDir::new().unwrap();
    synthia(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Personal AI assistant with tools and long-term memory",
        ))
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("profile"));
}

#[test]
fn test_version_flag() {
    let home = TempDir::new().unwrap();
    synthia(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_no_args_shows_usage() {
    let home = TempDir::new().unwrap();
    synthia(home.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_invalid_command() {
    let home = TempDir::new().unwrap();
    synthia(home.path())
        .arg("deploy")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_chat_help_lists_options() {
    let home = TempDir::new().unwrap();
    synthia(home.path())
        .args(["chat", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--message"))
        .stdout(predicate::str::contains("--conversation"))
        .stdout(predicate::str::contains("--audio"));
}

#[test]
fn test_chat_message_conflicts_with_audio() {
    let home = TempDir::new().unwrap();
    synthia(home.path())
        .args(["chat", "-m", "hi", "--audio", "note.ogg"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_learn_requires_fact() {
    let home = TempDir::new().unwrap();
    synthia(home.path())
        .arg("learn")
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_profile_use_requires_key_or_clear() {
    let home = TempDir::new().unwrap();
    synthia(home.path())
        .args(["profile", "use", "cli:default"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_profile_use_key_conflicts_with_clear() {
    let home = TempDir::new().unwrap();
    synthia(home.path())
        .args(["profile", "use", "cli:default", "default", "--clear"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_init_creates_data_files() {
    let home = TempDir::new().unwrap();
    synthia(home.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initializing Synthia"));

    let data = home.path().join(".synthia");
    assert!(data.join("config.json").exists());
    assert!(data.join("profiles.json").exists());
    assert!(data.join("conversations").is_dir());

    let config: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(data.join("config.json")).unwrap())
            .unwrap();
    assert!(config.get("agent").is_some());
}

#[test]
fn test_init_twice_keeps_config() {
    let home = initialized_home();
    let path = home.path().join(".synthia/config.json");
    std::fs::write(&path, r#"{"agent": {"model": "custom-model"}}"#).unwrap();

    synthia(home.path()).arg("init").assert().success();

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("custom-model"));
}

#[test]
fn test_profile_list_marks_default() {
    let home = initialized_home();
    synthia(home.path())
        .args(["profile", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("* default"))
        .stdout(predicate::str::contains("Synthia"));
}

#[test]
fn test_profile_list_without_catalogue() {
    let home = TempDir::new().unwrap();
    synthia(home.path())
        .args(["profile", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No profiles"));
}

#[test]
fn test_profile_activate_unknown() {
    let home = initialized_home();
    synthia(home.path())
        .args(["profile", "activate", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown profile: ghost"));
}

#[test]
fn test_profile_activate_default() {
    let home = initialized_home();
    synthia(home.path())
        .args(["profile", "activate", "default"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Profile default is now the default"));
}

#[test]
fn test_profile_use_unknown() {
    let home = initialized_home();
    synthia(home.path())
        .args(["profile", "use", "cli:default", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown profile: ghost"));
}

#[test]
fn test_profile_use_and_clear() {
    let home = initialized_home();
    synthia(home.path())
        .args(["profile", "use", "telegram:42", "default"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Conversation telegram:42 now uses profile default",
        ));

    synthia(home.path())
        .args(["profile", "use", "telegram:42", "--clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("uses the default profile"));

    synthia(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Conversations: 1"));
}

#[test]
fn test_status_before_init() {
    let home = TempDir::new().unwrap();
    synthia(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Synthia Status"))
        .stdout(predicate::str::contains("[Missing]"))
        .stdout(predicate::str::contains("Memories:      0"));
}

#[test]
fn test_status_after_init() {
    let home = initialized_home();
    synthia(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("[OK]"))
        .stdout(predicate::str::contains("Profile:       Synthia"))
        .stdout(predicate::str::contains("gpt-5-nano"));
}

#[test]
fn test_status_reports_api_key_from_env() {
    let home = initialized_home();
    synthia(home.path())
        .env("OPENAI_API_KEY", "sk-test")
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("API Key:       [Set]"));
}

#[test]
fn test_chat_without_api_key_fails() {
    let home = initialized_home();
    synthia(home.path())
        .args(["chat", "-m", "hello"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No API key configured"));
}

#[test]
fn test_learn_without_api_key_fails() {
    let home = initialized_home();
    synthia(home.path())
        .args(["learn", "I", "own", "a", "cat"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No API key configured"));
}
