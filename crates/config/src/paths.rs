//! Path utilities

use std::path::{Path, PathBuf};

/// Data directory (~/.synthia)
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".synthia"))
        .unwrap_or_else(|| PathBuf::from(".synthia"))
}

/// Runtime configuration file
pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

/// Persona catalogue
pub fn profiles_path() -> PathBuf {
    data_dir().join("profiles.json")
}

/// One JSON file per conversation lives here
pub fn conversations_dir() -> PathBuf {
    data_dir().join("conversations")
}

/// Long-term memory store
pub fn memory_path() -> PathBuf {
    data_dir().join("memory.json")
}

/// Ensure directory exists
pub async fn ensure_dir(path: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(path).await
}
