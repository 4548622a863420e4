//! Synthia command implementations

use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use synthia_agent::tools::{TaskApiClient, ToolRegistry};
use synthia_agent::{AgentLoop, ContextAssembler, LoopSettings};
use synthia_config::{self, Config, ProfileStore};
use synthia_memory::VectorMemory;
use synthia_provider::{OpenAiProvider, Provider};
use synthia_session::{ConversationStore, FileConversationStore};

/// Completion client for the configured account
fn build_provider(config: &Config) -> Result<Arc<OpenAiProvider>> {
    let api_key = config
        .api_key()
        .context("No API key configured. Set OPENAI_API_KEY or add it to ~/.synthia/config.json")?;

    Ok(Arc::new(
        OpenAiProvider::new(api_key, config.api_base(), Some(config.default_model()))
            .with_timeout(config.request_timeout())
            .with_embedding_model(config.memory.embedding_model.clone()),
    ))
}

/// Wire stores, memory and tools into an agent loop
async fn build_agent(
    config: &Config,
    provider: Arc<OpenAiProvider>,
) -> Result<AgentLoop<OpenAiProvider>> {
    let profiles = ProfileStore::open(synthia_config::profiles_path())
        .await
        .context("Failed to load profiles")?;
    let memory = VectorMemory::open(synthia_config::memory_path(), provider.clone())
        .await
        .context("Failed to load memory")?;
    let store = FileConversationStore::new(synthia_config::conversations_dir());

    let tasks = TaskApiClient::from_config(config);
    if !tasks.is_configured() {
        warn!("No task API key configured, task tools will report an error");
    }
    let tools = ToolRegistry::with_defaults(
        tasks,
        provider.clone(),
        config.default_model(),
        config.completion_timeout(),
    );

    Ok(AgentLoop::new(
        provider,
        Arc::new(tools),
        ContextAssembler::new(Arc::new(profiles), Arc::new(memory)),
        Arc::new(store),
        LoopSettings::from_config(config),
    ))
}

/// Initialize configuration and data directory
pub async fn init_command() -> Result<()> {
    println!("Initializing Synthia...");

    synthia_config::init().await?;

    println!("Data directory: {}", synthia_config::data_dir().display());
    println!("\nNext steps:");
    println!("  1. Add your OpenAI API key to ~/.synthia/config.json (or set OPENAI_API_KEY)");
    println!("  2. Optionally add a Todoist token under \"tasks\" (or set TODOIST_API_KEY)");
    println!("  3. Start chatting: synthia chat -m \"Hello!\"");

    Ok(())
}

/// Chat with the agent, one message or interactively
pub async fn chat_command(
    message: Option<String>,
    conversation: String,
    audio: Option<PathBuf>,
) -> Result<()> {
    let config = Config::load().await?;
    let provider = build_provider(&config)?;
    let agent = build_agent(&config, provider.clone()).await?;

    if let Some(path) = audio {
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read audio file {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.ogg")
            .to_string();

        let text = provider
            .transcribe(bytes, &file_name)
            .await
            .context("Transcription failed")?;
        info!("Transcribed {} ({} bytes of text)", path.display(), text.len());
        println!("You said: {}", text);

        let reply = agent.process_direct(&conversation, &text).await;
        println!("\n{}", reply);
        return Ok(());
    }

    if let Some(msg) = message {
        let reply = agent.process_direct(&conversation, &msg).await;
        println!("\n{}", reply);
        return Ok(());
    }

    println!("Interactive mode (type 'exit' to quit)");
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input)? == 0 {
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        let reply = agent.process_direct(&conversation, input).await;
        println!("\n{}\n", reply);
    }

    Ok(())
}

/// Embed a fact and add it to long-term memory
pub async fn learn_command(fact: String) -> Result<()> {
    let config = Config::load().await?;
    let provider = build_provider(&config)?;

    let memory = VectorMemory::open(synthia_config::memory_path(), provider)
        .await
        .context("Failed to load memory")?;
    let record = memory.remember(&fact).await?;

    println!("Learned: {}", record.content);
    Ok(())
}

/// List persona profiles
pub async fn profile_list_command() -> Result<()> {
    let config = Config::load().await?;
    let store = ProfileStore::open(synthia_config::profiles_path()).await?;
    let modes = store.modes().await;

    if modes.is_empty() {
        println!("No profiles. Run `synthia init` to create the default one.");
        return Ok(());
    }

    for mode in modes {
        let marker = if mode.is_default { "*" } else { " " };
        let model = mode.model.clone().unwrap_or_else(|| config.default_model());
        println!(
            "{} {:<12} {} (model: {}, tool steps: {}, history: {}, memories: {})",
            marker,
            mode.key,
            mode.name,
            model,
            mode.tool_iteration_limit,
            mode.context_message_limit,
            mode.rag_result_limit
        );
    }

    Ok(())
}

/// Make a profile the default
pub async fn profile_activate_command(key: String) -> Result<()> {
    let store = ProfileStore::open(synthia_config::profiles_path()).await?;
    store.activate(&key).await?;
    println!("Profile {} is now the default", key);
    Ok(())
}

/// Pin a profile to a conversation, or clear the pin
pub async fn profile_use_command(conversation: String, key: Option<String>) -> Result<()> {
    if let Some(key) = &key {
        let profiles = ProfileStore::open(synthia_config::profiles_path()).await?;
        if profiles.profile(key).await.is_none() {
            bail!("Unknown profile: {}", key);
        }
    }

    let store = FileConversationStore::new(synthia_config::conversations_dir());
    store.set_profile(&conversation, key.clone()).await?;

    match key {
        Some(key) => println!("Conversation {} now uses profile {}", conversation, key),
        None => println!("Conversation {} uses the default profile", conversation),
    }
    Ok(())
}

/// Show system status
pub async fn status_command() -> Result<()> {
    let config_path = synthia_config::config_path();
    let profiles_path = synthia_config::profiles_path();
    let status = |exists: bool| if exists { "[OK]" } else { "[Missing]" };

    println!("Synthia Status");
    println!(
        "Config:        {} {}",
        config_path.display(),
        status(config_path.exists())
    );
    println!(
        "Profiles:      {} {}",
        profiles_path.display(),
        status(profiles_path.exists())
    );

    let config = Config::load().await?;
    println!("Model:         {}", config.default_model());
    println!(
        "API Key:       {}",
        if config.has_api_key() { "[Set]" } else { "[Missing]" }
    );
    println!(
        "Task API Key:  {}",
        if config.task_api_key().is_some() {
            "[Set]"
        } else {
            "[Missing]"
        }
    );

    let profiles = ProfileStore::open(&profiles_path).await?;
    let default = profiles
        .default_profile()
        .await
        .map(|p| p.name)
        .unwrap_or_else(|| synthia_config::FALLBACK_PROFILE_NAME.to_string());
    println!("Profile:       {}", default);

    let store = FileConversationStore::new(synthia_config::conversations_dir());
    println!("Conversations: {}", store.list().await?.len());

    // Counting records needs no embedding calls
    let embedder = Arc::new(OpenAiProvider::new("", None, None));
    let memory = VectorMemory::open(synthia_config::memory_path(), embedder).await?;
    println!("Memories:      {}", memory.len().await);

    Ok(())
}
