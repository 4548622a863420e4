//! Synthia agent core
//!
//! Tool-augmented conversation loop: the [`ContextAssembler`] builds the
//! prompt, the [`AgentLoop`] drives the completion service and dispatches
//! requested tools through the [`ToolRegistry`].

use std::time::Duration;
use thiserror::Error;

pub mod context;
pub mod loop_agent;
pub mod tools;

pub use context::{build_system_content, AssembledContext, ContextAssembler};
pub use loop_agent::{
    AgentLoop, LoopSettings, TurnOutcome, TurnReport, ABORT_NOTICE, FAILURE_NOTICE,
};
pub use tools::{ToolError, ToolRegistry, ToolTrait};

/// Fatal turn errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("completion failed: {0}")]
    Provider(#[from] synthia_provider::ProviderError),

    #[error("completion timed out after {0:?}")]
    CompletionTimeout(Duration),

    #[error("conversation store failed: {0}")]
    Store(#[from] synthia_session::StoreError),
}

pub type Result<T> = std::result::Result<T, AgentError>;
