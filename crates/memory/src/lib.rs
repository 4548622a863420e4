//! Long-term memory
//!
//! Facts are embedded once when learned and retrieved by cosine distance to
//! the embedded query. The agent only depends on [`MemorySearch`].

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use synthia_provider::{EmbeddingProvider, ProviderError};

/// Memory errors
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] ProviderError),

    #[error("memory i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupted memory file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot remember an empty fact")]
    EmptyFact,
}

pub type Result<T> = std::result::Result<T, MemoryError>;

/// A retrieved fact
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryHit {
    pub content: String,
    /// Cosine distance to the query, lower is closer
    pub distance: f32,
}

/// Semantic retrieval over stored facts
#[async_trait]
pub trait MemorySearch: Send + Sync {
    /// Up to `limit` hits, closest first
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MemoryHit>>;
}

/// Memory that never returns anything
pub struct EmptyMemory;

#[async_trait]
impl MemorySearch for EmptyMemory {
    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<MemoryHit>> {
        Ok(Vec::new())
    }
}

/// Stored fact with its embedding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: Uuid,
    pub content: String,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Local>,
}

/// `1 - cos(a, b)`; vectors of different length or zero norm are maximally far
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 2.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 2.0;
    }
    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Vector memory persisted as a JSON array of [`MemoryRecord`]s
pub struct VectorMemory {
    embedder: Arc<dyn EmbeddingProvider>,
    records: RwLock<Vec<MemoryRecord>>,
    path: Option<PathBuf>,
}

impl VectorMemory {
    /// Memory that lives only as long as the process
    pub fn in_memory(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            records: RwLock::new(Vec::new()),
            path: None,
        }
    }

    /// Load from `path`; a missing file is an empty memory
    pub async fn open(path: impl AsRef<Path>, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = if path.exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            serde_json::from_str(&content)?
        } else {
            Vec::new()
        };
        debug!("Loaded {} memories from {:?}", records.len(), path);

        Ok(Self {
            embedder,
            records: RwLock::new(records),
            path: Some(path),
        })
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Embed and store a fact
    pub async fn remember(&self, fact: &str) -> Result<MemoryRecord> {
        let content = fact.trim();
        if content.is_empty() {
            return Err(MemoryError::EmptyFact);
        }

        let embedding = self.embedder.embed(content).await?;
        let record = MemoryRecord {
            id: Uuid::new_v4(),
            content: content.to_string(),
            embedding,
            created_at: Local::now(),
        };

        let mut records = self.records.write().await;
        records.push(record.clone());
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, serde_json::to_string_pretty(&*records)?).await?;
        }

        info!("Learned fact {}", record.id);
        Ok(record)
    }
}

#[async_trait]
impl MemorySearch for VectorMemory {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<MemoryHit>> {
        if limit == 0 || self.is_empty().await {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;
        let records = self.records.read().await;

        let mut hits: Vec<MemoryHit> = records
            .iter()
            .filter(|r| {
                let comparable = r.embedding.len() == query_embedding.len();
                if !comparable {
                    warn!("Skipping memory {} with mismatched dimensions", r.id);
                }
                comparable
            })
            .map(|r| MemoryHit {
                content: r.content.clone(),
                distance: cosine_distance(&r.embedding, &query_embedding),
            })
            .collect();

        hits.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal));
        hits.truncate(limit);
        debug!("Memory search returned {} hits", hits.len());
        Ok(hits)
    }
}
