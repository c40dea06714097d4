//! File-backed memory store — persistent JSON-lines with keyword search.
//!
//! Each line of `<workspace>/.memory/memories.jsonl` is one JSON-encoded
//! record. Entries are mirrored in memory; normal adds append a single
//! line, eviction compacts the file with a full rewrite.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use switchboard_core::StoreError;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// Capacity bound; the oldest record is evicted past this.
pub const MEMORY_CAPACITY: usize = 1000;

/// How many results retrieval returns by default.
const DEFAULT_TOP_K: usize = 3;

/// Tokens shorter than this are dropped from queries.
const MIN_TOKEN_LEN: usize = 3;

/// Common words that carry no signal in a keyword query.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "this", "that", "with", "have", "from", "what", "your",
    "will", "can", "but", "not", "all", "they", "their", "you", "about", "when", "how", "who",
    "out", "get", "has", "had", "her", "his", "its", "our", "she", "him", "than", "then", "them",
];

/// One remembered fact or exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Stable id (`mem_<8-hex>`)
    pub id: String,

    pub content: String,

    /// The session this memory came from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Optional weight multiplier applied as (1 + importance)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<f64>,
}

/// The keyword-weighted memory store.
pub struct MemoryStore {
    path: PathBuf,
    entries: RwLock<VecDeque<Memory>>,
}

impl MemoryStore {
    /// Open (or initialize) the store under `<workspace>/.memory/`.
    pub fn open(workspace_dir: &Path) -> Result<Self, StoreError> {
        let dir = workspace_dir.join(".memory");
        std::fs::create_dir_all(&dir)
            .map_err(|e| StoreError::Io(format!("Failed to create memory dir: {e}")))?;
        let path = dir.join("memories.jsonl");

        let mut entries: VecDeque<Memory> = VecDeque::new();
        if let Ok(content) = std::fs::read_to_string(&path) {
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Memory>(line) {
                    Ok(memory) => entries.push_back(memory),
                    Err(e) => warn!(error = %e, "Skipping corrupt memory record"),
                }
            }
        }
        while entries.len() > MEMORY_CAPACITY {
            entries.pop_front();
        }
        debug!(count = entries.len(), "Memory store loaded");

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Remember something. Evicts the oldest record past capacity.
    pub async fn add(
        &self,
        content: impl Into<String>,
        session_key: Option<String>,
        tags: Vec<String>,
        importance: Option<f64>,
    ) -> Result<Memory, StoreError> {
        let id: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        let memory = Memory {
            id: format!("mem_{id}"),
            content: content.into(),
            session_key,
            created_at: Utc::now(),
            tags,
            importance,
        };

        let mut entries = self.entries.write().await;
        entries.push_back(memory.clone());

        if entries.len() > MEMORY_CAPACITY {
            entries.pop_front();
            self.rewrite(&entries)?;
        } else {
            self.append(&memory)?;
        }
        Ok(memory)
    }

    fn append(&self, memory: &Memory) -> Result<(), StoreError> {
        let line = serde_json::to_string(memory)
            .map_err(|e| StoreError::Io(format!("Failed to serialize memory: {e}")))?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StoreError::Io(format!("Failed to open memory file: {e}")))?;
        writeln!(file, "{line}")
            .map_err(|e| StoreError::Io(format!("Failed to append memory: {e}")))?;
        Ok(())
    }

    fn rewrite(&self, entries: &VecDeque<Memory>) -> Result<(), StoreError> {
        let mut content = String::new();
        for memory in entries {
            let line = serde_json::to_string(memory)
                .map_err(|e| StoreError::Io(format!("Failed to serialize memory: {e}")))?;
            content.push_str(&line);
            content.push('\n');
        }
        std::fs::write(&self.path, content)
            .map_err(|e| StoreError::Io(format!("Failed to rewrite memory file: {e}")))?;
        Ok(())
    }

    /// Retrieve the top-k memories whose keyword score against `query` is
    /// positive, best first.
    pub async fn search(&self, query: &str, top_k: usize) -> Vec<Memory> {
        let tokens = tokenize(query);
        let query_lower = query.to_lowercase();

        let entries = self.entries.read().await;
        let mut scored: Vec<(f64, &Memory)> = entries
            .iter()
            .filter_map(|memory| {
                let score = score_memory(memory, &tokens, &query_lower);
                (score > 0.0).then_some((score, memory))
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(top_k)
            .map(|(_, memory)| memory.clone())
            .collect()
    }

    /// `search` with the default result count.
    pub async fn retrieve(&self, query: &str) -> Vec<Memory> {
        self.search(query, DEFAULT_TOP_K).await
    }

    /// Number of records held.
    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Lowercased unicode-word tokens of at least three characters, stop
/// words removed.
fn tokenize(query: &str) -> Vec<String> {
    query
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .map(str::to_lowercase)
        .filter(|token| token.len() >= MIN_TOKEN_LEN && !STOP_WORDS.contains(&token.as_str()))
        .collect()
}

/// score = |query tokens found in content|
///       + 0.5 × |tags found in the query|,
/// scaled by (1 + importance) when importance is set.
fn score_memory(memory: &Memory, tokens: &[String], query_lower: &str) -> f64 {
    let content_lower = memory.content.to_lowercase();

    let token_hits = tokens
        .iter()
        .filter(|token| content_lower.contains(token.as_str()))
        .count() as f64;

    let tag_hits = memory
        .tags
        .iter()
        .filter(|tag| query_lower.contains(&tag.to_lowercase()))
        .count() as f64;

    let base = token_hits + 0.5 * tag_hits;
    match memory.importance {
        Some(importance) => base * (1.0 + importance),
        None => base,
    }
}
