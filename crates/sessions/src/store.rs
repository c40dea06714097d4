//! The session store: index file + per-session append-only transcripts.
//!
//! Storage layout under `<workspace>/.sessions/`:
//! - `sessions.json` — map of session key → metadata
//! - `transcripts/<sanitized_key>_<session_id>.jsonl` — one transcript per
//!   session, header line first
//!
//! Writes are strictly append to transcripts; the index is rewritten in
//! full (via a temp file + rename) after every mutation.

use crate::entry::{replay_history, TranscriptEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use switchboard_core::{ChatMessage, ContentBlock, MessageContent, StoreError};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// Metadata for one session, as stored in the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    /// 12-hex nonce identifying the session
    pub session_id: String,

    /// The canonical "<agent>:<channel>:<peer>" key
    pub key: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Number of completed turns (user entries after the header)
    pub message_count: u64,

    /// Transcript filename within the transcripts directory
    pub transcript: String,
}

/// A tool result staged by `save_tool_result`, spliced into the transcript
/// after its tool_use entry when the turn completes.
#[derive(Debug, Clone)]
struct StagedResult {
    tool_use_id: String,
    output: String,
}

/// The session store.
pub struct SessionStore {
    index_path: PathBuf,
    transcripts_dir: PathBuf,
    index: RwLock<BTreeMap<String, SessionMeta>>,
    pending_results: RwLock<HashMap<String, Vec<StagedResult>>>,
}

impl SessionStore {
    /// Open (or initialize) the store under `<workspace>/.sessions/`.
    pub fn open(workspace_dir: &Path) -> Result<Self, StoreError> {
        let root = workspace_dir.join(".sessions");
        let transcripts_dir = root.join("transcripts");
        std::fs::create_dir_all(&transcripts_dir)
            .map_err(|e| StoreError::Io(format!("Failed to create session dirs: {e}")))?;

        let index_path = root.join("sessions.json");
        let index = Self::load_index(&index_path);
        debug!(sessions = index.len(), "Session index loaded");

        Ok(Self {
            index_path,
            transcripts_dir,
            index: RwLock::new(index),
            pending_results: RwLock::new(HashMap::new()),
        })
    }

    fn load_index(path: &Path) -> BTreeMap<String, SessionMeta> {
        let Ok(content) = std::fs::read_to_string(path) else {
            return BTreeMap::new();
        };
        match serde_json::from_str(&content) {
            Ok(map) => map,
            Err(e) => {
                warn!(error = %e, "Corrupt session index, starting empty (rebuild_index recovers it)");
                BTreeMap::new()
            }
        }
    }

    /// Rewrite the index in full, atomically (temp file + rename).
    fn flush_index(&self, index: &BTreeMap<String, SessionMeta>) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(index)
            .map_err(|e| StoreError::Io(format!("Failed to serialize index: {e}")))?;
        let tmp = self.index_path.with_extension("json.tmp");
        std::fs::write(&tmp, content)
            .map_err(|e| StoreError::Io(format!("Failed to write index: {e}")))?;
        std::fs::rename(&tmp, &self.index_path)
            .map_err(|e| StoreError::Io(format!("Failed to replace index: {e}")))?;
        Ok(())
    }

    fn transcript_path(&self, meta: &SessionMeta) -> PathBuf {
        self.transcripts_dir.join(&meta.transcript)
    }

    fn append_entries(&self, meta: &SessionMeta, entries: &[TranscriptEntry]) -> Result<(), StoreError> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.transcript_path(meta))
            .map_err(|e| StoreError::Io(format!("Failed to open transcript: {e}")))?;

        for entry in entries {
            let line = serde_json::to_string(entry)
                .map_err(|e| StoreError::Io(format!("Failed to serialize entry: {e}")))?;
            writeln!(file, "{line}")
                .map_err(|e| StoreError::Io(format!("Failed to append transcript: {e}")))?;
        }
        file.flush()
            .map_err(|e| StoreError::Io(format!("Failed to flush transcript: {e}")))?;
        Ok(())
    }

    /// Create a session for `key`, or return the existing one.
    pub async fn create(&self, key: &str) -> Result<SessionMeta, StoreError> {
        let mut index = self.index.write().await;
        if let Some(meta) = index.get(key) {
            return Ok(meta.clone());
        }

        let now = Utc::now();
        let session_id: String = Uuid::new_v4().simple().to_string().chars().take(12).collect();
        let meta = SessionMeta {
            session_id: session_id.clone(),
            key: key.to_string(),
            created_at: now,
            updated_at: now,
            message_count: 0,
            transcript: format!("{}_{}.jsonl", sanitize_key(key), session_id),
        };

        self.append_entries(
            &meta,
            &[TranscriptEntry::Session {
                id: session_id,
                key: key.to_string(),
                created: now,
                ts: now,
            }],
        )?;

        index.insert(key.to_string(), meta.clone());
        self.flush_index(&index)?;
        debug!(key, session_id = %meta.session_id, "Session created");
        Ok(meta)
    }

    /// Whether a session exists for `key`.
    pub async fn exists(&self, key: &str) -> bool {
        self.index.read().await.contains_key(key)
    }

    /// All known sessions.
    pub async fn list(&self) -> Vec<SessionMeta> {
        self.index.read().await.values().cloned().collect()
    }

    /// Delete a session and its transcript. Returns whether it existed.
    pub async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut index = self.index.write().await;
        let Some(meta) = index.remove(key) else {
            return Ok(false);
        };
        self.flush_index(&index)?;
        drop(index);

        let path = self.transcripts_dir.join(&meta.transcript);
        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|e| StoreError::Io(format!("Failed to remove transcript: {e}")))?;
        }
        self.pending_results.write().await.remove(key);
        Ok(true)
    }

    /// Load a session (creating it on first reference) and replay its
    /// transcript into conversation history.
    pub async fn load(&self, key: &str) -> Result<(SessionMeta, Vec<ChatMessage>), StoreError> {
        let meta = self.create(key).await?;
        let content = std::fs::read_to_string(self.transcript_path(&meta))
            .map_err(|e| StoreError::Io(format!("Failed to read transcript: {e}")))?;
        let history = replay_history(content.lines());
        Ok((meta, history))
    }

    /// Record one tool result at the moment of execution. The result is
    /// staged and spliced after its tool_use entry when the turn is saved;
    /// if the turn aborts, `discard_pending` drops it with the turn.
    pub async fn save_tool_result(
        &self,
        key: &str,
        tool_use_id: &str,
        output: &str,
    ) -> Result<(), StoreError> {
        self.pending_results
            .write()
            .await
            .entry(key.to_string())
            .or_default()
            .push(StagedResult {
                tool_use_id: tool_use_id.to_string(),
                output: output.to_string(),
            });
        Ok(())
    }

    /// Drop any staged tool results for an aborted turn.
    pub async fn discard_pending(&self, key: &str) {
        self.pending_results.write().await.remove(key);
    }

    /// Persist one completed turn: the original user text, then the
    /// accumulated assistant blocks in order — text blocks as assistant
    /// entries, tool_use blocks as tool_use entries with their staged
    /// results spliced in behind each batch.
    pub async fn save_turn(
        &self,
        key: &str,
        user_text: &str,
        assistant_blocks: &[ContentBlock],
    ) -> Result<(), StoreError> {
        let meta = self.create(key).await?;
        let mut staged = self
            .pending_results
            .write()
            .await
            .remove(key)
            .unwrap_or_default();

        let now = Utc::now();
        let mut entries = vec![TranscriptEntry::User {
            content: MessageContent::Text(user_text.to_string()),
            ts: now,
        }];

        // ids of the current run of consecutive tool_use blocks
        let mut open_uses: Vec<String> = Vec::new();

        for block in assistant_blocks {
            match block {
                ContentBlock::ToolUse { id, name, input } => {
                    entries.push(TranscriptEntry::ToolUse {
                        name: name.clone(),
                        tool_use_id: id.clone(),
                        input: input.clone(),
                        ts: now,
                    });
                    open_uses.push(id.clone());
                }
                ContentBlock::Text { text } => {
                    Self::splice_results(&mut entries, &mut open_uses, &mut staged, now);
                    entries.push(TranscriptEntry::Assistant {
                        content: text.clone(),
                        ts: now,
                    });
                }
                // Results never appear on the assistant side; they arrive
                // through save_tool_result
                ContentBlock::ToolResult { .. } => {}
            }
        }
        Self::splice_results(&mut entries, &mut open_uses, &mut staged, now);

        // Orphaned results (no matching tool_use block) are still kept
        for result in staged {
            entries.push(TranscriptEntry::ToolResult {
                tool_use_id: result.tool_use_id,
                output: result.output,
                ts: now,
            });
        }

        self.append_entries(&meta, &entries)?;

        let mut index = self.index.write().await;
        if let Some(meta) = index.get_mut(key) {
            meta.updated_at = now;
            meta.message_count += 1;
        }
        self.flush_index(&index)?;
        Ok(())
    }

    /// Emit tool_result entries for the current run of tool_use blocks, in
    /// the run's order.
    fn splice_results(
        entries: &mut Vec<TranscriptEntry>,
        open_uses: &mut Vec<String>,
        staged: &mut Vec<StagedResult>,
        now: DateTime<Utc>,
    ) {
        for id in open_uses.drain(..) {
            let mut i = 0;
            while i < staged.len() {
                if staged[i].tool_use_id == id {
                    let result = staged.remove(i);
                    entries.push(TranscriptEntry::ToolResult {
                        tool_use_id: result.tool_use_id,
                        output: result.output,
                        ts: now,
                    });
                } else {
                    i += 1;
                }
            }
        }
    }

    /// Regenerate the index by scanning the transcripts directory. Returns
    /// the number of sessions recovered.
    pub async fn rebuild_index(&self) -> Result<usize, StoreError> {
        let mut rebuilt: BTreeMap<String, SessionMeta> = BTreeMap::new();

        let dir = std::fs::read_dir(&self.transcripts_dir)
            .map_err(|e| StoreError::Io(format!("Failed to read transcripts dir: {e}")))?;

        for dir_entry in dir.filter_map(|e| e.ok()) {
            let path = dir_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };

            let mut meta: Option<SessionMeta> = None;
            for line in content.lines() {
                let Ok(entry) = serde_json::from_str::<TranscriptEntry>(line) else {
                    continue;
                };
                match entry {
                    TranscriptEntry::Session { id, key, created, .. } => {
                        let filename = path
                            .file_name()
                            .and_then(|n| n.to_str())
                            .unwrap_or_default()
                            .to_string();
                        meta = Some(SessionMeta {
                            session_id: id,
                            key,
                            created_at: created,
                            updated_at: created,
                            message_count: 0,
                            transcript: filename,
                        });
                    }
                    TranscriptEntry::User { ts, .. } => {
                        if let Some(meta) = meta.as_mut() {
                            meta.message_count += 1;
                            meta.updated_at = ts;
                        }
                    }
                    TranscriptEntry::Assistant { ts, .. }
                    | TranscriptEntry::ToolUse { ts, .. }
                    | TranscriptEntry::ToolResult { ts, .. } => {
                        if let Some(meta) = meta.as_mut() {
                            meta.updated_at = ts;
                        }
                    }
                }
            }

            if let Some(meta) = meta {
                rebuilt.insert(meta.key.clone(), meta);
            } else {
                warn!(path = %path.display(), "Transcript without session header, skipped");
            }
        }

        let count = rebuilt.len();
        let mut index = self.index.write().await;
        *index = rebuilt;
        self.flush_index(&index)?;
        debug!(sessions = count, "Session index rebuilt from transcripts");
        Ok(count)
    }
}

/// Transcript filenames replace `:` in keys with `_`.
fn sanitize_key(key: &str) -> String {
    key.replace(':', "_")
}
