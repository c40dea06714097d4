//! Routing table — persistent (channel, peer) → agent bindings.
//!
//! Resolution runs in three phases, each returning the lowest-priority
//! enabled binding among its matches: exact (channel + peer), wildcard
//! (channel + "*"), then the configured default agent. The resolved
//! session key is always `"<agent>:<channel>:<peer>"`, binding or not, so
//! replies cluster under the resolved agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use switchboard_core::StoreError;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// One routing rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binding {
    /// Stable id (`bind_<8-hex>`)
    pub id: String,

    pub agent_id: String,
    pub channel: String,

    /// Peer name, or `"*"` to match any peer on the channel
    pub peer: String,

    /// Smaller = higher priority
    pub priority: i64,

    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// The outcome of resolving (channel, peer).
#[derive(Debug, Clone)]
pub struct Resolution {
    pub agent_id: String,
    pub session_key: String,
    /// The matched binding, if any phase produced one
    pub binding: Option<Binding>,
}

/// The routing table, persisted as one JSON document of all bindings.
pub struct Router {
    path: PathBuf,
    default_agent: String,
    bindings: RwLock<Vec<Binding>>,
}

impl Router {
    /// Open (or initialize) the table under `<workspace>/.routing/`.
    pub fn open(workspace_dir: &Path, default_agent: impl Into<String>) -> Result<Self, StoreError> {
        let dir = workspace_dir.join(".routing");
        std::fs::create_dir_all(&dir)
            .map_err(|e| StoreError::Io(format!("Failed to create routing dir: {e}")))?;
        let path = dir.join("bindings.json");

        let bindings: Vec<Binding> = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| StoreError::Corrupt(format!("bindings.json: {e}")))?,
            Err(_) => Vec::new(),
        };
        debug!(bindings = bindings.len(), "Routing table loaded");

        Ok(Self {
            path,
            default_agent: default_agent.into(),
            bindings: RwLock::new(bindings),
        })
    }

    fn flush(&self, bindings: &[Binding]) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(bindings)
            .map_err(|e| StoreError::Io(format!("Failed to serialize bindings: {e}")))?;
        std::fs::write(&self.path, content)
            .map_err(|e| StoreError::Io(format!("Failed to write bindings: {e}")))?;
        Ok(())
    }

    /// Create a binding. If an identical (agent, channel, peer) binding
    /// already exists, its priority is updated in place instead.
    pub async fn create_binding(
        &self,
        agent_id: &str,
        channel: &str,
        peer: &str,
        priority: i64,
    ) -> Result<Binding, StoreError> {
        let mut bindings = self.bindings.write().await;

        if let Some(existing) = bindings
            .iter_mut()
            .find(|b| b.agent_id == agent_id && b.channel == channel && b.peer == peer)
        {
            existing.priority = priority;
            let updated = existing.clone();
            self.flush(&bindings)?;
            debug!(id = %updated.id, priority, "Binding priority updated in place");
            return Ok(updated);
        }

        let id: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        let binding = Binding {
            id: format!("bind_{id}"),
            agent_id: agent_id.to_string(),
            channel: channel.to_string(),
            peer: peer.to_string(),
            priority,
            enabled: true,
            created_at: Utc::now(),
        };
        bindings.push(binding.clone());
        self.flush(&bindings)?;
        info!(id = %binding.id, agent = agent_id, channel, peer, "Binding created");
        Ok(binding)
    }

    /// Remove a binding by id. Returns whether it existed.
    pub async fn remove_binding(&self, id: &str) -> Result<bool, StoreError> {
        let mut bindings = self.bindings.write().await;
        let before = bindings.len();
        bindings.retain(|b| b.id != id);
        let removed = bindings.len() < before;
        if removed {
            self.flush(&bindings)?;
        }
        Ok(removed)
    }

    /// Enable or disable a binding. Returns whether it existed.
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<bool, StoreError> {
        let mut bindings = self.bindings.write().await;
        let Some(binding) = bindings.iter_mut().find(|b| b.id == id) else {
            return Ok(false);
        };
        binding.enabled = enabled;
        self.flush(&bindings)?;
        Ok(true)
    }

    /// Resolve (channel, peer) to an agent and session key.
    pub async fn resolve(&self, channel: &str, peer: &str) -> Resolution {
        let bindings = self.bindings.read().await;

        // Phase 1: exact match; Phase 2: wildcard peer. Ties on priority
        // go to the earliest-registered binding (min_by_key keeps the
        // first minimum).
        let matched = bindings
            .iter()
            .filter(|b| b.enabled && b.channel == channel && b.peer == peer)
            .min_by_key(|b| b.priority)
            .or_else(|| {
                bindings
                    .iter()
                    .filter(|b| b.enabled && b.channel == channel && b.peer == "*")
                    .min_by_key(|b| b.priority)
            })
            .cloned();

        let agent_id = matched
            .as_ref()
            .map(|b| b.agent_id.clone())
            .unwrap_or_else(|| self.default_agent.clone());

        Resolution {
            session_key: format!("{agent_id}:{channel}:{peer}"),
            agent_id,
            binding: matched,
        }
    }

    /// All bindings, in registration order.
    pub async fn list(&self) -> Vec<Binding> {
        self.bindings.read().await.clone()
    }

    /// Bindings routing to one agent.
    pub async fn list_for_agent(&self, agent_id: &str) -> Vec<Binding> {
        self.bindings
            .read()
            .await
            .iter()
            .filter(|b| b.agent_id == agent_id)
            .cloned()
            .collect()
    }
}
