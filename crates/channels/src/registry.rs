//! Channel registry — all active channel instances by name.

use std::collections::HashMap;
use std::sync::Arc;
use switchboard_core::Channel;
use tracing::info;

/// Central registry holding all enabled channel instances.
pub struct ChannelRegistry {
    channels: HashMap<String, Arc<dyn Channel>>,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
        }
    }

    /// Register a channel instance under its id.
    pub fn register(&mut self, channel: Arc<dyn Channel>) {
        let name = channel.id().to_string();
        info!(channel = %name, "Registered channel");
        self.channels.insert(name, channel);
    }

    /// Get a channel by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Channel>> {
        self.channels.get(name).cloned()
    }

    /// All registered channel names.
    pub fn names(&self) -> Vec<String> {
        self.channels.keys().cloned().collect()
    }

    /// A snapshot map for the delivery worker.
    pub fn as_map(&self) -> HashMap<String, Arc<dyn Channel>> {
        self.channels.clone()
    }

    /// All channel instances, for inbound polling.
    pub fn all(&self) -> Vec<Arc<dyn Channel>> {
        self.channels.values().cloned().collect()
    }
}
