//! Error types for the switchboard domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all switchboard operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Backend errors ---
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    // --- Channel errors ---
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    // --- Store errors (sessions, routing, memory, souls) ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Scheduler errors ---
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    // --- Delivery queue errors ---
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Message delivery failed on {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("Channel I/O error: {0}")]
    Io(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid schedule '{schedule}': {reason}")]
    InvalidSchedule { schedule: String, reason: String },

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Message not found: {0}")]
    NotFound(String),

    #[error("Invalid status transition for {id}: {reason}")]
    InvalidTransition { id: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Permission denied: {tool_name} — {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}
