//! Queued message records and the status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery status, stored as an integer.
///
/// ```text
/// Pending ──reserve──▶ Processing ──ok──▶ Delivered (terminal)
///    ▲                      │
///    │                      └─fail──▶ Failed ──(attempts left)──▶ retry
///    │                                   │
///    │                                   └─(attempts spent)──▶ DeadLetter
///    └──retry_dead_letter──────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Processing,
    Delivered,
    Failed,
    DeadLetter,
}

impl DeliveryStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Pending => 0,
            Self::Processing => 1,
            Self::Delivered => 2,
            Self::Failed => 3,
            Self::DeadLetter => 4,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Pending),
            1 => Some(Self::Processing),
            2 => Some(Self::Delivered),
            3 => Some(Self::Failed),
            4 => Some(Self::DeadLetter),
            _ => None,
        }
    }
}

/// One outbound message in the delivery table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub id: String,
    pub channel: String,
    pub recipient: String,
    pub content: String,
    pub thread_id: Option<String>,
    pub session_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub status: DeliveryStatus,
    pub attempt_count: i64,
    pub max_attempts: i64,
    pub last_error: Option<String>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// Larger = higher priority
    pub priority: i64,
}

/// Optional fields for `enqueue`.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    pub thread_id: Option<String>,
    pub session_key: Option<String>,
    /// Hold the message until this time
    pub scheduled_at: Option<DateTime<Utc>>,
    pub priority: i64,
}

/// Per-status counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub delivered: i64,
    pub failed: i64,
    pub dead_letter: i64,
    pub total: i64,
}
