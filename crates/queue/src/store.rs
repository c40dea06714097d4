//! SQLite-backed delivery table.
//!
//! One `messages` table at `<workspace>/.queue/delivery.db` with indexes
//! on `status` and `next_attempt_at`. All state transitions go through
//! this store; the reserve step is a single conditional UPDATE so it is
//! atomic with respect to any other worker.
//!
//! While a row is Processing its `next_attempt_at` column parks the
//! reservation time; `release_stuck` uses it to revert abandoned
//! reservations to Failed.

use crate::message::{DeliveryStatus, EnqueueOptions, QueueStats, QueuedMessage};
use chrono::{Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use switchboard_core::QueueError;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Fixed back-off schedule, indexed by attempt number - 1 and clamped to
/// the last entry.
const BACKOFF_SECS: [i64; 5] = [1, 5, 15, 60, 300];

/// Default attempt budget per message.
pub const DEFAULT_MAX_ATTEMPTS: i64 = 5;

/// The persistent delivery queue.
pub struct DeliveryQueue {
    pub(crate) pool: SqlitePool,
}

impl DeliveryQueue {
    /// Open (or initialize) the queue database under `<workspace>/.queue/`.
    pub async fn open(workspace_dir: &Path) -> Result<Self, QueueError> {
        let dir = workspace_dir.join(".queue");
        std::fs::create_dir_all(&dir)
            .map_err(|e| QueueError::Storage(format!("Failed to create queue dir: {e}")))?;
        let path = dir.join("delivery.db");
        Self::open_url(&path.to_string_lossy()).await
    }

    /// Open from a SQLite URL or path. Pass `":memory:"` for an ephemeral
    /// database (useful for tests).
    pub async fn open_url(url: &str) -> Result<Self, QueueError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| QueueError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // An in-memory database exists per connection, so the pool must
        // stay at one connection for ":memory:" to behave
        let max_connections = if url.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| QueueError::Storage(format!("Failed to open SQLite: {e}")))?;

        let queue = Self { pool };
        queue.run_migrations().await?;
        info!("Delivery queue opened at {url}");
        Ok(queue)
    }

    async fn run_migrations(&self) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id              TEXT PRIMARY KEY,
                channel         TEXT NOT NULL,
                recipient       TEXT NOT NULL,
                content         TEXT NOT NULL,
                thread_id       TEXT,
                session_key     TEXT,
                created_at      TEXT NOT NULL,
                scheduled_at    TEXT,
                delivered_at    TEXT,
                status          INTEGER NOT NULL DEFAULT 0,
                attempt_count   INTEGER NOT NULL DEFAULT 0,
                max_attempts    INTEGER NOT NULL DEFAULT 5,
                last_error      TEXT,
                next_attempt_at TEXT,
                priority        INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(format!("messages table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_status ON messages(status)")
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::Storage(format!("status index: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_next_attempt_at ON messages(next_attempt_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(format!("next_attempt_at index: {e}")))?;

        debug!("Queue migrations complete");
        Ok(())
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<QueuedMessage, QueueError> {
        let status_int: i64 = row
            .try_get("status")
            .map_err(|e| QueueError::Storage(format!("status column: {e}")))?;
        let status = DeliveryStatus::from_i64(status_int)
            .ok_or_else(|| QueueError::Storage(format!("Unknown status {status_int}")))?;

        let get_err = |e: sqlx::Error| QueueError::Storage(format!("row decode: {e}"));

        Ok(QueuedMessage {
            id: row.try_get("id").map_err(get_err)?,
            channel: row.try_get("channel").map_err(get_err)?,
            recipient: row.try_get("recipient").map_err(get_err)?,
            content: row.try_get("content").map_err(get_err)?,
            thread_id: row.try_get("thread_id").map_err(get_err)?,
            session_key: row.try_get("session_key").map_err(get_err)?,
            created_at: row.try_get("created_at").map_err(get_err)?,
            scheduled_at: row.try_get("scheduled_at").map_err(get_err)?,
            delivered_at: row.try_get("delivered_at").map_err(get_err)?,
            status,
            attempt_count: row.try_get("attempt_count").map_err(get_err)?,
            max_attempts: row.try_get("max_attempts").map_err(get_err)?,
            last_error: row.try_get("last_error").map_err(get_err)?,
            next_attempt_at: row.try_get("next_attempt_at").map_err(get_err)?,
            priority: row.try_get("priority").map_err(get_err)?,
        })
    }

    /// Insert a new Pending message. Returns its id.
    pub async fn enqueue(
        &self,
        channel: &str,
        recipient: &str,
        content: &str,
        options: EnqueueOptions,
    ) -> Result<String, QueueError> {
        let id = format!("msg_{}", Uuid::new_v4().simple());
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO messages
                (id, channel, recipient, content, thread_id, session_key,
                 created_at, scheduled_at, status, attempt_count, max_attempts, priority)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, 0, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(channel)
        .bind(recipient)
        .bind(content)
        .bind(&options.thread_id)
        .bind(&options.session_key)
        .bind(now)
        .bind(options.scheduled_at)
        .bind(DEFAULT_MAX_ATTEMPTS)
        .bind(options.priority)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(format!("enqueue: {e}")))?;

        debug!(id = %id, channel, recipient, "Message enqueued");
        Ok(id)
    }

    /// Fetch one message by id.
    pub async fn get(&self, id: &str) -> Result<Option<QueuedMessage>, QueueError> {
        let row = sqlx::query("SELECT * FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| QueueError::Storage(format!("get: {e}")))?;
        row.map(|r| Self::row_to_message(&r)).transpose()
    }

    /// Messages ready for delivery: Pending or Failed, attempts left, not
    /// scheduled or backed off into the future. Highest priority first,
    /// oldest first within a priority.
    pub async fn get_pending(&self, limit: i64) -> Result<Vec<QueuedMessage>, QueueError> {
        let now = Utc::now();
        let rows = sqlx::query(
            r#"
            SELECT * FROM messages
            WHERE status IN (0, 3)
              AND attempt_count < max_attempts
              AND (scheduled_at IS NULL OR scheduled_at <= ?)
              AND (next_attempt_at IS NULL OR next_attempt_at <= ?)
            ORDER BY priority DESC, created_at ASC
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(format!("get_pending: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    /// Reserve a message for delivery: atomically moves Pending/Failed to
    /// Processing and increments the attempt counter.
    pub async fn mark_processing(&self, id: &str) -> Result<QueuedMessage, QueueError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET status = 1, attempt_count = attempt_count + 1, next_attempt_at = ?
            WHERE id = ? AND status IN (0, 3)
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(format!("mark_processing: {e}")))?;

        if result.rows_affected() == 0 {
            return match self.get(id).await? {
                Some(msg) => Err(QueueError::InvalidTransition {
                    id: id.to_string(),
                    reason: format!("cannot reserve from {:?}", msg.status),
                }),
                None => Err(QueueError::NotFound(id.to_string())),
            };
        }

        self.get(id)
            .await?
            .ok_or_else(|| QueueError::NotFound(id.to_string()))
    }

    /// Terminal success transition.
    pub async fn mark_delivered(&self, id: &str) -> Result<(), QueueError> {
        let result = sqlx::query(
            "UPDATE messages SET status = 2, delivered_at = ?, next_attempt_at = NULL WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(format!("mark_delivered: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(QueueError::NotFound(id.to_string()));
        }
        debug!(id, "Message delivered");
        Ok(())
    }

    /// Failure transition: schedules a retry with back-off, or parks the
    /// message in the dead-letter tier once the attempt budget is spent.
    pub async fn mark_failed(&self, id: &str, error: &str) -> Result<(), QueueError> {
        let msg = self
            .get(id)
            .await?
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;

        if msg.attempt_count >= msg.max_attempts {
            sqlx::query(
                "UPDATE messages SET status = 4, last_error = ?, next_attempt_at = NULL WHERE id = ?",
            )
            .bind(error)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::Storage(format!("mark_failed: {e}")))?;
            warn!(id, attempts = msg.attempt_count, "Message dead-lettered");
        } else {
            let index = ((msg.attempt_count - 1).max(0) as usize).min(BACKOFF_SECS.len() - 1);
            let next_attempt = Utc::now() + Duration::seconds(BACKOFF_SECS[index]);
            sqlx::query(
                "UPDATE messages SET status = 3, last_error = ?, next_attempt_at = ? WHERE id = ?",
            )
            .bind(error)
            .bind(next_attempt)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| QueueError::Storage(format!("mark_failed: {e}")))?;
            debug!(id, attempts = msg.attempt_count, retry_at = %next_attempt, "Delivery failed, will retry");
        }
        Ok(())
    }

    /// Per-status counters plus the total row count.
    pub async fn get_stats(&self) -> Result<QueueStats, QueueError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM messages GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| QueueError::Storage(format!("get_stats: {e}")))?;

        let mut stats = QueueStats::default();
        for row in rows {
            let status: i64 = row
                .try_get("status")
                .map_err(|e| QueueError::Storage(format!("stats row: {e}")))?;
            let count: i64 = row
                .try_get("n")
                .map_err(|e| QueueError::Storage(format!("stats row: {e}")))?;
            match DeliveryStatus::from_i64(status) {
                Some(DeliveryStatus::Pending) => stats.pending = count,
                Some(DeliveryStatus::Processing) => stats.processing = count,
                Some(DeliveryStatus::Delivered) => stats.delivered = count,
                Some(DeliveryStatus::Failed) => stats.failed = count,
                Some(DeliveryStatus::DeadLetter) => stats.dead_letter = count,
                None => {}
            }
            stats.total += count;
        }
        Ok(stats)
    }

    /// Dead-lettered messages, most recent first.
    pub async fn get_dead_letters(&self, limit: i64) -> Result<Vec<QueuedMessage>, QueueError> {
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE status = 4 ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(format!("get_dead_letters: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    /// The only reverse transition: move a dead letter back to Pending
    /// with a fresh attempt budget. Returns whether the message was a
    /// dead letter.
    pub async fn retry_dead_letter(&self, id: &str) -> Result<bool, QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET status = 0, attempt_count = 0, last_error = NULL, next_attempt_at = NULL
            WHERE id = ? AND status = 4
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(format!("retry_dead_letter: {e}")))?;

        let retried = result.rows_affected() > 0;
        if retried {
            info!(id, "Dead letter requeued");
        }
        Ok(retried)
    }

    /// Revert Processing rows whose reservation is older than `older_than`
    /// back to Failed so they re-enter the retry path. Returns how many
    /// rows were released.
    pub async fn release_stuck(&self, older_than: Duration) -> Result<u64, QueueError> {
        let cutoff = Utc::now() - older_than;
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET status = 3, last_error = 'Processing timed out', next_attempt_at = NULL
            WHERE status = 1 AND next_attempt_at IS NOT NULL AND next_attempt_at <= ?
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| QueueError::Storage(format!("release_stuck: {e}")))?;

        let released = result.rows_affected();
        if released > 0 {
            warn!(released, "Released stuck Processing messages");
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn queue() -> DeliveryQueue {
        DeliveryQueue::open_url(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn enqueue_starts_pending() {
        let q = queue().await;
        let id = q
            .enqueue("file", "u", "x", EnqueueOptions::default())
            .await
            .unwrap();

        let msg = q.get(&id).await.unwrap().unwrap();
        assert_eq!(msg.status, DeliveryStatus::Pending);
        assert_eq!(msg.attempt_count, 0);
        assert_eq!(msg.max_attempts, 5);
        assert!(msg.last_error.is_none());
    }

    #[tokio::test]
    async fn reserve_increments_attempts_atomically() {
        let q = queue().await;
        let id = q
            .enqueue("file", "u", "x", EnqueueOptions::default())
            .await
            .unwrap();

        let reserved = q.mark_processing(&id).await.unwrap();
        assert_eq!(reserved.status, DeliveryStatus::Processing);
        assert_eq!(reserved.attempt_count, 1);

        // A second reserve on a Processing row is rejected
        assert!(matches!(
            q.mark_processing(&id).await,
            Err(QueueError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn delivered_is_terminal() {
        let q = queue().await;
        let id = q
            .enqueue("file", "u", "x", EnqueueOptions::default())
            .await
            .unwrap();

        q.mark_processing(&id).await.unwrap();
        q.mark_delivered(&id).await.unwrap();

        let msg = q.get(&id).await.unwrap().unwrap();
        assert_eq!(msg.status, DeliveryStatus::Delivered);
        assert!(msg.delivered_at.is_some());
        assert!(msg.next_attempt_at.is_none());
        assert!(matches!(
            q.mark_processing(&id).await,
            Err(QueueError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn five_failures_dead_letter_the_message() {
        let q = queue().await;
        let id = q
            .enqueue("file", "u", "x", EnqueueOptions::default())
            .await
            .unwrap();

        for attempt in 1..=5 {
            // Clear the back-off so the reserve path stays open
            sqlx::query("UPDATE messages SET next_attempt_at = NULL WHERE id = ?")
                .bind(&id)
                .execute(&q.pool)
                .await
                .unwrap();
            let reserved = q.mark_processing(&id).await.unwrap();
            assert_eq!(reserved.attempt_count, attempt);
            q.mark_failed(&id, "boom").await.unwrap();
        }

        let msg = q.get(&id).await.unwrap().unwrap();
        assert_eq!(msg.status, DeliveryStatus::DeadLetter);
        assert_eq!(msg.attempt_count, 5);
        assert_eq!(msg.last_error.as_deref(), Some("boom"));
        assert!(msg.next_attempt_at.is_none());

        let dead = q.get_dead_letters(10).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id, id);
    }

    #[tokio::test]
    async fn retry_dead_letter_resets_the_budget() {
        let q = queue().await;
        let id = q
            .enqueue("file", "u", "x", EnqueueOptions::default())
            .await
            .unwrap();

        for _ in 0..5 {
            sqlx::query("UPDATE messages SET next_attempt_at = NULL WHERE id = ?")
                .bind(&id)
                .execute(&q.pool)
                .await
                .unwrap();
            q.mark_processing(&id).await.unwrap();
            q.mark_failed(&id, "boom").await.unwrap();
        }
        assert_eq!(q.get_stats().await.unwrap().dead_letter, 1);

        assert!(q.retry_dead_letter(&id).await.unwrap());
        let msg = q.get(&id).await.unwrap().unwrap();
        assert_eq!(msg.status, DeliveryStatus::Pending);
        assert_eq!(msg.attempt_count, 0);
        assert!(msg.last_error.is_none());
        assert!(msg.next_attempt_at.is_none());

        // Next delivery succeeds
        q.mark_processing(&id).await.unwrap();
        q.mark_delivered(&id).await.unwrap();
        let stats = q.get_stats().await.unwrap();
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.dead_letter, 0);

        // retry_dead_letter only applies to dead letters
        assert!(!q.retry_dead_letter(&id).await.unwrap());
    }

    #[tokio::test]
    async fn backoff_schedule_is_monotonic() {
        let q = queue().await;
        let id = q
            .enqueue("file", "u", "x", EnqueueOptions::default())
            .await
            .unwrap();
        // Give the message headroom so failures never dead-letter
        sqlx::query("UPDATE messages SET max_attempts = 10 WHERE id = ?")
            .bind(&id)
            .execute(&q.pool)
            .await
            .unwrap();

        let expected = [1i64, 5, 15, 60, 300, 300];
        for (i, want) in expected.iter().enumerate() {
            sqlx::query("UPDATE messages SET next_attempt_at = NULL WHERE id = ?")
                .bind(&id)
                .execute(&q.pool)
                .await
                .unwrap();
            let reserved = q.mark_processing(&id).await.unwrap();
            assert_eq!(reserved.attempt_count, i as i64 + 1);

            let before = Utc::now();
            q.mark_failed(&id, "boom").await.unwrap();
            let msg = q.get(&id).await.unwrap().unwrap();
            let delta = (msg.next_attempt_at.unwrap() - before).num_seconds();
            assert!(
                (*want - 1..=*want + 1).contains(&delta),
                "attempt {}: expected ~{want}s back-off, got {delta}s",
                i + 1
            );
        }
    }

    #[tokio::test]
    async fn scheduled_messages_wait_for_their_time() {
        let q = queue().await;
        q.enqueue(
            "file",
            "u",
            "later",
            EnqueueOptions {
                scheduled_at: Some(Utc::now() + Duration::seconds(60)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        q.enqueue("file", "u", "now", EnqueueOptions::default())
            .await
            .unwrap();

        let ready = q.get_pending(10).await.unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].content, "now");
    }

    #[tokio::test]
    async fn pending_order_is_priority_then_age() {
        let q = queue().await;
        let low = q
            .enqueue("file", "u", "low", EnqueueOptions::default())
            .await
            .unwrap();
        let high = q
            .enqueue(
                "file",
                "u",
                "high",
                EnqueueOptions {
                    priority: 10,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let ready = q.get_pending(10).await.unwrap();
        assert_eq!(ready[0].id, high);
        assert_eq!(ready[1].id, low);
    }

    #[tokio::test]
    async fn failed_with_elapsed_backoff_is_ready_again() {
        let q = queue().await;
        let id = q
            .enqueue("file", "u", "x", EnqueueOptions::default())
            .await
            .unwrap();

        q.mark_processing(&id).await.unwrap();
        q.mark_failed(&id, "boom").await.unwrap();

        // Not ready while the back-off holds
        assert!(q.get_pending(10).await.unwrap().is_empty());

        // Simulate the back-off elapsing
        sqlx::query("UPDATE messages SET next_attempt_at = ? WHERE id = ?")
            .bind(Utc::now() - Duration::seconds(1))
            .bind(&id)
            .execute(&q.pool)
            .await
            .unwrap();
        let ready = q.get_pending(10).await.unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].status, DeliveryStatus::Failed);
    }

    #[tokio::test]
    async fn release_stuck_reverts_old_reservations() {
        let q = queue().await;
        let id = q
            .enqueue("file", "u", "x", EnqueueOptions::default())
            .await
            .unwrap();
        q.mark_processing(&id).await.unwrap();

        // Fresh reservation is left alone
        assert_eq!(q.release_stuck(Duration::minutes(5)).await.unwrap(), 0);

        // Age the reservation past the threshold
        sqlx::query("UPDATE messages SET next_attempt_at = ? WHERE id = ?")
            .bind(Utc::now() - Duration::minutes(10))
            .bind(&id)
            .execute(&q.pool)
            .await
            .unwrap();
        assert_eq!(q.release_stuck(Duration::minutes(5)).await.unwrap(), 1);

        let msg = q.get(&id).await.unwrap().unwrap();
        assert_eq!(msg.status, DeliveryStatus::Failed);
        assert_eq!(q.get_pending(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stats_count_every_status() {
        let q = queue().await;
        q.enqueue("file", "u", "a", EnqueueOptions::default())
            .await
            .unwrap();
        let delivered = q
            .enqueue("file", "u", "b", EnqueueOptions::default())
            .await
            .unwrap();
        q.mark_processing(&delivered).await.unwrap();
        q.mark_delivered(&delivered).await.unwrap();

        let stats = q.get_stats().await.unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.total, 2);
    }

    #[tokio::test]
    async fn survives_reopen_on_same_file() {
        let tmp = tempfile::tempdir().unwrap();
        let id = {
            let q = DeliveryQueue::open(tmp.path()).await.unwrap();
            q.enqueue("file", "u", "x", EnqueueOptions::default())
                .await
                .unwrap()
        };

        let q = DeliveryQueue::open(tmp.path()).await.unwrap();
        let msg = q.get(&id).await.unwrap().unwrap();
        assert_eq!(msg.status, DeliveryStatus::Pending);
        assert_eq!(q.get_stats().await.unwrap().total, 1);
    }
}
