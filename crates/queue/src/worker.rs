//! The delivery worker — drains the queue onto channels.
//!
//! A single worker polls the ready set every second (backing off five
//! seconds after a poll error), reserves each message, chunks its content
//! to the channel's length limit, and sends the chunks in order. Send
//! failures go back through the queue's retry path.

use crate::message::QueuedMessage;
use crate::store::DeliveryQueue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use switchboard_core::{Channel, ChannelError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Default batch size per poll.
const DEFAULT_BATCH: i64 = 10;

/// The queue worker.
pub struct DeliveryWorker {
    queue: Arc<DeliveryQueue>,
    channels: HashMap<String, Arc<dyn Channel>>,
    poll_interval: Duration,
    error_backoff: Duration,
    batch_size: i64,
}

impl DeliveryWorker {
    pub fn new(queue: Arc<DeliveryQueue>, channels: HashMap<String, Arc<dyn Channel>>) -> Self {
        Self {
            queue,
            channels,
            poll_interval: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
            batch_size: DEFAULT_BATCH,
        }
    }

    /// Override the poll cadence (useful in tests).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Run until the shutdown signal flips. The current batch is drained
    /// before exiting.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Delivery worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let sleep_for = match self.queue.get_pending(self.batch_size).await {
                Ok(batch) => {
                    for msg in batch {
                        self.process(msg).await;
                    }
                    self.poll_interval
                }
                Err(e) => {
                    warn!(error = %e, "Queue poll failed");
                    self.error_backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = shutdown.changed() => {}
            }
        }

        info!("Delivery worker stopped");
    }

    /// Reserve, send, and record the outcome of one message.
    pub async fn process(&self, msg: QueuedMessage) {
        let reserved = match self.queue.mark_processing(&msg.id).await {
            Ok(reserved) => reserved,
            Err(e) => {
                // Lost the reserve (already taken or terminal) — move on
                debug!(id = %msg.id, error = %e, "Reserve failed, skipping");
                return;
            }
        };

        match self.send(&reserved).await {
            Ok(()) => {
                if let Err(e) = self.queue.mark_delivered(&reserved.id).await {
                    warn!(id = %reserved.id, error = %e, "Failed to record delivery");
                }
            }
            Err(e) => {
                debug!(id = %reserved.id, error = %e, "Send failed");
                if let Err(e) = self.queue.mark_failed(&reserved.id, &e.to_string()).await {
                    warn!(id = %reserved.id, error = %e, "Failed to record failure");
                }
            }
        }
    }

    async fn send(&self, msg: &QueuedMessage) -> Result<(), ChannelError> {
        let channel = self
            .channels
            .get(&msg.channel)
            .ok_or_else(|| ChannelError::NotConfigured(msg.channel.clone()))?;

        for chunk in channel.chunk(&msg.content) {
            channel
                .send(&msg.recipient, &chunk, msg.thread_id.as_deref())
                .await?;
        }
        Ok(())
    }
}
