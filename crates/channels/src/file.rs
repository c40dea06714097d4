//! File channel — inbox/outbox line files under `<workspace>/.channels/`.
//!
//! Inbound: each line of `file_inbox.txt` is one message, optionally
//! prefixed `sender: text` (sender defaults to "user"). `receive`
//! consumes the first line and rewrites the rest. Outbound: `send`
//! appends one line per chunk to `file_outbox.txt`.

use async_trait::async_trait;
use chrono::Utc;
use std::io::Write;
use std::path::{Path, PathBuf};
use switchboard_core::{Channel, ChannelError, InboundMessage};
use tokio::sync::Mutex;
use tracing::debug;

const MAX_TEXT_LENGTH: usize = 4000;

/// The file drop channel.
pub struct FileChannel {
    inbox: PathBuf,
    outbox: PathBuf,
    /// Serializes inbox consume-and-rewrite
    lock: Mutex<()>,
}

impl FileChannel {
    /// Create the channel under `<workspace>/.channels/`.
    pub fn new(workspace_dir: &Path) -> Result<Self, ChannelError> {
        let dir = workspace_dir.join(".channels");
        std::fs::create_dir_all(&dir)
            .map_err(|e| ChannelError::Io(format!("Failed to create channels dir: {e}")))?;
        Ok(Self {
            inbox: dir.join("file_inbox.txt"),
            outbox: dir.join("file_outbox.txt"),
            lock: Mutex::new(()),
        })
    }
}

#[async_trait]
impl Channel for FileChannel {
    fn id(&self) -> &str {
        "file"
    }

    fn max_text_length(&self) -> usize {
        MAX_TEXT_LENGTH
    }

    async fn receive(&self) -> Result<Option<InboundMessage>, ChannelError> {
        let _guard = self.lock.lock().await;

        let content = match std::fs::read_to_string(&self.inbox) {
            Ok(content) => content,
            Err(_) => return Ok(None), // No inbox yet
        };

        let mut lines = content.lines();
        let first = loop {
            match lines.next() {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => break line.to_string(),
                None => return Ok(None),
            }
        };

        // Consume the line: rewrite the remainder
        let rest: String = lines.map(|l| format!("{l}\n")).collect();
        std::fs::write(&self.inbox, rest)
            .map_err(|e| ChannelError::Io(format!("Failed to rewrite inbox: {e}")))?;

        let (sender, text) = match first.split_once(": ") {
            Some((sender, text)) if !sender.trim().is_empty() => {
                (sender.trim().to_string(), text.to_string())
            }
            _ => ("user".to_string(), first),
        };

        debug!(sender = %sender, "File channel message received");
        Ok(Some(InboundMessage {
            channel: "file".into(),
            sender,
            text,
            media_urls: Vec::new(),
            thread_id: None,
            timestamp: Utc::now(),
        }))
    }

    async fn send(
        &self,
        recipient: &str,
        text: &str,
        _thread_id: Option<&str>,
    ) -> Result<(), ChannelError> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.outbox)
            .map_err(|e| ChannelError::Io(format!("Failed to open outbox: {e}")))?;

        writeln!(file, "[{}] -> {recipient}: {text}", Utc::now().to_rfc3339())
            .map_err(|e| ChannelError::Io(format!("Failed to append outbox: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_inbox_yields_none() {
        let tmp = tempfile::tempdir().unwrap();
        let channel = FileChannel::new(tmp.path()).unwrap();
        assert!(channel.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn receive_consumes_one_line_at_a_time() {
        let tmp = tempfile::tempdir().unwrap();
        let channel = FileChannel::new(tmp.path()).unwrap();
        std::fs::write(
            tmp.path().join(".channels/file_inbox.txt"),
            "alice: hello there\nbob: second message\n",
        )
        .unwrap();

        let first = channel.receive().await.unwrap().unwrap();
        assert_eq!(first.sender, "alice");
        assert_eq!(first.text, "hello there");
        assert_eq!(first.channel, "file");

        let second = channel.receive().await.unwrap().unwrap();
        assert_eq!(second.sender, "bob");
        assert_eq!(second.text, "second message");

        assert!(channel.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unprefixed_lines_default_the_sender() {
        let tmp = tempfile::tempdir().unwrap();
        let channel = FileChannel::new(tmp.path()).unwrap();
        std::fs::write(tmp.path().join(".channels/file_inbox.txt"), "just text\n").unwrap();

        let msg = channel.receive().await.unwrap().unwrap();
        assert_eq!(msg.sender, "user");
        assert_eq!(msg.text, "just text");
    }

    #[tokio::test]
    async fn send_appends_to_outbox() {
        let tmp = tempfile::tempdir().unwrap();
        let channel = FileChannel::new(tmp.path()).unwrap();

        channel.send("alice", "reply one", None).await.unwrap();
        channel.send("alice", "reply two", None).await.unwrap();

        let outbox =
            std::fs::read_to_string(tmp.path().join(".channels/file_outbox.txt")).unwrap();
        let lines: Vec<&str> = outbox.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("-> alice: reply one"));
        assert!(lines[1].contains("-> alice: reply two"));
    }

    #[test]
    fn chunking_respects_the_limit() {
        let tmp = tempfile::tempdir().unwrap();
        let channel = FileChannel::new(tmp.path()).unwrap();
        let text = "long paragraph\n".repeat(1000);
        for chunk in channel.chunk(&text) {
            assert!(chunk.chars().count() <= channel.max_text_length());
        }
    }
}
