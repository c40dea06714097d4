//! Channel trait — the abstraction over inbound/outbound transports.
//!
//! A Channel connects switchboard to a front-end (CLI, file drop, chat
//! platform). It polls for inbound messages and sends replies back,
//! chunking long text to the transport's length limit.

use crate::error::ChannelError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message received from a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// The channel this arrived on (e.g. "file", "cli")
    pub channel: String,

    /// Sender identifier (the peer)
    pub sender: String,

    /// The text content
    pub text: String,

    /// Attached media URLs, if the transport carries any
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media_urls: Vec<String>,

    /// Conversation thread, defaulting to "<agent>:<channel>:<sender>"
    /// once the message has been routed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,

    /// When the message was received
    pub timestamp: DateTime<Utc>,
}

/// The core Channel trait.
///
/// `receive` is non-blocking: it returns `None` when no message is pending.
/// Outbound delivery chunks text at `max_text_length` and sends the chunks
/// in order.
#[async_trait]
pub trait Channel: Send + Sync {
    /// The channel name (e.g. "file", "cli").
    fn id(&self) -> &str;

    /// Maximum outbound text length per send.
    fn max_text_length(&self) -> usize;

    /// Poll for one pending inbound message.
    async fn receive(&self) -> std::result::Result<Option<InboundMessage>, ChannelError>;

    /// Send text to a recipient, optionally within a thread.
    async fn send(
        &self,
        recipient: &str,
        text: &str,
        thread_id: Option<&str>,
    ) -> std::result::Result<(), ChannelError>;

    /// Split text into sendable chunks.
    fn chunk(&self, text: &str) -> Vec<String> {
        chunk_text(text, self.max_text_length())
    }
}

/// Split text at paragraph (newline) boundaries, greedily packing
/// paragraphs into chunks that never exceed `limit` characters. A single
/// paragraph longer than the limit is hard-split at the limit.
pub fn chunk_text(text: &str, limit: usize) -> Vec<String> {
    if limit == 0 {
        return vec![text.to_string()];
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for para in text.split('\n') {
        let para_len = para.chars().count();
        let pieces: Vec<String> = if para_len > limit {
            hard_split(para, limit)
        } else {
            vec![para.to_string()]
        };

        for piece in pieces {
            let piece_len = piece.chars().count();
            if current.is_empty() {
                current = piece;
                current_len = piece_len;
            } else if current_len + 1 + piece_len <= limit {
                current.push('\n');
                current.push_str(&piece);
                current_len += 1 + piece_len;
            } else {
                chunks.push(std::mem::take(&mut current));
                current = piece;
                current_len = piece_len;
            }
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Split a single oversized paragraph into limit-sized pieces on char
/// boundaries.
fn hard_split(para: &str, limit: usize) -> Vec<String> {
    let chars: Vec<char> = para.chars().collect();
    chars
        .chunks(limit)
        .map(|piece| piece.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = chunk_text("hello world", 100);
        assert_eq!(chunks, vec!["hello world"]);
    }

    #[test]
    fn splits_at_paragraph_boundaries() {
        let text = "first paragraph\nsecond paragraph\nthird";
        let chunks = chunk_text(text, 20);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], "first paragraph");
        assert_eq!(chunks[1], "second paragraph");
        assert_eq!(chunks[2], "third");
        for c in &chunks {
            assert!(c.chars().count() <= 20);
        }
    }

    #[test]
    fn packs_paragraphs_greedily() {
        let text = "aa\nbb\ncc";
        let chunks = chunk_text(text, 5);
        // "aa\nbb" fits in 5, "cc" starts the next chunk
        assert_eq!(chunks, vec!["aa\nbb", "cc"]);
    }

    #[test]
    fn hard_splits_oversized_paragraph() {
        let text = "a".repeat(25);
        let chunks = chunk_text(&text, 10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 10);
        assert_eq!(chunks[1].len(), 10);
        assert_eq!(chunks[2].len(), 5);
    }

    #[test]
    fn round_trip_preserves_content() {
        let text = "one two three\nfour five\nsix seven\neight nine";
        let chunks = chunk_text(text, 15);
        let rejoined = chunks.join("\n");
        // Joining on the same boundary character reproduces the text
        assert_eq!(rejoined, text);
        for c in &chunks {
            assert!(c.chars().count() <= 15);
        }
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("", 10).is_empty());
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "héllo wörld désu".repeat(4);
        let chunks = chunk_text(&text, 10);
        for c in &chunks {
            assert!(c.chars().count() <= 10);
        }
        assert_eq!(chunks.join(""), text.replace('\n', ""));
    }
}
