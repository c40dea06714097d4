//! Session store — append-only transcripts plus an index.
//!
//! Each session is one JSONL transcript file; the first line is a session
//! header, every following line is one event (user text, assistant text,
//! tool_use, tool_result). Conversation history is rebuilt by replaying the
//! transcript; the index file is only a cache of counts and timestamps and
//! can be regenerated by scanning the transcripts.

pub mod entry;
pub mod store;

pub use entry::{replay_history, TranscriptEntry};
pub use store::{SessionMeta, SessionStore};
