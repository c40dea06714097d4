//! # Switchboard Core
//!
//! Domain types, traits, and error definitions for the switchboard agent
//! gateway. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external seam is defined as a trait here: the chat-completion
//! backend, channels, and tools. Implementations live in their respective
//! crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod backend;
pub mod channel;
pub mod content;
pub mod error;
pub mod soul;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use backend::{Backend, CompletionRequest, CompletionResponse, ToolDescriptor};
pub use channel::{chunk_text, Channel, InboundMessage};
pub use content::{ChatMessage, ContentBlock, MessageContent, Role};
pub use error::{
    BackendError, ChannelError, Error, QueueError, Result, SchedulerError, StoreError, ToolError,
};
pub use soul::Soul;
pub use tool::{Tool, ToolRegistry};
