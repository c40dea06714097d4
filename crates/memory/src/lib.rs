//! Memory and soul persistence.
//!
//! The memory store is a deliberately simple keyword-weighted retriever:
//! one JSON record per line with an in-memory mirror, capacity-bounded
//! with FIFO eviction. No embeddings, no vector math — queries are scored
//! by token and tag overlap.
//!
//! Souls live one file per agent in a human-editable front-matter format,
//! parsed lossily on read and rewritten canonically on save.

pub mod soul_store;
pub mod store;

pub use soul_store::SoulStore;
pub use store::{Memory, MemoryStore, MEMORY_CAPACITY};
