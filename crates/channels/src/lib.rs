//! Channel implementations.
//!
//! Two transports ship with the gateway: a file drop (inbox/outbox line
//! files, handy for scripting and tests) and the interactive CLI. The
//! registry maps channel names to instances for the delivery worker and
//! the inbound poll loop.

pub mod cli;
pub mod file;
pub mod registry;

pub use cli::CliChannel;
pub use file::FileChannel;
pub use registry::ChannelRegistry;
