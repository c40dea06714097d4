//! Scheduler — one-shot, interval, and cron jobs that invoke the agent.
//!
//! Three job kinds share one lifecycle: `at` fires once at a timestamp,
//! `every` repeats on a fixed interval, `cron` follows a standard 5-field
//! expression (parsed by the `croner` crate). A tick-driven runtime asks
//! for the due set, runs each job through the agent loop on a synthetic
//! session, and marks it executed.

pub mod job;
pub mod store;

pub use job::{next_run_after, parse_cron, parse_interval, Job, JobKind};
pub use store::Scheduler;
