//! Job records and next-run computation.
//!
//! The `every` grammar is trivially regular and parsed inline; 5-field
//! cron expressions go through the `croner` crate, which carries standard
//! Vixie semantics (a restricted day-of-month and day-of-week are OR'd).

use chrono::{DateTime, Duration, Utc};
use croner::Cron;
use serde::{Deserialize, Serialize};

/// How a job's schedule string is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// One-shot: schedule is an ISO-8601 UTC timestamp
    At,
    /// Repeating: schedule is `<number><unit>` with unit in s/m/h/d
    Every,
    /// Repeating: schedule is a 5-field cron expression
    Cron,
}

/// A scheduled agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Stable id (`job_<8-hex>`)
    pub id: String,

    /// The agent the prompt runs under
    pub agent_id: String,

    /// Human-readable name
    pub name: String,

    /// The prompt sent to the agent loop when the job fires
    pub prompt: String,

    pub kind: JobKind,

    /// Kind-specific schedule string
    pub schedule: String,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,

    #[serde(default)]
    pub run_count: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_runs: Option<u64>,

    pub enabled: bool,

    /// At-jobs expire after their first execution; expired jobs are pruned
    /// on the next persistence rewrite
    #[serde(default)]
    pub expired: bool,

    /// Outcome of the most recent execution (error results carry an
    /// `"Error: "` prefix)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_result: Option<String>,
}

impl Job {
    /// Whether this job can still be scheduled.
    pub fn schedulable(&self) -> bool {
        if !self.enabled || self.expired {
            return false;
        }
        match self.max_runs {
            Some(max) => self.run_count < max,
            None => true,
        }
    }
}

/// Parse the `<number><unit>` interval grammar (unit in s/m/h/d).
pub fn parse_interval(schedule: &str) -> Result<Duration, String> {
    let schedule = schedule.trim();
    if schedule.len() < 2 {
        return Err(format!("Invalid interval '{schedule}': expected <number><unit>"));
    }

    let (digits, unit) = schedule.split_at(schedule.len() - 1);
    let value: i64 = digits
        .parse()
        .map_err(|_| format!("Invalid interval number '{digits}'"))?;
    if value <= 0 {
        return Err(format!("Interval must be positive, got {value}"));
    }

    match unit {
        "s" => Ok(Duration::seconds(value)),
        "m" => Ok(Duration::minutes(value)),
        "h" => Ok(Duration::hours(value)),
        "d" => Ok(Duration::days(value)),
        other => Err(format!("Unknown interval unit '{other}' (expected s/m/h/d)")),
    }
}

/// Parse a standard 5-field cron expression.
pub fn parse_cron(expr: &str) -> Result<Cron, String> {
    Cron::new(expr).parse().map_err(|e| e.to_string())
}

/// Compute a job's next run time from `from`, or None when the job is
/// disabled, expired, out of runs, or its schedule has no next occurrence.
pub fn next_run_after(job: &Job, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if !job.schedulable() {
        return None;
    }

    match job.kind {
        JobKind::At => DateTime::parse_from_rfc3339(&job.schedule)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        JobKind::Every => parse_interval(&job.schedule).ok().map(|d| from + d),
        // Strictly after `from`, so a job executed exactly on its mark
        // advances to the following occurrence
        JobKind::Cron => parse_cron(&job.schedule)
            .ok()?
            .find_next_occurrence(&from, false)
            .ok(),
    }
}
