//! The persistent job list.
//!
//! Jobs live in `<workspace>/.scheduler/jobs.jsonl`, one record per line,
//! append-only: every mutation appends the job's full current state, and
//! reload keeps the last record per id while dropping expired at-jobs.
//! Deletion and load both compact the file with a full rewrite.

use crate::job::{next_run_after, parse_cron, parse_interval, Job, JobKind};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use switchboard_core::SchedulerError;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Cap on stored execution results.
const MAX_RESULT_LEN: usize = 2000;

/// The scheduler's job store.
pub struct Scheduler {
    path: PathBuf,
    jobs: RwLock<BTreeMap<String, Job>>,
}

impl Scheduler {
    /// Open (or initialize) the job list under `<workspace>/.scheduler/`.
    pub fn open(workspace_dir: &Path) -> Result<Self, SchedulerError> {
        let dir = workspace_dir.join(".scheduler");
        std::fs::create_dir_all(&dir)
            .map_err(|e| SchedulerError::Storage(format!("Failed to create scheduler dir: {e}")))?;
        let path = dir.join("jobs.jsonl");

        let mut jobs: BTreeMap<String, Job> = BTreeMap::new();
        if let Ok(content) = std::fs::read_to_string(&path) {
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Job>(line) {
                    // Last record per id wins
                    Ok(job) => {
                        jobs.insert(job.id.clone(), job);
                    }
                    Err(e) => warn!(error = %e, "Skipping corrupt job record"),
                }
            }
        }

        // Expired at-jobs are pruned on reload
        jobs.retain(|_, job| !job.expired);
        Self::rewrite_file(&path, &jobs)?;

        Ok(Self {
            path,
            jobs: RwLock::new(jobs),
        })
    }

    fn append_record(&self, job: &Job) -> Result<(), SchedulerError> {
        let line = serde_json::to_string(job)
            .map_err(|e| SchedulerError::Storage(format!("Failed to serialize job: {e}")))?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| SchedulerError::Storage(format!("Failed to open job list: {e}")))?;
        writeln!(file, "{line}")
            .map_err(|e| SchedulerError::Storage(format!("Failed to append job: {e}")))?;
        Ok(())
    }

    fn rewrite_file(path: &Path, jobs: &BTreeMap<String, Job>) -> Result<(), SchedulerError> {
        let mut content = String::new();
        for job in jobs.values() {
            let line = serde_json::to_string(job)
                .map_err(|e| SchedulerError::Storage(format!("Failed to serialize job: {e}")))?;
            content.push_str(&line);
            content.push('\n');
        }
        std::fs::write(path, content)
            .map_err(|e| SchedulerError::Storage(format!("Failed to rewrite job list: {e}")))?;
        Ok(())
    }

    async fn create_job(
        &self,
        agent_id: &str,
        name: &str,
        prompt: &str,
        kind: JobKind,
        schedule: String,
        max_runs: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<Job, SchedulerError> {
        let id: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        let mut job = Job {
            id: format!("job_{id}"),
            agent_id: agent_id.to_string(),
            name: name.to_string(),
            prompt: prompt.to_string(),
            kind,
            schedule,
            created_at: now,
            next_run: None,
            last_run: None,
            run_count: 0,
            max_runs,
            enabled: true,
            expired: false,
            last_result: None,
        };
        job.next_run = next_run_after(&job, now);

        self.append_record(&job)?;
        self.jobs.write().await.insert(job.id.clone(), job.clone());
        info!(id = %job.id, name, kind = ?kind, schedule = %job.schedule, "Job created");
        Ok(job)
    }

    /// Create a one-shot job firing at `at_utc`.
    pub async fn create_at(
        &self,
        agent_id: &str,
        name: &str,
        prompt: &str,
        at_utc: DateTime<Utc>,
    ) -> Result<Job, SchedulerError> {
        self.create_job(
            agent_id,
            name,
            prompt,
            JobKind::At,
            at_utc.to_rfc3339(),
            None,
            Utc::now(),
        )
        .await
    }

    /// Create a repeating interval job (`<number><unit>`, unit in s/m/h/d).
    pub async fn create_every(
        &self,
        agent_id: &str,
        name: &str,
        prompt: &str,
        interval: &str,
        max_runs: Option<u64>,
    ) -> Result<Job, SchedulerError> {
        parse_interval(interval).map_err(|reason| SchedulerError::InvalidSchedule {
            schedule: interval.to_string(),
            reason,
        })?;
        self.create_job(
            agent_id,
            name,
            prompt,
            JobKind::Every,
            interval.to_string(),
            max_runs,
            Utc::now(),
        )
        .await
    }

    /// Create a repeating cron job (standard 5-field expression).
    pub async fn create_cron(
        &self,
        agent_id: &str,
        name: &str,
        prompt: &str,
        cron_expr: &str,
        max_runs: Option<u64>,
    ) -> Result<Job, SchedulerError> {
        parse_cron(cron_expr).map_err(|reason| SchedulerError::InvalidSchedule {
            schedule: cron_expr.to_string(),
            reason,
        })?;
        self.create_job(
            agent_id,
            name,
            prompt,
            JobKind::Cron,
            cron_expr.to_string(),
            max_runs,
            Utc::now(),
        )
        .await
    }

    /// Delete a job. Returns whether it existed.
    pub async fn delete(&self, id: &str) -> Result<bool, SchedulerError> {
        let mut jobs = self.jobs.write().await;
        let removed = jobs.remove(id).is_some();
        if removed {
            Self::rewrite_file(&self.path, &jobs)?;
        }
        Ok(removed)
    }

    /// Enable or disable a job. Re-enabling recomputes `next_run` from now.
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<bool, SchedulerError> {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(id) else {
            return Ok(false);
        };
        job.enabled = enabled;
        job.next_run = next_run_after(job, Utc::now());
        let record = job.clone();
        drop(jobs);
        self.append_record(&record)?;
        Ok(true)
    }

    /// Jobs due at `now`, ordered by `next_run` ascending.
    pub async fn get_due(&self, now: DateTime<Utc>) -> Vec<Job> {
        let jobs = self.jobs.read().await;
        let mut due: Vec<Job> = jobs
            .values()
            .filter(|job| {
                job.schedulable() && job.next_run.map(|t| t <= now).unwrap_or(false)
            })
            .cloned()
            .collect();
        due.sort_by_key(|job| job.next_run);
        due
    }

    /// Record an execution: bumps `run_count`, sets `last_run` and
    /// `last_result`, expires at-jobs, and advances `next_run`.
    pub async fn mark_executed(
        &self,
        id: &str,
        now: DateTime<Utc>,
        result: &str,
    ) -> Result<Job, SchedulerError> {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(id) else {
            return Err(SchedulerError::NotFound(id.to_string()));
        };

        job.last_run = Some(now);
        job.run_count += 1;
        job.expired = job.kind == JobKind::At && job.run_count > 0;
        job.last_result = Some(truncate_result(result));
        job.next_run = next_run_after(job, now);

        let record = job.clone();
        drop(jobs);
        self.append_record(&record)?;
        debug!(id, run_count = record.run_count, next_run = ?record.next_run, "Job executed");
        Ok(record)
    }

    /// All jobs, ordered by creation time.
    pub async fn get_all(&self) -> Vec<Job> {
        let mut all: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        all.sort_by_key(|job| job.created_at);
        all
    }

    /// One job by id.
    pub async fn get(&self, id: &str) -> Option<Job> {
        self.jobs.read().await.get(id).cloned()
    }

    /// The most recent execution result for a job.
    pub async fn get_last_result(&self, id: &str) -> Option<String> {
        self.jobs.read().await.get(id).and_then(|j| j.last_result.clone())
    }
}

fn truncate_result(result: &str) -> String {
    if result.chars().count() <= MAX_RESULT_LEN {
        return result.to_string();
    }
    result.chars().take(MAX_RESULT_LEN).collect()
}
