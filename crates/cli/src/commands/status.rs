//! `switchboard status` — workspace state at a glance.

use switchboard_config::AppConfig;
use switchboard_memory::MemoryStore;
use switchboard_queue::DeliveryQueue;
use switchboard_routing::Router;
use switchboard_scheduler::Scheduler;
use switchboard_sessions::SessionStore;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    std::fs::create_dir_all(&config.workspace_dir)?;

    let sessions = SessionStore::open(&config.workspace_dir)?;
    let router = Router::open(&config.workspace_dir, &config.default_agent)?;
    let scheduler = Scheduler::open(&config.workspace_dir)?;
    let memory = MemoryStore::open(&config.workspace_dir)?;
    let queue = DeliveryQueue::open(&config.workspace_dir).await?;

    println!("Workspace: {}", config.workspace_dir.display());

    let session_list = sessions.list().await;
    println!("\nSessions: {}", session_list.len());
    for meta in session_list.iter().take(10) {
        println!(
            "   {}  ({} messages, updated {})",
            meta.key, meta.message_count, meta.updated_at
        );
    }

    let bindings = router.list().await;
    println!("\nBindings: {}", bindings.len());
    for binding in &bindings {
        println!(
            "   {} {}:{} -> {} (priority {}, {})",
            binding.id,
            binding.channel,
            binding.peer,
            binding.agent_id,
            binding.priority,
            if binding.enabled { "enabled" } else { "disabled" }
        );
    }

    let jobs = scheduler.get_all().await;
    println!("\nJobs: {}", jobs.len());
    for job in &jobs {
        println!(
            "   {} '{}' {:?} {} (runs {}, next {:?})",
            job.id, job.name, job.kind, job.schedule, job.run_count, job.next_run
        );
    }

    let stats = queue.get_stats().await?;
    println!(
        "\nQueue: {} total (pending {}, processing {}, delivered {}, failed {}, dead-letter {})",
        stats.total, stats.pending, stats.processing, stats.delivered, stats.failed, stats.dead_letter
    );

    println!("\nMemories: {}", memory.count().await);

    Ok(())
}
