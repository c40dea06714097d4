//! Runtime assembly — builds every subsystem from config and runs the
//! long-lived activities of the daemon.
//!
//! Four activities cooperate: the interactive front-end, the gateway
//! request handler, the scheduler loop (10 s tick), and the delivery
//! worker (1 s poll). A single shutdown signal propagates to all of them;
//! each drains its current iteration before exiting.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use switchboard_agent::AgentLoop;
use switchboard_backend::OpenAiBackend;
use switchboard_channels::{ChannelRegistry, CliChannel, FileChannel};
use switchboard_config::AppConfig;
use switchboard_core::InboundMessage;
use switchboard_gateway::GatewayState;
use switchboard_memory::{MemoryStore, SoulStore};
use switchboard_queue::{DeliveryQueue, EnqueueOptions};
use switchboard_routing::Router;
use switchboard_scheduler::{Job, Scheduler};
use switchboard_sessions::SessionStore;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// How often the scheduler checks for due jobs.
const SCHEDULER_TICK: Duration = Duration::from_secs(10);

/// How often stuck Processing rows are swept back into the retry path.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Reservations older than this are considered abandoned.
const STUCK_THRESHOLD_MINUTES: i64 = 5;

/// The assembled runtime.
pub struct Runtime {
    pub state: Arc<GatewayState>,
    pub channels: ChannelRegistry,
}

/// Build every subsystem rooted at the configured workspace.
pub async fn build(config: &AppConfig) -> Result<Runtime, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&config.workspace_dir)?;

    let sessions = Arc::new(SessionStore::open(&config.workspace_dir)?);
    let memory = Arc::new(MemoryStore::open(&config.workspace_dir)?);
    let souls = Arc::new(SoulStore::open(&config.workspace_dir)?);
    let router = Arc::new(Router::open(&config.workspace_dir, &config.default_agent)?);
    let scheduler = Arc::new(Scheduler::open(&config.workspace_dir)?);
    let queue = Arc::new(DeliveryQueue::open(&config.workspace_dir).await?);

    let backend = Arc::new(OpenAiBackend::new(
        "deepseek",
        &config.base_url,
        config.api_key.clone().unwrap_or_default(),
    )?);
    let tools = Arc::new(switchboard_tools::default_registry(
        &config.workspace_dir,
        config.tools.allowed_commands.clone(),
    ));
    let agent = Arc::new(AgentLoop::new(
        backend,
        &config.model,
        config.max_tokens,
        tools,
        sessions.clone(),
        memory.clone(),
    ));

    let mut channels = ChannelRegistry::new();
    channels.register(Arc::new(FileChannel::new(&config.workspace_dir)?));
    channels.register(Arc::new(CliChannel::new()));

    let state = Arc::new(GatewayState {
        default_agent: config.default_agent.clone(),
        agent,
        sessions,
        router,
        scheduler,
        queue,
        memory,
        souls,
    });

    info!(workspace = %config.workspace_dir.display(), "Runtime assembled");
    Ok(Runtime { state, channels })
}

/// Route one inbound message through the agent and enqueue the reply.
pub async fn handle_inbound(state: &GatewayState, msg: InboundMessage) {
    let resolution = state.router.resolve(&msg.channel, &msg.sender).await;
    let soul = state.souls.load(&resolution.agent_id);

    let reply = match state.agent.run(&msg.text, &resolution.session_key, &soul).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(channel = %msg.channel, sender = %msg.sender, error = %e, "Turn failed");
            return;
        }
    };

    let thread_id = msg
        .thread_id
        .clone()
        .unwrap_or_else(|| resolution.session_key.clone());
    if let Err(e) = state
        .queue
        .enqueue(
            &msg.channel,
            &msg.sender,
            &reply,
            EnqueueOptions {
                thread_id: Some(thread_id),
                session_key: Some(resolution.session_key.clone()),
                ..Default::default()
            },
        )
        .await
    {
        warn!(session_key = %resolution.session_key, error = %e, "Failed to enqueue reply");
    }
}

/// The scheduler loop: every tick, run due jobs sequentially in next_run
/// order on synthetic cron sessions.
pub async fn scheduler_loop(state: Arc<GatewayState>, mut shutdown: watch::Receiver<bool>) {
    info!("Scheduler loop started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let now = Utc::now();
        for job in state.scheduler.get_due(now).await {
            run_job(&state, &job).await;
        }

        tokio::select! {
            _ = tokio::time::sleep(SCHEDULER_TICK) => {}
            _ = shutdown.changed() => {}
        }
    }

    info!("Scheduler loop stopped");
}

async fn run_job(state: &GatewayState, job: &Job) {
    let session_key = format!("{}:cron:{}", job.agent_id, job.id);
    info!(job_id = %job.id, name = %job.name, "Job fired");

    let soul = state.souls.load(&job.agent_id);
    let outcome = match state.agent.run(&job.prompt, &session_key, &soul).await {
        Ok(reply) => {
            deliver_job_reply(state, job, &reply).await;
            reply
        }
        // A failed job is recorded and stays schedulable
        Err(e) => format!("Error: {e}"),
    };

    if let Err(e) = state
        .scheduler
        .mark_executed(&job.id, Utc::now(), &outcome)
        .await
    {
        warn!(job_id = %job.id, error = %e, "Failed to record job execution");
    }
}

/// Job replies go out through the agent's best concrete binding, entering
/// the same delivery queue as conversational replies.
async fn deliver_job_reply(state: &GatewayState, job: &Job, reply: &str) {
    let bindings = state.router.list_for_agent(&job.agent_id).await;
    let Some(target) = bindings
        .iter()
        .filter(|b| b.enabled && b.peer != "*")
        .min_by_key(|b| b.priority)
    else {
        debug!(job_id = %job.id, "No delivery binding for job reply");
        return;
    };

    if let Err(e) = state
        .queue
        .enqueue(
            &target.channel,
            &target.peer,
            reply,
            EnqueueOptions {
                session_key: Some(format!("{}:cron:{}", job.agent_id, job.id)),
                ..Default::default()
            },
        )
        .await
    {
        warn!(job_id = %job.id, error = %e, "Failed to enqueue job reply");
    }
}

/// Poll channels for inbound traffic and feed it through the agent.
pub async fn inbound_loop(
    state: Arc<GatewayState>,
    channels: Vec<Arc<dyn switchboard_core::Channel>>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!("Inbound poll loop started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        for channel in &channels {
            match channel.receive().await {
                Ok(Some(msg)) => handle_inbound(&state, msg).await,
                Ok(None) => {}
                Err(e) => warn!(channel = channel.id(), error = %e, "Inbound poll failed"),
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(2)) => {}
            _ = shutdown.changed() => {}
        }
    }

    info!("Inbound poll loop stopped");
}

/// Periodically release Processing rows abandoned by a crash.
pub async fn sweeper_loop(state: Arc<GatewayState>, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(SWEEP_INTERVAL) => {}
            _ = shutdown.changed() => { continue; }
        }

        match state
            .queue
            .release_stuck(chrono::Duration::minutes(STUCK_THRESHOLD_MINUTES))
            .await
        {
            Ok(0) => {}
            Ok(released) => info!(released, "Stuck deliveries released"),
            Err(e) => warn!(error = %e, "Stuck-delivery sweep failed"),
        }
    }
}

/// The interactive front-end: stdin lines become cli-channel turns.
pub async fn interactive_loop(state: Arc<GatewayState>, mut shutdown: watch::Receiver<bool>) {
    use tokio::io::{AsyncBufReadExt, BufReader};

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
                continue;
            }
        };

        match line {
            Ok(Some(line)) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                if matches!(line.as_str(), "exit" | "quit" | "/exit" | "/quit") {
                    break;
                }
                let msg = InboundMessage {
                    channel: "cli".into(),
                    sender: "user".into(),
                    text: line,
                    media_urls: Vec::new(),
                    thread_id: None,
                    timestamp: Utc::now(),
                };
                handle_inbound(&state, msg).await;
            }
            Ok(None) => break, // EOF
            Err(e) => {
                warn!(error = %e, "Failed to read stdin");
                break;
            }
        }
    }

    info!("Interactive front-end stopped");
}
