//! `switchboard daemon` — the full gateway process.

use crate::runtime;
use std::sync::Arc;
use std::time::Duration;
use switchboard_config::AppConfig;
use switchboard_gateway::build_dispatcher;
use switchboard_queue::DeliveryWorker;
use tokio::sync::watch;
use tracing::{info, warn};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    println!("Switchboard daemon");
    println!("   Workspace: {}", config.workspace_dir.display());
    println!("   Gateway:   {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:     {}", config.model);

    let runtime = runtime::build(&config).await?;
    let state = runtime.state.clone();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Gateway request handler
    let dispatcher = Arc::new(build_dispatcher(state.clone()));
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let gateway = tokio::spawn({
        let shutdown = shutdown_rx.clone();
        async move { switchboard_gateway::serve(dispatcher, &addr, shutdown).await }
    });

    // Scheduler loop
    tokio::spawn(runtime::scheduler_loop(state.clone(), shutdown_rx.clone()));

    // Delivery worker
    let worker = DeliveryWorker::new(state.queue.clone(), runtime.channels.as_map());
    let worker_handle = tokio::spawn(worker.run(shutdown_rx.clone()));

    // Stuck-delivery sweeper
    tokio::spawn(runtime::sweeper_loop(state.clone(), shutdown_rx.clone()));

    // Inbound channel polling
    tokio::spawn(runtime::inbound_loop(
        state.clone(),
        runtime.channels.all(),
        shutdown_rx.clone(),
    ));

    // Interactive front-end on stdin
    tokio::spawn(runtime::interactive_loop(state.clone(), shutdown_rx.clone()));

    info!("Daemon running, Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    let _ = shutdown_tx.send(true);

    // The worker drains its current batch; don't wait forever for it
    if tokio::time::timeout(Duration::from_secs(5), worker_handle)
        .await
        .is_err()
    {
        warn!("Delivery worker did not stop within 5s");
    }
    gateway.abort();

    Ok(())
}
