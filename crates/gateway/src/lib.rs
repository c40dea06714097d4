//! Gateway — the method surface over every subsystem.
//!
//! A named-method dispatcher exposes messaging, queue, scheduler, routing,
//! session, soul, and memory operations as thin adapters. The HTTP
//! transport (axum, one POST endpoint) frames requests onto it; the
//! dispatcher itself is transport-agnostic.

pub mod dispatch;
pub mod server;

pub use dispatch::{Dispatcher, GatewayError};
pub use server::{build_http_router, serve};

use crate::dispatch::{optional_i64, optional_str, optional_u64, require_str};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use switchboard_agent::AgentLoop;
use switchboard_core::Soul;
use switchboard_memory::{MemoryStore, SoulStore};
use switchboard_queue::{DeliveryQueue, EnqueueOptions};
use switchboard_routing::Router;
use switchboard_scheduler::Scheduler;
use switchboard_sessions::SessionStore;

/// Everything the gateway methods operate on.
pub struct GatewayState {
    pub default_agent: String,
    pub agent: Arc<AgentLoop>,
    pub sessions: Arc<SessionStore>,
    pub router: Arc<Router>,
    pub scheduler: Arc<Scheduler>,
    pub queue: Arc<DeliveryQueue>,
    pub memory: Arc<MemoryStore>,
    pub souls: Arc<SoulStore>,
}

fn internal(e: impl std::fmt::Display) -> GatewayError {
    GatewayError::Internal(e.to_string())
}

fn to_value<T: serde::Serialize>(value: T) -> Result<serde_json::Value, GatewayError> {
    serde_json::to_value(value).map_err(internal)
}

fn parse_timestamp(raw: &str, key: &str) -> Result<DateTime<Utc>, GatewayError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| GatewayError::InvalidParams(format!("bad timestamp in '{key}': {e}")))
}

/// Build the full method table over the given state.
pub fn build_dispatcher(state: Arc<GatewayState>) -> Dispatcher {
    let mut dispatcher = Dispatcher::new();

    // --- Messaging ---

    let st = state.clone();
    dispatcher.register("send_message", move |params| {
        let st = st.clone();
        async move {
            let channel = require_str(&params, "channel")?;
            let sender = require_str(&params, "sender")?;
            let text = require_str(&params, "text")?;

            let resolution = st.router.resolve(&channel, &sender).await;
            let soul = st.souls.load(&resolution.agent_id);
            let reply = st
                .agent
                .run(&text, &resolution.session_key, &soul)
                .await
                .map_err(internal)?;

            let message_id = st
                .queue
                .enqueue(
                    &channel,
                    &sender,
                    &reply,
                    EnqueueOptions {
                        thread_id: Some(resolution.session_key.clone()),
                        session_key: Some(resolution.session_key.clone()),
                        ..Default::default()
                    },
                )
                .await
                .map_err(internal)?;

            Ok(json!({
                "agent_id": resolution.agent_id,
                "session_key": resolution.session_key,
                "reply": reply,
                "message_id": message_id,
            }))
        }
    });

    // --- Delivery queue ---

    let st = state.clone();
    dispatcher.register("queue_message", move |params| {
        let st = st.clone();
        async move {
            let channel = require_str(&params, "channel")?;
            let recipient = require_str(&params, "recipient")?;
            let content = require_str(&params, "content")?;
            let scheduled_at = match optional_str(&params, "scheduled_at") {
                Some(raw) => Some(parse_timestamp(&raw, "scheduled_at")?),
                None => None,
            };

            let id = st
                .queue
                .enqueue(
                    &channel,
                    &recipient,
                    &content,
                    EnqueueOptions {
                        thread_id: optional_str(&params, "thread_id"),
                        session_key: optional_str(&params, "session_key"),
                        scheduled_at,
                        priority: optional_i64(&params, "priority", 0),
                    },
                )
                .await
                .map_err(internal)?;
            Ok(json!({ "id": id }))
        }
    });

    let st = state.clone();
    dispatcher.register("queue_stats", move |_params| {
        let st = st.clone();
        async move { to_value(st.queue.get_stats().await.map_err(internal)?) }
    });

    let st = state.clone();
    dispatcher.register("list_dead_letters", move |params| {
        let st = st.clone();
        async move {
            let limit = optional_i64(&params, "limit", 10);
            to_value(st.queue.get_dead_letters(limit).await.map_err(internal)?)
        }
    });

    let st = state.clone();
    dispatcher.register("retry_dead_letter", move |params| {
        let st = st.clone();
        async move {
            let id = require_str(&params, "id")?;
            let retried = st.queue.retry_dead_letter(&id).await.map_err(internal)?;
            Ok(json!({ "retried": retried }))
        }
    });

    // --- Scheduler ---

    let st = state.clone();
    dispatcher.register("schedule_at", move |params| {
        let st = st.clone();
        async move {
            let agent = optional_str(&params, "agent").unwrap_or_else(|| st.default_agent.clone());
            let name = require_str(&params, "name")?;
            let prompt = require_str(&params, "prompt")?;
            let at = parse_timestamp(&require_str(&params, "at")?, "at")?;
            let job = st
                .scheduler
                .create_at(&agent, &name, &prompt, at)
                .await
                .map_err(internal)?;
            to_value(job)
        }
    });

    let st = state.clone();
    dispatcher.register("schedule_every", move |params| {
        let st = st.clone();
        async move {
            let agent = optional_str(&params, "agent").unwrap_or_else(|| st.default_agent.clone());
            let name = require_str(&params, "name")?;
            let prompt = require_str(&params, "prompt")?;
            let interval = require_str(&params, "interval")?;
            let job = st
                .scheduler
                .create_every(&agent, &name, &prompt, &interval, optional_u64(&params, "max_runs"))
                .await
                .map_err(|e| match e {
                    switchboard_core::SchedulerError::InvalidSchedule { .. } => {
                        GatewayError::InvalidParams(e.to_string())
                    }
                    other => internal(other),
                })?;
            to_value(job)
        }
    });

    let st = state.clone();
    dispatcher.register("schedule_cron", move |params| {
        let st = st.clone();
        async move {
            let agent = optional_str(&params, "agent").unwrap_or_else(|| st.default_agent.clone());
            let name = require_str(&params, "name")?;
            let prompt = require_str(&params, "prompt")?;
            let cron = require_str(&params, "cron")?;
            let job = st
                .scheduler
                .create_cron(&agent, &name, &prompt, &cron, optional_u64(&params, "max_runs"))
                .await
                .map_err(|e| match e {
                    switchboard_core::SchedulerError::InvalidSchedule { .. } => {
                        GatewayError::InvalidParams(e.to_string())
                    }
                    other => internal(other),
                })?;
            to_value(job)
        }
    });

    let st = state.clone();
    dispatcher.register("list_jobs", move |_params| {
        let st = st.clone();
        async move { to_value(st.scheduler.get_all().await) }
    });

    let st = state.clone();
    dispatcher.register("delete_job", move |params| {
        let st = st.clone();
        async move {
            let id = require_str(&params, "id")?;
            let deleted = st.scheduler.delete(&id).await.map_err(internal)?;
            Ok(json!({ "deleted": deleted }))
        }
    });

    let st = state.clone();
    dispatcher.register("toggle_job", move |params| {
        let st = st.clone();
        async move {
            let id = require_str(&params, "id")?;
            let enabled = params["enabled"]
                .as_bool()
                .ok_or_else(|| GatewayError::InvalidParams("missing bool param 'enabled'".into()))?;
            let updated = st.scheduler.set_enabled(&id, enabled).await.map_err(internal)?;
            Ok(json!({ "updated": updated }))
        }
    });

    // --- Routing ---

    let st = state.clone();
    dispatcher.register("create_binding", move |params| {
        let st = st.clone();
        async move {
            let agent = require_str(&params, "agent")?;
            let channel = require_str(&params, "channel")?;
            let peer = require_str(&params, "peer")?;
            let priority = optional_i64(&params, "priority", 100);
            let binding = st
                .router
                .create_binding(&agent, &channel, &peer, priority)
                .await
                .map_err(internal)?;
            to_value(binding)
        }
    });

    let st = state.clone();
    dispatcher.register("list_bindings", move |_params| {
        let st = st.clone();
        async move { to_value(st.router.list().await) }
    });

    let st = state.clone();
    dispatcher.register("delete_binding", move |params| {
        let st = st.clone();
        async move {
            let id = require_str(&params, "id")?;
            let deleted = st.router.remove_binding(&id).await.map_err(internal)?;
            Ok(json!({ "deleted": deleted }))
        }
    });

    // --- Sessions ---

    let st = state.clone();
    dispatcher.register("list_sessions", move |_params| {
        let st = st.clone();
        async move { to_value(st.sessions.list().await) }
    });

    let st = state.clone();
    dispatcher.register("create_session", move |params| {
        let st = st.clone();
        async move {
            let key = require_str(&params, "key")?;
            to_value(st.sessions.create(&key).await.map_err(internal)?)
        }
    });

    let st = state.clone();
    dispatcher.register("get_history", move |params| {
        let st = st.clone();
        async move {
            let key = require_str(&params, "key")?;
            let (meta, history) = st.sessions.load(&key).await.map_err(internal)?;
            Ok(json!({
                "session": to_value(meta)?,
                "messages": to_value(history)?,
            }))
        }
    });

    // --- Souls ---

    let st = state.clone();
    dispatcher.register("get_soul", move |params| {
        let st = st.clone();
        async move {
            let agent = require_str(&params, "agent")?;
            to_value(st.souls.load(&agent))
        }
    });

    let st = state.clone();
    dispatcher.register("update_soul", move |params| {
        let st = st.clone();
        async move {
            let agent = require_str(&params, "agent")?;
            let mut soul: Soul = serde_json::from_value(params["soul"].clone())
                .map_err(|e| GatewayError::InvalidParams(format!("bad soul object: {e}")))?;
            if soul.name.is_empty() {
                soul.name = agent.clone();
            }
            st.souls.save(&agent, &soul).map_err(internal)?;
            to_value(soul)
        }
    });

    // --- Memory ---

    let st = state.clone();
    dispatcher.register("search_memories", move |params| {
        let st = st.clone();
        async move {
            let query = require_str(&params, "query")?;
            let limit = optional_i64(&params, "limit", 5).max(0) as usize;
            to_value(st.memory.search(&query, limit).await)
        }
    });

    dispatcher
}
