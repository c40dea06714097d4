//! The agent reasoning loop.
//!
//! One turn is a bounded fixed-point: call the backend with the session
//! history, execute any requested tools, feed the results back, and stop
//! when the backend stops asking for tools. The completed turn is then
//! persisted in one piece; a failed turn leaves the transcript untouched.
//!
//! Turns on the same session key are serialized — one in flight per key.

use std::collections::HashMap;
use std::sync::Arc;
use switchboard_core::{
    Backend, ChatMessage, CompletionRequest, ContentBlock, Error, Soul, ToolRegistry,
};
use switchboard_memory::MemoryStore;
use switchboard_sessions::SessionStore;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Hard bound on backend calls per turn. Exceeding it is a fatal error
/// for the turn; nothing is persisted.
pub const MAX_ITERATIONS: u32 = 32;

/// Importance assigned to auto-recorded conversation memories.
const TURN_MEMORY_IMPORTANCE: f64 = 0.5;

/// The agent loop.
pub struct AgentLoop {
    backend: Arc<dyn Backend>,
    model: String,
    max_tokens: u32,
    tools: Arc<ToolRegistry>,
    sessions: Arc<SessionStore>,
    memory: Arc<MemoryStore>,
    max_iterations: u32,
    /// One turn in flight per session key
    turn_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AgentLoop {
    pub fn new(
        backend: Arc<dyn Backend>,
        model: impl Into<String>,
        max_tokens: u32,
        tools: Arc<ToolRegistry>,
        sessions: Arc<SessionStore>,
        memory: Arc<MemoryStore>,
    ) -> Self {
        Self {
            backend,
            model: model.into(),
            max_tokens,
            tools,
            sessions,
            memory,
            max_iterations: MAX_ITERATIONS,
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Override the iteration bound.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    async fn lock_for(&self, session_key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.turn_locks.lock().await;
        locks
            .entry(session_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run one user turn against a session and return the final text.
    pub async fn run(&self, user_text: &str, session_key: &str, soul: &Soul) -> Result<String, Error> {
        let turn_lock = self.lock_for(session_key).await;
        let _turn = turn_lock.lock().await;

        let (meta, mut history) = self.sessions.load(session_key).await?;
        info!(
            session_key,
            session_id = %meta.session_id,
            messages = history.len(),
            "Turn started"
        );

        // Retrieve context from memory and fold it into the user text; the
        // augmented wording is what gets persisted
        let recalled = self.memory.retrieve(user_text).await;
        let augmented = if recalled.is_empty() {
            user_text.to_string()
        } else {
            debug!(count = recalled.len(), "Recalled memories for context");
            let mut text = format!("{user_text}\n\nRelevant memories:");
            for memory in &recalled {
                text.push_str(&format!("\n- {}", memory.content));
            }
            text
        };

        history.push(ChatMessage::user(augmented.clone()));
        let mut assistant_blocks: Vec<ContentBlock> = Vec::new();

        let outcome = self
            .drive(session_key, soul, &mut history, &mut assistant_blocks)
            .await;

        let final_text = match outcome {
            Ok(text) => text,
            Err(e) => {
                // Abort: drop staged results so the transcript stays as it
                // was before the turn
                self.sessions.discard_pending(session_key).await;
                return Err(e);
            }
        };

        self.memory
            .add(
                format!("User: {user_text}\nAssistant: {final_text}"),
                Some(session_key.to_string()),
                Vec::new(),
                Some(TURN_MEMORY_IMPORTANCE),
            )
            .await?;

        self.sessions
            .save_turn(session_key, &augmented, &assistant_blocks)
            .await?;

        info!(session_key, "Turn completed");
        Ok(final_text)
    }

    /// The fixed-point: call, execute tools, repeat until a non-tool stop.
    async fn drive(
        &self,
        session_key: &str,
        soul: &Soul,
        history: &mut Vec<ChatMessage>,
        assistant_blocks: &mut Vec<ContentBlock>,
    ) -> Result<String, Error> {
        let descriptors = self.tools.descriptors();

        for iteration in 1..=self.max_iterations {
            debug!(session_key, iteration, "Agent loop iteration");

            let request = CompletionRequest {
                model: self.model.clone(),
                system: Some(soul.system_prompt()),
                messages: history.clone(),
                max_tokens: self.max_tokens,
                tools: descriptors.clone(),
                tool_choice: if descriptors.is_empty() {
                    None
                } else {
                    Some("auto".into())
                },
            };

            let response = self.backend.complete(request).await?;
            assistant_blocks.extend(response.blocks.iter().cloned());

            if !response.wants_tools() {
                return Ok(response.text());
            }

            // Execute the requested tools in order, recording each result
            // as it lands
            history.push(ChatMessage::assistant_blocks(response.blocks.clone()));
            let mut results: Vec<ContentBlock> = Vec::new();
            for block in &response.blocks {
                let ContentBlock::ToolUse { id, name, input } = block else {
                    continue;
                };
                let output = self.tools.execute(name, input.clone()).await;
                self.sessions
                    .save_tool_result(session_key, id, &output)
                    .await?;
                results.push(ContentBlock::tool_result(id.clone(), output));
            }
            history.push(ChatMessage::tool_results(results));
        }

        warn!(session_key, max = self.max_iterations, "Iteration bound exceeded");
        Err(Error::Internal(format!(
            "Agent loop exceeded {} iterations without a final response",
            self.max_iterations
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use switchboard_core::{BackendError, CompletionResponse};

    /// A backend that replays a script of responses and records every
    /// request it saw.
    struct ScriptedBackend {
        script: StdMutex<Vec<CompletionResponse>>,
        requests: StdMutex<Vec<CompletionRequest>>,
        delay: Option<std::time::Duration>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<CompletionResponse>) -> Self {
            Self {
                script: StdMutex::new(script),
                requests: StdMutex::new(Vec::new()),
                delay: None,
            }
        }

        fn text_response(text: &str) -> CompletionResponse {
            CompletionResponse {
                blocks: vec![ContentBlock::text(text)],
                stop_reason: "stop".into(),
            }
        }

        fn tool_response(id: &str, name: &str, input: serde_json::Value) -> CompletionResponse {
            CompletionResponse {
                blocks: vec![ContentBlock::tool_use(id, name, input)],
                stop_reason: "tool_calls".into(),
            }
        }
    }

    #[async_trait]
    impl Backend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, BackendError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.requests.lock().unwrap().push(request);
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                return Err(BackendError::Network("script exhausted".into()));
            }
            Ok(script.remove(0))
        }
    }

    struct StubReadFile;

    #[async_trait]
    impl switchboard_core::Tool for StubReadFile {
        fn name(&self) -> &str {
            "read_file"
        }
        fn description(&self) -> &str {
            "stub"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {"file_path": {"type": "string", "description": "path"}},
                "required": ["file_path"]
            })
        }
        async fn execute(
            &self,
            _arguments: serde_json::Value,
        ) -> Result<String, switchboard_core::ToolError> {
            Ok("contents-of-a".into())
        }
    }

    fn harness(
        backend: ScriptedBackend,
        with_tools: bool,
    ) -> (tempfile::TempDir, AgentLoop, Arc<SessionStore>, Arc<MemoryStore>) {
        let tmp = tempfile::tempdir().unwrap();
        let sessions = Arc::new(SessionStore::open(tmp.path()).unwrap());
        let memory = Arc::new(MemoryStore::open(tmp.path()).unwrap());
        let mut registry = ToolRegistry::new();
        if with_tools {
            registry.register(Box::new(StubReadFile));
        }
        let agent = AgentLoop::new(
            Arc::new(backend),
            "deepseek-chat",
            4096,
            Arc::new(registry),
            sessions.clone(),
            memory.clone(),
        );
        (tmp, agent, sessions, memory)
    }

    #[tokio::test]
    async fn pure_chat_turn() {
        let backend = ScriptedBackend::new(vec![ScriptedBackend::text_response("hello")]);
        let (_tmp, agent, sessions, memory) = harness(backend, false);

        let soul = Soul::named("main");
        let final_text = agent.run("hi", "main:cli:user", &soul).await.unwrap();
        assert_eq!(final_text, "hello");

        let (meta, history) = sessions.load("main:cli:user").await.unwrap();
        assert_eq!(meta.message_count, 1);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], ChatMessage::user("hi"));
        assert_eq!(history[1], ChatMessage::assistant("hello"));

        // The exchange was recorded as a memory
        assert_eq!(memory.count().await, 1);
        let hits = memory.search("hello", 5).await;
        assert!(hits[0].content.starts_with("User: hi"));
        assert_eq!(hits[0].importance, Some(TURN_MEMORY_IMPORTANCE));
    }

    #[tokio::test]
    async fn single_tool_call_turn() {
        let backend = ScriptedBackend::new(vec![
            ScriptedBackend::tool_response(
                "t1",
                "read_file",
                serde_json::json!({"file_path": "a.txt"}),
            ),
            ScriptedBackend::text_response("here is a"),
        ]);
        let (_tmp, agent, sessions, _memory) = harness(backend, true);

        let soul = Soul::named("main");
        let final_text = agent
            .run("read file a.txt", "main:cli:user", &soul)
            .await
            .unwrap();
        assert_eq!(final_text, "here is a");

        let (_, history) = sessions.load("main:cli:user").await.unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0], ChatMessage::user("read file a.txt"));
        assert_eq!(
            history[1],
            ChatMessage::assistant_blocks(vec![ContentBlock::tool_use(
                "t1",
                "read_file",
                serde_json::json!({"file_path": "a.txt"})
            )])
        );
        assert_eq!(
            history[2],
            ChatMessage::tool_results(vec![ContentBlock::tool_result("t1", "contents-of-a")])
        );
        assert_eq!(history[3], ChatMessage::assistant("here is a"));
    }

    #[tokio::test]
    async fn recalled_memories_augment_the_user_text() {
        let backend = ScriptedBackend::new(vec![ScriptedBackend::text_response("it is blue")]);
        let (_tmp, agent, sessions, memory) = harness(backend, false);
        memory
            .add("favorite color is blue", None, Vec::new(), None)
            .await
            .unwrap();

        let soul = Soul::named("main");
        agent
            .run("what is my favorite color", "main:cli:user", &soul)
            .await
            .unwrap();

        // The persisted user entry carries the memory block verbatim
        let (_, history) = sessions.load("main:cli:user").await.unwrap();
        let user_text = history[0].content.text();
        assert!(user_text.starts_with("what is my favorite color"));
        assert!(user_text.contains("Relevant memories:"));
        assert!(user_text.contains("favorite color is blue"));
    }

    #[tokio::test]
    async fn backend_failure_leaves_no_trace_of_the_turn() {
        let backend = ScriptedBackend::new(vec![]); // fails immediately
        let (_tmp, agent, sessions, memory) = harness(backend, false);

        let soul = Soul::named("main");
        let result = agent.run("hi", "main:cli:user", &soul).await;
        assert!(result.is_err());

        let (meta, history) = sessions.load("main:cli:user").await.unwrap();
        assert_eq!(meta.message_count, 0);
        assert!(history.is_empty());
        assert_eq!(memory.count().await, 0);
    }

    #[tokio::test]
    async fn iteration_bound_aborts_the_turn() {
        // Always asks for another tool call
        let script: Vec<CompletionResponse> = (0..40)
            .map(|i| {
                ScriptedBackend::tool_response(
                    &format!("t{i}"),
                    "read_file",
                    serde_json::json!({"file_path": "a.txt"}),
                )
            })
            .collect();
        let backend = ScriptedBackend::new(script);
        let (_tmp, agent, sessions, _memory) = harness(backend, true);
        let agent = agent.with_max_iterations(5);

        let soul = Soul::named("main");
        let result = agent.run("loop forever", "main:cli:user", &soul).await;
        assert!(matches!(result, Err(Error::Internal(_))));

        // The turn was not persisted
        let (meta, history) = sessions.load("main:cli:user").await.unwrap();
        assert_eq!(meta.message_count, 0);
        assert!(history.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_turns_on_one_key_are_serialized() {
        let backend = ScriptedBackend {
            script: StdMutex::new(vec![
                ScriptedBackend::text_response("first"),
                ScriptedBackend::text_response("second"),
            ]),
            requests: StdMutex::new(Vec::new()),
            delay: Some(std::time::Duration::from_millis(50)),
        };
        let (_tmp, agent, sessions, _memory) = harness(backend, false);
        let agent = Arc::new(agent);
        let soul = Soul::named("main");

        let a = {
            let agent = agent.clone();
            let soul = soul.clone();
            tokio::spawn(async move { agent.run("one", "main:cli:user", &soul).await })
        };
        let b = {
            let agent = agent.clone();
            let soul = soul.clone();
            tokio::spawn(async move { agent.run("two", "main:cli:user", &soul).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        // Both turns landed, in user-before-assistant order
        let (meta, history) = sessions.load("main:cli:user").await.unwrap();
        assert_eq!(meta.message_count, 2);
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].role, switchboard_core::Role::User);
        assert_eq!(history[1].role, switchboard_core::Role::Assistant);
        assert_eq!(history[2].role, switchboard_core::Role::User);
        assert_eq!(history[3].role, switchboard_core::Role::Assistant);
    }

    #[tokio::test]
    async fn system_prompt_comes_from_the_soul() {
        let backend = Arc::new(ScriptedBackend::new(vec![ScriptedBackend::text_response(
            "ok",
        )]));
        let tmp = tempfile::tempdir().unwrap();
        let sessions = Arc::new(SessionStore::open(tmp.path()).unwrap());
        let memory = Arc::new(MemoryStore::open(tmp.path()).unwrap());
        let agent = AgentLoop::new(
            backend.clone(),
            "deepseek-chat",
            4096,
            Arc::new(ToolRegistry::new()),
            sessions,
            memory,
        );

        let mut soul = Soul::named("ops");
        soul.rules = vec!["be brief".into()];
        agent.run("hi", "ops:cli:user", &soul).await.unwrap();

        let requests = backend.requests.lock().unwrap();
        let system = requests[0].system.as_deref().unwrap();
        assert!(system.starts_with("You are ops."));
        assert!(system.contains("be brief"));
    }
}
