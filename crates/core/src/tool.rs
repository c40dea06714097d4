//! Tool trait and registry — the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world: execute
//! shell commands, read/write files, etc. The registry is the single
//! dispatch point: whatever happens inside a handler, `execute` returns a
//! string the model can read — errors included.

use crate::backend::ToolDescriptor;
use crate::error::ToolError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Default cap on tool output returned to the model.
pub const DEFAULT_OUTPUT_CAP: usize = 50_000;

/// Default per-call execution timeout.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// The core Tool trait.
///
/// Each tool (shell, file_read, file_write, ...) implements this trait.
/// Tools are registered in the ToolRegistry and made available to the
/// agent loop.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g. "shell", "read_file").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<String, ToolError>;

    /// Convert this tool into a descriptor for sending to the model.
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// The agent loop uses this to:
/// 1. Get tool descriptors to send to the model
/// 2. Look up and execute tools when the model requests them
///
/// `execute` never fails: unknown tools, handler errors, and timeouts all
/// come back as `"Error: ..."` strings that flow to the model as a
/// tool_result.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    output_cap: usize,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            output_cap: DEFAULT_OUTPUT_CAP,
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// Override the output truncation cap.
    pub fn with_output_cap(mut self, cap: usize) -> Self {
        self.output_cap = cap;
        self
    }

    /// Override the per-call execution timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get all tool descriptors (for sending to the model).
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.values().map(|t| t.descriptor()).collect()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Execute a tool call, returning the output (or an error string).
    pub async fn execute(&self, name: &str, arguments: serde_json::Value) -> String {
        let Some(tool) = self.tools.get(name) else {
            return format!("Error: Unknown tool '{name}'");
        };

        debug!(tool = name, "Executing tool");

        match tokio::time::timeout(self.timeout, tool.execute(arguments)).await {
            Err(_) => {
                warn!(tool = name, timeout_secs = self.timeout.as_secs(), "Tool timed out");
                format!("Error: Command timed out after {}s", self.timeout.as_secs())
            }
            Ok(Err(e)) => {
                warn!(tool = name, error = %e, "Tool execution failed");
                format!("Error: {name} failed: {e}")
            }
            Ok(Ok(output)) => self.truncate(output),
        }
    }

    /// Cap output length, appending a marker when content was dropped.
    fn truncate(&self, output: String) -> String {
        let total = output.chars().count();
        if total <= self.output_cap {
            return output;
        }
        let kept: String = output.chars().take(self.output_cap).collect();
        format!("{kept}... [truncated, {total} total chars]")
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string", "description": "Text to echo" }
                },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            arguments: serde_json::Value,
        ) -> std::result::Result<String, ToolError> {
            Ok(arguments["text"].as_str().unwrap_or("").to_string())
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn execute(
            &self,
            _arguments: serde_json::Value,
        ) -> std::result::Result<String, ToolError> {
            Err(ToolError::ExecutionFailed {
                tool_name: "broken".into(),
                reason: "boom".into(),
            })
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Sleeps"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn execute(
            &self,
            _arguments: serde_json::Value,
        ) -> std::result::Result<String, ToolError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("done".into())
        }
    }

    #[tokio::test]
    async fn execute_known_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let out = registry
            .execute("echo", serde_json::json!({"text": "hello world"}))
            .await;
        assert_eq!(out, "hello world");
    }

    #[tokio::test]
    async fn unknown_tool_is_a_string_error() {
        let registry = ToolRegistry::new();
        let out = registry.execute("nonexistent", serde_json::json!({})).await;
        assert!(out.starts_with("Error: Unknown tool"));
        assert!(out.contains("nonexistent"));
    }

    #[tokio::test]
    async fn handler_failure_is_a_string_error() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(FailingTool));
        let out = registry.execute("broken", serde_json::json!({})).await;
        assert!(out.starts_with("Error: broken failed:"));
        assert!(out.contains("boom"));
    }

    #[tokio::test]
    async fn timeout_is_a_string_error() {
        let mut registry = ToolRegistry::new().with_timeout(Duration::from_millis(50));
        registry.register(Box::new(SlowTool));
        let out = registry.execute("slow", serde_json::json!({})).await;
        assert_eq!(out, "Error: Command timed out after 0s");
    }

    #[tokio::test]
    async fn output_is_truncated_with_marker() {
        struct BigTool;

        #[async_trait]
        impl Tool for BigTool {
            fn name(&self) -> &str {
                "big"
            }
            fn description(&self) -> &str {
                "Returns a lot"
            }
            fn parameters_schema(&self) -> serde_json::Value {
                serde_json::json!({"type": "object", "properties": {}})
            }
            async fn execute(
                &self,
                _arguments: serde_json::Value,
            ) -> std::result::Result<String, ToolError> {
                Ok("x".repeat(120))
            }
        }

        let mut registry = ToolRegistry::new().with_output_cap(100);
        registry.register(Box::new(BigTool));
        let out = registry.execute("big", serde_json::json!({})).await;
        assert!(out.starts_with(&"x".repeat(100)));
        assert!(out.ends_with("... [truncated, 120 total chars]"));
    }

    #[test]
    fn descriptors_cover_registered_tools() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        let defs = registry.descriptors();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
        assert_eq!(defs[0].parameters["type"], "object");
    }
}
