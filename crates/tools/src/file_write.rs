//! File write tool — workspace-scoped, creates parent directories.

use crate::path::resolve_in_workspace;
use async_trait::async_trait;
use std::path::PathBuf;
use switchboard_core::{Tool, ToolError};
use tracing::debug;

/// Write a file inside the workspace.
pub struct FileWriteTool {
    workspace_dir: PathBuf,
}

impl FileWriteTool {
    pub fn new(workspace_dir: impl Into<PathBuf>) -> Self {
        Self {
            workspace_dir: workspace_dir.into(),
        }
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file inside the workspace directory, creating parent directories as needed."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file, relative to the workspace"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                }
            },
            "required": ["file_path", "content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let file_path = arguments["file_path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'file_path' argument".into()))?;
        let content = arguments["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;

        let resolved = resolve_in_workspace(&self.workspace_dir, file_path).map_err(|reason| {
            ToolError::PermissionDenied {
                tool_name: "write_file".into(),
                reason,
            }
        })?;

        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    tool_name: "write_file".into(),
                    reason: format!("creating {}: {e}", parent.display()),
                })?;
        }

        debug!(path = %resolved.display(), bytes = content.len(), "Writing file");
        tokio::fs::write(&resolved, content)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "write_file".into(),
                reason: format!("{}: {e}", resolved.display()),
            })?;

        Ok(format!("Wrote {} bytes to {file_path}", content.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_and_creates_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let tool = FileWriteTool::new(tmp.path());

        let out = tool
            .execute(serde_json::json!({"file_path": "notes/today.md", "content": "remember"}))
            .await
            .unwrap();
        assert!(out.contains("8 bytes"));
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("notes/today.md")).unwrap(),
            "remember"
        );
    }

    #[tokio::test]
    async fn refuses_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        let tool = FileWriteTool::new(tmp.path());
        let result = tool
            .execute(serde_json::json!({"file_path": "../evil.txt", "content": "x"}))
            .await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
    }
}
