//! File read tool — workspace-scoped.

use crate::path::resolve_in_workspace;
use async_trait::async_trait;
use std::path::PathBuf;
use switchboard_core::{Tool, ToolError};
use tracing::debug;

/// Read a file from the workspace.
pub struct FileReadTool {
    workspace_dir: PathBuf,
}

impl FileReadTool {
    pub fn new(workspace_dir: impl Into<PathBuf>) -> Self {
        Self {
            workspace_dir: workspace_dir.into(),
        }
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file inside the workspace directory."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file, relative to the workspace"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<String, ToolError> {
        let file_path = arguments["file_path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'file_path' argument".into()))?;

        let resolved = resolve_in_workspace(&self.workspace_dir, file_path).map_err(|reason| {
            ToolError::PermissionDenied {
                tool_name: "read_file".into(),
                reason,
            }
        })?;

        debug!(path = %resolved.display(), "Reading file");
        tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "read_file".into(),
                reason: format!("{}: {e}", resolved.display()),
            })
    }
}
