//! Built-in tools: shell execution and workspace-scoped file I/O.
//!
//! All tools refuse unsafe input (path traversal, disallowed commands)
//! with explanatory errors that the registry converts to string results —
//! the model always gets something it can read.

pub mod file_read;
pub mod file_write;
pub mod path;
pub mod shell;

pub use file_read::FileReadTool;
pub use file_write::FileWriteTool;
pub use shell::ShellTool;

use std::path::Path;
use switchboard_core::ToolRegistry;

/// Build the default tool registry for a workspace.
pub fn default_registry(workspace_dir: &Path, allowed_commands: Vec<String>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(ShellTool::new(allowed_commands)));
    registry.register(Box::new(FileReadTool::new(workspace_dir)));
    registry.register(Box::new(FileWriteTool::new(workspace_dir)));
    registry
}
