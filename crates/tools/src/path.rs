//! Path validation — file tools are sandboxed to the workspace.
//!
//! Rejects traversal sequences up front, then resolves the path against
//! the workspace root and checks the result still lives inside it.

use std::path::{Path, PathBuf};

/// Resolve `input` against the workspace, refusing anything that would
/// escape it. Returns the resolved path on success, an explanation on
/// refusal.
pub fn resolve_in_workspace(workspace_dir: &Path, input: &str) -> Result<PathBuf, String> {
    // Obvious traversal attempts are refused before any resolution
    let normalized = input.replace('\\', "/");
    if normalized.contains("../") || normalized.ends_with("/..") || normalized == ".." {
        return Err(format!("Path traversal detected in '{input}'"));
    }

    let candidate = {
        let p = Path::new(input);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            workspace_dir.join(p)
        }
    };

    // Canonicalize what exists: the file itself, or its parent for
    // not-yet-created targets
    let resolved = if candidate.exists() {
        candidate
            .canonicalize()
            .map_err(|e| format!("Cannot resolve path '{input}': {e}"))?
    } else if let Some(parent) = candidate.parent() {
        if parent.exists() {
            let parent = parent
                .canonicalize()
                .map_err(|e| format!("Cannot resolve path '{input}': {e}"))?;
            parent.join(candidate.file_name().unwrap_or_default())
        } else {
            candidate.clone()
        }
    } else {
        candidate.clone()
    };

    let workspace = workspace_dir
        .canonicalize()
        .unwrap_or_else(|_| workspace_dir.to_path_buf());

    if !resolved.starts_with(&workspace) {
        return Err(format!(
            "Path '{input}' is outside the workspace directory"
        ));
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_resolve_into_workspace() {
        let tmp = tempfile::tempdir().unwrap();
        let resolved = resolve_in_workspace(tmp.path(), "notes/a.txt").unwrap();
        assert!(resolved.starts_with(tmp.path().canonicalize().unwrap()));
    }

    #[test]
    fn traversal_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(resolve_in_workspace(tmp.path(), "../etc/passwd").is_err());
        assert!(resolve_in_workspace(tmp.path(), "a/../../b").is_err());
        assert!(resolve_in_workspace(tmp.path(), "..").is_err());
    }

    #[test]
    fn absolute_path_outside_workspace_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let err = resolve_in_workspace(tmp.path(), "/etc/passwd").unwrap_err();
        assert!(err.contains("outside the workspace"));
    }

    #[test]
    fn absolute_path_inside_workspace_is_allowed() {
        let tmp = tempfile::tempdir().unwrap();
        let inside = tmp.path().join("file.txt");
        std::fs::write(&inside, "x").unwrap();
        let resolved =
            resolve_in_workspace(tmp.path(), &inside.to_string_lossy()).unwrap();
        assert!(resolved.ends_with("file.txt"));
    }
}
