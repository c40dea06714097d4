//! Configuration loading and management for switchboard.
//!
//! Loads `switchboard.toml` from the current directory (or the path in
//! `SWITCHBOARD_CONFIG`) with environment variable overrides. Every field
//! has a default, so a missing file is fine for local use.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// The root configuration structure.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Backend API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Chat-completion endpoint base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Root of all persistent state
    #[serde(default = "default_workspace")]
    pub workspace_dir: PathBuf,

    /// Agent that handles unrouted traffic
    #[serde(default = "default_agent")]
    pub default_agent: String,

    /// Gateway server settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Tool settings
    #[serde(default)]
    pub tools: ToolsConfig,
}

fn default_base_url() -> String {
    "https://api.deepseek.com/v1".into()
}
fn default_model() -> String {
    "deepseek-chat".into()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_workspace() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("workspace")
}
fn default_agent() -> String {
    "main".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    9090
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Shell command allowlist; empty allows everything
    #[serde(default)]
    pub allowed_commands: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            workspace_dir: default_workspace(),
            default_agent: default_agent(),
            gateway: GatewayConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field(
                "api_key",
                &self.api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("workspace_dir", &self.workspace_dir)
            .field("default_agent", &self.default_agent)
            .field("gateway", &self.gateway)
            .field("tools", &self.tools)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration: file (if present), then env overrides.
    pub fn load() -> Result<Self, String> {
        let path = std::env::var("SWITCHBOARD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("switchboard.toml"));
        Self::load_from(&path)
    }

    /// Load from an explicit path, then apply env overrides.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
            toml::from_str(&content)
                .map_err(|e| format!("Failed to parse {}: {e}", path.display()))?
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };

        if let Ok(key) = std::env::var("SWITCHBOARD_API_KEY") {
            config.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("SWITCHBOARD_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(model) = std::env::var("SWITCHBOARD_MODEL") {
            config.model = model;
        }
        if let Ok(workspace) = std::env::var("SWITCHBOARD_WORKSPACE") {
            config.workspace_dir = PathBuf::from(workspace);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.base_url, "https://api.deepseek.com/v1");
        assert_eq!(config.model, "deepseek-chat");
        assert_eq!(config.default_agent, "main");
        assert!(config.workspace_dir.ends_with("workspace"));
        assert_eq!(config.gateway.port, 9090);
    }

    #[test]
    fn file_values_override_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("switchboard.toml");
        std::fs::write(
            &path,
            r#"
model = "deepseek-reasoner"
default_agent = "ops"

[gateway]
port = 8123
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.model, "deepseek-reasoner");
        assert_eq!(config.default_agent, "ops");
        assert_eq!(config.gateway.port, 8123);
        // Untouched fields keep defaults
        assert_eq!(config.base_url, "https://api.deepseek.com/v1");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/switchboard.toml")).unwrap();
        assert_eq!(config.model, "deepseek-chat");
    }

    #[test]
    fn debug_redacts_the_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("REDACTED"));
    }
}
