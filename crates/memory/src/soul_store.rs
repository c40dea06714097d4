//! Soul persistence — one human-editable file per agent.
//!
//! Files live at `<workspace>/.souls/<agent_id>.soul`: a key-value
//! front-matter block delimited by lines containing exactly `---`,
//! followed by the free-form description. A key with an empty value opens
//! a list; subsequent `- item` lines belong to it. The parse is lossy by
//! design (unknown keys and malformed lines are dropped); saving rewrites
//! the file in canonical form.

use std::path::{Path, PathBuf};
use switchboard_core::{Soul, StoreError};
use tracing::debug;

/// The soul file store.
pub struct SoulStore {
    dir: PathBuf,
}

impl SoulStore {
    /// Open (or initialize) the store under `<workspace>/.souls/`.
    pub fn open(workspace_dir: &Path) -> Result<Self, StoreError> {
        let dir = workspace_dir.join(".souls");
        std::fs::create_dir_all(&dir)
            .map_err(|e| StoreError::Io(format!("Failed to create souls dir: {e}")))?;
        Ok(Self { dir })
    }

    fn path_for(&self, agent_id: &str) -> PathBuf {
        self.dir.join(format!("{agent_id}.soul"))
    }

    /// Whether a soul file exists for the agent.
    pub fn exists(&self, agent_id: &str) -> bool {
        self.path_for(agent_id).exists()
    }

    /// Load an agent's soul; a missing file yields a bare soul named
    /// after the agent.
    pub fn load(&self, agent_id: &str) -> Soul {
        match std::fs::read_to_string(self.path_for(agent_id)) {
            Ok(content) => parse_soul(&content, agent_id),
            Err(_) => Soul::named(agent_id),
        }
    }

    /// Save an agent's soul in canonical form.
    pub fn save(&self, agent_id: &str, soul: &Soul) -> Result<(), StoreError> {
        let content = render_soul(soul);
        std::fs::write(self.path_for(agent_id), content)
            .map_err(|e| StoreError::Io(format!("Failed to write soul: {e}")))?;
        debug!(agent_id, "Soul saved");
        Ok(())
    }
}

/// Which list a blank-valued key opened.
#[derive(PartialEq)]
enum ListTarget {
    Goals,
    Rules,
    Preferences,
}

/// Lossy line-based front-matter parse.
fn parse_soul(content: &str, fallback_name: &str) -> Soul {
    let mut soul = Soul::named(fallback_name);

    let mut lines = content.lines();
    // Everything before the first `---` is ignored
    let mut in_front_matter = false;
    let mut body: Vec<&str> = Vec::new();
    let mut list: Option<ListTarget> = None;
    let mut seen_front_matter = false;

    for line in lines.by_ref() {
        if line.trim() == "---" {
            if in_front_matter {
                seen_front_matter = true;
                break;
            }
            in_front_matter = true;
            continue;
        }
        if !in_front_matter {
            continue;
        }

        let trimmed = line.trim();
        if let Some(item) = trimmed.strip_prefix("- ") {
            match list {
                Some(ListTarget::Goals) => soul.goals.push(item.trim().to_string()),
                Some(ListTarget::Rules) => soul.rules.push(item.trim().to_string()),
                Some(ListTarget::Preferences) => {
                    if let Some((key, value)) = item.split_once(':') {
                        soul.preferences
                            .insert(key.trim().to_string(), value.trim().to_string());
                    }
                }
                None => {}
            }
            continue;
        }

        let Some((key, value)) = trimmed.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        list = None;

        if value.is_empty() {
            // A blank value opens a list
            list = match key {
                "goals" => Some(ListTarget::Goals),
                "rules" => Some(ListTarget::Rules),
                "preferences" => Some(ListTarget::Preferences),
                _ => None,
            };
        } else {
            match key {
                "name" => soul.name = value.to_string(),
                "personality" => soul.personality = Some(value.to_string()),
                _ => {}
            }
        }
    }

    if seen_front_matter {
        body.extend(lines);
    }
    let description = body.join("\n").trim().to_string();
    if !description.is_empty() {
        soul.description = Some(description);
    }

    soul
}

/// Canonical soul file rendering.
fn render_soul(soul: &Soul) -> String {
    let mut out = String::from("---\n");
    out.push_str(&format!("name: {}\n", soul.name));
    if let Some(personality) = &soul.personality {
        out.push_str(&format!("personality: {personality}\n"));
    }
    if !soul.goals.is_empty() {
        out.push_str("goals:\n");
        for goal in &soul.goals {
            out.push_str(&format!("- {goal}\n"));
        }
    }
    if !soul.rules.is_empty() {
        out.push_str("rules:\n");
        for rule in &soul.rules {
            out.push_str(&format!("- {rule}\n"));
        }
    }
    if !soul.preferences.is_empty() {
        out.push_str("preferences:\n");
        for (key, value) in &soul.preferences {
            out.push_str(&format!("- {key}: {value}\n"));
        }
    }
    out.push_str("---\n");
    if let Some(description) = &soul.description {
        out.push_str(description.trim());
        out.push('\n');
    }
    out
}
