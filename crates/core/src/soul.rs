//! Soul — the persona descriptor for an agent.
//!
//! A soul names the agent and carries its personality, goals, rules, and
//! preferences. The agent loop compiles it into the system prompt sent to
//! the backend. Souls are persisted per agent by the soul store; this
//! module only defines the type and the prompt assembly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The persona of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Soul {
    /// The agent's name
    pub name: String,

    /// Free-form description of what the agent is for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Personality and tone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personality: Option<String>,

    /// Standing goals
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goals: Vec<String>,

    /// Hard behavioral rules
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<String>,

    /// Arbitrary key-value preferences
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub preferences: BTreeMap<String, String>,
}

impl Soul {
    /// A bare soul with only a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            personality: None,
            goals: Vec::new(),
            rules: Vec::new(),
            preferences: BTreeMap::new(),
        }
    }

    /// Compile this soul into the system prompt.
    pub fn system_prompt(&self) -> String {
        let mut prompt = format!("You are {}.", self.name);

        if let Some(desc) = &self.description {
            prompt.push_str(&format!("\n\n{}", desc.trim()));
        }

        if let Some(personality) = &self.personality {
            prompt.push_str(&format!("\n\nPersonality: {}", personality.trim()));
        }

        if !self.goals.is_empty() {
            prompt.push_str("\n\nYour goals:");
            for goal in &self.goals {
                prompt.push_str(&format!("\n- {goal}"));
            }
        }

        if !self.rules.is_empty() {
            prompt.push_str("\n\nRules you must follow:");
            for rule in &self.rules {
                prompt.push_str(&format!("\n- {rule}"));
            }
        }

        if !self.preferences.is_empty() {
            prompt.push_str("\n\nPreferences:");
            for (key, value) in &self.preferences {
                prompt.push_str(&format!("\n- {key}: {value}"));
            }
        }

        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_soul_prompt() {
        let soul = Soul::named("main");
        assert_eq!(soul.system_prompt(), "You are main.");
    }

    #[test]
    fn full_soul_prompt_sections() {
        let mut soul = Soul::named("ops");
        soul.description = Some("An operations assistant.".into());
        soul.personality = Some("Calm and precise".into());
        soul.goals = vec!["Keep the fleet healthy".into()];
        soul.rules = vec!["Never delete production data".into()];
        soul.preferences.insert("tone".into(), "brief".into());

        let prompt = soul.system_prompt();
        assert!(prompt.starts_with("You are ops."));
        assert!(prompt.contains("An operations assistant."));
        assert!(prompt.contains("Personality: Calm and precise"));
        assert!(prompt.contains("- Keep the fleet healthy"));
        assert!(prompt.contains("- Never delete production data"));
        assert!(prompt.contains("- tone: brief"));
    }
}
