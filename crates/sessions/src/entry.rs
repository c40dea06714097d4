//! Transcript entries and history replay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use switchboard_core::{ChatMessage, ContentBlock, MessageContent, Role};

/// One line of a session transcript.
///
/// The `type` tag is shared with the content-block tag set where the
/// shapes overlap (`tool_use`, `tool_result`); `session`, `user` and
/// `assistant` are transcript-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptEntry {
    /// Header, always the first line of a transcript
    Session {
        id: String,
        key: String,
        created: DateTime<Utc>,
        ts: DateTime<Utc>,
    },

    /// User input: plain text, or an array of tool_result blocks
    User {
        content: MessageContent,
        ts: DateTime<Utc>,
    },

    /// Final assistant text for a turn
    Assistant { content: String, ts: DateTime<Utc> },

    /// A tool invocation requested by the model
    ToolUse {
        name: String,
        tool_use_id: String,
        input: serde_json::Value,
        ts: DateTime<Utc>,
    },

    /// The output of one tool invocation
    ToolResult {
        tool_use_id: String,
        output: String,
        ts: DateTime<Utc>,
    },
}

/// Rebuild conversation history from transcript lines.
///
/// Scans entries in order while maintaining a pending tool_use buffer:
/// tool_use entries accumulate; any other entry first flushes the buffer
/// as a single assistant message, then applies itself. A tool_result entry
/// becomes a user message carrying one tool_result block, which is how the
/// assistant-calls/user-answers pairing the backend requires falls out of
/// the flat file. Unparseable lines are skipped.
pub fn replay_history<I, S>(lines: I) -> Vec<ChatMessage>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut history: Vec<ChatMessage> = Vec::new();
    let mut pending: Vec<ContentBlock> = Vec::new();

    for line in lines {
        let line = line.as_ref().trim();
        if line.is_empty() {
            continue;
        }

        let entry: TranscriptEntry = match serde_json::from_str(line) {
            Ok(entry) => entry,
            Err(_) => continue,
        };

        match entry {
            TranscriptEntry::Session { .. } => {}
            TranscriptEntry::ToolUse {
                name,
                tool_use_id,
                input,
                ..
            } => {
                pending.push(ContentBlock::tool_use(tool_use_id, name, input));
            }
            TranscriptEntry::User { content, .. } => {
                flush_pending(&mut history, &mut pending);
                history.push(ChatMessage {
                    role: Role::User,
                    content,
                });
            }
            TranscriptEntry::Assistant { content, .. } => {
                flush_pending(&mut history, &mut pending);
                history.push(ChatMessage::assistant(content));
            }
            TranscriptEntry::ToolResult {
                tool_use_id,
                output,
                ..
            } => {
                flush_pending(&mut history, &mut pending);
                history.push(ChatMessage::tool_results(vec![ContentBlock::tool_result(
                    tool_use_id,
                    output,
                )]));
            }
        }
    }

    flush_pending(&mut history, &mut pending);
    history
}

fn flush_pending(history: &mut Vec<ChatMessage>, pending: &mut Vec<ContentBlock>) {
    if !pending.is_empty() {
        history.push(ChatMessage::assistant_blocks(std::mem::take(pending)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_json(entry: &TranscriptEntry) -> String {
        serde_json::to_string(entry).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn plain_chat_replay() {
        let lines = vec![
            entry_json(&TranscriptEntry::Session {
                id: "abcdef123456".into(),
                key: "main:cli:user".into(),
                created: now(),
                ts: now(),
            }),
            entry_json(&TranscriptEntry::User {
                content: MessageContent::Text("hi".into()),
                ts: now(),
            }),
            entry_json(&TranscriptEntry::Assistant {
                content: "hello".into(),
                ts: now(),
            }),
        ];

        let history = replay_history(lines);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], ChatMessage::user("hi"));
        assert_eq!(history[1], ChatMessage::assistant("hello"));
    }

    #[test]
    fn tool_turn_replay_pairs_use_and_result() {
        let lines = vec![
            entry_json(&TranscriptEntry::User {
                content: MessageContent::Text("read file a.txt".into()),
                ts: now(),
            }),
            entry_json(&TranscriptEntry::ToolUse {
                name: "read_file".into(),
                tool_use_id: "t1".into(),
                input: serde_json::json!({"file_path": "a.txt"}),
                ts: now(),
            }),
            entry_json(&TranscriptEntry::ToolResult {
                tool_use_id: "t1".into(),
                output: "contents-of-a".into(),
                ts: now(),
            }),
            entry_json(&TranscriptEntry::Assistant {
                content: "here is a".into(),
                ts: now(),
            }),
        ];

        let history = replay_history(lines);
        assert_eq!(history.len(), 4);
        assert_eq!(history[0], ChatMessage::user("read file a.txt"));
        // The tool_result entry flushed the pending tool_use buffer first
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

    #[test]
    fn consecutive_tool_uses_flush_as_one_assistant_message() {
        let lines = vec![
            entry_json(&TranscriptEntry::ToolUse {
                name: "shell".into(),
                tool_use_id: "t1".into(),
                input: serde_json::json!({"command": "ls"}),
                ts: now(),
            }),
            entry_json(&TranscriptEntry::ToolUse {
                name: "shell".into(),
                tool_use_id: "t2".into(),
                input: serde_json::json!({"command": "pwd"}),
                ts: now(),
            }),
            entry_json(&TranscriptEntry::ToolResult {
                tool_use_id: "t1".into(),
                output: "a.txt".into(),
                ts: now(),
            }),
        ];

        let history = replay_history(lines);
        assert_eq!(history.len(), 2);
        match &history[0].content {
            MessageContent::Blocks(blocks) => assert_eq!(blocks.len(), 2),
            other => panic!("Expected block content, got {other:?}"),
        }
        assert_eq!(history[0].role, Role::Assistant);
        assert_eq!(history[1].role, Role::User);
    }

    #[test]
    fn trailing_pending_buffer_is_flushed() {
        let lines = vec![entry_json(&TranscriptEntry::ToolUse {
            name: "shell".into(),
            tool_use_id: "t9".into(),
            input: serde_json::json!({}),
            ts: now(),
        })];

        let history = replay_history(lines);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::Assistant);
    }

    #[test]
    fn corrupt_lines_are_skipped() {
        let lines = vec![
            "{not json at all".to_string(),
            entry_json(&TranscriptEntry::User {
                content: MessageContent::Text("still here".into()),
                ts: now(),
            }),
            r#"{"type": "mystery", "ts": "2026-01-01T00:00:00Z"}"#.to_string(),
        ];

        let history = replay_history(lines);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0], ChatMessage::user("still here"));
    }

    #[test]
    fn user_entry_with_tool_result_blocks() {
        let lines = vec![entry_json(&TranscriptEntry::User {
            content: MessageContent::Blocks(vec![ContentBlock::tool_result("t1", "ok")]),
            ts: now(),
        })];

        let history = replay_history(lines);
        assert_eq!(history.len(), 1);
        assert_eq!(
            history[0],
            ChatMessage::tool_results(vec![ContentBlock::tool_result("t1", "ok")])
        );
    }

    #[test]
    fn entry_wire_format_uses_snake_case_tags() {
        let json = entry_json(&TranscriptEntry::ToolUse {
            name: "shell".into(),
            tool_use_id: "t1".into(),
            input: serde_json::json!({}),
            ts: now(),
        });
        assert!(json.contains(r#""type":"tool_use""#));
        assert!(json.contains(r#""tool_use_id":"t1""#));
    }
}
