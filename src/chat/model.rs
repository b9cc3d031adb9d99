//! View model accumulated over one chat thread.
//!
//! The message list is owned by the `ChatController`; every mutation after
//! creation goes through the reducer fold, which keeps a single writer over
//! the whole structure.

use crate::stream::event::Todo;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// Which display layer the UI shows for an assistant message.
///
/// A lattice, not a free-form enum: scenarios only ever move up
/// (`Quick < Agent < Planning`). Mid-stream flicker between layers is worse
/// than over-committing to the richer one, so once promoted a message never
/// falls back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum DisplayScenario {
    #[default]
    Quick,
    Agent,
    Planning,
}

impl DisplayScenario {
    /// Monotone promotion: the maximum of current and candidate.
    pub fn promote(self, candidate: DisplayScenario) -> DisplayScenario {
        self.max(candidate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallStatus {
    Running,
    Done,
    Error,
}

/// One tool invocation. `name`/`args` are fixed at creation; `status` makes a
/// single one-way transition out of `Running`, at which point `output` is set.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
    pub status: ToolCallStatus,
    pub output: Option<String>,
}

impl ToolCall {
    pub fn running(id: String, name: String, args: Value) -> Self {
        Self {
            id,
            name,
            args,
            status: ToolCallStatus::Running,
            output: None,
        }
    }
}

/// Reasoning-visibility lifecycle for one assistant message.
#[derive(Debug, Clone)]
pub struct ThinkingState {
    pub steps: Vec<String>,
    pub is_thinking: bool,
    pub started_at: Instant,
    /// Frozen on the first `finish()`; never recomputed.
    pub duration_secs: Option<u64>,
}

impl ThinkingState {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            is_thinking: true,
            started_at: Instant::now(),
            duration_secs: None,
        }
    }

    /// Mark reasoning as concluded. Idempotent; only the first call
    /// computes the duration.
    pub fn finish(&mut self) {
        if self.is_thinking {
            self.is_thinking = false;
            self.duration_secs = Some(self.started_at.elapsed().as_secs_f64().round() as u64);
        }
    }
}

impl Default for ThinkingState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Running,
    Success,
    Error,
}

/// A sub-agent execution unit with its own nested tool-call sequence.
#[derive(Debug, Clone)]
pub struct SpawnedTask {
    pub task_id: String,
    pub subagent_type: String,
    pub description: String,
    pub status: TaskStatus,
    pub duration_ms: Option<u64>,
    pub tool_calls: Vec<ToolCall>,
}

impl SpawnedTask {
    pub fn running(task_id: String, subagent_type: String, description: String) -> Self {
        Self {
            task_id,
            subagent_type,
            description,
            status: TaskStatus::Running,
            duration_ms: None,
            tool_calls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileSource {
    User,
    Agent,
}

/// A file attached to a message, user-uploaded or agent-produced.
/// Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAttachment {
    pub file_id: String,
    pub filename: String,
    pub size: u64,
    pub content_type: String,
    pub source: FileSource,
    pub download_url: String,
}

/// One turn's worth of content.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub role: Role,
    /// Append-only text buffer, never truncated while the message lives.
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub thinking: Option<ThinkingState>,
    /// Replaced wholesale on each update, never merged.
    pub todos: Vec<Todo>,
    pub spawned_tasks: Vec<SpawnedTask>,
    pub display_scenario: DisplayScenario,
    pub files: Vec<FileAttachment>,
}

impl Message {
    pub fn user(id: String, content: &str, files: Vec<FileAttachment>) -> Self {
        Self {
            id,
            role: Role::User,
            content: content.to_string(),
            tool_calls: Vec::new(),
            thinking: None,
            todos: Vec::new(),
            spawned_tasks: Vec::new(),
            display_scenario: DisplayScenario::Quick,
            files,
        }
    }

    /// The placeholder an in-flight turn streams into. Starts in the `Agent`
    /// scenario with a live ThinkingState: most non-trivial turns begin by
    /// reasoning, and promotion is one-way so the optimistic default sticks.
    pub fn assistant_placeholder(id: String) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: String::new(),
            tool_calls: Vec::new(),
            thinking: Some(ThinkingState::new()),
            todos: Vec::new(),
            spawned_tasks: Vec::new(),
            display_scenario: DisplayScenario::Agent,
            files: Vec::new(),
        }
    }

    /// A message rebuilt from persisted history: role and text only, no
    /// tool-call or thinking detail survives persistence.
    pub fn from_history(id: String, role: Role, content: String) -> Self {
        Self {
            id,
            role,
            content,
            tool_calls: Vec::new(),
            thinking: None,
            todos: Vec::new(),
            spawned_tasks: Vec::new(),
            display_scenario: DisplayScenario::Quick,
            files: Vec::new(),
        }
    }

    pub fn spawned_task_mut(&mut self, task_id: &str) -> Option<&mut SpawnedTask> {
        self.spawned_tasks.iter_mut().find(|t| t.task_id == task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_lattice_order() {
        use DisplayScenario::*;
        assert!(Quick < Agent);
        assert!(Agent < Planning);
    }

    #[test]
    fn test_promote_is_max() {
        use DisplayScenario::*;
        assert_eq!(Quick.promote(Agent), Agent);
        assert_eq!(Agent.promote(Quick), Agent);
        assert_eq!(Planning.promote(Agent), Planning);
        assert_eq!(Agent.promote(Planning), Planning);
        assert_eq!(Planning.promote(Quick), Planning);
    }

    #[test]
    fn test_thinking_finish_idempotent() {
        let mut thinking = ThinkingState::new();
        assert!(thinking.is_thinking);
        thinking.finish();
        assert!(!thinking.is_thinking);
        let first = thinking.duration_secs;
        assert!(first.is_some());
        thinking.finish();
        assert_eq!(thinking.duration_secs, first);
    }

    #[test]
    fn test_placeholder_starts_agent_and_thinking() {
        let msg = Message::assistant_placeholder("m1".into());
        assert_eq!(msg.display_scenario, DisplayScenario::Agent);
        assert!(msg.thinking.as_ref().unwrap().is_thinking);
        assert!(msg.content.is_empty());
    }
}
