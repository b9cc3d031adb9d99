//! The closed set of events the chat backend may emit over SSE.
//!
//! Decoding is total: an unknown event name, or a payload missing required
//! fields, yields `None` and the frame is ignored. New server-side event
//! kinds must never break an older client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome reported by the server for tool calls and spawned tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireOutcome {
    Success,
    Error,
}

/// Reasoning phase attached to a `thinking` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkingKind {
    Planning,
    Replanning,
    Routing,
}

impl ThinkingKind {
    fn from_wire(s: &str) -> Option<Self> {
        match s {
            "planning" => Some(Self::Planning),
            "replanning" => Some(Self::Replanning),
            "routing" => Some(Self::Routing),
            _ => None,
        }
    }

    /// True for the phases that force the planning display scenario.
    pub fn is_planning(self) -> bool {
        matches!(self, Self::Planning | Self::Replanning)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

/// One todo item. The server always sends the full list, never a delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub content: String,
    pub status: TodoStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    TextDelta {
        text: String,
    },
    ToolCallStart {
        id: String,
        task_id: Option<String>,
        name: String,
        args: Value,
    },
    ToolCallResult {
        id: String,
        task_id: Option<String>,
        status: WireOutcome,
        output: String,
    },
    Thinking {
        kind: Option<ThinkingKind>,
        content: String,
    },
    TodosUpdated {
        todos: Vec<Todo>,
        timestamp: String,
    },
    TaskSpawned {
        task_id: String,
        subagent_type: String,
        description: String,
    },
    TaskCompleted {
        task_id: String,
        duration_ms: u64,
        status: WireOutcome,
    },
    Error {
        message: String,
    },
    Done,
}

// Per-kind payload shapes. Unknown extra fields are ignored by serde, which
// is exactly the forward-compatibility the wire contract promises.

#[derive(Deserialize)]
struct TextDeltaPayload {
    text: String,
}

#[derive(Deserialize)]
struct ToolCallStartPayload {
    id: String,
    task_id: Option<String>,
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Deserialize)]
struct ToolCallResultPayload {
    id: String,
    task_id: Option<String>,
    status: WireOutcome,
    #[serde(default)]
    output: String,
}

#[derive(Deserialize)]
struct ThinkingPayload {
    #[serde(rename = "type")]
    kind: Option<String>,
    content: String,
}

#[derive(Deserialize)]
struct TodosUpdatedPayload {
    todos: Vec<Todo>,
    #[serde(default)]
    timestamp: String,
}

#[derive(Deserialize)]
struct TaskSpawnedPayload {
    task_id: String,
    subagent_type: String,
    description: String,
}

#[derive(Deserialize)]
struct TaskCompletedPayload {
    task_id: String,
    duration_ms: u64,
    status: WireOutcome,
}

#[derive(Deserialize)]
struct ErrorPayload {
    message: String,
}

impl ChatEvent {
    /// Decode a named frame payload into a typed event.
    ///
    /// `None` means "not ours": an unknown event kind, or a payload that does
    /// not match the contract. Callers drop such frames without error.
    pub fn decode(event: &str, data: Value) -> Option<ChatEvent> {
        match event {
            "text_delta" => serde_json::from_value::<TextDeltaPayload>(data)
                .ok()
                .map(|p| ChatEvent::TextDelta { text: p.text }),
            "tool_call_start" => serde_json::from_value::<ToolCallStartPayload>(data)
                .ok()
                .map(|p| ChatEvent::ToolCallStart {
                    id: p.id,
                    task_id: p.task_id,
                    name: p.name,
                    args: p.args,
                }),
            "tool_call_result" => serde_json::from_value::<ToolCallResultPayload>(data)
                .ok()
                .map(|p| ChatEvent::ToolCallResult {
                    id: p.id,
                    task_id: p.task_id,
                    status: p.status,
                    output: p.output,
                }),
            "thinking" => serde_json::from_value::<ThinkingPayload>(data)
                .ok()
                .map(|p| ChatEvent::Thinking {
                    // Unknown phase strings degrade to "plain thinking", they
                    // must not drop the step content.
                    kind: p.kind.as_deref().and_then(ThinkingKind::from_wire),
                    content: p.content,
                }),
            "todos_updated" => serde_json::from_value::<TodosUpdatedPayload>(data)
                .ok()
                .map(|p| ChatEvent::TodosUpdated {
                    todos: p.todos,
                    timestamp: p.timestamp,
                }),
            "task_spawned" => serde_json::from_value::<TaskSpawnedPayload>(data)
                .ok()
                .map(|p| ChatEvent::TaskSpawned {
                    task_id: p.task_id,
                    subagent_type: p.subagent_type,
                    description: p.description,
                }),
            "task_completed" => serde_json::from_value::<TaskCompletedPayload>(data)
                .ok()
                .map(|p| ChatEvent::TaskCompleted {
                    task_id: p.task_id,
                    duration_ms: p.duration_ms,
                    status: p.status,
                }),
            "error" => serde_json::from_value::<ErrorPayload>(data)
                .ok()
                .map(|p| ChatEvent::Error { message: p.message }),
            "done" => Some(ChatEvent::Done),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_text_delta() {
        let ev = ChatEvent::decode("text_delta", json!({"text": "hi"})).unwrap();
        assert_eq!(ev, ChatEvent::TextDelta { text: "hi".into() });
    }

    #[test]
    fn test_decode_tool_call_pair() {
        let start = ChatEvent::decode(
            "tool_call_start",
            json!({"id": "c1", "name": "query", "args": {"sql": "select 1"}}),
        )
        .unwrap();
        match start {
            ChatEvent::ToolCallStart { id, task_id, name, .. } => {
                assert_eq!(id, "c1");
                assert_eq!(task_id, None);
                assert_eq!(name, "query");
            }
            other => panic!("unexpected: {other:?}"),
        }

        let result = ChatEvent::decode(
            "tool_call_result",
            json!({"id": "c1", "task_id": "t1", "name": "query", "status": "success", "output": "42"}),
        )
        .unwrap();
        assert_eq!(
            result,
            ChatEvent::ToolCallResult {
                id: "c1".into(),
                task_id: Some("t1".into()),
                status: WireOutcome::Success,
                output: "42".into(),
            }
        );
    }

    #[test]
    fn test_decode_thinking_kinds() {
        let planning =
            ChatEvent::decode("thinking", json!({"type": "planning", "content": "s"})).unwrap();
        assert!(matches!(
            planning,
            ChatEvent::Thinking { kind: Some(ThinkingKind::Planning), .. }
        ));

        let untyped = ChatEvent::decode("thinking", json!({"content": "s"})).unwrap();
        assert!(matches!(untyped, ChatEvent::Thinking { kind: None, .. }));

        // Future phase names must not drop the step.
        let future =
            ChatEvent::decode("thinking", json!({"type": "reflecting", "content": "s"})).unwrap();
        assert!(matches!(future, ChatEvent::Thinking { kind: None, .. }));
    }

    #[test]
    fn test_decode_todos() {
        let ev = ChatEvent::decode(
            "todos_updated",
            json!({
                "todos": [
                    {"content": "A", "status": "pending"},
                    {"content": "B", "status": "in_progress"}
                ],
                "timestamp": "2025-02-13T10:00:00Z"
            }),
        )
        .unwrap();
        match ev {
            ChatEvent::TodosUpdated { todos, .. } => {
                assert_eq!(todos.len(), 2);
                assert_eq!(todos[1].status, TodoStatus::InProgress);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_decode_task_lifecycle() {
        let spawned = ChatEvent::decode(
            "task_spawned",
            json!({"task_id": "t1", "subagent_type": "sql", "description": "query db"}),
        )
        .unwrap();
        assert!(matches!(spawned, ChatEvent::TaskSpawned { .. }));

        let completed = ChatEvent::decode(
            "task_completed",
            json!({"task_id": "t1", "duration_ms": 500, "status": "error"}),
        )
        .unwrap();
        assert_eq!(
            completed,
            ChatEvent::TaskCompleted {
                task_id: "t1".into(),
                duration_ms: 500,
                status: WireOutcome::Error,
            }
        );
    }

    #[test]
    fn test_unknown_kind_ignored() {
        assert!(ChatEvent::decode("shiny_new_event", json!({"x": 1})).is_none());
    }

    #[test]
    fn test_missing_required_field_ignored() {
        assert!(ChatEvent::decode("text_delta", json!({})).is_none());
        assert!(ChatEvent::decode("tool_call_start", json!({"id": "c1"})).is_none());
        assert!(ChatEvent::decode("task_completed", json!({"task_id": "t1"})).is_none());
    }

    #[test]
    fn test_extra_fields_tolerated() {
        let ev = ChatEvent::decode(
            "text_delta",
            json!({"text": "hi", "added_in_v2": true}),
        );
        assert!(ev.is_some());
    }
}
