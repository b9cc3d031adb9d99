//! The streaming reducer: folds decoded SSE events into the assistant
//! message of the in-flight turn.
//!
//! Every fold is a pure in-place state transition with no suspension and no
//! failure path. Lookups that miss (a result for an unstarted tool call, a
//! completion for an unknown task) are no-ops: the stream must survive
//! server-side event loss and reordering without ever poisoning the view
//! model.

use super::model::{
    DisplayScenario, Message, SpawnedTask, TaskStatus, ThinkingState, ToolCall, ToolCallStatus,
};
use crate::stream::event::{ChatEvent, WireOutcome};

/// Inline marker appended to message content for transport and server errors.
pub fn error_marker(message: &str) -> String {
    format!("\n\n**Error:** {message}")
}

fn owning_task_index(msg: &Message, task_id: Option<&str>) -> Option<usize> {
    let tid = task_id?;
    msg.spawned_tasks.iter().position(|t| t.task_id == tid)
}

/// Fold one event into the message. Infallible by construction.
pub fn fold_event(msg: &mut Message, event: ChatEvent) {
    match event {
        ChatEvent::TextDelta { text } => {
            msg.content.push_str(&text);
            // First answer text is the signal that reasoning has concluded.
            if let Some(thinking) = &mut msg.thinking {
                thinking.finish();
            }
        }

        ChatEvent::ToolCallStart { id, task_id, name, args } => {
            let call = ToolCall::running(id, name, args);
            match owning_task_index(msg, task_id.as_deref()) {
                Some(i) => msg.spawned_tasks[i].tool_calls.push(call),
                None => msg.tool_calls.push(call),
            }
        }

        ChatEvent::ToolCallResult { id, task_id, status, output } => {
            // Unknown task_id falls back to the top-level list, mirroring
            // where the matching start would have landed.
            let calls = match owning_task_index(msg, task_id.as_deref()) {
                Some(i) => &mut msg.spawned_tasks[i].tool_calls,
                None => &mut msg.tool_calls,
            };
            if let Some(call) = calls.iter_mut().find(|c| c.id == id) {
                if call.status == ToolCallStatus::Running {
                    call.status = match status {
                        WireOutcome::Success => ToolCallStatus::Done,
                        WireOutcome::Error => ToolCallStatus::Error,
                    };
                    call.output = Some(output);
                }
            }
        }

        ChatEvent::Thinking { kind, content } => {
            msg.thinking
                .get_or_insert_with(ThinkingState::new)
                .steps
                .push(content);
            let candidate = if kind.map(|k| k.is_planning()).unwrap_or(false) {
                DisplayScenario::Planning
            } else {
                DisplayScenario::Agent
            };
            msg.display_scenario = msg.display_scenario.promote(candidate);
        }

        ChatEvent::TodosUpdated { todos, .. } => {
            msg.todos = todos;
            // A todo list arriving is itself evidence of planning mode.
            msg.display_scenario = msg.display_scenario.promote(DisplayScenario::Planning);
        }

        ChatEvent::TaskSpawned { task_id, subagent_type, description } => {
            msg.spawned_tasks
                .push(SpawnedTask::running(task_id, subagent_type, description));
            // Agent, not Planning: a spawned task alone does not prove the
            // agent is in planning mode.
            msg.display_scenario = msg.display_scenario.promote(DisplayScenario::Agent);
        }

        ChatEvent::TaskCompleted { task_id, duration_ms, status } => {
            if let Some(task) = msg.spawned_task_mut(&task_id) {
                if task.status == TaskStatus::Running {
                    task.status = match status {
                        WireOutcome::Success => TaskStatus::Success,
                        WireOutcome::Error => TaskStatus::Error,
                    };
                    task.duration_ms = Some(duration_ms);
                }
            }
        }

        ChatEvent::Error { message } => {
            msg.content.push_str(&error_marker(&message));
        }

        ChatEvent::Done => {
            // Covers turns that end without any answer text (pure tool-call
            // turns): the thinking clock still has to stop.
            if let Some(thinking) = &mut msg.thinking {
                thinking.finish();
            }
        }
    }
}

/// Per-turn fold driver. Tracks the `done` terminal so that anything the
/// server emits afterwards is dropped.
#[derive(Debug, Default)]
pub struct TurnReducer {
    finished: bool,
}

impl TurnReducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn apply(&mut self, msg: &mut Message, event: ChatEvent) {
        if self.finished {
            return;
        }
        if matches!(event, ChatEvent::Done) {
            self.finished = true;
        }
        fold_event(msg, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::event::{ThinkingKind, Todo, TodoStatus};
    use serde_json::json;

    fn assistant() -> Message {
        Message::assistant_placeholder("m1".into())
    }

    fn text(s: &str) -> ChatEvent {
        ChatEvent::TextDelta { text: s.into() }
    }

    #[test]
    fn test_plain_text_turn() {
        // text_delta("Hello"), text_delta(" world"), done
        let mut msg = assistant();
        fold_event(&mut msg, text("Hello"));
        fold_event(&mut msg, text(" world"));
        fold_event(&mut msg, ChatEvent::Done);

        assert_eq!(msg.content, "Hello world");
        assert!(!msg.thinking.as_ref().unwrap().is_thinking);
    }

    #[test]
    fn test_full_planning_turn() {
        let mut msg = assistant();
        fold_event(
            &mut msg,
            ChatEvent::Thinking {
                kind: Some(ThinkingKind::Planning),
                content: "step1".into(),
            },
        );
        fold_event(
            &mut msg,
            ChatEvent::TodosUpdated {
                todos: vec![Todo { content: "A".into(), status: TodoStatus::Pending }],
                timestamp: "2025-02-13T10:00:00Z".into(),
            },
        );
        fold_event(
            &mut msg,
            ChatEvent::TaskSpawned {
                task_id: "t1".into(),
                subagent_type: "sql".into(),
                description: "query db".into(),
            },
        );
        fold_event(
            &mut msg,
            ChatEvent::ToolCallStart {
                id: "c1".into(),
                task_id: Some("t1".into()),
                name: "query".into(),
                args: json!({}),
            },
        );
        fold_event(
            &mut msg,
            ChatEvent::ToolCallResult {
                id: "c1".into(),
                task_id: Some("t1".into()),
                status: WireOutcome::Success,
                output: "42".into(),
            },
        );
        fold_event(
            &mut msg,
            ChatEvent::TaskCompleted {
                task_id: "t1".into(),
                duration_ms: 500,
                status: WireOutcome::Success,
            },
        );
        fold_event(&mut msg, text("Answer: 42"));
        fold_event(&mut msg, ChatEvent::Done);

        assert_eq!(msg.display_scenario, DisplayScenario::Planning);
        assert_eq!(msg.spawned_tasks.len(), 1);
        let task = &msg.spawned_tasks[0];
        assert_eq!(task.status, TaskStatus::Success);
        assert_eq!(task.duration_ms, Some(500));
        assert_eq!(task.tool_calls.len(), 1);
        assert_eq!(task.tool_calls[0].status, ToolCallStatus::Done);
        assert_eq!(task.tool_calls[0].output.as_deref(), Some("42"));
        // The nested call never leaked into the top-level list.
        assert!(msg.tool_calls.is_empty());
        assert_eq!(msg.content, "Answer: 42");
    }

    #[test]
    fn test_result_for_unknown_id_is_noop() {
        let mut msg = assistant();
        fold_event(
            &mut msg,
            ChatEvent::ToolCallResult {
                id: "unknown".into(),
                task_id: None,
                status: WireOutcome::Success,
                output: "x".into(),
            },
        );
        assert!(msg.tool_calls.is_empty());
        assert!(msg.content.is_empty());
    }

    #[test]
    fn test_completed_for_unknown_task_is_noop() {
        let mut msg = assistant();
        fold_event(
            &mut msg,
            ChatEvent::TaskCompleted {
                task_id: "ghost".into(),
                duration_ms: 1,
                status: WireOutcome::Error,
            },
        );
        assert!(msg.spawned_tasks.is_empty());
    }

    #[test]
    fn test_error_then_done() {
        let mut msg = assistant();
        fold_event(&mut msg, ChatEvent::Error { message: "boom".into() });
        fold_event(&mut msg, ChatEvent::Done);

        assert!(msg.content.ends_with("**Error:** boom"));
        assert!(!msg.thinking.as_ref().unwrap().is_thinking);
    }

    #[test]
    fn test_content_is_ordered_concatenation() {
        let mut msg = assistant();
        fold_event(&mut msg, text("a"));
        fold_event(&mut msg, ChatEvent::Error { message: "mid".into() });
        fold_event(&mut msg, text("b"));
        assert_eq!(msg.content, format!("a{}b", error_marker("mid")));
    }

    #[test]
    fn test_thinking_finalized_exactly_once() {
        let mut msg = assistant();
        fold_event(&mut msg, text("first"));
        let frozen = msg.thinking.as_ref().unwrap().duration_secs;
        assert!(frozen.is_some());
        fold_event(&mut msg, text("second"));
        fold_event(&mut msg, ChatEvent::Done);
        assert_eq!(msg.thinking.as_ref().unwrap().duration_secs, frozen);
    }

    #[test]
    fn test_thinking_created_on_demand() {
        // History-style message without a ThinkingState gets one lazily.
        let mut msg = Message::from_history("m1".into(), crate::chat::model::Role::Assistant, String::new());
        fold_event(
            &mut msg,
            ChatEvent::Thinking { kind: None, content: "hm".into() },
        );
        let thinking = msg.thinking.as_ref().unwrap();
        assert_eq!(thinking.steps, vec!["hm".to_string()]);
        assert!(thinking.is_thinking);
    }

    #[test]
    fn test_scenario_never_demotes() {
        let mut msg = assistant();
        fold_event(
            &mut msg,
            ChatEvent::TodosUpdated { todos: vec![], timestamp: String::new() },
        );
        assert_eq!(msg.display_scenario, DisplayScenario::Planning);

        // Agent-level signals after planning leave it alone.
        fold_event(
            &mut msg,
            ChatEvent::TaskSpawned {
                task_id: "t1".into(),
                subagent_type: "research".into(),
                description: "d".into(),
            },
        );
        fold_event(
            &mut msg,
            ChatEvent::Thinking { kind: Some(ThinkingKind::Routing), content: "r".into() },
        );
        assert_eq!(msg.display_scenario, DisplayScenario::Planning);
    }

    #[test]
    fn test_task_spawned_after_routing_stays_agent() {
        // The deliberate asymmetry: routing-type thinking plus a spawned task
        // promotes to agent, not planning.
        let mut msg = assistant();
        fold_event(
            &mut msg,
            ChatEvent::Thinking { kind: Some(ThinkingKind::Routing), content: "r".into() },
        );
        fold_event(
            &mut msg,
            ChatEvent::TaskSpawned {
                task_id: "t1".into(),
                subagent_type: "sql".into(),
                description: "d".into(),
            },
        );
        assert_eq!(msg.display_scenario, DisplayScenario::Agent);
    }

    #[test]
    fn test_replanning_promotes_to_planning() {
        let mut msg = assistant();
        fold_event(
            &mut msg,
            ChatEvent::Thinking { kind: Some(ThinkingKind::Replanning), content: "again".into() },
        );
        assert_eq!(msg.display_scenario, DisplayScenario::Planning);
    }

    #[test]
    fn test_todos_replaced_wholesale() {
        let mut msg = assistant();
        fold_event(
            &mut msg,
            ChatEvent::TodosUpdated {
                todos: vec![
                    Todo { content: "A".into(), status: TodoStatus::Pending },
                    Todo { content: "B".into(), status: TodoStatus::Pending },
                ],
                timestamp: String::new(),
            },
        );
        fold_event(
            &mut msg,
            ChatEvent::TodosUpdated {
                todos: vec![Todo { content: "B".into(), status: TodoStatus::Completed }],
                timestamp: String::new(),
            },
        );
        assert_eq!(msg.todos.len(), 1);
        assert_eq!(msg.todos[0].content, "B");
        assert_eq!(msg.todos[0].status, TodoStatus::Completed);
    }

    #[test]
    fn test_tool_call_without_task_id_goes_top_level() {
        let mut msg = assistant();
        fold_event(
            &mut msg,
            ChatEvent::ToolCallStart {
                id: "c1".into(),
                task_id: None,
                name: "search".into(),
                args: json!({"q": "rust"}),
            },
        );
        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.tool_calls[0].status, ToolCallStatus::Running);
    }

    #[test]
    fn test_tool_call_with_unknown_task_id_falls_back_top_level() {
        let mut msg = assistant();
        fold_event(
            &mut msg,
            ChatEvent::ToolCallStart {
                id: "c1".into(),
                task_id: Some("never-spawned".into()),
                name: "search".into(),
                args: json!({}),
            },
        );
        assert_eq!(msg.tool_calls.len(), 1);

        fold_event(
            &mut msg,
            ChatEvent::ToolCallResult {
                id: "c1".into(),
                task_id: Some("never-spawned".into()),
                status: WireOutcome::Error,
                output: "nope".into(),
            },
        );
        assert_eq!(msg.tool_calls[0].status, ToolCallStatus::Error);
    }

    #[test]
    fn test_second_result_for_same_id_ignored() {
        let mut msg = assistant();
        fold_event(
            &mut msg,
            ChatEvent::ToolCallStart {
                id: "c1".into(),
                task_id: None,
                name: "t".into(),
                args: json!({}),
            },
        );
        fold_event(
            &mut msg,
            ChatEvent::ToolCallResult {
                id: "c1".into(),
                task_id: None,
                status: WireOutcome::Success,
                output: "first".into(),
            },
        );
        fold_event(
            &mut msg,
            ChatEvent::ToolCallResult {
                id: "c1".into(),
                task_id: None,
                status: WireOutcome::Error,
                output: "second".into(),
            },
        );
        assert_eq!(msg.tool_calls[0].status, ToolCallStatus::Done);
        assert_eq!(msg.tool_calls[0].output.as_deref(), Some("first"));
    }

    #[test]
    fn test_turn_reducer_drops_events_after_done() {
        let mut reducer = TurnReducer::new();
        let mut msg = assistant();
        reducer.apply(&mut msg, text("hi"));
        reducer.apply(&mut msg, ChatEvent::Done);
        assert!(reducer.is_finished());

        reducer.apply(&mut msg, text(" late"));
        reducer.apply(
            &mut msg,
            ChatEvent::TaskSpawned {
                task_id: "t".into(),
                subagent_type: "s".into(),
                description: "d".into(),
            },
        );
        assert_eq!(msg.content, "hi");
        assert!(msg.spawned_tasks.is_empty());
    }
}
