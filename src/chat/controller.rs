//! Orchestrates one user turn: thread creation on demand, the streaming
//! request, cancellation, and terminal cleanup.
//!
//! The controller owns the message list for the thread's lifetime in this
//! client. The per-turn read loop runs on a spawned task and never touches
//! the view model directly; it ships decoded events back over a channel,
//! and `poll_updates` folds them on the owning side. One writer, no locks.

use super::model::{Message, Role};
use super::reducer::{error_marker, TurnReducer};
use crate::api::{AgentEntry, ApiClient, ChatRequest, HistoryMessage};
use crate::chat::model::FileAttachment;
use crate::stream::event::ChatEvent;
use crate::stream::sse::SseParser;
use anyhow::Result;
use futures_util::StreamExt;
use regex::Regex;
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Updates flowing from spawned tasks back to the controller.
#[derive(Debug)]
pub enum TurnUpdate {
    Event(ChatEvent),
    /// Transport failure. Not user cancellation, which produces no update.
    Failed(String),
    /// The read loop exited, for any reason. Always the last turn update.
    Closed,
    HistoryLoaded {
        thread_id: String,
        records: Vec<HistoryMessage>,
    },
    HistoryFailed(String),
}

/// Parse a `/command` prefix: "/research AI news" → ("research", "AI news"),
/// but only when the name matches a registered agent; anything else is a
/// plain message that happens to start with a slash.
pub fn parse_slash_command(text: &str, agents: &[AgentEntry]) -> (Option<String>, String) {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?s)^/(\S+)\s+(.+)$").expect("static regex"));
    if let Some(caps) = re.captures(text) {
        let name = &caps[1];
        if agents.iter().any(|a| a.name == name) {
            return (Some(name.to_string()), caps[2].to_string());
        }
    }
    (None, text.to_string())
}

pub struct ChatController {
    client: Arc<ApiClient>,
    pub messages: Vec<Message>,
    pub is_streaming: bool,
    thread_id: Option<String>,
    /// Write-back slot for a lazily created thread id (the spawned turn task
    /// creates the thread; the controller picks the id up on its next poll).
    thread_slot: Arc<StdMutex<Option<String>>>,
    agents: Vec<AgentEntry>,
    /// Id of the assistant message the active turn streams into.
    active_assistant: Option<String>,
    reducer: TurnReducer,
    cancel: Option<CancellationToken>,
    updates_tx: mpsc::UnboundedSender<TurnUpdate>,
    updates_rx: mpsc::UnboundedReceiver<TurnUpdate>,
    msg_counter: u64,
}

impl ChatController {
    pub fn new(client: Arc<ApiClient>) -> Self {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        Self {
            client,
            messages: Vec::new(),
            is_streaming: false,
            thread_id: None,
            thread_slot: Arc::new(StdMutex::new(None)),
            agents: Vec::new(),
            active_assistant: None,
            reducer: TurnReducer::new(),
            cancel: None,
            updates_tx,
            updates_rx,
            msg_counter: 0,
        }
    }

    /// Registered agents, used to validate `/command` routing.
    pub fn set_agents(&mut self, agents: Vec<AgentEntry>) {
        self.agents = agents;
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    fn next_id(&mut self) -> String {
        self.msg_counter += 1;
        format!("msg-{}", self.msg_counter)
    }

    /// Start a turn. Fire-and-forget: progress lands in `messages` via
    /// `poll_updates`. No-op while a turn is already streaming, or when the
    /// text is blank and nothing is attached.
    pub fn send(
        &mut self,
        text: &str,
        explicit_agent: Option<String>,
        skill: Option<String>,
        files: Vec<FileAttachment>,
    ) {
        if self.is_streaming {
            return;
        }
        let trimmed = text.trim();
        if trimmed.is_empty() && files.is_empty() {
            return;
        }

        let (agent, message) = match explicit_agent {
            Some(a) => (Some(a), trimmed.to_string()),
            None => parse_slash_command(trimmed, &self.agents),
        };
        let file_ids: Vec<String> = files.iter().map(|f| f.file_id.clone()).collect();

        // The user bubble shows what was typed, slash prefix included.
        let user_id = self.next_id();
        self.messages.push(Message::user(user_id, trimmed, files));

        let assistant_id = self.next_id();
        self.messages
            .push(Message::assistant_placeholder(assistant_id.clone()));
        self.active_assistant = Some(assistant_id);
        self.reducer = TurnReducer::new();
        self.is_streaming = true;

        let token = CancellationToken::new();
        self.cancel = Some(token.clone());

        let client = self.client.clone();
        let known_thread = self.thread_id.clone();
        let slot = self.thread_slot.clone();
        let tx = self.updates_tx.clone();
        tokio::spawn(async move {
            run_turn(client, known_thread, slot, message, agent, skill, file_ids, token, tx).await;
        });
    }

    /// Signal abort on the in-flight request, if any. The view model keeps
    /// whatever has already been folded; no error marker is appended for a
    /// user-initiated cancel.
    pub fn cancel(&mut self) {
        if let Some(token) = &self.cancel {
            token.cancel();
        }
    }

    /// Drop the current thread and start fresh on the next send.
    pub fn start_new_thread(&mut self) {
        self.cancel();
        self.messages.clear();
        self.thread_id = None;
        *self.thread_slot.lock().unwrap() = None;
        self.active_assistant = None;
    }

    /// Replace the message list with persisted history for `thread_id`.
    /// Async like everything else: the fetch runs on a spawned task and the
    /// swap happens in `poll_updates`.
    pub fn load_history(&mut self, thread_id: String) {
        self.cancel();
        let client = self.client.clone();
        let tx = self.updates_tx.clone();
        tokio::spawn(async move {
            match client.thread_history(&thread_id).await {
                Ok(records) => {
                    let _ = tx.send(TurnUpdate::HistoryLoaded { thread_id, records });
                }
                Err(e) => {
                    let _ = tx.send(TurnUpdate::HistoryFailed(e.to_string()));
                }
            }
        });
    }

    /// Drain and apply pending updates. Returns true if state changed.
    pub fn poll_updates(&mut self) -> bool {
        let mut changed = false;
        while let Ok(update) = self.updates_rx.try_recv() {
            self.handle_update(update);
            changed = true;
        }
        changed
    }

    fn handle_update(&mut self, update: TurnUpdate) {
        // Pick up a lazily created thread id.
        if self.thread_id.is_none() {
            if let Some(id) = self.thread_slot.lock().unwrap().clone() {
                self.thread_id = Some(id);
            }
        }

        match update {
            TurnUpdate::Event(event) => {
                if self.reducer.is_finished() {
                    debug!("Dropping event after done: {:?}", event);
                    return;
                }
                let Some(id) = self.active_assistant.clone() else {
                    return;
                };
                let Some(msg) = self.messages.iter_mut().find(|m| m.id == id) else {
                    return;
                };
                self.reducer.apply(msg, event);
            }
            TurnUpdate::Failed(err) => {
                warn!("Turn failed: {}", err);
                let Some(id) = self.active_assistant.clone() else {
                    return;
                };
                if let Some(msg) = self.messages.iter_mut().find(|m| m.id == id) {
                    msg.content.push_str(&error_marker(&err));
                }
            }
            TurnUpdate::Closed => {
                self.is_streaming = false;
                self.cancel = None;
            }
            TurnUpdate::HistoryLoaded { thread_id, records } => {
                debug!("Loaded {} history messages for {}", records.len(), thread_id);
                self.messages.clear();
                for record in records {
                    let role = if record.role == "user" {
                        Role::User
                    } else {
                        Role::Assistant
                    };
                    let id = self.next_id();
                    self.messages
                        .push(Message::from_history(id, role, record.content));
                }
                *self.thread_slot.lock().unwrap() = Some(thread_id.clone());
                self.thread_id = Some(thread_id);
                self.active_assistant = None;
                self.is_streaming = false;
            }
            TurnUpdate::HistoryFailed(err) => {
                warn!("History load failed: {}", err);
            }
        }
    }
}

/// The per-turn task: resolve the thread, issue the streaming request, and
/// decode frames until the stream ends or the token is cancelled.
#[allow(clippy::too_many_arguments)]
async fn run_turn(
    client: Arc<ApiClient>,
    known_thread: Option<String>,
    slot: Arc<StdMutex<Option<String>>>,
    message: String,
    agent: Option<String>,
    skill: Option<String>,
    file_ids: Vec<String>,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<TurnUpdate>,
) {
    let thread_id = match resolve_thread(&client, known_thread, &slot, &cancel).await {
        Ok(Some(id)) => id,
        Ok(None) => {
            // Cancelled before the thread existed.
            let _ = tx.send(TurnUpdate::Closed);
            return;
        }
        Err(e) => {
            let _ = tx.send(TurnUpdate::Failed(e.to_string()));
            let _ = tx.send(TurnUpdate::Closed);
            return;
        }
    };

    let request = ChatRequest {
        thread_id: &thread_id,
        message: &message,
        agent: agent.as_deref(),
        skill: skill.as_deref(),
        file_ids,
    };
    let resp = tokio::select! {
        _ = cancel.cancelled() => {
            let _ = tx.send(TurnUpdate::Closed);
            return;
        }
        resp = client.chat_request(&request) => resp,
    };
    let resp = match resp {
        Ok(r) => r,
        Err(e) => {
            let _ = tx.send(TurnUpdate::Failed(e.to_string()));
            let _ = tx.send(TurnUpdate::Closed);
            return;
        }
    };

    let mut stream = resp.bytes_stream();
    let mut parser = SseParser::new();
    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => break,
            chunk = stream.next() => chunk,
        };
        match chunk {
            None => break,
            Some(Ok(bytes)) => {
                for frame in parser.push(&bytes) {
                    if let Some(event) = ChatEvent::decode(&frame.event, frame.data) {
                        if tx.send(TurnUpdate::Event(event)).is_err() {
                            return; // receiver dropped
                        }
                    }
                }
            }
            Some(Err(e)) => {
                let _ = tx.send(TurnUpdate::Failed(e.to_string()));
                break;
            }
        }
    }
    let _ = tx.send(TurnUpdate::Closed);
}

/// Reuse the known thread or lazily create one, writing the new id back
/// through the shared slot. `Ok(None)` means cancelled mid-create.
async fn resolve_thread(
    client: &ApiClient,
    known_thread: Option<String>,
    slot: &Arc<StdMutex<Option<String>>>,
    cancel: &CancellationToken,
) -> Result<Option<String>> {
    if let Some(id) = known_thread.or_else(|| slot.lock().unwrap().clone()) {
        return Ok(Some(id));
    }
    let created = tokio::select! {
        _ = cancel.cancelled() => return Ok(None),
        created = client.create_thread() => created?,
    };
    let mut guard = slot.lock().unwrap();
    if guard.is_none() {
        *guard = Some(created.clone());
    }
    Ok(Some(created))
}
