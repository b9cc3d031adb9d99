use crate::api::{
    AgentEntry, ApiClient, Conversation, ConversationList, ConversationSummary, FilePreview,
    SkillEntry, UserInfo,
};
use crate::chat::controller::ChatController;
use crate::chat::model::FileAttachment;
use crate::config::Config;
use crate::prefs::UiPrefs;
use crate::uploads::UploadManager;
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

/// Results of background fetches, applied on the UI thread.
pub enum AppUpdate {
    Conversations(ConversationList),
    Agents(Vec<AgentEntry>),
    Skills(Vec<SkillEntry>),
    ConversationOpened(Conversation),
    ConversationCreated(Conversation),
    ConversationRenamed(Conversation),
    ConversationDeleted(String),
    Preview(FilePreview),
    Notice(String),
}

pub struct App {
    pub client: Arc<ApiClient>,
    pub controller: ChatController,
    pub uploads: UploadManager,
    pub user: UserInfo,
    pub input: String,
    /// Scroll offset from the bottom. 0 = follow tail, >0 = scrolled up.
    pub scroll_offset: usize,
    pub notice: Option<String>,
    pub help_visible: bool,
    /// Text-file preview shown instead of the message list (Esc closes).
    pub preview: Option<FilePreview>,
    pub conversations: Vec<ConversationSummary>,
    pub conversation_total: u64,
    pub selected_conversation: usize,
    pub sidebar_visible: bool,
    pub agents: Vec<AgentEntry>,
    pub skills: Vec<SkillEntry>,
    pub selected_agent: Option<String>,
    pub selected_skill: Option<String>,
    prefs: UiPrefs,
    was_streaming: bool,
    bg_tx: mpsc::UnboundedSender<AppUpdate>,
    bg_rx: mpsc::UnboundedReceiver<AppUpdate>,
}

impl App {
    pub fn new(client: Arc<ApiClient>, user: UserInfo, config: &Config) -> Self {
        let (bg_tx, bg_rx) = mpsc::unbounded_channel();
        let prefs = UiPrefs::load(&crate::paths::prefs_file());
        Self {
            controller: ChatController::new(client.clone()),
            uploads: UploadManager::new(client.clone(), &config.upload),
            client,
            user,
            input: String::new(),
            scroll_offset: 0,
            notice: None,
            help_visible: false,
            preview: None,
            conversations: Vec::new(),
            conversation_total: 0,
            selected_conversation: 0,
            sidebar_visible: !prefs.sidebar_collapsed,
            agents: Vec::new(),
            skills: Vec::new(),
            selected_agent: None,
            selected_skill: None,
            prefs,
            was_streaming: false,
            bg_tx,
            bg_rx,
        }
    }

    /// Kick off the initial fetches and reopen the last conversation.
    pub fn bootstrap(&mut self) {
        self.refresh_conversations();
        let client = self.client.clone();
        let tx = self.bg_tx.clone();
        tokio::spawn(async move {
            match client.list_agents().await {
                Ok(agents) => {
                    let _ = tx.send(AppUpdate::Agents(agents));
                }
                Err(e) => warn!("Agent list fetch failed: {}", e),
            }
            match client.list_skills().await {
                Ok(skills) => {
                    let _ = tx.send(AppUpdate::Skills(skills));
                }
                Err(e) => warn!("Skill list fetch failed: {}", e),
            }
        });

        if let Some(id) = self.prefs.last_conversation_id.clone() {
            let client = self.client.clone();
            let tx = self.bg_tx.clone();
            tokio::spawn(async move {
                match client.get_conversation(&id).await {
                    Ok(conv) => {
                        let _ = tx.send(AppUpdate::ConversationOpened(conv));
                    }
                    Err(e) => warn!("Could not reopen conversation {}: {}", id, e),
                }
            });
        }
    }

    fn refresh_conversations(&self) {
        let client = self.client.clone();
        let tx = self.bg_tx.clone();
        tokio::spawn(async move {
            match client.list_conversations(50, 0).await {
                Ok(list) => {
                    let _ = tx.send(AppUpdate::Conversations(list));
                }
                Err(e) => warn!("Conversation list fetch failed: {}", e),
            }
        });
    }

    /// Pump all channels. Returns true if anything changed (needs redraw).
    pub fn poll_async(&mut self) -> bool {
        let mut changed = self.controller.poll_updates();
        changed |= self.uploads.poll_updates();
        while let Ok(update) = self.bg_rx.try_recv() {
            self.handle_app_update(update);
            changed = true;
        }
        // A finished turn may have created the conversation server-side.
        if self.was_streaming && !self.controller.is_streaming {
            self.refresh_conversations();
        }
        self.was_streaming = self.controller.is_streaming;
        changed
    }

    fn handle_app_update(&mut self, update: AppUpdate) {
        match update {
            AppUpdate::Conversations(list) => {
                self.conversations = list.conversations;
                self.conversation_total = list.total;
                if let Some(id) = &self.prefs.last_conversation_id {
                    if let Some(pos) = self.conversations.iter().position(|c| &c.id == id) {
                        self.selected_conversation = pos;
                    }
                }
                self.clamp_selection();
            }
            AppUpdate::Agents(agents) => {
                self.controller.set_agents(agents.clone());
                self.agents = agents;
            }
            AppUpdate::Skills(skills) => {
                self.skills = skills;
            }
            AppUpdate::ConversationOpened(conv) => {
                tracing::debug!(
                    "Opened conversation {} (created {}, updated {})",
                    conv.id,
                    conv.created_at,
                    conv.updated_at
                );
                self.controller.load_history(conv.thread_id.clone());
                self.remember_conversation(Some(conv.id));
                self.scroll_offset = 0;
            }
            AppUpdate::ConversationCreated(conv) => {
                self.conversations.insert(
                    0,
                    ConversationSummary {
                        id: conv.id.clone(),
                        title: conv.title.clone(),
                        updated_at: conv.updated_at.clone(),
                    },
                );
                self.conversation_total += 1;
                self.selected_conversation = 0;
                // Point the controller at the fresh (empty) thread.
                self.controller.load_history(conv.thread_id.clone());
                self.remember_conversation(Some(conv.id));
            }
            AppUpdate::ConversationRenamed(conv) => {
                if let Some(entry) = self.conversations.iter_mut().find(|c| c.id == conv.id) {
                    entry.title = conv.title;
                }
            }
            AppUpdate::ConversationDeleted(id) => {
                self.conversations.retain(|c| c.id != id);
                self.conversation_total = self.conversation_total.saturating_sub(1);
                if self.prefs.last_conversation_id.as_deref() == Some(id.as_str()) {
                    self.remember_conversation(None);
                }
                self.clamp_selection();
            }
            AppUpdate::Preview(preview) => {
                self.preview = Some(preview);
            }
            AppUpdate::Notice(text) => self.notice = Some(text),
        }
    }

    fn clamp_selection(&mut self) {
        self.selected_conversation = self
            .selected_conversation
            .min(self.conversations.len().saturating_sub(1));
    }

    fn remember_conversation(&mut self, id: Option<String>) {
        self.prefs.last_conversation_id = id;
        if let Err(e) = self.prefs.save(&crate::paths::prefs_file()) {
            warn!("Could not save prefs: {}", e);
        }
    }

    fn set_notice(&mut self, text: impl Into<String>) {
        self.notice = Some(text.into());
    }

    /// Returns Ok(true) to quit.
    pub fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Ok(true);
            }
            KeyCode::Char('l') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.toggle_sidebar();
            }
            KeyCode::Char('n') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                if self.sidebar_visible && !self.conversations.is_empty() {
                    self.selected_conversation =
                        (self.selected_conversation + 1) % self.conversations.len();
                }
            }
            KeyCode::Char('p') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                if self.sidebar_visible && !self.conversations.is_empty() {
                    self.selected_conversation = self
                        .selected_conversation
                        .checked_sub(1)
                        .unwrap_or(self.conversations.len() - 1);
                }
            }
            KeyCode::Up => {
                self.scroll_offset = self.scroll_offset.saturating_add(1);
            }
            KeyCode::Down => {
                self.scroll_offset = self.scroll_offset.saturating_sub(1);
            }
            KeyCode::PageUp => {
                self.scroll_offset = self.scroll_offset.saturating_add(20);
            }
            KeyCode::PageDown => {
                self.scroll_offset = self.scroll_offset.saturating_sub(20);
            }
            KeyCode::Char(ch) => {
                self.scroll_offset = 0;
                self.notice = None;
                self.input.push(ch);
            }
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Enter => {
                let line = self.input.trim().to_string();
                self.input.clear();
                if line.is_empty() {
                    if self.sidebar_visible {
                        self.open_selected_conversation();
                    }
                } else {
                    self.scroll_offset = 0;
                    if self.handle_command(line)? {
                        return Ok(true);
                    }
                }
            }
            KeyCode::Esc => {
                if self.preview.is_some() {
                    self.preview = None;
                } else if self.help_visible {
                    self.help_visible = false;
                } else if self.controller.is_streaming {
                    self.controller.cancel();
                    self.set_notice("Cancelling…");
                } else {
                    self.input.clear();
                }
            }
            _ => {}
        }
        Ok(false)
    }

    fn toggle_sidebar(&mut self) {
        self.sidebar_visible = !self.sidebar_visible;
        self.prefs.sidebar_collapsed = !self.sidebar_visible;
        if let Err(e) = self.prefs.save(&crate::paths::prefs_file()) {
            warn!("Could not save prefs: {}", e);
        }
    }

    fn open_selected_conversation(&mut self) {
        let Some(conv) = self.conversations.get(self.selected_conversation) else {
            return;
        };
        let id = conv.id.clone();
        let client = self.client.clone();
        let tx = self.bg_tx.clone();
        tokio::spawn(async move {
            match client.get_conversation(&id).await {
                Ok(conv) => {
                    let _ = tx.send(AppUpdate::ConversationOpened(conv));
                }
                Err(e) => {
                    let _ = tx.send(AppUpdate::Notice(format!("Open failed: {e}")));
                }
            }
        });
    }

    fn handle_command(&mut self, line: String) -> Result<bool> {
        if line == "/quit" || line == "/exit" {
            return Ok(true);
        }
        if line == "/help" {
            self.help_visible = !self.help_visible;
            return Ok(false);
        }
        if line == "/new" {
            self.controller.start_new_thread();
            self.remember_conversation(None);
            let client = self.client.clone();
            let tx = self.bg_tx.clone();
            tokio::spawn(async move {
                match client.create_conversation(None).await {
                    Ok(conv) => {
                        let _ = tx.send(AppUpdate::ConversationCreated(conv));
                    }
                    // The thread will still be created lazily on first send.
                    Err(e) => warn!("Conversation create failed: {}", e),
                }
            });
            self.set_notice("Started a new conversation");
            return Ok(false);
        }
        if line == "/conversations" {
            self.toggle_sidebar();
            return Ok(false);
        }

        if line == "/agent" {
            let listing: Vec<String> = self
                .agents
                .iter()
                .map(|a| format!("{} — {}", a.name, a.description))
                .collect();
            self.set_notice(if listing.is_empty() {
                "No agents registered".to_string()
            } else {
                format!("Agents: {}", listing.join(" | "))
            });
            return Ok(false);
        }
        if line == "/agent clear" {
            self.selected_agent = None;
            self.set_notice("Agent cleared — supervisor will route");
            return Ok(false);
        }
        if let Some(rest) = line.strip_prefix("/agent ") {
            let name = rest.trim();
            if self.agents.iter().any(|a| a.name == name) {
                self.selected_agent = Some(name.to_string());
                self.set_notice(format!("Agent pinned: {name}"));
            } else {
                let known: Vec<&str> = self.agents.iter().map(|a| a.name.as_str()).collect();
                self.set_notice(format!(
                    "Unknown agent: {name}. Known: {}",
                    known.join(", ")
                ));
            }
            return Ok(false);
        }

        if line == "/skill" {
            let listing: Vec<String> = self
                .skills
                .iter()
                .map(|s| format!("{} — {}", s.name, s.description))
                .collect();
            self.set_notice(if listing.is_empty() {
                "No skills installed".to_string()
            } else {
                format!("Skills: {}", listing.join(" | "))
            });
            return Ok(false);
        }
        if line == "/skill clear" {
            self.selected_skill = None;
            self.set_notice("Skill cleared");
            return Ok(false);
        }
        if let Some(rest) = line.strip_prefix("/skill ") {
            let name = rest.trim();
            if self.skills.iter().any(|s| s.name == name) {
                self.selected_skill = Some(name.to_string());
                self.set_notice(format!("Skill selected for next message: {name}"));
            } else {
                let known: Vec<&str> = self.skills.iter().map(|s| s.name.as_str()).collect();
                self.set_notice(format!(
                    "Unknown skill: {name}. Known: {}",
                    known.join(", ")
                ));
            }
            return Ok(false);
        }

        if let Some(rest) = line.strip_prefix("/file ") {
            let path = expand_tilde(rest.trim());
            match self.uploads.start_upload(path) {
                Ok(()) => self.set_notice("Uploading…"),
                Err(e) => self.set_notice(format!("Upload rejected: {e}")),
            }
            return Ok(false);
        }

        if let Some(rest) = line.strip_prefix("/open ") {
            self.open_attachment(rest.trim());
            return Ok(false);
        }
        if let Some(rest) = line.strip_prefix("/preview ") {
            self.preview_attachment(rest.trim());
            return Ok(false);
        }

        if let Some(rest) = line.strip_prefix("/rename ") {
            let title = rest.trim().to_string();
            let Some(conv) = self.conversations.get(self.selected_conversation) else {
                self.set_notice("No conversation selected");
                return Ok(false);
            };
            let id = conv.id.clone();
            let client = self.client.clone();
            let tx = self.bg_tx.clone();
            tokio::spawn(async move {
                match client.rename_conversation(&id, &title).await {
                    Ok(conv) => {
                        let _ = tx.send(AppUpdate::ConversationRenamed(conv));
                    }
                    Err(e) => {
                        let _ = tx.send(AppUpdate::Notice(format!("Rename failed: {e}")));
                    }
                }
            });
            return Ok(false);
        }

        if line == "/delete" {
            let Some(conv) = self.conversations.get(self.selected_conversation) else {
                self.set_notice("No conversation selected");
                return Ok(false);
            };
            let id = conv.id.clone();
            let client = self.client.clone();
            let tx = self.bg_tx.clone();
            tokio::spawn(async move {
                match client.delete_conversation(&id).await {
                    Ok(()) => {
                        let _ = tx.send(AppUpdate::ConversationDeleted(id));
                    }
                    Err(e) => {
                        let _ = tx.send(AppUpdate::Notice(format!("Delete failed: {e}")));
                    }
                }
            });
            return Ok(false);
        }

        // Anything else, including unrecognized /commands, goes to the
        // agent; the controller's slash parsing handles /research-style
        // routing itself.
        self.submit_message(&line);
        Ok(false)
    }

    fn submit_message(&mut self, text: &str) {
        if self.controller.is_streaming {
            self.set_notice("A turn is already streaming — Esc to cancel");
            return;
        }
        if self.uploads.has_active() {
            self.set_notice("Waiting for uploads to finish…");
            return;
        }
        let files = self.uploads.take_completed();
        self.controller.send(
            text,
            self.selected_agent.clone(),
            self.selected_skill.take(),
            files,
        );
    }

    /// Resolve `/open 2`-style references against all attachments, in
    /// message order.
    fn nth_attachment(&self, arg: &str) -> Result<FileAttachment, String> {
        let Ok(n) = arg.parse::<usize>() else {
            return Err("Usage: /open <number> or /preview <number>".to_string());
        };
        let files: Vec<&FileAttachment> = self
            .controller
            .messages
            .iter()
            .flat_map(|m| m.files.iter())
            .collect();
        n.checked_sub(1)
            .and_then(|i| files.get(i).copied())
            .cloned()
            .ok_or_else(|| format!("No attachment #{n} ({} total)", files.len()))
    }

    /// `/open <n>`: open an attachment in the browser for download.
    fn open_attachment(&mut self, arg: &str) {
        let file = match self.nth_attachment(arg) {
            Ok(f) => f,
            Err(msg) => {
                self.set_notice(msg);
                return;
            }
        };
        let url = self.client.download_url(&file);
        match open::that(&url) {
            Ok(()) => self.set_notice(format!("Opened {}", file.filename)),
            Err(e) => self.set_notice(format!("Could not open browser: {e}")),
        }
    }

    /// `/preview <n>`: inline text preview for textual attachments.
    fn preview_attachment(&mut self, arg: &str) {
        let file = match self.nth_attachment(arg) {
            Ok(f) => f,
            Err(msg) => {
                self.set_notice(msg);
                return;
            }
        };
        let textual = file.content_type.starts_with("text/")
            || file.content_type == "application/json"
            || file.content_type == "text/csv";
        if !textual {
            self.set_notice(format!(
                "{} is {} — use /open instead",
                file.filename, file.content_type
            ));
            return;
        }
        let client = self.client.clone();
        let tx = self.bg_tx.clone();
        tokio::spawn(async move {
            match client.file_content(&file.file_id).await {
                Ok(preview) => {
                    let _ = tx.send(AppUpdate::Preview(preview));
                }
                Err(e) => {
                    let _ = tx.send(AppUpdate::Notice(format!("Preview failed: {e}")));
                }
            }
        });
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
