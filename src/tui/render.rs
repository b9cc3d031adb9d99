//! Terminal layout and message rendering.
//!
//! Assistant messages follow the three-layer display: a thinking bubble and
//! the task tree for the agent/planning scenarios, plain tool cards for the
//! quick scenario, then the answer text.

use super::app::App;
use crate::chat::model::{
    DisplayScenario, Message, Role, TaskStatus, ToolCallStatus,
};
use crate::stream::event::TodoStatus;
use crate::uploads::UploadStatus;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

const HELP: &[&str] = &[
    "/new               start a new conversation",
    "/conversations     toggle the sidebar (Ctrl+L)",
    "/agent <name>      pin an agent; /agent clear to unpin",
    "/skill <name>      apply a skill to the next message",
    "/file <path>       upload a file to attach to the next message",
    "/open <n>          open attachment #n in the browser",
    "/preview <n>       inline preview of a text attachment (Esc closes)",
    "/rename <title>    rename the selected conversation",
    "/delete            delete the selected conversation",
    "/research <text>   one-shot routing to a named agent",
    "/quit              exit",
    "",
    "Esc cancels a streaming turn. Ctrl+N/Ctrl+P select a conversation,",
    "Enter on an empty input opens it. Arrows/PgUp/PgDn scroll.",
];

pub fn render(f: &mut Frame, app: &App) {
    let area = f.area();
    let (sidebar, main) = if app.sidebar_visible {
        let cols = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(30), Constraint::Min(20)])
            .split(area);
        (Some(cols[0]), cols[1])
    } else {
        (None, area)
    };

    if let Some(sidebar) = sidebar {
        render_sidebar(f, app, sidebar);
    }

    let upload_rows = app.uploads.files.len().min(4) as u16;
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(upload_rows),
            Constraint::Length(1),
            Constraint::Length(3),
        ])
        .split(main);

    render_messages(f, app, rows[0]);
    if upload_rows > 0 {
        render_uploads(f, app, rows[1]);
    }
    render_status(f, app, rows[2]);
    render_input(f, app, rows[3]);
}

fn render_sidebar(f: &mut Frame, app: &App, area: Rect) {
    let mut lines = Vec::new();
    for (i, conv) in app.conversations.iter().enumerate() {
        let selected = i == app.selected_conversation;
        let style = if selected {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        let marker = if selected { "▸ " } else { "  " };
        lines.push(Line::from(vec![
            Span::styled(marker, style),
            Span::styled(crate::util::truncate(&conv.title, 20), style),
        ]));
        lines.push(Line::from(Span::styled(
            format!("    {}", short_date(&conv.updated_at)),
            Style::default().fg(Color::DarkGray),
        )));
    }
    if app.conversations.is_empty() {
        lines.push(Line::from(Span::styled(
            "  (no conversations)",
            Style::default().fg(Color::DarkGray),
        )));
    }
    let title = if app.conversation_total > app.conversations.len() as u64 {
        format!(
            "Conversations ({}/{})",
            app.conversations.len(),
            app.conversation_total
        )
    } else {
        "Conversations".to_string()
    };
    let widget = Paragraph::new(Text::from(lines))
        .block(Block::default().title(title).borders(Borders::ALL));
    f.render_widget(widget, area);
}

fn render_messages(f: &mut Frame, app: &App, area: Rect) {
    let width = area.width.saturating_sub(2).max(10) as usize;
    let (title, lines): (String, Vec<Line>) = if let Some(preview) = &app.preview {
        let lines = wrap_text(&preview.content, width)
            .into_iter()
            .map(Line::from)
            .collect();
        (format!("Preview: {}", preview.filename), lines)
    } else if app.help_visible {
        ("Help".to_string(), HELP.iter().map(|s| Line::from(*s)).collect())
    } else {
        let mut lines = Vec::new();
        for msg in &app.controller.messages {
            lines.extend(message_lines(msg, width));
            lines.push(Line::from(""));
        }
        ("Deepchat".to_string(), lines)
    };

    // Follow the tail unless the user scrolled up.
    let height = area.height.saturating_sub(2) as usize;
    let start = lines
        .len()
        .saturating_sub(height + app.scroll_offset.min(lines.len()));
    let visible: Vec<Line> = lines.into_iter().skip(start).collect();

    let widget = Paragraph::new(Text::from(visible))
        .block(Block::default().title(title).borders(Borders::ALL));
    f.render_widget(widget, area);
}

fn render_uploads(f: &mut Frame, app: &App, area: Rect) {
    let mut lines = Vec::new();
    for file in app.uploads.files.iter().take(area.height as usize) {
        let line = match file.status {
            UploadStatus::Uploading => Line::from(vec![
                Span::styled("↑ ", Style::default().fg(Color::Yellow)),
                Span::raw(format!("{} {}%", file.filename, file.progress_pct)),
            ]),
            UploadStatus::Completed => Line::from(vec![
                Span::styled("✓ ", Style::default().fg(Color::Green)),
                Span::raw(format!(
                    "{} ({}) — attached to next message",
                    file.filename,
                    format_size(file.size)
                )),
            ]),
            UploadStatus::Error => Line::from(vec![
                Span::styled("✗ ", Style::default().fg(Color::Red)),
                Span::raw(format!(
                    "{}: {}",
                    file.filename,
                    file.error.as_deref().unwrap_or("upload failed")
                )),
            ]),
        };
        lines.push(line);
    }
    f.render_widget(Paragraph::new(Text::from(lines)), area);
}

fn render_status(f: &mut Frame, app: &App, area: Rect) {
    let dim = Style::default().fg(Color::DarkGray);
    let mut spans = Vec::new();
    if app.controller.is_streaming {
        spans.push(Span::styled("● streaming", Style::default().fg(Color::Green)));
    } else {
        spans.push(Span::styled("○ idle", dim));
    }
    if let Some(agent) = &app.selected_agent {
        spans.push(Span::styled(format!("  agent:{agent}"), dim));
    }
    if let Some(skill) = &app.selected_skill {
        spans.push(Span::styled(format!("  skill:{skill}"), dim));
    }
    if let Some(thread) = app.controller.thread_id() {
        spans.push(Span::styled(format!("  thread:{thread}"), dim));
    }
    spans.push(Span::styled(format!("  {}", app.user.username), dim));
    if let Some(notice) = &app.notice {
        spans.push(Span::styled(
            format!("  {notice}"),
            Style::default().fg(Color::Yellow),
        ));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_input(f: &mut Frame, app: &App, area: Rect) {
    let input = Paragraph::new(Line::from(vec![
        Span::styled("> ", Style::default().fg(Color::Cyan)),
        Span::raw(app.input.clone()),
    ]))
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(input, area);
    f.set_cursor_position((
        area.x + 3 + app.input.chars().count() as u16,
        area.y + 1,
    ));
}

// ---------------------------------------------------------------------------
// Message rendering
// ---------------------------------------------------------------------------

fn message_lines(msg: &Message, width: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    match msg.role {
        Role::User => {
            lines.push(Line::from(Span::styled(
                "┃ you",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )));
            for file in &msg.files {
                lines.push(Line::from(Span::styled(
                    format!("⎘ {} ({})", file.filename, format_size(file.size)),
                    Style::default().fg(Color::DarkGray),
                )));
            }
            for wrapped in wrap_text(&msg.content, width) {
                lines.push(Line::from(wrapped));
            }
        }
        Role::Assistant => {
            lines.push(Line::from(Span::styled(
                "┃ assistant",
                Style::default()
                    .fg(Color::Magenta)
                    .add_modifier(Modifier::BOLD),
            )));
            let rich = msg.display_scenario != DisplayScenario::Quick;
            if rich {
                lines.extend(thinking_lines(msg));
                lines.extend(task_tree_lines(msg));
            } else {
                // Internal reasoning pseudo-tool stays hidden in quick mode.
                for call in msg.tool_calls.iter().filter(|c| c.name != "think_tool") {
                    lines.push(tool_call_line(&call.name, call.status, 0));
                }
            }
            for wrapped in wrap_text(&msg.content, width) {
                lines.push(Line::from(wrapped));
            }
            for file in &msg.files {
                lines.push(Line::from(Span::styled(
                    format!("⎘ {} ({})", file.filename, format_size(file.size)),
                    Style::default().fg(Color::DarkGray),
                )));
            }
        }
    }
    lines
}

fn thinking_lines(msg: &Message) -> Vec<Line<'static>> {
    let Some(thinking) = &msg.thinking else {
        return Vec::new();
    };
    if !thinking.is_thinking && thinking.steps.is_empty() {
        return Vec::new();
    }
    let mut lines = Vec::new();
    let dim = Style::default().fg(Color::DarkGray);
    if thinking.is_thinking {
        lines.push(Line::from(Span::styled(
            "✻ Thinking…",
            Style::default().fg(Color::Yellow),
        )));
        // Only the most recent steps while live; the full trail is noise.
        for step in thinking.steps.iter().rev().take(3).rev() {
            lines.push(Line::from(Span::styled(
                format!("  {}", crate::util::truncate(step, 100)),
                dim,
            )));
        }
    } else {
        let secs = thinking.duration_secs.unwrap_or(0);
        lines.push(Line::from(Span::styled(
            format!("✻ Thought for {secs}s ({} steps)", thinking.steps.len()),
            dim,
        )));
    }
    lines
}

fn task_tree_lines(msg: &Message) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for todo in &msg.todos {
        let (icon, style) = match todo.status {
            TodoStatus::Pending => ("☐", Style::default().fg(Color::DarkGray)),
            TodoStatus::InProgress => ("◐", Style::default().fg(Color::Yellow)),
            TodoStatus::Completed => ("☑", Style::default().fg(Color::Green)),
        };
        lines.push(Line::from(Span::styled(
            format!("{icon} {}", todo.content),
            style,
        )));
    }
    for task in &msg.spawned_tasks {
        let (icon, style) = match task.status {
            TaskStatus::Running => ("⚙", Style::default().fg(Color::Yellow)),
            TaskStatus::Success => ("✓", Style::default().fg(Color::Green)),
            TaskStatus::Error => ("✗", Style::default().fg(Color::Red)),
        };
        let duration = task
            .duration_ms
            .map(|ms| format!(" ({:.1}s)", ms as f64 / 1000.0))
            .unwrap_or_default();
        lines.push(Line::from(Span::styled(
            format!(
                "{icon} [{}] {}{duration}",
                task.subagent_type,
                crate::util::truncate(&task.description, 60)
            ),
            style,
        )));
        for call in &task.tool_calls {
            lines.push(tool_call_line(&call.name, call.status, 1));
        }
    }
    // Quick-scenario fallback never shows here, but tool calls that landed
    // top-level in a rich scenario still deserve a row.
    for call in &msg.tool_calls {
        lines.push(tool_call_line(&call.name, call.status, 0));
    }
    lines
}

fn tool_call_line(name: &str, status: ToolCallStatus, depth: usize) -> Line<'static> {
    let indent = "  ".repeat(depth);
    let (icon, style) = match status {
        ToolCallStatus::Running => ("⋯", Style::default().fg(Color::Yellow)),
        ToolCallStatus::Done => ("✓", Style::default().fg(Color::Green)),
        ToolCallStatus::Error => ("✗", Style::default().fg(Color::Red)),
    };
    Line::from(Span::styled(format!("{indent}└ {icon} {name}"), style))
}

fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    // split, not lines(): blank lines separate paragraphs and must survive.
    for raw_line in text.split('\n') {
        if raw_line.chars().count() <= width {
            out.push(raw_line.to_string());
            continue;
        }
        let mut current = String::new();
        for word in raw_line.split(' ') {
            let candidate_len = current.chars().count() + word.chars().count() + 1;
            if !current.is_empty() && candidate_len > width {
                out.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        if !current.is_empty() {
            out.push(current);
        }
    }
    out
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

fn short_date(iso: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(iso) {
        Ok(ts) => ts.format("%b %d %H:%M").to_string(),
        Err(_) => iso.chars().take(10).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_text_short_passthrough() {
        assert_eq!(wrap_text("hello", 10), vec!["hello".to_string()]);
    }

    #[test]
    fn test_wrap_text_splits_on_words() {
        let wrapped = wrap_text("one two three four", 9);
        assert!(wrapped.iter().all(|l| l.chars().count() <= 9));
        assert_eq!(wrapped.join(" "), "one two three four");
    }

    #[test]
    fn test_format_size_units() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_short_date_fallback() {
        assert_eq!(short_date("2025-06-01T10:00:00Z"), "Jun 01 10:00");
        assert_eq!(short_date("garbage"), "garbage");
    }
}
