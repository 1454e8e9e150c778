//! Reusable TUI components.

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use super::theme::Theme;
use crate::model::Message;
use crate::notify::PanelEntry;
use crate::shell::output::{author_name, resolve_mentions};
use crate::util::{format_slack_time, truncate_text};

/// Bordered block of pre-built lines, scrolled from the top.
pub struct ScrollableText<'a> {
    title: String,
    content: Vec<Line<'a>>,
    scroll: usize,
    focused: bool,
}

impl<'a> ScrollableText<'a> {
    /// Create a new scrollable text view.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: Vec::new(),
            scroll: 0,
            focused: false,
        }
    }

    /// Set content.
    pub fn content(mut self, content: Vec<Line<'a>>) -> Self {
        self.content = content;
        self
    }

    /// Set scroll position.
    pub fn scroll(mut self, scroll: usize) -> Self {
        self.scroll = scroll;
        self
    }

    /// Set focused state.
    pub fn focused(mut self, focused: bool) -> Self {
        self.focused = focused;
        self
    }

    /// Render the component.
    pub fn render(self, f: &mut Frame, area: Rect, theme: &Theme) {
        let rows = usize::from(area.height.saturating_sub(2));
        let visible: Vec<Line> = self
            .content
            .into_iter()
            .skip(self.scroll)
            .take(rows)
            .collect();

        let paragraph = Paragraph::new(visible)
            .block(
                Block::default()
                    .title(self.title)
                    .borders(Borders::ALL)
                    .border_style(theme.border_style(self.focused)),
            )
            .wrap(Wrap { trim: false });

        f.render_widget(paragraph, area);
    }
}

/// One-row bar with left and right aligned text.
#[derive(Default)]
pub struct StatusBar<'a> {
    left: Vec<Span<'a>>,
    right: Vec<Span<'a>>,
}

impl<'a> StatusBar<'a> {
    /// Create a new status bar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Left-aligned content.
    pub fn left(mut self, spans: Vec<Span<'a>>) -> Self {
        self.left = spans;
        self
    }

    /// Right-aligned content.
    pub fn right(mut self, spans: Vec<Span<'a>>) -> Self {
        self.right = spans;
        self
    }

    /// Render the status bar.
    pub fn render(self, f: &mut Frame, area: Rect, theme: &Theme) {
        let width = |spans: &[Span]| spans.iter().map(|s| s.content.chars().count()).sum::<usize>();
        let padding = usize::from(area.width)
            .saturating_sub(width(&self.left) + width(&self.right))
            .max(1);

        let mut spans = self.left;
        spans.push(Span::raw(" ".repeat(padding)));
        spans.extend(self.right);

        let paragraph = Paragraph::new(Line::from(spans)).style(theme.status_style());
        f.render_widget(paragraph, area);
    }
}

/// Spans for message text with resolved mentions highlighted.
fn body_spans<N>(text: &str, names: &N, theme: &Theme) -> Vec<Span<'static>>
where
    N: Fn(&str) -> Option<String>,
{
    let resolved = resolve_mentions(text, names);
    let mut spans = Vec::new();
    for (i, word) in resolved.split(' ').enumerate() {
        if i > 0 {
            spans.push(Span::raw(" "));
        }
        let style = if word.starts_with('@') && word.len() > 1 {
            theme.mention_style()
        } else {
            theme.text_style()
        };
        spans.push(Span::styled(word.to_string(), style));
    }
    spans
}

/// Lines for one message: header, body, reactions and reply count.
pub fn message_lines<N>(message: &Message, names: &N, theme: &Theme, selected: bool) -> Vec<Line<'static>>
where
    N: Fn(&str) -> Option<String>,
{
    let marker = if selected { "▶ " } else { "  " };
    let mut lines = vec![Line::from(vec![
        Span::styled(marker, theme.accent_style()),
        Span::styled(format!("[{}] ", format_slack_time(&message.ts)), theme.dim_style()),
        Span::styled(author_name(message, names), theme.author_style()),
    ])];

    for text_line in message.text.lines() {
        let mut spans = vec![Span::raw("    ")];
        spans.extend(body_spans(text_line, names, theme));
        lines.push(Line::from(spans));
    }

    for attachment in &message.attachments {
        if !attachment.title.is_empty() {
            lines.push(Line::from(Span::styled(
                format!("    📎 {}", attachment.title),
                theme.dim_style(),
            )));
        }
    }

    if !message.reactions.is_empty() {
        let reactions: Vec<String> = message
            .reactions
            .iter()
            .map(|r| format!(":{}: {}", r.name, r.count))
            .collect();
        lines.push(Line::from(Span::styled(
            format!("    {}", reactions.join("  ")),
            theme.accent_style(),
        )));
    }

    if message.reply_count > 0 {
        let label = if message.reply_count == 1 { "reply" } else { "replies" };
        lines.push(Line::from(Span::styled(
            format!("    └─ {} {label}", message.reply_count),
            theme.accent_style(),
        )));
    }

    if selected {
        for line in &mut lines {
            line.style = theme.selection_style();
        }
    }
    lines
}

/// Row of the notification panel.
pub fn panel_line(index: usize, entry: &PanelEntry, theme: &Theme, selected: bool) -> Line<'static> {
    let sigil = if entry.is_dm { "@" } else { "#" };
    let preview = truncate_text(&entry.last_message, 60);
    let mut line = Line::from(vec![
        Span::styled(format!("{}. ", index + 1), theme.dim_style()),
        Span::styled(format!("{sigil}{}", entry.channel_name), theme.prompt_style()),
        Span::styled(format!(" ({})", entry.count), theme.mention_style()),
        Span::raw("  "),
        Span::styled(format!("{}: ", entry.last_user), theme.author_style()),
        Span::styled(preview, theme.text_style()),
    ]);
    if selected {
        line.style = theme.selection_style();
    }
    line
}

/// Key hints shown at the bottom of a view.
pub fn hint_line(hints: &[(&str, &str)], theme: &Theme) -> Line<'static> {
    let mut spans = Vec::new();
    for (i, (key, action)) in hints.iter().enumerate() {
        if i > 0 {
            spans.push(Span::styled("  ", Style::default()));
        }
        spans.push(Span::styled((*key).to_string(), theme.prompt_style()));
        spans.push(Span::styled(format!(" {action}"), theme.dim_style()));
    }
    Line::from(spans)
}

/// A rectangle centered in `area`, sized in percent.
pub fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Reaction;

    fn text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn test_message_lines() {
        let mut message = Message::new("1700000000.000100", "U001", "ping <@U002>");
        message.reply_count = 2;
        message.reactions.push(Reaction {
            name: "tada".into(),
            count: 3,
            users: Vec::new(),
        });
        let names = |id: &str| match id {
            "U001" => Some("alice".to_string()),
            "U002" => Some("albert".to_string()),
            _ => None,
        };

        let lines = message_lines(&message, &names, &Theme::dark(), false);
        assert_eq!(lines.len(), 4);
        assert!(text(&lines[0]).ends_with("alice"));
        assert_eq!(text(&lines[1]), "    ping @albert");
        assert_eq!(text(&lines[2]), "    :tada: 3");
        assert_eq!(text(&lines[3]), "    └─ 2 replies");
    }

    #[test]
    fn test_panel_line() {
        let entry = PanelEntry {
            channel_id: "C002".into(),
            channel_name: "dev-backend".into(),
            is_dm: false,
            count: 3,
            last_message: "deploying now".into(),
            last_user: "alice".into(),
        };
        let line = panel_line(0, &entry, &Theme::dark(), true);
        assert_eq!(text(&line), "1. #dev-backend (3)  alice: deploying now");
    }

    #[test]
    fn test_centered_rect_is_inside() {
        let area = Rect::new(0, 0, 100, 50);
        let rect = centered_rect(60, 40, area);
        assert_eq!(rect.width, 60);
        assert_eq!(rect.height, 20);
        assert!(rect.x >= area.x && rect.y >= area.y);
    }
}
