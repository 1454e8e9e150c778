//! Colors for the shell and the conversation view.

use ratatui::style::{Color, Modifier, Style};

/// Application theme.
#[derive(Debug, Clone)]
pub struct Theme {
    /// Name of the theme.
    pub name: String,
    /// Body text.
    pub foreground: Color,
    /// Prompt and titles.
    pub primary: Color,
    /// Border color (unfocused).
    pub border: Color,
    /// Border color (focused).
    pub border_focused: Color,
    /// Selection highlight.
    pub selection: Color,
    /// Message authors.
    pub author: Color,
    /// Timestamps, hints and other secondary text.
    pub dim: Color,
    /// `@` mentions and channel links.
    pub mention: Color,
    /// Thread and reaction markers.
    pub accent: Color,
    /// Status bar background.
    pub status_bg: Color,
    /// Error color.
    pub error: Color,
    /// Warning color.
    pub warning: Color,
    /// Success color.
    pub success: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self::dark()
    }
}

impl Theme {
    /// Dark terminals.
    pub fn dark() -> Self {
        Self {
            name: "dark".to_string(),
            foreground: Color::White,
            primary: Color::Cyan,
            border: Color::DarkGray,
            border_focused: Color::Cyan,
            selection: Color::DarkGray,
            author: Color::Green,
            dim: Color::Gray,
            mention: Color::Yellow,
            accent: Color::Magenta,
            status_bg: Color::DarkGray,
            error: Color::Red,
            warning: Color::Yellow,
            success: Color::Green,
        }
    }

    /// Light terminals.
    pub fn light() -> Self {
        Self {
            name: "light".to_string(),
            foreground: Color::Black,
            primary: Color::Blue,
            border: Color::Gray,
            border_focused: Color::Blue,
            selection: Color::LightBlue,
            author: Color::Green,
            dim: Color::DarkGray,
            mention: Color::Magenta,
            accent: Color::Blue,
            status_bg: Color::Gray,
            error: Color::Red,
            warning: Color::Magenta,
            success: Color::Green,
        }
    }

    /// High contrast.
    pub fn high_contrast() -> Self {
        Self {
            name: "high-contrast".to_string(),
            foreground: Color::White,
            primary: Color::Yellow,
            border: Color::White,
            border_focused: Color::Yellow,
            selection: Color::Blue,
            author: Color::LightGreen,
            dim: Color::White,
            mention: Color::LightYellow,
            accent: Color::LightCyan,
            status_bg: Color::Blue,
            error: Color::LightRed,
            warning: Color::LightYellow,
            success: Color::LightGreen,
        }
    }

    /// Theme by name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "dark" => Some(Self::dark()),
            "light" => Some(Self::light()),
            "high-contrast" | "highcontrast" => Some(Self::high_contrast()),
            _ => None,
        }
    }

    /// Body text.
    pub fn text_style(&self) -> Style {
        Style::default().fg(self.foreground)
    }

    /// The shell prompt.
    pub fn prompt_style(&self) -> Style {
        Style::default()
            .fg(self.primary)
            .add_modifier(Modifier::BOLD)
    }

    /// Borders.
    pub fn border_style(&self, focused: bool) -> Style {
        if focused {
            Style::default().fg(self.border_focused)
        } else {
            Style::default().fg(self.border)
        }
    }

    /// Selected row.
    pub fn selection_style(&self) -> Style {
        Style::default()
            .bg(self.selection)
            .add_modifier(Modifier::BOLD)
    }

    /// Author names.
    pub fn author_style(&self) -> Style {
        Style::default()
            .fg(self.author)
            .add_modifier(Modifier::BOLD)
    }

    /// Timestamps and hints.
    pub fn dim_style(&self) -> Style {
        Style::default().fg(self.dim)
    }

    /// Mentions.
    pub fn mention_style(&self) -> Style {
        Style::default()
            .fg(self.mention)
            .add_modifier(Modifier::BOLD)
    }

    /// Thread and reaction markers.
    pub fn accent_style(&self) -> Style {
        Style::default().fg(self.accent)
    }

    /// Status bar.
    pub fn status_style(&self) -> Style {
        Style::default().bg(self.status_bg).fg(self.foreground)
    }

    /// Errors.
    pub fn error_style(&self) -> Style {
        Style::default()
            .fg(self.error)
            .add_modifier(Modifier::BOLD)
    }

    /// Warnings.
    pub fn warning_style(&self) -> Style {
        Style::default().fg(self.warning)
    }

    /// Confirmations.
    pub fn success_style(&self) -> Style {
        Style::default().fg(self.success)
    }
}

/// Names accepted by [`Theme::from_name`].
pub fn available_themes() -> Vec<&'static str> {
    vec!["dark", "light", "high-contrast"]
}
