//! Terminal setup, the event loop and drawing.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame, Terminal,
};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::components::{centered_rect, hint_line, message_lines, panel_line, ScrollableText, StatusBar};
use super::events::{self, forward_realtime, AppEvent, EventHandler};
use super::state::{Mode, Session};
use super::tasks::TaskRunner;
use super::theme::{available_themes, Theme};
use super::view::{ComposeTarget, ConversationView};
use crate::api::memory::MemoryRealtime;
use crate::api::realtime::{HistoryPoller, RealtimeSource};
use crate::api::{HttpSlackApi, MemoryWorkspace, SlackApi};
use crate::cache::WorkspaceCaches;
use crate::config::Config;
use crate::error::{Result, ShellError};
use crate::model::Identity;
use crate::notify::{Coordinator, TerminalBackend};
use crate::shell::{Executor, HttpConnector, ViewMode};

/// Interval between simulated messages in demo mode.
const DEMO_CHATTER: Duration = Duration::from_secs(20);

/// Redraw interval without input.
const TICK_RATE: Duration = Duration::from_millis(250);

/// How the session is started.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Run against the built-in demo workspace.
    pub demo: bool,
    /// Theme override.
    pub theme: Option<String>,
    /// Config file, for error messages.
    pub config_path: Option<PathBuf>,
}

struct Connection {
    api: Arc<dyn SlackApi>,
    identity: Identity,
    realtime: Option<Arc<dyn RealtimeSource>>,
}

/// Connect to the configured workspace (or the demo one).
async fn connect(config: &Config, options: &RunOptions) -> Result<Connection> {
    if options.demo {
        let workspace = MemoryWorkspace::demo();
        let identity = workspace.auth_test().await?;
        let realtime: Option<Arc<dyn RealtimeSource>> = config.realtime.enabled.then(|| {
            Arc::new(MemoryRealtime::new(Arc::clone(&workspace)).with_chatter(DEMO_CHATTER))
                as Arc<dyn RealtimeSource>
        });
        return Ok(Connection {
            api: workspace,
            identity,
            realtime,
        });
    }

    let token = config.token().ok_or_else(|| ShellError::MissingToken {
        path: options.config_path.clone().unwrap_or_default(),
    })?;
    let api: Arc<dyn SlackApi> = Arc::new(HttpSlackApi::new(token)?);
    let identity = api.auth_test().await?;
    info!(team = %identity.team_name, user = %identity.user_id, "Connected");

    let realtime = poller_for(config, &api);
    Ok(Connection {
        api,
        identity,
        realtime,
    })
}

/// A history poller when realtime is configured.
fn poller_for(config: &Config, api: &Arc<dyn SlackApi>) -> Option<Arc<dyn RealtimeSource>> {
    if !config.realtime.enabled || config.app_token.is_none() {
        return None;
    }
    Some(Arc::new(HistoryPoller::new(
        Arc::clone(api),
        config.realtime.poll_interval(),
        config.realtime.max_watched,
    )))
}

/// A running realtime source and its forwarder.
struct RealtimeHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl RealtimeHandle {
    fn start(source: &Arc<dyn RealtimeSource>, tx: &UnboundedSender<AppEvent>) -> Self {
        let cancel = CancellationToken::new();
        let (rt_tx, rt_rx) = mpsc::unbounded_channel();
        let producer = source.spawn(rt_tx, cancel.clone());
        let forwarder = forward_realtime(rt_rx, tx.clone());
        Self {
            cancel,
            tasks: vec![producer, forwarder],
        }
    }

    fn stop(self) {
        self.cancel.cancel();
        for task in self.tasks {
            task.abort();
        }
    }
}

fn resolve_theme(config: &Config, options: &RunOptions) -> Theme {
    let name = options.theme.as_deref().unwrap_or(&config.theme.name);
    Theme::from_name(name).unwrap_or_else(|| {
        warn!(
            "Unknown theme '{name}', using dark (available: {})",
            available_themes().join(", ")
        );
        Theme::dark()
    })
}

/// Connect, take over the terminal and run until the user quits.
pub async fn run(config: Config, options: RunOptions) -> Result<()> {
    let connection = connect(&config, &options).await?;
    let theme = resolve_theme(&config, &options);

    let caches = WorkspaceCaches::open(&config, &connection.identity.team_id);
    let executor = Executor::new(
        connection.api,
        connection.identity,
        config.clone(),
        caches,
        Arc::new(HttpConnector),
    );

    let coordinator = Arc::new(Coordinator::new(
        config.notifications.clone(),
        Arc::new(TerminalBackend),
    ));
    let shutdown = CancellationToken::new();
    let sweeper = coordinator.spawn_sweeper(shutdown.child_token());

    let (tx, rx) = events::channel();
    let mut session = Session::new(executor, Arc::clone(&coordinator), TaskRunner::new(tx.clone()));
    let mut realtime = connection.realtime.map(|source| {
        let handle = RealtimeHandle::start(&source, &tx);
        session.set_realtime(Some(source));
        handle
    });

    // Setup terminal
    enable_raw_mode().map_err(|e| {
        ShellError::io(
            "Cannot start - no interactive terminal available. \
             slack-shell requires a terminal with keyboard input support",
            e,
        )
    })?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)
        .map_err(|e| ShellError::io("Failed to enter alternate screen", e))?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal =
        Terminal::new(backend).map_err(|e| ShellError::io("Failed to create terminal", e))?;

    if let Ok(size) = terminal.size() {
        session.handle_event(AppEvent::Resize(size.width, size.height)).await;
    }
    session.start().await;
    let _input = EventHandler::spawn(tx.clone(), TICK_RATE);

    let result = run_loop(&mut terminal, &mut session, rx, &tx, &mut realtime, &theme).await;

    // Restore terminal
    disable_raw_mode().map_err(|e| ShellError::io("Failed to disable raw mode", e))?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .map_err(|e| ShellError::io("Failed to leave alternate screen", e))?;
    terminal
        .show_cursor()
        .map_err(|e| ShellError::io("Failed to show cursor", e))?;

    if let Some(handle) = realtime.take() {
        handle.stop();
    }
    shutdown.cancel();
    sweeper.abort();
    if let Err(e) = session.executor().save_caches() {
        warn!("Failed to save caches: {e}");
    }

    result
}

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    session: &mut Session,
    mut rx: mpsc::UnboundedReceiver<AppEvent>,
    tx: &UnboundedSender<AppEvent>,
    realtime: &mut Option<RealtimeHandle>,
    theme: &Theme,
) -> Result<()> {
    loop {
        terminal
            .draw(|f| draw_ui(f, session, theme))
            .map_err(|e| ShellError::io("Failed to draw", e))?;

        let Some(event) = rx.recv().await else {
            return Err(ShellError::Shutdown);
        };
        session.handle_event(event).await;

        if session.take_switched() {
            if let Some(handle) = realtime.take() {
                handle.stop();
            }
            let api = session.executor().task_context().api;
            let source = poller_for(session.executor().config(), &api);
            *realtime = source.as_ref().map(|s| RealtimeHandle::start(s, tx));
            session.set_realtime(source);
        }

        if session.should_exit() {
            return Ok(());
        }
    }
}

fn draw_ui(f: &mut Frame, session: &Session, theme: &Theme) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(f.area());

    match session.mode() {
        Mode::Shell => draw_shell(f, session, theme, chunks[0]),
        Mode::Conversation | Mode::Peek | Mode::NotifyPanel => match session.view() {
            Some(view) => draw_view(f, session, view, theme, chunks[0]),
            None => draw_shell(f, session, theme, chunks[0]),
        },
    }
    draw_status_bar(f, session, theme, chunks[1]);

    if session.mode() == Mode::NotifyPanel {
        draw_panel(f, session, theme);
    }
}

fn draw_shell(f: &mut Frame, session: &Session, theme: &Theme, area: Rect) {
    let visual = session.coordinator().visual();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(visual.len() as u16),
            Constraint::Length(1),
        ])
        .split(area);

    let shell = session.shell();
    let rows = usize::from(chunks[0].height);
    let start = shell.scrollback.len().saturating_sub(rows);
    let lines: Vec<Line> = shell.scrollback[start..]
        .iter()
        .map(|l| Line::styled(l.clone(), theme.text_style()))
        .collect();
    f.render_widget(Paragraph::new(lines), chunks[0]);

    let notices: Vec<Line> = visual
        .iter()
        .map(|n| Line::styled(n.visual_line(), theme.mention_style()))
        .collect();
    f.render_widget(Paragraph::new(notices), chunks[1]);

    let prompt = session.prompt();
    let input = Line::from(vec![
        Span::styled(prompt.clone(), theme.prompt_style()),
        Span::styled(shell.input.clone(), theme.text_style()),
    ]);
    f.render_widget(Paragraph::new(input), chunks[2]);

    let column = (prompt.chars().count() + shell.input.chars().count()) as u16;
    f.set_cursor_position((chunks[2].x + column.min(chunks[2].width), chunks[2].y));
}

fn draw_view(f: &mut Frame, session: &Session, view: &ConversationView, theme: &Theme, area: Rect) {
    let names = session.executor().name_lookup();
    let compose_rows = if view.compose.is_some() { 3 } else { 0 };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),
            Constraint::Length(compose_rows),
            Constraint::Length(1),
        ])
        .split(area);

    let label = match (session.mode(), view.mode) {
        (Mode::Peek, _) => "PEEK",
        (_, ViewMode::Live) => "LIVE",
        (_, ViewMode::Browse) => "BROWSE",
    };
    let mut title = format!(" {} [{label}] ", view.title);
    if view.loading || view.loading_older {
        title.push_str("loading... ");
    }

    let (list_area, thread_area) = if view.thread.is_some() {
        let split = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
            .split(chunks[0]);
        (split[0], Some(split[1]))
    } else {
        (chunks[0], None)
    };

    let mut lines = Vec::new();
    if view.has_more && view.scroll == 0 {
        lines.push(Line::styled("  ↑ older messages", theme.dim_style()));
    }
    for (i, message) in view.messages.iter().enumerate().skip(view.scroll) {
        let selected = i == view.selected && view.thread.is_none();
        lines.extend(message_lines(message, &names, theme, selected));
    }
    if view.messages.is_empty() && !view.loading {
        lines.push(Line::styled("No messages.", theme.dim_style()));
    }
    ScrollableText::new(title)
        .content(lines)
        .focused(view.thread.is_none())
        .render(f, list_area, theme);

    if let (Some(thread), Some(area)) = (&view.thread, thread_area) {
        let mut lines = Vec::new();
        for (i, message) in thread.messages.iter().enumerate() {
            lines.extend(message_lines(message, &names, theme, i == thread.selected));
        }
        if thread.loading {
            lines.push(Line::styled("Loading thread...", theme.dim_style()));
        }
        ScrollableText::new(" Thread ")
            .content(lines)
            .focused(true)
            .render(f, area, theme);
    }

    if let Some(compose) = &view.compose {
        let heading = match &compose.target {
            ComposeTarget::New => " Message ",
            ComposeTarget::Reply { .. } => " Reply ",
            ComposeTarget::Edit { .. } => " Edit ",
        };
        let input = Paragraph::new(compose.buffer.clone())
            .block(
                Block::default()
                    .title(heading)
                    .borders(Borders::ALL)
                    .border_style(theme.border_style(true)),
            )
            .wrap(Wrap { trim: false });
        f.render_widget(input, chunks[1]);

        let column = compose.cursor as u16 + 1;
        let x = chunks[1].x + column.min(chunks[1].width.saturating_sub(2));
        f.set_cursor_position((x, chunks[1].y + 1));

        if let Some(mention) = compose.mention.as_ref().filter(|m| !m.candidates.is_empty()) {
            let height = (mention.candidates.len() as u16 + 2).min(chunks[0].height);
            let popup = Rect::new(
                chunks[1].x + 1,
                chunks[1].y.saturating_sub(height),
                30.min(chunks[1].width),
                height,
            );
            let items: Vec<ListItem> = mention
                .candidates
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let style = if i == mention.selected {
                        theme.selection_style()
                    } else {
                        theme.text_style()
                    };
                    ListItem::new(Line::styled(format!("@{name}"), style))
                })
                .collect();
            f.render_widget(Clear, popup);
            let block = Block::default()
                .borders(Borders::ALL)
                .border_style(theme.border_style(true));
            f.render_widget(List::new(items).block(block), popup);
        }
    }

    let footer = match &view.status {
        Some(status) if status.starts_with("Error") => {
            Line::styled(status.clone(), theme.error_style())
        }
        Some(status) => Line::styled(status.clone(), theme.success_style()),
        None if view.compose.is_some() => hint_line(
            &[("Enter", "send"), ("Tab", "@mention"), ("Esc", "cancel")],
            theme,
        ),
        None if session.mode() == Mode::Peek => hint_line(
            &[("j/k", "move"), ("Enter", "thread"), ("n", "notifications"), ("q", "return")],
            theme,
        ),
        None if view.mode == ViewMode::Live => hint_line(
            &[
                ("j/k", "move"),
                ("Enter", "thread"),
                ("r", "reply"),
                ("i", "write"),
                ("e", "edit"),
                ("d", "delete"),
                ("n", "notifications"),
                ("q", "exit"),
            ],
            theme,
        ),
        None => hint_line(
            &[("j/k", "move"), ("Enter", "thread"), ("r", "reply"), ("R", "reload"), ("q", "exit")],
            theme,
        ),
    };
    f.render_widget(Paragraph::new(footer), chunks[2]);
}

fn draw_panel(f: &mut Frame, session: &Session, theme: &Theme) {
    let Some(panel) = session.panel() else {
        return;
    };
    let area = centered_rect(70, 60, f.area());
    f.render_widget(Clear, area);

    let lines: Vec<Line> = if panel.entries.is_empty() {
        vec![Line::styled("No unread notifications.", theme.dim_style())]
    } else {
        panel
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| panel_line(i, entry, theme, i == panel.selected))
            .collect()
    };
    ScrollableText::new(" Notifications (1-9 select, Esc close) ")
        .content(lines)
        .focused(true)
        .render(f, area, theme);
}

fn draw_status_bar(f: &mut Frame, session: &Session, theme: &Theme, area: Rect) {
    let executor = session.executor();
    let mut left = vec![Span::raw(format!(" {} ", executor.workspace_name()))];
    if let Some(current) = executor.current() {
        left.push(Span::raw(format!("| {} ", executor.conversation_title(current))));
    }

    let coordinator = session.coordinator();
    let mut right = Vec::new();
    let unread = coordinator.total_unread();
    if unread > 0 {
        right.push(Span::styled(format!("{unread} unread "), theme.mention_style()));
    }
    if coordinator.is_dnd() {
        right.push(Span::styled("DND ", theme.warning_style()));
    }
    if executor.realtime_available() {
        let (label, style) = if session.is_connected() {
            ("● live ", theme.success_style())
        } else {
            ("○ offline ", theme.dim_style())
        };
        right.push(Span::styled(label, style));
    }

    StatusBar::new().left(left).right(right).render(f, area, theme);
}
