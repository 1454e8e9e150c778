//! The session state machine.
//!
//! [`Session`] owns every piece of interactive state and advances by one
//! [`AppEvent`] at a time. It never blocks on the network for view data:
//! fetches and writes are [`Task`]s whose results come back as events and
//! are checked for relevance before they are applied. Shell commands are
//! the exception and run inline, the way a shell waits for its command.

use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::debug;

use super::events::{is_interrupt, AppEvent, KeyBindings};
use super::tasks::{Task, TaskOutcome, TaskResult, TaskRunner};
use super::view::{Compose, ComposeTarget, ConversationView, Members, ViewSnapshot};
use crate::api::realtime::{IncomingMessage, RealtimeEvent, RealtimeSource};
use crate::model::{Conversation, ConversationKind, Message};
use crate::notify::{Coordinator, PanelEntry};
use crate::shell::parser::{tokenize, VERBS};
use crate::shell::{Executor, Outcome, Transition, ViewMode};

/// Messages per page in the conversation view.
pub const PAGE_LIMIT: usize = 50;

/// Rows taken by header, status and input around the message list.
const CHROME_ROWS: u16 = 6;

/// The active mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Command line.
    Shell,
    /// Browse or live view of the current conversation.
    Conversation,
    /// Read-only detour into another conversation.
    Peek,
    /// Notification list over the suspended view.
    NotifyPanel,
}

/// Notification panel state.
#[derive(Debug, Clone)]
pub struct Panel {
    /// Entries at the time the panel opened.
    pub entries: Vec<PanelEntry>,
    /// Highlighted entry.
    pub selected: usize,
    /// Mode to return to on close.
    pub return_to: Mode,
}

#[derive(Debug, Clone)]
struct Completion {
    original: String,
    candidates: Vec<String>,
    index: usize,
}

/// Command-line state.
#[derive(Debug, Default)]
pub struct ShellState {
    /// Printed lines.
    pub scrollback: Vec<String>,
    /// Current input.
    pub input: String,
    /// Submitted commands, oldest first.
    pub history: Vec<String>,
    history_index: Option<usize>,
    completion: Option<Completion>,
}

impl ShellState {
    /// Append a block of output.
    pub fn print(&mut self, text: &str) {
        self.scrollback
            .extend(text.trim_end_matches('\n').lines().map(str::to_string));
    }

    fn remember(&mut self, line: &str) {
        self.history.push(line.to_string());
        self.history_index = None;
    }

    fn history_prev(&mut self) {
        if self.history.is_empty() {
            return;
        }
        let index = match self.history_index {
            Some(i) => i.saturating_sub(1),
            None => self.history.len() - 1,
        };
        self.history_index = Some(index);
        self.input = self.history[index].clone();
    }

    fn history_next(&mut self) {
        let Some(i) = self.history_index else {
            return;
        };
        if i + 1 < self.history.len() {
            self.history_index = Some(i + 1);
            self.input = self.history[i + 1].clone();
        } else {
            self.history_index = None;
            self.input.clear();
        }
    }
}

enum ViewAction {
    Stay,
    Leave,
    OpenPanel,
}

/// All interactive state.
pub struct Session {
    executor: Executor,
    coordinator: Arc<Coordinator>,
    tasks: TaskRunner,
    realtime: Option<Arc<dyn RealtimeSource>>,
    bindings: KeyBindings,
    mode: Mode,
    view: Option<ConversationView>,
    peek: Option<ViewSnapshot>,
    panel: Option<Panel>,
    shell: ShellState,
    page_size: usize,
    connected: bool,
    switched: bool,
    exit: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("mode", &self.mode)
            .field("view", &self.view.as_ref().map(ConversationView::id))
            .field("peek", &self.peek.as_ref().map(ViewSnapshot::conversation_id))
            .field("connected", &self.connected)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// A session at the command line.
    pub fn new(executor: Executor, coordinator: Arc<Coordinator>, tasks: TaskRunner) -> Self {
        Self {
            executor,
            coordinator,
            tasks,
            realtime: None,
            bindings: KeyBindings::default(),
            mode: Mode::Shell,
            view: None,
            peek: None,
            panel: None,
            shell: ShellState::default(),
            page_size: 20,
            connected: false,
            switched: false,
            exit: false,
        }
    }

    /// Attach or detach the realtime source.
    pub fn set_realtime(&mut self, source: Option<Arc<dyn RealtimeSource>>) {
        self.executor.set_realtime_available(source.is_some());
        self.realtime = source;
        self.connected = false;
        self.sync_focus();
    }

    /// Print the greeting and run the configured startup commands.
    pub async fn start(&mut self) {
        let startup = self.executor.config().startup.clone();
        for line in startup.greeting(self.executor.workspace_name()) {
            self.shell.scrollback.push(line);
        }
        self.shell
            .scrollback
            .push("Type 'help' for available commands.".to_string());
        self.shell.scrollback.push(String::new());

        for command in &startup.init_commands {
            self.submit_line(command).await;
            if self.exit || self.mode != Mode::Shell {
                break;
            }
        }
    }

    /// Active mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The visible conversation view.
    pub fn view(&self) -> Option<&ConversationView> {
        self.view.as_ref()
    }

    /// The view suspended by peek.
    pub fn peek_snapshot(&self) -> Option<&ViewSnapshot> {
        self.peek.as_ref()
    }

    /// Open notification panel.
    pub fn panel(&self) -> Option<&Panel> {
        self.panel.as_ref()
    }

    /// Command-line state.
    pub fn shell(&self) -> &ShellState {
        &self.shell
    }

    /// The executor.
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// The notification coordinator.
    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Current prompt.
    pub fn prompt(&self) -> String {
        self.executor.prompt()
    }

    /// Whether the realtime source reported a live connection.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether the session should end.
    pub fn should_exit(&self) -> bool {
        self.exit
    }

    /// Whether `source` switched workspaces since the last call.
    pub fn take_switched(&mut self) -> bool {
        std::mem::take(&mut self.switched)
    }

    /// Name of a user from the cache, or the ID.
    pub fn user_name(&self, id: &str) -> String {
        self.executor.user_name(id)
    }

    /// Process one event.
    pub async fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Key(key) => self.handle_key(key).await,
            AppEvent::Tick => {}
            AppEvent::Resize(_, height) => self.resize(height),
            AppEvent::Task(result) => self.apply_task(result),
            AppEvent::Realtime(event) => self.handle_realtime(event).await,
        }
    }

    fn resize(&mut self, height: u16) {
        self.page_size = usize::from(height.saturating_sub(CHROME_ROWS).max(1));
        if let Some(view) = &mut self.view {
            view.set_page_size(self.page_size);
        }
    }

    /// Process one key press.
    pub async fn handle_key(&mut self, key: KeyEvent) {
        if is_interrupt(&key) {
            self.exit = true;
            return;
        }
        match self.mode {
            Mode::Shell => self.shell_key(key).await,
            Mode::Conversation | Mode::Peek => self.view_key(key),
            Mode::NotifyPanel => self.panel_key(key),
        }
    }

    async fn shell_key(&mut self, key: KeyEvent) {
        if key.code != KeyCode::Tab {
            self.shell.completion = None;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        match key.code {
            KeyCode::Enter => {
                let line = std::mem::take(&mut self.shell.input);
                self.shell.history_index = None;
                self.submit_line(&line).await;
            }
            KeyCode::Tab => self.complete().await,
            KeyCode::Up => self.shell.history_prev(),
            KeyCode::Down => self.shell.history_next(),
            KeyCode::Backspace => {
                self.shell.input.pop();
            }
            KeyCode::Esc => self.shell.input.clear(),
            KeyCode::Char('l') if ctrl => self.shell.scrollback.clear(),
            KeyCode::Char(c) if !ctrl => self.shell.input.push(c),
            _ => {}
        }
    }

    /// Run a command line as if typed at the prompt.
    pub async fn submit_line(&mut self, line: &str) {
        let input = line.trim();
        let echo = format!("{}{}", self.executor.prompt(), input);
        self.shell.scrollback.push(echo);
        if input.is_empty() {
            return;
        }

        self.shell.remember(input);
        let outcome = self.executor.execute_line(input).await;
        self.apply_outcome(outcome);
    }

    fn apply_outcome(&mut self, outcome: Outcome) {
        if outcome.exit {
            self.exit = true;
            return;
        }
        if let Some(error) = &outcome.error {
            self.shell.print(&format!("Error: {error}"));
        } else if !outcome.output.is_empty() {
            self.shell.print(&outcome.output);
        }

        if outcome.switched {
            self.coordinator.reset();
            self.view = None;
            self.peek = None;
            self.panel = None;
            self.mode = Mode::Shell;
            self.switched = true;
        }
        if let Some(id) = &outcome.entered {
            self.coordinator.clear_unread(id);
        }
        if let Some(Transition::EnterView {
            mode,
            conversation,
            title,
        }) = outcome.transition
        {
            self.open_view(mode, conversation, title);
        }
        self.sync_focus();
    }

    async fn complete(&mut self) {
        if let Some(completion) = &mut self.shell.completion {
            if completion.candidates.len() > 1 {
                completion.index = (completion.index + 1) % completion.candidates.len();
                let candidate = &completion.candidates[completion.index];
                self.shell.input = completion_line(&completion.original, candidate);
            }
            return;
        }

        let original = self.shell.input.clone();
        let tokens = tokenize(&original);
        let completing_verb = tokens.len() <= 1 && !original.ends_with(' ');

        let candidates: Vec<String> = if completing_verb {
            let prefix = tokens.first().map(|t| t.to_lowercase()).unwrap_or_default();
            VERBS
                .iter()
                .filter(|v| v.starts_with(&prefix))
                .map(|v| (*v).to_string())
                .collect()
        } else {
            let prefix = if original.ends_with(' ') {
                String::new()
            } else {
                tokens.last().cloned().unwrap_or_default()
            };
            self.executor.complete_target(&prefix).await
        };

        if let Some(first) = candidates.first() {
            self.shell.input = completion_line(&original, first);
            self.shell.completion = Some(Completion {
                original,
                candidates,
                index: 0,
            });
        }
    }

    fn open_view(&mut self, mode: ViewMode, conversation: Conversation, title: String) {
        let mut view = ConversationView::new(conversation, title, mode);
        view.set_page_size(self.page_size);
        self.coordinator.clear_unread(view.id());
        self.spawn(view.id(), Task::LoadMessages { limit: PAGE_LIMIT });
        self.view = Some(view);
        self.peek = None;
        self.mode = Mode::Conversation;
        self.sync_focus();
    }

    fn leave_view(&mut self) {
        let Some(view) = self.view.take() else {
            self.mode = Mode::Shell;
            return;
        };
        self.peek = None;
        self.mode = Mode::Shell;
        let label = match view.mode {
            ViewMode::Live => "Exited live mode.",
            ViewMode::Browse => "Exited browse mode.",
        };
        self.shell.scrollback.push(label.to_string());
        self.sync_focus();
    }

    fn spawn(&self, conversation: &str, task: Task) {
        self.tasks
            .spawn(self.executor.task_context(), conversation.to_string(), task);
    }

    /// Conversation the realtime source should watch first.
    fn sync_focus(&self) {
        if let Some(source) = &self.realtime {
            let focused = self
                .view
                .as_ref()
                .map(|v| v.id().to_string())
                .or_else(|| self.executor.current().map(|c| c.id.clone()));
            source.focus(focused.as_deref());
        }
    }

    fn view_key(&mut self, key: KeyEvent) {
        let read_only = self.mode == Mode::Peek;
        let ctx = self.executor.task_context();
        let me = ctx.user_id.clone();
        let tasks = &self.tasks;
        let bindings = &self.bindings;
        let Some(view) = self.view.as_mut() else {
            self.mode = Mode::Shell;
            return;
        };
        let id = view.id().to_string();
        let live = view.mode == ViewMode::Live && !read_only;

        if view.compose.is_some() {
            compose_key(view, key, |task| tasks.spawn(ctx.clone(), id.clone(), task));
            return;
        }

        if let Some(ts) = view.confirm_delete.take() {
            if matches!(key.code, KeyCode::Char('y' | 'Y')) {
                view.status = Some("Deleting...".to_string());
                tasks.spawn(ctx, id, Task::Delete { ts });
            } else {
                view.status = Some("Delete cancelled.".to_string());
            }
            return;
        }
        view.status = None;

        let action = if bindings.is_back(&key) {
            if view.thread.take().is_some() {
                ViewAction::Stay
            } else {
                ViewAction::Leave
            }
        } else if bindings.is_up(&key) {
            if let Some(before) = view.move_up() {
                view.status = Some("Loading older messages...".to_string());
                tasks.spawn(ctx, id, Task::LoadOlder { before, limit: PAGE_LIMIT });
            }
            ViewAction::Stay
        } else if bindings.is_down(&key) {
            view.move_down();
            ViewAction::Stay
        } else if bindings.is_select(&key) {
            if view.thread.is_none() {
                if let Some(root_ts) = view.open_thread() {
                    tasks.spawn(ctx, id, Task::LoadThread { root_ts });
                }
            }
            ViewAction::Stay
        } else if bindings.is_reply(&key) && !read_only {
            if let Some(thread_ts) = view.reply_target() {
                view.compose = Some(Compose::new(ComposeTarget::Reply { thread_ts }));
            }
            ViewAction::Stay
        } else if bindings.is_compose(&key) && live {
            view.compose = Some(Compose::new(ComposeTarget::New));
            ViewAction::Stay
        } else if bindings.is_edit(&key) && live {
            match view.focused_message() {
                Some(message) if message.user == me => {
                    let target = ComposeTarget::Edit {
                        ts: message.ts.clone(),
                    };
                    view.compose = Some(Compose::with_text(target, &message.text));
                }
                Some(_) => view.status = Some("You can only edit your own messages.".to_string()),
                None => {}
            }
            ViewAction::Stay
        } else if bindings.is_delete(&key) && live {
            match view.focused_message() {
                Some(message) if message.user == me => {
                    view.confirm_delete = Some(message.ts.clone());
                    view.status = Some("Delete this message? (y/n)".to_string());
                }
                Some(_) => view.status = Some("You can only delete your own messages.".to_string()),
                None => {}
            }
            ViewAction::Stay
        } else if bindings.is_reload(&key) {
            view.loading = true;
            if let Some(thread) = &view.thread {
                let root_ts = thread.root_ts.clone();
                tasks.spawn(ctx.clone(), id.clone(), Task::LoadThread { root_ts });
            }
            tasks.spawn(ctx, id, Task::LoadMessages { limit: PAGE_LIMIT });
            ViewAction::Stay
        } else if bindings.is_notifications(&key) && (live || read_only) {
            ViewAction::OpenPanel
        } else {
            ViewAction::Stay
        };

        match action {
            ViewAction::Stay => {}
            ViewAction::Leave if self.mode == Mode::Peek => self.exit_peek(),
            ViewAction::Leave => self.leave_view(),
            ViewAction::OpenPanel => self.open_panel(),
        }
    }

    fn open_panel(&mut self) {
        self.panel = Some(Panel {
            entries: self.coordinator.panel_entries(),
            selected: 0,
            return_to: self.mode,
        });
        self.mode = Mode::NotifyPanel;
    }

    fn close_panel(&mut self) {
        if let Some(panel) = self.panel.take() {
            self.mode = panel.return_to;
        }
    }

    fn panel_key(&mut self, key: KeyEvent) {
        let Some(panel) = self.panel.as_mut() else {
            self.mode = Mode::Shell;
            return;
        };

        let chosen = match key.code {
            KeyCode::Char('j') | KeyCode::Down => {
                if panel.selected + 1 < panel.entries.len() {
                    panel.selected += 1;
                }
                None
            }
            KeyCode::Char('k') | KeyCode::Up => {
                panel.selected = panel.selected.saturating_sub(1);
                None
            }
            KeyCode::Enter => panel.entries.get(panel.selected).cloned(),
            KeyCode::Char(c @ '1'..='9') => {
                let index = c as usize - '1' as usize;
                panel.entries.get(index).cloned()
            }
            KeyCode::Esc | KeyCode::Char('q') => {
                self.close_panel();
                return;
            }
            _ => None,
        };

        if let Some(entry) = chosen {
            self.close_panel();
            self.coordinator.clear_unread(&entry.channel_id);
            self.peek_into(&entry);
        }
    }

    /// Suspend the current view and show `entry`'s conversation read-only.
    fn peek_into(&mut self, entry: &PanelEntry) {
        let id = entry.channel_id.as_str();

        if self.view.as_ref().is_some_and(|v| v.id() == id) {
            return;
        }
        if self.peek.as_ref().is_some_and(|s| s.conversation_id() == id) {
            self.exit_peek();
            return;
        }

        let conversation = self.executor.conversation(id).unwrap_or_else(|| {
            let mut conversation = Conversation::channel(id, entry.channel_name.clone());
            if entry.is_dm {
                conversation.kind = ConversationKind::DirectMessage;
            }
            conversation
        });
        let title = if entry.channel_name.is_empty() {
            self.executor.conversation_title(&conversation)
        } else {
            entry.channel_name.clone()
        };

        // Only one level: peeking from a peek replaces the detour, not the origin
        if let Some(current) = self.view.take() {
            if self.peek.is_none() {
                self.peek = Some(current.snapshot());
            }
        }

        let mut view = ConversationView::new(conversation, title, ViewMode::Browse);
        view.set_page_size(self.page_size);
        self.spawn(view.id(), Task::LoadMessages { limit: PAGE_LIMIT });
        self.view = Some(view);
        self.mode = Mode::Peek;
        self.sync_focus();
    }

    fn exit_peek(&mut self) {
        match self.peek.take() {
            Some(snapshot) => {
                self.view = Some(snapshot.restore());
                self.mode = Mode::Conversation;
            }
            None => {
                self.view = None;
                self.mode = Mode::Shell;
            }
        }
        self.sync_focus();
    }

    fn apply_task(&mut self, result: TaskResult) {
        if result.generation != self.executor.generation() {
            debug!(
                conversation = %result.conversation,
                generation = result.generation,
                "Discarding result from an earlier workspace"
            );
            return;
        }

        let ctx = self.executor.task_context();
        let me = ctx.user_id.clone();
        let connected = self.connected;
        let tasks = &self.tasks;
        let Some(view) = view_for(&mut self.view, &mut self.peek, &result.conversation) else {
            debug!(conversation = %result.conversation, "Discarding result for a conversation not in view");
            return;
        };
        let id = result.conversation;

        match result.outcome {
            TaskOutcome::Messages(Ok(page)) => view.replace(page.messages, page.has_more),
            TaskOutcome::OlderPage(Ok(page)) => {
                view.prepend(page.messages, page.has_more);
            }
            TaskOutcome::Thread {
                root_ts,
                result: Ok(messages),
            } => {
                view.set_thread(&root_ts, messages);
            }
            TaskOutcome::Thread {
                root_ts,
                result: Err(e),
            } => {
                if view.thread.as_ref().is_some_and(|t| t.root_ts == root_ts) {
                    view.thread = None;
                }
                view.status = Some(format!("Error: {e}"));
            }
            TaskOutcome::Members(Ok(names)) => {
                if let Some(compose) = &mut view.compose {
                    compose.refresh_mention(&names);
                }
                view.members = Members::Loaded(names);
            }
            TaskOutcome::Sent {
                thread_ts,
                text,
                result: Ok(ts),
            } => {
                view.status = Some("Message sent.".to_string());
                match thread_ts {
                    Some(root_ts) => {
                        let open = view.thread.as_ref().is_some_and(|t| t.root_ts == root_ts);
                        if open {
                            tasks.spawn(ctx, id, Task::LoadThread { root_ts });
                        } else if !connected {
                            view.add_reply(Message::new(ts, me, text).in_thread(root_ts));
                        }
                    }
                    None => {
                        view.append(Message::new(ts, me, text));
                    }
                }
            }
            TaskOutcome::Edited {
                ts,
                text,
                result: Ok(()),
            } => {
                view.patch_text(&ts, &text);
                view.status = Some("Message edited.".to_string());
            }
            TaskOutcome::Deleted { ts, result: Ok(()) } => {
                view.remove(&ts);
                view.status = Some("Message deleted.".to_string());
            }
            TaskOutcome::Messages(Err(e)) => {
                view.loading = false;
                view.status = Some(format!("Error: {e}"));
            }
            TaskOutcome::OlderPage(Err(e)) => {
                view.loading_older = false;
                view.status = Some(format!("Error: {e}"));
            }
            TaskOutcome::Members(Err(e)) => {
                view.members = Members::NotLoaded;
                view.status = Some(format!("Error: {e}"));
            }
            TaskOutcome::Sent { result: Err(e), .. }
            | TaskOutcome::Edited { result: Err(e), .. }
            | TaskOutcome::Deleted { result: Err(e), .. } => {
                view.status = Some(format!("Error: {e}"));
            }
        }
    }

    async fn handle_realtime(&mut self, event: RealtimeEvent) {
        match event {
            RealtimeEvent::Connected => {
                debug!("Realtime connected");
                self.connected = true;
            }
            RealtimeEvent::Disconnected => {
                debug!("Realtime disconnected");
                self.connected = false;
            }
            RealtimeEvent::MessageReceived(message) => self.on_message(message).await,
        }
    }

    async fn on_message(&mut self, incoming: IncomingMessage) {
        if let Some(view) = view_for(&mut self.view, &mut self.peek, &incoming.channel_id) {
            let mut message = Message::new(
                incoming.ts.clone(),
                incoming.user_id.clone(),
                incoming.text.clone(),
            );
            if incoming.is_reply() {
                if let Some(root) = &incoming.thread_ts {
                    message = message.in_thread(root.clone());
                }
                view.add_reply(message);
            } else {
                view.append(message);
            }
        }

        if self.executor.is_own(&incoming.user_id) {
            return;
        }

        let notification = self.executor.notification_for(&incoming).await;
        let current = self.executor.current().map(|c| c.id.clone());
        let streaming = self.view.is_some();
        let outcome = self
            .coordinator
            .handle_message(&notification, current.as_deref(), streaming);
        debug!(conversation = %incoming.channel_id, ?outcome, "Incoming message");
    }
}

/// The shown view for `id`, or the view suspended under a peek.
fn view_for<'a>(
    view: &'a mut Option<ConversationView>,
    peek: &'a mut Option<ViewSnapshot>,
    id: &str,
) -> Option<&'a mut ConversationView> {
    if let Some(view) = view.as_mut().filter(|v| v.id() == id) {
        return Some(view);
    }
    peek.as_mut()
        .map(ViewSnapshot::view_mut)
        .filter(|v| v.id() == id)
}

fn completion_line(original: &str, candidate: &str) -> String {
    let trimmed = original.trim_end();
    match trimmed.rsplit_once(' ') {
        Some((head, _)) if !original.ends_with(' ') => format!("{head} {candidate}"),
        _ if original.ends_with(' ') || trimmed.contains(' ') => {
            format!("{} {candidate}", trimmed)
        }
        _ => candidate.to_string(),
    }
}

/// Keys while a compose buffer is open.
fn compose_key(view: &mut ConversationView, key: KeyEvent, spawn: impl Fn(Task)) {
    let Some(compose) = view.compose.as_mut() else {
        return;
    };

    let mut edited = false;
    match key.code {
        KeyCode::Esc => {
            if compose.mention.take().is_none() {
                view.compose = None;
            }
            return;
        }
        KeyCode::Enter | KeyCode::Tab if compose.has_candidates() => {
            compose.accept_mention();
            return;
        }
        KeyCode::Tab => {
            edited = true;
        }
        KeyCode::Enter => {
            let text = compose.buffer.trim().to_string();
            if text.is_empty() {
                return;
            }
            let task = match &compose.target {
                ComposeTarget::New => Task::Post { text },
                ComposeTarget::Reply { thread_ts } => Task::Reply {
                    root_ts: thread_ts.clone(),
                    text,
                },
                ComposeTarget::Edit { ts } => Task::Edit {
                    ts: ts.clone(),
                    text,
                },
            };
            view.compose = None;
            view.status = Some("Sending...".to_string());
            spawn(task);
            return;
        }
        KeyCode::Up if compose.mention.is_some() => compose.cycle_mention(false),
        KeyCode::Down if compose.mention.is_some() => compose.cycle_mention(true),
        KeyCode::Left => compose.left(),
        KeyCode::Right => compose.right(),
        KeyCode::Backspace => {
            compose.backspace();
            edited = true;
        }
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            compose.insert(c);
            edited = true;
        }
        _ => {}
    }

    if !edited {
        return;
    }
    if compose.mention_query().is_none() {
        compose.mention = None;
        return;
    }
    match &view.members {
        Members::Loaded(names) => compose.refresh_mention(names),
        Members::Loading => {}
        Members::NotLoaded => {
            view.members = Members::Loading;
            spawn(Task::LoadMembers);
        }
    }
}
