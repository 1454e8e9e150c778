//! Session state machine tests against the in-memory workspace.
//!
//! Background tasks run on the test runtime; `pump` feeds their results
//! back into the session the way the event loop does.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc::UnboundedReceiver;

use slack_shell::api::memory::MemoryRealtime;
use slack_shell::api::realtime::{IncomingMessage, RealtimeEvent};
use slack_shell::api::{MemoryWorkspace, SlackApi};
use slack_shell::cache::WorkspaceCaches;
use slack_shell::config::Config;
use slack_shell::model::{Identity, MessagePage};
use slack_shell::notify::{CapturingBackend, Coordinator, Effect};
use slack_shell::shell::{Connector, Executor};
use slack_shell::tui::events::{self, AppEvent};
use slack_shell::tui::{Members, Mode, Session, TaskOutcome, TaskResult, TaskRunner};
use slack_shell::Result;

/// Hands out a second workspace for `source`.
struct SecondWorkspace(Arc<MemoryWorkspace>);

#[async_trait]
impl Connector for SecondWorkspace {
    async fn connect(&self, _token: &str) -> Result<Arc<dyn SlackApi>> {
        Ok(self.0.clone())
    }
}

struct Harness {
    session: Session,
    rx: UnboundedReceiver<AppEvent>,
    workspace: Arc<MemoryWorkspace>,
    backend: Arc<CapturingBackend>,
    other: Arc<MemoryWorkspace>,
}

fn harness_with(workspace: Arc<MemoryWorkspace>) -> Harness {
    let other = Arc::new(MemoryWorkspace::new(Identity {
        user_id: "U900".to_string(),
        team_id: "T900".to_string(),
        team_name: "other".to_string(),
    }));
    let identity = workspace.identity().clone();
    let executor = Executor::new(
        workspace.clone(),
        identity,
        Config::default(),
        WorkspaceCaches::in_memory("T000"),
        Arc::new(SecondWorkspace(other.clone())),
    );

    let backend = Arc::new(CapturingBackend::default());
    let coordinator = Arc::new(Coordinator::new(Default::default(), backend.clone()));
    let (tx, rx) = events::channel();
    let session = Session::new(executor, coordinator, TaskRunner::new(tx));

    Harness {
        session,
        rx,
        workspace,
        backend,
        other,
    }
}

fn harness() -> Harness {
    harness_with(MemoryWorkspace::demo())
}

impl Harness {
    fn enable_realtime(&mut self) {
        let source = Arc::new(MemoryRealtime::new(self.workspace.clone()));
        self.session.set_realtime(Some(source));
    }

    /// Apply the next queued event.
    async fn pump(&mut self) {
        let event = tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event queue closed");
        self.session.handle_event(event).await;
    }

    async fn press(&mut self, code: KeyCode) {
        self.session
            .handle_key(KeyEvent::new(code, KeyModifiers::NONE))
            .await;
    }

    async fn char(&mut self, c: char) {
        self.press(KeyCode::Char(c)).await;
    }

    async fn type_text(&mut self, text: &str) {
        for c in text.chars() {
            self.char(c).await;
        }
    }

    /// `cd` into `target` and open a view, waiting for the first page.
    async fn open(&mut self, target: &str, verb: &str) {
        self.session.submit_line(&format!("cd {target}")).await;
        self.session.submit_line(verb).await;
        assert_eq!(self.session.mode(), Mode::Conversation);
        self.pump().await;
    }

    async fn push(&mut self, channel: &str, user: &str, text: &str) {
        let message = IncomingMessage {
            channel_id: channel.to_string(),
            user_id: user.to_string(),
            text: text.to_string(),
            ts: format!("1800000000.{:06}", text.len()),
            thread_ts: None,
        };
        self.session
            .handle_event(AppEvent::Realtime(RealtimeEvent::MessageReceived(message)))
            .await;
    }

    fn texts(&self) -> Vec<String> {
        self.session
            .view()
            .map(|v| v.messages.iter().map(|m| m.text.clone()).collect())
            .unwrap_or_default()
    }

    fn status(&self) -> Option<String> {
        self.session.view().and_then(|v| v.status.clone())
    }
}

mod shell {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_start_prints_greeting() {
        let mut h = harness();
        h.session.start().await;
        let scrollback = &h.session.shell().scrollback;
        assert_eq!(scrollback[0], "Welcome to Slack Shell - demo");
        assert_eq!(scrollback[1], "Type 'help' for available commands.");
    }

    #[tokio::test]
    async fn test_typed_command_is_echoed_and_run() {
        let mut h = harness();
        h.type_text("cd #general").await;
        h.press(KeyCode::Enter).await;

        let scrollback = &h.session.shell().scrollback;
        assert!(scrollback.contains(&"demo> cd #general".to_string()));
        assert!(scrollback.contains(&"Entered #general".to_string()));
        assert_eq!(h.session.prompt(), "demo #general> ");
        assert_eq!(h.session.shell().history, vec!["cd #general"]);
    }

    #[tokio::test]
    async fn test_errors_are_printed_inline() {
        let mut h = harness();
        h.session.submit_line("cd #nowhere").await;
        assert_eq!(h.session.mode(), Mode::Shell);
        assert_eq!(
            h.session.shell().scrollback.last().map(String::as_str),
            Some("Error: channel not found: nowhere")
        );
    }

    #[tokio::test]
    async fn test_tab_completes_verbs_and_targets() {
        let mut h = harness();
        h.type_text("pw").await;
        h.press(KeyCode::Tab).await;
        assert_eq!(h.session.shell().input, "pwd");

        h.press(KeyCode::Esc).await;
        h.type_text("cd #dev").await;
        h.press(KeyCode::Tab).await;
        assert_eq!(h.session.shell().input, "cd #dev-backend");
        h.press(KeyCode::Tab).await;
        assert_eq!(h.session.shell().input, "cd #dev-frontend");
        h.press(KeyCode::Tab).await;
        assert_eq!(h.session.shell().input, "cd #dev-backend");
    }

    #[tokio::test]
    async fn test_live_requires_realtime() {
        let mut h = harness();
        h.session.submit_line("cd #general").await;
        h.session.submit_line("live").await;
        assert_eq!(h.session.mode(), Mode::Shell);
        assert_eq!(
            h.session.shell().scrollback.last().map(String::as_str),
            Some("Real-time connection not available. Set SLACK_APP_TOKEN to enable.")
        );
    }

    #[tokio::test]
    async fn test_interrupt_exits_from_any_mode() {
        let mut h = harness();
        h.open("#general", "browse").await;
        h.session
            .handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL))
            .await;
        assert!(h.session.should_exit());
    }

    #[tokio::test]
    async fn test_exit_command() {
        let mut h = harness();
        h.session.submit_line("exit").await;
        assert!(h.session.should_exit());
    }
}

mod view {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_browse_loads_newest_page() {
        let mut h = harness();
        h.open("#general", "browse").await;

        assert_eq!(
            h.texts(),
            vec![
                "Good morning everyone",
                "Who broke the build?",
                "Release 1.2 is out :rocket:"
            ]
        );
        let view = h.session.view().unwrap();
        assert_eq!(view.selected, 2);
        assert!(!view.has_more);
        assert!(!view.loading);
    }

    #[tokio::test]
    async fn test_thread_open_and_close() {
        let mut h = harness();
        h.open("#general", "browse").await;

        h.char('k').await;
        h.press(KeyCode::Enter).await;
        h.pump().await;

        let thread = h.session.view().unwrap().thread.as_ref().unwrap();
        let texts: Vec<&str> = thread.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "Who broke the build?",
                "Looking into it",
                "Fixed in <#C002>, thanks <@U003>"
            ]
        );

        h.char('q').await;
        assert!(h.session.view().unwrap().thread.is_none());
        assert_eq!(h.session.mode(), Mode::Conversation);

        h.char('q').await;
        assert_eq!(h.session.mode(), Mode::Shell);
        assert!(h.session.view().is_none());
        assert_eq!(
            h.session.shell().scrollback.last().map(String::as_str),
            Some("Exited browse mode.")
        );
    }

    #[tokio::test]
    async fn test_paging_keeps_selection_on_the_same_message() {
        let workspace = MemoryWorkspace::demo();
        for i in 0..60 {
            workspace.post_as("C004", "U001", &format!("message {i}"));
        }
        let mut h = harness_with(workspace);
        h.open("#random", "browse").await;

        let view = h.session.view().unwrap();
        assert_eq!(view.messages.len(), 50);
        assert!(view.has_more);
        assert_eq!(view.messages[0].text, "message 10");

        for _ in 0..49 {
            h.char('k').await;
        }
        assert_eq!(h.session.view().unwrap().selected, 0);

        h.char('k').await;
        assert!(h.session.view().unwrap().loading_older);
        h.pump().await;

        let view = h.session.view().unwrap();
        assert_eq!(view.messages.len(), 60);
        assert!(!view.has_more);
        assert_eq!(view.selected, 10);
        assert_eq!(view.messages[view.selected].text, "message 10");
    }

    #[tokio::test]
    async fn test_compose_posts_and_appends() {
        let mut h = harness();
        h.enable_realtime();
        h.open("#random", "live").await;
        assert!(h.texts().is_empty());

        h.char('i').await;
        h.type_text("hello there").await;
        h.press(KeyCode::Enter).await;
        assert!(h.session.view().unwrap().compose.is_none());
        h.pump().await;

        assert_eq!(h.texts(), vec!["hello there"]);
        assert_eq!(h.status().as_deref(), Some("Message sent."));
        assert_eq!(h.workspace.history("C004").len(), 1);
    }

    #[tokio::test]
    async fn test_edit_and_delete_own_message() {
        let mut h = harness();
        h.enable_realtime();
        h.open("#random", "live").await;
        h.char('i').await;
        h.type_text("typo").await;
        h.press(KeyCode::Enter).await;
        h.pump().await;

        h.char('e').await;
        for _ in 0.."typo".len() {
            h.press(KeyCode::Backspace).await;
        }
        h.type_text("fixed").await;
        h.press(KeyCode::Enter).await;
        h.pump().await;
        assert_eq!(h.texts(), vec!["fixed"]);
        assert_eq!(h.workspace.history("C004")[0].text, "fixed");

        h.char('d').await;
        assert_eq!(h.status().as_deref(), Some("Delete this message? (y/n)"));
        h.char('y').await;
        h.pump().await;
        assert!(h.texts().is_empty());
        assert!(h.workspace.history("C004").is_empty());
    }

    #[tokio::test]
    async fn test_delete_can_be_cancelled() {
        let mut h = harness();
        h.enable_realtime();
        h.open("#random", "live").await;
        h.char('i').await;
        h.type_text("keep me").await;
        h.press(KeyCode::Enter).await;
        h.pump().await;

        h.char('d').await;
        h.char('n').await;
        assert_eq!(h.status().as_deref(), Some("Delete cancelled."));
        assert_eq!(h.texts(), vec!["keep me"]);
    }

    #[tokio::test]
    async fn test_cannot_edit_others_messages() {
        let mut h = harness();
        h.enable_realtime();
        h.open("#general", "live").await;

        h.char('e').await;
        assert_eq!(h.status().as_deref(), Some("You can only edit your own messages."));
        assert!(h.session.view().unwrap().compose.is_none());

        h.char('d').await;
        assert_eq!(h.status().as_deref(), Some("You can only delete your own messages."));
    }

    #[tokio::test]
    async fn test_browse_is_read_only_for_new_messages() {
        let mut h = harness();
        h.open("#general", "browse").await;
        h.char('i').await;
        assert!(h.session.view().unwrap().compose.is_none());
        h.char('n').await;
        assert_eq!(h.session.mode(), Mode::Conversation);
    }

    #[tokio::test]
    async fn test_mention_completion_loads_members_once() {
        let mut h = harness();
        h.enable_realtime();
        h.open("#random", "live").await;

        h.char('i').await;
        h.type_text("hi @al").await;
        assert_eq!(h.session.view().unwrap().members, Members::Loading);
        h.pump().await;

        let compose = h.session.view().unwrap().compose.as_ref().unwrap();
        let mention = compose.mention.as_ref().unwrap();
        assert_eq!(mention.candidates, vec!["alice", "albert"]);

        h.press(KeyCode::Down).await;
        h.press(KeyCode::Tab).await;
        let compose = h.session.view().unwrap().compose.as_ref().unwrap();
        assert_eq!(compose.buffer, "hi @albert ");

        // A second mention reuses the loaded list
        h.type_text("and @b").await;
        let compose = h.session.view().unwrap().compose.as_ref().unwrap();
        assert_eq!(compose.mention.as_ref().unwrap().candidates, vec!["bob"]);
        let calls = h.workspace.calls();
        assert_eq!(calls.iter().filter(|c| *c == "conversations.members").count(), 1);
    }

    #[tokio::test]
    async fn test_escape_closes_popup_before_compose() {
        let mut h = harness();
        h.enable_realtime();
        h.open("#random", "live").await;
        h.char('i').await;
        h.type_text("@a").await;
        h.pump().await;

        h.press(KeyCode::Esc).await;
        let view = h.session.view().unwrap();
        assert!(view.compose.as_ref().unwrap().mention.is_none());

        h.press(KeyCode::Esc).await;
        assert!(h.session.view().unwrap().compose.is_none());
    }

    #[tokio::test]
    async fn test_failed_task_sets_status() {
        let mut h = harness();
        h.enable_realtime();
        h.open("#random", "live").await;
        h.workspace.fail_next("chat.postMessage", "not_in_channel");

        h.char('i').await;
        h.type_text("hello").await;
        h.press(KeyCode::Enter).await;
        h.pump().await;

        assert_eq!(
            h.status().as_deref(),
            Some("Error: chat.postMessage failed: not_in_channel")
        );
        assert!(h.texts().is_empty());
    }
}

mod relevance {
    use super::*;
    use pretty_assertions::assert_eq;

    fn empty_page(generation: u64, conversation: &str) -> AppEvent {
        AppEvent::Task(TaskResult {
            generation,
            conversation: conversation.to_string(),
            outcome: TaskOutcome::Messages(Ok(MessagePage::default())),
        })
    }

    #[tokio::test]
    async fn test_results_from_older_generation_are_dropped() {
        let mut h = harness();
        h.open("#general", "browse").await;

        h.session.handle_event(empty_page(7, "C001")).await;
        assert_eq!(h.texts().len(), 3);
    }

    #[tokio::test]
    async fn test_results_for_other_conversations_are_dropped() {
        let mut h = harness();
        h.open("#general", "browse").await;

        h.session.handle_event(empty_page(0, "C002")).await;
        assert_eq!(h.texts().len(), 3);
    }

    #[tokio::test]
    async fn test_source_switches_workspace_and_discards_inflight() {
        let mut h = harness();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.toml");
        std::fs::write(&path, "slack_token = \"xoxp-other\"\n\n[cache]\nenabled = false\n").unwrap();

        h.session.submit_line("cd #general").await;
        h.session.submit_line("browse").await;
        // The first page is still in flight when the workspace changes
        h.session
            .submit_line(&format!("source {}", path.display()))
            .await;

        assert!(h.session.take_switched());
        assert!(!h.session.take_switched());
        assert_eq!(h.session.mode(), Mode::Shell);
        assert!(h.session.view().is_none());
        assert_eq!(h.session.prompt(), "other> ");
        assert_eq!(h.session.executor().generation(), 1);
        assert_eq!(
            h.session.shell().scrollback.last().map(String::as_str),
            Some("Switched to workspace: other")
        );

        h.pump().await;
        assert!(h.session.view().is_none());
        assert!(h.other.calls().contains(&"auth.test".to_string()));
    }
}

mod notifications {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_message_elsewhere_is_counted() {
        let mut h = harness();
        h.session.submit_line("cd #general").await;
        h.push("C002", "U001", "deploy done").await;

        let coordinator = h.session.coordinator();
        assert_eq!(coordinator.unread_for("C002"), 1);
        let visual = coordinator.visual();
        assert_eq!(visual.len(), 1);
        assert_eq!(visual[0].visual_line(), "#dev-backend | alice: deploy done");
        assert!(h.backend.effects().contains(&Effect::Bell));
        assert!(h
            .backend
            .effects()
            .contains(&Effect::Title("Slack Shell (1)".to_string())));
    }

    #[tokio::test]
    async fn test_own_messages_are_silent() {
        let mut h = harness();
        h.push("C002", "U000", "my own words").await;
        assert_eq!(h.session.coordinator().total_unread(), 0);
        assert!(h.backend.effects().is_empty());
    }

    #[tokio::test]
    async fn test_current_conversation_in_shell_is_not_counted() {
        let mut h = harness();
        h.session.submit_line("cd #general").await;
        h.push("C001", "U001", "hello general").await;
        assert_eq!(h.session.coordinator().unread_for("C001"), 0);
    }

    #[tokio::test]
    async fn test_live_view_appends_and_counts() {
        let mut h = harness();
        h.enable_realtime();
        h.open("#general", "live").await;
        h.push("C001", "U002", "streamed in").await;

        assert_eq!(h.texts().last().map(String::as_str), Some("streamed in"));
        assert_eq!(h.session.coordinator().unread_for("C001"), 1);
    }

    #[tokio::test]
    async fn test_do_not_disturb_suppresses_everything() {
        let mut h = harness();
        h.session.coordinator().set_dnd(true);
        h.push("C002", "U001", "<!here> standup").await;
        assert_eq!(h.session.coordinator().total_unread(), 0);
        assert!(h.backend.effects().is_empty());
    }

    #[tokio::test]
    async fn test_cd_clears_unread() {
        let mut h = harness();
        h.push("C002", "U001", "deploy done").await;
        assert_eq!(h.session.coordinator().unread_for("C002"), 1);

        h.session.submit_line("cd #dev-backend").await;
        assert_eq!(h.session.coordinator().unread_for("C002"), 0);
    }

    #[tokio::test]
    async fn test_peek_round_trip_restores_view() {
        let mut h = harness();
        h.enable_realtime();
        h.open("#general", "live").await;
        h.char('k').await;
        h.push("C002", "U001", "deploy done").await;

        h.char('n').await;
        assert_eq!(h.session.mode(), Mode::NotifyPanel);
        assert_eq!(h.session.panel().unwrap().entries.len(), 1);

        h.char('1').await;
        assert_eq!(h.session.mode(), Mode::Peek);
        assert_eq!(h.session.view().unwrap().id(), "C002");
        assert_eq!(h.session.peek_snapshot().unwrap().conversation_id(), "C001");
        assert_eq!(h.session.coordinator().unread_for("C002"), 0);

        h.pump().await;
        assert_eq!(h.texts(), vec!["Migrations run at 14:00"]);

        // Peek is read-only
        h.char('i').await;
        assert!(h.session.view().unwrap().compose.is_none());

        h.char('q').await;
        assert_eq!(h.session.mode(), Mode::Conversation);
        let view = h.session.view().unwrap();
        assert_eq!(view.id(), "C001");
        assert_eq!(view.selected, 1);
        assert!(h.session.peek_snapshot().is_none());
    }

    #[tokio::test]
    async fn test_suspended_view_keeps_receiving_while_peeking() {
        let workspace = MemoryWorkspace::demo();
        for i in 0..60 {
            workspace.post_as("C004", "U001", &format!("message {i}"));
        }
        let mut h = harness_with(workspace);
        h.enable_realtime();
        h.open("#random", "live").await;

        for _ in 0..50 {
            h.char('k').await;
        }
        assert!(h.session.view().unwrap().loading_older);

        h.push("C002", "U001", "deploy done").await;
        h.char('n').await;
        h.char('1').await;
        assert_eq!(h.session.mode(), Mode::Peek);

        // Older page for the suspended view and the peek's first page
        h.pump().await;
        h.pump().await;
        h.push("C004", "U002", "while away").await;
        assert_eq!(h.session.view().unwrap().id(), "C002");

        h.char('q').await;
        let view = h.session.view().unwrap();
        assert_eq!(view.id(), "C004");
        assert!(!view.loading_older);
        assert!(!view.has_more);
        assert_eq!(view.messages.len(), 61);
        assert_eq!(view.messages[view.selected].text, "message 10");
        assert_eq!(view.messages.last().unwrap().text, "while away");
    }

    #[tokio::test]
    async fn test_panel_escape_returns_to_view() {
        let mut h = harness();
        h.enable_realtime();
        h.open("#general", "live").await;

        h.char('n').await;
        assert_eq!(h.session.mode(), Mode::NotifyPanel);
        h.press(KeyCode::Esc).await;
        assert_eq!(h.session.mode(), Mode::Conversation);
        assert_eq!(h.session.view().unwrap().id(), "C001");
    }
}
