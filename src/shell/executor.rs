//! Command execution against the workspace.
//!
//! The [`Executor`] owns the current location and the lazily loaded
//! conversation lists. It reads through the workspace caches and writes
//! every successful fetch back into them. It is driven from the event loop
//! only; background tasks get a [`TaskContext`] snapshot instead.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::output::{self, grep, help_text};
use super::parser::{Command, Pipeline, Verb};
use crate::api::realtime::IncomingMessage;
use crate::api::{HttpSlackApi, SlackApi};
use crate::cache::{UserCache, WorkspaceCaches};
use crate::config::Config;
use crate::error::{Result, ShellError};
use crate::model::{Conversation, Identity, NameFormat};
use crate::notify::Notification;
use crate::util::expand_path;

/// Default and maximum `cat -n`.
const CAT_DEFAULT: i64 = 20;
const CAT_MAX: i64 = 100;

/// Shown by commands that need an open conversation.
pub const NOT_IN_CHANNEL: &str = "Not in a channel. Use 'cd #channel' first.";

/// Shown by `live` without a realtime source.
pub const NO_REALTIME: &str =
    "Real-time connection not available. Set SLACK_APP_TOKEN to enable.";

/// Which conversation view to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    /// Read-only browsing with thread replies.
    Browse,
    /// Streaming view with compose, edit, delete and notifications.
    Live,
}

/// A mode change requested by a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Open the conversation view on the current conversation.
    EnterView {
        /// View flavor.
        mode: ViewMode,
        /// Conversation to show.
        conversation: Conversation,
        /// Title shown in the view header.
        title: String,
    },
}

/// Result of running a command or pipeline.
#[derive(Debug, Default)]
pub struct Outcome {
    /// Text to print.
    pub output: String,
    /// Error to print; later pipeline stages did not run.
    pub error: Option<ShellError>,
    /// Requested mode change.
    pub transition: Option<Transition>,
    /// The session should end.
    pub exit: bool,
    /// Conversation entered by `cd`, for unread bookkeeping.
    pub entered: Option<String>,
    /// The workspace was switched by `source`.
    pub switched: bool,
}

impl Outcome {
    fn text(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            ..Self::default()
        }
    }

    fn failed(error: ShellError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }
}

/// Builds API clients for `source`.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect with a user token.
    async fn connect(&self, token: &str) -> Result<Arc<dyn SlackApi>>;
}

/// Connects to the real Web API.
#[derive(Debug, Default)]
pub struct HttpConnector;

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(&self, token: &str) -> Result<Arc<dyn SlackApi>> {
        Ok(Arc::new(HttpSlackApi::new(token)?))
    }
}

/// What background tasks need from the session.
#[derive(Clone)]
pub struct TaskContext {
    /// Client of the current workspace.
    pub api: Arc<dyn SlackApi>,
    /// Caches of the current workspace.
    pub caches: WorkspaceCaches,
    /// Name style.
    pub name_format: NameFormat,
    /// Session generation at snapshot time.
    pub generation: u64,
    /// The user's ID.
    pub user_id: String,
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("generation", &self.generation)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

/// Resolve and cache names for users that are unknown or expired.
///
/// Lookup failures are logged; callers fall back to IDs.
pub async fn ensure_users(api: &dyn SlackApi, users: &UserCache, ids: &[String]) {
    let stale = users.stale_ids(ids.iter().map(String::as_str));
    if stale.is_empty() {
        return;
    }
    match api.resolve_users(&stale).await {
        Ok(records) => {
            debug!(requested = stale.len(), resolved = records.len(), "Resolved users");
            users.set_batch(records);
        }
        Err(e) => warn!("User lookup failed: {e}"),
    }
}

/// The `grep` pattern; `-i` is accepted and swallows the pattern as its value.
fn grep_pattern(command: &Command) -> Option<&str> {
    command.arg(0).or_else(|| {
        command
            .flags
            .get("i")
            .map(String::as_str)
            .filter(|v| *v != "true")
    })
}

/// Maps parsed commands onto workspace operations.
pub struct Executor {
    api: Arc<dyn SlackApi>,
    connector: Arc<dyn Connector>,
    identity: Identity,
    config: Config,
    caches: WorkspaceCaches,
    channels: Option<Vec<Conversation>>,
    dms: Option<Vec<Conversation>>,
    current: Option<Conversation>,
    generation: u64,
    realtime_available: bool,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("workspace", &self.identity.team_name)
            .field("current", &self.current.as_ref().map(|c| &c.id))
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl Executor {
    /// Create an executor for a connected workspace.
    pub fn new(
        api: Arc<dyn SlackApi>,
        identity: Identity,
        config: Config,
        caches: WorkspaceCaches,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            api,
            connector,
            identity,
            config,
            caches,
            channels: None,
            dms: None,
            current: None,
            generation: 0,
            realtime_available: false,
        }
    }

    /// Declare whether a realtime source is running.
    pub fn set_realtime_available(&mut self, available: bool) {
        self.realtime_available = available;
    }

    /// Whether a realtime source is running.
    pub fn realtime_available(&self) -> bool {
        self.realtime_available
    }

    /// Bumped on every workspace switch.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Who we are.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Workspace display name.
    pub fn workspace_name(&self) -> &str {
        if self.identity.team_name.is_empty() {
            "slack"
        } else {
            &self.identity.team_name
        }
    }

    /// Current workspace caches.
    pub fn caches(&self) -> &WorkspaceCaches {
        &self.caches
    }

    /// The open conversation, if any.
    pub fn current(&self) -> Option<&Conversation> {
        self.current.as_ref()
    }

    /// Snapshot for background tasks.
    pub fn task_context(&self) -> TaskContext {
        TaskContext {
            api: Arc::clone(&self.api),
            caches: self.caches.clone(),
            name_format: self.config.display.name_format,
            generation: self.generation,
            user_id: self.identity.user_id.clone(),
        }
    }

    /// Parse and run a full input line.
    pub async fn execute_line(&mut self, line: &str) -> Outcome {
        if line.trim().is_empty() {
            return Outcome::default();
        }
        self.execute_pipeline(&Pipeline::parse(line)).await
    }

    /// Run a pipeline: the first stage produces, the rest filter.
    pub async fn execute_pipeline(&mut self, pipeline: &Pipeline) -> Outcome {
        let first = self.execute(pipeline.first()).await;
        if first.error.is_some() || first.exit || pipeline.len() == 1 {
            return first;
        }

        let mut text = first.output;
        for stage in &pipeline.commands[1..] {
            match stage.verb {
                Verb::Grep => text = grep(&text, grep_pattern(stage)),
                _ => {
                    return Outcome::failed(ShellError::Pipeline {
                        verb: stage.verb.name().to_string(),
                    })
                }
            }
        }
        Outcome::text(text)
    }

    /// Run one command.
    pub async fn execute(&mut self, command: &Command) -> Outcome {
        debug!(verb = %command.verb, args = ?command.args, "Executing command");
        match &command.verb {
            Verb::Ls => self.ls(command).await,
            Verb::Cd => self.cd(command).await,
            Verb::Back => self.back(),
            Verb::Cat => self.cat(command).await,
            Verb::Send => self.send(command).await,
            Verb::Pwd => Outcome::text(self.pwd()),
            Verb::Browse => self.enter_view(ViewMode::Browse),
            Verb::Live | Verb::Tail => self.enter_view(ViewMode::Live),
            Verb::Source => self.source(command).await,
            Verb::Help => Outcome::text(help_text()),
            Verb::Version => Outcome::text(format!("slack-shell {}", env!("CARGO_PKG_VERSION"))),
            Verb::Exit => Outcome {
                exit: true,
                ..Outcome::default()
            },
            // Without input to filter, grep has nothing to say
            Verb::Grep => Outcome::text(grep("", grep_pattern(command))),
            Verb::Unknown(word) if word.is_empty() => Outcome::default(),
            Verb::Unknown(_) => Outcome::text("Unknown command. Type 'help' for available commands."),
        }
    }

    async fn ls(&mut self, command: &Command) -> Outcome {
        let dm_only = command.arg(0) == Some("dm");
        let refresh = command.flag_bool("r");

        if !dm_only {
            if let Err(e) = self.load_channels(refresh).await {
                return Outcome::failed(e);
            }
        }
        if let Err(e) = self.load_dms(refresh).await {
            return Outcome::failed(e);
        }

        let names = self.name_lookup();
        let dms = self.dms.as_deref().unwrap_or_default();
        if dm_only {
            return Outcome::text(output::format_dm_list(dms, names));
        }
        let channels = self.channels.as_deref().unwrap_or_default();
        Outcome::text(output::format_channel_list(channels, dms, names))
    }

    async fn cd(&mut self, command: &Command) -> Outcome {
        let Some(target) = command.arg(0) else {
            return Outcome::text("Usage: cd #channel or cd @user");
        };

        if target == ".." {
            return self.back();
        }

        let result = if let Some(name) = target.strip_prefix('#') {
            self.enter_channel(name).await
        } else if let Some(name) = target.strip_prefix('@') {
            self.enter_dm(name).await
        } else {
            match self.enter_channel(target).await {
                Err(ShellError::NotFound { .. }) => self.enter_dm(target).await,
                other => other,
            }
        };

        match result {
            Ok(output) => Outcome {
                output,
                entered: self.current.as_ref().map(|c| c.id.clone()),
                ..Outcome::default()
            },
            Err(e) => Outcome::failed(e),
        }
    }

    async fn enter_channel(&mut self, name: &str) -> Result<String> {
        self.load_channels(false).await?;
        let found = self
            .channels
            .iter()
            .flatten()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| ShellError::not_found("channel", name))?;

        let output = format!("Entered #{}", found.name);
        self.current = Some(found);
        Ok(output)
    }

    async fn enter_dm(&mut self, user: &str) -> Result<String> {
        self.load_dms(false).await?;
        let found = {
            let names = self.name_lookup();
            self.dms
                .iter()
                .flatten()
                .find(|dm| match &dm.user_id {
                    Some(id) => {
                        id.eq_ignore_ascii_case(user)
                            || names(id).is_some_and(|n| n.eq_ignore_ascii_case(user))
                    }
                    None => dm.name.eq_ignore_ascii_case(user),
                })
                .cloned()
        }
        .ok_or_else(|| ShellError::not_found("user", user))?;

        let output = format!("Entered DM with @{}", self.conversation_title(&found));
        self.current = Some(found);
        Ok(output)
    }

    fn back(&mut self) -> Outcome {
        if self.current.take().is_none() {
            Outcome::text("Already at channel list")
        } else {
            Outcome::text("Returned to channel list")
        }
    }

    async fn cat(&mut self, command: &Command) -> Outcome {
        let Some(conversation) = self.current.clone() else {
            return Outcome::text(NOT_IN_CHANNEL);
        };

        let mut limit = command.flag_int("n", CAT_DEFAULT);
        if limit <= 0 {
            limit = CAT_DEFAULT;
        }
        let limit = limit.min(CAT_MAX) as usize;

        let page = match self.api.get_messages(&conversation.id, limit, None).await {
            Ok(page) => page,
            Err(e) => return Outcome::failed(e),
        };

        let mut ids: Vec<String> = page.messages.iter().map(|m| m.user.clone()).collect();
        for message in &page.messages {
            ids.extend(output::mentioned_users(&message.text));
        }
        ensure_users(self.api.as_ref(), &self.caches.users, &ids).await;

        Outcome::text(output::format_messages(&page.messages, self.name_lookup()))
    }

    async fn send(&mut self, command: &Command) -> Outcome {
        let Some(conversation) = self.current.clone() else {
            return Outcome::text(NOT_IN_CHANNEL);
        };

        let text = if command.raw_args.is_empty() {
            command.args.join(" ")
        } else {
            command.raw_args.clone()
        };
        if text.is_empty() {
            return Outcome::text("Usage: send <message>");
        }

        match self.api.post_message(&conversation.id, &text).await {
            Ok(ts) => {
                debug!(conversation = %conversation.id, ts, "Message sent");
                Outcome::text("Message sent.")
            }
            Err(e) => Outcome::failed(e),
        }
    }

    fn pwd(&self) -> String {
        match &self.current {
            None => "Not in a channel".to_string(),
            Some(c) if c.is_direct() => format!("@{}", self.conversation_title(c)),
            Some(c) => format!("{}{}", output::channel_sigil(c), c.name),
        }
    }

    fn enter_view(&self, mode: ViewMode) -> Outcome {
        let Some(conversation) = self.current.clone() else {
            return Outcome::text(NOT_IN_CHANNEL);
        };
        if mode == ViewMode::Live && !self.realtime_available {
            return Outcome::text(NO_REALTIME);
        }

        let title = self.conversation_title(&conversation);
        Outcome {
            transition: Some(Transition::EnterView {
                mode,
                conversation,
                title,
            }),
            ..Outcome::default()
        }
    }

    async fn source(&mut self, command: &Command) -> Outcome {
        let Some(raw) = command.arg(0) else {
            return Outcome::text("Usage: source <config-file-path>");
        };

        match self.connect_from(raw).await {
            Ok(()) => Outcome {
                output: format!("Switched to workspace: {}", self.workspace_name()),
                switched: true,
                ..Outcome::default()
            },
            Err(e) => Outcome::failed(e),
        }
    }

    async fn connect_from(&mut self, raw: &str) -> Result<()> {
        let path = expand_path(raw)?;
        let config = Config::load_from(&path)?;
        let token = config
            .token()
            .ok_or_else(|| ShellError::ConfigError {
                message: "slack_token not found in config file".to_string(),
            })?
            .to_string();

        let api = self.connector.connect(&token).await?;
        let identity = api.auth_test().await?;
        let caches = WorkspaceCaches::open(&config, &identity.team_id);

        info!(team = %identity.team_name, path = %path.display(), "Switching workspace");
        self.switch_client(api, identity, config, caches);
        Ok(())
    }

    /// Point at another workspace, dropping every piece of cached state.
    ///
    /// In-flight tasks are not cancelled; their results carry the old
    /// generation and are discarded on arrival.
    pub fn switch_client(
        &mut self,
        api: Arc<dyn SlackApi>,
        identity: Identity,
        config: Config,
        caches: WorkspaceCaches,
    ) {
        if let Err(e) = self.caches.save() {
            warn!("Failed to save caches before switching: {e}");
        }
        self.api = api;
        self.identity = identity;
        self.config = config;
        self.caches = caches;
        self.channels = None;
        self.dms = None;
        self.current = None;
        self.generation += 1;
    }

    async fn load_channels(&mut self, refresh: bool) -> Result<()> {
        if self.channels.is_some() && !refresh {
            return Ok(());
        }

        let cache = &self.caches.conversations;
        if !refresh && !cache.channels_expired() {
            self.channels = cache.channels();
            return Ok(());
        }

        match self.api.list_conversations().await {
            Ok(channels) => {
                cache.set_channels(channels.clone());
                self.channels = Some(channels);
                Ok(())
            }
            Err(e) => match cache.channels() {
                // Serve the stale list rather than failing
                Some(stale) if !refresh => {
                    warn!("Channel refresh failed, using cached list: {e}");
                    self.channels = Some(stale);
                    Ok(())
                }
                _ => Err(e),
            },
        }
    }

    async fn load_dms(&mut self, refresh: bool) -> Result<()> {
        if self.dms.is_none() || refresh {
            let cache = &self.caches.conversations;
            if !refresh && !cache.dms_expired() {
                self.dms = cache.dms();
            } else {
                match self.api.list_direct_messages().await {
                    Ok(dms) => {
                        cache.set_dms(dms.clone());
                        self.dms = Some(dms);
                    }
                    Err(e) => match cache.dms() {
                        Some(stale) if !refresh => {
                            warn!("DM refresh failed, using cached list: {e}");
                            self.dms = Some(stale);
                        }
                        _ => return Err(e),
                    },
                }
            }
        }

        let peers: Vec<String> = self
            .dms
            .iter()
            .flatten()
            .filter_map(|dm| dm.user_id.clone())
            .collect();
        ensure_users(self.api.as_ref(), &self.caches.users, &peers).await;
        Ok(())
    }

    /// Cached name lookup under the configured name format.
    pub fn name_lookup(&self) -> impl Fn(&str) -> Option<String> + '_ {
        let format = self.config.display.name_format;
        move |id: &str| self.caches.users.name(id, format)
    }

    /// Cached user name, or the ID.
    pub fn user_name(&self, id: &str) -> String {
        self.caches
            .users
            .name(id, self.config.display.name_format)
            .unwrap_or_else(|| id.to_string())
    }

    /// How a conversation is titled: channel name or DM peer name.
    pub fn conversation_title(&self, conversation: &Conversation) -> String {
        match &conversation.user_id {
            Some(user) if conversation.is_direct() => self.user_name(user),
            _ => conversation.name.clone(),
        }
    }

    /// A known conversation by ID, from the loaded lists or the cache.
    pub fn conversation(&self, id: &str) -> Option<Conversation> {
        self.channels
            .iter()
            .flatten()
            .chain(self.dms.iter().flatten())
            .find(|c| c.id == id)
            .cloned()
            .or_else(|| self.caches.conversations.find(id))
    }

    /// Display name of a conversation ID; the ID when unknown.
    pub fn channel_name(&self, id: &str) -> String {
        self.conversation(id)
            .map(|c| self.conversation_title(&c))
            .unwrap_or_else(|| id.to_string())
    }

    /// Whether a conversation ID is a DM.
    pub fn is_direct(&self, id: &str) -> bool {
        self.conversation(id).is_some_and(|c| c.is_direct())
    }

    /// Whether `text` mentions the user.
    pub fn is_mention(&self, text: &str) -> bool {
        output::is_mention(text, &self.identity.user_id)
    }

    /// Whether a message was written by the user.
    pub fn is_own(&self, user_id: &str) -> bool {
        !user_id.is_empty() && user_id == self.identity.user_id
    }

    /// Build the notification for an incoming message.
    pub async fn notification_for(&mut self, message: &IncomingMessage) -> Notification {
        if self.conversation(&message.channel_id).is_none() {
            // First push from a conversation we have not listed yet
            if let Err(e) = self.load_channels(false).await {
                debug!("Could not load channels for notification: {e}");
            }
            if let Err(e) = self.load_dms(false).await {
                debug!("Could not load DMs for notification: {e}");
            }
        }

        let mut ids = vec![message.user_id.clone()];
        ids.extend(output::mentioned_users(&message.text));
        ensure_users(self.api.as_ref(), &self.caches.users, &ids).await;

        Notification {
            channel_id: message.channel_id.clone(),
            channel_name: self.channel_name(&message.channel_id),
            user_name: self.user_name(&message.user_id),
            text: output::resolve_mentions(&message.text, self.name_lookup()),
            is_mention: self.is_mention(&message.text),
            is_dm: self.is_direct(&message.channel_id),
        }
    }

    /// Rendered prompt.
    pub fn prompt(&self) -> String {
        let workspace = self.workspace_name();
        match &self.current {
            None => self.config.prompt.render(workspace, None, None),
            Some(c) if c.is_direct() => {
                let name = self.conversation_title(c);
                self.config.prompt.render(workspace, None, Some(&name))
            }
            Some(c) => self.config.prompt.render(workspace, Some(&c.name), None),
        }
    }

    /// `cd` targets matching a `#`/`@`/bare prefix, channels first.
    pub async fn complete_target(&mut self, prefix: &str) -> Vec<String> {
        let (channels, users, term) = if let Some(rest) = prefix.strip_prefix('#') {
            (true, false, rest)
        } else if let Some(rest) = prefix.strip_prefix('@') {
            (false, true, rest)
        } else {
            (true, true, prefix)
        };
        let term = term.to_lowercase();

        if channels {
            if let Err(e) = self.load_channels(false).await {
                debug!("Completion could not load channels: {e}");
            }
        }
        if users {
            if let Err(e) = self.load_dms(false).await {
                debug!("Completion could not load DMs: {e}");
            }
        }

        let mut candidates = Vec::new();
        if channels {
            candidates.extend(
                self.channels
                    .iter()
                    .flatten()
                    .filter(|c| c.name.to_lowercase().starts_with(&term))
                    .map(|c| format!("#{}", c.name)),
            );
        }
        if users {
            let names = self.name_lookup();
            candidates.extend(
                self.dms
                    .iter()
                    .flatten()
                    .filter_map(|dm| dm.user_id.as_deref().and_then(|id| names(id)))
                    .filter(|name| name.to_lowercase().starts_with(&term))
                    .map(|name| format!("@{name}")),
            );
        }
        candidates
    }

    /// Flush caches to disk.
    pub fn save_caches(&self) -> Result<()> {
        self.caches.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemoryWorkspace;
    use pretty_assertions::assert_eq;

    struct NoConnector;

    #[async_trait]
    impl Connector for NoConnector {
        async fn connect(&self, _token: &str) -> Result<Arc<dyn SlackApi>> {
            Err(ShellError::api("auth.test", "invalid_auth"))
        }
    }

    fn executor() -> (Executor, Arc<MemoryWorkspace>) {
        let workspace = MemoryWorkspace::demo();
        let identity = workspace.identity().clone();
        let executor = Executor::new(
            workspace.clone(),
            identity,
            Config::default(),
            WorkspaceCaches::in_memory("T000"),
            Arc::new(NoConnector),
        );
        (executor, workspace)
    }

    #[tokio::test]
    async fn test_ls_grep_pipeline() {
        let (mut executor, _) = executor();
        let outcome = executor.execute_line("ls | grep dev").await;
        assert!(outcome.error.is_none());
        assert_eq!(outcome.output, "  # dev-backend\n  # dev-frontend");
    }

    #[tokio::test]
    async fn test_grep_no_matches() {
        let (mut executor, _) = executor();
        let outcome = executor.execute_line("ls | grep nothing-here").await;
        assert_eq!(outcome.output, output::NO_MATCHES);
    }

    #[tokio::test]
    async fn test_pipe_to_non_filter() {
        let (mut executor, _) = executor();
        let outcome = executor.execute_line("ls | cat").await;
        assert_eq!(
            outcome.error.map(|e| e.to_string()).as_deref(),
            Some("cannot pipe to 'cat'")
        );
        assert!(outcome.output.is_empty());
    }

    #[tokio::test]
    async fn test_cd_and_prompt() {
        let (mut executor, _) = executor();
        assert_eq!(executor.prompt(), "demo> ");

        let outcome = executor.execute_line("cd #GENERAL").await;
        assert_eq!(outcome.output, "Entered #general");
        assert_eq!(outcome.entered.as_deref(), Some("C001"));
        assert_eq!(executor.prompt(), "demo #general> ");

        let outcome = executor.execute_line("cd bob").await;
        assert_eq!(outcome.output, "Entered DM with @bob");
        assert_eq!(executor.prompt(), "demo @bob> ");
        assert_eq!(executor.execute_line("pwd").await.output, "@bob");

        let outcome = executor.execute_line("cd #nope").await;
        assert_eq!(
            outcome.error.map(|e| e.to_string()).as_deref(),
            Some("channel not found: nope")
        );
    }

    #[tokio::test]
    async fn test_back() {
        let (mut executor, _) = executor();
        assert_eq!(executor.execute_line("..").await.output, "Already at channel list");
        executor.execute_line("cd #random").await;
        assert_eq!(executor.execute_line("..").await.output, "Returned to channel list");
        assert!(executor.current().is_none());
    }

    #[tokio::test]
    async fn test_preconditions() {
        let (mut executor, _) = executor();
        assert_eq!(executor.execute_line("cat").await.output, NOT_IN_CHANNEL);
        assert_eq!(executor.execute_line("browse").await.output, NOT_IN_CHANNEL);

        executor.execute_line("cd #general").await;
        let live = executor.execute_line("live").await;
        assert_eq!(live.output, NO_REALTIME);
        assert!(live.transition.is_none());

        executor.set_realtime_available(true);
        let live = executor.execute_line("tail").await;
        assert!(matches!(
            live.transition,
            Some(Transition::EnterView { mode: ViewMode::Live, .. })
        ));
    }

    #[tokio::test]
    async fn test_cat_resolves_names() {
        let (mut executor, _) = executor();
        executor.execute_line("cd #general").await;
        let outcome = executor.execute_line("cat -n 500").await;
        assert!(outcome.output.contains("alice: Good morning everyone"));
        assert!(outcome.output.contains("└─ 2 replies"));
        assert!(outcome.output.contains(":tada: 2"));
    }

    #[tokio::test]
    async fn test_send_posts_raw_text() {
        let (mut executor, workspace) = executor();
        assert_eq!(executor.execute_line("send hi").await.output, NOT_IN_CHANNEL);

        executor.execute_line("cd #random").await;
        assert_eq!(executor.execute_line("send").await.output, "Usage: send <message>");
        let outcome = executor.execute_line(r#"send "hello | world""#).await;
        assert_eq!(outcome.output, "Message sent.");
        assert_eq!(workspace.history("C004").last().unwrap().text, "hello | world");
    }

    #[tokio::test]
    async fn test_ls_uses_cache_until_refresh() {
        let (mut executor, workspace) = executor();
        executor.execute_line("ls").await;
        let listed = workspace
            .calls()
            .iter()
            .filter(|c| *c == "conversations.list")
            .count();

        executor.execute_line("ls").await;
        let after_cached = workspace
            .calls()
            .iter()
            .filter(|c| *c == "conversations.list")
            .count();
        assert_eq!(listed, after_cached);

        executor.execute_line("ls -r").await;
        let after_refresh = workspace
            .calls()
            .iter()
            .filter(|c| *c == "conversations.list")
            .count();
        assert!(after_refresh > after_cached);
    }

    #[tokio::test]
    async fn test_api_failure_is_inline() {
        let (mut executor, workspace) = executor();
        workspace.fail_next("conversations.list", "ratelimited");
        let outcome = executor.execute_line("ls | grep dev").await;
        assert_eq!(
            outcome.error.map(|e| e.to_string()).as_deref(),
            Some("conversations.list failed: ratelimited")
        );
    }

    #[tokio::test]
    async fn test_source_failures() {
        let (mut executor, _) = executor();
        assert_eq!(
            executor.execute_line("source").await.output,
            "Usage: source <config-file-path>"
        );

        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("empty.toml");
        std::fs::write(&path, "debug = true\n").unwrap();
        let outcome = executor
            .execute_line(&format!("source {}", path.display()))
            .await;
        assert!(outcome
            .error
            .unwrap()
            .to_string()
            .contains("slack_token not found in config file"));
        assert_eq!(executor.generation(), 0);
    }

    #[tokio::test]
    async fn test_completions() {
        let (mut executor, _) = executor();
        assert_eq!(
            executor.complete_target("#dev").await,
            vec!["#dev-backend".to_string(), "#dev-frontend".to_string()]
        );
        assert_eq!(executor.complete_target("@b").await, vec!["@bob".to_string()]);
        assert!(executor.complete_target("zz").await.is_empty());
    }

    #[tokio::test]
    async fn test_notification_for_dm() {
        let (mut executor, _) = executor();
        let incoming = IncomingMessage {
            channel_id: "D001".into(),
            user_id: "U003".into(),
            text: "hey <@U000>".into(),
            ts: "1800000000.000100".into(),
            thread_ts: None,
        };
        let notification = executor.notification_for(&incoming).await;
        assert_eq!(notification.channel_name, "bob");
        assert_eq!(notification.user_name, "bob");
        assert_eq!(notification.text, "hey @me");
        assert!(notification.is_dm);
        assert!(notification.is_mention);
    }

    #[tokio::test]
    async fn test_unknown_and_exit() {
        let (mut executor, _) = executor();
        assert_eq!(
            executor.execute_line("frob").await.output,
            "Unknown command. Type 'help' for available commands."
        );
        assert!(executor.execute_line("q").await.exit);
        assert!(executor.execute_line("").await.output.is_empty());
    }
}
