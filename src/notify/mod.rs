//! Notification fan-out for incoming messages.
//!
//! The [`Coordinator`] applies the suppression rules (disabled, do not
//! disturb, muted conversation, conversation already on screen), keeps the
//! per-conversation unread counters and panel entries, and drives the sinks:
//! bell, desktop, terminal title and the in-app visual queue.
//!
//! Counters and queues sit behind one `parking_lot::Mutex` because the
//! realtime reader and the event loop both reach them.

mod backend;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::util::truncate_text;

pub use backend::{CapturingBackend, Effect, NotifyBackend, TerminalBackend};

/// Interval of the visual queue sweeper.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Notification settings (`[notifications]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Master switch.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Do not disturb.
    #[serde(default)]
    pub dnd: bool,
    /// Muted conversations by ID or name (`#`/`@` optional).
    #[serde(default)]
    pub mute_channels: Vec<String>,
    /// Terminal bell.
    #[serde(default)]
    pub bell: SinkConfig,
    /// Desktop notifications.
    #[serde(default)]
    pub desktop: SinkConfig,
    /// Terminal title.
    #[serde(default)]
    pub title: TitleConfig,
    /// In-app visual queue.
    #[serde(default)]
    pub visual: VisualConfig,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dnd: false,
            mute_channels: Vec::new(),
            bell: SinkConfig::default(),
            desktop: SinkConfig::default(),
            title: TitleConfig::default(),
            visual: VisualConfig::default(),
        }
    }
}

impl NotificationConfig {
    /// Merge another config into this one (other takes precedence).
    pub fn merge_from(&mut self, other: &NotificationConfig) {
        self.enabled = other.enabled;
        self.dnd = other.dnd;
        if !other.mute_channels.is_empty() {
            self.mute_channels = other.mute_channels.clone();
        }

        self.bell = other.bell.clone();
        self.desktop = other.desktop.clone();

        self.title.enabled = other.title.enabled;
        if !other.title.format.is_empty() {
            self.title.format = other.title.format.clone();
        }
        if !other.title.base_title.is_empty() {
            self.title.base_title = other.title.base_title.clone();
        }

        self.visual.enabled = other.visual.enabled;
        if other.visual.max_items > 0 {
            self.visual.max_items = other.visual.max_items;
        }
        if !other.visual.dismiss_after.is_empty() {
            self.visual.dismiss_after = other.visual.dismiss_after.clone();
        }
    }
}

/// Settings for the bell and desktop sinks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Whether the sink fires.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Fire only for mentions and DMs flagged as mentions.
    #[serde(default)]
    pub mentions_only: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mentions_only: false,
        }
    }
}

impl SinkConfig {
    fn fires_for(&self, is_mention: bool) -> bool {
        self.enabled && (!self.mentions_only || is_mention)
    }
}

/// Terminal title settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleConfig {
    /// Whether the title is updated.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Title while unread messages exist; `{count}` is substituted.
    #[serde(default = "default_title_format")]
    pub format: String,
    /// Title with nothing unread.
    #[serde(default = "default_base_title")]
    pub base_title: String,
}

impl Default for TitleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: default_title_format(),
            base_title: default_base_title(),
        }
    }
}

impl TitleConfig {
    /// Title for an aggregate unread count.
    pub fn render(&self, count: usize) -> String {
        if count > 0 {
            self.format.replace("{count}", &count.to_string())
        } else {
            self.base_title.clone()
        }
    }
}

/// Visual queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualConfig {
    /// Whether the queue collects notifications.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum queued items; the oldest is dropped on overflow.
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    /// Age after which items are swept (humantime).
    #[serde(default = "default_dismiss_after")]
    pub dismiss_after: String,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_items: default_max_items(),
            dismiss_after: default_dismiss_after(),
        }
    }
}

impl VisualConfig {
    /// Parsed sweep age; `None` disables sweeping.
    pub fn dismiss_after(&self) -> Option<Duration> {
        humantime::parse_duration(&self.dismiss_after)
            .ok()
            .filter(|d| !d.is_zero())
    }
}

fn default_true() -> bool {
    true
}

fn default_title_format() -> String {
    "Slack Shell ({count})".to_string()
}

fn default_base_title() -> String {
    "Slack Shell".to_string()
}

fn default_max_items() -> usize {
    5
}

fn default_dismiss_after() -> String {
    "10s".to_string()
}

/// An incoming message, ready for the notification rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Conversation ID.
    pub channel_id: String,
    /// Conversation display name (peer name for DMs).
    pub channel_name: String,
    /// Author display name.
    pub user_name: String,
    /// Message text with mentions resolved.
    pub text: String,
    /// Whether the message mentions the user.
    pub is_mention: bool,
    /// Whether the conversation is a DM.
    pub is_dm: bool,
}

impl Notification {
    /// `#chan` or `@user`.
    pub fn location(&self) -> String {
        if self.is_dm {
            format!("@{}", self.channel_name)
        } else {
            format!("#{}", self.channel_name)
        }
    }

    /// One-line rendering for the visual queue.
    pub fn visual_line(&self) -> String {
        format!(
            "{} | {}: {}",
            self.location(),
            self.user_name,
            truncate_text(&self.text, 50)
        )
    }
}

/// A conversation's entry in the notification panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelEntry {
    /// Conversation ID.
    pub channel_id: String,
    /// Conversation display name.
    pub channel_name: String,
    /// Whether the conversation is a DM.
    pub is_dm: bool,
    /// Unread count.
    pub count: usize,
    /// Latest message text.
    pub last_message: String,
    /// Latest author.
    pub last_user: String,
}

/// Why a message did or did not produce notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Coordinator disabled.
    Disabled,
    /// Do not disturb is on.
    DoNotDisturb,
    /// Conversation is muted.
    Muted,
    /// The conversation is on screen and not streaming.
    InView,
    /// Counted and fanned out.
    Delivered,
}

#[derive(Debug)]
struct VisualItem {
    notification: Notification,
    created_at: Instant,
}

#[derive(Debug, Default)]
struct State {
    unread: IndexMap<String, usize>,
    panel: IndexMap<String, PanelEntry>,
    visual: VecDeque<VisualItem>,
}

impl State {
    fn total_unread(&self) -> usize {
        self.unread.values().sum()
    }
}

/// Routes incoming messages to the notification sinks.
pub struct Coordinator {
    config: RwLock<NotificationConfig>,
    state: Mutex<State>,
    backend: Arc<dyn NotifyBackend>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &*self.config.read())
            .field("total_unread", &self.total_unread())
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Create a coordinator over a backend.
    pub fn new(config: NotificationConfig, backend: Arc<dyn NotifyBackend>) -> Self {
        Self {
            config: RwLock::new(config),
            state: Mutex::new(State::default()),
            backend,
        }
    }

    /// Apply the rules to one message.
    ///
    /// `current_channel` is the conversation on screen; `streaming` is true
    /// while that view follows new messages, in which case it still counts.
    pub fn handle_message(
        &self,
        message: &Notification,
        current_channel: Option<&str>,
        streaming: bool,
    ) -> Outcome {
        let config = self.config.read().clone();

        if !config.enabled {
            return Outcome::Disabled;
        }
        if config.dnd {
            return Outcome::DoNotDisturb;
        }
        if is_muted(&config.mute_channels, &message.channel_id, &message.channel_name) {
            debug!(channel = %message.channel_id, "Muted conversation, no notification");
            return Outcome::Muted;
        }
        if current_channel == Some(message.channel_id.as_str()) && !streaming {
            return Outcome::InView;
        }

        let total = {
            let mut state = self.state.lock();
            *state.unread.entry(message.channel_id.clone()).or_insert(0) += 1;
            let count = state.unread[&message.channel_id];

            let entry = state
                .panel
                .entry(message.channel_id.clone())
                .or_insert_with(|| PanelEntry {
                    channel_id: message.channel_id.clone(),
                    channel_name: message.channel_name.clone(),
                    is_dm: message.is_dm,
                    count: 0,
                    last_message: String::new(),
                    last_user: String::new(),
                });
            entry.count = count;
            entry.last_message = message.text.clone();
            entry.last_user = message.user_name.clone();

            if config.visual.enabled {
                state.visual.push_back(VisualItem {
                    notification: message.clone(),
                    created_at: Instant::now(),
                });
                while state.visual.len() > config.visual.max_items {
                    state.visual.pop_front();
                }
            }

            state.total_unread()
        };

        if config.bell.fires_for(message.is_mention) {
            self.backend.ring_bell();
        }
        if config.desktop.fires_for(message.is_mention) {
            let title = if message.is_dm {
                format!("@{}", message.user_name)
            } else {
                format!("#{}", message.channel_name)
            };
            let body = format!("{}: {}", message.user_name, truncate_text(&message.text, 100));
            self.backend.desktop(&title, &body);
        }
        if config.title.enabled {
            self.backend.set_title(&config.title.render(total));
        }

        Outcome::Delivered
    }

    /// Forget a conversation's unread state and refresh the title.
    pub fn clear_unread(&self, channel_id: &str) {
        let total = {
            let mut state = self.state.lock();
            state.unread.shift_remove(channel_id);
            state.panel.shift_remove(channel_id);
            state.total_unread()
        };

        let config = self.config.read();
        if config.title.enabled {
            self.backend.set_title(&config.title.render(total));
        }
    }

    /// Unread count for a conversation.
    pub fn unread_for(&self, channel_id: &str) -> usize {
        self.state.lock().unread.get(channel_id).copied().unwrap_or(0)
    }

    /// Unread count across conversations.
    pub fn total_unread(&self) -> usize {
        self.state.lock().total_unread()
    }

    /// Panel entries, in order of first arrival.
    pub fn panel_entries(&self) -> Vec<PanelEntry> {
        self.state.lock().panel.values().cloned().collect()
    }

    /// Pending visual notifications, oldest first.
    pub fn visual(&self) -> Vec<Notification> {
        self.state
            .lock()
            .visual
            .iter()
            .map(|item| item.notification.clone())
            .collect()
    }

    /// Remove one visual notification; out of range is ignored.
    pub fn dismiss(&self, index: usize) {
        let mut state = self.state.lock();
        if index < state.visual.len() {
            state.visual.remove(index);
        }
    }

    /// Remove every visual notification.
    pub fn dismiss_all(&self) {
        self.state.lock().visual.clear();
    }

    /// Drop visual items older than `dismiss_after` as of `now`.
    pub fn sweep(&self, now: Instant) {
        let Some(max_age) = self.config.read().visual.dismiss_after() else {
            return;
        };
        self.state
            .lock()
            .visual
            .retain(|item| now.saturating_duration_since(item.created_at) < max_age);
    }

    /// Run [`sweep`](Self::sweep) every second until cancelled.
    pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => coordinator.sweep(Instant::now()),
                }
            }
        })
    }

    /// Toggle do not disturb.
    pub fn set_dnd(&self, enabled: bool) {
        self.config.write().dnd = enabled;
    }

    /// Whether do not disturb is on.
    pub fn is_dnd(&self) -> bool {
        self.config.read().dnd
    }

    /// Add a conversation to the mute list.
    pub fn mute(&self, channel: &str) {
        let mut config = self.config.write();
        if !config.mute_channels.iter().any(|c| c == channel) {
            config.mute_channels.push(channel.to_string());
        }
    }

    /// Remove a conversation from the mute list.
    pub fn unmute(&self, channel: &str) {
        self.config.write().mute_channels.retain(|c| c != channel);
    }

    /// Whether a conversation is muted.
    pub fn is_muted(&self, channel_id: &str, channel_name: &str) -> bool {
        is_muted(&self.config.read().mute_channels, channel_id, channel_name)
    }

    /// Reset counters and queues, keeping the configuration.
    pub fn reset(&self) {
        *self.state.lock() = State::default();
        let config = self.config.read();
        if config.title.enabled {
            self.backend.set_title(&config.title.base_title);
        }
    }
}

fn is_muted(mute_list: &[String], channel_id: &str, channel_name: &str) -> bool {
    mute_list.iter().any(|entry| {
        entry == channel_id
            || (!channel_name.is_empty()
                && entry
                    .trim_start_matches(['#', '@'])
                    .eq_ignore_ascii_case(channel_name))
    })
}
