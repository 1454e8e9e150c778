//! Realtime message delivery.
//!
//! A [`RealtimeSource`] runs in the background and only ever sends
//! [`RealtimeEvent`]s into the session's queue, in the order it observed
//! them. [`HistoryPoller`] approximates a push connection by polling
//! `conversations.history` for a watch list.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::SlackApi;
use crate::util::compare_slack_ts;

/// Messages requested per conversation per poll.
const POLL_PAGE: usize = 20;

/// A message pushed by the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Conversation ID.
    pub channel_id: String,
    /// Author ID.
    pub user_id: String,
    /// Raw text.
    pub text: String,
    /// Message timestamp.
    pub ts: String,
    /// Thread root, for replies.
    pub thread_ts: Option<String>,
}

impl IncomingMessage {
    /// Whether this is a reply inside a thread.
    pub fn is_reply(&self) -> bool {
        self.thread_ts
            .as_deref()
            .is_some_and(|root| !root.is_empty() && root != self.ts)
    }
}

/// One event from the realtime stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeEvent {
    /// Connection (re)established.
    Connected,
    /// Connection lost.
    Disconnected,
    /// A message arrived.
    MessageReceived(IncomingMessage),
}

/// A background producer of realtime events.
pub trait RealtimeSource: Send + Sync {
    /// Start producing into `tx` until `cancel` fires.
    fn spawn(&self, tx: UnboundedSender<RealtimeEvent>, cancel: CancellationToken) -> JoinHandle<()>;

    /// The conversation currently on screen, watched with priority.
    fn focus(&self, _conversation: Option<&str>) {}
}

/// Polls history for the focused conversation and the user's memberships.
pub struct HistoryPoller {
    api: Arc<dyn SlackApi>,
    interval: Duration,
    max_watched: usize,
    focus: Arc<RwLock<Option<String>>>,
}

impl std::fmt::Debug for HistoryPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryPoller")
            .field("interval", &self.interval)
            .field("max_watched", &self.max_watched)
            .field("focus", &*self.focus.read())
            .finish_non_exhaustive()
    }
}

impl HistoryPoller {
    /// Create a poller.
    pub fn new(api: Arc<dyn SlackApi>, interval: Duration, max_watched: usize) -> Self {
        Self {
            api,
            interval,
            max_watched,
            focus: Arc::new(RwLock::new(None)),
        }
    }
}

impl RealtimeSource for HistoryPoller {
    fn spawn(&self, tx: UnboundedSender<RealtimeEvent>, cancel: CancellationToken) -> JoinHandle<()> {
        let api = Arc::clone(&self.api);
        let focus = Arc::clone(&self.focus);
        let interval = self.interval;
        let max_watched = self.max_watched;

        tokio::spawn(async move {
            let mut state = PollState::default();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                if state.watched.is_none() {
                    state.watched = Some(watch_list(api.as_ref(), max_watched).await);
                }

                let focused = focus.read().clone();
                let events = state.poll(api.as_ref(), focused.as_deref()).await;
                for event in events {
                    if tx.send(event).is_err() {
                        debug!("Realtime receiver dropped, stopping poller");
                        return;
                    }
                }
            }
            info!("Realtime poller stopped");
        })
    }

    fn focus(&self, conversation: Option<&str>) {
        *self.focus.write() = conversation.map(str::to_string);
    }
}

async fn watch_list(api: &dyn SlackApi, max_watched: usize) -> Vec<String> {
    let mut ids = Vec::new();
    match api.list_direct_messages().await {
        Ok(dms) => ids.extend(dms.into_iter().map(|c| c.id)),
        Err(e) => warn!("Realtime: could not list DMs: {e}"),
    }
    match api.list_conversations().await {
        Ok(channels) => ids.extend(
            channels
                .into_iter()
                .filter(|c| c.is_member && !c.is_archived)
                .map(|c| c.id),
        ),
        Err(e) => warn!("Realtime: could not list channels: {e}"),
    }
    ids.truncate(max_watched);
    ids
}

#[derive(Debug, Default)]
struct PollState {
    watched: Option<Vec<String>>,
    last_seen: HashMap<String, String>,
    connected: bool,
}

impl PollState {
    async fn poll(&mut self, api: &dyn SlackApi, focused: Option<&str>) -> Vec<RealtimeEvent> {
        let mut targets: Vec<String> = focused.map(str::to_string).into_iter().collect();
        for id in self.watched.iter().flatten() {
            if !targets.contains(id) {
                targets.push(id.clone());
            }
        }

        let mut events = Vec::new();
        let mut healthy = true;

        for conversation in targets {
            let page = match api.get_messages(&conversation, POLL_PAGE, None).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(conversation = %conversation, "Realtime poll failed: {e}");
                    healthy = false;
                    break;
                }
            };

            let newest = page.messages.last().map(|m| m.ts.clone());
            match self.last_seen.get(&conversation) {
                // First sight sets the baseline without replaying history
                None => {}
                Some(last) => {
                    for message in page
                        .messages
                        .iter()
                        .filter(|m| compare_slack_ts(&m.ts, last).is_gt())
                    {
                        events.push(RealtimeEvent::MessageReceived(IncomingMessage {
                            channel_id: conversation.clone(),
                            user_id: message.user.clone(),
                            text: message.text.clone(),
                            ts: message.ts.clone(),
                            thread_ts: message.thread_ts.clone(),
                        }));
                    }
                }
            }
            if let Some(ts) = newest {
                let advance = self
                    .last_seen
                    .get(&conversation)
                    .map_or(true, |last| compare_slack_ts(&ts, last).is_gt());
                if advance {
                    self.last_seen.insert(conversation, ts);
                }
            } else {
                self.last_seen.entry(conversation).or_insert_with(|| "0".to_string());
            }
        }

        let mut out = Vec::new();
        if healthy && !self.connected {
            self.connected = true;
            out.push(RealtimeEvent::Connected);
        } else if !healthy && self.connected {
            self.connected = false;
            out.push(RealtimeEvent::Disconnected);
        }
        out.extend(events);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemoryWorkspace;

    #[tokio::test]
    async fn test_poll_reports_only_new_messages() {
        let workspace = MemoryWorkspace::demo();
        let api: Arc<dyn SlackApi> = workspace.clone();
        let mut state = PollState {
            watched: Some(vec!["C001".to_string()]),
            ..PollState::default()
        };

        let first = state.poll(api.as_ref(), None).await;
        assert_eq!(first, vec![RealtimeEvent::Connected]);

        let ts = workspace.inject("C001", "U002", "fresh news");
        let second = state.poll(api.as_ref(), None).await;
        assert_eq!(second.len(), 1);
        match &second[0] {
            RealtimeEvent::MessageReceived(m) => {
                assert_eq!(m.ts, ts);
                assert_eq!(m.text, "fresh news");
            }
            other => panic!("unexpected event {other:?}"),
        }

        assert!(state.poll(api.as_ref(), None).await.is_empty());
    }

    #[tokio::test]
    async fn test_poll_failure_disconnects() {
        let workspace = MemoryWorkspace::demo();
        let api: Arc<dyn SlackApi> = workspace.clone();
        let mut state = PollState {
            watched: Some(vec!["C001".to_string()]),
            ..PollState::default()
        };
        state.poll(api.as_ref(), None).await;

        workspace.fail_next("conversations.history", "fatal_error");
        let events = state.poll(api.as_ref(), None).await;
        assert_eq!(events, vec![RealtimeEvent::Disconnected]);

        let events = state.poll(api.as_ref(), None).await;
        assert_eq!(events, vec![RealtimeEvent::Connected]);
    }

    #[test]
    fn test_is_reply() {
        let mut message = IncomingMessage {
            channel_id: "C1".into(),
            user_id: "U1".into(),
            text: "hi".into(),
            ts: "2.0".into(),
            thread_ts: None,
        };
        assert!(!message.is_reply());
        message.thread_ts = Some("2.0".into());
        assert!(!message.is_reply());
        message.thread_ts = Some("1.0".into());
        assert!(message.is_reply());
    }
}
