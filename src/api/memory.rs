//! In-memory workspace.
//!
//! Backs the test suite and `--demo`. Posts are echoed to realtime
//! subscribers the way the real workspace echoes them over its push
//! connection, and failures can be scripted per API method.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::realtime::{IncomingMessage, RealtimeEvent, RealtimeSource};
use super::SlackApi;
use crate::error::{Result, ShellError};
use crate::model::{Conversation, Identity, Message, MessagePage, Reaction, UserRecord};
use crate::util::compare_slack_ts;

/// First timestamp handed out.
const BASE_SECONDS: u64 = 1_700_000_000;

#[derive(Debug, Default)]
struct Data {
    conversations: Vec<Conversation>,
    users: IndexMap<String, UserRecord>,
    members: HashMap<String, Vec<String>>,
    /// Top-level messages per conversation, ascending.
    history: HashMap<String, Vec<Message>>,
    /// Replies keyed by (conversation, root ts), ascending.
    replies: HashMap<(String, String), Vec<Message>>,
    next_tick: u64,
    failures: VecDeque<(String, String)>,
    calls: Vec<String>,
}

impl Data {
    fn next_ts(&mut self) -> String {
        self.next_tick += 1;
        format!("{}.{:06}", BASE_SECONDS + self.next_tick, 100)
    }

    fn insert(&mut self, conversation: &str, message: Message) {
        if message.is_top_level() {
            let history = self.history.entry(conversation.to_string()).or_default();
            history.push(message);
            history.sort_by(|a, b| compare_slack_ts(&a.ts, &b.ts));
            return;
        }

        let root = message.thread_root().to_string();
        if let Some(parent) = self
            .history
            .get_mut(conversation)
            .and_then(|h| h.iter_mut().find(|m| m.ts == root))
        {
            parent.reply_count += 1;
            parent.thread_ts.get_or_insert_with(|| root.clone());
        }
        self.replies
            .entry((conversation.to_string(), root))
            .or_default()
            .push(message);
    }

    fn find_mut(&mut self, conversation: &str, ts: &str) -> Option<&mut Message> {
        if let Some(found) = self
            .history
            .get_mut(conversation)
            .and_then(|h| h.iter_mut().find(|m| m.ts == ts))
        {
            return Some(found);
        }
        self.replies
            .iter_mut()
            .filter(|((conv, _), _)| conv == conversation)
            .flat_map(|(_, replies)| replies.iter_mut())
            .find(|m| m.ts == ts)
    }
}

/// A workspace held entirely in memory.
#[derive(Debug)]
pub struct MemoryWorkspace {
    identity: Identity,
    data: Mutex<Data>,
    subscribers: Mutex<Vec<UnboundedSender<RealtimeEvent>>>,
}

impl MemoryWorkspace {
    /// An empty workspace for `identity`.
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            data: Mutex::new(Data::default()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// A small seeded workspace.
    ///
    /// Channels `general` (C001), `dev-backend` (C002), `dev-frontend` (C003),
    /// `random` (C004) and private `ops` (G001); a DM with bob (D001).
    /// Users: me (U000), alice (U001), albert (U002), bob (U003).
    pub fn demo() -> Arc<Self> {
        let workspace = Self::new(Identity {
            user_id: "U000".to_string(),
            team_id: "T000".to_string(),
            team_name: "demo".to_string(),
        });

        for (id, name, real) in [
            ("U000", "me", "Demo User"),
            ("U001", "alice", "Alice Liddell"),
            ("U002", "albert", "Albert Hofmann"),
            ("U003", "bob", "Bob Dobbs"),
        ] {
            workspace.add_user(UserRecord {
                id: id.to_string(),
                name: name.to_string(),
                display_name: String::new(),
                real_name: real.to_string(),
            });
        }

        workspace.add_conversation(Conversation::channel("C001", "general"));
        workspace.add_conversation(Conversation::channel("C002", "dev-backend"));
        workspace.add_conversation(Conversation::channel("C003", "dev-frontend"));
        workspace.add_conversation(Conversation::channel("C004", "random"));
        workspace.add_conversation(Conversation::channel("G001", "ops").private());
        workspace.add_conversation(Conversation::direct("D001", "U003"));

        let everyone = ["U000", "U001", "U002", "U003"];
        for conversation in ["C001", "C002", "C003", "C004", "G001"] {
            workspace.set_members(conversation, everyone);
        }
        workspace.set_members("D001", ["U000", "U003"]);

        workspace.post_as("C001", "U001", "Good morning everyone");
        let root = workspace.post_as("C001", "U002", "Who broke the build?");
        workspace.reply_as("C001", &root, "U003", "Looking into it");
        workspace.reply_as("C001", &root, "U001", "Fixed in <#C002>, thanks <@U003>");
        let shipped = workspace.post_as("C001", "U003", "Release 1.2 is out :rocket:");
        workspace.react("C001", &shipped, "tada", ["U001", "U002"]);
        workspace.post_as("C002", "U002", "Migrations run at 14:00");
        workspace.post_as("D001", "U003", "lunch?");

        Arc::new(workspace)
    }

    /// The identity reported by `auth_test`.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Add a channel or DM.
    pub fn add_conversation(&self, conversation: Conversation) {
        self.data.lock().conversations.push(conversation);
    }

    /// Add or replace a user.
    pub fn add_user(&self, user: UserRecord) {
        self.data.lock().users.insert(user.id.clone(), user);
    }

    /// Set a conversation's members, in order.
    pub fn set_members<'a>(&self, conversation: &str, members: impl IntoIterator<Item = &'a str>) {
        self.data.lock().members.insert(
            conversation.to_string(),
            members.into_iter().map(str::to_string).collect(),
        );
    }

    /// Store a message without notifying subscribers.
    pub fn post_as(&self, conversation: &str, user: &str, text: &str) -> String {
        let mut data = self.data.lock();
        let ts = data.next_ts();
        data.insert(conversation, Message::new(ts.clone(), user, text));
        ts
    }

    /// Store a thread reply without notifying subscribers.
    pub fn reply_as(&self, conversation: &str, root_ts: &str, user: &str, text: &str) -> String {
        let mut data = self.data.lock();
        let ts = data.next_ts();
        data.insert(
            conversation,
            Message::new(ts.clone(), user, text).in_thread(root_ts),
        );
        ts
    }

    /// Add a reaction to a stored message.
    pub fn react<'a>(
        &self,
        conversation: &str,
        ts: &str,
        name: &str,
        users: impl IntoIterator<Item = &'a str>,
    ) {
        let users: Vec<String> = users.into_iter().map(str::to_string).collect();
        if let Some(message) = self.data.lock().find_mut(conversation, ts) {
            message.reactions.push(Reaction {
                name: name.to_string(),
                count: u32::try_from(users.len()).unwrap_or(u32::MAX),
                users,
            });
        }
    }

    /// Store a message from someone else and push it to subscribers.
    pub fn inject(&self, conversation: &str, user: &str, text: &str) -> String {
        let ts = self.post_as(conversation, user, text);
        self.broadcast(conversation, user, text, &ts, None);
        ts
    }

    /// Make the next call to `method` fail with `error`.
    pub fn fail_next(&self, method: &str, error: &str) {
        self.data
            .lock()
            .failures
            .push_back((method.to_string(), error.to_string()));
    }

    /// API methods called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.data.lock().calls.clone()
    }

    /// Top-level messages of a conversation.
    pub fn history(&self, conversation: &str) -> Vec<Message> {
        self.data
            .lock()
            .history
            .get(conversation)
            .cloned()
            .unwrap_or_default()
    }

    fn check(&self, method: &str) -> Result<()> {
        let mut data = self.data.lock();
        data.calls.push(method.to_string());
        if let Some(pos) = data.failures.iter().position(|(m, _)| m == method) {
            if let Some((_, error)) = data.failures.remove(pos) {
                return Err(ShellError::api(method, error));
            }
        }
        Ok(())
    }

    fn broadcast(&self, conversation: &str, user: &str, text: &str, ts: &str, thread_ts: Option<&str>) {
        let event = RealtimeEvent::MessageReceived(IncomingMessage {
            channel_id: conversation.to_string(),
            user_id: user.to_string(),
            text: text.to_string(),
            ts: ts.to_string(),
            thread_ts: thread_ts.map(str::to_string),
        });
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn ensure_conversation(&self, method: &str, conversation: &str) -> Result<()> {
        let known = self
            .data
            .lock()
            .conversations
            .iter()
            .any(|c| c.id == conversation);
        if known {
            Ok(())
        } else {
            Err(ShellError::api(method, "channel_not_found"))
        }
    }
}

#[async_trait]
impl SlackApi for MemoryWorkspace {
    async fn auth_test(&self) -> Result<Identity> {
        self.check("auth.test")?;
        Ok(self.identity.clone())
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        self.check("conversations.list")?;
        Ok(self
            .data
            .lock()
            .conversations
            .iter()
            .filter(|c| !c.is_direct() && !c.is_archived)
            .cloned()
            .collect())
    }

    async fn list_direct_messages(&self) -> Result<Vec<Conversation>> {
        self.check("conversations.list")?;
        Ok(self
            .data
            .lock()
            .conversations
            .iter()
            .filter(|c| c.is_direct())
            .cloned()
            .collect())
    }

    async fn list_members(&self, conversation: &str, limit: usize) -> Result<Vec<String>> {
        self.check("conversations.members")?;
        self.ensure_conversation("conversations.members", conversation)?;
        Ok(self
            .data
            .lock()
            .members
            .get(conversation)
            .map(|m| m.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn get_messages(
        &self,
        conversation: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<MessagePage> {
        self.check("conversations.history")?;
        self.ensure_conversation("conversations.history", conversation)?;

        let data = self.data.lock();
        let older: Vec<&Message> = data
            .history
            .get(conversation)
            .map(|h| {
                h.iter()
                    .filter(|m| before.map_or(true, |b| compare_slack_ts(&m.ts, b).is_lt()))
                    .collect()
            })
            .unwrap_or_default();

        let start = older.len().saturating_sub(limit);
        Ok(MessagePage {
            messages: older[start..].iter().map(|m| (*m).clone()).collect(),
            has_more: start > 0,
        })
    }

    async fn get_thread_replies(&self, conversation: &str, root_ts: &str) -> Result<Vec<Message>> {
        self.check("conversations.replies")?;
        let data = self.data.lock();
        let root = data
            .history
            .get(conversation)
            .and_then(|h| h.iter().find(|m| m.ts == root_ts))
            .cloned()
            .ok_or_else(|| ShellError::api("conversations.replies", "thread_not_found"))?;

        let mut thread = vec![root];
        if let Some(replies) = data.replies.get(&(conversation.to_string(), root_ts.to_string())) {
            thread.extend(replies.iter().cloned());
        }
        Ok(thread)
    }

    async fn post_message(&self, conversation: &str, text: &str) -> Result<String> {
        self.check("chat.postMessage")?;
        self.ensure_conversation("chat.postMessage", conversation)?;
        let me = self.identity.user_id.clone();
        let ts = self.post_as(conversation, &me, text);
        self.broadcast(conversation, &me, text, &ts, None);
        Ok(ts)
    }

    async fn post_reply(&self, conversation: &str, root_ts: &str, text: &str) -> Result<String> {
        self.check("chat.postMessage")?;
        self.ensure_conversation("chat.postMessage", conversation)?;
        let me = self.identity.user_id.clone();
        let ts = self.reply_as(conversation, root_ts, &me, text);
        self.broadcast(conversation, &me, text, &ts, Some(root_ts));
        Ok(ts)
    }

    async fn edit_message(&self, conversation: &str, ts: &str, text: &str) -> Result<()> {
        self.check("chat.update")?;
        let mut data = self.data.lock();
        let message = data
            .find_mut(conversation, ts)
            .ok_or_else(|| ShellError::api("chat.update", "message_not_found"))?;
        message.text = text.to_string();
        Ok(())
    }

    async fn delete_message(&self, conversation: &str, ts: &str) -> Result<()> {
        self.check("chat.delete")?;
        let mut data = self.data.lock();
        if let Some(history) = data.history.get_mut(conversation) {
            if let Some(pos) = history.iter().position(|m| m.ts == ts) {
                history.remove(pos);
                return Ok(());
            }
        }
        for ((conv, _), replies) in data.replies.iter_mut() {
            if conv == conversation {
                if let Some(pos) = replies.iter().position(|m| m.ts == ts) {
                    replies.remove(pos);
                    return Ok(());
                }
            }
        }
        Err(ShellError::api("chat.delete", "message_not_found"))
    }

    async fn resolve_users(&self, ids: &[String]) -> Result<Vec<UserRecord>> {
        self.check("users.info")?;
        let data = self.data.lock();
        Ok(ids.iter().filter_map(|id| data.users.get(id).cloned()).collect())
    }
}

/// Realtime source fed by a [`MemoryWorkspace`].
///
/// With `chatter` set, a seeded user posts to `general` at that interval.
#[derive(Debug, Clone)]
pub struct MemoryRealtime {
    workspace: Arc<MemoryWorkspace>,
    chatter: Option<Duration>,
}

impl MemoryRealtime {
    /// A source that only forwards posts.
    pub fn new(workspace: Arc<MemoryWorkspace>) -> Self {
        Self {
            workspace,
            chatter: None,
        }
    }

    /// Also simulate other users talking.
    pub fn with_chatter(mut self, every: Duration) -> Self {
        self.chatter = Some(every);
        self
    }
}

const CHATTER: &[(&str, &str, &str)] = &[
    ("C001", "U001", "Standup in five minutes"),
    ("C002", "U002", "Deploying to staging"),
    ("D001", "U003", "did you see the release notes?"),
    ("C004", "U001", "<!here> cake in the kitchen"),
    ("C001", "U003", "ping <@U000>"),
];

impl RealtimeSource for MemoryRealtime {
    fn spawn(&self, tx: UnboundedSender<RealtimeEvent>, cancel: CancellationToken) -> JoinHandle<()> {
        let workspace = Arc::clone(&self.workspace);
        let chatter = self.chatter;

        let _ = tx.send(RealtimeEvent::Connected);
        workspace.subscribers.lock().push(tx.clone());

        tokio::spawn(async move {
            let Some(every) = chatter else {
                cancel.cancelled().await;
                let _ = tx.send(RealtimeEvent::Disconnected);
                return;
            };

            let mut ticker = tokio::time::interval(every);
            // The first tick fires immediately
            ticker.tick().await;
            for (channel, user, text) in CHATTER.iter().cycle() {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        workspace.inject(channel, user, text);
                    }
                }
            }
            let _ = tx.send(RealtimeEvent::Disconnected);
        })
    }
}
