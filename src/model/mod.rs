//! Core data structures shared by the cache, the executor and the views.
//!
//! Conversations and messages are created by remote fetches and are
//! immutable afterwards, except for the in-place patches applied after a
//! send, edit or delete.

use serde::{Deserialize, Serialize};

/// Kind of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    /// Public channel.
    #[default]
    PublicChannel,
    /// Private channel.
    PrivateChannel,
    /// One-to-one direct message.
    DirectMessage,
    /// Multi-party direct message.
    GroupDirectMessage,
}

impl ConversationKind {
    /// Whether this kind is addressed with `@` rather than `#`.
    pub fn is_direct(self) -> bool {
        matches!(self, Self::DirectMessage | Self::GroupDirectMessage)
    }
}

/// A channel, private channel, DM or group DM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Conversation ID (`C…`, `G…`, `D…`).
    pub id: String,
    /// Display name; empty for one-to-one DMs.
    #[serde(default)]
    pub name: String,
    /// Conversation kind.
    #[serde(default)]
    pub kind: ConversationKind,
    /// Whether the current user is a member.
    #[serde(default)]
    pub is_member: bool,
    /// Shared with another organization.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_ext_shared: bool,
    /// Archived flag, refreshed on reload.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_archived: bool,
    /// Peer user for one-to-one DMs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Conversation {
    /// Build a public channel.
    pub fn channel(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: ConversationKind::PublicChannel,
            is_member: true,
            is_ext_shared: false,
            is_archived: false,
            user_id: None,
        }
    }

    /// Build a one-to-one DM with `user_id`.
    pub fn direct(id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            kind: ConversationKind::DirectMessage,
            is_member: true,
            is_ext_shared: false,
            is_archived: false,
            user_id: Some(user_id.into()),
        }
    }

    /// Mark as private.
    pub fn private(mut self) -> Self {
        self.kind = ConversationKind::PrivateChannel;
        self
    }

    /// Whether this is a DM or group DM.
    pub fn is_direct(&self) -> bool {
        self.kind.is_direct()
    }

    /// Whether this is a private channel.
    pub fn is_private(&self) -> bool {
        self.kind == ConversationKind::PrivateChannel
    }
}

/// An emoji reaction on a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    /// Emoji short name without colons.
    pub name: String,
    /// Number of reactors.
    pub count: u32,
    /// Reacting user IDs.
    #[serde(default)]
    pub users: Vec<String>,
}

/// A legacy message attachment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Attachment {
    /// Attachment title.
    #[serde(default)]
    pub title: String,
    /// Attachment body.
    #[serde(default)]
    pub text: String,
}

/// A single message. `ts` is the primary key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    /// Server timestamp, monotonic within a conversation.
    pub ts: String,
    /// Author user ID; empty for some bot posts.
    #[serde(default)]
    pub user: String,
    /// Body text.
    #[serde(default)]
    pub text: String,
    /// Root timestamp of the thread this message belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    /// Reply count on thread roots.
    #[serde(default)]
    pub reply_count: u32,
    /// Reactions.
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    /// Attachments.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Posted by a bot.
    #[serde(default)]
    pub is_bot: bool,
    /// Bot display name, when `is_bot`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_name: Option<String>,
}

impl Message {
    /// Build a plain text message.
    pub fn new(ts: impl Into<String>, user: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            ts: ts.into(),
            user: user.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    /// Attach the message to a thread root.
    pub fn in_thread(mut self, thread_ts: impl Into<String>) -> Self {
        self.thread_ts = Some(thread_ts.into());
        self
    }

    /// Timestamp that addresses this message's thread.
    ///
    /// Replies point at their root; anything else starts or is its own thread.
    pub fn thread_root(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }

    /// Whether the message belongs in the top-level list of a conversation.
    pub fn is_top_level(&self) -> bool {
        match &self.thread_ts {
            None => true,
            Some(root) => root.is_empty() || *root == self.ts,
        }
    }
}

/// One page of history, oldest message first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePage {
    /// Messages in ascending timestamp order.
    pub messages: Vec<Message>,
    /// Whether older messages exist before this page.
    pub has_more: bool,
}

/// A resolved user record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserRecord {
    /// User ID.
    pub id: String,
    /// Handle.
    pub name: String,
    /// Profile display name.
    #[serde(default)]
    pub display_name: String,
    /// Real name.
    #[serde(default)]
    pub real_name: String,
}

impl UserRecord {
    /// Preferred name under a naming format.
    pub fn preferred_name(&self, format: NameFormat) -> &str {
        format.pick(&self.name, &self.display_name, &self.real_name)
    }
}

/// Which user name to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameFormat {
    /// The handle.
    #[default]
    Username,
    /// Display name, then real name, then handle.
    DisplayName,
    /// Real name, then display name, then handle.
    RealName,
}

impl NameFormat {
    /// Choose among the three name fields, falling back when empty.
    pub fn pick<'a>(self, name: &'a str, display_name: &'a str, real_name: &'a str) -> &'a str {
        let order = match self {
            Self::Username => return name,
            Self::DisplayName => [display_name, real_name],
            Self::RealName => [real_name, display_name],
        };
        order.into_iter().find(|s| !s.is_empty()).unwrap_or(name)
    }
}

/// Who we are connected as.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Identity {
    /// Authenticated user ID.
    pub user_id: String,
    /// Workspace ID; scopes the on-disk cache.
    pub team_id: String,
    /// Workspace name, shown in the prompt.
    pub team_name: String,
}
