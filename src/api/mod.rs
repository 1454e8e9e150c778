//! Remote API surface.
//!
//! [`SlackApi`] is the seam between the session and the workspace. The
//! production implementation is [`HttpSlackApi`]; [`MemoryWorkspace`] serves
//! tests and the `--demo` mode. Realtime delivery lives in [`realtime`].

pub mod http;
pub mod memory;
pub mod realtime;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Conversation, Identity, Message, MessagePage, UserRecord};

pub use http::HttpSlackApi;
pub use memory::MemoryWorkspace;

/// Operations the session needs from a workspace.
///
/// Every call reports failures as [`ShellError`](crate::error::ShellError)
/// values; timeouts are the implementation's concern.
#[async_trait]
pub trait SlackApi: Send + Sync {
    /// Who the token belongs to.
    async fn auth_test(&self) -> Result<Identity>;

    /// Public and private channels, archived ones excluded.
    async fn list_conversations(&self) -> Result<Vec<Conversation>>;

    /// One-to-one and group DMs.
    async fn list_direct_messages(&self) -> Result<Vec<Conversation>>;

    /// Member user IDs of a conversation, at most `limit`.
    async fn list_members(&self, conversation: &str, limit: usize) -> Result<Vec<String>>;

    /// Up to `limit` messages older than `before` (newest page when `None`),
    /// oldest first.
    async fn get_messages(
        &self,
        conversation: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<MessagePage>;

    /// A thread root followed by its replies in timestamp order.
    async fn get_thread_replies(&self, conversation: &str, root_ts: &str) -> Result<Vec<Message>>;

    /// Post a message; returns its timestamp.
    async fn post_message(&self, conversation: &str, text: &str) -> Result<String>;

    /// Post a thread reply; returns its timestamp.
    async fn post_reply(&self, conversation: &str, root_ts: &str, text: &str) -> Result<String>;

    /// Replace a message's text.
    async fn edit_message(&self, conversation: &str, ts: &str, text: &str) -> Result<()>;

    /// Delete a message.
    async fn delete_message(&self, conversation: &str, ts: &str) -> Result<()>;

    /// Name records for user IDs; unknown IDs are omitted.
    async fn resolve_users(&self, ids: &[String]) -> Result<Vec<UserRecord>>;
}
