//! Slack Web API client over `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use super::SlackApi;
use crate::error::{Result, ShellError};
use crate::model::{
    Attachment, Conversation, ConversationKind, Identity, Message, MessagePage, Reaction,
    UserRecord,
};

const API_BASE: &str = "https://slack.com/api";

/// Request timeout for every call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size for list endpoints.
const LIST_PAGE_SIZE: usize = 1000;

/// Replies fetched per thread.
const THREAD_LIMIT: usize = 100;

/// `ok`/`error` envelope wrapped around every response body.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    data: T,
}

#[derive(Debug, Default, Deserialize)]
struct Empty {}

#[derive(Debug, Default, Deserialize)]
struct AuthTestResponse {
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    team_id: String,
    #[serde(default)]
    team: String,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationsListResponse {
    #[serde(default)]
    channels: Vec<WireConversation>,
    #[serde(default)]
    response_metadata: ResponseMetadata,
}

#[derive(Debug, Deserialize)]
struct WireConversation {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    is_private: bool,
    #[serde(default)]
    is_im: bool,
    #[serde(default)]
    is_mpim: bool,
    #[serde(default)]
    is_member: bool,
    #[serde(default)]
    is_ext_shared: bool,
    #[serde(default)]
    is_archived: bool,
    #[serde(default)]
    user: Option<String>,
}

impl From<WireConversation> for Conversation {
    fn from(wire: WireConversation) -> Self {
        let kind = if wire.is_im {
            ConversationKind::DirectMessage
        } else if wire.is_mpim {
            ConversationKind::GroupDirectMessage
        } else if wire.is_private {
            ConversationKind::PrivateChannel
        } else {
            ConversationKind::PublicChannel
        };
        Self {
            id: wire.id,
            name: wire.name,
            kind,
            // DMs always include us
            is_member: wire.is_member || kind.is_direct(),
            is_ext_shared: wire.is_ext_shared,
            is_archived: wire.is_archived,
            user_id: wire.user,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct MembersResponse {
    #[serde(default)]
    members: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    messages: Vec<WireMessage>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct WireReaction {
    name: String,
    #[serde(default)]
    count: u32,
    #[serde(default)]
    users: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WireAttachment {
    #[serde(default)]
    title: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct WireBotProfile {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    ts: String,
    #[serde(default)]
    user: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    thread_ts: Option<String>,
    #[serde(default)]
    reply_count: u32,
    #[serde(default)]
    reactions: Vec<WireReaction>,
    #[serde(default)]
    attachments: Vec<WireAttachment>,
    #[serde(default)]
    bot_id: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    bot_profile: Option<WireBotProfile>,
}

impl From<WireMessage> for Message {
    fn from(wire: WireMessage) -> Self {
        let bot_name = wire
            .bot_profile
            .map(|p| p.name)
            .filter(|n| !n.is_empty())
            .or(wire.username);
        Self {
            is_bot: wire.bot_id.is_some() && wire.user.is_empty(),
            ts: wire.ts,
            user: wire.user,
            text: wire.text,
            thread_ts: wire.thread_ts,
            reply_count: wire.reply_count,
            reactions: wire
                .reactions
                .into_iter()
                .map(|r| Reaction {
                    name: r.name,
                    count: r.count,
                    users: r.users,
                })
                .collect(),
            attachments: wire
                .attachments
                .into_iter()
                .map(|a| Attachment {
                    title: a.title,
                    text: a.text,
                })
                .collect(),
            bot_name,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PostResponse {
    #[serde(default)]
    ts: String,
}

#[derive(Debug, Default, Deserialize)]
struct UserInfoResponse {
    #[serde(default)]
    user: Option<WireUser>,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    real_name: String,
    #[serde(default)]
    profile: WireProfile,
}

#[derive(Debug, Default, Deserialize)]
struct WireProfile {
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    real_name: String,
}

impl From<WireUser> for UserRecord {
    fn from(wire: WireUser) -> Self {
        let real_name = if wire.profile.real_name.is_empty() {
            wire.real_name
        } else {
            wire.profile.real_name
        };
        Self {
            id: wire.id,
            name: wire.name,
            display_name: wire.profile.display_name,
            real_name,
        }
    }
}

/// Web API client authenticated with a user token.
#[derive(Debug, Clone)]
pub struct HttpSlackApi {
    client: Client,
    token: String,
    base: String,
}

impl HttpSlackApi {
    /// Create a client for `token`.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base(token, API_BASE)
    }

    /// Create a client against another API root.
    pub fn with_base(token: impl Into<String>, base: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("slack-shell/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ShellError::http("failed to build HTTP client", e))?;
        Ok(Self {
            client,
            token: token.into(),
            base: base.into(),
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.base)
    }

    async fn get<T>(&self, method: &str, query: &[(&str, String)]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let request = self
            .client
            .get(self.url(method))
            .bearer_auth(&self.token)
            .query(query);
        self.send(method, request).await
    }

    async fn post<T>(&self, method: &str, body: serde_json::Value) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let request = self
            .client
            .post(self.url(method))
            .bearer_auth(&self.token)
            .json(&body);
        self.send(method, request).await
    }

    async fn send<T>(&self, method: &str, request: RequestBuilder) -> Result<T>
    where
        T: DeserializeOwned,
    {
        debug!(method, "Slack API call");
        let response = request
            .send()
            .await
            .map_err(|e| ShellError::http(format!("{method} request failed"), e))?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("?")
                .to_string();
            warn!(method, retry_after, "Rate limited");
            return Err(ShellError::api(method, format!("ratelimited (retry after {retry_after}s)")));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| ShellError::http(format!("{method} returned an unreadable body"), e))?;

        if !envelope.ok {
            let error = envelope.error.unwrap_or_else(|| "unknown error".into());
            return Err(ShellError::api(method, error));
        }
        Ok(envelope.data)
    }

    async fn list_by_types(&self, types: &str) -> Result<Vec<Conversation>> {
        let mut conversations = Vec::new();
        let mut cursor = String::new();

        loop {
            let mut query = vec![
                ("types", types.to_string()),
                ("exclude_archived", "true".to_string()),
                ("limit", LIST_PAGE_SIZE.to_string()),
            ];
            if !cursor.is_empty() {
                query.push(("cursor", cursor.clone()));
            }

            let page: ConversationsListResponse = self.get("conversations.list", &query).await?;
            conversations.extend(page.channels.into_iter().map(Conversation::from));

            cursor = page.response_metadata.next_cursor;
            if cursor.is_empty() {
                break;
            }
        }

        Ok(conversations)
    }
}

#[async_trait]
impl SlackApi for HttpSlackApi {
    async fn auth_test(&self) -> Result<Identity> {
        let auth: AuthTestResponse = self.post("auth.test", serde_json::json!({})).await?;
        Ok(Identity {
            user_id: auth.user_id,
            team_id: auth.team_id,
            team_name: auth.team,
        })
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        self.list_by_types("public_channel,private_channel").await
    }

    async fn list_direct_messages(&self) -> Result<Vec<Conversation>> {
        self.list_by_types("im,mpim").await
    }

    async fn list_members(&self, conversation: &str, limit: usize) -> Result<Vec<String>> {
        let response: MembersResponse = self
            .get(
                "conversations.members",
                &[
                    ("channel", conversation.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        Ok(response.members)
    }

    async fn get_messages(
        &self,
        conversation: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<MessagePage> {
        let mut query = vec![
            ("channel", conversation.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(ts) = before {
            query.push(("latest", ts.to_string()));
            query.push(("inclusive", "false".to_string()));
        }

        let history: HistoryResponse = self.get("conversations.history", &query).await?;

        // History arrives newest first
        let mut messages: Vec<Message> = history.messages.into_iter().map(Message::from).collect();
        messages.reverse();

        Ok(MessagePage {
            messages,
            has_more: history.has_more,
        })
    }

    async fn get_thread_replies(&self, conversation: &str, root_ts: &str) -> Result<Vec<Message>> {
        let replies: HistoryResponse = self
            .get(
                "conversations.replies",
                &[
                    ("channel", conversation.to_string()),
                    ("ts", root_ts.to_string()),
                    ("limit", THREAD_LIMIT.to_string()),
                ],
            )
            .await?;
        Ok(replies.messages.into_iter().map(Message::from).collect())
    }

    async fn post_message(&self, conversation: &str, text: &str) -> Result<String> {
        let posted: PostResponse = self
            .post(
                "chat.postMessage",
                serde_json::json!({ "channel": conversation, "text": text }),
            )
            .await?;
        Ok(posted.ts)
    }

    async fn post_reply(&self, conversation: &str, root_ts: &str, text: &str) -> Result<String> {
        let posted: PostResponse = self
            .post(
                "chat.postMessage",
                serde_json::json!({
                    "channel": conversation,
                    "text": text,
                    "thread_ts": root_ts,
                }),
            )
            .await?;
        Ok(posted.ts)
    }

    async fn edit_message(&self, conversation: &str, ts: &str, text: &str) -> Result<()> {
        let _: Empty = self
            .post(
                "chat.update",
                serde_json::json!({ "channel": conversation, "ts": ts, "text": text }),
            )
            .await?;
        Ok(())
    }

    async fn delete_message(&self, conversation: &str, ts: &str) -> Result<()> {
        let _: Empty = self
            .post(
                "chat.delete",
                serde_json::json!({ "channel": conversation, "ts": ts }),
            )
            .await?;
        Ok(())
    }

    async fn resolve_users(&self, ids: &[String]) -> Result<Vec<UserRecord>> {
        let lookups = ids.iter().map(|id| async move {
            let info: Result<UserInfoResponse> =
                self.get("users.info", &[("user", id.clone())]).await;
            (id, info)
        });

        let mut records = Vec::with_capacity(ids.len());
        for (id, info) in join_all(lookups).await {
            match info {
                Ok(UserInfoResponse { user: Some(user) }) => records.push(UserRecord::from(user)),
                Ok(UserInfoResponse { user: None }) => {}
                // One bad ID should not hide the others
                Err(ShellError::Api { message, .. }) if message == "user_not_found" => {
                    debug!(user = %id, "Unknown user");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }
}
