//! One-shot background operations.
//!
//! A task runs against a [`TaskContext`] snapshot and reports back with a
//! single [`TaskResult`] tagged with the session generation and the target
//! conversation. Tasks are never cancelled; the session decides on arrival
//! whether a result still applies.

use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use super::events::AppEvent;
use crate::error::Result;
use crate::model::{Message, MessagePage};
use crate::shell::output::mentioned_users;
use crate::shell::{ensure_users, TaskContext};

/// Members fetched for mention completion.
pub const MEMBER_LIMIT: usize = 200;

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Newest page.
    LoadMessages {
        /// Page size.
        limit: usize,
    },
    /// The page before `before`.
    LoadOlder {
        /// Oldest loaded timestamp.
        before: String,
        /// Page size.
        limit: usize,
    },
    /// A thread, root first.
    LoadThread {
        /// Root timestamp.
        root_ts: String,
    },
    /// Member names for mention completion.
    LoadMembers,
    /// New top-level message.
    Post {
        /// Body.
        text: String,
    },
    /// Thread reply.
    Reply {
        /// Root timestamp.
        root_ts: String,
        /// Body.
        text: String,
    },
    /// Edit.
    Edit {
        /// Message timestamp.
        ts: String,
        /// New body.
        text: String,
    },
    /// Delete.
    Delete {
        /// Message timestamp.
        ts: String,
    },
}

impl Task {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LoadMessages { .. } => "load_messages",
            Self::LoadOlder { .. } => "load_older",
            Self::LoadThread { .. } => "load_thread",
            Self::LoadMembers => "load_members",
            Self::Post { .. } => "post",
            Self::Reply { .. } => "reply",
            Self::Edit { .. } => "edit",
            Self::Delete { .. } => "delete",
        }
    }
}

/// How a task ended.
#[derive(Debug)]
pub enum TaskOutcome {
    /// Newest page.
    Messages(Result<MessagePage>),
    /// Older page.
    OlderPage(Result<MessagePage>),
    /// Thread, root first.
    Thread {
        /// Root timestamp.
        root_ts: String,
        /// Root and replies.
        result: Result<Vec<Message>>,
    },
    /// Member display names in membership order.
    Members(Result<Vec<String>>),
    /// A post or reply.
    Sent {
        /// Root timestamp for replies.
        thread_ts: Option<String>,
        /// Body as posted.
        text: String,
        /// New message timestamp.
        result: Result<String>,
    },
    /// An edit.
    Edited {
        /// Message timestamp.
        ts: String,
        /// New body.
        text: String,
        /// Outcome.
        result: Result<()>,
    },
    /// A delete.
    Deleted {
        /// Message timestamp.
        ts: String,
        /// Outcome.
        result: Result<()>,
    },
}

/// A finished task, tagged for relevance checks.
#[derive(Debug)]
pub struct TaskResult {
    /// Session generation when the task was created.
    pub generation: u64,
    /// Conversation the task targeted.
    pub conversation: String,
    /// Outcome.
    pub outcome: TaskOutcome,
}

/// Spawns tasks and routes their results into the session queue.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    tx: UnboundedSender<AppEvent>,
}

impl TaskRunner {
    /// Report into `tx`.
    pub fn new(tx: UnboundedSender<AppEvent>) -> Self {
        Self { tx }
    }

    /// Run `task` in the background.
    pub fn spawn(&self, ctx: TaskContext, conversation: String, task: Task) {
        debug!(task = task.name(), conversation = %conversation, generation = ctx.generation, "Scheduling task");
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let outcome = run(&ctx, &conversation, task).await;
            let result = TaskResult {
                generation: ctx.generation,
                conversation,
                outcome,
            };
            if tx.send(AppEvent::Task(result)).is_err() {
                debug!("Session gone, dropping task result");
            }
        });
    }
}

/// Resolve authors and mentioned users so rendering finds their names.
async fn resolve_authors(ctx: &TaskContext, messages: &[Message]) {
    let mut ids: Vec<String> = messages.iter().map(|m| m.user.clone()).collect();
    for message in messages {
        ids.extend(mentioned_users(&message.text));
    }
    ensure_users(ctx.api.as_ref(), &ctx.caches.users, &ids).await;
}

/// Execute a task to completion.
pub async fn run(ctx: &TaskContext, conversation: &str, task: Task) -> TaskOutcome {
    let api = ctx.api.as_ref();
    match task {
        Task::LoadMessages { limit } => {
            let result = api.get_messages(conversation, limit, None).await;
            if let Ok(page) = &result {
                resolve_authors(ctx, &page.messages).await;
            }
            TaskOutcome::Messages(result)
        }
        Task::LoadOlder { before, limit } => {
            let result = api.get_messages(conversation, limit, Some(&before)).await;
            if let Ok(page) = &result {
                resolve_authors(ctx, &page.messages).await;
            }
            TaskOutcome::OlderPage(result)
        }
        Task::LoadThread { root_ts } => {
            let result = api.get_thread_replies(conversation, &root_ts).await;
            if let Ok(messages) = &result {
                resolve_authors(ctx, messages).await;
            }
            TaskOutcome::Thread { root_ts, result }
        }
        Task::LoadMembers => {
            let result = match api.list_members(conversation, MEMBER_LIMIT).await {
                Ok(ids) => {
                    ensure_users(api, &ctx.caches.users, &ids).await;
                    Ok(ids
                        .iter()
                        .filter(|id| **id != ctx.user_id)
                        .filter_map(|id| ctx.caches.users.name(id, ctx.name_format))
                        .collect())
                }
                Err(e) => Err(e),
            };
            TaskOutcome::Members(result)
        }
        Task::Post { text } => {
            let result = api.post_message(conversation, &text).await;
            TaskOutcome::Sent {
                thread_ts: None,
                text,
                result,
            }
        }
        Task::Reply { root_ts, text } => {
            let result = api.post_reply(conversation, &root_ts, &text).await;
            TaskOutcome::Sent {
                thread_ts: Some(root_ts),
                text,
                result,
            }
        }
        Task::Edit { ts, text } => {
            let result = api.edit_message(conversation, &ts, &text).await;
            TaskOutcome::Edited { ts, text, result }
        }
        Task::Delete { ts } => {
            let result = api.delete_message(conversation, &ts).await;
            TaskOutcome::Deleted { ts, result }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemoryWorkspace;
    use crate::cache::WorkspaceCaches;
    use crate::model::NameFormat;

    fn context() -> (TaskContext, std::sync::Arc<MemoryWorkspace>) {
        let workspace = MemoryWorkspace::demo();
        let ctx = TaskContext {
            api: workspace.clone(),
            caches: WorkspaceCaches::in_memory("T000"),
            name_format: NameFormat::Username,
            generation: 3,
            user_id: "U000".to_string(),
        };
        (ctx, workspace)
    }

    #[tokio::test]
    async fn test_members_exclude_self_and_keep_order() {
        let (ctx, _) = context();
        match run(&ctx, "C001", Task::LoadMembers).await {
            TaskOutcome::Members(Ok(names)) => assert_eq!(names, vec!["alice", "albert", "bob"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_load_resolves_authors() {
        let (ctx, _) = context();
        let outcome = run(&ctx, "C001", Task::LoadMessages { limit: 50 }).await;
        assert!(matches!(outcome, TaskOutcome::Messages(Ok(_))));
        assert_eq!(
            ctx.caches.users.name("U001", NameFormat::Username).as_deref(),
            Some("alice")
        );
    }

    #[tokio::test]
    async fn test_runner_tags_results() {
        let (ctx, _) = context();
        let (tx, mut rx) = super::super::events::channel();
        TaskRunner::new(tx).spawn(ctx, "C004".to_string(), Task::Post { text: "hi".into() });

        match rx.recv().await {
            Some(AppEvent::Task(result)) => {
                assert_eq!(result.generation, 3);
                assert_eq!(result.conversation, "C004");
                assert!(matches!(
                    result.outcome,
                    TaskOutcome::Sent { thread_ts: None, result: Ok(_), .. }
                ));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_errors_are_results() {
        let (ctx, workspace) = context();
        workspace.fail_next("chat.delete", "cant_delete_message");
        let outcome = run(&ctx, "C001", Task::Delete { ts: "1.0".into() }).await;
        match outcome {
            TaskOutcome::Deleted { result: Err(e), .. } => {
                assert_eq!(e.to_string(), "chat.delete failed: cant_delete_message");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
