//! Workspace-scoped caches with TTL and on-disk snapshots.
//!
//! Two stores live here:
//! - [`UserCache`]: user ID to name records (`users.json`)
//! - [`ConversationCache`]: channel and DM lists (`channels.json`)
//!
//! Reads are stale-while-revalidate: a stored value is always returned and
//! `is_expired` is the only freshness signal. Snapshots are versioned and
//! scoped to a team ID; a snapshot written for another team is ignored.
//! Both stores take a single `parking_lot::RwLock`, so they can be shared
//! between the event loop and background tasks.

mod conversations;
mod users;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Result, ShellError};
use crate::util::atomic_write;

pub use conversations::ConversationCache;
pub use users::UserCache;

/// Default TTL for user records.
pub const DEFAULT_USER_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default TTL for conversation lists.
pub const DEFAULT_CONVERSATION_TTL: Duration = Duration::from_secs(60 * 60);

/// Snapshot format version.
const SNAPSHOT_VERSION: u32 = 1;

/// A cached value and when it was fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// The cached value.
    pub value: T,
    /// Fetch time.
    pub fetched_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    /// Stamp a value with the current time.
    pub fn new(value: T) -> Self {
        Self {
            value,
            fetched_at: Utc::now(),
        }
    }

    /// Whether the entry is older than `ttl`.
    pub fn is_expired(&self, ttl: Duration) -> bool {
        let age = Utc::now().signed_duration_since(self.fetched_at);
        match age.to_std() {
            Ok(age) => age > ttl,
            // Fetched "in the future" after a clock step
            Err(_) => false,
        }
    }
}

/// On-disk envelope shared by both stores.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot<B> {
    version: u32,
    team_id: String,
    updated_at: DateTime<Utc>,
    #[serde(flatten)]
    body: B,
}

/// Read a snapshot body for `team_id`.
///
/// Returns `Ok(None)` when the file is missing, has another version, or
/// belongs to another team.
fn load_snapshot<B: DeserializeOwned>(path: &Path, team_id: &str) -> Result<Option<B>> {
    if !path.exists() {
        return Ok(None);
    }

    let file = File::open(path).map_err(|e| {
        ShellError::io(format!("Failed to open cache file: {}", path.display()), e)
    })?;
    let snapshot: Snapshot<B> =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            ShellError::SerializationError {
                context: format!("Failed to deserialize cache: {}", path.display()),
                source: e,
            }
        })?;

    if snapshot.version != SNAPSHOT_VERSION {
        debug!(path = %path.display(), version = snapshot.version, "Skipping cache with unknown version");
        return Ok(None);
    }
    if snapshot.team_id != team_id {
        debug!(path = %path.display(), "Skipping cache for another workspace");
        return Ok(None);
    }

    Ok(Some(snapshot.body))
}

/// Write a snapshot body for `team_id` atomically.
fn save_snapshot<B: Serialize>(path: &Path, team_id: &str, body: B) -> Result<()> {
    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION,
        team_id: team_id.to_string(),
        updated_at: Utc::now(),
        body,
    };
    let content = serde_json::to_vec_pretty(&snapshot).map_err(|e| {
        ShellError::SerializationError {
            context: "Failed to serialize cache".to_string(),
            source: e,
        }
    })?;
    atomic_write(path, &content)
}

/// The caches for one workspace.
#[derive(Debug, Clone)]
pub struct WorkspaceCaches {
    /// User names.
    pub users: Arc<UserCache>,
    /// Channel and DM lists.
    pub conversations: Arc<ConversationCache>,
}

impl WorkspaceCaches {
    /// Open the caches for `team_id` as configured.
    ///
    /// With caching disabled the stores live in memory only.
    pub fn open(config: &Config, team_id: &str) -> Self {
        let dir = if config.cache.enabled {
            match config.cache_dir() {
                Ok(root) => Some(root.join(team_id)),
                Err(e) => {
                    warn!("Cache directory unavailable, caching in memory: {e}");
                    None
                }
            }
        } else {
            None
        };

        Self::at(
            dir,
            team_id,
            config.cache.user_ttl(),
            config.cache.conversation_ttl(),
        )
    }

    /// Open the caches at an explicit directory (`None` for memory only).
    pub fn at(
        dir: Option<PathBuf>,
        team_id: &str,
        user_ttl: Duration,
        conversation_ttl: Duration,
    ) -> Self {
        Self {
            users: Arc::new(UserCache::new(
                dir.as_ref().map(|d| d.join("users.json")),
                team_id,
                user_ttl,
            )),
            conversations: Arc::new(ConversationCache::new(
                dir.as_ref().map(|d| d.join("channels.json")),
                team_id,
                conversation_ttl,
            )),
        }
    }

    /// Memory-only caches with default TTLs.
    pub fn in_memory(team_id: &str) -> Self {
        Self::at(None, team_id, DEFAULT_USER_TTL, DEFAULT_CONVERSATION_TTL)
    }

    /// Flush both stores; the first error is returned after trying both.
    pub fn save(&self) -> Result<()> {
        let users = self.users.save();
        let conversations = self.conversations.save();
        users.and(conversations)
    }

    /// Empty both stores.
    pub fn clear(&self) {
        self.users.clear();
        self.conversations.clear();
    }
}
