//! User name cache.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{load_snapshot, save_snapshot, CacheEntry};
use crate::error::Result;
use crate::model::{NameFormat, UserRecord};

#[derive(Debug, Default, Serialize, Deserialize)]
struct UsersBody {
    #[serde(default)]
    users: HashMap<String, CacheEntry<UserRecord>>,
}

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<String, CacheEntry<UserRecord>>,
    dirty: bool,
}

/// Thread-safe user record cache for one workspace.
#[derive(Debug)]
pub struct UserCache {
    inner: RwLock<Inner>,
    path: Option<PathBuf>,
    team_id: String,
    ttl: Duration,
}

impl UserCache {
    /// Create the cache and load any snapshot for `team_id`.
    ///
    /// Load failures are logged and leave the cache empty.
    pub fn new(path: Option<PathBuf>, team_id: impl Into<String>, ttl: Duration) -> Self {
        let cache = Self {
            inner: RwLock::new(Inner::default()),
            path,
            team_id: team_id.into(),
            ttl,
        };
        if let Err(e) = cache.load() {
            warn!("Failed to load user cache: {e}");
        }
        cache
    }

    /// The configured TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Last stored record, regardless of age.
    pub fn get(&self, id: &str) -> Option<UserRecord> {
        self.inner.read().users.get(id).map(|e| e.value.clone())
    }

    /// Preferred display name of a user.
    pub fn name(&self, id: &str, format: NameFormat) -> Option<String> {
        self.inner
            .read()
            .users
            .get(id)
            .map(|e| e.value.preferred_name(format).to_string())
    }

    /// Records for every known ID in `ids`.
    pub fn get_many<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> HashMap<String, UserRecord> {
        let guard = self.inner.read();
        let records = ids
            .into_iter()
            .filter_map(|id| guard.users.get(id).map(|e| (id.to_string(), e.value.clone())))
            .collect();
        records
    }

    /// Whether a user should be refetched; true when absent.
    pub fn is_expired(&self, id: &str) -> bool {
        self.inner
            .read()
            .users
            .get(id)
            .map_or(true, |e| e.is_expired(self.ttl))
    }

    /// IDs from `ids` that are absent or expired, deduplicated in input order.
    pub fn stale_ids<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let guard = self.inner.read();
        let mut out: Vec<String> = Vec::new();
        for id in ids {
            if id.is_empty() || out.iter().any(|seen| seen == id) {
                continue;
            }
            let stale = guard.users.get(id).map_or(true, |e| e.is_expired(self.ttl));
            if stale {
                out.push(id.to_string());
            }
        }
        out
    }

    /// Store one record.
    pub fn set(&self, id: impl Into<String>, record: UserRecord) {
        let mut guard = self.inner.write();
        guard.users.insert(id.into(), CacheEntry::new(record));
        guard.dirty = true;
    }

    /// Store many records; an empty batch leaves the cache clean.
    pub fn set_batch(&self, records: impl IntoIterator<Item = UserRecord>) {
        let mut guard = self.inner.write();
        let mut added = false;
        for record in records {
            guard.users.insert(record.id.clone(), CacheEntry::new(record));
            added = true;
        }
        if added {
            guard.dirty = true;
        }
    }

    /// ID to handle map of every entry.
    pub fn to_map(&self) -> HashMap<String, String> {
        self.inner
            .read()
            .users
            .iter()
            .map(|(id, e)| (id.clone(), e.value.name.clone()))
            .collect()
    }

    /// Number of cached users.
    pub fn len(&self) -> usize {
        self.inner.read().users.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.read().users.is_empty()
    }

    /// Whether unsaved changes exist.
    pub fn is_dirty(&self) -> bool {
        self.inner.read().dirty
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut guard = self.inner.write();
        guard.users.clear();
        guard.dirty = true;
    }

    /// Replace the contents with the snapshot on disk, if it matches this team.
    pub fn load(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let body: Option<UsersBody> = load_snapshot(path, &self.team_id)?;

        let mut guard = self.inner.write();
        guard.users = body.map(|b| b.users).unwrap_or_default();
        guard.dirty = false;
        debug!(count = guard.users.len(), "Loaded user cache");
        Ok(())
    }

    /// Persist when dirty.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        // Hold the write lock so a concurrent set cannot be lost between
        // serialization and clearing the flag.
        let mut guard = self.inner.write();
        if !guard.dirty {
            return Ok(());
        }
        save_snapshot(path, &self.team_id, UsersBodyRef { users: &guard.users })?;
        guard.dirty = false;
        debug!(count = guard.users.len(), path = %path.display(), "Saved user cache");
        Ok(())
    }
}

#[derive(Serialize)]
struct UsersBodyRef<'a> {
    users: &'a HashMap<String, CacheEntry<UserRecord>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, name: &str) -> UserRecord {
        UserRecord {
            id: id.to_string(),
            name: name.to_string(),
            ..UserRecord::default()
        }
    }

    #[test]
    fn test_stale_while_revalidate() {
        let cache = UserCache::new(None, "T1", Duration::from_millis(1));
        cache.set("U1", user("U1", "alice"));
        assert_eq!(cache.name("U1", NameFormat::Username).as_deref(), Some("alice"));

        std::thread::sleep(Duration::from_millis(3));

        assert!(cache.is_expired("U1"));
        assert_eq!(cache.name("U1", NameFormat::Username).as_deref(), Some("alice"));
    }

    #[test]
    fn test_missing_is_expired() {
        let cache = UserCache::new(None, "T1", Duration::from_secs(60));
        assert!(cache.is_expired("U404"));
        assert!(cache.get("U404").is_none());
    }

    #[test]
    fn test_set_batch_and_stale_ids() {
        let cache = UserCache::new(None, "T1", Duration::from_secs(60));
        cache.set_batch(Vec::new());
        assert!(!cache.is_dirty());

        cache.set_batch(vec![user("U1", "alice"), user("U2", "bob")]);
        assert!(cache.is_dirty());
        assert_eq!(cache.len(), 2);
        assert_eq!(
            cache.stale_ids(["U1", "U3", "U3", "", "U2", "U4"]),
            vec!["U3".to_string(), "U4".to_string()]
        );
        assert_eq!(cache.get_many(["U2", "U9"]).len(), 1);
        assert_eq!(cache.to_map().get("U1").map(String::as_str), Some("alice"));
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("T1").join("users.json");

        let cache = UserCache::new(Some(path.clone()), "T1", Duration::from_secs(60));
        cache.set("U1", user("U1", "alice"));
        cache.save().unwrap();
        assert!(!cache.is_dirty());

        let reloaded = UserCache::new(Some(path.clone()), "T1", Duration::from_secs(60));
        assert_eq!(reloaded.get("U1").map(|u| u.name), Some("alice".to_string()));

        let foreign = UserCache::new(Some(path), "T2", Duration::from_secs(60));
        assert!(foreign.is_empty());
    }

    #[test]
    fn test_save_is_noop_when_clean() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("users.json");

        let cache = UserCache::new(Some(path.clone()), "T1", Duration::from_secs(60));
        cache.save().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_corrupt_snapshot_starts_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("users.json");
        std::fs::write(&path, "{not json").unwrap();

        let cache = UserCache::new(Some(path), "T1", Duration::from_secs(60));
        assert!(cache.is_empty());
    }
}
