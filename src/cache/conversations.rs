//! Channel and DM list cache.

use std::path::PathBuf;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{load_snapshot, save_snapshot, CacheEntry};
use crate::error::Result;
use crate::model::Conversation;

#[derive(Debug, Default, Serialize, Deserialize)]
struct ConversationsBody {
    #[serde(default)]
    channels: Option<CacheEntry<Vec<Conversation>>>,
    #[serde(default)]
    dms: Option<CacheEntry<Vec<Conversation>>>,
}

#[derive(Debug, Default)]
struct Inner {
    body: ConversationsBody,
    dirty: bool,
}

/// Thread-safe cache of the two conversation lists.
///
/// Each list carries its own fetch time; entries inside a list share it.
#[derive(Debug)]
pub struct ConversationCache {
    inner: RwLock<Inner>,
    path: Option<PathBuf>,
    team_id: String,
    ttl: Duration,
}

impl ConversationCache {
    /// Create the cache and load any snapshot for `team_id`.
    pub fn new(path: Option<PathBuf>, team_id: impl Into<String>, ttl: Duration) -> Self {
        let cache = Self {
            inner: RwLock::new(Inner::default()),
            path,
            team_id: team_id.into(),
            ttl,
        };
        if let Err(e) = cache.load() {
            warn!("Failed to load conversation cache: {e}");
        }
        cache
    }

    /// Cached channels, regardless of age.
    pub fn channels(&self) -> Option<Vec<Conversation>> {
        self.inner.read().body.channels.as_ref().map(|e| e.value.clone())
    }

    /// Cached DMs, regardless of age.
    pub fn dms(&self) -> Option<Vec<Conversation>> {
        self.inner.read().body.dms.as_ref().map(|e| e.value.clone())
    }

    /// Whether the channel list should be refetched; true when absent.
    pub fn channels_expired(&self) -> bool {
        self.inner
            .read()
            .body
            .channels
            .as_ref()
            .map_or(true, |e| e.is_expired(self.ttl))
    }

    /// Whether the DM list should be refetched; true when absent.
    pub fn dms_expired(&self) -> bool {
        self.inner
            .read()
            .body
            .dms
            .as_ref()
            .map_or(true, |e| e.is_expired(self.ttl))
    }

    /// Store the channel list.
    pub fn set_channels(&self, channels: Vec<Conversation>) {
        let mut guard = self.inner.write();
        guard.body.channels = Some(CacheEntry::new(channels));
        guard.dirty = true;
    }

    /// Store the DM list.
    pub fn set_dms(&self, dms: Vec<Conversation>) {
        let mut guard = self.inner.write();
        guard.body.dms = Some(CacheEntry::new(dms));
        guard.dirty = true;
    }

    /// Look up any cached conversation by ID.
    pub fn find(&self, id: &str) -> Option<Conversation> {
        let guard = self.inner.read();
        let found = [&guard.body.channels, &guard.body.dms]
            .into_iter()
            .flatten()
            .flat_map(|e| e.value.iter())
            .find(|c| c.id == id)
            .cloned();
        found
    }

    /// Whether unsaved changes exist.
    pub fn is_dirty(&self) -> bool {
        self.inner.read().dirty
    }

    /// Drop both lists.
    pub fn clear(&self) {
        let mut guard = self.inner.write();
        guard.body = ConversationsBody::default();
        guard.dirty = true;
    }

    /// Replace the contents with the snapshot on disk, if it matches this team.
    pub fn load(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let body: Option<ConversationsBody> = load_snapshot(path, &self.team_id)?;

        let mut guard = self.inner.write();
        guard.body = body.unwrap_or_default();
        guard.dirty = false;
        debug!(
            channels = guard.body.channels.as_ref().map_or(0, |e| e.value.len()),
            dms = guard.body.dms.as_ref().map_or(0, |e| e.value.len()),
            "Loaded conversation cache"
        );
        Ok(())
    }

    /// Persist when dirty.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let mut guard = self.inner.write();
        if !guard.dirty {
            return Ok(());
        }
        save_snapshot(path, &self.team_id, &guard.body)?;
        guard.dirty = false;
        debug!(path = %path.display(), "Saved conversation cache");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lists_are_independent() {
        let cache = ConversationCache::new(None, "T1", Duration::from_secs(60));
        assert!(cache.channels().is_none());
        assert!(cache.channels_expired());
        assert!(cache.dms_expired());

        cache.set_channels(vec![Conversation::channel("C1", "general")]);
        assert!(!cache.channels_expired());
        assert!(cache.dms_expired());
        assert_eq!(cache.channels().unwrap().len(), 1);
    }

    #[test]
    fn test_stale_list_still_served() {
        let cache = ConversationCache::new(None, "T1", Duration::from_millis(1));
        cache.set_dms(vec![Conversation::direct("D1", "U1")]);
        std::thread::sleep(Duration::from_millis(3));

        assert!(cache.dms_expired());
        assert_eq!(cache.dms().unwrap()[0].id, "D1");
    }

    #[test]
    fn test_find_across_lists() {
        let cache = ConversationCache::new(None, "T1", Duration::from_secs(60));
        cache.set_channels(vec![Conversation::channel("C1", "general")]);
        cache.set_dms(vec![Conversation::direct("D1", "U1")]);

        assert_eq!(cache.find("D1").and_then(|c| c.user_id), Some("U1".to_string()));
        assert!(cache.find("C9").is_none());
    }

    #[test]
    fn test_persist_round_trip_and_team_scope() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("channels.json");

        let cache = ConversationCache::new(Some(path.clone()), "T1", Duration::from_secs(60));
        cache.set_channels(vec![Conversation::channel("C1", "general").private()]);
        cache.save().unwrap();

        let reloaded = ConversationCache::new(Some(path.clone()), "T1", Duration::from_secs(60));
        let channels = reloaded.channels().unwrap();
        assert!(channels[0].is_private());
        assert!(!reloaded.is_dirty());

        let other = ConversationCache::new(Some(path), "T2", Duration::from_secs(60));
        assert!(other.channels().is_none());
    }
}
