//! Notification idempotency keys with expiry
//!
//! A key is claimed with set-if-absent semantics: of any number of
//! concurrent claims for the same live key, exactly one succeeds. Expired
//! keys count as absent.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use paperflow_types::{NotificationKind, PaperId, StorageError, StorageResult};

/// `(event kind, entity id)`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub kind: NotificationKind,
    pub entity_id: String,
}

impl DedupKey {
    pub fn new(kind: NotificationKind, entity_id: impl Into<String>) -> Self {
        Self {
            kind,
            entity_id: entity_id.into(),
        }
    }

    /// Key guarding the overall-deadline notification of a paper
    pub fn paper_deadline(paper_id: &PaperId) -> Self {
        Self::new(NotificationKind::PaperDeadlineReached, paper_id.0.clone())
    }
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.entity_id)
    }
}

/// Idempotency-key storage with atomic set-if-absent and TTL
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Record `key` until `now + ttl` unless a live record exists.
    /// Returns `true` if this call created the record.
    async fn claim(&self, key: &DedupKey, ttl: Duration, now: DateTime<Utc>) -> StorageResult<bool>;

    /// Forget `key`, so the next claim succeeds
    async fn release(&self, key: &DedupKey) -> StorageResult<()>;

    /// Whether a live record exists for `key`
    async fn contains(&self, key: &DedupKey, now: DateTime<Utc>) -> StorageResult<bool>;

    /// Drop expired records, returning how many were removed
    async fn purge_expired(&self, now: DateTime<Utc>) -> StorageResult<usize>;
}

/// Dedup store backed by a concurrent map of key to expiry time
#[derive(Debug, Default)]
pub struct InMemoryDedupStore {
    entries: DashMap<DedupKey, DateTime<Utc>>,
}

impl InMemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl DedupStore for InMemoryDedupStore {
    async fn claim(
        &self,
        key: &DedupKey,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let expires_at = now.checked_add_signed(ttl).ok_or_else(|| {
            StorageError::Backend(format!(
                "dedup ttl of {}s for '{}' is out of range",
                ttl.num_seconds(),
                key
            ))
        })?;

        // The entry holds the shard write lock, making check-and-set atomic
        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if *entry.get() > now {
                    Ok(false)
                } else {
                    entry.insert(expires_at);
                    Ok(true)
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(expires_at);
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &DedupKey) -> StorageResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn contains(&self, key: &DedupKey, now: DateTime<Utc>) -> StorageResult<bool> {
        Ok(self
            .entries
            .get(key)
            .map(|expires_at| *expires_at > now)
            .unwrap_or(false))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StorageResult<usize> {
        let before = self.entries.len();
        self.entries.retain(|_, expires_at| *expires_at > now);
        Ok(before.saturating_sub(self.entries.len()))
    }
}
