//! Per-paper lock registry
//!
//! Transitions on the same paper run one at a time; transitions on
//! different papers do not contend. An entry lives only while some
//! caller holds or waits on it.

use dashmap::DashMap;
use paperflow_types::PaperId;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct PaperLocks {
    locks: DashMap<PaperId, Arc<Mutex<()>>>,
}

impl PaperLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `paper_id`. Released when the guard drops.
    pub async fn lock(&self, paper_id: &PaperId) -> PaperLockGuard<'_> {
        // The map shard guard must be gone before awaiting
        let mutex = Arc::clone(self.locks.entry(paper_id.clone()).or_default().value());
        let guard = mutex.lock_owned().await;
        PaperLockGuard {
            locks: &self.locks,
            paper_id: paper_id.clone(),
            guard: Some(guard),
        }
    }

    /// Number of papers currently locked or awaited
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Exclusive access to one paper
#[derive(Debug)]
pub struct PaperLockGuard<'a> {
    locks: &'a DashMap<PaperId, Arc<Mutex<()>>>,
    paper_id: PaperId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PaperLockGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters clone the Arc under the shard lock, so a count of one
        // means only the map still refers to this mutex
        self.locks
            .remove_if(&self.paper_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_paper_is_serialized() {
        let locks = Arc::new(PaperLocks::new());
        let id = PaperId::new("p-1");

        let guard = locks.lock(&id).await;
        let contender = {
            let locks = locks.clone();
            let id = id.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(&id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_papers_do_not_contend() {
        let locks = PaperLocks::new();
        let _a = locks.lock(&PaperId::new("a")).await;
        let _b = locks.lock(&PaperId::new("b")).await;
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_entries_are_dropped_when_idle() {
        let locks = PaperLocks::new();
        for i in 0..100 {
            let _guard = locks.lock(&PaperId::new(format!("p-{}", i))).await;
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_entry_survives_while_contended() {
        let locks = Arc::new(PaperLocks::new());
        let id = PaperId::new("p-1");

        let guard = locks.lock(&id).await;
        let contender = {
            let locks = locks.clone();
            let id = id.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(&id).await;
                locks.len()
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The waiter still holds the mutex, so the entry stays
        drop(guard);
        assert_eq!(locks.len(), 1);
        assert_eq!(contender.await.unwrap(), 1);
        assert!(locks.is_empty());
    }
}
