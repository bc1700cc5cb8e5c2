//! Cache generations.
//!
//! A generation marks "the data currently cached was first written at epoch
//! N". Epochs come from one process-wide counter, so the generations of
//! different endpoints can be compared to tell which cache is older.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use crate::lock::lock;

/// Monotonic, process-wide generation counter value.
pub type Epoch = u64;

static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheGeneration {
    pub epoch: Epoch,
    pub created_at: SystemTime,
}

impl CacheGeneration {
    pub(crate) fn next() -> Self {
        Self {
            epoch: NEXT_EPOCH.fetch_add(1, Ordering::SeqCst),
            created_at: SystemTime::now(),
        }
    }

    pub fn is_newer_than(&self, other: &CacheGeneration) -> bool {
        self.epoch > other.epoch
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed().unwrap_or_default()
    }
}

impl PartialOrd for CacheGeneration {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for CacheGeneration {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.epoch.cmp(&other.epoch)
    }
}

/// Shared, optional generation of one store.
///
/// Cloning shares the cell, which lets a derived endpoint watch the
/// generation of the endpoint it depends on.
#[derive(Debug, Clone, Default)]
pub struct GenerationCell {
    current: Arc<Mutex<Option<CacheGeneration>>>,
}

impl GenerationCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<CacheGeneration> {
        *lock(&self.current, "generation.get")
    }

    /// Stamp a fresh generation unless one exists. Returns the new one.
    pub(crate) fn stamp_if_empty(&self) -> Option<CacheGeneration> {
        let mut current = lock(&self.current, "generation.stamp");
        if current.is_some() {
            return None;
        }
        let generation = CacheGeneration::next();
        *current = Some(generation);
        Some(generation)
    }

    pub(crate) fn take(&self) -> Option<CacheGeneration> {
        lock(&self.current, "generation.take").take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_once_until_taken() {
        let cell = GenerationCell::new();
        assert!(cell.get().is_none());

        let first = cell.stamp_if_empty().unwrap();
        assert!(cell.stamp_if_empty().is_none());
        assert_eq!(cell.get(), Some(first));

        assert_eq!(cell.take(), Some(first));
        assert!(cell.get().is_none());

        let second = cell.stamp_if_empty().unwrap();
        assert!(second.is_newer_than(&first));
        assert!(second > first);
    }

    #[test]
    fn test_epochs_ordered_across_cells() {
        let a = GenerationCell::new();
        let b = GenerationCell::new();
        let older = a.stamp_if_empty().unwrap();
        let newer = b.stamp_if_empty().unwrap();
        assert!(newer.is_newer_than(&older));
        assert!(!older.is_newer_than(&newer));
    }

    #[test]
    fn test_clone_shares_state() {
        let cell = GenerationCell::new();
        let watcher = cell.clone();
        cell.stamp_if_empty();
        assert_eq!(watcher.get(), cell.get());
    }
}
