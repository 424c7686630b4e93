//! Named re-entrant-by-id mutex registry: `lock(id)` / `unlock(id)` where
//! `id` is an opaque string. Each id maps to a reference-counted mutex
//! entry; the entry is created on first lock and dropped once its count
//! returns to zero. This mirrors the original `Lock`/`Unlock` pair rather
//! than Rust's usual RAII guard, so callers must pair calls correctly —
//! same contract as the source it's grounded on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use lock_api::RawMutex as _;
use parking_lot::{Mutex, RawMutex};

struct Entry {
    raw: RawMutex,
    count: AtomicUsize,
}

#[derive(Default)]
pub struct NamedMutexRegistry {
    entries: Mutex<HashMap<String, Arc<Entry>>>,
}

impl NamedMutexRegistry {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    /// Blocks until the mutex for `id` is acquired. Must be paired with a
    /// later call to [`unlock`](Self::unlock) with the same id.
    pub fn lock(&self, id: &str) {
        let entry = {
            let mut entries = self.entries.lock();
            let entry = entries
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(Entry { raw: RawMutex::INIT, count: AtomicUsize::new(0) }))
                .clone();
            entry.count.fetch_add(1, Ordering::SeqCst);
            entry
        };
        // The registry lock is released before blocking on the per-id raw
        // mutex, so concurrent lockers of *other* ids are never stuck
        // behind this one, and a concurrent `unlock` of the same id can
        // still reach the registry to find this entry.
        entry.raw.lock();
    }

    /// Releases the mutex for `id`. No-op if `id` was never locked (mirrors
    /// the source, which silently tolerates an unmatched unlock).
    pub fn unlock(&self, id: &str) {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get(id).cloned() else { return };
        // Safety: callers are contractually required to pair lock/unlock
        // calls by id, so the raw mutex is held by the current thread.
        unsafe { entry.raw.unlock() };
        if entry.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            entries.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    #[test]
    fn serializes_access_to_the_same_id() {
        let registry = Arc::new(NamedMutexRegistry::new());
        let counter = Arc::new(AtomicUsize::new(0));
        let overlap_seen = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                let counter = counter.clone();
                let overlap_seen = overlap_seen.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    registry.lock("player-1");
                    let before = counter.fetch_add(1, Ordering::SeqCst);
                    if before != 0 {
                        overlap_seen.fetch_add(1, Ordering::SeqCst);
                    }
                    counter.fetch_sub(1, Ordering::SeqCst);
                    registry.unlock("player-1");
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(overlap_seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn different_ids_do_not_block_each_other() {
        let registry = NamedMutexRegistry::new();
        registry.lock("a");
        registry.lock("b");
        registry.unlock("a");
        registry.unlock("b");
    }

    #[test]
    fn entry_is_dropped_once_fully_unlocked() {
        let registry = NamedMutexRegistry::new();
        registry.lock("ephemeral");
        registry.unlock("ephemeral");
        assert!(!registry.entries.lock().contains_key("ephemeral"));
    }

    #[test]
    fn unlock_without_lock_is_a_no_op() {
        let registry = NamedMutexRegistry::new();
        registry.unlock("never-locked");
    }
}
