//! Fixed window state storage.

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::trace;

use super::key::ClientKey;

/// Window state for a single client key.
#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    /// Requests counted since `window_start`, denied ones included
    count: u64,
    /// When the current window opened
    window_start: Instant,
    /// Length of the window this entry was opened with
    window: Duration,
}

impl WindowEntry {
    fn open(now: Instant, window: Duration) -> Self {
        Self {
            count: 1,
            window_start: now,
            window,
        }
    }

    /// `None` when the end lies beyond what `Instant` can represent.
    fn window_end(&self) -> Option<Instant> {
        self.window_start.checked_add(self.window)
    }

    fn is_elapsed(&self, now: Instant) -> bool {
        self.window_end().is_some_and(|end| now >= end)
    }

    fn is_idle(&self, now: Instant, idle_threshold: Duration) -> bool {
        self.window_end()
            .and_then(|end| end.checked_add(idle_threshold))
            .is_some_and(|deadline| now > deadline)
    }
}

/// Result of advancing a key's window, read under the same lock that
/// performed the update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// Count after this request was recorded
    pub count: u64,
    /// Start of the window the request was recorded in
    pub window_start: Instant,
}

/// Concurrency-safe mapping from client key to window state.
///
/// Backed by a sharded map: operations on the same key are serialized by
/// its shard lock, keys on different shards never contend.
#[derive(Debug, Default)]
pub struct WindowStore {
    entries: DashMap<ClientKey, WindowEntry>,
}

impl WindowStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Record one request for `key` at `now` and return the resulting state.
    ///
    /// Opens a fresh window with a count of one when the key is new or its
    /// window has elapsed; otherwise increments the count in place. The
    /// lookup, the reset decision and the increment happen under a single
    /// shard lock, so concurrent callers on one key are linearizable.
    pub fn get_and_advance(&self, key: &ClientKey, now: Instant, window: Duration) -> WindowState {
        let entry = match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.is_elapsed(now) {
                    trace!(key = %key, "Window elapsed, opening a new one");
                    *entry = WindowEntry::open(now, window);
                } else {
                    entry.count = entry.count.saturating_add(1);
                }
                *entry
            }
            Entry::Vacant(vacant) => {
                trace!(key = %key, "Opening first window for key");
                *vacant.insert(WindowEntry::open(now, window))
            }
        };

        WindowState {
            count: entry.count,
            window_start: entry.window_start,
        }
    }

    /// Remove entries whose window ended more than `idle_threshold` before `now`.
    ///
    /// Each shard is locked while it is filtered, so an entry touched by a
    /// concurrent `get_and_advance` is either seen with its fresh window and
    /// kept, or removed before the touch and recreated with a new window.
    /// The latter only starts the caller's count over; it is an accepted race.
    ///
    /// Returns the number of evicted entries.
    pub fn sweep(&self, now: Instant, idle_threshold: Duration) -> usize {
        let mut evicted = 0;
        self.entries.retain(|_, entry| {
            let idle = entry.is_idle(now, idle_threshold);
            if idle {
                evicted += 1;
            }
            !idle
        });
        evicted
    }

    /// Get the count recorded in the key's current window.
    ///
    /// Returns `None` if the key has never been observed or was evicted.
    pub fn current_count(&self, key: &ClientKey) -> Option<u64> {
        self.entries.get(key).map(|entry| entry.count)
    }

    /// Snapshot of the keys currently tracked.
    pub fn keys(&self) -> Vec<ClientKey> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn contains(&self, key: &ClientKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Get the number of tracked keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all window state.
    pub fn clear(&self) {
        self.entries.clear();
    }
}
