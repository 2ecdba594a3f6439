//! Disposables tracker - weak registry of live native-resource owners
//!
//! Every variant `Disposer` and every `EngineObject` registers a weak
//! reference to itself here on creation and unregisters on disposal.
//! The registry never keeps anything alive. It exists for leak
//! diagnostics and for the shutdown sweep in `crate::cleanup`.
//!
//! Entries live in a sharded `DashMap`, so registration from many
//! threads only contends on the shard the token hashes to.


use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crate::config::TrackerConfig;
use crate::logging::{debug, log_leak, trace};

/// Global tracker, sized from config on `init` or defaults on first use
static TRACKER: OnceCell<DisposablesTracker> = OnceCell::new();

/// A native-resource owner that can be force-released.
pub trait Disposable: Send + Sync {
    /// Release the owned resource. Must be idempotent.
    fn dispose(&self);

    /// Short description for leak reports
    fn describe(&self) -> String;
}

/// Registration receipt. Not `Clone`: one owner, one entry.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct TrackingToken(u64);

impl TrackingToken {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// One live entry, as reported by `snapshot`
#[derive(Debug, Clone)]
pub struct LeakRecord {
    pub token: u64,
    pub description: String,
}

/// Tracker statistics for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    pub live: usize,
    pub registered: usize,
    pub unregistered: usize,
}

pub struct DisposablesTracker {
    entries: DashMap<u64, Weak<dyn Disposable>>,
    next_token: AtomicU64,
    registered: AtomicUsize,
    unregistered: AtomicUsize,
}

impl DisposablesTracker {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            entries: DashMap::with_capacity_and_shard_amount(
                config.initial_capacity,
                config.effective_shards(),
            ),
            next_token: AtomicU64::new(1),
            registered: AtomicUsize::new(0),
            unregistered: AtomicUsize::new(0),
        }
    }

    pub fn register(&self, owner: Weak<dyn Disposable>) -> TrackingToken {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(token, owner);
        self.registered.fetch_add(1, Ordering::Relaxed);
        trace!(event = "disposable_registered", token);
        TrackingToken(token)
    }

    /// Remove an entry. Unknown tokens are ignored.
    pub fn unregister(&self, token: &TrackingToken) {
        if self.entries.remove(&token.0).is_some() {
            self.unregistered.fetch_add(1, Ordering::Relaxed);
            trace!(event = "disposable_unregistered", token = token.0);
        }
    }

    pub fn is_registered(&self, token: &TrackingToken) -> bool {
        self.entries.contains_key(&token.0)
    }

    /// Whether the entry with this token id is still registered
    pub fn contains(&self, token: u64) -> bool {
        self.entries.contains_key(&token)
    }

    pub fn live_count(&self) -> usize {
        self.entries.len()
    }

    /// Describe every entry whose owner is still reachable
    ///
    /// Owners are upgraded under the shard locks but described and dropped
    /// after them: the upgraded `Arc` may turn out to be the last one, and
    /// its `Drop` unregisters from this map.
    pub fn snapshot(&self) -> Vec<LeakRecord> {
        let mut live: Vec<(u64, Arc<dyn Disposable>)> = self
            .entries
            .iter()
            .filter_map(|entry| entry.value().upgrade().map(|owner| (*entry.key(), owner)))
            .collect();
        live.sort_by_key(|(token, _)| *token);

        live.into_iter()
            .map(|(token, owner)| LeakRecord {
                token,
                description: owner.describe(),
            })
            .collect()
    }

    /// Drop entries whose owner is already gone. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, owner| owner.strong_count() > 0);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.unregistered.fetch_add(removed, Ordering::Relaxed);
            debug!(event = "tracker_prune", removed, "Pruned dead tracker entries");
        }
        removed
    }

    /// Force-dispose every live owner. Returns how many were disposed.
    ///
    /// Owners are upgraded and collected first; `dispose` unregisters
    /// itself, which must not happen while a shard lock is held.
    pub fn dispose_all(&self) -> usize {
        let live: Vec<Arc<dyn Disposable>> = self
            .entries
            .iter()
            .filter_map(|entry| entry.value().upgrade())
            .collect();

        let count = live.len();
        for owner in live {
            owner.dispose();
        }
        self.prune();
        count
    }

    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            live: self.entries.len(),
            registered: self.registered.load(Ordering::Relaxed),
            unregistered: self.unregistered.load(Ordering::Relaxed),
        }
    }
}

/// Initialize the global tracker (idempotent; first config wins)
pub fn init(config: &TrackerConfig) {
    TRACKER.get_or_init(|| DisposablesTracker::new(config));
}

/// Global tracker
pub fn tracker() -> &'static DisposablesTracker {
    TRACKER.get_or_init(|| DisposablesTracker::new(&TrackerConfig::default()))
}

#[inline]
pub fn register_disposable(owner: Weak<dyn Disposable>) -> TrackingToken {
    tracker().register(owner)
}

#[inline]
pub fn unregister_disposable(token: &TrackingToken) {
    tracker().unregister(token)
}

pub fn live_count() -> usize {
    tracker().live_count()
}

pub fn stats() -> TrackerStats {
    tracker().stats()
}

/// Shutdown sweep: optionally report, optionally dispose. Returns the live count.
pub fn cleanup(config: &TrackerConfig) -> usize {
    let tracker = tracker();
    tracker.prune();

    let leaked = tracker.snapshot();
    if config.report_leaks {
        for record in &leaked {
            log_leak(record.token, &record.description);
        }
    }
    if config.dispose_leaks && !leaked.is_empty() {
        tracker.dispose_all();
    }

    leaked.len()
}
