// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 The maid-lsp authors

//! Per-key debouncing of edit bursts.
//!
//! Each key holds at most one pending timer. Scheduling while a timer is
//! pending replaces it, so a burst of edits produces exactly one fire after
//! the last edit's delay.

use std::collections::HashMap;
use std::hash::Hash;
use tokio::task::JoinHandle;
use tracing::trace;

/// A per-key timer set. `K` is the coalescing key (document URI).
#[derive(Debug, Default)]
pub struct Debouncer<K> {
    pending: HashMap<K, JoinHandle<()>>,
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Send + std::fmt::Debug + 'static,
{
    /// Creates an empty debouncer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    /// Schedules `fire` to run after `delay`, replacing any pending timer
    /// for the same key.
    pub fn schedule<F>(&mut self, key: K, delay: std::time::Duration, fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(previous) = self.pending.remove(&key) {
            previous.abort();
            trace!("Replaced pending timer for {key:?}");
        }

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire();
        });
        self.pending.insert(key, handle);
    }

    /// Cancels the pending timer for `key`, if any. Returns whether a timer
    /// was actually cancelled.
    pub fn cancel(&mut self, key: &K) -> bool {
        match self.pending.remove(key) {
            Some(handle) => {
                let live = !handle.is_finished();
                handle.abort();
                live
            }
            None => false,
        }
    }

    /// Whether `key` has a timer that has not yet fired.
    #[must_use]
    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.get(key).is_some_and(|h| !h.is_finished())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests use unwrap for clear failure messages"
)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::advance;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> usize) {
        let count = Arc::new(AtomicUsize::new(0));
        let reader = {
            let count = Arc::clone(&count);
            move || count.load(Ordering::SeqCst)
        };
        (count, reader)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let mut debouncer = Debouncer::new();
        let (count, fired) = counter();

        debouncer.schedule("doc", Duration::from_millis(100), move || {
            count.fetch_add(1, Ordering::SeqCst);
        });
        // Let the timer task register its sleep before advancing the clock
        tokio::task::yield_now().await;

        advance(Duration::from_millis(50)).await;
        assert_eq!(fired(), 0);

        advance(Duration::from_millis(60)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_coalesces_to_one_fire() {
        let mut debouncer = Debouncer::new();
        let (count, fired) = counter();

        for _ in 0..5 {
            let count = Arc::clone(&count);
            debouncer.schedule("doc", Duration::from_millis(100), move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
            advance(Duration::from_millis(40)).await;
        }
        assert_eq!(fired(), 0);

        advance(Duration::from_millis(110)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let mut debouncer = Debouncer::new();
        let (count, fired) = counter();

        for key in ["a", "b", "c"] {
            let count = Arc::clone(&count);
            debouncer.schedule(key, Duration::from_millis(100), move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
            tokio::task::yield_now().await;
        }

        advance(Duration::from_millis(110)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_fire() {
        let mut debouncer = Debouncer::new();
        let (count, fired) = counter();

        debouncer.schedule("doc", Duration::from_millis(100), move || {
            count.fetch_add(1, Ordering::SeqCst);
        });
        assert!(debouncer.is_pending(&"doc"));
        assert!(debouncer.cancel(&"doc"));
        assert!(!debouncer.is_pending(&"doc"));

        advance(Duration::from_millis(200)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_of_unknown_key_is_noop() {
        let mut debouncer: Debouncer<&str> = Debouncer::new();
        assert!(!debouncer.cancel(&"never-scheduled"));
    }
}
