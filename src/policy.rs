//! Freshness decisions for cached slots.

use crate::slot::Slot;
use std::time::Duration;
use tokio::time::Instant;

/// Default freshness window (60 seconds).
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(60);

/// What the host should do with a slot it is about to show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Fresh enough; no fetch.
    ServeAsIs,
    /// Show the cached items now and replace them once a re-fetch lands.
    RefreshSilently,
    /// Nothing to show; fetch and show a loading indicator.
    BlockAndFetch,
}

impl Decision {
    pub fn needs_fetch(self) -> bool {
        !matches!(self, Decision::ServeAsIs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevalidationPolicy {
    freshness: Duration,
}

impl Default for RevalidationPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_FRESHNESS)
    }
}

impl RevalidationPolicy {
    pub fn new(freshness: Duration) -> Self {
        Self { freshness }
    }

    pub fn freshness(&self) -> Duration {
        self.freshness
    }

    /// Whether a slot fetched at `fetched_at` is still fresh at `now`.
    ///
    /// A window of zero treats every slot as stale.
    pub fn is_fresh(&self, fetched_at: Instant, now: Instant) -> bool {
        now.saturating_duration_since(fetched_at) <= self.freshness && !self.freshness.is_zero()
    }

    pub fn decide<T>(&self, slot: &Slot<T>, now: Instant) -> Decision {
        let Some(fetched_at) = slot.last_fetched_at() else {
            return Decision::BlockAndFetch;
        };
        if self.is_fresh(fetched_at, now) {
            Decision::ServeAsIs
        } else if slot.is_empty() {
            // Fetched before but the list came back empty: there is nothing
            // to keep on screen while refreshing.
            Decision::BlockAndFetch
        } else {
            Decision::RefreshSilently
        }
    }
}
