//! Viewport-driven "load next page" trigger.
//!
//! The host reports whether the trailing anchor of the list is currently
//! visible; the sentinel turns the not-visible → visible edge into a single
//! `LoadMore` intent. It has no notion of a UI framework: anything that can
//! say "the end of the list is on screen" (an intersection observer, a
//! virtualized list's range callback, a TUI's scroll offset) can drive it.

use crate::coordinator::{Intent, SlotStatus};
use crate::key::SlotKey;

#[derive(Debug, Default)]
pub struct ScrollSentinel {
    bound: Option<SlotKey>,
    intersecting: bool,
}

impl ScrollSentinel {
    pub fn new() -> Self {
        Self::default()
    }

    /// The key the sentinel currently observes, if any.
    pub fn bound_key(&self) -> Option<&SlotKey> {
        self.bound.as_ref()
    }

    pub fn is_intersecting(&self) -> bool {
        self.intersecting
    }

    /// Attach to `key`. Re-binding to a different key re-arms the sentinel so
    /// the new list's first visibility counts as a fresh transition.
    pub fn bind(&mut self, key: &SlotKey) {
        if self.bound.as_ref() != Some(key) {
            self.bound = Some(key.clone());
            self.intersecting = false;
        }
    }

    pub fn detach(&mut self) {
        self.bound = None;
        self.intersecting = false;
    }

    /// Report the anchor's current visibility for `key`.
    ///
    /// Returns `Some(Intent::LoadMore)` at most once per continuous visibility
    /// period, and only while the list has more pages, no fetch is in flight
    /// and something is already loaded.
    pub fn observe(
        &mut self,
        key: &SlotKey,
        intersecting: bool,
        status: SlotStatus,
    ) -> Option<Intent> {
        self.bind(key);

        let rising = intersecting && !self.intersecting;
        self.intersecting = intersecting;
        if !rising {
            return None;
        }
        if !status.has_more || status.in_flight || status.is_empty {
            tracing::trace!(key = %key, ?status, "Sentinel visible but load suppressed");
            return None;
        }
        tracing::trace!(key = %key, "Sentinel requesting next page");
        Some(Intent::LoadMore)
    }
}
