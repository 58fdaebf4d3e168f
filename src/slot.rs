//! Per-key cached list state and the merge-by-identity rules.

use crate::coordinator::Intent;
use crate::error::FetchError;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tokio::time::Instant;

/// A record with a stable identity used for de-duplication during merge.
///
/// Identities need not be contiguous or ordered.
pub trait Identified {
    type Id: Eq + Hash + Clone + fmt::Debug;

    fn identity(&self) -> Self::Id;
}

/// One batch of items returned by a single remote fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Server-reported total for the whole list.
    pub total: usize,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: usize) -> Self {
        Self { items, total }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Discard existing items and install the page.
    Replace,
    /// Concatenate, skipping identities already present.
    Append,
}

/// Externally visible lifecycle of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Never successfully fetched, nothing in flight.
    Empty,
    /// First fetch outstanding with nothing to show.
    Loading,
    Ready,
    /// Next page outstanding; items stay visible.
    LoadingMore,
    /// First page being re-fetched; items stay visible until it lands.
    Revalidating,
    /// `has_more` is false. Only a reset leaves this state.
    Exhausted,
}

/// Identifies one outstanding fetch.
///
/// `generation` comes from a store-wide counter and is never reused, so a
/// ticket can only ever match the slot that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    pub generation: u64,
    pub intent: Intent,
    pub offset: usize,
    pub limit: usize,
    pub mode: MergeMode,
}

/// What a successful merge changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    pub mode: MergeMode,
    /// Items from the page that were actually installed.
    pub accepted: usize,
    /// Items from the page dropped as duplicates.
    pub duplicates: usize,
    /// List length after the merge.
    pub len: usize,
    pub next_offset: usize,
    pub has_more: bool,
}

/// Cached state for one key.
#[derive(Debug, Clone)]
pub struct Slot<T> {
    items: Arc<Vec<T>>,
    next_offset: usize,
    has_more: bool,
    last_fetched_at: Option<Instant>,
    pending: Option<FetchTicket>,
    last_error: Option<FetchError>,
    failed_intent: Option<Intent>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            items: Arc::new(Vec::new()),
            next_offset: 0,
            has_more: true,
            last_fetched_at: None,
            pending: None,
            last_error: None,
            failed_intent: None,
        }
    }
}

impl<T> Slot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the current list. Cloning is O(1); later merges never
    /// mutate a list a caller is holding.
    pub fn items(&self) -> Arc<Vec<T>> {
        Arc::clone(&self.items)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn next_offset(&self) -> usize {
        self.next_offset
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn last_fetched_at(&self) -> Option<Instant> {
        self.last_fetched_at
    }

    pub fn in_flight(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&FetchTicket> {
        self.pending.as_ref()
    }

    pub fn last_error(&self) -> Option<&FetchError> {
        self.last_error.as_ref()
    }

    /// Intent of the fetch that produced `last_error`.
    pub fn failed_intent(&self) -> Option<Intent> {
        self.failed_intent
    }

    pub fn phase(&self) -> Phase {
        match &self.pending {
            Some(_) if self.items.is_empty() => Phase::Loading,
            Some(ticket) if ticket.intent == Intent::LoadMore => Phase::LoadingMore,
            Some(_) => Phase::Revalidating,
            None if self.last_fetched_at.is_none() => Phase::Empty,
            None if !self.has_more => Phase::Exhausted,
            None => Phase::Ready,
        }
    }

    /// Clear to the initial empty state. Any outstanding ticket is forgotten,
    /// so its eventual response is discarded.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn begin(&mut self, ticket: FetchTicket) {
        self.pending = Some(ticket);
    }

    /// Whether a response carrying `ticket` may still be applied.
    ///
    /// Appends must also still line up with the cursor they were issued at.
    pub(crate) fn accepts(&self, ticket: &FetchTicket) -> bool {
        match &self.pending {
            Some(pending) if pending == ticket => match ticket.mode {
                MergeMode::Replace => ticket.offset == 0,
                MergeMode::Append => ticket.offset == self.next_offset,
            },
            _ => false,
        }
    }

    /// Release the in-flight claim without recording anything, if `ticket` still
    /// holds it.
    pub(crate) fn abandon(&mut self, ticket: &FetchTicket) -> bool {
        if self.pending.as_ref() == Some(ticket) {
            self.pending = None;
            true
        } else {
            false
        }
    }

    /// Record a failed fetch. Items and cursor are left untouched.
    pub(crate) fn fail(&mut self, error: FetchError) {
        self.failed_intent = self.pending.take().map(|ticket| ticket.intent);
        self.last_error = Some(error);
    }
}

impl<T: Identified + Clone> Slot<T> {
    /// Merge a page into the list.
    ///
    /// `limit` is the page size that was requested; a short page means the
    /// list is exhausted.
    pub fn merge(
        &mut self,
        page: Page<T>,
        mode: MergeMode,
        limit: usize,
        now: Instant,
    ) -> MergeSummary {
        let received = page.items.len();
        let (accepted, duplicates) = match mode {
            MergeMode::Replace => {
                let unique = dedup_by_identity(page.items);
                let accepted = unique.len();
                self.items = Arc::new(unique);
                self.next_offset = received;
                (accepted, received - accepted)
            }
            MergeMode::Append => {
                let items = Arc::make_mut(&mut self.items);
                let accepted = merge_unique(items, page.items);
                self.next_offset += accepted;
                (accepted, received - accepted)
            }
        };

        let len = self.items.len();
        self.has_more = received >= limit && page.total > len;
        self.last_fetched_at = Some(now);
        self.pending = None;
        self.last_error = None;
        self.failed_intent = None;

        MergeSummary {
            mode,
            accepted,
            duplicates,
            len,
            next_offset: self.next_offset,
            has_more: self.has_more,
        }
    }
}

/// Append `incoming` to `existing`, skipping any item whose identity is
/// already present (in `existing` or earlier in `incoming`).
///
/// Returns the number of items appended.
pub fn merge_unique<T: Identified>(existing: &mut Vec<T>, incoming: Vec<T>) -> usize {
    let mut seen: HashSet<T::Id> = existing.iter().map(Identified::identity).collect();
    let before = existing.len();
    existing.extend(incoming.into_iter().filter(|item| seen.insert(item.identity())));
    existing.len() - before
}

/// Drop later occurrences of a repeated identity, keeping order.
pub fn dedup_by_identity<T: Identified>(items: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| seen.insert(item.identity()))
        .collect()
}
