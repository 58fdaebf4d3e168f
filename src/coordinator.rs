//! Fetch orchestration: decides whether a key needs a fetch, issues at most
//! one at a time per key, and merges the response back into the store.
//!
//! The store lives behind a `std::sync::Mutex` that is only ever held for
//! synchronous bookkeeping. The guard is dropped before the fetcher is
//! awaited and re-acquired when the response arrives, so merges are applied
//! in a single critical section and unrelated keys never wait on each other's
//! network calls.

use crate::config::Config;
use crate::error::{ErrorKind, FetchError};
use crate::fetcher::{PageFetcher, PageRequest};
use crate::key::SlotKey;
use crate::policy::{Decision, RevalidationPolicy};
use crate::slot::{FetchTicket, MergeMode, MergeSummary, Phase};
use crate::store::SlotStore;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Default number of items requested per page.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Why the caller wants a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// First page of a key that has nothing cached.
    Initial,
    /// Next page of a key that already shows items.
    LoadMore,
    /// Re-fetch the first page if the revalidation policy asks for it.
    Revalidate,
}

/// Why `ensure` did not issue a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another fetch for the key is outstanding.
    InFlight,
    /// `Initial` on a key that already has items.
    NotEmpty,
    /// `LoadMore` on a key with nothing loaded yet.
    NothingLoaded,
    /// `LoadMore` on a key whose list is complete.
    Exhausted,
    /// `Revalidate` on a key that is still fresh.
    Fresh,
}

/// Result of a successful `ensure` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Skipped(SkipReason),
    Merged(MergeSummary),
    /// The response arrived for a key/offset that no longer matches the
    /// slot (reset, evicted or superseded) and was dropped.
    Discarded,
}

/// Everything a host needs to render one list.
#[derive(Debug, Clone)]
pub struct ListView<T> {
    pub key: SlotKey,
    pub items: Arc<Vec<T>>,
    pub phase: Phase,
    /// A fetch is outstanding and there is nothing to show yet.
    pub is_initial_loading: bool,
    /// A fetch is outstanding behind a non-empty list.
    pub is_fetching_more: bool,
    pub has_more: bool,
    /// Last failure for this key, cleared by the next successful merge.
    pub error: Option<FetchError>,
}

/// Minimal slot facts the scroll sentinel guards on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotStatus {
    pub has_more: bool,
    pub in_flight: bool,
    pub is_empty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorOptions {
    pub page_size: usize,
    pub freshness: Duration,
    /// Maximum number of cached keys; 0 = unbounded.
    pub max_slots: usize,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            freshness: crate::policy::DEFAULT_FRESHNESS,
            max_slots: 0,
        }
    }
}

impl From<&Config> for CoordinatorOptions {
    fn from(config: &Config) -> Self {
        Self {
            page_size: config.page_size.max(1),
            freshness: Duration::from_secs(config.freshness_window_secs),
            max_slots: config.max_slots,
        }
    }
}

struct Inner<F: PageFetcher> {
    fetcher: F,
    store: Mutex<SlotStore<F::Item>>,
    policy: RevalidationPolicy,
    page_size: usize,
}

/// Shared handle; clones refer to the same store.
pub struct Coordinator<F: PageFetcher> {
    inner: Arc<Inner<F>>,
}

impl<F: PageFetcher> Clone for Coordinator<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: PageFetcher> Coordinator<F> {
    pub fn new(fetcher: F, options: CoordinatorOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                store: Mutex::new(SlotStore::with_capacity(options.max_slots)),
                policy: RevalidationPolicy::new(options.freshness),
                page_size: options.page_size.max(1),
            }),
        }
    }

    pub fn page_size(&self) -> usize {
        self.inner.page_size
    }

    pub fn policy(&self) -> RevalidationPolicy {
        self.inner.policy
    }

    pub fn fetcher(&self) -> &F {
        &self.inner.fetcher
    }

    fn store(&self) -> MutexGuard<'_, SlotStore<F::Item>> {
        // Slot bookkeeping never panics mid-update, so a poisoned lock still
        // guards consistent data.
        self.inner
            .store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch for `key` if `intent` calls for it.
    ///
    /// Never issues a second request for a key that already has one
    /// outstanding; such calls return `Skipped(InFlight)` immediately.
    /// On failure the slot keeps its items and cursor, records the error and
    /// becomes eligible for a retry.
    pub async fn ensure(&self, key: &SlotKey, intent: Intent) -> Result<Outcome, FetchError> {
        let ticket = match self.plan(key, intent) {
            Ok(ticket) => ticket,
            Err(reason) => {
                tracing::trace!(key = %key, ?intent, ?reason, "Skipping fetch");
                return Ok(Outcome::Skipped(reason));
            }
        };

        tracing::debug!(
            key = %key,
            ?intent,
            offset = ticket.offset,
            limit = ticket.limit,
            generation = ticket.generation,
            "Fetching page"
        );

        let mut guard = PendingGuard {
            coordinator: self,
            key,
            ticket,
            armed: true,
        };
        let result = self
            .inner
            .fetcher
            .fetch_page(PageRequest {
                key: key.clone(),
                offset: ticket.offset,
                limit: ticket.limit,
            })
            .await;
        guard.armed = false;

        self.complete(key, ticket, result)
    }

    /// Decide whether to fetch and, if so, claim the slot.
    fn plan(&self, key: &SlotKey, intent: Intent) -> Result<FetchTicket, SkipReason> {
        let now = Instant::now();
        let policy = self.inner.policy;
        let limit = self.inner.page_size;
        let mut store = self.store();

        let (offset, mode) = {
            let slot = store.get(key);
            if slot.in_flight() {
                return Err(SkipReason::InFlight);
            }
            match intent {
                Intent::Initial if !slot.is_empty() => return Err(SkipReason::NotEmpty),
                Intent::Initial => (0, MergeMode::Replace),
                Intent::LoadMore if slot.is_empty() => return Err(SkipReason::NothingLoaded),
                Intent::LoadMore if !slot.has_more() => return Err(SkipReason::Exhausted),
                Intent::LoadMore => (slot.next_offset(), MergeMode::Append),
                Intent::Revalidate => match policy.decide(slot, now) {
                    Decision::ServeAsIs => return Err(SkipReason::Fresh),
                    Decision::RefreshSilently | Decision::BlockAndFetch => (0, MergeMode::Replace),
                },
            }
        };

        let ticket = FetchTicket {
            generation: store.next_generation(),
            intent,
            offset,
            limit,
            mode,
        };
        store.get(key).begin(ticket);
        Ok(ticket)
    }

    fn complete(
        &self,
        key: &SlotKey,
        ticket: FetchTicket,
        result: Result<crate::slot::Page<F::Item>, FetchError>,
    ) -> Result<Outcome, FetchError> {
        let mut store = self.store();
        let Some(slot) = store.peek_mut(key) else {
            tracing::debug!(
                key = %key,
                generation = ticket.generation,
                "Dropping response for evicted slot"
            );
            return Ok(Outcome::Discarded);
        };
        if !slot.accepts(&ticket) {
            tracing::debug!(
                key = %key,
                offset = ticket.offset,
                next_offset = slot.next_offset(),
                generation = ticket.generation,
                "Dropping stale response"
            );
            return Ok(Outcome::Discarded);
        }

        match result {
            Ok(page) => {
                let received = page.items.len();
                let total = page.total;
                let summary = slot.merge(page, ticket.mode, ticket.limit, Instant::now());
                tracing::debug!(
                    key = %key,
                    received,
                    total,
                    accepted = summary.accepted,
                    duplicates = summary.duplicates,
                    len = summary.len,
                    has_more = summary.has_more,
                    "Merged page"
                );
                Ok(Outcome::Merged(summary))
            }
            Err(e) => {
                match e.kind() {
                    ErrorKind::Decode => tracing::error!(
                        key = %key,
                        offset = ticket.offset,
                        error = %e,
                        "Page response could not be decoded"
                    ),
                    ErrorKind::Network => tracing::warn!(
                        key = %key,
                        offset = ticket.offset,
                        error = %e,
                        retryable = e.is_retryable(),
                        "Page fetch failed"
                    ),
                }
                slot.fail(e.clone());
                Err(e)
            }
        }
    }

    /// Freshness decision for `key` right now.
    pub fn decide(&self, key: &SlotKey) -> Decision {
        let now = Instant::now();
        let mut store = self.store();
        self.inner.policy.decide(store.get(key), now)
    }

    pub fn status(&self, key: &SlotKey) -> SlotStatus {
        let mut store = self.store();
        let slot = store.get(key);
        SlotStatus {
            has_more: slot.has_more(),
            in_flight: slot.in_flight(),
            is_empty: slot.is_empty(),
        }
    }

    /// The intent that re-runs the last failed fetch for `key`.
    ///
    /// An empty list always restarts with `Initial`. A failed first-page
    /// refresh of a non-empty list is retried as `Revalidate`, anything else as
    /// `LoadMore`.
    pub fn retry_intent(&self, key: &SlotKey) -> Intent {
        let mut store = self.store();
        let slot = store.get(key);
        if slot.is_empty() {
            return Intent::Initial;
        }
        match slot.failed_intent() {
            Some(Intent::Revalidate | Intent::Initial) => Intent::Revalidate,
            Some(Intent::LoadMore) | None => Intent::LoadMore,
        }
    }

    pub fn view(&self, key: &SlotKey) -> ListView<F::Item> {
        let mut store = self.store();
        let slot = store.get(key);
        let in_flight = slot.in_flight();
        ListView {
            key: key.clone(),
            items: slot.items(),
            phase: slot.phase(),
            is_initial_loading: in_flight && slot.is_empty(),
            is_fetching_more: in_flight && !slot.is_empty(),
            has_more: slot.has_more(),
            error: slot.last_error().cloned(),
        }
    }

    /// Clear `key` to its initial state. An outstanding response for it will
    /// be discarded when it lands.
    pub fn reset(&self, key: &SlotKey) {
        if self.store().reset(key) {
            tracing::debug!(key = %key, "Reset slot");
        }
    }

    pub fn reset_matching(&self, predicate: impl FnMut(&SlotKey) -> bool) -> usize {
        let count = self.store().reset_matching(predicate);
        tracing::debug!(count, "Reset matching slots");
        count
    }

    /// Drop a key entirely.
    pub fn forget(&self, key: &SlotKey) {
        self.store().remove(key);
    }

    /// Number of keys currently cached.
    pub fn cached_keys(&self) -> usize {
        self.store().len()
    }
}

/// Releases the slot's in-flight claim if `ensure` is dropped while its
/// fetch is still outstanding (e.g. the host aborted the task), so the key
/// does not stay locked forever.
struct PendingGuard<'a, F: PageFetcher> {
    coordinator: &'a Coordinator<F>,
    key: &'a SlotKey,
    ticket: FetchTicket,
    armed: bool,
}

impl<F: PageFetcher> Drop for PendingGuard<'_, F> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut store = self.coordinator.store();
        if let Some(slot) = store.peek_mut(self.key) {
            if slot.abandon(&self.ticket) {
                tracing::debug!(
                    key = %self.key,
                    generation = self.ticket.generation,
                    "Fetch cancelled, releasing slot"
                );
            }
        }
    }
}
