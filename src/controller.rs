//! Host-side glue for one list screen.
//!
//! [`ListController`] tracks the active key, owns the scroll sentinel and
//! runs coordinator work as background tasks. Each task reports back through
//! an mpsc channel as a [`PagerEvent`], so a host event loop can redraw and
//! surface errors without ever awaiting a fetch itself.

use crate::coordinator::{Coordinator, Intent, ListView, Outcome};
use crate::error::FetchError;
use crate::fetcher::PageFetcher;
use crate::key::{resolve, Selection, SlotKey};
use crate::policy::Decision;
use crate::sentinel::ScrollSentinel;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Events from background fetch tasks.
#[derive(Debug)]
pub enum PagerEvent {
    /// An `ensure` call finished.
    ///
    /// Fields:
    /// - `key`: The key the work ran against (may no longer be active)
    /// - `intent`: What was asked for
    /// - `result`: The coordinator's outcome or the fetch error
    Settled {
        key: SlotKey,
        intent: Intent,
        result: Result<Outcome, FetchError>,
    },
    /// A background task panicked. The slot's in-flight claim has already
    /// been released.
    TaskPanicked { key: SlotKey, error: String },
}

impl PagerEvent {
    pub fn key(&self) -> &SlotKey {
        match self {
            PagerEvent::Settled { key, .. } | PagerEvent::TaskPanicked { key, .. } => key,
        }
    }
}

pub struct ListController<F: PageFetcher> {
    coordinator: Coordinator<F>,
    sentinel: ScrollSentinel,
    active: Option<SlotKey>,
    events: mpsc::Sender<PagerEvent>,
}

impl<F: PageFetcher> ListController<F> {
    pub fn new(coordinator: Coordinator<F>, events: mpsc::Sender<PagerEvent>) -> Self {
        Self {
            coordinator,
            sentinel: ScrollSentinel::new(),
            active: None,
            events,
        }
    }

    pub fn coordinator(&self) -> &Coordinator<F> {
        &self.coordinator
    }

    pub fn active_key(&self) -> Option<&SlotKey> {
        self.active.as_ref()
    }

    /// Switch the screen to `selection`.
    ///
    /// Cached items for the key are visible immediately. A never-fetched key
    /// starts a blocking first load; a stale one refreshes in the background.
    pub fn select(&mut self, selection: &Selection) -> Decision {
        let key = self.activate(selection);
        let decision = self.coordinator.decide(&key);
        tracing::debug!(key = %key, ?decision, "Selection changed");
        match decision {
            Decision::ServeAsIs => {}
            Decision::BlockAndFetch => {
                self.spawn(key, Intent::Initial);
            }
            Decision::RefreshSilently => {
                self.spawn(key, Intent::Revalidate);
            }
        }
        decision
    }

    /// Switch to `selection` and discard whatever was cached for it.
    ///
    /// Used when the change redefines what the key means (a new filter),
    /// so old results must not be shown.
    pub fn apply_filter(&mut self, selection: &Selection) -> JoinHandle<()> {
        let key = self.activate(selection);
        self.coordinator.reset(&key);
        self.spawn(key, Intent::Initial)
    }

    /// Pull-to-refresh: reset the active key and load its first page.
    pub fn refresh(&mut self) -> Option<JoinHandle<()>> {
        let key = self.active.clone()?;
        self.coordinator.reset(&key);
        Some(self.spawn(key, Intent::Initial))
    }

    /// Retry after a failure, re-running whichever fetch failed.
    pub fn retry(&mut self) -> Option<JoinHandle<()>> {
        let key = self.active.clone()?;
        let intent = self.coordinator.retry_intent(&key);
        Some(self.spawn(key, intent))
    }

    /// Report whether the trailing anchor of the active list is on screen.
    ///
    /// Returns the spawned task when this call triggered a page load.
    pub fn on_anchor_visibility(&mut self, visible: bool) -> Option<JoinHandle<()>> {
        let key = self.active.clone()?;
        let status = self.coordinator.status(&key);
        let intent = self.sentinel.observe(&key, visible, status)?;
        Some(self.spawn(key, intent))
    }

    /// Snapshot of the active list.
    pub fn view(&self) -> Option<ListView<F::Item>> {
        self.active.as_ref().map(|key| self.coordinator.view(key))
    }

    fn activate(&mut self, selection: &Selection) -> SlotKey {
        let key = resolve(selection);
        self.sentinel.bind(&key);
        self.active = Some(key.clone());
        key
    }

    fn spawn(&self, key: SlotKey, intent: Intent) -> JoinHandle<()> {
        let coordinator = self.coordinator.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let event = match catch_task_panic(coordinator.ensure(&key, intent)).await {
                Ok(result) => PagerEvent::Settled { key, intent, result },
                Err(panic_msg) => {
                    tracing::error!(
                        key = %key,
                        ?intent,
                        error = %panic_msg,
                        "Background fetch panicked"
                    );
                    PagerEvent::TaskPanicked {
                        key,
                        error: panic_msg,
                    }
                }
            };
            if let Err(e) = tx.send(event).await {
                tracing::warn!(error = %e, "Pager event channel closed (receiver dropped)");
            }
        })
    }
}

/// Run `future`, converting a panic into `Err(message)`.
async fn catch_task_panic<Fut, T>(future: Fut) -> Result<T, String>
where
    Fut: std::future::Future<Output = T>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|panic| {
            if let Some(s) = panic.downcast_ref::<&'static str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            }
        })
}
