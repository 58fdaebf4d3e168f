//! Keyed page cache and pagination coordinator for scrollable list screens.
//!
//! The engine backs every infinite-scroll list of an application with one
//! design:
//!
//! - **Keys**: the screen's selection (tab, sub-tab, date, filters) resolves
//!   to a [`SlotKey`]; equal selections share one cached list.
//! - **Slots**: per-key items, cursor, exhaustion flag, freshness timestamp
//!   and in-flight claim, held in a [`SlotStore`].
//! - **Fetching**: a [`PageFetcher`] adapter per resource family;
//!   [`HttpPageFetcher`] covers the JSON list API.
//! - **Coordination**: [`Coordinator::ensure`] issues at most one fetch per
//!   key, merges by identity, and drops responses that a reset superseded.
//! - **Freshness**: [`RevalidationPolicy`] decides between serving the cache,
//!   refreshing it silently, or blocking on a first load.
//! - **Scrolling**: [`ScrollSentinel`] turns anchor visibility into
//!   `LoadMore` intents.
//!
//! # Example
//!
//! ```ignore
//! use slotpager::{Coordinator, CoordinatorOptions, Intent, Selection, resolve};
//!
//! let coordinator = Coordinator::new(fetcher, CoordinatorOptions::default());
//! let key = resolve(&Selection::new().tab("pending").sub_tab("public"));
//! coordinator.ensure(&key, Intent::Initial).await?;
//! let view = coordinator.view(&key);
//! ```

pub mod config;
pub mod controller;
pub mod coordinator;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod key;
pub mod models;
pub mod policy;
pub mod sentinel;
pub mod slot;
pub mod store;

pub use config::{Config, ConfigError};
pub use controller::{ListController, PagerEvent};
pub use coordinator::{
    Coordinator, CoordinatorOptions, Intent, ListView, Outcome, SkipReason, SlotStatus,
};
pub use error::{ErrorKind, FetchError};
pub use fetcher::{PageFetcher, PageRequest};
pub use http::{HttpPageFetcher, Resource};
pub use key::{resolve, Selection, SlotKey};
pub use policy::{Decision, RevalidationPolicy};
pub use sentinel::ScrollSentinel;
pub use slot::{Identified, MergeMode, MergeSummary, Page, Phase, Slot};
pub use store::SlotStore;
