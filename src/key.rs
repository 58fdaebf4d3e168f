//! Selection → key resolution.
//!
//! A screen's active selection (tab, sub-tab, calendar date, filter set) is
//! flattened into a [`SlotKey`]: a sorted list of `(dimension, value)` pairs.
//! Sorting makes the key independent of the order dimensions were set in, so
//! two renders of the same tab always land on the same slot.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Dimension name for the primary tab.
pub const TAB: &str = "tab";
/// Dimension name for the secondary tab.
pub const SUB_TAB: &str = "sub_tab";
/// Dimension name for the selected calendar date (`YYYY-MM-DD`).
pub const DATE: &str = "date";

/// Prefix applied to filter names so they can never collide with the
/// built-in dimensions above.
const FILTER_PREFIX: &str = "filter.";

/// The host's current selection on a list screen.
///
/// Built with chained setters; unset dimensions are simply absent from the
/// resolved key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub tab: Option<String>,
    pub sub_tab: Option<String>,
    pub date: Option<NaiveDate>,
    pub filters: BTreeMap<String, String>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tab(mut self, tab: impl Into<String>) -> Self {
        self.tab = Some(tab.into());
        self
    }

    pub fn sub_tab(mut self, sub_tab: impl Into<String>) -> Self {
        self.sub_tab = Some(sub_tab.into());
        self
    }

    pub fn date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn filter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(name.into(), value.into());
        self
    }
}

/// Identifies one logical scrollable list.
///
/// Immutable and cheap to clone (the dimension list is shared). Equality and
/// hashing are by value.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey(Arc<[(String, String)]>);

impl SlotKey {
    /// Build a key directly from dimension pairs.
    ///
    /// Pairs are sorted by name; if a name repeats, the last value wins.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: BTreeMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self(map.into_iter().collect())
    }

    /// Look up a dimension value by name.
    pub fn dimension(&self, name: &str) -> Option<&str> {
        self.0
            .binary_search_by(|(k, _)| k.as_str().cmp(name))
            .ok()
            .map(|i| self.0[i].1.as_str())
    }

    pub fn tab(&self) -> Option<&str> {
        self.dimension(TAB)
    }

    pub fn sub_tab(&self) -> Option<&str> {
        self.dimension(SUB_TAB)
    }

    /// The date dimension, if present and well-formed.
    pub fn date(&self) -> Option<NaiveDate> {
        self.dimension(DATE)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
    }

    /// Iterate over filter dimensions with the internal prefix stripped.
    pub fn filters(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().filter_map(|(k, v)| {
            k.strip_prefix(FILTER_PREFIX)
                .map(|name| (name, v.as_str()))
        })
    }

    /// All dimensions in key order.
    pub fn dimensions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotKey({self})")
    }
}

/// Resolve a selection into its key. Pure and deterministic.
pub fn resolve(selection: &Selection) -> SlotKey {
    let mut pairs: Vec<(String, String)> = Vec::with_capacity(3 + selection.filters.len());
    if let Some(tab) = &selection.tab {
        pairs.push((TAB.to_string(), tab.clone()));
    }
    if let Some(sub_tab) = &selection.sub_tab {
        pairs.push((SUB_TAB.to_string(), sub_tab.clone()));
    }
    if let Some(date) = selection.date {
        pairs.push((DATE.to_string(), date.format("%Y-%m-%d").to_string()));
    }
    for (name, value) in &selection.filters {
        pairs.push((format!("{FILTER_PREFIX}{name}"), value.clone()));
    }
    SlotKey::from_pairs(pairs)
}
