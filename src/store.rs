//! Map of key → slot, optionally bounded.

use crate::key::SlotKey;
use crate::slot::{Identified, MergeMode, MergeSummary, Page, Slot};
use lru::LruCache;
use std::num::NonZeroUsize;
use tokio::time::Instant;

/// Owns every slot. Slots are created lazily on first access.
///
/// With a capacity the store evicts the least recently used slot once full.
/// An evicted slot that still had a fetch outstanding simply loses that
/// response: the ticket no longer matches anything.
pub struct SlotStore<T> {
    slots: LruCache<SlotKey, Slot<T>>,
    next_generation: u64,
}

impl<T> SlotStore<T> {
    pub fn unbounded() -> Self {
        Self {
            slots: LruCache::unbounded(),
            next_generation: 1,
        }
    }

    /// `0` means unbounded.
    pub fn with_capacity(max_slots: usize) -> Self {
        match NonZeroUsize::new(max_slots) {
            Some(cap) => Self {
                slots: LruCache::new(cap),
                next_generation: 1,
            },
            None => Self::unbounded(),
        }
    }

    /// Get the slot for `key`, creating an empty one on first access.
    pub fn get(&mut self, key: &SlotKey) -> &mut Slot<T> {
        if !self.slots.contains(key) && self.slots.len() == self.slots.cap().get() {
            if let Some((evicted, _)) = self.slots.peek_lru() {
                tracing::debug!(key = %evicted, "Evicting least recently used slot");
            }
        }
        self.slots.get_or_insert_mut(key.clone(), Slot::new)
    }

    /// Look at a slot without creating it or touching recency.
    pub fn peek(&self, key: &SlotKey) -> Option<&Slot<T>> {
        self.slots.peek(key)
    }

    pub(crate) fn peek_mut(&mut self, key: &SlotKey) -> Option<&mut Slot<T>> {
        self.slots.peek_mut(key)
    }

    /// Clear `key` back to its initial state. Returns false if the key had
    /// never been seen.
    pub fn reset(&mut self, key: &SlotKey) -> bool {
        match self.slots.peek_mut(key) {
            Some(slot) => {
                slot.reset();
                true
            }
            None => false,
        }
    }

    /// Reset every slot whose key matches `predicate`. Returns how many were reset.
    pub fn reset_matching(&mut self, mut predicate: impl FnMut(&SlotKey) -> bool) -> usize {
        let mut count = 0;
        for (key, slot) in self.slots.iter_mut() {
            if predicate(key) {
                slot.reset();
                count += 1;
            }
        }
        count
    }

    pub fn remove(&mut self, key: &SlotKey) -> Option<Slot<T>> {
        self.slots.pop(key)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn next_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }
}

impl<T: Identified + Clone> SlotStore<T> {
    /// Merge a page directly into `key`, creating the slot if needed.
    ///
    /// The coordinator goes through tickets instead; this is the entry point
    /// for hosts that obtain pages some other way (e.g. a push update).
    pub fn merge(
        &mut self,
        key: &SlotKey,
        page: Page<T>,
        mode: MergeMode,
        limit: usize,
    ) -> MergeSummary {
        self.get(key).merge(page, mode, limit, Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Row(u32);

    impl Identified for Row {
        type Id = u32;

        fn identity(&self) -> u32 {
            self.0
        }
    }

    fn key(tab: &str) -> SlotKey {
        SlotKey::from_pairs([("tab", tab)])
    }

    fn page(range: std::ops::Range<u32>, total: usize) -> Page<Row> {
        Page::new(range.map(Row).collect(), total)
    }

    #[test]
    fn test_get_creates_lazily() {
        let mut store: SlotStore<Row> = SlotStore::unbounded();
        assert!(store.peek(&key("pending")).is_none());
        assert!(store.get(&key("pending")).is_empty());
        assert_eq!(store.len(), 1);
        store.get(&key("pending"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_keys_do_not_share_state() {
        let mut store = SlotStore::unbounded();
        store.merge(&key("pending"), page(0..5, 5), MergeMode::Replace, 20);
        assert_eq!(store.get(&key("pending")).len(), 5);
        assert!(store.get(&key("settled")).is_empty());
    }

    #[test]
    fn test_reset_clears_slot() {
        let mut store = SlotStore::unbounded();
        store.merge(&key("pending"), page(0..5, 50), MergeMode::Replace, 5);
        assert!(store.reset(&key("pending")));
        let slot = store.peek(&key("pending")).unwrap();
        assert!(slot.is_empty());
        assert_eq!(slot.next_offset(), 0);
        assert!(slot.last_fetched_at().is_none());
        assert!(!store.reset(&key("unknown")));
    }

    #[test]
    fn test_reset_matching() {
        let mut store = SlotStore::unbounded();
        let a = SlotKey::from_pairs([("tab", "soccer"), ("date", "2024-05-01")]);
        let b = SlotKey::from_pairs([("tab", "soccer"), ("date", "2024-05-02")]);
        let c = SlotKey::from_pairs([("tab", "tennis"), ("date", "2024-05-01")]);
        for k in [&a, &b, &c] {
            store.merge(k, page(0..3, 3), MergeMode::Replace, 20);
        }

        let reset = store.reset_matching(|k| k.tab() == Some("soccer"));
        assert_eq!(reset, 2);
        assert!(store.peek(&a).unwrap().is_empty());
        assert!(store.peek(&b).unwrap().is_empty());
        assert_eq!(store.peek(&c).unwrap().len(), 3);
    }

    #[test]
    fn test_bounded_store_evicts_least_recent() {
        let mut store: SlotStore<Row> = SlotStore::with_capacity(2);
        store.get(&key("a"));
        store.get(&key("b"));
        store.get(&key("a"));
        store.get(&key("c"));
        assert_eq!(store.len(), 2);
        assert!(store.peek(&key("a")).is_some());
        assert!(store.peek(&key("b")).is_none());
    }

    #[test]
    fn test_zero_capacity_is_unbounded() {
        let mut store: SlotStore<Row> = SlotStore::with_capacity(0);
        for i in 0..100 {
            store.get(&key(&i.to_string()));
        }
        assert_eq!(store.len(), 100);
    }

    #[test]
    fn test_generations_are_unique() {
        let mut store: SlotStore<Row> = SlotStore::unbounded();
        let a = store.next_generation();
        let b = store.next_generation();
        assert!(b > a);
    }
}
