//! Binary min-heap with removal by key.
//!
//! EPA pops faces in order of distance to the origin and must also drop faces
//! that become visible from a new support point. `BinaryHeap` cannot remove an
//! arbitrary entry, so this keeps an index map from key to heap slot.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
pub struct MinHeap<K> {
    entries: Vec<(K, f32)>,
    slots: HashMap<K, usize>,
}

impl<K> Default for MinHeap<K>
where
    K: Copy + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> MinHeap<K>
where
    K: Copy + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            slots: HashMap::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            slots: HashMap::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn contains(&self, key: &K) -> bool {
        self.slots.contains_key(key)
    }

    /// Smallest entry without removing it.
    pub fn peek(&self) -> Option<(K, f32)> {
        self.entries.first().copied()
    }

    /// Insert `key`, or update its priority if it is already queued.
    pub fn push(&mut self, key: K, priority: f32) {
        if let Some(&slot) = self.slots.get(&key) {
            self.entries[slot].1 = priority;
            self.sift_up(slot);
            self.sift_down(slot);
            return;
        }
        let slot = self.entries.len();
        self.entries.push((key, priority));
        self.slots.insert(key, slot);
        self.sift_up(slot);
    }

    /// Remove and return the entry with the smallest priority.
    pub fn pop(&mut self) -> Option<(K, f32)> {
        if self.entries.is_empty() {
            return None;
        }
        self.remove_slot(0)
    }

    /// Remove `key` wherever it sits in the heap.
    pub fn remove(&mut self, key: &K) -> Option<f32> {
        let slot = self.slots.get(key).copied()?;
        self.remove_slot(slot).map(|(_, priority)| priority)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.slots.clear();
    }

    fn remove_slot(&mut self, slot: usize) -> Option<(K, f32)> {
        let last = self.entries.len().checked_sub(1)?;
        self.swap(slot, last);
        let removed = self.entries.pop()?;
        self.slots.remove(&removed.0);
        if slot < self.entries.len() {
            self.sift_up(slot);
            self.sift_down(slot);
        }
        Some(removed)
    }

    fn swap(&mut self, i: usize, j: usize) {
        if i == j {
            return;
        }
        self.entries.swap(i, j);
        self.slots.insert(self.entries[i].0, i);
        self.slots.insert(self.entries[j].0, j);
    }

    fn sift_up(&mut self, mut slot: usize) {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if self.entries[parent].1 <= self.entries[slot].1 {
                break;
            }
            self.swap(parent, slot);
            slot = parent;
        }
    }

    fn sift_down(&mut self, mut slot: usize) {
        let len = self.entries.len();
        loop {
            let left = 2 * slot + 1;
            let right = left + 1;
            let mut smallest = slot;
            if left < len && self.entries[left].1 < self.entries[smallest].1 {
                smallest = left;
            }
            if right < len && self.entries[right].1 < self.entries[smallest].1 {
                smallest = right;
            }
            if smallest == slot {
                break;
            }
            self.swap(slot, smallest);
            slot = smallest;
        }
    }
}
