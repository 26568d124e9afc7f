// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fixed-capacity slab allocator backing the safety mapper's provider and
//! consumer tables (spec.md §9: replace UAM's 128 KiB fixed arena with "a
//! capacity parameter at construction... `clear` resets the slab without
//! freeing the backing memory"). Insertion order is the dense, monotonic
//! handle assignment `uam_s.c`'s `bNextProviderFreeHandle` implements.

pub struct Slab<T> {
    slots: Vec<Option<T>>,
    len: usize,
}

impl<T> Slab<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Slab { slots, len: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert at the next free dense index. Returns `None` once capacity
    /// is exhausted.
    pub fn insert(&mut self, value: T) -> Option<usize> {
        if self.len >= self.slots.len() {
            return None;
        }
        let index = self.len;
        self.slots[index] = Some(value);
        self.len += 1;
        Some(index)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(|s| s.as_ref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, s)| s.as_mut().map(|v| (i, v)))
    }

    /// Drops every occupied slot but keeps the backing `Vec`'s allocation,
    /// so a subsequent fill-up to the same capacity performs no further
    /// heap allocation.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_up_to_capacity_then_rejects() {
        let mut slab: Slab<u32> = Slab::with_capacity(2);
        assert_eq!(slab.insert(10), Some(0));
        assert_eq!(slab.insert(20), Some(1));
        assert_eq!(slab.insert(30), None);
        assert_eq!(slab.len(), 2);
    }

    #[test]
    fn clear_resets_len_and_slots_but_keeps_capacity() {
        let mut slab: Slab<u32> = Slab::with_capacity(2);
        slab.insert(1);
        slab.clear();
        assert_eq!(slab.len(), 0);
        assert!(slab.get(0).is_none());
        assert_eq!(slab.capacity(), 2);
        assert_eq!(slab.insert(99), Some(0));
    }

    #[test]
    fn iter_mut_skips_empty_slots() {
        let mut slab: Slab<u32> = Slab::with_capacity(3);
        slab.insert(1);
        slab.insert(2);
        let seen: Vec<(usize, u32)> = slab.iter_mut().map(|(i, v)| (i, *v)).collect();
        assert_eq!(seen, vec![(0, 1), (1, 2)]);
    }
}
