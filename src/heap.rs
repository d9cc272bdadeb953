//! Bounded Top-K min-heap over chunk frequency (spec §4.4).
//!
//! Grounded on `EcallEntryHeap`/`HeapItem_t` (`ecallEntryHeap.h`/`.cc`,
//! `chunkStructure.h`): a binary min-heap ordered by estimated frequency,
//! paired with a hash index from fingerprint to heap slot so `update` can
//! sift an existing entry in `O(log k)` instead of a linear scan. When the
//! heap is at capacity, a new entry only displaces the current minimum if
//! its frequency is strictly greater (spec §4.4 "Top-K monotonicity").

use fxhash::FxHashMap;

use crate::types::{ChunkAddress, Fingerprint};

#[derive(Debug, Clone, Copy)]
struct HeapItem {
    freq: u32,
    address: ChunkAddress,
}

/// A capacity-bounded min-heap of the K most frequent chunks observed so
/// far, keyed by fingerprint.
pub struct TopKHeap {
    capacity: usize,
    heap: Vec<(Fingerprint, HeapItem)>,
    index: FxHashMap<Fingerprint, usize>,
}

impl TopKHeap {
    pub fn new(capacity: usize) -> Self {
        TopKHeap {
            capacity,
            heap: Vec::with_capacity(capacity),
            index: FxHashMap::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.index.contains_key(fp)
    }

    pub fn get(&self, fp: &Fingerprint) -> Option<(u32, ChunkAddress)> {
        self.index
            .get(fp)
            .map(|&i| (self.heap[i].1.freq, self.heap[i].1.address))
    }

    /// Smallest frequency currently held, i.e. the eviction threshold.
    pub fn min_freq(&self) -> Option<u32> {
        self.heap.first().map(|(_, item)| item.freq)
    }

    fn parent(idx: usize) -> usize {
        (idx - 1) / 2
    }

    fn child(idx: usize) -> usize {
        idx * 2 + 1
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        self.index.insert(self.heap[a].0, a);
        self.index.insert(self.heap[b].0, b);
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let p = Self::parent(idx);
            if self.heap[idx].1.freq < self.heap[p].1.freq {
                self.swap(idx, p);
                idx = p;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        loop {
            let l = Self::child(idx);
            let r = l + 1;
            let mut smallest = idx;
            if l < self.heap.len() && self.heap[l].1.freq < self.heap[smallest].1.freq {
                smallest = l;
            }
            if r < self.heap.len() && self.heap[r].1.freq < self.heap[smallest].1.freq {
                smallest = r;
            }
            if smallest == idx {
                break;
            }
            self.swap(idx, smallest);
            idx = smallest;
        }
    }

    /// Insert a brand new fingerprint. If the heap is below capacity, it is
    /// added outright; otherwise it only enters if `freq` beats the current
    /// minimum, which is then evicted.
    pub fn add(&mut self, fp: Fingerprint, freq: u32, address: ChunkAddress) {
        if self.index.contains_key(&fp) {
            self.update(&fp, freq, address);
            return;
        }

        if self.heap.len() < self.capacity {
            let idx = self.heap.len();
            self.heap.push((fp, HeapItem { freq, address }));
            self.index.insert(fp, idx);
            self.sift_up(idx);
        } else if let Some(min) = self.min_freq() {
            if freq > min {
                self.pop_min();
                self.add(fp, freq, address);
            }
            // freq <= min: not frequent enough to displace anything, ignored.
        }
    }

    /// Update the frequency (and possibly address) of an entry already in
    /// the heap, re-establishing heap order.
    pub fn update(&mut self, fp: &Fingerprint, freq: u32, address: ChunkAddress) {
        if let Some(&idx) = self.index.get(fp) {
            let old_freq = self.heap[idx].1.freq;
            self.heap[idx].1 = HeapItem { freq, address };
            if freq < old_freq {
                self.sift_down(idx);
            } else {
                self.sift_up(idx);
            }
        }
    }

    /// Snapshot every retained entry for sealed persistence (spec §4.9 "(c)
    /// Freq"). Order is heap-internal, not frequency order.
    pub fn entries(&self) -> Vec<(Fingerprint, u32, ChunkAddress)> {
        self.heap.iter().map(|(fp, item)| (*fp, item.freq, item.address)).collect()
    }

    /// Rebuild the heap from sealed entries, re-establishing heap order via
    /// ordinary inserts rather than trusting the sealed order.
    pub fn load_entries(&mut self, entries: Vec<(Fingerprint, u32, ChunkAddress)>) {
        self.heap.clear();
        self.index.clear();
        for (fp, freq, address) in entries {
            self.add(fp, freq, address);
        }
    }

    fn pop_min(&mut self) -> Option<(Fingerprint, u32, ChunkAddress)> {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.swap(0, last);
        let (fp, item) = self.heap.pop().unwrap();
        self.index.remove(&fp);
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        Some((fp, item.freq, item.address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> ChunkAddress {
        ChunkAddress { container_id: n, offset: 0, length: 4 }
    }

    fn fp(b: u8) -> Fingerprint {
        Fingerprint::of(&[b])
    }

    #[test]
    fn stays_within_capacity() {
        let mut heap = TopKHeap::new(3);
        for i in 0..10u8 {
            heap.add(fp(i), i as u32, addr(i as u64));
        }
        assert_eq!(heap.len(), 3);
        // The 3 highest frequencies (7,8,9) should have survived.
        assert!(heap.contains(&fp(9)));
        assert!(heap.contains(&fp(8)));
        assert!(heap.contains(&fp(7)));
        assert!(!heap.contains(&fp(0)));
    }

    #[test]
    fn update_can_promote_entry_above_eviction() {
        let mut heap = TopKHeap::new(2);
        heap.add(fp(1), 10, addr(1));
        heap.add(fp(2), 20, addr(2));
        // fp(3) has freq 5, too low to displace the min (fp(1)=10).
        heap.add(fp(3), 5, addr(3));
        assert!(!heap.contains(&fp(3)));

        // Now bump fp(1) up; min becomes whichever is smaller among survivors.
        heap.update(&fp(1), 100, addr(1));
        assert_eq!(heap.min_freq(), Some(20));
    }

    #[test]
    fn min_freq_is_eviction_threshold() {
        let mut heap = TopKHeap::new(1);
        heap.add(fp(1), 5, addr(1));
        assert_eq!(heap.min_freq(), Some(5));
        heap.add(fp(2), 3, addr(2)); // too low, ignored
        assert!(heap.contains(&fp(1)));
        heap.add(fp(3), 9, addr(3)); // evicts fp(1)
        assert!(heap.contains(&fp(3)));
        assert!(!heap.contains(&fp(1)));
    }
}
