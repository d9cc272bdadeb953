//! Property tests for the Top-K heap's size bound and monotonicity
//! invariants (spec.md §4.4 "Top-K monotonicity": at capacity, a new entry
//! only displaces the current minimum if strictly more frequent).

use debedup::{ChunkAddress, Fingerprint, TopKHeap};
use proptest::prelude::*;

fn addr(n: u64) -> ChunkAddress {
    ChunkAddress { container_id: n, offset: 0, length: 4 }
}

proptest! {
    #[test]
    fn never_exceeds_capacity(capacity in 1usize..32, entries in proptest::collection::vec((0u8..=255, 1u32..1000), 0..200)) {
        let mut heap = TopKHeap::new(capacity);
        for (i, (byte, freq)) in entries.iter().enumerate() {
            heap.add(Fingerprint::of(&[*byte]), *freq, addr(i as u64));
            prop_assert!(heap.len() <= capacity);
            prop_assert!(heap.len() <= heap.capacity());
        }
    }

    #[test]
    fn every_retained_entry_is_at_least_the_minimum(capacity in 1usize..16, entries in proptest::collection::vec((0u8..=255, 1u32..1000), 0..100)) {
        let mut heap = TopKHeap::new(capacity);
        for (i, (byte, freq)) in entries.iter().enumerate() {
            heap.add(Fingerprint::of(&[*byte]), *freq, addr(i as u64));
        }
        if let Some(min) = heap.min_freq() {
            for byte in 0u8..=255 {
                if let Some((freq, _)) = heap.get(&Fingerprint::of(&[byte])) {
                    prop_assert!(freq >= min);
                }
            }
        }
    }

    #[test]
    fn a_higher_frequency_duplicate_never_shrinks_the_heap(capacity in 1usize..16, byte in 0u8..=255, freqs in proptest::collection::vec(1u32..1000, 1..20)) {
        let mut heap = TopKHeap::new(capacity);
        let fp = Fingerprint::of(&[byte]);
        for (i, freq) in freqs.iter().enumerate() {
            heap.add(fp, *freq, addr(i as u64));
        }
        // Updating an existing entry's frequency never evicts it from its
        // own slot — it is still present afterward.
        prop_assert!(heap.contains(&fp));
    }
}
