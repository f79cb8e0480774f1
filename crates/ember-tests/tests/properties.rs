//! Property tests for the block index graph and trust ranking.

use proptest::prelude::*;

use ember_core::traits::BlockTrust;
use ember_core::types::*;
use ember_core::validation::CompactTargetTrust;
use ember_index::ChainIndex;
use ember_index::trust::rank_chain_trust;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Records for a linear chain, linked both ways, one per entry of `bits`.
fn chain_records(bits: &[u32]) -> Vec<(Hash256, DiskBlockIndex)> {
    let mut out: Vec<(Hash256, DiskBlockIndex)> = Vec::with_capacity(bits.len());
    let mut prev = Hash256::ZERO;
    for (height, &bits) in bits.iter().enumerate() {
        let record = DiskBlockIndex {
            hash_prev: prev,
            height: height as u64,
            bits,
            nonce: height as u32,
            ..DiskBlockIndex::default()
        };
        let hash = record.block_hash();
        if let Some((_, parent)) = out.last_mut() {
            parent.hash_next = hash;
        }
        out.push((hash, record));
        prev = hash;
    }
    out
}

fn snapshot(index: &ChainIndex) -> Vec<(Hash256, Option<Hash256>, Option<Hash256>, u64, bool)> {
    let mut nodes: Vec<_> = index
        .graph
        .iter()
        .map(|(hash, n)| (*hash, n.prev, n.next, n.height, n.has_record))
        .collect();
    nodes.sort();
    nodes
}

fn bits_strategy() -> impl Strategy<Value = u32> {
    prop_oneof![
        (0x03u32..=0x20, 1u32..0x007f_ffff).prop_map(|(e, m)| (e << 24) | m),
        Just(0x1d00_ffff),
        Just(0),
    ]
}

// ---------------------------------------------------------------------------
// Insertion order
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn insertion_order_does_not_matter(
        records in (1usize..40)
            .prop_map(|n| chain_records(&vec![0x1d00_ffff; n]))
            .prop_flat_map(|records| {
                let len = records.len();
                (Just(records.clone()), Just(records).prop_shuffle(), 0..len)
            })
    ) {
        let (ordered, shuffled, repeat) = records;
        let genesis = ordered[0].0;

        let mut a = ChainIndex::new(genesis);
        for (hash, record) in &ordered {
            a.insert_record(*hash, record);
        }
        let mut b = ChainIndex::new(genesis);
        for (hash, record) in &shuffled {
            b.insert_record(*hash, record);
        }
        // Applying a record again changes nothing.
        let (hash, record) = &shuffled[repeat];
        b.insert_record(*hash, record);

        prop_assert_eq!(snapshot(&a), snapshot(&b));
        prop_assert_eq!(a.genesis, Some(genesis));
        prop_assert_eq!(b.genesis, Some(genesis));
        prop_assert_eq!(b.graph.len(), ordered.len());
    }
}

// ---------------------------------------------------------------------------
// Trust
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn trust_never_decreases_along_a_chain(
        bits in prop::collection::vec(bits_strategy(), 1..60)
    ) {
        let records = chain_records(&bits);
        let mut index = ChainIndex::new(records[0].0);
        for (hash, record) in &records {
            index.insert_record(*hash, record);
        }
        rank_chain_trust(&mut index, &CompactTargetTrust);

        let mut last = ChainTrust::ZERO;
        for (hash, _) in &records {
            let node = index.graph.get(hash).unwrap();
            let own = CompactTargetTrust.block_trust(node);
            prop_assert!(node.chain_trust >= last);
            prop_assert_eq!(node.chain_trust, last + own);
            last = node.chain_trust;
        }
    }
}
