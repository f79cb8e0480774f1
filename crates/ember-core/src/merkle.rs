//! Double SHA-256 merkle root over transaction hashes.
//!
//! Internal node: `sha256d(left || right)`. Odd-length layers are padded
//! by duplicating the last element. Empty trees produce [`Hash256::ZERO`].

use crate::types::{sha256d, Hash256};

/// Compute an internal node hash.
pub fn node_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(left.as_bytes());
    data[32..].copy_from_slice(right.as_bytes());
    sha256d(&data)
}

/// Compute the merkle root from a slice of transaction hashes.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    if leaves.is_empty() {
        return Hash256::ZERO;
    }

    let mut current = leaves.to_vec();
    while current.len() > 1 {
        current = next_layer(&current);
    }
    current[0]
}

fn next_layer(layer: &[Hash256]) -> Vec<Hash256> {
    layer
        .chunks(2)
        .map(|pair| {
            let left = &pair[0];
            node_hash(left, pair.get(1).unwrap_or(left))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn h(n: u8) -> Hash256 {
        Hash256([n; 32])
    }

    #[test]
    fn empty_tree_is_zero() {
        assert_eq!(merkle_root(&[]), Hash256::ZERO);
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        assert_eq!(merkle_root(&[h(1)]), h(1));
    }

    #[test]
    fn odd_layer_duplicates_last() {
        let three = merkle_root(&[h(1), h(2), h(3)]);
        let four = merkle_root(&[h(1), h(2), h(3), h(3)]);
        assert_eq!(three, four);
    }

    #[test]
    fn order_matters() {
        assert_ne!(merkle_root(&[h(1), h(2)]), merkle_root(&[h(2), h(1)]));
    }

    proptest! {
        #[test]
        fn any_leaf_change_moves_the_root(
            leaves in prop::collection::vec(any::<[u8; 32]>(), 1..20),
            pick in any::<usize>(),
        ) {
            let leaves: Vec<Hash256> = leaves.into_iter().map(Hash256).collect();
            let mut changed = leaves.clone();
            let i = pick % changed.len();
            changed[i].0[0] ^= 0xFF;
            prop_assert_ne!(merkle_root(&leaves), merkle_root(&changed));
        }
    }
}
