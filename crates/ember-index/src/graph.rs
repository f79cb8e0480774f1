//! Block index graph.
//!
//! The graph owns every [`BlockIndexNode`], keyed by block hash.
//! Previous/next links inside a node are plain hashes looked up here, so
//! nodes may be inserted in any order: a neighbour seen before its own
//! record exists as a placeholder until that record arrives.

use std::collections::HashMap;

use ember_core::block_index::BlockIndexNode;
use ember_core::types::{DiskBlockIndex, Hash256};

#[derive(Debug, Default)]
pub struct BlockIndexGraph {
    nodes: HashMap<Hash256, BlockIndexNode>,
}

impl BlockIndexGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node for `hash`, creating a placeholder on first reference.
    pub fn get_or_create(&mut self, hash: Hash256) -> &mut BlockIndexNode {
        self.nodes
            .entry(hash)
            .or_insert_with(|| BlockIndexNode::placeholder(hash))
    }

    pub fn get(&self, hash: &Hash256) -> Option<&BlockIndexNode> {
        self.nodes.get(hash)
    }

    pub fn get_mut(&mut self, hash: &Hash256) -> Option<&mut BlockIndexNode> {
        self.nodes.get_mut(hash)
    }

    pub fn contains(&self, hash: &Hash256) -> bool {
        self.nodes.contains_key(hash)
    }

    /// Insert or overwrite the node for `hash` from its disk record.
    ///
    /// Placeholders are created for the non-null previous and next hashes.
    /// Applying the same record twice leaves the graph unchanged.
    pub fn apply_disk_record(&mut self, hash: Hash256, record: &DiskBlockIndex) -> &BlockIndexNode {
        if let Some(prev) = record.hash_prev.non_zero() {
            self.get_or_create(prev);
        }
        if let Some(next) = record.hash_next.non_zero() {
            self.get_or_create(next);
        }
        let node = self.get_or_create(hash);
        node.apply_record(record);
        node
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Hash256, &BlockIndexNode)> {
        self.nodes.iter()
    }

    /// Walk previous-links from `hash`, starting with `hash` itself.
    pub fn ancestors(&self, hash: Hash256) -> Ancestors<'_> {
        Ancestors {
            graph: self,
            cursor: Some(hash),
        }
    }
}

/// Iterator over a node and its ancestors, tip first.
pub struct Ancestors<'a> {
    graph: &'a BlockIndexGraph,
    cursor: Option<Hash256>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a BlockIndexNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.graph.get(&self.cursor?)?;
        self.cursor = node.prev;
        Some(node)
    }
}
