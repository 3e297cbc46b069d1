//! Incremental Merkle Tree with Zero-Subtree Caching
//!
//! The coordinator mirrors three on-chain trees: the state tree (one leaf
//! per user slot), the message tree, and each user's vote-option tree. All
//! three are fixed-depth binary trees over field elements, parameterized by
//! a per-tree zero value so an empty tree has a well-defined root without
//! materializing 2^depth leaves.
//!
//! The tree keeps a cache of every node it has computed, keyed by
//! `(level, index)`; absent nodes fall back to the precomputed zero hash of
//! their level. That makes `insert` and `update` O(depth) and lets path
//! extraction serve any index below capacity, including slots that have not
//! been written yet: the paths produced for such slots are exactly what a
//! subsequent `update` at that index would consume.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::field::Fr;
use crate::poseidon;

/// An append-friendly fixed-depth Merkle tree
#[derive(Clone, Debug)]
pub struct IncrementalMerkleTree {
    depth: usize,
    /// Zero hash per level: `zeros[0]` is the empty leaf, `zeros[k]` the
    /// root of an empty depth-k subtree
    zeros: Vec<Fr>,
    next_index: usize,
    leaves: Vec<Fr>,
    /// Cache of computed nodes, keyed by (level, index)
    nodes: BTreeMap<(usize, usize), Fr>,
}

impl IncrementalMerkleTree {
    /// Create an empty tree of the given depth and per-tree zero value.
    pub fn new(depth: usize, zero_value: Fr) -> Self {
        let mut zeros = Vec::with_capacity(depth + 1);
        zeros.push(zero_value);
        for level in 1..=depth {
            let child = zeros[level - 1];
            zeros.push(poseidon::hash_left_right(child, child));
        }

        Self {
            depth,
            zeros,
            next_index: 0,
            leaves: Vec::new(),
            nodes: BTreeMap::new(),
        }
    }

    /// Tree depth
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Maximum number of leaves, 2^depth
    pub fn capacity(&self) -> usize {
        1 << self.depth
    }

    /// Index the next `insert` will occupy
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// Leaves inserted so far, in order
    pub fn leaves(&self) -> &[Fr] {
        &self.leaves
    }

    /// Append a leaf at the next free index.
    pub fn insert(&mut self, leaf: Fr) -> Result<usize, MerkleError> {
        if self.next_index == self.capacity() {
            return Err(MerkleError::TreeFull);
        }

        let index = self.next_index;
        self.leaves.push(leaf);
        self.next_index += 1;
        self.set_leaf(index, leaf);

        Ok(index)
    }

    /// Overwrite an already-inserted leaf.
    pub fn update(&mut self, index: usize, leaf: Fr) -> Result<(), MerkleError> {
        if index >= self.next_index {
            return Err(MerkleError::InvalidIndex(index));
        }

        self.leaves[index] = leaf;
        self.set_leaf(index, leaf);

        Ok(())
    }

    /// Current root
    pub fn root(&self) -> Fr {
        self.node(self.depth, 0)
    }

    /// Sibling path and left/right bitmap from a leaf slot to the root.
    ///
    /// `indices[k]` is 1 when the path node at level k is a right child.
    /// Valid for any `index < capacity`, so callers can fetch the path for
    /// a slot they are about to write.
    pub fn get_path_update(&self, index: usize) -> Result<(Vec<Fr>, Vec<u8>), MerkleError> {
        if index >= self.capacity() {
            return Err(MerkleError::InvalidIndex(index));
        }

        let mut elements = Vec::with_capacity(self.depth);
        let mut indices = Vec::with_capacity(self.depth);
        let mut pos = index;

        for level in 0..self.depth {
            let sibling = if pos % 2 == 0 {
                self.node(level, pos + 1)
            } else {
                self.node(level, pos - 1)
            };
            elements.push(sibling);
            indices.push((pos % 2) as u8);
            pos /= 2;
        }

        Ok((elements, indices))
    }

    fn node(&self, level: usize, index: usize) -> Fr {
        *self.nodes.get(&(level, index)).unwrap_or(&self.zeros[level])
    }

    fn set_leaf(&mut self, index: usize, leaf: Fr) {
        self.nodes.insert((0, index), leaf);

        let mut pos = index;
        for level in 0..self.depth {
            let parent = pos / 2;
            let hashed = poseidon::hash_left_right(
                self.node(level, 2 * parent),
                self.node(level, 2 * parent + 1),
            );
            self.nodes.insert((level + 1, parent), hashed);
            pos = parent;
        }
    }
}

// ----------------------------- Errors -----------------------------

/// Errors from Merkle tree operations
#[derive(Error, Debug)]
pub enum MerkleError {
    /// The tree has reached its 2^depth capacity
    #[error("tree is full")]
    TreeFull,

    /// The leaf index is outside the addressable range
    #[error("invalid leaf index {0}")]
    InvalidIndex(usize),
}

// ----------------------------- Tests -----------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use halo2curves::ff::Field;

    /// Recompute the root from scratch over a zero-padded leaf array.
    fn naive_root(leaves: &[Fr], depth: usize, zero: Fr) -> Fr {
        let mut level: Vec<Fr> = leaves.to_vec();
        level.resize(1 << depth, zero);

        for _ in 0..depth {
            level = level
                .chunks(2)
                .map(|pair| poseidon::hash_left_right(pair[0], pair[1]))
                .collect();
        }
        level[0]
    }

    #[test]
    fn test_empty_root_is_zero_chain() {
        let tree = IncrementalMerkleTree::new(4, Fr::ZERO);
        assert_eq!(tree.root(), naive_root(&[], 4, Fr::ZERO));
    }

    #[test]
    fn test_insert_matches_naive_rebuild() {
        let zero = Fr::from(3u64);
        let mut tree = IncrementalMerkleTree::new(4, zero);
        let leaves: Vec<Fr> = (10..20u64).map(Fr::from).collect();

        for (i, leaf) in leaves.iter().enumerate() {
            let index = tree.insert(*leaf).unwrap();
            assert_eq!(index, i);
            assert_eq!(tree.root(), naive_root(&leaves[..=i], 4, zero));
        }
    }

    #[test]
    fn test_update_matches_naive_rebuild() {
        let mut tree = IncrementalMerkleTree::new(3, Fr::ZERO);
        let mut leaves: Vec<Fr> = (1..=5u64).map(Fr::from).collect();
        for leaf in &leaves {
            tree.insert(*leaf).unwrap();
        }

        tree.update(2, Fr::from(99u64)).unwrap();
        leaves[2] = Fr::from(99u64);

        assert_eq!(tree.root(), naive_root(&leaves, 3, Fr::ZERO));
    }

    #[test]
    fn test_update_same_leaf_keeps_root() {
        let mut tree = IncrementalMerkleTree::new(3, Fr::ZERO);
        for leaf in (1..=5u64).map(Fr::from) {
            tree.insert(leaf).unwrap();
        }

        let root = tree.root();
        tree.update(3, Fr::from(4u64)).unwrap();
        assert_eq!(tree.root(), root);
    }

    #[test]
    fn test_insert_full() {
        let mut tree = IncrementalMerkleTree::new(2, Fr::ZERO);
        for leaf in (0..4u64).map(Fr::from) {
            tree.insert(leaf).unwrap();
        }

        assert!(matches!(
            tree.insert(Fr::from(4u64)),
            Err(MerkleError::TreeFull)
        ));
    }

    #[test]
    fn test_update_out_of_range() {
        let mut tree = IncrementalMerkleTree::new(3, Fr::ZERO);
        tree.insert(Fr::ONE).unwrap();

        assert!(matches!(
            tree.update(1, Fr::ONE),
            Err(MerkleError::InvalidIndex(1))
        ));
    }

    #[test]
    fn test_path_folds_to_root() {
        let mut tree = IncrementalMerkleTree::new(4, Fr::ZERO);
        let leaves: Vec<Fr> = (0..9u64).map(|i| Fr::from(100 + i)).collect();
        for leaf in &leaves {
            tree.insert(*leaf).unwrap();
        }

        for (index, leaf) in leaves.iter().enumerate() {
            let (elements, indices) = tree.get_path_update(index).unwrap();
            assert_eq!(elements.len(), 4);

            let mut current = *leaf;
            for (sibling, bit) in elements.iter().zip(&indices) {
                current = if *bit == 1 {
                    poseidon::hash_left_right(*sibling, current)
                } else {
                    poseidon::hash_left_right(current, *sibling)
                };
            }
            assert_eq!(current, tree.root());
        }
    }

    #[test]
    fn test_path_for_unwritten_slot() {
        let mut tree = IncrementalMerkleTree::new(3, Fr::ZERO);
        tree.insert(Fr::from(1u64)).unwrap();

        // Path for the slot insert would fill next
        let (elements, indices) = tree.get_path_update(1).unwrap();

        // Folding the zero leaf through it reproduces the current root
        let mut current = Fr::ZERO;
        for (sibling, bit) in elements.iter().zip(&indices) {
            current = if *bit == 1 {
                poseidon::hash_left_right(*sibling, current)
            } else {
                poseidon::hash_left_right(current, *sibling)
            };
        }
        assert_eq!(current, tree.root());

        assert!(tree.get_path_update(8).is_err());
    }

    #[test]
    fn test_clone_is_independent() {
        let mut tree = IncrementalMerkleTree::new(3, Fr::ZERO);
        tree.insert(Fr::from(1u64)).unwrap();

        let snapshot = tree.clone();
        tree.insert(Fr::from(2u64)).unwrap();

        assert_ne!(tree.root(), snapshot.root());
        assert_eq!(snapshot.next_index(), 1);
    }
}
