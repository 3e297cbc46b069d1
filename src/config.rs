//! Coordinator Configuration
//!
//! Tree depths, batch sizes, and voting bounds are fixed at construction
//! and shared between the coordinator, the on-chain contract, and the
//! circuits; they can never change for the lifetime of a `MaciState`.
//! `validate` enforces the compatibility rules the circuits assume
//! (power-of-two batch sizes, batches that fit their trees), so every
//! downstream module can take the configuration at face value.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::field::Fr;

/// Maximum supported tree depth; paths and indices fit comfortably in usize
const MAX_TREE_DEPTH: usize = 32;

/// Immutable coordinator parameters
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MaciConfig {
    /// Depth of the state tree; capacity 2^depth leaves including slot 0
    pub state_tree_depth: usize,
    /// Depth of the message tree
    pub message_tree_depth: usize,
    /// Depth of each user's vote-option tree
    pub vote_option_tree_depth: usize,
    /// Messages processed per batch
    pub message_batch_size: usize,
    /// Users tallied per batch; must be a power of two
    pub quad_vote_tally_batch_size: usize,
    /// Highest valid vote option index (inclusive)
    pub max_vote_option_index: usize,
    /// Voice credits granted to each user at sign-up
    pub initial_voice_credit_balance: Fr,
}

impl MaciConfig {
    /// Check the cross-parameter rules the circuits rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, depth) in [
            ("state_tree_depth", self.state_tree_depth),
            ("message_tree_depth", self.message_tree_depth),
            ("vote_option_tree_depth", self.vote_option_tree_depth),
        ] {
            if depth == 0 || depth > MAX_TREE_DEPTH {
                return Err(ConfigError::DepthOutOfRange { name, depth });
            }
        }

        for (name, size) in [
            ("message_batch_size", self.message_batch_size),
            ("quad_vote_tally_batch_size", self.quad_vote_tally_batch_size),
        ] {
            if !size.is_power_of_two() {
                return Err(ConfigError::BatchNotPowerOfTwo { name, size });
            }
        }

        if self.quad_vote_tally_batch_size > self.state_tree_capacity() {
            return Err(ConfigError::BatchTooLarge {
                name: "quad_vote_tally_batch_size",
                size: self.quad_vote_tally_batch_size,
                capacity: self.state_tree_capacity(),
            });
        }
        if self.message_batch_size > self.message_tree_capacity() {
            return Err(ConfigError::BatchTooLarge {
                name: "message_batch_size",
                size: self.message_batch_size,
                capacity: self.message_tree_capacity(),
            });
        }

        if self.max_vote_option_index >= self.num_vote_options() {
            return Err(ConfigError::MaxVoteOptionOutOfRange {
                index: self.max_vote_option_index,
                options: self.num_vote_options(),
            });
        }

        Ok(())
    }

    /// Number of vote options, 2^voteOptionTreeDepth
    pub fn num_vote_options(&self) -> usize {
        1 << self.vote_option_tree_depth
    }

    /// State tree capacity including the reserved zeroth slot
    pub fn state_tree_capacity(&self) -> usize {
        1 << self.state_tree_depth
    }

    /// Message tree capacity
    pub fn message_tree_capacity(&self) -> usize {
        1 << self.message_tree_depth
    }

    /// Depth of one tally batch subtree, log2(batch size)
    pub fn batch_tree_depth(&self) -> usize {
        self.quad_vote_tally_batch_size.trailing_zeros() as usize
    }

    /// Depth of the tree whose leaves are batch subtree roots
    pub fn intermediate_state_tree_depth(&self) -> usize {
        self.state_tree_depth - self.batch_tree_depth()
    }
}

impl Default for MaciConfig {
    fn default() -> Self {
        Self {
            state_tree_depth: 4,
            message_tree_depth: 4,
            vote_option_tree_depth: 2,
            message_batch_size: 4,
            quad_vote_tally_batch_size: 4,
            max_vote_option_index: 3,
            initial_voice_credit_balance: Fr::from(100u64),
        }
    }
}

// ----------------------------- Errors -----------------------------

/// Fatal configuration errors, raised at construction
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A tree depth is zero or too large
    #[error("{name} out of range: {depth}")]
    DepthOutOfRange {
        /// Parameter name
        name: &'static str,
        /// Offending depth
        depth: usize,
    },

    /// A batch size is not a power of two
    #[error("{name} must be a power of two, got {size}")]
    BatchNotPowerOfTwo {
        /// Parameter name
        name: &'static str,
        /// Offending size
        size: usize,
    },

    /// A batch size exceeds its tree's capacity
    #[error("{name} {size} exceeds tree capacity {capacity}")]
    BatchTooLarge {
        /// Parameter name
        name: &'static str,
        /// Offending size
        size: usize,
        /// Tree capacity
        capacity: usize,
    },

    /// The maximum vote option index does not fit the vote option tree
    #[error("max_vote_option_index {index} outside the {options} vote options")]
    MaxVoteOptionOutOfRange {
        /// Offending index
        index: usize,
        /// Number of representable options
        options: usize,
    },
}

// ----------------------------- Tests -----------------------------
