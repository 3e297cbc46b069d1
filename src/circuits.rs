//! Circuit Input Builders
//!
//! The prover consumes witnesses as JSON-shaped dictionaries whose leaves
//! are decimal-string field elements (or nested arrays of them). The key
//! set and nesting of each dictionary is the wire contract between this
//! crate and the prover; the builders here are the only place it is
//! defined.
//!
//! Three builders cover the two circuits:
//!
//! - a single-message witness for the state-transition circuit,
//! - a batch witness that records one single-message witness per message
//!   *before* applying it to a cloned state, then appends the randomized
//!   zeroth-leaf overwrite,
//! - a quadratic-tally witness built from a two-level decomposition of the
//!   state tree (per-batch subtrees under an intermediate tree).
//!
//! None of the builders mutates the `MaciState` they are called on; the
//! batch builder simulates forward on a deep clone.

use halo2curves::ff::Field;
use serde_json::{json, Value};
use thiserror::Error;

use crate::domain::StateLeaf;
use crate::field::{fr_to_decimal, fr_to_u64, Fr};
use crate::keys::{self, PubKey};
use crate::merkle::{IncrementalMerkleTree, MerkleError};
use crate::state::MaciState;

// ----------------------------- JSON Helpers -----------------------------

fn fr_json(x: &Fr) -> Value {
    Value::String(fr_to_decimal(x))
}

fn frs_json(xs: &[Fr]) -> Value {
    Value::Array(xs.iter().map(fr_json).collect())
}

fn bits_json(bits: &[u8]) -> Value {
    Value::Array(bits.iter().map(|b| Value::String(b.to_string())).collect())
}

fn usize_json(x: usize) -> Value {
    Value::String(x.to_string())
}

// ----------------------------- Per-Message Witness -----------------------------

/// Everything the state-transition circuit needs for one message
struct UpdateWitness {
    ecdh_public_key: PubKey,
    message: [Fr; 11],
    msg_tree_root: Fr,
    msg_tree_path_elements: Vec<Fr>,
    msg_tree_path_index: Vec<u8>,
    state_tree_root: Fr,
    state_tree_path_elements: Vec<Fr>,
    state_tree_path_index: Vec<u8>,
    state_tree_data_raw: [Fr; 5],
    state_tree_max_leaf_index: usize,
    vote_options_leaf_raw: Fr,
    vote_options_tree_root: Fr,
    vote_options_tree_path_elements: Vec<Fr>,
    vote_options_tree_path_index: Vec<u8>,
    vote_options_max_leaf_index: usize,
}

fn gen_update_witness(
    state: &MaciState,
    index: usize,
) -> Result<UpdateWitness, CircuitInputError> {
    if index >= state.messages().len() {
        return Err(CircuitInputError::MessageIndexOutOfRange {
            index,
            count: state.messages().len(),
        });
    }
    if state.users().is_empty() {
        return Err(CircuitInputError::NoUsers);
    }

    let message = state.messages()[index];
    let enc_pub_key = state.enc_pub_keys()[index];
    // An off-curve ephemeral key yields no shared secret. Decrypt with a
    // zero key instead: the garbage command takes the same fallback path
    // below, and the message still gets a structurally valid no-op witness.
    let shared_key = keys::ecdh_shared_key(&state.coordinator().priv_key, &enc_pub_key)
        .unwrap_or(Fr::ZERO);
    let (command, _signature) = message.decrypt(shared_key);

    let message_tree = state.gen_message_tree();
    let (msg_tree_path_elements, msg_tree_path_index) = message_tree.get_path_update(index)?;

    // Address the slot the command names. A garbage or out-of-range command
    // still needs a structurally valid witness (the circuit proves the
    // no-op), so fall back to slot 1 / option 0 when the indices do not
    // resolve.
    let num_users = state.users().len();
    let leaf_index = fr_to_u64(&command.state_index)
        .filter(|i| *i >= 1 && *i <= num_users as u64)
        .unwrap_or(1) as usize;
    let user = &state.users()[leaf_index - 1];

    let num_options = state.config().num_vote_options();
    let option = fr_to_u64(&command.vote_option_index)
        .filter(|i| *i < num_options as u64)
        .unwrap_or(0) as usize;

    let vote_option_tree = state.gen_vote_option_tree(&user.votes);
    let (vote_options_tree_path_elements, vote_options_tree_path_index) =
        vote_option_tree.get_path_update(option)?;

    let state_tree = state.gen_state_tree();
    let (state_tree_path_elements, state_tree_path_index) =
        state_tree.get_path_update(leaf_index)?;

    let state_leaf = user.gen_state_leaf(state.config().vote_option_tree_depth);

    Ok(UpdateWitness {
        ecdh_public_key: enc_pub_key,
        message: message.as_vector(),
        msg_tree_root: message_tree.root(),
        msg_tree_path_elements,
        msg_tree_path_index,
        state_tree_root: state_tree.root(),
        state_tree_path_elements,
        state_tree_path_index,
        state_tree_data_raw: state_leaf.as_vector(),
        state_tree_max_leaf_index: state_tree.next_index() - 1,
        vote_options_leaf_raw: user.votes[option],
        vote_options_tree_root: vote_option_tree.root(),
        vote_options_tree_path_elements,
        vote_options_tree_path_index,
        vote_options_max_leaf_index: state.config().max_vote_option_index,
    })
}

// ----------------------------- Builders -----------------------------

impl MaciState {
    /// Witness for the state-transition circuit applied to one message.
    ///
    /// Read-only: the message is *not* applied to the state.
    pub fn gen_update_state_tree_circuit_inputs(
        &self,
        index: usize,
    ) -> Result<Value, CircuitInputError> {
        let w = gen_update_witness(self, index)?;
        let coordinator = self.coordinator();

        Ok(json!({
            "coordinator_public_key": frs_json(&coordinator.pub_key.as_vector()),
            "ecdh_private_key": coordinator.priv_key.to_scalar().to_str_radix(10),
            "ecdh_public_key": frs_json(&w.ecdh_public_key.as_vector()),
            "message": frs_json(&w.message),
            "msg_tree_root": fr_json(&w.msg_tree_root),
            "msg_tree_path_elements": frs_json(&w.msg_tree_path_elements),
            "msg_tree_path_index": bits_json(&w.msg_tree_path_index),
            "state_tree_root": fr_json(&w.state_tree_root),
            "state_tree_path_elements": frs_json(&w.state_tree_path_elements),
            "state_tree_path_index": bits_json(&w.state_tree_path_index),
            "state_tree_data_raw": frs_json(&w.state_tree_data_raw),
            "state_tree_max_leaf_index": usize_json(w.state_tree_max_leaf_index),
            "vote_options_leaf_raw": fr_json(&w.vote_options_leaf_raw),
            "vote_options_tree_root": fr_json(&w.vote_options_tree_root),
            "vote_options_tree_path_elements": frs_json(&w.vote_options_tree_path_elements),
            "vote_options_tree_path_index": bits_json(&w.vote_options_tree_path_index),
            "vote_options_max_leaf_index": usize_json(w.vote_options_max_leaf_index),
        }))
    }

    /// Witness for the batched state-transition circuit.
    ///
    /// Simulates the batch on a clone of the state: each message's witness
    /// is captured before the message is applied, and after the batch the
    /// zeroth leaf is overwritten with `random_state_leaf`'s hash. The
    /// caller's state is untouched; the per-message fields come back as
    /// parallel arrays, one entry per processed message.
    pub fn gen_batch_update_state_tree_circuit_inputs(
        &self,
        start_index: usize,
        batch_size: usize,
        random_state_leaf: &StateLeaf,
    ) -> Result<Value, CircuitInputError> {
        if batch_size == 0 || start_index >= self.messages().len() {
            return Err(CircuitInputError::InvalidBatch {
                start_index,
                batch_size,
            });
        }

        let mut simulated = self.clone();
        let mut witnesses = Vec::with_capacity(batch_size);

        for index in start_index..start_index.saturating_add(batch_size) {
            if index >= simulated.messages().len() {
                break;
            }
            witnesses.push(gen_update_witness(&simulated, index)?);
            simulated.process_message(index);
        }

        // The randomized zeroth-leaf overwrite closes the batch
        let mut state_tree = simulated.gen_state_tree();
        let (random_leaf_path_elements, random_leaf_path_index) =
            state_tree.get_path_update(0)?;
        state_tree.update(0, random_state_leaf.hash())?;

        let coordinator = self.coordinator();
        Ok(json!({
            "coordinator_public_key": frs_json(&coordinator.pub_key.as_vector()),
            "ecdh_private_key": coordinator.priv_key.to_scalar().to_str_radix(10),
            "ecdh_public_key": witnesses.iter()
                .map(|w| frs_json(&w.ecdh_public_key.as_vector())).collect::<Vec<_>>(),
            "message": witnesses.iter()
                .map(|w| frs_json(&w.message)).collect::<Vec<_>>(),
            "msg_tree_root": fr_json(&witnesses[0].msg_tree_root),
            "msg_tree_batch_start_index": usize_json(start_index),
            "msg_tree_path_elements": witnesses.iter()
                .map(|w| frs_json(&w.msg_tree_path_elements)).collect::<Vec<_>>(),
            "msg_tree_path_index": witnesses.iter()
                .map(|w| bits_json(&w.msg_tree_path_index)).collect::<Vec<_>>(),
            "state_tree_root": witnesses.iter()
                .map(|w| fr_json(&w.state_tree_root)).collect::<Vec<_>>(),
            "state_tree_path_elements": witnesses.iter()
                .map(|w| frs_json(&w.state_tree_path_elements)).collect::<Vec<_>>(),
            "state_tree_path_index": witnesses.iter()
                .map(|w| bits_json(&w.state_tree_path_index)).collect::<Vec<_>>(),
            "state_tree_data_raw": witnesses.iter()
                .map(|w| frs_json(&w.state_tree_data_raw)).collect::<Vec<_>>(),
            "state_tree_max_leaf_index": usize_json(witnesses[0].state_tree_max_leaf_index),
            "vote_options_leaf_raw": witnesses.iter()
                .map(|w| fr_json(&w.vote_options_leaf_raw)).collect::<Vec<_>>(),
            "vote_options_tree_root": witnesses.iter()
                .map(|w| fr_json(&w.vote_options_tree_root)).collect::<Vec<_>>(),
            "vote_options_tree_path_elements": witnesses.iter()
                .map(|w| frs_json(&w.vote_options_tree_path_elements)).collect::<Vec<_>>(),
            "vote_options_tree_path_index": witnesses.iter()
                .map(|w| bits_json(&w.vote_options_tree_path_index)).collect::<Vec<_>>(),
            "vote_options_max_leaf_index": usize_json(witnesses[0].vote_options_max_leaf_index),
            "random_leaf": frs_json(&random_state_leaf.as_vector()),
            "random_leaf_path_elements": frs_json(&random_leaf_path_elements),
            "random_leaf_path_index": bits_json(&random_leaf_path_index),
            "random_leaf_root": fr_json(&state_tree.root()),
        }))
    }

    /// Witness for the quadratic vote tally circuit over one batch of
    /// state leaves.
    ///
    /// The state tree is decomposed into per-batch subtrees of depth
    /// log2(batch_size) under an intermediate tree; the builder checks that
    /// this decomposition reproduces the authoritative state root before
    /// returning.
    pub fn gen_quad_vote_tally_circuit_inputs(
        &self,
        start_index: usize,
        batch_size: usize,
        current_results_salt: Fr,
        new_results_salt: Fr,
    ) -> Result<Value, CircuitInputError> {
        let config = self.config();
        if batch_size == 0
            || !batch_size.is_power_of_two()
            || batch_size > config.state_tree_capacity()
            || start_index % batch_size != 0
            || start_index >= self.users().len()
        {
            return Err(CircuitInputError::InvalidBatch {
                start_index,
                batch_size,
            });
        }

        let batch_tree_depth = batch_size.trailing_zeros() as usize;
        let intermediate_depth = config.state_tree_depth - batch_tree_depth;
        let blank = StateLeaf::blank(config.vote_option_tree_depth);
        let zero_votes = vec![Fr::ZERO; config.num_vote_options()];

        // Leaf at a given state tree position: slot 0 is the zeroth leaf,
        // slot j >= 1 holds user j - 1, everything past the users is blank.
        let leaf_at = |position: usize| -> StateLeaf {
            if position == 0 {
                *self.zeroth_state_leaf()
            } else if position <= self.users().len() {
                self.users()[position - 1].gen_state_leaf(config.vote_option_tree_depth)
            } else {
                blank
            }
        };

        // Rebuild the full state tree as batch subtrees under an
        // intermediate tree
        let num_batches = config.state_tree_capacity() / batch_size;
        let empty_batch_root = IncrementalMerkleTree::new(batch_tree_depth, blank.hash()).root();
        let mut intermediate_tree =
            IncrementalMerkleTree::new(intermediate_depth, empty_batch_root);

        for batch in 0..num_batches {
            let mut batch_tree = IncrementalMerkleTree::new(batch_tree_depth, blank.hash());
            for offset in 0..batch_size {
                batch_tree.insert(leaf_at(batch * batch_size + offset).hash())?;
            }
            intermediate_tree.insert(batch_tree.root())?;
        }

        let full_state_root = self.gen_state_root();
        if intermediate_tree.root() != full_state_root {
            return Err(CircuitInputError::RootMismatch {
                computed: fr_to_decimal(&intermediate_tree.root()),
                expected: fr_to_decimal(&full_state_root),
            });
        }

        let batch_number = start_index / batch_size;
        let (intermediate_path_elements, intermediate_path_index) =
            intermediate_tree.get_path_update(batch_number)?;
        let intermediate_state_root = intermediate_tree.leaves()[batch_number];

        // Raw leaves and vote vectors for this batch
        let state_leaves: Vec<Value> = (0..batch_size)
            .map(|offset| frs_json(&leaf_at(start_index + offset).as_vector()))
            .collect();
        let vote_leaves: Vec<Value> = (0..batch_size)
            .map(|offset| {
                let position = start_index + offset;
                if position >= 1 && position <= self.users().len() {
                    frs_json(&self.users()[position - 1].votes)
                } else {
                    frs_json(&zero_votes)
                }
            })
            .collect();

        let current_results = self.compute_cumulative_vote_tally(start_index);
        let current_results_commitment =
            self.gen_results_commitment(&current_results, current_results_salt);

        Ok(json!({
            "vote_leaves": vote_leaves,
            "state_leaves": state_leaves,
            "full_state_root": fr_json(&full_state_root),
            "intermediate_state_root": fr_json(&intermediate_state_root),
            "intermediate_path_elements": frs_json(&intermediate_path_elements),
            "intermediate_path_index": bits_json(&intermediate_path_index),
            "current_results": frs_json(&current_results),
            "current_results_salt": fr_json(&current_results_salt),
            "current_results_commitment": fr_json(&current_results_commitment),
            "new_results_salt": fr_json(&new_results_salt),
        }))
    }
}

// ----------------------------- Errors -----------------------------

/// Fatal witness-construction failures
#[derive(Error, Debug)]
pub enum CircuitInputError {
    /// The message index is past the published log
    #[error("message index {index} out of range ({count} messages)")]
    MessageIndexOutOfRange {
        /// Requested index
        index: usize,
        /// Published message count
        count: usize,
    },

    /// Witnesses cannot be built before any user signs up
    #[error("no users registered")]
    NoUsers,

    /// The batch bounds are misaligned or empty
    #[error("invalid batch: start {start_index}, size {batch_size}")]
    InvalidBatch {
        /// Requested batch start
        start_index: usize,
        /// Requested batch size
        batch_size: usize,
    },

    /// The two-level tally decomposition disagrees with the state root
    #[error("intermediate tree root {computed} does not match state root {expected}")]
    RootMismatch {
        /// Root recomputed from the batch subtrees
        computed: String,
        /// Authoritative state root
        expected: String,
    },

    /// A Merkle operation failed while extracting paths
    #[error(transparent)]
    Merkle(#[from] MerkleError),
}

// ----------------------------- Tests -----------------------------
