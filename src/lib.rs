//! MACI Coordinator Core
//!
//! An off-chain state engine for Minimum Anti-Collusion Infrastructure
//! voting. The coordinator mirrors the on-chain system (sign-ups and
//! encrypted vote messages), deterministically applies message semantics to
//! the user state, and produces the witness inputs a zk-SNARK prover needs
//! to show that (a) a batch of messages was processed correctly and (b) the
//! quadratic vote tally for a batch of users is correct.
//!
//! # Core Concepts
//!
//! ## Encrypted commands
//! Voters publish commands encrypted under an ECDH key shared between a
//! per-message ephemeral key and the coordinator's key. Publishing never
//! validates: every message joins the committed message tree, and validity
//! is decided silently at processing time. An observer cannot tell a
//! rejected command from wrong-key garbage, which is what makes coerced
//! voters able to lie about their votes.
//!
//! ## Quadratic voice credits
//! A vote of weight w on an option costs w² credits; re-voting refunds the
//! previous weight's cost. Each user's balance plus the squared weights of
//! their current votes is invariant.
//!
//! ## The randomized zeroth leaf
//! State tree slot 0 belongs to no user. After every processed batch it is
//! replaced with fresh randomness so consecutive batch roots cannot be
//! linked, even across batches with no valid messages.
//!
//! # Scope
//!
//! This crate is a library-level core: single-threaded, synchronous, no
//! I/O, no persistence, no proofs, no chain interaction. Collaborators
//! (the on-chain contract, the prover, the coordinator daemon) consume the
//! roots, wire types, and circuit-input dictionaries it produces.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod babyjubjub;
pub mod cipher;
pub mod circuits;
pub mod config;
pub mod domain;
pub mod field;
pub mod keys;
pub mod merkle;
pub mod poseidon;
pub mod state;

// Re-export commonly used types
pub use babyjubjub::Point;

pub use cipher::{decrypt, encrypt, Ciphertext};

pub use circuits::CircuitInputError;

pub use config::{ConfigError, MaciConfig};

pub use domain::{Command, Message, StateLeaf, MESSAGE_DATA_LENGTH};

pub use field::{
    fr_from_decimal, fr_random, fr_to_decimal, FieldError, Fr, NOTHING_UP_MY_SLEEVE,
};

pub use keys::{ecdh_shared_key, verify, Keypair, PrivKey, PubKey, Signature};

pub use merkle::{IncrementalMerkleTree, MerkleError};

pub use poseidon::{hash, hash_left_right, hash_one};

pub use state::{MaciState, StateError, User};
