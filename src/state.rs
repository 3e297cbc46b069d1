//! The MaciState Engine
//!
//! `MaciState` is the coordinator's authoritative, in-memory mirror of the
//! on-chain voting system. It owns the ordered user slots, the ordered
//! message log with its per-message ephemeral keys, the randomized zeroth
//! state leaf, and the coordinator's keypair. Everything else (Merkle
//! trees, tallies, circuit witnesses) is derived from these collections on
//! demand, so the state that must be audited stays minimal.
//!
//! # Message semantics
//!
//! Publishing performs no validation: every message, valid or not, joins
//! the committed message tree. Validity is decided only at processing time
//! against five predicates (slot bounds, signature under the user's
//! *current* key, strict nonce succession, vote option range, and the
//! quadratic credit rule `balance' = balance + prev² − weight² ≥ 0`). A
//! failing message leaves the state untouched and surfaces no error; a
//! wrongly-keyed ciphertext decrypts to garbage and dies on the same
//! predicates, indistinguishably. Rejections are deliberately silent, since
//! distinguishing them would leak which messages the coordinator could
//! read.
//!
//! An accepted command atomically rewrites the addressed slot, including
//! the key rotation target, so the *next* message for that slot must be
//! signed with the new key.
//!
//! # The zeroth leaf
//!
//! State tree slot 0 never belongs to a user. After each processed batch it
//! is overwritten with a caller-supplied random leaf, which forces a fresh
//! state root per batch even when every message in the batch was invalid.

use halo2curves::ff::Field;
use num_bigint::BigUint;
use thiserror::Error;

use crate::config::{ConfigError, MaciConfig};
use crate::domain::{Message, StateLeaf};
use crate::field::{biguint_to_fr, fr_to_biguint, fr_to_u64, Fr, NOTHING_UP_MY_SLEEVE};
use crate::keys::{self, Keypair, PubKey};
use crate::merkle::IncrementalMerkleTree;

// ----------------------------- Users -----------------------------

/// One registered user slot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    /// Current public key; rotates when a command carries a new one
    pub pub_key: PubKey,
    /// Vote weight per option, one entry per vote option
    pub votes: Vec<Fr>,
    /// Remaining voice credits
    pub voice_credit_balance: Fr,
    /// Number of commands accepted for this slot
    pub nonce: Fr,
}

impl User {
    /// Collapse the slot into its state-tree leaf.
    pub fn gen_state_leaf(&self, vote_option_tree_depth: usize) -> StateLeaf {
        let mut tree = IncrementalMerkleTree::new(vote_option_tree_depth, Fr::ZERO);
        for vote in &self.votes {
            tree.insert(*vote)
                .expect("votes vector matches the vote option tree capacity");
        }

        StateLeaf {
            pub_key: self.pub_key,
            vote_option_tree_root: tree.root(),
            voice_credit_balance: self.voice_credit_balance,
            nonce: self.nonce,
        }
    }
}

// ----------------------------- MaciState -----------------------------

/// The coordinator's in-memory voting state
#[derive(Clone, Debug)]
pub struct MaciState {
    config: MaciConfig,
    coordinator: Keypair,
    users: Vec<User>,
    messages: Vec<Message>,
    enc_pub_keys: Vec<PubKey>,
    zeroth_state_leaf: StateLeaf,
}

impl MaciState {
    /// Create an empty state for a validated configuration.
    pub fn new(config: MaciConfig, coordinator: Keypair) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            zeroth_state_leaf: StateLeaf::blank(config.vote_option_tree_depth),
            config,
            coordinator,
            users: Vec::new(),
            messages: Vec::new(),
            enc_pub_keys: Vec::new(),
        })
    }

    /// The immutable configuration
    pub fn config(&self) -> &MaciConfig {
        &self.config
    }

    /// The coordinator's keypair
    pub fn coordinator(&self) -> &Keypair {
        &self.coordinator
    }

    /// Registered users in sign-up order
    pub fn users(&self) -> &[User] {
        &self.users
    }

    /// Published messages in publish order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Ephemeral public keys, paired 1:1 with `messages`
    pub fn enc_pub_keys(&self) -> &[PubKey] {
        &self.enc_pub_keys
    }

    /// The current zeroth state leaf
    pub fn zeroth_state_leaf(&self) -> &StateLeaf {
        &self.zeroth_state_leaf
    }

    // ----------------------------- Sign-Up & Publish -----------------------------

    /// Register a new user slot.
    ///
    /// Returns the user's 1-based state index. Each call appends a fresh
    /// slot; nothing deduplicates repeated keys.
    pub fn sign_up(
        &mut self,
        pub_key: PubKey,
        initial_voice_credit_balance: Fr,
    ) -> Result<usize, StateError> {
        // Slot 0 is reserved for the zeroth leaf
        let capacity = self.config.state_tree_capacity() - 1;
        if self.users.len() == capacity {
            return Err(StateError::SignUpCapacity { capacity });
        }

        self.users.push(User {
            pub_key,
            votes: vec![Fr::ZERO; self.config.num_vote_options()],
            voice_credit_balance: initial_voice_credit_balance,
            nonce: Fr::ZERO,
        });

        Ok(self.users.len())
    }

    /// Record a message and its ephemeral public key.
    ///
    /// No validation happens here: even messages that will never pass the
    /// processing predicates belong in the committed message tree.
    pub fn publish_message(
        &mut self,
        message: Message,
        enc_pub_key: PubKey,
    ) -> Result<(), StateError> {
        let capacity = self.config.message_tree_capacity();
        if self.messages.len() == capacity {
            return Err(StateError::MessageCapacity { capacity });
        }

        self.messages.push(message);
        self.enc_pub_keys.push(enc_pub_key);
        Ok(())
    }

    // ----------------------------- Message Processing -----------------------------

    /// Apply the message at `index`, if it is valid.
    ///
    /// Invalid messages (bad slot, bad signature, bad nonce, option out of
    /// range, credit overdraw, an off-curve ephemeral key, or wrong-key
    /// garbage) leave the state unchanged and are not reported.
    pub fn process_message(&mut self, index: usize) {
        if index >= self.messages.len() {
            return;
        }

        // An ephemeral key that is not a curve point yields no shared
        // secret; the message is dropped like any other invalid one
        let Some(shared_key) =
            keys::ecdh_shared_key(&self.coordinator.priv_key, &self.enc_pub_keys[index])
        else {
            return;
        };
        let (command, signature) = self.messages[index].decrypt(shared_key);

        // Slot bounds: state indices are 1-based, 0 is the zeroth leaf
        let Some(state_index) = fr_to_u64(&command.state_index) else {
            return;
        };
        if state_index < 1 || state_index as usize > self.users.len() {
            return;
        }
        let user_index = state_index as usize - 1;

        // Signature under the slot's current key
        if !command.verify_signature(&self.users[user_index].pub_key, &signature) {
            return;
        }

        // Strict nonce succession
        if command.nonce != self.users[user_index].nonce + Fr::ONE {
            return;
        }

        // Vote option range
        let Some(vote_option_index) = fr_to_u64(&command.vote_option_index) else {
            return;
        };
        if vote_option_index > self.config.max_vote_option_index as u64 {
            return;
        }
        let option = vote_option_index as usize;

        // Quadratic credit rule, over the integers: the refunded prev² and
        // the charged weight² must not overdraw the balance
        let user = &self.users[user_index];
        let balance = fr_to_biguint(&user.voice_credit_balance);
        let prev = fr_to_biguint(&user.votes[option]);
        let weight = fr_to_biguint(&command.new_vote_weight);
        let available = balance + &prev * &prev;
        let cost = &weight * &weight;
        if cost > available {
            return;
        }
        let new_balance = available - cost;

        // All predicates passed: rewrite the slot atomically. The rotated
        // key takes effect from the next message.
        let user = &mut self.users[user_index];
        user.votes[option] = command.new_vote_weight;
        user.voice_credit_balance = biguint_to_fr(&new_balance);
        user.nonce += Fr::ONE;
        user.pub_key = command.new_pub_key;
    }

    /// Process messages `[start_index, start_index + batch_size)` in order,
    /// then swap the zeroth state leaf for `random_state_leaf`.
    ///
    /// Indices past the end of the message log are skipped, so a short
    /// final batch is fine.
    pub fn batch_process_message(
        &mut self,
        start_index: usize,
        batch_size: usize,
        random_state_leaf: StateLeaf,
    ) {
        for index in start_index..start_index.saturating_add(batch_size) {
            if index < self.messages.len() {
                self.process_message(index);
            }
        }

        self.zeroth_state_leaf = random_state_leaf;
    }

    // ----------------------------- Trees -----------------------------

    /// Build the vote-option tree over a votes vector.
    pub fn gen_vote_option_tree(&self, votes: &[Fr]) -> IncrementalMerkleTree {
        let mut tree = IncrementalMerkleTree::new(self.config.vote_option_tree_depth, Fr::ZERO);
        for vote in votes {
            tree.insert(*vote)
                .expect("votes vector matches the vote option tree capacity");
        }
        tree
    }

    /// Build the state tree: the zeroth leaf followed by one leaf per user,
    /// with the blank leaf hash as the zero value.
    pub fn gen_state_tree(&self) -> IncrementalMerkleTree {
        let blank = StateLeaf::blank(self.config.vote_option_tree_depth);
        let mut tree = IncrementalMerkleTree::new(self.config.state_tree_depth, blank.hash());

        tree.insert(self.zeroth_state_leaf.hash())
            .expect("state tree capacity is at least one");
        for user in &self.users {
            tree.insert(user.gen_state_leaf(self.config.vote_option_tree_depth).hash())
                .expect("sign_up bounds the user count by the state tree capacity");
        }
        tree
    }

    /// Build the message tree with the nothing-up-my-sleeve zero value.
    pub fn gen_message_tree(&self) -> IncrementalMerkleTree {
        let mut tree =
            IncrementalMerkleTree::new(self.config.message_tree_depth, *NOTHING_UP_MY_SLEEVE);
        for message in &self.messages {
            tree.insert(message.hash())
                .expect("publish_message bounds the log by the message tree capacity");
        }
        tree
    }

    /// Root of the current state tree
    pub fn gen_state_root(&self) -> Fr {
        self.gen_state_tree().root()
    }

    /// Root of the current message tree
    pub fn gen_message_root(&self) -> Fr {
        self.gen_message_tree().root()
    }

    // ----------------------------- Tallies -----------------------------

    /// Elementwise vote sum over all users strictly before the batch at
    /// `start_index`, i.e. users `0 ..= start_index − 2`. The missing slot
    /// is the zeroth-leaf position, which carries no votes. All zeros when
    /// `start_index ≤ 1`.
    pub fn compute_cumulative_vote_tally(&self, start_index: usize) -> Vec<Fr> {
        let mut results = vec![Fr::ZERO; self.config.num_vote_options()];
        if start_index <= 1 {
            return results;
        }

        let end = (start_index - 1).min(self.users.len());
        for user in &self.users[..end] {
            for (acc, vote) in results.iter_mut().zip(&user.votes) {
                *acc += vote;
            }
        }
        results
    }

    /// Elementwise vote sum for the batch of state leaves starting at
    /// `start_index`. Leaf position j ≥ 1 holds user j − 1; position 0 is
    /// the zeroth leaf and contributes nothing, as do positions past the
    /// last user.
    pub fn compute_batch_vote_tally(
        &self,
        start_index: usize,
        batch_size: usize,
    ) -> Result<Vec<Fr>, StateError> {
        if batch_size == 0
            || start_index % batch_size != 0
            || start_index >= self.users.len()
        {
            return Err(StateError::InvalidTallyBatch {
                start_index,
                batch_size,
                num_users: self.users.len(),
            });
        }

        let (first_user, count) = if start_index == 0 {
            (0, batch_size - 1)
        } else {
            (start_index - 1, batch_size)
        };

        let mut results = vec![Fr::ZERO; self.config.num_vote_options()];
        for user in self.users.iter().skip(first_user).take(count) {
            for (acc, vote) in results.iter_mut().zip(&user.votes) {
                *acc += vote;
            }
        }
        Ok(results)
    }

    /// Commit to a results vector: `H(results ‖ salt)`.
    pub fn gen_results_commitment(&self, results: &[Fr], salt: Fr) -> Fr {
        let mut inputs = results.to_vec();
        inputs.push(salt);
        crate::poseidon::hash(&inputs)
    }

    /// Exact integer voice-credit bookkeeping for one user, used by tests
    /// and invariant checks: `balance + Σ votes²`.
    pub fn credits_accounted(user: &User) -> BigUint {
        let mut total = fr_to_biguint(&user.voice_credit_balance);
        for vote in &user.votes {
            let v = fr_to_biguint(vote);
            total += &v * &v;
        }
        total
    }
}

// ----------------------------- Errors -----------------------------

/// Programmer-facing state errors; semantic message failures are silent
#[derive(Error, Debug)]
pub enum StateError {
    /// All non-reserved state tree slots are occupied
    #[error("sign-up capacity reached: {capacity} user slots")]
    SignUpCapacity {
        /// Number of available user slots
        capacity: usize,
    },

    /// The message tree is full
    #[error("message capacity reached: {capacity} messages")]
    MessageCapacity {
        /// Message tree capacity
        capacity: usize,
    },

    /// The tally batch is misaligned or past the registered users
    #[error(
        "invalid tally batch: start {start_index}, size {batch_size}, {num_users} users"
    )]
    InvalidTallyBatch {
        /// Requested batch start
        start_index: usize,
        /// Requested batch size
        batch_size: usize,
        /// Registered user count
        num_users: usize,
    },
}

// ----------------------------- Tests -----------------------------
