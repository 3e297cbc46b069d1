//! Domain Objects: State Leaves, Commands, and Messages
//!
//! Every object the coordinator hashes, signs, or encrypts has exactly one
//! canonical form as a flat vector of field elements:
//!
//! ```text
//! PubKey    → [x, y]                                                (2)
//! Command   → [stateIndex, newPubKey.x, newPubKey.y,
//!              voteOptionIndex, newVoteWeight, nonce, salt]         (7)
//! StateLeaf → [pubKey.x, pubKey.y, voteOptionTreeRoot,
//!              voiceCreditBalance, nonce]                           (5)
//! Message   → [iv, data_0 … data_9]                                 (11)
//! ```
//!
//! A `Command` is a user's cleartext intent. On the wire it becomes a
//! `Message`: the 7 command elements followed by the 3 signature elements
//! `(R8.x, R8.y, S)`, encrypted under the ECDH key shared between the
//! voter's ephemeral key and the coordinator. The salt makes equal commands
//! hash differently, so observers cannot link repeated intents.

use halo2curves::ff::Field;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::babyjubjub::Point;
use crate::cipher::{self, Ciphertext};
use crate::field::{fr_random, Fr};
use crate::keys::{self, Keypair, PubKey, Signature};
use crate::merkle::IncrementalMerkleTree;
use crate::poseidon;

/// Number of encrypted words in a message: 7 command + 3 signature elements
pub const MESSAGE_DATA_LENGTH: usize = 10;

// ----------------------------- State Leaves -----------------------------

/// The per-user record hashed into the state tree
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateLeaf {
    /// The user's current public key
    pub pub_key: PubKey,
    /// Root of the user's per-option vote tree
    pub vote_option_tree_root: Fr,
    /// Remaining voice credits
    pub voice_credit_balance: Fr,
    /// Count of commands accepted so far
    pub nonce: Fr,
}

impl StateLeaf {
    /// The blank leaf: zero key, empty vote tree, no credits, nonce 0.
    /// Used as the state tree's zero value and as the initial zeroth leaf.
    pub fn blank(vote_option_tree_depth: usize) -> Self {
        Self {
            pub_key: PubKey(Point {
                x: Fr::ZERO,
                y: Fr::ZERO,
            }),
            vote_option_tree_root: IncrementalMerkleTree::new(vote_option_tree_depth, Fr::ZERO)
                .root(),
            voice_credit_balance: Fr::ZERO,
            nonce: Fr::ZERO,
        }
    }

    /// A leaf with all four fields drawn from a CSPRNG. Swapped into slot 0
    /// after each processed batch so consecutive batch roots are unlinkable.
    pub fn random(mut rng: impl RngCore + CryptoRng) -> Self {
        Self {
            pub_key: PubKey(Point {
                x: fr_random(&mut rng),
                y: fr_random(&mut rng),
            }),
            vote_option_tree_root: fr_random(&mut rng),
            voice_credit_balance: fr_random(&mut rng),
            nonce: fr_random(&mut rng),
        }
    }

    /// Canonical five-element vector form
    pub fn as_vector(&self) -> [Fr; 5] {
        [
            self.pub_key.0.x,
            self.pub_key.0.y,
            self.vote_option_tree_root,
            self.voice_credit_balance,
            self.nonce,
        ]
    }

    /// The state tree leaf value, `H(vector)`
    pub fn hash(&self) -> Fr {
        poseidon::hash(&self.as_vector())
    }
}

// ----------------------------- Commands -----------------------------

/// A cleartext vote command
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// 1-based user slot; 0 is the reserved zeroth leaf
    pub state_index: Fr,
    /// Key-rotation target; equal to the current key to skip rotation
    pub new_pub_key: PubKey,
    /// 0-based vote option
    pub vote_option_index: Fr,
    /// New vote weight for that option (costs weight² credits)
    pub new_vote_weight: Fr,
    /// Must equal the user's accepted-command count plus one
    pub nonce: Fr,
    /// Uniform random blinder
    pub salt: Fr,
}

impl Command {
    /// Canonical seven-element vector form
    pub fn as_vector(&self) -> [Fr; 7] {
        [
            self.state_index,
            self.new_pub_key.0.x,
            self.new_pub_key.0.y,
            self.vote_option_index,
            self.new_vote_weight,
            self.nonce,
            self.salt,
        ]
    }

    /// The signing digest, `H(vector)`
    pub fn hash(&self) -> Fr {
        poseidon::hash(&self.as_vector())
    }

    /// Sign the command with the voter's keypair.
    pub fn sign(&self, keypair: &Keypair) -> Signature {
        keypair.sign(self.hash())
    }

    /// Verify a signature over this command.
    pub fn verify_signature(&self, pub_key: &PubKey, signature: &Signature) -> bool {
        keys::verify(pub_key, self.hash(), signature)
    }

    /// Encrypt the command and its signature under a shared key.
    pub fn encrypt(
        &self,
        signature: &Signature,
        shared_key: Fr,
        rng: impl RngCore + CryptoRng,
    ) -> Message {
        let mut plaintext = self.as_vector().to_vec();
        plaintext.push(signature.r8.x);
        plaintext.push(signature.r8.y);
        plaintext.push(signature.s);

        let ciphertext = cipher::encrypt(&plaintext, shared_key, rng);
        let mut data = [Fr::ZERO; MESSAGE_DATA_LENGTH];
        for (slot, word) in data.iter_mut().zip(ciphertext.data) {
            *slot = word;
        }

        Message {
            iv: ciphertext.iv,
            data,
        }
    }
}

// ----------------------------- Messages -----------------------------

/// An encrypted command as published on-chain
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Cipher initialization value
    pub iv: Fr,
    /// Encrypted command + signature words
    pub data: [Fr; MESSAGE_DATA_LENGTH],
}

impl Message {
    /// Canonical eleven-element vector form
    pub fn as_vector(&self) -> [Fr; 11] {
        let mut out = [Fr::ZERO; 11];
        out[0] = self.iv;
        out[1..].copy_from_slice(&self.data);
        out
    }

    /// The message tree leaf value, `H(vector)`
    pub fn hash(&self) -> Fr {
        poseidon::hash(&self.as_vector())
    }

    /// Decrypt into a command and signature.
    ///
    /// Structurally this always succeeds; a wrong key yields arbitrary
    /// field elements that fail the processor's validity predicates like
    /// any other invalid command.
    pub fn decrypt(&self, shared_key: Fr) -> (Command, Signature) {
        let plaintext = cipher::decrypt(
            &Ciphertext {
                iv: self.iv,
                data: self.data.to_vec(),
            },
            shared_key,
        );

        let command = Command {
            state_index: plaintext[0],
            new_pub_key: PubKey(Point {
                x: plaintext[1],
                y: plaintext[2],
            }),
            vote_option_index: plaintext[3],
            new_vote_weight: plaintext[4],
            nonce: plaintext[5],
            salt: plaintext[6],
        };
        let signature = Signature {
            r8: Point {
                x: plaintext[7],
                y: plaintext[8],
            },
            s: plaintext[9],
        };

        (command, signature)
    }
}

// ----------------------------- Tests -----------------------------
