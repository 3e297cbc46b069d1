//! Symmetric Encryption of Field-Element Vectors
//!
//! Commands travel to the coordinator encrypted under an ECDH-derived shared
//! key. The cipher is a keystream over the field: for a plaintext vector
//! `pt` and key `k`,
//!
//! ```text
//! iv      ←$ F                      (fresh per message, CSPRNG)
//! data[i] = pt[i] + H([k, iv + i])  (mod p)
//! ```
//!
//! and decryption subtracts the same stream. The ciphertext has exactly the
//! plaintext's length plus the iv. Decrypting with the wrong key succeeds
//! structurally and yields unrelated field elements: there is no
//! authenticator, so a garbage decryption is indistinguishable from a
//! well-formed but invalid command. The message processor relies on that.

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::field::{fr_random, Fr};
use crate::poseidon;

/// An encrypted field-element vector
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext {
    /// Random initialization value
    pub iv: Fr,
    /// Keystream-masked plaintext, same length as the input
    pub data: Vec<Fr>,
}

/// Encrypt a plaintext vector under a shared field-element key.
pub fn encrypt(plaintext: &[Fr], key: Fr, rng: impl RngCore + CryptoRng) -> Ciphertext {
    let iv = fr_random(rng);
    let data = plaintext
        .iter()
        .enumerate()
        .map(|(i, pt)| pt + keystream_word(key, iv, i))
        .collect();

    Ciphertext { iv, data }
}

/// Decrypt a ciphertext under a shared field-element key.
pub fn decrypt(ciphertext: &Ciphertext, key: Fr) -> Vec<Fr> {
    ciphertext
        .data
        .iter()
        .enumerate()
        .map(|(i, ct)| ct - keystream_word(key, ciphertext.iv, i))
        .collect()
}

fn keystream_word(key: Fr, iv: Fr, index: usize) -> Fr {
    poseidon::hash(&[key, iv + Fr::from(index as u64)])
}

// ----------------------------- Tests -----------------------------
