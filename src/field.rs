//! Field Element Utilities for the SNARK Scalar Field
//!
//! Every value the coordinator manipulates (votes, indices, nonces, salts,
//! credit balances, hashes) lives in the scalar field of bn254:
//!
//! ```text
//! p = 21888242871839275222246405745257275088548364400416034343698204186575808495617
//! ```
//!
//! This module pins that choice to a single type (`Fr` from halo2curves) and
//! provides the conversions the rest of the crate needs:
//!
//! - decimal strings, the wire form consumed by the prover and the contract
//! - `BigUint`, for arithmetic that must happen over the integers rather than
//!   mod p (BabyJubJub scalars, the quadratic voice-credit check)
//! - uniform random sampling for IVs, salts, and sentinel leaves
//!
//! Non-canonical inputs (decimal values ≥ p) are rejected at this boundary so
//! no other module ever sees an unreduced element.

use halo2curves::ff::{Field, PrimeField};
use num_bigint::BigUint;
use rand::{CryptoRng, RngCore};
use thiserror::Error;

pub use halo2curves::bn256::Fr;

lazy_static::lazy_static! {
    /// The bn254 scalar field modulus as an integer.
    pub static ref FIELD_MODULUS: BigUint = BigUint::parse_bytes(
        b"21888242871839275222246405745257275088548364400416034343698204186575808495617",
        10,
    ).expect("modulus literal parses");

    /// The nothing-up-my-sleeve zero leaf of the message tree.
    ///
    /// keccak256("Maci") mod p. Publicly recomputable, so nobody can claim
    /// a trapdoor in the empty subtrees of the message tree.
    pub static ref NOTHING_UP_MY_SLEEVE: Fr = fr_from_decimal(
        "8370432830353022751713833565135785980866757267633941821328460903436894336785",
    ).expect("constant is canonical");
}

// ----------------------------- Conversions -----------------------------

/// Interpret a field element as an integer in `[0, p)`.
pub fn fr_to_biguint(x: &Fr) -> BigUint {
    BigUint::from_bytes_le(x.to_repr().as_ref())
}

/// Reduce an arbitrary integer mod p into the field.
pub fn biguint_to_fr(v: &BigUint) -> Fr {
    let reduced = v % &*FIELD_MODULUS;
    let bytes = reduced.to_bytes_le();
    let mut repr = [0u8; 32];
    repr[..bytes.len()].copy_from_slice(&bytes);
    Fr::from_repr(repr).unwrap_or(Fr::ZERO)
}

/// Render a field element as the decimal string form used on the wire.
pub fn fr_to_decimal(x: &Fr) -> String {
    fr_to_biguint(x).to_str_radix(10)
}

/// Parse a decimal string into a canonical field element.
///
/// Values ≥ p are rejected rather than silently reduced; a reduced-but-
/// different element would change every hash downstream.
pub fn fr_from_decimal(s: &str) -> Result<Fr, FieldError> {
    let v = BigUint::parse_bytes(s.as_bytes(), 10)
        .ok_or_else(|| FieldError::Malformed(s.to_string()))?;
    if v >= *FIELD_MODULUS {
        return Err(FieldError::NonCanonical(s.to_string()));
    }
    Ok(biguint_to_fr(&v))
}

/// Sample a uniform field element from a CSPRNG.
pub fn fr_random(rng: impl RngCore + CryptoRng) -> Fr {
    Fr::random(rng)
}

/// Interpret a field element as a u64 index, or `None` if it does not fit.
///
/// Decrypted commands carry indices as arbitrary field elements; anything
/// beyond 64 bits is out of range for every tree this crate builds.
pub fn fr_to_u64(x: &Fr) -> Option<u64> {
    let repr = x.to_repr();
    let bytes = repr.as_ref();
    if bytes[8..].iter().any(|b| *b != 0) {
        return None;
    }
    let mut low = [0u8; 8];
    low.copy_from_slice(&bytes[..8]);
    Some(u64::from_le_bytes(low))
}

// ----------------------------- Errors -----------------------------

/// Errors from parsing external field-element representations
#[derive(Error, Debug)]
pub enum FieldError {
    /// The input is not a decimal integer
    #[error("malformed field element: {0:?}")]
    Malformed(String),

    /// The input is a valid integer but not reduced mod p
    #[error("non-canonical field element (>= modulus): {0}")]
    NonCanonical(String),
}

// ----------------------------- Tests -----------------------------
