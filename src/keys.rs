//! Keys, EdDSA Signatures, and ECDH
//!
//! A user's (or the coordinator's) identity is a BabyJubJub keypair:
//!
//! ```text
//! privKey ∈ F          (an opaque field element, never used directly)
//! scalar  = prune(blake2b-512(privKey)) >> 3   (the actual signing scalar)
//! pubKey  = scalar · Base8
//! ```
//!
//! The pruned-buffer derivation (clear the low 3 bits of byte 0, clear the
//! top bit of byte 31, set bit 6 of byte 31, then shift right 3) forces the
//! scalar into the prime subgroup and makes every 32-byte key hash usable.
//!
//! Signatures are EdDSA with the crate's sponge hash as the challenge:
//!
//! ```text
//! r  = blake2b-512(keyHash[32..64] || msg)  mod  suborder
//! R8 = r · Base8
//! hm = H([R8.x, R8.y, A.x, A.y, msg])
//! S  = r + hm·scalar  mod  suborder
//! ```
//!
//! Verification checks `S·Base8 == R8 + hm·A` and returns `false` on any
//! algebraic failure (off-curve point, out-of-range S, mismatch). ECDH
//! derives a single shared field element as the x coordinate of
//! `scalar_a · pubKey_b`, and yields no key at all when the peer point is
//! not on the curve: the addition law is only complete for curve points,
//! so an attacker-chosen key must never reach the scalar multiplication.

use blake2b_simd::Params as Blake2bParams;
use halo2curves::ff::PrimeField;
use num_bigint::BigUint;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use subtle::{Choice, ConstantTimeEq};
use zeroize::Zeroize;

use crate::babyjubjub::{Point, BASE8, SUBGROUP_ORDER};
use crate::field::{biguint_to_fr, fr_random, fr_to_biguint, Fr};
use crate::poseidon;

/// Personalization for the private-key hash
const DS_KEY_DERIVE: &[u8] = b"maci-eddsa-deriv";

/// Personalization for the deterministic signature nonce
const DS_SIG_NONCE: &[u8] = b"maci-eddsa-nonce";

// ----------------------------- Private Keys -----------------------------

/// A private key: an opaque field element.
///
/// The raw element is only ever fed through the pruned-buffer derivation;
/// it is never used as a scalar directly.
#[derive(Clone, Copy, Serialize, Deserialize)]
pub struct PrivKey(pub Fr);

impl PrivKey {
    /// Sample a fresh private key from a CSPRNG.
    pub fn random(rng: impl RngCore + CryptoRng) -> Self {
        Self(fr_random(rng))
    }

    /// The 64-byte BLAKE2b hash of the raw key. The lower half feeds the
    /// scalar derivation, the upper half the deterministic nonce. Callers
    /// zeroize the returned buffer once they are done with it.
    fn key_hash(&self) -> [u8; 64] {
        let hash = Blake2bParams::new()
            .hash_length(64)
            .personal(DS_KEY_DERIVE)
            .to_state()
            .update(self.0.to_repr().as_ref())
            .finalize();

        let mut bytes = [0u8; 64];
        bytes.copy_from_slice(hash.as_bytes());
        bytes
    }

    /// Pruned-buffer derivation of the BabyJubJub signing scalar.
    pub fn to_scalar(&self) -> BigUint {
        let mut hash = self.key_hash();
        let mut buf = [0u8; 32];
        buf.copy_from_slice(&hash[..32]);
        buf[0] &= 0xF8;
        buf[31] &= 0x7F;
        buf[31] |= 0x40;
        let scalar = BigUint::from_bytes_le(&buf) >> 3;
        hash.zeroize();
        buf.zeroize();
        scalar
    }
}

impl std::fmt::Debug for PrivKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrivKey([REDACTED])")
    }
}

impl PartialEq for PrivKey {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other).into()
    }
}

impl Eq for PrivKey {}

impl ConstantTimeEq for PrivKey {
    fn ct_eq(&self, other: &Self) -> Choice {
        self.0.to_repr().as_ref().ct_eq(other.0.to_repr().as_ref())
    }
}

// ----------------------------- Public Keys -----------------------------

/// A public key: a point in the prime subgroup of BabyJubJub
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubKey(pub Point);

impl PubKey {
    /// Canonical two-element vector form `[x, y]`
    pub fn as_vector(&self) -> [Fr; 2] {
        [self.0.x, self.0.y]
    }
}

// ----------------------------- Keypairs -----------------------------

/// A private key together with its derived public key
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keypair {
    /// The private half
    pub priv_key: PrivKey,
    /// The public half, `scalar · Base8`
    pub pub_key: PubKey,
}

impl Keypair {
    /// Generate a fresh keypair from a CSPRNG.
    pub fn new(rng: impl RngCore + CryptoRng) -> Self {
        Self::from_priv_key(PrivKey::random(rng))
    }

    /// Re-derive the keypair for an existing private key.
    pub fn from_priv_key(priv_key: PrivKey) -> Self {
        let pub_key = PubKey(BASE8.mul_scalar(&priv_key.to_scalar()));
        Self { priv_key, pub_key }
    }

    /// EdDSA-sign a single field element.
    pub fn sign(&self, msg: Fr) -> Signature {
        let mut hash = self.priv_key.key_hash();

        // Deterministic nonce from the upper half of the key hash
        let nonce_hash = Blake2bParams::new()
            .hash_length(64)
            .personal(DS_SIG_NONCE)
            .to_state()
            .update(&hash[32..])
            .update(msg.to_repr().as_ref())
            .finalize();
        hash.zeroize();
        let mut nonce_bytes = [0u8; 64];
        nonce_bytes.copy_from_slice(nonce_hash.as_bytes());
        let r = BigUint::from_bytes_le(&nonce_bytes) % &*SUBGROUP_ORDER;
        nonce_bytes.zeroize();

        let r8 = BASE8.mul_scalar(&r);
        let a = self.pub_key.0;
        let hm = poseidon::hash(&[r8.x, r8.y, a.x, a.y, msg]);

        let s = (r + fr_to_biguint(&hm) * self.priv_key.to_scalar()) % &*SUBGROUP_ORDER;

        Signature {
            r8,
            s: biguint_to_fr(&s),
        }
    }
}

// ----------------------------- Signatures -----------------------------

/// An EdDSA signature `(R8, S)`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// The nonce commitment `r · Base8`
    pub r8: Point,
    /// The response scalar, stored as a field element (`S < suborder < p`)
    pub s: Fr,
}

/// Verify an EdDSA signature over a single field element.
///
/// Any algebraic failure (off-curve points, `S` out of range, equation
/// mismatch) yields `false`; no distinction is surfaced.
pub fn verify(pub_key: &PubKey, msg: Fr, sig: &Signature) -> bool {
    if !sig.r8.is_on_curve() || !pub_key.0.is_on_curve() {
        return false;
    }

    let s = fr_to_biguint(&sig.s);
    if s >= *SUBGROUP_ORDER {
        return false;
    }

    let a = pub_key.0;
    let hm = poseidon::hash(&[sig.r8.x, sig.r8.y, a.x, a.y, msg]);
    let hm_scalar = fr_to_biguint(&hm) % &*SUBGROUP_ORDER;

    let lhs = BASE8.mul_scalar(&s);
    let rhs = sig.r8.add(&a.mul_scalar(&hm_scalar));

    lhs == rhs
}

/// ECDH: the shared field element `(scalar_a · pubKey_b).x`.
///
/// Returns `None` when the public key does not satisfy the curve equation.
/// The Edwards addition law is only complete for curve points, so an
/// off-curve key (which `publish_message` deliberately accepts unvalidated)
/// must be stopped here rather than fed into the group arithmetic.
pub fn ecdh_shared_key(priv_key: &PrivKey, pub_key: &PubKey) -> Option<Fr> {
    if !pub_key.0.is_on_curve() {
        return None;
    }
    Some(pub_key.0.mul_scalar(&priv_key.to_scalar()).x)
}

// ----------------------------- Tests -----------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use halo2curves::ff::Field;
    use rand::rngs::OsRng;

    #[test]
    fn test_pub_key_on_curve() {
        let keypair = Keypair::new(OsRng);
        assert!(keypair.pub_key.0.is_on_curve());
    }

    #[test]
    fn test_keypair_derivation_deterministic() {
        let priv_key = PrivKey::random(OsRng);
        let kp1 = Keypair::from_priv_key(priv_key);
        let kp2 = Keypair::from_priv_key(priv_key);
        assert_eq!(kp1.pub_key, kp2.pub_key);
    }

    #[test]
    fn test_sign_verify() {
        let keypair = Keypair::new(OsRng);
        let msg = Fr::from(987654321u64);

        let sig = keypair.sign(msg);
        assert!(verify(&keypair.pub_key, msg, &sig));
    }

    #[test]
    fn test_verify_rejects_wrong_message() {
        let keypair = Keypair::new(OsRng);
        let sig = keypair.sign(Fr::from(1u64));

        assert!(!verify(&keypair.pub_key, Fr::from(2u64), &sig));
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let keypair = Keypair::new(OsRng);
        let other = Keypair::new(OsRng);
        let msg = Fr::from(5u64);
        let sig = keypair.sign(msg);

        assert!(!verify(&other.pub_key, msg, &sig));
    }

    #[test]
    fn test_verify_rejects_tampered_s() {
        let keypair = Keypair::new(OsRng);
        let msg = Fr::from(5u64);
        let mut sig = keypair.sign(msg);
        sig.s += Fr::ONE;

        assert!(!verify(&keypair.pub_key, msg, &sig));
    }

    #[test]
    fn test_verify_rejects_tampered_r8() {
        let keypair = Keypair::new(OsRng);
        let msg = Fr::from(5u64);
        let mut sig = keypair.sign(msg);
        sig.r8 = sig.r8.double();

        assert!(!verify(&keypair.pub_key, msg, &sig));
    }

    #[test]
    fn test_ecdh_symmetry() {
        let alice = Keypair::new(OsRng);
        let bob = Keypair::new(OsRng);

        let k_ab = ecdh_shared_key(&alice.priv_key, &bob.pub_key).unwrap();
        let k_ba = ecdh_shared_key(&bob.priv_key, &alice.pub_key).unwrap();

        assert_eq!(k_ab, k_ba);
    }

    #[test]
    fn test_ecdh_distinct_pairs() {
        let alice = Keypair::new(OsRng);
        let bob = Keypair::new(OsRng);
        let carol = Keypair::new(OsRng);

        let k_ab = ecdh_shared_key(&alice.priv_key, &bob.pub_key).unwrap();
        let k_ac = ecdh_shared_key(&alice.priv_key, &carol.pub_key).unwrap();

        assert_ne!(k_ab, k_ac);
    }

    #[test]
    fn test_ecdh_rejects_off_curve_key() {
        let alice = Keypair::new(OsRng);
        let bogus = PubKey(Point {
            x: Fr::from(3u64),
            y: Fr::from(7u64),
        });

        assert!(!bogus.0.is_on_curve());
        assert!(ecdh_shared_key(&alice.priv_key, &bogus).is_none());
    }

    #[test]
    fn test_priv_key_debug_redacted() {
        let priv_key = PrivKey::random(OsRng);
        assert_eq!(format!("{:?}", priv_key), "PrivKey([REDACTED])");
    }
}
