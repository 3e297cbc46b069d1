//! Native Poseidon-Style Sponge over the SNARK Scalar Field
//!
//! All hashing in the coordinator goes through a single permutation-based
//! sponge H: F* → F. Domain objects are serialized to a fixed-length vector
//! of field elements and hashed with one application of H, so the hash of a
//! `StateLeaf`, a `Command`, or a `Message` is always a single squeeze.
//!
//! # Parameters
//!
//! - Width 6 (rate 5, capacity 1), so the common five-element state leaf
//!   absorbs in one block
//! - S-box x^5 (the SNARK-friendly exponent for bn254)
//! - 8 full rounds + 57 partial rounds
//! - Round constants derived from personalized BLAKE2b, MDS matrix from a
//!   Cauchy construction
//!
//! The permutation is treated as a black box by the rest of the crate; the
//! only contract is determinism and collision resistance over field-element
//! sequences.

use halo2curves::ff::{Field, FromUniformBytes};

use crate::field::Fr;

/// Width of the Poseidon state (number of field elements)
pub const WIDTH: usize = 6;
/// Rate of the sponge (inputs absorbed per permutation)
pub const RATE: usize = 5;
/// Number of full rounds in the permutation
pub const FULL_ROUNDS: usize = 8;
/// Number of partial rounds in the permutation
pub const PARTIAL_ROUNDS: usize = 57;
/// Total number of rounds in the permutation
pub const TOTAL_ROUNDS: usize = FULL_ROUNDS + PARTIAL_ROUNDS;

lazy_static::lazy_static! {
    /// Pre-computed round constants for the permutation
    static ref ROUND_CONSTANTS: Vec<[Fr; WIDTH]> = generate_round_constants();
    /// Pre-computed MDS matrix for the permutation
    static ref MDS_MATRIX: [[Fr; WIDTH]; WIDTH] = generate_mds_matrix();
}

/// Generate round constants from a personalized BLAKE2b stream.
fn generate_round_constants() -> Vec<[Fr; WIDTH]> {
    use blake2b_simd::Params;

    let mut constants = Vec::with_capacity(TOTAL_ROUNDS);

    for round in 0..TOTAL_ROUNDS {
        let mut round_consts = [Fr::ZERO; WIDTH];
        for (i, rc) in round_consts.iter_mut().enumerate() {
            let hash = Params::new()
                .hash_length(64)
                .personal(b"maci-poseidon-v1")
                .to_state()
                .update(b"round_constant")
                .update(&(round as u64).to_le_bytes())
                .update(&(i as u64).to_le_bytes())
                .finalize();
            let mut wide = [0u8; 64];
            wide.copy_from_slice(hash.as_bytes());
            *rc = Fr::from_uniform_bytes(&wide);
        }
        constants.push(round_consts);
    }

    constants
}

/// Generate the MDS matrix via the Cauchy construction M[i][j] = 1/(x_i + y_j).
fn generate_mds_matrix() -> [[Fr; WIDTH]; WIDTH] {
    let mut matrix = [[Fr::ZERO; WIDTH]; WIDTH];

    let xs: Vec<u64> = (0..WIDTH as u64).collect();
    let ys: Vec<u64> = (WIDTH as u64..2 * WIDTH as u64).collect();

    for i in 0..WIDTH {
        for j in 0..WIDTH {
            // x_i + y_j is in [WIDTH, 3*WIDTH), never zero
            let sum = Fr::from(xs[i] + ys[j]);
            matrix[i][j] = sum.invert().unwrap();
        }
    }

    matrix
}

// ----------------------------- Sponge -----------------------------

/// Incremental sponge state
pub struct PoseidonState {
    state: [Fr; WIDTH],
    absorbed: usize,
}

impl Default for PoseidonState {
    fn default() -> Self {
        Self::new()
    }
}

impl PoseidonState {
    /// Create a fresh all-zero sponge state
    pub fn new() -> Self {
        Self {
            state: [Fr::ZERO; WIDTH],
            absorbed: 0,
        }
    }

    /// S-box transformation x → x^5
    fn sbox(x: Fr) -> Fr {
        let sq = x.square();
        let quad = sq.square();
        quad * x
    }

    fn apply_mds(state: &mut [Fr; WIDTH]) {
        let mds = &*MDS_MATRIX;
        let mut new_state = [Fr::ZERO; WIDTH];

        for i in 0..WIDTH {
            let mut sum = Fr::ZERO;
            for j in 0..WIDTH {
                sum += mds[i][j] * state[j];
            }
            new_state[i] = sum;
        }

        *state = new_state;
    }

    fn full_round(state: &mut [Fr; WIDTH], round: usize) {
        let rcs = &ROUND_CONSTANTS[round];

        for i in 0..WIDTH {
            state[i] += rcs[i];
        }
        for i in 0..WIDTH {
            state[i] = Self::sbox(state[i]);
        }
        Self::apply_mds(state);
    }

    fn partial_round(state: &mut [Fr; WIDTH], round: usize) {
        let rcs = &ROUND_CONSTANTS[round];

        state[0] += rcs[0];
        state[0] = Self::sbox(state[0]);
        Self::apply_mds(state);
    }

    fn permute(state: &mut [Fr; WIDTH]) {
        for round in 0..FULL_ROUNDS / 2 {
            Self::full_round(state, round);
        }
        for round in 0..PARTIAL_ROUNDS {
            Self::partial_round(state, FULL_ROUNDS / 2 + round);
        }
        for round in 0..FULL_ROUNDS / 2 {
            Self::full_round(state, FULL_ROUNDS / 2 + PARTIAL_ROUNDS + round);
        }
    }

    /// Absorb one field element into the sponge
    pub fn absorb(&mut self, input: Fr) {
        self.state[self.absorbed % RATE] += input;
        self.absorbed += 1;

        if self.absorbed % RATE == 0 {
            Self::permute(&mut self.state);
        }
    }

    /// Finalize and squeeze the digest
    pub fn squeeze(&mut self) -> Fr {
        if self.absorbed % RATE != 0 {
            Self::permute(&mut self.state);
        }
        self.state[0]
    }
}

// ----------------------------- Hash Functions -----------------------------

/// Hash a sequence of field elements: H(inputs).
pub fn hash(inputs: &[Fr]) -> Fr {
    let mut state = PoseidonState::new();
    // Length prefix keeps e.g. H([x]) and H([x, 0]) distinct
    state.absorb(Fr::from(inputs.len() as u64));
    for input in inputs {
        state.absorb(*input);
    }
    state.squeeze()
}

/// Hash a single field element: H([x]).
pub fn hash_one(x: Fr) -> Fr {
    hash(&[x])
}

/// Hash a pair of Merkle children: H([left, right]).
pub fn hash_left_right(left: Fr, right: Fr) -> Fr {
    hash(&[left, right])
}

// ----------------------------- Tests -----------------------------
