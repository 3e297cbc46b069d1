//! BabyJubJub Curve Arithmetic
//!
//! BabyJubJub is the twisted Edwards curve embedded in the bn254 scalar
//! field, which makes its group operations cheap to verify inside a
//! zk-SNARK circuit over bn254:
//!
//! ```text
//! a·x² + y² = 1 + d·x²·y²    with a = 168700, d = 168696, over F_p
//! ```
//!
//! The coordinator uses the prime-order subgroup generated by `Base8`
//! (the curve's cofactor is 8). Signing keys are scalars mod the subgroup
//! order; public keys and signature commitments are points.
//!
//! Scalars are `BigUint` values rather than field elements: the subgroup
//! order is smaller than p, so scalar arithmetic lives in a different ring
//! than coordinate arithmetic.

use halo2curves::ff::Field;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::field::{fr_from_decimal, Fr};

lazy_static::lazy_static! {
    /// Twisted Edwards coefficient a
    pub static ref EDWARDS_A: Fr = Fr::from(168700u64);

    /// Twisted Edwards coefficient d
    pub static ref EDWARDS_D: Fr = Fr::from(168696u64);

    /// Order of the prime subgroup (curve order / 8)
    pub static ref SUBGROUP_ORDER: BigUint = BigUint::parse_bytes(
        b"2736030358979909402780800718157159386076813972158567259200215660948447373041",
        10,
    ).expect("order literal parses");

    /// Generator of the prime subgroup (8 times a generator of the full group)
    pub static ref BASE8: Point = Point {
        x: fr_from_decimal(
            "5299619240641551281634865583518297030282874472190772894086521144482721001553",
        ).expect("generator x is canonical"),
        y: fr_from_decimal(
            "16950150798460657717958625567821834550301663161624707787222815936182638968203",
        ).expect("generator y is canonical"),
    };
}

// ----------------------------- Point -----------------------------

/// An affine point on BabyJubJub
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    /// x coordinate
    pub x: Fr,
    /// y coordinate
    pub y: Fr,
}

impl Point {
    /// The neutral element (0, 1)
    pub fn identity() -> Self {
        Self {
            x: Fr::ZERO,
            y: Fr::ONE,
        }
    }

    /// Whether the point satisfies the curve equation
    pub fn is_on_curve(&self) -> bool {
        let x2 = self.x.square();
        let y2 = self.y.square();
        *EDWARDS_A * x2 + y2 == Fr::ONE + *EDWARDS_D * x2 * y2
    }

    /// Twisted Edwards addition.
    ///
    /// The addition law is complete on BabyJubJub (a square, d non-square),
    /// so the denominators are never zero for curve points.
    pub fn add(&self, other: &Point) -> Point {
        let x1x2 = self.x * other.x;
        let y1y2 = self.y * other.y;
        let dxy = *EDWARDS_D * x1x2 * y1y2;

        let x_num = self.x * other.y + self.y * other.x;
        let y_num = y1y2 - *EDWARDS_A * x1x2;

        Point {
            x: x_num * (Fr::ONE + dxy).invert().unwrap(),
            y: y_num * (Fr::ONE - dxy).invert().unwrap(),
        }
    }

    /// Point doubling
    pub fn double(&self) -> Point {
        self.add(self)
    }

    /// Scalar multiplication by double-and-add, MSB first
    pub fn mul_scalar(&self, scalar: &BigUint) -> Point {
        let mut result = Point::identity();
        for i in (0..scalar.bits()).rev() {
            result = result.double();
            if scalar.bit(i) {
                result = result.add(self);
            }
        }
        result
    }
}

// ----------------------------- Tests -----------------------------
