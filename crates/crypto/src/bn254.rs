//! BN254 G1 point compression.
//!
//! Points of `y² = x³ + 3` over the BN254 base field travel as 32 bytes: the
//! big-endian `x` coordinate with the parity of `y` stored in the top bit of
//! the first byte. Since `p < 2^254` the two top bits of a canonical `x` are
//! always free.
//!
//! ```text
//! byte 0:  [ P | I | x bits 253..248 ]
//!            |   |
//!            |   +-- 0x40: point at infinity (all other bits zero)
//!            +------ 0x80: y is odd
//! ```
//!
//! Decompression solves the curve equation for `y`. Because `p ≡ 3 (mod 4)`
//! the square root is `a^((p + 1) / 4) mod p`; the root whose parity does not
//! match the flag is replaced by `p - y`.
//!
//! This codec stands on its own for callers that exchange BN254 points.
//! Consensus messages sign with BLS12-381 and carry blst's own compressed
//! encodings, so no consensus path goes through [`G1Point`].

use alloy_primitives::U256;

use crate::{CryptoError, Result};

/// BN254 base field modulus
/// `21888242871839275222246405745257275088696311157297823662689037894645226208583`.
pub const FIELD_MODULUS: U256 = U256::from_limbs([
    0x3c20_8c16_d87c_fd47,
    0x9781_6a91_6871_ca8d,
    0xb850_45b6_8181_585d,
    0x3064_4e72_e131_a029,
]);

/// Curve coefficient `b` in `y² = x³ + b`.
const CURVE_B: U256 = U256::from_limbs([3, 0, 0, 0]);

/// Size of a compressed point.
pub const COMPRESSED_SIZE: usize = 32;

const PARITY_FLAG: u8 = 0x80;
const INFINITY_FLAG: u8 = 0x40;
const FLAG_MASK: u8 = PARITY_FLAG | INFINITY_FLAG;

/// An affine point of the BN254 G1 group.
///
/// The point at infinity is represented as `(0, 0)`, which is not on the curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct G1Point {
    x: U256,
    y: U256,
}

impl G1Point {
    /// The point at infinity.
    pub const INFINITY: Self = Self {
        x: U256::ZERO,
        y: U256::ZERO,
    };

    /// The standard generator `(1, 2)`.
    pub fn generator() -> Self {
        Self {
            x: U256::from(1u64),
            y: U256::from(2u64),
        }
    }

    /// Create a point from affine coordinates, checking it lies on the curve.
    pub fn new(x: U256, y: U256) -> Result<Self> {
        if x >= FIELD_MODULUS || y >= FIELD_MODULUS {
            return Err(CryptoError::InvalidPoint(
                "coordinate not reduced modulo p".to_string(),
            ));
        }
        let point = Self { x, y };
        if point.is_infinity() || point.is_on_curve() {
            Ok(point)
        } else {
            Err(CryptoError::InvalidPoint("point is not on the curve".to_string()))
        }
    }

    /// Recover the point with the given `x` and `y` parity.
    pub fn from_x(x: U256, y_odd: bool) -> Result<Self> {
        if x >= FIELD_MODULUS {
            return Err(CryptoError::InvalidPoint(
                "x coordinate not reduced modulo p".to_string(),
            ));
        }
        let rhs = curve_rhs(x);
        let root = sqrt(rhs)
            .ok_or_else(|| CryptoError::InvalidPoint("x has no point on the curve".to_string()))?;

        let y = if root.bit(0) == y_odd {
            root
        } else if root.is_zero() {
            return Err(CryptoError::InvalidPoint(
                "parity flag set for y = 0".to_string(),
            ));
        } else {
            FIELD_MODULUS - root
        };
        Ok(Self { x, y })
    }

    /// The x coordinate.
    pub fn x(&self) -> U256 {
        self.x
    }

    /// The y coordinate.
    pub fn y(&self) -> U256 {
        self.y
    }

    /// Whether this is the point at infinity.
    pub fn is_infinity(&self) -> bool {
        self.x.is_zero() && self.y.is_zero()
    }

    /// Whether the affine coordinates satisfy the curve equation.
    pub fn is_on_curve(&self) -> bool {
        self.y.mul_mod(self.y, FIELD_MODULUS) == curve_rhs(self.x)
    }

    /// The additive inverse `(x, p - y)`.
    pub fn neg(&self) -> Self {
        if self.is_infinity() || self.y.is_zero() {
            return *self;
        }
        Self {
            x: self.x,
            y: FIELD_MODULUS - self.y,
        }
    }

    /// Encode as 32 bytes: big-endian `x` plus flags.
    pub fn compress(&self) -> [u8; COMPRESSED_SIZE] {
        if self.is_infinity() {
            let mut out = [0u8; COMPRESSED_SIZE];
            out[0] = INFINITY_FLAG;
            return out;
        }
        let mut out = self.x.to_be_bytes::<COMPRESSED_SIZE>();
        if self.y.bit(0) {
            out[0] |= PARITY_FLAG;
        }
        out
    }

    /// Decode a compressed point.
    pub fn decompress(bytes: &[u8; COMPRESSED_SIZE]) -> Result<Self> {
        let flags = bytes[0] & FLAG_MASK;
        let mut raw = *bytes;
        raw[0] &= !FLAG_MASK;
        let x = U256::from_be_bytes(raw);

        if flags & INFINITY_FLAG != 0 {
            if flags & PARITY_FLAG != 0 || !x.is_zero() {
                return Err(CryptoError::InvalidPoint(
                    "malformed point at infinity".to_string(),
                ));
            }
            return Ok(Self::INFINITY);
        }
        Self::from_x(x, flags & PARITY_FLAG != 0)
    }

    /// Decode a compressed point from a slice.
    pub fn decompress_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; COMPRESSED_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidLength {
                expected: COMPRESSED_SIZE,
                actual: bytes.len(),
            })?;
        Self::decompress(&arr)
    }
}

/// `x³ + b mod p`
fn curve_rhs(x: U256) -> U256 {
    let x2 = x.mul_mod(x, FIELD_MODULUS);
    x2.mul_mod(x, FIELD_MODULUS).add_mod(CURVE_B, FIELD_MODULUS)
}

/// Square root modulo `p`, `None` for quadratic non-residues.
fn sqrt(a: U256) -> Option<U256> {
    let exp = (FIELD_MODULUS + U256::from(1u64)) >> 2usize;
    let root = a.pow_mod(exp, FIELD_MODULUS);
    (root.mul_mod(root, FIELD_MODULUS) == a).then_some(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{RngCore, SeedableRng};
    use rand_chacha::ChaCha20Rng;

    fn random_point(rng: &mut ChaCha20Rng) -> G1Point {
        loop {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            let x = U256::from_be_bytes(bytes).reduce_mod(FIELD_MODULUS);
            if let Ok(point) = G1Point::from_x(x, rng.next_u32() & 1 == 1) {
                return point;
            }
        }
    }

    #[test]
    fn modulus_matches_decimal() {
        let expected = U256::from_str_radix(
            "21888242871839275222246405745257275088696311157297823662689037894645226208583",
            10,
        )
        .unwrap();
        assert_eq!(FIELD_MODULUS, expected);
    }

    #[test]
    fn generator_is_on_curve() {
        let g = G1Point::generator();
        assert!(g.is_on_curve());
        assert_eq!(G1Point::new(g.x(), g.y()).unwrap(), g);
    }

    #[test]
    fn generator_compresses_to_x_without_flag() {
        let bytes = G1Point::generator().compress();
        assert_eq!(bytes[0], 0);
        assert_eq!(bytes[31], 1);
        assert_eq!(G1Point::decompress(&bytes).unwrap(), G1Point::generator());
    }

    #[test]
    fn negated_generator_sets_parity_flag() {
        let neg = G1Point::generator().neg();
        let bytes = neg.compress();
        assert_eq!(bytes[0] & PARITY_FLAG, PARITY_FLAG);
        assert_eq!(G1Point::decompress(&bytes).unwrap(), neg);
    }

    #[test]
    fn random_points_round_trip() {
        let mut rng = ChaCha20Rng::seed_from_u64(0x6d65_7269_6469_616e);
        for _ in 0..1000 {
            let point = random_point(&mut rng);
            assert!(point.is_on_curve());
            let decoded = G1Point::decompress(&point.compress()).unwrap();
            assert_eq!(decoded, point);
        }
    }

    #[test]
    fn infinity_round_trip() {
        let bytes = G1Point::INFINITY.compress();
        assert_eq!(bytes[0], INFINITY_FLAG);
        assert!(G1Point::decompress(&bytes).unwrap().is_infinity());
    }

    #[test]
    fn rejects_malformed_infinity() {
        let mut bytes = [0u8; 32];
        bytes[0] = INFINITY_FLAG;
        bytes[31] = 1;
        assert!(G1Point::decompress(&bytes).is_err());
    }

    #[test]
    fn rejects_unreduced_x() {
        let mut bytes = FIELD_MODULUS.to_be_bytes::<32>();
        assert_eq!(bytes[0] & FLAG_MASK, 0);
        assert!(G1Point::decompress(&bytes).is_err());
        bytes[31] = bytes[31].wrapping_add(1);
        assert!(G1Point::decompress(&bytes).is_err());
    }

    #[test]
    fn rejects_non_residue() {
        // x = 0 gives y² = 3, and 3 is not a square modulo p
        let bytes = [0u8; 32];
        assert!(G1Point::decompress(&bytes).is_err());
    }

    #[test]
    fn rejects_point_off_curve() {
        assert!(G1Point::new(U256::from(1u64), U256::from(3u64)).is_err());
    }

    #[test]
    fn decompress_slice_checks_length() {
        assert!(matches!(
            G1Point::decompress_slice(&[0u8; 31]),
            Err(CryptoError::InvalidLength { expected: 32, actual: 31 })
        ));
    }
}
