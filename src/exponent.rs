//! Exponent (commitment) polynomial: the Feldman VSS public commitment to a
//! party's secret polynomial, `F = (A_0, ..., A_T)` with `A_k = a_k * G`.

use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;

use crate::error::{Error, Result};
use crate::party::{party_id_to_scalar, PartyId};
use crate::point::{decode_point, encode_point};
use crate::polynomial::Polynomial;

/// Length, in bytes, of the big-endian degree prefix on the wire.
const DEGREE_PREFIX_LEN: usize = 2;

/// Public commitment polynomial `F = (A_0, ..., A_T)`, `A_k = a_k * G`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExponentPolynomial {
    points: Vec<EdwardsPoint>,
}

impl ExponentPolynomial {
    /// Builds the coefficient-wise commitment `A_k = a_k * G` to `poly`.
    pub fn from_polynomial(poly: &Polynomial) -> Self {
        let points = poly
            .coefficients()
            .iter()
            .map(EdwardsPoint::mul_base)
            .collect();
        Self { points }
    }

    pub fn from_points(points: Vec<EdwardsPoint>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[EdwardsPoint] {
        &self.points
    }

    /// Degree `T` (i.e. `T + 1` points).
    pub fn degree(&self) -> usize {
        self.points.len() - 1
    }

    /// `F(0) = A_0`.
    pub fn constant(&self) -> EdwardsPoint {
        self.points[0]
    }

    /// Evaluates `F(x) = sum_k a_k * x^k * G` at `x` = the scalar injection
    /// of `id`, via Horner's method in the group. Evaluation at PartyID 0 is
    /// forbidden.
    pub fn evaluate(&self, id: PartyId) -> Result<EdwardsPoint> {
        if id == 0 {
            return Err(Error::InvalidArgument(
                "cannot evaluate an exponent polynomial at party id 0".into(),
            ));
        }
        let x = party_id_to_scalar(id);
        let mut acc = *self.points.last().expect("non-empty by construction");
        for point in self.points[..self.points.len() - 1].iter().rev() {
            acc = acc * x + point;
        }
        Ok(acc)
    }

    /// Pointwise group addition. Both operands must share the same degree.
    pub fn add(&self, other: &Self) -> Result<Self> {
        if self.degree() != other.degree() {
            return Err(Error::InvalidArgument(format!(
                "cannot add exponent polynomials of differing degree ({} vs {})",
                self.degree(),
                other.degree()
            )));
        }
        let points = self
            .points
            .iter()
            .zip(other.points.iter())
            .map(|(a, b)| a + b)
            .collect();
        Ok(Self { points })
    }

    /// Pointwise sum across all parties' exponent polynomials.
    pub fn sum<'a>(polys: impl IntoIterator<Item = &'a Self>) -> Result<Self> {
        let mut iter = polys.into_iter();
        let first = iter
            .next()
            .ok_or_else(|| Error::InvalidArgument("cannot sum an empty set of exponent polynomials".into()))?
            .clone();
        iter.try_fold(first, |acc, next| acc.add(next))
    }

    /// Encodes as a 2-byte big-endian degree prefix followed by the
    /// concatenation of each point's 32-byte compressed encoding.
    pub fn encode(&self) -> Vec<u8> {
        let degree: u16 = self
            .degree()
            .try_into()
            .expect("degree fits in u16 for any realistic threshold");
        let mut out = Vec::with_capacity(DEGREE_PREFIX_LEN + 32 * self.points.len());
        out.extend_from_slice(&degree.to_be_bytes());
        for point in &self.points {
            out.extend_from_slice(&encode_point(point));
        }
        out
    }

    /// Decodes the wire format produced by [`Self::encode`], rejecting
    /// non-canonical points and malformed lengths.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < DEGREE_PREFIX_LEN {
            return Err(Error::InvalidEncoding("exponent polynomial buffer too short for degree prefix".into()));
        }
        let degree = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
        let expected_len = DEGREE_PREFIX_LEN + 32 * (degree + 1);
        if bytes.len() != expected_len {
            return Err(Error::InvalidEncoding(format!(
                "exponent polynomial length mismatch: expected {expected_len}, got {}",
                bytes.len()
            )));
        }
        let mut points = Vec::with_capacity(degree + 1);
        for chunk in bytes[DEGREE_PREFIX_LEN..].chunks_exact(32) {
            points.push(decode_point(chunk)?);
        }
        Ok(Self { points })
    }

    /// True if any coefficient commitment is the identity point — a
    /// malformed or adversarially-chosen polynomial.
    pub fn has_identity_coefficient(&self) -> bool {
        self.points.iter().any(|p| *p == EdwardsPoint::identity())
    }
}
