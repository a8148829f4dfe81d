//! Degree-`T` polynomial over the scalar field, used to Shamir/Feldman-share
//! a party's secret contribution during DKG.

use curve25519_dalek::scalar::Scalar;
use rand_core::CryptoRngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};
use crate::party::{party_id_to_scalar, PartyId};
use crate::scalar::random_scalar;

/// A degree-`T` polynomial `f(x) = a_0 + a_1 x + ... + a_T x^T` with
/// coefficients in the Edwards25519 scalar field. `a_0` is the party's secret
/// contribution to the joint key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Polynomial {
    coefficients: Vec<Scalar>,
}

impl Polynomial {
    /// Samples a fresh polynomial of degree `threshold` with constant term
    /// `secret` and `threshold` uniformly random higher coefficients.
    pub fn generate(threshold: usize, secret: Scalar, rng: &mut impl CryptoRngCore) -> Self {
        let mut coefficients = Vec::with_capacity(threshold + 1);
        coefficients.push(secret);
        for _ in 0..threshold {
            coefficients.push(random_scalar(rng));
        }
        Self { coefficients }
    }

    /// Constructs a polynomial from an explicit coefficient list (used when
    /// reconstructing from wire data or in tests).
    pub fn from_coefficients(coefficients: Vec<Scalar>) -> Self {
        Self { coefficients }
    }

    /// Degree `T` (i.e. `T + 1` coefficients).
    pub fn degree(&self) -> usize {
        self.coefficients.len() - 1
    }

    pub fn coefficients(&self) -> &[Scalar] {
        &self.coefficients
    }

    /// `f(0) = a_0`, the party's secret contribution.
    pub fn constant(&self) -> Scalar {
        self.coefficients[0]
    }

    /// Evaluates `f(x)` at `x` = the scalar injection of `id`, via Horner's
    /// method from the highest coefficient down. Evaluation at PartyID 0 is
    /// forbidden.
    pub fn evaluate(&self, id: PartyId) -> Result<Scalar> {
        if id == 0 {
            return Err(Error::InvalidArgument(
                "cannot evaluate a secret polynomial at party id 0".into(),
            ));
        }
        let x = party_id_to_scalar(id);
        let mut result = Scalar::ZERO;
        for coefficient in self.coefficients.iter().rev() {
            result = result * x + coefficient;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn evaluation_at_zero_is_forbidden() {
        let poly = Polynomial::generate(2, Scalar::ONE, &mut OsRng);
        assert!(poly.evaluate(0).is_err());
    }

    #[test]
    fn degree_matches_threshold() {
        let poly = Polynomial::generate(3, Scalar::ONE, &mut OsRng);
        assert_eq!(poly.degree(), 3);
        assert_eq!(poly.coefficients().len(), 4);
    }

    #[test]
    fn constant_term_is_the_secret() {
        let secret = Scalar::from(42u64);
        let poly = Polynomial::generate(1, secret, &mut OsRng);
        assert_eq!(poly.constant(), secret);
    }

    #[test]
    fn evaluation_matches_naive_horner() {
        let poly = Polynomial::generate(3, Scalar::from(7u64), &mut OsRng);
        let x = Scalar::from(5u64);
        let mut expected = Scalar::ZERO;
        let mut power = Scalar::ONE;
        for c in poly.coefficients() {
            expected += c * power;
            power *= x;
        }
        assert_eq!(poly.evaluate(5).unwrap(), expected);
    }
}
