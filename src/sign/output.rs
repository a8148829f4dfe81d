//! Output of a completed threshold signing round.

use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;

use crate::point::encode_point;

/// A FROST-produced Schnorr signature, verifiable with any standard Ed25519
/// verifier against the group public key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignOutput {
    pub(crate) r: EdwardsPoint,
    pub(crate) z: Scalar,
}

impl SignOutput {
    /// The 64-byte Ed25519 signature encoding `R ‖ z`.
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&encode_point(&self.r));
        out[32..].copy_from_slice(self.z.as_bytes());
        out
    }

    pub fn group_commitment(&self) -> EdwardsPoint {
        self.r
    }

    pub fn response(&self) -> Scalar {
        self.z
    }
}
