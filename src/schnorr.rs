//! Schnorr zero-knowledge proof of knowledge of a discrete logarithm,
//! following RFC 8235 §3, bound to a party identifier and a domain-separator
//! string.

use curve25519_dalek::constants::ED25519_BASEPOINT_POINT;
use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use rand_core::CryptoRngCore;

use crate::error::{Error, Result};
use crate::party::PartyId;
use crate::point::{decode_point, encode_point, points_ct_eq};
use crate::scalar::{decode_scalar, hash_to_scalar, random_scalar};

/// Encoded proof length: 32-byte commitment `V` followed by 32-byte response `r`.
const PROOF_LEN: usize = 64;

/// A Schnorr proof of knowledge of `x` such that `public = x * G`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchnorrProof {
    commitment: EdwardsPoint,
    response: Scalar,
}

fn compute_challenge(commitment: &EdwardsPoint, public: &EdwardsPoint, party_id: PartyId, params: &str) -> Scalar {
    hash_to_scalar(&[
        ED25519_BASEPOINT_POINT.compress().as_bytes(),
        encode_point(commitment).as_slice(),
        encode_point(public).as_slice(),
        &party_id.to_be_bytes(),
        params.as_bytes(),
    ])
}

impl SchnorrProof {
    /// Proves knowledge of `private`, returning the proof and `public = private * G`.
    pub fn prove(private: &Scalar, party_id: PartyId, params: &str, rng: &mut impl CryptoRngCore) -> (Self, EdwardsPoint) {
        let public = EdwardsPoint::mul_base(private);

        let nonce = random_scalar(rng);
        let commitment = EdwardsPoint::mul_base(&nonce);

        let challenge = compute_challenge(&commitment, &public, party_id, params);
        let response = nonce - challenge * *private;

        (Self { commitment, response }, public)
    }

    /// Verifies the proof against `public`, rejecting an identity public key.
    pub fn verify(&self, public: &EdwardsPoint, party_id: PartyId, params: &str) -> bool {
        if *public == EdwardsPoint::identity() {
            return false;
        }
        let challenge = compute_challenge(&self.commitment, public, party_id, params);
        // r*G + c*public should equal the prover's commitment V.
        let recomputed = EdwardsPoint::mul_base(&self.response) + public * challenge;
        points_ct_eq(&recomputed, &self.commitment)
    }

    pub fn encode(&self) -> [u8; PROOF_LEN] {
        let mut out = [0u8; PROOF_LEN];
        out[..32].copy_from_slice(&encode_point(&self.commitment));
        out[32..].copy_from_slice(self.response.as_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PROOF_LEN {
            return Err(Error::InvalidEncoding(format!(
                "schnorr proof must be {PROOF_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let commitment = decode_point(&bytes[..32])?;
        let response = decode_scalar(&bytes[32..])?;
        Ok(Self { commitment, response })
    }
}
