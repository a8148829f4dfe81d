//! Scalar-field helpers: random sampling, hash-to-scalar, canonical encoding.

use curve25519_dalek::scalar::Scalar;
use rand_core::CryptoRngCore;
use sha2::{Digest, Sha512};

use crate::error::{Error, Result};

/// Samples a uniform scalar by drawing 64 bytes of entropy and wide-reducing,
/// per `spec.md` §5 ("each random-scalar draw consumes 64 bytes of entropy").
pub(crate) fn random_scalar(rng: &mut impl CryptoRngCore) -> Scalar {
    let mut bytes = [0u8; 64];
    rng.fill_bytes(&mut bytes);
    Scalar::from_bytes_mod_order_wide(&bytes)
}

/// Hashes the concatenation of `parts` with SHA-512 and wide-reduces into a
/// scalar. Never truncate-and-reduce — always the full 64-byte digest.
pub(crate) fn hash_to_scalar(parts: &[&[u8]]) -> Scalar {
    let mut hasher = Sha512::new();
    for part in parts {
        hasher.update(part);
    }
    let digest: [u8; 64] = hasher.finalize().into();
    Scalar::from_bytes_mod_order_wide(&digest)
}

/// Decodes a canonical 32-byte little-endian scalar encoding, rejecting
/// non-canonical representations.
pub(crate) fn decode_scalar(bytes: &[u8]) -> Result<Scalar> {
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::InvalidEncoding(format!("expected 32 scalar bytes, got {}", bytes.len())))?;
    Option::<Scalar>::from(Scalar::from_canonical_bytes(array))
        .ok_or_else(|| Error::InvalidEncoding("non-canonical scalar encoding".into()))
}
