//! Group-element helpers: canonical compressed encoding and decoding.

use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};

/// Decodes a canonical 32-byte compressed Edwards25519 point, rejecting
/// non-canonical encodings.
///
/// [`CompressedEdwardsY::decompress`] alone accepts some non-canonical
/// y-coordinate encodings (it reduces the field element implicitly); we
/// additionally recompress the decoded point and compare bytes to enforce
/// strict canonicity, matching the "non-canonical points rejected" language
/// of the wire format.
pub(crate) fn decode_point(bytes: &[u8]) -> Result<EdwardsPoint> {
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::InvalidEncoding(format!("expected 32 point bytes, got {}", bytes.len())))?;
    let compressed = CompressedEdwardsY(array);
    let point = compressed
        .decompress()
        .ok_or_else(|| Error::InvalidEncoding("point is not on the curve".into()))?;
    if point.compress().to_bytes() != array {
        return Err(Error::InvalidEncoding("non-canonical point encoding".into()));
    }
    Ok(point)
}

/// Encodes a point to its canonical 32-byte compressed form.
pub(crate) fn encode_point(point: &EdwardsPoint) -> [u8; 32] {
    point.compress().to_bytes()
}

/// Constant-time equality on two points, compared via their canonical
/// encodings. Used wherever a comparison guards secret-derived material
/// (Feldman checks, partial-signature verification, Schnorr proof
/// verification) so a mismatch does not leak timing information about which
/// byte first differed.
pub(crate) fn points_ct_eq(a: &EdwardsPoint, b: &EdwardsPoint) -> bool {
    encode_point(a).ct_eq(&encode_point(b)).into()
}
