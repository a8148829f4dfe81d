//! Party identifiers.

use curve25519_dalek::scalar::Scalar;

use crate::error::{Error, Result};

/// Identifier for a party in the protocol.
///
/// PartyID 0 is reserved for broadcast routing and must never be used as a
/// real party identifier.
pub type PartyId = u32;

/// Injects a [`PartyId`] into the scalar field via little-endian injection of
/// its four bytes into a zero-padded 32-byte canonical encoding.
pub(crate) fn party_id_to_scalar(id: PartyId) -> Scalar {
    let mut bytes = [0u8; 32];
    bytes[..4].copy_from_slice(&id.to_le_bytes());
    // A u32 zero-padded into 32 bytes is always < the group order, so this
    // reduction never actually wraps; it just interprets the canonical bytes.
    Scalar::from_bytes_mod_order(bytes)
}

/// Validates a set of party identifiers: non-empty, all nonzero, sorted
/// ascending, unique.
pub(crate) fn validate_party_set(parties: &[PartyId]) -> Result<()> {
    if parties.is_empty() {
        return Err(Error::InvalidArgument("party set must not be empty".into()));
    }
    if parties.iter().any(|&p| p == 0) {
        return Err(Error::InvalidArgument(
            "party id 0 is reserved for broadcast and cannot be a real party".into(),
        ));
    }
    if !parties.windows(2).all(|w| w[0] < w[1]) {
        return Err(Error::InvalidArgument(
            "party set must be sorted ascending with unique identifiers".into(),
        ));
    }
    Ok(())
}
