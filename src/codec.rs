//! Wire-level message codec: one-byte type, optional 4-byte big-endian
//! sender/recipient headers, then payload.

use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;

use crate::error::{Error, Result};
use crate::exponent::ExponentPolynomial;
use crate::party::PartyId;
use crate::point::{decode_point, encode_point};
use crate::scalar::decode_scalar;
use crate::schnorr::SchnorrProof;

/// PartyID 0 denotes a broadcast recipient in message routing.
pub const BROADCAST: PartyId = 0;

/// One-byte message type codes, per the wire format table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    KeyGen1 = 0x00,
    KeyGen2 = 0x01,
    // 0x02 reserved for a future KeyGen3.
    Sign1 = 0x03,
    Sign2 = 0x04,
    // 0x05 reserved for a future Sign3.
}

impl MessageType {
    fn from_code(code: u8) -> Result<Self> {
        match code {
            0x00 => Ok(Self::KeyGen1),
            0x01 => Ok(Self::KeyGen2),
            0x03 => Ok(Self::Sign1),
            0x04 => Ok(Self::Sign2),
            0x02 | 0x05 => Err(Error::InvalidEncoding(
                "message type is reserved for a future round and is not implemented".into(),
            )),
            other => Err(Error::InvalidEncoding(format!("unrecognized message type {other:#04x}"))),
        }
    }
}

/// A single protocol message, framed with sender (and, for direct messages,
/// recipient) headers.
#[derive(Debug, Clone)]
pub enum Message {
    /// Broadcast: Schnorr proof of knowledge over the sender's secret, plus
    /// the sender's exponent-polynomial (Feldman) commitments.
    KeyGen1 {
        from: PartyId,
        proof: SchnorrProof,
        commitments: ExponentPolynomial,
    },
    /// Direct: the sender's share evaluated at the recipient's identifier.
    KeyGen2 {
        from: PartyId,
        to: PartyId,
        share: Scalar,
    },
    /// Broadcast: the sender's pair of signing-nonce commitments.
    Sign1 {
        from: PartyId,
        d: EdwardsPoint,
        e: EdwardsPoint,
    },
    /// Broadcast: the sender's signature share.
    Sign2 { from: PartyId, z: Scalar },
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::KeyGen1 { .. } => MessageType::KeyGen1,
            Message::KeyGen2 { .. } => MessageType::KeyGen2,
            Message::Sign1 { .. } => MessageType::Sign1,
            Message::Sign2 { .. } => MessageType::Sign2,
        }
    }

    pub fn from(&self) -> PartyId {
        match self {
            Message::KeyGen1 { from, .. }
            | Message::KeyGen2 { from, .. }
            | Message::Sign1 { from, .. }
            | Message::Sign2 { from, .. } => *from,
        }
    }

    /// The intended recipient, or [`BROADCAST`] for broadcast messages.
    pub fn to(&self) -> PartyId {
        match self {
            Message::KeyGen2 { to, .. } => *to,
            _ => BROADCAST,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Message::KeyGen1 { from, proof, commitments } => {
                let mut out = Vec::with_capacity(5 + 64 + 2 + 32 * (commitments.degree() + 1));
                out.push(MessageType::KeyGen1 as u8);
                out.extend_from_slice(&from.to_be_bytes());
                out.extend_from_slice(&proof.encode());
                out.extend_from_slice(&commitments.encode());
                out
            }
            Message::KeyGen2 { from, to, share } => {
                let mut out = Vec::with_capacity(9 + 32);
                out.push(MessageType::KeyGen2 as u8);
                out.extend_from_slice(&from.to_be_bytes());
                out.extend_from_slice(&to.to_be_bytes());
                out.extend_from_slice(share.as_bytes());
                out
            }
            Message::Sign1 { from, d, e } => {
                let mut out = Vec::with_capacity(5 + 64);
                out.push(MessageType::Sign1 as u8);
                out.extend_from_slice(&from.to_be_bytes());
                out.extend_from_slice(&encode_point(d));
                out.extend_from_slice(&encode_point(e));
                out
            }
            Message::Sign2 { from, z } => {
                let mut out = Vec::with_capacity(5 + 32);
                out.push(MessageType::Sign2 as u8);
                out.extend_from_slice(&from.to_be_bytes());
                out.extend_from_slice(z.as_bytes());
                out
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::InvalidEncoding("empty message buffer".into()));
        }
        let message_type = MessageType::from_code(bytes[0])?;
        let rest = &bytes[1..];

        let read_party_id = |buf: &[u8]| -> Result<(PartyId, &[u8])> {
            if buf.len() < 4 {
                return Err(Error::InvalidEncoding("truncated party id header".into()));
            }
            let (head, tail) = buf.split_at(4);
            Ok((u32::from_be_bytes(head.try_into().unwrap()), tail))
        };

        match message_type {
            MessageType::KeyGen1 => {
                let (from, payload) = read_party_id(rest)?;
                if payload.len() < 64 {
                    return Err(Error::InvalidEncoding("truncated KeyGen1 payload".into()));
                }
                let (proof_bytes, commitments_bytes) = payload.split_at(64);
                let proof = SchnorrProof::decode(proof_bytes)?;
                let commitments = ExponentPolynomial::decode(commitments_bytes)?;
                Ok(Message::KeyGen1 { from, proof, commitments })
            }
            MessageType::KeyGen2 => {
                let (from, payload) = read_party_id(rest)?;
                let (to, payload) = read_party_id(payload)?;
                let share = decode_scalar(payload)?;
                Ok(Message::KeyGen2 { from, to, share })
            }
            MessageType::Sign1 => {
                let (from, payload) = read_party_id(rest)?;
                if payload.len() != 64 {
                    return Err(Error::InvalidEncoding("Sign1 payload must be 64 bytes".into()));
                }
                let d = decode_point(&payload[..32])?;
                let e = decode_point(&payload[32..])?;
                Ok(Message::Sign1 { from, d, e })
            }
            MessageType::Sign2 => {
                let (from, payload) = read_party_id(rest)?;
                let z = decode_scalar(payload)?;
                Ok(Message::Sign2 { from, z })
            }
        }
    }
}
