//! # frost-core
//!
//! Threshold Schnorr signatures over Edwards25519 ("FROST": Flexible
//! Round-Optimized Schnorr Threshold signatures, Komlo & Goldberg).
//!
//! This crate provides the two multi-round cryptographic protocols and their
//! supporting primitives:
//! - Distributed Key Generation (DKG), based on Pedersen verifiable secret
//!   sharing with Feldman-style polynomial commitments and a Schnorr proof of
//!   knowledge.
//! - Threshold Signing, based on FROST, producing a signature verifiable
//!   under the standard Ed25519 verification equation.
//!
//! ## Scope
//!
//! This crate is the protocol core only: the transport that delivers bytes
//! between parties, identity/authentication of parties, persistent storage of
//! long-term key shares, and the driver that instantiates and advances
//! parties are all external collaborators. A driver repeatedly calls
//! [`keygen::KeygenRound::store_message`] / [`keygen::KeygenRound::process_messages`] /
//! [`keygen::KeygenRound::process_round`] / [`keygen::KeygenRound::generate_messages`] /
//! [`keygen::KeygenRound::next_round`] until [`keygen::KeygenRound::wait_for_keygen_output`]
//! returns a result, then does the same with [`sign::SignRound`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use frost_core::{codec::Message, keygen::KeygenRound, sign::SignRound};
//!
//! let mut round = KeygenRound::new(1, threshold, parties)?;
//! loop {
//!     round.process_messages()?;
//!     round.process_round()?;
//!     for msg in round.generate_messages() {
//!         transport.send(msg);
//!     }
//!     round = round.next_round();
//!     if let Some(output) = round.wait_for_keygen_output() {
//!         break;
//!     }
//! }
//! ```

pub mod codec;
pub mod error;
pub mod exponent;
pub mod keygen;
pub mod lagrange;
pub mod party;
pub mod point;
pub mod polynomial;
pub mod scalar;
pub mod schnorr;
pub mod sign;

pub use error::{Error, Result};
pub use party::PartyId;

/// Protocol version, wired to the crate's own version for diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
