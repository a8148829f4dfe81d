//! Threshold signing: FROST (Komlo-Goldberg) over Edwards25519, producing a
//! Schnorr signature verifiable by any standard Ed25519 verifier.

mod output;
mod round;

pub use output::SignOutput;
pub use round::SignRound;
