//! Distributed key generation: a Pedersen/Feldman verifiable secret sharing
//! scheme with a Schnorr proof of knowledge, producing a joint Edwards25519
//! public key and a Shamir secret share per party.

mod output;
mod round;

pub use output::KeygenOutput;
pub use round::KeygenRound;
