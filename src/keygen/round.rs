//! Distributed Key Generation round state machine.
//!
//! Two rounds based on Pedersen verifiable secret sharing with Feldman-style
//! polynomial commitments and a Schnorr proof of knowledge, driven by the
//! `store_message` / `process_messages` / `process_round` / `generate_messages`
//! / `next_round` contract described in the crate root docs.

use std::collections::{BTreeMap, VecDeque};

use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use rand_core::OsRng;
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroize;

use crate::codec::Message;
use crate::error::{Error, Result};
use crate::exponent::ExponentPolynomial;
use crate::party::{validate_party_set, PartyId};
use crate::point::points_ct_eq;
use crate::polynomial::Polynomial;
use crate::schnorr::SchnorrProof;

use super::output::KeygenOutput;

const PARAMS: &str = "keygen";

/// Configuration shared by every stage of one party's keygen round.
#[derive(Clone)]
struct Shared {
    own_id: PartyId,
    threshold: usize,
    parties: Vec<PartyId>,
}

/// Round 1: each party samples its own polynomial and broadcasts a Feldman
/// commitment to it. `commitments` accumulates every `KeyGen1` received so
/// far — including peers' broadcasts that arrive before this party's own
/// contribution has been generated by `process_round` — so that a message
/// delivered while this party is still `R1Prepare` is recorded rather than
/// dropped. `prepared` holds this party's own polynomial once generated.
struct R1PrepareState {
    shared: Shared,
    commitments: BTreeMap<PartyId, ExponentPolynomial>,
    prepared: Option<Polynomial>,
}

struct R1WaitingState {
    shared: Shared,
    own_poly: Polynomial,
    commitments: BTreeMap<PartyId, ExponentPolynomial>,
}

/// Round 2: each party evaluates its polynomial at every other party's
/// identifier and sends the result directly. `shares` accumulates every
/// `KeyGen2` received so far, for the same early-arrival reason as
/// `R1PrepareState::commitments`. `own_sent` marks whether this party has
/// generated and broadcast its own contribution yet.
struct R2PrepareState {
    shared: Shared,
    own_poly: Polynomial,
    commitments: BTreeMap<PartyId, ExponentPolynomial>,
    shares: BTreeMap<PartyId, Scalar>,
    own_sent: bool,
}

struct R2WaitingState {
    shared: Shared,
    commitments: BTreeMap<PartyId, ExponentPolynomial>,
    shares: BTreeMap<PartyId, Scalar>,
}

enum KeygenStage {
    R1Prepare(R1PrepareState),
    R1Waiting(R1WaitingState),
    R2Prepare(R2PrepareState),
    R2Waiting(R2WaitingState),
    Done(KeygenOutput),
    Aborted { culprit: PartyId, reason: String },
}

/// Ordinal used to tell whether an inbound message belongs to the current
/// stage, a past (stale) one, or a future one that must be buffered.
/// `R1Prepare`/`R1Waiting` (and `R2Prepare`/`R2Waiting`) share an ordinal:
/// a message addressed to that round is accepted in either sub-stage, since
/// `process_round` never changes which enum variant a party sits in — only
/// `next_round` does — and peers' messages for the current round routinely
/// arrive before this party's own `process_round` has run.
fn stage_ordinal(stage: &KeygenStage) -> u8 {
    match stage {
        KeygenStage::R1Prepare(_) | KeygenStage::R1Waiting(_) => 1,
        KeygenStage::R2Prepare(_) | KeygenStage::R2Waiting(_) => 2,
        KeygenStage::Done(_) | KeygenStage::Aborted { .. } => 3,
    }
}

fn message_ordinal(msg: &Message) -> Option<u8> {
    match msg {
        Message::KeyGen1 { .. } => Some(1),
        Message::KeyGen2 { .. } => Some(2),
        Message::Sign1 { .. } | Message::Sign2 { .. } => None,
    }
}

/// Validates and records an inbound `KeyGen1` broadcast into `commitments`,
/// shared by both `R1Prepare` and `R1Waiting` (see [`stage_ordinal`]).
fn validate_and_insert_keygen1(
    shared: &Shared,
    commitments: &mut BTreeMap<PartyId, ExponentPolynomial>,
    from: PartyId,
    proof: SchnorrProof,
    commitment: ExponentPolynomial,
) -> Result<()> {
    if !shared.parties.contains(&from) || from == shared.own_id {
        return Err(Error::FailMsg {
            from,
            reason: "KeyGen1 sender is not a recognized co-signer".into(),
        });
    }
    if commitments.contains_key(&from) {
        return Err(Error::FailMsg {
            from,
            reason: "duplicate KeyGen1 from this sender".into(),
        });
    }
    if commitment.degree() != shared.threshold {
        return Err(Error::FailMsg {
            from,
            reason: format!(
                "KeyGen1 commitment degree {} does not match threshold {}",
                commitment.degree(),
                shared.threshold
            ),
        });
    }
    if !proof.verify(&commitment.constant(), from, PARAMS) {
        return Err(Error::FailMsg {
            from,
            reason: "Schnorr proof of knowledge failed to verify".into(),
        });
    }
    debug!(from, "stored KeyGen1 commitment");
    commitments.insert(from, commitment);
    Ok(())
}

/// Validates and records an inbound `KeyGen2` share into `shares`, shared by
/// both `R2Prepare` and `R2Waiting` (see [`stage_ordinal`]).
fn validate_and_insert_keygen2(
    shared: &Shared,
    commitments: &BTreeMap<PartyId, ExponentPolynomial>,
    shares: &mut BTreeMap<PartyId, Scalar>,
    from: PartyId,
    to: PartyId,
    share: Scalar,
) -> Result<()> {
    if to != shared.own_id || !shared.parties.contains(&from) {
        return Err(Error::FailMsg {
            from,
            reason: "KeyGen2 misrouted or sender is not a recognized co-signer".into(),
        });
    }
    if shares.contains_key(&from) {
        return Err(Error::FailMsg {
            from,
            reason: "duplicate KeyGen2 from this sender".into(),
        });
    }
    let expected = commitments
        .get(&from)
        .ok_or_else(|| Error::FailMsg {
            from,
            reason: "KeyGen2 received before that sender's KeyGen1 commitment".into(),
        })?
        .evaluate(shared.own_id)?;
    if !points_ct_eq(&EdwardsPoint::mul_base(&share), &expected) {
        warn!(culprit = from, "Feldman check failed for KeyGen2 share");
        return Err(Error::FailProtocol {
            culprit: from,
            reason: "share does not match sender's Feldman commitment".into(),
        });
    }
    debug!(from, "stored and verified KeyGen2 share");
    shares.insert(from, share);
    Ok(())
}

/// The distributed key generation round state machine.
///
/// Construct with [`KeygenRound::new`], then drive with the `store_message` /
/// `process_messages` / `process_round` / `generate_messages` / `next_round`
/// contract until [`KeygenRound::wait_for_keygen_output`] returns `Some`.
pub struct KeygenRound {
    stage: KeygenStage,
    inbox: VecDeque<Message>,
    outbox: Vec<Message>,
}

impl KeygenRound {
    /// Constructs a new keygen round for party `own_id`, with threshold `T`
    /// (so `T + 1` shares reconstruct the secret) over the full party set
    /// `parties`. `parties` must be sorted, unique, all nonzero, and contain
    /// `own_id`, with `parties.len() >= threshold + 1`.
    #[instrument(skip(parties), fields(own_id, threshold, n_parties = parties.len()))]
    pub fn new(own_id: PartyId, threshold: usize, parties: Vec<PartyId>) -> Result<Self> {
        validate_party_set(&parties)?;
        if !parties.contains(&own_id) {
            return Err(Error::InvalidArgument(format!(
                "own party id {own_id} is not a member of the party set"
            )));
        }
        if parties.len() < threshold + 1 {
            return Err(Error::InvalidArgument(format!(
                "party set of size {} is too small for threshold {threshold}",
                parties.len()
            )));
        }
        info!("starting keygen round");
        Ok(Self {
            stage: KeygenStage::R1Prepare(R1PrepareState {
                shared: Shared { own_id, threshold, parties },
                commitments: BTreeMap::new(),
                prepared: None,
            }),
            inbox: VecDeque::new(),
            outbox: Vec::new(),
        })
    }

    fn abort_error(&self) -> Error {
        match &self.stage {
            KeygenStage::Aborted { culprit, reason } => Error::FailProtocol {
                culprit: *culprit,
                reason: reason.clone(),
            },
            _ => unreachable!("abort_error called outside Aborted stage"),
        }
    }

    /// Validates and applies a single message that belongs to the current
    /// stage (either its `Prepare` or `Waiting` sub-stage — see
    /// [`stage_ordinal`]). Returns `Err(FailMsg)` for a rejected-but-survivable
    /// message, or `Err(FailProtocol)` (after moving to `Aborted`) for an
    /// identifiable cheating party.
    fn apply_message(&mut self, msg: Message) -> Result<()> {
        let result = match (&mut self.stage, msg) {
            (KeygenStage::R1Prepare(state), Message::KeyGen1 { from, proof, commitments }) => {
                validate_and_insert_keygen1(&state.shared, &mut state.commitments, from, proof, commitments)
            }
            (KeygenStage::R1Waiting(state), Message::KeyGen1 { from, proof, commitments }) => {
                validate_and_insert_keygen1(&state.shared, &mut state.commitments, from, proof, commitments)
            }
            (KeygenStage::R2Prepare(state), Message::KeyGen2 { from, to, share }) => {
                validate_and_insert_keygen2(&state.shared, &state.commitments, &mut state.shares, from, to, share)
            }
            (KeygenStage::R2Waiting(state), Message::KeyGen2 { from, to, share }) => {
                validate_and_insert_keygen2(&state.shared, &state.commitments, &mut state.shares, from, to, share)
            }
            (_, msg) => Err(Error::FailMsg {
                from: msg.from(),
                reason: "message does not belong to the current stage".into(),
            }),
        };
        if let Err(Error::FailProtocol { culprit, ref reason }) = result {
            self.stage = KeygenStage::Aborted { culprit, reason: reason.clone() };
        }
        result
    }

    /// Stores an inbound message, applying it immediately if it belongs to
    /// the current stage, buffering it if it is for a future stage, and
    /// discarding it if it is stale. Rejects signing-protocol messages.
    pub fn store_message(&mut self, msg: Message) -> Result<()> {
        if let KeygenStage::Aborted { .. } = &self.stage {
            return Err(self.abort_error());
        }
        let Some(msg_ordinal) = message_ordinal(&msg) else {
            return Err(Error::FailMsg {
                from: msg.from(),
                reason: "keygen round received a signing-protocol message".into(),
            });
        };
        let cur_ordinal = stage_ordinal(&self.stage);
        if msg_ordinal < cur_ordinal {
            return Ok(());
        }
        if msg_ordinal > cur_ordinal {
            self.inbox.push_back(msg);
            return Ok(());
        }
        self.apply_message(msg)
    }

    /// Drains buffered messages that now match the current stage, applying
    /// each. A `FailMsg` on one buffered message is logged and the drain
    /// continues; a `FailProtocol` aborts the round and is propagated.
    pub fn process_messages(&mut self) -> Result<()> {
        if let KeygenStage::Aborted { .. } = &self.stage {
            return Err(self.abort_error());
        }
        let cur_ordinal = stage_ordinal(&self.stage);
        let mut remaining = VecDeque::with_capacity(self.inbox.len());
        while let Some(msg) = self.inbox.pop_front() {
            let Some(ord) = message_ordinal(&msg) else { continue };
            if ord < cur_ordinal {
                continue;
            }
            if ord > cur_ordinal {
                remaining.push_back(msg);
                continue;
            }
            if let Err(err) = self.apply_message(msg) {
                match err {
                    Error::FailProtocol { .. } => {
                        self.inbox = remaining;
                        return Err(err);
                    }
                    other => warn!(error = %other, "dropping buffered message"),
                }
            }
        }
        self.inbox = remaining;
        Ok(())
    }

    /// Performs the current stage's one-time computation, if it has not
    /// already run, staging any outbound messages it produces.
    #[instrument(skip(self))]
    pub fn process_round(&mut self) -> Result<()> {
        match &mut self.stage {
            KeygenStage::Aborted { .. } => return Err(self.abort_error()),
            KeygenStage::R1Prepare(state) => {
                if state.prepared.is_none() {
                    let mut rng = OsRng;
                    let secret = crate::scalar::random_scalar(&mut rng);
                    let poly = Polynomial::generate(state.shared.threshold, secret, &mut rng);
                    let exponent = ExponentPolynomial::from_polynomial(&poly);
                    let (proof, public) = SchnorrProof::prove(&secret, state.shared.own_id, PARAMS, &mut rng);
                    debug_assert_eq!(public, exponent.constant());
                    self.outbox.push(Message::KeyGen1 {
                        from: state.shared.own_id,
                        proof,
                        commitments: exponent.clone(),
                    });
                    debug!("generated and broadcast KeyGen1 commitment");
                    state.commitments.insert(state.shared.own_id, exponent);
                    state.prepared = Some(poly);
                }
            }
            KeygenStage::R1Waiting(_) => {}
            KeygenStage::R2Prepare(state) => {
                if !state.own_sent {
                    for &to in &state.shared.parties {
                        if to == state.shared.own_id {
                            continue;
                        }
                        let share = state.own_poly.evaluate(to)?;
                        self.outbox.push(Message::KeyGen2 {
                            from: state.shared.own_id,
                            to,
                            share,
                        });
                    }
                    let own_share = state.own_poly.evaluate(state.shared.own_id)?;
                    debug!("generated and sent KeyGen2 shares");
                    state.shares.insert(state.shared.own_id, own_share);
                    state.own_sent = true;
                }
            }
            KeygenStage::R2Waiting(_) => {}
            KeygenStage::Done(_) => {}
        }
        Ok(())
    }

    /// Drains outbound messages staged since the last call.
    pub fn generate_messages(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.outbox)
    }

    /// Consumes this round object and returns the successor: itself
    /// unchanged if the current stage is not yet complete, or the next
    /// stage's round object if it is. Idempotent once `Done`/`Aborted`.
    pub fn next_round(self) -> Self {
        let KeygenRound { stage, inbox, outbox } = self;
        let stage = match stage {
            KeygenStage::R1Prepare(state) => match state.prepared {
                Some(own_poly) => KeygenStage::R1Waiting(R1WaitingState {
                    shared: state.shared,
                    own_poly,
                    commitments: state.commitments,
                }),
                None => KeygenStage::R1Prepare(state),
            },
            KeygenStage::R1Waiting(state) => {
                if state.commitments.len() == state.shared.parties.len() {
                    info!("keygen round 1 complete, advancing to round 2");
                    KeygenStage::R2Prepare(R2PrepareState {
                        shared: state.shared,
                        own_poly: state.own_poly,
                        commitments: state.commitments,
                        shares: BTreeMap::new(),
                        own_sent: false,
                    })
                } else {
                    KeygenStage::R1Waiting(state)
                }
            }
            KeygenStage::R2Prepare(state) => {
                if state.own_sent {
                    KeygenStage::R2Waiting(R2WaitingState {
                        shared: state.shared,
                        commitments: state.commitments,
                        shares: state.shares,
                    })
                } else {
                    KeygenStage::R2Prepare(state)
                }
            }
            KeygenStage::R2Waiting(state) => {
                if state.shares.len() == state.shared.parties.len() {
                    Self::finalize(state)
                } else {
                    KeygenStage::R2Waiting(state)
                }
            }
            done_or_aborted => done_or_aborted,
        };
        KeygenRound { stage, inbox, outbox }
    }

    fn finalize(mut state: R2WaitingState) -> KeygenStage {
        let group_public = match ExponentPolynomial::sum(state.commitments.values()) {
            Ok(summed) => summed.constant(),
            Err(err) => {
                return KeygenStage::Aborted {
                    culprit: 0,
                    reason: format!("failed to reconstruct the group public key: {err}"),
                }
            }
        };

        let mut party_key_shares = BTreeMap::new();
        for &k in &state.shared.parties {
            let mut acc = None;
            for exponent in state.commitments.values() {
                let term = match exponent.evaluate(k) {
                    Ok(term) => term,
                    Err(err) => {
                        return KeygenStage::Aborted {
                            culprit: 0,
                            reason: format!("failed to reconstruct public share for party {k}: {err}"),
                        }
                    }
                };
                acc = Some(match acc {
                    Some(prev) => prev + term,
                    None => term,
                });
            }
            if let Some(acc) = acc {
                party_key_shares.insert(k, acc);
            }
        }

        let own_share: Scalar = state.shares.values().sum();

        info!(group_public = %hex::encode(crate::point::encode_point(&group_public)), "keygen round complete");
        for value in state.shares.values_mut() {
            value.zeroize();
        }

        KeygenStage::Done(KeygenOutput {
            group_public,
            party_key_shares,
            own_share,
        })
    }

    /// `true` once the round has reached a terminal state (`Done` or `Aborted`).
    ///
    /// A transport/driver polls this after each `next_round()`; blocking
    /// until completion is a transport-level concern outside this crate.
    pub fn wait_for_finish(&self) -> bool {
        matches!(self.stage, KeygenStage::Done(_) | KeygenStage::Aborted { .. })
    }

    /// Returns the keygen output once the round has completed successfully.
    pub fn wait_for_keygen_output(&self) -> Option<&KeygenOutput> {
        match &self.stage {
            KeygenStage::Done(output) => Some(output),
            _ => None,
        }
    }

    /// If the round has aborted, the culprit party and the reason.
    pub fn abort_reason(&self) -> Option<(PartyId, &str)> {
        match &self.stage {
            KeygenStage::Aborted { culprit, reason } => Some((*culprit, reason.as_str())),
            _ => None,
        }
    }
}
