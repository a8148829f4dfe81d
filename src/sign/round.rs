//! Threshold signing round state machine (FROST, Komlo-Goldberg).
//!
//! Two rounds: signers broadcast nonce commitments, then broadcast signature
//! shares bound together by a per-signer binding factor, driven by the same
//! `store_message` / `process_messages` / `process_round` / `generate_messages`
//! / `next_round` contract as the keygen round.

use std::collections::{BTreeMap, VecDeque};

use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use ed25519_dalek::{Signature, VerifyingKey};
use rand_core::OsRng;
use tracing::{debug, info, instrument, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::codec::Message;
use crate::error::{Error, Result};
use crate::lagrange::lagrange_coefficient;
use crate::party::{validate_party_set, PartyId};
use crate::point::{encode_point, points_ct_eq};
use crate::scalar::{hash_to_scalar, random_scalar};

use super::output::SignOutput;

const BINDING_DOMAIN: &str = "FROST-SHA512";

/// Configuration shared by every stage of one signer's sign round.
struct Shared {
    own_id: PartyId,
    signers: Vec<PartyId>,
    party_key_shares: BTreeMap<PartyId, EdwardsPoint>,
    group_public: EdwardsPoint,
    own_share: Scalar,
    message: Vec<u8>,
}

/// Ephemeral per-session nonces, zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
struct Nonces {
    d: Scalar,
    e: Scalar,
}

/// Round 1: each signer samples a nonce pair and broadcasts its commitment.
/// `commitments` accumulates every `Sign1` received so far — including
/// peers' broadcasts that arrive before this party's own contribution has
/// been generated by `process_round` — so a message delivered while this
/// party is still `R1Prepare` is recorded rather than dropped.
struct R1PrepareState {
    shared: Shared,
    commitments: BTreeMap<PartyId, (EdwardsPoint, EdwardsPoint)>,
    prepared: Option<(Nonces, EdwardsPoint, EdwardsPoint)>,
}

struct R1WaitingState {
    shared: Shared,
    nonces: Nonces,
    commitments: BTreeMap<PartyId, (EdwardsPoint, EdwardsPoint)>,
}

/// Round 2: once all nonce commitments are in, the binding factors, group
/// commitment `R`, and challenge `c` are fixed — they depend only on
/// `commitments`, which is already complete at this point — so they are
/// computed once, eagerly, at the `R1Waiting -> R2Prepare` transition (see
/// `next_round`), along with this party's own signature share. `shares`
/// accumulates every `Sign2` received so far, for the same early-arrival
/// reason as `R1PrepareState::commitments`. `own_sent` marks whether this
/// party has broadcast its own share yet.
struct R2PrepareState {
    shared: Shared,
    commitments: BTreeMap<PartyId, (EdwardsPoint, EdwardsPoint)>,
    r: EdwardsPoint,
    c: Scalar,
    rho: BTreeMap<PartyId, Scalar>,
    shares: BTreeMap<PartyId, Scalar>,
    own_sent: bool,
}

struct R2WaitingState {
    shared: Shared,
    commitments: BTreeMap<PartyId, (EdwardsPoint, EdwardsPoint)>,
    r: EdwardsPoint,
    c: Scalar,
    rho: BTreeMap<PartyId, Scalar>,
    shares: BTreeMap<PartyId, Scalar>,
}

enum SignStage {
    R1Prepare(R1PrepareState),
    R1Waiting(R1WaitingState),
    R2Prepare(R2PrepareState),
    R2Waiting(R2WaitingState),
    Done(SignOutput),
    Aborted { culprit: PartyId, reason: String },
}

/// See the identically-named function in `keygen::round`: `R1Prepare`/
/// `R1Waiting` (and `R2Prepare`/`R2Waiting`) share an ordinal so a peer's
/// same-round message is accepted in either sub-stage.
fn stage_ordinal(stage: &SignStage) -> u8 {
    match stage {
        SignStage::R1Prepare(_) | SignStage::R1Waiting(_) => 1,
        SignStage::R2Prepare(_) | SignStage::R2Waiting(_) => 2,
        SignStage::Done(_) | SignStage::Aborted { .. } => 3,
    }
}

fn message_ordinal(msg: &Message) -> Option<u8> {
    match msg {
        Message::Sign1 { .. } => Some(1),
        Message::Sign2 { .. } => Some(2),
        Message::KeyGen1 { .. } | Message::KeyGen2 { .. } => None,
    }
}

/// Encodes the sorted binding-factor input `B`: each entry is
/// `id_be32 ‖ D(32) ‖ E(32)`, concatenated in ascending PartyID order (the
/// iteration order of a `BTreeMap`).
fn encode_binding_input(commitments: &BTreeMap<PartyId, (EdwardsPoint, EdwardsPoint)>) -> Vec<u8> {
    let mut out = Vec::with_capacity(commitments.len() * (4 + 32 + 32));
    for (id, (d, e)) in commitments {
        out.extend_from_slice(&id.to_be_bytes());
        out.extend_from_slice(&encode_point(d));
        out.extend_from_slice(&encode_point(e));
    }
    out
}

fn binding_factor(id: PartyId, message: &[u8], binding_input: &[u8]) -> Scalar {
    hash_to_scalar(&[BINDING_DOMAIN.as_bytes(), &id.to_be_bytes(), message, binding_input])
}

fn group_commitment(
    commitments: &BTreeMap<PartyId, (EdwardsPoint, EdwardsPoint)>,
    rho: &BTreeMap<PartyId, Scalar>,
) -> EdwardsPoint {
    commitments
        .iter()
        .map(|(id, (d, e))| d + e * rho[id])
        .fold(EdwardsPoint::identity(), |acc, term| acc + term)
}

fn challenge(r: &EdwardsPoint, group_public: &EdwardsPoint, message: &[u8]) -> Scalar {
    hash_to_scalar(&[&encode_point(r), &encode_point(group_public), message])
}

/// Validates and records an inbound `Sign1` broadcast into `commitments`,
/// shared by both `R1Prepare` and `R1Waiting` (see [`stage_ordinal`]).
fn validate_and_insert_sign1(
    shared: &Shared,
    commitments: &mut BTreeMap<PartyId, (EdwardsPoint, EdwardsPoint)>,
    from: PartyId,
    d: EdwardsPoint,
    e: EdwardsPoint,
) -> Result<()> {
    if !shared.signers.contains(&from) || from == shared.own_id {
        return Err(Error::FailMsg {
            from,
            reason: "Sign1 sender is not a recognized co-signer".into(),
        });
    }
    if commitments.contains_key(&from) {
        return Err(Error::FailMsg {
            from,
            reason: "duplicate Sign1 from this sender".into(),
        });
    }
    if d == EdwardsPoint::identity() || e == EdwardsPoint::identity() {
        return Err(Error::FailMsg {
            from,
            reason: "Sign1 nonce commitment is the identity point".into(),
        });
    }
    debug!(from, "stored Sign1 commitment");
    commitments.insert(from, (d, e));
    Ok(())
}

/// Validates and records an inbound `Sign2` share into `shares`, shared by
/// both `R2Prepare` and `R2Waiting` (see [`stage_ordinal`]).
fn validate_and_insert_sign2(
    shared: &Shared,
    commitments: &BTreeMap<PartyId, (EdwardsPoint, EdwardsPoint)>,
    rho: &BTreeMap<PartyId, Scalar>,
    c: Scalar,
    shares: &mut BTreeMap<PartyId, Scalar>,
    from: PartyId,
    z: Scalar,
) -> Result<()> {
    if !shared.signers.contains(&from) || from == shared.own_id {
        return Err(Error::FailMsg {
            from,
            reason: "Sign2 sender is not a recognized co-signer".into(),
        });
    }
    if shares.contains_key(&from) {
        return Err(Error::FailMsg {
            from,
            reason: "duplicate Sign2 from this sender".into(),
        });
    }
    let (d_j, e_j) = *commitments.get(&from).ok_or_else(|| Error::FailMsg {
        from,
        reason: "Sign2 received before that sender's Sign1 commitment".into(),
    })?;
    let rho_j = rho[&from];
    let r_j = d_j + e_j * rho_j;
    let lambda_j = lagrange_coefficient(from, &shared.signers)?;
    let share_pub_j = shared.party_key_shares[&from];
    let expected = r_j + share_pub_j * (c * lambda_j);
    if !points_ct_eq(&EdwardsPoint::mul_base(&z), &expected) {
        warn!(culprit = from, "partial signature verification failed");
        return Err(Error::FailProtocol {
            culprit: from,
            reason: "signature share does not verify against the signer's public share".into(),
        });
    }
    debug!(from, "stored and verified Sign2 share");
    shares.insert(from, z);
    Ok(())
}

/// The threshold signing round state machine.
///
/// Construct with [`SignRound::new`] from a completed [`crate::keygen::KeygenOutput`],
/// then drive with the same contract as [`crate::keygen::KeygenRound`] until
/// [`SignRound::wait_for_sign_output`] returns `Some`.
pub struct SignRound {
    stage: SignStage,
    inbox: VecDeque<Message>,
    outbox: Vec<Message>,
}

impl SignRound {
    /// Constructs a new sign round for party `own_id` over signer set
    /// `signers` (which must have size `threshold + 1`, be sorted, unique,
    /// all nonzero, and contain `own_id`), given the key material produced by
    /// a completed keygen round and the message to sign.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(signers, party_key_shares, own_share, message), fields(own_id, threshold, n_signers = signers.len()))]
    pub fn new(
        own_id: PartyId,
        threshold: usize,
        signers: Vec<PartyId>,
        party_key_shares: BTreeMap<PartyId, EdwardsPoint>,
        group_public: EdwardsPoint,
        own_share: Scalar,
        message: Vec<u8>,
    ) -> Result<Self> {
        validate_party_set(&signers)?;
        if !signers.contains(&own_id) {
            return Err(Error::InvalidArgument(format!(
                "own party id {own_id} is not a member of the signer set"
            )));
        }
        if signers.len() != threshold + 1 {
            return Err(Error::InvalidArgument(format!(
                "signer set size {} does not equal threshold + 1 ({})",
                signers.len(),
                threshold + 1
            )));
        }
        for &id in &signers {
            if !party_key_shares.contains_key(&id) {
                return Err(Error::InvalidArgument(format!(
                    "no public key share on record for signer {id}"
                )));
            }
        }
        info!("starting sign round");
        Ok(Self {
            stage: SignStage::R1Prepare(R1PrepareState {
                shared: Shared {
                    own_id,
                    signers,
                    party_key_shares,
                    group_public,
                    own_share,
                    message,
                },
                commitments: BTreeMap::new(),
                prepared: None,
            }),
            inbox: VecDeque::new(),
            outbox: Vec::new(),
        })
    }

    fn abort_error(&self) -> Error {
        match &self.stage {
            SignStage::Aborted { culprit, reason } => Error::FailProtocol {
                culprit: *culprit,
                reason: reason.clone(),
            },
            _ => unreachable!("abort_error called outside Aborted stage"),
        }
    }

    /// Validates and applies a single message that belongs to the current
    /// stage (either its `Prepare` or `Waiting` sub-stage — see
    /// [`stage_ordinal`]).
    fn apply_message(&mut self, msg: Message) -> Result<()> {
        let result = match (&mut self.stage, msg) {
            (SignStage::R1Prepare(state), Message::Sign1 { from, d, e }) => {
                validate_and_insert_sign1(&state.shared, &mut state.commitments, from, d, e)
            }
            (SignStage::R1Waiting(state), Message::Sign1 { from, d, e }) => {
                validate_and_insert_sign1(&state.shared, &mut state.commitments, from, d, e)
            }
            (SignStage::R2Prepare(state), Message::Sign2 { from, z }) => validate_and_insert_sign2(
                &state.shared,
                &state.commitments,
                &state.rho,
                state.c,
                &mut state.shares,
                from,
                z,
            ),
            (SignStage::R2Waiting(state), Message::Sign2 { from, z }) => validate_and_insert_sign2(
                &state.shared,
                &state.commitments,
                &state.rho,
                state.c,
                &mut state.shares,
                from,
                z,
            ),
            (_, msg) => Err(Error::FailMsg {
                from: msg.from(),
                reason: "message does not belong to the current stage".into(),
            }),
        };
        if let Err(Error::FailProtocol { culprit, ref reason }) = result {
            self.stage = SignStage::Aborted { culprit, reason: reason.clone() };
        }
        result
    }

    pub fn store_message(&mut self, msg: Message) -> Result<()> {
        if let SignStage::Aborted { .. } = &self.stage {
            return Err(self.abort_error());
        }
        let Some(msg_ordinal) = message_ordinal(&msg) else {
            return Err(Error::FailMsg {
                from: msg.from(),
                reason: "sign round received a keygen-protocol message".into(),
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

    pub fn process_messages(&mut self) -> Result<()> {
        if let SignStage::Aborted { .. } = &self.stage {
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

    #[instrument(skip(self))]
    pub fn process_round(&mut self) -> Result<()> {
        match &mut self.stage {
            SignStage::Aborted { .. } => return Err(self.abort_error()),
            SignStage::R1Prepare(state) => {
                if state.prepared.is_none() {
                    let mut rng = OsRng;
                    let d = random_scalar(&mut rng);
                    let e = random_scalar(&mut rng);
                    let big_d = EdwardsPoint::mul_base(&d);
                    let big_e = EdwardsPoint::mul_base(&e);
                    self.outbox.push(Message::Sign1 {
                        from: state.shared.own_id,
                        d: big_d,
                        e: big_e,
                    });
                    debug!("generated and broadcast Sign1 nonce commitments");
                    state.commitments.insert(state.shared.own_id, (big_d, big_e));
                    state.prepared = Some((Nonces { d, e }, big_d, big_e));
                }
            }
            SignStage::R1Waiting(_) => {}
            SignStage::R2Prepare(state) => {
                if !state.own_sent {
                    let z_i = state.shares[&state.shared.own_id];
                    self.outbox.push(Message::Sign2 { from: state.shared.own_id, z: z_i });
                    debug!("generated and broadcast Sign2 share");
                    state.own_sent = true;
                }
            }
            SignStage::R2Waiting(_) => {}
            SignStage::Done(_) => {}
        }
        Ok(())
    }

    pub fn generate_messages(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.outbox)
    }

    /// Consumes this round object and returns the successor. The
    /// `R1Waiting -> R2Prepare` transition eagerly computes the binding
    /// factors, group commitment, challenge, and this party's own signature
    /// share, since all of their inputs (`commitments`) are already complete
    /// at that point.
    pub fn next_round(self) -> Self {
        let SignRound { stage, inbox, outbox } = self;
        let stage = match stage {
            SignStage::R1Prepare(state) => match state.prepared {
                Some((nonces, ..)) => SignStage::R1Waiting(R1WaitingState {
                    shared: state.shared,
                    nonces,
                    commitments: state.commitments,
                }),
                None => SignStage::R1Prepare(state),
            },
            SignStage::R1Waiting(state) => {
                if state.commitments.len() == state.shared.signers.len() {
                    info!("sign round 1 complete, advancing to round 2");
                    match Self::prepare_round2(state) {
                        Ok(prepared) => prepared,
                        Err(err) => SignStage::Aborted { culprit: 0, reason: err.to_string() },
                    }
                } else {
                    SignStage::R1Waiting(state)
                }
            }
            SignStage::R2Prepare(state) => {
                if state.own_sent {
                    SignStage::R2Waiting(R2WaitingState {
                        shared: state.shared,
                        commitments: state.commitments,
                        r: state.r,
                        c: state.c,
                        rho: state.rho,
                        shares: state.shares,
                    })
                } else {
                    SignStage::R2Prepare(state)
                }
            }
            SignStage::R2Waiting(state) => {
                if state.shares.len() == state.shared.signers.len() {
                    Self::finalize(state)
                } else {
                    SignStage::R2Waiting(state)
                }
            }
            done_or_aborted => done_or_aborted,
        };
        SignRound { stage, inbox, outbox }
    }

    /// Computes the binding factors, group commitment `R`, challenge `c`, and
    /// this party's own signature share `z_i`, producing a fully-seeded
    /// `R2Prepare` stage. Moving `state.nonces` here (rather than keeping it
    /// around) is why `R2PrepareState` has no `nonces` field: the nonces'
    /// only remaining use is computing `z_i`, done once, right here.
    fn prepare_round2(state: R1WaitingState) -> Result<SignStage> {
        let binding_input = encode_binding_input(&state.commitments);
        let rho: BTreeMap<PartyId, Scalar> = state
            .shared
            .signers
            .iter()
            .map(|&id| (id, binding_factor(id, &state.shared.message, &binding_input)))
            .collect();
        let r = group_commitment(&state.commitments, &rho);
        let c = challenge(&r, &state.shared.group_public, &state.shared.message);
        let lambda_i = lagrange_coefficient(state.shared.own_id, &state.shared.signers)?;
        let rho_i = rho[&state.shared.own_id];
        let z_i = state.nonces.d + rho_i * state.nonces.e + lambda_i * state.shared.own_share * c;

        let mut shares = BTreeMap::new();
        shares.insert(state.shared.own_id, z_i);

        Ok(SignStage::R2Prepare(R2PrepareState {
            shared: state.shared,
            commitments: state.commitments,
            r,
            c,
            rho,
            shares,
            own_sent: false,
        }))
    }

    fn finalize(state: R2WaitingState) -> SignStage {
        let z: Scalar = state.shares.values().sum();
        let output = SignOutput { r: state.r, z };

        let verifying_key = match VerifyingKey::from_bytes(&encode_point(&state.shared.group_public)) {
            Ok(key) => key,
            Err(err) => {
                return SignStage::Aborted {
                    culprit: 0,
                    reason: format!("group public key is not a valid Ed25519 verifying key: {err}"),
                }
            }
        };
        let signature = Signature::from_bytes(&output.to_bytes());
        if verifying_key.verify_strict(&state.shared.message, &signature).is_err() {
            return SignStage::Aborted {
                culprit: 0,
                reason: "final defensive signature verification failed".into(),
            };
        }

        info!(signature = %hex::encode(output.to_bytes()), "sign round complete");
        SignStage::Done(output)
    }

    /// `true` once the round has reached a terminal state (`Done` or `Aborted`).
    pub fn wait_for_finish(&self) -> bool {
        matches!(self.stage, SignStage::Done(_) | SignStage::Aborted { .. })
    }

    /// Returns the signature once the round has completed successfully.
    pub fn wait_for_sign_output(&self) -> Option<&SignOutput> {
        match &self.stage {
            SignStage::Done(output) => Some(output),
            _ => None,
        }
    }

    /// If the round has aborted, the culprit party and the reason.
    pub fn abort_reason(&self) -> Option<(PartyId, &str)> {
        match &self.stage {
            SignStage::Aborted { culprit, reason } => Some((*culprit, reason.as_str())),
            _ => None,
        }
    }
}
