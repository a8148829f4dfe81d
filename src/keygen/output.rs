//! Output of a completed distributed key generation round.

use std::collections::BTreeMap;

use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;

use crate::party::PartyId;

/// The triple a driver extracts once a [`crate::keygen::KeygenRound`] reaches
/// its `Done` state: the jointly-generated public key, every party's public
/// key share, and this party's own (secret) share.
#[derive(Clone)]
pub struct KeygenOutput {
    /// `Y = sum_j A_0^(j)`, the jointly-generated Ed25519 public key.
    pub group_public: EdwardsPoint,
    /// `share_pub(k) = sum_j F_j(k)` for every party `k` in the party set.
    pub party_key_shares: BTreeMap<PartyId, EdwardsPoint>,
    /// `y_i = sum_j f_j(i)`, this party's own secret share.
    pub own_share: Scalar,
}

impl KeygenOutput {
    /// `y_i * G` should equal `share_pub(i)` — the invariant a [`SignRound`]
    /// relies on.
    ///
    /// [`SignRound`]: crate::sign::SignRound
    pub fn own_public_share(&self, own_id: PartyId) -> Option<EdwardsPoint> {
        self.party_key_shares.get(&own_id).copied()
    }
}
