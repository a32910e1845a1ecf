//! Statute of limitations for dispute resolution.
//!
//! A dispute whose allocation closed more than two thawing periods ago (in epochs) can no longer be
//! accepted or rejected. Query disputes and allocations without a closing epoch are always eligible.

use crate::network::types::{Dispute, NetworkSettings};

pub const STATUTE_ADVISORY: &str = "The statute of limitations for this dispute has expired: \
its allocation closed more than two thawing periods ago. Accepting or rejecting it is no longer \
possible; only a draw can still be recorded.";

/// `round(thawingPeriod / epochLength)`, halves rounded up. An epoch length of 0 counts as 1.
pub fn thawing_period_in_epochs(settings: &NetworkSettings) -> u64 {
    let length = settings.epoch_length.max(1);
    let thawing = settings.effective_thawing_period();
    let remainder = thawing % length;
    thawing / length + u64::from(remainder >= length - length / 2 && remainder > 0)
}

/// `currentEpoch - closedAtEpoch > 2 * thawingPeriodInEpochs`.
pub fn is_expired(closed_at_epoch: u64, settings: &NetworkSettings) -> bool {
    let gap = settings.current_epoch.saturating_sub(closed_at_epoch);
    gap > thawing_period_in_epochs(settings).saturating_mul(2)
}

pub fn dispute_is_expired(dispute: &Dispute, settings: &NetworkSettings) -> bool {
    dispute
        .closed_at_epoch()
        .is_some_and(|closed| is_expired(closed, settings))
}
