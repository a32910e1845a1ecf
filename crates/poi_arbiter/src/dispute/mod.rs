//! Dispute listing, statute of limitations, resolution calldata and the resolution workflow.

pub mod payload;
pub mod resolver;
pub mod statute;

pub use payload::{decode_payload, DecodeError, DecodedArgument, DecodedCall, ResolutionCall};
pub use resolver::{
    verify_payload, Confirm, DisputeResolver, ResolutionAction, ResolutionOutcome, ResolutionPlan,
};
pub use statute::{dispute_is_expired, is_expired, thawing_period_in_epochs, STATUTE_ADVISORY};

use crate::network::subgraph::{all_disputes, NetworkData};
use crate::network::types::{Dispute, DisputeStatus};

/// Every dispute ordered by creation time, optionally only those with `status`.
pub async fn list_disputes(
    data: &dyn NetworkData,
    status: Option<DisputeStatus>,
) -> crate::Result<Vec<Dispute>> {
    let disputes = all_disputes(data).await?;
    Ok(match status {
        Some(status) => disputes.into_iter().filter(|d| d.status == status).collect(),
        None => disputes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{allocation, indexing_dispute, query_dispute, MockNetwork};

    #[tokio::test]
    async fn listing_orders_by_creation_and_filters() {
        let mut early = query_dispute(9);
        early.created_at = 10;
        let mut accepted = indexing_dispute(3, allocation(1, Some(1), Some(2), None));
        accepted.status = DisputeStatus::Accepted;
        accepted.created_at = 20;
        let mut late = indexing_dispute(1, allocation(1, Some(1), Some(2), None));
        late.created_at = 30;
        let network = MockNetwork {
            disputes: vec![late.clone(), accepted.clone(), early.clone()],
            ..MockNetwork::default()
        };

        let all = list_disputes(&network, None).await.unwrap();
        let ids: Vec<_> = all.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![early.id, accepted.id, late.id]);

        let undecided = list_disputes(&network, Some(DisputeStatus::Undecided))
            .await
            .unwrap();
        assert_eq!(undecided.len(), 2);
        assert!(undecided.iter().all(|d| d.status == DisputeStatus::Undecided));
    }
}
