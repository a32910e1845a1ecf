//! Reference-set builder: cross-checks a disputed POI against trusted POIs at the blocks an
//! honest participant could plausibly have used.
//!
//! Extended policy (canonical), five points:
//! - the allocation's creation block,
//! - start of the creation epoch,
//! - start of the closing epoch,
//! - start of closing - 1,
//! - start of closing - 2.
//!
//! Legacy policy keeps only closing and closing - 1.
//!
//! Epoch lookups are all-or-nothing. A point whose block or POI cannot be fetched is a non-match
//! for that point only.

use crate::chain::bytes::{BlockRef, Bytes32};
use crate::chain::ledger::{BlockId, LedgerQuery};
use crate::network::epochs::EpochResolver;
use crate::network::types::{Allocation, Deployment, Dispute, Epoch};
use crate::poi::source::PoiFetcher;
use crate::Error;
use futures::future::{join_all, try_join_all};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferencePolicy {
    #[default]
    Extended,
    Legacy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    CreationBlock,
    CreatedEpochStart,
    ClosedEpochStart,
    PreviousEpochStart,
    PreviousPreviousEpochStart,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReferenceKind::CreationBlock => "creation block",
            ReferenceKind::CreatedEpochStart => "created epoch start",
            ReferenceKind::ClosedEpochStart => "closed epoch start",
            ReferenceKind::PreviousEpochStart => "previous epoch start",
            ReferenceKind::PreviousPreviousEpochStart => "previous-previous epoch start",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PointOutcome {
    Match,
    Mismatch,
    Unavailable(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReferencePoint {
    pub kind: ReferenceKind,
    pub epoch: Option<u64>,
    pub block: Option<BlockRef>,
    /// Trusted digest at `block`.
    pub reference: Option<Bytes32>,
    pub outcome: PointOutcome,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceStatus {
    Match,
    NoMatch,
    NotFound,
    /// Query disputes carry no POI.
    NotApplicable,
}

impl fmt::Display for ReferenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReferenceStatus::Match => "match",
            ReferenceStatus::NoMatch => "no match",
            ReferenceStatus::NotFound => "not found",
            ReferenceStatus::NotApplicable => "n/a",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReferenceSet {
    pub dispute_id: Bytes32,
    pub deployment: Option<Deployment>,
    /// The disputed POI.
    pub submitted: Option<Bytes32>,
    pub policy: ReferencePolicy,
    pub points: Vec<ReferencePoint>,
    pub status: ReferenceStatus,
}

impl ReferenceSet {
    pub fn is_defensible(&self) -> bool {
        self.status == ReferenceStatus::Match
    }

    fn not_applicable(dispute: &Dispute, policy: ReferencePolicy) -> Self {
        Self {
            dispute_id: dispute.id,
            deployment: None,
            submitted: None,
            policy,
            points: Vec::new(),
            status: ReferenceStatus::NotApplicable,
        }
    }
}

fn status_of(points: &[ReferencePoint]) -> ReferenceStatus {
    if points.iter().any(|p| p.outcome == PointOutcome::Match) {
        ReferenceStatus::Match
    } else if points
        .iter()
        .all(|p| matches!(p.outcome, PointOutcome::Unavailable(_)))
    {
        ReferenceStatus::NotFound
    } else {
        ReferenceStatus::NoMatch
    }
}

enum Anchor {
    EpochStart(u64),
    Block(BlockId),
    Unknown,
}

fn anchors(allocation: &Allocation, policy: ReferencePolicy) -> Vec<(ReferenceKind, Anchor)> {
    let mut out = Vec::new();
    if policy == ReferencePolicy::Extended {
        let creation = match (
            allocation.created_at_block_number,
            allocation.created_at_block_hash,
        ) {
            (Some(n), _) => Anchor::Block(BlockId::Number(n)),
            (None, Some(h)) => Anchor::Block(BlockId::Hash(h)),
            (None, None) => Anchor::Unknown,
        };
        out.push((ReferenceKind::CreationBlock, creation));
        out.push((
            ReferenceKind::CreatedEpochStart,
            Anchor::EpochStart(allocation.created_at_epoch),
        ));
    }
    if let Some(closed) = allocation.closed_at_epoch {
        out.push((ReferenceKind::ClosedEpochStart, Anchor::EpochStart(closed)));
        if let Some(previous) = closed.checked_sub(1) {
            out.push((ReferenceKind::PreviousEpochStart, Anchor::EpochStart(previous)));
        }
        if policy == ReferencePolicy::Extended {
            if let Some(previous) = closed.checked_sub(2) {
                out.push((
                    ReferenceKind::PreviousPreviousEpochStart,
                    Anchor::EpochStart(previous),
                ));
            }
        }
    }
    out
}

#[derive(Clone)]
pub struct ReferenceSetBuilder {
    epochs: EpochResolver,
    ledger: Arc<dyn LedgerQuery>,
    fetcher: Arc<PoiFetcher>,
    policy: ReferencePolicy,
}

impl ReferenceSetBuilder {
    pub fn new(
        epochs: EpochResolver,
        ledger: Arc<dyn LedgerQuery>,
        fetcher: Arc<PoiFetcher>,
        policy: ReferencePolicy,
    ) -> Self {
        Self {
            epochs,
            ledger,
            fetcher,
            policy,
        }
    }

    pub async fn build(&self, dispute: &Dispute) -> crate::Result<ReferenceSet> {
        let Some(allocation) = dispute.allocation.as_ref() else {
            return Ok(ReferenceSet::not_applicable(dispute, self.policy));
        };
        let deployment = allocation.deployment();
        let participant = allocation.indexer.id.as_str();
        let anchors = anchors(allocation, self.policy);

        let numbers: BTreeSet<u64> = anchors
            .iter()
            .filter_map(|(_, a)| match a {
                Anchor::EpochStart(n) => Some(*n),
                _ => None,
            })
            .collect();
        let epochs: HashMap<u64, Epoch> =
            try_join_all(numbers.into_iter().map(|n| self.epoch(n)))
                .await?
                .into_iter()
                .map(|e| (e.id, e))
                .collect();

        let points = join_all(anchors.into_iter().map(|(kind, anchor)| {
            self.point(
                kind,
                anchor,
                &epochs,
                &deployment,
                participant,
                allocation.poi,
            )
        }))
        .await;
        let status = status_of(&points);
        info!(dispute = %dispute.id, %status, points = points.len(), "reference set");
        Ok(ReferenceSet {
            dispute_id: dispute.id,
            deployment: Some(deployment),
            submitted: allocation.poi,
            policy: self.policy,
            points,
            status,
        })
    }

    async fn epoch(&self, number: u64) -> crate::Result<Epoch> {
        self.epochs.epoch(number).await.map_err(|e| match e {
            Error::NotFound(what) => Error::NotFound(what),
            other => Error::NotFound(format!("epoch {}: {}", number, other)),
        })
    }

    async fn point(
        &self,
        kind: ReferenceKind,
        anchor: Anchor,
        epochs: &HashMap<u64, Epoch>,
        deployment: &Deployment,
        participant: &str,
        submitted: Option<Bytes32>,
    ) -> ReferencePoint {
        let (epoch, block_id) = match anchor {
            Anchor::EpochStart(n) => (
                Some(n),
                epochs.get(&n).map(|e| BlockId::Number(e.start_block)),
            ),
            Anchor::Block(id) => (None, Some(id)),
            Anchor::Unknown => (None, None),
        };
        let mut point = ReferencePoint {
            kind,
            epoch,
            block: None,
            reference: None,
            outcome: PointOutcome::Unavailable("no block reference".to_string()),
        };
        let Some(block_id) = block_id else {
            return point;
        };
        let block = match self.ledger.block(block_id).await {
            Ok(b) => b.block_ref(),
            Err(e) => {
                warn!(%kind, block = %block_id, error = %e, "reference block unavailable");
                point.outcome = PointOutcome::Unavailable(e.to_string());
                return point;
            }
        };
        point.block = Some(block);
        point.outcome = match self.fetcher.fetch(deployment, &block, participant).await {
            Ok(Some(poi)) => {
                point.reference = Some(poi.digest);
                if submitted == Some(poi.digest) {
                    PointOutcome::Match
                } else {
                    PointOutcome::Mismatch
                }
            }
            Ok(None) => PointOutcome::Unavailable("no poi at block".to_string()),
            Err(e) => {
                warn!(%kind, block = block.number, error = %e, "reference poi unavailable");
                PointOutcome::Unavailable(e.to_string())
            }
        };
        debug!(%kind, block = block.number, outcome = ?point.outcome, "reference point");
        point
    }
}
