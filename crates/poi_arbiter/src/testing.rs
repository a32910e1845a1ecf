//! In-memory capability implementations for unit tests.

use crate::chain::bytes::{BlockRef, Bytes32};
use crate::chain::http::FetchError;
use crate::chain::ledger::{Block, BlockId, LedgerQuery};
use crate::chain::submitter::{SubmitError, TransactionSubmitter, TxReceipt, UnsignedTransaction};
use crate::network::subgraph::NetworkData;
use crate::network::types::{
    Allocation, Deployment, DeploymentRef, Dispute, DisputeKind, DisputeStatus, EntityRef, Epoch,
    Indexer, NetworkSettings, PoiSubmission,
};
use crate::poi::source::PoiSource;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) fn deployment() -> Deployment {
    Deployment::from_bytes32(Bytes32::new([0xde; 32]))
}

/// Deterministic hash for block `n`; [`block_number_of`] inverts it.
pub(crate) fn block_hash(n: u64) -> Bytes32 {
    let mut bytes = [0xbb; 32];
    bytes[24..].copy_from_slice(&n.to_be_bytes());
    Bytes32::new(bytes)
}

pub(crate) fn block_number_of(hash: &Bytes32) -> u64 {
    let mut n = [0u8; 8];
    n.copy_from_slice(&hash.as_bytes()[24..]);
    u64::from_be_bytes(n)
}

pub(crate) fn digest(byte: u8) -> Bytes32 {
    Bytes32::new([byte; 32])
}

pub(crate) const PARTICIPANT: &str = "0x00000000000000000000000000000000000000aa";

pub(crate) fn allocation(
    created_epoch: u64,
    created_block: Option<u64>,
    closed_epoch: Option<u64>,
    poi: Option<Bytes32>,
) -> Allocation {
    Allocation {
        id: "0x00000000000000000000000000000000000000a1".to_string(),
        indexer: EntityRef {
            id: PARTICIPANT.to_string(),
        },
        subgraph_deployment: DeploymentRef { id: deployment() },
        created_at_epoch: created_epoch,
        created_at_block_hash: created_block.map(block_hash),
        created_at_block_number: created_block,
        closed_at_epoch: closed_epoch,
        closed_at_block_hash: None,
        closed_at_block_number: None,
        poi,
        indexing_rewards: None,
    }
}

pub(crate) fn indexing_dispute(id: u8, allocation: Allocation) -> Dispute {
    Dispute {
        id: Bytes32::new([id; 32]),
        kind: DisputeKind::Indexing,
        status: DisputeStatus::Undecided,
        participant: EntityRef {
            id: PARTICIPANT.to_string(),
        },
        challenger: EntityRef {
            id: "0x00000000000000000000000000000000000000ff".to_string(),
        },
        created_at: 1_700_000_000,
        allocation: Some(allocation),
        related_dispute: None,
    }
}

pub(crate) fn query_dispute(id: u8) -> Dispute {
    Dispute {
        kind: DisputeKind::Query,
        allocation: None,
        ..indexing_dispute(id, allocation(0, None, None, None))
    }
}

/// Ledger that answers any block, counting calls and simultaneous lookups.
pub(crate) struct MockLedger {
    delay: Duration,
    failing: HashSet<u64>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockLedger {
    pub(crate) fn new() -> Self {
        Self {
            delay: Duration::ZERO,
            failing: HashSet::new(),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn failing(mut self, blocks: impl IntoIterator<Item = u64>) -> Self {
        self.failing.extend(blocks);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerQuery for MockLedger {
    async fn block(&self, id: BlockId) -> Result<Block, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let number = match id {
            BlockId::Number(n) => n,
            BlockId::Hash(h) => block_number_of(&h),
        };
        if self.failing.contains(&number) {
            return Err(FetchError::Missing(format!("block {}", id)));
        }
        Ok(Block {
            number,
            hash: block_hash(number),
            timestamp: time::OffsetDateTime::UNIX_EPOCH,
        })
    }
}

/// POI source answering from a block-number map; absent blocks have no POI.
pub(crate) struct MapSource {
    answers: HashMap<u64, Bytes32>,
    failing: HashSet<u64>,
}

impl MapSource {
    pub(crate) fn new(answers: HashMap<u64, Bytes32>) -> Self {
        Self {
            answers,
            failing: HashSet::new(),
        }
    }

    pub(crate) fn failing(mut self, blocks: impl IntoIterator<Item = u64>) -> Self {
        self.failing.extend(blocks);
        self
    }
}

#[async_trait]
impl PoiSource for MapSource {
    fn name(&self) -> &str {
        "test"
    }

    async fn proof_of_indexing(
        &self,
        _deployment: &Deployment,
        block: &BlockRef,
        _indexer: &str,
    ) -> Result<Option<Bytes32>, FetchError> {
        if self.failing.contains(&block.number) {
            return Err(FetchError::GraphQl(format!(
                "indexing error at block {}",
                block.number
            )));
        }
        Ok(self.answers.get(&block.number).copied())
    }
}

#[derive(Default)]
pub(crate) struct MockNetwork {
    pub(crate) settings: Option<NetworkSettings>,
    pub(crate) epochs: HashMap<u64, Epoch>,
    pub(crate) disputes: Vec<Dispute>,
    pub(crate) allocations: Vec<Allocation>,
    pub(crate) submissions: Vec<PoiSubmission>,
    pub(crate) indexers: Vec<Indexer>,
    /// Allocation ids of every `poi_submissions_page` call, in call order.
    pub(crate) submission_batches: Mutex<Vec<Vec<String>>>,
}

impl MockNetwork {
    /// Epochs `0..count`, epoch `n` starting at block `n * length`.
    pub(crate) fn with_epochs(mut self, count: u64, length: u64) -> Self {
        for n in 0..count {
            self.epochs.insert(
                n,
                Epoch {
                    id: n,
                    start_block: n * length,
                },
            );
        }
        self
    }
}

fn page<T: Clone>(items: &[T], first: usize, id_gt: &str, id_of: impl Fn(&T) -> String) -> Vec<T> {
    let mut out: Vec<T> = items
        .iter()
        .filter(|i| id_of(i).as_str() > id_gt)
        .cloned()
        .collect();
    out.sort_by_key(&id_of);
    out.truncate(first);
    out
}

#[async_trait]
impl NetworkData for MockNetwork {
    async fn network_settings(&self) -> Result<NetworkSettings, FetchError> {
        self.settings
            .clone()
            .ok_or_else(|| FetchError::Missing("graphNetwork".into()))
    }

    async fn epoch(&self, number: u64) -> Result<Option<Epoch>, FetchError> {
        Ok(self.epochs.get(&number).cloned())
    }

    async fn dispute(&self, id: &Bytes32) -> Result<Option<Dispute>, FetchError> {
        Ok(self.disputes.iter().find(|d| d.id == *id).cloned())
    }

    async fn disputes_page(&self, first: usize, id_gt: &str) -> Result<Vec<Dispute>, FetchError> {
        Ok(page(&self.disputes, first, id_gt, |d| d.id.to_hex()))
    }

    async fn allocation(&self, id: &str) -> Result<Option<Allocation>, FetchError> {
        Ok(self
            .allocations
            .iter()
            .find(|a| a.id.eq_ignore_ascii_case(id))
            .cloned())
    }

    async fn allocations_page(
        &self,
        deployment: &Deployment,
        first: usize,
        id_gt: &str,
    ) -> Result<Vec<Allocation>, FetchError> {
        let matching: Vec<Allocation> = self
            .allocations
            .iter()
            .filter(|a| a.deployment() == *deployment)
            .cloned()
            .collect();
        Ok(page(&matching, first, id_gt, |a| a.id.clone()))
    }

    async fn poi_submissions_page(
        &self,
        allocation_ids: &[String],
        first: usize,
        id_gt: &str,
    ) -> Result<Vec<PoiSubmission>, FetchError> {
        self.submission_batches
            .lock()
            .unwrap()
            .push(allocation_ids.to_vec());
        let matching: Vec<PoiSubmission> = self
            .submissions
            .iter()
            .filter(|s| allocation_ids.contains(&s.allocation_id))
            .cloned()
            .collect();
        Ok(page(&matching, first, id_gt, |s| s.id.clone()))
    }

    async fn indexer(&self, id: &str) -> Result<Option<Indexer>, FetchError> {
        Ok(self
            .indexers
            .iter()
            .find(|i| i.id.eq_ignore_ascii_case(id))
            .cloned())
    }
}

/// Submitter that records every request and reports success.
#[derive(Default)]
pub(crate) struct RecordingSubmitter {
    pub(crate) sent: Mutex<Vec<UnsignedTransaction>>,
}

impl RecordingSubmitter {
    pub(crate) fn sent_count(&self) -> usize {
        self.sent.lock().map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl TransactionSubmitter for RecordingSubmitter {
    async fn submit(&self, tx: &UnsignedTransaction) -> Result<TxReceipt, SubmitError> {
        let mut sent = self
            .sent
            .lock()
            .map_err(|e| SubmitError::Malformed(e.to_string()))?;
        sent.push(tx.clone());
        Ok(TxReceipt {
            tx_hash: format!("0x{:064x}", sent.len()),
            success: true,
            block_number: Some(1),
        })
    }
}
