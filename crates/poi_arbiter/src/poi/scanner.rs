//! Range scanner: trusted POIs for every block in `[start, end)` on a bounded pool.
//!
//! Each block is one task (block lookup, then POI fetch) holding a semaphore permit. Results come
//! back over a channel in completion order. A callback returning [`ScanControl::Stop`] cancels the
//! token: nothing new is scheduled, in-flight tasks finish and their results are dropped.

use crate::chain::bytes::Bytes32;
use crate::chain::http::FetchError;
use crate::chain::ledger::{BlockId, LedgerQuery};
use crate::network::types::Deployment;
use crate::poi::source::PoiFetcher;
use crate::poi::types::Poi;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

pub const DEFAULT_CONCURRENCY: usize = 6;

/// Cooperative cancellation flag shared between the scan driver and its producer.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanControl {
    Continue,
    Stop,
}

#[derive(Debug)]
pub struct ScanItem {
    pub block_number: u64,
    /// `Ok(None)` when the source has no POI at that block.
    pub outcome: Result<Option<Poi>, FetchError>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ScanSummary {
    pub delivered: usize,
    pub stopped: bool,
}

#[derive(Clone)]
pub struct RangeScanner {
    ledger: Arc<dyn LedgerQuery>,
    fetcher: Arc<PoiFetcher>,
    concurrency: usize,
}

impl RangeScanner {
    pub fn new(ledger: Arc<dyn LedgerQuery>, fetcher: Arc<PoiFetcher>) -> Self {
        Self {
            ledger,
            fetcher,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Maximum simultaneous fetches; at least 1.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub async fn scan<F>(
        &self,
        deployment: Deployment,
        start: u64,
        end: u64,
        indexer: &str,
        on_result: F,
    ) -> ScanSummary
    where
        F: FnMut(ScanItem) -> ScanControl,
    {
        self.scan_with_token(deployment, start, end, indexer, CancelToken::new(), on_result)
            .await
    }

    /// Like [`scan`](Self::scan) but with a caller-owned token, so the scan can also be stopped
    /// from outside the callback.
    pub async fn scan_with_token<F>(
        &self,
        deployment: Deployment,
        start: u64,
        end: u64,
        indexer: &str,
        cancel: CancelToken,
        mut on_result: F,
    ) -> ScanSummary
    where
        F: FnMut(ScanItem) -> ScanControl,
    {
        let mut summary = ScanSummary::default();
        if start >= end {
            return summary;
        }
        info!(start, end, concurrency = self.concurrency, "scanning");

        let (tx, mut rx) = mpsc::unbounded_channel::<ScanItem>();
        let producer = {
            let semaphore = Arc::new(Semaphore::new(self.concurrency));
            let ledger = self.ledger.clone();
            let fetcher = self.fetcher.clone();
            let indexer = indexer.to_string();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                for block_number in start..end {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let Ok(permit) = semaphore.clone().acquire_owned().await else {
                        break;
                    };
                    if cancel.is_cancelled() {
                        break;
                    }
                    let ledger = ledger.clone();
                    let fetcher = fetcher.clone();
                    let indexer = indexer.clone();
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let outcome = fetch_block(
                            ledger.as_ref(),
                            &fetcher,
                            &deployment,
                            block_number,
                            &indexer,
                        )
                        .await;
                        drop(permit);
                        let _ = tx.send(ScanItem {
                            block_number,
                            outcome,
                        });
                    });
                }
            })
        };

        while let Some(item) = rx.recv().await {
            if cancel.is_cancelled() {
                debug!(block = item.block_number, "discarding result after stop");
                continue;
            }
            summary.delivered += 1;
            if on_result(item) == ScanControl::Stop {
                cancel.cancel();
                summary.stopped = true;
            }
        }
        if let Err(e) = producer.await {
            warn!(error = %e, "scan producer");
        }
        summary.stopped |= cancel.is_cancelled();
        summary
    }

    /// All results for the range, in completion order.
    pub async fn collect(
        &self,
        deployment: Deployment,
        start: u64,
        end: u64,
        indexer: &str,
    ) -> Vec<ScanItem> {
        let mut items = Vec::new();
        self.scan(deployment, start, end, indexer, |item| {
            items.push(item);
            ScanControl::Continue
        })
        .await;
        items
    }

    /// First POI in the range whose digest equals `digest`; the scan stops at the first hit.
    pub async fn find_match(
        &self,
        deployment: Deployment,
        start: u64,
        end: u64,
        indexer: &str,
        digest: Bytes32,
    ) -> Option<Poi> {
        let mut found = None;
        self.scan(deployment, start, end, indexer, |item| match item.outcome {
            Ok(Some(poi)) if poi.digest == digest => {
                info!(block = item.block_number, "matching poi");
                found = Some(poi);
                ScanControl::Stop
            }
            Ok(_) => ScanControl::Continue,
            Err(e) => {
                warn!(block = item.block_number, error = %e, "block skipped");
                ScanControl::Continue
            }
        })
        .await;
        found
    }
}

async fn fetch_block(
    ledger: &dyn LedgerQuery,
    fetcher: &PoiFetcher,
    deployment: &Deployment,
    block_number: u64,
    indexer: &str,
) -> Result<Option<Poi>, FetchError> {
    let block = ledger.block(BlockId::Number(block_number)).await?;
    fetcher.fetch(deployment, &block.block_ref(), indexer).await
}
