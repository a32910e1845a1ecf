//! Epoch lookups: epoch start blocks from the network dataset, and per-chain epoch blocks
//! from the epoch-block oracle.

use crate::chain::http::{take_field, FetchError, HttpClient};
use crate::chain::normalize::normalize_chain_id;
use crate::network::subgraph::NetworkData;
use crate::network::types::{flex_u64, Epoch};
use crate::Error;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// Block number of an epoch on a given chain.
#[async_trait]
pub trait EpochBook: Send + Sync {
    async fn block_number(&self, epoch: u64, chain_id: &str) -> Result<Option<u64>, FetchError>;
}

#[derive(Clone)]
pub struct EpochResolver {
    data: Arc<dyn NetworkData>,
    book: Option<Arc<dyn EpochBook>>,
}

impl EpochResolver {
    pub fn new(data: Arc<dyn NetworkData>, book: Option<Arc<dyn EpochBook>>) -> Self {
        Self { data, book }
    }

    /// Epoch by number; an unknown epoch is `NotFound`.
    pub async fn epoch(&self, number: u64) -> crate::Result<Epoch> {
        let epoch = self
            .data
            .epoch(number)
            .await?
            .ok_or_else(|| Error::NotFound(format!("epoch {}", number)))?;
        debug!(epoch = epoch.id, start_block = epoch.start_block, "epoch");
        Ok(epoch)
    }

    /// Block an epoch started at on `chain` (CAIP-2 or bare numeric id). `None` when the oracle
    /// has no block for that epoch yet.
    pub async fn chain_block(&self, epoch: u64, chain: &str) -> crate::Result<Option<u64>> {
        let book = self.book.as_ref().ok_or_else(|| {
            Error::Validation("epoch-block oracle endpoint is not configured".to_string())
        })?;
        Ok(book.block_number(epoch, &normalize_chain_id(chain)).await?)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OracleEpoch {
    #[serde(default)]
    block_numbers: Vec<OracleBlockNumber>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OracleBlockNumber {
    network: OracleNetwork,
    #[serde(deserialize_with = "flex_u64")]
    block_number: u64,
}

#[derive(Deserialize)]
struct OracleNetwork {
    id: String,
}

/// GraphQL client for the epoch-block oracle subgraph.
pub struct EpochBlockOracle {
    http: Arc<HttpClient>,
    url: String,
}

impl EpochBlockOracle {
    pub fn new(http: Arc<HttpClient>, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

fn block_for_chain(epoch: Option<OracleEpoch>, chain_id: &str) -> Option<u64> {
    epoch?
        .block_numbers
        .into_iter()
        .find(|b| b.network.id.eq_ignore_ascii_case(chain_id))
        .map(|b| b.block_number)
}

#[async_trait]
impl EpochBook for EpochBlockOracle {
    async fn block_number(&self, epoch: u64, chain_id: &str) -> Result<Option<u64>, FetchError> {
        let query = r#"
            query ($epoch: String!) {
              epoch(id: $epoch) {
                epochNumber
                blockNumbers { network { id } blockNumber }
              }
            }
        "#;
        let data = self
            .http
            .graphql(
                &self.url,
                query,
                serde_json::json!({ "epoch": epoch.to_string() }),
            )
            .await?;
        let found: Option<OracleEpoch> = take_field(data, "epoch")?;
        Ok(block_for_chain(found, chain_id))
    }
}
