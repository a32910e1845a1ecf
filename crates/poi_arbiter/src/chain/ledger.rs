//! Ledger block resolver: block number or hash to canonical `{number, hash, timestamp}`.

use crate::chain::bytes::{BlockRef, Bytes32};
use crate::chain::http::{FetchError, HttpClient};
use crate::chain::normalize::{parse_quantity, to_quantity};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockId {
    Number(u64),
    Hash(Bytes32),
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockId::Number(n) => write!(f, "#{}", n),
            BlockId::Hash(h) => write!(f, "{}", h),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub number: u64,
    pub hash: Bytes32,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl Block {
    pub fn block_ref(&self) -> BlockRef {
        BlockRef {
            number: self.number,
            hash: self.hash,
        }
    }
}

/// Read-only, idempotent block lookup for finalized blocks.
#[async_trait]
pub trait LedgerQuery: Send + Sync {
    async fn block(&self, id: BlockId) -> Result<Block, FetchError>;
}

/// `eth_getBlockByNumber` / `eth_getBlockByHash` over JSON-RPC.
pub struct JsonRpcLedger {
    http: Arc<HttpClient>,
    url: String,
}

#[derive(Deserialize)]
struct RpcBlock {
    number: String,
    hash: String,
    timestamp: String,
}

impl JsonRpcLedger {
    pub fn new(http: Arc<HttpClient>, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl LedgerQuery for JsonRpcLedger {
    async fn block(&self, id: BlockId) -> Result<Block, FetchError> {
        let (method, params) = match id {
            BlockId::Number(n) => (
                "eth_getBlockByNumber",
                serde_json::json!([to_quantity(n), false]),
            ),
            BlockId::Hash(h) => ("eth_getBlockByHash", serde_json::json!([h.to_hex(), false])),
        };
        let result = self.http.json_rpc(&self.url, method, params).await?;
        if result.is_null() {
            return Err(FetchError::Missing(format!("block {}", id)));
        }
        let raw: RpcBlock =
            serde_json::from_value(result).map_err(|e| FetchError::malformed("block", e))?;
        let block = parse_rpc_block(raw)?;
        debug!(number = block.number, hash = %block.hash, "block");
        Ok(block)
    }
}

fn parse_rpc_block(raw: RpcBlock) -> Result<Block, FetchError> {
    let number = parse_quantity(&raw.number)?;
    let hash = Bytes32::parse_hex(&raw.hash)?;
    let ts = parse_quantity(&raw.timestamp)?;
    let timestamp = OffsetDateTime::from_unix_timestamp(ts as i64)
        .map_err(|e| FetchError::malformed("block timestamp", e))?;
    Ok(Block {
        number,
        hash,
        timestamp,
    })
}
