//! Transaction submitter: sends an unsigned transaction request to a signer-backed endpoint and
//! waits for its receipt. Key management stays with the endpoint (node, Clef, Frame, ...).

use crate::chain::http::{FetchError, HttpClient};
use crate::chain::normalize::parse_quantity;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

const RECEIPT_POLL_MS: u64 = 2_000;
const RECEIPT_MAX_POLLS: u32 = 150;

/// Unsigned transaction request; printed as-is in dry-run mode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    pub to: String,
    pub data: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub success: bool,
    pub block_number: Option<u64>,
}

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("fetch: {0}")]
    Fetch(#[from] FetchError),
    #[error("no sender account configured")]
    NoSender,
    #[error("no receipt for {0} after waiting")]
    Timeout(String),
    #[error("malformed: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    /// Sign, submit and wait for inclusion.
    async fn submit(&self, tx: &UnsignedTransaction) -> Result<TxReceipt, SubmitError>;
}

/// `eth_sendTransaction` followed by `eth_getTransactionReceipt` polling.
pub struct JsonRpcSubmitter {
    http: Arc<HttpClient>,
    url: String,
    from: String,
    poll_interval: Duration,
    max_polls: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: String,
    status: Option<String>,
    block_number: Option<String>,
}

impl JsonRpcSubmitter {
    pub fn new(http: Arc<HttpClient>, url: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            from: from.into(),
            poll_interval: Duration::from_millis(RECEIPT_POLL_MS),
            max_polls: RECEIPT_MAX_POLLS,
        }
    }

    async fn wait_receipt(&self, tx_hash: &str) -> Result<TxReceipt, SubmitError> {
        for _ in 0..self.max_polls {
            let result = self
                .http
                .json_rpc(
                    &self.url,
                    "eth_getTransactionReceipt",
                    serde_json::json!([tx_hash]),
                )
                .await?;
            if !result.is_null() {
                let raw: RpcReceipt = serde_json::from_value(result)
                    .map_err(|e| SubmitError::Malformed(format!("receipt: {}", e)))?;
                return receipt_from_rpc(raw);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        Err(SubmitError::Timeout(tx_hash.to_string()))
    }
}

fn receipt_from_rpc(raw: RpcReceipt) -> Result<TxReceipt, SubmitError> {
    let success = match raw.status.as_deref() {
        Some(s) => parse_quantity(s).map_err(|e| SubmitError::Malformed(e.to_string()))? == 1,
        None => false,
    };
    let block_number = raw
        .block_number
        .as_deref()
        .map(parse_quantity)
        .transpose()
        .map_err(|e| SubmitError::Malformed(e.to_string()))?;
    Ok(TxReceipt {
        tx_hash: raw.transaction_hash,
        success,
        block_number,
    })
}

#[async_trait]
impl TransactionSubmitter for JsonRpcSubmitter {
    async fn submit(&self, tx: &UnsignedTransaction) -> Result<TxReceipt, SubmitError> {
        let request = serde_json::json!([{
            "from": tx.from.as_deref().unwrap_or(&self.from),
            "to": tx.to,
            "data": tx.data,
            "value": tx.value,
        }]);
        let sent = self
            .http
            .json_rpc(&self.url, "eth_sendTransaction", request)
            .await?;
        let tx_hash = sent
            .as_str()
            .ok_or_else(|| SubmitError::Malformed("eth_sendTransaction result".to_string()))?
            .to_string();
        info!(%tx_hash, "transaction sent");
        let receipt = self.wait_receipt(&tx_hash).await?;
        if receipt.success {
            info!(%tx_hash, block = ?receipt.block_number, "transaction succeeded");
        } else {
            warn!(%tx_hash, "transaction failed");
        }
        Ok(receipt)
    }
}
