//! Ledger access, HTTP transport, transaction submission, POI observation cache, and normalization.

pub mod bytes;
mod cache;
pub mod http;
pub mod ledger;
pub mod normalize;
pub mod submitter;

pub use bytes::{BlockRef, Bytes32};
pub use cache::{CacheError, Observation, PoiCache};
pub use http::{FetchError, HttpClient, HttpConfig};
pub use ledger::{Block, BlockId, JsonRpcLedger, LedgerQuery};
pub use normalize::NormalizeError;
pub use submitter::{JsonRpcSubmitter, SubmitError, TransactionSubmitter, TxReceipt, UnsignedTransaction};
