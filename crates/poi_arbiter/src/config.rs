//! Arbiter configuration: endpoints, dispute manager, sender account, scanning and HTTP knobs.
//!
//! Load from: env `POI_ARBITER_CONFIG_PATH`, or `./config/poi_arbiter.json`, or `./poi_arbiter.json`.
//! Without a file every field takes its default; command-line flags override on top.

use crate::chain::http::HttpConfig;
use crate::chain::normalize::normalize_address;
use crate::poi::scanner::DEFAULT_CONCURRENCY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_PATH_ENV: &str = "POI_ARBITER_CONFIG_PATH";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{field}: invalid url {value:?}")]
    InvalidUrl { field: &'static str, value: String },
    #[error("{field}: invalid address {value:?}")]
    InvalidAddress { field: &'static str, value: String },
    #[error("{0} is not configured")]
    Missing(&'static str),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ArbiterConfig {
    /// JSON-RPC endpoint of the ledger; also used for transaction submission.
    pub ethereum: String,
    pub network_subgraph_endpoint: String,
    /// Graph-node index-node endpoint answering `proofOfIndexing`.
    pub trusted_subgraph_endpoint: String,
    /// Epoch-block oracle subgraph; needed by `poi query` only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ebo_subgraph_endpoint: Option<String>,
    pub dispute_manager: String,
    /// Sender for committed resolutions; the endpoint signs for it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    pub scan_concurrency: usize,
    pub http: HttpConfig,
    /// SQLite file recording observed POIs across runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poi_cache_path: Option<PathBuf>,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            ethereum: "http://localhost:8545".to_string(),
            network_subgraph_endpoint: String::new(),
            trusted_subgraph_endpoint: "http://localhost:8030/graphql".to_string(),
            ebo_subgraph_endpoint: None,
            dispute_manager: String::new(),
            account: None,
            scan_concurrency: DEFAULT_CONCURRENCY,
            http: HttpConfig::default(),
            poi_cache_path: None,
        }
    }
}

fn check_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Missing(field));
    }
    url::Url::parse(value.trim()).map_err(|_| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
    })?;
    Ok(())
}

impl ArbiterConfig {
    /// Load config from path. A missing or unreadable file is an error here; see [`load`](Self::load).
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load config: env POI_ARBITER_CONFIG_PATH, then ./config/poi_arbiter.json, then
    /// ./poi_arbiter.json, else defaults.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let p = Path::new(&path);
            if p.exists() {
                return Self::load_from_path(p);
            }
        }
        for candidate in [
            Path::new("./config/poi_arbiter.json"),
            Path::new("./poi_arbiter.json"),
        ] {
            if candidate.exists() {
                return Self::load_from_path(candidate);
            }
        }
        Ok(Self::default())
    }

    /// Endpoints every command needs, plus the optional ones when set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("ethereum", &self.ethereum)?;
        check_url("networkSubgraphEndpoint", &self.network_subgraph_endpoint)?;
        check_url("trustedSubgraphEndpoint", &self.trusted_subgraph_endpoint)?;
        if let Some(ebo) = &self.ebo_subgraph_endpoint {
            check_url("eboSubgraphEndpoint", ebo)?;
        }
        if let Some(account) = &self.account {
            normalize_address(account).map_err(|_| ConfigError::InvalidAddress {
                field: "account",
                value: account.clone(),
            })?;
        }
        Ok(())
    }

    /// Normalized dispute manager address; required to build resolution transactions.
    pub fn dispute_manager_address(&self) -> Result<String, ConfigError> {
        if self.dispute_manager.trim().is_empty() {
            return Err(ConfigError::Missing("disputeManager"));
        }
        normalize_address(&self.dispute_manager).map_err(|_| ConfigError::InvalidAddress {
            field: "disputeManager",
            value: self.dispute_manager.clone(),
        })
    }
}
