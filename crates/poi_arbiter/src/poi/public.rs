//! Live public POIs straight from indexers' status endpoints, compared per epoch.

use crate::chain::bytes::Bytes32;
use crate::chain::http::{take_field, FetchError, HttpClient};
use crate::network::epochs::EpochResolver;
use crate::network::subgraph::NetworkData;
use crate::network::types::{Deployment, Indexer};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

#[async_trait]
pub trait PublicPoiSource: Send + Sync {
    async fn public_poi(
        &self,
        indexer_url: &str,
        deployment: &Deployment,
        block_number: u64,
    ) -> Result<Option<Bytes32>, FetchError>;
}

/// `<indexer url>/status`, with or without a trailing slash on the base.
pub fn status_url(indexer_url: &str) -> Result<url::Url, FetchError> {
    let base = format!("{}/status", indexer_url.trim().trim_end_matches('/'));
    url::Url::parse(&base).map_err(|e| FetchError::malformed("indexer url", e))
}

pub struct IndexerStatusClient {
    http: Arc<HttpClient>,
}

impl IndexerStatusClient {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublicPoiResult {
    #[serde(default)]
    proof_of_indexing: Option<Bytes32>,
}

#[async_trait]
impl PublicPoiSource for IndexerStatusClient {
    async fn public_poi(
        &self,
        indexer_url: &str,
        deployment: &Deployment,
        block_number: u64,
    ) -> Result<Option<Bytes32>, FetchError> {
        let url = status_url(indexer_url)?;
        let query = format!(
            r#"{{ publicProofsOfIndexing(requests: [{{ deployment: "{}", blockNumber: "{}" }}]) {{ proofOfIndexing }} }}"#,
            deployment.ipfs_hash(),
            block_number
        );
        let data = self
            .http
            .graphql(url.as_str(), &query, serde_json::json!({}))
            .await?;
        let results: Option<Vec<PublicPoiResult>> = take_field(data, "publicProofsOfIndexing")?;
        Ok(results
            .and_then(|r| r.into_iter().next())
            .and_then(|r| r.proof_of_indexing))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IndexerPoiRow {
    pub indexer: String,
    pub url: Option<String>,
    pub poi: Option<Bytes32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochPoiRows {
    pub epoch: u64,
    pub block_number: u64,
    pub results: Vec<IndexerPoiRow>,
}

impl EpochPoiRows {
    /// More than one distinct non-null POI among the indexers.
    pub fn is_mismatch(&self) -> bool {
        let distinct: HashSet<Bytes32> = self.results.iter().filter_map(|r| r.poi).collect();
        distinct.len() > 1
    }
}

pub struct PublicPoiQuery<'a> {
    pub epochs: &'a EpochResolver,
    pub network: &'a dyn NetworkData,
    pub source: &'a dyn PublicPoiSource,
}

impl PublicPoiQuery<'_> {
    /// Ask each indexer for its public POI at the start block of each epoch on `chain`.
    /// Epochs the oracle has no block for are skipped; per-indexer failures land in the row.
    pub async fn run(
        &self,
        deployment: &Deployment,
        epochs: &[u64],
        chain: &str,
        indexers: &[String],
    ) -> crate::Result<Vec<EpochPoiRows>> {
        let mut known: HashMap<String, Result<Option<Indexer>, String>> = HashMap::new();
        let mut out = Vec::new();
        for &epoch in epochs {
            let Some(block_number) = self.epochs.chain_block(epoch, chain).await? else {
                warn!(epoch, chain, "no block number for epoch, skipping");
                continue;
            };
            let mut results = Vec::with_capacity(indexers.len());
            for indexer in indexers {
                let id = indexer.to_lowercase();
                let looked_up = match known.get(&id) {
                    Some(cached) => cached.clone(),
                    None => {
                        let fresh = self.network.indexer(&id).await.map_err(|e| e.to_string());
                        known.insert(id, fresh.clone());
                        fresh
                    }
                };
                let row = match looked_up {
                    Ok(Some(info)) => self.row_for(indexer, &info, deployment, block_number).await,
                    Ok(None) => error_row(indexer, None, "Indexer not found"),
                    Err(e) => error_row(indexer, None, &e),
                };
                results.push(row);
            }
            let rows = EpochPoiRows {
                epoch,
                block_number,
                results,
            };
            info!(epoch, block_number, mismatch = rows.is_mismatch(), "public pois");
            out.push(rows);
        }
        Ok(out)
    }

    async fn row_for(
        &self,
        indexer: &str,
        info: &Indexer,
        deployment: &Deployment,
        block_number: u64,
    ) -> IndexerPoiRow {
        let Some(url) = info.url.as_deref().filter(|u| !u.trim().is_empty()) else {
            return error_row(indexer, None, "Indexer has no URL configured");
        };
        match self.source.public_poi(url, deployment, block_number).await {
            Ok(poi) => IndexerPoiRow {
                indexer: indexer.to_string(),
                url: Some(url.to_string()),
                poi,
                error: None,
            },
            Err(e) => error_row(indexer, Some(url), &e.to_string()),
        }
    }
}

fn error_row(indexer: &str, url: Option<&str>, error: &str) -> IndexerPoiRow {
    IndexerPoiRow {
        indexer: indexer.to_string(),
        url: url.map(str::to_string),
        poi: None,
        error: Some(error.to_string()),
    }
}
