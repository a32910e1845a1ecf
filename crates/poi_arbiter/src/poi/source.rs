//! Trusted POI sources and the fetcher that guards their answers.
//!
//! A POI for (deployment, block, indexer, source) must not change. The fetcher remembers every
//! digest it sees for the lifetime of the value, plus across runs when a [`PoiCache`] is attached,
//! and reports a changed answer as [`FetchError::Divergent`].

use crate::chain::bytes::{BlockRef, Bytes32};
use crate::chain::http::{take_field, FetchError, HttpClient};
use crate::chain::{Observation, PoiCache};
use crate::network::types::Deployment;
use crate::poi::types::Poi;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

#[async_trait]
pub trait PoiSource: Send + Sync {
    /// Stable name, part of the observation key.
    fn name(&self) -> &str;

    /// POI the source computes for `indexer` at `block`; `None` when it has none.
    async fn proof_of_indexing(
        &self,
        deployment: &Deployment,
        block: &BlockRef,
        indexer: &str,
    ) -> Result<Option<Bytes32>, FetchError>;
}

/// Graph-node indexing-status endpoint used as the reference.
pub struct TrustedSubgraph {
    http: Arc<HttpClient>,
    url: String,
}

impl TrustedSubgraph {
    pub fn new(http: Arc<HttpClient>, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl PoiSource for TrustedSubgraph {
    fn name(&self) -> &str {
        "trusted"
    }

    async fn proof_of_indexing(
        &self,
        deployment: &Deployment,
        block: &BlockRef,
        indexer: &str,
    ) -> Result<Option<Bytes32>, FetchError> {
        let query = r#"
            query ($subgraph: String!, $blockHash: String!, $blockNumber: Int!, $indexer: String!) {
              proofOfIndexing(
                subgraph: $subgraph
                blockHash: $blockHash
                blockNumber: $blockNumber
                indexer: $indexer
              )
            }
        "#;
        let data = self
            .http
            .graphql(
                &self.url,
                query,
                serde_json::json!({
                    "subgraph": deployment.ipfs_hash(),
                    "blockHash": block.hash.to_hex(),
                    "blockNumber": block.number,
                    "indexer": indexer.to_lowercase(),
                }),
            )
            .await?;
        take_field(data, "proofOfIndexing")
    }
}

pub struct PoiFetcher {
    source: Arc<dyn PoiSource>,
    observed: Mutex<HashMap<String, Bytes32>>,
    cache: Option<Arc<PoiCache>>,
}

impl PoiFetcher {
    pub fn new(source: Arc<dyn PoiSource>) -> Self {
        Self {
            source,
            observed: Mutex::new(HashMap::new()),
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<PoiCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub async fn fetch(
        &self,
        deployment: &Deployment,
        block: &BlockRef,
        indexer: &str,
    ) -> Result<Option<Poi>, FetchError> {
        let digest = self
            .source
            .proof_of_indexing(deployment, block, indexer)
            .await?;
        let Some(digest) = digest else {
            debug!(block = block.number, indexer, "no poi");
            return Ok(None);
        };
        self.check_consistent(deployment, block, indexer, digest)?;
        Ok(Some(Poi {
            digest,
            block: *block,
        }))
    }

    fn check_consistent(
        &self,
        deployment: &Deployment,
        block: &BlockRef,
        indexer: &str,
        digest: Bytes32,
    ) -> Result<(), FetchError> {
        let key = PoiCache::key_for(
            &deployment.to_string(),
            &block.hash.to_hex(),
            indexer,
            self.source.name(),
        );
        {
            let mut observed = self.observed.lock().unwrap_or_else(|e| e.into_inner());
            match observed.get(&key) {
                Some(first) if *first != digest => {
                    return Err(divergent(key, first.to_hex(), digest));
                }
                Some(_) => return Ok(()),
                None => {
                    observed.insert(key.clone(), digest);
                }
            }
        }
        let Some(cache) = &self.cache else {
            return Ok(());
        };
        match cache.recorded(&key)? {
            Some(first) if !first.eq_ignore_ascii_case(&digest.to_hex()) => {
                Err(divergent(key, first, digest))
            }
            Some(_) => Ok(()),
            None => {
                cache.record(
                    &key,
                    &Observation {
                        deployment: deployment.to_string(),
                        block_number: block.number,
                        block_hash: block.hash.to_hex(),
                        indexer: indexer.to_lowercase(),
                        source: self.source.name().to_string(),
                        digest: digest.to_hex(),
                    },
                )?;
                Ok(())
            }
        }
    }
}

fn divergent(key: String, first: String, now: Bytes32) -> FetchError {
    warn!(%key, %first, now = %now, "trusted source changed its poi");
    FetchError::Divergent {
        key,
        first,
        now: now.to_hex(),
    }
}
