//! One immutable environment per invocation: the capabilities every operation reads through.

use crate::chain::{
    HttpClient, JsonRpcLedger, JsonRpcSubmitter, LedgerQuery, PoiCache, TransactionSubmitter,
};
use crate::config::ArbiterConfig;
use crate::network::epochs::{EpochBlockOracle, EpochBook, EpochResolver};
use crate::network::subgraph::{NetworkData, NetworkSubgraph};
use crate::poi::public::{IndexerStatusClient, PublicPoiQuery, PublicPoiSource};
use crate::poi::reference::{ReferencePolicy, ReferenceSetBuilder};
use crate::poi::scanner::RangeScanner;
use crate::poi::source::{PoiFetcher, TrustedSubgraph};
use std::sync::Arc;
use tracing::info;

pub struct Environment {
    pub config: ArbiterConfig,
    pub ledger: Arc<dyn LedgerQuery>,
    pub network: Arc<dyn NetworkData>,
    pub epoch_book: Option<Arc<dyn EpochBook>>,
    pub pois: Arc<PoiFetcher>,
    pub public_pois: Arc<dyn PublicPoiSource>,
    /// Present when a sender account is configured.
    pub submitter: Option<Arc<dyn TransactionSubmitter>>,
}

impl Environment {
    /// Build the HTTP-backed capabilities described by `config`.
    pub fn connect(config: ArbiterConfig) -> crate::Result<Self> {
        config.validate()?;
        let http = Arc::new(HttpClient::new(config.http.clone())?);
        let ledger: Arc<dyn LedgerQuery> =
            Arc::new(JsonRpcLedger::new(http.clone(), config.ethereum.clone()));
        let network: Arc<dyn NetworkData> = Arc::new(NetworkSubgraph::new(
            http.clone(),
            config.network_subgraph_endpoint.clone(),
        ));
        let epoch_book = config.ebo_subgraph_endpoint.as_ref().map(|url| {
            Arc::new(EpochBlockOracle::new(http.clone(), url.clone())) as Arc<dyn EpochBook>
        });
        let mut fetcher = PoiFetcher::new(Arc::new(TrustedSubgraph::new(
            http.clone(),
            config.trusted_subgraph_endpoint.clone(),
        )));
        if let Some(path) = &config.poi_cache_path {
            fetcher = fetcher.with_cache(Arc::new(PoiCache::open(path)?));
            info!(path = %path.display(), "poi cache");
        }
        let submitter = config.account.as_ref().map(|account| {
            Arc::new(JsonRpcSubmitter::new(
                http.clone(),
                config.ethereum.clone(),
                account.clone(),
            )) as Arc<dyn TransactionSubmitter>
        });
        Ok(Self {
            public_pois: Arc::new(IndexerStatusClient::new(http)),
            config,
            ledger,
            network,
            epoch_book,
            pois: Arc::new(fetcher),
            submitter,
        })
    }

    pub fn epochs(&self) -> EpochResolver {
        EpochResolver::new(self.network.clone(), self.epoch_book.clone())
    }

    pub fn scanner(&self) -> RangeScanner {
        RangeScanner::new(self.ledger.clone(), self.pois.clone())
            .with_concurrency(self.config.scan_concurrency)
    }

    pub fn references(&self, policy: ReferencePolicy) -> ReferenceSetBuilder {
        ReferenceSetBuilder::new(self.epochs(), self.ledger.clone(), self.pois.clone(), policy)
    }

    pub fn public_query<'a>(&'a self, epochs: &'a EpochResolver) -> PublicPoiQuery<'a> {
        PublicPoiQuery {
            epochs,
            network: self.network.as_ref(),
            source: self.public_pois.as_ref(),
        }
    }
}
