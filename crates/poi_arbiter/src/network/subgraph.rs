//! Network dataset queries (GraphQL) with cursor pagination.
//!
//! List queries page by identifier: `first: N, where: { id_gt: cursor }, orderBy: id, asc`.
//! A page shorter than N ends the listing.

use crate::chain::bytes::Bytes32;
use crate::chain::http::{take_field, FetchError, HttpClient};
use crate::network::types::{
    Allocation, Deployment, Dispute, Epoch, Indexer, NetworkSettings, PoiSubmission,
};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

pub const PAGE_SIZE: usize = 1000;
/// Allocation ids per submission query; bounds the query payload.
pub const ALLOCATION_BATCH: usize = 100;

#[async_trait]
pub trait NetworkData: Send + Sync {
    async fn network_settings(&self) -> Result<NetworkSettings, FetchError>;
    async fn epoch(&self, number: u64) -> Result<Option<Epoch>, FetchError>;
    async fn dispute(&self, id: &Bytes32) -> Result<Option<Dispute>, FetchError>;
    async fn disputes_page(&self, first: usize, id_gt: &str) -> Result<Vec<Dispute>, FetchError>;
    async fn allocation(&self, id: &str) -> Result<Option<Allocation>, FetchError>;
    async fn allocations_page(
        &self,
        deployment: &Deployment,
        first: usize,
        id_gt: &str,
    ) -> Result<Vec<Allocation>, FetchError>;
    async fn poi_submissions_page(
        &self,
        allocation_ids: &[String],
        first: usize,
        id_gt: &str,
    ) -> Result<Vec<PoiSubmission>, FetchError>;
    async fn indexer(&self, id: &str) -> Result<Option<Indexer>, FetchError>;
}

/// Drain a cursor-paginated listing. `fetch_page` receives the last-seen id ("" for the first page).
pub async fn paginate<T, F, Fut>(
    page_size: usize,
    mut fetch_page: F,
    id_of: impl Fn(&T) -> String,
) -> Result<Vec<T>, FetchError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Vec<T>, FetchError>>,
{
    let page_size = page_size.max(1);
    let mut out = Vec::new();
    let mut cursor = String::new();
    loop {
        let page = fetch_page(cursor.clone()).await?;
        let len = page.len();
        if let Some(last) = page.last() {
            cursor = id_of(last);
        }
        out.extend(page);
        debug!(len, total = out.len(), "page");
        if len < page_size {
            break;
        }
    }
    Ok(out)
}

pub async fn all_disputes(data: &dyn NetworkData) -> Result<Vec<Dispute>, FetchError> {
    let mut disputes = paginate(
        PAGE_SIZE,
        |cursor| async move { data.disputes_page(PAGE_SIZE, &cursor).await },
        |d: &Dispute| d.id.to_hex(),
    )
    .await?;
    disputes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    Ok(disputes)
}

pub async fn allocations_by_deployment(
    data: &dyn NetworkData,
    deployment: &Deployment,
) -> Result<Vec<Allocation>, FetchError> {
    let allocations = paginate(
        PAGE_SIZE,
        |cursor| async move { data.allocations_page(deployment, PAGE_SIZE, &cursor).await },
        |a: &Allocation| a.id.clone(),
    )
    .await?;
    info!(count = allocations.len(), deployment = %deployment.ipfs_hash(), "allocations");
    Ok(allocations)
}

/// Submissions for the given allocations; batches run one after another, each fully paged.
pub async fn poi_submissions(
    data: &dyn NetworkData,
    allocation_ids: &[String],
) -> Result<Vec<PoiSubmission>, FetchError> {
    let mut out = Vec::new();
    for batch in allocation_ids.chunks(ALLOCATION_BATCH) {
        let page = paginate(
            PAGE_SIZE,
            |cursor| async move { data.poi_submissions_page(batch, PAGE_SIZE, &cursor).await },
            |s: &PoiSubmission| s.id.clone(),
        )
        .await?;
        out.extend(page);
    }
    info!(count = out.len(), "poi submissions");
    Ok(out)
}

const ALLOCATION_FIELDS: &str = r#"
    id
    indexer { id }
    subgraphDeployment { id }
    createdAtEpoch
    createdAtBlockHash
    createdAtBlockNumber
    closedAtEpoch
    closedAtBlockHash
    closedAtBlockNumber
    poi
    indexingRewards
"#;

fn dispute_fields() -> String {
    format!(
        r#"
    id
    type
    status
    indexer {{ id }}
    fisherman {{ id }}
    createdAt
    relatedDispute {{ id }}
    allocation {{ {} }}
"#,
        ALLOCATION_FIELDS
    )
}

/// GraphQL client for the network subgraph.
pub struct NetworkSubgraph {
    http: Arc<HttpClient>,
    url: String,
}

impl NetworkSubgraph {
    pub fn new(http: Arc<HttpClient>, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    async fn query(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<serde_json::Value, FetchError> {
        self.http.graphql(&self.url, query, variables).await
    }
}

#[async_trait]
impl NetworkData for NetworkSubgraph {
    async fn network_settings(&self) -> Result<NetworkSettings, FetchError> {
        let query = r#"
            {
              graphNetwork(id: "1") {
                currentEpoch
                epochLength
                thawingPeriod
                maxThawingPeriod
                slashingPercentage
              }
            }
        "#;
        let data = self.query(query, serde_json::json!({})).await?;
        let settings: Option<NetworkSettings> = take_field(data, "graphNetwork")?;
        settings.ok_or_else(|| FetchError::Missing("graphNetwork".to_string()))
    }

    async fn epoch(&self, number: u64) -> Result<Option<Epoch>, FetchError> {
        let query = r#"
            query ($epochID: String!) {
              epoch(id: $epochID) { id startBlock }
            }
        "#;
        let data = self
            .query(query, serde_json::json!({ "epochID": number.to_string() }))
            .await?;
        take_field(data, "epoch")
    }

    async fn dispute(&self, id: &Bytes32) -> Result<Option<Dispute>, FetchError> {
        let query = format!(
            "query ($disputeID: String!) {{ dispute(id: $disputeID) {{ {} }} }}",
            dispute_fields()
        );
        let data = self
            .query(&query, serde_json::json!({ "disputeID": id.to_hex() }))
            .await?;
        take_field(data, "dispute")
    }

    async fn disputes_page(&self, first: usize, id_gt: &str) -> Result<Vec<Dispute>, FetchError> {
        let query = format!(
            "query ($first: Int!, $cursor: String!) {{ disputes(first: $first, where: {{ id_gt: $cursor }}, orderBy: id, orderDirection: asc) {{ {} }} }}",
            dispute_fields()
        );
        let data = self
            .query(&query, serde_json::json!({ "first": first, "cursor": id_gt }))
            .await?;
        take_field::<Option<Vec<Dispute>>>(data, "disputes").map(Option::unwrap_or_default)
    }

    async fn allocation(&self, id: &str) -> Result<Option<Allocation>, FetchError> {
        let query = format!(
            "query ($allocationID: String!) {{ allocation(id: $allocationID) {{ {} }} }}",
            ALLOCATION_FIELDS
        );
        let data = self
            .query(
                &query,
                serde_json::json!({ "allocationID": id.to_lowercase() }),
            )
            .await?;
        take_field(data, "allocation")
    }

    async fn allocations_page(
        &self,
        deployment: &Deployment,
        first: usize,
        id_gt: &str,
    ) -> Result<Vec<Allocation>, FetchError> {
        let query = format!(
            "query ($deployment: String!, $first: Int!, $cursor: String!) {{ allocations(first: $first, where: {{ subgraphDeployment: $deployment, id_gt: $cursor }}, orderBy: id, orderDirection: asc) {{ {} }} }}",
            ALLOCATION_FIELDS
        );
        let data = self
            .query(
                &query,
                serde_json::json!({
                    "deployment": deployment.to_string(),
                    "first": first,
                    "cursor": id_gt,
                }),
            )
            .await?;
        take_field::<Option<Vec<Allocation>>>(data, "allocations").map(Option::unwrap_or_default)
    }

    async fn poi_submissions_page(
        &self,
        allocation_ids: &[String],
        first: usize,
        id_gt: &str,
    ) -> Result<Vec<PoiSubmission>, FetchError> {
        let query = r#"
            query ($allocations: [String!]!, $first: Int!, $cursor: String!) {
              poiSubmissions(
                first: $first
                where: { allocation_in: $allocations, id_gt: $cursor }
                orderBy: id
                orderDirection: asc
              ) {
                id
                poi
                publicPoi
                submittedAtEpoch
                allocation { id indexer { id } }
              }
            }
        "#;
        let data = self
            .query(
                query,
                serde_json::json!({
                    "allocations": allocation_ids,
                    "first": first,
                    "cursor": id_gt,
                }),
            )
            .await?;
        take_field::<Option<Vec<PoiSubmission>>>(data, "poiSubmissions")
            .map(Option::unwrap_or_default)
    }

    async fn indexer(&self, id: &str) -> Result<Option<Indexer>, FetchError> {
        let query = r#"
            query ($indexerID: String!) {
              indexer(id: $indexerID) { id url }
            }
        "#;
        let data = self
            .query(query, serde_json::json!({ "indexerID": id.to_lowercase() }))
            .await?;
        take_field(data, "indexer")
    }
}
