//! Network dataset: entity types, GraphQL queries with pagination, and epoch lookups.

pub mod epochs;
pub mod subgraph;
pub mod types;

pub use epochs::{EpochBlockOracle, EpochBook, EpochResolver};
pub use subgraph::{
    all_disputes, allocations_by_deployment, paginate, poi_submissions, NetworkData,
    NetworkSubgraph, ALLOCATION_BATCH, PAGE_SIZE,
};
pub use types::{
    Allocation, Deployment, DeploymentRef, Dispute, DisputeKind, DisputeStatus, EntityRef, Epoch,
    Indexer, NetworkSettings, PoiSubmission,
};
