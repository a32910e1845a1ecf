//! poi_arbiter: proof-of-indexing verification and dispute resolution for indexing-network arbitrators.
//!
//! Fetches reference POIs from a trusted source, cross-checks disputed POIs against plausible
//! reference blocks, groups participants' submissions to spot disagreement, and drives dispute
//! resolution through a dry-run or a submitted transaction. Never computes POIs itself.

pub mod chain;
pub mod config;
pub mod dispute;
pub mod env;
mod error;
pub mod network;
pub mod poi;

#[cfg(test)]
mod testing;

pub use chain::{BlockRef, Bytes32, FetchError, HttpConfig};
pub use config::{ArbiterConfig, ConfigError};
pub use dispute::{
    decode_payload, list_disputes, verify_payload, Confirm, DecodeError, DisputeResolver,
    ResolutionAction, ResolutionOutcome, ResolutionPlan,
};
pub use env::Environment;
pub use error::{Error, Result};
pub use network::{Allocation, Deployment, Dispute, DisputeKind, DisputeStatus, NetworkSettings};
pub use poi::{EpochGroup, Poi, ReferencePolicy, ReferenceSet, ReferenceStatus};
