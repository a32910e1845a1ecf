use crate::chain::bytes::{BlockRef, Bytes32};
use serde::{Deserialize, Serialize};

/// A proof of indexing at a block. Two POIs are equal when their digests are; the block is metadata.
#[derive(Clone, Copy, Debug, Eq, Serialize, Deserialize)]
pub struct Poi {
    pub digest: Bytes32,
    pub block: BlockRef,
}

impl PartialEq for Poi {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest
    }
}

impl std::hash::Hash for Poi {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.digest.hash(state);
    }
}
