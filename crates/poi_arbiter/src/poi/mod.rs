//! POI engine: trusted sources, range scanning, reference sets, submission grouping, public POIs.

pub mod grouper;
pub mod public;
pub mod reference;
pub mod scanner;
pub mod source;
pub mod types;

pub use grouper::{group, DigestGroup, EpochGroup};
pub use public::{EpochPoiRows, IndexerPoiRow, IndexerStatusClient, PublicPoiQuery, PublicPoiSource};
pub use reference::{
    PointOutcome, ReferenceKind, ReferencePoint, ReferencePolicy, ReferenceSet,
    ReferenceSetBuilder, ReferenceStatus,
};
pub use scanner::{CancelToken, RangeScanner, ScanControl, ScanItem, ScanSummary};
pub use source::{PoiFetcher, PoiSource, TrustedSubgraph};
pub use types::Poi;
