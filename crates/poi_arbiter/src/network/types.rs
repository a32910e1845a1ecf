//! Network dataset entities: deployments, allocations, epochs, disputes, POI submissions, settings.
//!
//! Field names follow the network subgraph schema (camelCase); integer fields accept either JSON
//! numbers or decimal strings since BigInt columns are serialized as strings.

use crate::chain::bytes::Bytes32;
use crate::chain::normalize::NormalizeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Multihash prefix for sha2-256 with a 32-byte digest.
const MULTIHASH_SHA256: [u8; 2] = [0x12, 0x20];

/// Content-addressed data feed id. Canonical form is the 32-byte digest; `Qm…` is the IPFS form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Deployment(Bytes32);

impl Deployment {
    pub fn from_bytes32(id: Bytes32) -> Self {
        Self(id)
    }

    pub fn bytes32(&self) -> Bytes32 {
        self.0
    }

    pub fn ipfs_hash(&self) -> String {
        let mut raw = Vec::with_capacity(34);
        raw.extend_from_slice(&MULTIHASH_SHA256);
        raw.extend_from_slice(self.0.as_bytes());
        bs58::encode(raw).into_string()
    }

    /// Accepts `0x…` (64 hex digits) or `Qm…` (base58 sha2-256 multihash).
    pub fn parse(s: &str) -> Result<Self, NormalizeError> {
        let s = s.trim();
        if s.starts_with("Qm") {
            let raw = bs58::decode(s)
                .into_vec()
                .map_err(|_| NormalizeError::InvalidDeployment(s.to_string()))?;
            if raw.len() != 34 || raw[..2] != MULTIHASH_SHA256 {
                return Err(NormalizeError::InvalidDeployment(s.to_string()));
            }
            let mut bytes = [0u8; 32];
            bytes.copy_from_slice(&raw[2..]);
            return Ok(Self(Bytes32::new(bytes)));
        }
        Bytes32::parse_hex(s)
            .map(Self)
            .map_err(|_| NormalizeError::InvalidDeployment(s.to_string()))
    }
}

impl FromStr for Deployment {
    type Err = NormalizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Deployment({})", self.ipfs_hash())
    }
}

impl Serialize for Deployment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_hex())
    }
}

impl<'de> Deserialize<'de> for Deployment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    Text(String),
}

fn number_from(v: NumberOrString) -> Result<u64, String> {
    match v {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::Text(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("not an unsigned integer: {}", s)),
    }
}

pub(crate) fn flex_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    number_from(NumberOrString::deserialize(deserializer)?).map_err(serde::de::Error::custom)
}

pub(crate) fn flex_opt_u64<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<u64>, D::Error> {
    Option::<NumberOrString>::deserialize(deserializer)?
        .map(number_from)
        .transpose()
        .map_err(serde::de::Error::custom)
}

/// `{ id }` reference to another entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRef {
    pub id: Deployment,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Epoch {
    #[serde(deserialize_with = "flex_u64")]
    pub id: u64,
    #[serde(rename = "startBlock", deserialize_with = "flex_u64")]
    pub start_block: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub id: String,
    pub indexer: EntityRef,
    pub subgraph_deployment: DeploymentRef,
    #[serde(deserialize_with = "flex_u64")]
    pub created_at_epoch: u64,
    #[serde(default)]
    pub created_at_block_hash: Option<Bytes32>,
    #[serde(default, deserialize_with = "flex_opt_u64")]
    pub created_at_block_number: Option<u64>,
    #[serde(default, deserialize_with = "flex_opt_u64")]
    pub closed_at_epoch: Option<u64>,
    #[serde(default)]
    pub closed_at_block_hash: Option<Bytes32>,
    #[serde(default, deserialize_with = "flex_opt_u64")]
    pub closed_at_block_number: Option<u64>,
    /// POI submitted when the allocation was closed; the value under dispute.
    #[serde(default)]
    pub poi: Option<Bytes32>,
    #[serde(default)]
    pub indexing_rewards: Option<String>,
}

impl Allocation {
    pub fn deployment(&self) -> Deployment {
        self.subgraph_deployment.id
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisputeKind {
    #[serde(alias = "IndexingDispute")]
    Indexing,
    #[serde(alias = "QueryDispute")]
    Query,
}

impl fmt::Display for DisputeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisputeKind::Indexing => f.write_str("Indexing"),
            DisputeKind::Query => f.write_str("Query"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisputeStatus {
    Undecided,
    Accepted,
    Rejected,
    Draw,
    Cancelled,
}

impl DisputeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DisputeStatus::Undecided)
    }
}

impl fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DisputeStatus::Undecided => "Undecided",
            DisputeStatus::Accepted => "Accepted",
            DisputeStatus::Rejected => "Rejected",
            DisputeStatus::Draw => "Draw",
            DisputeStatus::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

impl FromStr for DisputeStatus {
    type Err = NormalizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "undecided" => Ok(DisputeStatus::Undecided),
            "accepted" => Ok(DisputeStatus::Accepted),
            "rejected" => Ok(DisputeStatus::Rejected),
            "draw" => Ok(DisputeStatus::Draw),
            "cancelled" => Ok(DisputeStatus::Cancelled),
            _ => Err(NormalizeError::InvalidStatus(s.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dispute {
    pub id: Bytes32,
    #[serde(rename = "type")]
    pub kind: DisputeKind,
    pub status: DisputeStatus,
    /// Participant the dispute is filed against.
    #[serde(rename = "indexer")]
    pub participant: EntityRef,
    #[serde(rename = "fisherman")]
    pub challenger: EntityRef,
    /// Unix timestamp (seconds).
    #[serde(deserialize_with = "flex_u64")]
    pub created_at: u64,
    /// Present for indexing disputes only.
    #[serde(default)]
    pub allocation: Option<Allocation>,
    /// Linked dispute resolved together with this one by a conflict acceptance.
    #[serde(default)]
    pub related_dispute: Option<EntityRef>,
}

impl Dispute {
    pub fn closed_at_epoch(&self) -> Option<u64> {
        self.allocation.as_ref().and_then(|a| a.closed_at_epoch)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSettings {
    #[serde(deserialize_with = "flex_u64")]
    pub current_epoch: u64,
    #[serde(deserialize_with = "flex_u64")]
    pub epoch_length: u64,
    #[serde(default, deserialize_with = "flex_u64")]
    pub thawing_period: u64,
    #[serde(default, deserialize_with = "flex_opt_u64")]
    pub max_thawing_period: Option<u64>,
    #[serde(default, deserialize_with = "flex_u64")]
    pub slashing_percentage: u64,
}

impl NetworkSettings {
    /// `maxThawingPeriod` when the network reports one, else `thawingPeriod`.
    pub fn effective_thawing_period(&self) -> u64 {
        self.max_thawing_period.unwrap_or(self.thawing_period)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indexer {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// One POI submitted by a participant when closing or presenting an allocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PoiSubmission {
    pub id: String,
    pub digest: Option<Bytes32>,
    pub public_digest: Option<Bytes32>,
    pub submitted_at_epoch: u64,
    pub allocation_id: String,
    pub participant_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPoiSubmission {
    id: String,
    #[serde(default)]
    poi: Option<Bytes32>,
    #[serde(default)]
    public_poi: Option<Bytes32>,
    #[serde(deserialize_with = "flex_u64")]
    submitted_at_epoch: u64,
    allocation: RawSubmissionAllocation,
}

#[derive(Deserialize)]
struct RawSubmissionAllocation {
    id: String,
    indexer: EntityRef,
}

impl<'de> Deserialize<'de> for PoiSubmission {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawPoiSubmission::deserialize(deserializer)?;
        Ok(PoiSubmission {
            id: raw.id,
            digest: raw.poi,
            public_digest: raw.public_poi,
            submitted_at_epoch: raw.submitted_at_epoch,
            allocation_id: raw.allocation.id,
            participant_id: raw.allocation.indexer.id,
        })
    }
}
