//! Groups POI submissions by epoch, then by public digest. An epoch with more than one digest
//! bucket is a mismatch; a missing public digest is a bucket of its own.

use crate::chain::bytes::Bytes32;
use crate::network::subgraph::{allocations_by_deployment, poi_submissions, NetworkData};
use crate::network::types::{Deployment, PoiSubmission};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AllocationRef {
    pub id: String,
    pub participant: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestGroup {
    pub digest: Option<Bytes32>,
    pub allocations: Vec<AllocationRef>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochGroup {
    pub epoch: u64,
    pub by_digest: Vec<DigestGroup>,
}

impl EpochGroup {
    pub fn is_mismatch(&self) -> bool {
        self.by_digest.len() > 1
    }

    pub fn submission_count(&self) -> usize {
        self.by_digest.iter().map(|g| g.allocations.len()).sum()
    }
}

/// Epochs ascending; digest buckets and allocations in first-seen order.
pub fn group(submissions: &[PoiSubmission]) -> Vec<EpochGroup> {
    let mut by_epoch: BTreeMap<u64, Vec<DigestGroup>> = BTreeMap::new();
    for sub in submissions {
        let buckets = by_epoch.entry(sub.submitted_at_epoch).or_default();
        let allocation = AllocationRef {
            id: sub.allocation_id.clone(),
            participant: sub.participant_id.clone(),
        };
        match buckets.iter_mut().find(|b| b.digest == sub.public_digest) {
            Some(bucket) => bucket.allocations.push(allocation),
            None => buckets.push(DigestGroup {
                digest: sub.public_digest,
                allocations: vec![allocation],
            }),
        }
    }
    by_epoch
        .into_iter()
        .map(|(epoch, by_digest)| EpochGroup { epoch, by_digest })
        .collect()
}

/// Keep submissions whose participant is in `participants` (case-insensitive). Empty keeps all.
pub fn filter_by_participants(
    submissions: Vec<PoiSubmission>,
    participants: &[String],
) -> Vec<PoiSubmission> {
    if participants.is_empty() {
        return submissions;
    }
    let wanted: Vec<String> = participants.iter().map(|p| p.to_lowercase()).collect();
    submissions
        .into_iter()
        .filter(|s| wanted.contains(&s.participant_id.to_lowercase()))
        .collect()
}

/// Every submission for a deployment: allocations first, then their submissions in batches.
pub async fn deployment_submissions(
    data: &dyn NetworkData,
    deployment: &Deployment,
    participants: &[String],
) -> crate::Result<Vec<PoiSubmission>> {
    let allocations = allocations_by_deployment(data, deployment).await?;
    if allocations.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<String> = allocations.into_iter().map(|a| a.id).collect();
    let submissions = filter_by_participants(poi_submissions(data, &ids).await?, participants);
    info!(count = submissions.len(), "submissions after filter");
    Ok(submissions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{allocation, digest, MockNetwork};
    use proptest::prelude::*;
    use std::collections::{BTreeSet, HashMap};

    fn proptest_config() -> ProptestConfig {
        let cases = std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(64);
        ProptestConfig {
            cases,
            ..ProptestConfig::default()
        }
    }

    prop_compose! {
        fn arb_submissions()(entries in prop::collection::vec(
            (0u64..6, prop::option::of(0u8..4), 0u8..4),
            0..48,
        )) -> Vec<PoiSubmission> {
            entries
                .into_iter()
                .enumerate()
                .map(|(i, (epoch, public, participant))| {
                    sub(&i.to_string(), epoch, public, &format!("0x{:02x}", participant))
                })
                .collect()
        }
    }

    proptest! {
        #![proptest_config(proptest_config())]
        #[test]
        fn grouping_invariants_hold(subs in arb_submissions()) {
            let groups = group(&subs);

            for pair in groups.windows(2) {
                prop_assert!(pair[0].epoch < pair[1].epoch);
            }

            let mut seen: HashMap<String, (u64, Option<Bytes32>)> = HashMap::new();
            for g in &groups {
                let digests: BTreeSet<Option<Bytes32>> =
                    g.by_digest.iter().map(|b| b.digest).collect();
                prop_assert_eq!(digests.len(), g.by_digest.len());
                for b in &g.by_digest {
                    prop_assert!(!b.allocations.is_empty());
                    for a in &b.allocations {
                        prop_assert!(seen.insert(a.id.clone(), (g.epoch, b.digest)).is_none());
                    }
                }
            }
            prop_assert_eq!(seen.len(), subs.len());
            for s in &subs {
                prop_assert_eq!(
                    seen.get(&s.allocation_id).copied(),
                    Some((s.submitted_at_epoch, s.public_digest))
                );
            }

            for g in &groups {
                let distinct: BTreeSet<Option<Bytes32>> = subs
                    .iter()
                    .filter(|s| s.submitted_at_epoch == g.epoch)
                    .map(|s| s.public_digest)
                    .collect();
                prop_assert_eq!(g.is_mismatch(), distinct.len() > 1);
            }
        }
    }

    fn sub(id: &str, epoch: u64, public: Option<u8>, participant: &str) -> PoiSubmission {
        PoiSubmission {
            id: id.to_string(),
            digest: public.map(digest),
            public_digest: public.map(digest),
            submitted_at_epoch: epoch,
            allocation_id: format!("alloc-{}", id),
            participant_id: participant.to_string(),
        }
    }

    #[test]
    fn two_epochs_one_mismatch() {
        let subs = vec![
            sub("1", 5, Some(0xa), "0x01"),
            sub("2", 5, Some(0xa), "0x02"),
            sub("3", 5, Some(0xb), "0x03"),
            sub("4", 6, Some(0xc), "0x04"),
        ];
        let groups = group(&subs);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].epoch, 5);
        assert_eq!(groups[0].by_digest.len(), 2);
        assert_eq!(groups[0].by_digest[0].digest, Some(digest(0xa)));
        assert_eq!(groups[0].by_digest[0].allocations.len(), 2);
        assert!(groups[0].is_mismatch());
        assert_eq!(groups[1].epoch, 6);
        assert!(!groups[1].is_mismatch());
    }

    #[test]
    fn epochs_ascending_regardless_of_input_order() {
        let subs = vec![
            sub("1", 9, Some(1), "0x01"),
            sub("2", 3, Some(1), "0x01"),
            sub("3", 7, Some(1), "0x01"),
        ];
        let epochs: Vec<u64> = group(&subs).iter().map(|g| g.epoch).collect();
        assert_eq!(epochs, vec![3, 7, 9]);
    }

    #[test]
    fn null_digest_is_its_own_bucket() {
        let subs = vec![sub("1", 5, Some(1), "0x01"), sub("2", 5, None, "0x02")];
        let groups = group(&subs);
        assert_eq!(groups[0].by_digest.len(), 2);
        assert_eq!(groups[0].by_digest[1].digest, None);
        assert!(groups[0].is_mismatch());
    }

    #[test]
    fn grouping_is_a_lossless_partition() {
        let subs: Vec<PoiSubmission> = (0..60u64)
            .map(|i| {
                let public = if i % 7 == 0 { None } else { Some((i % 3) as u8) };
                sub(&i.to_string(), i % 5, public, &format!("0x{:02x}", i % 4))
            })
            .collect();
        let groups = group(&subs);
        let total: usize = groups.iter().map(EpochGroup::submission_count).sum();
        assert_eq!(total, subs.len());
        let mut ids: Vec<String> = groups
            .iter()
            .flat_map(|g| g.by_digest.iter())
            .flat_map(|b| b.allocations.iter().map(|a| a.id.clone()))
            .collect();
        ids.sort();
        let mut expected: Vec<String> = subs.iter().map(|s| s.allocation_id.clone()).collect();
        expected.sort();
        assert_eq!(ids, expected);
        for g in &groups {
            for b in &g.by_digest {
                for a in &b.allocations {
                    let s = subs.iter().find(|s| s.allocation_id == a.id).unwrap();
                    assert_eq!(s.submitted_at_epoch, g.epoch);
                    assert_eq!(s.public_digest, b.digest);
                }
            }
        }
        assert_eq!(group(&subs), groups);
    }

    #[test]
    fn participant_filter_is_case_insensitive() {
        let subs = vec![sub("1", 5, Some(1), "0xAbC"), sub("2", 5, Some(2), "0xdef")];
        let kept = filter_by_participants(subs.clone(), &["0xabc".to_string()]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "1");
        assert_eq!(filter_by_participants(subs, &[]).len(), 2);
    }

    #[tokio::test]
    async fn submissions_fetched_for_deployment_allocations() {
        let alloc = allocation(1, Some(10), Some(3), None);
        let mut s1 = sub("s1", 3, Some(1), "0x01");
        s1.allocation_id = alloc.id.clone();
        let stray = sub("s2", 3, Some(2), "0x02");
        let network = MockNetwork {
            allocations: vec![alloc.clone()],
            submissions: vec![s1, stray],
            ..MockNetwork::default()
        };
        let subs = deployment_submissions(&network, &alloc.deployment(), &[])
            .await
            .unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].id, "s1");
    }
}
