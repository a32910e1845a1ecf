//! Console rendering of arbiter outputs: dispute tables and trees, grouped POIs, public POI rows,
//! scan results, resolution plans and outcomes. Plain text by default, ANSI colors with `rainbow`.

use poi_arbiter::dispute::DecodedCall;
use poi_arbiter::poi::{
    EpochGroup, EpochPoiRows, PointOutcome, ReferenceSet, ReferenceStatus, ScanItem,
};
use poi_arbiter::{Bytes32, Dispute, ResolutionOutcome, ResolutionPlan};
use serde::Serialize;
use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;
use time::OffsetDateTime;

const SECONDS_PER_DAY: i64 = 86_400;

const RED: &str = "31";
const GREEN: &str = "32";
const YELLOW: &str = "33";
const CYAN: &str = "36";
const BOLD: &str = "1";

#[derive(Clone, Copy, Debug, Default)]
pub struct Style {
    pub rainbow: bool,
}

impl Style {
    pub fn rainbow(enabled: bool) -> Self {
        Self { rainbow: enabled }
    }

    fn paint(&self, code: &str, s: &str) -> String {
        if self.rainbow {
            format!("\x1b[{}m{}\x1b[0m", code, s)
        } else {
            s.to_string()
        }
    }

    fn status(&self, status: ReferenceStatus) -> String {
        let code = match status {
            ReferenceStatus::Match => GREEN,
            ReferenceStatus::NoMatch => RED,
            ReferenceStatus::NotFound => YELLOW,
            ReferenceStatus::NotApplicable => CYAN,
        };
        self.paint(code, &status.to_string())
    }
}

/// Whole days between `created_at` (unix seconds) and `now`; never negative.
pub fn age_in_days(created_at: u64, now: OffsetDateTime) -> i64 {
    let created = i64::try_from(created_at).unwrap_or(i64::MAX);
    (now.unix_timestamp() - created).max(0) / SECONDS_PER_DAY
}

/// One row per dispute: type, id, status, indexer, fisherman.
pub fn dispute_table(disputes: &[Dispute]) -> String {
    let mut out = format!(
        "{:<9} {:<66} {:<10} {:<42} {}\n",
        "TYPE", "ID", "STATUS", "INDEXER", "FISHERMAN"
    );
    for d in disputes {
        let _ = writeln!(
            out,
            "{:<9} {:<66} {:<10} {:<42} {}",
            d.kind, d.id, d.status, d.participant.id, d.challenger.id
        );
    }
    if disputes.is_empty() {
        out.push_str("(no disputes)\n");
    }
    out
}

/// Tree view of a dispute with its reference check.
pub fn dispute_tree(
    dispute: &Dispute,
    references: &ReferenceSet,
    now: OffsetDateTime,
    style: Style,
) -> String {
    let mut out = style.paint(BOLD, &format!("{} dispute {}", dispute.kind, dispute.id));
    out.push('\n');
    let _ = writeln!(
        out,
        "├─ Status: {} ({} days old)",
        dispute.status,
        age_in_days(dispute.created_at, now)
    );
    let _ = writeln!(out, "├─ Indexer: {}", dispute.participant.id);
    let _ = writeln!(out, "├─ Fisherman: {}", dispute.challenger.id);
    if let Some(related) = &dispute.related_dispute {
        let _ = writeln!(out, "├─ Related dispute: {}", related.id);
    }
    if let Some(allocation) = &dispute.allocation {
        let deployment = allocation.deployment();
        let _ = writeln!(
            out,
            "├─ Deployment: {} ({})",
            deployment,
            deployment.ipfs_hash()
        );
        let _ = writeln!(out, "├─ Allocation: {}", allocation.id);
        let created_block = allocation
            .created_at_block_number
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".to_string());
        let _ = writeln!(
            out,
            "│  ├─ Created: epoch {}, block {}",
            allocation.created_at_epoch, created_block
        );
        match allocation.closed_at_epoch {
            Some(epoch) => {
                let closed_block = allocation
                    .closed_at_block_number
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "?".to_string());
                let _ = writeln!(out, "│  └─ Closed: epoch {}, block {}", epoch, closed_block);
            }
            None => out.push_str("│  └─ Closed: still open\n"),
        }
        let submitted = references
            .submitted
            .map(|p| p.to_string())
            .unwrap_or_else(|| "none".to_string());
        let _ = writeln!(
            out,
            "├─ Submitted POI: {} [{}]",
            submitted,
            style.status(references.status)
        );
    }
    let _ = writeln!(out, "└─ References ({:?})", references.policy);
    out.push_str(&reference_table(references, style, "   "));
    out
}

fn reference_table(references: &ReferenceSet, style: Style, indent: &str) -> String {
    if references.points.is_empty() {
        return format!("{}(none)\n", indent);
    }
    let mut out = String::new();
    for point in &references.points {
        let epoch = point
            .epoch
            .map(|e| e.to_string())
            .unwrap_or_else(|| "-".to_string());
        let block = point
            .block
            .map(|b| b.number.to_string())
            .unwrap_or_else(|| "-".to_string());
        let poi = point
            .reference
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        let verdict = match &point.outcome {
            PointOutcome::Match => style.paint(GREEN, "match"),
            PointOutcome::Mismatch => style.paint(RED, "mismatch"),
            PointOutcome::Unavailable(reason) => {
                style.paint(YELLOW, &format!("unavailable: {}", reason))
            }
        };
        let kind = point.kind.to_string();
        let _ = writeln!(
            out,
            "{}{:<30} epoch {:<6} block {:<10} {} {}",
            indent,
            kind,
            epoch,
            block,
            poi,
            verdict
        );
    }
    out
}

/// Grouped submissions; epochs whose public POIs disagree are tagged `[POI MISMATCH]`.
pub fn poi_groups(groups: &[EpochGroup], style: Style) -> String {
    let mut out = String::new();
    for group in groups {
        let mut header = format!("Epoch {}", group.epoch);
        if group.is_mismatch() {
            header.push(' ');
            header.push_str(&style.paint(RED, "[POI MISMATCH]"));
        }
        out.push_str(&header);
        out.push('\n');
        for bucket in &group.by_digest {
            let digest = bucket
                .digest
                .map(|d| d.to_string())
                .unwrap_or_else(|| "(no public POI)".to_string());
            let _ = writeln!(out, "  {}", digest);
            for allocation in &bucket.allocations {
                let _ = writeln!(
                    out,
                    "    allocation {} indexer {}",
                    allocation.id, allocation.participant
                );
            }
        }
    }
    if groups.is_empty() {
        out.push_str("(no submissions)\n");
    }
    out
}

/// Live public POIs per epoch, one line per indexer.
pub fn public_poi_rows(rows: &[EpochPoiRows], style: Style) -> String {
    let mut out = String::new();
    for epoch in rows {
        let mut header = format!("Epoch {} (block {})", epoch.epoch, epoch.block_number);
        if epoch.is_mismatch() {
            header.push(' ');
            header.push_str(&style.paint(RED, "[POI MISMATCH]"));
        }
        out.push_str(&header);
        out.push('\n');
        for row in &epoch.results {
            let value = match (&row.error, row.poi) {
                (Some(error), _) => style.paint(YELLOW, error),
                (None, Some(poi)) => poi.to_string(),
                (None, None) => "null".to_string(),
            };
            let _ = writeln!(out, "  {:<42} {}", row.indexer, value);
        }
    }
    out
}

/// One line for a scanned block.
pub fn scan_line(item: &ScanItem) -> String {
    match &item.outcome {
        Ok(Some(poi)) => format!("{} {} {}", item.block_number, poi.block.hash, poi.digest),
        Ok(None) => format!("{} no poi", item.block_number),
        Err(e) => format!("{} error: {}", item.block_number, e),
    }
}

/// JSON form of a scanned block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRow {
    pub block_number: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<Bytes32>,
    pub poi: Option<Bytes32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ScanItem> for ScanRow {
    fn from(item: &ScanItem) -> Self {
        let (block_hash, poi, error) = match &item.outcome {
            Ok(Some(poi)) => (Some(poi.block.hash), Some(poi.digest), None),
            Ok(None) => (None, None, None),
            Err(e) => (None, None, Some(e.to_string())),
        };
        Self {
            block_number: item.block_number,
            block_hash,
            poi,
            error,
        }
    }
}

/// What the operator is asked to confirm.
pub fn resolution_plan(plan: &ResolutionPlan, now: OffsetDateTime, style: Style) -> String {
    let mut out = dispute_tree(&plan.dispute, &plan.references, now, style);
    let _ = writeln!(out, "Action: {}", plan.action);
    let _ = writeln!(out, "Call: {}", plan.call);
    let _ = writeln!(out, "To: {}", plan.transaction.to);
    if plan.statute_expired {
        out.push_str(&style.paint(YELLOW, "Statute of limitations: expired"));
        out.push('\n');
    }
    out
}

pub fn resolution_outcome(outcome: &ResolutionOutcome) -> Result<String, ReportError> {
    Ok(match outcome {
        ResolutionOutcome::Declined => "Resolution declined; nothing was sent.".to_string(),
        ResolutionOutcome::StatuteExpired { advisory } => advisory.to_string(),
        ResolutionOutcome::DryRun { transaction } => format!(
            "Dry run; unsigned transaction:\n{}",
            to_json(transaction)?
        ),
        ResolutionOutcome::Submitted { receipt } => {
            let verdict = if receipt.success { "succeeded" } else { "failed" };
            match receipt.block_number {
                Some(block) => format!(
                    "Transaction {} {} in block {}",
                    receipt.tx_hash, verdict, block
                ),
                None => format!("Transaction {} {}", receipt.tx_hash, verdict),
            }
        }
    })
}

pub fn decoded_call(call: &DecodedCall) -> String {
    let mut out = String::new();
    if let Some(to) = &call.to {
        let _ = writeln!(out, "To: {}", to);
    }
    let _ = writeln!(out, "Function: {}", call.function);
    for arg in &call.arguments {
        let _ = writeln!(out, "  {} ({}): {}", arg.name, arg.kind, arg.value);
    }
    out
}

pub fn to_json<T: Serialize>(value: &T) -> Result<String, ReportError> {
    serde_json::to_string_pretty(value).map_err(ReportError::Json)
}

/// Write `value` as pretty JSON to `out_path`.
pub fn write_json<T: Serialize>(value: &T, out_path: impl AsRef<Path>) -> Result<(), ReportError> {
    let json = to_json(value)?;
    let mut f = std::fs::File::create(out_path.as_ref()).map_err(ReportError::Io)?;
    f.write_all(json.as_bytes()).map_err(ReportError::Io)?;
    f.write_all(b"\n").map_err(ReportError::Io)?;
    Ok(())
}

#[derive(Debug)]
pub enum ReportError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for ReportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportError::Io(e) => write!(f, "io: {}", e),
            ReportError::Json(e) => write!(f, "json: {}", e),
        }
    }
}

impl std::error::Error for ReportError {}

#[cfg(test)]
mod tests {
    use super::*;
    use poi_arbiter::chain::{BlockRef, TxReceipt, UnsignedTransaction};
    use poi_arbiter::network::{DeploymentRef, EntityRef, PoiSubmission};
    use poi_arbiter::poi::{group, IndexerPoiRow, ReferenceKind, ReferencePoint};
    use poi_arbiter::{
        Allocation, Deployment, DisputeKind, DisputeStatus, FetchError, Poi, ReferencePolicy,
    };

    fn digest(b: u8) -> Bytes32 {
        Bytes32::new([b; 32])
    }

    fn dispute() -> Dispute {
        Dispute {
            id: digest(0x11),
            kind: DisputeKind::Indexing,
            status: DisputeStatus::Undecided,
            participant: EntityRef { id: "0xindexer".into() },
            challenger: EntityRef { id: "0xfisherman".into() },
            created_at: 1_700_000_000,
            allocation: Some(Allocation {
                id: "0xalloc".into(),
                indexer: EntityRef { id: "0xindexer".into() },
                subgraph_deployment: DeploymentRef {
                    id: Deployment::from_bytes32(digest(0xab)),
                },
                created_at_epoch: 10,
                created_at_block_hash: None,
                created_at_block_number: Some(1000),
                closed_at_epoch: Some(12),
                closed_at_block_hash: None,
                closed_at_block_number: None,
                poi: Some(digest(0xde)),
                indexing_rewards: None,
            }),
            related_dispute: None,
        }
    }

    fn references(status: ReferenceStatus) -> ReferenceSet {
        ReferenceSet {
            dispute_id: digest(0x11),
            deployment: Some(Deployment::from_bytes32(digest(0xab))),
            submitted: Some(digest(0xde)),
            policy: ReferencePolicy::Extended,
            points: vec![
                ReferencePoint {
                    kind: ReferenceKind::ClosedEpochStart,
                    epoch: Some(12),
                    block: Some(BlockRef {
                        number: 1200,
                        hash: digest(0xc2),
                    }),
                    reference: Some(digest(0xde)),
                    outcome: PointOutcome::Match,
                },
                ReferencePoint {
                    kind: ReferenceKind::CreationBlock,
                    epoch: None,
                    block: None,
                    reference: None,
                    outcome: PointOutcome::Unavailable("timeout".into()),
                },
            ],
            status,
        }
    }

    fn now() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000 + 3 * SECONDS_PER_DAY + 60).unwrap()
    }

    #[test]
    fn age_is_whole_days_and_never_negative() {
        assert_eq!(age_in_days(1_700_000_000, now()), 3);
        assert_eq!(age_in_days(u64::MAX, now()), 0);
    }

    #[test]
    fn tree_shows_status_age_and_points() {
        let text = dispute_tree(
            &dispute(),
            &references(ReferenceStatus::Match),
            now(),
            Style::default(),
        );
        assert!(text.contains("Indexing dispute 0x1111"));
        assert!(text.contains("Undecided (3 days old)"));
        assert!(text.contains("epoch 12, block ?"));
        assert!(text.contains(&Deployment::from_bytes32(digest(0xab)).ipfs_hash()));
        assert!(text.contains("[match]"));
        assert!(text.contains("unavailable: timeout"));
        assert!(!text.contains('\x1b'));
    }

    #[test]
    fn rainbow_adds_ansi_colors() {
        let text = dispute_tree(
            &dispute(),
            &references(ReferenceStatus::NoMatch),
            now(),
            Style::rainbow(true),
        );
        assert!(text.contains("\x1b[31mno match\x1b[0m"));
    }

    #[test]
    fn table_lists_every_dispute() {
        let text = dispute_table(&[dispute(), dispute()]);
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains("0xfisherman"));
        assert!(dispute_table(&[]).contains("(no disputes)"));
    }

    #[test]
    fn mismatching_epoch_is_tagged() {
        let sub = |epoch: u64, public: u8, alloc: &str| PoiSubmission {
            id: format!("{}-{}", alloc, epoch),
            digest: None,
            public_digest: Some(digest(public)),
            submitted_at_epoch: epoch,
            allocation_id: alloc.into(),
            participant_id: "0xindexer".into(),
        };
        let groups = group(&[sub(5, 1, "a"), sub(5, 2, "b"), sub(6, 3, "c")]);
        let text = poi_groups(&groups, Style::default());
        let lines: Vec<&str> = text.lines().filter(|l| l.starts_with("Epoch")).collect();
        assert_eq!(lines, vec!["Epoch 5 [POI MISMATCH]", "Epoch 6"]);
    }

    #[test]
    fn public_rows_show_errors_inline() {
        let rows = vec![EpochPoiRows {
            epoch: 7,
            block_number: 700,
            results: vec![
                IndexerPoiRow {
                    indexer: "0xa".into(),
                    url: Some("https://a.example".into()),
                    poi: Some(digest(1)),
                    error: None,
                },
                IndexerPoiRow {
                    indexer: "0xb".into(),
                    url: None,
                    poi: None,
                    error: Some("Indexer has no URL configured".into()),
                },
            ],
        }];
        let text = public_poi_rows(&rows, Style::default());
        assert!(text.starts_with("Epoch 7 (block 700)\n"));
        assert!(text.contains("Indexer has no URL configured"));
        assert!(!text.contains("MISMATCH"));
    }

    #[test]
    fn scan_lines() {
        let poi = Poi {
            digest: digest(9),
            block: BlockRef {
                number: 42,
                hash: digest(4),
            },
        };
        let hit = ScanItem {
            block_number: 42,
            outcome: Ok(Some(poi)),
        };
        assert!(scan_line(&hit).starts_with("42 0x0404"));
        let miss = ScanItem {
            block_number: 43,
            outcome: Err(FetchError::GraphQl("boom".into())),
        };
        assert!(scan_line(&miss).starts_with("43 error:"));
        let row = ScanRow::from(&miss);
        assert_eq!(row.error.as_deref(), Some("graphql: boom"));
        assert_eq!(ScanRow::from(&hit).poi, Some(digest(9)));
    }

    #[test]
    fn outcomes_are_distinct() {
        let declined = resolution_outcome(&ResolutionOutcome::Declined).unwrap();
        let dry = resolution_outcome(&ResolutionOutcome::DryRun {
            transaction: UnsignedTransaction {
                to: "0xdd".into(),
                data: "0x00".into(),
                value: "0x0".into(),
                from: None,
            },
        })
        .unwrap();
        let sent = resolution_outcome(&ResolutionOutcome::Submitted {
            receipt: TxReceipt {
                tx_hash: "0xfeed".into(),
                success: false,
                block_number: Some(5),
            },
        })
        .unwrap();
        assert!(declined.contains("declined"));
        assert!(dry.contains("\"to\": \"0xdd\""));
        assert_eq!(sent, "Transaction 0xfeed failed in block 5");
    }
}
