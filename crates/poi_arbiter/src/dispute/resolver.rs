//! Dispute resolution workflow.
//!
//! `prepare` is read-only: it loads the dispute, builds its reference set, evaluates the statute
//! of limitations and encodes the call. The operator then confirms the plan, and `commit` either
//! returns the unsigned request (dry run) or submits it and waits for the receipt.

use crate::chain::bytes::Bytes32;
use crate::chain::submitter::{SubmitError, TxReceipt, UnsignedTransaction};
use crate::config::ArbiterConfig;
use crate::dispute::payload::{decode_payload, DecodedCall, ResolutionCall};
use crate::dispute::statute::{dispute_is_expired, STATUTE_ADVISORY};
use crate::env::Environment;
use crate::network::types::{Dispute, DisputeKind, DisputeStatus, NetworkSettings};
use crate::poi::reference::{ReferencePolicy, ReferenceSet};
use crate::Error;
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    /// Slash the participant by `tokens_slash` (wei).
    Accept { tokens_slash: u128 },
    /// Accept and resolve the related dispute in the same call.
    AcceptConflict {
        tokens_slash: u128,
        accept_related: bool,
        tokens_slash_related: u128,
    },
    Reject,
    Draw,
}

impl ResolutionAction {
    /// Draws are never time-barred.
    pub fn is_statute_gated(&self) -> bool {
        !matches!(self, ResolutionAction::Draw)
    }

    fn call(&self, dispute_id: Bytes32) -> ResolutionCall {
        match *self {
            ResolutionAction::Accept { tokens_slash } => ResolutionCall::Accept {
                dispute_id,
                tokens_slash,
            },
            ResolutionAction::AcceptConflict {
                tokens_slash,
                accept_related,
                tokens_slash_related,
            } => ResolutionCall::AcceptConflict {
                dispute_id,
                tokens_slash,
                accept_related,
                tokens_slash_related,
            },
            ResolutionAction::Reject => ResolutionCall::Reject { dispute_id },
            ResolutionAction::Draw => ResolutionCall::Draw { dispute_id },
        }
    }
}

impl fmt::Display for ResolutionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResolutionAction::Accept { .. } => "accept",
            ResolutionAction::AcceptConflict { .. } => "accept-conflict",
            ResolutionAction::Reject => "reject",
            ResolutionAction::Draw => "draw",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ResolutionPlan {
    pub action: ResolutionAction,
    pub dispute: Dispute,
    pub references: ReferenceSet,
    pub settings: NetworkSettings,
    pub statute_expired: bool,
    pub call: String,
    pub transaction: UnsignedTransaction,
}

impl ResolutionPlan {
    pub fn prompt(&self) -> String {
        format!(
            "You are about to {} dispute {}, confirm?",
            self.action, self.dispute.id
        )
    }
}

/// Operator confirmation of a prepared plan.
pub trait Confirm {
    fn confirm(&self, plan: &ResolutionPlan) -> bool;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ResolutionOutcome {
    Declined,
    StatuteExpired { advisory: &'static str },
    DryRun { transaction: UnsignedTransaction },
    Submitted { receipt: TxReceipt },
}

pub struct DisputeResolver<'a> {
    env: &'a Environment,
    policy: ReferencePolicy,
}

impl<'a> DisputeResolver<'a> {
    pub fn new(env: &'a Environment) -> Self {
        Self {
            env,
            policy: ReferencePolicy::Extended,
        }
    }

    pub fn with_policy(mut self, policy: ReferencePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn prepare(
        &self,
        action: ResolutionAction,
        dispute_id: &Bytes32,
    ) -> crate::Result<ResolutionPlan> {
        let dispute = self
            .env
            .network
            .dispute(dispute_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("dispute {}", dispute_id)))?;
        if dispute.status != DisputeStatus::Undecided {
            return Err(Error::Validation(format!(
                "dispute {} is already {}",
                dispute.id, dispute.status
            )));
        }
        if matches!(action, ResolutionAction::AcceptConflict { .. })
            && dispute.related_dispute.is_none()
        {
            return Err(Error::Validation(format!(
                "dispute {} has no related dispute to resolve in conflict",
                dispute.id
            )));
        }
        let to = self.env.config.dispute_manager_address()?;
        let references = self.env.references(self.policy).build(&dispute).await?;
        let settings = self.env.network.network_settings().await?;
        let statute_expired = action.is_statute_gated()
            && dispute.kind == DisputeKind::Indexing
            && dispute_is_expired(&dispute, &settings);
        let call = action.call(dispute.id);
        let transaction = call.to_transaction(&to, self.env.config.account.clone());
        info!(dispute = %dispute.id, %action, statute_expired, "resolution prepared");
        Ok(ResolutionPlan {
            action,
            dispute,
            references,
            settings,
            statute_expired,
            call: call.to_string(),
            transaction,
        })
    }

    /// Dry run (`execute = false`) or submit. A time-barred plan is refused here as well.
    pub async fn commit(
        &self,
        plan: &ResolutionPlan,
        execute: bool,
    ) -> crate::Result<ResolutionOutcome> {
        if plan.statute_expired {
            warn!(dispute = %plan.dispute.id, "statute of limitations expired");
            return Ok(ResolutionOutcome::StatuteExpired {
                advisory: STATUTE_ADVISORY,
            });
        }
        if !execute {
            return Ok(ResolutionOutcome::DryRun {
                transaction: plan.transaction.clone(),
            });
        }
        let submitter = self.env.submitter.as_ref().ok_or(SubmitError::NoSender)?;
        info!(dispute = %plan.dispute.id, call = %plan.call, "submitting resolution");
        let receipt = submitter.submit(&plan.transaction).await?;
        Ok(ResolutionOutcome::Submitted { receipt })
    }

    /// prepare, confirm, gate, commit.
    pub async fn resolve(
        &self,
        action: ResolutionAction,
        dispute_id: &Bytes32,
        confirm: &dyn Confirm,
        execute: bool,
    ) -> crate::Result<ResolutionOutcome> {
        let plan = self.prepare(action, dispute_id).await?;
        if !confirm.confirm(&plan) {
            info!(dispute = %plan.dispute.id, "declined by operator");
            return Ok(ResolutionOutcome::Declined);
        }
        self.commit(&plan, execute).await
    }
}

/// Decode an unsigned payload without any remote capability. Warns when it targets a contract
/// other than the configured dispute manager; no check is made when none is configured.
pub fn verify_payload(payload: &str, config: &ArbiterConfig) -> crate::Result<DecodedCall> {
    let decoded = decode_payload(payload)?;
    if let (Some(to), Ok(expected)) = (&decoded.to, config.dispute_manager_address()) {
        if !to.eq_ignore_ascii_case(&expected) {
            warn!(%to, %expected, "payload is not addressed to the configured dispute manager");
        }
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::http::{HttpClient, HttpConfig};
    use crate::network::types::EntityRef;
    use crate::poi::public::IndexerStatusClient;
    use crate::poi::reference::ReferenceStatus;
    use crate::poi::source::PoiFetcher;
    use crate::testing::{
        allocation, digest, indexing_dispute, query_dispute, MapSource, MockLedger, MockNetwork,
        RecordingSubmitter,
    };
    use std::cell::Cell;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct Answer {
        yes: bool,
        asked: Cell<usize>,
    }

    impl Answer {
        fn new(yes: bool) -> Self {
            Self {
                yes,
                asked: Cell::new(0),
            }
        }
    }

    impl Confirm for Answer {
        fn confirm(&self, _plan: &ResolutionPlan) -> bool {
            self.asked.set(self.asked.get() + 1);
            self.yes
        }
    }

    fn settings(current: u64) -> NetworkSettings {
        NetworkSettings {
            current_epoch: current,
            epoch_length: 1,
            thawing_period: 50,
            max_thawing_period: None,
            slashing_percentage: 25_000,
        }
    }

    fn setup(disputes: Vec<Dispute>, current_epoch: u64) -> (Environment, Arc<RecordingSubmitter>) {
        let network = MockNetwork {
            settings: Some(settings(current_epoch)),
            disputes,
            ..MockNetwork::default()
        }
        .with_epochs(300, 10);
        let submitter = Arc::new(RecordingSubmitter::default());
        let answers: HashMap<u64, _> = (0..3000).map(|b| (b, digest(0x11))).collect();
        let config = ArbiterConfig {
            dispute_manager: "0x00000000000000000000000000000000000000dd".into(),
            account: Some("0x00000000000000000000000000000000000000ee".into()),
            ..ArbiterConfig::default()
        };
        let http = Arc::new(HttpClient::new(HttpConfig::default()).unwrap());
        let env = Environment {
            config,
            ledger: Arc::new(MockLedger::new()),
            network: Arc::new(network),
            epoch_book: None,
            pois: Arc::new(PoiFetcher::new(Arc::new(MapSource::new(answers)))),
            public_pois: Arc::new(IndexerStatusClient::new(http)),
            submitter: Some(submitter.clone()),
        };
        (env, submitter)
    }

    fn d1() -> Dispute {
        // closed at epoch 100; with current 250, length 1, thawing 50 the statute has run out
        indexing_dispute(1, allocation(90, Some(900), Some(100), Some(digest(0x5a))))
    }

    const ACCEPT: ResolutionAction = ResolutionAction::Accept { tokens_slash: 1 };

    #[tokio::test]
    async fn expired_accept_performs_no_transaction() {
        let (env, submitter) = setup(vec![d1()], 250);
        let resolver = DisputeResolver::new(&env);
        let outcome = resolver
            .resolve(ACCEPT, &d1().id, &Answer::new(true), true)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ResolutionOutcome::StatuteExpired {
                advisory: STATUTE_ADVISORY
            }
        );
        assert_eq!(submitter.sent_count(), 0);
    }

    #[tokio::test]
    async fn expired_plan_is_refused_by_commit() {
        let (env, submitter) = setup(vec![d1()], 250);
        let resolver = DisputeResolver::new(&env);
        let plan = resolver.prepare(ResolutionAction::Reject, &d1().id).await.unwrap();
        assert!(plan.statute_expired);
        let outcome = resolver.commit(&plan, true).await.unwrap();
        assert!(matches!(outcome, ResolutionOutcome::StatuteExpired { .. }));
        assert_eq!(submitter.sent_count(), 0);
    }

    #[tokio::test]
    async fn draw_is_not_gated() {
        let (env, submitter) = setup(vec![d1()], 250);
        let resolver = DisputeResolver::new(&env);
        let outcome = resolver
            .resolve(ResolutionAction::Draw, &d1().id, &Answer::new(true), true)
            .await
            .unwrap();
        assert!(matches!(outcome, ResolutionOutcome::Submitted { .. }));
        assert_eq!(submitter.sent_count(), 1);
    }

    #[tokio::test]
    async fn declined_has_no_side_effects() {
        let (env, submitter) = setup(vec![d1()], 150);
        let resolver = DisputeResolver::new(&env);
        let answer = Answer::new(false);
        let outcome = resolver
            .resolve(ACCEPT, &d1().id, &answer, true)
            .await
            .unwrap();
        assert_eq!(outcome, ResolutionOutcome::Declined);
        assert_eq!(answer.asked.get(), 1);
        assert_eq!(submitter.sent_count(), 0);
    }

    #[tokio::test]
    async fn dry_run_returns_decodable_payload() {
        let (env, submitter) = setup(vec![d1()], 150);
        let resolver = DisputeResolver::new(&env);
        let outcome = resolver
            .resolve(ACCEPT, &d1().id, &Answer::new(true), false)
            .await
            .unwrap();
        let ResolutionOutcome::DryRun { transaction } = outcome else {
            panic!("expected dry run, got {:?}", outcome);
        };
        assert_eq!(submitter.sent_count(), 0);
        assert_eq!(transaction.to, "0x00000000000000000000000000000000000000dd");
        let decoded =
            verify_payload(&serde_json::to_string(&transaction).unwrap(), &env.config).unwrap();
        assert_eq!(decoded.function, "acceptDispute(bytes32,uint256)");
        assert_eq!(decoded.arguments[0].value, d1().id.to_hex());
    }

    #[tokio::test]
    async fn committed_accept_is_submitted() {
        let (env, submitter) = setup(vec![d1()], 150);
        let resolver = DisputeResolver::new(&env);
        let plan = resolver.prepare(ACCEPT, &d1().id).await.unwrap();
        assert_eq!(plan.references.status, ReferenceStatus::NoMatch);
        let outcome = resolver.commit(&plan, true).await.unwrap();
        let ResolutionOutcome::Submitted { receipt } = outcome else {
            panic!("expected submission");
        };
        assert!(receipt.success);
        assert_eq!(submitter.sent_count(), 1);
    }

    #[tokio::test]
    async fn query_disputes_are_never_time_barred() {
        let (env, _) = setup(vec![query_dispute(2)], 100_000);
        let plan = DisputeResolver::new(&env)
            .prepare(ResolutionAction::Reject, &query_dispute(2).id)
            .await
            .unwrap();
        assert!(!plan.statute_expired);
        assert_eq!(plan.references.status, ReferenceStatus::NotApplicable);
    }

    #[tokio::test]
    async fn resolved_or_unknown_disputes_are_rejected() {
        let mut done = d1();
        done.status = DisputeStatus::Accepted;
        let (env, _) = setup(vec![done.clone()], 150);
        let resolver = DisputeResolver::new(&env);
        assert!(matches!(
            resolver.prepare(ACCEPT, &done.id).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            resolver.prepare(ACCEPT, &Bytes32::new([9; 32])).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn conflict_requires_related_dispute() {
        let conflict = ResolutionAction::AcceptConflict {
            tokens_slash: 1,
            accept_related: true,
            tokens_slash_related: 1,
        };
        let (env, _) = setup(vec![d1()], 150);
        assert!(matches!(
            DisputeResolver::new(&env).prepare(conflict, &d1().id).await,
            Err(Error::Validation(_))
        ));

        let mut linked = d1();
        linked.related_dispute = Some(EntityRef {
            id: Bytes32::new([2; 32]).to_hex(),
        });
        let (env, _) = setup(vec![linked.clone()], 150);
        let plan = DisputeResolver::new(&env)
            .prepare(conflict, &linked.id)
            .await
            .unwrap();
        assert!(plan.call.starts_with("acceptDisputeConflict("));
    }

    #[test]
    fn verify_reports_decode_errors() {
        let err = verify_payload("0x1234", &ArbiterConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn verify_needs_no_endpoints() {
        let config = ArbiterConfig::default();
        assert!(config.validate().is_err());
        let call = ResolutionCall::Reject {
            dispute_id: Bytes32::new([7; 32]),
        };
        let manager = format!("0x{}", "9a".repeat(20));
        let envelope = serde_json::to_string(&call.to_transaction(&manager, None)).unwrap();
        let decoded = verify_payload(&envelope, &config).unwrap();
        assert_eq!(decoded.to.as_deref(), Some(manager.as_str()));
        assert_eq!(decoded.call, Some(call));

        let calldata = format!("0x{}", hex::encode(call.encode()));
        let bare = verify_payload(&calldata, &config).unwrap();
        assert!(bare.to.is_none());
        assert_eq!(bare.function, decoded.function);
    }
}
