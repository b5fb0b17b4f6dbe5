use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::api_error::ApiError;
use crate::models::ledger::{ReasonCode, Reference};
use crate::models::report::{
    CastVoteRequest, Coordinates, Report, ReportCategory, ReportStatus, SubmitReportRequest,
    Verdict, VerificationVote,
};
use crate::models::task::{Task, TaskCategory, TaskStatus};
use crate::service::notifier_service::{event_payload, events, topics, Notifier};
use crate::service::reward_service::{points, RewardService};
use crate::service::validator_service::{ClassifyContext, ClassifyKind, Validator};
use crate::store::Store;

/// Votes needed before a report auto-resolves.
const VERIFICATION_QUORUM: u32 = 3;

/// Penalty applied to the submitter when an admin marks a report as fraud.
const MANUAL_FRAUD_PENALTY: i64 = 50;

enum VerdictOutcome {
    /// Re-delivered or inapplicable verdict; nothing changed.
    Ignored,
    MarkedFraud,
    Verified { pay: bool },
}

/// Report pipeline: submission, asynchronous classifier verdicts,
/// community verification voting and the admin override.
#[derive(Clone)]
pub struct ReportService {
    store: Store,
    rewards: RewardService,
    notifier: Arc<dyn Notifier>,
    validator: Arc<dyn Validator>,
}

impl ReportService {
    pub fn new(
        store: Store,
        rewards: RewardService,
        notifier: Arc<dyn Notifier>,
        validator: Arc<dyn Validator>,
    ) -> Self {
        Self {
            store,
            rewards,
            notifier,
            validator,
        }
    }

    /// Create a report in `pending` and, when the submitter belongs to a
    /// clan, spawn the linked single-slot task and notify the clan.
    /// Classification happens out of band; see [`spawn_validation`].
    ///
    /// [`spawn_validation`]: ReportService::spawn_validation
    pub fn submit(&self, dto: SubmitReportRequest) -> Result<Report, ApiError> {
        dto.validate()?;
        let account = self.store.account(dto.user_id)?;
        let now = Utc::now();

        let mut report = Report {
            id: Uuid::new_v4(),
            submitter_id: dto.user_id,
            clan_id: account.clan_id,
            category: dto.category,
            sub_type: dto.sub_type,
            media_ref: dto.media_ref,
            description: dto.description,
            coordinates: Coordinates {
                longitude: dto.longitude,
                latitude: dto.latitude,
            },
            address: dto.address,
            region: dto.region,
            status: ReportStatus::Pending,
            validator_verdict: None,
            points_awarded: 0,
            verifications: Vec::new(),
            verification_count: 0,
            linked_task_id: None,
            resolved_at: None,
            resolved_by: None,
            created_at: now,
            updated_at: now,
        };

        if let Some(clan_id) = account.clan_id {
            let task = Task {
                id: Uuid::new_v4(),
                category: task_category_for(report.category),
                title: format!(
                    "{} Issue - {}",
                    capitalize(&report.category.to_string()),
                    report
                        .address
                        .as_deref()
                        .or(report.region.as_deref())
                        .unwrap_or("Unknown Location")
                ),
                description: report.description.clone(),
                linked_report_id: Some(report.id),
                clan_id: Some(clan_id),
                map_pin_id: None,
                coordinates: Some(report.coordinates),
                status: TaskStatus::Open,
                max_participants: 1,
                assigned_users: Vec::new(),
                points_reward: points::TASK_COMPLETED,
                completion_proofs: Vec::new(),
                reward_paid: false,
                is_clan_broadcast: false,
                created_by: Some(dto.user_id),
                completed_at: None,
                created_at: now,
                updated_at: now,
            };
            report.linked_task_id = Some(task.id);

            self.notifier.publish(
                &topics::clan(clan_id),
                event_payload(
                    events::NEW_REPORT,
                    json!({
                        "report_id": report.id,
                        "category": report.category,
                        "message": "New mission available in your area!",
                    }),
                ),
            );
            self.store.insert_task(task)?;
        }

        self.store.insert_report(report.clone())?;
        self.store.update_account(dto.user_id, |a| {
            a.contributions.reports_submitted += 1;
            Ok(())
        })?;

        self.notifier.publish(
            topics::GLOBAL,
            event_payload(
                events::NEW_REPORT,
                json!({
                    "report_id": report.id,
                    "category": report.category,
                    "status": report.status,
                    "coordinates": report.coordinates,
                }),
            ),
        );

        info!(
            report_id = %report.id,
            submitter = %dto.user_id,
            category = %report.category,
            "report submitted"
        );
        Ok(report)
    }

    /// Kick off the out-of-band classifier call for a submitted report.
    /// The verdict is applied against freshly fetched state when it
    /// arrives; a non-response leaves the report as it is.
    pub fn spawn_validation(&self, report: &Report) {
        let service = self.clone();
        let media_ref = report.media_ref.clone();
        let context = ClassifyContext {
            entity_id: report.id,
            kind: ClassifyKind::Report,
            category: report.category.to_string(),
        };
        tokio::spawn(async move {
            match service.validator.classify(&media_ref, &context).await {
                Ok(verdict) => {
                    if let Err(e) = service.apply_verdict(context.entity_id, verdict) {
                        error!(report_id = %context.entity_id, error = %e, "failed to apply verdict");
                    }
                }
                Err(e) => {
                    warn!(
                        report_id = %context.entity_id,
                        error = %e,
                        "classifier gave no verdict, report keeps its status"
                    );
                }
            }
        });
    }

    /// Apply a classifier verdict. Idempotent under re-delivery: the
    /// verdict is set at most once and the submitter payout is guarded by
    /// `points_awarded == 0`, checked and set in the same critical
    /// section as the status transition.
    pub fn apply_verdict(&self, report_id: Uuid, verdict: Verdict) -> Result<Report, ApiError> {
        let outcome = self.store.update_report(report_id, |report| {
            if report.validator_verdict.is_some() || report.status.is_terminal() {
                return Ok(VerdictOutcome::Ignored);
            }
            report.validator_verdict = Some(verdict.clone());

            if verdict.fraud {
                report.status = ReportStatus::Fraud;
                return Ok(VerdictOutcome::MarkedFraud);
            }
            if verdict.valid {
                if !report.status.can_transition_to(&ReportStatus::Verified) {
                    return Ok(VerdictOutcome::Ignored);
                }
                report.status = ReportStatus::Verified;
                if report.points_awarded == 0 {
                    report.points_awarded = points::REPORT_SUBMITTED;
                    return Ok(VerdictOutcome::Verified { pay: true });
                }
                return Ok(VerdictOutcome::Verified { pay: false });
            }
            // Not valid, not fraud: stays pending for community review.
            Ok(VerdictOutcome::Ignored)
        })?;

        let report = self.store.report(report_id)?;
        match outcome {
            VerdictOutcome::Ignored => {}
            VerdictOutcome::MarkedFraud => {
                info!(report_id = %report_id, "report marked as fraud by classifier");
            }
            VerdictOutcome::Verified { pay } => {
                if pay {
                    self.pay_submitter(&report)?;
                }
                self.notifier.publish(
                    topics::GLOBAL,
                    event_payload(
                        events::REPORT_STATUS_UPDATE,
                        json!({
                            "report_id": report.id,
                            "status": report.status,
                            "confidence": verdict.confidence,
                        }),
                    ),
                );
            }
        }
        Ok(report)
    }

    fn pay_submitter(&self, report: &Report) -> Result<(), ApiError> {
        self.rewards.award(
            report.submitter_id,
            points::REPORT_SUBMITTED,
            ReasonCode::ReportSubmitted,
            &format!("Report verified: {} issue", report.category),
            Some(Reference::report(report.id)),
        )?;
        self.bump_clan_impact(report);
        self.rewards.check_badges(report.submitter_id)?;

        self.notifier.publish(
            topics::GLOBAL,
            event_payload(
                events::REPORT_VERIFIED,
                json!({
                    "report_id": report.id,
                    "user_id": report.submitter_id,
                    "category": report.category,
                    "points_awarded": points::REPORT_SUBMITTED,
                }),
            ),
        );
        Ok(())
    }

    fn bump_clan_impact(&self, report: &Report) {
        let Some(clan_id) = report.clan_id else {
            return;
        };
        let result = self.store.update_clan(clan_id, |clan| {
            match report.category {
                ReportCategory::Tree => clan.impact.trees_planted += 1,
                ReportCategory::Garbage => clan.impact.garbage_cleared += 1,
                ReportCategory::Water => clan.impact.water_issues_resolved += 1,
                ReportCategory::Other => {}
            }
            Ok(())
        });
        if let Err(e) = result {
            error!(clan_id = %clan_id, error = %e, "clan impact update failed");
        }
    }

    /// Community verification. One vote per voter, never the submitter;
    /// at quorum the report auto-resolves by simple majority. The voter
    /// bonus is paid regardless of the report's ultimate disposition.
    pub fn cast_vote(&self, report_id: Uuid, dto: CastVoteRequest) -> Result<Report, ApiError> {
        let voter_id = dto.user_id;
        self.store.account(voter_id)?;
        let report = self.store.update_report(report_id, |report| {
            if report.status.is_terminal() {
                return Err(ApiError::invalid_state(format!(
                    "report {} already resolved ({})",
                    report.id, report.status
                )));
            }
            if report.submitter_id == voter_id {
                return Err(ApiError::forbidden("cannot verify your own report"));
            }
            if report.has_voted(voter_id) {
                return Err(ApiError::conflict("already voted on this report"));
            }

            report.verifications.push(VerificationVote {
                voter_id,
                vote: dto.vote,
                timestamp: Utc::now(),
            });
            report.verification_count += 1;

            if report.verification_count >= VERIFICATION_QUORUM {
                report.status = if report.valid_votes() > report.invalid_votes() {
                    ReportStatus::Verified
                } else {
                    ReportStatus::Rejected
                };
            }
            Ok(report.clone())
        })?;

        // Voter incentive, decoupled from the report outcome.
        self.rewards.award(
            voter_id,
            points::VERIFICATION_DONE,
            ReasonCode::VerificationBonus,
            "Community verification bonus",
            Some(Reference::report(report_id)),
        )?;
        self.store.update_account(voter_id, |a| {
            a.contributions.verifications_completed += 1;
            Ok(())
        })?;

        info!(
            report_id = %report_id,
            voter = %voter_id,
            count = report.verification_count,
            status = %report.status,
            "verification vote recorded"
        );
        Ok(report)
    }

    /// Admin override. Marks the audit fields, penalizes the submitter on
    /// `fraud` and pays on `verified` iff not already paid.
    pub fn set_status(
        &self,
        report_id: Uuid,
        admin_id: Uuid,
        status: ReportStatus,
        reason: Option<String>,
    ) -> Result<Report, ApiError> {
        let pay = self.store.update_report(report_id, |report| {
            report.status = status;
            report.resolved_at = Some(Utc::now());
            report.resolved_by = Some(admin_id);
            let pay = status == ReportStatus::Verified && report.points_awarded == 0;
            if pay {
                report.points_awarded = points::REPORT_SUBMITTED;
            }
            Ok(pay)
        })?;

        let report = self.store.report(report_id)?;
        if status == ReportStatus::Fraud {
            self.rewards.penalize(
                report.submitter_id,
                MANUAL_FRAUD_PENALTY,
                reason
                    .as_deref()
                    .unwrap_or("Report manually flagged as fraud"),
            )?;
        } else if pay {
            self.pay_submitter(&report)?;
        }

        info!(
            report_id = %report_id,
            admin = %admin_id,
            status = %status,
            "report status overridden"
        );
        Ok(report)
    }

    pub fn get(&self, report_id: Uuid) -> Result<Report, ApiError> {
        self.store.report(report_id)
    }

    pub fn for_user(&self, user_id: Uuid) -> Result<Vec<Report>, ApiError> {
        self.store.reports_for_user(user_id)
    }
}

fn task_category_for(category: ReportCategory) -> TaskCategory {
    match category {
        ReportCategory::Tree => TaskCategory::Tree,
        ReportCategory::Garbage => TaskCategory::Garbage,
        ReportCategory::Water => TaskCategory::Water,
        ReportCategory::Other => TaskCategory::Other,
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
