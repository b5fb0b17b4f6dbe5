use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Report lifecycle states. Transitions are monotonic except for the admin
/// side channel to `Fraud`, reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    UnderReview,
    Verified,
    Rejected,
    Resolved,
    Fraud,
}

impl ReportStatus {
    /// Check if transition to another state is valid
    pub fn can_transition_to(&self, to: &ReportStatus) -> bool {
        match (self, to) {
            (ReportStatus::Pending, ReportStatus::UnderReview) => true,
            (ReportStatus::Pending, ReportStatus::Verified) => true,
            (ReportStatus::Pending, ReportStatus::Rejected) => true,
            (ReportStatus::UnderReview, ReportStatus::Verified) => true,
            (ReportStatus::UnderReview, ReportStatus::Rejected) => true,
            (ReportStatus::Verified, ReportStatus::Resolved) => true,
            // Admin side channel: fraud reachable from any non-terminal state.
            (from, ReportStatus::Fraud) if !from.is_terminal() => true,
            // Same state is allowed (idempotent re-delivery).
            (a, b) if a == b => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReportStatus::Rejected | ReportStatus::Resolved | ReportStatus::Fraud
        )
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportStatus::Pending => write!(f, "pending"),
            ReportStatus::UnderReview => write!(f, "under_review"),
            ReportStatus::Verified => write!(f, "verified"),
            ReportStatus::Rejected => write!(f, "rejected"),
            ReportStatus::Resolved => write!(f, "resolved"),
            ReportStatus::Fraud => write!(f, "fraud"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReportCategory {
    Tree,
    Garbage,
    Water,
    Other,
}

impl std::fmt::Display for ReportCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportCategory::Tree => write!(f, "tree"),
            ReportCategory::Garbage => write!(f, "garbage"),
            ReportCategory::Water => write!(f, "water"),
            ReportCategory::Other => write!(f, "other"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub longitude: f64,
    pub latitude: f64,
}

/// Classifier verdict, delivered asynchronously by the validator
/// collaborator. Set at most once per report / per proof.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verdict {
    pub valid: bool,
    pub confidence: f64,
    pub fraud: bool,
    pub reason: String,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Valid,
    Invalid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationVote {
    pub voter_id: Uuid,
    pub vote: Vote,
    pub timestamp: DateTime<Utc>,
}

/// A submitted observation awaiting validation. Immutable once terminal
/// except for the `resolved_at`/`resolved_by` audit fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub submitter_id: Uuid,
    /// Snapshot of the submitter's clan at submission time.
    pub clan_id: Option<Uuid>,
    pub category: ReportCategory,
    pub sub_type: Option<String>,
    pub media_ref: String,
    pub description: Option<String>,
    pub coordinates: Coordinates,
    pub address: Option<String>,
    pub region: Option<String>,
    pub status: ReportStatus,
    pub validator_verdict: Option<Verdict>,
    /// 0 until paid, then fixed. Idempotency guard for the submitter payout.
    pub points_awarded: i64,
    pub verifications: Vec<VerificationVote>,
    pub verification_count: u32,
    pub linked_task_id: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Report {
    pub fn has_voted(&self, voter_id: Uuid) -> bool {
        self.verifications.iter().any(|v| v.voter_id == voter_id)
    }

    pub fn valid_votes(&self) -> usize {
        self.verifications.iter().filter(|v| v.vote == Vote::Valid).count()
    }

    pub fn invalid_votes(&self) -> usize {
        self.verifications.iter().filter(|v| v.vote == Vote::Invalid).count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitReportRequest {
    pub user_id: Uuid,
    pub category: ReportCategory,
    pub sub_type: Option<String>,
    #[validate(length(min = 1, max = 2048))]
    pub media_ref: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub longitude: f64,
    pub latitude: f64,
    pub address: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastVoteRequest {
    pub user_id: Uuid,
    pub vote: Vote,
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub id: Uuid,
    pub category: ReportCategory,
    pub status: ReportStatus,
    pub coordinates: Coordinates,
    pub points_awarded: i64,
    pub verification_count: u32,
    pub linked_task_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl From<Report> for ReportResponse {
    fn from(report: Report) -> Self {
        Self {
            id: report.id,
            category: report.category,
            status: report.status,
            coordinates: report.coordinates,
            points_awarded: report.points_awarded,
            verification_count: report.verification_count,
            linked_task_id: report.linked_task_id,
            created_at: report.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_status_transitions() {
        let pending = ReportStatus::Pending;
        let under_review = ReportStatus::UnderReview;
        let verified = ReportStatus::Verified;
        let rejected = ReportStatus::Rejected;
        let resolved = ReportStatus::Resolved;
        let fraud = ReportStatus::Fraud;

        assert!(pending.can_transition_to(&under_review));
        assert!(pending.can_transition_to(&verified));
        assert!(pending.can_transition_to(&rejected));
        assert!(under_review.can_transition_to(&verified));
        assert!(verified.can_transition_to(&resolved));

        // Admin side channel from non-terminal states.
        assert!(pending.can_transition_to(&fraud));
        assert!(under_review.can_transition_to(&fraud));
        assert!(verified.can_transition_to(&fraud));

        // Idempotent re-delivery.
        assert!(verified.can_transition_to(&verified));

        // Terminal states are frozen.
        assert!(!resolved.can_transition_to(&fraud));
        assert!(!rejected.can_transition_to(&verified));
        assert!(!fraud.can_transition_to(&pending));
        assert!(!resolved.can_transition_to(&pending));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!ReportStatus::Pending.is_terminal());
        assert!(!ReportStatus::UnderReview.is_terminal());
        assert!(!ReportStatus::Verified.is_terminal());
        assert!(ReportStatus::Rejected.is_terminal());
        assert!(ReportStatus::Resolved.is_terminal());
        assert!(ReportStatus::Fraud.is_terminal());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&ReportStatus::UnderReview).unwrap();
        assert_eq!(json, "\"under_review\"");
        let back: ReportStatus = serde_json::from_str("\"fraud\"").unwrap();
        assert_eq!(back, ReportStatus::Fraud);
    }

    #[test]
    fn test_vote_counting() {
        let mut report = test_report();
        for (voter, vote) in [
            (Uuid::new_v4(), Vote::Valid),
            (Uuid::new_v4(), Vote::Valid),
            (Uuid::new_v4(), Vote::Invalid),
        ] {
            report.verifications.push(VerificationVote {
                voter_id: voter,
                vote,
                timestamp: Utc::now(),
            });
        }
        assert_eq!(report.valid_votes(), 2);
        assert_eq!(report.invalid_votes(), 1);
    }

    #[test]
    fn test_has_voted() {
        let mut report = test_report();
        let voter = Uuid::new_v4();
        assert!(!report.has_voted(voter));
        report.verifications.push(VerificationVote {
            voter_id: voter,
            vote: Vote::Valid,
            timestamp: Utc::now(),
        });
        assert!(report.has_voted(voter));
    }

    fn test_report() -> Report {
        Report {
            id: Uuid::new_v4(),
            submitter_id: Uuid::new_v4(),
            clan_id: None,
            category: ReportCategory::Garbage,
            sub_type: None,
            media_ref: "https://cdn.example.com/img/1.jpg".to_string(),
            description: None,
            coordinates: Coordinates {
                longitude: 72.8777,
                latitude: 19.076,
            },
            address: None,
            region: None,
            status: ReportStatus::Pending,
            validator_verdict: None,
            points_awarded: 0,
            verifications: Vec::new(),
            verification_count: 0,
            linked_task_id: None,
            resolved_at: None,
            resolved_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
