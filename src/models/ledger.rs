#![allow(dead_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of a point-balance change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Earn,
    Deduct,
    Bonus,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionKind::Earn => write!(f, "earn"),
            TransactionKind::Deduct => write!(f, "deduct"),
            TransactionKind::Bonus => write!(f, "bonus"),
        }
    }
}

/// Closed set of payout reasons. Every ledger entry carries exactly one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    ReportSubmitted,
    TaskCompleted,
    DailyStreak,
    StreakMilestone,
    VerificationBonus,
    GroupDriveBonus,
    BadgeEarned,
    ClanBonus,
    FraudPenalty,
    AdminAdjustment,
    SignupBonus,
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReasonCode::ReportSubmitted => "report_submitted",
            ReasonCode::TaskCompleted => "task_completed",
            ReasonCode::DailyStreak => "daily_streak",
            ReasonCode::StreakMilestone => "streak_milestone",
            ReasonCode::VerificationBonus => "verification_bonus",
            ReasonCode::GroupDriveBonus => "group_drive_bonus",
            ReasonCode::BadgeEarned => "badge_earned",
            ReasonCode::ClanBonus => "clan_bonus",
            ReasonCode::FraudPenalty => "fraud_penalty",
            ReasonCode::AdminAdjustment => "admin_adjustment",
            ReasonCode::SignupBonus => "signup_bonus",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceType {
    Report,
    Task,
    Badge,
    Streak,
    Admin,
}

/// Pointer from a ledger entry back to the event that triggered it.
/// `(user_id, kind, id, reason_code)` is the idempotency key for payouts:
/// re-delivery of the same triggering event must not produce a second entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reference {
    pub kind: ReferenceType,
    pub id: String,
}

impl Reference {
    pub fn report(id: Uuid) -> Self {
        Self {
            kind: ReferenceType::Report,
            id: id.to_string(),
        }
    }

    pub fn task(id: Uuid) -> Self {
        Self {
            kind: ReferenceType::Task,
            id: id.to_string(),
        }
    }

    pub fn badge(name: &str) -> Self {
        Self {
            kind: ReferenceType::Badge,
            id: name.to_string(),
        }
    }
}

/// Immutable ledger entry. Never mutated or deleted once appended; the
/// ledger is the audit trail and the evidence for already-paid checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Snapshot of the account's clan at time of award.
    pub clan_id: Option<Uuid>,
    pub kind: TransactionKind,
    pub value: i64,
    pub reason: String,
    pub reason_code: ReasonCode,
    pub reference: Option<Reference>,
    pub balance_before: i64,
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

impl PointTransaction {
    pub fn matches_key(&self, user_id: Uuid, reference: &Reference, reason_code: ReasonCode) -> bool {
        self.user_id == user_id
            && self.reason_code == reason_code
            && self.reference.as_ref() == Some(reference)
    }
}
