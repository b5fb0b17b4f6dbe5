#![allow(dead_code)]

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::api_error::ApiError;
use crate::models::account::{Account, Badge};
use crate::models::ledger::{PointTransaction, ReasonCode, Reference, TransactionKind};
use crate::store::Store;

/// Point values for every payout the engine makes.
pub mod points {
    pub const REPORT_SUBMITTED: i64 = 30;
    pub const TASK_COMPLETED: i64 = 50;
    pub const DAILY_STREAK: i64 = 10;
    pub const VERIFICATION_DONE: i64 = 5;
    pub const GROUP_DRIVE_BONUS: i64 = 25;
    pub const SIGNUP_BONUS: i64 = 50;
    pub const STREAK_7_DAYS: i64 = 70;
    pub const STREAK_30_DAYS: i64 = 300;
    pub const FRAUD_PENALTY: i64 = 100;
    pub const ACTIVITY_CLAN_BASE: i64 = 150;
    pub const ACTIVITY_CLAN_PER_PARTICIPANT: i64 = 10;
    pub const ACTIVITY_PERSONAL: i64 = 75;
}

/// Fraud flags at which an account is automatically banned.
pub const FRAUD_FLAG_BAN_THRESHOLD: u32 = 5;

pub struct BadgeSpec {
    pub name: &'static str,
    pub icon: &'static str,
    pub description: &'static str,
}

static BADGE_STREAK_7: BadgeSpec = BadgeSpec {
    name: "7-Day Streak",
    icon: "🔥",
    description: "Logged in for 7 consecutive days",
};
static BADGE_STREAK_30: BadgeSpec = BadgeSpec {
    name: "30-Day Streak",
    icon: "⚡",
    description: "Logged in for 30 consecutive days",
};
static BADGE_STREAK_100: BadgeSpec = BadgeSpec {
    name: "Centurion",
    icon: "💯",
    description: "Logged in for 100 consecutive days",
};
static BADGE_TASKS_10: BadgeSpec = BadgeSpec {
    name: "Task Master",
    icon: "🎯",
    description: "Completed 10 tasks",
};
static BADGE_TASKS_50: BadgeSpec = BadgeSpec {
    name: "Eco Warrior",
    icon: "🛡️",
    description: "Completed 50 tasks",
};
static BADGE_REPORTS_5: BadgeSpec = BadgeSpec {
    name: "Watchdog",
    icon: "👁️",
    description: "Submitted 5 reports",
};
static BADGE_POINTS_1000: BadgeSpec = BadgeSpec {
    name: "Points Master",
    icon: "⭐",
    description: "Earned 1000 points",
};

/// Pure threshold evaluation: which badges the account qualifies for.
/// Safe to call repeatedly; the append is deduplicated by name.
pub fn qualified_badges(account: &Account) -> Vec<&'static BadgeSpec> {
    let mut out = Vec::new();
    if account.streak >= 7 {
        out.push(&BADGE_STREAK_7);
    }
    if account.streak >= 30 {
        out.push(&BADGE_STREAK_30);
    }
    if account.streak >= 100 {
        out.push(&BADGE_STREAK_100);
    }
    if account.contributions.tasks_completed >= 10 {
        out.push(&BADGE_TASKS_10);
    }
    if account.contributions.tasks_completed >= 50 {
        out.push(&BADGE_TASKS_50);
    }
    if account.contributions.reports_submitted >= 5 {
        out.push(&BADGE_REPORTS_5);
    }
    if account.total_points >= 1000 {
        out.push(&BADGE_POINTS_1000);
    }
    out
}

#[derive(Debug, Clone, Serialize)]
pub struct AwardOutcome {
    pub account: Account,
    pub transaction: PointTransaction,
    /// True when the idempotency key matched an existing ledger entry and
    /// nothing was paid on this call.
    pub already_settled: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct HistorySummary {
    pub earn: i64,
    pub deduct: i64,
    pub bonus: i64,
}

#[derive(Debug, Serialize)]
pub struct PointHistory {
    pub transactions: Vec<PointTransaction>,
    pub summary: HistorySummary,
}

/// Ledger & reward engine: the only component that mutates balances,
/// levels, streaks and badges, and the only writer of ledger entries.
#[derive(Clone)]
pub struct RewardService {
    store: Store,
}

impl RewardService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Persist a freshly created account.
    pub fn register(&self, account: Account) -> Result<(), ApiError> {
        self.store.insert_account(account)
    }

    pub fn account(&self, user_id: Uuid) -> Result<Account, ApiError> {
        self.store.account(user_id)
    }

    /// Award points to a user and append the ledger entry.
    ///
    /// When `reference` is given, `(user, reference, reason_code)` is the
    /// idempotency key: a re-delivered triggering event finds the existing
    /// entry and returns the settled state without paying again. The
    /// ledger entry is written only after the account mutation succeeds.
    pub fn award(
        &self,
        user_id: Uuid,
        value: i64,
        reason_code: ReasonCode,
        reason: &str,
        reference: Option<Reference>,
    ) -> Result<AwardOutcome, ApiError> {
        if value <= 0 {
            return Err(ApiError::validation("award value must be positive"));
        }

        if let Some(ref key) = reference {
            if let Some(existing) = self.store.ledger_contains(user_id, key, reason_code)? {
                info!(
                    user_id = %user_id,
                    reference = %key.id,
                    reason_code = %reason_code,
                    "award already settled, skipping"
                );
                let account = self.store.account(user_id)?;
                return Ok(AwardOutcome {
                    account,
                    transaction: existing,
                    already_settled: true,
                });
            }
        }

        let now = Utc::now();
        let (clan_id, balance_before, balance_after) =
            self.store.update_account(user_id, |account| {
                let before = account.total_points;
                account.total_points += value;
                account.level = account.calculate_level();
                roll_action_streak(account, now);
                Ok((account.clan_id, before, account.total_points))
            })?;

        let kind = match reason_code {
            ReasonCode::DailyStreak
            | ReasonCode::StreakMilestone
            | ReasonCode::VerificationBonus
            | ReasonCode::GroupDriveBonus
            | ReasonCode::ClanBonus
            | ReasonCode::SignupBonus => TransactionKind::Bonus,
            _ => TransactionKind::Earn,
        };

        let transaction = PointTransaction {
            id: Uuid::new_v4(),
            user_id,
            clan_id,
            kind,
            value,
            reason: reason.to_string(),
            reason_code,
            reference,
            balance_before,
            balance_after,
            created_at: now,
        };
        self.store.append_transaction(transaction.clone())?;

        info!(
            user_id = %user_id,
            value = value,
            reason_code = %reason_code,
            balance_after = balance_after,
            "points awarded"
        );

        // Clan aggregate is best-effort-consistent but never skipped
        // silently: a failure is logged for reconciliation.
        if let Some(clan_id) = clan_id {
            let result = self.store.update_clan(clan_id, |clan| {
                clan.points += value;
                if let Some(member) = clan.member_mut(user_id) {
                    member.contributed_points += value;
                }
                Ok(())
            });
            if let Err(e) = result {
                error!(
                    user_id = %user_id,
                    clan_id = %clan_id,
                    error = %e,
                    "clan aggregate update failed"
                );
            }
        }

        self.check_badges(user_id)?;

        let account = self.store.account(user_id)?;
        Ok(AwardOutcome {
            account,
            transaction,
            already_settled: false,
        })
    }

    /// Deduct points as a penalty, incrementing the fraud-flag counter and
    /// auto-banning at the threshold. Balance is clamped at zero; the
    /// ledger entry records the applied delta so `after = before + value`
    /// still holds.
    pub fn penalize(&self, user_id: Uuid, value: i64, reason: &str) -> Result<Account, ApiError> {
        if value <= 0 {
            return Err(ApiError::validation("penalty value must be positive"));
        }

        let now = Utc::now();
        let (clan_id, balance_before, balance_after) =
            self.store.update_account(user_id, |account| {
                let before = account.total_points;
                account.total_points = (account.total_points - value).max(0);
                account.level = account.calculate_level();
                account.fraud_flags += 1;
                if account.fraud_flags >= FRAUD_FLAG_BAN_THRESHOLD {
                    account.is_banned = true;
                }
                Ok((account.clan_id, before, account.total_points))
            })?;

        self.store.append_transaction(PointTransaction {
            id: Uuid::new_v4(),
            user_id,
            clan_id,
            kind: TransactionKind::Deduct,
            value: balance_after - balance_before,
            reason: reason.to_string(),
            reason_code: ReasonCode::FraudPenalty,
            reference: None,
            balance_before,
            balance_after,
            created_at: now,
        })?;

        let account = self.store.account(user_id)?;
        info!(
            user_id = %user_id,
            value = value,
            fraud_flags = account.fraud_flags,
            banned = account.is_banned,
            "penalty applied"
        );
        Ok(account)
    }

    pub fn signup_bonus(&self, user_id: Uuid) -> Result<AwardOutcome, ApiError> {
        self.award(
            user_id,
            points::SIGNUP_BONUS,
            ReasonCode::SignupBonus,
            "Welcome to EcoQuest!",
            None,
        )
    }

    /// Day-granular login streak. A second login the same day is a no-op;
    /// a login the day after the previous one increments the streak and
    /// pays the daily bonus, or a milestone bonus every 7th and 30th day;
    /// a longer gap resets the streak to 1 without a payout.
    pub fn record_login(&self, user_id: Uuid) -> Result<Account, ApiError> {
        let now = Utc::now();
        let payout = self.store.update_account(user_id, |account| {
            let today = now.date_naive();
            let last = account.last_login.map(|d| d.date_naive());
            let mut payout = None;
            match last {
                Some(day) if day == today => {}
                Some(day) if Some(day) == today.pred_opt() => {
                    account.streak += 1;
                    payout = if account.streak % 30 == 0 {
                        Some((
                            points::STREAK_30_DAYS,
                            ReasonCode::StreakMilestone,
                            format!("{}-day streak bonus!", account.streak),
                        ))
                    } else if account.streak % 7 == 0 {
                        Some((
                            points::STREAK_7_DAYS,
                            ReasonCode::StreakMilestone,
                            format!("{}-day streak bonus!", account.streak),
                        ))
                    } else {
                        Some((
                            points::DAILY_STREAK,
                            ReasonCode::DailyStreak,
                            "Daily login streak".to_string(),
                        ))
                    };
                }
                _ => {
                    account.streak = 1;
                }
            }
            account.last_login = Some(now);
            account.last_action_date = Some(now);
            Ok(payout)
        })?;

        if let Some((value, reason_code, reason)) = payout {
            self.award(user_id, value, reason_code, &reason, None)?;
        }
        self.check_badges(user_id)?;
        self.store.account(user_id)
    }

    /// Append a badge unless the name is already present.
    pub fn award_badge(&self, user_id: Uuid, spec: &BadgeSpec) -> Result<bool, ApiError> {
        let newly_earned = self.store.update_account(user_id, |account| {
            if account.has_badge(spec.name) {
                return Ok(false);
            }
            account.badges.push(Badge {
                name: spec.name.to_string(),
                icon: spec.icon.to_string(),
                description: spec.description.to_string(),
                earned_at: Utc::now(),
            });
            Ok(true)
        })?;
        if newly_earned {
            info!(user_id = %user_id, badge = spec.name, "badge earned");
        }
        Ok(newly_earned)
    }

    /// Evaluate all badge thresholds against current account state.
    pub fn check_badges(&self, user_id: Uuid) -> Result<Vec<&'static str>, ApiError> {
        let account = self.store.account(user_id)?;
        let mut newly_earned = Vec::new();
        for spec in qualified_badges(&account) {
            if self.award_badge(user_id, spec)? {
                newly_earned.push(spec.name);
            }
        }
        Ok(newly_earned)
    }

    pub fn history(&self, user_id: Uuid) -> Result<PointHistory, ApiError> {
        let transactions = self.store.transactions_for_user(user_id)?;
        let mut summary = HistorySummary::default();
        for tx in &transactions {
            match tx.kind {
                TransactionKind::Earn => summary.earn += tx.value,
                TransactionKind::Deduct => summary.deduct += tx.value,
                TransactionKind::Bonus => summary.bonus += tx.value,
            }
        }
        Ok(PointHistory {
            transactions,
            summary,
        })
    }

    pub fn clan_history(&self, clan_id: Uuid, limit: usize) -> Result<Vec<PointTransaction>, ApiError> {
        self.store.transactions_for_clan(clan_id, limit)
    }
}

/// Streak bookkeeping on any rewarded action, at day granularity: first
/// action today extends or resets the consecutive-day counter.
fn roll_action_streak(account: &mut Account, now: DateTime<Utc>) {
    let today = now.date_naive();
    let last = account.last_action_date.map(|d| d.date_naive());
    match last {
        Some(day) if day == today => return,
        Some(day) if Some(day) == today.pred_opt() => {
            account.streak += 1;
        }
        _ => {
            account.streak = 1;
        }
    }
    account.last_action_date = Some(now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn setup() -> (Store, RewardService, Uuid) {
        let store = Store::new();
        let account = Account::new("Asha".to_string(), Some("asha@example.com".to_string()), None);
        let user_id = account.id;
        store.insert_account(account).unwrap();
        (store.clone(), RewardService::new(store), user_id)
    }

    #[test]
    fn test_award_updates_balance_and_ledger() {
        let (store, rewards, user) = setup();
        let outcome = rewards
            .award(
                user,
                points::REPORT_SUBMITTED,
                ReasonCode::ReportSubmitted,
                "Report verified: garbage issue",
                Some(Reference::report(Uuid::new_v4())),
            )
            .unwrap();

        assert_eq!(outcome.account.total_points, 30);
        assert_eq!(outcome.transaction.balance_before, 0);
        assert_eq!(outcome.transaction.balance_after, 30);

        let history = store.transactions_for_user(user).unwrap();
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_award_rejects_non_positive_value() {
        let (_, rewards, user) = setup();
        assert!(matches!(
            rewards.award(user, 0, ReasonCode::AdminAdjustment, "zero", None),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            rewards.award(user, -5, ReasonCode::AdminAdjustment, "negative", None),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn test_award_is_idempotent_per_reference() {
        let (store, rewards, user) = setup();
        let report_id = Uuid::new_v4();

        rewards
            .award(
                user,
                30,
                ReasonCode::ReportSubmitted,
                "Report verified",
                Some(Reference::report(report_id)),
            )
            .unwrap();
        let second = rewards
            .award(
                user,
                30,
                ReasonCode::ReportSubmitted,
                "Report verified",
                Some(Reference::report(report_id)),
            )
            .unwrap();

        assert_eq!(second.account.total_points, 30);
        assert_eq!(store.transactions_for_user(user).unwrap().len(), 1);
    }

    #[test]
    fn test_ledger_invariant_over_mixed_sequence() {
        let (store, rewards, user) = setup();
        rewards
            .award(user, 500, ReasonCode::AdminAdjustment, "seed", None)
            .unwrap();
        rewards.penalize(user, 100, "fraud").unwrap();
        rewards
            .award(user, 50, ReasonCode::TaskCompleted, "task", Some(Reference::task(Uuid::new_v4())))
            .unwrap();
        rewards.penalize(user, 1000, "big fraud").unwrap();

        let account = store.account(user).unwrap();
        let transactions = store.transactions_for_user(user).unwrap();
        // Newest first; head matches the live balance.
        assert_eq!(transactions[0].balance_after, account.total_points);
        for tx in &transactions {
            assert_eq!(tx.balance_after, tx.balance_before + tx.value);
        }
    }

    #[test]
    fn test_penalize_clamps_at_zero_and_bans_at_threshold() {
        let (store, rewards, user) = setup();
        rewards
            .award(user, 120, ReasonCode::AdminAdjustment, "seed", None)
            .unwrap();

        let account = rewards.penalize(user, points::FRAUD_PENALTY, "fraudulent report").unwrap();
        assert_eq!(account.total_points, 20);
        assert_eq!(account.fraud_flags, 1);
        assert!(!account.is_banned);

        // Clamped at zero, ledger still balances.
        let account = rewards.penalize(user, points::FRAUD_PENALTY, "again").unwrap();
        assert_eq!(account.total_points, 0);
        let newest = &store.transactions_for_user(user).unwrap()[0];
        assert_eq!(newest.value, -20);
        assert_eq!(newest.balance_after, 0);

        for _ in 0..3 {
            rewards.penalize(user, 10, "repeat offender").unwrap();
        }
        let account = store.account(user).unwrap();
        assert_eq!(account.fraud_flags, 5);
        assert!(account.is_banned);
    }

    #[test]
    fn test_level_recomputed_from_balance() {
        let (store, rewards, user) = setup();
        rewards
            .award(user, 1200, ReasonCode::AdminAdjustment, "seed", None)
            .unwrap();
        assert_eq!(store.account(user).unwrap().level, 5);

        rewards.penalize(user, 1150, "rollback").unwrap();
        assert_eq!(store.account(user).unwrap().level, 1);
    }

    #[test]
    fn test_award_updates_clan_aggregate_and_member_contribution() {
        let (store, rewards, user) = setup();
        let clan = crate::models::clan::Clan {
            id: Uuid::new_v4(),
            name: "Pune Nature Clan".to_string(),
            description: None,
            region: "Pune".to_string(),
            is_private: false,
            max_members: 50,
            members: vec![crate::models::clan::ClanMember {
                user_id: user,
                role: crate::models::clan::ClanRole::Leader,
                joined_at: Utc::now(),
                contributed_points: 0,
            }],
            join_requests: Vec::new(),
            invites: Vec::new(),
            points: 0,
            completed_tasks: 0,
            impact: Default::default(),
            activities: Vec::new(),
            created_by: user,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let clan_id = clan.id;
        store.insert_clan(clan).unwrap();
        store
            .update_account(user, |a| {
                a.clan_id = Some(clan_id);
                Ok(())
            })
            .unwrap();

        rewards
            .award(user, 50, ReasonCode::TaskCompleted, "task", Some(Reference::task(Uuid::new_v4())))
            .unwrap();

        let clan = store.clan(clan_id).unwrap();
        assert_eq!(clan.points, 50);
        assert_eq!(clan.member(user).unwrap().contributed_points, 50);

        // Penalties never decrease the clan aggregate.
        rewards.penalize(user, 40, "fraud").unwrap();
        assert_eq!(store.clan(clan_id).unwrap().points, 50);
    }

    #[test]
    fn test_streak_rolls_on_consecutive_days() {
        let (store, rewards, user) = setup();
        let now = Utc::now();
        store
            .update_account(user, |a| {
                a.streak = 3;
                a.last_action_date = Some(now - Duration::days(1));
                Ok(())
            })
            .unwrap();

        rewards
            .award(user, 10, ReasonCode::AdminAdjustment, "any action", None)
            .unwrap();
        let account = store.account(user).unwrap();
        assert_eq!(account.streak, 4);

        // Second action the same day does not increment again.
        rewards
            .award(user, 10, ReasonCode::AdminAdjustment, "second action", None)
            .unwrap();
        assert_eq!(store.account(user).unwrap().streak, 4);
    }

    #[test]
    fn test_streak_resets_after_gap() {
        let (store, rewards, user) = setup();
        store
            .update_account(user, |a| {
                a.streak = 12;
                a.last_action_date = Some(Utc::now() - Duration::days(3));
                Ok(())
            })
            .unwrap();

        rewards
            .award(user, 10, ReasonCode::AdminAdjustment, "back again", None)
            .unwrap();
        assert_eq!(store.account(user).unwrap().streak, 1);
    }

    #[test]
    fn test_record_login_pays_daily_and_milestone() {
        let (store, rewards, user) = setup();
        store
            .update_account(user, |a| {
                a.streak = 5;
                a.last_login = Some(Utc::now() - Duration::days(1));
                Ok(())
            })
            .unwrap();

        let account = rewards.record_login(user).unwrap();
        assert_eq!(account.streak, 6);
        assert_eq!(account.total_points, points::DAILY_STREAK);

        // Second login today: no double payout.
        let account = rewards.record_login(user).unwrap();
        assert_eq!(account.streak, 6);
        assert_eq!(account.total_points, points::DAILY_STREAK);
    }

    #[test]
    fn test_record_login_milestone_every_seventh_day() {
        let (store, rewards, user) = setup();
        store
            .update_account(user, |a| {
                a.streak = 6;
                a.last_login = Some(Utc::now() - Duration::days(1));
                Ok(())
            })
            .unwrap();

        let account = rewards.record_login(user).unwrap();
        assert_eq!(account.streak, 7);
        assert_eq!(account.total_points, points::STREAK_7_DAYS);
        let newest = &store.transactions_for_user(user).unwrap()[0];
        assert_eq!(newest.reason_code, ReasonCode::StreakMilestone);
    }

    #[test]
    fn test_badges_awarded_once() {
        let (store, rewards, user) = setup();
        store
            .update_account(user, |a| {
                a.contributions.reports_submitted = 5;
                Ok(())
            })
            .unwrap();

        let newly = rewards.check_badges(user).unwrap();
        assert_eq!(newly, vec!["Watchdog"]);
        let again = rewards.check_badges(user).unwrap();
        assert!(again.is_empty());

        let account = store.account(user).unwrap();
        assert_eq!(
            account.badges.iter().filter(|b| b.name == "Watchdog").count(),
            1
        );
    }

    #[test]
    fn test_points_master_badge_via_award() {
        let (store, rewards, user) = setup();
        rewards
            .award(user, 1000, ReasonCode::AdminAdjustment, "seed", None)
            .unwrap();
        assert!(store.account(user).unwrap().has_badge("Points Master"));
    }

    #[test]
    fn test_history_summary() {
        let (_, rewards, user) = setup();
        rewards
            .award(user, 100, ReasonCode::TaskCompleted, "task", None)
            .unwrap();
        rewards
            .award(user, 50, ReasonCode::SignupBonus, "welcome", None)
            .unwrap();
        rewards.penalize(user, 30, "fraud").unwrap();

        let history = rewards.history(user).unwrap();
        assert_eq!(history.transactions.len(), 3);
        assert_eq!(history.summary.earn, 100);
        assert_eq!(history.summary.bonus, 50);
        assert_eq!(history.summary.deduct, -30);
    }

    #[test]
    fn test_award_missing_user_is_not_found() {
        let (_, rewards, _) = setup();
        let err = rewards
            .award(Uuid::new_v4(), 10, ReasonCode::AdminAdjustment, "ghost", None)
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
