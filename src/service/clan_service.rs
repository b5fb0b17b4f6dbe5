use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;
use validator::Validate;

use crate::api_error::ApiError;
use crate::models::clan::{
    Activity, ActivityCategory, ActivityParticipant, ActivityStatus, Clan, ClanMember, ClanRole,
    ClanSummary, CreateClanRequest, Invite, InviteStatus, JoinRequest, ProposeActivityRequest,
    DEFAULT_CLAN_CAPACITY, MAX_CLAN_CAPACITY, MIN_CLAN_CAPACITY,
};
use crate::models::ledger::ReasonCode;
use crate::service::notifier_service::{event_payload, events, topics, Notifier};
use crate::service::reward_service::{points, RewardService};
use crate::store::Store;

/// Result of a join call against a private or public clan.
#[derive(Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    Requested,
}

/// Clan registry: membership, capacity, requests/invites, leadership
/// succession and clan activities. Every membership-adding write
/// re-validates capacity inside the clan's write lock.
#[derive(Clone)]
pub struct ClanService {
    store: Store,
    rewards: RewardService,
    notifier: Arc<dyn Notifier>,
}

impl ClanService {
    pub fn new(store: Store, rewards: RewardService, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            rewards,
            notifier,
        }
    }

    /// Create a clan with the caller as its sole leader.
    pub fn create(&self, dto: CreateClanRequest) -> Result<Clan, ApiError> {
        dto.validate()?;
        let account = self.store.account(dto.user_id)?;
        if account.clan_id.is_some() {
            return Err(ApiError::conflict(
                "leave your current clan before creating a new one",
            ));
        }
        if self.store.clan_name_taken(&dto.name)? {
            return Err(ApiError::conflict("clan name already taken"));
        }

        let now = Utc::now();
        let clan = Clan {
            id: Uuid::new_v4(),
            name: dto.name,
            description: dto.description,
            region: dto.region,
            is_private: dto.is_private.unwrap_or(false),
            max_members: dto
                .max_members
                .unwrap_or(DEFAULT_CLAN_CAPACITY)
                .clamp(MIN_CLAN_CAPACITY, MAX_CLAN_CAPACITY),
            members: vec![ClanMember {
                user_id: dto.user_id,
                role: ClanRole::Leader,
                joined_at: now,
                contributed_points: 0,
            }],
            join_requests: Vec::new(),
            invites: Vec::new(),
            points: 0,
            completed_tasks: 0,
            impact: Default::default(),
            activities: Vec::new(),
            created_by: dto.user_id,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_clan(clan.clone())?;
        self.store.update_account(dto.user_id, |a| {
            a.clan_id = Some(clan.id);
            Ok(())
        })?;

        info!(clan_id = %clan.id, name = %clan.name, leader = %dto.user_id, "clan created");
        Ok(clan)
    }

    /// Join a clan. Public clans admit immediately (leaving any previous
    /// clan first); private clans record a join request and leave the
    /// caller's current membership untouched until approval.
    pub fn join(&self, clan_id: Uuid, user_id: Uuid) -> Result<JoinOutcome, ApiError> {
        let account = self.store.account(user_id)?;

        // Early guards on a snapshot; the admitting write re-checks all of
        // them under the lock.
        let clan = self.store.clan(clan_id)?;
        if clan.is_member(user_id) {
            return Err(ApiError::conflict("already a member"));
        }
        if clan.has_pending_request(user_id) {
            return Err(ApiError::conflict("join request already sent"));
        }
        if clan.is_full() {
            return Err(ApiError::conflict(format!(
                "clan is full ({} members max)",
                clan.max_members
            )));
        }

        if clan.is_private {
            self.store.update_clan(clan_id, |clan| {
                if clan.is_member(user_id) {
                    return Err(ApiError::conflict("already a member"));
                }
                if clan.has_pending_request(user_id) {
                    return Err(ApiError::conflict("join request already sent"));
                }
                clan.join_requests.push(JoinRequest {
                    user_id,
                    name: account.name.clone(),
                    requested_at: Utc::now(),
                });
                Ok(())
            })?;
            info!(clan_id = %clan_id, user_id = %user_id, "join request recorded");
            return Ok(JoinOutcome::Requested);
        }

        if let Some(prior) = account.clan_id {
            self.remove_membership(prior, user_id)?;
        }
        self.admit_member(clan_id, user_id)?;

        self.notifier.publish(
            &topics::clan(clan_id),
            event_payload(
                events::MEMBER_JOINED,
                json!({ "clan_id": clan_id, "user_id": user_id, "name": account.name }),
            ),
        );
        Ok(JoinOutcome::Joined)
    }

    /// Leader approves a pending join request.
    pub fn approve_request(
        &self,
        clan_id: Uuid,
        approver_id: Uuid,
        target_id: Uuid,
    ) -> Result<Clan, ApiError> {
        let clan = self.store.clan(clan_id)?;
        if !clan.is_manager(approver_id) {
            return Err(ApiError::forbidden(
                "only the clan leader can approve requests",
            ));
        }
        if !clan.has_pending_request(target_id) {
            return Err(ApiError::not_found("join request for user", target_id));
        }
        let target = self.store.account(target_id)?;
        if let Some(prior) = target.clan_id {
            if prior != clan_id {
                self.remove_membership(prior, target_id)?;
            }
        }

        self.store.update_clan(clan_id, |clan| {
            let idx = clan
                .join_requests
                .iter()
                .position(|r| r.user_id == target_id)
                .ok_or_else(|| ApiError::not_found("join request for user", target_id))?;
            if clan.is_full() {
                return Err(ApiError::conflict("clan is now full, cannot approve"));
            }
            clan.join_requests.remove(idx);
            clan.members.push(ClanMember {
                user_id: target_id,
                role: ClanRole::Member,
                joined_at: Utc::now(),
                contributed_points: 0,
            });
            Ok(())
        })?;
        self.store.update_account(target_id, |a| {
            a.clan_id = Some(clan_id);
            Ok(())
        })?;

        info!(clan_id = %clan_id, user_id = %target_id, approver = %approver_id, "join request approved");
        self.store.clan(clan_id)
    }

    pub fn reject_request(
        &self,
        clan_id: Uuid,
        approver_id: Uuid,
        target_id: Uuid,
    ) -> Result<(), ApiError> {
        let clan = self.store.clan(clan_id)?;
        if !clan.is_manager(approver_id) {
            return Err(ApiError::forbidden(
                "only the clan leader can reject requests",
            ));
        }
        self.store.update_clan(clan_id, |clan| {
            clan.join_requests.retain(|r| r.user_id != target_id);
            Ok(())
        })?;
        info!(clan_id = %clan_id, user_id = %target_id, "join request rejected");
        Ok(())
    }

    /// Leader invites a user.
    pub fn invite(&self, clan_id: Uuid, inviter_id: Uuid, target_id: Uuid) -> Result<(), ApiError> {
        let clan = self.store.clan(clan_id)?;
        if !clan.is_manager(inviter_id) {
            return Err(ApiError::forbidden("only leaders can invite members"));
        }
        let target = self.store.account(target_id)?;

        self.store.update_clan(clan_id, |clan| {
            if clan.is_member(target_id) {
                return Err(ApiError::conflict("user is already a member"));
            }
            if clan.pending_invite(target_id).is_some() {
                return Err(ApiError::conflict("user already has a pending invite"));
            }
            clan.invites.push(Invite {
                user_id: target_id,
                username: target.name.clone(),
                sent_at: Utc::now(),
                status: InviteStatus::Pending,
            });
            Ok(())
        })?;
        info!(clan_id = %clan_id, target = %target_id, inviter = %inviter_id, "invite sent");
        Ok(())
    }

    /// Accept or decline a pending invite. Accepting re-checks capacity
    /// under the lock; a full clan declines the invite and fails.
    pub fn respond_invite(
        &self,
        clan_id: Uuid,
        user_id: Uuid,
        accept: bool,
    ) -> Result<(), ApiError> {
        let account = self.store.account(user_id)?;
        let clan = self.store.clan(clan_id)?;
        if clan.pending_invite(user_id).is_none() {
            return Err(ApiError::not_found("pending invite for user", user_id));
        }

        if !accept {
            self.store.update_clan(clan_id, |clan| {
                if let Some(invite) = clan
                    .invites
                    .iter_mut()
                    .find(|i| i.user_id == user_id && i.status == InviteStatus::Pending)
                {
                    invite.status = InviteStatus::Declined;
                }
                Ok(())
            })?;
            info!(clan_id = %clan_id, user_id = %user_id, "invite declined");
            return Ok(());
        }

        if let Some(prior) = account.clan_id {
            if prior != clan_id {
                self.remove_membership(prior, user_id)?;
            }
        }
        self.store.update_clan(clan_id, |clan| {
            if clan.is_member(user_id) {
                return Err(ApiError::conflict("already a member"));
            }
            let full = clan.members.len() as u32 >= clan.max_members;
            let invite = clan
                .invites
                .iter_mut()
                .find(|i| i.user_id == user_id && i.status == InviteStatus::Pending)
                .ok_or_else(|| ApiError::not_found("pending invite for user", user_id))?;
            if full {
                invite.status = InviteStatus::Declined;
                return Err(ApiError::conflict("clan is full, cannot join"));
            }
            invite.status = InviteStatus::Accepted;
            clan.members.push(ClanMember {
                user_id,
                role: ClanRole::Member,
                joined_at: Utc::now(),
                contributed_points: 0,
            });
            Ok(())
        })?;
        self.store.update_account(user_id, |a| {
            a.clan_id = Some(clan_id);
            Ok(())
        })?;

        self.notifier.publish(
            &topics::clan(clan_id),
            event_payload(
                events::MEMBER_JOINED,
                json!({ "clan_id": clan_id, "user_id": user_id, "name": account.name }),
            ),
        );
        info!(clan_id = %clan_id, user_id = %user_id, "invite accepted");
        Ok(())
    }

    /// Leave a clan. A departing leader hands off to the most senior
    /// co-leader, else the most senior member; the last member leaving
    /// dissolves the clan.
    pub fn leave(&self, clan_id: Uuid, user_id: Uuid) -> Result<(), ApiError> {
        self.remove_membership(clan_id, user_id)?;
        self.store.update_account(user_id, |a| {
            if a.clan_id == Some(clan_id) {
                a.clan_id = None;
            }
            Ok(())
        })?;
        info!(clan_id = %clan_id, user_id = %user_id, "left clan");
        Ok(())
    }

    fn remove_membership(&self, clan_id: Uuid, user_id: Uuid) -> Result<(), ApiError> {
        let dissolved = self.store.update_clan(clan_id, |clan| {
            let idx = clan
                .members
                .iter()
                .position(|m| m.user_id == user_id)
                .ok_or_else(|| ApiError::not_found("membership for user", user_id))?;
            let removed = clan.members.remove(idx);
            if removed.role == ClanRole::Leader {
                promote_successor(clan);
            }
            Ok(clan.members.is_empty())
        })?;
        if dissolved {
            self.store.remove_clan(clan_id)?;
            info!(clan_id = %clan_id, "last member left, clan dissolved");
        }
        Ok(())
    }

    fn admit_member(&self, clan_id: Uuid, user_id: Uuid) -> Result<(), ApiError> {
        self.store.update_clan(clan_id, |clan| {
            if clan.is_member(user_id) {
                return Err(ApiError::conflict("already a member"));
            }
            // Capacity re-validated immediately before the write: two
            // racers for the last slot serialize here and one fails.
            if clan.is_full() {
                return Err(ApiError::conflict(format!(
                    "clan is full ({} members max)",
                    clan.max_members
                )));
            }
            clan.members.push(ClanMember {
                user_id,
                role: ClanRole::Member,
                joined_at: Utc::now(),
                contributed_points: 0,
            });
            Ok(())
        })?;
        self.store.update_account(user_id, |a| {
            a.clan_id = Some(clan_id);
            Ok(())
        })
    }

    // ===== Activities =====

    /// Propose an activity. Any member may propose; the proposer is the
    /// first participant.
    pub fn propose_activity(
        &self,
        clan_id: Uuid,
        dto: ProposeActivityRequest,
    ) -> Result<Activity, ApiError> {
        dto.validate()?;
        let account = self.store.account(dto.user_id)?;
        let activity = self.store.update_clan(clan_id, |clan| {
            if !clan.is_member(dto.user_id) {
                return Err(ApiError::forbidden("only clan members can propose activities"));
            }
            let now = Utc::now();
            let activity = Activity {
                id: Uuid::new_v4(),
                title: dto.title.clone(),
                description: dto.description.clone(),
                category: dto.category.unwrap_or(ActivityCategory::Other),
                date: dto.date,
                location: dto.location.clone(),
                proposed_by: dto.user_id,
                proposed_by_name: account.name.clone(),
                proposed_at: now,
                participants: vec![ActivityParticipant {
                    user_id: dto.user_id,
                    name: account.name.clone(),
                    joined_at: now,
                }],
                status: ActivityStatus::Active,
                completed_at: None,
                points_awarded: 0,
            };
            clan.activities.push(activity.clone());
            Ok(activity)
        })?;

        self.notifier.publish(
            &topics::clan(clan_id),
            event_payload(
                events::ACTIVITY_PROPOSED,
                json!({
                    "clan_id": clan_id,
                    "activity_id": activity.id,
                    "title": activity.title,
                    "proposer": account.name,
                }),
            ),
        );
        info!(clan_id = %clan_id, activity_id = %activity.id, "activity proposed");
        Ok(activity)
    }

    pub fn join_activity(
        &self,
        clan_id: Uuid,
        activity_id: Uuid,
        user_id: Uuid,
    ) -> Result<Activity, ApiError> {
        let account = self.store.account(user_id)?;
        self.store.update_clan(clan_id, |clan| {
            if !clan.is_member(user_id) {
                return Err(ApiError::forbidden("only clan members can join activities"));
            }
            let activity = clan
                .activity_mut(activity_id)
                .ok_or_else(|| ApiError::not_found("activity", activity_id))?;
            if activity.status != ActivityStatus::Active {
                return Err(ApiError::invalid_state("this activity is no longer active"));
            }
            if activity.has_participant(user_id) {
                return Err(ApiError::conflict("already joined this activity"));
            }
            activity.participants.push(ActivityParticipant {
                user_id,
                name: account.name.clone(),
                joined_at: Utc::now(),
            });
            Ok(activity.clone())
        })
    }

    pub fn unjoin_activity(
        &self,
        clan_id: Uuid,
        activity_id: Uuid,
        user_id: Uuid,
    ) -> Result<Activity, ApiError> {
        self.store.update_clan(clan_id, |clan| {
            let activity = clan
                .activity_mut(activity_id)
                .ok_or_else(|| ApiError::not_found("activity", activity_id))?;
            activity.participants.retain(|p| p.user_id != user_id);
            Ok(activity.clone())
        })
    }

    /// Complete an activity (proposer or leader only). Pays the clan
    /// bonus, a personal bonus per participant through the reward engine,
    /// and bumps impact counters by category. The `active -> completed`
    /// transition is the payout guard.
    pub fn complete_activity(
        &self,
        clan_id: Uuid,
        activity_id: Uuid,
        user_id: Uuid,
    ) -> Result<Activity, ApiError> {
        let (clan_bonus, participants, title) = self.store.update_clan(clan_id, |clan| {
            let is_manager = clan.is_manager(user_id);
            let activity = clan
                .activity_mut(activity_id)
                .ok_or_else(|| ApiError::not_found("activity", activity_id))?;
            if activity.status != ActivityStatus::Active {
                return Err(ApiError::invalid_state(format!(
                    "activity is already {:?}",
                    activity.status
                )));
            }
            if !is_manager && activity.proposed_by != user_id {
                return Err(ApiError::forbidden(
                    "only the proposer or leader can mark this complete",
                ));
            }

            let participant_count = activity.participants.len() as i64;
            let clan_bonus = points::ACTIVITY_CLAN_BASE
                + points::ACTIVITY_CLAN_PER_PARTICIPANT * participant_count;
            activity.status = ActivityStatus::Completed;
            activity.completed_at = Some(Utc::now());
            activity.points_awarded = clan_bonus;
            let participants: Vec<Uuid> =
                activity.participants.iter().map(|p| p.user_id).collect();
            let category = activity.category;
            let title = activity.title.clone();

            clan.points += clan_bonus;
            clan.completed_tasks += 1;
            match category {
                ActivityCategory::Plantation => {
                    clan.impact.trees_planted += participant_count as u32
                }
                ActivityCategory::Cleanup => {
                    clan.impact.garbage_cleared += 2 * participant_count as u32
                }
                ActivityCategory::Water => clan.impact.water_issues_resolved += 1,
                _ => {}
            }
            Ok((clan_bonus, participants, title))
        })?;

        // Personal bonuses continue past individual failures; the
        // activity is already completed either way.
        for participant in &participants {
            let result = self.rewards.award(
                *participant,
                points::ACTIVITY_PERSONAL,
                ReasonCode::ClanBonus,
                &format!("Activity completed: {}", title),
                None,
            );
            if let Err(e) = result {
                error!(
                    clan_id = %clan_id,
                    user_id = %participant,
                    error = %e,
                    "activity bonus payout failed, continuing"
                );
            }
        }

        self.notifier.publish(
            &topics::clan(clan_id),
            event_payload(
                events::ACTIVITY_COMPLETED,
                json!({
                    "clan_id": clan_id,
                    "activity_id": activity_id,
                    "title": title,
                    "clan_points_earned": clan_bonus,
                }),
            ),
        );
        info!(
            clan_id = %clan_id,
            activity_id = %activity_id,
            clan_bonus = clan_bonus,
            participants = participants.len(),
            "activity completed"
        );

        let clan = self.store.clan(clan_id)?;
        clan.activity(activity_id)
            .cloned()
            .ok_or_else(|| ApiError::not_found("activity", activity_id))
    }

    // ===== Queries =====

    pub fn get(&self, clan_id: Uuid) -> Result<Clan, ApiError> {
        self.store.clan(clan_id)
    }

    pub fn leaderboard(&self, limit: usize) -> Result<Vec<ClanSummary>, ApiError> {
        let ranked = self.store.clans_ranked()?;
        Ok(ranked
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, clan)| ClanSummary {
                id: clan.id,
                name: clan.name,
                region: clan.region,
                points: clan.points,
                member_count: clan.members.len(),
                impact: clan.impact,
                rank: i + 1,
            })
            .collect())
    }
}

/// Exactly one leader per clan: promote the most senior co-leader, or the
/// most senior member when no co-leader exists.
fn promote_successor(clan: &mut Clan) {
    if clan.members.is_empty() {
        return;
    }
    let successor = clan
        .members
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role == ClanRole::CoLeader)
        .min_by_key(|(_, m)| m.joined_at)
        .map(|(i, _)| i)
        .or_else(|| {
            clan.members
                .iter()
                .enumerate()
                .min_by_key(|(_, m)| m.joined_at)
                .map(|(i, _)| i)
        });
    if let Some(idx) = successor {
        clan.members[idx].role = ClanRole::Leader;
    }
}
