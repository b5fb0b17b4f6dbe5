use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

pub const MIN_CLAN_CAPACITY: u32 = 2;
pub const MAX_CLAN_CAPACITY: u32 = 500;
pub const DEFAULT_CLAN_CAPACITY: u32 = 50;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ClanRole {
    Leader,
    CoLeader,
    Member,
}

impl ClanRole {
    pub fn can_manage(&self) -> bool {
        matches!(self, ClanRole::Leader | ClanRole::CoLeader)
    }
}

impl std::fmt::Display for ClanRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClanRole::Leader => write!(f, "leader"),
            ClanRole::CoLeader => write!(f, "co-leader"),
            ClanRole::Member => write!(f, "member"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClanMember {
    pub user_id: Uuid,
    pub role: ClanRole,
    pub joined_at: DateTime<Utc>,
    pub contributed_points: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub user_id: Uuid,
    pub name: String,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Declined,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invite {
    pub user_id: Uuid,
    pub username: String,
    pub sent_at: DateTime<Utc>,
    pub status: InviteStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Active,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActivityCategory {
    Cleanup,
    Plantation,
    Awareness,
    Water,
    Recycling,
    Energy,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityParticipant {
    pub user_id: Uuid,
    pub name: String,
    pub joined_at: DateTime<Utc>,
}

/// Ad hoc clan-proposed event: `active` until the proposer or a leader
/// completes it, which pays the clan bonus exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: ActivityCategory,
    pub date: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub proposed_by: Uuid,
    pub proposed_by_name: String,
    pub proposed_at: DateTime<Utc>,
    pub participants: Vec<ActivityParticipant>,
    pub status: ActivityStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub points_awarded: i64,
}

impl Activity {
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.participants.iter().any(|p| p.user_id == user_id)
    }
}

/// Aggregate environmental impact counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Impact {
    pub trees_planted: u32,
    pub garbage_cleared: u32,
    pub water_issues_resolved: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clan {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub region: String,
    pub is_private: bool,
    pub max_members: u32,
    pub members: Vec<ClanMember>,
    pub join_requests: Vec<JoinRequest>,
    pub invites: Vec<Invite>,
    /// Aggregate score. Monotonically increased by reward contributions,
    /// never decreased by task or report rewards.
    pub points: i64,
    pub completed_tasks: u32,
    pub impact: Impact,
    pub activities: Vec<Activity>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Clan {
    pub fn member(&self, user_id: Uuid) -> Option<&ClanMember> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    pub fn member_mut(&mut self, user_id: Uuid) -> Option<&mut ClanMember> {
        self.members.iter_mut().find(|m| m.user_id == user_id)
    }

    pub fn is_member(&self, user_id: Uuid) -> bool {
        self.member(user_id).is_some()
    }

    pub fn is_manager(&self, user_id: Uuid) -> bool {
        self.member(user_id).map(|m| m.role.can_manage()).unwrap_or(false)
    }

    pub fn is_full(&self) -> bool {
        self.members.len() as u32 >= self.max_members
    }

    pub fn has_pending_request(&self, user_id: Uuid) -> bool {
        self.join_requests.iter().any(|r| r.user_id == user_id)
    }

    pub fn pending_invite(&self, user_id: Uuid) -> Option<&Invite> {
        self.invites
            .iter()
            .find(|i| i.user_id == user_id && i.status == InviteStatus::Pending)
    }

    pub fn activity(&self, activity_id: Uuid) -> Option<&Activity> {
        self.activities.iter().find(|a| a.id == activity_id)
    }

    pub fn activity_mut(&mut self, activity_id: Uuid) -> Option<&mut Activity> {
        self.activities.iter_mut().find(|a| a.id == activity_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateClanRequest {
    pub user_id: Uuid,
    #[validate(length(min = 3, max = 60))]
    pub name: String,
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub region: String,
    pub is_private: Option<bool>,
    pub max_members: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProposeActivityRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub description: Option<String>,
    pub category: Option<ActivityCategory>,
    pub date: Option<DateTime<Utc>>,
    pub location: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClanSummary {
    pub id: Uuid,
    pub name: String,
    pub region: String,
    pub points: i64,
    pub member_count: usize,
    pub impact: Impact,
    pub rank: usize,
}
