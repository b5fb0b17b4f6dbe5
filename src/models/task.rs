#![allow(dead_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::report::{Coordinates, Verdict};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskCategory {
    Tree,
    Garbage,
    Water,
    Plantation,
    Cleanup,
    Awareness,
    Other,
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskCategory::Tree => write!(f, "tree"),
            TaskCategory::Garbage => write!(f, "garbage"),
            TaskCategory::Water => write!(f, "water"),
            TaskCategory::Plantation => write!(f, "plantation"),
            TaskCategory::Cleanup => write!(f, "cleanup"),
            TaskCategory::Awareness => write!(f, "awareness"),
            TaskCategory::Other => write!(f, "other"),
        }
    }
}

/// Task-level status, derived from the per-assignment states: `Open` until
/// someone is assigned, `InProgress` while work is underway, `Completed`
/// once every non-dropped assignee has completed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn can_transition_to(&self, to: &TaskStatus) -> bool {
        match (self, to) {
            (TaskStatus::Open, TaskStatus::InProgress) => true,
            (TaskStatus::Open, TaskStatus::Cancelled) => true,
            (TaskStatus::InProgress, TaskStatus::Completed) => true,
            (TaskStatus::InProgress, TaskStatus::Cancelled) => true,
            (a, b) if a == b => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Open => write!(f, "open"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Per-assignee state. Broadcast tasks start members at `PendingApproval`;
/// direct joins start at `Assigned`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    PendingApproval,
    Assigned,
    Completed,
    Dropped,
}

impl AssignmentStatus {
    pub fn can_transition_to(&self, to: &AssignmentStatus) -> bool {
        match (self, to) {
            (AssignmentStatus::PendingApproval, AssignmentStatus::Assigned) => true,
            (AssignmentStatus::PendingApproval, AssignmentStatus::Dropped) => true,
            (AssignmentStatus::Assigned, AssignmentStatus::Completed) => true,
            (AssignmentStatus::Assigned, AssignmentStatus::Dropped) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AssignmentStatus::Completed | AssignmentStatus::Dropped)
    }
}

impl std::fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssignmentStatus::PendingApproval => write!(f, "pending_approval"),
            AssignmentStatus::Assigned => write!(f, "assigned"),
            AssignmentStatus::Completed => write!(f, "completed"),
            AssignmentStatus::Dropped => write!(f, "dropped"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub user_id: Uuid,
    pub status: AssignmentStatus,
    pub joined_at: DateTime<Utc>,
}

/// Completion evidence for one assignee. At most one per user; the verdict
/// field doubles as the per-user payout guard for the async verification
/// path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionProof {
    pub user_id: Uuid,
    pub proof_ref: String,
    pub submitted_at: DateTime<Utc>,
    pub verdict: Option<Verdict>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub category: TaskCategory,
    pub title: String,
    pub description: Option<String>,
    pub linked_report_id: Option<Uuid>,
    pub clan_id: Option<Uuid>,
    /// Set for tasks claimed from a map observation; find-or-create key.
    pub map_pin_id: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub status: TaskStatus,
    pub max_participants: u32,
    pub assigned_users: Vec<Assignment>,
    pub points_reward: i64,
    pub completion_proofs: Vec<CompletionProof>,
    /// Bulk-payout guard. Set exactly once, checked-and-set before any
    /// payout loop starts.
    pub reward_paid: bool,
    pub is_clan_broadcast: bool,
    pub created_by: Option<Uuid>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn assignment(&self, user_id: Uuid) -> Option<&Assignment> {
        self.assigned_users.iter().find(|a| a.user_id == user_id)
    }

    pub fn assignment_mut(&mut self, user_id: Uuid) -> Option<&mut Assignment> {
        self.assigned_users.iter_mut().find(|a| a.user_id == user_id)
    }

    pub fn proof(&self, user_id: Uuid) -> Option<&CompletionProof> {
        self.completion_proofs.iter().find(|p| p.user_id == user_id)
    }

    /// Dropped assignees are excluded from the all-completed check.
    pub fn all_assigned_completed(&self) -> bool {
        let live: Vec<_> = self
            .assigned_users
            .iter()
            .filter(|a| a.status != AssignmentStatus::Dropped)
            .collect();
        !live.is_empty() && live.iter().all(|a| a.status == AssignmentStatus::Completed)
    }

    pub fn active_assignee_count(&self) -> usize {
        self.assigned_users
            .iter()
            .filter(|a| a.status != AssignmentStatus::Dropped)
            .count()
    }
}

// ===== Service DTOs =====

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateClanTaskRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub description: Option<String>,
    pub category: TaskCategory,
    pub points_reward: Option<i64>,
}

/// Claim of a map observation. The pin itself lives in the external map
/// facility; the engine only owns the backing task.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct JoinPinRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1, max = 64))]
    pub pin_id: String,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    pub category: TaskCategory,
    pub description: Option<String>,
    pub longitude: f64,
    pub latitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitProofRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1, max = 2048))]
    pub proof_ref: String,
}
