use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::api_error::ApiError;
use crate::models::ledger::{ReasonCode, Reference};
use crate::models::report::{Coordinates, Verdict};
use crate::models::task::{
    Assignment, AssignmentStatus, CompletionProof, CreateClanTaskRequest, JoinPinRequest,
    SubmitProofRequest, Task, TaskCategory, TaskStatus,
};
use crate::service::notifier_service::{event_payload, events, topics, Notifier};
use crate::service::reward_service::{points, RewardService};
use crate::service::validator_service::{ClassifyContext, ClassifyKind, Validator};
use crate::store::Store;

const DEFAULT_MAX_PARTICIPANTS: u32 = 10;

enum ProofVerdictOutcome {
    /// Verdict already applied for this proof; re-delivery is a no-op.
    Ignored,
    Rejected,
    PayAssignee,
}

/// Result of the bulk "verify mission" payout.
#[derive(Debug, Serialize)]
pub struct BulkPayout {
    pub task: Task,
    pub paid: Vec<Uuid>,
    pub failed: Vec<Uuid>,
    /// True when `reward_paid` was already set and nothing was attempted.
    pub already_settled: bool,
}

/// Task pipeline: assignment, per-member approval of clan broadcasts,
/// proof submission with per-user async verification, and the guarded
/// bulk payout.
#[derive(Clone)]
pub struct TaskService {
    store: Store,
    rewards: RewardService,
    notifier: Arc<dyn Notifier>,
    validator: Arc<dyn Validator>,
}

impl TaskService {
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

    /// Take a slot on an open task. Capacity is re-checked inside the
    /// write lock, so concurrent accepts for the last slot serialize and
    /// only one wins.
    pub fn accept(&self, task_id: Uuid, user_id: Uuid) -> Result<Task, ApiError> {
        self.store.account(user_id)?;
        let task = self.store.update_task(task_id, |task| {
            if task.status.is_terminal() {
                return Err(ApiError::invalid_state(format!(
                    "task {} is {}",
                    task.id, task.status
                )));
            }
            if task.assignment(user_id).is_some() {
                return Err(ApiError::conflict("already assigned to this task"));
            }
            if task.assigned_users.len() as u32 >= task.max_participants {
                return Err(ApiError::conflict("task is full"));
            }
            task.assigned_users.push(Assignment {
                user_id,
                status: AssignmentStatus::Assigned,
                joined_at: Utc::now(),
            });
            task.status = TaskStatus::InProgress;
            Ok(task.clone())
        })?;

        if let Some(clan_id) = task.clan_id {
            self.notifier.publish(
                &topics::clan(clan_id),
                event_payload(
                    events::TASK_ACCEPTED,
                    json!({ "task_id": task.id, "user_id": user_id }),
                ),
            );
        }
        info!(task_id = %task_id, user_id = %user_id, "task accepted");
        Ok(task)
    }

    /// Claim a mission from a map observation. Find-or-create is keyed by
    /// the pin id, so repeated claims converge on one task; joining twice
    /// is rejected.
    pub fn join_from_pin(&self, dto: JoinPinRequest) -> Result<Task, ApiError> {
        dto.validate()?;
        self.store.account(dto.user_id)?;

        let task = self.store.task_for_pin_or_insert(&dto.pin_id, || {
            let now = Utc::now();
            Task {
                id: Uuid::new_v4(),
                category: dto.category,
                title: dto.title.clone(),
                description: dto.description.clone(),
                linked_report_id: None,
                clan_id: None,
                map_pin_id: Some(dto.pin_id.clone()),
                coordinates: Some(Coordinates {
                    longitude: dto.longitude,
                    latitude: dto.latitude,
                }),
                status: TaskStatus::Open,
                max_participants: DEFAULT_MAX_PARTICIPANTS,
                assigned_users: Vec::new(),
                points_reward: points::TASK_COMPLETED,
                completion_proofs: Vec::new(),
                reward_paid: false,
                is_clan_broadcast: false,
                created_by: None,
                completed_at: None,
                created_at: now,
                updated_at: now,
            }
        })?;

        let task = self.store.update_task(task.id, |task| {
            if task.assignment(dto.user_id).is_some() {
                return Err(ApiError::conflict("already joined this mission"));
            }
            if task.assigned_users.len() as u32 >= task.max_participants {
                return Err(ApiError::conflict("mission is full"));
            }
            task.assigned_users.push(Assignment {
                user_id: dto.user_id,
                status: AssignmentStatus::Assigned,
                joined_at: Utc::now(),
            });
            task.status = TaskStatus::InProgress;
            Ok(task.clone())
        })?;

        info!(task_id = %task.id, user_id = %dto.user_id, pin_id = %dto.pin_id, "joined mission from pin");
        Ok(task)
    }

    /// Leader-only broadcast: snapshots the current roster and assigns
    /// every member with `pending_approval`.
    pub fn create_for_clan(&self, clan_id: Uuid, dto: CreateClanTaskRequest) -> Result<Task, ApiError> {
        dto.validate()?;
        let clan = self.store.clan(clan_id)?;
        if !clan.is_manager(dto.user_id) {
            return Err(ApiError::forbidden("only the clan leader can create tasks"));
        }

        let now = Utc::now();
        let assigned_users = clan
            .members
            .iter()
            .map(|m| Assignment {
                user_id: m.user_id,
                status: AssignmentStatus::PendingApproval,
                joined_at: now,
            })
            .collect::<Vec<_>>();
        let member_count = assigned_users.len() as u32;

        let task = Task {
            id: Uuid::new_v4(),
            category: dto.category,
            title: dto.title.clone(),
            description: dto.description,
            linked_report_id: None,
            clan_id: Some(clan_id),
            map_pin_id: None,
            coordinates: None,
            status: TaskStatus::Open,
            max_participants: member_count.max(DEFAULT_MAX_PARTICIPANTS),
            assigned_users,
            points_reward: dto.points_reward.unwrap_or(points::TASK_COMPLETED),
            completion_proofs: Vec::new(),
            reward_paid: false,
            is_clan_broadcast: true,
            created_by: Some(dto.user_id),
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_task(task.clone())?;

        self.notifier.publish(
            &topics::clan(clan_id),
            event_payload(
                events::CLAN_TASK_CREATED,
                json!({
                    "task_id": task.id,
                    "title": task.title,
                    "message": format!("New clan task: \"{}\" — approve to join!", task.title),
                }),
            ),
        );
        info!(
            task_id = %task.id,
            clan_id = %clan_id,
            members = member_count,
            "clan broadcast task created"
        );
        Ok(task)
    }

    /// A broadcast member approves their own pending entry.
    pub fn approve(&self, task_id: Uuid, user_id: Uuid) -> Result<Task, ApiError> {
        let task = self.store.update_task(task_id, |task| {
            if !task.is_clan_broadcast {
                return Err(ApiError::invalid_state("not a clan broadcast task"));
            }
            let entry = task
                .assignment_mut(user_id)
                .ok_or_else(|| ApiError::forbidden("you are not assigned to this task"))?;
            if entry.status != AssignmentStatus::PendingApproval {
                return Err(ApiError::conflict("already approved or completed"));
            }
            entry.status = AssignmentStatus::Assigned;
            entry.joined_at = Utc::now();
            task.status = TaskStatus::InProgress;
            Ok(task.clone())
        })?;

        if let Some(clan_id) = task.clan_id {
            self.notifier.publish(
                &topics::clan(clan_id),
                event_payload(
                    events::TASK_APPROVED,
                    json!({ "task_id": task.id, "user_id": user_id }),
                ),
            );
        }
        info!(task_id = %task_id, user_id = %user_id, "broadcast task approved");
        Ok(task)
    }

    /// Drop out of a task. Dropped entries are excluded from the
    /// all-completed check, which is re-evaluated here since the drop may
    /// leave only completed assignees behind.
    pub fn drop_assignment(&self, task_id: Uuid, user_id: Uuid) -> Result<Task, ApiError> {
        let task = self.store.update_task(task_id, |task| {
            let entry = task
                .assignment_mut(user_id)
                .ok_or_else(|| ApiError::forbidden("you are not assigned to this task"))?;
            if entry.status.is_terminal() {
                return Err(ApiError::conflict(format!(
                    "assignment already {}",
                    entry.status
                )));
            }
            entry.status = AssignmentStatus::Dropped;
            if task.status == TaskStatus::InProgress && task.all_assigned_completed() {
                task.status = TaskStatus::Completed;
                task.completed_at = Some(Utc::now());
            }
            Ok(task.clone())
        })?;
        info!(task_id = %task_id, user_id = %user_id, "assignment dropped");
        Ok(task)
    }

    /// Submit completion proof. Flips the caller's entry to `completed`
    /// and completes the task when every live assignee is done. The
    /// caller dispatches [`spawn_proof_validation`] out of band.
    ///
    /// [`spawn_proof_validation`]: TaskService::spawn_proof_validation
    pub fn submit_proof(&self, task_id: Uuid, dto: SubmitProofRequest) -> Result<Task, ApiError> {
        dto.validate()?;
        let user_id = dto.user_id;
        let task = self.store.update_task(task_id, |task| {
            let status = task
                .assignment(user_id)
                .map(|a| a.status)
                .ok_or_else(|| ApiError::forbidden("not assigned to this task"))?;
            match status {
                AssignmentStatus::Assigned => {}
                AssignmentStatus::PendingApproval => {
                    return Err(ApiError::invalid_state(
                        "approve the task before submitting proof",
                    ));
                }
                AssignmentStatus::Completed | AssignmentStatus::Dropped => {
                    return Err(ApiError::invalid_state(format!(
                        "assignment is already {}",
                        status
                    )));
                }
            }
            if task.proof(user_id).is_some() {
                return Err(ApiError::conflict("proof already submitted"));
            }

            task.completion_proofs.push(CompletionProof {
                user_id,
                proof_ref: dto.proof_ref.clone(),
                submitted_at: Utc::now(),
                verdict: None,
            });
            if let Some(entry) = task.assignment_mut(user_id) {
                entry.status = AssignmentStatus::Completed;
            }
            if task.all_assigned_completed() {
                task.status = TaskStatus::Completed;
                task.completed_at = Some(Utc::now());
            }
            Ok(task.clone())
        })?;

        info!(task_id = %task_id, user_id = %user_id, "completion proof submitted");
        Ok(task)
    }

    /// Out-of-band verification of one assignee's proof. The verdict is
    /// applied against re-fetched state; a non-response leaves the proof
    /// unverified.
    pub fn spawn_proof_validation(&self, task: &Task, user_id: Uuid, proof_ref: String) {
        let service = self.clone();
        let context = ClassifyContext {
            entity_id: task.id,
            kind: ClassifyKind::TaskProof,
            category: task.category.to_string(),
        };
        tokio::spawn(async move {
            match service.validator.classify(&proof_ref, &context).await {
                Ok(verdict) => {
                    if let Err(e) =
                        service.apply_proof_verdict(context.entity_id, user_id, verdict)
                    {
                        error!(
                            task_id = %context.entity_id,
                            user_id = %user_id,
                            error = %e,
                            "failed to apply proof verdict"
                        );
                    }
                }
                Err(e) => {
                    warn!(
                        task_id = %context.entity_id,
                        user_id = %user_id,
                        error = %e,
                        "classifier gave no verdict, proof stays unverified"
                    );
                }
            }
        });
    }

    /// Apply a classifier verdict for one assignee's proof. The proof's
    /// own verdict field is the per-user payout guard; the task-level
    /// `reward_paid` flag plays no part here.
    pub fn apply_proof_verdict(
        &self,
        task_id: Uuid,
        user_id: Uuid,
        verdict: Verdict,
    ) -> Result<Task, ApiError> {
        let outcome = self.store.update_task(task_id, |task| {
            let proof = task
                .completion_proofs
                .iter_mut()
                .find(|p| p.user_id == user_id)
                .ok_or_else(|| ApiError::not_found("completion proof for user", user_id))?;
            if proof.verdict.is_some() {
                return Ok(ProofVerdictOutcome::Ignored);
            }
            proof.verdict = Some(verdict.clone());
            if verdict.valid {
                Ok(ProofVerdictOutcome::PayAssignee)
            } else {
                Ok(ProofVerdictOutcome::Rejected)
            }
        })?;

        let task = self.store.task(task_id)?;
        match outcome {
            ProofVerdictOutcome::Ignored => {}
            ProofVerdictOutcome::Rejected => {
                info!(task_id = %task_id, user_id = %user_id, "proof rejected by classifier");
            }
            ProofVerdictOutcome::PayAssignee => {
                self.pay_assignee(&task, user_id)?;
                self.notifier.publish(
                    topics::GLOBAL,
                    event_payload(
                        events::TASK_COMPLETED,
                        json!({
                            "task_id": task.id,
                            "user_id": user_id,
                            "points_awarded": task.points_reward,
                        }),
                    ),
                );
            }
        }
        Ok(task)
    }

    fn pay_assignee(&self, task: &Task, user_id: Uuid) -> Result<(), ApiError> {
        let outcome = self.rewards.award(
            user_id,
            task.points_reward,
            ReasonCode::TaskCompleted,
            &format!("Task completed: {}", task.title),
            Some(Reference::task(task.id)),
        )?;
        if outcome.already_settled {
            return Ok(());
        }
        self.store.update_account(user_id, |a| {
            a.contributions.tasks_completed += 1;
            Ok(())
        })?;
        self.rewards.check_badges(user_id)?;
        self.bump_clan_impact(task, user_id);
        Ok(())
    }

    fn bump_clan_impact(&self, task: &Task, user_id: Uuid) {
        let clan_id = match self.store.account(user_id) {
            Ok(account) => account.clan_id,
            Err(_) => None,
        };
        let Some(clan_id) = clan_id else {
            return;
        };
        let result = self.store.update_clan(clan_id, |clan| {
            match task.category {
                TaskCategory::Tree | TaskCategory::Plantation => clan.impact.trees_planted += 1,
                TaskCategory::Garbage | TaskCategory::Cleanup => clan.impact.garbage_cleared += 1,
                TaskCategory::Water => clan.impact.water_issues_resolved += 1,
                TaskCategory::Awareness | TaskCategory::Other => {}
            }
            Ok(())
        });
        if let Err(e) = result {
            error!(clan_id = %clan_id, error = %e, "clan impact update failed");
        }
    }

    /// Bulk payout for an externally verified mission. `reward_paid` is
    /// checked-and-set before the loop starts, so a crash mid-loop or a
    /// concurrent retry can never re-pay users who already succeeded;
    /// per-user failures are logged and skipped for manual reconciliation.
    pub fn verify_mission(&self, task_id: Uuid) -> Result<BulkPayout, ApiError> {
        let to_pay = self.store.update_task(task_id, |task| {
            if task.reward_paid {
                return Ok(None);
            }
            task.reward_paid = true;
            Ok(Some(
                task.assigned_users
                    .iter()
                    .filter(|a| a.status != AssignmentStatus::Dropped)
                    .map(|a| a.user_id)
                    .collect::<Vec<_>>(),
            ))
        })?;

        let task = self.store.task(task_id)?;
        let Some(users) = to_pay else {
            info!(task_id = %task_id, "mission reward already paid, skipping");
            return Ok(BulkPayout {
                task,
                paid: Vec::new(),
                failed: Vec::new(),
                already_settled: true,
            });
        };

        let mut paid = Vec::new();
        let mut failed = Vec::new();
        for user_id in users {
            match self.pay_assignee(&task, user_id) {
                Ok(()) => paid.push(user_id),
                Err(e) => {
                    error!(
                        task_id = %task_id,
                        user_id = %user_id,
                        error = %e,
                        "bulk payout failed for user, continuing"
                    );
                    failed.push(user_id);
                }
            }
        }

        self.notifier.publish(
            topics::GLOBAL,
            event_payload(
                events::MISSION_COMPLETED,
                json!({
                    "task_id": task.id,
                    "title": task.title,
                    "points_awarded": task.points_reward,
                    "paid": paid.len(),
                }),
            ),
        );
        info!(
            task_id = %task_id,
            paid = paid.len(),
            failed = failed.len(),
            "mission verified and paid"
        );

        let task = self.store.task(task_id)?;
        Ok(BulkPayout {
            task,
            paid,
            failed,
            already_settled: false,
        })
    }

    pub fn get(&self, task_id: Uuid) -> Result<Task, ApiError> {
        self.store.task(task_id)
    }

    pub fn for_user(&self, user_id: Uuid) -> Result<Vec<Task>, ApiError> {
        self.store.tasks_for_user(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::account::Account;
    use crate::models::clan::{Clan, ClanMember, ClanRole};
    use crate::service::notifier_service::RecordingNotifier;
    use crate::service::validator_service::SimulatedValidator;
    use std::time::Duration;

    struct Harness {
        store: Store,
        service: TaskService,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness() -> Harness {
        let store = Store::new();
        let rewards = RewardService::new(store.clone());
        let notifier = Arc::new(RecordingNotifier::new());
        let validator = Arc::new(SimulatedValidator::new(Duration::from_millis(1)));
        let service = TaskService::new(store.clone(), rewards, notifier.clone(), validator);
        Harness {
            store,
            service,
            notifier,
        }
    }

    fn new_user(h: &Harness, name: &str) -> Uuid {
        let account = Account::new(name.to_string(), Some(format!("{}@example.com", name)), None);
        let id = account.id;
        h.store.insert_account(account).unwrap();
        id
    }

    fn new_clan(h: &Harness, members: &[(Uuid, ClanRole)]) -> Uuid {
        let clan = Clan {
            id: Uuid::new_v4(),
            name: "Bangalore EcoForce".to_string(),
            description: None,
            region: "Bangalore".to_string(),
            is_private: false,
            max_members: 50,
            members: members
                .iter()
                .map(|(user_id, role)| ClanMember {
                    user_id: *user_id,
                    role: *role,
                    joined_at: Utc::now(),
                    contributed_points: 0,
                })
                .collect(),
            join_requests: Vec::new(),
            invites: Vec::new(),
            points: 0,
            completed_tasks: 0,
            impact: Default::default(),
            activities: Vec::new(),
            created_by: members[0].0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let clan_id = clan.id;
        h.store.insert_clan(clan).unwrap();
        for (user_id, _) in members {
            h.store
                .update_account(*user_id, |a| {
                    a.clan_id = Some(clan_id);
                    Ok(())
                })
                .unwrap();
        }
        clan_id
    }

    fn open_task(h: &Harness, max_participants: u32) -> Uuid {
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            category: TaskCategory::Garbage,
            title: "Cleanup drive".to_string(),
            description: None,
            linked_report_id: None,
            clan_id: None,
            map_pin_id: None,
            coordinates: None,
            status: TaskStatus::Open,
            max_participants,
            assigned_users: Vec::new(),
            points_reward: points::TASK_COMPLETED,
            completion_proofs: Vec::new(),
            reward_paid: false,
            is_clan_broadcast: false,
            created_by: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        let id = task.id;
        h.store.insert_task(task).unwrap();
        id
    }

    fn valid_verdict() -> Verdict {
        Verdict {
            valid: true,
            confidence: 0.95,
            fraud: false,
            reason: "Simulated verification".to_string(),
            processed_at: Utc::now(),
        }
    }

    fn pin_request(user_id: Uuid, pin_id: &str) -> JoinPinRequest {
        JoinPinRequest {
            user_id,
            pin_id: pin_id.to_string(),
            title: "Garbage pile near park".to_string(),
            category: TaskCategory::Garbage,
            description: None,
            longitude: 77.5946,
            latitude: 12.9716,
        }
    }

    #[test]
    fn test_accept_assigns_and_flips_status() {
        let h = harness();
        let user = new_user(&h, "asha");
        let task_id = open_task(&h, 10);

        let task = h.service.accept(task_id, user).unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(
            task.assignment(user).unwrap().status,
            AssignmentStatus::Assigned
        );

        let err = h.service.accept(task_id, user).unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn test_accept_respects_capacity() {
        let h = harness();
        let task_id = open_task(&h, 1);
        let first = new_user(&h, "a");
        let second = new_user(&h, "b");

        h.service.accept(task_id, first).unwrap();
        let err = h.service.accept(task_id, second).unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn test_join_from_pin_is_find_or_create() {
        let h = harness();
        let a = new_user(&h, "a");
        let b = new_user(&h, "b");

        let first = h.service.join_from_pin(pin_request(a, "pin-42")).unwrap();
        let second = h.service.join_from_pin(pin_request(b, "pin-42")).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.assigned_users.len(), 2);

        let err = h.service.join_from_pin(pin_request(a, "pin-42")).unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn test_broadcast_requires_leader() {
        let h = harness();
        let leader = new_user(&h, "leader");
        let member = new_user(&h, "member");
        let clan_id = new_clan(&h, &[(leader, ClanRole::Leader), (member, ClanRole::Member)]);

        let dto = CreateClanTaskRequest {
            user_id: member,
            title: "Lake cleanup".to_string(),
            description: None,
            category: TaskCategory::Cleanup,
            points_reward: None,
        };
        let err = h.service.create_for_clan(clan_id, dto).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[test]
    fn test_broadcast_assigns_roster_pending_approval() {
        let h = harness();
        let leader = new_user(&h, "leader");
        let m1 = new_user(&h, "m1");
        let m2 = new_user(&h, "m2");
        let clan_id = new_clan(
            &h,
            &[
                (leader, ClanRole::Leader),
                (m1, ClanRole::Member),
                (m2, ClanRole::Member),
            ],
        );

        let task = h
            .service
            .create_for_clan(
                clan_id,
                CreateClanTaskRequest {
                    user_id: leader,
                    title: "Tree planting".to_string(),
                    description: None,
                    category: TaskCategory::Plantation,
                    points_reward: Some(60),
                },
            )
            .unwrap();

        assert!(task.is_clan_broadcast);
        assert_eq!(task.status, TaskStatus::Open);
        assert_eq!(task.assigned_users.len(), 3);
        assert!(task
            .assigned_users
            .iter()
            .all(|a| a.status == AssignmentStatus::PendingApproval));
        assert_eq!(
            h.notifier.events_on(&topics::clan(clan_id)),
            vec!["clan_task_created"]
        );
    }

    #[test]
    fn test_approve_guards() {
        let h = harness();
        let leader = new_user(&h, "leader");
        let outsider = new_user(&h, "outsider");
        let clan_id = new_clan(&h, &[(leader, ClanRole::Leader)]);
        let task = h
            .service
            .create_for_clan(
                clan_id,
                CreateClanTaskRequest {
                    user_id: leader,
                    title: "Awareness walk".to_string(),
                    description: None,
                    category: TaskCategory::Awareness,
                    points_reward: None,
                },
            )
            .unwrap();

        let err = h.service.approve(task.id, outsider).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        let approved = h.service.approve(task.id, leader).unwrap();
        assert_eq!(approved.status, TaskStatus::InProgress);

        let err = h.service.approve(task.id, leader).unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn test_broadcast_lifecycle_with_drop() {
        let h = harness();
        let leader = new_user(&h, "leader");
        let m1 = new_user(&h, "m1");
        let m2 = new_user(&h, "m2");
        let clan_id = new_clan(
            &h,
            &[
                (leader, ClanRole::Leader),
                (m1, ClanRole::Member),
                (m2, ClanRole::Member),
            ],
        );
        let task = h
            .service
            .create_for_clan(
                clan_id,
                CreateClanTaskRequest {
                    user_id: leader,
                    title: "River cleanup".to_string(),
                    description: None,
                    category: TaskCategory::Cleanup,
                    points_reward: None,
                },
            )
            .unwrap();

        // Two approve, one drops.
        let after_first = h.service.approve(task.id, leader).unwrap();
        assert_eq!(after_first.status, TaskStatus::InProgress);
        h.service.approve(task.id, m1).unwrap();
        h.service.drop_assignment(task.id, m2).unwrap();

        // First proof: task still in progress.
        let task_state = h
            .service
            .submit_proof(
                task.id,
                SubmitProofRequest {
                    user_id: leader,
                    proof_ref: "https://cdn.example.com/proof/1.jpg".to_string(),
                },
            )
            .unwrap();
        assert_eq!(task_state.status, TaskStatus::InProgress);

        // Second proof: every live assignee done, dropped member excluded.
        let task_state = h
            .service
            .submit_proof(
                task.id,
                SubmitProofRequest {
                    user_id: m1,
                    proof_ref: "https://cdn.example.com/proof/2.jpg".to_string(),
                },
            )
            .unwrap();
        assert_eq!(task_state.status, TaskStatus::Completed);
        assert!(task_state.completed_at.is_some());
    }

    #[test]
    fn test_submit_proof_guards() {
        let h = harness();
        let leader = new_user(&h, "leader");
        let outsider = new_user(&h, "outsider");
        let clan_id = new_clan(&h, &[(leader, ClanRole::Leader)]);
        let task = h
            .service
            .create_for_clan(
                clan_id,
                CreateClanTaskRequest {
                    user_id: leader,
                    title: "Compost pit".to_string(),
                    description: None,
                    category: TaskCategory::Other,
                    points_reward: None,
                },
            )
            .unwrap();

        // Not on the roster.
        let err = h
            .service
            .submit_proof(
                task.id,
                SubmitProofRequest {
                    user_id: outsider,
                    proof_ref: "x".to_string(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));

        // Still pending approval.
        let err = h
            .service
            .submit_proof(
                task.id,
                SubmitProofRequest {
                    user_id: leader,
                    proof_ref: "x".to_string(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidState(_)));
    }

    #[test]
    fn test_proof_verdict_pays_each_assignee_independently() {
        let h = harness();
        let a = new_user(&h, "a");
        let b = new_user(&h, "b");
        let task_id = open_task(&h, 10);
        h.service.accept(task_id, a).unwrap();
        h.service.accept(task_id, b).unwrap();

        h.service
            .submit_proof(
                task_id,
                SubmitProofRequest {
                    user_id: a,
                    proof_ref: "proof-a".to_string(),
                },
            )
            .unwrap();
        h.service.apply_proof_verdict(task_id, a, valid_verdict()).unwrap();

        assert_eq!(h.store.account(a).unwrap().total_points, 50);
        assert_eq!(h.store.account(a).unwrap().contributions.tasks_completed, 1);
        // B has not been verified yet, independent of A's payout.
        assert_eq!(h.store.account(b).unwrap().total_points, 0);

        // Re-delivered verdict is a no-op.
        h.service.apply_proof_verdict(task_id, a, valid_verdict()).unwrap();
        assert_eq!(h.store.account(a).unwrap().total_points, 50);
        assert_eq!(h.store.account(a).unwrap().contributions.tasks_completed, 1);
    }

    #[test]
    fn test_invalid_proof_verdict_pays_nothing() {
        let h = harness();
        let a = new_user(&h, "a");
        let task_id = open_task(&h, 10);
        h.service.accept(task_id, a).unwrap();
        h.service
            .submit_proof(
                task_id,
                SubmitProofRequest {
                    user_id: a,
                    proof_ref: "proof-a".to_string(),
                },
            )
            .unwrap();

        let verdict = Verdict {
            valid: false,
            confidence: 0.1,
            fraud: false,
            reason: "Low confidence score".to_string(),
            processed_at: Utc::now(),
        };
        h.service.apply_proof_verdict(task_id, a, verdict).unwrap();
        assert_eq!(h.store.account(a).unwrap().total_points, 0);
    }

    #[test]
    fn test_verify_mission_pays_all_once() {
        let h = harness();
        let a = new_user(&h, "a");
        let b = new_user(&h, "b");
        let task_id = open_task(&h, 10);
        h.service.accept(task_id, a).unwrap();
        h.service.accept(task_id, b).unwrap();

        let payout = h.service.verify_mission(task_id).unwrap();
        assert!(!payout.already_settled);
        assert_eq!(payout.paid.len(), 2);
        assert!(payout.failed.is_empty());
        assert!(payout.task.reward_paid);
        assert_eq!(h.store.account(a).unwrap().total_points, 50);
        assert_eq!(h.store.account(b).unwrap().total_points, 50);

        let second = h.service.verify_mission(task_id).unwrap();
        assert!(second.already_settled);
        assert_eq!(h.store.account(a).unwrap().total_points, 50);
    }

    #[test]
    fn test_verify_mission_excludes_dropped() {
        let h = harness();
        let a = new_user(&h, "a");
        let b = new_user(&h, "b");
        let task_id = open_task(&h, 10);
        h.service.accept(task_id, a).unwrap();
        h.service.accept(task_id, b).unwrap();
        h.service.drop_assignment(task_id, b).unwrap();

        let payout = h.service.verify_mission(task_id).unwrap();
        assert_eq!(payout.paid, vec![a]);
        assert_eq!(h.store.account(b).unwrap().total_points, 0);
    }

    #[test]
    fn test_verify_mission_concurrent_sets_flag_once() {
        let h = harness();
        let a = new_user(&h, "a");
        let task_id = open_task(&h, 10);
        h.service.accept(task_id, a).unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = h.service.clone();
            handles.push(std::thread::spawn(move || {
                service.verify_mission(task_id).unwrap()
            }));
        }
        let fresh_runs = handles
            .into_iter()
            .map(|j| j.join().unwrap())
            .filter(|p| !p.already_settled)
            .count();

        assert_eq!(fresh_runs, 1);
        assert_eq!(h.store.account(a).unwrap().total_points, 50);
        assert_eq!(h.store.transactions_for_user(a).unwrap().len(), 1);
    }

    #[test]
    fn test_verify_mission_after_proof_payout_does_not_double_pay() {
        let h = harness();
        let a = new_user(&h, "a");
        let task_id = open_task(&h, 10);
        h.service.accept(task_id, a).unwrap();
        h.service
            .submit_proof(
                task_id,
                SubmitProofRequest {
                    user_id: a,
                    proof_ref: "proof-a".to_string(),
                },
            )
            .unwrap();
        h.service.apply_proof_verdict(task_id, a, valid_verdict()).unwrap();
        assert_eq!(h.store.account(a).unwrap().total_points, 50);

        // The ledger key (user, task, task_completed) already exists, so
        // the bulk path settles without paying again.
        h.service.verify_mission(task_id).unwrap();
        assert_eq!(h.store.account(a).unwrap().total_points, 50);
        assert_eq!(h.store.account(a).unwrap().contributions.tasks_completed, 1);
    }

    #[test]
    fn test_verify_mission_continues_past_missing_account() {
        let h = harness();
        let a = new_user(&h, "a");
        let ghost = Uuid::new_v4();
        let task_id = open_task(&h, 10);
        h.service.accept(task_id, a).unwrap();
        // Inject an assignment for an account that does not exist.
        h.store
            .update_task(task_id, |task| {
                task.assigned_users.push(Assignment {
                    user_id: ghost,
                    status: AssignmentStatus::Assigned,
                    joined_at: Utc::now(),
                });
                Ok(())
            })
            .unwrap();

        let payout = h.service.verify_mission(task_id).unwrap();
        assert_eq!(payout.paid, vec![a]);
        assert_eq!(payout.failed, vec![ghost]);
        // The flag is set despite the partial failure: retries stay no-ops.
        assert!(h.service.verify_mission(task_id).unwrap().already_settled);
    }

    #[tokio::test]
    async fn test_spawned_proof_validation_pays() {
        let h = harness();
        let a = new_user(&h, "a");
        let task_id = open_task(&h, 10);
        h.service.accept(task_id, a).unwrap();
        let task = h
            .service
            .submit_proof(
                task_id,
                SubmitProofRequest {
                    user_id: a,
                    proof_ref: "proof-a".to_string(),
                },
            )
            .unwrap();
        h.service
            .spawn_proof_validation(&task, a, "proof-a".to_string());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.store.account(a).unwrap().total_points, 50);
        let task = h.store.task(task_id).unwrap();
        assert!(task.proof(a).unwrap().verdict.is_some());
    }
}
