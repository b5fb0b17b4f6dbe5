use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crate::api_error::ApiError;
use crate::models::account::Account;
use crate::models::clan::Clan;
use crate::models::ledger::{PointTransaction, ReasonCode, Reference};
use crate::models::report::Report;
use crate::models::task::Task;

/// In-memory document store, one collection per entity.
///
/// Each `update_*` method runs its closure inside a single write-lock
/// critical section, which serializes every check-and-set on that entity's
/// guard fields (`points_awarded`, `reward_paid`, proof verdicts,
/// membership capacity). Cross-collection flows take locks strictly one at
/// a time, in account -> ledger -> clan order, so the ledger entry is
/// never written before the account balance it describes.
#[derive(Clone, Default)]
pub struct Store {
    accounts: Arc<RwLock<HashMap<Uuid, Account>>>,
    reports: Arc<RwLock<HashMap<Uuid, Report>>>,
    tasks: Arc<RwLock<HashMap<Uuid, Task>>>,
    clans: Arc<RwLock<HashMap<Uuid, Clan>>>,
    ledger: Arc<RwLock<Vec<PointTransaction>>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Accounts =====

    pub fn insert_account(&self, account: Account) -> Result<(), ApiError> {
        let mut accounts = self
            .accounts
            .write()
            .map_err(|_| ApiError::unavailable("account store poisoned"))?;
        accounts.insert(account.id, account);
        Ok(())
    }

    pub fn account(&self, id: Uuid) -> Result<Account, ApiError> {
        let accounts = self
            .accounts
            .read()
            .map_err(|_| ApiError::unavailable("account store poisoned"))?;
        accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| ApiError::not_found("account", id))
    }

    pub fn update_account<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Account) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let mut accounts = self
            .accounts
            .write()
            .map_err(|_| ApiError::unavailable("account store poisoned"))?;
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| ApiError::not_found("account", id))?;
        let out = f(account)?;
        account.updated_at = chrono::Utc::now();
        Ok(out)
    }

    // ===== Reports =====

    pub fn insert_report(&self, report: Report) -> Result<(), ApiError> {
        let mut reports = self
            .reports
            .write()
            .map_err(|_| ApiError::unavailable("report store poisoned"))?;
        reports.insert(report.id, report);
        Ok(())
    }

    pub fn report(&self, id: Uuid) -> Result<Report, ApiError> {
        let reports = self
            .reports
            .read()
            .map_err(|_| ApiError::unavailable("report store poisoned"))?;
        reports
            .get(&id)
            .cloned()
            .ok_or_else(|| ApiError::not_found("report", id))
    }

    pub fn update_report<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Report) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let mut reports = self
            .reports
            .write()
            .map_err(|_| ApiError::unavailable("report store poisoned"))?;
        let report = reports
            .get_mut(&id)
            .ok_or_else(|| ApiError::not_found("report", id))?;
        let out = f(report)?;
        report.updated_at = chrono::Utc::now();
        Ok(out)
    }

    pub fn reports_for_user(&self, user_id: Uuid) -> Result<Vec<Report>, ApiError> {
        let reports = self
            .reports
            .read()
            .map_err(|_| ApiError::unavailable("report store poisoned"))?;
        let mut out: Vec<Report> = reports
            .values()
            .filter(|r| r.submitter_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    // ===== Tasks =====

    pub fn insert_task(&self, task: Task) -> Result<(), ApiError> {
        let mut tasks = self
            .tasks
            .write()
            .map_err(|_| ApiError::unavailable("task store poisoned"))?;
        tasks.insert(task.id, task);
        Ok(())
    }

    pub fn task(&self, id: Uuid) -> Result<Task, ApiError> {
        let tasks = self
            .tasks
            .read()
            .map_err(|_| ApiError::unavailable("task store poisoned"))?;
        tasks
            .get(&id)
            .cloned()
            .ok_or_else(|| ApiError::not_found("task", id))
    }

    pub fn update_task<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Task) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let mut tasks = self
            .tasks
            .write()
            .map_err(|_| ApiError::unavailable("task store poisoned"))?;
        let task = tasks
            .get_mut(&id)
            .ok_or_else(|| ApiError::not_found("task", id))?;
        let out = f(task)?;
        task.updated_at = chrono::Utc::now();
        Ok(out)
    }

    /// Find-or-create seam for map-pin claims. The closure only runs when
    /// no task exists for the pin yet; both lookup and insert happen under
    /// one write lock so two concurrent claims cannot create two tasks.
    pub fn task_for_pin_or_insert(
        &self,
        pin_id: &str,
        create: impl FnOnce() -> Task,
    ) -> Result<Task, ApiError> {
        let mut tasks = self
            .tasks
            .write()
            .map_err(|_| ApiError::unavailable("task store poisoned"))?;
        if let Some(existing) = tasks
            .values()
            .find(|t| t.map_pin_id.as_deref() == Some(pin_id))
        {
            return Ok(existing.clone());
        }
        let task = create();
        tasks.insert(task.id, task.clone());
        Ok(task)
    }

    pub fn tasks_for_user(&self, user_id: Uuid) -> Result<Vec<Task>, ApiError> {
        let tasks = self
            .tasks
            .read()
            .map_err(|_| ApiError::unavailable("task store poisoned"))?;
        let mut out: Vec<Task> = tasks
            .values()
            .filter(|t| t.assignment(user_id).is_some())
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    // ===== Clans =====

    pub fn insert_clan(&self, clan: Clan) -> Result<(), ApiError> {
        let mut clans = self
            .clans
            .write()
            .map_err(|_| ApiError::unavailable("clan store poisoned"))?;
        clans.insert(clan.id, clan);
        Ok(())
    }

    pub fn clan(&self, id: Uuid) -> Result<Clan, ApiError> {
        let clans = self
            .clans
            .read()
            .map_err(|_| ApiError::unavailable("clan store poisoned"))?;
        clans
            .get(&id)
            .cloned()
            .ok_or_else(|| ApiError::not_found("clan", id))
    }

    pub fn update_clan<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Clan) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let mut clans = self
            .clans
            .write()
            .map_err(|_| ApiError::unavailable("clan store poisoned"))?;
        let clan = clans
            .get_mut(&id)
            .ok_or_else(|| ApiError::not_found("clan", id))?;
        let out = f(clan)?;
        clan.updated_at = chrono::Utc::now();
        Ok(out)
    }

    pub fn remove_clan(&self, id: Uuid) -> Result<(), ApiError> {
        let mut clans = self
            .clans
            .write()
            .map_err(|_| ApiError::unavailable("clan store poisoned"))?;
        clans.remove(&id);
        Ok(())
    }

    pub fn clan_name_taken(&self, name: &str) -> Result<bool, ApiError> {
        let clans = self
            .clans
            .read()
            .map_err(|_| ApiError::unavailable("clan store poisoned"))?;
        Ok(clans.values().any(|c| c.name.eq_ignore_ascii_case(name)))
    }

    /// Clans ordered by aggregate points, highest first.
    pub fn clans_ranked(&self) -> Result<Vec<Clan>, ApiError> {
        let clans = self
            .clans
            .read()
            .map_err(|_| ApiError::unavailable("clan store poisoned"))?;
        let mut out: Vec<Clan> = clans.values().cloned().collect();
        out.sort_by(|a, b| b.points.cmp(&a.points));
        Ok(out)
    }

    // ===== Ledger =====

    pub fn append_transaction(&self, tx: PointTransaction) -> Result<(), ApiError> {
        let mut ledger = self
            .ledger
            .write()
            .map_err(|_| ApiError::unavailable("ledger store poisoned"))?;
        ledger.push(tx);
        Ok(())
    }

    /// Already-paid check for a `(user, reference, reason)` idempotency key.
    pub fn ledger_contains(
        &self,
        user_id: Uuid,
        reference: &Reference,
        reason_code: ReasonCode,
    ) -> Result<Option<PointTransaction>, ApiError> {
        let ledger = self
            .ledger
            .read()
            .map_err(|_| ApiError::unavailable("ledger store poisoned"))?;
        Ok(ledger
            .iter()
            .find(|tx| tx.matches_key(user_id, reference, reason_code))
            .cloned())
    }

    pub fn transactions_for_user(&self, user_id: Uuid) -> Result<Vec<PointTransaction>, ApiError> {
        let ledger = self
            .ledger
            .read()
            .map_err(|_| ApiError::unavailable("ledger store poisoned"))?;
        let mut out: Vec<PointTransaction> = ledger
            .iter()
            .filter(|tx| tx.user_id == user_id)
            .cloned()
            .collect();
        out.reverse();
        Ok(out)
    }

    pub fn transactions_for_clan(
        &self,
        clan_id: Uuid,
        limit: usize,
    ) -> Result<Vec<PointTransaction>, ApiError> {
        let ledger = self
            .ledger
            .read()
            .map_err(|_| ApiError::unavailable("ledger store poisoned"))?;
        let mut out: Vec<PointTransaction> = ledger
            .iter()
            .filter(|tx| tx.clan_id == Some(clan_id))
            .cloned()
            .collect();
        out.reverse();
        out.truncate(limit);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ledger::TransactionKind;

    #[test]
    fn test_account_round_trip() {
        let store = Store::new();
        let account = Account::new("Asha".to_string(), Some("asha@example.com".to_string()), None);
        let id = account.id;
        store.insert_account(account).unwrap();

        let loaded = store.account(id).unwrap();
        assert_eq!(loaded.name, "Asha");

        store
            .update_account(id, |a| {
                a.total_points += 30;
                Ok(())
            })
            .unwrap();
        assert_eq!(store.account(id).unwrap().total_points, 30);
    }

    #[test]
    fn test_missing_account_is_not_found() {
        let store = Store::new();
        let err = store.account(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn test_update_closure_error_propagates() {
        let store = Store::new();
        let account = Account::new("Ravi".to_string(), None, Some("+911234".to_string()));
        let id = account.id;
        store.insert_account(account).unwrap();

        let err = store
            .update_account::<()>(id, |_| Err(ApiError::conflict("nope")))
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn test_pin_find_or_create_is_idempotent() {
        let store = Store::new();
        let make = || crate::models::task::Task {
            id: Uuid::new_v4(),
            category: crate::models::task::TaskCategory::Other,
            title: "Pin claim".to_string(),
            description: None,
            linked_report_id: None,
            clan_id: None,
            map_pin_id: Some("pin-1".to_string()),
            coordinates: None,
            status: crate::models::task::TaskStatus::Open,
            max_participants: 10,
            assigned_users: Vec::new(),
            points_reward: 50,
            completion_proofs: Vec::new(),
            reward_paid: false,
            is_clan_broadcast: false,
            created_by: None,
            completed_at: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };

        let first = store.task_for_pin_or_insert("pin-1", make).unwrap();
        let second = store.task_for_pin_or_insert("pin-1", make).unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn test_ledger_key_lookup() {
        let store = Store::new();
        let user = Uuid::new_v4();
        let report = Uuid::new_v4();
        let reference = Reference::report(report);

        assert!(store
            .ledger_contains(user, &reference, ReasonCode::ReportSubmitted)
            .unwrap()
            .is_none());

        store
            .append_transaction(PointTransaction {
                id: Uuid::new_v4(),
                user_id: user,
                clan_id: None,
                kind: TransactionKind::Earn,
                value: 30,
                reason: "Report verified".to_string(),
                reason_code: ReasonCode::ReportSubmitted,
                reference: Some(reference.clone()),
                balance_before: 0,
                balance_after: 30,
                created_at: chrono::Utc::now(),
            })
            .unwrap();

        assert!(store
            .ledger_contains(user, &reference, ReasonCode::ReportSubmitted)
            .unwrap()
            .is_some());
    }
}
