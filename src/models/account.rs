use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
    Ngo,
    Verifier,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Admin => write!(f, "admin"),
            Role::Ngo => write!(f, "ngo"),
            Role::Verifier => write!(f, "verifier"),
        }
    }
}

/// Earned badge. The badge set is append-only and unique by name;
/// name-uniqueness is the idempotency guard for repeated evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Badge {
    pub name: String,
    pub icon: String,
    pub description: String,
    pub earned_at: DateTime<Utc>,
}

/// Per-account impact and participation counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Contributions {
    pub trees_planted: u32,
    pub garbage_cleared: u32,
    pub water_issues_resolved: u32,
    pub reports_submitted: u32,
    pub tasks_completed: u32,
    pub verifications_completed: u32,
}

/// Level band in the fixed 10-band table. `max_points` is `None` for the
/// open-ended top band.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LevelBand {
    pub level: u32,
    pub name: &'static str,
    pub min_points: i64,
    pub max_points: Option<i64>,
}

pub static LEVELS: [LevelBand; 10] = [
    LevelBand { level: 1, name: "Seedling", min_points: 0, max_points: Some(99) },
    LevelBand { level: 2, name: "Sprout", min_points: 100, max_points: Some(299) },
    LevelBand { level: 3, name: "Sapling", min_points: 300, max_points: Some(599) },
    LevelBand { level: 4, name: "Tree", min_points: 600, max_points: Some(999) },
    LevelBand { level: 5, name: "Guardian", min_points: 1000, max_points: Some(1499) },
    LevelBand { level: 6, name: "Protector", min_points: 1500, max_points: Some(2499) },
    LevelBand { level: 7, name: "Champion", min_points: 2500, max_points: Some(3999) },
    LevelBand { level: 8, name: "Eco Hero", min_points: 4000, max_points: Some(5999) },
    LevelBand { level: 9, name: "Earth Guardian", min_points: 6000, max_points: Some(9999) },
    LevelBand { level: 10, name: "Planet Savior", min_points: 10000, max_points: None },
];

/// Highest band whose minimum is <= the balance. Pure function of the
/// balance; the stored `level` is only a cache of this.
pub fn level_for_points(points: i64) -> u32 {
    LEVELS
        .iter()
        .rev()
        .find(|band| points >= band.min_points)
        .map(|band| band.level)
        .unwrap_or(1)
}

pub fn level_band(points: i64) -> &'static LevelBand {
    LEVELS
        .iter()
        .rev()
        .find(|band| points >= band.min_points)
        .unwrap_or(&LEVELS[0])
}

/// A user's mutable aggregate state. Created at registration, mutated by
/// the reward engine (balance/level/streak/badges), the clan registry
/// (`clan_id`) and admin actions (ban, fraud flags). Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    /// Weak reference; the membership roster on the clan is authoritative.
    pub clan_id: Option<Uuid>,
    pub region: Option<String>,
    pub total_points: i64,
    pub level: u32,
    pub streak: u32,
    pub last_login: Option<DateTime<Utc>>,
    pub last_action_date: Option<DateTime<Utc>>,
    pub badges: Vec<Badge>,
    pub contributions: Contributions,
    pub fraud_flags: u32,
    pub is_banned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(name: String, email: Option<String>, phone: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            email,
            phone,
            role: Role::User,
            clan_id: None,
            region: None,
            total_points: 0,
            level: 1,
            streak: 0,
            last_login: None,
            last_action_date: None,
            badges: Vec::new(),
            contributions: Contributions::default(),
            fraud_flags: 0,
            is_banned: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn calculate_level(&self) -> u32 {
        level_for_points(self.total_points)
    }

    pub fn has_badge(&self, name: &str) -> bool {
        self.badges.iter().any(|b| b.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RegisterAccountRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: Uuid,
    pub name: String,
    pub clan_id: Option<Uuid>,
    pub total_points: i64,
    pub level: u32,
    pub level_name: &'static str,
    pub streak: u32,
    pub badges: Vec<Badge>,
    pub contributions: Contributions,
    pub is_banned: bool,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        let level_name = level_band(account.total_points).name;
        Self {
            id: account.id,
            name: account.name,
            clan_id: account.clan_id,
            total_points: account.total_points,
            level: account.level,
            level_name,
            streak: account.streak,
            badges: account.badges,
            contributions: account.contributions,
            is_banned: account.is_banned,
        }
    }
}
