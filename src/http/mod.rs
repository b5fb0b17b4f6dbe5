pub mod account_handler;
pub mod clan_handler;
pub mod health;
pub mod report_handler;
pub mod task_handler;

use crate::service::{ClanService, ReportService, RewardService, TaskService};

/// Application state shared by all handlers.
pub struct AppState {
    pub rewards: RewardService,
    pub reports: ReportService,
    pub tasks: TaskService,
    pub clans: ClanService,
}
