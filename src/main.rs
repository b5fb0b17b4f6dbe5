use actix_web::{web, App, HttpServer};
use std::io;
use std::sync::Arc;
use tokio::signal;

mod api_error;
mod config;
mod http;
mod middleware;
mod models;
mod service;
mod store;
mod telemetry;

use crate::config::Config;
use crate::http::AppState;
use crate::middleware::cors_middleware;
use crate::service::notifier_service::LogNotifier;
use crate::service::validator_service::build_validator;
use crate::service::{ClanService, ReportService, RewardService, TaskService};
use crate::store::Store;
use crate::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> io::Result<()> {
    // Load configuration
    let config = Config::from_env().expect("Failed to load configuration");

    // Initialize telemetry
    init_telemetry();

    // Wire the engine
    let store = Store::new();
    let notifier = Arc::new(LogNotifier);
    let validator = build_validator(&config.validator);
    let rewards = RewardService::new(store.clone());
    let reports = ReportService::new(
        store.clone(),
        rewards.clone(),
        notifier.clone(),
        validator.clone(),
    );
    let tasks = TaskService::new(
        store.clone(),
        rewards.clone(),
        notifier.clone(),
        validator.clone(),
    );
    let clans = ClanService::new(store.clone(), rewards.clone(), notifier.clone());

    let state = web::Data::new(AppState {
        rewards,
        reports,
        tasks,
        clans,
    });

    tracing::info!(
        "Starting EcoQuest backend server on {}:{}",
        config.server.host,
        config.server.port
    );

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(cors_middleware())
            .wrap(actix_web::middleware::Logger::default())
            .service(
                web::scope("/api")
                    .route("/health", web::get().to(http::health::health_check))
                    // Accounts
                    .route("/accounts", web::post().to(http::account_handler::register))
                    .route(
                        "/accounts/{id}",
                        web::get().to(http::account_handler::get_account),
                    )
                    .route(
                        "/accounts/{id}/login",
                        web::post().to(http::account_handler::login),
                    )
                    .route(
                        "/accounts/{id}/penalize",
                        web::post().to(http::account_handler::penalize),
                    )
                    .route(
                        "/accounts/{id}/points/history",
                        web::get().to(http::account_handler::point_history),
                    )
                    // Reports
                    .route("/reports", web::post().to(http::report_handler::submit_report))
                    .route(
                        "/reports/user/{user_id}",
                        web::get().to(http::report_handler::reports_for_user),
                    )
                    .route("/reports/{id}", web::get().to(http::report_handler::get_report))
                    .route(
                        "/reports/{id}/verify",
                        web::post().to(http::report_handler::cast_vote),
                    )
                    .route(
                        "/reports/{id}/status",
                        web::put().to(http::report_handler::set_status),
                    )
                    // Tasks
                    .route("/tasks/join", web::post().to(http::task_handler::join_from_pin))
                    .route(
                        "/tasks/user/{user_id}",
                        web::get().to(http::task_handler::tasks_for_user),
                    )
                    .route("/tasks/{id}", web::get().to(http::task_handler::get_task))
                    .route(
                        "/tasks/{id}/accept",
                        web::post().to(http::task_handler::accept_task),
                    )
                    .route(
                        "/tasks/{id}/approve",
                        web::post().to(http::task_handler::approve_task),
                    )
                    .route(
                        "/tasks/{id}/drop",
                        web::post().to(http::task_handler::drop_assignment),
                    )
                    .route(
                        "/tasks/{id}/complete",
                        web::post().to(http::task_handler::submit_proof),
                    )
                    .route(
                        "/tasks/{id}/verify",
                        web::delete().to(http::task_handler::verify_mission),
                    )
                    // Clans
                    .route("/clans", web::post().to(http::clan_handler::create_clan))
                    .route(
                        "/clans/leaderboard/global",
                        web::get().to(http::clan_handler::leaderboard),
                    )
                    .route("/clans/{id}", web::get().to(http::clan_handler::get_clan))
                    .route("/clans/{id}/join", web::post().to(http::clan_handler::join_clan))
                    .route("/clans/{id}/leave", web::post().to(http::clan_handler::leave_clan))
                    .route(
                        "/clans/{id}/requests/{user_id}/approve",
                        web::post().to(http::clan_handler::approve_request),
                    )
                    .route(
                        "/clans/{id}/requests/{user_id}/reject",
                        web::post().to(http::clan_handler::reject_request),
                    )
                    .route("/clans/{id}/invite", web::post().to(http::clan_handler::invite))
                    .route(
                        "/clans/{id}/invites/respond",
                        web::post().to(http::clan_handler::respond_invite),
                    )
                    .route(
                        "/clans/{id}/points",
                        web::get().to(http::clan_handler::clan_point_history),
                    )
                    .route(
                        "/clans/{id}/tasks",
                        web::post().to(http::clan_handler::create_clan_task),
                    )
                    .route(
                        "/clans/{id}/activities",
                        web::post().to(http::clan_handler::propose_activity),
                    )
                    .route(
                        "/clans/{id}/activities/{activity_id}/join",
                        web::post().to(http::clan_handler::join_activity),
                    )
                    .route(
                        "/clans/{id}/activities/{activity_id}/unjoin",
                        web::post().to(http::clan_handler::unjoin_activity),
                    )
                    .route(
                        "/clans/{id}/activities/{activity_id}/complete",
                        web::post().to(http::clan_handler::complete_activity),
                    ),
            )
    })
    .bind((config.server.host.clone(), config.server.port))?
    .run();

    // Graceful shutdown
    let server_handle = server.handle();
    tokio::spawn(async move {
        signal::ctrl_c()
            .await
            .expect("Failed to listen for shutdown signal");
        tracing::info!("Shutdown signal received, stopping server...");
        server_handle.stop(true).await;
    });

    server.await
}
