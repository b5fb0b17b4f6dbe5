use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use uuid::Uuid;

use crate::api_error::ApiError;
use crate::http::AppState;
use crate::models::clan::{CreateClanRequest, ProposeActivityRequest};
use crate::models::task::CreateClanTaskRequest;
use crate::service::clan_service::JoinOutcome;

#[derive(Debug, Deserialize)]
pub struct ActingUser {
    pub user_id: Uuid,
}

/// POST /api/clans
pub async fn create_clan(
    state: web::Data<AppState>,
    req: web::Json<CreateClanRequest>,
) -> Result<impl Responder, ApiError> {
    let clan = state.clans.create(req.into_inner())?;
    Ok(HttpResponse::Created().json(clan))
}

/// POST /api/clans/{id}/join
pub async fn join_clan(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<ActingUser>,
) -> Result<impl Responder, ApiError> {
    let outcome = state.clans.join(path.into_inner(), req.user_id)?;
    let message = match outcome {
        JoinOutcome::Joined => "Joined the clan!",
        JoinOutcome::Requested => "Join request sent! Waiting for leader approval.",
    };
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": message })))
}

/// POST /api/clans/{id}/leave
pub async fn leave_clan(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<ActingUser>,
) -> Result<impl Responder, ApiError> {
    state.clans.leave(path.into_inner(), req.user_id)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Left clan successfully" })))
}

/// POST /api/clans/{id}/requests/{user_id}/approve
pub async fn approve_request(
    state: web::Data<AppState>,
    path: web::Path<(Uuid, Uuid)>,
    req: web::Json<ActingUser>,
) -> Result<impl Responder, ApiError> {
    let (clan_id, target_id) = path.into_inner();
    let clan = state.clans.approve_request(clan_id, req.user_id, target_id)?;
    Ok(HttpResponse::Ok().json(clan))
}

/// POST /api/clans/{id}/requests/{user_id}/reject
pub async fn reject_request(
    state: web::Data<AppState>,
    path: web::Path<(Uuid, Uuid)>,
    req: web::Json<ActingUser>,
) -> Result<impl Responder, ApiError> {
    let (clan_id, target_id) = path.into_inner();
    state.clans.reject_request(clan_id, req.user_id, target_id)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Join request rejected" })))
}

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub user_id: Uuid,
    pub target_user_id: Uuid,
}

/// POST /api/clans/{id}/invite
pub async fn invite(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<InviteRequest>,
) -> Result<impl Responder, ApiError> {
    state
        .clans
        .invite(path.into_inner(), req.user_id, req.target_user_id)?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Invite sent" })))
}

#[derive(Debug, Deserialize)]
pub struct RespondInviteRequest {
    pub user_id: Uuid,
    pub accept: bool,
}

/// POST /api/clans/{id}/invites/respond
pub async fn respond_invite(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<RespondInviteRequest>,
) -> Result<impl Responder, ApiError> {
    state
        .clans
        .respond_invite(path.into_inner(), req.user_id, req.accept)?;
    let message = if req.accept { "Invite accepted" } else { "Invite declined" };
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": message })))
}

/// GET /api/clans/{id}
pub async fn get_clan(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, ApiError> {
    let clan = state.clans.get(path.into_inner())?;
    Ok(HttpResponse::Ok().json(clan))
}

/// GET /api/clans/leaderboard/global
pub async fn leaderboard(state: web::Data<AppState>) -> Result<impl Responder, ApiError> {
    let board = state.clans.leaderboard(50)?;
    Ok(HttpResponse::Ok().json(board))
}

/// GET /api/clans/{id}/points
pub async fn clan_point_history(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, ApiError> {
    let transactions = state.rewards.clan_history(path.into_inner(), 50)?;
    Ok(HttpResponse::Ok().json(transactions))
}

/// POST /api/clans/{id}/tasks
/// Leader broadcasts a task to every current member.
pub async fn create_clan_task(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<CreateClanTaskRequest>,
) -> Result<impl Responder, ApiError> {
    let task = state.tasks.create_for_clan(path.into_inner(), req.into_inner())?;
    Ok(HttpResponse::Created().json(task))
}

/// POST /api/clans/{id}/activities
pub async fn propose_activity(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<ProposeActivityRequest>,
) -> Result<impl Responder, ApiError> {
    let activity = state
        .clans
        .propose_activity(path.into_inner(), req.into_inner())?;
    Ok(HttpResponse::Created().json(activity))
}

/// POST /api/clans/{id}/activities/{activity_id}/join
pub async fn join_activity(
    state: web::Data<AppState>,
    path: web::Path<(Uuid, Uuid)>,
    req: web::Json<ActingUser>,
) -> Result<impl Responder, ApiError> {
    let (clan_id, activity_id) = path.into_inner();
    let activity = state.clans.join_activity(clan_id, activity_id, req.user_id)?;
    Ok(HttpResponse::Ok().json(activity))
}

/// POST /api/clans/{id}/activities/{activity_id}/unjoin
pub async fn unjoin_activity(
    state: web::Data<AppState>,
    path: web::Path<(Uuid, Uuid)>,
    req: web::Json<ActingUser>,
) -> Result<impl Responder, ApiError> {
    let (clan_id, activity_id) = path.into_inner();
    let activity = state
        .clans
        .unjoin_activity(clan_id, activity_id, req.user_id)?;
    Ok(HttpResponse::Ok().json(activity))
}

/// POST /api/clans/{id}/activities/{activity_id}/complete
pub async fn complete_activity(
    state: web::Data<AppState>,
    path: web::Path<(Uuid, Uuid)>,
    req: web::Json<ActingUser>,
) -> Result<impl Responder, ApiError> {
    let (clan_id, activity_id) = path.into_inner();
    let activity = state
        .clans
        .complete_activity(clan_id, activity_id, req.user_id)?;
    Ok(HttpResponse::Ok().json(activity))
}
