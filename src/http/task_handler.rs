use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::api_error::ApiError;
use crate::http::AppState;
use crate::models::task::{JoinPinRequest, SubmitProofRequest};

#[derive(Debug, Deserialize)]
pub struct ActingUser {
    pub user_id: Uuid,
}

/// POST /api/tasks/{id}/accept
pub async fn accept_task(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<ActingUser>,
) -> Result<impl Responder, ApiError> {
    let task = state.tasks.accept(path.into_inner(), req.user_id)?;
    Ok(HttpResponse::Ok().json(task))
}

/// POST /api/tasks/join
/// Claim a mission from a map pin (find-or-create).
pub async fn join_from_pin(
    state: web::Data<AppState>,
    req: web::Json<JoinPinRequest>,
) -> Result<impl Responder, ApiError> {
    let task = state.tasks.join_from_pin(req.into_inner())?;
    Ok(HttpResponse::Ok().json(task))
}

/// POST /api/tasks/{id}/approve
/// Broadcast-task member approves their pending entry.
pub async fn approve_task(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<ActingUser>,
) -> Result<impl Responder, ApiError> {
    let task = state.tasks.approve(path.into_inner(), req.user_id)?;
    Ok(HttpResponse::Ok().json(task))
}

/// POST /api/tasks/{id}/drop
pub async fn drop_assignment(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<ActingUser>,
) -> Result<impl Responder, ApiError> {
    let task = state.tasks.drop_assignment(path.into_inner(), req.user_id)?;
    Ok(HttpResponse::Ok().json(task))
}

/// POST /api/tasks/{id}/complete
/// Submit completion proof; verification is dispatched out of band.
pub async fn submit_proof(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<SubmitProofRequest>,
) -> Result<impl Responder, ApiError> {
    let task_id = path.into_inner();
    let req = req.into_inner();
    let user_id = req.user_id;
    let proof_ref = req.proof_ref.clone();

    let task = state.tasks.submit_proof(task_id, req)?;
    state.tasks.spawn_proof_validation(&task, user_id, proof_ref);
    info!(task_id = %task_id, user_id = %user_id, "proof accepted, verification pending");
    Ok(HttpResponse::Ok().json(task))
}

/// DELETE /api/tasks/{id}/verify
/// Bulk "verify mission" payout for all current assignees.
pub async fn verify_mission(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, ApiError> {
    let payout = state.tasks.verify_mission(path.into_inner())?;
    Ok(HttpResponse::Ok().json(payout))
}

/// GET /api/tasks/{id}
pub async fn get_task(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, ApiError> {
    let task = state.tasks.get(path.into_inner())?;
    Ok(HttpResponse::Ok().json(task))
}

/// GET /api/tasks/user/{user_id}
pub async fn tasks_for_user(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, ApiError> {
    let tasks = state.tasks.for_user(path.into_inner())?;
    Ok(HttpResponse::Ok().json(tasks))
}
