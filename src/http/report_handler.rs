use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::api_error::ApiError;
use crate::http::AppState;
use crate::models::report::{CastVoteRequest, ReportResponse, ReportStatus, SubmitReportRequest};

/// POST /api/reports
/// Submit a report; classification is dispatched out of band.
pub async fn submit_report(
    state: web::Data<AppState>,
    req: web::Json<SubmitReportRequest>,
) -> Result<impl Responder, ApiError> {
    info!(user_id = %req.user_id, category = %req.category, "received report submission");
    let report = state.reports.submit(req.into_inner())?;
    state.reports.spawn_validation(&report);
    Ok(HttpResponse::Created().json(ReportResponse::from(report)))
}

/// GET /api/reports/{id}
pub async fn get_report(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, ApiError> {
    let report = state.reports.get(path.into_inner())?;
    Ok(HttpResponse::Ok().json(report))
}

/// GET /api/reports/user/{user_id}
pub async fn reports_for_user(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, ApiError> {
    let reports = state.reports.for_user(path.into_inner())?;
    Ok(HttpResponse::Ok().json(reports))
}

/// POST /api/reports/{id}/verify
/// Community verification vote.
pub async fn cast_vote(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<CastVoteRequest>,
) -> Result<impl Responder, ApiError> {
    let report = state.reports.cast_vote(path.into_inner(), req.into_inner())?;
    Ok(HttpResponse::Ok().json(report))
}

#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    pub user_id: Uuid,
    pub status: ReportStatus,
    pub reason: Option<String>,
}

/// PUT /api/reports/{id}/status
/// Admin status override.
pub async fn set_status(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<SetStatusRequest>,
) -> Result<impl Responder, ApiError> {
    let req = req.into_inner();
    let report = state
        .reports
        .set_status(path.into_inner(), req.user_id, req.status, req.reason)?;
    Ok(HttpResponse::Ok().json(report))
}
