use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::api_error::ApiError;
use crate::http::AppState;
use crate::models::account::{Account, AccountResponse, RegisterAccountRequest};

/// POST /api/accounts
/// Register an account and pay the signup bonus.
pub async fn register(
    state: web::Data<AppState>,
    req: web::Json<RegisterAccountRequest>,
) -> Result<impl Responder, ApiError> {
    req.validate()?;
    if req.email.is_none() && req.phone.is_none() {
        return Err(ApiError::validation("email or phone is required"));
    }

    let account = Account::new(req.name.clone(), req.email.clone(), req.phone.clone());
    let account_id = account.id;
    state.rewards.register(account)?;
    let outcome = state.rewards.signup_bonus(account_id)?;

    info!(user_id = %account_id, "account registered");
    Ok(HttpResponse::Created().json(AccountResponse::from(outcome.account)))
}

/// POST /api/accounts/{id}/login
/// Record a login for streak accounting.
pub async fn login(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, ApiError> {
    let account = state.rewards.record_login(path.into_inner())?;
    Ok(HttpResponse::Ok().json(AccountResponse::from(account)))
}

/// GET /api/accounts/{id}
pub async fn get_account(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, ApiError> {
    let account = state.rewards.account(path.into_inner())?;
    Ok(HttpResponse::Ok().json(AccountResponse::from(account)))
}

#[derive(Debug, Deserialize)]
pub struct PenalizeRequest {
    pub value: i64,
    pub reason: String,
}

/// POST /api/accounts/{id}/penalize
/// Admin penalty: deducts points and increments the fraud-flag counter.
pub async fn penalize(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: web::Json<PenalizeRequest>,
) -> Result<impl Responder, ApiError> {
    let account = state
        .rewards
        .penalize(path.into_inner(), req.value, &req.reason)?;
    Ok(HttpResponse::Ok().json(AccountResponse::from(account)))
}

/// GET /api/accounts/{id}/points/history
pub async fn point_history(
    state: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<impl Responder, ApiError> {
    let history = state.rewards.history(path.into_inner())?;
    Ok(HttpResponse::Ok().json(history))
}
