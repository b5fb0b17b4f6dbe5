use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::api_error::ApiError;
use crate::config::ValidatorConfig;
use crate::models::report::Verdict;

/// What kind of entity a classification request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifyKind {
    Report,
    TaskProof,
}

/// Context passed alongside the media reference. The verdict is keyed by
/// `entity_id`; the pipeline re-fetches fresh entity state before applying
/// it, so the validator never holds live objects.
#[derive(Debug, Clone)]
pub struct ClassifyContext {
    pub entity_id: Uuid,
    pub kind: ClassifyKind,
    pub category: String,
}

pub type VerdictFuture<'a> = Pin<Box<dyn Future<Output = Result<Verdict, ApiError>> + Send + 'a>>;

/// Async verdict provider. Implementations may take arbitrarily long;
/// a non-response simply leaves the entity in its current status.
pub trait Validator: Send + Sync {
    fn classify<'a>(&'a self, media_ref: &'a str, context: &'a ClassifyContext) -> VerdictFuture<'a>;
}

/// Reference behavior: a fixed delay, then always valid.
pub struct SimulatedValidator {
    delay: Duration,
}

impl SimulatedValidator {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Validator for SimulatedValidator {
    fn classify<'a>(&'a self, _media_ref: &'a str, context: &'a ClassifyContext) -> VerdictFuture<'a> {
        Box::pin(async move {
            debug!(
                entity_id = %context.entity_id,
                kind = ?context.kind,
                category = %context.category,
                delay_ms = self.delay.as_millis() as u64,
                "simulated classification started"
            );
            tokio::time::sleep(self.delay).await;
            Ok(Verdict {
                valid: true,
                confidence: 0.95,
                fraud: false,
                reason: "Simulated verification".to_string(),
                processed_at: Utc::now(),
            })
        })
    }
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    image_url: &'a str,
    report_type: &'a str,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    is_valid: bool,
    confidence: f64,
    fraud_flag: bool,
    reason: String,
}

/// Client for the external image classifier service.
pub struct MlServiceValidator {
    base_url: String,
    client: reqwest::Client,
}

impl MlServiceValidator {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }
}

impl Validator for MlServiceValidator {
    fn classify<'a>(&'a self, media_ref: &'a str, context: &'a ClassifyContext) -> VerdictFuture<'a> {
        Box::pin(async move {
            let url = format!("{}/predict", self.base_url.trim_end_matches('/'));
            let request = PredictRequest {
                image_url: media_ref,
                report_type: &context.category,
            };

            let response = self
                .client
                .post(&url)
                .json(&request)
                .send()
                .await
                .map_err(|e| {
                    warn!(entity_id = %context.entity_id, error = %e, "classifier unreachable");
                    ApiError::unavailable(format!("classifier unreachable: {}", e))
                })?;

            let response = response.error_for_status().map_err(|e| {
                warn!(entity_id = %context.entity_id, error = %e, "classifier rejected request");
                ApiError::unavailable(format!("classifier error: {}", e))
            })?;

            let body: PredictResponse = response
                .json()
                .await
                .map_err(|e| ApiError::unavailable(format!("classifier response malformed: {}", e)))?;

            Ok(Verdict {
                valid: body.is_valid,
                confidence: body.confidence,
                fraud: body.fraud_flag,
                reason: body.reason,
                processed_at: Utc::now(),
            })
        })
    }
}

/// Build the validator from config: the HTTP classifier when a URL is
/// configured, otherwise the simulated one.
pub fn build_validator(config: &ValidatorConfig) -> std::sync::Arc<dyn Validator> {
    match &config.ml_service_url {
        Some(url) => std::sync::Arc::new(MlServiceValidator::new(url.clone())),
        None => std::sync::Arc::new(SimulatedValidator::new(Duration::from_millis(
            config.simulated_delay_ms,
        ))),
    }
}
