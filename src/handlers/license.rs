use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::Result,
    handlers::response::MessageResponse,
    middleware_layer::rate_limit::ClientIp,
    models::license::{License, UsageEvent},
    services::license as license_service,
    state::AppState,
    validation::request::{parse_id, ValidJson, ValidQuery},
};

/// The request payload for license activation.
#[derive(Deserialize, Validate, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ActivateRequest {
    #[garde(length(min = 1, max = 1024))]
    pub key: String,
    #[garde(email)]
    pub email: String,
    #[garde(length(min = 1, max = 256))]
    pub hardware_id: String,
}

/// The request payload for operations addressing a license by key.
#[derive(Deserialize, Validate, Debug)]
pub struct KeyRequest {
    #[garde(length(min = 1, max = 1024))]
    pub key: String,
}

/// The query of a license validation.
#[derive(Deserialize, Validate, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ValidateQuery {
    #[garde(length(min = 1, max = 1024))]
    pub key: String,
    #[garde(length(min = 1, max = 256))]
    pub hardware_id: String,
}

/// The request payload for license creation.
#[derive(Deserialize, Validate, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateLicenseRequest {
    #[garde(length(min = 4, max = 256))]
    pub key: Option<String>,
    #[garde(range(min = 1, max = 10_000))]
    pub max_usage: Option<i32>,
    #[garde(range(min = 1, max = 36_500))]
    pub term_days: Option<i32>,
}

/// Status filter of the admin search.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    Active,
    Inactive,
}

/// The query of the admin search.
#[derive(Deserialize, Validate, Debug)]
pub struct SearchQuery {
    #[garde(length(min = 1, max = 256))]
    pub key: Option<String>,
    #[garde(skip)]
    pub status: Option<LicenseStatus>,
}

/// The validation verdict.
#[derive(Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
}

/// The response to license creation. The keys are shown this one time.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLicenseResponse {
    pub message: String,
    pub license: License,
    pub license_key: String,
    pub encrypted_key: String,
}

/// The expiry notification listing.
#[derive(Serialize)]
pub struct ExpiringResponse {
    pub licenses: Vec<License>,
}

/// Handles license activation.
pub async fn activate(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    ValidJson(payload): ValidJson<ActivateRequest>,
) -> Result<impl IntoResponse> {
    tracing::info!("🔑 License activation attempt from {}", ip);
    license_service::activate(&state, &ip, &payload.key, &payload.hardware_id).await?;
    Ok(MessageResponse::new("License activated successfully"))
}

/// Handles license deactivation.
pub async fn deactivate(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<KeyRequest>,
) -> Result<impl IntoResponse> {
    license_service::deactivate(&state, &payload.key).await?;
    Ok(MessageResponse::new("License deactivated successfully"))
}

/// Handles license validation.
pub async fn validate(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    ValidQuery(query): ValidQuery<ValidateQuery>,
) -> Result<impl IntoResponse> {
    let valid = license_service::validate(&state, &ip, &query.key, &query.hardware_id).await?;
    Ok(Json(ValidateResponse { valid }))
}

/// Handles license renewal.
pub async fn renew(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<KeyRequest>,
) -> Result<impl IntoResponse> {
    license_service::renew(&state, &payload.key).await?;
    Ok(MessageResponse::new("License renewed successfully"))
}

/// Lists active licenses expiring within a week.
pub async fn expiry_notification(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let licenses = license_service::expiring_soon(&state).await?;
    Ok(Json(ExpiringResponse { licenses }))
}

/// Aggregate license counts.
pub async fn analytics(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(license_service::analytics(&state).await?))
}

/// Handles license creation.
pub async fn create(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<CreateLicenseRequest>,
) -> Result<impl IntoResponse> {
    let created =
        license_service::create(&state, payload.key, payload.max_usage, payload.term_days).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateLicenseResponse {
            message: "License created successfully".to_string(),
            license: created.license,
            license_key: created.plaintext_key,
            encrypted_key: created.encrypted_key,
        }),
    ))
}

/// Handles license deletion.
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    license_service::delete(&state, parse_id(&id)?).await?;
    Ok(MessageResponse::new("License deleted successfully"))
}

/// Lists every license.
pub async fn list(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(license_service::search(&state, None, None).await?))
}

/// Searches licenses by plaintext key and status.
pub async fn search(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<SearchQuery>,
) -> Result<impl IntoResponse> {
    let is_active = query.status.map(|s| s == LicenseStatus::Active);
    let licenses = license_service::search(&state, query.key.as_deref(), is_active).await?;
    Ok(Json(licenses))
}

/// The usage history of one license.
pub async fn usage_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<UsageEvent>>> {
    let id: Uuid = parse_id(&id)?;
    let history = license_service::usage_history(&state, id).await?;
    if history.is_empty() {
        tracing::debug!("License {} has no usage history yet", id);
    }
    Ok(Json(history))
}
