use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, Result},
    handlers::response::MessageResponse,
    models::role::Role,
    services::roles as role_service,
    state::AppState,
    validation::{
        auth as rules,
        request::{parse_id, ValidJson},
    },
};

/// The request payload for role creation.
#[derive(Deserialize, Validate)]
pub struct CreateRoleRequest {
    #[garde(custom(rules::identifier))]
    pub name: String,
    #[garde(length(max = 500))]
    pub description: Option<String>,
    #[garde(custom(rules::permission_list))]
    pub permissions: Vec<String>,
}

/// The request payload for a role edit.
#[derive(Deserialize, Validate)]
pub struct UpdateRoleRequest {
    #[garde(skip)]
    pub name: Option<String>,
    #[garde(length(max = 500))]
    pub description: Option<String>,
    #[garde(skip)]
    pub permissions: Option<Vec<String>>,
}

/// The request payload replacing a role's permissions.
#[derive(Deserialize, Validate)]
pub struct PermissionsRequest {
    #[garde(custom(rules::permission_list))]
    pub permissions: Vec<String>,
}

/// A role change acknowledged with the resulting role.
#[derive(Serialize)]
pub struct RoleResponse {
    pub message: String,
    pub role: Role,
}

/// Lists roles.
pub async fn list(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(role_service::list(&state).await?))
}

/// Creates a role.
pub async fn create(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<CreateRoleRequest>,
) -> Result<impl IntoResponse> {
    let role =
        role_service::create(&state, &payload.name, payload.description, payload.permissions).await?;
    Ok((
        StatusCode::CREATED,
        Json(RoleResponse {
            message: "Role created successfully".to_string(),
            role,
        }),
    ))
}

/// Edits a role.
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidJson(payload): ValidJson<UpdateRoleRequest>,
) -> Result<impl IntoResponse> {
    if let Some(name) = &payload.name {
        rules::identifier(name, &())
            .map_err(|e| AppError::Validation(format!("name: {}", e)))?;
    }
    if let Some(permissions) = &payload.permissions {
        rules::permission_list(permissions, &())
            .map_err(|e| AppError::Validation(format!("permissions: {}", e)))?;
    }
    let role = role_service::update(
        &state,
        parse_id(&id)?,
        payload.name,
        payload.description,
        payload.permissions,
    )
    .await?;
    Ok(Json(RoleResponse {
        message: "Role updated successfully".to_string(),
        role,
    }))
}

/// Deletes a role.
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    role_service::delete(&state, parse_id(&id)?).await?;
    Ok(MessageResponse::new("Role deleted successfully"))
}

/// Returns a role's permissions.
pub async fn permissions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let role = role_service::find(&state, parse_id(&id)?).await?;
    Ok(Json(role.permissions))
}

/// Replaces a role's permissions.
pub async fn set_permissions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidJson(payload): ValidJson<PermissionsRequest>,
) -> Result<impl IntoResponse> {
    let role =
        role_service::update(&state, parse_id(&id)?, None, None, Some(payload.permissions)).await?;
    Ok(Json(RoleResponse {
        message: "Permissions updated successfully".to_string(),
        role,
    }))
}

/// Seeds the predefined roles.
pub async fn initialize(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let created = role_service::seed_predefined(&state).await?;
    tracing::info!("✅ Predefined roles initialized ({} created)", created);
    Ok(MessageResponse::new("Predefined roles initialized successfully"))
}
