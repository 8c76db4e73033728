use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use garde::Validate;
use serde::Deserialize;

use crate::{
    error::Result,
    handlers::response::{page_params, MessageResponse, Page},
    middleware_layer::auth::CurrentUser,
    models::user::{User, UserFilter, UserView},
    services::{auth as auth_service, users as user_service},
    state::AppState,
    validation::{
        auth as rules,
        request::{parse_id, ValidJson, ValidQuery},
    },
};

/// Default page size of the user listing.
const DEFAULT_PAGE_SIZE: i64 = 20;

/// The query of the user listing.
#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersQuery {
    #[garde(skip)]
    pub page: Option<i64>,
    #[garde(skip)]
    pub limit: Option<i64>,
    #[garde(skip)]
    pub is_active: Option<bool>,
    #[garde(length(min = 1, max = 64))]
    pub role: Option<String>,
}

/// The request payload for a role change.
#[derive(Deserialize, Validate)]
pub struct ChangeRoleRequest {
    #[garde(custom(rules::identifier))]
    pub role: String,
}

/// The request payload for an admin deactivation.
#[derive(Deserialize, Validate)]
pub struct DeactivateUserRequest {
    #[garde(length(max = 500))]
    pub reason: Option<String>,
}

/// The request payload for a role delegation.
#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DelegateRoleRequest {
    #[garde(custom(rules::identifier))]
    pub role: String,
    #[garde(skip)]
    pub expires_at: DateTime<Utc>,
}

async fn view(state: &AppState, user: User) -> Result<Json<UserView>> {
    Ok(Json(auth_service::view(state, &user).await?))
}

/// Lists users.
pub async fn list(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<ListUsersQuery>,
) -> Result<impl IntoResponse> {
    let role_id = match &query.role {
        Some(name) => match state.repos.roles.find_by_name(name).await? {
            Some(role) => Some(role.id),
            None => {
                return Ok(Json(Page {
                    items: Vec::new(),
                    total: 0,
                    page: 1,
                    limit: DEFAULT_PAGE_SIZE,
                }));
            }
        },
        None => None,
    };
    let filter = UserFilter { is_active: query.is_active, role_id };
    let (page, limit) =
        page_params(query.page, query.limit, DEFAULT_PAGE_SIZE, user_service::MAX_PAGE_SIZE);

    let (users, total) = user_service::list(&state, &filter, page, limit).await?;
    let mut items = Vec::with_capacity(users.len());
    for user in &users {
        items.push(auth_service::view(&state, user).await?);
    }
    Ok(Json(Page { items, total, page, limit }))
}

/// Returns one user.
pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse> {
    let user = auth_service::find(&state, parse_id(&id)?).await?;
    view(&state, user).await
}

/// Changes a user's role.
pub async fn change_role(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
    ValidJson(payload): ValidJson<ChangeRoleRequest>,
) -> Result<impl IntoResponse> {
    let user = user_service::change_role(&state, &actor, parse_id(&id)?, &payload.role).await?;
    view(&state, user).await
}

/// Deactivates a user.
pub async fn deactivate(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
    ValidJson(payload): ValidJson<DeactivateUserRequest>,
) -> Result<impl IntoResponse> {
    let user = user_service::deactivate(&state, &actor, parse_id(&id)?, payload.reason).await?;
    view(&state, user).await
}

/// Reactivates a user.
pub async fn reactivate(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let user = user_service::reactivate(&state, &actor, parse_id(&id)?).await?;
    view(&state, user).await
}

/// Deletes a user.
pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    user_service::delete(&state, &actor, parse_id(&id)?).await?;
    Ok(MessageResponse::new("User deleted successfully"))
}

/// Suspends a user.
pub async fn suspend(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let user = user_service::set_suspended(&state, &actor, parse_id(&id)?, true).await?;
    view(&state, user).await
}

/// Lifts a suspension.
pub async fn unsuspend(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let user = user_service::set_suspended(&state, &actor, parse_id(&id)?, false).await?;
    view(&state, user).await
}

/// Delegates a role until a deadline.
pub async fn delegate_role(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
    ValidJson(payload): ValidJson<DelegateRoleRequest>,
) -> Result<impl IntoResponse> {
    let user = user_service::delegate_role(
        &state,
        &actor,
        parse_id(&id)?,
        &payload.role,
        payload.expires_at,
    )
    .await?;
    view(&state, user).await
}

/// Revokes a delegation.
pub async fn revoke_delegation(
    State(state): State<AppState>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let user = user_service::revoke_delegation(&state, &actor, parse_id(&id)?).await?;
    view(&state, user).await
}
