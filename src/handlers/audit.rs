use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use garde::Validate;
use serde::Deserialize;

use crate::{
    error::Result,
    handlers::response::{page_params, Page},
    models::audit::AuditFilter,
    services::audit as audit_service,
    state::AppState,
    validation::request::{parse_id, ValidQuery},
};

/// Default page size of the audit listing.
const DEFAULT_PAGE_SIZE: i64 = 50;

/// The query of the audit listing.
#[derive(Deserialize, Validate)]
pub struct AuditQuery {
    #[garde(skip)]
    pub page: Option<i64>,
    #[garde(skip)]
    pub limit: Option<i64>,
    #[garde(length(min = 1, max = 128))]
    pub action: Option<String>,
}

/// Lists audit entries, newest first.
pub async fn list(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<AuditQuery>,
) -> Result<impl IntoResponse> {
    let filter = AuditFilter { action: query.action, actor_id: None };
    let (page, limit) =
        page_params(query.page, query.limit, DEFAULT_PAGE_SIZE, audit_service::MAX_PAGE_SIZE);
    let (items, total) = audit_service::list(&state, &filter, page, limit).await?;
    Ok(Json(Page { items, total, page, limit }))
}

/// Lists the audit entries of one actor.
pub async fn by_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    ValidQuery(query): ValidQuery<AuditQuery>,
) -> Result<impl IntoResponse> {
    let filter = AuditFilter {
        action: query.action,
        actor_id: Some(parse_id(&user_id)?),
    };
    let (page, limit) =
        page_params(query.page, query.limit, DEFAULT_PAGE_SIZE, audit_service::MAX_PAGE_SIZE);
    let (items, total) = audit_service::list(&state, &filter, page, limit).await?;
    Ok(Json(Page { items, total, page, limit }))
}
