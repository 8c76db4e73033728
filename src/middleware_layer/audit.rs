use axum::{
    body::{to_bytes, Body},
    extract::{MatchedPath, Request, State},
    http::{header, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::{json, Value};

use crate::{
    error::AppError,
    middleware_layer::rate_limit::extract_real_ip,
    models::{audit::AuditEntry, identity::Identity},
    services::audit as audit_service,
    state::AppState,
};

/// Largest request body captured into the audit trail.
pub const MAX_AUDITED_BODY: usize = 64 * 1024;

/// Role recorded for unauthenticated callers.
const GUEST_ROLE: &str = "guest";

fn snapshot(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes).unwrap_or_else(|_| json!({ "unparsed": bytes.len() }))
}

/// A middleware that records mutating requests in the audit trail.
///
/// The action is `<METHOD> <route>`. Details hold the redacted request body
/// and the response status. Must run after `authenticate` on protected
/// routes so the actor is known.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `req` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// A `Response`.
pub async fn audit_trail(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if req.method() == Method::GET || req.method() == Method::HEAD || req.method() == Method::OPTIONS {
        return next.run(req).await;
    }

    let (parts, body) = req.into_parts();
    let body_bytes = match to_bytes(body, MAX_AUDITED_BODY).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return AppError::Validation("Request body too large".to_string()).into_response();
        }
    };

    let route = parts
        .extensions
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());
    let action = format!("{} {}", parts.method, route);
    let identity = parts.extensions.get::<Identity>().cloned();
    let ip_address = Some(extract_real_ip(&parts.extensions));
    let user_agent = parts
        .headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let request = snapshot(&body_bytes);

    let response = next.run(Request::from_parts(parts, Body::from(body_bytes))).await;

    let entry = AuditEntry::new(
        identity.as_ref().map(|i| i.user_id),
        identity.as_ref().map_or(GUEST_ROLE, |i| i.role.as_str()),
        &action,
        json!({ "request": request, "status": response.status().as_u16() }),
        ip_address,
        user_agent,
    );
    audit_service::record(&state, entry).await;

    response
}
