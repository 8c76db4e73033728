use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, Request},
    middleware::Next,
    response::Response,
};

use crate::{
    error::{AppError, Result},
    models::{identity::Identity, role::SUPERADMIN},
    services::roles::role_grants,
    state::AppState,
};

/// Extracts the bearer token from the `Authorization` header.
///
/// # Arguments
///
/// * `request` - The incoming request.
///
/// # Returns
///
/// An `Option` containing the token if present.
fn extract_bearer_token(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// A middleware that requires a valid access token.
///
/// On success the token's [`Identity`] is attached to the request.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `request` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// A `Response` or an `AppError::Unauthorized`.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response> {
    tracing::debug!("🔐 Checking authentication...");

    let token = extract_bearer_token(&request).ok_or_else(|| {
        AppError::Unauthorized("Authentication required".to_string())
    })?;

    let identity = state.tokens.verify(token)?;
    tracing::debug!("✅ User authenticated: {} ({})", identity.user_id, identity.role);

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

fn identity_of(request: &Request<Body>) -> Result<&Identity> {
    request
        .extensions()
        .get::<Identity>()
        .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
}

/// The roles a route group admits.
#[derive(Clone, Copy, Debug)]
pub struct RoleGate {
    pub allowed: &'static [&'static str],
}

impl RoleGate {
    pub const fn new(allowed: &'static [&'static str]) -> Self {
        Self { allowed }
    }

    /// Whether `role` passes. Superadmin always does.
    pub fn admits(&self, role: &str) -> bool {
        role == SUPERADMIN || self.allowed.contains(&role)
    }
}

/// A middleware that admits only the roles of a [`RoleGate`].
///
/// Must run after [`authenticate`].
pub async fn require_role(
    State(gate): State<RoleGate>,
    request: Request<Body>,
    next: Next,
) -> Result<Response> {
    let identity = identity_of(&request)?;
    if !gate.admits(&identity.role) {
        tracing::warn!(
            "❌ Role {} of {} not in {:?} for {}",
            identity.role,
            identity.username,
            gate.allowed,
            request.uri().path()
        );
        return Err(AppError::Forbidden("Insufficient role".to_string()));
    }
    Ok(next.run(request).await)
}

/// The permission a route group requires.
#[derive(Clone)]
pub struct PermissionGate {
    pub state: AppState,
    pub permission: &'static str,
}

/// A middleware that admits roles granting the gate's permission.
///
/// The role is resolved by name from the store on every request, so
/// permission edits apply to tokens already issued. Must run after
/// [`authenticate`].
pub async fn require_permission(
    State(gate): State<PermissionGate>,
    request: Request<Body>,
    next: Next,
) -> Result<Response> {
    let identity = identity_of(&request)?.clone();
    if !role_grants(&gate.state, &identity.role, gate.permission).await? {
        tracing::warn!(
            "❌ Role {} of {} lacks permission {}",
            identity.role,
            identity.username,
            gate.permission
        );
        return Err(AppError::Forbidden(format!(
            "Missing permission: {}",
            gate.permission
        )));
    }
    Ok(next.run(request).await)
}

/// Handler extractor for the identity attached by [`authenticate`].
pub struct CurrentUser(pub Identity);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::{ADMIN_ROLES, SUPERVISOR_ROLES};

    #[test]
    fn superadmin_passes_every_gate() {
        let admin_only = RoleGate::new(ADMIN_ROLES);
        assert!(admin_only.admits("admin"));
        assert!(admin_only.admits(SUPERADMIN));
        assert!(!admin_only.admits("seller"));
        assert!(!admin_only.admits("manager"));
        assert!(RoleGate::new(SUPERVISOR_ROLES).admits("manager"));
        assert!(RoleGate::new(&[]).admits(SUPERADMIN));
    }

    #[test]
    fn bearer_token_is_extracted() {
        let request = Request::builder()
            .header(header::AUTHORIZATION, "Bearer abc.def")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_bearer_token(&request), Some("abc.def"));

        let request = Request::builder()
            .header(header::AUTHORIZATION, "Basic abc")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_bearer_token(&request), None);
    }
}
