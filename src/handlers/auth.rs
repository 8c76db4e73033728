use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use garde::Validate;
use serde::{Deserialize, Serialize};
use tower_cookies::cookie::time::Duration;
use tower_cookies::{Cookie, Cookies};

use crate::{
    crypto::{csrf::generate_csrf_token, token::IssuedToken},
    error::{AppError, Result},
    handlers::response::MessageResponse,
    middleware_layer::{auth::CurrentUser, csrf::CSRF_COOKIE},
    models::user::UserView,
    services::auth as auth_service,
    state::AppState,
    validation::{auth as rules, request::ValidJson},
};

/// Lifetime of the CSRF cookie, in seconds.
const CSRF_COOKIE_MAX_AGE: i64 = 3600;

/// The request payload for user registration.
///
/// The role is always the configured default; clients cannot pick one.
#[derive(Deserialize, Validate)]
pub struct RegisterRequest {
    #[garde(custom(rules::username))]
    pub username: String,
    #[garde(custom(rules::strong_password))]
    pub password: String,
}

/// The request payload for user login.
#[derive(Deserialize, Validate)]
pub struct LoginRequest {
    #[garde(length(min = 1, max = 64))]
    pub username: String,
    #[garde(length(min = 1, max = 128))]
    pub password: String,
}

/// The request payload for a profile update.
#[derive(Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[garde(skip)]
    pub username: Option<String>,
    #[garde(skip)]
    pub password: Option<String>,
}

impl UpdateProfileRequest {
    /// Applies the field rules to whichever fields are present.
    fn check(&self) -> Result<()> {
        if self.username.is_none() && self.password.is_none() {
            return Err(AppError::Validation("Nothing to update".to_string()));
        }
        if let Some(username) = &self.username {
            rules::username(username, &()).map_err(|e| AppError::Validation(e.to_string()))?;
        }
        if let Some(password) = &self.password {
            rules::strong_password(password, &())
                .map_err(|e| AppError::Validation(e.to_string()))?;
        }
        Ok(())
    }
}

/// The request payload for deactivating one's own account.
#[derive(Deserialize, Validate)]
pub struct DeactivateRequest {
    #[garde(length(max = 500))]
    pub reason: Option<String>,
}

/// The response payload carrying an access token.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub expires_at: i64,
}

impl From<IssuedToken> for TokenResponse {
    fn from(issued: IssuedToken) -> Self {
        Self {
            token: issued.token,
            expires_at: issued.expires_at,
        }
    }
}

/// The response payload of a successful login.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: i64,
    pub user: UserView,
}

/// The response payload carrying a CSRF token.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfResponse {
    pub csrf_token: String,
}

/// Creates a cookie the browser script can read back into the CSRF header.
fn create_csrf_cookie(value: String, secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(CSRF_COOKIE, value);
    cookie.set_secure(secure);
    cookie.set_same_site(tower_cookies::cookie::SameSite::Lax);
    cookie.set_max_age(Duration::seconds(CSRF_COOKIE_MAX_AGE));
    cookie.set_path("/");
    cookie
}

/// Issues a fresh CSRF token as cookie and body.
pub async fn csrf_token(
    State(state): State<AppState>,
    cookies: Cookies,
) -> Result<impl IntoResponse> {
    let token = generate_csrf_token(&state.config.session_secret)?;
    cookies.add(create_csrf_cookie(token.clone(), state.config.secure_cookies));
    tracing::debug!("🔐 Issued CSRF token");
    Ok(Json(CsrfResponse { csrf_token: token }))
}

/// Handles user registration.
pub async fn register(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<RegisterRequest>,
) -> Result<impl IntoResponse> {
    tracing::info!("📝 Register attempt: {}", payload.username);
    let user = auth_service::create_user(&state, &payload.username, &payload.password, None).await?;
    let view = auth_service::view(&state, &user).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Handles user login.
pub async fn login(
    State(state): State<AppState>,
    ValidJson(payload): ValidJson<LoginRequest>,
) -> Result<impl IntoResponse> {
    let (issued, user) = auth_service::login(&state, &payload.username, &payload.password).await?;
    let user = auth_service::view(&state, &user).await?;
    Ok(Json(LoginResponse {
        token: issued.token,
        expires_at: issued.expires_at,
        user,
    }))
}

/// Handles logout. Tokens are stateless, so this drops the CSRF cookie and
/// leaves a trace in the audit trail.
pub async fn logout(
    CurrentUser(identity): CurrentUser,
    cookies: Cookies,
) -> Result<impl IntoResponse> {
    cookies.remove(Cookie::build(CSRF_COOKIE).path("/").build());
    tracing::info!("👋 User {} logged out", identity.user_id);
    Ok(MessageResponse::new("Logged out successfully"))
}

/// Issues a new token reflecting the account's current role.
pub async fn refresh_token(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> Result<impl IntoResponse> {
    let issued = auth_service::refresh(&state, identity.user_id).await?;
    Ok(Json(TokenResponse::from(issued)))
}

/// Returns the caller's profile.
pub async fn profile(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
) -> Result<impl IntoResponse> {
    let user = auth_service::find(&state, identity.user_id).await?;
    Ok(Json(auth_service::view(&state, &user).await?))
}

/// Updates the caller's username and/or password.
pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    ValidJson(payload): ValidJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse> {
    payload.check()?;
    let user = auth_service::update_profile(
        &state,
        identity.user_id,
        payload.username,
        payload.password.as_deref(),
    )
    .await?;
    Ok(Json(auth_service::view(&state, &user).await?))
}

/// Deactivates the caller's own account.
pub async fn deactivate_profile(
    State(state): State<AppState>,
    CurrentUser(identity): CurrentUser,
    ValidJson(payload): ValidJson<DeactivateRequest>,
) -> Result<impl IntoResponse> {
    auth_service::deactivate_self(&state, identity.user_id, payload.reason).await?;
    Ok(MessageResponse::new("Account deactivated successfully"))
}
