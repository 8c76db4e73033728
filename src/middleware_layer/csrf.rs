use axum::{
    body::Body,
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;
use tower_cookies::Cookies;

use crate::{crypto::csrf::verify_csrf_token, error::AppError, state::AppState};

/// Name of the CSRF cookie.
pub const CSRF_COOKIE: &str = "csrf_token";
/// Header echoing the CSRF cookie.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// A middleware that verifies the CSRF token.
///
/// Mutating requests must echo the `csrf_token` cookie in the
/// `X-CSRF-Token` header, and the token must carry a valid signature.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `cookies` - The request cookies.
/// * `req` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// A `Response` or an error `AppError`.
pub async fn verify_csrf(
    State(state): State<AppState>,
    cookies: Cookies,
    req: Request<Body>,
    next: Next,
) -> Response {
    if req.method() == Method::GET
        || req.method() == Method::HEAD
        || req.method() == Method::OPTIONS
    {
        tracing::debug!("✅ CSRF exemption: {} request", req.method());
        return next.run(req).await;
    }

    let csrf_token_cookie = match cookies.get(CSRF_COOKIE) {
        Some(c) => c.value().to_string(),
        None => {
            tracing::warn!("❌ CSRF: csrf_token cookie missing");
            return AppError::Forbidden("Missing CSRF token cookie".to_string()).into_response();
        }
    };

    let csrf_token_header = match req.headers().get(CSRF_HEADER) {
        Some(token) => match token.to_str() {
            Ok(t) => t.to_string(),
            Err(_) => {
                tracing::warn!("❌ CSRF: malformed header");
                return AppError::Forbidden("Invalid CSRF token format".to_string())
                    .into_response();
            }
        },
        None => {
            tracing::warn!("❌ CSRF: x-csrf-token header missing");
            return AppError::Forbidden("Missing CSRF token header".to_string()).into_response();
        }
    };

    if !bool::from(csrf_token_cookie.as_bytes().ct_eq(csrf_token_header.as_bytes())) {
        tracing::warn!("❌ CSRF: cookie and header differ");
        return AppError::Forbidden("CSRF token mismatch".to_string()).into_response();
    }

    if !verify_csrf_token(&state.config.session_secret, &csrf_token_cookie) {
        tracing::warn!("❌ CSRF: bad signature");
        return AppError::Forbidden("CSRF token expired or invalid".to_string()).into_response();
    }

    tracing::debug!("✅ CSRF token valid");
    next.run(req).await
}
