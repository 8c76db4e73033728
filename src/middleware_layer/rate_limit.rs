use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{request::Parts, Extensions, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{convert::Infallible, net::SocketAddr};

use crate::{error::AppError, state::AppState};

/// Extracts the peer IP address from the request extensions.
///
/// # Arguments
///
/// * `extensions` - The request extensions.
///
/// # Returns
///
/// The IP address as a string, or "unknown" if not found.
pub fn extract_real_ip(extensions: &Extensions) -> String {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Handler extractor for the caller's IP address.
pub struct ClientIp(pub String);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientIp(extract_real_ip(&parts.extensions)))
    }
}

/// A middleware that rate limits login attempts per IP.
///
/// Every `401` answer counts as a failure; a successful login clears the
/// counter. Store errors are logged and the request goes through.
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
pub async fn throttle_login(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let ip = extract_real_ip(req.extensions());
    let tracker = &state.login_attempts;

    match tracker.is_blocked(&ip).await {
        Ok(true) => {
            return AppError::RateLimited(format!(
                "Too many login attempts. Try again in {} minutes",
                tracker.policy().window.as_secs().div_ceil(60)
            ))
            .into_response();
        }
        Ok(false) => {}
        Err(e) => tracing::error!("❌ Login throttle unavailable: {}", e),
    }

    let response = next.run(req).await;

    let outcome = if response.status() == StatusCode::UNAUTHORIZED {
        tracker.record_failure(&ip).await.map(|_| ())
    } else if response.status().is_success() {
        tracker.reset(&ip).await
    } else {
        Ok(())
    };
    if let Err(e) = outcome {
        tracing::error!("❌ Failed to update login attempts for {}: {}", ip, e);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_ip_comes_from_connect_info() {
        let mut extensions = Extensions::new();
        assert_eq!(extract_real_ip(&extensions), "unknown");

        extensions.insert(ConnectInfo(SocketAddr::from(([10, 1, 2, 3], 4567))));
        assert_eq!(extract_real_ip(&extensions), "10.1.2.3");
    }
}
