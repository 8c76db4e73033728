#![allow(dead_code)]

use std::time::Duration;

use axum::{body::Body, Router};
use http::{header, Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use zeroize::Zeroizing;

use stockgate::{
    config::{Config, PasswordPolicy},
    router,
    services::roles,
    state::AppState,
};

pub const ADMIN_USERNAME: &str = "root";
pub const ADMIN_PASSWORD: &str = "R00t!password";
pub const STRONG_PASSWORD: &str = "Str0ng!pass";

/// Attempt window used by the tests; short so unblocking can be observed.
pub const WINDOW: Duration = Duration::from_secs(1);

pub fn test_config() -> Config {
    Config {
        database_url: "memory://".to_string(),
        redis_url: None,
        bind_addr: "127.0.0.1:0".parse().expect("bind addr"),
        frontend_url: "http://localhost:3000".to_string(),
        jwt_secret: Zeroizing::new(b"test-jwt-secret-0123456789".to_vec()),
        session_secret: Zeroizing::new(b"test-session-secret-0123456789".to_vec()),
        license_key: Zeroizing::new([7u8; 32]),
        license_iv: Zeroizing::new([9u8; 16]),
        token_ttl: Duration::from_secs(3600),
        default_role: "seller".to_string(),
        license_default_max_usage: 5,
        attempt_threshold: 5,
        attempt_window: WINDOW,
        maintenance_interval: Duration::from_secs(3600),
        password_policy: PasswordPolicy {
            memory_kib: 1024,
            iterations: 1,
        },
        bootstrap_admin: Some((
            ADMIN_USERNAME.to_string(),
            Zeroizing::new(ADMIN_PASSWORD.to_string()),
        )),
        secure_cookies: false,
    }
}

/// An in-process server over the memory store.
pub struct TestContext {
    pub state: AppState,
    pub app: Router,
}

impl TestContext {
    pub async fn new() -> Self {
        let state = AppState::new(&test_config()).await.expect("state");
        roles::seed_predefined(&state).await.expect("seed roles");
        roles::ensure_bootstrap_admin(&state).await.expect("bootstrap admin");
        let app = router(state.clone()).expect("router");
        Self { state, app }
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        auth: Option<&Auth>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            if let Some(token) = &auth.token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
            builder = builder
                .header(header::COOKIE, format!("csrf_token={}", auth.csrf))
                .header("x-csrf-token", &auth.csrf);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self.app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = response.into_body().collect().await.expect("body").to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, auth: Option<&Auth>) -> (StatusCode, Value) {
        self.send(Method::GET, uri, None, auth).await
    }

    pub async fn post(&self, uri: &str, body: Value, auth: Option<&Auth>) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(body), auth).await
    }

    pub async fn put(&self, uri: &str, body: Value, auth: Option<&Auth>) -> (StatusCode, Value) {
        self.send(Method::PUT, uri, Some(body), auth).await
    }

    /// Fetches a CSRF token with no bearer token attached.
    pub async fn guest(&self) -> Auth {
        let (status, body) = self.get("/api/auth/csrf-token", None).await;
        assert_eq!(status, StatusCode::OK);
        Auth {
            token: None,
            csrf: body["csrfToken"].as_str().expect("csrf token").to_string(),
        }
    }

    /// Logs in and returns the token with a CSRF pair.
    pub async fn login(&self, username: &str, password: &str) -> Auth {
        let mut auth = self.guest().await;
        let (status, body) = self
            .post(
                "/api/auth/login",
                serde_json::json!({ "username": username, "password": password }),
                Some(&auth),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        auth.token = Some(body["token"].as_str().expect("token").to_string());
        auth
    }

    pub async fn admin(&self) -> Auth {
        self.login(ADMIN_USERNAME, ADMIN_PASSWORD).await
    }

    /// Registers a user with the default role and logs them in.
    pub async fn seller(&self, username: &str) -> Auth {
        let guest = self.guest().await;
        let (status, body) = self
            .post(
                "/api/auth/register",
                serde_json::json!({ "username": username, "password": STRONG_PASSWORD }),
                Some(&guest),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        self.login(username, STRONG_PASSWORD).await
    }

    /// The account ID behind a session.
    pub async fn user_id(&self, auth: &Auth) -> String {
        let (status, profile) = self.get("/api/auth/profile", Some(auth)).await;
        assert_eq!(status, StatusCode::OK);
        profile["id"].as_str().expect("id").to_string()
    }

    /// Moves a user to `role` as `actor`.
    pub async fn assign_role(&self, actor: &Auth, user_id: &str, role: &str) {
        let (status, body) = self
            .put(
                &format!("/api/auth/users/{}/role", user_id),
                serde_json::json!({ "role": role }),
                Some(actor),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "role change failed: {}", body);
    }

    /// Creates a license through the admin route and returns its encrypted key.
    pub async fn create_license(&self, admin: &Auth, body: Value) -> (String, String) {
        let (status, body) = self.post("/api/license/admin/create", body, Some(admin)).await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {}", body);
        (
            body["license"]["id"].as_str().expect("id").to_string(),
            body["encryptedKey"].as_str().expect("encrypted key").to_string(),
        )
    }
}

/// Credentials attached to a request.
pub struct Auth {
    pub token: Option<String>,
    pub csrf: String,
}
