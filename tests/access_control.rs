mod common;

use http::{Method, StatusCode};
use serde_json::json;

use common::{TestContext, STRONG_PASSWORD, WINDOW};

#[tokio::test]
async fn sellers_are_kept_off_admin_routes() {
    let ctx = TestContext::new().await;
    let seller = ctx.seller("clerk01").await;

    let (status, _) = ctx.get("/api/license/admin/list", Some(&seller)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = ctx.get("/api/auth/users", Some(&seller)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = ctx.get("/api/roles", Some(&seller)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = ctx.get("/api/auth/profile", Some(&seller)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "seller");
}

#[tokio::test]
async fn protected_routes_need_a_valid_token() {
    let ctx = TestContext::new().await;

    let (status, _) = ctx.get("/api/auth/profile", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut forged = ctx.guest().await;
    forged.token = Some("not.a.token".to_string());
    let (status, _) = ctx.get("/api/license/analytics", Some(&forged)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn mutating_auth_routes_need_a_csrf_token() {
    let ctx = TestContext::new().await;
    let (status, _) = ctx
        .post(
            "/api/auth/register",
            json!({ "username": "clerk01", "password": STRONG_PASSWORD }),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let mut tampered = ctx.guest().await;
    tampered.csrf.push('x');
    let (status, _) = ctx
        .post(
            "/api/auth/register",
            json!({ "username": "clerk01", "password": STRONG_PASSWORD }),
            Some(&tampered),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn registration_rejects_weak_and_duplicate_accounts() {
    let ctx = TestContext::new().await;
    let guest = ctx.guest().await;

    let (status, _) = ctx
        .post(
            "/api/auth/register",
            json!({ "username": "clerk01", "password": "weakpass" }),
            Some(&guest),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    ctx.seller("clerk01").await;
    let (status, _) = ctx
        .post(
            "/api/auth/register",
            json!({ "username": "clerk01", "password": STRONG_PASSWORD }),
            Some(&guest),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn repeated_login_failures_lock_the_account() {
    let ctx = TestContext::new().await;
    ctx.seller("clerk01").await;
    let guest = ctx.guest().await;
    let wrong = json!({ "username": "clerk01", "password": "Wr0ng!pass" });
    let right = json!({ "username": "clerk01", "password": STRONG_PASSWORD });

    for _ in 0..5 {
        let (status, _) = ctx.post("/api/auth/login", wrong.clone(), Some(&guest)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, _) = ctx.post("/api/auth/login", right.clone(), Some(&guest)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    // The account stays locked even once the caller's IP is forgiven.
    ctx.state.login_attempts.reset("unknown").await.expect("reset");
    let (status, body) = ctx.post("/api/auth/login", right.clone(), Some(&guest)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "Account is temporarily locked. Try again later");

    tokio::time::sleep(WINDOW + std::time::Duration::from_millis(200)).await;
    let (status, _) = ctx.post("/api/auth/login", right, Some(&guest)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn deactivated_accounts_cannot_log_in() {
    let ctx = TestContext::new().await;
    let admin = ctx.admin().await;
    let seller = ctx.seller("clerk01").await;
    let (_, profile) = ctx.get("/api/auth/profile", Some(&seller)).await;
    let id = profile["id"].as_str().expect("id").to_string();

    let (status, body) = ctx
        .put(
            &format!("/api/auth/users/{}/deactivate", id),
            json!({ "reason": "left the company" }),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["isActive"], false);

    let guest = ctx.guest().await;
    let (status, _) = ctx
        .post(
            "/api/auth/login",
            json!({ "username": "clerk01", "password": STRONG_PASSWORD }),
            Some(&guest),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = ctx
        .send(
            Method::PUT,
            &format!("/api/auth/users/{}/reactivate", id),
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    ctx.login("clerk01", STRONG_PASSWORD).await;
}

#[tokio::test]
async fn delegated_role_opens_admin_routes_until_revoked() {
    let ctx = TestContext::new().await;
    let admin = ctx.admin().await;
    let seller = ctx.seller("clerk01").await;
    let (_, profile) = ctx.get("/api/auth/profile", Some(&seller)).await;
    let id = profile["id"].as_str().expect("id").to_string();

    let expires_at = chrono::Utc::now() + chrono::Duration::hours(1);
    let (status, body) = ctx
        .put(
            &format!("/api/auth/users/{}/delegate-role", id),
            json!({ "role": "admin", "expiresAt": expires_at }),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["delegatedRole"], "admin");

    let delegated = ctx.login("clerk01", STRONG_PASSWORD).await;
    let (status, _) = ctx.get("/api/license/admin/list", Some(&delegated)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = ctx
        .send(
            Method::DELETE,
            &format!("/api/auth/users/{}/delegate-role", id),
            None,
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let plain = ctx.login("clerk01", STRONG_PASSWORD).await;
    let (status, _) = ctx.get("/api/license/admin/list", Some(&plain)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admins_cannot_manage_a_superadmin() {
    let ctx = TestContext::new().await;
    let root = ctx.admin().await;
    let boss = ctx.seller("boss01").await;
    let boss_id = ctx.user_id(&boss).await;
    ctx.assign_role(&root, &boss_id, "admin").await;
    let admin = ctx.login("boss01", STRONG_PASSWORD).await;

    let root_id = ctx.user_id(&root).await;
    let (status, _) = ctx
        .put(
            &format!("/api/auth/users/{}/deactivate", root_id),
            json!({}),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let clerk = ctx.seller("clerk01").await;
    let clerk_id = ctx.user_id(&clerk).await;
    let (status, body) = ctx
        .put(
            &format!("/api/auth/users/{}/role", clerk_id),
            json!({ "role": "superadmin" }),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Only a superadmin can grant superadmin");

    let (status, _) = ctx
        .put(
            &format!("/api/auth/users/{}/role", boss_id),
            json!({ "role": "superadmin" }),
            Some(&admin),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn managers_cannot_hand_out_or_suspend_admin_power() {
    let ctx = TestContext::new().await;
    let root = ctx.admin().await;
    let manager = ctx.seller("mgr001").await;
    let manager_id = ctx.user_id(&manager).await;
    ctx.assign_role(&root, &manager_id, "manager").await;
    let manager = ctx.login("mgr001", STRONG_PASSWORD).await;

    let pal = ctx.seller("pal001").await;
    let pal_id = ctx.user_id(&pal).await;
    let expires_at = chrono::Utc::now() + chrono::Duration::hours(1);

    let (status, body) = ctx
        .put(
            &format!("/api/auth/users/{}/delegate-role", pal_id),
            json!({ "role": "admin", "expiresAt": expires_at }),
            Some(&manager),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Cannot delegate admin role");

    let pal = ctx.login("pal001", STRONG_PASSWORD).await;
    let (status, _) = ctx.get("/api/license/admin/list", Some(&pal)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = ctx
        .put(
            &format!("/api/auth/users/{}/delegate-role", pal_id),
            json!({ "role": "manager", "expiresAt": expires_at }),
            Some(&manager),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let boss = ctx.seller("boss01").await;
    let boss_id = ctx.user_id(&boss).await;
    ctx.assign_role(&root, &boss_id, "admin").await;
    let (status, body) = ctx
        .send(
            Method::PUT,
            &format!("/api/auth/users/{}/suspend", boss_id),
            None,
            Some(&manager),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Cannot suspend admin account");

    let (status, body) = ctx
        .send(
            Method::PUT,
            &format!("/api/auth/users/{}/suspend", pal_id),
            None,
            Some(&manager),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isSuspended"], true);
}

#[tokio::test]
async fn delegated_tokens_expire_with_the_delegation() {
    let ctx = TestContext::new().await;
    let root = ctx.admin().await;
    let clerk = ctx.seller("clerk01").await;
    let clerk_id = ctx.user_id(&clerk).await;

    let expires_at = chrono::Utc::now() + chrono::Duration::seconds(2);
    let (status, body) = ctx
        .put(
            &format!("/api/auth/users/{}/delegate-role", clerk_id),
            json!({ "role": "admin", "expiresAt": expires_at }),
            Some(&root),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let delegated = ctx.login("clerk01", STRONG_PASSWORD).await;
    let (status, _) = ctx.get("/api/license/admin/list", Some(&delegated)).await;
    assert_eq!(status, StatusCode::OK);

    tokio::time::sleep(std::time::Duration::from_secs(3)).await;

    let (status, _) = ctx.get("/api/license/admin/list", Some(&delegated)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn role_routes_follow_the_permission_set() {
    let ctx = TestContext::new().await;
    let root = ctx.admin().await;

    let (status, body) = ctx
        .post(
            "/api/roles",
            json!({ "name": "auditor", "permissions": ["view_audit_logs"] }),
            Some(&root),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let role_id = body["role"]["id"].as_str().expect("id").to_string();

    let seller = ctx.seller("clerk01").await;
    let (_, profile) = ctx.get("/api/auth/profile", Some(&seller)).await;
    let id = profile["id"].as_str().expect("id").to_string();
    let (status, _) = ctx
        .put(
            &format!("/api/auth/users/{}/role", id),
            json!({ "role": "auditor" }),
            Some(&root),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let auditor = ctx.login("clerk01", STRONG_PASSWORD).await;
    let (status, _) = ctx.get("/api/audit-logs", Some(&auditor)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = ctx.get("/api/roles", Some(&auditor)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Permission edits apply to tokens already issued.
    let (status, _) = ctx
        .put(
            &format!("/api/roles/{}/permissions", role_id),
            json!({ "permissions": ["view_reports"] }),
            Some(&root),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = ctx.get("/api/audit-logs", Some(&auditor)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = ctx
        .send(Method::DELETE, &format!("/api/roles/{}", role_id), None, Some(&root))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn audit_trail_redacts_secrets() {
    let ctx = TestContext::new().await;
    let root = ctx.admin().await;
    ctx.seller("clerk01").await;

    let (status, body) = ctx
        .get("/api/audit-logs?action=register", Some(&root))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    let entry = &body["items"][0];
    assert_eq!(entry["action"], "POST /api/auth/register");
    assert_eq!(entry["actorRole"], "guest");
    assert_eq!(entry["details"]["status"], 201);
    assert_eq!(entry["details"]["request"]["username"], "clerk01");
    assert_eq!(entry["details"]["request"]["password"], "[REDACTED]");
}

#[tokio::test]
async fn out_of_range_pages_are_rejected() {
    let ctx = TestContext::new().await;
    let root = ctx.admin().await;

    let uri = format!("/api/audit-logs?page={}", i64::MAX);
    let (status, _) = ctx.get(&uri, Some(&root)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/api/auth/users?page={}", i64::MAX);
    let (status, _) = ctx.get(&uri, Some(&root)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_is_public() {
    let ctx = TestContext::new().await;
    let (status, body) = ctx.get("/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
