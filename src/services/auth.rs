use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::crypto::token::IssuedToken;
use crate::error::{AppError, Result};
use crate::models::user::{NewUser, User, UserView};
use crate::repositories::user::ProfileUpdate;
use crate::state::AppState;

/// Resolves a user's role reference to its name.
pub async fn role_name(state: &AppState, user: &User) -> Result<String> {
    state
        .repos
        .roles
        .find_by_id(user.role_id)
        .await?
        .map(|role| role.name)
        .ok_or_else(|| AppError::Internal(format!("User {} references a missing role", user.id)))
}

/// The public view of a user.
pub async fn view(state: &AppState, user: &User) -> Result<UserView> {
    Ok(UserView::new(user, &role_name(state, user).await?))
}

/// Refuses accounts that may not hold a session.
fn ensure_usable(user: &User) -> Result<()> {
    if !user.is_active {
        return Err(AppError::Forbidden("Account is deactivated".to_string()));
    }
    if user.is_suspended {
        return Err(AppError::Forbidden("Account is suspended".to_string()));
    }
    Ok(())
}

/// Issues a token carrying the user's effective role.
///
/// A token minted under a delegation expires with the delegation.
async fn issue_for(state: &AppState, user: &User) -> Result<IssuedToken> {
    let base_role = role_name(state, user).await?;
    let now = Utc::now();
    let role = user.effective_role(&base_role, now);
    let ceiling = user.active_delegation(now).and(user.delegation_expires_at);
    state.tokens.issue(user.id, &user.username, role, ceiling)
}

/// Creates a user.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `username` - The user's username.
/// * `password` - The user's password.
/// * `role` - The role name; `None` assigns the configured default role.
///
/// # Returns
///
/// A `Result` containing the created `User`.
pub async fn create_user(
    state: &AppState,
    username: &str,
    password: &str,
    role: Option<&str>,
) -> Result<User> {
    tracing::debug!("🔐 Creating user: {}", username);
    let role_name = role.unwrap_or(&state.config.default_role);
    let role = state
        .repos
        .roles
        .find_by_name(role_name)
        .await?
        .ok_or_else(|| AppError::Validation(format!("Unknown role: {}", role_name)))?;

    let new_user = NewUser::new(&state.passwords, username, password, role.id)?;
    let user = state.repos.users.insert(new_user).await?;

    tracing::info!("✅ User created with ID: {} ({})", user.id, role.name);
    Ok(user)
}

/// Authenticates a user and issues a token.
///
/// A wrong password counts towards the account lockout; a locked account
/// is refused before the password is checked.
pub async fn login(state: &AppState, username: &str, password: &str) -> Result<(IssuedToken, User)> {
    tracing::debug!("🔐 Authenticating user: {}", username);
    let invalid = || AppError::Unauthorized("Invalid credentials".to_string());

    let user = state
        .repos
        .users
        .find_by_username(username)
        .await?
        .ok_or_else(invalid)?;

    let now = Utc::now();
    if user.is_locked(now) {
        tracing::warn!("🔒 Login attempt on locked account: {}", user.id);
        return Err(AppError::RateLimited(
            "Account is temporarily locked. Try again later".to_string(),
        ));
    }

    if !state.passwords.verify(password, &user.password_hash)? {
        let lock_for = Duration::from_std(state.config.attempt_window)
            .map_err(|e| AppError::Internal(format!("Invalid lock window: {}", e)))?;
        let updated = state
            .repos
            .users
            .record_login_failure(user.id, now, state.config.attempt_threshold as i32, lock_for)
            .await?;
        if updated.is_some_and(|u| u.is_locked(now)) {
            tracing::warn!("🔒 Account {} locked after repeated failures", user.id);
        }
        return Err(invalid());
    }

    ensure_usable(&user)?;
    state.repos.users.record_login_success(user.id, now).await?;
    let token = issue_for(state, &user).await?;

    tracing::info!("✅ User authenticated: {}", user.id);
    Ok((token, user))
}

/// Re-issues a token from the current state of the account.
pub async fn refresh(state: &AppState, user_id: Uuid) -> Result<IssuedToken> {
    let user = find(state, user_id).await?;
    ensure_usable(&user)?;
    issue_for(state, &user).await
}

/// Loads a user by ID.
pub async fn find(state: &AppState, user_id: Uuid) -> Result<User> {
    state
        .repos
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User"))
}

/// Changes the caller's username and/or password.
pub async fn update_profile(
    state: &AppState,
    user_id: Uuid,
    username: Option<String>,
    password: Option<&str>,
) -> Result<User> {
    let password_hash = password.map(|p| state.passwords.hash(p)).transpose()?;
    let user = state
        .repos
        .users
        .update_profile(user_id, ProfileUpdate { username, password_hash })
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    tracing::info!("✅ Profile updated: {}", user.id);
    Ok(user)
}

/// Deactivates the caller's own account.
pub async fn deactivate_self(state: &AppState, user_id: Uuid, reason: Option<String>) -> Result<User> {
    let user = state
        .repos
        .users
        .set_active(user_id, false, reason)
        .await?
        .ok_or_else(|| AppError::not_found("User"))?;
    tracing::info!("🛑 Account {} deactivated by its owner", user.id);
    Ok(user)
}
