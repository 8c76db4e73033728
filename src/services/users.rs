use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    identity::Identity,
    role::{ADMIN_ROLES, SUPERADMIN},
    user::{User, UserFilter},
};
use crate::services::audit::page_offset;
use crate::services::auth::find;
use crate::state::AppState;

/// Upper bound for a page of users.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Checks that `actor` may act on `target`.
///
/// Nobody manages their own account through the admin routes, and only a
/// superadmin manages another superadmin. Returns the target's role name.
async fn ensure_manageable(state: &AppState, actor: &Identity, target: &User) -> Result<String> {
    if actor.user_id == target.id {
        return Err(AppError::Validation(
            "Use the profile endpoints to manage your own account".to_string(),
        ));
    }
    let target_role = crate::services::auth::role_name(state, target).await?;
    if target_role == SUPERADMIN && actor.role != SUPERADMIN {
        tracing::warn!("⚠️ {} tried to manage superadmin {}", actor.username, target.id);
        return Err(AppError::Forbidden("Only a superadmin can manage this account".to_string()));
    }
    Ok(target_role)
}

async fn load_manageable(state: &AppState, actor: &Identity, id: Uuid) -> Result<(User, String)> {
    let target = find(state, id).await?;
    let role = ensure_manageable(state, actor, &target).await?;
    Ok((target, role))
}

/// Roles at admin level or above are handed out by a superadmin only.
fn ensure_may_delegate(actor: &Identity, role: &str) -> Result<()> {
    if role == SUPERADMIN {
        return Err(AppError::Forbidden("The superadmin role cannot be delegated".to_string()));
    }
    if ADMIN_ROLES.contains(&role) && actor.role != SUPERADMIN {
        tracing::warn!("⚠️ {} tried to delegate {}", actor.username, role);
        return Err(AppError::Forbidden("Cannot delegate admin role".to_string()));
    }
    Ok(())
}

fn updated(user: Option<User>) -> Result<User> {
    user.ok_or_else(|| AppError::not_found("User"))
}

/// Lists users, one page at a time.
pub async fn list(
    state: &AppState,
    filter: &UserFilter,
    page: i64,
    limit: i64,
) -> Result<(Vec<User>, i64)> {
    let limit = limit.clamp(1, MAX_PAGE_SIZE);
    let offset = page_offset(page, limit)?;
    state.repos.users.list(filter, offset, limit).await
}

/// Points a user at another role.
pub async fn change_role(state: &AppState, actor: &Identity, id: Uuid, role: &str) -> Result<User> {
    load_manageable(state, actor, id).await?;
    if role == SUPERADMIN && actor.role != SUPERADMIN {
        return Err(AppError::Forbidden("Only a superadmin can grant superadmin".to_string()));
    }
    let role = state
        .repos
        .roles
        .find_by_name(role)
        .await?
        .ok_or_else(|| AppError::not_found("Role"))?;
    let user = updated(state.repos.users.set_role(id, role.id).await?)?;
    tracing::info!("✅ User {} moved to role {} by {}", id, role.name, actor.username);
    Ok(user)
}

/// Deactivates an account, recording why.
pub async fn deactivate(
    state: &AppState,
    actor: &Identity,
    id: Uuid,
    reason: Option<String>,
) -> Result<User> {
    load_manageable(state, actor, id).await?;
    let user = updated(state.repos.users.set_active(id, false, reason).await?)?;
    tracing::info!("🛑 User {} deactivated by {}", id, actor.username);
    Ok(user)
}

/// Reactivates an account and clears the deactivation reason.
pub async fn reactivate(state: &AppState, actor: &Identity, id: Uuid) -> Result<User> {
    load_manageable(state, actor, id).await?;
    let user = updated(state.repos.users.set_active(id, true, None).await?)?;
    tracing::info!("✅ User {} reactivated by {}", id, actor.username);
    Ok(user)
}

/// Deletes an account.
pub async fn delete(state: &AppState, actor: &Identity, id: Uuid) -> Result<()> {
    load_manageable(state, actor, id).await?;
    if !state.repos.users.delete(id).await? {
        return Err(AppError::not_found("User"));
    }
    tracing::info!("🗑️ User {} deleted by {}", id, actor.username);
    Ok(())
}

/// Suspends or unsuspends an account.
pub async fn set_suspended(state: &AppState, actor: &Identity, id: Uuid, suspended: bool) -> Result<User> {
    let (_, target_role) = load_manageable(state, actor, id).await?;
    if ADMIN_ROLES.contains(&target_role.as_str()) && actor.role != SUPERADMIN {
        tracing::warn!("⚠️ {} tried to suspend admin {}", actor.username, id);
        return Err(AppError::Forbidden("Cannot suspend admin account".to_string()));
    }
    let user = updated(state.repos.users.set_suspended(id, suspended).await?)?;
    tracing::info!(
        "{} User {} {} by {}",
        if suspended { "⏸️" } else { "▶️" },
        id,
        if suspended { "suspended" } else { "unsuspended" },
        actor.username
    );
    Ok(user)
}

/// Grants `role` to a user until `expires_at`.
pub async fn delegate_role(
    state: &AppState,
    actor: &Identity,
    id: Uuid,
    role: &str,
    expires_at: DateTime<Utc>,
) -> Result<User> {
    load_manageable(state, actor, id).await?;
    if expires_at <= Utc::now() {
        return Err(AppError::Validation("Delegation must expire in the future".to_string()));
    }
    ensure_may_delegate(actor, role)?;
    if state.repos.roles.find_by_name(role).await?.is_none() {
        return Err(AppError::not_found("Role"));
    }
    let user = updated(
        state
            .repos
            .users
            .set_delegation(id, Some(role.to_string()), Some(expires_at))
            .await?,
    )?;
    tracing::info!(
        "✅ Role {} delegated to {} until {} by {}",
        role,
        id,
        expires_at,
        actor.username
    );
    Ok(user)
}

/// Ends a delegation early.
pub async fn revoke_delegation(state: &AppState, actor: &Identity, id: Uuid) -> Result<User> {
    load_manageable(state, actor, id).await?;
    let user = updated(state.repos.users.set_delegation(id, None, None).await?)?;
    tracing::info!("✅ Delegation of {} revoked by {}", id, actor.username);
    Ok(user)
}
