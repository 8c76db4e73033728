use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::role::{normalize_permissions, Role, PREDEFINED_ROLES, SUPERADMIN};
use crate::repositories::role::RoleUpdate;
use crate::services::auth::create_user;
use crate::state::AppState;

/// Creates every predefined role that does not exist yet.
///
/// # Returns
///
/// The number of roles created.
pub async fn seed_predefined(state: &AppState) -> Result<usize> {
    let mut created = 0;
    for predefined in PREDEFINED_ROLES {
        if state.repos.roles.insert_if_absent(predefined.to_role()).await? {
            tracing::info!("✅ Seeded role {}", predefined.name);
            created += 1;
        }
    }
    Ok(created)
}

/// Creates the configured superadmin account if it does not exist.
pub async fn ensure_bootstrap_admin(state: &AppState) -> Result<()> {
    let Some((username, password)) = &state.config.bootstrap_admin else {
        return Ok(());
    };
    if state.repos.users.find_by_username(username).await?.is_some() {
        return Ok(());
    }
    create_user(state, username, password.as_str(), Some(SUPERADMIN)).await?;
    tracing::info!("✅ Bootstrap superadmin {} created", username);
    Ok(())
}

fn non_empty(permissions: Vec<String>) -> Result<Vec<String>> {
    let permissions = normalize_permissions(permissions);
    if permissions.is_empty() {
        return Err(AppError::Validation("Permissions must be a non-empty list".to_string()));
    }
    Ok(permissions)
}

/// Every role, by name.
pub async fn list(state: &AppState) -> Result<Vec<Role>> {
    state.repos.roles.list().await
}

/// Loads a role by ID.
pub async fn find(state: &AppState, id: Uuid) -> Result<Role> {
    state
        .repos
        .roles
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::not_found("Role"))
}

/// Creates a role.
pub async fn create(
    state: &AppState,
    name: &str,
    description: Option<String>,
    permissions: Vec<String>,
) -> Result<Role> {
    let role = Role::new(name, description, non_empty(permissions)?);
    let role = state.repos.roles.insert(role).await?;
    tracing::info!("✅ Role {} created", role.name);
    Ok(role)
}

/// Edits a role. The superadmin role cannot be renamed.
pub async fn update(
    state: &AppState,
    id: Uuid,
    name: Option<String>,
    description: Option<String>,
    permissions: Option<Vec<String>>,
) -> Result<Role> {
    let current = find(state, id).await?;
    if current.name == SUPERADMIN && name.as_deref().is_some_and(|n| n != SUPERADMIN) {
        return Err(AppError::Validation("The superadmin role cannot be renamed".to_string()));
    }
    let update = RoleUpdate {
        name,
        description,
        permissions: permissions.map(non_empty).transpose()?,
    };
    let role = state
        .repos
        .roles
        .update(id, update)
        .await?
        .ok_or_else(|| AppError::not_found("Role"))?;
    tracing::info!("✅ Role {} updated", role.name);
    Ok(role)
}

/// Deletes a role no user references. The superadmin role is permanent.
pub async fn delete(state: &AppState, id: Uuid) -> Result<()> {
    let role = find(state, id).await?;
    if role.name == SUPERADMIN {
        return Err(AppError::Validation("The superadmin role cannot be deleted".to_string()));
    }
    if state.repos.users.count_by_role(id).await? > 0 {
        return Err(AppError::Conflict("Role is still assigned to users".to_string()));
    }
    if !state.repos.roles.delete(id).await? {
        return Err(AppError::not_found("Role"));
    }
    tracing::info!("🗑️ Role {} deleted", role.name);
    Ok(())
}

/// Whether the role named `role_name` grants `permission`.
///
/// Superadmin holds every permission.
pub async fn role_grants(state: &AppState, role_name: &str, permission: &str) -> Result<bool> {
    if role_name == SUPERADMIN {
        return Ok(true);
    }
    Ok(state
        .repos
        .roles
        .find_by_name(role_name)
        .await?
        .is_some_and(|role| role.grants(permission)))
}
