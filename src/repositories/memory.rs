use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{
        audit::{AuditEntry, AuditFilter},
        license::{
            renewed_expiry, License, LicenseAnalytics, LicenseFilter, NewLicense, UsageAction,
            UsageEvent,
        },
        role::Role,
        user::{NewUser, User, UserFilter},
    },
    repositories::{
        audit::AuditRepository,
        license::LicenseRepository,
        role::{RoleRepository, RoleUpdate},
        user::{ProfileUpdate, UserRepository},
    },
};

/// Process-local credential store.
///
/// Every conditional transition runs inside one write-lock critical section,
/// which gives it the same all-or-nothing behaviour as the SQL statements.
#[derive(Default)]
pub struct MemoryStore {
    licenses: RwLock<HashMap<Uuid, License>>,
    users: RwLock<HashMap<Uuid, User>>,
    roles: RwLock<HashMap<Uuid, Role>>,
    audit: RwLock<Vec<AuditEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update_user_with<F>(&self, id: Uuid, apply: F) -> Result<Option<User>>
    where
        F: FnOnce(&mut User) + Send,
    {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&id).map(|user| {
            apply(user);
            user.clone()
        }))
    }
}

fn page<T: Clone>(items: &[T], offset: i64, limit: i64) -> Vec<T> {
    let offset = usize::try_from(offset).unwrap_or(0);
    let limit = usize::try_from(limit).unwrap_or(0);
    items.iter().skip(offset).take(limit).cloned().collect()
}

#[async_trait]
impl LicenseRepository for MemoryStore {
    async fn insert(&self, license: NewLicense) -> Result<License> {
        let mut licenses = self.licenses.write().await;
        if licenses.values().any(|l| l.hashed_key == license.hashed_key) {
            return Err(AppError::Conflict("License key already exists".to_string()));
        }
        let license = license.into_license();
        licenses.insert(license.id, license.clone());
        Ok(license)
    }

    async fn find_by_hashed_key(&self, hashed_key: &str) -> Result<Option<License>> {
        let licenses = self.licenses.read().await;
        Ok(licenses.values().find(|l| l.hashed_key == hashed_key).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<License>> {
        Ok(self.licenses.read().await.get(&id).cloned())
    }

    async fn try_activate(
        &self,
        hashed_key: &str,
        hashed_hardware_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<License>> {
        let mut licenses = self.licenses.write().await;
        let Some(license) = licenses
            .values_mut()
            .find(|l| {
                l.hashed_key == hashed_key
                    && !l.is_active
                    && !l.is_expired(now)
                    && l.has_remaining_usage()
            })
        else {
            return Ok(None);
        };
        license.is_active = true;
        license.activated_at = Some(now);
        license.hashed_hardware_id = Some(hashed_hardware_id.to_string());
        license.usage_count += 1;
        license.usage_history.push(UsageEvent::new(UsageAction::Activate, now));
        Ok(Some(license.clone()))
    }

    async fn try_deactivate(&self, hashed_key: &str, now: DateTime<Utc>) -> Result<Option<License>> {
        let mut licenses = self.licenses.write().await;
        let Some(license) = licenses
            .values_mut()
            .find(|l| l.hashed_key == hashed_key && l.is_active)
        else {
            return Ok(None);
        };
        license.is_active = false;
        license.activated_at = None;
        license.usage_history.push(UsageEvent::new(UsageAction::Deactivate, now));
        Ok(Some(license.clone()))
    }

    async fn renew(&self, hashed_key: &str, now: DateTime<Utc>) -> Result<Option<License>> {
        let mut licenses = self.licenses.write().await;
        let Some(license) = licenses.values_mut().find(|l| l.hashed_key == hashed_key) else {
            return Ok(None);
        };
        license.usage_count = 0;
        if license.term_days.is_some() {
            license.expires_at = renewed_expiry(license.term_days, license.expires_at, now);
        }
        license.usage_history.push(UsageEvent::new(UsageAction::Renew, now));
        Ok(Some(license.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.licenses.write().await.remove(&id).is_some())
    }

    async fn list(&self, filter: &LicenseFilter) -> Result<Vec<License>> {
        let licenses = self.licenses.read().await;
        let mut found: Vec<License> = licenses.values().filter(|l| filter.matches(l)).cloned().collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    async fn analytics(&self, now: DateTime<Utc>) -> Result<LicenseAnalytics> {
        let licenses = self.licenses.read().await;
        let mut analytics = LicenseAnalytics::default();
        for license in licenses.values() {
            analytics.total_licenses += 1;
            if license.is_active {
                analytics.active_licenses += 1;
            }
            if license.is_expired(now) {
                analytics.expired_licenses += 1;
            }
        }
        Ok(analytics)
    }

    async fn expiring_before(&self, now: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<License>> {
        let licenses = self.licenses.read().await;
        let mut found: Vec<License> = licenses
            .values()
            .filter(|l| l.is_active && l.expires_at.is_some_and(|at| at > now && at <= until))
            .cloned()
            .collect();
        found.sort_by_key(|l| l.expires_at);
        Ok(found)
    }

    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<Vec<License>> {
        let mut licenses = self.licenses.write().await;
        let mut expired = Vec::new();
        for license in licenses.values_mut().filter(|l| l.is_active && l.is_expired(now)) {
            license.is_active = false;
            license.activated_at = None;
            license.usage_history.push(UsageEvent::new(UsageAction::Deactivate, now));
            expired.push(license.clone());
        }
        Ok(expired)
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn insert(&self, user: NewUser) -> Result<User> {
        if !self.roles.read().await.contains_key(&user.role_id) {
            return Err(AppError::Conflict("Unknown role".to_string()));
        }
        let mut users = self.users.write().await;
        if users.values().any(|u| u.username == user.username) {
            return Err(AppError::Conflict("Username already taken".to_string()));
        }
        let user = user.into_user();
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn list(&self, filter: &UserFilter, offset: i64, limit: i64) -> Result<(Vec<User>, i64)> {
        let users = self.users.read().await;
        let mut found: Vec<User> = users.values().filter(|u| filter.matches(u)).cloned().collect();
        found.sort_by(|a, b| a.username.cmp(&b.username));
        let total = found.len() as i64;
        Ok((page(&found, offset, limit), total))
    }

    async fn count_by_role(&self, role_id: Uuid) -> Result<i64> {
        let users = self.users.read().await;
        Ok(users.values().filter(|u| u.role_id == role_id).count() as i64)
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<Option<User>> {
        let mut users = self.users.write().await;
        if let Some(username) = &update.username {
            if users.values().any(|u| u.id != id && &u.username == username) {
                return Err(AppError::Conflict("Username or role conflict".to_string()));
            }
        }
        Ok(users.get_mut(&id).map(|user| {
            if let Some(username) = update.username {
                user.username = username;
            }
            if let Some(password_hash) = update.password_hash {
                user.password_hash = password_hash;
            }
            user.clone()
        }))
    }

    async fn set_role(&self, id: Uuid, role_id: Uuid) -> Result<Option<User>> {
        if !self.roles.read().await.contains_key(&role_id) {
            return Err(AppError::Conflict("Username or role conflict".to_string()));
        }
        self.update_user_with(id, |user| user.role_id = role_id).await
    }

    async fn set_active(&self, id: Uuid, active: bool, reason: Option<String>) -> Result<Option<User>> {
        self.update_user_with(id, |user| {
            user.is_active = active;
            user.deactivation_reason = reason;
        })
        .await
    }

    async fn set_suspended(&self, id: Uuid, suspended: bool) -> Result<Option<User>> {
        self.update_user_with(id, |user| user.is_suspended = suspended).await
    }

    async fn set_delegation(
        &self,
        id: Uuid,
        role: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<User>> {
        self.update_user_with(id, |user| {
            user.delegated_role = role;
            user.delegation_expires_at = expires_at;
        })
        .await
    }

    async fn record_login_failure(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        threshold: i32,
        lock_for: Duration,
    ) -> Result<Option<User>> {
        self.update_user_with(id, |user| {
            if user.lock_until.is_some_and(|until| until <= now) {
                user.failed_login_attempts = 1;
                user.lock_until = None;
            } else {
                user.failed_login_attempts += 1;
                if user.failed_login_attempts >= threshold {
                    user.lock_until = Some(now + lock_for);
                }
            }
        })
        .await
    }

    async fn record_login_success(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        self.update_user_with(id, |user| {
            user.failed_login_attempts = 0;
            user.lock_until = None;
            user.last_login = Some(now);
        })
        .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.users.write().await.remove(&id).is_some())
    }
}

#[async_trait]
impl RoleRepository for MemoryStore {
    async fn insert(&self, role: Role) -> Result<Role> {
        let mut roles = self.roles.write().await;
        if roles.values().any(|r| r.name == role.name) {
            return Err(AppError::Conflict("Role already exists".to_string()));
        }
        roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn insert_if_absent(&self, role: Role) -> Result<bool> {
        let mut roles = self.roles.write().await;
        if roles.values().any(|r| r.name == role.name) {
            return Ok(false);
        }
        roles.insert(role.id, role);
        Ok(true)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Role>> {
        Ok(self.roles.read().await.get(&id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Role>> {
        let roles = self.roles.read().await;
        Ok(roles.values().find(|r| r.name == name).cloned())
    }

    async fn list(&self) -> Result<Vec<Role>> {
        let roles = self.roles.read().await;
        let mut all: Vec<Role> = roles.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn update(&self, id: Uuid, update: RoleUpdate) -> Result<Option<Role>> {
        let mut roles = self.roles.write().await;
        if let Some(name) = &update.name {
            if roles.values().any(|r| r.id != id && &r.name == name) {
                return Err(AppError::Conflict("Role already exists".to_string()));
            }
        }
        Ok(roles.get_mut(&id).map(|role| {
            if let Some(name) = update.name {
                role.name = name;
            }
            if let Some(description) = update.description {
                role.description = Some(description);
            }
            if let Some(permissions) = update.permissions {
                role.permissions = permissions;
            }
            role.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        if self.users.read().await.values().any(|u| u.role_id == id) {
            return Err(AppError::Conflict("Role is still assigned to users".to_string()));
        }
        Ok(self.roles.write().await.remove(&id).is_some())
    }
}

#[async_trait]
impl AuditRepository for MemoryStore {
    async fn record(&self, entry: AuditEntry) -> Result<()> {
        self.audit.write().await.push(entry);
        Ok(())
    }

    async fn list(&self, filter: &AuditFilter, offset: i64, limit: i64) -> Result<(Vec<AuditEntry>, i64)> {
        let audit = self.audit.read().await;
        let found: Vec<AuditEntry> = audit.iter().rev().filter(|e| filter.matches(e)).cloned().collect();
        let total = found.len() as i64;
        Ok((page(&found, offset, limit), total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::digest;
    use std::sync::Arc;

    #[tokio::test]
    async fn concurrent_activations_respect_the_cap() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        LicenseRepository::insert(store.as_ref(), NewLicense::from_plaintext("KEY-1", 1, None, now))
            .await
            .unwrap();
        let hashed = digest::hash("KEY-1");

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            let hashed = hashed.clone();
            handles.push(tokio::spawn(async move {
                store.try_activate(&hashed, &format!("hw-{i}"), now).await.unwrap()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);

        let license = store.find_by_hashed_key(&hashed).await.unwrap().unwrap();
        assert_eq!(license.usage_count, 1);
        assert_eq!(license.usage_history.len(), 1);
    }

    #[tokio::test]
    async fn lapsed_lock_restarts_the_counter() {
        let store = MemoryStore::new();
        let role = Role::new("seller", None, vec!["sell_products".into()]);
        RoleRepository::insert(&store, role.clone()).await.unwrap();
        let user = NewUser {
            id: Uuid::new_v4(),
            username: "clerk".into(),
            password_hash: "x".into(),
            role_id: role.id,
            created_at: Utc::now(),
        };
        let user = UserRepository::insert(&store, user).await.unwrap();

        let now = Utc::now();
        let lock = Duration::minutes(15);
        for _ in 0..3 {
            store.record_login_failure(user.id, now, 3, lock).await.unwrap();
        }
        let locked = UserRepository::find_by_id(&store, user.id).await.unwrap().unwrap();
        assert!(locked.is_locked(now));

        let later = now + Duration::minutes(16);
        let user = store.record_login_failure(user.id, later, 3, lock).await.unwrap().unwrap();
        assert_eq!(user.failed_login_attempts, 1);
        assert!(!user.is_locked(later));
    }

    #[tokio::test]
    async fn role_in_use_cannot_be_deleted() {
        let store = MemoryStore::new();
        let role = Role::new("auditor", None, vec!["view_audit_logs".into()]);
        RoleRepository::insert(&store, role.clone()).await.unwrap();
        let user = NewUser {
            id: Uuid::new_v4(),
            username: "watcher".into(),
            password_hash: "x".into(),
            role_id: role.id,
            created_at: Utc::now(),
        };
        UserRepository::insert(&store, user).await.unwrap();

        let err = RoleRepository::delete(&store, role.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
