use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::crypto::password::PasswordHasher;
use crate::error::Result;

/// Represents a user in the system.
#[derive(Clone, Debug)]
pub struct User {
    /// The unique identifier for the user.
    pub id: Uuid,
    /// The user's username.
    pub username: String,
    /// The user's Argon2id password hash.
    pub password_hash: String,
    /// The role this user references.
    pub role_id: Uuid,
    /// Whether the user is active.
    pub is_active: bool,
    /// Why the account was deactivated.
    pub deactivation_reason: Option<String>,
    /// Whether the account is suspended.
    pub is_suspended: bool,
    /// Temporarily delegated role name.
    pub delegated_role: Option<String>,
    /// When the delegation lapses.
    pub delegation_expires_at: Option<DateTime<Utc>>,
    /// Consecutive failed logins.
    pub failed_login_attempts: i32,
    /// Authentication is refused until this instant.
    pub lock_until: Option<DateTime<Utc>>,
    /// The timestamp of the last successful login.
    pub last_login: Option<DateTime<Utc>>,
    /// The timestamp when the user was created.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Whether a lockout is in force at `now`.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.lock_until.is_some_and(|until| until > now)
    }

    /// The delegated role, if the delegation is still running at `now`.
    pub fn active_delegation(&self, now: DateTime<Utc>) -> Option<&str> {
        match (&self.delegated_role, self.delegation_expires_at) {
            (Some(role), Some(expires_at)) if expires_at > now => Some(role.as_str()),
            _ => None,
        }
    }

    /// The role name tokens carry: the delegation while it runs, else the base role.
    pub fn effective_role<'a>(&'a self, base_role: &'a str, now: DateTime<Utc>) -> &'a str {
        self.active_delegation(now).unwrap_or(base_role)
    }
}

/// A user ready to be persisted. Hashes the password on construction.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// The unique identifier for the user.
    pub id: Uuid,
    /// The user's username.
    pub username: String,
    /// The user's Argon2id password hash.
    pub password_hash: String,
    /// The referenced role.
    pub role_id: Uuid,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl NewUser {
    /// Hashes `password` and builds the record.
    pub fn new(
        hasher: &PasswordHasher,
        username: &str,
        password: &str,
        role_id: Uuid,
    ) -> Result<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: hasher.hash(password)?,
            role_id,
            created_at: Utc::now(),
        })
    }

    /// Converts into the stored representation.
    pub fn into_user(self) -> User {
        User {
            id: self.id,
            username: self.username,
            password_hash: self.password_hash,
            role_id: self.role_id,
            is_active: true,
            deactivation_reason: None,
            is_suspended: false,
            delegated_role: None,
            delegation_expires_at: None,
            failed_login_attempts: 0,
            lock_until: None,
            last_login: None,
            created_at: self.created_at,
        }
    }
}

/// Public view of a user. Never carries the password hash.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Uuid,
    pub username: String,
    pub role: String,
    pub role_id: Uuid,
    pub is_active: bool,
    pub is_suspended: bool,
    pub deactivation_reason: Option<String>,
    pub delegated_role: Option<String>,
    pub delegation_expires_at: Option<DateTime<Utc>>,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserView {
    /// Builds the view, resolving the role reference to `role_name`.
    pub fn new(user: &User, role_name: &str) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: role_name.to_string(),
            role_id: user.role_id,
            is_active: user.is_active,
            is_suspended: user.is_suspended,
            deactivation_reason: user.deactivation_reason.clone(),
            delegated_role: user.delegated_role.clone(),
            delegation_expires_at: user.delegation_expires_at,
            locked_until: user.lock_until,
            last_login: user.last_login,
            created_at: user.created_at,
        }
    }
}

/// Filter for the admin user listing.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    /// Active (`true`) or deactivated (`false`) users only.
    pub is_active: Option<bool>,
    /// Users referencing this role only.
    pub role_id: Option<Uuid>,
}

impl UserFilter {
    /// Whether `user` passes this filter.
    pub fn matches(&self, user: &User) -> bool {
        self.is_active.is_none_or(|active| active == user.is_active)
            && self.role_id.is_none_or(|role_id| role_id == user.role_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "clerk".into(),
            password_hash: String::new(),
            role_id: Uuid::new_v4(),
            is_active: true,
            deactivation_reason: None,
            is_suspended: false,
            delegated_role: None,
            delegation_expires_at: None,
            failed_login_attempts: 0,
            lock_until: None,
            last_login: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn delegation_applies_until_expiry() {
        let now = Utc::now();
        let mut user = user();
        assert_eq!(user.effective_role("seller", now), "seller");

        user.delegated_role = Some("manager".into());
        user.delegation_expires_at = Some(now + Duration::hours(1));
        assert_eq!(user.effective_role("seller", now), "manager");
        assert_eq!(user.effective_role("seller", now + Duration::hours(2)), "seller");
    }

    #[test]
    fn lock_is_time_boxed() {
        let now = Utc::now();
        let mut user = user();
        assert!(!user.is_locked(now));
        user.lock_until = Some(now + Duration::minutes(15));
        assert!(user.is_locked(now));
        assert!(!user.is_locked(now + Duration::minutes(15)));
    }
}
