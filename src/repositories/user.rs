use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    db::{map_constraint_error, PgStore},
    error::Result,
    models::user::{NewUser, User, UserFilter},
};

/// Fields a user may change on their own profile.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    /// New username.
    pub username: Option<String>,
    /// New password hash.
    pub password_hash: Option<String>,
}

/// Persistence for user accounts.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Inserts a new user. A duplicate username is a `Conflict`.
    async fn insert(&self, user: NewUser) -> Result<User>;

    /// Finds a user by username.
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Finds a user by ID.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Lists users matching `filter`, ordered by username, with the total count.
    async fn list(&self, filter: &UserFilter, offset: i64, limit: i64) -> Result<(Vec<User>, i64)>;

    /// Counts users referencing a role.
    async fn count_by_role(&self, role_id: Uuid) -> Result<i64>;

    /// Applies a profile update.
    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<Option<User>>;

    /// Points the user at another role.
    async fn set_role(&self, id: Uuid, role_id: Uuid) -> Result<Option<User>>;

    /// Activates or deactivates the account.
    async fn set_active(&self, id: Uuid, active: bool, reason: Option<String>) -> Result<Option<User>>;

    /// Suspends or unsuspends the account.
    async fn set_suspended(&self, id: Uuid, suspended: bool) -> Result<Option<User>>;

    /// Sets or clears a delegated role.
    async fn set_delegation(
        &self,
        id: Uuid,
        role: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<User>>;

    /// Counts a failed login in one atomic step.
    ///
    /// If a previous lock has lapsed the counter restarts at 1; once it
    /// reaches `threshold`, `lock_until` is set to `now + lock_for`.
    async fn record_login_failure(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        threshold: i32,
        lock_for: Duration,
    ) -> Result<Option<User>>;

    /// Clears failure counters and stamps `last_login`.
    async fn record_login_success(&self, id: Uuid, now: DateTime<Utc>) -> Result<()>;

    /// Deletes a user. Returns whether a row was removed.
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

const USER_COLUMNS: &str = "id, username, password_hash, role_id, is_active, deactivation_reason, \
     is_suspended, delegated_role, delegation_expires_at, failed_login_attempts, lock_until, \
     last_login, created_at";

/// A helper function to map a `tokio_postgres::Row` to a `User`.
fn row_to_user(row: &Row) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        role_id: row.try_get("role_id")?,
        is_active: row.try_get("is_active")?,
        deactivation_reason: row.try_get("deactivation_reason")?,
        is_suspended: row.try_get("is_suspended")?,
        delegated_role: row.try_get("delegated_role")?,
        delegation_expires_at: row.try_get("delegation_expires_at")?,
        failed_login_attempts: row.try_get("failed_login_attempts")?,
        lock_until: row.try_get("lock_until")?,
        last_login: row.try_get("last_login")?,
        created_at: row.try_get("created_at")?,
    })
}

impl PgStore {
    async fn update_user(
        &self,
        assignments: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<Option<User>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("UPDATE users SET {assignments} WHERE id = $1 RETURNING {USER_COLUMNS}"),
                params,
            )
            .await
            .map_err(|e| map_constraint_error(e, "Username or role conflict"))?;
        row.map(|r| row_to_user(&r)).transpose()
    }
}

#[async_trait]
impl UserRepository for PgStore {
    async fn insert(&self, user: NewUser) -> Result<User> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                &format!(
                    r#"
                    INSERT INTO users (id, username, password_hash, role_id, created_at)
                    VALUES ($1, $2, $3, $4, $5)
                    RETURNING {USER_COLUMNS}
                    "#
                ),
                &[&user.id, &user.username, &user.password_hash, &user.role_id, &user.created_at],
            )
            .await
            .map_err(|e| map_constraint_error(e, "Username already taken"))?;
        row_to_user(&row)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1"),
                &[&username],
            )
            .await?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"),
                &[&id],
            )
            .await?;
        row.map(|r| row_to_user(&r)).transpose()
    }

    async fn list(&self, filter: &UserFilter, offset: i64, limit: i64) -> Result<(Vec<User>, i64)> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    r#"
                    SELECT {USER_COLUMNS}
                    FROM users
                    WHERE ($1::boolean IS NULL OR is_active = $1)
                      AND ($2::uuid IS NULL OR role_id = $2)
                    ORDER BY username ASC
                    OFFSET $3 LIMIT $4
                    "#
                ),
                &[&filter.is_active, &filter.role_id, &offset, &limit],
            )
            .await?;
        let total: i64 = client
            .query_one(
                r#"
                SELECT COUNT(*) AS total
                FROM users
                WHERE ($1::boolean IS NULL OR is_active = $1)
                  AND ($2::uuid IS NULL OR role_id = $2)
                "#,
                &[&filter.is_active, &filter.role_id],
            )
            .await?
            .try_get("total")?;
        let users = rows.iter().map(row_to_user).collect::<Result<Vec<_>>>()?;
        Ok((users, total))
    }

    async fn count_by_role(&self, role_id: Uuid) -> Result<i64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one("SELECT COUNT(*) AS total FROM users WHERE role_id = $1", &[&role_id])
            .await?;
        Ok(row.try_get("total")?)
    }

    async fn update_profile(&self, id: Uuid, update: ProfileUpdate) -> Result<Option<User>> {
        self.update_user(
            "username = COALESCE($2, username), password_hash = COALESCE($3, password_hash)",
            &[&id, &update.username, &update.password_hash],
        )
        .await
    }

    async fn set_role(&self, id: Uuid, role_id: Uuid) -> Result<Option<User>> {
        self.update_user("role_id = $2", &[&id, &role_id]).await
    }

    async fn set_active(&self, id: Uuid, active: bool, reason: Option<String>) -> Result<Option<User>> {
        self.update_user(
            "is_active = $2, deactivation_reason = $3",
            &[&id, &active, &reason],
        )
        .await
    }

    async fn set_suspended(&self, id: Uuid, suspended: bool) -> Result<Option<User>> {
        self.update_user("is_suspended = $2", &[&id, &suspended]).await
    }

    async fn set_delegation(
        &self,
        id: Uuid,
        role: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<Option<User>> {
        self.update_user(
            "delegated_role = $2, delegation_expires_at = $3",
            &[&id, &role, &expires_at],
        )
        .await
    }

    async fn record_login_failure(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        threshold: i32,
        lock_for: Duration,
    ) -> Result<Option<User>> {
        let lock_until = now + lock_for;
        self.update_user(
            r#"
            failed_login_attempts = CASE
                WHEN lock_until IS NOT NULL AND lock_until <= $2 THEN 1
                ELSE failed_login_attempts + 1
            END,
            lock_until = CASE
                WHEN lock_until IS NOT NULL AND lock_until <= $2 THEN NULL
                WHEN failed_login_attempts + 1 >= $3 THEN $4
                ELSE lock_until
            END
            "#,
            &[&id, &now, &threshold, &lock_until],
        )
        .await
    }

    async fn record_login_success(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        self.update_user(
            "failed_login_attempts = 0, lock_until = NULL, last_login = $2",
            &[&id, &now],
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let client = self.pool.get().await?;
        let deleted = client.execute("DELETE FROM users WHERE id = $1", &[&id]).await?;
        Ok(deleted > 0)
    }
}
