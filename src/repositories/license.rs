use async_trait::async_trait;
use chrono::{DateTime, Utc};
use postgres_types::Json;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::{
    db::{map_constraint_error, PgStore},
    error::Result,
    models::license::{
        License, LicenseAnalytics, LicenseFilter, NewLicense, UsageAction, UsageEvent,
    },
};

/// Persistence for licenses.
///
/// Every state transition is a single conditional write: implementations must
/// not split the check and the update.
#[async_trait]
pub trait LicenseRepository: Send + Sync {
    /// Inserts a new license. A duplicate key is a `Conflict`.
    async fn insert(&self, license: NewLicense) -> Result<License>;

    /// Finds a license by the digest of its key.
    async fn find_by_hashed_key(&self, hashed_key: &str) -> Result<Option<License>>;

    /// Finds a license by ID.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<License>>;

    /// Activates the license iff it is inactive, unexpired and below its usage cap:
    /// sets `is_active`, `activated_at`, binds the hardware digest, increments
    /// `usage_count` and appends an `activate` event.
    ///
    /// # Returns
    ///
    /// The updated license, or `None` when no row satisfied the condition.
    async fn try_activate(
        &self,
        hashed_key: &str,
        hashed_hardware_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<License>>;

    /// Deactivates the license iff it is active and appends a `deactivate` event.
    async fn try_deactivate(&self, hashed_key: &str, now: DateTime<Utc>) -> Result<Option<License>>;

    /// Appends a `renew` event, resets `usage_count` and extends the expiry by
    /// one term. `None` when the key is unknown.
    async fn renew(&self, hashed_key: &str, now: DateTime<Utc>) -> Result<Option<License>>;

    /// Deletes a license. Returns whether a row was removed.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Lists licenses matching `filter`, newest first.
    async fn list(&self, filter: &LicenseFilter) -> Result<Vec<License>>;

    /// Counts total, active and expired licenses.
    async fn analytics(&self, now: DateTime<Utc>) -> Result<LicenseAnalytics>;

    /// Active licenses whose expiry falls in `(now, until]`.
    async fn expiring_before(&self, now: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<License>>;

    /// Deactivates every active license whose expiry has passed.
    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<Vec<License>>;
}

const LICENSE_COLUMNS: &str = "id, hashed_key, is_active, activated_at, usage_count, max_usage, \
     hashed_hardware_id, usage_history, term_days, expires_at, created_at";

fn row_to_license(row: &Row) -> Result<License> {
    let Json(usage_history): Json<Vec<UsageEvent>> = row.try_get("usage_history")?;
    Ok(License {
        id: row.try_get("id")?,
        hashed_key: row.try_get("hashed_key")?,
        is_active: row.try_get("is_active")?,
        activated_at: row.try_get("activated_at")?,
        usage_count: row.try_get("usage_count")?,
        max_usage: row.try_get("max_usage")?,
        hashed_hardware_id: row.try_get("hashed_hardware_id")?,
        usage_history,
        term_days: row.try_get("term_days")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn event(action: UsageAction, now: DateTime<Utc>) -> Json<Vec<UsageEvent>> {
    Json(vec![UsageEvent::new(action, now)])
}

#[async_trait]
impl LicenseRepository for PgStore {
    async fn insert(&self, license: NewLicense) -> Result<License> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                &format!(
                    r#"
                    INSERT INTO licenses (id, hashed_key, max_usage, term_days, expires_at, created_at)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    RETURNING {LICENSE_COLUMNS}
                    "#
                ),
                &[
                    &license.id,
                    &license.hashed_key,
                    &license.max_usage,
                    &license.term_days,
                    &license.expires_at,
                    &license.created_at,
                ],
            )
            .await
            .map_err(|e| map_constraint_error(e, "License key already exists"))?;
        row_to_license(&row)
    }

    async fn find_by_hashed_key(&self, hashed_key: &str) -> Result<Option<License>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {LICENSE_COLUMNS} FROM licenses WHERE hashed_key = $1"),
                &[&hashed_key],
            )
            .await?;
        row.map(|r| row_to_license(&r)).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<License>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT {LICENSE_COLUMNS} FROM licenses WHERE id = $1"),
                &[&id],
            )
            .await?;
        row.map(|r| row_to_license(&r)).transpose()
    }

    async fn try_activate(
        &self,
        hashed_key: &str,
        hashed_hardware_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<License>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    r#"
                    UPDATE licenses
                    SET
                        is_active = TRUE,
                        activated_at = $3,
                        hashed_hardware_id = $2,
                        usage_count = usage_count + 1,
                        usage_history = usage_history || $4::jsonb
                    WHERE hashed_key = $1
                      AND is_active = FALSE
                      AND usage_count < max_usage
                      AND (expires_at IS NULL OR expires_at > $3)
                    RETURNING {LICENSE_COLUMNS}
                    "#
                ),
                &[&hashed_key, &hashed_hardware_id, &now, &event(UsageAction::Activate, now)],
            )
            .await?;
        row.map(|r| row_to_license(&r)).transpose()
    }

    async fn try_deactivate(&self, hashed_key: &str, now: DateTime<Utc>) -> Result<Option<License>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    r#"
                    UPDATE licenses
                    SET
                        is_active = FALSE,
                        activated_at = NULL,
                        usage_history = usage_history || $2::jsonb
                    WHERE hashed_key = $1 AND is_active = TRUE
                    RETURNING {LICENSE_COLUMNS}
                    "#
                ),
                &[&hashed_key, &event(UsageAction::Deactivate, now)],
            )
            .await?;
        row.map(|r| row_to_license(&r)).transpose()
    }

    async fn renew(&self, hashed_key: &str, now: DateTime<Utc>) -> Result<Option<License>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!(
                    r#"
                    UPDATE licenses
                    SET
                        usage_count = 0,
                        expires_at = CASE
                            WHEN term_days IS NULL THEN expires_at
                            ELSE GREATEST(COALESCE(expires_at, $2), $2) + make_interval(days => term_days)
                        END,
                        usage_history = usage_history || $3::jsonb
                    WHERE hashed_key = $1
                    RETURNING {LICENSE_COLUMNS}
                    "#
                ),
                &[&hashed_key, &now, &event(UsageAction::Renew, now)],
            )
            .await?;
        row.map(|r| row_to_license(&r)).transpose()
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let client = self.pool.get().await?;
        let deleted = client
            .execute("DELETE FROM licenses WHERE id = $1", &[&id])
            .await?;
        Ok(deleted > 0)
    }

    async fn list(&self, filter: &LicenseFilter) -> Result<Vec<License>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    r#"
                    SELECT {LICENSE_COLUMNS}
                    FROM licenses
                    WHERE ($1::text IS NULL OR hashed_key = $1)
                      AND ($2::boolean IS NULL OR is_active = $2)
                    ORDER BY created_at DESC
                    "#
                ),
                &[&filter.hashed_key, &filter.is_active],
            )
            .await?;
        rows.iter().map(row_to_license).collect()
    }

    async fn analytics(&self, now: DateTime<Utc>) -> Result<LicenseAnalytics> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                r#"
                SELECT
                    COUNT(*) AS total_licenses,
                    COUNT(*) FILTER (WHERE is_active) AS active_licenses,
                    COUNT(*) FILTER (WHERE expires_at IS NOT NULL AND expires_at <= $1) AS expired_licenses
                FROM licenses
                "#,
                &[&now],
            )
            .await?;
        Ok(LicenseAnalytics {
            total_licenses: row.try_get("total_licenses")?,
            active_licenses: row.try_get("active_licenses")?,
            expired_licenses: row.try_get("expired_licenses")?,
        })
    }

    async fn expiring_before(&self, now: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<License>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    r#"
                    SELECT {LICENSE_COLUMNS}
                    FROM licenses
                    WHERE is_active = TRUE AND expires_at > $1 AND expires_at <= $2
                    ORDER BY expires_at ASC
                    "#
                ),
                &[&now, &until],
            )
            .await?;
        rows.iter().map(row_to_license).collect()
    }

    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<Vec<License>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                &format!(
                    r#"
                    UPDATE licenses
                    SET
                        is_active = FALSE,
                        activated_at = NULL,
                        usage_history = usage_history || $2::jsonb
                    WHERE is_active = TRUE AND expires_at IS NOT NULL AND expires_at <= $1
                    RETURNING {LICENSE_COLUMNS}
                    "#
                ),
                &[&now, &event(UsageAction::Deactivate, now)],
            )
            .await?;
        rows.iter().map(row_to_license).collect()
    }
}
