use async_trait::async_trait;
use tokio_postgres::Row;

use crate::{
    db::PgStore,
    error::Result,
    models::audit::{AuditEntry, AuditFilter},
};

/// Append-only persistence for the audit trail.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Appends an entry.
    async fn record(&self, entry: AuditEntry) -> Result<()>;

    /// Lists entries matching `filter`, newest first, with the total count.
    async fn list(&self, filter: &AuditFilter, offset: i64, limit: i64) -> Result<(Vec<AuditEntry>, i64)>;
}

fn row_to_entry(row: &Row) -> Result<AuditEntry> {
    Ok(AuditEntry {
        id: row.try_get("id")?,
        actor_id: row.try_get("actor_id")?,
        actor_role: row.try_get("actor_role")?,
        action: row.try_get("action")?,
        details: row.try_get("details")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl AuditRepository for PgStore {
    async fn record(&self, entry: AuditEntry) -> Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                INSERT INTO audit_log (id, actor_id, actor_role, action, details, ip_address, user_agent, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
                &[
                    &entry.id,
                    &entry.actor_id,
                    &entry.actor_role,
                    &entry.action,
                    &entry.details,
                    &entry.ip_address,
                    &entry.user_agent,
                    &entry.created_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn list(&self, filter: &AuditFilter, offset: i64, limit: i64) -> Result<(Vec<AuditEntry>, i64)> {
        let client = self.pool.get().await?;
        let pattern = filter.action.as_ref().map(|a| format!("%{}%", escape_like(a)));
        let rows = client
            .query(
                r#"
                SELECT id, actor_id, actor_role, action, details, ip_address, user_agent, created_at
                FROM audit_log
                WHERE ($1::text IS NULL OR action ILIKE $1)
                  AND ($2::uuid IS NULL OR actor_id = $2)
                ORDER BY created_at DESC
                OFFSET $3 LIMIT $4
                "#,
                &[&pattern, &filter.actor_id, &offset, &limit],
            )
            .await?;
        let total: i64 = client
            .query_one(
                r#"
                SELECT COUNT(*) AS total
                FROM audit_log
                WHERE ($1::text IS NULL OR action ILIKE $1)
                  AND ($2::uuid IS NULL OR actor_id = $2)
                "#,
                &[&pattern, &filter.actor_id],
            )
            .await?
            .try_get("total")?;
        let entries = rows.iter().map(row_to_entry).collect::<Result<Vec<_>>>()?;
        Ok((entries, total))
    }
}

/// Escapes `LIKE` wildcards so the filter is a plain substring match.
fn escape_like(value: &str) -> String {
    value.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::escape_like;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like("plain"), "plain");
    }
}
