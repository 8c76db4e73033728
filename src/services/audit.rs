use crate::error::{AppError, Result};
use crate::models::audit::{AuditEntry, AuditFilter};
use crate::state::AppState;

/// Upper bound for a page of audit entries.
pub const MAX_PAGE_SIZE: i64 = 200;

/// Row offset of a 1-based page. Pages whose offset does not fit are refused.
pub fn page_offset(page: i64, limit: i64) -> Result<i64> {
    (page.max(1) - 1)
        .checked_mul(limit)
        .ok_or_else(|| AppError::Validation("Page is out of range".to_string()))
}

/// Appends an entry. A failure is logged and never fails the request that
/// produced it.
pub async fn record(state: &AppState, entry: AuditEntry) {
    let action = entry.action.clone();
    if let Err(e) = state.repos.audit.record(entry).await {
        tracing::error!("❌ Failed to write audit entry {}: {}", action, e);
    }
}

/// One page of entries, newest first, with the total count.
pub async fn list(
    state: &AppState,
    filter: &AuditFilter,
    page: i64,
    limit: i64,
) -> Result<(Vec<AuditEntry>, i64)> {
    let limit = limit.clamp(1, MAX_PAGE_SIZE);
    let offset = page_offset(page, limit)?;
    state.repos.audit.list(filter, offset, limit).await
}

#[cfg(test)]
mod tests {
    use super::page_offset;
    use crate::error::AppError;

    #[test]
    fn page_offsets_count_from_one() {
        assert_eq!(page_offset(1, 50).unwrap(), 0);
        assert_eq!(page_offset(0, 50).unwrap(), 0);
        assert_eq!(page_offset(3, 20).unwrap(), 40);
    }

    #[test]
    fn huge_pages_are_refused() {
        assert!(matches!(page_offset(i64::MAX, 50), Err(AppError::Validation(_))));
    }
}
