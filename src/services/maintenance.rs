use chrono::Utc;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::services::license::expiring_soon;
use crate::state::AppState;

/// What one maintenance pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Licenses switched off because their term ran out.
    pub deactivated: usize,
    /// Active licenses inside the expiry notice window.
    pub expiring: usize,
    /// Attempt entries evicted across both trackers.
    pub purged_attempts: usize,
}

/// Runs one maintenance pass.
///
/// Deactivates expired licenses, reports licenses close to expiry and evicts
/// stale attempt counters.
pub async fn run_once(state: &AppState) -> Result<MaintenanceReport> {
    let expired = state.repos.licenses.deactivate_expired(Utc::now()).await?;
    for license in &expired {
        tracing::info!("⏰ License {} expired and was deactivated", license.id);
    }

    let expiring = expiring_soon(state).await?;
    for license in &expiring {
        if let Some(expires_at) = license.expires_at {
            tracing::warn!("⚠️ License {} expires at {}", license.id, expires_at);
        }
    }

    let purged_attempts = state.license_attempts.purge_stale().await?
        + state.login_attempts.purge_stale().await?;

    Ok(MaintenanceReport {
        deactivated: expired.len(),
        expiring: expiring.len(),
        purged_attempts,
    })
}

/// Spawns the periodic maintenance job on the configured interval.
pub fn spawn(state: AppState) -> JoinHandle<()> {
    let interval = state.config.maintenance_interval;
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            tracing::info!("🧹 Running scheduled maintenance...");
            match run_once(&state).await {
                Ok(report) => {
                    tracing::info!(
                        "✅ Maintenance completed: {} deactivated, {} expiring, {} attempt entries purged",
                        report.deactivated,
                        report.expiring,
                        report.purged_attempts
                    );
                }
                Err(e) => {
                    tracing::error!("❌ Maintenance job failed: {}", e);
                }
            }
        }
    })
}
