use chrono::{Duration, Utc};
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use uuid::Uuid;

use crate::crypto::digest;
use crate::error::{AppError, Result};
use crate::models::license::{License, LicenseAnalytics, LicenseFilter, NewLicense, UsageEvent};
use crate::state::AppState;

/// Window of the expiry notification listing.
pub const EXPIRY_NOTICE_DAYS: i64 = 7;

/// Groups of a generated license key.
const GENERATED_KEY_GROUPS: usize = 4;
/// Characters per group.
const GENERATED_KEY_GROUP_LEN: usize = 5;

/// A license as returned to the admin who created it.
///
/// The only time the plaintext and the encrypted key leave the service.
#[derive(Debug, Clone)]
pub struct CreatedLicense {
    pub license: License,
    pub plaintext_key: String,
    pub encrypted_key: String,
}

/// Generates a random key like `7KQ2M-...`.
fn generate_key() -> String {
    (0..GENERATED_KEY_GROUPS)
        .map(|_| {
            OsRng
                .sample_iter(&Alphanumeric)
                .take(GENERATED_KEY_GROUP_LEN)
                .map(|b| (b as char).to_ascii_uppercase())
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Rejects callers that exhausted their attempts.
async fn ensure_not_blocked(state: &AppState, source: &str) -> Result<()> {
    if state.license_attempts.is_blocked(source).await? {
        return Err(AppError::RateLimited(
            "Too many invalid license attempts. Try again later".to_string(),
        ));
    }
    Ok(())
}

/// Decrypts the client's key and hashes it, counting undecryptable input as
/// a failed attempt.
async fn hashed_key_from(state: &AppState, source: &str, encrypted_key: &str) -> Result<String> {
    match state.cipher.decrypt(encrypted_key) {
        Ok(plaintext) => Ok(digest::hash(&plaintext)),
        Err(e) => {
            state.license_attempts.record_failure(source).await?;
            Err(e)
        }
    }
}

/// Decrypts a key for the authenticated operations, which are not throttled.
fn hashed_key(state: &AppState, encrypted_key: &str) -> Result<String> {
    state
        .cipher
        .decrypt(encrypted_key)
        .map(|plaintext| digest::hash(&plaintext))
}

/// Binds a license to a device.
///
/// The state change is one conditional write. When it matches nothing, the
/// license is re-read only to pick the error: unknown key, already active,
/// expired, then usage exhausted.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `source` - The caller's IP, used for throttling.
/// * `encrypted_key` - The hex ciphertext of the license key.
/// * `hardware_id` - The device identifier.
pub async fn activate(
    state: &AppState,
    source: &str,
    encrypted_key: &str,
    hardware_id: &str,
) -> Result<License> {
    ensure_not_blocked(state, source).await?;
    let hashed_key = hashed_key_from(state, source, encrypted_key).await?;
    let now = Utc::now();

    if let Some(license) = state
        .repos
        .licenses
        .try_activate(&hashed_key, &digest::hash(hardware_id), now)
        .await?
    {
        state.license_attempts.reset(source).await?;
        tracing::info!(
            "✅ License {} activated ({}/{})",
            license.id,
            license.usage_count,
            license.max_usage
        );
        return Ok(license);
    }

    match state.repos.licenses.find_by_hashed_key(&hashed_key).await? {
        None => {
            state.license_attempts.record_failure(source).await?;
            tracing::warn!("⚠️ Activation attempt with unknown license key from {}", source);
            Err(AppError::not_found("License key"))
        }
        Some(license) if license.is_active => Err(AppError::AlreadyActive),
        Some(license) if license.is_expired(now) => Err(AppError::Expired),
        Some(_) => Err(AppError::UsageLimitExceeded),
    }
}

/// Releases an active license.
pub async fn deactivate(state: &AppState, encrypted_key: &str) -> Result<License> {
    let hashed_key = hashed_key(state, encrypted_key)?;
    match state
        .repos
        .licenses
        .try_deactivate(&hashed_key, Utc::now())
        .await?
    {
        Some(license) => {
            tracing::info!("✅ License {} deactivated", license.id);
            Ok(license)
        }
        None => {
            tracing::warn!(
                "⚠️ Suspicious activity: deactivation of missing or inactive license {}",
                hashed_key
            );
            Err(AppError::NotActive)
        }
    }
}

/// Checks a license against a device.
///
/// Valid iff the license exists, is active, has not expired and is bound to
/// `hardware_id`. Mismatches count as failed attempts but are not errors.
pub async fn validate(
    state: &AppState,
    source: &str,
    encrypted_key: &str,
    hardware_id: &str,
) -> Result<bool> {
    ensure_not_blocked(state, source).await?;
    let hashed_key = hashed_key_from(state, source, encrypted_key).await?;

    let valid = state
        .repos
        .licenses
        .find_by_hashed_key(&hashed_key)
        .await?
        .is_some_and(|license| {
            license.is_active && !license.is_expired(Utc::now()) && license.is_bound_to(hardware_id)
        });

    if valid {
        state.license_attempts.reset(source).await?;
    } else {
        state.license_attempts.record_failure(source).await?;
        tracing::warn!("⚠️ Invalid license or hardware mismatch for key {}", hashed_key);
    }
    Ok(valid)
}

/// Renews a license: resets its usage count and extends its term.
pub async fn renew(state: &AppState, encrypted_key: &str) -> Result<License> {
    let hashed_key = hashed_key(state, encrypted_key)?;
    let license = state
        .repos
        .licenses
        .renew(&hashed_key, Utc::now())
        .await?
        .ok_or_else(|| {
            tracing::warn!("⚠️ Suspicious activity: renewal of unknown license {}", hashed_key);
            AppError::not_found("License key")
        })?;
    tracing::info!("✅ License {} renewed", license.id);
    Ok(license)
}

/// Creates a license from a supplied or generated key.
pub async fn create(
    state: &AppState,
    key: Option<String>,
    max_usage: Option<i32>,
    term_days: Option<i32>,
) -> Result<CreatedLicense> {
    let plaintext_key = key.unwrap_or_else(generate_key);
    let max_usage = max_usage.unwrap_or(state.config.license_default_max_usage);
    let new_license = NewLicense::from_plaintext(&plaintext_key, max_usage, term_days, Utc::now());
    let license = state.repos.licenses.insert(new_license).await?;
    let encrypted_key = state.cipher.encrypt(&plaintext_key)?;

    tracing::info!("✅ License {} created (maxUsage {})", license.id, license.max_usage);
    Ok(CreatedLicense {
        license,
        plaintext_key,
        encrypted_key,
    })
}

/// Deletes a license by ID.
pub async fn delete(state: &AppState, id: Uuid) -> Result<()> {
    if !state.repos.licenses.delete(id).await? {
        return Err(AppError::not_found("License"));
    }
    tracing::info!("🗑️ License {} deleted", id);
    Ok(())
}

/// Lists licenses, optionally by plaintext key and status.
pub async fn search(state: &AppState, key: Option<&str>, is_active: Option<bool>) -> Result<Vec<License>> {
    let filter = LicenseFilter {
        hashed_key: key.map(digest::hash),
        is_active,
    };
    state.repos.licenses.list(&filter).await
}

/// The usage history of one license.
pub async fn usage_history(state: &AppState, id: Uuid) -> Result<Vec<UsageEvent>> {
    state
        .repos
        .licenses
        .find_by_id(id)
        .await?
        .map(|license| license.usage_history)
        .ok_or_else(|| AppError::not_found("License"))
}

/// Aggregate license counts.
pub async fn analytics(state: &AppState) -> Result<LicenseAnalytics> {
    state.repos.licenses.analytics(Utc::now()).await
}

/// Active licenses expiring within the notice window.
pub async fn expiring_soon(state: &AppState) -> Result<Vec<License>> {
    let now = Utc::now();
    state
        .repos
        .licenses
        .expiring_before(now, now + Duration::days(EXPIRY_NOTICE_DAYS))
        .await
}
