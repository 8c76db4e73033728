use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::digest;

/// An action recorded in a license's usage history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageAction {
    /// The license was bound to a device.
    Activate,
    /// The license was released.
    Deactivate,
    /// The license was renewed.
    Renew,
}

/// One entry of a license's usage history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEvent {
    /// The action taken.
    pub action: UsageAction,
    /// When it was taken.
    pub timestamp: DateTime<Utc>,
}

impl UsageEvent {
    /// Creates an event stamped `now`.
    pub fn new(action: UsageAction, now: DateTime<Utc>) -> Self {
        Self { action, timestamp: now }
    }
}

/// A purchased entitlement, stored by the digest of its key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    /// The unique identifier for the license.
    pub id: Uuid,
    /// SHA-256 of the plaintext license key.
    pub hashed_key: String,
    /// Whether the license is currently bound to a device.
    pub is_active: bool,
    /// When the current activation happened.
    pub activated_at: Option<DateTime<Utc>>,
    /// Successful activations since creation or last renewal.
    pub usage_count: i32,
    /// Activation cap.
    pub max_usage: i32,
    /// SHA-256 of the bound hardware ID.
    #[serde(skip_serializing)]
    pub hashed_hardware_id: Option<String>,
    /// Ordered history of lifecycle actions.
    pub usage_history: Vec<UsageEvent>,
    /// License term in days, if the license expires.
    pub term_days: Option<i32>,
    /// When the license stops validating.
    pub expires_at: Option<DateTime<Utc>>,
    /// The timestamp when the license was created.
    pub created_at: DateTime<Utc>,
}

impl License {
    /// Whether the license has passed its expiry at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Whether `hardware_id` is the device this license is bound to.
    pub fn is_bound_to(&self, hardware_id: &str) -> bool {
        self.hashed_hardware_id
            .as_deref()
            .is_some_and(|bound| digest::matches(hardware_id, bound))
    }

    /// Whether another activation would stay within `max_usage`.
    pub fn has_remaining_usage(&self) -> bool {
        self.usage_count < self.max_usage
    }
}

/// A license ready to be persisted.
///
/// The only way to build one is from the plaintext key, which is hashed here
/// and dropped.
#[derive(Debug, Clone)]
pub struct NewLicense {
    /// The unique identifier for the license.
    pub id: Uuid,
    /// SHA-256 of the plaintext license key.
    pub hashed_key: String,
    /// Activation cap.
    pub max_usage: i32,
    /// License term in days.
    pub term_days: Option<i32>,
    /// Expiry derived from the term.
    pub expires_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl NewLicense {
    /// Hashes `plaintext_key` and builds an inactive license.
    pub fn from_plaintext(
        plaintext_key: &str,
        max_usage: i32,
        term_days: Option<i32>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            hashed_key: digest::hash(plaintext_key),
            max_usage,
            term_days,
            expires_at: term_days.map(|days| now + Duration::days(days as i64)),
            created_at: now,
        }
    }

    /// Converts into the stored representation.
    pub fn into_license(self) -> License {
        License {
            id: self.id,
            hashed_key: self.hashed_key,
            is_active: false,
            activated_at: None,
            usage_count: 0,
            max_usage: self.max_usage,
            hashed_hardware_id: None,
            usage_history: Vec::new(),
            term_days: self.term_days,
            expires_at: self.expires_at,
            created_at: self.created_at,
        }
    }
}

/// Filter for the admin license search.
#[derive(Debug, Clone, Default)]
pub struct LicenseFilter {
    /// Exact hashed key.
    pub hashed_key: Option<String>,
    /// Active (`true`) or inactive (`false`) licenses only.
    pub is_active: Option<bool>,
}

impl LicenseFilter {
    /// Whether `license` passes this filter.
    pub fn matches(&self, license: &License) -> bool {
        self.hashed_key.as_deref().is_none_or(|key| key == license.hashed_key)
            && self.is_active.is_none_or(|active| active == license.is_active)
    }
}

/// Aggregate license counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseAnalytics {
    /// All licenses.
    pub total_licenses: i64,
    /// Currently active licenses.
    pub active_licenses: i64,
    /// Licenses whose expiry has passed.
    pub expired_licenses: i64,
}

/// Result of the renew policy applied to a stored license.
///
/// Renewal resets the activation counter and pushes the expiry out by one
/// term, measured from the later of now and the current expiry. It never
/// changes `is_active`.
pub fn renewed_expiry(
    term_days: Option<i32>,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let term = term_days?;
    let base = expires_at.map_or(now, |current| current.max(now));
    Some(base + Duration::days(term as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_hashes_the_key() {
        let now = Utc::now();
        let license = NewLicense::from_plaintext("LIC-123", 3, None, now).into_license();
        assert_eq!(license.hashed_key, digest::hash("LIC-123"));
        assert_ne!(license.hashed_key, "LIC-123");
        assert!(!license.is_active);
        assert_eq!(license.usage_count, 0);
        assert!(license.expires_at.is_none());
    }

    #[test]
    fn term_sets_expiry() {
        let now = Utc::now();
        let license = NewLicense::from_plaintext("LIC-123", 3, Some(30), now).into_license();
        assert_eq!(license.expires_at, Some(now + Duration::days(30)));
        assert!(!license.is_expired(now));
        assert!(license.is_expired(now + Duration::days(30)));
    }

    #[test]
    fn renew_extends_from_later_of_now_and_expiry() {
        let now = Utc::now();
        assert_eq!(renewed_expiry(None, None, now), None);
        assert_eq!(renewed_expiry(Some(10), None, now), Some(now + Duration::days(10)));

        let future = now + Duration::days(5);
        assert_eq!(renewed_expiry(Some(10), Some(future), now), Some(future + Duration::days(10)));

        let past = now - Duration::days(5);
        assert_eq!(renewed_expiry(Some(10), Some(past), now), Some(now + Duration::days(10)));
    }

    #[test]
    fn hardware_binding_compares_digests() {
        let mut license = NewLicense::from_plaintext("LIC-1", 1, None, Utc::now()).into_license();
        assert!(!license.is_bound_to("hw-a"));
        license.hashed_hardware_id = Some(digest::hash("hw-a"));
        assert!(license.is_bound_to("hw-a"));
        assert!(!license.is_bound_to("hw-b"));
    }

    #[test]
    fn history_serializes_lowercase_actions() {
        let event = UsageEvent::new(UsageAction::Deactivate, Utc::now());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["action"], "deactivate");
    }
}
