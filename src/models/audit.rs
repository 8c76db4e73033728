use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Placeholder written over secret values.
pub const REDACTED: &str = "[REDACTED]";

/// Field names (compared case-insensitively, ignoring `_` and `-`) whose
/// values never reach the audit trail.
const SECRET_FIELDS: &[&str] = &[
    "password",
    "oldpassword",
    "newpassword",
    "key",
    "licensekey",
    "encryptedkey",
    "hardwareid",
    "token",
    "refreshtoken",
    "secret",
    "csrftoken",
];

/// One entry of the audit trail.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// The unique identifier for the entry.
    pub id: Uuid,
    /// The acting user, if authenticated.
    pub actor_id: Option<Uuid>,
    /// The acting user's role, or `guest`.
    pub actor_role: String,
    /// The action name.
    pub action: String,
    /// Redacted snapshot of the request payload.
    pub details: Value,
    /// The caller's IP address.
    pub ip_address: Option<String>,
    /// The caller's user agent.
    pub user_agent: Option<String>,
    /// When the action happened.
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Builds an entry, redacting `details` first.
    pub fn new(
        actor_id: Option<Uuid>,
        actor_role: &str,
        action: &str,
        details: Value,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_id,
            actor_role: actor_role.to_string(),
            action: action.to_string(),
            details: redact(details),
            ip_address,
            user_agent,
            created_at: Utc::now(),
        }
    }
}

/// Filter for audit queries.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Case-insensitive substring of the action name.
    pub action: Option<String>,
    /// Entries by this actor only.
    pub actor_id: Option<Uuid>,
}

impl AuditFilter {
    /// Whether `entry` passes this filter.
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        let action_ok = self.action.as_deref().is_none_or(|needle| {
            entry.action.to_lowercase().contains(&needle.to_lowercase())
        });
        action_ok && self.actor_id.is_none_or(|actor| entry.actor_id == Some(actor))
    }
}

fn is_secret_field(name: &str) -> bool {
    let normalized: String = name
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect();
    SECRET_FIELDS.contains(&normalized.as_str())
}

/// Replaces every secret field, at any depth, with [`REDACTED`].
pub fn redact(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(name, inner)| {
                    if is_secret_field(&name) {
                        (name, Value::String(REDACTED.to_string()))
                    } else {
                        (name, redact(inner))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(redact).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn secrets_are_redacted_at_any_depth() {
        let redacted = redact(json!({
            "key": "abcdef",
            "email": "a@b.co",
            "hardwareId": "hw",
            "nested": { "new_password": "x", "items": [{ "Token": "t", "qty": 2 }] }
        }));

        assert_eq!(redacted["key"], REDACTED);
        assert_eq!(redacted["hardwareId"], REDACTED);
        assert_eq!(redacted["email"], "a@b.co");
        assert_eq!(redacted["nested"]["new_password"], REDACTED);
        assert_eq!(redacted["nested"]["items"][0]["Token"], REDACTED);
        assert_eq!(redacted["nested"]["items"][0]["qty"], 2);
    }

    #[test]
    fn non_objects_pass_through() {
        assert_eq!(redact(json!("plain")), json!("plain"));
        assert_eq!(redact(Value::Null), Value::Null);
    }

    #[test]
    fn filter_matches_action_substring() {
        let entry = AuditEntry::new(None, "guest", "License Activate", Value::Null, None, None);
        let filter = AuditFilter { action: Some("activate".into()), actor_id: None };
        assert!(filter.matches(&entry));
        let filter = AuditFilter { action: Some("renew".into()), actor_id: None };
        assert!(!filter.matches(&entry));
    }
}
