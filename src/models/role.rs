use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role that passes every role gate.
pub const SUPERADMIN: &str = "superadmin";
/// The administrator role.
pub const ADMIN: &str = "admin";
/// The manager role.
pub const MANAGER: &str = "manager";

/// Roles allowed on admin-only routes.
pub const ADMIN_ROLES: &[&str] = &[ADMIN, SUPERADMIN];
/// Roles allowed to suspend users and delegate roles.
pub const SUPERVISOR_ROLES: &[&str] = &[ADMIN, MANAGER, SUPERADMIN];

/// Permission strings referenced by route gates.
pub mod permissions {
    /// Create, edit and seed roles.
    pub const MANAGE_ROLES: &str = "manage_roles";
    /// Read the audit trail.
    pub const VIEW_AUDIT_LOGS: &str = "view_audit_logs";
}

/// A named set of permissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    /// The unique identifier for the role.
    pub id: Uuid,
    /// The unique role name.
    pub name: String,
    /// Human-readable description.
    pub description: Option<String>,
    /// Granted permissions.
    pub permissions: Vec<String>,
    /// The timestamp when the role was created.
    pub created_at: DateTime<Utc>,
}

impl Role {
    /// Builds a new role with a fresh ID, normalizing the permission list.
    pub fn new(name: &str, description: Option<String>, permissions: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description,
            permissions: normalize_permissions(permissions),
            created_at: Utc::now(),
        }
    }

    /// Whether this role grants `permission`.
    pub fn grants(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

/// Trims, drops empties and de-duplicates while keeping order.
pub fn normalize_permissions(permissions: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(permissions.len());
    for permission in permissions {
        let permission = permission.trim().to_string();
        if !permission.is_empty() && !out.contains(&permission) {
            out.push(permission);
        }
    }
    out
}

/// A role seeded at startup when absent.
pub struct PredefinedRole {
    /// Role name.
    pub name: &'static str,
    /// Description.
    pub description: &'static str,
    /// Permissions.
    pub permissions: &'static [&'static str],
}

impl PredefinedRole {
    /// Builds the role record.
    pub fn to_role(&self) -> Role {
        Role::new(
            self.name,
            Some(self.description.to_string()),
            self.permissions.iter().map(|p| p.to_string()).collect(),
        )
    }
}

/// Roles every deployment starts with.
pub const PREDEFINED_ROLES: &[PredefinedRole] = &[
    PredefinedRole {
        name: SUPERADMIN,
        description: "Has full access to all features and settings.",
        permissions: &[
            "manage_roles",
            "manage_users",
            "view_reports",
            "manage_inventory",
            "manage_transactions",
            "manage_categories",
            "view_audit_logs",
            "manage_licenses",
            "view_analytics",
        ],
    },
    PredefinedRole {
        name: ADMIN,
        description: "Can manage users, view reports, and oversee operations.",
        permissions: &[
            "manage_users",
            "view_reports",
            "manage_inventory",
            "manage_transactions",
            "manage_categories",
            "view_audit_logs",
        ],
    },
    PredefinedRole {
        name: MANAGER,
        description: "Can manage inventory and oversee sellers and inventory clerks.",
        permissions: &["manage_inventory", "view_reports", "assign_roles", "manage_categories"],
    },
    PredefinedRole {
        name: "seller",
        description: "Can sell products and view sales reports.",
        permissions: &["sell_products", "view_sales_reports", "manage_own_transactions"],
    },
    PredefinedRole {
        name: "inventory_clerk",
        description: "Can add and update product information in the inventory.",
        permissions: &["add_products", "update_products", "view_inventory"],
    },
];
