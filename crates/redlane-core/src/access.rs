//! Roles and permissions.
//!
//! Authorization is a static table: each [`Role`] grants a fixed set of
//! [`Permission`]s. Admins hold everything.

use serde::{Deserialize, Serialize};

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A traveller.
    User,
    /// A customs officer reviewing declarations.
    CustomsOfficer,
    /// Full administrative access.
    Admin,
}

/// A named capability checked by route handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Create, update and delete duty categories.
    ManageDutyCategories,
    /// Create currencies and record exchange rates.
    ManageCurrencies,
    /// Administer user accounts.
    ManageUsers,
    /// Read every user's declarations.
    ViewAllDeclarations,
    /// Toggle and override feature flags.
    ManageFeatureFlags,
    /// Read audit logs.
    ViewAuditLogs,
}

impl Permission {
    /// Every permission.
    pub const ALL: [Permission; 6] = [
        Self::ManageDutyCategories,
        Self::ManageCurrencies,
        Self::ManageUsers,
        Self::ViewAllDeclarations,
        Self::ManageFeatureFlags,
        Self::ViewAuditLogs,
    ];

    /// Stored string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManageDutyCategories => "manage_duty_categories",
            Self::ManageCurrencies => "manage_currencies",
            Self::ManageUsers => "manage_users",
            Self::ViewAllDeclarations => "view_all_declarations",
            Self::ManageFeatureFlags => "manage_feature_flags",
            Self::ViewAuditLogs => "view_audit_logs",
        }
    }
}

impl Role {
    /// Stored string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::CustomsOfficer => "customs_officer",
            Self::Admin => "admin",
        }
    }

    /// Parse the stored string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "customs_officer" => Some(Self::CustomsOfficer),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    /// Permissions granted to this role.
    pub fn permissions(&self) -> &'static [Permission] {
        match self {
            Self::User => &[],
            Self::CustomsOfficer => &[Permission::ViewAllDeclarations],
            Self::Admin => &Permission::ALL,
        }
    }

    /// Whether this role grants `permission`.
    pub fn has(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
