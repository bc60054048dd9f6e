//! Platform and organization roles
//!
//! This module defines the fixed role set and the predicates every permission
//! decision in Certis is derived from. Other crates must ask these predicates
//! instead of matching on roles themselves.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A user's role.
///
/// Roles split into two disjoint families:
///
/// - **System roles** (`Sudoer`, `Staff`): platform-wide, never attached to an
///   organization.
/// - **Organization roles** (`Owner`, `Admin`, `User`): scoped to exactly one
///   organization. A user without an organization always holds `User`.
///
/// The derived ordering follows the declaration order and carries no
/// privilege meaning beyond being total and stable.
///
/// # Examples
///
/// ```
/// use certis_rbac::Role;
///
/// assert!(Role::Staff.is_system_role());
/// assert!(Role::Admin.can_manage_users());
/// assert!(!Role::User.can_revoke_certificates());
/// assert!(Role::User.can_create_certificates());
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Platform superuser
    Sudoer,

    /// Platform operator
    Staff,

    /// Single owner of an organization
    Owner,

    /// Organization administrator
    Admin,

    /// Organization member, also the role of unaffiliated users
    User,
}

/// Error returned when a role name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl Role {
    /// Every role, in enumeration order.
    pub const ALL: [Role; 5] = [Role::Sudoer, Role::Staff, Role::Owner, Role::Admin, Role::User];

    /// `true` for `Sudoer` and `Staff`.
    pub fn is_system_role(&self) -> bool {
        matches!(self, Role::Sudoer | Role::Staff)
    }

    /// `true` for `Owner`, `Admin` and `User`.
    pub fn is_org_role(&self) -> bool {
        matches!(self, Role::Owner | Role::Admin | Role::User)
    }

    /// Whether this role may invite, remove, and change the roles of users.
    pub fn can_manage_users(&self) -> bool {
        matches!(self, Role::Sudoer | Role::Staff | Role::Owner | Role::Admin)
    }

    /// Whether this role may revoke certificates.
    ///
    /// Organization roles are further restricted to certificates of their
    /// own organization by the authorization guard.
    pub fn can_revoke_certificates(&self) -> bool {
        self.can_manage_users()
    }

    /// Whether this role may act on platform-level settings and see across
    /// tenants.
    pub fn can_manage_platform(&self) -> bool {
        self.is_system_role()
    }

    /// All organization roles may issue certificates.
    pub fn can_create_certificates(&self) -> bool {
        self.is_org_role()
    }

    /// `true` for the organization roles that administer membership
    /// (`Owner`, `Admin`).
    pub fn is_org_manager(&self) -> bool {
        matches!(self, Role::Owner | Role::Admin)
    }

    /// Parse role from its name (case-insensitive).
    ///
    /// # Examples
    ///
    /// ```
    /// use certis_rbac::Role;
    ///
    /// assert_eq!(Role::parse("admin"), Some(Role::Admin));
    /// assert_eq!(Role::parse("SUDOER"), Some(Role::Sudoer));
    /// assert_eq!(Role::parse("guest"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SUDOER" => Some(Self::Sudoer),
            "STAFF" => Some(Self::Staff),
            "OWNER" => Some(Self::Owner),
            "ADMIN" => Some(Self::Admin),
            "USER" => Some(Self::User),
            _ => None,
        }
    }

    /// Wire name of the role, as carried in tokens.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sudoer => "SUDOER",
            Self::Staff => "STAFF",
            Self::Owner => "OWNER",
            Self::Admin => "ADMIN",
            Self::User => "USER",
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Self::User
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| UnknownRole(s.to_string()))
    }
}
