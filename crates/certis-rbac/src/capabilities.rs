//! # Capabilities
//!
//! Named permissions checked by the authorization guard. A capability is
//! granted purely as a function of the caller's role; organization
//! membership is checked separately.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::roles::Role;

/// Operations gated by role.
///
/// # Example
///
/// ```
/// use certis_rbac::{Capability, Role};
///
/// assert!(Capability::RevokeCertificates.is_granted_to(Role::Admin));
/// assert!(!Capability::ManagePlatform.is_granted_to(Role::Owner));
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Invite, remove, and change the role of users.
    ManageUsers,

    /// Revoke issued certificates.
    RevokeCertificates,

    /// Platform-wide administration and cross-tenant reads.
    ManagePlatform,

    /// Issue certificates for the caller's organization.
    CreateCertificates,

    /// Create, list, and revoke invitations of an organization.
    ManageInvitations,
}

impl Capability {
    /// Every capability.
    pub const ALL: [Capability; 5] = [
        Capability::ManageUsers,
        Capability::RevokeCertificates,
        Capability::ManagePlatform,
        Capability::CreateCertificates,
        Capability::ManageInvitations,
    ];

    /// Whether `role` holds this capability.
    ///
    /// Delegates to the [`Role`] predicates so the matrix lives in one place.
    pub fn is_granted_to(self, role: Role) -> bool {
        match self {
            Capability::ManageUsers => role.can_manage_users(),
            Capability::RevokeCertificates => role.can_revoke_certificates(),
            Capability::ManagePlatform => role.can_manage_platform(),
            Capability::CreateCertificates => role.can_create_certificates(),
            Capability::ManageInvitations => role.is_org_manager(),
        }
    }

    /// Stable identifier used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ManageUsers => "manage_users",
            Capability::RevokeCertificates => "revoke_certificates",
            Capability::ManagePlatform => "manage_platform",
            Capability::CreateCertificates => "create_certificates",
            Capability::ManageInvitations => "manage_invitations",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Role {
    /// Capabilities granted to this role.
    pub fn capabilities(&self) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|cap| cap.is_granted_to(*self))
            .collect()
    }
}
