//! Authorization guards
//!
//! Explicit checks called at the top of every mutating operation. Each guard
//! returns a typed error instead of relying on interception; permission
//! decisions are delegated to [`certis_rbac`].

use crate::claims::Claims;
use crate::error::{AuthError, AuthResult};
use crate::tenant::{organization_id_for_request, TenantContext};
use certis_org::User;
use certis_rbac::{Capability, Role};
use uuid::Uuid;

/// An authenticated identity that guards can be applied to.
pub trait Principal {
    fn user_id(&self) -> Uuid;

    fn role(&self) -> Role;

    /// The organization the principal acts within, if any.
    fn organization_id(&self) -> Option<Uuid>;
}

impl Principal for Claims {
    fn user_id(&self) -> Uuid {
        self.user_id
    }

    fn role(&self) -> Role {
        self.role
    }

    fn organization_id(&self) -> Option<Uuid> {
        organization_id_for_request(self)
    }
}

impl Principal for TenantContext {
    fn user_id(&self) -> Uuid {
        TenantContext::user_id(self)
    }

    fn role(&self) -> Role {
        TenantContext::role(self)
    }

    fn organization_id(&self) -> Option<Uuid> {
        TenantContext::organization_id(self)
    }
}

impl Principal for User {
    fn user_id(&self) -> Uuid {
        self.id
    }

    fn role(&self) -> Role {
        self.role
    }

    fn organization_id(&self) -> Option<Uuid> {
        self.organization_id
    }
}

/// Require that the principal belongs to an organization.
///
/// # Returns
///
/// The principal's organization id.
///
/// # Errors
///
/// [`AuthError::PreconditionFailed`] if the principal has no organization.
pub fn require_organization<P: Principal + ?Sized>(principal: &P) -> AuthResult<Uuid> {
    principal.organization_id().ok_or_else(|| {
        AuthError::PreconditionFailed("Operation requires an organization".to_string())
    })
}

/// Require that the principal's role grants `capability`.
pub fn require_capability<P: Principal + ?Sized>(principal: &P, capability: Capability) -> AuthResult<()> {
    if capability.is_granted_to(principal.role()) {
        return Ok(());
    }
    tracing::warn!(
        user_id = %principal.user_id(),
        role = %principal.role(),
        capability = %capability,
        "Capability denied"
    );
    Err(AuthError::Forbidden(format!(
        "Role {} lacks capability {}",
        principal.role(),
        capability
    )))
}

/// Require that the principal may act on a resource owned by
/// `resource_org`: same organization, or a system role.
pub fn require_same_organization<P: Principal + ?Sized>(principal: &P, resource_org: Uuid) -> AuthResult<()> {
    if principal.role().is_system_role() || principal.organization_id() == Some(resource_org) {
        return Ok(());
    }
    tracing::warn!(
        user_id = %principal.user_id(),
        org_id = %resource_org,
        "Cross-tenant access denied"
    );
    Err(AuthError::Forbidden(
        "Resource belongs to another organization".to_string(),
    ))
}

/// Require that the principal is `OWNER` or `ADMIN` of exactly `org`.
pub fn require_org_manager<P: Principal + ?Sized>(principal: &P, org: Uuid) -> AuthResult<()> {
    if principal.role().is_org_manager() && principal.organization_id() == Some(org) {
        return Ok(());
    }
    Err(AuthError::Forbidden(
        "Requires OWNER or ADMIN of the organization".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn member(role: Role, org: Uuid) -> User {
        let mut user = User::new("m@example.com", "hash", "M", "E");
        user.join_organization(org, role, Utc::now());
        user
    }

    #[test]
    fn test_require_organization() {
        let org = Uuid::now_v7();
        assert_eq!(require_organization(&member(Role::User, org)).unwrap(), org);

        let loner = User::new("l@example.com", "hash", "L", "O");
        assert!(matches!(require_organization(&loner), Err(AuthError::PreconditionFailed(_))));

        let staff = User::new("s@example.com", "hash", "S", "T").with_system_role(Role::Staff);
        assert!(matches!(require_organization(&staff), Err(AuthError::PreconditionFailed(_))));
    }

    #[test]
    fn test_require_capability_follows_role_model() {
        let org = Uuid::now_v7();
        for role in [Role::Owner, Role::Admin, Role::User] {
            let user = member(role, org);
            for cap in Capability::ALL {
                assert_eq!(require_capability(&user, cap).is_ok(), cap.is_granted_to(role));
            }
        }
        let err = require_capability(&member(Role::User, org), Capability::RevokeCertificates).unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[test]
    fn test_require_same_organization() {
        let ours = Uuid::now_v7();
        let theirs = Uuid::now_v7();
        let admin = member(Role::Admin, ours);

        assert!(require_same_organization(&admin, ours).is_ok());
        assert!(matches!(require_same_organization(&admin, theirs), Err(AuthError::Forbidden(_))));

        let sudoer = User::new("root@example.com", "hash", "R", "O").with_system_role(Role::Sudoer);
        assert!(require_same_organization(&sudoer, theirs).is_ok());

        let loner = User::new("l@example.com", "hash", "L", "O");
        assert!(require_same_organization(&loner, ours).is_err());
    }

    #[test]
    fn test_require_org_manager() {
        let org = Uuid::now_v7();
        assert!(require_org_manager(&member(Role::Owner, org), org).is_ok());
        assert!(require_org_manager(&member(Role::Admin, org), org).is_ok());
        assert!(require_org_manager(&member(Role::User, org), org).is_err());
        assert!(require_org_manager(&member(Role::Admin, org), Uuid::now_v7()).is_err());
    }

    #[test]
    fn test_claims_are_principals() {
        let org = Uuid::now_v7();
        let claims = Claims::for_user(&member(Role::Admin, org), "certis", chrono::Duration::hours(1));
        assert_eq!(require_organization(&claims).unwrap(), org);
        assert!(require_capability(&claims, Capability::ManageUsers).is_ok());
    }
}
