//! Per-request tenant context
//!
//! The tenant of a request is taken from the verified token's organization
//! claim and nowhere else. Client-supplied organization ids in paths or
//! bodies are never consulted. Queries against organization-owned resources
//! are parameterized by a [`TenantScope`]; only platform roles obtain the
//! unscoped [`TenantScope::Platform`], and an absent tenant never widens
//! visibility.

use crate::claims::Claims;
use crate::error::{AuthError, AuthResult};
use crate::jwt::JwtService;
use certis_org::TenantOwned;
use certis_rbac::Role;
use uuid::Uuid;

/// Extract the token from an `Authorization: Bearer <token>` header value.
///
/// The scheme is matched case-insensitively.
pub fn bearer_token(header: &str) -> AuthResult<&str> {
    let header = header.trim();
    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AuthError::InvalidToken("Missing bearer token".to_string()))?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidToken(format!("Unsupported scheme: {}", scheme)));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::InvalidToken("Missing bearer token".to_string()));
    }
    Ok(token)
}

/// The tenant of a verified token: its organization claim, or `None` for
/// unaffiliated users and system roles.
pub fn organization_id_for_request(claims: &Claims) -> Option<Uuid> {
    if claims.role.is_system_role() {
        None
    } else {
        claims.org_id
    }
}

/// Visibility granted to a request over organization-owned resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantScope {
    /// Only resources of this organization
    Organization(Uuid),

    /// Every organization (platform roles only)
    Platform,
}

impl TenantScope {
    /// The organization filter, `None` for platform scope.
    pub fn organization_id(&self) -> Option<Uuid> {
        match self {
            TenantScope::Organization(id) => Some(*id),
            TenantScope::Platform => None,
        }
    }

    /// Whether `resource` is visible in this scope.
    pub fn admits<T: TenantOwned + ?Sized>(&self, resource: &T) -> bool {
        match self {
            TenantScope::Organization(id) => resource.organization_id() == *id,
            TenantScope::Platform => true,
        }
    }

    /// Keep only the resources visible in this scope.
    pub fn filter<T, I>(&self, resources: I) -> Vec<T>
    where
        T: TenantOwned,
        I: IntoIterator<Item = T>,
    {
        resources.into_iter().filter(|r| self.admits(r)).collect()
    }
}

/// Identity and tenant of the current request, passed explicitly down every
/// call chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    claims: Claims,
}

impl TenantContext {
    /// Wrap already verified claims.
    pub fn from_claims(claims: Claims) -> Self {
        Self { claims }
    }

    /// Verify the bearer token in an `Authorization` header value.
    pub fn from_authorization_header(header: &str, jwt: &JwtService) -> AuthResult<Self> {
        let token = bearer_token(header)?;
        jwt.verify(token).map(Self::from_claims)
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn user_id(&self) -> Uuid {
        self.claims.user_id
    }

    pub fn role(&self) -> Role {
        self.claims.role
    }

    /// See [`organization_id_for_request`].
    pub fn organization_id(&self) -> Option<Uuid> {
        organization_id_for_request(&self.claims)
    }

    /// Scope for reads and lists of organization-owned resources.
    ///
    /// # Errors
    ///
    /// [`AuthError::PreconditionFailed`] when the caller has no organization
    /// and no platform role.
    pub fn scope(&self) -> AuthResult<TenantScope> {
        if let Some(org) = self.organization_id() {
            return Ok(TenantScope::Organization(org));
        }
        if self.claims.role.can_manage_platform() {
            return Ok(TenantScope::Platform);
        }
        Err(AuthError::PreconditionFailed(
            "Caller does not belong to an organization".to_string(),
        ))
    }
}
