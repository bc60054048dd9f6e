//! Identity token claims
//!
//! The decoded payload of a Certis bearer token. Claims are self-contained:
//! verifying a token never needs a store lookup, which also means a role or
//! organization change is only visible after the token is refreshed.

use certis_org::User;
use certis_rbac::Role;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT claims carried by a Certis identity token.
///
/// # Example
///
/// ```
/// use certis_auth::Claims;
/// use certis_org::User;
///
/// let user = User::new("ada@example.com", "hash", "Ada", "Lovelace");
/// let claims = Claims::for_user(&user, "certis", chrono::Duration::hours(1));
/// assert_eq!(claims.sub, "ada@example.com");
/// assert!(claims.org_id.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user email)
    pub sub: String,

    /// User ID
    pub user_id: Uuid,

    /// Role at issuance
    pub role: Role,

    /// Organization at issuance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<Uuid>,

    /// Issuer
    pub iss: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// JWT ID
    pub jti: String,
}

impl Claims {
    /// Claims for `user` valid for `ttl` from now.
    pub fn for_user(user: &User, issuer: impl Into<String>, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: user.email.clone(),
            user_id: user.id,
            role: user.role,
            org_id: user.organization_id,
            iss: issuer.into(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::now_v7().to_string(),
        }
    }

    pub fn email(&self) -> &str {
        &self.sub
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.iat, 0).single()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }

    /// Whether `now` is past the expiry.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() > self.exp
    }

    pub fn is_system(&self) -> bool {
        self.role.is_system_role()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_from_affiliated_user() {
        let mut user = User::new("ada@example.com", "hash", "Ada", "Lovelace");
        let org = Uuid::now_v7();
        user.join_organization(org, Role::Admin, Utc::now());

        let claims = Claims::for_user(&user, "certis", Duration::hours(24));
        assert_eq!(claims.user_id, user.id);
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.org_id, Some(org));
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
        assert!(!claims.is_expired_at(Utc::now()));
    }

    #[test]
    fn test_org_claim_omitted_when_unaffiliated() {
        let user = User::new("ada@example.com", "hash", "Ada", "Lovelace");
        let claims = Claims::for_user(&user, "certis", Duration::hours(1));
        let json = serde_json::to_value(&claims).unwrap();
        assert!(json.get("org_id").is_none());
        assert_eq!(json["role"], "USER");
    }
}
