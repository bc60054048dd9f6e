//! Token issuance, verification and refresh
//!
//! [`TokenService`] pairs the stateless [`JwtService`] with the store so that
//! refresh can re-read the user's current role and organization. Verification
//! stays a pure signature check.

use crate::claims::Claims;
use crate::error::{AuthError, AuthResult};
use crate::jwt::JwtService;
use certis_org::{MembershipStore, User};
use std::sync::Arc;

/// Issues, verifies and refreshes identity tokens.
#[derive(Clone)]
pub struct TokenService {
    jwt: Arc<JwtService>,
    store: Arc<dyn MembershipStore>,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService").field("jwt", &self.jwt).finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(jwt: Arc<JwtService>, store: Arc<dyn MembershipStore>) -> Self {
        Self { jwt, store }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    pub fn issue(&self, user: &User) -> AuthResult<String> {
        self.jwt.issue(user)
    }

    pub fn verify(&self, token: &str) -> AuthResult<Claims> {
        self.jwt.verify(token)
    }

    /// Exchange a valid, or recently expired, token for a fresh one.
    ///
    /// The new token carries the user's role and organization as stored now,
    /// not as recorded in the old token.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidToken`] if the signature is invalid, the refresh
    /// grace has passed, or the subject no longer exists.
    pub async fn refresh(&self, old_token: &str) -> AuthResult<String> {
        let old = self.jwt.decode_for_refresh(old_token)?;

        let user = self
            .store
            .find_user(old.user_id)
            .await?
            .filter(|u| u.email_matches(&old.sub))
            .ok_or_else(|| {
                tracing::warn!(user_id = %old.user_id, "Refresh for a subject that no longer exists");
                AuthError::InvalidToken("Subject no longer exists".to_string())
            })?;

        if user.role != old.role || user.organization_id != old.org_id {
            tracing::info!(
                user_id = %user.id,
                old_role = %old.role,
                new_role = %user.role,
                "Refreshed token picks up changed role or organization"
            );
        }

        self.jwt.issue(&user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certis_org::{ChangeSet, MemoryStore, Organization};
    use certis_rbac::Role;
    use chrono::{Duration, Utc};

    fn jwt() -> Arc<JwtService> {
        Arc::new(JwtService::with_secret("test-secret-key-for-jwt-signing-minimum-32-chars").unwrap())
    }

    #[tokio::test]
    async fn test_refresh_reads_current_role() {
        let store = Arc::new(MemoryStore::new());
        let service = TokenService::new(jwt(), store.clone());

        let user = User::new("ada@example.com", "hash", "Ada", "Lovelace");
        store.commit(ChangeSet::new().insert(user.clone())).await.unwrap();
        let old = service.issue(&user).unwrap();

        let mut org = Organization::new("Acme", "acme.io", None);
        let mut stored = store.find_user(user.id).await.unwrap().unwrap();
        stored.join_organization(org.id, Role::Owner, Utc::now());
        org.owner_id = Some(stored.id);
        org.member_joined();
        store
            .commit(ChangeSet::new().insert(org.clone()).update(stored))
            .await
            .unwrap();

        // The old token is stale until refreshed.
        assert_eq!(service.verify(&old).unwrap().role, Role::User);

        let fresh = service.refresh(&old).await.unwrap();
        let claims = service.verify(&fresh).unwrap();
        assert_eq!(claims.role, Role::Owner);
        assert_eq!(claims.org_id, Some(org.id));
    }

    #[tokio::test]
    async fn test_refresh_of_expired_token_within_grace() {
        let store = Arc::new(MemoryStore::new());
        let service = TokenService::new(jwt(), store.clone());
        let user = User::new("ada@example.com", "hash", "Ada", "Lovelace");
        store.commit(ChangeSet::new().insert(user.clone())).await.unwrap();

        let mut claims = Claims::for_user(&user, "certis", Duration::hours(1));
        claims.exp = (Utc::now() - Duration::minutes(5)).timestamp();
        let expired = service.jwt().encode_claims(&claims).unwrap();

        let fresh = service.refresh(&expired).await.unwrap();
        assert!(service.verify(&fresh).is_ok());
    }

    #[tokio::test]
    async fn test_refresh_for_unknown_subject() {
        let service = TokenService::new(jwt(), Arc::new(MemoryStore::new()));
        let ghost = User::new("ghost@example.com", "hash", "G", "H");
        let token = service.issue(&ghost).unwrap();

        let result = service.refresh(&token).await;
        assert_eq!(result, Err(AuthError::InvalidToken("Subject no longer exists".to_string())));
    }
}
