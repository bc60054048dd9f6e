//! Password credentials, registration and login
//!
//! Password hashing is an opaque one-way capability behind
//! [`PasswordHasher`]; [`Argon2Hasher`] is the default implementation.

use crate::error::{AuthError, AuthResult};
use crate::token::TokenService;
use certis_org::{ChangeSet, MembershipStore, User};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Characters accepted as the mandatory special character of a password.
pub const PASSWORD_SPECIAL_CHARS: &str = "@$!%*?&";

/// Minimum password length.
pub const PASSWORD_MIN_LENGTH: usize = 8;

/// One-way password hashing.
pub trait PasswordHasher: Send + Sync {
    /// Hash `password` into an opaque, self-describing string.
    fn hash(&self, password: &str) -> AuthResult<String>;

    /// Check `password` against a hash produced by [`hash`](Self::hash).
    ///
    /// A wrong password is `Ok(false)`; an unreadable hash is an error.
    fn verify(&self, password: &str, hash: &str) -> AuthResult<bool>;
}

/// Argon2id with the crate's default parameters.
#[cfg(feature = "argon2")]
#[derive(Debug, Clone, Default)]
pub struct Argon2Hasher;

#[cfg(feature = "argon2")]
impl PasswordHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> AuthResult<String> {
        use argon2::password_hash::{PasswordHasher as _, SaltString};

        let salt = SaltString::generate(&mut rand::rngs::OsRng);
        argon2::Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::Internal(format!("Password hashing failed: {}", e)))
    }

    fn verify(&self, password: &str, hash: &str) -> AuthResult<bool> {
        use argon2::password_hash::{PasswordHash, PasswordVerifier};

        let parsed = PasswordHash::new(hash)
            .map_err(|e| AuthError::Internal(format!("Unreadable password hash: {}", e)))?;
        match argon2::Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AuthError::Internal(format!("Password verification failed: {}", e))),
        }
    }
}

/// Check password strength: at least 8 characters with an upper-case letter,
/// a lower-case letter, a digit and one of `@$!%*?&`.
pub fn validate_password_strength(password: &str) -> AuthResult<()> {
    if password.chars().count() < PASSWORD_MIN_LENGTH {
        return Err(AuthError::InvalidArgument(format!(
            "Password must be at least {} characters long",
            PASSWORD_MIN_LENGTH
        )));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(AuthError::InvalidArgument(
            "Password must contain at least one uppercase letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(AuthError::InvalidArgument(
            "Password must contain at least one lowercase letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AuthError::InvalidArgument(
            "Password must contain at least one number".to_string(),
        ));
    }
    if !password.chars().any(|c| PASSWORD_SPECIAL_CHARS.contains(c)) {
        return Err(AuthError::InvalidArgument(format!(
            "Password must contain at least one special character ({})",
            PASSWORD_SPECIAL_CHARS
        )));
    }
    Ok(())
}

/// Registration request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

/// A successful login.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    /// Bearer token
    pub token: String,

    pub user: User,
}

/// Registration and password login.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn MembershipStore>,
    hasher: Arc<dyn PasswordHasher>,
    tokens: TokenService,
}

impl AuthService {
    pub fn new(store: Arc<dyn MembershipStore>, hasher: Arc<dyn PasswordHasher>, tokens: TokenService) -> Self {
        Self { store, hasher, tokens }
    }

    /// Register an unaffiliated `USER`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidArgument`] for a malformed email or weak password
    /// - [`AuthError::Conflict`] if the email is already registered
    pub async fn register(&self, account: NewAccount) -> AuthResult<User> {
        let email = account.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(AuthError::InvalidArgument("A valid email is required".to_string()));
        }
        validate_password_strength(&account.password)?;

        if self.store.find_user_by_email(email).await?.is_some() {
            return Err(AuthError::Conflict(format!("Email {} is already registered", email)));
        }

        let hash = self.hasher.hash(&account.password)?;
        let mut user = User::new(email, hash, account.first_name.trim(), account.last_name.trim());
        self.store.commit(ChangeSet::new().insert(user.clone())).await?;
        user.version = 1;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Authenticate with email and password.
    ///
    /// Unknown emails and wrong passwords both yield
    /// [`AuthError::InvalidCredentials`].
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<Session> {
        let Some(mut user) = self.store.find_user_by_email(email).await? else {
            tracing::debug!("Login attempt for unknown email");
            return Err(AuthError::InvalidCredentials);
        };
        if !self.hasher.verify(password, &user.password_hash)? {
            tracing::warn!(user_id = %user.id, "Login with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        user.last_login = Some(Utc::now());
        match self.store.commit(ChangeSet::new().update(user.clone())).await {
            Ok(()) => user.version += 1,
            // Bookkeeping only; a concurrent writer already moved the record on.
            Err(e) if e.is_retryable() => {
                tracing::debug!(user_id = %user.id, error = %e, "Skipped last_login update");
            }
            Err(e) => return Err(e.into()),
        }

        let token = self.tokens.issue(&user)?;
        tracing::info!(user_id = %user.id, role = %user.role, "User logged in");
        Ok(Session { token, user })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::JwtService;
    use certis_org::MemoryStore;

    /// Reversible stand-in so tests do not pay for Argon2.
    struct PlainHasher;

    impl PasswordHasher for PlainHasher {
        fn hash(&self, password: &str) -> AuthResult<String> {
            Ok(format!("plain:{}", password))
        }

        fn verify(&self, password: &str, hash: &str) -> AuthResult<bool> {
            Ok(hash == format!("plain:{}", password))
        }
    }

    fn service() -> (AuthService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let jwt = Arc::new(JwtService::with_secret("test-secret-key-for-jwt-signing-minimum-32-chars").unwrap());
        let tokens = TokenService::new(jwt, store.clone());
        (AuthService::new(store.clone(), Arc::new(PlainHasher), tokens), store)
    }

    fn account(email: &str) -> NewAccount {
        NewAccount {
            email: email.to_string(),
            password: "Str0ng!Pass".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
        }
    }

    #[test]
    fn test_password_strength() {
        assert!(validate_password_strength("Str0ng!Pass").is_ok());
        assert!(validate_password_strength("Sh0rt!").is_err());
        assert!(validate_password_strength("nouppercase1!").is_err());
        assert!(validate_password_strength("NOLOWERCASE1!").is_err());
        assert!(validate_password_strength("NoNumbers!!").is_err());
        assert!(validate_password_strength("NoSpecial123").is_err());
    }

    #[cfg(feature = "argon2")]
    #[test]
    fn test_argon2_hash_and_verify() {
        let hasher = Argon2Hasher;
        let hash = hasher.hash("Str0ng!Pass").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("Str0ng!Pass", &hash).unwrap());
        assert!(!hasher.verify("Wr0ng!Pass", &hash).unwrap());
        assert!(hasher.verify("Str0ng!Pass", "not-a-hash").is_err());
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let (auth, store) = service();
        let user = auth.register(account("ada@example.com")).await.unwrap();
        assert_eq!(user.role, certis_rbac::Role::User);
        assert!(user.organization_id.is_none());

        let session = auth.login("ADA@example.com", "Str0ng!Pass").await.unwrap();
        assert_eq!(session.user.id, user.id);
        assert!(!session.token.is_empty());

        let stored = store.find_user(user.id).await.unwrap().unwrap();
        assert!(stored.last_login.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let (auth, _) = service();
        auth.register(account("ada@example.com")).await.unwrap();
        let result = auth.register(account("Ada@Example.com")).await;
        assert!(matches!(result, Err(AuthError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let (auth, _) = service();
        auth.register(account("ada@example.com")).await.unwrap();

        let unknown = auth.login("nobody@example.com", "Str0ng!Pass").await.unwrap_err();
        let wrong = auth.login("ada@example.com", "Wr0ng!Pass").await.unwrap_err();
        assert_eq!(unknown, AuthError::InvalidCredentials);
        assert_eq!(wrong, AuthError::InvalidCredentials);
    }
}
