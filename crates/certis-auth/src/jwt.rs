//! JWT token generation and validation
//!
//! This module signs and verifies Certis identity tokens with the
//! jsonwebtoken crate. Only HMAC algorithms are supported: the signing
//! secret is held by this service alone and never leaves the process.

use crate::claims::Claims;
use crate::env::read_env;
use crate::error::{AuthError, AuthResult};
use certis_org::User;
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};

/// Secrets shorter than this are accepted but logged as weak.
const RECOMMENDED_SECRET_LEN: usize = 32;

/// JWT configuration for token generation and validation.
#[derive(Clone)]
pub struct JwtConfig {
    /// Secret key for HMAC
    pub secret: Option<String>,

    /// Algorithm to use
    pub algorithm: JwtAlgorithm,

    /// Token issuer
    pub issuer: String,

    /// Token lifetime
    pub ttl: Duration,

    /// How long after expiry a token may still be refreshed
    pub refresh_grace: Duration,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .field("ttl", &self.ttl)
            .field("refresh_grace", &self.refresh_grace)
            .finish()
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: None,
            algorithm: JwtAlgorithm::HS256,
            issuer: "certis".to_string(),
            ttl: Duration::hours(24),
            refresh_grace: Duration::days(7),
        }
    }
}

impl JwtConfig {
    /// Load from `CERTIS_JWT_SECRET`, `CERTIS_JWT_TTL_SECS`,
    /// `CERTIS_JWT_REFRESH_GRACE_SECS` and `CERTIS_JWT_ISSUER`.
    ///
    /// Unset variables keep their defaults. A missing secret is only
    /// reported when the [`JwtService`] is constructed.
    pub fn from_env() -> AuthResult<Self> {
        let mut config = Self::default();
        if let Some(secret) = read_env::<String>("CERTIS_JWT_SECRET")? {
            config.secret = Some(secret);
        }
        if let Some(secs) = read_env::<i64>("CERTIS_JWT_TTL_SECS")? {
            config.ttl = Duration::seconds(secs);
        }
        if let Some(secs) = read_env::<i64>("CERTIS_JWT_REFRESH_GRACE_SECS")? {
            config.refresh_grace = Duration::seconds(secs);
        }
        if let Some(issuer) = read_env::<String>("CERTIS_JWT_ISSUER")? {
            config.issuer = issuer;
        }
        Ok(config)
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn with_algorithm(mut self, algorithm: JwtAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_refresh_grace(mut self, grace: Duration) -> Self {
        self.refresh_grace = grace;
        self
    }
}

/// Supported JWT algorithms.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum JwtAlgorithm {
    /// HMAC using SHA-256
    HS256,
    /// HMAC using SHA-384
    HS384,
    /// HMAC using SHA-512
    HS512,
}

impl From<JwtAlgorithm> for Algorithm {
    fn from(alg: JwtAlgorithm) -> Self {
        match alg {
            JwtAlgorithm::HS256 => Algorithm::HS256,
            JwtAlgorithm::HS384 => Algorithm::HS384,
            JwtAlgorithm::HS512 => Algorithm::HS512,
        }
    }
}

/// JWT service for token operations.
///
/// Stateless and read-only after construction; share it behind an `Arc`.
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("config", &self.config)
            .field("encoding_key", &"[REDACTED]")
            .field("decoding_key", &"[REDACTED]")
            .finish()
    }
}

impl JwtService {
    /// Create a new JWT service with the given configuration.
    ///
    /// # Errors
    ///
    /// [`AuthError::ConfigError`] if the secret is absent or empty, or the
    /// lifetimes are not positive.
    pub fn new(config: JwtConfig) -> AuthResult<Self> {
        let secret = config
            .secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::ConfigError("Secret required for HMAC".to_string()))?;

        if config.ttl <= Duration::zero() {
            return Err(AuthError::ConfigError("Token TTL must be positive".to_string()));
        }
        if config.refresh_grace < Duration::zero() {
            return Err(AuthError::ConfigError("Refresh grace cannot be negative".to_string()));
        }
        if secret.len() < RECOMMENDED_SECRET_LEN {
            tracing::warn!(
                len = secret.len(),
                recommended = RECOMMENDED_SECRET_LEN,
                "JWT signing secret is shorter than recommended"
            );
        }

        let encoding_key = EncodingKey::from_secret(secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(secret.as_bytes());

        Ok(Self {
            config,
            encoding_key,
            decoding_key,
        })
    }

    /// Create with a simple secret (HS256) and default lifetimes.
    pub fn with_secret(secret: impl Into<String>) -> AuthResult<Self> {
        Self::new(JwtConfig::default().with_secret(secret))
    }

    /// Issue a token for `user` carrying its current role and organization.
    pub fn issue(&self, user: &User) -> AuthResult<String> {
        let claims = Claims::for_user(user, self.config.issuer.clone(), self.config.ttl);
        self.encode_claims(&claims)
    }

    /// Sign arbitrary claims.
    pub fn encode_claims(&self, claims: &Claims) -> AuthResult<String> {
        let header = Header::new(self.config.algorithm.into());
        encode(&header, claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Token encoding failed: {}", e)))
    }

    /// Verify signature, issuer and expiry, and return the embedded claims.
    ///
    /// Pure computation, no store round-trip. Every failure, including
    /// expiry, is [`AuthError::InvalidToken`].
    pub fn verify(&self, token: &str) -> AuthResult<Claims> {
        let validation = self.validation(true);
        let data: TokenData<Claims> =
            decode(token, &self.decoding_key, &validation).map_err(map_jwt_error)?;
        Ok(data.claims)
    }

    /// Verify the signature and issuer, tolerating expiry up to the
    /// configured refresh grace.
    pub fn decode_for_refresh(&self, token: &str) -> AuthResult<Claims> {
        let validation = self.validation(false);
        let data: TokenData<Claims> =
            decode(token, &self.decoding_key, &validation).map_err(map_jwt_error)?;

        let deadline = data.claims.exp.saturating_add(self.config.refresh_grace.num_seconds());
        if Utc::now().timestamp() > deadline {
            return Err(AuthError::InvalidToken("Refresh grace period exceeded".to_string()));
        }
        Ok(data.claims)
    }

    /// Get the configuration.
    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    fn validation(&self, validate_exp: bool) -> Validation {
        let mut validation = Validation::new(self.config.algorithm.into());
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "sub"]);
        validation.validate_exp = validate_exp;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation
    }
}

fn map_jwt_error(e: jsonwebtoken::errors::Error) -> AuthError {
    match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::InvalidToken("Token has expired".to_string()),
        ErrorKind::InvalidToken => AuthError::InvalidToken("Malformed token".to_string()),
        ErrorKind::InvalidSignature => AuthError::InvalidToken("Invalid signature".to_string()),
        ErrorKind::InvalidIssuer => AuthError::InvalidToken("Invalid issuer".to_string()),
        ErrorKind::InvalidAlgorithm => AuthError::InvalidToken("Unexpected algorithm".to_string()),
        _ => AuthError::InvalidToken(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certis_rbac::Role;
    use uuid::Uuid;

    fn test_secret() -> String {
        "test-secret-key-for-jwt-signing-minimum-32-chars".to_string()
    }

    fn member() -> User {
        let mut user = User::new("member@acme.io", "hash", "Mem", "Ber");
        user.join_organization(Uuid::now_v7(), Role::Admin, Utc::now());
        user
    }

    fn flip_signature(token: &str) -> String {
        let (head, sig) = token.rsplit_once('.').unwrap();
        let mut sig: Vec<char> = sig.chars().collect();
        sig[0] = if sig[0] == 'A' { 'B' } else { 'A' };
        format!("{}.{}", head, sig.into_iter().collect::<String>())
    }

    #[test]
    fn test_missing_secret_is_config_error() {
        let result = JwtService::new(JwtConfig::default());
        assert!(matches!(result, Err(AuthError::ConfigError(_))));

        let result = JwtService::with_secret("");
        assert!(matches!(result, Err(AuthError::ConfigError(_))));
    }

    #[test]
    fn test_round_trip() {
        let service = JwtService::with_secret(test_secret()).unwrap();
        let user = member();

        let token = service.issue(&user).unwrap();
        let claims = service.verify(&token).unwrap();

        assert_eq!(claims.sub, user.email);
        assert_eq!(claims.user_id, user.id);
        assert_eq!(claims.role, user.role);
        assert_eq!(claims.org_id, user.organization_id);
        assert_eq!(claims.iss, "certis");
    }

    #[test]
    fn test_tampered_signature() {
        let service = JwtService::with_secret(test_secret()).unwrap();
        let token = service.issue(&member()).unwrap();

        let result = service.verify(&flip_signature(&token));
        assert!(matches!(result, Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_tampered_payload() {
        use base64::Engine;
        let service = JwtService::with_secret(test_secret()).unwrap();
        let user = member();
        let token = service.issue(&user).unwrap();

        let parts: Vec<&str> = token.split('.').collect();
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let mut payload: serde_json::Value =
            serde_json::from_slice(&engine.decode(parts[1]).unwrap()).unwrap();
        payload["role"] = serde_json::json!("SUDOER");
        let forged = format!(
            "{}.{}.{}",
            parts[0],
            engine.encode(serde_json::to_vec(&payload).unwrap()),
            parts[2]
        );

        assert!(matches!(service.verify(&forged), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_expired_token() {
        let service = JwtService::with_secret(test_secret()).unwrap();
        let mut claims = Claims::for_user(&member(), "certis", Duration::hours(1));
        claims.iat -= 7200;
        claims.exp -= 7200;
        let token = service.encode_claims(&claims).unwrap();

        let result = service.verify(&token);
        assert_eq!(result, Err(AuthError::InvalidToken("Token has expired".to_string())));
    }

    #[test]
    fn test_foreign_secret_and_issuer() {
        let service = JwtService::with_secret(test_secret()).unwrap();
        let other = JwtService::with_secret("another-secret-key-for-jwt-signing-32-chars").unwrap();
        let token = other.issue(&member()).unwrap();
        assert!(matches!(service.verify(&token), Err(AuthError::InvalidToken(_))));

        let foreign = JwtService::new(JwtConfig::default().with_secret(test_secret()).with_issuer("elsewhere"))
            .unwrap();
        let token = foreign.issue(&member()).unwrap();
        assert_eq!(
            service.verify(&token),
            Err(AuthError::InvalidToken("Invalid issuer".to_string()))
        );
    }

    #[test]
    fn test_refresh_grace() {
        let service = JwtService::new(
            JwtConfig::default()
                .with_secret(test_secret())
                .with_refresh_grace(Duration::days(1)),
        )
        .unwrap();

        let mut recent = Claims::for_user(&member(), "certis", Duration::hours(1));
        recent.exp = (Utc::now() - Duration::hours(2)).timestamp();
        let token = service.encode_claims(&recent).unwrap();
        assert!(service.verify(&token).is_err());
        assert_eq!(service.decode_for_refresh(&token).unwrap().user_id, recent.user_id);

        let mut stale = recent.clone();
        stale.exp = (Utc::now() - Duration::days(2)).timestamp();
        let token = service.encode_claims(&stale).unwrap();
        assert!(matches!(service.decode_for_refresh(&token), Err(AuthError::InvalidToken(_))));

        assert!(service.decode_for_refresh(&flip_signature(&token)).is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let service = JwtService::with_secret(test_secret()).unwrap();
        let debug = format!("{:?}", service);
        assert!(!debug.contains(&test_secret()));
        assert!(debug.contains("[REDACTED]"));
    }
}
