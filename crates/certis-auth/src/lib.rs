//! # Certis Authentication
//!
//! Stateless identity tokens, per-request tenant context and authorization
//! guards for Certis.
//!
//! ## Overview
//!
//! The certis-auth crate handles:
//! - **JWT**: HMAC-signed identity tokens ([`JwtService`]) and refresh
//!   against the current stored role ([`TokenService`])
//! - **Tenant context**: the request's organization, taken only from the
//!   verified token ([`TenantContext`], [`TenantScope`])
//! - **Guards**: explicit capability and tenant checks ([`guard`])
//! - **Credentials**: password hashing, registration and login
//! - **Errors**: the [`AuthError`] taxonomy shared by every Certis service
//!
//! ## Usage
//!
//! ```rust
//! use certis_auth::{guard, JwtService, TenantContext};
//! use certis_org::User;
//! use certis_rbac::{Capability, Role};
//!
//! let jwt = JwtService::with_secret("your-secret-key-at-least-32-bytes-long").unwrap();
//!
//! let mut user = User::new("admin@acme.io", "hash", "Ada", "Admin");
//! user.join_organization(uuid::Uuid::now_v7(), Role::Admin, chrono::Utc::now());
//! let token = jwt.issue(&user).unwrap();
//!
//! let ctx = TenantContext::from_authorization_header(&format!("Bearer {token}"), &jwt).unwrap();
//! assert_eq!(ctx.organization_id(), user.organization_id);
//! guard::require_capability(&ctx, Capability::ManageUsers).unwrap();
//! ```
//!
//! ## Token staleness
//!
//! Tokens are never revoked server-side. A role or organization change
//! becomes visible to a client when its token is refreshed, so the
//! staleness window is bounded by the configured TTL.
//!
//! ## Feature Flags
//!
//! - `argon2` (default): the [`Argon2Hasher`] password hasher

pub mod claims;
pub mod credentials;
pub mod env;
pub mod error;
pub mod guard;
pub mod jwt;
pub mod tenant;
pub mod token;

// Re-export main types for convenience
pub use claims::Claims;
#[cfg(feature = "argon2")]
pub use credentials::Argon2Hasher;
pub use credentials::{validate_password_strength, AuthService, NewAccount, PasswordHasher, Session};
pub use error::{AuthError, AuthResult};
pub use guard::{require_capability, require_org_manager, require_organization, require_same_organization, Principal};
pub use jwt::{JwtAlgorithm, JwtConfig, JwtService};
pub use tenant::{bearer_token, organization_id_for_request, TenantContext, TenantScope};
pub use token::TokenService;
