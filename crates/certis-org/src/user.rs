//! User records
//!
//! A user is the identity behind a token: credentials, a role, and at most one
//! organization. Users reference their organization by id only.

use certis_rbac::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered user.
///
/// # Invariants
///
/// - System roles (`SUDOER`, `STAFF`) never carry an `organization_id`.
/// - A user without an organization holds `Role::User` and has no
///   `joined_at`.
///
/// # Examples
///
/// ```
/// use certis_org::User;
/// use certis_rbac::Role;
///
/// let user = User::new("ada@example.com", "hash", "Ada", "Lovelace");
/// assert_eq!(user.role, Role::User);
/// assert!(!user.is_affiliated());
/// assert!(user.check_invariants().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID
    pub id: Uuid,

    /// Login email (unique, compared case-insensitively)
    pub email: String,

    /// Opaque password hash
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    pub first_name: String,

    pub last_name: String,

    /// Current role
    pub role: Role,

    /// Organization the user belongs to, if any
    pub organization_id: Option<Uuid>,

    /// When the user joined their current organization
    pub joined_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub last_login: Option<DateTime<Utc>>,

    /// Optimistic concurrency version (0 = never persisted)
    #[serde(default)]
    pub version: u64,
}

impl User {
    /// Creates an unaffiliated `USER`.
    pub fn new(
        email: impl Into<String>,
        password_hash: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            email: email.into(),
            password_hash: password_hash.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            role: Role::User,
            organization_id: None,
            joined_at: None,
            created_at: Utc::now(),
            last_login: None,
            version: 0,
        }
    }

    /// Set a system role. Clears any organization binding.
    pub fn with_system_role(mut self, role: Role) -> Self {
        debug_assert!(role.is_system_role());
        self.role = role;
        self.organization_id = None;
        self.joined_at = None;
        self
    }

    /// Whether the user belongs to an organization.
    pub fn is_affiliated(&self) -> bool {
        self.organization_id.is_some()
    }

    /// Whether the user belongs to `org_id`.
    pub fn belongs_to(&self, org_id: Uuid) -> bool {
        self.organization_id == Some(org_id)
    }

    /// Case-insensitive email comparison.
    pub fn email_matches(&self, email: &str) -> bool {
        self.email.trim().eq_ignore_ascii_case(email.trim())
    }

    /// Bind the user to an organization with an organization role.
    pub fn join_organization(&mut self, org_id: Uuid, role: Role, at: DateTime<Utc>) {
        debug_assert!(role.is_org_role());
        self.organization_id = Some(org_id);
        self.role = role;
        self.joined_at = Some(at);
    }

    /// Detach the user from their organization, leaving an unaffiliated `USER`.
    pub fn leave_organization(&mut self) {
        self.organization_id = None;
        self.role = Role::User;
        self.joined_at = None;
    }

    /// Full display name.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// Check the role/organization invariants.
    ///
    /// # Returns
    ///
    /// A description of the first violated invariant, if any.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.role.is_system_role() && self.organization_id.is_some() {
            return Err(format!("system role {} cannot belong to an organization", self.role));
        }
        if self.organization_id.is_none() {
            if self.role.is_org_role() && self.role != Role::User {
                return Err(format!("unaffiliated user cannot hold {}", self.role));
            }
            if self.joined_at.is_some() {
                return Err("unaffiliated user cannot have joined_at".to_string());
            }
        }
        Ok(())
    }
}
