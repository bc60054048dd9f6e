//! Organization records
//!
//! Organizations are the tenants of Certis. Each organization keeps an
//! explicit reference to its single owner instead of deriving it from a scan
//! over its members.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An organization (tenant).
///
/// # Examples
///
/// ```
/// use certis_org::Organization;
///
/// let org = Organization::new("LSIA Academy", "LSIA.ma", None);
/// assert_eq!(org.domain, "lsia.ma");
/// assert!(org.owner_id.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    /// Unique identifier for the organization
    pub id: Uuid,

    /// Human-readable name
    pub name: String,

    /// Normalized domain, unique across the platform
    pub domain: String,

    pub description: Option<String>,

    /// The single OWNER, kept in step with member roles on every
    /// ownership-affecting commit
    pub owner_id: Option<Uuid>,

    /// Number of users bound to this organization
    pub member_count: u32,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Optimistic concurrency version (0 = never persisted)
    #[serde(default)]
    pub version: u64,
}

impl Organization {
    /// Creates an organization with no members.
    ///
    /// The domain is normalized with [`normalize_domain`].
    pub fn new(name: impl Into<String>, domain: &str, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            domain: normalize_domain(domain),
            description,
            owner_id: None,
            member_count: 0,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Whether the organization currently has an owner.
    pub fn has_owner(&self) -> bool {
        self.owner_id.is_some()
    }

    pub fn member_joined(&mut self) {
        self.member_count = self.member_count.saturating_add(1);
        self.updated_at = Utc::now();
    }

    pub fn member_left(&mut self) {
        self.member_count = self.member_count.saturating_sub(1);
        self.updated_at = Utc::now();
    }
}

/// Normalize a domain for uniqueness checks: trimmed, lower-case, without a
/// trailing dot.
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}
