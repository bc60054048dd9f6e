//! Organization-owned resources
//!
//! Courses and certificates always belong to exactly one organization. Every
//! read or mutation of them is scoped by the caller's tenant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A record owned by a single organization.
pub trait TenantOwned {
    /// The owning organization.
    fn organization_id(&self) -> Uuid;
}

/// A course offered by an organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub version: u64,
}

impl Course {
    pub fn new(organization_id: Uuid, title: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            organization_id,
            title: title.into(),
            slug: slug.into(),
            version: 0,
        }
    }
}

impl TenantOwned for Course {
    fn organization_id(&self) -> Uuid {
        self.organization_id
    }
}

/// A certificate issued by an organization member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: Uuid,

    /// Public serial number (unique)
    pub serial_number: String,

    /// Name of the certified person
    pub subject: String,

    pub course_id: Option<Uuid>,

    pub organization_id: Uuid,

    /// User who issued the certificate
    pub issuer_id: Uuid,

    pub active_from: DateTime<Utc>,

    pub active_to: Option<DateTime<Utc>>,

    pub revoked_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub version: u64,
}

impl Certificate {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Whether the certificate is valid at `at`.
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        !self.is_revoked() && at >= self.active_from && self.active_to.map_or(true, |to| at <= to)
    }
}

impl TenantOwned for Certificate {
    fn organization_id(&self) -> Uuid {
        self.organization_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn certificate() -> Certificate {
        let now = Utc::now();
        Certificate {
            id: Uuid::now_v7(),
            serial_number: "0123456789ABCDEF".to_string(),
            subject: "Grace Hopper".to_string(),
            course_id: None,
            organization_id: Uuid::now_v7(),
            issuer_id: Uuid::now_v7(),
            active_from: now - Duration::days(1),
            active_to: Some(now + Duration::days(30)),
            revoked_at: None,
            version: 0,
        }
    }

    #[test]
    fn test_certificate_activity_window() {
        let cert = certificate();
        let now = Utc::now();
        assert!(cert.is_active_at(now));
        assert!(!cert.is_active_at(now - Duration::days(2)));
        assert!(!cert.is_active_at(now + Duration::days(31)));
    }

    #[test]
    fn test_revoked_certificate_is_inactive() {
        let mut cert = certificate();
        cert.revoked_at = Some(Utc::now());
        assert!(cert.is_revoked());
        assert!(!cert.is_active_at(Utc::now()));
    }

    #[test]
    fn test_tenant_owned() {
        let course = Course::new(Uuid::now_v7(), "Rust 101", "rust-101");
        assert_eq!(TenantOwned::organization_id(&course), course.organization_id);
    }
}
