//! Persistence boundary
//!
//! The [`MembershipStore`] trait is the only way the services read and write
//! records. Reads are plain finders; every write goes through
//! [`MembershipStore::commit`], which applies a [`ChangeSet`] atomically with
//! optimistic version checks and the uniqueness rules the membership model
//! depends on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::invitation::{Invitation, InvitationStatus};
use crate::organization::Organization;
use crate::resources::{Certificate, Course};
use crate::user::User;

/// Persistence error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The record changed since it was read
    #[error("{entity} {id} was modified concurrently (expected version {expected}, found {found})")]
    VersionConflict {
        entity: &'static str,
        id: Uuid,
        expected: u64,
        found: u64,
    },

    /// A unique key is already taken
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// The commit would break a membership invariant
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// Update of a record that does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    /// Storage backend failure
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result type for persistence operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Whether re-reading and retrying the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}

/// A record with an identity and an optimistic concurrency version.
pub trait Versioned {
    /// Entity name used in errors and logs.
    const ENTITY: &'static str;

    fn id(&self) -> Uuid;

    fn version(&self) -> u64;

    fn set_version(&mut self, version: u64);
}

macro_rules! versioned {
    ($ty:ident, $name:literal) => {
        impl Versioned for $ty {
            const ENTITY: &'static str = $name;

            fn id(&self) -> Uuid {
                self.id
            }

            fn version(&self) -> u64 {
                self.version
            }

            fn set_version(&mut self, version: u64) {
                self.version = version;
            }
        }

        impl From<$ty> for Record {
            fn from(record: $ty) -> Self {
                Record::$ty(record)
            }
        }
    };
}

/// Any persisted record.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    User(User),
    Organization(Organization),
    Invitation(Invitation),
    Course(Course),
    Certificate(Certificate),
}

impl Record {
    /// Entity name of the wrapped record.
    pub fn entity(&self) -> &'static str {
        match self {
            Record::User(_) => User::ENTITY,
            Record::Organization(_) => Organization::ENTITY,
            Record::Invitation(_) => Invitation::ENTITY,
            Record::Course(_) => Course::ENTITY,
            Record::Certificate(_) => Certificate::ENTITY,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Record::User(r) => r.id,
            Record::Organization(r) => r.id,
            Record::Invitation(r) => r.id,
            Record::Course(r) => r.id,
            Record::Certificate(r) => r.id,
        }
    }
}

versioned!(User, "user");
versioned!(Organization, "organization");
versioned!(Invitation, "invitation");
versioned!(Course, "course");
versioned!(Certificate, "certificate");

/// A single write inside a [`ChangeSet`].
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Create a record; its id must be unused.
    Insert(Record),

    /// Replace a record; the stored version must equal the record's version.
    Update(Record),

    /// Remove a record; the stored version must equal the record's version.
    /// Only courses can be deleted.
    Delete(Record),
}

/// An ordered group of writes applied all-or-nothing.
///
/// # Examples
///
/// ```
/// use certis_org::{ChangeSet, Organization, User};
///
/// let org = Organization::new("Acme", "acme.io", None);
/// let founder = User::new("owner@acme.io", "hash", "Olga", "Owner");
///
/// let changes = ChangeSet::new().insert(org).update(founder);
/// assert_eq!(changes.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an insert.
    pub fn insert(mut self, record: impl Into<Record>) -> Self {
        self.changes.push(Change::Insert(record.into()));
        self
    }

    /// Add a versioned update.
    pub fn update(mut self, record: impl Into<Record>) -> Self {
        self.changes.push(Change::Update(record.into()));
        self
    }

    /// Add a versioned delete.
    pub fn delete(mut self, record: impl Into<Record>) -> Self {
        self.changes.push(Change::Delete(record.into()));
        self
    }

    pub fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter()
    }

    pub fn into_changes(self) -> Vec<Change> {
        self.changes
    }
}

/// Persistence collaborator for users, organizations, invitations, and the
/// organization-owned resources.
///
/// Implementations must apply [`commit`](Self::commit) atomically and enforce:
///
/// - optimistic versions: an update succeeds only when the stored version
///   equals the record's version, after which the stored version is
///   incremented; inserts store version 1;
/// - unique user email (case-insensitive), organization domain, invitation
///   token, and certificate serial;
/// - at most one `PENDING` invitation per (email, organization);
/// - at most one `OWNER` per organization, consistent with
///   `Organization::owner_id`;
/// - the role/organization invariants of [`User`];
/// - a course is never deleted while certificates reference it.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>>;

    /// Case-insensitive lookup.
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Users bound to `organization_id`.
    async fn list_members(&self, organization_id: Uuid) -> StoreResult<Vec<User>>;

    async fn find_organization(&self, id: Uuid) -> StoreResult<Option<Organization>>;

    /// Every organization, oldest first.
    async fn list_organizations(&self) -> StoreResult<Vec<Organization>>;

    /// Lookup by normalized domain.
    async fn find_organization_by_domain(&self, domain: &str) -> StoreResult<Option<Organization>>;

    async fn find_invitation_by_token(&self, token: &str) -> StoreResult<Option<Invitation>>;

    /// The `PENDING` invitation for (email, organization), if any.
    async fn find_pending_invitation(
        &self,
        email: &str,
        organization_id: Uuid,
    ) -> StoreResult<Option<Invitation>>;

    /// Invitations of an organization, optionally filtered by status.
    async fn list_invitations(
        &self,
        organization_id: Uuid,
        status: Option<InvitationStatus>,
    ) -> StoreResult<Vec<Invitation>>;

    /// `PENDING` invitations whose `expires_at` is before `now`.
    async fn list_expired_pending(&self, now: DateTime<Utc>) -> StoreResult<Vec<Invitation>>;

    async fn find_course(&self, id: Uuid) -> StoreResult<Option<Course>>;

    /// Courses of one organization, or of every organization when
    /// `organization_id` is `None`.
    async fn list_courses(&self, organization_id: Option<Uuid>) -> StoreResult<Vec<Course>>;

    async fn find_certificate_by_serial(&self, serial: &str) -> StoreResult<Option<Certificate>>;

    /// Certificates of one organization, or of every organization when
    /// `organization_id` is `None`.
    async fn list_certificates(&self, organization_id: Option<Uuid>) -> StoreResult<Vec<Certificate>>;

    /// Apply `changes` atomically.
    async fn commit(&self, changes: ChangeSet) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use certis_rbac::Role;

    #[test]
    fn test_change_set_builder() {
        let user = User::new("a@example.com", "h", "A", "B");
        let org = Organization::new("Acme", "acme.io", None);
        let course = Course::new(org.id, "Rust 101", "rust-101");
        let changes = ChangeSet::new()
            .insert(org.clone())
            .update(user.clone())
            .delete(course.clone());

        let collected: Vec<_> = changes.iter().cloned().collect();
        assert_eq!(
            collected,
            vec![
                Change::Insert(Record::Organization(org)),
                Change::Update(Record::User(user)),
                Change::Delete(Record::Course(course)),
            ]
        );
    }

    #[test]
    fn test_record_identity() {
        let inv = Invitation::new(
            "x@example.com",
            Role::User,
            Uuid::now_v7(),
            Uuid::now_v7(),
            chrono::Duration::days(1),
        );
        let record = Record::from(inv.clone());
        assert_eq!(record.entity(), "invitation");
        assert_eq!(record.id(), inv.id);
    }

    #[test]
    fn test_only_version_conflicts_are_retryable() {
        let conflict = StoreError::VersionConflict {
            entity: "user",
            id: Uuid::now_v7(),
            expected: 1,
            found: 2,
        };
        assert!(conflict.is_retryable());
        assert!(!StoreError::UniqueViolation("email".to_string()).is_retryable());
    }
}
