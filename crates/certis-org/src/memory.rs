//! In-memory store
//!
//! Reference implementation of [`MembershipStore`] for single-process
//! deployments and tests. A commit stages the changes against a copy of the
//! tables, validates the touched records, and swaps the copy in under the
//! write lock, so readers never observe a partially applied change set.

use async_trait::async_trait;
use certis_rbac::Role;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::invitation::{Invitation, InvitationStatus};
use crate::organization::{normalize_domain, Organization};
use crate::resources::{Certificate, Course};
use crate::store::{Change, ChangeSet, MembershipStore, Record, StoreError, StoreResult, Versioned};
use crate::user::User;

#[derive(Debug, Clone, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    organizations: HashMap<Uuid, Organization>,
    invitations: HashMap<Uuid, Invitation>,
    courses: HashMap<Uuid, Course>,
    certificates: HashMap<Uuid, Certificate>,
}

/// Ids written by one commit, plus the organizations whose ownership may
/// have changed.
#[derive(Debug, Default)]
struct Touched {
    users: HashSet<Uuid>,
    organizations: HashSet<Uuid>,
    invitations: HashSet<Uuid>,
    certificates: HashSet<Uuid>,
    deleted_courses: HashSet<Uuid>,
}

/// In-memory [`MembershipStore`].
///
/// Cloning shares the underlying tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn stage(tables: &mut Tables, touched: &mut Touched, change: Change) -> StoreResult<()> {
        let (record, is_insert) = match change {
            Change::Insert(record) => (record, true),
            Change::Update(record) => (record, false),
            Change::Delete(Record::Course(course)) => {
                touched.deleted_courses.insert(course.id);
                return remove(&mut tables.courses, &course);
            }
            Change::Delete(record) => {
                return Err(StoreError::Invariant(format!(
                    "{} records cannot be deleted",
                    record.entity()
                )));
            }
        };

        match record {
            Record::User(user) => {
                if let Some(previous) = tables.users.get(&user.id).and_then(|u| u.organization_id) {
                    touched.organizations.insert(previous);
                }
                if let Some(org) = user.organization_id {
                    touched.organizations.insert(org);
                }
                touched.users.insert(user.id);
                write(&mut tables.users, user, is_insert)
            }
            Record::Organization(org) => {
                touched.organizations.insert(org.id);
                write(&mut tables.organizations, org, is_insert)
            }
            Record::Invitation(invitation) => {
                touched.invitations.insert(invitation.id);
                write(&mut tables.invitations, invitation, is_insert)
            }
            Record::Course(course) => write(&mut tables.courses, course, is_insert),
            Record::Certificate(certificate) => {
                touched.certificates.insert(certificate.id);
                write(&mut tables.certificates, certificate, is_insert)
            }
        }
    }

    fn validate(tables: &Tables, touched: &Touched) -> StoreResult<()> {
        for id in &touched.users {
            let user = &tables.users[id];
            user.check_invariants().map_err(StoreError::Invariant)?;
            if let Some(org) = user.organization_id {
                if !tables.organizations.contains_key(&org) {
                    return Err(StoreError::Invariant(format!(
                        "user {} references unknown organization {}",
                        user.id, org
                    )));
                }
            }
            let duplicate = tables
                .users
                .values()
                .any(|other| other.id != user.id && other.email_matches(&user.email));
            if duplicate {
                return Err(StoreError::UniqueViolation(format!(
                    "email {} is already registered",
                    user.email
                )));
            }
        }

        for id in &touched.organizations {
            let Some(org) = tables.organizations.get(id) else {
                continue;
            };
            let domain = normalize_domain(&org.domain);
            let duplicate = tables
                .organizations
                .values()
                .any(|other| other.id != org.id && normalize_domain(&other.domain) == domain);
            if duplicate {
                return Err(StoreError::UniqueViolation(format!(
                    "domain {} is already registered",
                    org.domain
                )));
            }

            let owners: Vec<Uuid> = tables
                .users
                .values()
                .filter(|u| u.belongs_to(org.id) && u.role == Role::Owner)
                .map(|u| u.id)
                .collect();
            if owners.len() > 1 {
                return Err(StoreError::UniqueViolation(format!(
                    "organization {} would have {} owners",
                    org.id,
                    owners.len()
                )));
            }
            if owners.first().copied() != org.owner_id {
                return Err(StoreError::Invariant(format!(
                    "organization {} owner reference {:?} does not match members {:?}",
                    org.id, org.owner_id, owners
                )));
            }
        }

        for id in &touched.invitations {
            let invitation = &tables.invitations[id];
            let token_taken = tables
                .invitations
                .values()
                .any(|other| other.id != invitation.id && other.token == invitation.token);
            if token_taken {
                return Err(StoreError::UniqueViolation("invitation token".to_string()));
            }
            if invitation.is_pending() {
                let key = invitation.pending_key();
                let duplicate = tables
                    .invitations
                    .values()
                    .any(|other| other.id != invitation.id && other.is_pending() && other.pending_key() == key);
                if duplicate {
                    return Err(StoreError::UniqueViolation(format!(
                        "{} already has a pending invitation to organization {}",
                        invitation.email, invitation.organization_id
                    )));
                }
            }
        }

        for id in &touched.deleted_courses {
            if tables.certificates.values().any(|c| c.course_id == Some(*id)) {
                return Err(StoreError::Invariant(format!(
                    "course {} is still referenced by certificates",
                    id
                )));
            }
        }

        for id in &touched.certificates {
            let certificate = &tables.certificates[id];
            let duplicate = tables.certificates.values().any(|other| {
                other.id != certificate.id && other.serial_number == certificate.serial_number
            });
            if duplicate {
                return Err(StoreError::UniqueViolation(format!(
                    "certificate serial {}",
                    certificate.serial_number
                )));
            }
        }

        Ok(())
    }
}

fn write<T: Versioned>(table: &mut HashMap<Uuid, T>, mut record: T, is_insert: bool) -> StoreResult<()> {
    let id = record.id();
    if is_insert {
        if table.contains_key(&id) {
            return Err(StoreError::UniqueViolation(format!("{} {} already exists", T::ENTITY, id)));
        }
        record.set_version(1);
    } else {
        let stored = table.get(&id).ok_or(StoreError::NotFound {
            entity: T::ENTITY,
            id,
        })?;
        if stored.version() != record.version() {
            return Err(StoreError::VersionConflict {
                entity: T::ENTITY,
                id,
                expected: record.version(),
                found: stored.version(),
            });
        }
        record.set_version(stored.version() + 1);
    }
    table.insert(id, record);
    Ok(())
}

fn remove<T: Versioned>(table: &mut HashMap<Uuid, T>, record: &T) -> StoreResult<()> {
    let id = record.id();
    let stored = table.get(&id).ok_or(StoreError::NotFound {
        entity: T::ENTITY,
        id,
    })?;
    if stored.version() != record.version() {
        return Err(StoreError::VersionConflict {
            entity: T::ENTITY,
            id,
            expected: record.version(),
            found: stored.version(),
        });
    }
    table.remove(&id);
    Ok(())
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn find_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email_matches(email)).cloned())
    }

    async fn list_members(&self, organization_id: Uuid) -> StoreResult<Vec<User>> {
        let tables = self.tables.read().await;
        let mut members: Vec<User> = tables
            .users
            .values()
            .filter(|u| u.belongs_to(organization_id))
            .cloned()
            .collect();
        members.sort_by_key(|u| (u.joined_at, u.id));
        Ok(members)
    }

    async fn find_organization(&self, id: Uuid) -> StoreResult<Option<Organization>> {
        Ok(self.tables.read().await.organizations.get(&id).cloned())
    }

    async fn list_organizations(&self) -> StoreResult<Vec<Organization>> {
        let tables = self.tables.read().await;
        let mut organizations: Vec<Organization> = tables.organizations.values().cloned().collect();
        organizations.sort_by_key(|o| (o.created_at, o.id));
        Ok(organizations)
    }

    async fn find_organization_by_domain(&self, domain: &str) -> StoreResult<Option<Organization>> {
        let domain = normalize_domain(domain);
        let tables = self.tables.read().await;
        Ok(tables
            .organizations
            .values()
            .find(|o| normalize_domain(&o.domain) == domain)
            .cloned())
    }

    async fn find_invitation_by_token(&self, token: &str) -> StoreResult<Option<Invitation>> {
        let tables = self.tables.read().await;
        Ok(tables.invitations.values().find(|i| i.token == token).cloned())
    }

    async fn find_pending_invitation(
        &self,
        email: &str,
        organization_id: Uuid,
    ) -> StoreResult<Option<Invitation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .invitations
            .values()
            .find(|i| {
                i.is_pending()
                    && i.organization_id == organization_id
                    && i.email.eq_ignore_ascii_case(email.trim())
            })
            .cloned())
    }

    async fn list_invitations(
        &self,
        organization_id: Uuid,
        status: Option<InvitationStatus>,
    ) -> StoreResult<Vec<Invitation>> {
        let tables = self.tables.read().await;
        let mut invitations: Vec<Invitation> = tables
            .invitations
            .values()
            .filter(|i| i.organization_id == organization_id)
            .filter(|i| status.map_or(true, |s| i.status == s))
            .cloned()
            .collect();
        invitations.sort_by_key(|i| i.created_at);
        Ok(invitations)
    }

    async fn list_expired_pending(&self, now: DateTime<Utc>) -> StoreResult<Vec<Invitation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .invitations
            .values()
            .filter(|i| i.is_pending() && i.expires_at < now)
            .cloned()
            .collect())
    }

    async fn find_course(&self, id: Uuid) -> StoreResult<Option<Course>> {
        Ok(self.tables.read().await.courses.get(&id).cloned())
    }

    async fn list_courses(&self, organization_id: Option<Uuid>) -> StoreResult<Vec<Course>> {
        let tables = self.tables.read().await;
        let mut courses: Vec<Course> = tables
            .courses
            .values()
            .filter(|c| organization_id.map_or(true, |org| c.organization_id == org))
            .cloned()
            .collect();
        courses.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(courses)
    }

    async fn find_certificate_by_serial(&self, serial: &str) -> StoreResult<Option<Certificate>> {
        let tables = self.tables.read().await;
        Ok(tables
            .certificates
            .values()
            .find(|c| c.serial_number == serial)
            .cloned())
    }

    async fn list_certificates(&self, organization_id: Option<Uuid>) -> StoreResult<Vec<Certificate>> {
        let tables = self.tables.read().await;
        let mut certificates: Vec<Certificate> = tables
            .certificates
            .values()
            .filter(|c| organization_id.map_or(true, |org| c.organization_id == org))
            .cloned()
            .collect();
        certificates.sort_by_key(|c| c.active_from);
        Ok(certificates)
    }

    async fn commit(&self, changes: ChangeSet) -> StoreResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut tables = self.tables.write().await;
        let mut staged = tables.clone();
        let mut touched = Touched::default();

        for change in changes.into_changes() {
            Self::stage(&mut staged, &mut touched, change)?;
        }
        Self::validate(&staged, &touched)?;

        *tables = staged;
        tracing::trace!(
            users = touched.users.len(),
            organizations = touched.organizations.len(),
            invitations = touched.invitations.len(),
            "Committed change set"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn seeded() -> (MemoryStore, Organization, User) {
        let store = MemoryStore::new();
        let mut org = Organization::new("Acme", "acme.io", None);
        let mut owner = User::new("owner@acme.io", "h", "Olga", "Owner");
        owner.join_organization(org.id, Role::Owner, Utc::now());
        org.owner_id = Some(owner.id);
        org.member_joined();
        store
            .commit(ChangeSet::new().insert(org.clone()).insert(owner.clone()))
            .await
            .unwrap();
        let org = store.find_organization(org.id).await.unwrap().unwrap();
        let owner = store.find_user(owner.id).await.unwrap().unwrap();
        (store, org, owner)
    }

    #[tokio::test]
    async fn test_insert_sets_version_one() {
        let (_, org, owner) = seeded().await;
        assert_eq!(org.version, 1);
        assert_eq!(owner.version, 1);
    }

    #[tokio::test]
    async fn test_stale_update_is_rejected() {
        let (store, _, owner) = seeded().await;

        let mut first = owner.clone();
        first.first_name = "First".to_string();
        store.commit(ChangeSet::new().update(first)).await.unwrap();

        let mut stale = owner.clone();
        stale.first_name = "Stale".to_string();
        let err = store.commit(ChangeSet::new().update(stale)).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { expected: 1, found: 2, .. }));

        let stored = store.find_user(owner.id).await.unwrap().unwrap();
        assert_eq!(stored.first_name, "First");
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_change_set_is_all_or_nothing() {
        let (store, org, owner) = seeded().await;

        let newcomer = User::new("new@acme.io", "h", "New", "Comer");
        let mut stale_org = org.clone();
        stale_org.version = 99;

        let err = store
            .commit(ChangeSet::new().insert(newcomer.clone()).update(stale_org))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));
        assert!(store.find_user(newcomer.id).await.unwrap().is_none());
        assert!(store.find_user(owner.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_email_is_unique_case_insensitively() {
        let (store, _, _) = seeded().await;
        let dup = User::new("OWNER@acme.io", "h", "Dup", "Licate");
        let err = store.commit(ChangeSet::new().insert(dup)).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn test_domain_is_unique() {
        let (store, _, _) = seeded().await;
        let other = Organization::new("Acme Clone", "ACME.io", None);
        let err = store.commit(ChangeSet::new().insert(other)).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn test_second_owner_is_rejected() {
        let (store, org, _) = seeded().await;
        let mut usurper = User::new("usurper@acme.io", "h", "Us", "Urper");
        usurper.join_organization(org.id, Role::Owner, Utc::now());

        let err = store.commit(ChangeSet::new().insert(usurper)).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn test_owner_reference_must_match() {
        let (store, _, owner) = seeded().await;
        let mut demoted = owner.clone();
        demoted.role = Role::Admin;

        let err = store.commit(ChangeSet::new().update(demoted)).await.unwrap_err();
        assert!(matches!(err, StoreError::Invariant(_)));
    }

    #[tokio::test]
    async fn test_one_pending_invitation_per_email_and_org() {
        let (store, org, owner) = seeded().await;
        let first = Invitation::new("x@example.com", Role::User, org.id, owner.id, Duration::days(7));
        let second = Invitation::new("X@Example.com", Role::Admin, org.id, owner.id, Duration::days(7));

        store.commit(ChangeSet::new().insert(first.clone())).await.unwrap();
        let err = store.commit(ChangeSet::new().insert(second.clone())).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(_)));

        // Once the first is terminal a new pending invitation is allowed.
        let mut revoked = store.find_invitation_by_token(&first.token).await.unwrap().unwrap();
        assert!(revoked.transition(InvitationStatus::Revoked, Utc::now()));
        store.commit(ChangeSet::new().update(revoked)).await.unwrap();
        store.commit(ChangeSet::new().insert(second)).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_pending_listing() {
        let (store, org, owner) = seeded().await;
        let mut old = Invitation::new("old@example.com", Role::User, org.id, owner.id, Duration::days(7));
        old.expires_at = Utc::now() - Duration::hours(1);
        let fresh = Invitation::new("fresh@example.com", Role::User, org.id, owner.id, Duration::days(7));
        store
            .commit(ChangeSet::new().insert(old.clone()).insert(fresh))
            .await
            .unwrap();

        let expired = store.list_expired_pending(Utc::now()).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, old.id);
    }

    #[tokio::test]
    async fn test_update_of_missing_record() {
        let store = MemoryStore::new();
        let ghost = User::new("ghost@example.com", "h", "G", "H");
        let err = store.commit(ChangeSet::new().update(ghost)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "user", .. }));
    }

    #[tokio::test]
    async fn test_referenced_course_cannot_be_deleted() {
        let (store, org, owner) = seeded().await;
        let course = Course::new(org.id, "Rust 101", "rust-101");
        let certificate = Certificate {
            id: Uuid::now_v7(),
            serial_number: "00000000000000AA".to_string(),
            subject: "Ada".to_string(),
            course_id: Some(course.id),
            organization_id: org.id,
            issuer_id: owner.id,
            active_from: Utc::now(),
            active_to: None,
            revoked_at: None,
            version: 0,
        };
        store
            .commit(ChangeSet::new().insert(course.clone()).insert(certificate))
            .await
            .unwrap();
        let course = store.find_course(course.id).await.unwrap().unwrap();

        let err = store.commit(ChangeSet::new().delete(course.clone())).await.unwrap_err();
        assert!(matches!(err, StoreError::Invariant(_)));
        assert!(store.find_course(course.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_course_delete_is_versioned() {
        let (store, org, _) = seeded().await;
        let course = Course::new(org.id, "Rust 101", "rust-101");
        store.commit(ChangeSet::new().insert(course.clone())).await.unwrap();

        let err = store.commit(ChangeSet::new().delete(course.clone())).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { expected: 0, found: 1, .. }));

        let stored = store.find_course(course.id).await.unwrap().unwrap();
        store.commit(ChangeSet::new().delete(stored)).await.unwrap();
        assert!(store.list_courses(Some(org.id)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_only_courses_can_be_deleted() {
        let (store, _, owner) = seeded().await;
        let err = store.commit(ChangeSet::new().delete(owner)).await.unwrap_err();
        assert!(matches!(err, StoreError::Invariant(_)));
    }

    #[tokio::test]
    async fn test_list_organizations() {
        let (store, org, _) = seeded().await;
        let other = Organization::new("Globex", "globex.io", None);
        store.commit(ChangeSet::new().insert(other.clone())).await.unwrap();

        let ids: Vec<Uuid> = store.list_organizations().await.unwrap().iter().map(|o| o.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&org.id) && ids.contains(&other.id));
    }
}
