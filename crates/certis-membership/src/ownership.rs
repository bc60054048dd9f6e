//! Role changes, member removal and ownership transfer
//!
//! Every organization has at most one `OWNER`, referenced by
//! `Organization::owner_id`. Operations here keep the reference and member
//! roles in step by committing them in one change set, so no reader ever
//! sees zero or two owners while ownership moves.

use crate::retry::{retry_on_conflict, RetryPolicy};
use certis_auth::{AuthError, AuthResult};
use certis_org::{ChangeSet, MembershipStore, Organization, User};
use certis_rbac::Role;
use std::sync::Arc;
use uuid::Uuid;

/// Pick the member that should own an organization left without owner.
///
/// The earliest-joined `ADMIN`, else the earliest-joined `USER`, else
/// nobody. Ties are broken by user id so the choice is deterministic.
/// Existing owners and non-members are never candidates.
pub fn resolve_fallback_owner(members: &[User]) -> Option<Uuid> {
    let senior = |role: Role| {
        members
            .iter()
            .filter(|m| m.role == role && m.is_affiliated())
            .min_by_key(|m| (m.joined_at, m.id))
            .map(|m| m.id)
    };
    senior(Role::Admin).or_else(|| senior(Role::User))
}

/// Changes roles and moves ownership.
#[derive(Clone)]
pub struct OwnershipService {
    store: Arc<dyn MembershipStore>,
    retry: RetryPolicy,
}

impl OwnershipService {
    pub fn new(store: Arc<dyn MembershipStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Give `target_id` the role `new_role` on behalf of `requester_id`.
    ///
    /// - System roles may change anyone, except that `STAFF` may neither
    ///   alter a `SUDOER` nor grant `SUDOER`.
    /// - Organization roles act only inside their own organization and never
    ///   grant system roles. `OWNER` may assign any organization role;
    ///   `ADMIN` may only move a `USER` between `USER` and `ADMIN`.
    /// - Granting `OWNER` swaps ownership atomically: the previous owner
    ///   becomes `ADMIN`.
    /// - Granting a system role detaches the target from its organization.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Forbidden`] for any combination not allowed above
    /// - [`AuthError::PreconditionFailed`] when demoting the current owner
    ///   (transfer ownership first) or giving an unaffiliated user an
    ///   organization role other than `USER`
    pub async fn change_role(&self, target_id: Uuid, new_role: Role, requester_id: Uuid) -> AuthResult<User> {
        retry_on_conflict(&self.retry, || self.try_change_role(target_id, new_role, requester_id)).await
    }

    async fn try_change_role(&self, target_id: Uuid, new_role: Role, requester_id: Uuid) -> AuthResult<User> {
        let requester = self.user(requester_id).await?;
        let mut target = self.user(target_id).await?;

        authorize_role_change(&requester, &target, new_role)?;
        if target.role == new_role {
            return Ok(target);
        }
        if target.role == Role::Owner {
            return Err(AuthError::PreconditionFailed(
                "Transfer ownership before changing the owner's role".to_string(),
            ));
        }

        let previous = target.role;
        let mut changes = ChangeSet::new();

        if new_role.is_system_role() {
            if let Some(org_id) = target.organization_id {
                let mut org = self.organization(org_id).await?;
                org.member_left();
                changes = changes.update(org);
            }
            target.leave_organization();
            target.role = new_role;
        } else if let Some(org_id) = target.organization_id {
            if new_role == Role::Owner {
                let mut org = self.organization(org_id).await?;
                if let Some(owner_id) = org.owner_id {
                    let mut owner = self.user(owner_id).await?;
                    owner.role = Role::Admin;
                    changes = changes.update(owner);
                }
                org.owner_id = Some(target.id);
                changes = changes.update(org);
            }
            target.role = new_role;
        } else {
            if new_role != Role::User {
                return Err(AuthError::PreconditionFailed(format!(
                    "An unaffiliated user can only hold USER, not {}",
                    new_role
                )));
            }
            target.role = Role::User;
        }

        self.store.commit(changes.update(target.clone())).await?;
        target.version += 1;

        tracing::info!(
            user_id = %target.id,
            requester_id = %requester.id,
            from = %previous,
            to = %new_role,
            "Role changed"
        );
        Ok(target)
    }

    /// Remove `target_id` from its organization, leaving an unaffiliated
    /// `USER`.
    ///
    /// Members may remove themselves. Otherwise `OWNER` may remove anyone in
    /// the organization, `ADMIN` only `USER` members, and system roles
    /// anyone.
    ///
    /// # Errors
    ///
    /// - [`AuthError::PreconditionFailed`] if the target is the `OWNER`
    ///   (ownership is never given up implicitly) or belongs to no
    ///   organization
    /// - [`AuthError::Forbidden`] if the requester lacks authority
    pub async fn remove_from_organization(&self, target_id: Uuid, requester_id: Uuid) -> AuthResult<User> {
        retry_on_conflict(&self.retry, || self.try_remove(target_id, requester_id)).await
    }

    async fn try_remove(&self, target_id: Uuid, requester_id: Uuid) -> AuthResult<User> {
        let mut target = self.user(target_id).await?;
        if target.role == Role::Owner {
            return Err(AuthError::PreconditionFailed(
                "The owner cannot be removed; transfer ownership first".to_string(),
            ));
        }
        let org_id = target.organization_id.ok_or_else(|| {
            AuthError::PreconditionFailed("User does not belong to an organization".to_string())
        })?;

        let requester = self.user(requester_id).await?;
        let allowed = requester.id == target.id
            || requester.role.is_system_role()
            || (requester.belongs_to(org_id)
                && match requester.role {
                    Role::Owner => true,
                    Role::Admin => target.role == Role::User,
                    _ => false,
                });
        if !allowed {
            tracing::warn!(user_id = %target.id, requester_id = %requester.id, "Member removal denied");
            return Err(AuthError::Forbidden("Not allowed to remove this member".to_string()));
        }

        let mut org = self.organization(org_id).await?;
        org.member_left();
        target.leave_organization();
        self.store
            .commit(ChangeSet::new().update(target.clone()).update(org))
            .await?;
        target.version += 1;

        tracing::info!(user_id = %target.id, requester_id = %requester.id, org_id = %org_id, "Member removed");
        Ok(target)
    }

    /// Hand ownership from `current_owner_id` to `new_owner_id`.
    ///
    /// The current owner becomes `ADMIN` and the new owner `OWNER` in one
    /// commit together with the organization's owner reference.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Forbidden`] if `current_owner_id` is not an `OWNER`
    /// - [`AuthError::PreconditionFailed`] if the new owner is not a member
    ///   of the same organization, or is the current owner
    pub async fn transfer_ownership(&self, current_owner_id: Uuid, new_owner_id: Uuid) -> AuthResult<Organization> {
        retry_on_conflict(&self.retry, || self.try_transfer(current_owner_id, new_owner_id)).await
    }

    async fn try_transfer(&self, current_owner_id: Uuid, new_owner_id: Uuid) -> AuthResult<Organization> {
        if current_owner_id == new_owner_id {
            return Err(AuthError::PreconditionFailed("User already owns the organization".to_string()));
        }

        let mut current = self.user(current_owner_id).await?;
        let org_id = match (current.role, current.organization_id) {
            (Role::Owner, Some(org_id)) => org_id,
            _ => return Err(AuthError::Forbidden("Only the owner can transfer ownership".to_string())),
        };
        let mut next = self.user(new_owner_id).await?;
        if !next.belongs_to(org_id) {
            return Err(AuthError::PreconditionFailed(
                "New owner must be a member of the organization".to_string(),
            ));
        }

        let mut org = self.organization(org_id).await?;
        current.role = Role::Admin;
        next.role = Role::Owner;
        org.owner_id = Some(next.id);
        org.updated_at = chrono::Utc::now();

        self.store
            .commit(ChangeSet::new().update(current).update(next).update(org.clone()))
            .await?;
        org.version += 1;

        tracing::info!(org_id = %org.id, from = %current_owner_id, to = %new_owner_id, "Ownership transferred");
        Ok(org)
    }

    /// Give an ownerless organization an owner chosen by
    /// [`resolve_fallback_owner`].
    ///
    /// Repair only; platform roles only.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Forbidden`] unless the requester has a platform role
    /// - [`AuthError::PreconditionFailed`] if the organization already has
    ///   an owner, or has no candidate and needs manual intervention
    pub async fn repair_ownership(&self, organization_id: Uuid, requester_id: Uuid) -> AuthResult<User> {
        retry_on_conflict(&self.retry, || self.try_repair(organization_id, requester_id)).await
    }

    async fn try_repair(&self, organization_id: Uuid, requester_id: Uuid) -> AuthResult<User> {
        let requester = self.user(requester_id).await?;
        if !requester.role.can_manage_platform() {
            return Err(AuthError::Forbidden("Ownership repair requires a platform role".to_string()));
        }

        let mut org = self.organization(organization_id).await?;
        if org.has_owner() {
            return Err(AuthError::PreconditionFailed("Organization already has an owner".to_string()));
        }

        let members = self.store.list_members(org.id).await?;
        let candidate = resolve_fallback_owner(&members).ok_or_else(|| {
            tracing::warn!(org_id = %org.id, "Ownerless organization has no candidate owner");
            AuthError::PreconditionFailed("No member can take ownership; manual intervention required".to_string())
        })?;
        let mut owner = members
            .into_iter()
            .find(|m| m.id == candidate)
            .ok_or_else(|| AuthError::Internal("Fallback owner vanished from member list".to_string()))?;

        owner.role = Role::Owner;
        org.owner_id = Some(owner.id);
        self.store
            .commit(ChangeSet::new().update(owner.clone()).update(org))
            .await?;
        owner.version += 1;

        tracing::warn!(
            org_id = %organization_id,
            user_id = %owner.id,
            requester_id = %requester.id,
            "Ownership repaired with fallback owner"
        );
        Ok(owner)
    }

    async fn user(&self, id: Uuid) -> AuthResult<User> {
        self.store
            .find_user(id)
            .await?
            .ok_or_else(|| AuthError::NotFound(format!("User {} not found", id)))
    }

    async fn organization(&self, id: Uuid) -> AuthResult<Organization> {
        self.store
            .find_organization(id)
            .await?
            .ok_or_else(|| AuthError::NotFound(format!("Organization {} not found", id)))
    }
}

fn authorize_role_change(requester: &User, target: &User, new_role: Role) -> AuthResult<()> {
    let denied = |reason: &str| {
        tracing::warn!(
            user_id = %target.id,
            requester_id = %requester.id,
            role = %new_role,
            "Role change denied: {}",
            reason
        );
        Err(AuthError::Forbidden(reason.to_string()))
    };

    if requester.role.is_system_role() {
        if requester.role == Role::Staff && (target.role == Role::Sudoer || new_role == Role::Sudoer) {
            return denied("STAFF cannot alter or grant SUDOER");
        }
        return Ok(());
    }

    if new_role.is_system_role() {
        return denied("Organization roles cannot grant system roles");
    }
    let same_org = requester.organization_id.is_some() && requester.organization_id == target.organization_id;
    if !same_org {
        return denied("Target is not in the requester's organization");
    }

    match requester.role {
        Role::Owner => Ok(()),
        Role::Admin if target.role == Role::User && matches!(new_role, Role::User | Role::Admin) => Ok(()),
        Role::Admin => denied("ADMIN may only move USER members between USER and ADMIN"),
        _ => denied("Role cannot change roles"),
    }
}
