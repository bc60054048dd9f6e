//! Invitation lifecycle
//!
//! Drives the `PENDING → {ACCEPTED, EXPIRED, REVOKED}` state machine. Every
//! transition is a version-conditional commit, so concurrent `accept`,
//! `revoke` and `sweep_expired` calls on one invitation agree on a single
//! winner: the first commit moves the invitation out of `PENDING` and every
//! other writer fails its version check, re-reads, and sees a terminal
//! state.

use crate::config::MembershipConfig;
use crate::notify::Notifier;
use crate::retry::retry_on_conflict;
use certis_auth::guard::{require_org_manager, Principal};
use certis_auth::{AuthError, AuthResult};
use certis_org::{ChangeSet, Invitation, InvitationStatus, MembershipStore, StoreError, User};
use certis_rbac::Role;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Creates, accepts, revokes and expires invitations.
#[derive(Clone)]
pub struct InvitationService {
    store: Arc<dyn MembershipStore>,
    notifier: Notifier,
    config: MembershipConfig,
}

impl InvitationService {
    pub fn new(store: Arc<dyn MembershipStore>, notifier: Notifier, config: MembershipConfig) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    /// Invite `email` into `organization_id` with `role`.
    ///
    /// The invitation email is sent after the commit and its failure does
    /// not affect the result.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidArgument`] for a blank email or a system role
    /// - [`AuthError::PreconditionFailed`] for `OWNER` (ownership moves only
    ///   by explicit transfer) or an invitee holding a system role
    /// - [`AuthError::NotFound`] for an unknown organization or inviter
    /// - [`AuthError::Forbidden`] unless the inviter is OWNER or ADMIN of the
    ///   organization
    /// - [`AuthError::Conflict`] if a pending invitation already exists or
    ///   the invitee already belongs to an organization
    pub async fn create(
        &self,
        email: &str,
        role: Role,
        organization_id: Uuid,
        inviter_id: Uuid,
    ) -> AuthResult<Invitation> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(AuthError::InvalidArgument("A valid email is required".to_string()));
        }
        if !role.is_org_role() {
            return Err(AuthError::InvalidArgument(format!(
                "Can only invite with an organization role, not {}",
                role
            )));
        }
        if role == Role::Owner {
            return Err(AuthError::PreconditionFailed(
                "Ownership is granted by transfer, not by invitation".to_string(),
            ));
        }

        let org = self
            .store
            .find_organization(organization_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("Organization not found".to_string()))?;
        let inviter = self
            .store
            .find_user(inviter_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("Inviter not found".to_string()))?;
        require_org_manager(&inviter, org.id)?;

        if self.store.find_pending_invitation(email, org.id).await?.is_some() {
            return Err(AuthError::Conflict(
                "User already has a pending invitation to this organization".to_string(),
            ));
        }
        if let Some(existing) = self.store.find_user_by_email(email).await? {
            if existing.role.is_system_role() {
                return Err(AuthError::PreconditionFailed(
                    "Platform accounts cannot join an organization".to_string(),
                ));
            }
            if existing.is_affiliated() {
                return Err(AuthError::Conflict("User already belongs to an organization".to_string()));
            }
        }

        let mut invitation = Invitation::new(email, role, org.id, inviter.id, self.config.invitation_expiry);
        self.store.commit(ChangeSet::new().insert(invitation.clone())).await?;
        invitation.version = 1;

        tracing::info!(
            invitation_id = %invitation.id,
            org_id = %org.id,
            inviter_id = %inviter.id,
            role = %role,
            "Invitation created"
        );

        let link = self.config.invitation_link(&invitation.token);
        self.notifier.invitation_sent(&invitation, &org.name, &link);

        Ok(invitation)
    }

    /// Accept the invitation addressed by `token` as `user_id`.
    ///
    /// Binding the user, closing the invitation and counting the new member
    /// commit as one unit. A lost optimistic race is retried with every
    /// precondition re-evaluated.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NotFound`] for an unknown, accepted or revoked token, or
    ///   an unknown user
    /// - [`AuthError::Expired`] once the acceptance window has closed; a
    ///   still pending invitation is moved to `EXPIRED` as a side effect
    /// - [`AuthError::Mismatch`] if the user's email is not the invited one
    /// - [`AuthError::PreconditionFailed`] for a system-role user
    /// - [`AuthError::Conflict`] if the user already belongs to an
    ///   organization
    pub async fn accept(&self, token: &str, user_id: Uuid) -> AuthResult<User> {
        if token.trim().is_empty() {
            return Err(AuthError::InvalidArgument("Invitation token is required".to_string()));
        }
        retry_on_conflict(&self.config.retry, || self.try_accept(token, user_id)).await
    }

    async fn try_accept(&self, token: &str, user_id: Uuid) -> AuthResult<User> {
        let mut invitation = self.pending_by_token(token).await?;
        let now = Utc::now();

        if invitation.is_expired_at(now) {
            invitation.transition(InvitationStatus::Expired, now);
            // A version conflict here means another writer decided first;
            // the retry re-reads and reports what it decided.
            self.store.commit(ChangeSet::new().update(invitation.clone())).await?;
            tracing::warn!(invitation_id = %invitation.id, user_id = %user_id, "Acceptance of expired invitation");
            return Err(AuthError::Expired("Invitation has expired".to_string()));
        }

        let mut user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("User not found".to_string()))?;
        if !user.email_matches(&invitation.email) {
            return Err(AuthError::Mismatch("User email does not match invitation".to_string()));
        }
        if user.role.is_system_role() {
            return Err(AuthError::PreconditionFailed(
                "Platform accounts cannot join an organization".to_string(),
            ));
        }
        if user.is_affiliated() {
            return Err(AuthError::Conflict("User already belongs to an organization".to_string()));
        }

        let mut org = self
            .store
            .find_organization(invitation.organization_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("Organization not found".to_string()))?;
        if invitation.role == Role::Owner {
            if org.has_owner() {
                return Err(AuthError::PreconditionFailed("Organization already has an owner".to_string()));
            }
            org.owner_id = Some(user.id);
        }

        user.join_organization(org.id, invitation.role, now);
        invitation.transition(InvitationStatus::Accepted, now);
        org.member_joined();

        self.store
            .commit(
                ChangeSet::new()
                    .update(user.clone())
                    .update(invitation.clone())
                    .update(org.clone()),
            )
            .await?;
        user.version += 1;

        tracing::info!(
            invitation_id = %invitation.id,
            user_id = %user.id,
            org_id = %org.id,
            role = %user.role,
            "Invitation accepted"
        );
        self.notifier.welcome(&user.email, &org.name);

        Ok(user)
    }

    /// Revoke a pending invitation.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NotFound`] for an unknown token or revoker
    /// - [`AuthError::Forbidden`] unless the revoker is OWNER or ADMIN of the
    ///   invitation's organization
    /// - [`AuthError::Conflict`] if the invitation is already terminal
    pub async fn revoke(&self, token: &str, revoker_id: Uuid) -> AuthResult<Invitation> {
        retry_on_conflict(&self.config.retry, || self.try_revoke(token, revoker_id)).await
    }

    async fn try_revoke(&self, token: &str, revoker_id: Uuid) -> AuthResult<Invitation> {
        let mut invitation = self
            .store
            .find_invitation_by_token(token)
            .await?
            .ok_or_else(|| AuthError::NotFound("Invitation not found".to_string()))?;
        let revoker = self
            .store
            .find_user(revoker_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("Revoker not found".to_string()))?;
        require_org_manager(&revoker, invitation.organization_id)?;

        if !invitation.transition(InvitationStatus::Revoked, Utc::now()) {
            return Err(AuthError::Conflict(format!("Invitation is already {}", invitation.status)));
        }
        self.store.commit(ChangeSet::new().update(invitation.clone())).await?;
        invitation.version += 1;

        tracing::info!(invitation_id = %invitation.id, revoker_id = %revoker.id, "Invitation revoked");
        Ok(invitation)
    }

    /// Move every `PENDING` invitation that expired before `now` to
    /// `EXPIRED`.
    ///
    /// Each transition is conditional on the version read; an invitation
    /// whose version moved meanwhile was decided by another writer and is
    /// skipped. Safe to run concurrently from several instances.
    ///
    /// # Returns
    ///
    /// The number of invitations this call expired.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> AuthResult<usize> {
        let candidates = self.store.list_expired_pending(now).await?;
        let mut expired = 0;

        for mut invitation in candidates {
            if !invitation.transition(InvitationStatus::Expired, now) {
                continue;
            }
            match self.store.commit(ChangeSet::new().update(invitation.clone())).await {
                Ok(()) => expired += 1,
                Err(e @ StoreError::VersionConflict { .. }) => {
                    tracing::debug!(invitation_id = %invitation.id, error = %e, "Invitation decided concurrently, skipped");
                }
                Err(e) => return Err(e.into()),
            }
        }

        if expired > 0 {
            tracing::info!(count = expired, "Marked invitations as expired");
        }
        Ok(expired)
    }

    /// Pending invitations of `organization_id`.
    ///
    /// Visible to the organization's OWNER and ADMINs and to platform roles.
    pub async fn list_pending<P: Principal + ?Sized>(
        &self,
        requester: &P,
        organization_id: Uuid,
    ) -> AuthResult<Vec<Invitation>> {
        if !requester.role().can_manage_platform() {
            require_org_manager(requester, organization_id)?;
        }
        Ok(self
            .store
            .list_invitations(organization_id, Some(InvitationStatus::Pending))
            .await?)
    }

    async fn pending_by_token(&self, token: &str) -> AuthResult<Invitation> {
        match self.store.find_invitation_by_token(token).await? {
            Some(invitation) if invitation.is_pending() => Ok(invitation),
            Some(invitation) if invitation.status == InvitationStatus::Expired => {
                Err(AuthError::Expired("Invitation has expired".to_string()))
            }
            _ => Err(AuthError::NotFound("Invalid or expired invitation".to_string())),
        }
    }
}
