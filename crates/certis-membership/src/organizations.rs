//! Organization founding and tenant-scoped organization reads

use crate::retry::{retry_on_conflict, RetryPolicy};
use certis_auth::guard::{require_capability, require_same_organization, Principal};
use certis_auth::{AuthError, AuthResult};
use certis_org::{ChangeSet, MembershipStore, Organization, User};
use certis_rbac::{Capability, Role};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Request to found an organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrganization {
    pub name: String,
    pub domain: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Founds organizations and serves tenant-scoped organization reads.
#[derive(Clone)]
pub struct OrganizationService {
    store: Arc<dyn MembershipStore>,
    retry: RetryPolicy,
}

impl OrganizationService {
    pub fn new(store: Arc<dyn MembershipStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Found an organization with `founder_id` as its `OWNER`.
    ///
    /// The organization and the founder's promotion are committed together.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidArgument`] for a blank name or domain
    /// - [`AuthError::Forbidden`] if the founder holds a system role
    /// - [`AuthError::Conflict`] if the founder already belongs to an
    ///   organization or the domain is taken
    pub async fn create_organization(&self, founder_id: Uuid, request: NewOrganization) -> AuthResult<Organization> {
        if request.name.trim().is_empty() {
            return Err(AuthError::InvalidArgument("Organization name is required".to_string()));
        }
        if certis_org::normalize_domain(&request.domain).is_empty() {
            return Err(AuthError::InvalidArgument("Organization domain is required".to_string()));
        }
        retry_on_conflict(&self.retry, || self.try_create(founder_id, &request)).await
    }

    async fn try_create(&self, founder_id: Uuid, request: &NewOrganization) -> AuthResult<Organization> {
        let mut founder = self
            .store
            .find_user(founder_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("Founder not found".to_string()))?;
        if founder.role.is_system_role() {
            return Err(AuthError::Forbidden(
                "System roles cannot create organizations".to_string(),
            ));
        }
        if founder.is_affiliated() {
            return Err(AuthError::Conflict("User already has an organization".to_string()));
        }
        if self.store.find_organization_by_domain(&request.domain).await?.is_some() {
            return Err(AuthError::Conflict(
                "Domain is already registered by another organization".to_string(),
            ));
        }

        let mut org = Organization::new(request.name.trim(), &request.domain, request.description.clone());
        founder.join_organization(org.id, Role::Owner, Utc::now());
        org.owner_id = Some(founder.id);
        org.member_joined();

        self.store
            .commit(ChangeSet::new().insert(org.clone()).update(founder))
            .await?;
        org.version = 1;

        tracing::info!(org_id = %org.id, founder_id = %founder_id, domain = %org.domain, "Organization created");
        Ok(org)
    }

    /// The principal's own organization, if any.
    pub async fn organization_for<P: Principal + ?Sized>(&self, principal: &P) -> AuthResult<Option<Organization>> {
        match principal.organization_id() {
            Some(id) => Ok(self.store.find_organization(id).await?),
            None => Ok(None),
        }
    }

    /// Look up an organization the principal may see.
    pub async fn get<P: Principal + ?Sized>(&self, principal: &P, organization_id: Uuid) -> AuthResult<Organization> {
        require_same_organization(principal, organization_id)?;
        self.store
            .find_organization(organization_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("Organization not found".to_string()))
    }

    /// Every organization, oldest first. Platform roles only.
    pub async fn list_organizations<P: Principal + ?Sized>(&self, principal: &P) -> AuthResult<Vec<Organization>> {
        require_capability(principal, Capability::ManagePlatform)?;
        Ok(self.store.list_organizations().await?)
    }

    /// Members of `organization_id`, ordered by join date.
    ///
    /// Visible to members of the organization and to system roles.
    pub async fn list_members<P: Principal + ?Sized>(&self, principal: &P, organization_id: Uuid) -> AuthResult<Vec<User>> {
        require_same_organization(principal, organization_id)?;
        Ok(self.store.list_members(organization_id).await?)
    }

    /// Whether `user_id` may administer `organization_id`: a system role, or
    /// OWNER/ADMIN of that organization. Unknown users cannot.
    pub async fn can_manage(&self, user_id: Uuid, organization_id: Uuid) -> AuthResult<bool> {
        let Some(user) = self.store.find_user(user_id).await? else {
            return Ok(false);
        };
        Ok(user.role.is_system_role() || (user.role.is_org_manager() && user.belongs_to(organization_id)))
    }
}
