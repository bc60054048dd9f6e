//! Tenant-scoped courses and certificates
//!
//! Every call resolves the caller's tenant first. Reads and references to a
//! resource of another organization report it as missing, so its existence
//! does not leak across tenants; mutating another tenant's certificate is
//! forbidden.

use crate::retry::{retry_on_conflict, RetryPolicy};
use certis_auth::guard::{
    require_capability, require_org_manager, require_organization, require_same_organization, Principal,
};
use certis_auth::{AuthError, AuthResult, TenantContext};
use certis_org::{Certificate, ChangeSet, Course, MembershipStore, TenantOwned};
use certis_rbac::Capability;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Attempts at drawing an unused serial number before giving up.
const SERIAL_ATTEMPTS: usize = 10;

/// Generate a 16 character upper-case hexadecimal serial number.
pub fn generate_serial_number() -> String {
    format!("{:016X}", rand::thread_rng().gen::<u64>())
}

/// Request to issue a certificate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCertificate {
    pub subject: String,
    #[serde(default)]
    pub course_id: Option<Uuid>,
    /// Defaults to the issuance time
    #[serde(default)]
    pub active_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub active_to: Option<DateTime<Utc>>,
}

/// One rejected item of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// Position in the submitted batch
    pub index: usize,
    pub subject: String,
    pub error: AuthError,
}

/// Outcome of [`CertificateService::issue_batch`].
#[derive(Debug, Clone)]
pub struct BatchIssueReport {
    pub issued: Vec<Certificate>,
    pub failures: Vec<BatchFailure>,
    /// Number of submitted items
    pub total: usize,
}

impl BatchIssueReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Issues, revokes and lists certificates within the caller's tenant.
#[derive(Clone)]
pub struct CertificateService {
    store: Arc<dyn MembershipStore>,
    retry: RetryPolicy,
}

impl CertificateService {
    pub fn new(store: Arc<dyn MembershipStore>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// Create a course in the caller's organization. OWNER or ADMIN only.
    pub async fn create_course<P: Principal + ?Sized>(
        &self,
        principal: &P,
        title: &str,
        slug: &str,
    ) -> AuthResult<Course> {
        let organization_id = require_organization(principal)?;
        require_org_manager(principal, organization_id)?;
        if title.trim().is_empty() || slug.trim().is_empty() {
            return Err(AuthError::InvalidArgument("Course title and slug are required".to_string()));
        }

        let mut course = Course::new(organization_id, title.trim(), slug.trim());
        self.store.commit(ChangeSet::new().insert(course.clone())).await?;
        course.version = 1;
        tracing::info!(course_id = %course.id, org_id = %organization_id, "Course created");
        Ok(course)
    }

    /// Courses visible to the request's tenant, ordered by title.
    pub async fn list_courses(&self, ctx: &TenantContext) -> AuthResult<Vec<Course>> {
        let scope = ctx.scope()?;
        let courses = self.store.list_courses(scope.organization_id()).await?;
        Ok(scope.filter(courses))
    }

    /// Delete a course of the caller's organization. OWNER or ADMIN only.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NotFound`] if the course is unknown or belongs to
    ///   another organization
    /// - [`AuthError::Forbidden`] unless the caller manages the organization
    /// - [`AuthError::Conflict`] while certificates still reference it
    pub async fn delete_course<P: Principal + ?Sized>(&self, principal: &P, course_id: Uuid) -> AuthResult<()> {
        let organization_id = require_organization(principal)?;
        require_org_manager(principal, organization_id)?;
        retry_on_conflict(&self.retry, || self.try_delete_course(organization_id, course_id)).await?;
        tracing::info!(course_id = %course_id, org_id = %organization_id, "Course deleted");
        Ok(())
    }

    async fn try_delete_course(&self, organization_id: Uuid, course_id: Uuid) -> AuthResult<()> {
        let course = self
            .store
            .find_course(course_id)
            .await?
            .filter(|c| c.organization_id() == organization_id)
            .ok_or_else(|| AuthError::NotFound("Course not found".to_string()))?;

        let in_use = self
            .store
            .list_certificates(Some(organization_id))
            .await?
            .iter()
            .any(|c| c.course_id == Some(course_id));
        if in_use {
            return Err(AuthError::Conflict(
                "Course has issued certificates and cannot be deleted".to_string(),
            ));
        }

        self.store.commit(ChangeSet::new().delete(course)).await?;
        Ok(())
    }

    /// Issue a certificate in the caller's organization.
    ///
    /// # Errors
    ///
    /// - [`AuthError::PreconditionFailed`] if the caller has no organization
    /// - [`AuthError::Forbidden`] if the caller's role cannot issue
    /// - [`AuthError::InvalidArgument`] for a blank subject or an inverted
    ///   validity window
    /// - [`AuthError::NotFound`] if the course is unknown or belongs to
    ///   another organization
    pub async fn issue<P: Principal + ?Sized>(&self, principal: &P, request: NewCertificate) -> AuthResult<Certificate> {
        let organization_id = require_organization(principal)?;
        require_capability(principal, Capability::CreateCertificates)?;

        let subject = request.subject.trim();
        if subject.is_empty() {
            return Err(AuthError::InvalidArgument("Certificate subject is required".to_string()));
        }
        let active_from = request.active_from.unwrap_or_else(Utc::now);
        if request.active_to.is_some_and(|to| to < active_from) {
            return Err(AuthError::InvalidArgument(
                "Certificate validity ends before it starts".to_string(),
            ));
        }

        if let Some(course_id) = request.course_id {
            let course = self.store.find_course(course_id).await?;
            if !course.is_some_and(|c| c.organization_id() == organization_id) {
                return Err(AuthError::NotFound("Course not found".to_string()));
            }
        }

        let mut certificate = Certificate {
            id: Uuid::now_v7(),
            serial_number: self.unused_serial_number().await?,
            subject: subject.to_string(),
            course_id: request.course_id,
            organization_id,
            issuer_id: principal.user_id(),
            active_from,
            active_to: request.active_to,
            revoked_at: None,
            version: 0,
        };
        self.store.commit(ChangeSet::new().insert(certificate.clone())).await?;
        certificate.version = 1;

        tracing::info!(
            serial = %certificate.serial_number,
            org_id = %organization_id,
            issuer_id = %certificate.issuer_id,
            "Certificate issued"
        );
        Ok(certificate)
    }

    /// Issue several certificates, each independently.
    ///
    /// A failing item does not stop the batch; it is reported with its
    /// position in `requests`. Errors that concern the caller rather than an
    /// item (no organization, missing capability) fail the whole call.
    pub async fn issue_batch<P: Principal + ?Sized>(
        &self,
        principal: &P,
        requests: Vec<NewCertificate>,
    ) -> AuthResult<BatchIssueReport> {
        require_organization(principal)?;
        require_capability(principal, Capability::CreateCertificates)?;

        let total = requests.len();
        let mut report = BatchIssueReport {
            issued: Vec::with_capacity(total),
            failures: Vec::new(),
            total,
        };
        for (index, request) in requests.into_iter().enumerate() {
            let subject = request.subject.clone();
            match self.issue(principal, request).await {
                Ok(certificate) => report.issued.push(certificate),
                Err(error) => {
                    tracing::debug!(index, error = %error, "Batch item rejected");
                    report.failures.push(BatchFailure { index, subject, error });
                }
            }
        }

        tracing::info!(
            total,
            issued = report.issued.len(),
            failed = report.failures.len(),
            "Certificate batch processed"
        );
        Ok(report)
    }

    async fn unused_serial_number(&self) -> AuthResult<String> {
        for _ in 0..SERIAL_ATTEMPTS {
            let serial = generate_serial_number();
            if self.store.find_certificate_by_serial(&serial).await?.is_none() {
                return Ok(serial);
            }
        }
        Err(AuthError::Internal("Could not allocate a unique serial number".to_string()))
    }

    /// Revoke a certificate of the caller's organization.
    ///
    /// Platform roles may revoke in any organization.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NotFound`] for an unknown serial
    /// - [`AuthError::Forbidden`] if the caller's role cannot revoke or the
    ///   certificate belongs to another organization
    /// - [`AuthError::Conflict`] if it is already revoked
    pub async fn revoke<P: Principal + ?Sized>(&self, principal: &P, serial: &str) -> AuthResult<Certificate> {
        require_capability(principal, Capability::RevokeCertificates)?;
        retry_on_conflict(&self.retry, || self.try_revoke(principal, serial)).await
    }

    async fn try_revoke<P: Principal + ?Sized>(&self, principal: &P, serial: &str) -> AuthResult<Certificate> {
        let mut certificate = self
            .store
            .find_certificate_by_serial(serial)
            .await?
            .ok_or_else(|| AuthError::NotFound("Certificate not found".to_string()))?;
        require_same_organization(principal, certificate.organization_id)?;
        if certificate.is_revoked() {
            return Err(AuthError::Conflict("Certificate is already revoked".to_string()));
        }

        certificate.revoked_at = Some(Utc::now());
        self.store.commit(ChangeSet::new().update(certificate.clone())).await?;
        certificate.version += 1;

        tracing::info!(serial = %serial, revoked_by = %principal.user_id(), "Certificate revoked");
        Ok(certificate)
    }

    /// Certificates visible to the request's tenant.
    pub async fn list(&self, ctx: &TenantContext) -> AuthResult<Vec<Certificate>> {
        let scope = ctx.scope()?;
        let certificates = self.store.list_certificates(scope.organization_id()).await?;
        Ok(scope.filter(certificates))
    }

    /// Look up one certificate within the request's tenant.
    pub async fn find(&self, ctx: &TenantContext, serial: &str) -> AuthResult<Certificate> {
        let scope = ctx.scope()?;
        self.store
            .find_certificate_by_serial(serial)
            .await?
            .filter(|c| scope.admits(c))
            .ok_or_else(|| AuthError::NotFound("Certificate not found".to_string()))
    }
}
