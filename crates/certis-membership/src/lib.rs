//! # Certis Membership
//!
//! Organization lifecycle services built on the Certis authorization core.
//!
//! ## Overview
//!
//! - **Organizations**: founding an organization and tenant-scoped reads
//! - **Invitations**: the `PENDING → {ACCEPTED, EXPIRED, REVOKED}` lifecycle
//!   with email notification
//! - **Ownership**: role changes, removal, explicit transfer, and repair of
//!   organizations left without an owner
//! - **Certificates**: issuance, revocation and listing within a tenant
//!
//! Every state change is a single atomic commit against a
//! [`MembershipStore`](certis_org::MembershipStore). Lost optimistic races are
//! retried per [`RetryPolicy`]; a race that is still lost surfaces as
//! [`AuthError::ConcurrentUpdate`](certis_auth::AuthError::ConcurrentUpdate).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use certis_membership::{InvitationService, MembershipConfig, MemoryMailer, Notifier};
//! use certis_org::MemoryStore;
//! use certis_rbac::Role;
//! use std::sync::Arc;
//! use uuid::Uuid;
//!
//! # async fn example(org_id: Uuid, owner_id: Uuid, invitee_id: Uuid) -> certis_auth::AuthResult<()> {
//! let config = MembershipConfig::from_env()?;
//! let notifier = Notifier::new(Arc::new(MemoryMailer::new()), config.mail_from.clone());
//! let invitations = InvitationService::new(Arc::new(MemoryStore::new()), notifier, config);
//!
//! let invitation = invitations.create("new@acme.io", Role::Admin, org_id, owner_id).await?;
//! let member = invitations.accept(&invitation.token, invitee_id).await?;
//! assert_eq!(member.role, Role::Admin);
//! # Ok(())
//! # }
//! ```

pub mod certificates;
pub mod config;
pub mod invitations;
pub mod notify;
pub mod organizations;
pub mod ownership;
pub mod retry;

pub use certificates::{generate_serial_number, BatchFailure, BatchIssueReport, CertificateService, NewCertificate};
pub use config::MembershipConfig;
pub use invitations::InvitationService;
pub use notify::{DeliveryFailure, Email, MailError, Mailer, MemoryMailer, NotificationKind, Notifier};
pub use organizations::{NewOrganization, OrganizationService};
pub use ownership::{resolve_fallback_owner, OwnershipService};
pub use retry::{retry_on_conflict, RetryPolicy};
