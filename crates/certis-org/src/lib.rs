//! # Certis Organizations
//!
//! Tenant records and the persistence boundary for the Certis membership
//! model.
//!
//! ## Overview
//!
//! The certis-org crate handles:
//! - **Users**: Identities with a role and at most one organization
//! - **Organizations**: Tenants with a unique domain and an explicit owner
//! - **Invitations**: Token-addressed onboarding with a terminal status machine
//! - **Resources**: Organization-owned courses and certificates
//! - **Store**: The [`MembershipStore`] trait with atomic, versioned commits
//!
//! ## Architecture
//!
//! ```text
//! Organization ──owner_id──> User (OWNER)
//!   ├─ User (ADMIN | USER)      via User::organization_id
//!   ├─ Invitation (PENDING → ACCEPTED | EXPIRED | REVOKED)
//!   ├─ Course
//!   └─ Certificate
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use certis_org::{ChangeSet, MembershipStore, MemoryStore, Organization, User};
//! use certis_rbac::Role;
//!
//! # tokio_test_block(async {
//! let store = MemoryStore::new();
//!
//! let mut org = Organization::new("Acme", "acme.io", None);
//! let mut owner = User::new("owner@acme.io", "hash", "Olga", "Owner");
//! owner.join_organization(org.id, Role::Owner, chrono::Utc::now());
//! org.owner_id = Some(owner.id);
//! org.member_joined();
//!
//! store.commit(ChangeSet::new().insert(org).insert(owner)).await.unwrap();
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `memory` (default): the in-memory [`MemoryStore`]

pub mod invitation;
#[cfg(feature = "memory")]
pub mod memory;
pub mod organization;
pub mod resources;
pub mod store;
pub mod user;

// Re-export main types for convenience
pub use invitation::{generate_invitation_token, Invitation, InvitationStatus, INVITATION_TOKEN_BYTES};
#[cfg(feature = "memory")]
pub use memory::MemoryStore;
pub use organization::{normalize_domain, Organization};
pub use resources::{Certificate, Course, TenantOwned};
pub use store::{Change, ChangeSet, MembershipStore, Record, StoreError, StoreResult, Versioned};
pub use user::User;
