//! # Certis RBAC
//!
//! The role model for Certis: a fixed set of five roles and the capability
//! predicates derived from them. This crate is pure: no I/O, no clocks.
//!
//! ## Roles
//!
//! ```text
//! System roles        SUDOER, STAFF          platform-wide, no organization
//! Organization roles  OWNER, ADMIN, USER     scoped to one organization
//! ```
//!
//! ## Capability matrix
//!
//! | Capability            | SUDOER | STAFF | OWNER | ADMIN | USER |
//! |-----------------------|:------:|:-----:|:-----:|:-----:|:----:|
//! | manage users          |   ✓    |   ✓   |   ✓   |   ✓   |      |
//! | revoke certificates   |   ✓    |   ✓   |   ✓   |   ✓   |      |
//! | manage platform       |   ✓    |   ✓   |       |       |      |
//! | create certificates   |        |       |   ✓   |   ✓   |  ✓   |
//! | manage invitations    |        |       |   ✓   |   ✓   |      |
//!
//! ## Usage
//!
//! ```rust
//! use certis_rbac::{Capability, Role};
//!
//! let role = Role::parse("admin").unwrap();
//! assert!(Capability::ManageUsers.is_granted_to(role));
//! assert!(role.is_org_role());
//! ```

pub mod capabilities;
pub mod roles;

pub use capabilities::Capability;
pub use roles::{Role, UnknownRole};
