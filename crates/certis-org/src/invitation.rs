//! Invitation records
//!
//! An invitation onboards one email address into one organization with an
//! organization role. Its status is a terminal-state machine:
//!
//! ```text
//!            ┌──> ACCEPTED
//! PENDING ───┼──> EXPIRED
//!            └──> REVOKED
//! ```
//!
//! Terminal invitations are retained for audit and never leave their state.

use certis_rbac::Role;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Length in bytes of the random material behind an invitation token.
pub const INVITATION_TOKEN_BYTES: usize = 32;

/// Invitation status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvitationStatus {
    /// Awaiting acceptance
    Pending,

    /// Accepted by the invitee
    Accepted,

    /// Past its expiry window
    Expired,

    /// Withdrawn by an organization manager
    Revoked,
}

impl InvitationStatus {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, InvitationStatus::Pending)
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// Only `PENDING` moves, and only into a terminal state.
    pub fn can_transition_to(&self, next: InvitationStatus) -> bool {
        matches!(self, InvitationStatus::Pending) && next.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "PENDING",
            InvitationStatus::Accepted => "ACCEPTED",
            InvitationStatus::Expired => "EXPIRED",
            InvitationStatus::Revoked => "REVOKED",
        }
    }
}

impl fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An invitation to join an organization.
///
/// # Examples
///
/// ```
/// use certis_org::{Invitation, InvitationStatus};
/// use certis_rbac::Role;
/// use chrono::Duration;
/// use uuid::Uuid;
///
/// let inv = Invitation::new(
///     "new.member@example.com",
///     Role::User,
///     Uuid::now_v7(),
///     Uuid::now_v7(),
///     Duration::days(7),
/// );
/// assert_eq!(inv.status, InvitationStatus::Pending);
/// assert!(!inv.is_expired_at(chrono::Utc::now()));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: Uuid,

    /// Unguessable bearer string delivered out-of-band
    pub token: String,

    /// Invitee email as entered by the inviter
    pub email: String,

    /// Organization role granted on acceptance
    pub role: Role,

    pub organization_id: Uuid,

    /// User who created the invitation
    pub invited_by: Uuid,

    pub status: InvitationStatus,

    pub expires_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,

    pub accepted_at: Option<DateTime<Utc>>,

    /// Optimistic concurrency version (0 = never persisted)
    #[serde(default)]
    pub version: u64,
}

impl Invitation {
    /// Creates a `PENDING` invitation with a fresh token, expiring `ttl` from
    /// now.
    pub fn new(
        email: impl Into<String>,
        role: Role,
        organization_id: Uuid,
        invited_by: Uuid,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            token: generate_invitation_token(),
            email: email.into().trim().to_string(),
            role,
            organization_id,
            invited_by,
            status: InvitationStatus::Pending,
            expires_at: now + ttl,
            created_at: now,
            accepted_at: None,
            version: 0,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == InvitationStatus::Pending
    }

    /// Whether the acceptance window has closed at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Key used for the one-pending-invitation-per-email uniqueness rule.
    pub fn pending_key(&self) -> (String, Uuid) {
        (self.email.to_ascii_lowercase(), self.organization_id)
    }

    /// Move to `next`, returning `false` (and leaving the record untouched)
    /// when the transition is illegal.
    pub fn transition(&mut self, next: InvitationStatus, at: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next == InvitationStatus::Accepted {
            self.accepted_at = Some(at);
        }
        true
    }
}

/// Generate an unguessable invitation token.
///
/// 32 bytes from the thread-local CSPRNG, URL-safe base64 without padding.
pub fn generate_invitation_token() -> String {
    use rand::RngCore;

    let mut bytes = [0u8; INVITATION_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invitation() -> Invitation {
        Invitation::new(
            " Invitee@Example.com ",
            Role::Admin,
            Uuid::now_v7(),
            Uuid::now_v7(),
            Duration::days(7),
        )
    }

    #[test]
    fn test_only_pending_moves() {
        use InvitationStatus::*;
        for next in [Accepted, Expired, Revoked] {
            assert!(Pending.can_transition_to(next));
            for terminal in [Accepted, Expired, Revoked] {
                assert!(!terminal.can_transition_to(next));
            }
        }
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn test_transition_sets_accepted_at() {
        let mut inv = invitation();
        let now = Utc::now();
        assert!(inv.transition(InvitationStatus::Accepted, now));
        assert_eq!(inv.accepted_at, Some(now));
        assert!(!inv.transition(InvitationStatus::Expired, now));
        assert_eq!(inv.status, InvitationStatus::Accepted);
    }

    #[test]
    fn test_expiry() {
        let inv = invitation();
        assert!(!inv.is_expired_at(inv.created_at));
        assert!(inv.is_expired_at(inv.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn test_pending_key_is_case_insensitive() {
        let inv = invitation();
        assert_eq!(inv.email, "Invitee@Example.com");
        assert_eq!(inv.pending_key().0, "invitee@example.com");
    }

    #[test]
    fn test_tokens_are_unique_and_url_safe() {
        let a = generate_invitation_token();
        let b = generate_invitation_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
