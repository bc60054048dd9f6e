//! Fire-and-forget notifications
//!
//! Emails are dispatched on a spawned task after the triggering change is
//! committed. A delivery failure never reaches the caller of the triggering
//! operation: it is logged and published on a broadcast channel so that
//! monitoring can pick it up.

use async_trait::async_trait;
use certis_org::Invitation;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

/// Capacity of the delivery failure channel.
const FAILURE_CHANNEL_CAPACITY: usize = 256;

/// Mail delivery error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MailError {
    /// The transport could not deliver the message
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// The recipient was rejected
    #[error("Recipient rejected: {0}")]
    Rejected(String),
}

/// An outgoing email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Email delivery capability.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver one message.
    async fn send(&self, email: &Email) -> Result<(), MailError>;
}

/// What a notification was about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Invitation,
    Welcome,
}

/// A notification that could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub kind: NotificationKind,
    pub to: String,
    pub error: MailError,
    pub at: DateTime<Utc>,
}

/// Renders and dispatches membership notifications.
#[derive(Clone)]
pub struct Notifier {
    mailer: Arc<dyn Mailer>,
    from: String,
    failures: broadcast::Sender<DeliveryFailure>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier").field("from", &self.from).finish_non_exhaustive()
    }
}

impl Notifier {
    pub fn new(mailer: Arc<dyn Mailer>, from: impl Into<String>) -> Self {
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        Self {
            mailer,
            from: from.into(),
            failures,
        }
    }

    /// Receive every delivery failure from now on.
    pub fn subscribe_failures(&self) -> broadcast::Receiver<DeliveryFailure> {
        self.failures.subscribe()
    }

    /// Send the invitation email for `invitation`.
    pub fn invitation_sent(&self, invitation: &Invitation, organization_name: &str, link: &str) -> JoinHandle<()> {
        let days = (invitation.expires_at - invitation.created_at).num_days();
        let body = format!(
            "Hello,\n\n\
             You have been invited to join {org} as a {role} on Certis.\n\n\
             Click the link below to accept this invitation:\n\
             {link}\n\n\
             This invitation will expire in {days} days.\n\n\
             If you did not expect this invitation, please ignore this email.\n\n\
             Best regards,\n\
             The Certis Team",
            org = organization_name,
            role = invitation.role,
            link = link,
            days = days,
        );
        self.dispatch(
            NotificationKind::Invitation,
            Email {
                from: self.from.clone(),
                to: invitation.email.clone(),
                subject: format!("Invitation to join {} on Certis", organization_name),
                body,
            },
        )
    }

    /// Send the welcome email after an invitation was accepted.
    pub fn welcome(&self, to: &str, organization_name: &str) -> JoinHandle<()> {
        let body = format!(
            "Welcome to {org}!\n\n\
             You have successfully joined the organization on Certis.\n\n\
             You can now log in and start using the platform.\n\n\
             Best regards,\n\
             The Certis Team",
            org = organization_name,
        );
        self.dispatch(
            NotificationKind::Welcome,
            Email {
                from: self.from.clone(),
                to: to.to_string(),
                subject: format!("Welcome to {}", organization_name),
                body,
            },
        )
    }

    fn dispatch(&self, kind: NotificationKind, email: Email) -> JoinHandle<()> {
        let mailer = self.mailer.clone();
        let failures = self.failures.clone();

        tokio::spawn(async move {
            match mailer.send(&email).await {
                Ok(()) => tracing::info!(kind = ?kind, to = %email.to, "Notification sent"),
                Err(error) => {
                    tracing::error!(kind = ?kind, to = %email.to, error = %error, "Notification delivery failed");
                    // No subscribers is fine; the log line above is the record.
                    let _ = failures.send(DeliveryFailure {
                        kind,
                        to: email.to,
                        error,
                        at: Utc::now(),
                    });
                }
            }
        })
    }
}

/// In-memory mailer that records every message.
///
/// Useful for development and testing. Can be switched into a failing mode
/// to exercise delivery failure handling.
#[derive(Debug, Clone, Default)]
pub struct MemoryMailer {
    sent: Arc<RwLock<Vec<Email>>>,
    failing: Arc<std::sync::atomic::AtomicBool>,
}

impl MemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose every delivery fails.
    pub fn failing() -> Self {
        let mailer = Self::default();
        mailer.set_failing(true);
        mailer
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    /// Messages delivered so far.
    pub async fn sent(&self) -> Vec<Email> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(MailError::Delivery("mailer unavailable".to_string()));
        }
        self.sent.write().await.push(email.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certis_rbac::Role;
    use uuid::Uuid;

    fn invitation() -> Invitation {
        Invitation::new(
            "new@example.com",
            Role::Admin,
            Uuid::now_v7(),
            Uuid::now_v7(),
            chrono::Duration::days(7),
        )
    }

    #[tokio::test]
    async fn test_invitation_email() {
        let mailer = MemoryMailer::new();
        let notifier = Notifier::new(Arc::new(mailer.clone()), "no-reply@certis.local");
        let inv = invitation();

        notifier
            .invitation_sent(&inv, "Acme", "https://certis/invitations/accept?token=t")
            .await
            .unwrap();

        let sent = mailer.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "new@example.com");
        assert_eq!(sent[0].subject, "Invitation to join Acme on Certis");
        assert!(sent[0].body.contains("as a ADMIN"));
        assert!(sent[0].body.contains("expire in 7 days"));
    }

    #[tokio::test]
    async fn test_failure_is_broadcast() {
        let mailer = MemoryMailer::failing();
        let notifier = Notifier::new(Arc::new(mailer.clone()), "no-reply@certis.local");
        let mut failures = notifier.subscribe_failures();

        notifier.welcome("new@example.com", "Acme").await.unwrap();

        let failure = failures.recv().await.unwrap();
        assert_eq!(failure.kind, NotificationKind::Welcome);
        assert_eq!(failure.to, "new@example.com");
        assert!(mailer.sent().await.is_empty());
    }
}
