//! Membership service configuration

use crate::retry::RetryPolicy;
use certis_auth::env::read_env;
use certis_auth::{AuthError, AuthResult};
use chrono::Duration;

/// Configuration shared by the membership services.
#[derive(Debug, Clone)]
pub struct MembershipConfig {
    /// How long an invitation stays acceptable
    pub invitation_expiry: Duration,

    /// Public base URL used to build invitation links
    pub invitation_base_url: String,

    /// Sender address for notifications
    pub mail_from: String,

    /// Retry policy for lost optimistic races
    pub retry: RetryPolicy,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            invitation_expiry: Duration::days(7),
            invitation_base_url: "http://localhost:3000".to_string(),
            mail_from: "no-reply@certis.local".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl MembershipConfig {
    /// Load from `CERTIS_INVITATION_EXPIRY_DAYS`,
    /// `CERTIS_INVITATION_BASE_URL` and `CERTIS_MAIL_FROM`.
    pub fn from_env() -> AuthResult<Self> {
        let mut config = Self::default();
        if let Some(days) = read_env::<i64>("CERTIS_INVITATION_EXPIRY_DAYS")? {
            if days <= 0 {
                return Err(AuthError::ConfigError(
                    "CERTIS_INVITATION_EXPIRY_DAYS must be positive".to_string(),
                ));
            }
            config.invitation_expiry = Duration::days(days);
        }
        if let Some(url) = read_env::<String>("CERTIS_INVITATION_BASE_URL")? {
            config.invitation_base_url = url;
        }
        if let Some(from) = read_env::<String>("CERTIS_MAIL_FROM")? {
            config.mail_from = from;
        }
        Ok(config)
    }

    pub fn with_invitation_expiry(mut self, expiry: Duration) -> Self {
        self.invitation_expiry = expiry;
        self
    }

    pub fn with_invitation_base_url(mut self, url: impl Into<String>) -> Self {
        self.invitation_base_url = url.into();
        self
    }

    pub fn with_mail_from(mut self, from: impl Into<String>) -> Self {
        self.mail_from = from.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Link the invitee follows to accept `token`.
    pub fn invitation_link(&self, token: &str) -> String {
        format!(
            "{}/invitations/accept?token={}",
            self.invitation_base_url.trim_end_matches('/'),
            token
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MembershipConfig::default();
        assert_eq!(config.invitation_expiry, Duration::days(7));
        assert_eq!(config.retry.max_retries, 1);
    }

    #[test]
    fn test_invitation_link() {
        let config = MembershipConfig::default().with_invitation_base_url("https://certis.lsia.ma/");
        assert_eq!(
            config.invitation_link("abc"),
            "https://certis.lsia.ma/invitations/accept?token=abc"
        );
    }
}
