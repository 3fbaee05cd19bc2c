//! Outbound mail
//!
//! Delivery itself is external; the services only hand over the recipient
//! and the token. [`LogNotifier`] renders the link a mail would contain and
//! writes it to the log.

use crate::config::MailConfig;
use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Mail the email-verification link
    async fn send_verification(&self, email: &str, name: &str, token: &str) -> Result<()>;

    /// Mail the password-reset link for one role membership
    async fn send_password_reset(&self, email: &str, name: &str, role: &str, token: &str) -> Result<()>;
}

pub struct LogNotifier {
    app_name: String,
    frontend_url: String,
}

impl LogNotifier {
    pub fn new(config: &MailConfig) -> Self {
        Self {
            app_name: config.app_name.clone(),
            frontend_url: config.frontend_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn verification_link(&self, token: &str) -> String {
        format!("{}/auth/verify?token={}", self.frontend_url, token)
    }

    pub fn reset_link(&self, email: &str, role: &str, token: &str) -> String {
        format!(
            "{}/auth/reset-password?email={}&token={}&role={}",
            self.frontend_url, email, token, role
        )
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_verification(&self, email: &str, name: &str, token: &str) -> Result<()> {
        info!(
            to = %email,
            subject = %format!("{} - Email Verification", self.app_name),
            link = %self.verification_link(token),
            "Verification mail for {}",
            name
        );
        Ok(())
    }

    async fn send_password_reset(&self, email: &str, name: &str, role: &str, token: &str) -> Result<()> {
        info!(
            to = %email,
            subject = %format!("{} - Reset Password", self.app_name),
            link = %self.reset_link(email, role, token),
            "Password reset mail for {}",
            name
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_links_point_at_frontend() {
        let mut mail = AppConfig::default().mail;
        mail.frontend_url = "https://app.example.com/".into();
        let notifier = LogNotifier::new(&mail);

        assert_eq!(
            notifier.verification_link("abc"),
            "https://app.example.com/auth/verify?token=abc"
        );
        assert_eq!(
            notifier.reset_link("ana@example.com", "user", "xyz"),
            "https://app.example.com/auth/reset-password?email=ana@example.com&token=xyz&role=user"
        );
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        let notifier = LogNotifier::new(&AppConfig::default().mail);
        assert!(notifier.send_verification("a@b.io", "Ana", "t").await.is_ok());
        assert!(notifier.send_password_reset("a@b.io", "Ana", "user", "t").await.is_ok());
    }
}
