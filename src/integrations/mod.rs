//! Outbound integrations
//!
//! The comment handlers only see two traits: [`SpamCheck`] runs before a
//! comment is saved and [`Notifier`] after. Both are optional; when
//! unconfigured the no-op implementations are used.

mod akismet;
mod mailer;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use akismet::Akismet;
pub use mailer::{parse_sender, MailMessage, Sendmail};

use crate::config::{AkismetConfig, NotifyConfig};
use crate::routing::ClientInfo;
use crate::store::Comment;

#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sendmail exited with {0}")]
    Sendmail(std::process::ExitStatus),
    #[error("sendmail did not finish within {0:?}")]
    Timeout(std::time::Duration),
}

/// A comment about to be saved, with the context a spam filter needs
#[derive(Debug, Clone, Copy)]
pub struct Submission<'a> {
    pub comment: &'a Comment,
    pub email: &'a str,
    pub post_url: &'a str,
    pub client: &'a ClientInfo,
}

#[async_trait]
pub trait SpamCheck: Send + Sync + 'static {
    /// `Ok(true)` means the submission must be rejected
    async fn is_spam(&self, submission: Submission<'_>) -> Result<bool, IntegrationError>;
}

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(
        &self,
        comment: &Comment,
        post_url: &str,
        post_title: &str,
    ) -> Result<(), IntegrationError>;
}

/// Accepts everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSpamCheck;

#[async_trait]
impl SpamCheck for NoSpamCheck {
    async fn is_spam(&self, _submission: Submission<'_>) -> Result<bool, IntegrationError> {
        Ok(false)
    }
}

/// Sends nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoNotifier;

#[async_trait]
impl Notifier for NoNotifier {
    async fn notify(&self, _: &Comment, _: &str, _: &str) -> Result<(), IntegrationError> {
        Ok(())
    }
}

/// Akismet when configured, otherwise [`NoSpamCheck`]
pub fn spam_check_from(config: &AkismetConfig) -> Result<Arc<dyn SpamCheck>, IntegrationError> {
    if config.is_enabled() {
        Ok(Arc::new(Akismet::new(config)?))
    } else {
        Ok(Arc::new(NoSpamCheck))
    }
}

/// Sendmail when a recipient is configured, otherwise [`NoNotifier`]
pub fn notifier_from(config: &NotifyConfig) -> Arc<dyn Notifier> {
    if config.is_enabled() {
        Arc::new(Sendmail::new(config))
    } else {
        Arc::new(NoNotifier)
    }
}
