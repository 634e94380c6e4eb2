// Application state module
// Everything a request handler needs, built once from the configuration

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::types::Config;
use crate::integrations::{self, IntegrationError, Notifier, SpamCheck};
use crate::store::{Comment, CommentStore};

const NOTIFY_POLL: Duration = Duration::from_millis(20);

/// Application state
pub struct AppState {
    pub config: Config,
    pub store: CommentStore,
    pub spam: Arc<dyn SpamCheck>,
    pub notifier: Arc<dyn Notifier>,
    pending_notifications: Arc<AtomicUsize>,
}

impl AppState {
    /// Build the store and the configured integrations
    pub fn new(config: Config) -> Result<Self, IntegrationError> {
        let spam = integrations::spam_check_from(&config.akismet)?;
        let notifier = integrations::notifier_from(&config.notify);
        Ok(Self::with_integrations(config, spam, notifier))
    }

    /// Build with explicit integrations
    pub fn with_integrations(
        config: Config,
        spam: Arc<dyn SpamCheck>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let store = CommentStore::new(
            config.comments.root.clone(),
            config.comments.hash_algorithm,
        );
        Self {
            config,
            store,
            spam,
            notifier,
            pending_notifications: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Send the new-comment notification on its own task
    ///
    /// Failures are logged and never reach the caller.
    pub fn notify_in_background(&self, comment: Comment, post_url: String, post_title: String) {
        let notifier = Arc::clone(&self.notifier);
        let pending = PendingGuard::new(Arc::clone(&self.pending_notifications));

        tokio::spawn(async move {
            let _pending = pending;
            if let Err(e) = notifier.notify(&comment, &post_url, &post_title).await {
                tracing::warn!(post = %comment.post, id = comment.id, error = %e, "failed to send notification");
            }
        });
    }

    /// Notifications that have not finished yet
    pub fn pending_notifications(&self) -> usize {
        self.pending_notifications.load(Ordering::SeqCst)
    }

    /// Wait up to `limit` for background notifications
    ///
    /// Returns how many were still running when it gave up.
    pub async fn wait_for_notifications(&self, limit: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let remaining = self.pending_notifications();
            if remaining == 0 || tokio::time::Instant::now() >= deadline {
                return remaining;
            }
            tokio::time::sleep(NOTIFY_POLL).await;
        }
    }
}

/// Counts a notification as pending until dropped
struct PendingGuard(Arc<AtomicUsize>);

impl PendingGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
