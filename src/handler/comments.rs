//! Comment handlers
//!
//! Store calls touch the filesystem, so they run on the blocking pool.

use hyper::StatusCode;
use serde::Serialize;
use std::io;
use std::sync::Arc;

use crate::config::AppState;
use crate::http::ApiResponse;
use crate::integrations::Submission;
use crate::routing::Params;
use crate::store::{NewComment, StoreError, StoreResult};

const SAVE_FAILED: &str = "There was a problem saving your comment.";

/// `GET /comments/:post`
pub async fn list(state: Arc<AppState>, params: Params) -> ApiResponse {
    let post = params.path("post").to_string();
    let result = blocking(move || state.store.list(&post)).await;
    respond(result)
}

/// `GET /comments/:post/:comment`
pub async fn fetch(state: Arc<AppState>, params: Params) -> ApiResponse {
    let post = params.path("post").to_string();
    let id = params.path("comment").to_string();
    let result = blocking(move || state.store.get(&post, &id)).await;
    respond(result)
}

/// `POST /comments/:post/new`
///
/// Validation, spam check, save. The notification is sent in the
/// background and does not hold up the response.
pub async fn create(state: Arc<AppState>, params: Params) -> ApiResponse {
    let post = params.path("post").to_string();
    let submission = NewComment {
        author: params.body("author").to_string(),
        email: params.body("email").to_string(),
        website: params.body("website").to_string(),
        body: params.body("body").to_string(),
    };

    let draft = {
        let state = Arc::clone(&state);
        let post = post.clone();
        let submission = submission.clone();
        blocking(move || state.store.draft(&post, &submission)).await
    };
    let draft = match draft {
        Ok(draft) => draft,
        Err(e) => return store_error(&e),
    };

    let post_url = params.body("post_url");
    let check = Submission {
        comment: &draft,
        email: &submission.email,
        post_url,
        client: &params.client,
    };
    match state.spam.is_spam(check).await {
        Ok(false) => {}
        Ok(true) => {
            tracing::info!(post = %draft.post, ip = %params.client.ip, "comment rejected as spam");
            return ApiResponse::error(StatusCode::INTERNAL_SERVER_ERROR, SAVE_FAILED);
        }
        Err(e) => tracing::warn!(error = %e, "spam check failed, accepting comment"),
    }

    let saved = {
        let state = Arc::clone(&state);
        blocking(move || state.store.insert(&post, draft)).await
    };
    let comment = match saved {
        Ok(comment) => comment,
        Err(e) => return store_error(&e),
    };

    state.notify_in_background(
        comment.clone(),
        post_url.to_string(),
        params.body("post_title").to_string(),
    );

    ApiResponse::json(StatusCode::OK, &comment)
}

async fn blocking<T, F>(f: F) -> StoreResult<T>
where
    F: FnOnce() -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .unwrap_or_else(|e| Err(StoreError::Io(io::Error::other(e))))
}

fn respond<T: Serialize>(result: StoreResult<T>) -> ApiResponse {
    match result {
        Ok(value) => ApiResponse::json(StatusCode::OK, &value),
        Err(e) => store_error(&e),
    }
}

fn store_error(error: &StoreError) -> ApiResponse {
    let status = error.status();
    if status >= 500 {
        tracing::error!(error = %error, "store failure");
    }
    ApiResponse::error_code(status, &error.public_message())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::integrations::{IntegrationError, NoNotifier, NoSpamCheck, Notifier, SpamCheck};
    use crate::store::Comment;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    struct AlwaysSpam;

    #[async_trait]
    impl SpamCheck for AlwaysSpam {
        async fn is_spam(&self, _: Submission<'_>) -> Result<bool, IntegrationError> {
            Ok(true)
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(u64, String, String)>>);

    #[async_trait]
    impl Notifier for Recorder {
        async fn notify(
            &self,
            comment: &Comment,
            post_url: &str,
            post_title: &str,
        ) -> Result<(), IntegrationError> {
            self.0.lock().unwrap().push((
                comment.id,
                post_url.to_string(),
                post_title.to_string(),
            ));
            Err(IntegrationError::Io(io::Error::other("mail is down")))
        }
    }

    struct Stalled;

    #[async_trait]
    impl Notifier for Stalled {
        async fn notify(&self, _: &Comment, _: &str, _: &str) -> Result<(), IntegrationError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    fn state_with(
        spam: Arc<dyn SpamCheck>,
        notifier: Arc<dyn Notifier>,
    ) -> (TempDir, Arc<AppState>) {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("p1")).unwrap();
        let mut config = Config::default();
        config.comments.root = temp_dir.path().to_string_lossy().into_owned();
        let state = AppState::with_integrations(config, spam, notifier);
        (temp_dir, Arc::new(state))
    }

    fn create_params(body: &str) -> Params {
        let mut params = Params::default();
        params.path.insert("post".to_string(), "p1".to_string());
        params.body.insert("body".to_string(), body.to_string());
        params
            .body
            .insert("post_url".to_string(), "https://blog/p1".to_string());
        params
            .body
            .insert("post_title".to_string(), "Post One".to_string());
        params
    }

    #[tokio::test]
    async fn test_spam_rejection_writes_nothing() {
        let (tmp, state) = state_with(Arc::new(AlwaysSpam), Arc::new(NoNotifier));
        let response = create(state, create_params("Buy now")).await;
        assert_eq!(response.status_code(), 500);
        assert!(response.body.contains(SAVE_FAILED));
        assert_eq!(fs::read_dir(tmp.path().join("p1")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_create() {
        let recorder = Arc::new(Recorder::default());
        let (_tmp, state) = state_with(Arc::new(NoSpamCheck), recorder.clone());

        let response = create(Arc::clone(&state), create_params("Hello")).await;
        assert_eq!(response.status_code(), 200);
        assert_eq!(state.wait_for_notifications(Duration::from_secs(5)).await, 0);
        let calls = recorder.0.lock().unwrap();
        assert_eq!(
            *calls,
            vec![(1, "https://blog/p1".to_string(), "Post One".to_string())]
        );
    }

    #[tokio::test]
    async fn test_slow_notifier_does_not_delay_create() {
        let (tmp, state) = state_with(Arc::new(NoSpamCheck), Arc::new(Stalled));

        let response = tokio::time::timeout(
            Duration::from_secs(2),
            create(Arc::clone(&state), create_params("Hello")),
        )
        .await
        .expect("create waited for the notifier");
        assert_eq!(response.status_code(), 200);
        assert!(tmp.path().join("p1").join("1").is_file());
        assert_eq!(state.pending_notifications(), 1);
    }

    #[tokio::test]
    async fn test_empty_body_is_bad_request() {
        let (_tmp, state) = state_with(Arc::new(NoSpamCheck), Arc::new(NoNotifier));
        let response = create(state, create_params("  ")).await;
        assert_eq!(response.status_code(), 400);
        let body: serde_json::Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["error"], "The comment may not be empty.");
    }

    #[tokio::test]
    async fn test_fetch_missing_comment() {
        let (_tmp, state) = state_with(Arc::new(NoSpamCheck), Arc::new(NoNotifier));
        let mut params = Params::default();
        params.path.insert("post".to_string(), "p1".to_string());
        params.path.insert("comment".to_string(), "8".to_string());
        let response = fetch(state, params).await;
        assert_eq!(response.status_code(), 404);
        assert!(response.body.contains("This comment does not exist."));
    }
}
