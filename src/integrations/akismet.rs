// Akismet comment-check client

use async_trait::async_trait;
use std::time::Duration;

use super::{IntegrationError, SpamCheck, Submission};
use crate::config::AkismetConfig;

const USER_AGENT: &str = concat!("freecomment/", env!("CARGO_PKG_VERSION"));
const TIMEOUT_SECS: u64 = 10;

#[derive(Debug)]
pub struct Akismet {
    client: reqwest::Client,
    endpoint: String,
    blog_url: String,
    language: String,
}

impl Akismet {
    pub fn new(config: &AkismetConfig) -> Result<Self, IntegrationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("https://{}.rest.akismet.com/1.1/comment-check", config.key),
            blog_url: config.blog_url.clone(),
            language: config.language.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Form fields of a comment-check call
    pub fn fields(&self, submission: &Submission<'_>) -> Vec<(&'static str, String)> {
        let ip = if submission.client.ip.is_empty() {
            "127.0.0.1"
        } else {
            submission.client.ip.as_str()
        };
        let comment = submission.comment;
        let mut fields = vec![
            ("blog", self.blog_url.clone()),
            ("user_ip", ip.to_string()),
            ("user_agent", submission.client.user_agent.clone()),
            ("referrer", submission.client.referrer.clone()),
            ("permalink", submission.post_url.to_string()),
            ("comment_type", "comment".to_string()),
            ("comment_author", comment.author.clone()),
            ("comment_author_email", submission.email.to_string()),
            ("comment_author_url", comment.website.clone()),
            ("comment_content", comment.body.clone()),
            ("blog_charset", "UTF-8".to_string()),
        ];
        if !self.language.is_empty() {
            fields.push(("blog_lang", self.language.clone()));
        }
        fields
    }
}

#[async_trait]
impl SpamCheck for Akismet {
    async fn is_spam(&self, submission: Submission<'_>) -> Result<bool, IntegrationError> {
        let verdict = self
            .client
            .post(&self.endpoint)
            .form(&self.fields(&submission))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(verdict.trim() == "true")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::ClientInfo;
    use crate::store::Comment;
    use std::collections::BTreeMap;

    fn akismet(language: &str) -> Akismet {
        Akismet::new(&AkismetConfig {
            key: "abc123".to_string(),
            blog_url: "https://blog.example.com".to_string(),
            language: language.to_string(),
        })
        .unwrap()
    }

    fn comment() -> Comment {
        Comment {
            id: 0,
            post: "p1".to_string(),
            hash: None,
            time: "0".to_string(),
            author: "Ada".to_string(),
            gravatar: String::new(),
            website: "https://ada.example.com".to_string(),
            body: "Hello".to_string(),
            extra: BTreeMap::new(),
            missing: Vec::new(),
        }
    }

    #[test]
    fn test_endpoint_uses_key() {
        assert_eq!(
            akismet("").endpoint(),
            "https://abc123.rest.akismet.com/1.1/comment-check"
        );
    }

    #[test]
    fn test_fields() {
        let comment = comment();
        let client = ClientInfo {
            ip: "203.0.113.9".to_string(),
            user_agent: "curl/8".to_string(),
            referrer: String::new(),
        };
        let submission = Submission {
            comment: &comment,
            email: "ada@example.com",
            post_url: "https://blog.example.com/p1",
            client: &client,
        };

        let fields = akismet("en").fields(&submission);
        let get = |name: &str| {
            fields
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("user_ip"), Some("203.0.113.9"));
        assert_eq!(get("permalink"), Some("https://blog.example.com/p1"));
        assert_eq!(get("comment_content"), Some("Hello"));
        assert_eq!(get("comment_author_email"), Some("ada@example.com"));
        assert_eq!(get("blog_lang"), Some("en"));
    }

    #[test]
    fn test_missing_ip_falls_back_to_localhost() {
        let comment = comment();
        let client = ClientInfo::default();
        let submission = Submission {
            comment: &comment,
            email: "",
            post_url: "",
            client: &client,
        };
        let fields = akismet("").fields(&submission);
        assert!(fields.contains(&("user_ip", "127.0.0.1".to_string())));
        assert!(!fields.iter().any(|(k, _)| *k == "blog_lang"));
    }
}
