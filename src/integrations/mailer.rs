// New-comment notification through a local sendmail binary

use async_trait::async_trait;
use regex::Regex;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{IntegrationError, Notifier};
use crate::config::NotifyConfig;
use crate::store::Comment;

const DEFAULT_SENDER_NAME: &str = "freecomment";
const DEFAULT_SENDER_ADDRESS: &str = "freecomment@localhost";
const SENDMAIL_TIMEOUT: Duration = Duration::from_secs(30);

/// Split `Name <address>` into its parts
///
/// A bare address keeps the default name; missing parts fall back to the
/// defaults.
pub fn parse_sender(from: &str) -> (String, String) {
    let from = from.trim();
    if !from.contains('<') {
        let address = if from.is_empty() { DEFAULT_SENDER_ADDRESS } else { from };
        return (DEFAULT_SENDER_NAME.to_string(), address.to_string());
    }

    let parts = Regex::new(r"^([^<]+)?<?([^>]+)>?$")
        .ok()
        .and_then(|re| {
            re.captures(from).map(|caps| {
                let part = |i: usize| caps.get(i).map_or("", |m| m.as_str().trim()).to_string();
                (part(1), part(2))
            })
        })
        .unwrap_or_default();

    let (name, address) = parts;
    let name = if name.is_empty() { DEFAULT_SENDER_NAME.to_string() } else { name };
    let address = if address.is_empty() {
        DEFAULT_SENDER_ADDRESS.to_string()
    } else {
        address
    };
    (name, address)
}

/// A plain-text mail ready for `sendmail -t`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl MailMessage {
    /// Render headers and body
    ///
    /// Header values are folded onto one line, so no value can start a
    /// header of its own.
    pub fn to_rfc822(&self) -> String {
        format!(
            "From: {}\nTo: {}\nSubject: {}\nMIME-Version: 1.0\nContent-Type: text/plain; charset=UTF-8\n\n{}\n",
            header_value(&self.from),
            header_value(&self.to),
            header_value(&self.subject),
            self.body
        )
    }
}

/// Replace control characters (CR and LF included) with spaces
fn header_value(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

#[derive(Debug, Clone)]
pub struct Sendmail {
    program: String,
    from: String,
    to: String,
    subject: String,
    timeout: Duration,
}

impl Sendmail {
    pub fn new(config: &NotifyConfig) -> Self {
        let (name, address) = parse_sender(&config.from);
        Self {
            program: config.sendmail.clone(),
            from: format!("{name} <{address}>"),
            to: config.email.clone(),
            subject: config.subject.clone(),
            timeout: SENDMAIL_TIMEOUT,
        }
    }

    /// Compose the notification for a saved comment
    ///
    /// The title falls back to the post name. Any fragment on `post_url` is
    /// replaced by the comment's anchor.
    pub fn compose(&self, comment: &Comment, post_url: &str, post_title: &str) -> MailMessage {
        let title = if post_title.is_empty() {
            comment.post.as_str()
        } else {
            post_title
        };
        let page = post_url.split('#').next().unwrap_or_default();

        let mut body = format!("A new comment has been made on \"{title}\"");
        if !page.is_empty() {
            body.push_str(&format!(" (<{page}#freecomment-{}>)", comment.id));
        }
        body.push_str(":\n\n");
        if !comment.author.is_empty() {
            body.push_str(&format!("Name: {}\n", comment.author));
        }
        if !comment.website.is_empty() {
            body.push_str(&format!("Website: {}\n", comment.website));
        }
        body.push('\n');
        body.push_str(&comment.body);

        MailMessage {
            from: self.from.clone(),
            to: self.to.clone(),
            subject: self.subject.replace("%s", title),
            body,
        }
    }
}

#[async_trait]
impl Notifier for Sendmail {
    async fn notify(
        &self,
        comment: &Comment,
        post_url: &str,
        post_title: &str,
    ) -> Result<(), IntegrationError> {
        let message = self.compose(comment, post_url, post_title);

        // Dropping the child on timeout kills it
        let mut child = Command::new(&self.program)
            .args(["-t", "-i"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        let send = async {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(message.to_rfc822().as_bytes()).await?;
            }
            child.wait().await
        };
        let status = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| IntegrationError::Timeout(self.timeout))??;

        if status.success() {
            tracing::debug!(post = %comment.post, id = comment.id, to = %self.to, "notification sent");
            Ok(())
        } else {
            Err(IntegrationError::Sendmail(status))
        }
    }
}
