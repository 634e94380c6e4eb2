// Configuration types module
// Defines all configuration-related data structures

use serde::{Deserialize, Serialize};

use crate::store::HashAlgorithm;

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub comments: CommentsConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub akismet: AkismetConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// Server configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            workers: None,
        }
    }
}

/// Comment storage
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CommentsConfig {
    /// Directory holding one sub-directory per post
    pub root: String,
    /// Router mount point, empty for the site root
    #[serde(default)]
    pub url_prefix: String,
    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,
}

impl Default for CommentsConfig {
    fn default() -> Self {
        Self {
            root: "comments".to_string(),
            url_prefix: String::new(),
            hash_algorithm: HashAlgorithm::default(),
        }
    }
}

/// HTTP configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    /// `X-Powered-By` value, empty suppresses the header
    pub powered_by: String,
    pub enable_cors: bool,
    pub max_body_size: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            powered_by: "freecomment".to_string(),
            enable_cors: false,
            max_body_size: 65_536,
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: bool,
    #[serde(default)]
    pub access_log_format: AccessLogFormat,
    /// Log file path (optional, stderr if not set)
    #[serde(default)]
    pub log_file: Option<String>,
}

/// Layout of access log lines
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccessLogFormat {
    /// Common Log Format plus referer and user agent
    #[default]
    Combined,
    Common,
    Json,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            access_log: true,
            access_log_format: AccessLogFormat::default(),
            log_file: None,
        }
    }
}

/// Performance configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PerformanceConfig {
    pub keep_alive_timeout: u64,
    pub read_timeout: u64,
    pub write_timeout: u64,
    pub max_connections: Option<u64>,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            keep_alive_timeout: 75,
            read_timeout: 30,
            write_timeout: 30,
            max_connections: None,
        }
    }
}

/// Akismet spam check, active when both `key` and `blog_url` are set
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AkismetConfig {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub blog_url: String,
    #[serde(default)]
    pub language: String,
}

impl AkismetConfig {
    pub fn is_enabled(&self) -> bool {
        !self.key.is_empty() && !self.blog_url.is_empty()
    }
}

/// New-comment notification mail
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NotifyConfig {
    /// Recipient, empty disables notifications
    #[serde(default)]
    pub email: String,
    /// Sender as `Name <address>`
    #[serde(default = "default_notify_from")]
    pub from: String,
    /// `%s` is replaced by the post title
    #[serde(default = "default_notify_subject")]
    pub subject: String,
    #[serde(default = "default_sendmail")]
    pub sendmail: String,
}

#[allow(clippy::missing_const_for_fn)]
fn default_notify_from() -> String {
    "freecomment <freecomment@localhost>".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_notify_subject() -> String {
    "New comment on \"%s\"".to_string()
}

#[allow(clippy::missing_const_for_fn)]
fn default_sendmail() -> String {
    "sendmail".to_string()
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            email: String::new(),
            from: default_notify_from(),
            subject: default_notify_subject(),
            sendmail: default_sendmail(),
        }
    }
}

impl NotifyConfig {
    pub fn is_enabled(&self) -> bool {
        !self.email.is_empty()
    }
}
