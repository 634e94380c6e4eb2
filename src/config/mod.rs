// Configuration module entry point
// Loads layered configuration and builds the shared application state

mod state;
mod types;

use std::net::SocketAddr;

pub use state::AppState;
pub use types::{
    AccessLogFormat, AkismetConfig, CommentsConfig, Config, HttpConfig, LoggingConfig, NotifyConfig,
    PerformanceConfig, ServerConfig,
};

/// Environment variables look like `FREECOMMENT_COMMENTS__ROOT`
const ENV_PREFIX: &str = "FREECOMMENT";

impl Config {
    /// Load configuration from specified file path (extension optional)
    ///
    /// A missing file is not an error; environment variables override the
    /// file and every key has a default.
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("comments.root", "comments")?
            .set_default("comments.url_prefix", "")?
            .set_default("comments.hash_algorithm", "sha1")?
            .set_default("http.powered_by", "freecomment")?
            .set_default("http.enable_cors", false)?
            .set_default("http.max_body_size", 65_536)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("logging.access_log_format", "combined")?
            .set_default("performance.keep_alive_timeout", 75)?
            .set_default("performance.read_timeout", 30)?
            .set_default("performance.write_timeout", 30)?
            .set_default("akismet.key", "")?
            .set_default("akismet.blog_url", "")?
            .set_default("akismet.language", "")?
            .set_default("notify.email", "")?
            .set_default("notify.from", "freecomment <freecomment@localhost>")?
            .set_default("notify.subject", "New comment on \"%s\"")?
            .set_default("notify.sendmail", "sendmail")?
            .build()?;

        settings.try_deserialize()
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }
}
