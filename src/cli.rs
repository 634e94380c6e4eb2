//! Command line interface
//!
//! `serve` runs the HTTP server; `request` pushes one synthesized request
//! through the same router without opening a socket.

use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{AppState, Config};
use crate::handler::App;
use crate::http::{self, ApiResponse};
use crate::integrations::IntegrationError;
use crate::logger;
use crate::routing::{ClientInfo, RouteRequest, RouterError};
use crate::server;
use crate::store::{Comment, HashAlgorithm};

/// How long to wait for background notifications before exiting
const NOTIFY_GRACE: Duration = Duration::from_secs(35);

#[derive(Parser, Debug)]
#[command(name = "freecomment")]
#[command(about = "A minimalist blog comment server")]
#[command(version)]
pub struct Cli {
    /// Configuration file (extension optional)
    #[arg(short, long, global = true, default_value = "freecomment")]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve,
    /// Route a single request and print the response body
    Request(RequestArgs),
    /// Print the canonical hash of a comment file
    Hash(HashArgs),
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args, Debug, Clone)]
pub struct RequestArgs {
    /// Request path, optionally with a query string
    pub path: String,

    /// HTTP method
    #[arg(default_value = "GET")]
    pub method: String,

    /// Query string, e.g. `page=2`
    pub query: Option<String>,

    /// Urlencoded form body, e.g. `author=Ada&body=Hello`
    pub form: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct HashArgs {
    /// Comment file
    pub file: PathBuf,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("{0}")]
    Address(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Integration setup failed: {0}")]
    Integration(#[from] IntegrationError),
    #[error("Route setup failed: {0}")]
    Router(#[from] RouterError),
    #[error("Could not render configuration: {0}")]
    Toml(#[from] toml::ser::Error),
    #[error("{} is not a comment", .0.display())]
    NotAComment(PathBuf),
}

/// Run the parsed command line
pub fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let config = Config::load_from(&cli.config)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            logger::init(&config.logging)?;
            serve(config)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Request(args) => {
            logger::init(&config.logging)?;
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let response = runtime.block_on(async {
                let app = App::new(AppState::new(config)?)?;
                let response = request(&app, &args).await;
                finish_notifications(app.state()).await;
                Ok::<_, CliError>(response)
            })?;
            println!("{}", response.body);
            Ok(exit_code(response.status_code()))
        }
        Commands::Hash(args) => match hash_file(&args.file, config.comments.hash_algorithm) {
            Ok(hash) => {
                println!("{hash}");
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                eprintln!("freecomment: {e}");
                Ok(ExitCode::FAILURE)
            }
        },
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Build the runtime and serve until SIGINT/SIGTERM
fn serve(config: Config) -> Result<(), CliError> {
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = config.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build()?;

    runtime.block_on(async move {
        let addr = config.socket_addr().map_err(CliError::Address)?;
        let listener = server::create_reusable_listener(addr)?;
        logger::log_server_start(&addr, &config);

        let app = Arc::new(App::new(AppState::new(config)?)?);
        let signals = Arc::new(server::SignalHandler::new());
        server::start_signal_handler(Arc::clone(&signals));

        server::run_server_loop(listener, Arc::clone(&app), Arc::clone(&signals.shutdown)).await;
        finish_notifications(app.state()).await;
        Ok(())
    })
}

async fn finish_notifications(state: &AppState) {
    let unsent = state.wait_for_notifications(NOTIFY_GRACE).await;
    if unsent > 0 {
        logger::log_warning(&format!("Exiting with {unsent} notification(s) unsent"));
    }
}

/// Route one synthesized request
///
/// A query string embedded in `path` is merged with `args.query`, the
/// latter winning on conflicts.
pub async fn request(app: &App, args: &RequestArgs) -> ApiResponse {
    let (path, embedded_query) = match args.path.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (args.path.as_str(), None),
    };
    let mut query = http::parse_query(embedded_query);
    query.extend(http::parse_query(args.query.as_deref()));

    let request = RouteRequest {
        method: args.method.clone(),
        path: path.to_string(),
        query,
        body: http::parse_query(args.form.as_deref()),
        client: ClientInfo {
            ip: "127.0.0.1".to_string(),
            ..ClientInfo::default()
        },
    };
    app.dispatch(request).await
}

/// Canonical hash of a stored comment file
///
/// The file's own `id` and `post` fields are used as they are.
pub fn hash_file(path: &Path, algorithm: HashAlgorithm) -> Result<String, CliError> {
    let content = fs::read_to_string(path)?;
    let not_a_comment = || CliError::NotAComment(path.to_path_buf());

    let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(&content) else {
        return Err(not_a_comment());
    };
    let id = fields.get("id").and_then(Value::as_u64).unwrap_or_default();
    let post = fields.get("post").and_then(Value::as_str).unwrap_or_default();

    let comment = Comment::from_stored(&content, id, post).map_err(|_| not_a_comment())?;
    Ok(comment.compute_hash(algorithm))
}

/// Statuses of 400 and above exit with 1
pub fn exit_code(status: u16) -> ExitCode {
    ExitCode::from(exit_status(status))
}

const fn exit_status(status: u16) -> u8 {
    if status >= 400 {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn app_with_root(root: &Path) -> App {
        let mut config = Config::default();
        config.comments.root = root.to_string_lossy().into_owned();
        App::new(AppState::new(config).unwrap()).unwrap()
    }

    fn args(path: &str, method: &str, form: Option<&str>) -> RequestArgs {
        RequestArgs {
            path: path.to_string(),
            method: method.to_string(),
            query: None,
            form: form.map(ToString::to_string),
        }
    }

    #[test]
    fn test_parse_request_command() {
        let cli = Cli::parse_from([
            "freecomment",
            "--config",
            "site.toml",
            "request",
            "/comments/p1/new",
            "POST",
            "",
            "body=Hi",
        ]);
        assert_eq!(cli.config, "site.toml");
        match cli.command {
            Some(Commands::Request(args)) => {
                assert_eq!(args.path, "/comments/p1/new");
                assert_eq!(args.method, "POST");
                assert_eq!(args.form.as_deref(), Some("body=Hi"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_default_command_is_serve() {
        let cli = Cli::parse_from(["freecomment"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.config, "freecomment");
    }

    #[tokio::test]
    async fn test_request_round_trip() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("p1")).unwrap();
        let app = app_with_root(tmp.path());

        let created = request(&app, &args("/comments/p1/new", "POST", Some("body=Hello"))).await;
        assert_eq!(created.status_code(), 200);

        let listed = request(&app, &args("/comments/p1?x=1", "GET", None)).await;
        let body: Value = serde_json::from_str(&listed.body).unwrap();
        assert_eq!(body["comments"][0]["body"], "Hello");

        let missing = request(&app, &args("/comments/ghost", "GET", None)).await;
        assert_eq!(exit_status(missing.status_code()), 1);
        assert_eq!(exit_status(created.status_code()), 0);
    }

    #[test]
    fn test_hash_file_uses_stored_post() {
        let tmp = TempDir::new().unwrap();
        let mut comment =
            Comment::from_stored(r#"{"body": "Hello", "author": "Ada"}"#, 4, "p1").unwrap();
        let expected = comment.rehash(HashAlgorithm::Sha1).to_string();
        let path = tmp.path().join("4");
        fs::write(&path, serde_json::to_string_pretty(&comment).unwrap()).unwrap();

        assert_eq!(hash_file(&path, HashAlgorithm::Sha1).unwrap(), expected);
    }

    #[test]
    fn test_hash_file_rejects_tombstones() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("2");
        fs::write(&path, "410 removed").unwrap();
        assert!(matches!(
            hash_file(&path, HashAlgorithm::Sha1),
            Err(CliError::NotAComment(_))
        ));
        assert!(matches!(
            hash_file(&tmp.path().join("missing"), HashAlgorithm::Sha1),
            Err(CliError::Io(_))
        ));
    }
}
