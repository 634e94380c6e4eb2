// Connection handling module
// Accepts a single TCP connection and serves it with hyper

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::StatusCode;
use hyper_util::rt::{TokioIo, TokioTimer};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

use crate::config::PerformanceConfig;
use crate::handler::{self, App};
use crate::http::ApiResponse;
use crate::logger;

/// Accept a connection unless the connection limit is reached
///
/// Returns `false` when the connection was rejected.
pub fn accept_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    app: &Arc<App>,
    conn_counter: &Arc<AtomicUsize>,
) -> bool {
    // Increment first, then check, so two accepts cannot both slip in
    let prev_count = conn_counter.fetch_add(1, Ordering::SeqCst);

    if let Some(max_conn) = app.state().config.performance.max_connections {
        if prev_count >= usize::try_from(max_conn).unwrap_or(usize::MAX) {
            conn_counter.fetch_sub(1, Ordering::SeqCst);
            logger::log_warning(&format!(
                "Max connections reached: {prev_count}/{max_conn}. Connection from {peer_addr} rejected."
            ));
            drop(stream);
            return false;
        }
    }

    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(peer = %peer_addr, error = %e, "could not set TCP_NODELAY");
    }
    tracing::debug!(peer = %peer_addr, "connection accepted");
    handle_connection(stream, peer_addr, Arc::clone(app), Arc::clone(conn_counter));
    true
}

/// Idle limit while waiting for the next request head
///
/// With keep-alive this is `keep_alive_timeout`, otherwise `read_timeout`.
fn idle_timeout(performance: &PerformanceConfig) -> Duration {
    if performance.keep_alive_timeout > 0 {
        Duration::from_secs(performance.keep_alive_timeout)
    } else {
        Duration::from_secs(performance.read_timeout.max(1))
    }
}

/// Budget for handling one request, the larger of the read and write timeouts
fn request_timeout(performance: &PerformanceConfig) -> Duration {
    Duration::from_secs(std::cmp::max(performance.read_timeout, performance.write_timeout).max(1))
}

/// Serve one connection in its own task.
///
/// The counter is decremented when the task ends.
fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    app: Arc<App>,
    conn_counter: Arc<AtomicUsize>,
) {
    tokio::spawn(async move {
        let io = TokioIo::new(stream);

        let performance = &app.state().config.performance;
        let per_request = request_timeout(performance);

        let mut builder = http1::Builder::new();
        builder
            .timer(TokioTimer::new())
            .keep_alive(performance.keep_alive_timeout > 0)
            .header_read_timeout(idle_timeout(performance));

        let service_app = Arc::clone(&app);
        let conn = builder.serve_connection(
            io,
            service_fn(move |req| {
                let app = Arc::clone(&service_app);
                async move {
                    let handled = handler::handle_request(req, app, peer_addr);
                    match tokio::time::timeout(per_request, handled).await {
                        Ok(response) => response,
                        Err(_) => {
                            logger::log_warning(&format!(
                                "Request from {peer_addr} timed out after {} seconds",
                                per_request.as_secs()
                            ));
                            Ok(ApiResponse::error(
                                StatusCode::SERVICE_UNAVAILABLE,
                                "The request took too long.",
                            )
                            .into_hyper(false))
                        }
                    }
                }
            }),
        );

        if let Err(err) = conn.await {
            logger::log_connection_error(&err);
        }

        conn_counter.fetch_sub(1, Ordering::SeqCst);
    });
}
