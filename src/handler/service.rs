//! HTTP entry point
//!
//! Turns a hyper request into a [`RouteRequest`], dispatches it and
//! converts the result back, writing one access log line per request.

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::HeaderMap;
use hyper::{Method, Request, Response};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use super::App;
use crate::http::{self, ApiResponse};
use crate::logger::{self, AccessLogEntry};
use crate::routing::{ClientInfo, ParamMap, RouteRequest};

/// Main entry point for HTTP request handling
pub async fn handle_request(
    req: Request<Incoming>,
    app: Arc<App>,
    peer: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let config = &app.state().config;

    let method = req.method().clone();
    let uri = req.uri().clone();
    let version = req.version();
    let is_head = method == Method::HEAD;
    let client = client_info(req.headers(), peer);

    let mut response = if method == Method::OPTIONS && config.http.enable_cors {
        ApiResponse::preflight()
    } else if let Some(resp) = check_body_size(req.headers(), config.http.max_body_size) {
        resp
    } else {
        let form = is_form_body(req.headers());
        match read_body(req.into_body(), config.http.max_body_size).await {
            Ok(body) => {
                let request = RouteRequest {
                    // HEAD is answered by the GET route without a body
                    method: if is_head { "GET".to_string() } else { method.to_string() },
                    path: uri.path().to_string(),
                    query: http::parse_query(uri.query()),
                    body: if form { http::parse_urlencoded(&body) } else { ParamMap::new() },
                    client: client.clone(),
                };
                app.dispatch(request).await
            }
            Err(resp) => resp,
        }
    };

    if config.http.enable_cors {
        response = response.with_header("Access-Control-Allow-Origin", "*");
    }

    if config.logging.access_log {
        let mut entry = AccessLogEntry::new(client.ip, method.to_string(), uri.path().to_string());
        entry.query = uri.query().map(ToString::to_string);
        entry.http_version = http_version(version).to_string();
        entry.status = response.status_code();
        entry.body_bytes = if is_head { 0 } else { response.body.len() };
        entry.referer = non_empty(client.referrer);
        entry.user_agent = non_empty(client.user_agent);
        entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        logger::log_access(&entry, config.logging.access_log_format);
    }

    Ok(response.into_hyper(is_head))
}

/// Client address and headers integrations care about
///
/// The first `X-Forwarded-For` entry wins over the socket peer.
fn client_info(headers: &HeaderMap, peer: SocketAddr) -> ClientInfo {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string()
    };
    let forwarded = header("x-forwarded-for");
    let ip = forwarded
        .split(',')
        .next()
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map_or_else(|| peer.ip().to_string(), ToString::to_string);

    ClientInfo {
        ip,
        user_agent: header("user-agent"),
        referrer: header("referer"),
    }
}

/// Form bodies are parsed when declared as such or when untyped
fn is_form_body(headers: &HeaderMap) -> bool {
    match headers.get("content-type") {
        None => true,
        Some(value) => http::is_form_content_type(value.to_str().ok()),
    }
}

/// Validate Content-Length header and return 413 if exceeded
fn check_body_size(headers: &HeaderMap, max_body_size: u64) -> Option<ApiResponse> {
    let content_length = headers.get("content-length")?;
    content_length.to_str().map_or_else(
        |_| {
            logger::log_warning("Content-Length header contains non-ASCII characters");
            None
        },
        |size_str| match size_str.parse::<u64>() {
            Ok(size) if size > max_body_size => {
                logger::log_warning(&format!(
                    "Request body too large: {size} bytes (max: {max_body_size})"
                ));
                Some(ApiResponse::payload_too_large())
            }
            Err(_) => {
                logger::log_warning(&format!(
                    "Invalid Content-Length value: '{size_str}', skipping size check"
                ));
                None
            }
            _ => None,
        },
    )
}

/// Collect the request body, enforcing the limit for chunked uploads too
async fn read_body(body: Incoming, max_body_size: u64) -> Result<Bytes, ApiResponse> {
    let limit = usize::try_from(max_body_size).unwrap_or(usize::MAX);
    match http_body_util::Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) => {
            if e.is::<http_body_util::LengthLimitError>() {
                logger::log_warning(&format!("Request body exceeded {max_body_size} bytes"));
                Err(ApiResponse::payload_too_large())
            } else {
                logger::log_error(&format!("Failed to read request body: {e}"));
                Err(ApiResponse::error(
                    hyper::StatusCode::BAD_REQUEST,
                    "Bad Request",
                ))
            }
        }
    }
}

const fn http_version(version: hyper::Version) -> &'static str {
    match version {
        hyper::Version::HTTP_10 => "1.0",
        hyper::Version::HTTP_2 => "2",
        _ => "1.1",
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}
