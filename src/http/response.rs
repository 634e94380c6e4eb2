//! HTTP response building module
//!
//! Handlers produce an [`ApiResponse`]; it is converted to a hyper
//! response only at the connection boundary so the same value can be
//! printed by the command line.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::ext::ReasonPhrase;
use hyper::{Response, StatusCode};
use serde::Serialize;

const JSON: &str = "application/json";

/// Status, headers and serialized body of a routed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
}

impl ApiResponse {
    /// Pretty-printed JSON body
    pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Self {
        match serde_json::to_string_pretty(body) {
            Ok(json) => Self {
                status,
                content_type: JSON,
                headers: Vec::new(),
                body: json,
            },
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize response");
                Self::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.")
            }
        }
    }

    /// Error envelope `{"error": message, "code": status}`
    pub fn error(status: StatusCode, message: &str) -> Self {
        let body = serde_json::json!({
            "error": message,
            "code": status.as_u16(),
        });
        Self {
            status,
            content_type: JSON,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    /// Error envelope for a raw status code
    ///
    /// Codes outside the valid HTTP range fall back to 410 Gone.
    pub fn error_code(code: u16, message: &str) -> Self {
        Self::error(StatusCode::from_u16(code).unwrap_or(StatusCode::GONE), message)
    }

    pub fn not_found() -> Self {
        Self::error(StatusCode::NOT_FOUND, "Not Found")
    }

    pub fn payload_too_large() -> Self {
        Self::error(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large")
    }

    /// 204 answer to a CORS preflight
    pub fn preflight() -> Self {
        Self {
            status: StatusCode::NO_CONTENT,
            content_type: JSON,
            headers: vec![
                ("Allow", "GET, POST, OPTIONS".to_string()),
                ("Access-Control-Allow-Methods", "GET, POST, OPTIONS".to_string()),
                ("Access-Control-Allow-Headers", "Content-Type".to_string()),
                ("Access-Control-Max-Age", "86400".to_string()),
            ],
            body: String::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub const fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Convert into a hyper response
    ///
    /// 451 always carries the literal reason phrase
    /// "Unavailable For Legal Reasons".
    pub fn into_hyper(self, is_head: bool) -> Response<Full<Bytes>> {
        let content_length = self.body.len();
        let mut builder = Response::builder()
            .status(self.status)
            .header("Content-Length", content_length);
        if !self.body.is_empty() {
            builder = builder.header("Content-Type", self.content_type);
        }
        for (name, value) in &self.headers {
            builder = builder.header(*name, value.as_str());
        }
        if self.status == StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS {
            builder = builder.extension(ReasonPhrase::from_static(
                b"Unavailable For Legal Reasons",
            ));
        }

        let body = if is_head {
            Bytes::new()
        } else {
            Bytes::from(self.body)
        };
        builder.body(Full::new(body)).unwrap_or_else(|e| {
            log_build_error(self.status, &e);
            let mut fallback = Response::new(Full::new(Bytes::new()));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
    }
}

/// Log response build error
fn log_build_error(status: StatusCode, error: &hyper::http::Error) {
    tracing::error!(%status, error = %error, "failed to build response");
}
