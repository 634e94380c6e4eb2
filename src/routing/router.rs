//! Request router
//!
//! Routes are `(method, pattern) -> handler` bindings tried in
//! registration order; the first one whose method matches
//! (case-insensitively) and whose pattern matches the whole path wins.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use super::pattern::{ParamMap, PathPattern};
use crate::http::ApiResponse;

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("Invalid route pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Who sent the request, for integrations that need it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: String,
    pub referrer: String,
}

/// A request as the router sees it, from hyper or from the command line
#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
    pub method: String,
    pub path: String,
    pub query: ParamMap,
    pub body: ParamMap,
    pub client: ClientInfo,
}

impl RouteRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: ParamMap) -> Self {
        self.body = body;
        self
    }

    #[must_use]
    pub fn with_query(mut self, query: ParamMap) -> Self {
        self.query = query;
        self
    }
}

/// Everything a handler receives
#[derive(Debug, Clone, Default)]
pub struct Params {
    pub path: ParamMap,
    pub query: ParamMap,
    pub body: ParamMap,
    pub client: ClientInfo,
}

impl Params {
    pub fn path(&self, key: &str) -> &str {
        self.path.get(key).map_or("", String::as_str)
    }

    pub fn body(&self, key: &str) -> &str {
        self.body.get(key).map_or("", String::as_str)
    }
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = ApiResponse> + Send>>;
type Handler<S> = Arc<dyn Fn(Arc<S>, Params) -> HandlerFuture + Send + Sync>;

struct Route<S> {
    method: String,
    pattern: PathPattern,
    handler: Handler<S>,
}

/// Path-based router over shared state `S`
pub struct Router<S> {
    prefix: String,
    powered_by: Option<String>,
    routes: Vec<Route<S>>,
}

impl<S> Default for Router<S> {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            powered_by: None,
            routes: Vec::new(),
        }
    }
}

impl<S: Send + Sync + 'static> Router<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only answer paths below `prefix`; everything else is a 404
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Value of the `X-Powered-By` header; `None` or empty suppresses it
    #[must_use]
    pub fn with_powered_by(mut self, name: Option<String>) -> Self {
        self.powered_by = name.filter(|n| !n.is_empty());
        self
    }

    /// Register `handler` for each pattern, in order
    ///
    /// Every alias becomes an independent route sharing the callback.
    pub fn route<F, Fut>(
        &mut self,
        method: &str,
        patterns: &[&str],
        handler: F,
    ) -> Result<&mut Self, RouterError>
    where
        F: Fn(Arc<S>, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResponse> + Send + 'static,
    {
        let handler: Handler<S> =
            Arc::new(move |state, params| Box::pin(handler(state, params)) as HandlerFuture);
        for pattern in patterns {
            let compiled =
                PathPattern::compile(pattern).map_err(|source| RouterError::InvalidPattern {
                    pattern: (*pattern).to_string(),
                    source,
                })?;
            self.routes.push(Route {
                method: method.to_ascii_uppercase(),
                pattern: compiled,
                handler: Arc::clone(&handler),
            });
        }
        Ok(self)
    }

    pub fn get<F, Fut>(&mut self, patterns: &[&str], handler: F) -> Result<&mut Self, RouterError>
    where
        F: Fn(Arc<S>, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResponse> + Send + 'static,
    {
        self.route("GET", patterns, handler)
    }

    pub fn post<F, Fut>(&mut self, patterns: &[&str], handler: F) -> Result<&mut Self, RouterError>
    where
        F: Fn(Arc<S>, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResponse> + Send + 'static,
    {
        self.route("POST", patterns, handler)
    }

    /// Registered `(method, pattern)` pairs in matching order
    pub fn routes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.routes
            .iter()
            .map(|r| (r.method.as_str(), r.pattern.as_str()))
    }

    /// Strip the mount prefix, `None` when the path is outside it
    fn local_path<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.prefix.is_empty() {
            Some(path)
        } else {
            path.strip_prefix(self.prefix.as_str())
        }
    }

    /// Find the first matching route and its path parameters
    fn resolve(&self, method: &str, path: &str) -> Option<(&Route<S>, ParamMap)> {
        self.routes
            .iter()
            .filter(|route| route.method.eq_ignore_ascii_case(method))
            .find_map(|route| route.pattern.extract(path).map(|params| (route, params)))
    }

    /// Route a request and run its handler
    pub async fn dispatch(&self, state: Arc<S>, request: RouteRequest) -> ApiResponse {
        let path = if request.path.starts_with('/') {
            request.path.clone()
        } else {
            format!("/{}", request.path)
        };

        let method = if request.method.is_empty() {
            "GET"
        } else {
            request.method.as_str()
        };

        let resolved = self
            .local_path(&path)
            .and_then(|local| self.resolve(method, local));

        let response = match resolved {
            Some((route, path_params)) => {
                let params = Params {
                    path: path_params,
                    query: request.query,
                    body: request.body,
                    client: request.client,
                };
                (route.handler)(state, params).await
            }
            None => ApiResponse::not_found(),
        };

        match &self.powered_by {
            Some(name) => response.with_header("X-Powered-By", name.clone()),
            None => response,
        }
    }
}
