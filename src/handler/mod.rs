//! Request handler module
//!
//! Route table, comment handlers and the hyper entry point.

pub mod comments;
pub mod service;

use std::sync::Arc;

use crate::config::AppState;
use crate::http::ApiResponse;
use crate::routing::{RouteRequest, Router, RouterError};

pub use service::handle_request;

/// List aliases, in matching order
pub const LIST_ROUTES: &[&str] = &[
    "/comments/:post",
    "/comments/:post/",
    "/get/:post",
    "/list/:post",
];
/// Single-comment aliases
pub const FETCH_ROUTES: &[&str] = &["/comments/:post/:comment", "/get/:post/:comment"];
/// Creation aliases
pub const CREATE_ROUTES: &[&str] = &["/comments/:post/new", "/add/:post"];

/// Register every comment route on a router
pub fn build_router(
    prefix: &str,
    powered_by: Option<String>,
) -> Result<Router<AppState>, RouterError> {
    let mut router = Router::new()
        .with_prefix(prefix)
        .with_powered_by(powered_by);
    router
        .get(LIST_ROUTES, comments::list)?
        .get(FETCH_ROUTES, comments::fetch)?
        .post(CREATE_ROUTES, comments::create)?;
    Ok(router)
}

/// Router plus the state it dispatches into
///
/// Shared by the network server and the `request` command.
pub struct App {
    state: Arc<AppState>,
    router: Router<AppState>,
}

impl App {
    pub fn new(state: AppState) -> Result<Self, RouterError> {
        let router = build_router(
            &state.config.comments.url_prefix,
            Some(state.config.http.powered_by.clone()),
        )?;
        Ok(Self {
            state: Arc::new(state),
            router,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn dispatch(&self, request: RouteRequest) -> ApiResponse {
        self.router.dispatch(Arc::clone(&self.state), request).await
    }
}
