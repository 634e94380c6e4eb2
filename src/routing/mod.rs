//! Routing module
//!
//! Path-pattern routing with named `:param` segments:
//! - Patterns compile to anchored regexes
//! - Routes are tried in registration order, first match wins
//! - An optional prefix mounts the router under a sub-path

mod pattern;
mod router;

pub use pattern::{ParamMap, PathPattern};
pub use router::{ClientInfo, HandlerFuture, Params, RouteRequest, Router, RouterError};
