//! freecomment: a blog comment server that keeps one file per comment
//!
//! Comments for a post live in `<root>/<post>/<id>`. New ids are allocated
//! with exclusive file creation, so concurrent writers never share an id.

pub mod cli;
pub mod config;
pub mod handler;
pub mod http;
pub mod integrations;
pub mod logger;
pub mod routing;
pub mod server;
pub mod store;
