//! HTTP protocol layer module
//!
//! Response envelope and request parameter decoding, decoupled from the
//! comment handlers.

pub mod form;
pub mod response;

pub use form::{is_form_content_type, parse_query, parse_urlencoded};
pub use response::ApiResponse;
