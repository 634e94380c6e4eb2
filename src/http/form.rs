//! Query string and form body parsing

use crate::routing::ParamMap;
use url::form_urlencoded;

/// Decode `application/x-www-form-urlencoded` data
///
/// Later occurrences of a key replace earlier ones.
pub fn parse_urlencoded(input: &[u8]) -> ParamMap {
    form_urlencoded::parse(input).into_owned().collect()
}

/// Decode an optional query string
pub fn parse_query(query: Option<&str>) -> ParamMap {
    query.map_or_else(ParamMap::new, |q| parse_urlencoded(q.as_bytes()))
}

/// Whether a `Content-Type` header names a urlencoded form
pub fn is_form_content_type(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| {
        ct.split(';')
            .next()
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/x-www-form-urlencoded"))
    })
}
