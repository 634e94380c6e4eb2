//! Route pattern compilation
//!
//! A pattern is a literal path with `:name` segments, e.g.
//! `/comments/:post/:comment`. Each pattern compiles to an anchored regex
//! in which literal text is escaped and every `/:name` becomes `/([^/]+)`.

use regex::Regex;
use std::collections::HashMap;

/// Named values extracted from a path
pub type ParamMap = HashMap<String, String>;

/// A compiled path pattern
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    regex: Regex,
    keys: Vec<String>,
}

impl PathPattern {
    pub fn compile(pattern: &str) -> Result<Self, regex::Error> {
        let placeholder = Regex::new(r"/:([^/]+)")?;

        let mut source = String::from("^");
        let mut keys = Vec::new();
        let mut last = 0;
        for caps in placeholder.captures_iter(pattern) {
            let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            source.push_str(&regex::escape(&pattern[last..whole.start()]));
            source.push_str("/([^/]+)");
            keys.push(key.as_str().to_string());
            last = whole.end();
        }
        source.push_str(&regex::escape(&pattern[last..]));
        source.push('$');

        Ok(Self {
            source: pattern.to_string(),
            regex: Regex::new(&source)?,
            keys,
        })
    }

    /// The pattern as registered
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Parameter names in left-to-right order
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Match a full path, pairing captures with keys positionally
    ///
    /// Returns `None` when the path does not match. Keys whose group did
    /// not capture are left out of the map.
    pub fn extract(&self, path: &str) -> Option<ParamMap> {
        let caps = self.regex.captures(path)?;
        let params = self
            .keys
            .iter()
            .enumerate()
            .filter_map(|(i, key)| {
                caps.get(i + 1)
                    .map(|value| (key.clone(), value.as_str().to_string()))
            })
            .collect();
        Some(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_pattern() {
        let pattern = PathPattern::compile("/health").unwrap();
        assert!(pattern.keys().is_empty());
        assert_eq!(pattern.extract("/health"), Some(ParamMap::new()));
        assert!(pattern.extract("/health/").is_none());
        assert!(pattern.extract("/healthz").is_none());
    }

    #[test]
    fn test_named_segments() {
        let pattern = PathPattern::compile("/comments/:post/:comment").unwrap();
        assert_eq!(pattern.keys(), ["post", "comment"]);

        let params = pattern.extract("/comments/hello-world/12").unwrap();
        assert_eq!(params["post"], "hello-world");
        assert_eq!(params["comment"], "12");

        assert!(pattern.extract("/comments/hello-world").is_none());
        assert!(pattern.extract("/comments/a/b/c").is_none());
        assert!(pattern.extract("/comments//12").is_none());
    }

    #[test]
    fn test_literal_characters_are_escaped() {
        let pattern = PathPattern::compile("/v1.0/:post/new").unwrap();
        assert!(pattern.extract("/v1.0/p1/new").is_some());
        assert!(pattern.extract("/v1x0/p1/new").is_none());
    }

    #[test]
    fn test_trailing_slash_pattern() {
        let pattern = PathPattern::compile("/comments/:post/").unwrap();
        let params = pattern.extract("/comments/p1/").unwrap();
        assert_eq!(params["post"], "p1");
        assert!(pattern.extract("/comments/p1").is_none());
    }
}
