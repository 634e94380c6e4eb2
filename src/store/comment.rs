//! Comment records
//!
//! A comment is persisted as pretty-printed JSON. The `id` and `post`
//! fields inside the file are never trusted: both are re-stamped from the
//! file's location every time a record is loaded.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const REMOVED_MESSAGE: &str = "This comment has been removed.";

/// Content fields every new record is written with
const STANDARD_FIELDS: [&str; 5] = ["time", "author", "gravatar", "website", "body"];

/// Digest used for the canonical comment hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    #[default]
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }

    /// Lowercase hex digest of `data`
    pub fn hex_digest(self, data: &[u8]) -> String {
        match self {
            Self::Md5 => format!("{:x}", md5::compute(data)),
            Self::Sha1 => format!("{:x}", Sha1::digest(data)),
            Self::Sha256 => format!("{:x}", Sha256::digest(data)),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            other => Err(format!("Unsupported hash algorithm: {other}")),
        }
    }
}

/// A stored comment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub post: String,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub time: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub author: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub gravatar: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub website: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub body: String,
    /// Fields written by other tools are kept and take part in the hash
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
    /// Standard fields the stored file did not have; they stay out of the hash
    #[serde(skip)]
    pub(crate) missing: Vec<&'static str>,
}

impl Comment {
    /// Parse stored file content, stamping the path-derived `id` and `post`
    ///
    /// Anything that is not a JSON object with the expected field types
    /// comes back as a [`Tombstone`] holding the raw content.
    pub fn from_stored(content: &str, id: u64, post: &str) -> Result<Self, Tombstone> {
        let Ok(Value::Object(mut fields)) = serde_json::from_str::<Value>(content) else {
            return Err(Tombstone::new(content));
        };
        let missing: Vec<&'static str> = STANDARD_FIELDS
            .into_iter()
            .filter(|name| !fields.contains_key(*name))
            .collect();
        fields.insert("id".to_string(), Value::from(id));
        fields.insert("post".to_string(), Value::from(post));
        let mut comment: Self =
            serde_json::from_value(Value::Object(fields)).map_err(|_| Tombstone::new(content))?;
        comment.missing = missing;
        Ok(comment)
    }

    /// Canonical digest over every field except `id` and `hash`
    ///
    /// Field values are taken in alphabetical order of their names and
    /// joined with NUL bytes, so serialization order never matters.
    pub fn compute_hash(&self, algorithm: HashAlgorithm) -> String {
        let input = self.hash_input();
        format!("{algorithm}:{}", algorithm.hex_digest(input.as_bytes()))
    }

    /// Recompute and store the canonical hash
    pub fn rehash(&mut self, algorithm: HashAlgorithm) -> &str {
        let hash = self.compute_hash(algorithm);
        self.hash.insert(hash)
    }

    /// Check the stored hash against the record's current content
    pub fn verify_hash(&self) -> bool {
        let Some(stored) = self.hash.as_deref() else {
            return false;
        };
        let Some((name, _)) = stored.split_once(':') else {
            return false;
        };
        name.parse::<HashAlgorithm>()
            .is_ok_and(|algorithm| self.compute_hash(algorithm) == stored)
    }

    fn hash_input(&self) -> String {
        let fields = match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => fields,
            _ => Map::new(),
        };
        let mut keys: Vec<&String> = fields
            .keys()
            .filter(|k| k.as_str() != "id" && k.as_str() != "hash")
            .filter(|k| !self.missing.iter().any(|name| *name == k.as_str()))
            .collect();
        keys.sort();
        keys.iter()
            .map(|k| hash_value(&fields[k.as_str()]))
            .collect::<Vec<_>>()
            .join("\0")
    }
}

// Scalars hash as their plain text; booleans as "1"/"" and null as "".
fn hash_value(value: &Value) -> String {
    match value {
        Value::Null | Value::Bool(false) => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

// Older records may carry numbers or nulls where strings are expected.
fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        value @ (Value::Null | Value::Bool(_) | Value::String(_) | Value::Number(_)) => {
            Ok(hash_value(&value))
        }
        other => Err(serde::de::Error::custom(format!(
            "expected a scalar, found {other}"
        ))),
    }
}

/// Gravatar identifier for an email address
pub fn gravatar(email: &str) -> String {
    format!("{:x}", md5::compute(email.trim().to_lowercase()))
}

/// Fields a visitor submits for a new comment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewComment {
    pub author: String,
    pub email: String,
    pub website: String,
    pub body: String,
}

/// Content of a comment file that does not parse as a record
///
/// Tombstones are deliberate: a removed comment keeps its file so old
/// comment urls resolve to a predictable error instead of a 404.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tombstone {
    raw: String,
}

impl Tombstone {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// Status embedded as a leading `NNN ` on the first line, else 410
    pub fn status(&self) -> u16 {
        self.embedded_status().map_or(410, |(code, _)| code)
    }

    /// Message with any embedded status removed
    pub fn message(&self) -> String {
        let rest = self
            .embedded_status()
            .map_or(self.raw.as_str(), |(_, rest)| rest)
            .trim();
        if rest.is_empty() {
            REMOVED_MESSAGE.to_string()
        } else {
            rest.to_string()
        }
    }

    fn embedded_status(&self) -> Option<(u16, &str)> {
        let bytes = self.raw.as_bytes();
        if bytes.len() < 4 || bytes[3] != b' ' || !bytes[..3].iter().all(u8::is_ascii_digit) {
            return None;
        }
        let code = self.raw[..3].parse().ok()?;
        Some((code, &self.raw[4..]))
    }
}
