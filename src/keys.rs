//! Key and subscription-path syntax.
//!
//! A key is a `/`-prefixed sequence of non-empty segments, each made of
//! `[A-Za-z0-9_-]`, with no trailing slash. A subscription path is either a
//! key (exact match) or a key followed by `/` (the whole key-space below it).

use crate::error::{KvError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

fn valid_segment_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

fn valid_key(s: &str) -> bool {
    match s.strip_prefix('/') {
        Some(rest) => {
            !rest.is_empty()
                && rest
                    .split('/')
                    .all(|seg| !seg.is_empty() && seg.bytes().all(valid_segment_byte))
        }
        None => false,
    }
}

/// A validated key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Key(String);

impl Key {
    pub fn parse(s: &str) -> Result<Self> {
        if valid_key(s) {
            Ok(Key(s.to_string()))
        } else {
            Err(KvError::InvalidKey(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Registry paths that match this key, most specific first.
    ///
    /// `/a/b/c` yields `/a/b/c`, `/a/b/`, `/a/`. The root is never yielded.
    pub fn key_spaces(&self) -> impl Iterator<Item = &str> {
        let key = self.0.as_str();
        std::iter::once(key).chain(
            key.match_indices('/')
                .map(|(i, _)| i)
                .filter(|&i| i > 0)
                .rev()
                .map(move |i| &key[..=i]),
        )
    }
}

impl TryFrom<String> for Key {
    type Error = KvError;

    fn try_from(s: String) -> Result<Self> {
        if valid_key(&s) {
            Ok(Key(s))
        } else {
            Err(KvError::InvalidKey(s))
        }
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.0)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated subscription path: exact key or key-space.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionPath {
    raw: String,
    subtree: bool,
}

impl SubscriptionPath {
    pub fn parse(s: &str) -> Result<Self> {
        let (key, subtree) = match s.strip_suffix('/') {
            Some(prefix) => (prefix, true),
            None => (s, false),
        };
        if !valid_key(key) {
            return Err(KvError::InvalidPath(s.to_string()));
        }
        Ok(Self {
            raw: s.to_string(),
            subtree,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_subtree(&self) -> bool {
        self.subtree
    }

    /// Whether a mutation of `key` is delivered to this path.
    pub fn matches(&self, key: &Key) -> bool {
        if self.subtree {
            key.as_str().starts_with(&self.raw)
        } else {
            key.as_str() == self.raw
        }
    }
}

impl fmt::Debug for SubscriptionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionPath({})", self.raw)
    }
}

impl fmt::Display for SubscriptionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
