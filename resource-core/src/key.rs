/*!
Key normalization and content hashing.

Entity names are mapped to filesystem-safe keys, storage paths are cleaned
lexically, and payloads are hashed by content so that equal values produce
equal hashes across process runs.
*/

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Separator used in place of runs of unsafe characters
pub const KEY_SEPARATOR: char = '-';

/// Name, path and content hashing utilities consumed by entities
pub trait KeyCodec: Send + Sync {
    /// Map an arbitrary name to a filesystem-safe key
    ///
    /// An empty result means the name carries no usable characters.
    fn normalize_key(&self, name: &str) -> String;

    /// Clean a path string without resolving symlinks
    fn normalize_path(&self, path: &str) -> String;

    /// Deterministic content hash of a structured value
    fn hash_key(&self, value: &Value) -> String;
}

/// Default codec: lowercase dash-separated keys, lexical path cleaning and
/// SHA-256 over compact JSON.
///
/// `serde_json` keeps object keys sorted, so two structurally equal values
/// always encode, and therefore hash, identically.
///
/// # Example
/// ```rust
/// use resource_core::{DefaultKeyCodec, KeyCodec};
///
/// let codec = DefaultKeyCodec::new();
/// assert_eq!(codec.normalize_key("  User:42 "), "user-42");
/// assert_eq!(codec.normalize_path("/var//cache/./x/../resources"), "/var/cache/resources");
/// ```
#[derive(Debug, Clone, Default)]
pub struct DefaultKeyCodec;

impl DefaultKeyCodec {
    pub fn new() -> Self {
        Self
    }
}

impl KeyCodec for DefaultKeyCodec {
    fn normalize_key(&self, name: &str) -> String {
        let mut key = String::with_capacity(name.len());
        let mut pending_separator = false;

        for ch in name.trim().chars().flat_map(char::to_lowercase) {
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' {
                if pending_separator && !key.is_empty() {
                    key.push(KEY_SEPARATOR);
                }
                pending_separator = false;
                key.push(ch);
            } else {
                pending_separator = true;
            }
        }

        key
    }

    fn normalize_path(&self, path: &str) -> String {
        let unified = path.trim().replace('\\', "/");
        let absolute = unified.starts_with('/');
        let mut segments: Vec<&str> = Vec::new();

        for segment in unified.split('/') {
            match segment {
                "" | "." => {}
                ".." => match segments.last() {
                    Some(last) if *last != ".." => {
                        segments.pop();
                    }
                    // `..` at the root stays at the root
                    _ if absolute => {}
                    _ => segments.push(".."),
                },
                other => segments.push(other),
            }
        }

        let joined = segments.join("/");
        if absolute {
            format!("/{joined}")
        } else if joined.is_empty() {
            ".".to_string()
        } else {
            joined
        }
    }

    fn hash_key(&self, value: &Value) -> String {
        let mut hasher = Sha256::new();
        hasher.update(value.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
