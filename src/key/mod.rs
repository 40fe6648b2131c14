//! Cache key encoding.
//!
//! A key is built from a namespace plus positional and keyword arguments.
//! Keyword arguments are sorted by name before encoding, so semantically equal
//! argument sets always produce the same key regardless of insertion order.
//! Structured arguments are canonicalized through [`serde_json::Value`], whose
//! object maps keep keys sorted.

use serde::Serialize;
use thiserror::Error;

/// Encoded keys longer than this collapse to `namespace:blake3(full_key)`.
pub const MAX_KEY_LEN: usize = 256;

/// Errors raised while encoding a cache key.
#[derive(Debug, Clone, Error)]
pub enum KeyError {
    /// An argument could not be encoded as part of a cache key.
    ///
    /// This indicates a programmer error (for example a map with non-string
    /// keys) and is always propagated to the caller, never swallowed.
    #[error("argument is not encodable as a cache key: {reason}")]
    Unencodable {
        /// Serializer error message.
        reason: String,
    },
}

/// Convenience result type for key encoding.
pub type KeyResult<T> = Result<T, KeyError>;

/// Positional and keyword arguments for a cache key.
///
/// ```
/// use tickcache::key::{self, KeyArgs};
///
/// let a = KeyArgs::new().arg("AAPL").kw("window", 30).kw("source", "iex");
/// let b = KeyArgs::new().arg("AAPL").kw("source", "iex").kw("window", 30);
/// assert_eq!(
///     key::encode("stock_quote", &a).unwrap(),
///     key::encode("stock_quote", &b).unwrap(),
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct KeyArgs {
    positional: Vec<KeyResult<serde_json::Value>>,
    keyword: Vec<(String, KeyResult<serde_json::Value>)>,
}

impl KeyArgs {
    /// Creates an empty argument list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    ///
    /// Serialization failures are deferred and surface from
    /// [`encode`] as [`KeyError::Unencodable`].
    pub fn arg<T: Serialize>(mut self, value: T) -> Self {
        self.positional.push(to_canonical(value));
        self
    }

    /// Adds a keyword argument. A repeated name replaces the earlier value.
    pub fn kw<T: Serialize>(mut self, name: &str, value: T) -> Self {
        self.keyword.retain(|(n, _)| n != name);
        self.keyword.push((name.to_string(), to_canonical(value)));
        self
    }

    /// Returns `true` if no arguments were added.
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }
}

fn to_canonical<T: Serialize>(value: T) -> KeyResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| KeyError::Unencodable {
        reason: e.to_string(),
    })
}

/// Renders a canonical value as a key segment.
///
/// Plain strings are embedded as-is so keys stay readable; everything else
/// uses compact JSON. Separator characters are escaped so distinct argument
/// lists can never collide on the joined form.
fn render(value: &serde_json::Value) -> String {
    let raw = match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    raw.replace('\\', "\\\\").replace(':', "\\:")
}

/// Encodes a cache key from a namespace and its arguments.
///
/// Output shape: `namespace:pos1:pos2:k1=v1:k2=v2` with keyword arguments
/// sorted by name. If the encoded form exceeds [`MAX_KEY_LEN`] it is replaced
/// by `namespace:<blake3 hex of the full key>`. The digest fallback carries a
/// theoretical collision risk; at 256 bits it is negligible for any realistic
/// key population, and a collision costs a wrong cache association, not data
/// loss in the system of record.
pub fn encode(namespace: &str, args: &KeyArgs) -> KeyResult<String> {
    let mut parts = Vec::with_capacity(1 + args.positional.len() + args.keyword.len());
    parts.push(namespace.to_string());

    for value in &args.positional {
        parts.push(render(value.as_ref().map_err(Clone::clone)?));
    }

    let mut kws: Vec<&(String, KeyResult<serde_json::Value>)> = args.keyword.iter().collect();
    kws.sort_by(|a, b| a.0.cmp(&b.0));
    for (name, value) in kws {
        parts.push(format!(
            "{name}={}",
            render(value.as_ref().map_err(Clone::clone)?)
        ));
    }

    let full = parts.join(":");
    if full.len() > MAX_KEY_LEN {
        Ok(format!(
            "{namespace}:{}",
            blake3::hash(full.as_bytes()).to_hex()
        ))
    } else {
        Ok(full)
    }
}

/// Matches `text` against a glob `pattern` supporting `*` and `?`.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            // Backtrack: let the last '*' swallow one more character.
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn positional_args_are_ordered() {
        let ab = encode("q", &KeyArgs::new().arg("a").arg("b")).unwrap();
        let ba = encode("q", &KeyArgs::new().arg("b").arg("a")).unwrap();
        assert_eq!(ab, "q:a:b");
        assert_ne!(ab, ba);
    }

    #[test]
    fn kwargs_are_order_insensitive() {
        let a = KeyArgs::new().arg("AAPL").kw("window", 30).kw("source", "iex");
        let b = KeyArgs::new().arg("AAPL").kw("source", "iex").kw("window", 30);
        let ka = encode("stock_quote", &a).unwrap();
        let kb = encode("stock_quote", &b).unwrap();
        assert_eq!(ka, kb);
        assert_eq!(ka, "stock_quote:AAPL:source=iex:window=30");
    }

    #[test]
    fn repeated_kwarg_replaces() {
        let args = KeyArgs::new().kw("window", 30).kw("window", 60);
        assert_eq!(encode("q", &args).unwrap(), "q:window=60");
    }

    #[test]
    fn structured_args_are_canonicalized() {
        // serde_json::Map keeps keys sorted, so two equal maps built in
        // different orders encode identically.
        let mut m1 = HashMap::new();
        m1.insert("b", 2);
        m1.insert("a", 1);
        let mut m2 = HashMap::new();
        m2.insert("a", 1);
        m2.insert("b", 2);

        let k1 = encode("q", &KeyArgs::new().arg(&m1)).unwrap();
        let k2 = encode("q", &KeyArgs::new().arg(&m2)).unwrap();
        assert_eq!(k1, k2);
    }

    #[test]
    fn colon_in_argument_cannot_collide() {
        let joined = encode("q", &KeyArgs::new().arg("a:b")).unwrap();
        let split = encode("q", &KeyArgs::new().arg("a").arg("b")).unwrap();
        assert_ne!(joined, split);
    }

    #[test]
    fn long_keys_collapse_to_digest() {
        let long = "x".repeat(2 * MAX_KEY_LEN);
        let key = encode("news", &KeyArgs::new().arg(long.as_str())).unwrap();
        assert!(key.len() <= "news:".len() + 64);
        assert!(key.starts_with("news:"));

        // Deterministic.
        let again = encode("news", &KeyArgs::new().arg(long.as_str())).unwrap();
        assert_eq!(key, again);
    }

    #[test]
    fn unencodable_argument_errors() {
        let mut bad = HashMap::new();
        bad.insert((1, 2), "x");
        let err = encode("q", &KeyArgs::new().arg(&bad)).unwrap_err();
        assert!(matches!(err, KeyError::Unencodable { .. }));
    }

    #[test]
    fn glob_basics() {
        assert!(glob_match("stock_quote:*", "stock_quote:AAPL"));
        assert!(glob_match("*:AAPL", "stock_quote:AAPL"));
        assert!(glob_match("stock_quote:A?PL", "stock_quote:AAPL"));
        assert!(glob_match("*", ""));
        assert!(!glob_match("stock_quote:*", "sentiment:AAPL"));
        assert!(!glob_match("stock_quote:A?PL", "stock_quote:AAAPL"));
    }

    #[test]
    fn glob_backtracking() {
        assert!(glob_match("a*b*c", "axxbxxc"));
        assert!(glob_match("a*b*c", "abc"));
        assert!(!glob_match("a*b*c", "axxbxx"));
    }
}
