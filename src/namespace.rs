//! Namespace derivation and parsing.
//!
//! A namespace partitions stored data by the embedding configuration that
//! produced it: `"<provider>:<model>"` while the vector dimension is still
//! unknown, `"<provider>:<model>:<dim>"` once it is. Data written under one
//! namespace is never visible from another.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors from [`parse`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamespaceError {
    #[error("malformed namespace {namespace:?}: {reason}")]
    Malformed { namespace: String, reason: String },
}

impl NamespaceError {
    fn malformed(namespace: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            namespace: namespace.to_string(),
            reason: reason.into(),
        }
    }
}

/// The parsed components of a namespace string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub provider: String,
    pub model: String,
    /// Vector dimension; `0` means not yet learned.
    pub dim: u32,
}

impl Namespace {
    pub fn new(provider: impl Into<String>, model: impl Into<String>, dim: u32) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            dim,
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&generate(&self.provider, &self.model, i64::from(self.dim)))
    }
}

impl FromStr for Namespace {
    type Err = NamespaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

/// Build a namespace string. The dimension segment is omitted when `dim <= 0`.
pub fn generate(provider: &str, model: &str, dim: i64) -> String {
    if dim <= 0 {
        format!("{provider}:{model}")
    } else {
        format!("{provider}:{model}:{dim}")
    }
}

/// Split a namespace string into provider, model and dimension.
///
/// Two segments yield `dim = 0`. Three segments require the last one to be a
/// non-negative integer. Any other segment count is rejected.
pub fn parse(namespace: &str) -> Result<Namespace, NamespaceError> {
    let parts: Vec<&str> = namespace.split(':').collect();
    match parts.as_slice() {
        [provider, model] => Ok(Namespace::new(*provider, *model, 0)),
        [provider, model, dim] => {
            let dim: u32 = dim.parse().map_err(|_| {
                NamespaceError::malformed(
                    namespace,
                    format!("dimension {dim:?} is not a non-negative integer"),
                )
            })?;
            Ok(Namespace::new(*provider, *model, dim))
        }
        _ => Err(NamespaceError::malformed(
            namespace,
            format!("expected 2 or 3 ':'-separated segments, got {}", parts.len()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_omits_unknown_dimension() {
        assert_eq!(
            generate("openai", "text-embedding-3-small", 0),
            "openai:text-embedding-3-small"
        );
        assert_eq!(generate("openai", "m", -4), "openai:m");
        assert_eq!(generate("ollama", "nomic", 768), "ollama:nomic:768");
    }

    #[test]
    fn round_trip_normalizes_dimension() {
        let cases = [("openai", "small", 1536), ("local", "stub", 0), ("ollama", "x", -1)];
        for (provider, model, dim) in cases {
            let ns = parse(&generate(provider, model, dim)).unwrap();
            assert_eq!(ns.provider, provider);
            assert_eq!(ns.model, model);
            assert_eq!(i64::from(ns.dim), dim.max(0));
        }
    }

    #[test]
    fn parse_rejects_bad_segment_counts() {
        assert!(parse("").is_err());
        assert!(parse("openai").is_err());
        assert!(parse("a:b:1:2").is_err());
    }

    #[test]
    fn parse_rejects_bad_dimension() {
        assert!(parse("openai:m:-3").is_err());
        assert!(parse("openai:m:abc").is_err());
        assert!(parse("openai:m:").is_err());
    }

    #[test]
    fn display_and_from_str_agree() {
        let ns: Namespace = "local:stub:256".parse().unwrap();
        assert_eq!(ns.dim, 256);
        assert_eq!(ns.to_string(), "local:stub:256");
    }
}
