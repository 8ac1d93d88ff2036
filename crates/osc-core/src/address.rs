//! Literal OSC addresses
//!
//! A message address is a `/`-separated path of literal parts:
//! ```text
//! /synth/1/freq
//! /mixer/channel/3/gain
//! ```
//!
//! Pattern characters (`*`, `?`, `[`, `]`, `{`, `}`) are only valid in
//! address patterns, see [`crate::pattern`].

use crate::pattern::Pattern;
use crate::{Error, Result};

/// Characters reserved for address patterns
pub const PATTERN_CHARS: &[char] = &['*', '?', '[', ']', '{', '}'];

/// A validated literal OSC address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    raw: String,
    segments: Vec<String>,
}

impl Address {
    /// Parse and validate a literal address string
    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::InvalidAddress("empty address".to_string()));
        }

        if !s.starts_with('/') {
            return Err(Error::InvalidAddress(format!(
                "address must start with '/': {}",
                s
            )));
        }

        if let Some(c) = s.chars().find(|c| PATTERN_CHARS.contains(c)) {
            return Err(Error::InvalidAddress(format!(
                "pattern character {:?} in literal address: {}",
                c, s
            )));
        }

        if s.contains('\0') {
            return Err(Error::InvalidAddress(format!("embedded null in address: {:?}", s)));
        }

        let segments = s[1..].split('/').map(|s| s.to_string()).collect();

        Ok(Self {
            raw: s.to_string(),
            segments,
        })
    }

    /// Get the raw address string
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Get the address parts between separators
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Get the last part (usually the method name)
    pub fn method(&self) -> Option<&str> {
        self.segments.last().map(|s| s.as_str())
    }

    /// Check whether `pattern` accepts this address
    pub fn matches(&self, pattern: &Pattern) -> bool {
        pattern.matches(&self.raw)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl TryFrom<&str> for Address {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Address::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Address::parse(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let addr = Address::parse("/mixer/channel/3/gain").unwrap();
        assert_eq!(addr.segments().len(), 4);
        assert_eq!(addr.method(), Some("gain"));
        assert_eq!(addr.to_string(), "/mixer/channel/3/gain");
    }

    #[test]
    fn test_parse_invalid() {
        assert!(Address::parse("").is_err());
        assert!(Address::parse("no/leading/slash").is_err());
        assert!(Address::parse("/foo/{a,b}").is_err());
        assert!(Address::parse("/foo/ba?").is_err());
    }

    #[test]
    fn test_matches_pattern() {
        let addr = Address::parse("/synth/2/freq").unwrap();
        assert!(addr.matches(&Pattern::compile("/synth/[0-9]/freq").unwrap()));
        assert!(!addr.matches(&Pattern::compile("/synth/*/gain").unwrap()));
    }
}
