//! Semantic version parsing and ordering for schema revisions.
//!
//! Parsing never fails: any component that is missing or not a
//! non-negative integer reads as `0`, so an unrecognizable version string
//! sorts as the oldest possible schema and every migration is considered
//! pending for it.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// A `(major, minor, patch)` schema revision.
///
/// Field order matters: the derived `Ord` compares major, then minor, then
/// patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SemanticVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SemanticVersion {
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a dot-separated version string.
    ///
    /// Components beyond the third are ignored.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.trim().split('.').map(parse_component);
        let major = parts.next().unwrap_or(0);
        let minor = parts.next().unwrap_or(0);
        let patch = parts.next().unwrap_or(0);
        Self::new(major, minor, patch)
    }
}

fn parse_component(raw: &str) -> u64 {
    raw.trim().parse::<u64>().unwrap_or(0)
}

/// Compare two version strings numerically.
///
/// `"1.0"` and `"1.0.0"` compare equal.
#[must_use]
pub fn compare(a: &str, b: &str) -> Ordering {
    SemanticVersion::parse(a).cmp(&SemanticVersion::parse(b))
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemanticVersion {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl Serialize for SemanticVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SemanticVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}
