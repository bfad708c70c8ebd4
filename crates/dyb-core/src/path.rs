//! Hierarchical path keys.
//!
//! A [`PathKey`] is an ordered sequence of string segments addressing one entry of the
//! model storage. The dotted form `outputs.statistic.full.pull.chi2cnp` and the tuple
//! form `("outputs", "statistic", "full", "pull", "chi2cnp")` parse to the same key.
//!
//! Segments are non-empty and never contain the separator, so both forms stay
//! interchangeable: a tuple segment such as `"a.b"` is rejected rather than silently
//! split.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result};

/// Segment separator of the dotted form.
pub const SEPARATOR: char = '.';

/// Structural, hashable path into the storage. The empty key is the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathKey {
    segments: Vec<String>,
}

impl PathKey {
    /// The root key (no segments).
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse the dotted form. An empty (or blank) string is the root.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Self::root());
        }

        let mut segments = Vec::new();
        for part in input.split(SEPARATOR) {
            if part.is_empty() {
                return Err(Error::InvalidPath(format!("empty segment in '{input}'")));
            }
            segments.push(part.to_string());
        }
        Ok(Self { segments })
    }

    /// Build a key from explicit segments (the tuple form).
    pub fn from_segments<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out = Vec::new();
        for segment in segments {
            let segment = segment.into();
            validate_segment(&segment)?;
            out.push(segment);
        }
        Ok(Self { segments: out })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn first(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Key without its last segment; `None` for the root.
    pub fn parent(&self) -> Option<PathKey> {
        if self.is_root() {
            return None;
        }
        Some(Self { segments: self.segments[..self.segments.len() - 1].to_vec() })
    }

    /// Append one validated segment.
    pub fn child(&self, segment: impl Into<String>) -> Result<Self> {
        let segment = segment.into();
        validate_segment(&segment)?;
        Ok(self.join_segment(&segment))
    }

    /// Append a segment taken from another key (already valid).
    pub fn join_segment(&self, segment: &str) -> Self {
        debug_assert!(validate_segment(segment).is_ok(), "invalid segment {segment:?}");
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.extend_from_slice(&self.segments);
        segments.push(segment.to_string());
        Self { segments }
    }

    /// Concatenate two keys.
    pub fn join(&self, other: &PathKey) -> Self {
        let mut segments = self.segments.clone();
        segments.extend_from_slice(&other.segments);
        Self { segments }
    }

    pub fn starts_with(&self, prefix: &PathKey) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    pub fn ends_with(&self, suffix: &PathKey) -> bool {
        let n = self.segments.len();
        let m = suffix.segments.len();
        n >= m && self.segments[n - m..] == suffix.segments[..]
    }

    /// Remainder after `prefix`, or `None` if `prefix` does not match.
    pub fn strip_prefix(&self, prefix: &PathKey) -> Option<PathKey> {
        if !self.starts_with(prefix) {
            return None;
        }
        Some(Self { segments: self.segments[prefix.segments.len()..].to_vec() })
    }

    /// Dotted form.
    pub fn to_dotted(&self) -> String {
        self.join_with(".")
    }

    /// Segments joined with an arbitrary separator (used by export adapters).
    pub fn join_with(&self, separator: &str) -> String {
        self.segments.join(separator)
    }
}

fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(Error::InvalidPath("empty segment".to_string()));
    }
    if segment.contains(SEPARATOR) {
        return Err(Error::InvalidPath(format!(
            "segment '{segment}' contains the separator '{SEPARATOR}'"
        )));
    }
    Ok(())
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_dotted())
    }
}

impl FromStr for PathKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for PathKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_dotted())
    }
}

impl<'de> Deserialize<'de> for PathKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PathKey::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Anything that names a storage entry: dotted strings, segment arrays/tuples or keys.
pub trait IntoPathKey {
    fn into_path_key(self) -> Result<PathKey>;
}

impl IntoPathKey for PathKey {
    fn into_path_key(self) -> Result<PathKey> {
        Ok(self)
    }
}

impl IntoPathKey for &PathKey {
    fn into_path_key(self) -> Result<PathKey> {
        Ok(self.clone())
    }
}

impl IntoPathKey for &str {
    fn into_path_key(self) -> Result<PathKey> {
        PathKey::parse(self)
    }
}

impl IntoPathKey for String {
    fn into_path_key(self) -> Result<PathKey> {
        PathKey::parse(&self)
    }
}

impl IntoPathKey for &String {
    fn into_path_key(self) -> Result<PathKey> {
        PathKey::parse(self)
    }
}

impl<const N: usize> IntoPathKey for [&str; N] {
    fn into_path_key(self) -> Result<PathKey> {
        PathKey::from_segments(self)
    }
}

impl IntoPathKey for &[&str] {
    fn into_path_key(self) -> Result<PathKey> {
        PathKey::from_segments(self.iter().copied())
    }
}

impl IntoPathKey for Vec<String> {
    fn into_path_key(self) -> Result<PathKey> {
        PathKey::from_segments(self)
    }
}

macro_rules! tuple_path_key {
    (@str $idx:tt) => { &str };
    ($($idx:tt),+) => {
        impl IntoPathKey for ($(tuple_path_key!(@str $idx),)+) {
            fn into_path_key(self) -> Result<PathKey> {
                PathKey::from_segments([$(self.$idx),+])
            }
        }
    };
}

tuple_path_key!(0);
tuple_path_key!(0, 1);
tuple_path_key!(0, 1, 2);
tuple_path_key!(0, 1, 2, 3);
tuple_path_key!(0, 1, 2, 3, 4);
tuple_path_key!(0, 1, 2, 3, 4, 5);
tuple_path_key!(0, 1, 2, 3, 4, 5, 6);
tuple_path_key!(0, 1, 2, 3, 4, 5, 6, 7);
