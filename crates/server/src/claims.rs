//! Dotted-path lookups into identity-provider claims.
//!
//! Claims arrive as a JSON object. A path such as `resource_access.app.roles`
//! walks nested objects one key at a time; a missing key or a non-object value
//! along the way ends the walk with nothing found rather than an error.

use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A location inside a claims object, parsed from a dotted string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClaimPath {
    segments: Vec<String>,
}

impl ClaimPath {
    /// Split `dotted` on `.`. Every segment is kept as-is, including empty ones,
    /// so `""` is a path of one empty key that matches nothing in practice.
    pub fn parse(dotted: &str) -> Self {
        Self {
            segments: dotted.split('.').map(str::to_string).collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl FromStr for ClaimPath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for ClaimPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

/// Parse a comma-separated list of dotted paths, trimming whitespace and
/// skipping blank entries.
pub fn parse_path_list(list: &str) -> Vec<ClaimPath> {
    list.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(ClaimPath::parse)
        .collect()
}

/// Walk `claims` along `path`. Only JSON objects are indexable.
pub fn lookup<'a>(claims: &'a Value, path: &ClaimPath) -> Option<&'a Value> {
    path.segments
        .iter()
        .try_fold(claims, |current, key| current.as_object()?.get(key))
}

/// String value at `path`, if the path ends on a string.
pub fn string_at(claims: &Value, path: &ClaimPath) -> Option<String> {
    lookup(claims, path)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// String items of the list at `path`.
///
/// Anything other than a list at the end of the path yields an empty set, and
/// non-string items inside the list are skipped.
pub fn string_list_at(claims: &Value, path: &ClaimPath) -> Vec<String> {
    lookup(claims, path)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Union of the string lists found at each of `paths`, deduplicated while
/// preserving first-seen order.
pub fn merged_string_lists(claims: &Value, paths: &[ClaimPath]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for path in paths {
        for value in string_list_at(claims, path) {
            if !merged.contains(&value) {
                merged.push(value);
            }
        }
    }
    merged
}
