//! Resource-name codec and tagging contract
//!
//! Provider resources carry no native notion of "project" or "preview
//! environment"; the only persisted record of ownership is the name and tag
//! set written at creation time. This module is the single place those names
//! are generated and parsed, so every consumer agrees on the encoding.
//!
//! A name looks like `berth-pid-my-project--pr-5`: the `berth` prefix, then
//! `key-value` pairs joined by a double dash. Values may themselves contain
//! dashes, so parsing splits each pair on the first dash only.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Prefix carried by every generated resource name
pub const PREFIX: &str = "berth";

/// Separator between encoded key-value pairs
const SEPARATOR: &str = "--";

/// Tag key written on every managed resource, marking it as Berth-owned
pub const MARKER_KEY: &str = "berth";

/// Value of the marker tag
pub const MARKER_VALUE: &str = "managed";

/// The fixed vocabulary of identity tags.
///
/// Keys outside this set never survive encoding; unknown tags on a provider
/// resource are ignored when a name or tag set is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagKey {
    /// Project identifier
    Pid,
    /// Pull-request number
    Pr,
    /// Named deployment (e.g. "beta")
    Deployment,
    /// Source revision the environment was built from
    Sha,
    /// Creation time, wall-clock milliseconds
    Time,
    /// Expiry time, wall-clock milliseconds; consumed by the reaper
    Ttl,
}

impl TagKey {
    /// All vocabulary keys, in encoding order
    pub const ALL: [TagKey; 6] = [
        TagKey::Pid,
        TagKey::Pr,
        TagKey::Deployment,
        TagKey::Sha,
        TagKey::Time,
        TagKey::Ttl,
    ];

    /// Wire token for this key
    pub fn as_str(&self) -> &'static str {
        match self {
            TagKey::Pid => "pid",
            TagKey::Pr => "pr",
            TagKey::Deployment => "deployment",
            TagKey::Sha => "sha",
            TagKey::Time => "time",
            TagKey::Ttl => "ttl",
        }
    }

    /// Parse a wire token back into a key
    pub fn from_token(token: &str) -> Option<TagKey> {
        TagKey::ALL.iter().copied().find(|k| k.as_str() == token)
    }
}

impl std::fmt::Display for TagKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Decoded identity of a resource
pub type NameMap = BTreeMap<TagKey, String>;

/// Encode an identity map into a provider-legal resource name.
///
/// Keys are written in vocabulary order, so two maps with the same content
/// always produce the same name. Returns an empty string when the map holds
/// no vocabulary keys.
pub fn generate(parts: &NameMap) -> String {
    let mut segments = Vec::new();
    for key in TagKey::ALL {
        if let Some(value) = parts.get(&key) {
            segments.push(format!("{}-{}", key.as_str(), value));
        }
    }
    if segments.is_empty() {
        return String::new();
    }
    format!("{}-{}", PREFIX, segments.join(SEPARATOR))
}

/// Encode from an untyped tag map, silently dropping unknown keys.
pub fn generate_untyped(parts: &HashMap<String, String>) -> String {
    let mut map = NameMap::new();
    for (key, value) in parts {
        if let Some(key) = TagKey::from_token(key) {
            map.insert(key, value.clone());
        }
    }
    generate(&map)
}

/// Decode a resource name back into an identity map.
///
/// Returns `None` when the name does not carry the system prefix, never a
/// partial map and never a panic. Malformed or non-vocabulary segments are
/// skipped; callers treat the absence of an expected key as "not this
/// entity".
pub fn parse(name: &str) -> Option<NameMap> {
    let rest = name.strip_prefix(PREFIX).and_then(|r| r.strip_prefix('-'))?;
    let mut map = NameMap::new();
    for segment in rest.split(SEPARATOR) {
        let Some((token, value)) = segment.split_once('-') else {
            continue;
        };
        let Some(key) = TagKey::from_token(token) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        map.insert(key, value.to_string());
    }
    Some(map)
}

/// Extract the vocabulary tags out of a provider tag map.
pub fn tag_map(tags: &HashMap<String, String>) -> NameMap {
    let mut map = NameMap::new();
    for (key, value) in tags {
        if let Some(key) = TagKey::from_token(key) {
            map.insert(key, value.clone());
        }
    }
    map
}

/// A conjunction of `key = value` tag requirements, the only discovery
/// mechanism the orchestrators use.
#[derive(Debug, Clone, Default)]
pub struct TagFilter {
    entries: Vec<(String, String)>,
}

impl TagFilter {
    /// Empty filter (matches everything)
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key = value`
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.push((key.into(), value.into()));
        self
    }

    /// Iterate the required pairs
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether a resource's tag map satisfies every requirement
    pub fn matches(&self, tags: &HashMap<String, String>) -> bool {
        self.entries
            .iter()
            .all(|(k, v)| tags.get(k).is_some_and(|t| t == v))
    }
}

/// Filter selecting every Berth-managed resource
pub fn marker_filter() -> TagFilter {
    TagFilter::new().with(MARKER_KEY, MARKER_VALUE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(TagKey, &str)]) -> NameMap {
        pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()
    }

    #[test]
    fn test_generate_orders_keys() {
        let name = generate(&map(&[(TagKey::Pr, "5"), (TagKey::Pid, "demo")]));
        assert_eq!(name, "berth-pid-demo--pr-5");
    }

    #[test]
    fn test_generate_empty_map() {
        assert_eq!(generate(&NameMap::new()), "");
    }

    #[test]
    fn test_generate_untyped_drops_unknown_keys() {
        let mut parts = HashMap::new();
        parts.insert("sha".to_string(), "1234".to_string());
        parts.insert("ignoreMe".to_string(), "x".to_string());
        assert_eq!(generate_untyped(&parts), "berth-sha-1234");
    }

    #[test]
    fn test_parse_requires_prefix() {
        assert_eq!(parse("A-B--C-D"), None);
        assert_eq!(parse(""), None);
        assert_eq!(parse("berthpid-demo"), None);
    }

    #[test]
    fn test_round_trip_with_dashes_in_value() {
        let original = map(&[(TagKey::Pid, "my-project"), (TagKey::Pr, "5")]);
        let parsed = parse(&generate(&original)).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_round_trip_full_vocabulary() {
        let original = map(&[
            (TagKey::Pid, "demo"),
            (TagKey::Pr, "12"),
            (TagKey::Sha, "abc123"),
            (TagKey::Time, "1700000000000"),
            (TagKey::Ttl, "1700003600000"),
        ]);
        let parsed = parse(&generate(&original)).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_parse_skips_malformed_segments() {
        let parsed = parse("berth-pid-demo--bogus--pr-5").unwrap();
        assert_eq!(parsed.get(&TagKey::Pid).unwrap(), "demo");
        assert_eq!(parsed.get(&TagKey::Pr).unwrap(), "5");
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn test_tag_filter_matches() {
        let filter = marker_filter().with("pid", "demo");
        let mut tags = HashMap::new();
        tags.insert(MARKER_KEY.to_string(), MARKER_VALUE.to_string());
        tags.insert("pid".to_string(), "demo".to_string());
        tags.insert("extra".to_string(), "whatever".to_string());
        assert!(filter.matches(&tags));

        tags.insert("pid".to_string(), "other".to_string());
        assert!(!filter.matches(&tags));
    }
}
