//! Capability tags and sets.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A single capability tag. Surrounding whitespace is trimmed; matching is
/// case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Capability(Arc<str>);

impl Capability {
    /// Normalize a raw tag. Returns `None` for blank input.
    pub fn new(raw: &str) -> Option<Self> {
        let tag = raw.trim();
        if tag.is_empty() {
            return None;
        }
        Some(Self(Arc::from(tag)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Serialize for Capability {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Capability {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::new(&raw).ok_or_else(|| serde::de::Error::custom("capability cannot be blank"))
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered set of capability tags.
///
/// Placement requires the node's set to be a superset of the task's set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, raw: &str) -> bool {
        match Capability::new(raw) {
            Some(cap) => self.0.insert(cap),
            None => false,
        }
    }

    pub fn contains(&self, raw: &str) -> bool {
        Capability::new(raw).is_some_and(|cap| self.0.contains(&cap))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if every tag in `other` is also in `self`.
    pub fn is_superset_of(&self, other: &CapabilitySet) -> bool {
        self.0.is_superset(&other.0)
    }

    /// `|self ∩ other|`
    pub fn intersection_len(&self, other: &CapabilitySet) -> usize {
        self.0.intersection(&other.0).count()
    }

    /// `|self \ other|`
    pub fn difference_len(&self, other: &CapabilitySet) -> usize {
        self.0.difference(&other.0).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.0.iter()
    }
}

impl<S: AsRef<str>> FromIterator<S> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = Self::new();
        for raw in iter {
            set.insert(raw.as_ref());
        }
        set
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags: Vec<&str> = self.0.iter().map(Capability::as_str).collect();
        write!(f, "{{{}}}", tags.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_trims() {
        let cap = Capability::new("  Research ").unwrap();
        assert_eq!(cap.as_str(), "Research");
        assert!(Capability::new("   ").is_none());
    }

    #[test]
    fn test_set_deduplicates_and_skips_blank() {
        let set: CapabilitySet = ["gpu", " gpu", "", "nlp"].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert!(set.contains("gpu"));
        assert!(set.contains("nlp "));
    }

    #[test]
    fn test_superset() {
        let node: CapabilitySet = ["research", "analysis", "gpu"].into_iter().collect();
        let task: CapabilitySet = ["research", "gpu"].into_iter().collect();
        assert!(node.is_superset_of(&task));
        assert!(!task.is_superset_of(&node));
        assert!(node.is_superset_of(&CapabilitySet::new()));
    }

    #[test]
    fn test_tags_are_case_sensitive() {
        let node: CapabilitySet = ["GPU"].into_iter().collect();
        let task: CapabilitySet = ["gpu"].into_iter().collect();
        assert!(!node.is_superset_of(&task));
        assert!(!node.contains("gpu"));
    }

    #[test]
    fn test_intersection_and_difference() {
        let node: CapabilitySet = ["a", "b", "c"].into_iter().collect();
        let task: CapabilitySet = ["b", "d"].into_iter().collect();
        assert_eq!(node.intersection_len(&task), 1);
        assert_eq!(node.difference_len(&task), 2);
    }

    #[test]
    fn test_display() {
        let set: CapabilitySet = ["b", "a"].into_iter().collect();
        assert_eq!(set.to_string(), "{a,b}");
    }
}
