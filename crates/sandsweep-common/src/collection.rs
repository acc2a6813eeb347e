//! Ordered collections of resource kind names
//!
//! Targets and excludes are composed from several configuration layers;
//! composition collapses duplicates while preserving first-seen order so
//! output stays deterministic.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An ordered set of resource kind names.
///
/// Duplicates are collapsed on composition (`union`, `intersect`,
/// `difference`), not on construction, mirroring how configuration layers
/// are merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Collection(Vec<String>);

impl Collection {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    pub fn push(&mut self, name: impl Into<String>) {
        self.0.push(name.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// All names present in either collection, first-seen order, deduplicated.
    pub fn union(&self, other: &Collection) -> Collection {
        let mut result = Collection::new();
        for name in self.iter().chain(other.iter()) {
            if !result.contains(name) {
                result.push(name);
            }
        }
        result
    }

    /// All names of `self` that are also in `other`, deduplicated.
    pub fn intersect(&self, other: &Collection) -> Collection {
        let mut result = Collection::new();
        for name in self.iter() {
            if other.contains(name) && !result.contains(name) {
                result.push(name);
            }
        }
        result
    }

    /// All names of `self` that are not in `other`, deduplicated.
    pub fn difference(&self, other: &Collection) -> Collection {
        let mut result = Collection::new();
        for name in self.iter() {
            if !other.contains(name) && !result.contains(name) {
                result.push(name);
            }
        }
        result
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(", "))
    }
}

impl FromIterator<String> for Collection {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> FromIterator<&'a str> for Collection {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self(iter.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for Collection {
    fn from(names: Vec<String>) -> Self {
        Self(names)
    }
}

impl IntoIterator for Collection {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coll(names: &[&str]) -> Collection {
        names.iter().copied().collect()
    }

    #[test]
    fn test_union_preserves_order_and_dedupes() {
        let a = coll(&["EC2Instance", "S3Bucket"]);
        let b = coll(&["S3Bucket", "IAMRole"]);
        assert_eq!(a.union(&b), coll(&["EC2Instance", "S3Bucket", "IAMRole"]));
    }

    #[test]
    fn test_union_with_empty() {
        let a = coll(&["EC2Instance"]);
        assert_eq!(a.union(&Collection::new()), a);
        assert_eq!(Collection::new().union(&a), a);
    }

    #[test]
    fn test_intersect() {
        let a = coll(&["EC2Instance", "S3Bucket", "IAMRole"]);
        let b = coll(&["S3Bucket", "IAMRole", "EC2SecurityGroup"]);
        assert_eq!(a.intersect(&b), coll(&["S3Bucket", "IAMRole"]));
    }

    #[test]
    fn test_difference() {
        let a = coll(&["EC2Instance", "S3Bucket", "IAMRole"]);
        let b = coll(&["S3Bucket"]);
        assert_eq!(a.difference(&b), coll(&["EC2Instance", "IAMRole"]));
    }

    #[test]
    fn test_duplicates_collapse_on_composition() {
        let a = coll(&["S3Bucket", "S3Bucket"]);
        assert_eq!(a.union(&Collection::new()), coll(&["S3Bucket"]));
        assert_eq!(a.difference(&Collection::new()), coll(&["S3Bucket"]));
    }

    #[test]
    fn test_display() {
        assert_eq!(coll(&["A", "B"]).to_string(), "A, B");
    }
}
