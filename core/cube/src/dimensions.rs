//! FILENAME: core/cube/src/dimensions.rs
//! Dimension model - the ordered dimension names and per-node value vectors.
//!
//! `Dimensions` fixes the depth of the cube tree and the positional meaning
//! of every value vector. `DimensionValues` is the (partial) combination of
//! values that identifies a node: a node at level L carries exactly L values.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Display marker for a rolled-up (unset) dimension position.
pub const ALL: &str = "(ALL)";

/// Display marker for "all other values not broken out individually".
pub const NOT_ALL: &str = "(ALL)-";

/// Display marker for a blanked position on an `(ALL)-` row.
pub const EMPTY: &str = "";

// ============================================================================
// DIMENSIONS
// ============================================================================

/// Ordered, immutable list of dimension names, e.g. `["country", "browser"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dimensions {
    names: Vec<String>,
}

impl Dimensions {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Dimensions {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// The first `depth` names (all of them if `depth` exceeds the length).
    pub fn names_to_depth(&self, depth: usize) -> &[String] {
        &self.names[..depth.min(self.names.len())]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.names.join(", "))
    }
}

// ============================================================================
// DIMENSION VALUES
// ============================================================================

/// The values of a node, one per dimension up to the node's level.
///
/// Ordering is lexicographic on the shared prefix; when one vector is a
/// prefix of the other, the longer one (the descendant) sorts first. Sorting
/// ascending therefore yields a post-order of the hierarchy (children before
/// their parent) and sorting descending yields a pre-order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DimensionValues {
    values: SmallVec<[String; 4]>,
}

impl DimensionValues {
    pub fn new<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DimensionValues {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Values of the root node.
    pub fn root() -> Self {
        DimensionValues::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(String::as_str)
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// The values of the parent combination (everything but the last value).
    pub fn parent_values(&self) -> &[String] {
        match self.values.len() {
            0 => &[],
            n => &self.values[..n - 1],
        }
    }

    /// Whether `self` is a strict prefix of `other`.
    pub fn is_ancestor_of(&self, other: &DimensionValues) -> bool {
        self.values.len() < other.values.len()
            && self.values.iter().zip(other.values.iter()).all(|(a, b)| a == b)
    }

    /// Length of the common prefix of the two value vectors.
    pub fn common_prefix_len(&self, other: &DimensionValues) -> usize {
        self.values
            .iter()
            .zip(other.values.iter())
            .take_while(|(a, b)| a == b)
            .count()
    }
}

impl Ord for DimensionValues {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.values.iter().zip(other.values.iter()) {
            match a.cmp(b) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        // Longer vector is a descendant of the shorter one and comes first.
        other.values.len().cmp(&self.values.len())
    }
}

impl PartialOrd for DimensionValues {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for DimensionValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.values.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descendants_sort_before_ancestors() {
        let us = DimensionValues::new(["US"]);
        let us_page = DimensionValues::new(["US", "page1"]);
        let root = DimensionValues::root();

        assert!(us_page < us);
        assert!(us < root);
        assert!(us_page < root);
    }

    #[test]
    fn test_siblings_sort_lexicographically() {
        let in_page = DimensionValues::new(["IN", "page1"]);
        let us = DimensionValues::new(["US"]);
        let us_page1 = DimensionValues::new(["US", "page1"]);
        let us_page2 = DimensionValues::new(["US", "page2"]);

        assert!(in_page < us);
        assert!(us_page1 < us_page2);

        let mut all = vec![us.clone(), DimensionValues::root(), us_page2.clone(), in_page.clone(), us_page1.clone()];
        all.sort_by(|a, b| b.cmp(a));
        // Descending order is a pre-order walk (siblings in reverse).
        assert_eq!(
            all,
            vec![DimensionValues::root(), us, us_page2, us_page1, in_page]
        );
    }

    #[test]
    fn test_prefix_helpers() {
        let us = DimensionValues::new(["US"]);
        let us_page = DimensionValues::new(["US", "page1"]);
        let in_page = DimensionValues::new(["IN", "page1"]);

        assert!(us.is_ancestor_of(&us_page));
        assert!(!us.is_ancestor_of(&in_page));
        assert!(!us.is_ancestor_of(&us));
        assert_eq!(us_page.common_prefix_len(&us), 1);
        assert_eq!(us_page.common_prefix_len(&in_page), 0);
        assert_eq!(us_page.parent_values(), &["US".to_string()]);
    }

    #[test]
    fn test_dimensions_depth() {
        let dims = Dimensions::new(["country", "browser", "os"]);
        assert_eq!(dims.len(), 3);
        assert_eq!(dims.names_to_depth(2), &["country".to_string(), "browser".to_string()]);
        assert_eq!(dims.names_to_depth(9).len(), 3);
        assert_eq!(dims.index_of("os"), Some(2));
        assert_eq!(dims.to_string(), "[country, browser, os]");
    }
}
