//! Collecting code points used by text fragments.

use std::collections::BTreeSet;

use crate::{html, ranges::RangeSpec};

/// Set of distinct Unicode scalar values used by one or more text fragments.
///
/// The set always contains the space character `' '`, so that an empty input still results
/// in a non-empty subset. Text is treated as a sequence of Unicode scalar values: a combining
/// sequence such as `e` + U+0301 contributes both code points separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodepointSet {
    chars: BTreeSet<char>,
}

impl Default for CodepointSet {
    fn default() -> Self {
        Self {
            chars: BTreeSet::from([Self::BASELINE]),
        }
    }
}

impl CodepointSet {
    /// Code point that is present in every set.
    pub const BASELINE: char = ' ';

    /// Collects code points used by `text`.
    pub fn collect(text: &str) -> Self {
        let mut this = Self::default();
        this.chars.extend(text.chars());
        this
    }

    /// Collects code points used by any of `texts`. The order of fragments doesn't matter.
    pub fn collect_all<'a>(texts: impl IntoIterator<Item = &'a str>) -> Self {
        texts
            .into_iter()
            .fold(Self::default(), |acc, text| acc.union(&Self::collect(text)))
    }

    /// Collects code points from visible text of an HTML document.
    pub fn collect_html(html: &str) -> Self {
        Self::collect(&html::visible_text(html))
    }

    /// Returns a union of this set and `other`.
    #[must_use]
    pub fn union(mut self, other: &Self) -> Self {
        self.chars.extend(other.chars.iter().copied());
        self
    }

    /// Checks whether this set contains `ch`.
    pub fn contains(&self, ch: char) -> bool {
        self.chars.contains(&ch)
    }

    /// Returns the number of code points in this set. Always positive.
    #[allow(clippy::len_without_is_empty)] // the set is never empty
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    /// Iterates over code points in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = char> + '_ {
        self.chars.iter().copied()
    }

    /// Compresses this set into maximal contiguous ranges.
    pub fn to_ranges(&self) -> RangeSpec {
        RangeSpec::encode(self.iter())
    }
}

impl Extend<char> for CodepointSet {
    fn extend<I: IntoIterator<Item = char>>(&mut self, iter: I) {
        self.chars.extend(iter);
    }
}
