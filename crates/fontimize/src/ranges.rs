//! Compression of code point sets into inclusive ranges, and the unicode-range wire syntax.

use std::{fmt, str::FromStr};

use crate::errors::RangeParseError;

/// Inclusive range of code points. A singleton range has `first == last`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodepointRange {
    first: char,
    last: char,
}

impl CodepointRange {
    /// Creates a range. Returns `None` if `first > last`.
    pub fn new(first: char, last: char) -> Option<Self> {
        (first <= last).then_some(Self { first, last })
    }

    /// Creates a singleton range.
    pub fn single(ch: char) -> Self {
        Self { first: ch, last: ch }
    }

    /// Returns the lower bound.
    pub fn first(&self) -> char {
        self.first
    }

    /// Returns the upper bound.
    pub fn last(&self) -> char {
        self.last
    }

    /// Checks whether `ch` falls into this range.
    pub fn contains(&self, ch: char) -> bool {
        (self.first..=self.last).contains(&ch)
    }

    /// Iterates over the code points in this range.
    pub fn chars(&self) -> impl Iterator<Item = char> {
        self.first..=self.last
    }
}

/// Renders the range as `U+XXXX` or `U+XXXX-YYYY`. The upper bound never has the `U+` prefix.
impl fmt::Display for CodepointRange {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "U+{:04X}", u32::from(self.first))?;
        if self.last != self.first {
            write!(formatter, "-{:04X}", u32::from(self.last))?;
        }
        Ok(())
    }
}

impl FromStr for CodepointRange {
    type Err = RangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix("U+")
            .or_else(|| s.strip_prefix("u+"))
            .ok_or_else(|| RangeParseError::MissingPrefix(s.to_owned()))?;
        let (first, last) = match body.split_once('-') {
            Some((first, last)) => {
                if last.starts_with("U+") || last.starts_with("u+") {
                    return Err(RangeParseError::RepeatedPrefix(s.to_owned()));
                }
                (first, last)
            }
            None => (body, body),
        };

        let parse_bound = |hex: &str| {
            if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(RangeParseError::InvalidHex(s.to_owned()));
            }
            u32::from_str_radix(hex, 16).map_err(|_| RangeParseError::InvalidHex(s.to_owned()))
        };
        let (first, last) = (parse_bound(first)?, parse_bound(last)?);
        if first > last {
            return Err(RangeParseError::Reversed { first, last });
        }
        let first = char::from_u32(first).ok_or(RangeParseError::NotAScalar(first))?;
        let last = char::from_u32(last).ok_or(RangeParseError::NotAScalar(last))?;
        Ok(Self { first, last })
    }
}

/// Ordered sequence of non-overlapping, non-adjacent [`CodepointRange`]s.
///
/// Produced by [`Self::encode()`], which yields the unique partition of a code point set
/// into maximal contiguous runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RangeSpec {
    ranges: Vec<CodepointRange>,
}

impl RangeSpec {
    /// Partitions sorted, de-duplicated code points into maximal contiguous runs.
    ///
    /// Adjacency is numeric, so a run never spans the surrogate block.
    pub fn encode(sorted_chars: impl IntoIterator<Item = char>) -> Self {
        let mut chars = sorted_chars.into_iter();
        let Some(first) = chars.next() else {
            return Self::default();
        };

        let mut ranges = vec![];
        let mut current = CodepointRange::single(first);
        for ch in chars {
            debug_assert!(ch > current.last, "code points must be sorted and unique");
            if u32::from(ch) == u32::from(current.last) + 1 {
                current.last = ch;
            } else {
                ranges.push(current);
                current = CodepointRange::single(ch);
            }
        }
        ranges.push(current);
        Self { ranges }
    }

    /// Returns the ranges in ascending order.
    pub fn ranges(&self) -> &[CodepointRange] {
        &self.ranges
    }

    /// Checks whether this spec contains no ranges.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Checks whether `ch` is covered by one of the ranges.
    pub fn contains(&self, ch: char) -> bool {
        let idx = self.ranges.partition_point(|range| range.last < ch);
        self.ranges.get(idx).is_some_and(|range| range.contains(ch))
    }

    /// Iterates over all covered code points in ascending order.
    pub fn chars(&self) -> impl Iterator<Item = char> + '_ {
        self.ranges.iter().flat_map(CodepointRange::chars)
    }
}

/// Joins rendered ranges with `", "`.
impl fmt::Display for RangeSpec {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                formatter.write_str(", ")?;
            }
            fmt::Display::fmt(range, formatter)?;
        }
        Ok(())
    }
}

/// Parses a comma-separated list of ranges. The ranges are merged into maximal runs,
/// so the input may be unordered or overlapping.
impl FromStr for RangeSpec {
    type Err = RangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut ranges = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse::<CodepointRange>)
            .collect::<Result<Vec<CodepointRange>, _>>()?;
        ranges.sort_unstable();

        let mut merged: Vec<CodepointRange> = Vec::with_capacity(ranges.len());
        for range in ranges {
            if let Some(prev) = merged.last_mut() {
                if u32::from(range.first) <= u32::from(prev.last) + 1 {
                    prev.last = prev.last.max(range.last);
                    continue;
                }
            }
            merged.push(range);
        }
        Ok(Self { ranges: merged })
    }
}

/// Unicode-range descriptor handed to a subsetting engine, together with the label
/// that names the produced subset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsetSpec {
    name: String,
    ranges: RangeSpec,
}

impl SubsetSpec {
    /// Creates a spec.
    pub fn new(name: impl Into<String>, ranges: RangeSpec) -> Self {
        Self {
            name: name.into(),
            ranges,
        }
    }

    /// Returns the subset label.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the ranges.
    pub fn ranges(&self) -> &RangeSpec {
        &self.ranges
    }

    /// Renders the ranges in the unicode-range wire syntax, e.g. `U+0020, U+0061-007A`.
    pub fn unicode_ranges(&self) -> String {
        self.ranges.to_string()
    }
}
