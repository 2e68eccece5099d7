//! Compact textual index lists: `"0-41 57 60-63"`.
//!
//! Grammar: whitespace-separated tokens, each either a single integer `a` or
//! a closed range `a-b` (whitespace is tolerated around the dash). Tokens are
//! unioned, so overlaps and duplicates collapse.

use std::iter::Peekable;
use std::ops::{Range, RangeInclusive};
use std::str::CharIndices;

/// How runs of consecutive indices are printed by [`encode_index_list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangeStyle {
    /// Every run of two or more values is printed as `a-b`.
    #[default]
    Exact,
    /// Output of the first generation of sidecar writers: a run of exactly
    /// two values is printed as its first value only, dropping the second.
    /// Only runs of three or more become `a-b`.
    Legacy,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeParseError {
    #[error("expected an index at byte {0}")]
    ExpectedIndex(usize),
    #[error("index at byte {0} does not fit in u32")]
    Overflow(usize),
    #[error("unexpected character {1:?} at byte {0}")]
    Unexpected(usize, char),
}

/// A set of indices held as sorted, disjoint, non-adjacent closed intervals.
///
/// Memory is proportional to the number of runs, not the number of indices,
/// so `"0-4294967295"` costs one interval.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexRanges {
    ranges: Vec<RangeInclusive<u32>>,
}

impl IndexRanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// The indices of a half-open range.
    pub fn from_range(range: Range<u32>) -> Self {
        match range.end.checked_sub(1) {
            Some(last) if range.start <= last => Self {
                ranges: vec![range.start..=last],
            },
            _ => Self::default(),
        }
    }

    /// Normalize arbitrary intervals: reversed ones are dropped, overlapping
    /// and touching ones are coalesced.
    pub fn from_ranges(ranges: impl IntoIterator<Item = RangeInclusive<u32>>) -> Self {
        let mut sorted: Vec<_> = ranges.into_iter().filter(|r| !r.is_empty()).collect();
        sorted.sort_unstable_by_key(|r| *r.start());

        let mut merged: Vec<RangeInclusive<u32>> = Vec::with_capacity(sorted.len());
        for r in sorted {
            match merged.last_mut() {
                Some(last) if *r.start() <= last.end().saturating_add(1) => {
                    if r.end() > last.end() {
                        *last = *last.start()..=*r.end();
                    }
                }
                _ => merged.push(r),
            }
        }
        Self { ranges: merged }
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Number of indices in the set.
    pub fn len(&self) -> u64 {
        self.ranges
            .iter()
            .map(|r| (*r.end() - *r.start()) as u64 + 1)
            .sum()
    }

    pub fn contains(&self, idx: u32) -> bool {
        let i = self.ranges.partition_point(|r| *r.end() < idx);
        self.ranges.get(i).is_some_and(|r| *r.start() <= idx)
    }

    pub fn first(&self) -> Option<u32> {
        self.ranges.first().map(|r| *r.start())
    }

    pub fn last(&self) -> Option<u32> {
        self.ranges.last().map(|r| *r.end())
    }

    pub fn ranges(&self) -> &[RangeInclusive<u32>] {
        &self.ranges
    }

    /// Ascending iterator over every index.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.ranges.iter().flat_map(|r| r.clone())
    }

    pub fn union(&self, other: &IndexRanges) -> Self {
        Self::from_ranges(self.ranges.iter().chain(&other.ranges).cloned())
    }

    /// Every index moved up by `offset`, or `None` if one would pass `u32::MAX`.
    pub fn shifted(&self, offset: u32) -> Option<Self> {
        let ranges = self
            .ranges
            .iter()
            .map(|r| Some(r.start().checked_add(offset)?..=r.end().checked_add(offset)?))
            .collect::<Option<Vec<_>>>()?;
        Some(Self { ranges })
    }

    /// Print as an index list in the given style.
    pub fn to_text(&self, style: RangeStyle) -> String {
        let min_range_len = match style {
            RangeStyle::Exact => 2,
            RangeStyle::Legacy => 3,
        };
        self.ranges
            .iter()
            .map(|r| {
                let run_len = (*r.end() - *r.start()) as u64 + 1;
                if run_len >= min_range_len {
                    format!("{}-{}", r.start(), r.end())
                } else {
                    r.start().to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl FromIterator<u32> for IndexRanges {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self::from_ranges(iter.into_iter().map(|i| i..=i))
    }
}

/// Parse an index list into the set of indices it denotes.
///
/// Parsing is all-or-nothing: any malformed token fails the whole list.
/// A reversed range such as `"5-3"` is well-formed but contributes nothing.
pub fn parse_index_list(text: &str) -> Result<IndexRanges, RangeParseError> {
    let mut chars = text.char_indices().peekable();
    let mut ranges = Vec::new();

    loop {
        skip_whitespace(&mut chars);
        let Some(&(pos, c)) = chars.peek() else {
            break;
        };
        if !c.is_ascii_digit() {
            return Err(RangeParseError::Unexpected(pos, c));
        }
        let first = parse_u32(&mut chars, text.len())?;
        let mut last = first;

        skip_whitespace(&mut chars);
        if let Some(&(_, '-')) = chars.peek() {
            chars.next();
            skip_whitespace(&mut chars);
            last = parse_u32(&mut chars, text.len())?;
        }

        ranges.push(first..=last);
    }

    Ok(IndexRanges::from_ranges(ranges))
}

/// Lenient variant used when loading stored lists: a malformed list becomes
/// the empty set and a warning naming the offending text is logged.
pub fn parse_index_list_or_empty(text: &str) -> IndexRanges {
    match parse_index_list(text) {
        Ok(indices) => indices,
        Err(e) => {
            log::warn!("discarding malformed index list {:?}: {}", text, e);
            IndexRanges::new()
        }
    }
}

/// Print an ascending, duplicate-free index sequence as an index list.
pub fn encode_index_list(indices: &[u32], style: RangeStyle) -> String {
    debug_assert!(
        indices.windows(2).all(|w| w[0] < w[1]),
        "index list must be strictly ascending"
    );
    indices.iter().copied().collect::<IndexRanges>().to_text(style)
}

fn skip_whitespace(chars: &mut Peekable<CharIndices<'_>>) {
    while chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
}

fn parse_u32(chars: &mut Peekable<CharIndices<'_>>, end: usize) -> Result<u32, RangeParseError> {
    let start = chars.peek().map(|&(pos, _)| pos).unwrap_or(end);
    let mut value: u32 = 0;
    let mut digits = 0usize;
    while let Some((_, c)) = chars.next_if(|(_, c)| c.is_ascii_digit()) {
        let digit = c as u32 - '0' as u32;
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(digit))
            .ok_or(RangeParseError::Overflow(start))?;
        digits += 1;
    }
    if digits == 0 {
        return Err(RangeParseError::ExpectedIndex(start));
    }
    Ok(value)
}
