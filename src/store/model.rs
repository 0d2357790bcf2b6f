//-
// Copyright (c) 2026, Jason Lingle
//
// This file is part of Newsdir.
//
// Newsdir is free software: you can  redistribute it and/or modify it under
// the terms of  the GNU General Public License as  published by the Free
// Software Foundation, either version 3 of  the License, or (at your option)
// any later version.
//
// Newsdir is distributed in the hope that  it will be useful, but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Newsdir. If not, see <http://www.gnu.org/licenses/>.

use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt;
use std::num::NonZeroU32;
use std::ops::Bound::{Excluded, Included, Unbounded};

use chrono::prelude::*;
use serde::{Deserialize, Serialize};

/// Uniquely identifies an article within a single group.
///
/// Article numbers start at 1 and increase monotonically as articles arrive.
/// A number is never reused, even across process restarts and even after the
/// article it named has been expired, since newsreaders key all their
/// per-article state (read ranges, marks, and so on) off these numbers.
#[derive(
    Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(transparent)]
pub struct ArtNum(pub NonZeroU32);

impl fmt::Debug for ArtNum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ArtNum({})", self.0.get())
    }
}

// This isn't a useful default implementation, but is here so that things
// containing ArtRange can still derive Default.
impl Default for ArtNum {
    fn default() -> Self {
        ArtNum::MIN
    }
}

impl ArtNum {
    // Unsafe because new() isn't const for some reason
    pub const MIN: Self = unsafe { ArtNum(NonZeroU32::new_unchecked(1)) };
    pub const MAX: Self =
        unsafe { ArtNum(NonZeroU32::new_unchecked(u32::MAX)) };

    pub fn of(num: u32) -> Option<Self> {
        NonZeroU32::new(num).map(ArtNum)
    }

    pub fn next(self) -> Option<Self> {
        if ArtNum::MAX == self {
            None
        } else {
            Some(ArtNum(NonZeroU32::new(self.0.get() + 1).unwrap()))
        }
    }

    pub fn saturating_next(self) -> Self {
        self.next().unwrap_or(ArtNum::MAX)
    }

    #[cfg(test)]
    pub fn u(num: u32) -> Self {
        ArtNum::of(num).unwrap()
    }
}

impl TryFrom<u32> for ArtNum {
    type Error = ();

    fn try_from(v: u32) -> Result<Self, ()> {
        Self::of(v).ok_or(())
    }
}

impl Into<u32> for ArtNum {
    fn into(self) -> u32 {
        self.0.get()
    }
}

/// A set of article numbers.
///
/// Internally, this is maintained as a minimal sorted set of inclusive
/// ranges. It does not maintain information on the original fragmentation,
/// ordering, or duplication: a request naming the pair (5, 3) and then 4
/// denotes exactly the articles 3, 4, and 5, each once.
///
/// The `Display` format is the conventional news range syntax, e.g.
/// `1-5,9`. Note that there is no textual representation of an empty set;
/// `Display` produces an empty string in that case.
#[derive(Clone, PartialEq, Eq)]
pub struct ArtRange {
    parts: BTreeMap<u32, u32>,
}

impl ArtRange {
    /// Create a new, empty set.
    pub fn new() -> Self {
        ArtRange {
            parts: BTreeMap::new(),
        }
    }

    /// Create a set containing just the given article.
    pub fn just(item: ArtNum) -> Self {
        let mut this = ArtRange::new();
        this.append(item);
        this
    }

    /// Create a set containing just a single, simple range.
    ///
    /// The endpoints may be given in either order.
    pub fn range(a: ArtNum, b: ArtNum) -> Self {
        let mut this = ArtRange::new();
        this.insert(a, b);
        this
    }

    /// Append a single article to this set.
    ///
    /// The article must be strictly greater than all others already
    /// inserted.
    pub fn append(&mut self, item: ArtNum) {
        let item = item.0.get();

        if let Some(end) = self.parts.values_mut().next_back() {
            assert!(item > *end);

            if item == *end + 1 {
                *end = item;
                return;
            }
        }

        self.parts.insert(item, item);
    }

    /// Insert the given inclusive range into this set.
    ///
    /// The endpoints may be given in either order.
    pub fn insert(&mut self, a: ArtNum, b: ArtNum) {
        let a = a.0.get();
        let b = b.0.get();
        self.insert_raw(a.min(b), a.max(b));
    }

    fn insert_raw(&mut self, start_incl: u32, mut end_incl: u32) {
        // If this range overlaps any later ranges, fuse them.
        loop {
            let following = self
                .parts
                .range((Excluded(start_incl), Unbounded))
                .next()
                .map(|(&start, &end)| (start, end));

            if let Some((following_start, following_end)) = following {
                if following_start - 1 <= end_incl {
                    end_incl = end_incl.max(following_end);
                    self.parts.remove(&following_start);
                    continue;
                }
            }

            break;
        }

        let preceding = self
            .parts
            .range((Unbounded, Included(end_incl)))
            .next_back()
            .map(|(&start, &end)| (start, end));
        if let Some((preceding_start, preceding_end)) = preceding {
            if preceding_end + 1 >= start_incl {
                // Overlap with the new range
                if start_incl < preceding_start {
                    self.parts.remove(&preceding_start);
                    self.parts.insert(start_incl, end_incl.max(preceding_end));
                } else {
                    self.parts
                        .insert(preceding_start, end_incl.max(preceding_end));
                }
                return;
            }
        }

        // No overlap
        self.parts.insert(start_incl, end_incl);
    }

    /// Remove the given article from this set, splitting a range in two if
    /// it sat in the middle of one.
    pub fn remove(&mut self, item: ArtNum) {
        let item = item.0.get();

        let part = self
            .parts
            .range(..=item)
            .next_back()
            .map(|(&start, &end)| (start, end));
        if let Some((start, end)) = part {
            if item > end {
                return;
            }

            self.parts.remove(&start);
            if start < item {
                self.parts.insert(start, item - 1);
            }
            if item < end {
                self.parts.insert(item + 1, end);
            }
        }
    }

    /// Add every article in `other` to this set.
    pub fn merge(&mut self, other: &ArtRange) {
        for (&start, &end) in &other.parts {
            self.insert_raw(start, end);
        }
    }

    /// Return whether the given article is present in this set.
    pub fn contains(&self, v: ArtNum) -> bool {
        let v = v.0.get();
        self.parts
            .range(..=v)
            .next_back()
            .filter(|&(_, &end)| end >= v)
            .is_some()
    }

    /// Return an iterator to the articles in this set.
    ///
    /// Articles greater than `max` are silently excluded.
    ///
    /// Articles are delivered in strictly ascending order.
    pub fn items<'a>(
        &'a self,
        max: impl Into<u32>,
    ) -> impl Iterator<Item = ArtNum> + 'a {
        let max: u32 = max.into();
        self.parts
            .iter()
            .map(|(&start, &end)| (start, end))
            .filter(move |&(start, _)| start <= max)
            .flat_map(move |(start, end)| (start..=end.min(max)).into_iter())
            .filter_map(|v| ArtNum::try_from(v).ok())
    }

    /// Parse the conventional news range syntax.
    ///
    /// Each comma-delimited element is either a single number or a
    /// `first-last` range. A range with a missing last endpoint (`100-`)
    /// extends to `splat`; a missing first endpoint extends down to 1. As
    /// with `insert`, explicit endpoints may be given in either order.
    pub fn parse(raw: &str, splat: ArtNum) -> Option<Self> {
        fn do_parse(r: &str, if_empty: Option<u32>) -> Option<u32> {
            if r.is_empty() {
                if_empty
            } else {
                r.parse().ok()
            }
        }

        let splat = splat.0.get();

        let mut this = Self::new();
        for part in raw.split(',') {
            let mut subs = part.split('-');
            match (subs.next(), subs.next(), subs.next()) {
                (Some(only), None, None) => {
                    let only = do_parse(only, None)?;
                    this.insert_raw(only, only);
                }
                (Some(start), Some(end), None) => {
                    let start = do_parse(start, Some(1))?;
                    let end = do_parse(end, Some(splat))?;
                    this.insert_raw(start.min(end), end.max(start));
                }
                _ => return None,
            }
        }

        Some(this)
    }

    /// Return the total number of articles in this set.
    pub fn len(&self) -> usize {
        self.parts
            .iter()
            .map(|(start, end)| end - start + 1)
            .sum::<u32>() as usize
    }

    /// Return the maximum article number in this set, raw.
    pub fn max(&self) -> Option<u32> {
        self.parts.values().rev().copied().next()
    }

    /// Return whether this set is empty.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl fmt::Display for ArtRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (ix, (&start, &end)) in self.parts.iter().enumerate() {
            let delim = if 0 == ix { "" } else { "," };

            if start == end {
                write!(f, "{}{}", delim, start)?;
            } else {
                write!(f, "{}{}-{}", delim, start, end)?;
            }
        }

        Ok(())
    }
}

impl fmt::Debug for ArtRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[Articles {}]", self)
    }
}

impl Default for ArtRange {
    fn default() -> Self {
        ArtRange::new()
    }
}

/// A single instruction for editing the marks of a group.
///
/// Marks are identified by their plain names (`read`, `tick`, `reply`, and
/// so on), never by any symbolic alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkCommand {
    /// Add `mark` to every article in `arts`, leaving other articles alone.
    Add { mark: String, arts: ArtRange },
    /// Remove `mark` from every article in `arts`, leaving other articles
    /// alone.
    Delete { mark: String, arts: ArtRange },
    /// Make `arts` the exact set of articles carrying `mark`; articles
    /// outside `arts` lose the mark.
    SetExactly { mark: String, arts: ArtRange },
}

/// A summary of the live articles of a group, in the shape newsreaders ask
/// for when entering a group.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupStatus {
    /// The number of live articles.
    pub count: usize,
    /// The smallest live article number.
    pub min: Option<ArtNum>,
    /// The greatest live article number.
    pub max: Option<ArtNum>,
}

/// The scope of articles an operation applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtScope {
    /// Every live article.
    All,
    /// The live articles falling inside the given set.
    Within(ArtRange),
}

impl ArtScope {
    pub fn admits(&self, num: ArtNum) -> bool {
        match *self {
            ArtScope::All => true,
            ArtScope::Within(ref arts) => arts.contains(num),
        }
    }
}

/// The parsed header data retained for one article, in News Overview shape.
///
/// This is what gets persisted to the article's overview file, so changes
/// here are format changes.
///
/// The three string fields are stored pre-joined with tabs, in overview
/// column order, because that is the only shape anything ever consumes them
/// in. Splitting them apart here would mean re-joining them on every read.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NovRecord {
    /// The number assigned to the article when it was first parsed.
    pub num: ArtNum,
    /// The Message-ID header, including angle brackets, or a synthesised
    /// value if the article has none.
    pub msgid: String,
    /// Subject, from, and date, tab-joined.
    pub begin: String,
    /// References, byte count, and body line count, tab-joined.
    pub mid: String,
    /// The configured extra headers that were present, tab-joined as
    /// `Name: value` fields. May be empty.
    pub end: String,
    /// The modification time of the article file at the instant it was
    /// parsed. If the file's current modification time differs, the record
    /// is stale.
    pub mtime: DateTime<Utc>,
    /// The extra header names that were in effect at parse time. The
    /// record can serve any request whose extra header set is a subset of
    /// this one.
    pub extra: Vec<String>,
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn assert_ar(
        expected_content: &[u32],
        expected_string: &str,
        arts: ArtRange,
    ) {
        let actual: Vec<u32> =
            arts.items(u32::MAX).map(|n| n.0.get()).collect();
        assert_eq!(expected_content, &actual[..]);
        assert_eq!(expected_string, &arts.to_string());
    }

    #[test]
    fn artrange_parsing() {
        assert_ar(&[1], "1", ArtRange::parse("1", ArtNum::u(10)).unwrap());
        assert_ar(
            &[1, 2],
            "1-2",
            ArtRange::parse("1-2", ArtNum::u(10)).unwrap(),
        );
        assert_ar(
            &[1, 2],
            "1-2",
            ArtRange::parse("2-1", ArtNum::u(10)).unwrap(),
        );
        assert_ar(
            &[9, 10],
            "9-10",
            ArtRange::parse("9-", ArtNum::u(10)).unwrap(),
        );
        assert_ar(
            &[1, 2, 3],
            "1-3",
            ArtRange::parse("-3", ArtNum::u(10)).unwrap(),
        );

        assert_ar(
            &[1, 3, 5],
            "1,3,5",
            ArtRange::parse("1,3,5", ArtNum::u(10)).unwrap(),
        );
        assert_ar(
            &[1, 3, 5],
            "1,3,5",
            ArtRange::parse("3,1,5", ArtNum::u(10)).unwrap(),
        );
        assert_ar(
            &[1, 2, 9, 10],
            "1-2,9-10",
            ArtRange::parse("1-2,9-", ArtNum::u(10)).unwrap(),
        );

        // An unordered pair plus the number between them covers the span
        // exactly once
        assert_ar(
            &[3, 4, 5],
            "3-5",
            ArtRange::parse("5-3,4", ArtNum::u(10)).unwrap(),
        );

        // Adjacent ranges
        assert_ar(
            &[1, 2, 3, 4],
            "1-4",
            ArtRange::parse("1,2,3,4", ArtNum::u(10)).unwrap(),
        );
        assert_ar(
            &[1, 2, 3, 4],
            "1-4",
            ArtRange::parse("1-2,3,4", ArtNum::u(10)).unwrap(),
        );
        assert_ar(
            &[1, 2, 3, 4],
            "1-4",
            ArtRange::parse("1,2-3,4", ArtNum::u(10)).unwrap(),
        );
        // Overlapping ranges, one strictly inside another
        assert_ar(
            &[1, 2, 3, 4],
            "1-4",
            ArtRange::parse("1-4,2-3", ArtNum::u(10)).unwrap(),
        );
        assert_ar(
            &[1, 2, 3, 4],
            "1-4",
            ArtRange::parse("2-3,1-4", ArtNum::u(10)).unwrap(),
        );
        // Overlapping ranges with shared endpoint(s)
        assert_ar(
            &[1, 2, 3, 4],
            "1-4",
            ArtRange::parse("1-4,2,4", ArtNum::u(10)).unwrap(),
        );
        assert_ar(
            &[1, 2, 3, 4],
            "1-4",
            ArtRange::parse("1-2,1-4", ArtNum::u(10)).unwrap(),
        );
        // Overlapping ranges, neither a subset of the other
        assert_ar(
            &[1, 2, 3, 4],
            "1-4",
            ArtRange::parse("1,3-2,4", ArtNum::u(10)).unwrap(),
        );

        assert_eq!(None, ArtRange::parse("", ArtNum::u(10)));
        assert_eq!(None, ArtRange::parse("x", ArtNum::u(10)));
        assert_eq!(None, ArtRange::parse("1-2-3", ArtNum::u(10)));
        assert_eq!(None, ArtRange::parse("1,", ArtNum::u(10)));
    }

    #[test]
    fn artrange_append() {
        let mut arts = ArtRange::new();
        arts.append(ArtNum::u(1));
        assert_eq!("1", &arts.to_string());
        arts.append(ArtNum::u(2));
        assert_eq!("1-2", &arts.to_string());
        arts.append(ArtNum::u(3));
        assert_eq!("1-3", &arts.to_string());
        arts.append(ArtNum::u(5));
        assert_eq!("1-3,5", &arts.to_string());
        arts.append(ArtNum::u(6));
        assert_eq!("1-3,5-6", &arts.to_string());
    }

    #[test]
    fn artrange_removal() {
        let mut arts = ArtRange::range(ArtNum::u(1), ArtNum::u(5));
        arts.remove(ArtNum::u(3));
        assert_eq!("1-2,4-5", &arts.to_string());
        arts.remove(ArtNum::u(1));
        assert_eq!("2,4-5", &arts.to_string());
        arts.remove(ArtNum::u(5));
        assert_eq!("2,4", &arts.to_string());
        // Absent articles are no-ops.
        arts.remove(ArtNum::u(3));
        arts.remove(ArtNum::u(9));
        assert_eq!("2,4", &arts.to_string());
        arts.remove(ArtNum::u(2));
        arts.remove(ArtNum::u(4));
        assert!(arts.is_empty());
        arts.remove(ArtNum::u(1));
        assert!(arts.is_empty());
    }

    #[test]
    fn artrange_merging() {
        let mut a = ArtRange::range(ArtNum::u(1), ArtNum::u(3));
        let mut b = ArtRange::just(ArtNum::u(4));
        b.append(ArtNum::u(9));
        a.merge(&b);
        assert_eq!("1-4,9", &a.to_string());
        a.merge(&ArtRange::new());
        assert_eq!("1-4,9", &a.to_string());
    }

    proptest! {
        #[test]
        fn artrange_properties(
            ranges in prop::collection::vec((1u32..30, 1u32..=10), 1..=5)
        ) {
            let mut expected = Vec::new();
            let mut arts = ArtRange::new();

            for &(start, extent) in &ranges {
                arts.insert(ArtNum::u(start), ArtNum::u(start + extent));
                expected.extend((start..=start + extent).into_iter());
            }

            expected.sort();
            expected.dedup();

            // Ensure we built the correct set
            let actual: Vec<u32> = arts.items(u32::MAX).map(
                |n| n.0.get()).collect();
            assert_eq!(expected, actual);

            // contains() works
            for i in 1..50 {
                assert_eq!(
                    expected.contains(&i),
                    arts.contains(ArtNum::u(i)),
                    "Bad contains result for {}",
                    i
                );
            }

            // It can be stringified and parsed back into the same value
            assert_eq!(
                arts,
                ArtRange::parse(&arts.to_string(), ArtNum::MAX).unwrap());
        }
    }
}
