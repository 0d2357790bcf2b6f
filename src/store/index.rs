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

//! The in-memory article table for one group.
//!
//! One `Article` exists per live article file. The table keeps them in
//! ascending number order and exposes newest-first iteration, which is the
//! order readers want; number, prefix, and message-id lookups ride on side
//! maps. Count, minimum, and maximum are derived from the table rather
//! than tracked separately, so they cannot drift out of sync with it.

use std::collections::HashMap;

use crate::store::model::{ArtNum, ArtRange, ArtScope, GroupStatus, NovRecord};

/// One live article, as known in memory.
#[derive(Clone, Debug)]
pub struct Article {
    /// The invariant part of the file name, up to but excluding the first
    /// colon.
    pub prefix: String,
    /// The mutable part of the file name, from the first colon onward.
    /// Empty for a file with no colon.
    pub suffix: String,
    pub num: ArtNum,
    pub msgid: String,
    /// The header summary, if it is currently cached in memory. Bounded by
    /// the group's `NovRing`; a `None` here just means a disk read or
    /// reparse is needed.
    pub nov: Option<NovRecord>,
}

impl Article {
    /// The current file name, prefix and suffix together.
    pub fn file_name(&self) -> String {
        format!("{}{}", self.prefix, self.suffix)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Index {
    /// All live articles, ascending by number.
    arts: Vec<Article>,
    by_prefix: HashMap<String, ArtNum>,
    by_msgid: HashMap<String, ArtNum>,
}

impl Index {
    pub fn new() -> Self {
        Index::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Index {
            arts: Vec::with_capacity(n),
            by_prefix: HashMap::with_capacity(n),
            by_msgid: HashMap::with_capacity(n),
        }
    }

    pub fn len(&self) -> usize {
        self.arts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arts.is_empty()
    }

    pub fn status(&self) -> GroupStatus {
        GroupStatus {
            count: self.arts.len(),
            min: self.arts.first().map(|a| a.num),
            max: self.arts.last().map(|a| a.num),
        }
    }

    pub fn contains_prefix(&self, prefix: &str) -> bool {
        self.by_prefix.contains_key(prefix)
    }

    pub fn num_of_prefix(&self, prefix: &str) -> Option<ArtNum> {
        self.by_prefix.get(prefix).copied()
    }

    pub fn num_of_msgid(&self, msgid: &str) -> Option<ArtNum> {
        self.by_msgid.get(msgid).copied()
    }

    pub fn by_num(&self, num: ArtNum) -> Option<&Article> {
        self.ix_of(num).map(|ix| &self.arts[ix])
    }

    pub fn by_num_mut(&mut self, num: ArtNum) -> Option<&mut Article> {
        match self.ix_of(num) {
            Some(ix) => Some(&mut self.arts[ix]),
            None => None,
        }
    }

    pub fn by_prefix(&self, prefix: &str) -> Option<&Article> {
        self.num_of_prefix(prefix).and_then(move |num| self.by_num(num))
    }

    pub fn by_msgid(&self, msgid: &str) -> Option<&Article> {
        self.num_of_msgid(msgid).and_then(move |num| self.by_num(num))
    }

    /// Add `art` to the table.
    ///
    /// Adding a number that is already present replaces the old entry,
    /// which can only legitimately happen when an article is re-indexed
    /// after its summary was recomputed.
    pub fn add(&mut self, art: Article) {
        match self.arts.binary_search_by_key(&art.num, |a| a.num) {
            Ok(ix) => {
                // Unmap the displaced entry before mapping its successor,
                // since the two usually share a prefix and message id.
                let old = std::mem::replace(&mut self.arts[ix], art);
                self.unmap(&old);
                let art = &self.arts[ix];
                self.by_prefix.insert(art.prefix.clone(), art.num);
                self.by_msgid.insert(art.msgid.clone(), art.num);
            }
            Err(ix) => {
                self.by_prefix.insert(art.prefix.clone(), art.num);
                self.by_msgid.insert(art.msgid.clone(), art.num);
                self.arts.insert(ix, art);
            }
        }
    }

    /// Remove the article numbered `num`, returning its descriptor.
    pub fn remove(&mut self, num: ArtNum) -> Option<Article> {
        let ix = self.ix_of(num)?;
        let old = self.arts.remove(ix);
        self.unmap(&old);
        Some(old)
    }

    /// Iterate over the live articles `scope` admits, newest first.
    ///
    /// Each article is visited at most once no matter how redundantly the
    /// scope describes it.
    pub fn in_scope<'a>(
        &'a self,
        scope: &'a ArtScope,
    ) -> impl Iterator<Item = &'a Article> + 'a {
        self.arts.iter().rev().filter(move |a| scope.admits(a.num))
    }

    /// The numbers `scope` admits, newest first.
    pub fn nums_in_scope(&self, scope: &ArtScope) -> Vec<ArtNum> {
        self.in_scope(scope).map(|a| a.num).collect()
    }

    /// Every live number, as a set.
    pub fn live_range(&self) -> ArtRange {
        let mut arts = ArtRange::new();
        for art in &self.arts {
            arts.append(art.num);
        }
        arts
    }

    fn ix_of(&self, num: ArtNum) -> Option<usize> {
        self.arts.binary_search_by_key(&num, |a| a.num).ok()
    }

    fn unmap(&mut self, old: &Article) {
        // Only drop the side-map entries if they still point at the entry
        // being discarded; `add` may already have claimed them.
        if Some(old.num) == self.num_of_prefix(&old.prefix) {
            self.by_prefix.remove(&old.prefix);
        }
        if Some(old.num) == self.num_of_msgid(&old.msgid) {
            self.by_msgid.remove(&old.msgid);
        }
    }
}

/// A fixed-size ring bounding how many header summaries stay in memory.
///
/// Each slot names the article currently allowed to cache its summary.
/// Claiming a slot evicts whoever held it; the caller is responsible for
/// clearing the evictee's cached summary. An article whose summary is
/// already cached never claims a second slot.
#[derive(Clone, Debug)]
pub struct NovRing {
    slots: Vec<Option<ArtNum>>,
    next: usize,
}

impl NovRing {
    pub fn new(capacity: usize) -> Self {
        NovRing {
            slots: vec![None; capacity.max(1)],
            next: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Give `num` a slot, returning the article evicted to make room.
    pub fn claim(&mut self, num: ArtNum) -> Option<ArtNum> {
        let evicted = self.slots[self.next].replace(num);
        self.next = (self.next + 1) % self.slots.len();
        evicted.filter(|&e| e != num)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn art(num: u32) -> Article {
        Article {
            prefix: format!("{}00.host", num),
            suffix: ":2,".to_owned(),
            num: ArtNum::u(num),
            msgid: format!("<{}@example.com>", num),
            nov: None,
        }
    }

    #[test]
    fn tracks_count_min_max() {
        let mut ix = Index::new();
        assert_eq!(
            GroupStatus {
                count: 0,
                min: None,
                max: None
            },
            ix.status()
        );

        ix.add(art(3));
        ix.add(art(5));
        ix.add(art(4));
        assert_eq!(
            GroupStatus {
                count: 3,
                min: Some(ArtNum::u(3)),
                max: Some(ArtNum::u(5))
            },
            ix.status()
        );

        ix.remove(ArtNum::u(3)).unwrap();
        assert_eq!(Some(ArtNum::u(4)), ix.status().min);
        ix.remove(ArtNum::u(5)).unwrap();
        ix.remove(ArtNum::u(4)).unwrap();
        assert_eq!(
            GroupStatus {
                count: 0,
                min: None,
                max: None
            },
            ix.status()
        );
        assert!(ix.remove(ArtNum::u(4)).is_none());
    }

    #[test]
    fn looks_up_by_num_prefix_and_msgid() {
        let mut ix = Index::new();
        ix.add(art(1));
        ix.add(art(2));

        assert_eq!("100.host", ix.by_num(ArtNum::u(1)).unwrap().prefix);
        assert_eq!(
            Some(ArtNum::u(2)),
            ix.num_of_prefix("200.host")
        );
        assert_eq!(
            Some(ArtNum::u(1)),
            ix.num_of_msgid("<1@example.com>")
        );
        assert_eq!(None, ix.num_of_prefix("300.host"));
        assert_eq!(None, ix.num_of_msgid("<nx@example.com>"));

        ix.by_num_mut(ArtNum::u(1)).unwrap().suffix = ":2,S".to_owned();
        assert_eq!(
            "100.host:2,S",
            ix.by_prefix("100.host").unwrap().file_name()
        );
    }

    #[test]
    fn removal_unmaps_lookups() {
        let mut ix = Index::new();
        ix.add(art(1));
        ix.remove(ArtNum::u(1)).unwrap();
        assert!(!ix.contains_prefix("100.host"));
        assert_eq!(None, ix.num_of_msgid("<1@example.com>"));
    }

    #[test]
    fn readding_a_number_keeps_the_lookups() {
        let mut ix = Index::new();
        ix.add(art(1));

        let mut updated = art(1);
        updated.suffix = ":2,S".to_owned();
        ix.add(updated);

        assert_eq!(1, ix.len());
        assert_eq!(Some(ArtNum::u(1)), ix.num_of_prefix("100.host"));
        assert_eq!(Some(ArtNum::u(1)), ix.num_of_msgid("<1@example.com>"));
        assert_eq!(
            "100.host:2,S",
            ix.by_num(ArtNum::u(1)).unwrap().file_name()
        );
    }

    #[test]
    fn scope_iteration_is_newest_first_without_repeats() {
        let mut ix = Index::new();
        ix.add(art(3));
        ix.add(art(4));
        ix.add(art(5));

        // A scope that names articles redundantly still visits each once.
        let arts =
            ArtRange::parse("5-3,4", ArtNum::MAX).unwrap();
        let scope = ArtScope::Within(arts);
        assert_eq!(
            vec![ArtNum::u(5), ArtNum::u(4), ArtNum::u(3)],
            ix.nums_in_scope(&scope)
        );

        assert_eq!(
            vec![ArtNum::u(5), ArtNum::u(4), ArtNum::u(3)],
            ix.nums_in_scope(&ArtScope::All)
        );

        let narrow = ArtScope::Within(ArtRange::just(ArtNum::u(4)));
        assert_eq!(vec![ArtNum::u(4)], ix.nums_in_scope(&narrow));

        let miss = ArtScope::Within(ArtRange::just(ArtNum::u(9)));
        assert!(ix.nums_in_scope(&miss).is_empty());
    }

    #[test]
    fn live_range_is_the_full_set() {
        let mut ix = Index::new();
        ix.add(art(1));
        ix.add(art(2));
        ix.add(art(5));
        assert_eq!("1-2,5", ix.live_range().to_string());
    }

    #[test]
    fn ring_evicts_oldest_claim() {
        let mut ring = NovRing::new(2);
        assert_eq!(2, ring.capacity());
        assert_eq!(None, ring.claim(ArtNum::u(1)));
        assert_eq!(None, ring.claim(ArtNum::u(2)));
        assert_eq!(Some(ArtNum::u(1)), ring.claim(ArtNum::u(3)));
        assert_eq!(Some(ArtNum::u(2)), ring.claim(ArtNum::u(4)));
        assert_eq!(Some(ArtNum::u(3)), ring.claim(ArtNum::u(5)));
    }

    #[test]
    fn zero_capacity_ring_still_functions() {
        let mut ring = NovRing::new(0);
        assert_eq!(1, ring.capacity());
        assert_eq!(None, ring.claim(ArtNum::u(1)));
        assert_eq!(Some(ArtNum::u(1)), ring.claim(ArtNum::u(2)));
    }
}
