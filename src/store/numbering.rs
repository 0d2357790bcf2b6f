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

//! Allocation of per-group article numbers.
//!
//! An article number, once handed out, must never be handed out again for
//! the lifetime of the group, including across crashes and across several
//! uncoordinated processes allocating at once. There is no lock file and no
//! counter file, since a counter would need read-modify-write.
//!
//! Instead, the `num` control directory holds a base file named `0` plus
//! one file named `N` for every number `N` ever assigned. Number files are
//! created as hardlinks to the base, so the base's link count tallies the
//! names hanging off it: the base plus numbers 1 through k gives a link
//! count of k+1, making `base + link count` the next free number. Link
//! creation is atomic, so of two processes racing for the same number
//! exactly one wins; the loser re-reads the link count, which the winner's
//! link just bumped, and retries one higher.
//!
//! Two abnormal cases move the base forward. When a base reaches the
//! filesystem's maximum link count, the allocation that saw `EMLINK`
//! creates a fresh base at the candidate index and chains onward from
//! there. When the candidate index is occupied by a file that is not part
//! of our chain (the link count refuses to move past it), the walker
//! adopts that file as its base instead. Either way at most one number is
//! skipped, which is harmless; expiry already leaves numbers sparse.
//!
//! Nothing here ever deletes a file, so the chain also encodes history: a
//! number below the high-water mark is never reissued no matter how many
//! of the articles themselves have expired.

use std::convert::TryFrom;
use std::fs;
use std::io;
use std::os::unix::fs::{DirBuilderExt, MetadataExt, OpenOptionsExt};
use std::path::Path;

use crate::store::model::ArtNum;
use crate::support::error::Error;
use crate::support::file_ops::IgnoreKinds;

/// The number allocator for one group.
///
/// This is a lightweight, stateless value that functions more as a "bundle
/// of parameters" than a resource.
#[derive(Debug, Clone, Copy)]
pub struct NumberChain<'a> {
    /// The `num` control directory of the group.
    pub root: &'a Path,
}

impl<'a> NumberChain<'a> {
    /// Allocate the next article number.
    ///
    /// The number returned has never been returned for this group before,
    /// no matter what other processes are doing concurrently.
    pub fn allocate(&self) -> Result<ArtNum, Error> {
        fs::DirBuilder::new()
            .mode(0o770)
            .create(self.root)
            .ignore_already_exists()?;

        let mut open: u32 = 0;
        let mut ensure_base = true;
        let mut last_failed: Option<u32> = None;
        let mut adopted: Option<u32> = None;

        loop {
            let open_path = self.root.join(open.to_string());
            if ensure_base {
                fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(0o600)
                    .open(&open_path)
                    .map(drop)
                    .ignore_already_exists()?;
                ensure_base = false;
            }

            let nlink = match fs::metadata(&open_path) {
                Ok(md) => md.nlink(),
                // Chain files are never removed, so a vanished one means
                // the chain can't be trusted
                Err(e) if io::ErrorKind::NotFound == e.kind() => {
                    return Err(Error::CorruptNumChain);
                }
                Err(e) => return Err(e.into()),
            };
            let candidate = u32::try_from(nlink)
                .ok()
                .and_then(|n| open.checked_add(n))
                .ok_or(Error::CorruptNumChain)?;

            let candidate_path = self.root.join(candidate.to_string());
            match nix::unistd::linkat(
                None,
                &open_path,
                None,
                &candidate_path,
                nix::unistd::LinkatFlags::SymlinkFollow,
            ) {
                Ok(()) => {
                    return ArtNum::of(candidate)
                        .ok_or(Error::CorruptNumChain);
                }
                Err(nix::Error::Sys(nix::errno::Errno::EEXIST)) => {
                    if Some(candidate) == last_failed {
                        // The link count refuses to move past this index,
                        // so the occupying file is not part of our chain.
                        // Adopt it as the new base; if we already did that
                        // and the count still won't move, the counts being
                        // reported are impossible.
                        if Some(candidate) == adopted {
                            return Err(Error::CorruptNumChain);
                        }
                        adopted = Some(candidate);
                        open = candidate;
                    } else {
                        last_failed = Some(candidate);
                    }
                }
                Err(nix::Error::Sys(nix::errno::Errno::EMLINK)) => {
                    open = candidate;
                    ensure_base = true;
                    last_failed = None;
                    adopted = None;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;
    use std::fs;
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn sequential_allocations_are_dense() {
        let root = tempfile::TempDir::new().unwrap();
        let chain = NumberChain { root: root.path() };

        for i in 1..=100u32 {
            assert_eq!(i, chain.allocate().unwrap().0.get());
        }
    }

    #[test]
    fn interleaved_allocators_never_collide() {
        let root = tempfile::TempDir::new().unwrap();
        let a = NumberChain { root: root.path() };
        let b = NumberChain { root: root.path() };

        let mut seen = HashSet::new();
        for _ in 0..50 {
            assert!(seen.insert(a.allocate().unwrap()));
            assert!(seen.insert(b.allocate().unwrap()));
        }
    }

    #[test]
    fn parallel_allocations_are_distinct() {
        use rayon::prelude::*;

        let root = tempfile::TempDir::new().unwrap();
        let issued = Mutex::new(Vec::new());

        (0..8).into_par_iter().for_each(|_| {
            let chain = NumberChain { root: root.path() };
            let mut mine = Vec::new();
            for _ in 0..200 {
                mine.push(chain.allocate().unwrap());
            }
            issued.lock().unwrap().extend(mine);
        });

        let issued = issued.into_inner().unwrap();
        assert_eq!(1600, issued.len());
        let distinct: HashSet<_> = issued.iter().copied().collect();
        assert_eq!(1600, distinct.len());
    }

    #[test]
    fn removing_highest_never_reissues_lower() {
        let root = tempfile::TempDir::new().unwrap();
        let chain = NumberChain { root: root.path() };

        let mut max = 0;
        for _ in 0..50 {
            max = chain.allocate().unwrap().0.get();
        }
        assert_eq!(50, max);

        fs::remove_file(root.path().join("50")).unwrap();
        assert!(chain.allocate().unwrap().0.get() >= max);
    }

    #[test]
    fn foreign_file_at_candidate_is_stepped_over() {
        let root = tempfile::TempDir::new().unwrap();
        let chain = NumberChain { root: root.path() };

        for _ in 0..10 {
            chain.allocate().unwrap();
        }
        // An independent file squats on the next candidate
        fs::File::create(root.path().join("11")).unwrap();

        let next = chain.allocate().unwrap().0.get();
        assert!(next > 11, "allocated {}", next);
        // 11 stays burned; allocation keeps moving afterwards
        let after = chain.allocate().unwrap().0.get();
        assert!(after > next);
    }

    #[test]
    fn foreign_file_at_first_number() {
        let root = tempfile::TempDir::new().unwrap();
        fs::File::create(root.path().join("1")).unwrap();

        let chain = NumberChain { root: root.path() };
        assert_eq!(2, chain.allocate().unwrap().0.get());
        assert_eq!(3, chain.allocate().unwrap().0.get());
    }
}
