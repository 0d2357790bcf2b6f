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

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::Path;

use log::debug;
use nix::errno::Errno;

use super::defs::*;
use crate::store::dir_list;
use crate::store::flags;
use crate::store::model::{ArtNum, ArtRange, ArtScope, MarkCommand};
use crate::support::error::Error;
use crate::support::file_ops::{self, IgnoreKinds};
use crate::support::safe_name::is_safe_name;

impl Group {
    /// Compute the membership of every known mark.
    ///
    /// Known marks are the four flag-backed ones plus any mark that has a
    /// subdirectory on disk, so marks written by other processes are
    /// reported even if this process never heard their names before.
    pub fn compute_marks(
        &mut self,
    ) -> Result<BTreeMap<String, ArtRange>, Error> {
        let mut known: BTreeSet<String> = flags::FLAG_MARKS
            .iter()
            .map(|&(_, mark)| mark.to_owned())
            .collect();
        known.extend(
            dir_list::visible_dirs(&self.marks_dir).unwrap_or_default(),
        );

        let mut out = BTreeMap::new();
        for mark in known {
            let range = self.mark_range(&mark)?;
            out.insert(mark, range);
        }
        Ok(out)
    }

    /// Compute the set of live articles carrying `mark`.
    ///
    /// Membership is recomputed from the file system only when the
    /// relevant modification times moved; otherwise the answer from the
    /// previous computation is reused as-is.
    pub fn mark_range(&mut self, mark: &str) -> Result<ArtRange, Error> {
        let flag = flags::flag_of_mark(mark);
        let subdir = self.mark_dir(mark);

        let sub_mtime = fs::metadata(&subdir)
            .ok()
            .and_then(|md| md.modified().ok());
        let observed = match flag {
            // Flag renames land in cur, so it counts as a change source
            // alongside the mark's own subdirectory.
            Some(_) => {
                let cur = fs::metadata(&self.cur_dir)?.modified()?;
                Some(sub_mtime.map_or(cur, |sub| sub.max(cur)))
            }
            None => sub_mtime,
        };

        if let (Some(obs), Some(last)) =
            (observed, self.mark_mtimes.get(mark))
        {
            if obs == *last {
                return Ok(self
                    .mark_ranges
                    .get(mark)
                    .cloned()
                    .unwrap_or_default());
            }
        }

        let range = if self.always_marks.iter().any(|m| m == mark) {
            self.index.live_range()
        } else if self.never_marks.iter().any(|m| m == mark) {
            ArtRange::new()
        } else {
            self.rescan_mark(mark, flag, &subdir)?
        };

        if let Some(obs) = observed {
            self.mark_mtimes.insert(mark.to_owned(), obs);
        }
        self.mark_ranges.insert(mark.to_owned(), range.clone());
        Ok(range)
    }

    fn rescan_mark(
        &mut self,
        mark: &str,
        flag: Option<char>,
        subdir: &Path,
    ) -> Result<ArtRange, Error> {
        let mut range = ArtRange::new();

        if let Ok(names) = dir_list::visible_names(subdir) {
            for name in names {
                // Skip the link template
                if ":" == name {
                    continue;
                }
                if let Some(num) = self.index.num_of_prefix(&name) {
                    range.insert(num, num);
                }
            }
        }

        match flag {
            Some(flag) => {
                // A pass over the file names answers the flag question
                // for every article actually listed, and incidentally
                // refreshes any suffix another process renamed.
                let mut unflagged = Vec::new();
                for name in dir_list::visible_names(&self.cur_dir)? {
                    let (prefix, suffix) = flags::split_name(&name);
                    let num = match self.index.num_of_prefix(prefix) {
                        Some(num) => num,
                        None => continue,
                    };

                    if let Some(art) = self.index.by_num_mut(num) {
                        if art.suffix != suffix {
                            art.suffix = suffix.to_owned();
                        }
                    }
                    if flags::has_flag(suffix, flag) {
                        range.insert(num, num);
                    } else {
                        unflagged.push(num);
                    }
                }

                // An article observed without the flag has affirmatively
                // been unmarked. One whose file was not listed at all is
                // inconclusive and keeps its previous membership.
                if let Some(prev) = self.mark_ranges.get(mark) {
                    let mut keep = prev.clone();
                    for num in unflagged {
                        keep.remove(num);
                    }
                    range.merge(&keep);
                }
            }
            // With no flag character there is no way to observe removal,
            // so previously-known members stay until we remove them
            // ourselves.
            None => {
                if let Some(prev) = self.mark_ranges.get(mark) {
                    range.merge(prev);
                }
            }
        }

        Ok(range)
    }

    /// Apply a batch of mark edits.
    pub fn update_marks(
        &mut self,
        commands: &[MarkCommand],
    ) -> Result<(), Error> {
        self.not_read_only()?;

        for command in commands {
            match *command {
                MarkCommand::Add {
                    ref mark,
                    ref arts,
                } => self.mark_arts(mark, arts, true)?,
                MarkCommand::Delete {
                    ref mark,
                    ref arts,
                } => self.mark_arts(mark, arts, false)?,
                MarkCommand::SetExactly {
                    ref mark,
                    ref arts,
                } => {
                    self.check_mark_name(mark)?;
                    for num in self.index.nums_in_scope(&ArtScope::All) {
                        self.mark_one(mark, num, arts.contains(num))?;
                    }
                }
            }
        }
        Ok(())
    }

    fn mark_arts(
        &mut self,
        mark: &str,
        arts: &ArtRange,
        want: bool,
    ) -> Result<(), Error> {
        self.check_mark_name(mark)?;
        let scope = ArtScope::Within(arts.clone());
        for num in self.index.nums_in_scope(&scope) {
            self.mark_one(mark, num, want)?;
        }
        Ok(())
    }

    fn check_mark_name(&self, mark: &str) -> Result<(), Error> {
        if is_safe_name(mark) {
            Ok(())
        } else {
            Err(Error::UnsafeName)
        }
    }

    /// Add or remove one mark on one article, in both representations.
    fn mark_one(
        &mut self,
        mark: &str,
        num: ArtNum,
        want: bool,
    ) -> Result<(), Error> {
        if let Some(flag) = flags::flag_of_mark(mark) {
            if !self.set_flag(num, flag, want)? {
                // The article file is gone; its descriptor is too by now.
                return Ok(());
            }
        }

        let prefix = match self.index.by_num(num) {
            Some(art) => art.prefix.clone(),
            None => return Ok(()),
        };
        let subdir = self.mark_dir(mark);
        if want {
            self.link_mark(&subdir, &prefix)?;
        } else {
            fs::remove_file(subdir.join(&prefix)).ignore_not_found()?;
        }

        let range = self.mark_ranges.entry(mark.to_owned()).or_default();
        if want {
            range.insert(num, num);
        } else {
            range.remove(num);
        }
        Ok(())
    }

    /// Flip `flag` on article `num`'s file name.
    ///
    /// Returns false if the article file no longer exists.
    fn set_flag(
        &mut self,
        num: ArtNum,
        flag: char,
        want: bool,
    ) -> Result<bool, Error> {
        let (prefix, suffix) = match self.index.by_num(num) {
            Some(art) => (art.prefix.clone(), art.suffix.clone()),
            None => return Ok(false),
        };

        let new_suffix = if want {
            flags::with_flag(&suffix, flag)?
        } else {
            flags::without_flag(&suffix, flag)?
        };
        if new_suffix == suffix {
            return Ok(true);
        }

        let from = self.cur_dir.join(format!("{}{}", prefix, suffix));
        let to = self.cur_dir.join(format!("{}{}", prefix, new_suffix));
        match fs::rename(&from, &to) {
            Ok(()) => {
                if let Some(art) = self.index.by_num_mut(num) {
                    art.suffix = new_suffix;
                }
                Ok(true)
            }
            Err(e) if io::ErrorKind::NotFound == e.kind() => {
                // Take one stab at refreshing a stale name before
                // concluding the article is gone.
                match self.locate(&prefix, &suffix) {
                    Some((found, observed)) => {
                        let retarget = if want {
                            flags::with_flag(&observed, flag)?
                        } else {
                            flags::without_flag(&observed, flag)?
                        };
                        let to = self
                            .cur_dir
                            .join(format!("{}{}", prefix, retarget));
                        if found != to {
                            fs::rename(&found, &to)?;
                        }
                        if let Some(art) = self.index.by_num_mut(num) {
                            art.suffix = retarget;
                        }
                        Ok(true)
                    }
                    None => {
                        self.expire_descriptor(num);
                        Ok(false)
                    }
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Record `prefix` in the mark directory `subdir` by hardlinking the
    /// `:` template.
    ///
    /// Hardlinking rather than creating fresh files means membership can
    /// be added without ever observing a partially-written entry, at the
    /// cost of having to mint a new template when the old one runs out of
    /// links.
    fn link_mark(&self, subdir: &Path, prefix: &str) -> Result<(), Error> {
        fs::DirBuilder::new()
            .recursive(true)
            .mode(0o770)
            .create(subdir)?;

        let template = subdir.join(":");
        let target = subdir.join(prefix);
        loop {
            fs::OpenOptions::new()
                .write(true)
                .create(true)
                .mode(0o600)
                .open(&template)
                .map(drop)?;

            match nix::unistd::linkat(
                None,
                &template,
                None,
                &target,
                nix::unistd::LinkatFlags::SymlinkFollow,
            ) {
                Ok(()) => return Ok(()),
                // Already marked
                Err(nix::Error::Sys(Errno::EEXIST)) => return Ok(()),
                Err(nix::Error::Sys(Errno::EMLINK)) => {
                    // The template exhausted its link count; replace it
                    // with a fresh inode and keep going.
                    debug!(
                        "{} Replacing exhausted mark template {:?}",
                        self.log_prefix, template
                    );
                    file_ops::spit(subdir, &template, true, 0o600, b"")?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::super::test_prelude::*;
    use super::*;

    fn two_article_group() -> Setup {
        let mut setup = set_up();
        fs::write(setup.group.cur_dir.join("100.host:2,"), b"Subject: a\n\n")
            .unwrap();
        fs::write(setup.group.cur_dir.join("200.host:2,S"), b"Subject: b\n\n")
            .unwrap();
        setup.group.scan().unwrap();
        setup
    }

    #[test]
    fn flag_backed_marks_follow_file_names() {
        let mut setup = two_article_group();

        let marks = setup.group.compute_marks().unwrap();
        assert_eq!("2", marks["read"].to_string());
        assert!(marks["tick"].is_empty());
        assert!(marks["reply"].is_empty());
        assert!(marks["forward"].is_empty());
    }

    #[test]
    fn unknown_mark_reads_as_empty_without_side_effects() {
        let mut setup = two_article_group();
        assert!(setup.group.mark_range("keep").unwrap().is_empty());
        assert!(!setup.group.mark_dir("keep").exists());
    }

    #[test]
    fn adding_a_flag_mark_renames_and_links() {
        let mut setup = two_article_group();

        setup
            .group
            .update_marks(&[MarkCommand::Add {
                mark: "tick".to_owned(),
                arts: ArtRange::just(ArtNum::u(1)),
            }])
            .unwrap();

        assert!(setup.group.cur_dir.join("100.host:2,F").is_file());
        assert!(!setup.group.cur_dir.join("100.host:2,").exists());
        assert!(setup
            .group
            .mark_dir("tick")
            .join("100.host")
            .is_file());
        assert_eq!("1", setup.group.mark_range("tick").unwrap().to_string());

        // Idempotent: marking again changes nothing.
        setup
            .group
            .update_marks(&[MarkCommand::Add {
                mark: "tick".to_owned(),
                arts: ArtRange::just(ArtNum::u(1)),
            }])
            .unwrap();
        assert!(setup.group.cur_dir.join("100.host:2,F").is_file());
        assert_eq!("1", setup.group.mark_range("tick").unwrap().to_string());
    }

    #[test]
    fn deleting_a_mark_unflags_and_unlinks() {
        let mut setup = two_article_group();

        setup
            .group
            .update_marks(&[MarkCommand::Delete {
                mark: "read".to_owned(),
                arts: ArtRange::just(ArtNum::u(2)),
            }])
            .unwrap();

        assert!(setup.group.cur_dir.join("200.host:2,").is_file());
        assert!(!setup.group.cur_dir.join("200.host:2,S").exists());
        assert!(setup.group.mark_range("read").unwrap().is_empty());
    }

    #[test]
    fn set_exactly_flips_both_ways() {
        let mut setup = two_article_group();

        setup
            .group
            .update_marks(&[MarkCommand::SetExactly {
                mark: "read".to_owned(),
                arts: ArtRange::just(ArtNum::u(1)),
            }])
            .unwrap();

        assert!(setup.group.cur_dir.join("100.host:2,S").is_file());
        assert!(setup.group.cur_dir.join("200.host:2,").is_file());
        assert_eq!("1", setup.group.mark_range("read").unwrap().to_string());
    }

    #[test]
    fn directory_marks_are_sticky_until_deleted_by_us() {
        let mut setup = two_article_group();

        setup
            .group
            .update_marks(&[MarkCommand::Add {
                mark: "keep".to_owned(),
                arts: ArtRange::just(ArtNum::u(1)),
            }])
            .unwrap();
        assert_eq!("1", setup.group.mark_range("keep").unwrap().to_string());

        // Another process removing the link does not unmark: with no flag
        // character there is no affirmative removal to observe.
        fs::remove_file(setup.group.mark_dir("keep").join("100.host"))
            .unwrap();
        set_mtime_ahead(&setup.group.mark_dir("keep"), 2);
        assert_eq!("1", setup.group.mark_range("keep").unwrap().to_string());

        // Our own delete does unmark.
        setup
            .group
            .update_marks(&[MarkCommand::Delete {
                mark: "keep".to_owned(),
                arts: ArtRange::just(ArtNum::u(1)),
            }])
            .unwrap();
        assert!(setup.group.mark_range("keep").unwrap().is_empty());
    }

    #[test]
    fn always_and_never_marks_override_disk_state() {
        let setup = set_up();
        let mut settings = test_settings();
        settings.always_marks = vec!["tick".to_owned()];
        settings.never_marks = vec!["read".to_owned()];
        let mut group = Group::new(
            "server",
            "misc.test".to_owned(),
            setup.root.path(),
            settings,
        );

        fs::write(setup.group.cur_dir.join("100.host:2,S"), b"Subject: a\n\n")
            .unwrap();
        group.scan().unwrap();

        assert_eq!("1", group.mark_range("tick").unwrap().to_string());
        assert!(group.mark_range("read").unwrap().is_empty());
    }

    #[test]
    fn foreign_flag_renames_are_noticed() {
        let mut setup = two_article_group();
        assert_eq!("2", setup.group.mark_range("read").unwrap().to_string());

        fs::rename(
            setup.group.cur_dir.join("100.host:2,"),
            setup.group.cur_dir.join("100.host:2,S"),
        )
        .unwrap();
        set_mtime_ahead(&setup.group.cur_dir, 2);

        assert_eq!(
            "1-2",
            setup.group.mark_range("read").unwrap().to_string()
        );
        // The rescan refreshed the renamed suffix too.
        assert_eq!(
            ":2,S",
            setup.group.index.by_num(ArtNum::u(1)).unwrap().suffix
        );
    }

    #[test]
    fn bad_mark_names_are_rejected_before_mutation() {
        let mut setup = two_article_group();
        assert_matches!(
            Err(Error::UnsafeName),
            setup.group.update_marks(&[MarkCommand::Add {
                mark: "../escape".to_owned(),
                arts: ArtRange::just(ArtNum::u(1)),
            }])
        );
    }

    #[test]
    fn read_only_groups_refuse_mark_edits() {
        let setup = set_up();
        let mut settings = test_settings();
        settings.read_only = true;
        let mut group = Group::new(
            "server",
            "misc.test".to_owned(),
            setup.root.path(),
            settings,
        );
        assert_matches!(
            Err(Error::GroupReadOnly),
            group.update_marks(&[MarkCommand::Add {
                mark: "tick".to_owned(),
                arts: ArtRange::just(ArtNum::u(1)),
            }])
        );
    }
}
