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

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, warn};

use super::defs::*;
use crate::store::dir_list;
use crate::store::flags;
use crate::store::index::Article;
use crate::store::model::{ArtNum, NovRecord};
use crate::store::nov;
use crate::support::error::Error;

impl Group {
    /// Find the file currently holding the article named by `prefix`.
    ///
    /// Other processes rename article files whenever they flip a flag, and
    /// deliveries sit in `new` until a scan promotes them, so the name we
    /// recorded is only a hint. The fast paths cover the overwhelmingly
    /// common cases; as a last resort both article directories are listed
    /// in full, since falsely concluding an article is gone expires it.
    ///
    /// Returns the path and the suffix the file was actually found under.
    pub(super) fn locate(
        &self,
        prefix: &str,
        suffix: &str,
    ) -> Option<(PathBuf, String)> {
        for dir in self.article_dirs() {
            let hinted = dir.join(format!("{}{}", prefix, suffix));
            if hinted.is_file() {
                return Some((hinted, suffix.to_owned()));
            }
        }

        // Delivered but not yet promoted out of new
        let fresh = self.new_dir.join(prefix);
        if fresh.is_file() {
            return Some((fresh, String::new()));
        }

        // Promoted with the default flags marker while we still remembered
        // the bare name
        let promoted = self.cur_dir.join(format!("{}:2,", prefix));
        if promoted.is_file() {
            return Some((promoted, ":2,".to_owned()));
        }

        for dir in self.article_dirs() {
            let listed = match dir_list::visible_names(dir) {
                Ok(listed) => listed,
                Err(_) => continue,
            };
            for name in listed {
                let (p, s) = flags::split_name(&name);
                if p == prefix {
                    return Some((dir.join(&name), s.to_owned()));
                }
            }
        }
        None
    }

    /// Compute or reuse the persisted header summary for the article file
    /// at `path`.
    ///
    /// Returns `None` if the file disappeared, which the caller must treat
    /// as the article having expired. A fresh number is allocated only if
    /// no previously persisted summary names one, so an article keeps its
    /// number for as long as its summary file survives.
    pub(super) fn summarize_file(
        &self,
        path: &Path,
        prefix: &str,
    ) -> Result<Option<NovRecord>, Error> {
        let mtime = match fs::metadata(path) {
            Ok(md) => DateTime::<Utc>::from(md.modified()?),
            Err(e) if io::ErrorKind::NotFound == e.kind() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let persisted = nov::load(&self.nov_dir, prefix)?;
        if let Some(ref record) = persisted {
            if nov::is_current(record, mtime, &self.extra_headers) {
                return Ok(Some(record.clone()));
            }
        }

        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if io::ErrorKind::NotFound == e.kind() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let num = match persisted {
            Some(record) => record.num,
            None => self.number_chain().allocate()?,
        };

        let record =
            nov::build_record(num, prefix, &data, mtime, &self.extra_headers);
        nov::store(&self.nov_dir, prefix, &record)?;
        Ok(Some(record))
    }

    /// Return the header summary for article `num`, recomputing it if the
    /// file changed since it was last parsed.
    ///
    /// `Ok(None)` means the article file is gone; the descriptor has
    /// already been expired by the time that returns.
    pub fn get_or_refresh(
        &mut self,
        num: ArtNum,
    ) -> Result<Option<NovRecord>, Error> {
        let (prefix, suffix) = match self.index.by_num(num) {
            Some(art) => (art.prefix.clone(), art.suffix.clone()),
            None => return Err(Error::NxArticle),
        };

        let (path, observed) = match self.locate(&prefix, &suffix) {
            Some(found) => found,
            None => {
                self.expire_descriptor(num);
                return Ok(None);
            }
        };
        if observed != suffix {
            if let Some(art) = self.index.by_num_mut(num) {
                art.suffix = observed.clone();
            }
        }

        let mtime = match fs::metadata(&path) {
            Ok(md) => DateTime::<Utc>::from(md.modified()?),
            Err(e) if io::ErrorKind::NotFound == e.kind() => {
                self.expire_descriptor(num);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(art) = self.index.by_num(num) {
            if let Some(ref record) = art.nov {
                if nov::is_current(record, mtime, &self.extra_headers) {
                    return Ok(Some(record.clone()));
                }
            }
        }

        let record = match self.summarize_file(&path, &prefix)? {
            Some(record) => record,
            None => {
                self.expire_descriptor(num);
                return Ok(None);
            }
        };

        // A reparse can re-identify the article, and if the summary file
        // was replaced behind our back, even renumber it. Rebuild the
        // descriptor if so.
        let matches = self
            .index
            .by_num(num)
            .map(|art| num == record.num && art.msgid == record.msgid)
            .unwrap_or(false);
        if !matches {
            self.index.remove(num);
            self.index.add(Article {
                prefix,
                suffix: observed,
                num: record.num,
                msgid: record.msgid.clone(),
                nov: None,
            });
        }

        self.cache_summary(record.clone());
        Ok(Some(record))
    }

    /// Remember `record` in memory, within the cache budget.
    pub(super) fn cache_summary(&mut self, record: NovRecord) {
        let num = record.num;
        let needs_slot = match self.index.by_num(num) {
            Some(art) => art.nov.is_none(),
            None => return,
        };

        if needs_slot {
            if let Some(evicted) = self.ring.claim(num) {
                if let Some(old) = self.index.by_num_mut(evicted) {
                    old.nov = None;
                }
            }
        }
        if let Some(art) = self.index.by_num_mut(num) {
            art.nov = Some(record);
        }
    }

    /// Drop article `num` from the index because its file is gone, and
    /// clean up its summary file.
    ///
    /// Hardlinks under the mark directories are deliberately left behind;
    /// prefixes are never reused, so a dead link can never be mistaken for
    /// a live article, and mark computation only reports live ones.
    pub(super) fn expire_descriptor(&mut self, num: ArtNum) {
        if let Some(art) = self.index.remove(num) {
            debug!("{} Article {} expired", self.log_prefix, num.0);
            if let Err(e) = nov::delete(&self.nov_dir, &art.prefix) {
                warn!(
                    "{} Failed to remove header summary for '{}': {}",
                    self.log_prefix, art.prefix, e
                );
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::super::test_prelude::*;
    use crate::store::model::ArtNum;

    #[test]
    fn summaries_survive_and_follow_renames() {
        let mut setup = set_up();
        deliver_file(&setup.group, "100.host", b"Subject: one\n\nbody\n");
        setup.group.scan().unwrap();

        let num = ArtNum::u(1);
        let record = setup.group.get_or_refresh(num).unwrap().unwrap();
        assert_eq!("one\t\t", record.begin);

        // A foreign flag flip moves the file; the summary must follow.
        fs::rename(
            setup.group.cur_dir.join("100.host:2,"),
            setup.group.cur_dir.join("100.host:2,S"),
        )
        .unwrap();
        let record2 = setup.group.get_or_refresh(num).unwrap().unwrap();
        assert_eq!(record.num, record2.num);
        assert_eq!(
            ":2,S",
            setup.group.index.by_num(num).unwrap().suffix
        );
    }

    #[test]
    fn touching_the_file_forces_reparse_but_keeps_the_number() {
        let mut setup = set_up();
        deliver_file(&setup.group, "100.host", b"Subject: one\n\nbody\n");
        setup.group.scan().unwrap();

        let num = ArtNum::u(1);
        let before = setup.group.get_or_refresh(num).unwrap().unwrap();

        // Rewrite the content; the number must survive the reparse.
        let path = setup.group.cur_dir.join("100.host:2,");
        fs::write(&path, b"Subject: two\n\nbody\n").unwrap();
        set_mtime_ahead(&path, 2);

        let after = setup.group.get_or_refresh(num).unwrap().unwrap();
        assert_eq!(before.num, after.num);
        assert_eq!("two\t\t", after.begin);
    }

    #[test]
    fn vanished_articles_expire() {
        let mut setup = set_up();
        deliver_file(&setup.group, "100.host", b"Subject: one\n\nbody\n");
        deliver_file(&setup.group, "200.host", b"Subject: two\n\nbody\n");
        setup.group.scan().unwrap();
        assert_eq!(2, setup.group.status().count);

        fs::remove_file(setup.group.cur_dir.join("100.host:2,")).unwrap();
        assert_eq!(
            None,
            setup.group.get_or_refresh(ArtNum::u(1)).unwrap()
        );
        assert_eq!(1, setup.group.status().count);
        assert_eq!(Some(ArtNum::u(2)), setup.group.status().min);
        // The persisted summary went with it.
        assert!(!setup.group.nov_dir.join("100.host").exists());
    }
}
