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

use std::collections::HashSet;
use std::fs;
use std::io;
use std::os::unix::fs::{DirBuilderExt, MetadataExt};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use log::{debug, info, warn};

use super::defs::*;
use crate::store::dir_list;
use crate::store::flags;
use crate::store::index::{Article, Index, NovRing};
use crate::store::model::{ArtNum, ArtScope};
use crate::support::error::Error;

/// How long a staging file may sit in `tmp` before it is presumed to be
/// debris left by a crashed delivery.
const TMP_MAX_AGE: Duration = Duration::from_secs(36 * 3600);

impl Group {
    /// Verify that this group's directory is a plausible maildir.
    pub fn check_valid(&self) -> Result<(), Error> {
        if self.root.is_dir()
            && self.tmp_dir.is_dir()
            && self.new_dir.is_dir()
            && self.cur_dir.is_dir()
        {
            Ok(())
        } else {
            Err(Error::NotAMaildir)
        }
    }

    /// Bring the in-memory picture of this group up to date with the
    /// maildir.
    ///
    /// This is safe to run at any time, concurrently with deliveries and
    /// with other processes scanning the same directory; everything it
    /// repairs or records is either derived data or protected by the
    /// atomicity of rename and link.
    pub fn scan(&mut self) -> Result<(), Error> {
        self.check_valid()?;

        if !self.discovered {
            self.discover()?;
        }

        if !self.read_only {
            self.sweep_tmp()?;
        }
        self.check_same_device()?;
        if !self.read_only {
            self.promote_new()?;
        }

        // Sample the watched directory's mtime before reading its
        // contents. Anything landing after this sample but before the
        // listing gets indexed now AND keeps the directory looking
        // changed next scan, which is merely redundant, never lossy.
        let observed = fs::metadata(self.watched_dir())?.modified()?;
        if Some(observed) == self.watched_mtime {
            return Ok(());
        }

        self.index_new_articles()?;
        self.watched_mtime = Some(observed);
        Ok(())
    }

    /// Once-per-lifetime setup: create the control directories and size
    /// the caches.
    fn discover(&mut self) -> Result<(), Error> {
        for dir in &[&self.nov_dir, &self.num_dir, &self.marks_dir] {
            fs::DirBuilder::new()
                .recursive(true)
                .mode(0o770)
                .create(dir)?;
        }

        let new_count = dir_list::visible_names(&self.new_dir)?.len();
        let cur_names = dir_list::visible_names(&self.cur_dir)?;

        // The cache only needs to cover the articles a reader is likely to
        // look at soon, which is roughly the unread and flagged ones.
        let capacity = match self.cache_override {
            Some(capacity) => capacity,
            None => {
                let unread = cur_names
                    .iter()
                    .filter(|name| {
                        let (_, suffix) = flags::split_name(name);
                        !flags::has_flag(suffix, 'S')
                    })
                    .count();
                let ticked = dir_list::visible_names(&self.mark_dir("tick"))
                    .map(|names| names.len())
                    .unwrap_or(0);
                (new_count + unread + ticked).max(16)
            }
        };

        self.ring = NovRing::new(capacity);
        self.index = Index::with_capacity(new_count + cur_names.len());
        self.discovered = true;
        debug!(
            "{} Discovered group, caching up to {} summaries",
            self.log_prefix, capacity
        );
        Ok(())
    }

    /// Remove staging debris left behind by crashed deliveries.
    ///
    /// A file that is hardlinked elsewhere finished the delivery step and
    /// only missed its cleanup, so it can go no matter how new it is.
    fn sweep_tmp(&self) -> Result<(), Error> {
        let now = SystemTime::now();
        for name in dir_list::visible_names(&self.tmp_dir)? {
            let path = self.tmp_dir.join(&name);
            let md = match fs::metadata(&path) {
                Ok(md) => md,
                Err(e) if io::ErrorKind::NotFound == e.kind() => continue,
                Err(e) => return Err(e.into()),
            };

            let expired = md
                .modified()
                .ok()
                .and_then(|mtime| now.duration_since(mtime).ok())
                .map(|age| age > TMP_MAX_AGE)
                .unwrap_or(false);
            if !expired && md.nlink() <= 1 {
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => info!(
                    "{} Removed stale staging file '{}'",
                    self.log_prefix, name
                ),
                Err(e) => warn!(
                    "{} Failed to remove stale staging file '{}': {}",
                    self.log_prefix, name, e
                ),
            }
        }
        Ok(())
    }

    /// Deliveries hardlink between `tmp` and `new`, and flag changes
    /// rename between `new` and `cur`, so all three must be on one file
    /// system for those operations to stay atomic.
    fn check_same_device(&self) -> Result<(), Error> {
        let tmp = fs::metadata(&self.tmp_dir)?.dev();
        let new = fs::metadata(&self.new_dir)?.dev();
        let cur = fs::metadata(&self.cur_dir)?.dev();
        if tmp == new && new == cur {
            Ok(())
        } else {
            Err(Error::CrossDevice)
        }
    }

    /// Promote settled deliveries from `new` into `cur`.
    ///
    /// Files whose modification time has not yet passed are left alone in
    /// case the writer is still in the middle of its delivery dance.
    fn promote_new(&self) -> Result<(), Error> {
        let now = SystemTime::now();
        for name in dir_list::visible_names(&self.new_dir)? {
            let path = self.new_dir.join(&name);
            let md = match fs::metadata(&path) {
                Ok(md) => md,
                Err(e) if io::ErrorKind::NotFound == e.kind() => continue,
                Err(e) => return Err(e.into()),
            };
            if md.modified()? >= now {
                continue;
            }

            let mut target = name.clone();
            if !target.contains(":2,") {
                target.push_str(":2,");
            }
            match fs::rename(&path, self.cur_dir.join(&target)) {
                Ok(()) => debug!("{} Promoted '{}'", self.log_prefix, name),
                // Another process beat us to it
                Err(e) if io::ErrorKind::NotFound == e.kind() => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Reconcile the index against the article files actually on disk:
    /// index files we have not seen before and expire descriptors whose
    /// files are gone.
    fn index_new_articles(&mut self) -> Result<(), Error> {
        // A writable group's articles all live in cur once promoted. A
        // read-only group never promotes, but its cur may hold articles
        // from before it was frozen, so both directories count.
        let mut dirs = vec![self.watched_dir()];
        if self.read_only {
            dirs.push(self.cur_dir.as_path());
        }

        let mut present: HashSet<String> = HashSet::new();
        let mut fresh: Vec<(String, String, PathBuf)> = Vec::new();
        for dir in dirs {
            for name in dir_list::visible_names(dir)? {
                let (prefix, suffix) = flags::split_name(&name);
                if !present.insert(prefix.to_owned()) {
                    continue;
                }
                if !self.index.contains_prefix(prefix) {
                    fresh.push((
                        prefix.to_owned(),
                        suffix.to_owned(),
                        dir.join(&name),
                    ));
                }
            }
        }

        self.expire_vanished(&present);

        // Number assignment follows delivery order, so older articles get
        // smaller numbers.
        fresh.sort_by(|a, b| {
            dir_list::delivery_key(&a.0).cmp(&dir_list::delivery_key(&b.0))
        });

        let mut added = 0;
        for (prefix, suffix, path) in fresh {
            let record = match self.summarize_file(&path, &prefix)? {
                Some(record) => record,
                // Vanished between the listing and now
                None => continue,
            };

            self.index.add(Article {
                prefix,
                suffix,
                num: record.num,
                msgid: record.msgid.clone(),
                nov: None,
            });
            self.cache_summary(record);
            added += 1;
        }

        if added > 0 {
            info!("{} Indexed {} new articles", self.log_prefix, added);
        }
        Ok(())
    }

    /// Expire every indexed article whose file is in neither the listing
    /// nor `new`.
    ///
    /// The extra look at `new` matters for a writable group: a delivery
    /// whose modification time has not yet settled stays unpromoted there,
    /// and it may already be indexed if we delivered it ourselves.
    fn expire_vanished(&mut self, present: &HashSet<String>) {
        let vanished: Vec<ArtNum> = self
            .index
            .in_scope(&ArtScope::All)
            .filter(|art| {
                !present.contains(&art.prefix)
                    && !self.new_dir.join(&art.prefix).is_file()
            })
            .map(|art| art.num)
            .collect();

        if !vanished.is_empty() {
            info!(
                "{} Expiring {} externally removed articles",
                self.log_prefix,
                vanished.len()
            );
        }
        for num in vanished {
            self.expire_descriptor(num);
        }
    }
}
