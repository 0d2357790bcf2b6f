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

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::store::index::{Index, NovRing};
use crate::store::model::{ArtRange, GroupStatus};
use crate::store::numbering::NumberChain;
use crate::support::config::GroupSettings;
use crate::support::error::Error;

/// One newsgroup, backed by one maildir.
///
/// A `Group` is cheap to construct; nothing on disk is touched until the
/// first `scan`. All knowledge it holds about its articles is advisory and
/// rebuilt from the maildir itself, so dropping a `Group` and constructing
/// a new one over the same directory loses nothing but time.
pub struct Group {
    pub(super) log_prefix: String,
    pub(super) name: String,
    pub(super) root: PathBuf,

    pub(super) tmp_dir: PathBuf,
    pub(super) new_dir: PathBuf,
    pub(super) cur_dir: PathBuf,
    pub(super) nov_dir: PathBuf,
    pub(super) num_dir: PathBuf,
    pub(super) marks_dir: PathBuf,

    pub(super) read_only: bool,
    pub(super) extra_headers: Vec<String>,
    pub(super) always_marks: Vec<String>,
    pub(super) never_marks: Vec<String>,
    pub(super) expiry_age_days: Option<u32>,
    pub(super) cache_override: Option<usize>,

    pub(super) index: Index,
    pub(super) ring: NovRing,
    /// Whether the once-per-lifetime discovery work (control directory
    /// creation, cache sizing) has run.
    pub(super) discovered: bool,
    /// The modification time of the watched article directory as of the
    /// last completed scan.
    pub(super) watched_mtime: Option<SystemTime>,
    /// Per mark name, the modification time its membership was last
    /// computed against.
    pub(super) mark_mtimes: HashMap<String, SystemTime>,
    /// Per mark name, the membership as of the last computation.
    pub(super) mark_ranges: HashMap<String, ArtRange>,
}

impl Group {
    pub fn new(
        server_log_prefix: &str,
        name: String,
        server_root: &Path,
        settings: GroupSettings,
    ) -> Self {
        let mut log_prefix = server_log_prefix.to_owned();
        log_prefix.push(':');
        log_prefix.push_str(&name);

        let root = server_root.join(&name);
        let control = root.join(".control");
        Group {
            log_prefix,
            name,
            tmp_dir: root.join("tmp"),
            new_dir: root.join("new"),
            cur_dir: root.join("cur"),
            nov_dir: control.join("nov"),
            num_dir: control.join("num"),
            marks_dir: control.join("marks"),
            root,

            read_only: settings.read_only,
            extra_headers: settings.extra_headers,
            always_marks: settings.always_marks,
            never_marks: settings.never_marks,
            expiry_age_days: settings.expiry_age_days,
            cache_override: settings.article_cache_size,

            index: Index::new(),
            ring: NovRing::new(16),
            discovered: false,
            watched_mtime: None,
            mark_mtimes: HashMap::new(),
            mark_ranges: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn log_prefix(&self) -> &str {
        &self.log_prefix
    }

    /// The count and number range of live articles, as of the last scan.
    pub fn status(&self) -> GroupStatus {
        self.index.status()
    }

    /// The directory whose modification time tracks article arrival.
    ///
    /// Articles in a writable group live in `cur`; a read-only group never
    /// promotes its articles out of `new`, so they are read from there.
    pub(super) fn watched_dir(&self) -> &Path {
        if self.read_only {
            &self.new_dir
        } else {
            &self.cur_dir
        }
    }

    /// Every directory an article file may sit in, the watched one first.
    ///
    /// A writable group keeps unsettled deliveries in `new` until a scan
    /// promotes them; a read-only group never promotes, but `cur` may
    /// still hold articles from before it was frozen.
    pub(super) fn article_dirs(&self) -> [&Path; 2] {
        if self.read_only {
            [self.new_dir.as_path(), self.cur_dir.as_path()]
        } else {
            [self.cur_dir.as_path(), self.new_dir.as_path()]
        }
    }

    pub(super) fn number_chain(&self) -> NumberChain<'_> {
        NumberChain {
            root: &self.num_dir,
        }
    }

    pub(super) fn mark_dir(&self, mark: &str) -> PathBuf {
        self.marks_dir.join(mark)
    }

    pub(super) fn not_read_only(&self) -> Result<(), Error> {
        if self.read_only {
            Err(Error::GroupReadOnly)
        } else {
            Ok(())
        }
    }
}
