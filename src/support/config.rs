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

use serde::{Deserialize, Serialize};

/// The per-server configuration for Newsdir.
///
/// This is stored in a file named `newsdir.toml` at the server root, next to
/// the group directories. The file is optional; a server with no
/// configuration file behaves as if every field were defaulted.
#[derive(Clone, Debug, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// If true, treat every group under this server as read-only.
    ///
    /// A read-only group's article files are never touched: arrivals stay
    /// in `new` without being promoted to `cur`, staging debris is left
    /// alone, and deliveries, mark changes, and expiry are all refused.
    /// Numbering and overview records are still maintained under the
    /// hidden control directory so articles keep stable numbers.
    pub read_only: bool,

    /// Headers to capture per article in addition to the standard overview
    /// set.
    ///
    /// Header names are compared case-insensitively.
    pub extra_headers: Vec<String>,

    /// Per-group overrides, keyed by group name.
    pub groups: BTreeMap<String, GroupOverrides>,
}

/// Overrides applied to a single group.
///
/// Every field is optional; an absent field inherits the server-wide
/// behaviour.
#[derive(Clone, Debug, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GroupOverrides {
    /// If true, treat this group as read-only even when the server is
    /// not, or vice versa.
    pub read_only: Option<bool>,

    /// The number of header records to keep in memory for this group.
    ///
    /// If unset, the cache is sized automatically from the number of
    /// apparently-interesting articles found at scan time.
    pub article_cache_size: Option<usize>,

    /// Marks which every live article in the group always carries,
    /// regardless of what is recorded on disk.
    pub always_marks: Vec<String>,

    /// Marks which no article in the group ever carries, regardless of what
    /// is recorded on disk.
    pub never_marks: Vec<String>,

    /// Articles older than this many days are eligible for expiry.
    ///
    /// If unset, articles never expire unless expiry is forced.
    pub expiry_age_days: Option<u32>,
}

/// The fully-resolved behaviour of one group, with server-wide defaults
/// and per-group overrides already merged.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupSettings {
    pub read_only: bool,
    pub extra_headers: Vec<String>,
    pub always_marks: Vec<String>,
    pub never_marks: Vec<String>,
    pub expiry_age_days: Option<u32>,
    pub article_cache_size: Option<usize>,
}

impl ServerConfig {
    /// Return the configured extra headers, falling back to the standard
    /// default of `To` and `Cc`.
    pub fn extra_headers(&self) -> Vec<String> {
        if self.extra_headers.is_empty() {
            vec!["To".to_owned(), "Cc".to_owned()]
        } else {
            self.extra_headers.clone()
        }
    }

    /// Look up the overrides for `group`, if any.
    pub fn overrides_for(&self, group: &str) -> Option<&GroupOverrides> {
        self.groups.get(group)
    }

    /// Resolve the effective settings for `group`.
    pub fn settings_for(&self, group: &str) -> GroupSettings {
        let or = self.overrides_for(group).cloned().unwrap_or_default();
        GroupSettings {
            read_only: or.read_only.unwrap_or(self.read_only),
            extra_headers: self.extra_headers(),
            always_marks: or.always_marks,
            never_marks: or.never_marks,
            expiry_age_days: or.expiry_age_days,
            article_cache_size: or.article_cache_size,
        }
    }
}
