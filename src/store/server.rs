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

//! The server and registry layer, tying groups into one store.
//!
//! A server is a directory whose immediate subdirectories are groups. All
//! operations on articles go through `Server` methods naming the group, so
//! there is exactly one place that resolves names, triggers scans, and
//! records failures. The failure record matters: a bulk operation over
//! many groups must not die because one group is broken, so per-group
//! errors are logged, stashed where `last_error` can retrieve them, and
//! skipped past.
//!
//! The registry is nothing more than the process-wide table of open
//! servers. Servers are independent; the registry exists so a caller can
//! address several stores by name without carrying the values around.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::os::unix::fs::DirBuilderExt;
use std::path::PathBuf;
use std::time::SystemTime;

use log::{info, warn};
use rand::{rngs::OsRng, Rng};

use crate::store::dir_list;
use crate::store::group::Group;
use crate::store::model::{
    ArtNum, ArtRange, ArtScope, GroupStatus, MarkCommand,
};
use crate::support::config::ServerConfig;
use crate::support::error::Error;
use crate::support::file_ops;
use crate::support::safe_name::is_safe_name;

pub struct Server {
    log_prefix: String,
    name: String,
    root: PathBuf,
    config: ServerConfig,
    groups: HashMap<String, Group>,
    group_names: Vec<String>,
    root_mtime: Option<SystemTime>,
    last_error: Option<String>,
}

impl Server {
    /// Open the server rooted at `root`.
    ///
    /// This only validates that the root exists; groups are not touched
    /// until addressed.
    pub fn open(
        name: String,
        root: PathBuf,
        config: ServerConfig,
    ) -> Result<Self, Error> {
        if !root.is_dir() {
            return Err(Error::NxServer);
        }
        Ok(Server {
            log_prefix: name.clone(),
            name,
            root,
            config,
            groups: HashMap::new(),
            group_names: Vec::new(),
            root_mtime: None,
            last_error: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The human-readable message of the most recent failure, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Activate `group` and report its article count and number range.
    pub fn group_status(
        &mut self,
        group: &str,
    ) -> Result<GroupStatus, Error> {
        let result = self.with_scanned(group, |g| Ok(g.status()));
        self.note(result)
    }

    /// Scan every group, skipping past any that fail.
    pub fn scan_all(&mut self) -> Result<(), Error> {
        let names = {
            let result = self.current_group_names();
            self.note(result)?
        };
        for name in names {
            if let Err(e) = self.with_scanned(&name, |_| Ok(())) {
                warn!(
                    "{} Failed to scan {}: {}",
                    self.log_prefix, name, e
                );
                self.last_error = Some(e.to_string());
            }
        }
        Ok(())
    }

    /// List every scannable group with its status, sorted by name.
    ///
    /// Groups that cannot be scanned are skipped, with the failure logged
    /// and stashed.
    pub fn list(&mut self) -> Result<Vec<(String, GroupStatus)>, Error> {
        let mut names = {
            let result = self.current_group_names();
            self.note(result)?
        };
        names.sort();

        let mut out = Vec::with_capacity(names.len());
        for name in names {
            match self.with_scanned(&name, |g| Ok(g.status())) {
                Ok(status) => out.push((name, status)),
                Err(e) => {
                    warn!(
                        "{} Failed to scan {}: {}",
                        self.log_prefix, name, e
                    );
                    self.last_error = Some(e.to_string());
                }
            }
        }
        Ok(out)
    }

    /// Store `data` as a new article in `group`, returning its number.
    pub fn deliver(
        &mut self,
        group: &str,
        data: &[u8],
    ) -> Result<ArtNum, Error> {
        let result = self.with_group(group, |g| g.deliver(data));
        self.note(result)
    }

    /// Read one article in full, by number.
    pub fn read_article(
        &mut self,
        group: &str,
        num: ArtNum,
    ) -> Result<Vec<u8>, Error> {
        let result = self.with_scanned(group, |g| g.read_article(num));
        self.note(result)
    }

    /// Read one article in full, by message id.
    pub fn read_by_msgid(
        &mut self,
        group: &str,
        msgid: &str,
    ) -> Result<Vec<u8>, Error> {
        let result = self.with_scanned(group, |g| g.read_by_msgid(msgid));
        self.note(result)
    }

    /// Produce overview lines for the articles of `group` in `scope`.
    pub fn overview(
        &mut self,
        group: &str,
        scope: &ArtScope,
    ) -> Result<Vec<String>, Error> {
        let server_name = self.name.clone();
        let result = self
            .with_scanned(group, |g| g.overview(&server_name, scope));
        self.note(result)
    }

    /// Compute the membership of every known mark in `group`.
    pub fn marks(
        &mut self,
        group: &str,
    ) -> Result<BTreeMap<String, ArtRange>, Error> {
        let result = self.with_scanned(group, |g| g.compute_marks());
        self.note(result)
    }

    /// Apply a batch of mark edits to `group`.
    pub fn update_marks(
        &mut self,
        group: &str,
        commands: &[MarkCommand],
    ) -> Result<(), Error> {
        let result =
            self.with_scanned(group, |g| g.update_marks(commands));
        self.note(result)
    }

    /// Expire articles of `group` in `scope`, returning the survivors.
    pub fn expire(
        &mut self,
        group: &str,
        scope: &ArtScope,
        force: bool,
    ) -> Result<ArtRange, Error> {
        let result =
            self.with_group(group, |g| g.expire(scope, force));
        self.note(result)
    }

    /// Copy article `num` of `src` into `dst`, then expire the original.
    ///
    /// A failure after the copy leaves the article present in both
    /// groups, which is harmless; nothing is lost.
    pub fn move_article(
        &mut self,
        src: &str,
        num: ArtNum,
        dst: &str,
    ) -> Result<ArtNum, Error> {
        let result = self.do_move_article(src, num, dst);
        self.note(result)
    }

    fn do_move_article(
        &mut self,
        src: &str,
        num: ArtNum,
        dst: &str,
    ) -> Result<ArtNum, Error> {
        let data = self.with_scanned(src, |g| g.read_article(num))?;
        let new_num = self.with_group(dst, |g| g.deliver(&data))?;
        self.with_group(src, |g| {
            g.expire(&ArtScope::Within(ArtRange::just(num)), true)
        })?;
        info!(
            "{} Moved article {}:{} to {}:{}",
            self.log_prefix, src, num.0, dst, new_num.0
        );
        Ok(new_num)
    }

    /// Create an empty group named `name`.
    ///
    /// The maildir skeleton is assembled under a hidden staging name and
    /// renamed into place, so a half-created group is never visible.
    pub fn create_group(&mut self, name: &str) -> Result<(), Error> {
        let result = self.do_create_group(name);
        self.note(result)
    }

    fn do_create_group(&mut self, name: &str) -> Result<(), Error> {
        self.check_group_name(name)?;
        self.not_read_only(name)?;

        let target = self.root.join(name);
        if target.exists() {
            return Err(Error::GroupExists);
        }

        let stage = self
            .root
            .join(format!(".create.{:016x}", OsRng.gen::<u64>()));
        for part in &["tmp", "new", "cur"] {
            fs::DirBuilder::new()
                .recursive(true)
                .mode(0o770)
                .create(stage.join(part))?;
        }

        match fs::rename(&stage, &target) {
            Ok(()) => {
                self.root_mtime = None;
                info!("{} Created group {}", self.log_prefix, name);
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_dir_all(&stage);
                match e.raw_os_error() {
                    Some(nix::libc::EEXIST)
                    | Some(nix::libc::ENOTEMPTY) => {
                        Err(Error::GroupExists)
                    }
                    _ => Err(e.into()),
                }
            }
        }
    }

    /// Delete the group named `name`.
    ///
    /// A group still holding articles is refused unless `force` is given.
    pub fn delete_group(
        &mut self,
        name: &str,
        force: bool,
    ) -> Result<(), Error> {
        let result = self.do_delete_group(name, force);
        self.note(result)
    }

    fn do_delete_group(
        &mut self,
        name: &str,
        force: bool,
    ) -> Result<(), Error> {
        self.check_group_name(name)?;
        self.not_read_only(name)?;
        if !force {
            let status = self.with_scanned(name, |g| Ok(g.status()))?;
            if status.count > 0 {
                return Err(Error::GroupNotEmpty);
            }
        } else if !self.root.join(name).is_dir() {
            return Err(Error::NxGroup);
        }
        self.groups.remove(name);
        self.root_mtime = None;
        file_ops::delete_staged(self.root.join(name), &self.root)?;
        info!("{} Deleted group {}", self.log_prefix, name);
        Ok(())
    }

    /// Rename the group `old` to `new`.
    pub fn rename_group(
        &mut self,
        old: &str,
        new: &str,
    ) -> Result<(), Error> {
        let result = self.do_rename_group(old, new);
        self.note(result)
    }

    fn do_rename_group(&mut self, old: &str, new: &str) -> Result<(), Error> {
        self.check_group_name(old)?;
        self.check_group_name(new)?;
        self.not_read_only(old)?;
        if !self.root.join(old).is_dir() {
            return Err(Error::NxGroup);
        }
        if self.root.join(new).exists() {
            return Err(Error::GroupExists);
        }

        // All in-memory knowledge of the old name is path-laden, so it is
        // dropped rather than retargeted; the next access rebuilds it.
        self.groups.remove(old);
        self.root_mtime = None;
        fs::rename(self.root.join(old), self.root.join(new))?;
        info!("{} Renamed group {} to {}", self.log_prefix, old, new);
        Ok(())
    }

    /// The names of the root's group directories.
    ///
    /// The listing is reused while the root's modification time is
    /// unchanged. Local creation and deletion invalidate it directly, so
    /// the timestamp only has to catch other processes' changes.
    fn current_group_names(&mut self) -> Result<Vec<String>, Error> {
        let mtime = fs::metadata(&self.root)?.modified()?;
        if self.root_mtime != Some(mtime) {
            self.group_names = dir_list::visible_dirs(&self.root)?;
            self.root_mtime = Some(mtime);
        }
        Ok(self.group_names.clone())
    }

    fn with_scanned<T>(
        &mut self,
        group: &str,
        op: impl FnOnce(&mut Group) -> Result<T, Error>,
    ) -> Result<T, Error> {
        self.with_group(group, |g| {
            g.scan()?;
            op(g)
        })
    }

    /// Run `op` on the named group, forgetting the group if it turns out
    /// to no longer be a maildir.
    ///
    /// Forgetting matters when a group directory is removed or replaced
    /// behind our back: the stale index must not survive to describe
    /// whatever appears under that name next.
    fn with_group<T>(
        &mut self,
        group: &str,
        op: impl FnOnce(&mut Group) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let result = self.group_mut(group).and_then(op);
        if let Err(Error::NotAMaildir) = result {
            self.groups.remove(group);
        }
        result
    }

    fn group_mut(&mut self, name: &str) -> Result<&mut Group, Error> {
        self.check_group_name(name)?;
        match self.groups.entry(name.to_owned()) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(v) => {
                if !self.root.join(name).is_dir() {
                    return Err(Error::NxGroup);
                }
                Ok(v.insert(Group::new(
                    &self.log_prefix,
                    name.to_owned(),
                    &self.root,
                    self.config.settings_for(name),
                )))
            }
        }
    }

    fn check_group_name(&self, name: &str) -> Result<(), Error> {
        if is_safe_name(name) {
            Ok(())
        } else {
            Err(Error::UnsafeName)
        }
    }

    fn not_read_only(&self, group: &str) -> Result<(), Error> {
        if self.config.settings_for(group).read_only {
            Err(Error::GroupReadOnly)
        } else {
            Ok(())
        }
    }

    fn note<T>(&mut self, result: Result<T, Error>) -> Result<T, Error> {
        if let Err(ref e) = result {
            self.last_error = Some(e.to_string());
        }
        result
    }
}

/// The process-wide table of open servers.
#[derive(Default)]
pub struct Registry {
    servers: HashMap<String, Server>,
    current: Option<String>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Open the named server if it is not already open, and make it
    /// current either way.
    pub fn open(
        &mut self,
        name: &str,
        root: PathBuf,
        config: ServerConfig,
    ) -> Result<&mut Server, Error> {
        if !self.servers.contains_key(name) {
            let server =
                Server::open(name.to_owned(), root, config)?;
            self.servers.insert(name.to_owned(), server);
        }
        self.current = Some(name.to_owned());
        self.get_mut(name)
    }

    /// Drop the named server from the table.
    ///
    /// All its in-memory state is discarded; nothing on disk changes.
    pub fn close(&mut self, name: &str) -> bool {
        if Some(name) == self.current.as_deref() {
            self.current = None;
        }
        self.servers.remove(name).is_some()
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Server, Error> {
        self.servers.get_mut(name).ok_or(Error::NxServer)
    }

    /// The server most recently opened.
    pub fn current_mut(&mut self) -> Result<&mut Server, Error> {
        match self.current.clone() {
            Some(name) => self.get_mut(&name),
            None => Err(Error::NxServer),
        }
    }
}
