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

use super::main::{
    exit_for, GroupDeleteSubcommand, GroupNameSubcommand,
    GroupRenameSubcommand,
};
use crate::store::server::Server;
use crate::support::sysexits::*;

pub(super) fn scan(server: &mut Server) {
    if let Err(e) = server.scan_all() {
        die!(exit_for(&e), "Scan failed: {}", e);
    }
}

/// Print one line per group, in the style of a news active file:
/// name, article count, then the live number range (or a lone `-` for an
/// empty group).
pub(super) fn list(server: &mut Server) {
    let listing = match server.list() {
        Ok(listing) => listing,
        Err(e) => die!(exit_for(&e), "Cannot list groups: {}", e),
    };

    for (name, status) in listing {
        match (status.min, status.max) {
            (Some(min), Some(max)) => {
                println!("{} {} {}-{}", name, status.count, min.0, max.0)
            }
            _ => println!("{} 0 -", name),
        }
    }
}

pub(super) fn create(server: &mut Server, cmd: GroupNameSubcommand) {
    if let Err(e) = server.create_group(&cmd.group) {
        die!(exit_for(&e), "Cannot create {}: {}", cmd.group, e);
    }
}

pub(super) fn delete(server: &mut Server, cmd: GroupDeleteSubcommand) {
    if let Err(e) = server.delete_group(&cmd.group, cmd.force) {
        die!(exit_for(&e), "Cannot delete {}: {}", cmd.group, e);
    }
}

pub(super) fn rename(server: &mut Server, cmd: GroupRenameSubcommand) {
    if let Err(e) = server.rename_group(&cmd.old, &cmd.new) {
        die!(
            exit_for(&e),
            "Cannot rename {} to {}: {}",
            cmd.old,
            cmd.new,
            e
        );
    }
}
