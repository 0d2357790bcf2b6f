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

//! The article store proper: servers, groups, and everything they keep on
//! disk.
//!
//! A server is a directory of groups; a group is a maildir plus a hidden
//! control directory recording article numbers, overview data, and marks.
//! Nothing in here takes a lock. Every on-disk structure is built from the
//! file system primitives that are atomic on POSIX (`rename`, `link`,
//! exclusive `open`), so any number of processes can deliver to, read
//! from, and expire the same group at once.

pub mod dir_list;
pub mod flags;
pub mod group;
pub mod headers;
pub mod index;
pub mod model;
pub mod nov;
pub mod numbering;
pub mod server;
