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

//! Support for working with a single newsgroup.
//!
//! A group is one maildir plus the control data derived from it. The
//! contents of a group directory are:
//!
//! - `tmp/`. Staging area for deliveries in progress. Files here are not
//!   articles yet; anything stale is swept by the scanner.
//!
//! - `new/`. Articles whose delivery has completed (the hardlink into this
//!   directory is the durability point) but which no scan has picked up.
//!   Names here are bare prefixes with no flag suffix.
//!
//! - `cur/`. Articles the scanner has adopted. Names are `prefix:2,flags`
//!   per the usual maildir convention; see the `flags` module.
//!
//! - `.control/nov/prefix`. One header-summary record per article, CBOR
//!   behind a one-byte version. See the `nov` module.
//!
//! - `.control/nov/prefix:`. Temporary sibling of the above during an
//!   atomic write. The trailing colon cannot collide with any prefix.
//!
//! - `.control/num/N`. The hardlink chain backing the article number
//!   allocator. See the `numbering` module.
//!
//! - `.control/marks/mark/prefix`. One hardlink per article carrying the
//!   mark named by the subdirectory.
//!
//! - `.control/marks/mark/:`. The template file hardlinked to create the
//!   entries above.
//!
//! Any number of processes may work on the same group concurrently, and
//! none of them takes a lock. Every durability-relevant mutation is a
//! single atomic filesystem primitive (rename, link, unlink,
//! exclusive-create) applied in an order that leaves the directory a valid
//! store both before and after each step. An interruption at any point
//! leaves at worst a redundant artifact: an orphaned staging file, an
//! extra hardlink, a summary record for a vanished article. Each of those
//! is recognised and cleaned up by a later pass, by this process or any
//! other.
//!
//! The flip side is that everything held in memory here is advisory.
//! Another process can deliver, rename, or delete article files at any
//! moment, so every operation that touches a file is prepared for it to
//! have changed name or disappeared, and the scanner rebuilds whatever it
//! finds missing. Throwing the in-memory state away and rescanning loses
//! nothing but time.
//!
//! Article numbers are the one piece of derived state that must not
//! change behind the reader's back. They are pinned by the persisted
//! summary records: reparsing an article reuses its recorded number, and
//! the allocator never hands out a number twice, so a number observed
//! once refers to the same article forever, even across restarts and
//! between processes.
//!
//! ## About the layout of this module
//!
//! This module is collectively a single abstraction; it is split apart
//! only because it is unwieldy as one file. `defs` holds the `Group`
//! struct all the other files hang their `impl` blocks on.

// Basic struct definitions
mod defs;
pub use defs::Group;

// Internal support --- summarising articles and finding their files
mod summary;

// Engine operations
mod deliver; // staging and hardlinking new articles in
mod expire; // age-based and forced removal
mod marks; // named per-article marks, flags and hardlinks both
mod read; // whole articles and overview lines
mod scan; // directory sweep, promotion, crash recovery
