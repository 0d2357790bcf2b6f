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

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsafe group or mark name")]
    UnsafeName,
    #[error("No such server")]
    NxServer,
    #[error("No such group")]
    NxGroup,
    #[error("No such article")]
    NxArticle,
    #[error("Group already exists")]
    GroupExists,
    #[error("Group still contains articles")]
    GroupNotEmpty,
    #[error("Group is read-only")]
    GroupReadOnly,
    #[error("Malformed flag suffix")]
    BadFlagSuffix,
    #[error("Not a maildir")]
    NotAMaildir,
    #[error("Article has expired")]
    ExpiredArticle,
    #[error("Article number chain is corrupt")]
    CorruptNumChain,
    #[error("Maildir spans multiple file systems")]
    CrossDevice,
    #[error("Gave up delivering message")]
    GaveUpDelivery,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Nix(#[from] nix::Error),
    #[error(transparent)]
    Cbor(#[from] serde_cbor::error::Error),
}
