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
use std::io::Read;
use std::mem;
use std::path::PathBuf;

use structopt::StructOpt;

use crate::store::server::Registry;
use crate::support::config::ServerConfig;
use crate::support::error::Error;
use crate::support::sysexits::*;

#[derive(StructOpt)]
#[structopt(max_term_width = 80)]
enum Command {
    /// Deliver or import articles.
    Deliver(DeliverSubcommand),
    /// Scan every group of the server.
    ///
    /// Groups that cannot be scanned are reported and skipped. This is
    /// mainly useful for warming a large server up and for checking its
    /// health; every other subcommand scans what it touches on its own.
    Scan(CommonOptions),
    /// Inspect and manage the groups of a server.
    Groups(GroupsSubcommand),
    /// Show or edit the marks of a group.
    Marks(MarksSubcommand),
    /// Print one article in full.
    Cat(CatSubcommand),
    /// Print header overview lines for a group.
    Overview(OverviewSubcommand),
    /// Expire old articles from a group.
    Expire(ExpireSubcommand),
    /// Move one article to another group.
    Move(MoveSubcommand),
}

impl Command {
    fn common_options(&mut self) -> CommonOptions {
        match *self {
            Command::Deliver(ref mut c) => mem::take(&mut c.common),
            Command::Scan(ref mut c) => mem::take(c),
            Command::Groups(GroupsSubcommand::List(ref mut c)) => {
                mem::take(c)
            }
            Command::Groups(GroupsSubcommand::Create(ref mut c)) => {
                mem::take(&mut c.common)
            }
            Command::Groups(GroupsSubcommand::Delete(ref mut c)) => {
                mem::take(&mut c.common)
            }
            Command::Groups(GroupsSubcommand::Rename(ref mut c)) => {
                mem::take(&mut c.common)
            }
            Command::Marks(MarksSubcommand::Show(ref mut c)) => {
                mem::take(&mut c.common)
            }
            Command::Marks(MarksSubcommand::Add(ref mut c))
            | Command::Marks(MarksSubcommand::Clear(ref mut c))
            | Command::Marks(MarksSubcommand::Set(ref mut c)) => {
                mem::take(&mut c.common)
            }
            Command::Cat(ref mut c) => mem::take(&mut c.common),
            Command::Overview(ref mut c) => mem::take(&mut c.common),
            Command::Expire(ref mut c) => mem::take(&mut c.common),
            Command::Move(ref mut c) => mem::take(&mut c.common),
        }
    }
}

#[derive(StructOpt, Default)]
pub(super) struct CommonOptions {
    /// The server root directory, containing the group directories and
    /// `newsdir.toml` [default: $NEWSDIR_ROOT]
    #[structopt(long, parse(from_os_str))]
    root: Option<PathBuf>,

    /// The server name used in logs and Xref headers
    /// [default: the root directory's name]
    #[structopt(long)]
    server: Option<String>,
}

/// Deliver or import articles.
///
/// Each input is read in full and stored as a new article in the given
/// group. Inputs are delivered in order; the first failure aborts with a
/// sendmail-style exit code, leaving earlier deliveries in place.
///
/// A maildir or MH folder can be imported by passing all its message files
/// to this command individually, for example:
///
/// ls Maildir/cur/* | xargs -d'\n' newsdir deliver --root=/srv/news misc.import
#[derive(StructOpt)]
pub(super) struct DeliverSubcommand {
    #[structopt(flatten)]
    pub(super) common: CommonOptions,

    /// Create the destination group if it does not already exist.
    #[structopt(short, long)]
    pub(super) create: bool,

    /// Deliver to this group.
    pub(super) group: String,

    /// The files to deliver. "-" will read from stdin.
    #[structopt(parse(from_os_str), default_value = "-")]
    pub(super) inputs: Vec<PathBuf>,
}

#[derive(StructOpt)]
pub(super) enum GroupsSubcommand {
    /// List every group with its article count and number range.
    List(CommonOptions),
    /// Create an empty group.
    Create(GroupNameSubcommand),
    /// Delete a group.
    Delete(GroupDeleteSubcommand),
    /// Rename a group, keeping its articles, numbering, and marks.
    Rename(GroupRenameSubcommand),
}

#[derive(StructOpt)]
pub(super) struct GroupNameSubcommand {
    #[structopt(flatten)]
    pub(super) common: CommonOptions,

    /// The group name.
    pub(super) group: String,
}

#[derive(StructOpt)]
pub(super) struct GroupDeleteSubcommand {
    #[structopt(flatten)]
    pub(super) common: CommonOptions,

    /// Delete the group even if it still contains articles.
    #[structopt(long)]
    pub(super) force: bool,

    /// The group name.
    pub(super) group: String,
}

#[derive(StructOpt)]
pub(super) struct GroupRenameSubcommand {
    #[structopt(flatten)]
    pub(super) common: CommonOptions,

    /// The current group name.
    pub(super) old: String,

    /// The new group name.
    pub(super) new: String,
}

#[derive(StructOpt)]
pub(super) enum MarksSubcommand {
    /// Show the membership of every mark of a group.
    Show(GroupNameSubcommand),
    /// Add a mark to a set of articles.
    Add(MarkEditSubcommand),
    /// Remove a mark from a set of articles.
    Clear(MarkEditSubcommand),
    /// Make a set of articles the exact membership of a mark.
    Set(MarkEditSubcommand),
}

#[derive(StructOpt)]
pub(super) struct MarkEditSubcommand {
    #[structopt(flatten)]
    pub(super) common: CommonOptions,

    /// The group name.
    pub(super) group: String,

    /// The mark name, e.g. 'read' or 'tick'.
    pub(super) mark: String,

    /// The articles, in news range syntax, e.g. '1-5,9'.
    pub(super) arts: String,
}

#[derive(StructOpt)]
pub(super) struct CatSubcommand {
    #[structopt(flatten)]
    pub(super) common: CommonOptions,

    /// The group name.
    pub(super) group: String,

    /// The article number, or a message id in angle brackets.
    pub(super) article: String,
}

#[derive(StructOpt)]
pub(super) struct OverviewSubcommand {
    #[structopt(flatten)]
    pub(super) common: CommonOptions,

    /// The group name.
    pub(super) group: String,

    /// Restrict to these articles, in news range syntax.
    pub(super) arts: Option<String>,
}

#[derive(StructOpt)]
pub(super) struct ExpireSubcommand {
    #[structopt(flatten)]
    pub(super) common: CommonOptions,

    /// Expire even articles younger than the group's configured age.
    #[structopt(long)]
    pub(super) force: bool,

    /// The group name.
    pub(super) group: String,

    /// Restrict to these articles, in news range syntax.
    pub(super) arts: Option<String>,
}

#[derive(StructOpt)]
pub(super) struct MoveSubcommand {
    #[structopt(flatten)]
    pub(super) common: CommonOptions,

    /// The source group name.
    pub(super) src: String,

    /// The article number to move.
    pub(super) article: u32,

    /// The destination group name.
    pub(super) dst: String,
}

pub fn main() {
    // Clap exits with status 1 instead of EX_USAGE if we use the more concise
    // API
    let mut cmd = Command::from_clap(&match Command::clap().get_matches_safe()
    {
        Ok(matches) => matches,
        Err(
            e @ clap::Error {
                kind: clap::ErrorKind::HelpDisplayed,
                ..
            },
        )
        | Err(
            e @ clap::Error {
                kind: clap::ErrorKind::VersionDisplayed,
                ..
            },
        ) => {
            println!("{}", e.message);
            return;
        }
        Err(e) => {
            eprintln!("{}", e.message);
            EX_USAGE.exit()
        }
    });

    let common = cmd.common_options();
    let root = common
        .root
        .or_else(|| std::env::var_os("NEWSDIR_ROOT").map(PathBuf::from))
        .unwrap_or_else(|| {
            eprintln!(
                "No server root given; pass --root=/path/to/server or set\n\
                 NEWSDIR_ROOT in the environment."
            );
            EX_USAGE.exit()
        });

    let server_name = common.server.unwrap_or_else(|| {
        root.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("news")
            .to_owned()
    });

    let config_path = root.join("newsdir.toml");
    let config = if config_path.is_file() {
        let mut config_toml = Vec::new();
        if let Err(e) = fs::File::open(&config_path)
            .and_then(|mut f| f.read_to_end(&mut config_toml))
        {
            die!(EX_CONFIG, "Error reading '{}': {}", config_path.display(), e);
        }
        match toml::from_slice(&config_toml) {
            Ok(config) => config,
            Err(e) => die!(
                EX_CONFIG,
                "Error in config file at '{}': {}",
                config_path.display(),
                e
            ),
        }
    } else {
        ServerConfig::default()
    };

    let log_config = root.join("logging.toml");
    if Ok(true) != nix::unistd::isatty(2) && log_config.is_file() {
        log4rs::init_file(log_config, log4rs::file::Deserializers::new())
            .expect("Failed to initialise logging");
    } else {
        crate::init_simple_log();
    }

    let mut registry = Registry::new();
    let server = match registry.open(&server_name, root.clone(), config) {
        Ok(server) => server,
        Err(e) => die!(EX_NOINPUT, "Cannot open '{}': {}", root.display(), e),
    };

    match cmd {
        Command::Deliver(cmd) => super::deliver::deliver(server, cmd),
        Command::Scan(_) => super::groups::scan(server),
        Command::Groups(GroupsSubcommand::List(_)) => {
            super::groups::list(server)
        }
        Command::Groups(GroupsSubcommand::Create(cmd)) => {
            super::groups::create(server, cmd)
        }
        Command::Groups(GroupsSubcommand::Delete(cmd)) => {
            super::groups::delete(server, cmd)
        }
        Command::Groups(GroupsSubcommand::Rename(cmd)) => {
            super::groups::rename(server, cmd)
        }
        Command::Marks(cmd) => super::articles::marks(server, cmd),
        Command::Cat(cmd) => super::articles::cat(server, cmd),
        Command::Overview(cmd) => super::articles::overview(server, cmd),
        Command::Expire(cmd) => super::articles::expire(server, cmd),
        Command::Move(cmd) => super::articles::move_article(server, cmd),
    }
}

/// Map an engine failure onto the conventional exit code.
pub(super) fn exit_for(e: &Error) -> Sysexit {
    match *e {
        Error::NxServer
        | Error::NxGroup
        | Error::NxArticle
        | Error::ExpiredArticle => EX_NOINPUT,
        Error::UnsafeName | Error::BadFlagSuffix => EX_DATAERR,
        Error::GroupExists | Error::GroupNotEmpty => EX_CANTCREAT,
        Error::GroupReadOnly => EX_NOPERM,
        Error::GaveUpDelivery => EX_TEMPFAIL,
        Error::Io(_) | Error::Nix(_) => EX_IOERR,
        Error::NotAMaildir
        | Error::CorruptNumChain
        | Error::CrossDevice
        | Error::Cbor(_) => EX_SOFTWARE,
    }
}
