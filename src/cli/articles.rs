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

use std::io::{self, Write};

use super::main::{
    exit_for, CatSubcommand, ExpireSubcommand, GroupNameSubcommand,
    MarkEditSubcommand, MarksSubcommand, MoveSubcommand, OverviewSubcommand,
};
use crate::store::model::{ArtNum, ArtRange, ArtScope, MarkCommand};
use crate::store::server::Server;
use crate::support::sysexits::*;

pub(super) fn cat(server: &mut Server, cmd: CatSubcommand) {
    let data = if cmd.article.starts_with('<') {
        server.read_by_msgid(&cmd.group, &cmd.article)
    } else {
        let num = match cmd.article.parse().ok().and_then(ArtNum::of) {
            Some(num) => num,
            None => die!(EX_USAGE, "Bad article number: {}", cmd.article),
        };
        server.read_article(&cmd.group, num)
    };

    match data {
        Ok(data) => {
            let stdout = io::stdout();
            let mut stdout = stdout.lock();
            if let Err(e) =
                stdout.write_all(&data).and_then(|_| stdout.flush())
            {
                die!(EX_IOERR, "Cannot write article: {}", e);
            }
        }
        Err(e) => die!(
            exit_for(&e),
            "Cannot read {}:{}: {}",
            cmd.group,
            cmd.article,
            e
        ),
    }
}

pub(super) fn overview(server: &mut Server, cmd: OverviewSubcommand) {
    let scope = parse_scope(&cmd.arts);
    let lines = match server.overview(&cmd.group, &scope) {
        Ok(lines) => lines,
        Err(e) => die!(
            exit_for(&e),
            "Cannot fetch overview for {}: {}",
            cmd.group,
            e
        ),
    };

    for line in lines {
        println!("{}", line);
    }
}

pub(super) fn expire(server: &mut Server, cmd: ExpireSubcommand) {
    let scope = parse_scope(&cmd.arts);
    if let Err(e) = server.expire(&cmd.group, &scope, cmd.force) {
        die!(exit_for(&e), "Cannot expire {}: {}", cmd.group, e);
    }
}

pub(super) fn move_article(server: &mut Server, cmd: MoveSubcommand) {
    let num = match ArtNum::of(cmd.article) {
        Some(num) => num,
        None => die!(EX_USAGE, "Article numbers start at 1"),
    };

    match server.move_article(&cmd.src, num, &cmd.dst) {
        // Report where the article ended up; the destination assigns its
        // own number.
        Ok(moved) => println!("{}:{}", cmd.dst, moved.0),
        Err(e) => die!(
            exit_for(&e),
            "Cannot move {}:{} to {}: {}",
            cmd.src,
            cmd.article,
            cmd.dst,
            e
        ),
    }
}

pub(super) fn marks(server: &mut Server, cmd: MarksSubcommand) {
    match cmd {
        MarksSubcommand::Show(cmd) => marks_show(server, cmd),
        MarksSubcommand::Add(cmd) => {
            marks_edit(server, cmd, |mark, arts| MarkCommand::Add {
                mark,
                arts,
            })
        }
        MarksSubcommand::Clear(cmd) => {
            marks_edit(server, cmd, |mark, arts| MarkCommand::Delete {
                mark,
                arts,
            })
        }
        MarksSubcommand::Set(cmd) => {
            marks_edit(server, cmd, |mark, arts| MarkCommand::SetExactly {
                mark,
                arts,
            })
        }
    }
}

fn marks_show(server: &mut Server, cmd: GroupNameSubcommand) {
    let marks = match server.marks(&cmd.group) {
        Ok(marks) => marks,
        Err(e) => die!(
            exit_for(&e),
            "Cannot compute marks for {}: {}",
            cmd.group,
            e
        ),
    };

    for (mark, range) in marks {
        println!("{}: {}", mark, range);
    }
}

fn marks_edit(
    server: &mut Server,
    cmd: MarkEditSubcommand,
    make: impl FnOnce(String, ArtRange) -> MarkCommand,
) {
    let arts = match ArtRange::parse(&cmd.arts, ArtNum::MAX) {
        Some(arts) => arts,
        None => die!(EX_USAGE, "Bad article range: {}", cmd.arts),
    };

    let command = make(cmd.mark, arts);
    if let Err(e) = server.update_marks(&cmd.group, &[command]) {
        die!(exit_for(&e), "Cannot update marks of {}: {}", cmd.group, e);
    }
}

fn parse_scope(arts: &Option<String>) -> ArtScope {
    match *arts {
        None => ArtScope::All,
        Some(ref raw) => match ArtRange::parse(raw, ArtNum::MAX) {
            Some(arts) => ArtScope::Within(arts),
            None => die!(EX_USAGE, "Bad article range: {}", raw),
        },
    }
}
