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
use std::io::{self, Read};
use std::mem;
use std::path::{Path, PathBuf};

use log::error;

use super::main::{exit_for, DeliverSubcommand};
use crate::store::model::ArtNum;
use crate::store::server::Server;
use crate::support::{error::Error, sysexits::*};

pub(super) fn deliver(server: &mut Server, mut cmd: DeliverSubcommand) {
    if cmd.create {
        match server.create_group(&cmd.group) {
            Ok(()) => (),
            // Another process may have raced us to it; either way the group
            // is there now.
            Err(Error::GroupExists) => (),
            Err(e) => {
                die!(exit_for(&e), "Failed to create {}: {}", cmd.group, e);
            },
        }
    }

    let items = mem::take(&mut cmd.inputs);
    let target = ServerTarget {
        server,
        group: &cmd.group,
    };

    if let Err(e) = run_delivery(items.into_iter(), io::stdin().lock(), target)
    {
        e.exit();
    }
}

trait DeliveryTarget {
    fn deliver(&mut self, data: &[u8]) -> Result<ArtNum, Error>;
}

struct ServerTarget<'a> {
    server: &'a mut Server,
    group: &'a str,
}

impl DeliveryTarget for ServerTarget<'_> {
    fn deliver(&mut self, data: &[u8]) -> Result<ArtNum, Error> {
        self.server.deliver(self.group, data)
    }
}

fn run_delivery(
    items: impl Iterator<Item = PathBuf>,
    mut stdin: impl Read,
    mut target: impl DeliveryTarget,
) -> Result<(), Sysexit> {
    for item in items {
        match deliver_single(&item, &mut stdin, &mut target) {
            Ok(_) => (),
            Err(e) => {
                error!("Unable to process {}: {}", item.display(), e);
                return Err(match e {
                    Error::Io(e) if io::ErrorKind::NotFound == e.kind() => {
                        EX_NOINPUT
                    },
                    Error::Io(_) | Error::GaveUpDelivery => EX_UNAVAILABLE,
                    Error::GroupReadOnly => EX_NOPERM,
                    Error::NxGroup | Error::UnsafeName => EX_CANTCREAT,
                    _ => EX_SOFTWARE,
                });
            },
        }
    }

    Ok(())
}

fn deliver_single(
    item: &Path,
    stdin: &mut impl Read,
    target: &mut impl DeliveryTarget,
) -> Result<ArtNum, Error> {
    // Articles are stored byte for byte as they arrive; no line-ending or
    // header rewriting happens on this path.
    let mut data = Vec::new();
    if Path::new("-") == item {
        stdin.read_to_end(&mut data)?;
    } else {
        fs::File::open(item)?.read_to_end(&mut data)?;
    }

    target.deliver(&data)
}

#[cfg(test)]
mod test {
    use std::io::Write;
    use std::iter;

    use super::*;

    #[derive(Debug, Default)]
    struct MockTarget {
        delivered: Vec<String>,
    }

    impl<'a> DeliveryTarget for &'a mut MockTarget {
        fn deliver(&mut self, data: &[u8]) -> Result<ArtNum, Error> {
            self.delivered
                .push(String::from_utf8_lossy(data).into_owned());
            Ok(ArtNum::of(self.delivered.len() as u32).unwrap())
        }
    }

    struct RefusingTarget;

    impl DeliveryTarget for RefusingTarget {
        fn deliver(&mut self, _: &[u8]) -> Result<ArtNum, Error> {
            Err(Error::GroupReadOnly)
        }
    }

    #[test]
    fn deliver_from_stdin() {
        let mut target = MockTarget::default();

        run_delivery(
            iter::once(Path::new("-").to_owned()),
            b"Subject: hello\n\nBody text.\n" as &[u8],
            &mut target,
        )
        .unwrap();

        assert_eq!(
            vec!["Subject: hello\n\nBody text.\n".to_owned()],
            target.delivered
        );
    }

    #[test]
    fn deliver_multiple_files_in_order() {
        let tmpdir = tempfile::TempDir::new().unwrap();
        let path_a = tmpdir.path().join("a.eml");
        let path_b = tmpdir.path().join("b.eml");

        fs::File::create(&path_a)
            .unwrap()
            .write_all(b"First article\r\nwith DOS endings\r\n")
            .unwrap();
        fs::File::create(&path_b)
            .unwrap()
            .write_all(b"Second article\nwith UNIX endings\n")
            .unwrap();

        let mut target = MockTarget::default();
        run_delivery(
            vec![path_a, path_b].into_iter(),
            b"" as &[u8],
            &mut target,
        )
        .unwrap();

        // Content is passed through verbatim, whatever the line endings.
        assert_eq!(
            vec![
                "First article\r\nwith DOS endings\r\n".to_owned(),
                "Second article\nwith UNIX endings\n".to_owned(),
            ],
            target.delivered
        );
    }

    #[test]
    fn missing_input_reports_noinput() {
        let tmpdir = tempfile::TempDir::new().unwrap();
        let mut target = MockTarget::default();

        assert_eq!(
            Err(EX_NOINPUT),
            run_delivery(
                iter::once(tmpdir.path().join("nonexistent")),
                b"" as &[u8],
                &mut target,
            )
        );
        assert!(target.delivered.is_empty());
    }

    #[test]
    fn read_only_rejection_reports_noperm() {
        assert_eq!(
            Err(EX_NOPERM),
            run_delivery(
                iter::once(Path::new("-").to_owned()),
                b"Subject: doomed\n" as &[u8],
                RefusingTarget,
            )
        );
    }
}
