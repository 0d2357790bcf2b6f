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
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use lazy_static::lazy_static;
use log::{info, warn};
use rand::{rngs::OsRng, Rng};

use super::defs::*;
use crate::store::index::Article;
use crate::store::model::ArtNum;
use crate::support::error::Error;
use crate::support::file_ops::IgnoreKinds;

/// How long to wait after losing a staging name before trying a new one.
const RETRY_PAUSE: Duration = Duration::from_secs(2);

/// How long to keep trying for a staging name before giving up entirely.
/// Actually reaching this means the random name source is broken.
const PATIENCE: Duration = Duration::from_secs(24 * 3600);

impl Group {
    /// Store `data` as a new article and return its number.
    ///
    /// The bytes are staged in `tmp`, synced, and hardlinked into `new`;
    /// the link is the durability point. A crash at any step leaves either
    /// no trace or a staging artifact a later scan sweeps up, never a
    /// partial article.
    pub fn deliver(&mut self, data: &[u8]) -> Result<ArtNum, Error> {
        self.not_read_only()?;
        self.scan()?;

        let (prefix, mut staged) = self.claim_staging_name()?;
        let tmp_path = self.tmp_dir.join(&prefix);
        let new_path = self.new_dir.join(&prefix);

        let linked = write_and_link(&mut staged, data, &tmp_path, &new_path);
        drop(staged);
        // Successful or not, the staging copy has served its purpose.
        if let Err(e) = fs::remove_file(&tmp_path).ignore_not_found() {
            warn!(
                "{} Failed to remove staging file {:?}: {}",
                self.log_prefix, tmp_path, e
            );
        }
        linked?;
        info!("{} Delivered article {}", self.log_prefix, prefix);

        self.scan()?;
        if let Some(num) = self.index.num_of_prefix(&prefix) {
            return Ok(num);
        }

        // The scan declined to promote a file this fresh out of new
        // (its modification time had not yet fallen behind the clock),
        // so summarize it in place; the next scan will promote it.
        let record = self
            .summarize_file(&new_path, &prefix)?
            .ok_or(Error::NxArticle)?;
        let num = record.num;
        self.index.add(Article {
            prefix,
            suffix: String::new(),
            num,
            msgid: record.msgid.clone(),
            nov: None,
        });
        self.cache_summary(record);
        Ok(num)
    }

    /// Exclusively create a staging file under a fresh unique name.
    fn claim_staging_name(&self) -> Result<(String, fs::File), Error> {
        let deadline = Instant::now() + PATIENCE;
        loop {
            let prefix = staging_name();
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .mode(0o600)
                .open(self.tmp_dir.join(&prefix))
            {
                Ok(file) => return Ok((prefix, file)),
                Err(e) if io::ErrorKind::AlreadyExists == e.kind() => {
                    if Instant::now() >= deadline {
                        return Err(Error::GaveUpDelivery);
                    }
                    warn!(
                        "{} Staging name {} is taken, \
                         waiting before trying another",
                        self.log_prefix, prefix
                    );
                    thread::sleep(RETRY_PAUSE);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn write_and_link(
    staged: &mut fs::File,
    data: &[u8],
    tmp_path: &Path,
    new_path: &Path,
) -> Result<(), Error> {
    staged.write_all(data)?;
    staged.sync_all()?;
    nix::unistd::linkat(
        None,
        tmp_path,
        None,
        new_path,
        nix::unistd::LinkatFlags::SymlinkFollow,
    )?;
    Ok(())
}

/// Generate a unique delivery name in the conventional
/// `seconds.M<micros>P<pid>R<random>.<host>` form.
fn staging_name() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!(
        "{}.M{}P{}R{}.{}",
        now.as_secs(),
        now.subsec_micros(),
        nix::unistd::getpid(),
        OsRng.gen::<u32>(),
        host_name(),
    )
}

/// The local host name, with the characters maildir names reserve
/// replaced by their conventional octal escapes. Resolved once per
/// process.
fn host_name() -> &'static str {
    lazy_static! {
        static ref HOST_NAME: String = {
            let mut buf = [0u8; 256];
            nix::unistd::gethostname(&mut buf)
                .ok()
                .and_then(|cs| cs.to_str().ok())
                .unwrap_or("localhost")
                .replace('/', "\\057")
                .replace(':', "\\072")
        };
    }

    HOST_NAME.as_str()
}

#[cfg(test)]
mod test {
    use super::super::test_prelude::*;
    use super::*;

    #[test]
    fn delivery_assigns_sequential_numbers() {
        let mut setup = set_up();

        let first = setup
            .group
            .deliver(b"Subject: first\n\nbody\n")
            .unwrap();
        let second = setup
            .group
            .deliver(b"Subject: second\n\nbody\n")
            .unwrap();
        assert_eq!(ArtNum::u(1), first);
        assert_eq!(ArtNum::u(2), second);

        let status = setup.group.status();
        assert_eq!(2, status.count);
        assert_eq!(Some(ArtNum::u(1)), status.min);
        assert_eq!(Some(ArtNum::u(2)), status.max);

        let record = setup.group.get_or_refresh(first).unwrap().unwrap();
        assert!(record.begin.starts_with("first\t"));

        // Nothing was left behind in staging.
        assert!(visible(&setup.group.tmp_dir).is_empty());
    }

    #[test]
    fn delivered_names_are_distinct() {
        let mut setup = set_up();
        let a = setup.group.deliver(b"Subject: a\n\n").unwrap();
        let b = setup.group.deliver(b"Subject: b\n\n").unwrap();

        let pa = setup.group.index.by_num(a).unwrap().prefix.clone();
        let pb = setup.group.index.by_num(b).unwrap().prefix.clone();
        assert_ne!(pa, pb);
        assert!(!pa.contains(':'));
        assert!(!pa.contains('/'));
    }

    #[test]
    fn message_id_is_taken_from_the_delivered_headers() {
        let mut setup = set_up();
        let num = setup
            .group
            .deliver(b"Subject: hi\nMessage-ID: <42@example.com>\n\n")
            .unwrap();
        assert_eq!(
            "<42@example.com>",
            setup.group.index.by_num(num).unwrap().msgid
        );
    }

    #[test]
    fn read_only_groups_refuse_delivery() {
        let setup = set_up();
        let mut settings = test_settings();
        settings.read_only = true;
        let mut group = Group::new(
            "server",
            "misc.test".to_owned(),
            setup.root.path(),
            settings,
        );

        assert_matches!(
            Err(Error::GroupReadOnly),
            group.deliver(b"Subject: no\n\n")
        );
        assert!(visible(&setup.group.tmp_dir).is_empty());
        assert!(visible(&setup.group.new_dir).is_empty());
    }

    #[test]
    fn delivery_needs_a_maildir() {
        let setup = set_up();
        let mut group = Group::new(
            "server",
            "no.such.group".to_owned(),
            setup.root.path(),
            test_settings(),
        );
        assert_matches!(
            Err(Error::NotAMaildir),
            group.deliver(b"Subject: no\n\n")
        );
    }

    #[test]
    fn host_names_are_sanitised() {
        // Whatever the real host name is, the generated name must still
        // split cleanly at the first colon.
        let name = staging_name();
        let (prefix, suffix) = crate::store::flags::split_name(&name);
        assert_eq!(name, prefix);
        assert_eq!("", suffix);
    }
}
