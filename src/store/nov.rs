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

//! Persistent per-article header summaries, in News Overview shape.
//!
//! Each article gets one small file under the group's `.control/nov`
//! directory, named by the article's prefix. A summary file is formatted
//! as follows:
//!
//! - u8: Format version, currently 0.
//! - CBOR: A `NovRecord`.
//!
//! A version we don't understand is simply "no cached data"; the summary
//! is recomputed from the article and the file rewritten. The same goes
//! for a file that fails to decode. Summaries are mostly derived data,
//! where the worst a lost one can cost is a reparse. The exception is the
//! article number stored inside, which is what makes numbering survive
//! restarts; losing that is survivable too (a reparse allocates a fresh
//! number), but readers will see the article renumbered.
//!
//! Writes go through a temporary sibling, named by suffixing the prefix
//! with a colon (which no prefix can contain), which is then renamed over
//! the canonical name, so a reader never observes a half-written summary.

use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::warn;

use crate::store::headers;
use crate::store::model::{ArtNum, NovRecord};
use crate::support::error::Error;
use crate::support::file_ops::IgnoreKinds;

pub const FORMAT_VERSION: u8 = 0;

/// The domain used in message-ids we synthesise ourselves.
///
/// Recognising our own domain also lets us spot ids fabricated by an
/// earlier pass over a renamed copy of the article and replace them with
/// one matching the current prefix.
const SYNTHETIC_DOMAIN: &str = "@newsdir";

pub fn record_path(nov_dir: &Path, prefix: &str) -> PathBuf {
    nov_dir.join(prefix)
}

/// Read the persisted summary for `prefix`, if there is one we can use.
pub fn load(nov_dir: &Path, prefix: &str) -> Result<Option<NovRecord>, Error> {
    let data = match fs::read(record_path(nov_dir, prefix)) {
        Ok(data) => data,
        Err(e) if io::ErrorKind::NotFound == e.kind() => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if Some(&FORMAT_VERSION) != data.first() {
        return Ok(None);
    }

    match serde_cbor::from_slice(&data[1..]) {
        Ok(record) => Ok(Some(record)),
        Err(e) => {
            warn!(
                "Discarding undecodable header summary for '{}': {}",
                prefix, e
            );
            Ok(None)
        }
    }
}

/// Atomically persist `record` as the summary for `prefix`.
pub fn store(
    nov_dir: &Path,
    prefix: &str,
    record: &NovRecord,
) -> Result<(), Error> {
    fs::DirBuilder::new()
        .mode(0o770)
        .create(nov_dir)
        .ignore_already_exists()?;

    let mut data = vec![FORMAT_VERSION];
    serde_cbor::to_writer(&mut data, record)?;

    // The temp file is created exclusively so concurrent writers cannot
    // interleave within one file. A leftover temp can only come from a
    // crashed writer of this same derived data, so clearing it first is
    // safe: whichever rename lands last wins with an equivalent record.
    let temp = nov_dir.join(format!("{}:", prefix));
    fs::remove_file(&temp).ignore_not_found()?;
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(&temp)?;
    file.write_all(&data)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&temp, record_path(nov_dir, prefix))?;
    Ok(())
}

pub fn delete(nov_dir: &Path, prefix: &str) -> Result<(), Error> {
    fs::remove_file(record_path(nov_dir, prefix))
        .ignore_not_found()
        .map_err(Error::from)
}

/// Whether `record` can serve a request made at article modification time
/// `mtime` under the extra header set `extra_headers`.
///
/// The summary knows which extra headers were in effect when it was
/// computed, so it can serve any request for a subset of those even if the
/// configuration has since shrunk. A request for a header it never looked
/// for forces a reparse.
pub fn is_current(
    record: &NovRecord,
    mtime: DateTime<Utc>,
    extra_headers: &[String],
) -> bool {
    record.mtime == mtime
        && extra_headers.iter().all(|h| record.extra.contains(h))
}

/// Parse `data` into a summary record for the article at `prefix`.
pub fn build_record(
    num: ArtNum,
    prefix: &str,
    data: &[u8],
    mtime: DateTime<Utc>,
    extra_headers: &[String],
) -> NovRecord {
    let scan = headers::scan(data, extra_headers);

    let begin = format!(
        "{}\t{}\t{}",
        scan.subject.as_deref().unwrap_or(""),
        scan.from.as_deref().unwrap_or(""),
        scan.date.as_deref().unwrap_or("")
    );
    let mid = format!(
        "{}\t{}\t{}",
        scan.references.as_deref().unwrap_or(""),
        data.len(),
        scan.lines
    );
    let end = scan
        .extra
        .iter()
        .map(|(name, value)| format!("{}: {}", name, value))
        .collect::<Vec<_>>()
        .join("\t");

    let msgid = match scan.msgid {
        Some(ref id) if usable_msgid(id) => id.clone(),
        _ => synthesise_msgid(prefix),
    };

    NovRecord {
        num,
        msgid,
        begin,
        mid,
        end,
        mtime,
        extra: extra_headers.to_vec(),
    }
}

/// Render `record` as one tab-delimited overview line, without the
/// trailing newline.
pub fn overview_line(
    record: &NovRecord,
    server: &str,
    group: &str,
) -> String {
    let mut line = format!(
        "{}\t{}\t{}\t{}\tXref: {} {}:{}",
        record.num.0, record.begin, record.msgid, record.mid, server, group,
        record.num.0
    );
    if !record.end.is_empty() {
        line.push('\t');
        line.push_str(&record.end);
    }
    line
}

fn usable_msgid(id: &str) -> bool {
    id.len() > 2
        && id.starts_with('<')
        && id.ends_with('>')
        && !id[..id.len() - 1].ends_with(SYNTHETIC_DOMAIN)
}

fn synthesise_msgid(prefix: &str) -> String {
    format!("<{}{}>", prefix, SYNTHETIC_DOMAIN)
}

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;

    const ARTICLE: &[u8] = b"From: a@example.com\r\n\
                             Subject: Hello\r\n\
                             Date: Thu, 1 Jan 2026 00:00:00 +0000\r\n\
                             Message-ID: <1@example.com>\r\n\
                             To: b@example.com\r\n\
                             \r\n\
                             one\r\n\
                             two\r\n";

    fn extra() -> Vec<String> {
        vec!["To".to_owned(), "Cc".to_owned()]
    }

    #[test]
    fn build_assembles_overview_fields() {
        let mtime = Utc::now();
        let record = build_record(
            ArtNum::u(42),
            "100.host",
            ARTICLE,
            mtime,
            &extra(),
        );

        assert_eq!(ArtNum::u(42), record.num);
        assert_eq!("<1@example.com>", record.msgid);
        assert_eq!(
            "Hello\ta@example.com\tThu, 1 Jan 2026 00:00:00 +0000",
            record.begin
        );
        assert_eq!(format!("\t{}\t2", ARTICLE.len()), record.mid);
        assert_eq!("To: b@example.com", record.end);
        assert_eq!(extra(), record.extra);
    }

    #[test]
    fn missing_msgid_is_synthesised_from_prefix() {
        let record = build_record(
            ArtNum::u(1),
            "100.host",
            b"Subject: x\n\nbody\n",
            Utc::now(),
            &[],
        );
        assert_eq!("<100.host@newsdir>", record.msgid);

        // A synthetic id inherited from a renamed copy of the file is
        // re-derived rather than trusted.
        let record = build_record(
            ArtNum::u(2),
            "200.host",
            b"Message-ID: <100.host@newsdir>\n\nbody\n",
            Utc::now(),
            &[],
        );
        assert_eq!("<200.host@newsdir>", record.msgid);

        let record = build_record(
            ArtNum::u(3),
            "300.host",
            b"Message-ID: not-bracketed\n\nbody\n",
            Utc::now(),
            &[],
        );
        assert_eq!("<300.host@newsdir>", record.msgid);
    }

    #[test]
    fn round_trips_through_disk() {
        let root = TempDir::new().unwrap();
        let nov_dir = root.path().join(".control").join("nov");

        let record = build_record(
            ArtNum::u(42),
            "100.host",
            ARTICLE,
            Utc::now(),
            &extra(),
        );
        store(&nov_dir, "100.host", &record).unwrap();
        let reloaded = load(&nov_dir, "100.host").unwrap().unwrap();
        assert_eq!(record, reloaded);

        assert_eq!(None, load(&nov_dir, "200.host").unwrap());
    }

    #[test]
    fn version_mismatch_reads_as_no_data() {
        let root = TempDir::new().unwrap();
        let nov_dir = root.path().join("nov");

        let record = build_record(
            ArtNum::u(1),
            "100.host",
            ARTICLE,
            Utc::now(),
            &extra(),
        );
        store(&nov_dir, "100.host", &record).unwrap();

        let mut data = std::fs::read(nov_dir.join("100.host")).unwrap();
        data[0] = FORMAT_VERSION + 1;
        std::fs::write(nov_dir.join("100.host"), &data).unwrap();

        assert_eq!(None, load(&nov_dir, "100.host").unwrap());
    }

    #[test]
    fn currency_requires_mtime_and_extra_subset() {
        let mtime = Utc::now();
        let record =
            build_record(ArtNum::u(1), "100.host", ARTICLE, mtime, &extra());

        assert!(is_current(&record, mtime, &extra()));
        assert!(is_current(&record, mtime, &["Cc".to_owned()]));
        assert!(is_current(&record, mtime, &[]));
        assert!(!is_current(
            &record,
            mtime,
            &["Newsgroups".to_owned()]
        ));
        assert!(!is_current(
            &record,
            mtime + chrono::Duration::seconds(1),
            &extra()
        ));
    }

    #[test]
    fn overview_line_is_tab_delimited() {
        let mtime = Utc::now();
        let record =
            build_record(ArtNum::u(42), "100.host", ARTICLE, mtime, &extra());

        let line = overview_line(&record, "archive", "comp.lang.lisp");
        let fields: Vec<&str> = line.split('\t').collect();
        assert_eq!("42", fields[0]);
        assert_eq!("Hello", fields[1]);
        assert_eq!("a@example.com", fields[2]);
        assert_eq!("Thu, 1 Jan 2026 00:00:00 +0000", fields[3]);
        assert_eq!("<1@example.com>", fields[4]);
        assert_eq!("", fields[5]);
        assert_eq!(format!("{}", ARTICLE.len()), fields[6]);
        assert_eq!("2", fields[7]);
        assert_eq!("Xref: archive comp.lang.lisp:42", fields[8]);
        assert_eq!("To: b@example.com", fields[9]);
        assert_eq!(10, fields.len());
    }
}
