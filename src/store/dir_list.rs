//-
// Copyright (c) 2026, Jason Lingle
//
// This file is part of Newsdir.
//
// Newsdir is free software: you can  redistribute it and/or modify it under
// the  terms of  the GNU  General Public  License as  published by  the Free
// Software Foundation,  either version  3 of the  License, or  (at your
// option) any later version.
//
// Newsdir is  distributed in the hope  that it will be  useful, but WITHOUT
// ANY  WARRANTY;  without  even  the implied  warranty  of  MERCHANTABILITY
// or FITNESS FOR  A PARTICULAR PURPOSE.  See the GNU  General Public License
// for more details.
//
// You should have received a copy of the GNU General Public License along
// with Newsdir. If not, see <http://www.gnu.org/licenses/>.

//! Directory listing for maildir-shaped trees.
//!
//! All listings skip dot files, since every control structure we or other
//! maildir software put inside a maildir starts with a dot. Entries whose
//! names are not valid UTF-8 are also skipped; they cannot have been
//! written by a conforming delivery agent, and treating them as opaque
//! blobs would just push the problem into every caller.

use std::fs;
use std::io;
use std::path::Path;

/// Return the visible file names in `dir`, in arbitrary order.
pub fn visible_names(dir: &Path) -> io::Result<Vec<String>> {
    list(dir, false)
}

/// Return the visible subdirectory names in `dir`, in arbitrary order.
pub fn visible_dirs(dir: &Path) -> io::Result<Vec<String>> {
    list(dir, true)
}

fn list(dir: &Path, dirs_only: bool) -> io::Result<Vec<String>> {
    let mut ret = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if dirs_only && !entry.file_type()?.is_dir() {
            continue;
        }

        if let Ok(name) = entry.file_name().into_string() {
            if !name.starts_with('.') {
                ret.push(name);
            }
        }
    }
    Ok(ret)
}

/// A sort key which orders maildir file names by their delivery time.
///
/// Conforming names start with the delivery time in whole seconds, a dot,
/// and then a uniqueness field which by convention carries a sub-second
/// count or sequence number after a letter tag (`M43512P3502` and the
/// like). The key orders by the numeric seconds, then by the first run of
/// digits in the uniqueness field, then by the full name as a plain string
/// so the order is total.
///
/// Names that do not start with a parseable seconds field sort after every
/// name that does, ordered among themselves by name alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum DeliveryKey<'a> {
    Timed(u64, u64, &'a str),
    Unparsed(&'a str),
}

pub fn delivery_key(name: &str) -> DeliveryKey<'_> {
    let mut fields = name.splitn(3, '.');
    let secs = match fields.next().unwrap_or("").parse::<u64>() {
        Ok(secs) => secs,
        Err(_) => return DeliveryKey::Unparsed(name),
    };

    let unique = fields.next().unwrap_or("");
    let sub = match unique.find(|c: char| c.is_ascii_digit()) {
        Some(start) => {
            let digits = &unique[start..];
            let end = digits
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(digits.len());
            // Absurdly long digit runs saturate rather than fall back to
            // string order.
            digits[..end].parse::<u64>().unwrap_or(u64::MAX)
        }
        None => 0,
    };

    DeliveryKey::Timed(secs, sub, name)
}

#[cfg(test)]
mod test {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn listing_skips_dot_files() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("100.host"), b"x").unwrap();
        fs::write(root.path().join("200.host:2,S"), b"x").unwrap();
        fs::write(root.path().join(".hidden"), b"x").unwrap();
        fs::create_dir(root.path().join(".control")).unwrap();
        fs::create_dir(root.path().join("comp.lang.lisp")).unwrap();

        let mut names = visible_names(root.path()).unwrap();
        names.sort();
        assert_eq!(
            vec![
                "100.host".to_owned(),
                "200.host:2,S".to_owned(),
                "comp.lang.lisp".to_owned()
            ],
            names
        );

        let dirs = visible_dirs(root.path()).unwrap();
        assert_eq!(vec!["comp.lang.lisp".to_owned()], dirs);
    }

    #[test]
    fn listing_missing_dir_is_an_error() {
        let root = TempDir::new().unwrap();
        assert!(visible_names(&root.path().join("nx")).is_err());
    }

    fn in_delivery_order(names: &[&str]) {
        for window in names.windows(2) {
            assert!(
                delivery_key(window[0]) < delivery_key(window[1]),
                "expected {:?} to order before {:?}",
                window[0],
                window[1]
            );
        }
    }

    #[test]
    fn delivery_order_is_numeric_on_seconds() {
        in_delivery_order(&["9.host", "10.host", "100.host", "200.host"]);
    }

    #[test]
    fn delivery_order_is_numeric_on_uniqueness_field() {
        in_delivery_order(&[
            "5.M2P99.host",
            "5.M10P1.host",
            "5.M100P1.host",
        ]);
    }

    #[test]
    fn delivery_order_breaks_ties_on_whole_name() {
        in_delivery_order(&["5.M2P1.alpha", "5.M2P1.beta"]);
        in_delivery_order(&["5.aaa", "5.bbb"]);
    }

    #[test]
    fn unparseable_names_sort_after_parseable_ones() {
        in_delivery_order(&["999999999.host", "alpha", "beta"]);
    }
}
