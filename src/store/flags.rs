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

//! Encoding and decoding of maildir flag suffixes.
//!
//! An article file in `cur` is conventionally named `prefix:2,flags`, where
//! `prefix` is the unique name the article was delivered under and `flags`
//! is a set of single-character flags. Files still sitting in `new` have no
//! suffix at all. The prefix is everything up to the first `:`; it never
//! changes for the lifetime of the article, no matter how the flags churn,
//! which is what lets the prefix serve as the article's stable key.
//!
//! Names we emit always carry their flags ASCII-sorted and deduplicated.
//! Names we read may have them in any order, and a suffix that exists but
//! does not start with `:2,` is read as having no flags at all. Editing the
//! flags of such a file would destroy whatever the suffix was, so edits to
//! one fail instead.
//!
//! Four flags correspond to newsreader marks; all others (drafts, trashed,
//! and any nonstandard letters) are preserved verbatim but mean nothing
//! here.

use crate::support::error::Error;

/// The flag characters with newsreader meaning, paired with the mark each
/// one backs.
pub const FLAG_MARKS: &[(char, &str)] = &[
    ('F', "tick"),
    ('P', "forward"),
    ('R', "reply"),
    ('S', "read"),
];

/// Split an article file name into its prefix and suffix.
///
/// The suffix retains its leading `:` and may be empty.
pub fn split_name(name: &str) -> (&str, &str) {
    match name.find(':') {
        Some(ix) => (&name[..ix], &name[ix..]),
        None => (name, ""),
    }
}

/// Return the flags carried by `suffix`, in file name order.
///
/// Unflagged files and unintelligible suffixes both yield nothing.
pub fn flags_of(suffix: &str) -> impl Iterator<Item = char> + '_ {
    let flags = if suffix.starts_with(":2,") {
        &suffix[3..]
    } else {
        ""
    };
    flags.chars()
}

/// Return whether `suffix` carries `flag`.
pub fn has_flag(suffix: &str, flag: char) -> bool {
    flags_of(suffix).any(|f| f == flag)
}

/// Return `suffix` with `flag` added.
pub fn with_flag(suffix: &str, flag: char) -> Result<String, Error> {
    let mut flags = flag_chars_for_edit(suffix)?;
    flags.push(flag);
    Ok(assemble(flags))
}

/// Return `suffix` with `flag` removed.
///
/// A file with no suffix at all has no flags to remove, so its (absent)
/// suffix is returned unchanged rather than being normalised to `:2,`.
pub fn without_flag(suffix: &str, flag: char) -> Result<String, Error> {
    if suffix.is_empty() {
        return Ok(String::new());
    }

    let mut flags = flag_chars_for_edit(suffix)?;
    flags.retain(|&f| f != flag);
    Ok(assemble(flags))
}

/// Return the mark backed by `flag`, if there is one.
pub fn mark_of_flag(flag: char) -> Option<&'static str> {
    FLAG_MARKS.iter().find(|&&(f, _)| f == flag).map(|&(_, m)| m)
}

/// Return the flag backing `mark`, if there is one.
pub fn flag_of_mark(mark: &str) -> Option<char> {
    FLAG_MARKS.iter().find(|&&(_, m)| m == mark).map(|&(f, _)| f)
}

fn flag_chars_for_edit(suffix: &str) -> Result<Vec<char>, Error> {
    if suffix.is_empty() {
        Ok(Vec::new())
    } else if suffix.starts_with(":2,") {
        Ok(suffix[3..].chars().collect())
    } else {
        Err(Error::BadFlagSuffix)
    }
}

fn assemble(mut flags: Vec<char>) -> String {
    flags.sort_unstable();
    flags.dedup();

    let mut s = String::with_capacity(3 + flags.len());
    s.push_str(":2,");
    for f in flags {
        s.push(f);
    }
    s
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::support::error::Error;

    #[test]
    fn name_splitting() {
        assert_eq!(
            ("1596584891.M43512P3502.lin.gl", ":2,FS"),
            split_name("1596584891.M43512P3502.lin.gl:2,FS")
        );
        assert_eq!(
            ("1596584891.M43512P3502.lin.gl", ""),
            split_name("1596584891.M43512P3502.lin.gl")
        );
        assert_eq!(("100.host", ":2,"), split_name("100.host:2,"));
        // Only the first : splits; the rest belongs to the suffix
        assert_eq!(("a", ":2,S:extra"), split_name("a:2,S:extra"));
        assert_eq!(("", ":2,S"), split_name(":2,S"));
    }

    #[test]
    fn flag_reading() {
        assert_eq!(Vec::<char>::new(), flags_of("").collect::<Vec<_>>());
        assert_eq!(Vec::<char>::new(), flags_of(":2,").collect::<Vec<_>>());
        assert_eq!(
            vec!['F', 'R', 'S'],
            flags_of(":2,FRS").collect::<Vec<_>>()
        );
        // Unsorted input is tolerated on read
        assert_eq!(
            vec!['S', 'F'],
            flags_of(":2,SF").collect::<Vec<_>>()
        );
        // Unintelligible suffixes read as unflagged
        assert_eq!(Vec::<char>::new(), flags_of(":1,FS").collect::<Vec<_>>());
        assert_eq!(Vec::<char>::new(), flags_of(":x").collect::<Vec<_>>());

        assert!(has_flag(":2,FRS", 'S'));
        assert!(!has_flag(":2,FR", 'S'));
        assert!(!has_flag("", 'S'));
    }

    #[test]
    fn flag_editing() {
        assert_eq!(":2,S", &with_flag(":2,", 'S').unwrap());
        assert_eq!(":2,S", &with_flag("", 'S').unwrap());
        assert_eq!(":2,FS", &with_flag(":2,F", 'S').unwrap());
        // Output is sorted and deduplicated even when the input wasn't
        assert_eq!(":2,FRS", &with_flag(":2,SF", 'R').unwrap());
        assert_eq!(":2,FS", &with_flag(":2,SFS", 'F').unwrap());

        assert_eq!(":2,F", &without_flag(":2,FS", 'S').unwrap());
        assert_eq!(":2,", &without_flag(":2,S", 'S').unwrap());
        assert_eq!(":2,F", &without_flag(":2,F", 'S').unwrap());
        assert_eq!("", &without_flag("", 'S').unwrap());

        assert_matches!(
            Err(Error::BadFlagSuffix),
            with_flag(":1,weird", 'S')
        );
        assert_matches!(
            Err(Error::BadFlagSuffix),
            without_flag(":x", 'S')
        );
    }

    #[test]
    fn flag_mark_mapping() {
        assert_eq!(Some("tick"), mark_of_flag('F'));
        assert_eq!(Some("forward"), mark_of_flag('P'));
        assert_eq!(Some("reply"), mark_of_flag('R'));
        assert_eq!(Some("read"), mark_of_flag('S'));
        assert_eq!(None, mark_of_flag('D'));
        assert_eq!(None, mark_of_flag('T'));

        assert_eq!(Some('F'), flag_of_mark("tick"));
        assert_eq!(Some('P'), flag_of_mark("forward"));
        assert_eq!(Some('R'), flag_of_mark("reply"));
        assert_eq!(Some('S'), flag_of_mark("read"));
        assert_eq!(None, flag_of_mark("expire"));
        assert_eq!(None, flag_of_mark("save"));
    }
}
