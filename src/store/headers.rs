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

//! Extraction of overview data from raw article text.
//!
//! This is a single forward pass over the bytes of an article. Header lines
//! are unfolded and matched case-insensitively; the first occurrence of each
//! interesting header wins. The header block ends at the first blank line,
//! and everything after it only gets its lines counted.
//!
//! Values destined for overview records must never contain a tab or line
//! break, since the overview wire format is tab-delimited lines, so both are
//! replaced with single spaces here.
//!
//! Headers are nominally ASCII; anything else is decoded lossily rather
//! than rejected, since a reader that drops an article over a stray byte in
//! its Subject is worse than useless as an archive.

use std::convert::TryInto;

use memchr::{memchr, memchr_iter};

/// The interesting headers of one article.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderScan {
    pub subject: Option<String>,
    pub from: Option<String>,
    pub date: Option<String>,
    pub msgid: Option<String>,
    pub references: Option<String>,
    /// Values found for the requested extra headers, as (name, value) pairs
    /// in request order. Headers not present are omitted.
    pub extra: Vec<(String, String)>,
    /// The number of lines in the article body.
    pub lines: u32,
}

/// Scan `data` for the standard overview headers plus `extra_headers`.
pub fn scan(data: &[u8], extra_headers: &[String]) -> HeaderScan {
    let mut out = HeaderScan::default();
    let mut extra: Vec<Option<String>> = vec![None; extra_headers.len()];
    let mut current: Option<(String, String)> = None;

    let mut pos = 0;
    let mut body: &[u8] = &[];
    while pos < data.len() {
        let (line, next) = match memchr(b'\n', &data[pos..]) {
            Some(ix) => (&data[pos..pos + ix], pos + ix + 1),
            None => (&data[pos..], data.len()),
        };
        let line = strip_cr(line);

        if line.is_empty() {
            body = &data[next..];
            break;
        }

        if b' ' == line[0] || b'\t' == line[0] {
            // Folded continuation of the previous header. A continuation
            // with no header to continue is garbage and gets dropped.
            if let Some((_, ref mut value)) = current {
                value.push(' ');
                value.push_str(&lossy(trim_wsp(line)));
            }
        } else {
            flush(&mut out, extra_headers, &mut extra, current.take());
            current = match memchr(b':', line) {
                Some(cix) => Some((
                    lossy(trim_wsp(&line[..cix])),
                    lossy(trim_wsp(&line[cix + 1..])),
                )),
                // A header line with no colon is garbage too
                None => None,
            };
        }

        pos = next;
    }
    flush(&mut out, extra_headers, &mut extra, current.take());

    for (ix, value) in extra.into_iter().enumerate() {
        if let Some(value) = value {
            out.extra.push((extra_headers[ix].clone(), value));
        }
    }

    let mut lines = memchr_iter(b'\n', body).count();
    if !body.is_empty() && Some(&b'\n') != body.last() {
        lines += 1;
    }
    out.lines = lines.try_into().unwrap_or(u32::MAX);

    out
}

fn flush(
    out: &mut HeaderScan,
    extra_headers: &[String],
    extra: &mut [Option<String>],
    header: Option<(String, String)>,
) {
    let (name, value) = match header {
        Some(h) => h,
        None => return,
    };
    let value = value.replace('\t', " ");

    let dst = if name.eq_ignore_ascii_case("subject") {
        &mut out.subject
    } else if name.eq_ignore_ascii_case("from") {
        &mut out.from
    } else if name.eq_ignore_ascii_case("date") {
        &mut out.date
    } else if name.eq_ignore_ascii_case("message-id") {
        &mut out.msgid
    } else if name.eq_ignore_ascii_case("references") {
        &mut out.references
    } else {
        for (ix, target) in extra_headers.iter().enumerate() {
            if name.eq_ignore_ascii_case(target) && extra[ix].is_none() {
                extra[ix] = Some(value);
                break;
            }
        }
        return;
    };

    if dst.is_none() {
        *dst = Some(value);
    }
}

fn strip_cr(line: &[u8]) -> &[u8] {
    match line.split_last() {
        Some((&b'\r', rest)) => rest,
        _ => line,
    }
}

fn trim_wsp(mut s: &[u8]) -> &[u8] {
    while let Some((&f, rest)) = s.split_first() {
        if b' ' == f || b'\t' == f {
            s = rest;
        } else {
            break;
        }
    }
    while let Some((&l, rest)) = s.split_last() {
        if b' ' == l || b'\t' == l {
            s = rest;
        } else {
            break;
        }
    }
    s
}

fn lossy(s: &[u8]) -> String {
    String::from_utf8_lossy(s).into_owned()
}
