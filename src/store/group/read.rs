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
use std::io;

use super::defs::*;
use crate::store::model::{ArtNum, ArtScope};
use crate::store::nov;
use crate::support::error::Error;

impl Group {
    /// Read article `num` in full.
    ///
    /// An article that was live at the last scan but whose file has since
    /// vanished is expired on the spot and reported as such, which is a
    /// different condition from a number that was never live.
    pub fn read_article(&mut self, num: ArtNum) -> Result<Vec<u8>, Error> {
        let (prefix, suffix) = match self.index.by_num(num) {
            Some(art) => (art.prefix.clone(), art.suffix.clone()),
            None => return Err(Error::NxArticle),
        };

        let (path, observed) = match self.locate(&prefix, &suffix) {
            Some(found) => found,
            None => {
                self.expire_descriptor(num);
                return Err(Error::ExpiredArticle);
            }
        };
        if observed != suffix {
            if let Some(art) = self.index.by_num_mut(num) {
                art.suffix = observed;
            }
        }

        match fs::read(&path) {
            Ok(data) => Ok(data),
            Err(e) if io::ErrorKind::NotFound == e.kind() => {
                self.expire_descriptor(num);
                Err(Error::ExpiredArticle)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read the article carrying the given message id.
    pub fn read_by_msgid(&mut self, msgid: &str) -> Result<Vec<u8>, Error> {
        let num =
            self.index.num_of_msgid(msgid).ok_or(Error::NxArticle)?;
        self.read_article(num)
    }

    /// Produce overview lines for the articles in `scope`, ascending by
    /// number. Articles whose files vanish mid-query are silently dropped
    /// from the output.
    pub fn overview(
        &mut self,
        server: &str,
        scope: &ArtScope,
    ) -> Result<Vec<String>, Error> {
        let mut nums = self.index.nums_in_scope(scope);
        nums.reverse();

        let mut lines = Vec::with_capacity(nums.len());
        for num in nums {
            if let Some(record) = self.get_or_refresh(num)? {
                lines.push(nov::overview_line(&record, server, &self.name));
            }
        }
        Ok(lines)
    }
}
