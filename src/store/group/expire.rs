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
use std::time::{Duration, SystemTime};

use log::{info, warn};

use super::defs::*;
use crate::store::dir_list;
use crate::store::model::{ArtNum, ArtRange, ArtScope};
use crate::support::error::Error;
use crate::support::file_ops::IgnoreKinds;

impl Group {
    /// Expire the articles in `scope`, returning the ones left alive.
    ///
    /// Without `force`, an article is only removed once its file is older
    /// than the group's configured expiry age; a group with no configured
    /// age never expires anything. With `force`, everything in scope goes.
    ///
    /// An article whose file has already vanished counts as expired
    /// either way, since there is nothing left to keep.
    pub fn expire(
        &mut self,
        scope: &ArtScope,
        force: bool,
    ) -> Result<ArtRange, Error> {
        self.not_read_only()?;
        self.scan()?;

        let cutoff = self.expiry_age_days.and_then(|days| {
            SystemTime::now()
                .checked_sub(Duration::from_secs(u64::from(days) * 86_400))
        });

        let mut survivors = ArtRange::new();
        let mut expired = 0u32;
        for num in self.index.nums_in_scope(scope) {
            let (prefix, suffix) = match self.index.by_num(num) {
                Some(art) => (art.prefix.clone(), art.suffix.clone()),
                None => continue,
            };

            let path = match self.locate(&prefix, &suffix) {
                Some((path, _)) => path,
                None => {
                    self.expire_descriptor(num);
                    expired += 1;
                    continue;
                }
            };

            if !force {
                let old_enough = match cutoff {
                    None => false,
                    Some(cut) => fs::metadata(&path)
                        .ok()
                        .and_then(|md| md.modified().ok())
                        .map_or(false, |mtime| mtime <= cut),
                };
                if !old_enough {
                    survivors.insert(num, num);
                    continue;
                }
            }

            if let Err(e) = fs::remove_file(&path).ignore_not_found() {
                warn!(
                    "{} Failed to remove article {}: {}",
                    self.log_prefix, num.0, e
                );
                survivors.insert(num, num);
                continue;
            }

            self.drop_mark_links(&prefix, num);
            self.expire_descriptor(num);
            expired += 1;
        }

        if expired > 0 {
            info!("{} Expired {} articles", self.log_prefix, expired);
        }
        Ok(survivors)
    }

    /// Remove every on-disk and cached mark the article carried.
    fn drop_mark_links(&mut self, prefix: &str, num: ArtNum) {
        for mark in
            dir_list::visible_dirs(&self.marks_dir).unwrap_or_default()
        {
            let link = self.mark_dir(&mark).join(prefix);
            if let Err(e) = fs::remove_file(&link).ignore_not_found() {
                warn!(
                    "{} Failed to remove mark link {:?}: {}",
                    self.log_prefix, link, e
                );
            }
        }
        for range in self.mark_ranges.values_mut() {
            range.remove(num);
        }
    }
}
