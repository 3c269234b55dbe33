//-
// Copyright (c) 2020, Jason Lingle
//
// This file is part of Crymap.
//
// Crymap is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Crymap is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Crymap. If not, see <http://www.gnu.org/licenses/>.

//! Access control lists in the style of RFC 4314.

use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::support::error::Error;

bitflags! {
    /// The RFC 4314 rights, each identified by a single letter.
    pub struct Rights: u32 {
        /// `l`: the mailbox is visible to LIST.
        const LOOKUP = 1 << 0;
        /// `r`: the mailbox can be selected and read.
        const READ = 1 << 1;
        /// `s`: `\Seen` is kept across sessions.
        const KEEP_SEEN = 1 << 2;
        /// `w`: flags other than `\Seen` and `\Deleted` can be written.
        const WRITE = 1 << 3;
        /// `i`: messages can be appended or copied in.
        const INSERT = 1 << 4;
        /// `p`: mail can be submitted to the mailbox.
        const POST = 1 << 5;
        /// `k`: inferior mailboxes can be created.
        const CREATE = 1 << 6;
        /// `x`: the mailbox can be deleted or renamed.
        const DELETE_MAILBOX = 1 << 7;
        /// `t`: `\Deleted` can be set or cleared.
        const DELETE_MESSAGES = 1 << 8;
        /// `e`: EXPUNGE can be performed.
        const EXPUNGE = 1 << 9;
        /// `a`: the ACL itself can be administered.
        const ADMINISTER = 1 << 10;
    }
}

const LETTERS: [(char, Rights); 11] = [
    ('l', Rights::LOOKUP),
    ('r', Rights::READ),
    ('s', Rights::KEEP_SEEN),
    ('w', Rights::WRITE),
    ('i', Rights::INSERT),
    ('p', Rights::POST),
    ('k', Rights::CREATE),
    ('x', Rights::DELETE_MAILBOX),
    ('t', Rights::DELETE_MESSAGES),
    ('e', Rights::EXPUNGE),
    ('a', Rights::ADMINISTER),
];

impl fmt::Display for Rights {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for &(letter, right) in &LETTERS {
            if self.contains(right) {
                write!(f, "{}", letter)?;
            }
        }
        Ok(())
    }
}

impl FromStr for Rights {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let mut rights = Rights::empty();
        for c in s.chars() {
            let &(_, right) =
                LETTERS.iter().find(|&&(l, _)| l == c).ok_or_else(|| {
                    Error::invalid(format!("unknown right {:?}", c))
                })?;
            rights |= right;
        }
        Ok(rights)
    }
}

/// Maps identifiers (usually `Owner::key()` values) to their rights.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    into = "BTreeMap<String, String>",
    try_from = "BTreeMap<String, String>"
)]
pub struct MailboxAcl {
    entries: BTreeMap<String, Rights>,
}

impl MailboxAcl {
    /// An ACL which grants everything to `identifier` and nothing to anyone
    /// else.
    pub fn owned_by(identifier: impl Into<String>) -> Self {
        let mut acl = MailboxAcl::default();
        acl.grant(identifier, Rights::all());
        acl
    }

    pub fn rights_of(&self, identifier: &str) -> Rights {
        self.entries
            .get(identifier)
            .copied()
            .unwrap_or_else(Rights::empty)
    }

    pub fn grant(&mut self, identifier: impl Into<String>, rights: Rights) {
        *self
            .entries
            .entry(identifier.into())
            .or_insert_with(Rights::empty) |= rights;
    }

    /// Remove `rights` from `identifier`, dropping the entry entirely once
    /// nothing is left.
    pub fn revoke(&mut self, identifier: &str, rights: Rights) {
        let now_empty = match self.entries.get_mut(identifier) {
            Some(existing) => {
                existing.remove(rights);
                existing.is_empty()
            }
            None => false,
        };

        if now_empty {
            self.entries.remove(identifier);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Rights)> + '_ {
        self.entries.iter().map(|(k, &v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<MailboxAcl> for BTreeMap<String, String> {
    fn from(acl: MailboxAcl) -> Self {
        acl.entries
            .into_iter()
            .map(|(k, v)| (k, v.to_string()))
            .collect()
    }
}

impl TryFrom<BTreeMap<String, String>> for MailboxAcl {
    type Error = Error;

    fn try_from(raw: BTreeMap<String, String>) -> Result<Self, Error> {
        let entries = raw
            .into_iter()
            .map(|(k, v)| Ok((k, v.parse::<Rights>()?)))
            .collect::<Result<BTreeMap<_, _>, Error>>()?;
        Ok(MailboxAcl { entries })
    }
}
