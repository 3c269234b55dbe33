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

use std::convert::TryFrom;
use std::fmt;
use std::num::{NonZeroU32, NonZeroU64};
use std::str::FromStr;
use std::sync::Arc;

use chrono::prelude::*;
use serde::{Deserialize, Serialize};

use crate::name::model::{MailboxName, Owner};
use crate::store::acl::MailboxAcl;
use crate::support::error::Error;

/// The backend-assigned identity of a mailbox.
///
/// Ids are never reused within a store, so a stale id can be detected rather
/// than silently referring to a different mailbox.
#[derive(
    Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(transparent)]
pub struct MailboxId(pub u64);

impl fmt::Debug for MailboxId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "MailboxId({})", self.0)
    }
}

impl fmt::Display for MailboxId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Uniquely identifies a message within a single mailbox.
///
/// UIDs start at 1 and are assigned strictly sequentially. They are never
/// reused, even after the message they were assigned to is expunged.
#[derive(
    Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(transparent)]
pub struct Uid(pub NonZeroU32);

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Uid({})", self.0.get())
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.get())
    }
}

impl Uid {
    // Unsafe because new() isn't const
    pub const MIN: Self = unsafe { Uid(NonZeroU32::new_unchecked(1)) };
    pub const MAX: Self =
        unsafe { Uid(NonZeroU32::new_unchecked(u32::MAX)) };

    pub fn of(uid: u32) -> Option<Self> {
        NonZeroU32::new(uid).map(Uid)
    }

    /// The UID after this one, or `MailboxFull` if the UID space is
    /// exhausted.
    pub fn next(self) -> Result<Self, Error> {
        self.0
            .get()
            .checked_add(1)
            .and_then(Uid::of)
            .ok_or(Error::MailboxFull)
    }

    /// The first UID after `last`, which is `None` for a mailbox that has
    /// never held a message.
    pub fn after(last: Option<Uid>) -> Result<Self, Error> {
        last.map_or(Ok(Uid::MIN), Uid::next)
    }

    #[cfg(test)]
    pub fn u(uid: u32) -> Self {
        Uid::of(uid).unwrap()
    }
}

impl FromStr for Uid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        s.parse::<u32>()
            .ok()
            .and_then(Uid::of)
            .ok_or_else(|| Error::invalid(format!("bad UID {:?}", s)))
    }
}

/// A per-mailbox modification sequence number.
///
/// Every change visible to readers of a mailbox takes a fresh modseq, so the
/// highest modseq of a mailbox only ever increases.
#[derive(
    Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(transparent)]
pub struct Modseq(NonZeroU64);

impl Modseq {
    // Unsafe because NonZeroU64::new() is non-const.
    pub const MIN: Self = unsafe { Modseq(NonZeroU64::new_unchecked(1)) };

    pub fn of(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Modseq)
    }

    pub fn raw(self) -> u64 {
        self.0.get()
    }

    pub fn next(self) -> Result<Self, Error> {
        self.0
            .get()
            .checked_add(1)
            .and_then(Modseq::of)
            .ok_or(Error::MailboxFull)
    }

    pub fn after(last: Option<Modseq>) -> Result<Self, Error> {
        last.map_or(Ok(Modseq::MIN), Modseq::next)
    }
}

impl fmt::Debug for Modseq {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Modseq({})", self.0.get())
    }
}

impl fmt::Display for Modseq {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.get())
    }
}

/// A persisted mailbox.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mailbox {
    /// `None` until the mailbox is first saved.
    pub id: Option<MailboxId>,
    pub name: MailboxName,
    pub owner: Owner,
    pub is_owner_group: bool,
    /// Fixed for the life of the mailbox. Recreating a mailbox under the same
    /// name always produces a greater value.
    pub uid_validity: u32,
    pub last_uid: Option<Uid>,
    pub highest_modseq: Option<Modseq>,
    pub acl: MailboxAcl,
}

impl Mailbox {
    /// Prepare a new, unsaved mailbox.
    ///
    /// The owner is given full rights. `uid_validity` is assigned by the
    /// backend on save.
    pub fn new(name: MailboxName, owner: Owner) -> Self {
        Mailbox {
            id: None,
            is_owner_group: owner.is_group,
            acl: MailboxAcl::owned_by(owner.key()),
            name,
            owner,
            uid_validity: 0,
            last_uid: None,
            highest_modseq: None,
        }
    }

    /// Return the id, or `NxMailbox` if this mailbox was never saved.
    pub fn require_id(&self) -> Result<MailboxId, Error> {
        self.id.ok_or(Error::NxMailbox)
    }
}

/// A message flag.
///
/// System flags are represented as top-level enum values. Keywords are in the
/// `Keyword` case and compare ASCII case-insensitively.
///
/// The `Display` format is the IMAP spelling; `FromStr` does the reverse and
/// accepts non-standard casing of the system flags.
#[derive(Clone, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Flag {
    Answered,
    Deleted,
    Draft,
    Flagged,
    Recent,
    Seen,
    Keyword(String),
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            &Flag::Answered => write!(f, "\\Answered"),
            &Flag::Deleted => write!(f, "\\Deleted"),
            &Flag::Draft => write!(f, "\\Draft"),
            &Flag::Flagged => write!(f, "\\Flagged"),
            &Flag::Recent => write!(f, "\\Recent"),
            &Flag::Seen => write!(f, "\\Seen"),
            &Flag::Keyword(ref kw) => write!(f, "{}", kw),
        }
    }
}

impl fmt::Debug for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        <Flag as fmt::Display>::fmt(self, f)
    }
}

impl FromStr for Flag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        if s.eq_ignore_ascii_case("\\answered") {
            Ok(Flag::Answered)
        } else if s.eq_ignore_ascii_case("\\deleted") {
            Ok(Flag::Deleted)
        } else if s.eq_ignore_ascii_case("\\draft") {
            Ok(Flag::Draft)
        } else if s.eq_ignore_ascii_case("\\flagged") {
            Ok(Flag::Flagged)
        } else if s.eq_ignore_ascii_case("\\recent") {
            Ok(Flag::Recent)
        } else if s.eq_ignore_ascii_case("\\seen") {
            Ok(Flag::Seen)
        } else if s.starts_with('\\') {
            Err(Error::invalid(format!("unknown system flag {}", s)))
        } else if !s.is_empty()
            && s.as_bytes().iter().copied().all(is_atom_char)
        {
            Ok(Flag::Keyword(s.to_owned()))
        } else {
            Err(Error::invalid(format!("unsafe keyword {:?}", s)))
        }
    }
}

fn is_atom_char(ch: u8) -> bool {
    match ch {
        0..=b' ' => false,
        127..=255 => false,
        b'(' | b')' | b'{' | b'*' | b'%' | b'\\' | b'"' | b']' => false,
        _ => true,
    }
}

impl From<Flag> for String {
    fn from(flag: Flag) -> Self {
        flag.to_string()
    }
}

impl TryFrom<String> for Flag {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Error> {
        s.parse()
    }
}

impl PartialEq for Flag {
    fn eq(&self, other: &Flag) -> bool {
        match (self, other) {
            (&Flag::Answered, &Flag::Answered) => true,
            (&Flag::Deleted, &Flag::Deleted) => true,
            (&Flag::Draft, &Flag::Draft) => true,
            (&Flag::Flagged, &Flag::Flagged) => true,
            (&Flag::Recent, &Flag::Recent) => true,
            (&Flag::Seen, &Flag::Seen) => true,
            // Only ASCII case-insensitivity; IMAP has no way to express
            // non-ASCII keywords anyway.
            (&Flag::Keyword(ref a), &Flag::Keyword(ref b)) => {
                a.eq_ignore_ascii_case(b)
            }
            _ => false,
        }
    }
}

impl Eq for Flag {}

/// A set of flags which remembers insertion order.
///
/// Equality ignores order.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Flag>", into = "Vec<Flag>")]
pub struct Flags(Vec<Flag>);

impl Flags {
    pub fn new() -> Self {
        Flags::default()
    }

    pub fn contains(&self, flag: &Flag) -> bool {
        self.0.contains(flag)
    }

    /// Add `flag`, returning whether it was absent.
    pub fn insert(&mut self, flag: Flag) -> bool {
        if self.contains(&flag) {
            false
        } else {
            self.0.push(flag);
            true
        }
    }

    /// Remove `flag`, returning whether it was present.
    pub fn remove(&mut self, flag: &Flag) -> bool {
        let before = self.0.len();
        self.0.retain(|f| f != flag);
        before != self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Flag> + '_ {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for Flags {
    fn eq(&self, other: &Flags) -> bool {
        self.0.len() == other.0.len()
            && self.0.iter().all(|f| other.contains(f))
    }
}

impl Eq for Flags {}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.0.iter()).finish()
    }
}

impl std::iter::FromIterator<Flag> for Flags {
    fn from_iter<I: IntoIterator<Item = Flag>>(it: I) -> Self {
        let mut flags = Flags::new();
        for flag in it {
            flags.insert(flag);
        }
        flags
    }
}

impl From<Vec<Flag>> for Flags {
    fn from(v: Vec<Flag>) -> Self {
        v.into_iter().collect()
    }
}

impl From<Flags> for Vec<Flag> {
    fn from(flags: Flags) -> Self {
        flags.0
    }
}

/// How much of a message's content to load.
///
/// This is a projection hint only; it never changes which messages are
/// returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchLevel {
    /// No content at all.
    Metadata,
    /// Only the header block.
    Headers,
    /// The whole message.
    Full,
}

/// A persisted message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub mailbox_id: Option<MailboxId>,
    pub uid: Option<Uid>,
    pub modseq: Option<Modseq>,
    pub flags: Flags,
    pub internal_date: DateTime<Utc>,
    pub size: u64,
    /// The length of the header block, including the blank line that ends
    /// it.
    pub header_len: u64,
    pub content: Option<Arc<[u8]>>,
}

impl Message {
    /// Prepare a new message holding `data`, not yet assigned to any
    /// mailbox.
    pub fn new(data: impl Into<Vec<u8>>, internal_date: DateTime<Utc>) -> Self {
        let data = data.into();
        Message {
            mailbox_id: None,
            uid: None,
            modseq: None,
            flags: Flags::new(),
            internal_date,
            size: data.len() as u64,
            header_len: header_len(&data) as u64,
            content: Some(data.into()),
        }
    }

    pub fn with_flags(mut self, flags: impl IntoIterator<Item = Flag>) -> Self {
        for flag in flags {
            self.flags.insert(flag);
        }
        self
    }

    /// The metadata of this message, which must have been stamped already.
    pub fn metadata(&self) -> Result<MessageMetadata, Error> {
        match (self.uid, self.modseq) {
            (Some(uid), Some(modseq)) => Ok(MessageMetadata {
                uid,
                modseq,
                flags: self.flags.clone(),
                internal_date: self.internal_date,
                size: self.size,
            }),
            _ => Err(Error::invalid("message has no UID or modseq yet")),
        }
    }

    /// Return a copy of this message with content trimmed to `level`.
    pub fn project(&self, level: FetchLevel) -> Self {
        let mut projected = self.clone();
        projected.content = match level {
            FetchLevel::Metadata => None,
            FetchLevel::Full => self.content.clone(),
            FetchLevel::Headers => self.content.as_ref().map(|c| {
                let end = (self.header_len as usize).min(c.len());
                Arc::from(&c[..end])
            }),
        };
        projected
    }
}

/// Find the end of the header block: just past the first blank line, or the
/// end of the data if there is none.
fn header_len(data: &[u8]) -> usize {
    if data.starts_with(b"\n") {
        return 1;
    }
    if data.starts_with(b"\r\n") {
        return 2;
    }

    for lf in memchr::memchr_iter(b'\n', data) {
        let rest = &data[lf + 1..];
        if rest.starts_with(b"\n") {
            return lf + 2;
        }
        if rest.starts_with(b"\r\n") {
            return lf + 3;
        }
    }

    data.len()
}

/// The stamped, content-free description of a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub uid: Uid,
    pub modseq: Modseq,
    pub flags: Flags,
    pub internal_date: DateTime<Utc>,
    pub size: u64,
}

/// A selection of messages by UID.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageRange {
    All,
    /// Every UID greater than or equal to the bound.
    From(Uid),
    /// An inclusive range.
    Range(Uid, Uid),
    One(Uid),
}

impl MessageRange {
    /// Construct an inclusive range, failing if it is inverted.
    pub fn range(from: Uid, to: Uid) -> Result<Self, Error> {
        let r = MessageRange::Range(from, to);
        r.validate()?;
        Ok(r)
    }

    /// Fail with `InvalidArgument` if this is an inverted range.
    ///
    /// `Range` is a public variant, so every consumer needs to call this on
    /// ranges it receives.
    pub fn validate(&self) -> Result<(), Error> {
        match *self {
            MessageRange::Range(from, to) if to < from => {
                Err(Error::invalid(format!("inverted range {}:{}", from, to)))
            }
            _ => Ok(()),
        }
    }

    pub fn contains(&self, uid: Uid) -> bool {
        match *self {
            MessageRange::All => true,
            MessageRange::From(from) => uid >= from,
            MessageRange::Range(from, to) => uid >= from && uid <= to,
            MessageRange::One(one) => uid == one,
        }
    }

    /// The inclusive bounds of this range.
    pub fn bounds(&self) -> (Uid, Uid) {
        match *self {
            MessageRange::All => (Uid::MIN, Uid::MAX),
            MessageRange::From(from) => (from, Uid::MAX),
            MessageRange::Range(from, to) => (from, to),
            MessageRange::One(one) => (one, one),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlagsUpdateMode {
    Add,
    Remove,
    Replace,
}

/// A change to apply to the flags of a set of messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlagsUpdate {
    pub mode: FlagsUpdateMode,
    pub flags: Flags,
}

impl FlagsUpdate {
    pub fn add(flags: impl IntoIterator<Item = Flag>) -> Self {
        FlagsUpdate {
            mode: FlagsUpdateMode::Add,
            flags: flags.into_iter().collect(),
        }
    }

    pub fn remove(flags: impl IntoIterator<Item = Flag>) -> Self {
        FlagsUpdate {
            mode: FlagsUpdateMode::Remove,
            flags: flags.into_iter().collect(),
        }
    }

    pub fn replace(flags: impl IntoIterator<Item = Flag>) -> Self {
        FlagsUpdate {
            mode: FlagsUpdateMode::Replace,
            flags: flags.into_iter().collect(),
        }
    }

    /// Compute the flags that result from applying this update to `flags`.
    pub fn apply(&self, flags: &Flags) -> Flags {
        match self.mode {
            FlagsUpdateMode::Replace => self.flags.clone(),
            FlagsUpdateMode::Add => {
                let mut result = flags.clone();
                for flag in self.flags.iter() {
                    result.insert(flag.clone());
                }
                result
            }
            FlagsUpdateMode::Remove => {
                let mut result = flags.clone();
                for flag in self.flags.iter() {
                    result.remove(flag);
                }
                result
            }
        }
    }
}

/// The effect of a `FlagsUpdate` on a single message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdatedFlags {
    pub uid: Uid,
    pub modseq: Modseq,
    pub old_flags: Flags,
    pub new_flags: Flags,
}
