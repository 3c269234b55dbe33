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

//! Messages of the filesystem backend.
//!
//! Each message is a pair of files named by its UID: `<uid>.eml` holds the
//! raw content and `<uid>.meta` holds everything else as CBOR. The `.eml` is
//! always written before the `.meta` and removed after it, so a message
//! exists exactly when its `.meta` does.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read};
use std::sync::Arc;

use chrono::prelude::*;
use log::{error, warn};
use serde::{Deserialize, Serialize};

use super::layout::{self, Layout};
use super::FsStore;
use crate::store::model::*;
use crate::store::{MessageMapper, ModseqProvider, RequestScoped, UidProvider};
use crate::support::error::Error;
use crate::support::file_ops::{ErrorTransforms, FileLock, IgnoreKinds};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct MessageRecord {
    modseq: Modseq,
    flags: Flags,
    internal_date: DateTime<Utc>,
    size: u64,
    header_len: u64,
}

impl MessageRecord {
    fn into_message(self, id: MailboxId, uid: Uid) -> Message {
        Message {
            mailbox_id: Some(id),
            uid: Some(uid),
            modseq: Some(self.modseq),
            flags: self.flags,
            internal_date: self.internal_date,
            size: self.size,
            header_len: self.header_len,
            content: None,
        }
    }

    fn metadata(&self, uid: Uid) -> MessageMetadata {
        MessageMetadata {
            uid,
            modseq: self.modseq,
            flags: self.flags.clone(),
            internal_date: self.internal_date,
            size: self.size,
        }
    }
}

pub struct FsMessageMapper {
    store: FsStore,
}

impl FsMessageMapper {
    pub(super) fn new(store: FsStore) -> Self {
        FsMessageMapper { store }
    }

    fn layout(&self) -> &Layout {
        self.store.layout()
    }

    /// Take the exclusive lock on the messages of `id`.
    fn lock(&self, id: MailboxId) -> Result<FileLock, Error> {
        FileLock::acquire(self.layout().messages_lock(id))
            .on_not_found(Error::NxMailbox)
    }

    /// List the UIDs present in `range`, ascending.
    fn uids(
        &self,
        id: MailboxId,
        range: MessageRange,
    ) -> Result<Vec<Uid>, Error> {
        range.validate()?;
        let mut uids = Vec::new();
        for entry in fs::read_dir(self.layout().messages(id))
            .on_not_found(Error::NxMailbox)?
        {
            let entry = entry?;
            if let Some(uid) = entry
                .file_name()
                .to_str()
                .and_then(layout::parse_meta_name)
            {
                if range.contains(uid) {
                    uids.push(uid);
                }
            }
        }

        uids.sort_unstable();
        Ok(uids)
    }

    /// Load the record of `uid`, or `None` if it was expunged.
    fn load(
        &self,
        id: MailboxId,
        uid: Uid,
    ) -> Result<Option<MessageRecord>, Error> {
        match fs::File::open(self.layout().message_meta(id, uid)) {
            Ok(file) => Ok(Some(serde_cbor::from_reader(file)?)),
            Err(e) if io::ErrorKind::NotFound == e.kind() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Load every record in `range`, ascending by UID.
    fn load_range(
        &self,
        id: MailboxId,
        range: MessageRange,
    ) -> Result<Vec<(Uid, MessageRecord)>, Error> {
        let mut records = Vec::new();
        for uid in self.uids(id, range)? {
            if let Some(record) = self.load(id, uid)? {
                records.push((uid, record));
            }
        }
        Ok(records)
    }

    fn store_record(
        &self,
        id: MailboxId,
        uid: Uid,
        record: &MessageRecord,
    ) -> Result<(), Error> {
        let data = serde_cbor::to_vec(record)?;
        self.layout()
            .staging()
            .spit(self.layout().message_meta(id, uid), true, 0o600, &data)
            .on_not_found(Error::NxMailbox)
    }

    /// Read the content of `uid`, or just its first `limit` bytes.
    ///
    /// Returns `None` if the message was expunged.
    fn load_content(
        &self,
        id: MailboxId,
        uid: Uid,
        limit: Option<u64>,
    ) -> Result<Option<Arc<[u8]>>, Error> {
        let file = match fs::File::open(self.layout().message_data(id, uid)) {
            Ok(file) => file,
            Err(e) if io::ErrorKind::NotFound == e.kind() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut data = Vec::new();
        match limit {
            Some(limit) => file.take(limit).read_to_end(&mut data)?,
            None => (&file).read_to_end(&mut data)?,
        };
        Ok(Some(data.into()))
    }

    fn content_of(&self, message: &Message) -> Result<Arc<[u8]>, Error> {
        if let Some(ref content) = message.content {
            return Ok(Arc::clone(content));
        }

        let (source, uid) =
            message.mailbox_id.zip(message.uid).ok_or_else(|| {
                Error::invalid("message has neither content nor origin")
            })?;
        self.load_content(source, uid, None)?.ok_or(Error::NxMessage)
    }
}

impl RequestScoped for FsMessageMapper {
    fn begin_request(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn end_request(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

impl MessageMapper for FsMessageMapper {
    fn find_in_mailbox(
        &mut self,
        mailbox: &Mailbox,
        range: MessageRange,
        fetch: FetchLevel,
        limit: usize,
    ) -> Result<Vec<Message>, Error> {
        let id = mailbox.require_id()?;
        let limit = if 0 == limit { usize::MAX } else { limit };

        let mut found = Vec::new();
        for uid in self.uids(id, range)? {
            if found.len() >= limit {
                break;
            }

            let record = match self.load(id, uid)? {
                Some(record) => record,
                None => continue,
            };
            let content_limit = match fetch {
                FetchLevel::Metadata => None,
                FetchLevel::Headers => Some(Some(record.header_len)),
                FetchLevel::Full => Some(None),
            };

            let mut message = record.into_message(id, uid);
            if let Some(content_limit) = content_limit {
                match self.load_content(id, uid, content_limit)? {
                    Some(content) => message.content = Some(content),
                    // Expunged since the record was read
                    None => continue,
                }
            }
            found.push(message);
        }

        Ok(found)
    }

    fn count_messages_in_mailbox(
        &mut self,
        mailbox: &Mailbox,
    ) -> Result<u64, Error> {
        Ok(self.uids(mailbox.require_id()?, MessageRange::All)?.len() as u64)
    }

    fn count_unseen_messages_in_mailbox(
        &mut self,
        mailbox: &Mailbox,
    ) -> Result<u64, Error> {
        Ok(self
            .load_range(mailbox.require_id()?, MessageRange::All)?
            .into_iter()
            .filter(|&(_, ref r)| !r.flags.contains(&Flag::Seen))
            .count() as u64)
    }

    fn find_recent_message_uids(
        &mut self,
        mailbox: &Mailbox,
    ) -> Result<Vec<Uid>, Error> {
        Ok(self
            .load_range(mailbox.require_id()?, MessageRange::All)?
            .into_iter()
            .filter(|&(_, ref r)| r.flags.contains(&Flag::Recent))
            .map(|(uid, _)| uid)
            .collect())
    }

    fn find_first_unseen_message_uid(
        &mut self,
        mailbox: &Mailbox,
    ) -> Result<Option<Uid>, Error> {
        let id = mailbox.require_id()?;
        for uid in self.uids(id, MessageRange::All)? {
            if let Some(record) = self.load(id, uid)? {
                if !record.flags.contains(&Flag::Seen) {
                    return Ok(Some(uid));
                }
            }
        }
        Ok(None)
    }

    fn save(
        &mut self,
        mailbox: &Mailbox,
        message: &mut Message,
    ) -> Result<MessageMetadata, Error> {
        let id = mailbox.require_id()?;
        if message.content.is_none() && message.uid.is_none() {
            return Err(Error::invalid("new message saved without content"));
        }
        let _lock = self.lock(id)?;

        let uid = match message.uid {
            Some(uid) => {
                if self.store.last_uid(mailbox)?.map_or(true, |last| uid > last)
                {
                    return Err(Error::invalid(format!(
                        "UID {} was never allocated in {}",
                        uid, mailbox.name
                    )));
                }
                uid
            }
            None => self.store.next_uid(mailbox)?,
        };
        let modseq = match message.modseq {
            Some(modseq) => modseq,
            None => self.store.next_modseq(mailbox)?,
        };

        match message.content {
            Some(ref content) => self
                .layout()
                .staging()
                .spit(self.layout().message_data(id, uid), true, 0o600, content)
                .on_not_found(Error::NxMailbox)?,
            // Replacing only the metadata of an existing message
            None => {
                fs::metadata(self.layout().message_data(id, uid))
                    .on_not_found(Error::invalid(
                        "new message saved without content",
                    ))?;
            }
        }

        let record = MessageRecord {
            modseq,
            flags: message.flags.clone(),
            internal_date: message.internal_date,
            size: message.size,
            header_len: message.header_len,
        };
        self.store_record(id, uid, &record)?;

        message.mailbox_id = Some(id);
        message.uid = Some(uid);
        message.modseq = Some(modseq);
        Ok(record.metadata(uid))
    }

    fn copy(
        &mut self,
        mailbox: &Mailbox,
        message: &Message,
    ) -> Result<MessageMetadata, Error> {
        let content = self.content_of(message)?;
        let mut copy = Message {
            mailbox_id: None,
            uid: None,
            modseq: None,
            content: Some(content),
            ..message.clone()
        };
        copy.flags.insert(Flag::Recent);
        self.save(mailbox, &mut copy)
    }

    fn delete(
        &mut self,
        mailbox: &Mailbox,
        message: &Message,
    ) -> Result<(), Error> {
        let id = mailbox.require_id()?;
        let uid = message.uid.ok_or(Error::NxMessage)?;
        let _lock = self.lock(id)?;

        fs::remove_file(self.layout().message_meta(id, uid))
            .on_not_found(Error::NxMessage)?;
        fs::remove_file(self.layout().message_data(id, uid))
            .ignore_not_found()?;
        Ok(())
    }

    fn update_flags(
        &mut self,
        mailbox: &Mailbox,
        range: MessageRange,
        update: &FlagsUpdate,
    ) -> Result<Vec<UpdatedFlags>, Error> {
        let id = mailbox.require_id()?;
        range.validate()?;
        let _lock = self.lock(id)?;

        let mut updated = Vec::new();
        for (uid, mut record) in self.load_range(id, range)? {
            let new_flags = update.apply(&record.flags);
            if new_flags == record.flags {
                continue;
            }

            let modseq = self.store.next_modseq(mailbox)?;
            let old_flags = std::mem::replace(&mut record.flags, new_flags);
            record.modseq = modseq;
            self.store_record(id, uid, &record)?;
            updated.push(UpdatedFlags {
                uid,
                modseq,
                old_flags,
                new_flags: record.flags,
            });
        }

        Ok(updated)
    }

    fn expunge_marked_for_deletion(
        &mut self,
        mailbox: &Mailbox,
        range: MessageRange,
    ) -> Result<BTreeMap<Uid, MessageMetadata>, Error> {
        let id = mailbox.require_id()?;
        range.validate()?;
        let _lock = self.lock(id)?;

        let doomed = self
            .load_range(id, range)?
            .into_iter()
            .filter(|&(_, ref r)| r.flags.contains(&Flag::Deleted))
            .map(|(uid, r)| (uid, r.metadata(uid)))
            .collect::<BTreeMap<_, _>>();

        let mut expunged = Vec::with_capacity(doomed.len());
        for &uid in doomed.keys() {
            let result = fs::remove_file(self.layout().message_meta(id, uid))
                .ignore_not_found()
                .and_then(|_| {
                    fs::remove_file(self.layout().message_data(id, uid))
                        .ignore_not_found()
                });
            if let Err(e) = result {
                error!(
                    "Expunge in {} failed at UID {} after removing {:?}: {}",
                    mailbox.name, uid, expunged, e
                );
                if !expunged.is_empty() {
                    if let Err(e2) = self.store.next_modseq(mailbox) {
                        warn!(
                            "Failed to bump modseq of {} after partial \
                             expunge: {}",
                            mailbox.name, e2
                        );
                    }
                }
                return Err(e.into());
            }
            expunged.push(uid);
        }

        if !doomed.is_empty() {
            self.store.next_modseq(mailbox)?;
        }

        Ok(doomed)
    }

    fn last_uid(&mut self, mailbox: &Mailbox) -> Result<Option<Uid>, Error> {
        UidProvider::last_uid(&self.store, mailbox)
    }

    fn highest_modseq(
        &mut self,
        mailbox: &Mailbox,
    ) -> Result<Option<Modseq>, Error> {
        ModseqProvider::highest_modseq(&self.store, mailbox)
    }
}
