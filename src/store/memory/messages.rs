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

use std::collections::BTreeMap;
use std::sync::Arc;

use super::MemoryStore;
use crate::store::model::*;
use crate::store::{MessageMapper, RequestScoped};
use crate::support::error::Error;

pub struct MemoryMessageMapper {
    store: MemoryStore,
}

impl MemoryMessageMapper {
    pub(super) fn new(store: MemoryStore) -> Self {
        MemoryMessageMapper { store }
    }

    fn content_of(&self, message: &Message) -> Result<Arc<[u8]>, Error> {
        if let Some(ref content) = message.content {
            return Ok(Arc::clone(content));
        }

        let (source, uid) =
            message.mailbox_id.zip(message.uid).ok_or_else(|| {
                Error::invalid("message has neither content nor origin")
            })?;
        let state = self.store.state_by_id(source)?;
        let messages = state.messages();
        messages
            .get(&uid)
            .and_then(|m| m.content.clone())
            .ok_or(Error::NxMessage)
    }
}

impl RequestScoped for MemoryMessageMapper {
    fn begin_request(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn end_request(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

impl MessageMapper for MemoryMessageMapper {
    fn find_in_mailbox(
        &mut self,
        mailbox: &Mailbox,
        range: MessageRange,
        fetch: FetchLevel,
        limit: usize,
    ) -> Result<Vec<Message>, Error> {
        range.validate()?;
        let state = self.store.state(mailbox)?;
        let messages = state.messages();
        let (lo, hi) = range.bounds();
        let limit = if 0 == limit { usize::MAX } else { limit };

        Ok(messages
            .range(lo..=hi)
            .map(|(_, m)| m.project(fetch))
            .take(limit)
            .collect())
    }

    fn count_messages_in_mailbox(
        &mut self,
        mailbox: &Mailbox,
    ) -> Result<u64, Error> {
        Ok(self.store.state(mailbox)?.messages().len() as u64)
    }

    fn count_unseen_messages_in_mailbox(
        &mut self,
        mailbox: &Mailbox,
    ) -> Result<u64, Error> {
        Ok(self
            .store
            .state(mailbox)?
            .messages()
            .values()
            .filter(|m| !m.flags.contains(&Flag::Seen))
            .count() as u64)
    }

    fn find_recent_message_uids(
        &mut self,
        mailbox: &Mailbox,
    ) -> Result<Vec<Uid>, Error> {
        Ok(self
            .store
            .state(mailbox)?
            .messages()
            .iter()
            .filter(|&(_, m)| m.flags.contains(&Flag::Recent))
            .map(|(&uid, _)| uid)
            .collect())
    }

    fn find_first_unseen_message_uid(
        &mut self,
        mailbox: &Mailbox,
    ) -> Result<Option<Uid>, Error> {
        Ok(self
            .store
            .state(mailbox)?
            .messages()
            .iter()
            .find(|&(_, m)| !m.flags.contains(&Flag::Seen))
            .map(|(&uid, _)| uid))
    }

    fn save(
        &mut self,
        mailbox: &Mailbox,
        message: &mut Message,
    ) -> Result<MessageMetadata, Error> {
        let id = mailbox.require_id()?;
        let state = self.store.state(mailbox)?;

        match message.uid {
            Some(uid) if state.last_uid().map_or(true, |last| uid > last) => {
                return Err(Error::invalid(format!(
                    "UID {} was never allocated in {}",
                    uid, mailbox.name
                )));
            }
            Some(_) => (),
            None => message.uid = Some(state.next_uid()?),
        }
        if message.modseq.is_none() {
            message.modseq = Some(state.next_modseq()?);
        }
        message.mailbox_id = Some(id);

        let metadata = message.metadata()?;
        state.messages().insert(metadata.uid, message.clone());
        Ok(metadata)
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
        let uid = message.uid.ok_or(Error::NxMessage)?;
        self.store
            .state(mailbox)?
            .messages()
            .remove(&uid)
            .map(|_| ())
            .ok_or(Error::NxMessage)
    }

    fn update_flags(
        &mut self,
        mailbox: &Mailbox,
        range: MessageRange,
        update: &FlagsUpdate,
    ) -> Result<Vec<UpdatedFlags>, Error> {
        range.validate()?;
        let state = self.store.state(mailbox)?;
        let mut messages = state.messages();
        let (lo, hi) = range.bounds();

        let mut updated = Vec::new();
        for (&uid, message) in messages.range_mut(lo..=hi) {
            let new_flags = update.apply(&message.flags);
            if new_flags == message.flags {
                continue;
            }

            let modseq = state.next_modseq()?;
            let old_flags = std::mem::replace(&mut message.flags, new_flags);
            message.modseq = Some(modseq);
            updated.push(UpdatedFlags {
                uid,
                modseq,
                old_flags,
                new_flags: message.flags.clone(),
            });
        }

        Ok(updated)
    }

    fn expunge_marked_for_deletion(
        &mut self,
        mailbox: &Mailbox,
        range: MessageRange,
    ) -> Result<BTreeMap<Uid, MessageMetadata>, Error> {
        range.validate()?;
        let state = self.store.state(mailbox)?;
        let mut messages = state.messages();
        let (lo, hi) = range.bounds();

        let doomed = messages
            .range(lo..=hi)
            .filter(|&(_, m)| m.flags.contains(&Flag::Deleted))
            .map(|(&uid, m)| Ok((uid, m.metadata()?)))
            .collect::<Result<BTreeMap<_, _>, Error>>()?;

        if !doomed.is_empty() {
            for uid in doomed.keys() {
                messages.remove(uid);
            }
            state.next_modseq()?;
        }

        Ok(doomed)
    }

    fn last_uid(&mut self, mailbox: &Mailbox) -> Result<Option<Uid>, Error> {
        Ok(self.store.state(mailbox)?.last_uid())
    }

    fn highest_modseq(
        &mut self,
        mailbox: &Mailbox,
    ) -> Result<Option<Modseq>, Error> {
        Ok(self.store.state(mailbox)?.highest_modseq())
    }
}
