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

//! The in-memory reference backend.
//!
//! All state lives in one `Arc` shared by every mapper the store hands out.
//! The mailbox table is behind a `RwLock`; each mailbox additionally has its
//! own counters and message table, so operations on different mailboxes
//! never wait for each other beyond the brief table lookup.
//!
//! Nothing is persisted. "Durable" here means visible to every other mapper
//! of the same store as soon as the call returns.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard,
    RwLockWriteGuard,
};

use crate::name::model::MailboxName;
use crate::name::resolver::NameResolver;
use crate::store::model::*;
use crate::store::{ModseqProvider, StoreBackend, UidProvider};
use crate::support::error::Error;

mod mailboxes;
mod messages;
mod subscriptions;

pub use self::mailboxes::MemoryMailboxMapper;
pub use self::messages::MemoryMessageMapper;
pub use self::subscriptions::MemorySubscriptionMapper;

#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    resolver: NameResolver,
}

#[derive(Default)]
struct Shared {
    table: RwLock<MailboxTable>,
    next_id: AtomicU64,
    subscriptions: Mutex<HashMap<String, BTreeSet<MailboxName>>>,
}

#[derive(Default)]
struct MailboxTable {
    records: HashMap<MailboxId, MailboxRecord>,
    names: BTreeMap<MailboxName, MailboxId>,
    last_uid_validity: u32,
}

struct MailboxRecord {
    /// The counter fields of this copy are never read; `state` is
    /// authoritative for them.
    mailbox: Mailbox,
    state: Arc<MailboxState>,
}

#[derive(Default)]
struct MailboxState {
    /// 0 until the first UID is allocated.
    last_uid: AtomicU32,
    /// 0 until the first modseq is allocated.
    highest_modseq: AtomicU64,
    messages: Mutex<BTreeMap<Uid, Message>>,
}

impl MailboxState {
    fn last_uid(&self) -> Option<Uid> {
        Uid::of(self.last_uid.load(Ordering::SeqCst))
    }

    fn highest_modseq(&self) -> Option<Modseq> {
        Modseq::of(self.highest_modseq.load(Ordering::SeqCst))
    }

    fn next_uid(&self) -> Result<Uid, Error> {
        let mut current = self.last_uid.load(Ordering::SeqCst);
        loop {
            let next = Uid::after(Uid::of(current))?;
            match self.last_uid.compare_exchange_weak(
                current,
                next.0.get(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(next),
                Err(actual) => current = actual,
            }
        }
    }

    fn next_modseq(&self) -> Result<Modseq, Error> {
        let mut current = self.highest_modseq.load(Ordering::SeqCst);
        loop {
            let next = Modseq::after(Modseq::of(current))?;
            match self.highest_modseq.compare_exchange_weak(
                current,
                next.raw(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(next),
                Err(actual) => current = actual,
            }
        }
    }

    fn messages(&self) -> MutexGuard<'_, BTreeMap<Uid, Message>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MailboxRecord {
    fn snapshot(&self) -> Mailbox {
        let mut mailbox = self.mailbox.clone();
        mailbox.last_uid = self.state.last_uid();
        mailbox.highest_modseq = self.state.highest_modseq();
        mailbox
    }
}

impl MemoryStore {
    pub fn new(resolver: NameResolver) -> Self {
        MemoryStore {
            shared: Arc::new(Shared::default()),
            resolver,
        }
    }

    fn read_table(&self) -> RwLockReadGuard<'_, MailboxTable> {
        self.shared
            .table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, MailboxTable> {
        self.shared
            .table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn state_by_id(&self, id: MailboxId) -> Result<Arc<MailboxState>, Error> {
        self.read_table()
            .records
            .get(&id)
            .map(|r| Arc::clone(&r.state))
            .ok_or(Error::NxMailbox)
    }

    fn state(&self, mailbox: &Mailbox) -> Result<Arc<MailboxState>, Error> {
        self.state_by_id(mailbox.require_id()?)
    }
}

impl UidProvider for MemoryStore {
    fn next_uid(&self, mailbox: &Mailbox) -> Result<Uid, Error> {
        self.state(mailbox)?.next_uid()
    }

    fn last_uid(&self, mailbox: &Mailbox) -> Result<Option<Uid>, Error> {
        Ok(self.state(mailbox)?.last_uid())
    }
}

impl ModseqProvider for MemoryStore {
    fn next_modseq(&self, mailbox: &Mailbox) -> Result<Modseq, Error> {
        self.state(mailbox)?.next_modseq()
    }

    fn highest_modseq(
        &self,
        mailbox: &Mailbox,
    ) -> Result<Option<Modseq>, Error> {
        Ok(self.state(mailbox)?.highest_modseq())
    }
}

impl StoreBackend for MemoryStore {
    type Mailboxes = MemoryMailboxMapper;
    type Messages = MemoryMessageMapper;
    type Subscriptions = MemorySubscriptionMapper;

    fn mailbox_mapper(&self) -> MemoryMailboxMapper {
        MemoryMailboxMapper::new(self.clone())
    }

    fn message_mapper(&self) -> MemoryMessageMapper {
        MemoryMessageMapper::new(self.clone())
    }

    fn subscription_mapper(&self) -> MemorySubscriptionMapper {
        MemorySubscriptionMapper::new(self.clone())
    }

    fn resolver(&self) -> &NameResolver {
        &self.resolver
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn counters_refuse_to_wrap() {
        let state = MailboxState {
            last_uid: AtomicU32::new(u32::MAX - 1),
            ..MailboxState::default()
        };
        assert_eq!(Uid::MAX, state.next_uid().unwrap());
        assert_matches!(Err(Error::MailboxFull), state.next_uid());
        assert_eq!(Some(Uid::MAX), state.last_uid());

        let state = MailboxState {
            highest_modseq: AtomicU64::new(u64::MAX),
            ..MailboxState::default()
        };
        assert_matches!(Err(Error::MailboxFull), state.next_modseq());
    }

    #[test]
    fn unsaved_mailbox_has_no_counters() {
        let store = MemoryStore::default();
        let mailbox = Mailbox::new(
            MailboxName::qualified(vec!["#user", "alice", "INBOX"]).unwrap(),
            crate::name::model::Owner::user("alice"),
        );
        assert_matches!(Err(Error::NxMailbox), store.next_uid(&mailbox));
        assert_matches!(Err(Error::NxMailbox), store.highest_modseq(&mailbox));
    }
}
