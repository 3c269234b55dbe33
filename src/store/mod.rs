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

//! The contract between the protocol layers and the storage backends.
//!
//! Mapper instances are cheap and belong to exactly one request context;
//! they are never shared between threads. Concurrent requests use separate
//! mappers obtained from the same `StoreBackend`, which serialise only on
//! the state of the individual mailboxes they touch.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::{Deref, DerefMut};

use log::warn;

use crate::name::model::{MailboxName, Owner};
use crate::name::resolver::NameResolver;
use crate::query::MailboxQuery;
use crate::support::error::Error;

pub mod acl;
pub mod arena;
pub mod fs;
pub mod memory;
pub mod model;

#[cfg(test)]
mod contract_tests;

use self::model::*;

/// Something with request-local state that must be bounded explicitly.
pub trait RequestScoped {
    fn begin_request(&mut self) -> Result<(), Error>;
    /// Release everything held for the current request.
    ///
    /// This must release its resources even if it returns an error.
    fn end_request(&mut self) -> Result<(), Error>;
}

/// Holds a mapper inside a request, ending the request on drop.
///
/// A failure to end the request is logged rather than propagated, so it can
/// never mask whatever error the request itself is returning.
pub struct RequestScope<'a, M: RequestScoped + ?Sized> {
    mapper: &'a mut M,
}

impl<'a, M: RequestScoped + ?Sized> RequestScope<'a, M> {
    pub fn new(mapper: &'a mut M) -> Result<Self, Error> {
        mapper.begin_request()?;
        Ok(RequestScope { mapper })
    }
}

impl<M: RequestScoped + ?Sized> Deref for RequestScope<'_, M> {
    type Target = M;

    fn deref(&self) -> &M {
        self.mapper
    }
}

impl<M: RequestScoped + ?Sized> DerefMut for RequestScope<'_, M> {
    fn deref_mut(&mut self) -> &mut M {
        self.mapper
    }
}

impl<M: RequestScoped + ?Sized> Drop for RequestScope<'_, M> {
    fn drop(&mut self) {
        if let Err(e) = self.mapper.end_request() {
            warn!("Failed to end request cleanly: {}", e);
        }
    }
}

pub trait MailboxMapper: RequestScoped {
    /// Fails with `NxMailbox` if there is no mailbox named `name`.
    fn find_mailbox_by_path(
        &mut self,
        name: &MailboxName,
    ) -> Result<Mailbox, Error>;

    /// Fails with `NxMailbox` if `id` does not refer to a live mailbox.
    fn find_mailbox_by_id(&mut self, id: MailboxId) -> Result<Mailbox, Error>;

    /// Return every mailbox matching `query`, sorted by name.
    fn find_mailbox_with_path_like(
        &mut self,
        query: &MailboxQuery,
    ) -> Result<Vec<Mailbox>, Error>;

    /// Whether any mailbox exists below `mailbox`.
    fn has_children(&mut self, mailbox: &Mailbox) -> Result<bool, Error> {
        let query = MailboxQuery::children_of(mailbox.name.clone());
        Ok(!self.find_mailbox_with_path_like(&query)?.is_empty())
    }

    /// Create or update `mailbox`.
    ///
    /// If `mailbox.id` is `None`, a new mailbox is created and `mailbox` is
    /// updated with its id, UID validity and (if empty) default ACL. The
    /// name must not already be taken.
    ///
    /// Otherwise, the mailbox with that id is updated. If the name changed,
    /// the mailbox and all its inferiors are renamed; none of the new names
    /// may be taken.
    ///
    /// The UID validity and counters are owned by the backend; whatever the
    /// caller has in those fields is ignored and overwritten.
    fn save(&mut self, mailbox: &mut Mailbox) -> Result<MailboxId, Error>;

    /// Delete `mailbox` and all its messages. Inferiors are not affected.
    fn delete(&mut self, mailbox: &Mailbox) -> Result<(), Error>;

    /// Return every mailbox in the store, sorted by name.
    fn list(&mut self) -> Result<Vec<Mailbox>, Error>;
}

/// A `MailboxMapper` with unit-of-work demarcation.
///
/// Neither shipped backend has real transactions. What `begin`, `commit` and
/// `rollback` actually guarantee is documented on each implementation.
pub trait TransactionalMapper: MailboxMapper {
    fn begin(&mut self) -> Result<(), Error>;
    fn commit(&mut self) -> Result<(), Error>;
    fn rollback(&mut self) -> Result<(), Error>;

    /// Run `f` inside `begin`/`commit`, rolling back if it fails.
    ///
    /// A failed rollback is logged; the error from `f` is what is returned.
    fn execute<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error>
    where
        Self: Sized,
    {
        self.begin()?;
        match f(self) {
            Ok(v) => {
                self.commit()?;
                Ok(v)
            }
            Err(e) => {
                if let Err(rollback_err) = self.rollback() {
                    warn!("Rollback failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }
}

/// Allocates UIDs per mailbox.
///
/// `next_uid` is linearisable per mailbox: concurrent callers never receive
/// the same value, and the value is durable before it is returned.
pub trait UidProvider {
    fn next_uid(&self, mailbox: &Mailbox) -> Result<Uid, Error>;
    fn last_uid(&self, mailbox: &Mailbox) -> Result<Option<Uid>, Error>;
}

/// Allocates modification sequence numbers per mailbox, with the same
/// guarantees as `UidProvider`.
pub trait ModseqProvider {
    fn next_modseq(&self, mailbox: &Mailbox) -> Result<Modseq, Error>;
    fn highest_modseq(
        &self,
        mailbox: &Mailbox,
    ) -> Result<Option<Modseq>, Error>;
}

pub trait MessageMapper: RequestScoped {
    /// Return the messages in `range`, ascending by UID.
    ///
    /// A `limit` of 0 is unbounded.
    fn find_in_mailbox(
        &mut self,
        mailbox: &Mailbox,
        range: MessageRange,
        fetch: FetchLevel,
        limit: usize,
    ) -> Result<Vec<Message>, Error>;

    fn count_messages_in_mailbox(
        &mut self,
        mailbox: &Mailbox,
    ) -> Result<u64, Error>;

    fn count_unseen_messages_in_mailbox(
        &mut self,
        mailbox: &Mailbox,
    ) -> Result<u64, Error>;

    /// Return the UIDs of all messages flagged `\Recent`, ascending.
    fn find_recent_message_uids(
        &mut self,
        mailbox: &Mailbox,
    ) -> Result<Vec<Uid>, Error>;

    fn find_first_unseen_message_uid(
        &mut self,
        mailbox: &Mailbox,
    ) -> Result<Option<Uid>, Error>;

    /// Persist `message` in `mailbox`.
    ///
    /// A UID and modseq are allocated if `message` does not already have
    /// them, and `message` is updated in place. A preassigned UID must have
    /// been allocated in this mailbox already; the message replaces any
    /// existing message with that UID.
    fn save(
        &mut self,
        mailbox: &Mailbox,
        message: &mut Message,
    ) -> Result<MessageMetadata, Error>;

    /// Copy `message` into `mailbox` under a fresh UID and modseq, flagged
    /// `\Recent`.
    ///
    /// If `message` was fetched without content, the content is loaded from
    /// the message's own mailbox.
    fn copy(
        &mut self,
        mailbox: &Mailbox,
        message: &Message,
    ) -> Result<MessageMetadata, Error>;

    /// Remove a single message without touching the modseq.
    fn delete(&mut self, mailbox: &Mailbox, message: &Message)
        -> Result<(), Error>;

    /// Apply `update` to every message in `range`.
    ///
    /// Each message whose flags actually change gets a fresh modseq and is
    /// reported in the result.
    fn update_flags(
        &mut self,
        mailbox: &Mailbox,
        range: MessageRange,
        update: &FlagsUpdate,
    ) -> Result<Vec<UpdatedFlags>, Error>;

    /// Remove every message in `range` flagged `\Deleted`, returning their
    /// metadata from just before removal.
    fn expunge_marked_for_deletion(
        &mut self,
        mailbox: &Mailbox,
        range: MessageRange,
    ) -> Result<BTreeMap<Uid, MessageMetadata>, Error>;

    fn last_uid(&mut self, mailbox: &Mailbox) -> Result<Option<Uid>, Error>;

    fn highest_modseq(
        &mut self,
        mailbox: &Mailbox,
    ) -> Result<Option<Modseq>, Error>;
}

/// Per-owner mailbox subscriptions, with set semantics.
pub trait SubscriptionMapper: RequestScoped {
    fn subscribe(
        &mut self,
        owner: &Owner,
        name: &MailboxName,
    ) -> Result<(), Error>;

    fn unsubscribe(
        &mut self,
        owner: &Owner,
        name: &MailboxName,
    ) -> Result<(), Error>;

    fn subscriptions(
        &mut self,
        owner: &Owner,
    ) -> Result<BTreeSet<MailboxName>, Error>;
}

/// A storage backend, which hands out mapper instances for individual
/// requests.
pub trait StoreBackend: UidProvider + ModseqProvider + Send + Sync {
    type Mailboxes: TransactionalMapper;
    type Messages: MessageMapper;
    type Subscriptions: SubscriptionMapper;

    fn mailbox_mapper(&self) -> Self::Mailboxes;
    fn message_mapper(&self) -> Self::Messages;
    fn subscription_mapper(&self) -> Self::Subscriptions;
    fn resolver(&self) -> &NameResolver;
}

/// Compute the UID validity for a new mailbox, given the last value issued
/// by the store.
///
/// This is the time in seconds since 2020-01-01, which gives until 2156
/// before wrapping, but always strictly greater than `prev` so that
/// mailboxes created in quick succession still get distinct values. It is
/// never zero.
pub(crate) fn next_uid_validity(prev: u32) -> u32 {
    let now = chrono::Utc::now().timestamp() as u64;
    let since_epoch = now.wrapping_sub(1577836800) as u32;
    since_epoch.max(prev.wrapping_add(1)).max(1)
}

#[cfg(test)]
mod test {
    use std::cell::Cell;

    use super::*;

    struct Tracker<'a> {
        active: &'a Cell<bool>,
        fail_end: bool,
    }

    impl RequestScoped for Tracker<'_> {
        fn begin_request(&mut self) -> Result<(), Error> {
            self.active.set(true);
            Ok(())
        }

        fn end_request(&mut self) -> Result<(), Error> {
            self.active.set(false);
            if self.fail_end {
                Err(Error::invalid("cleanup failed"))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn request_scope_always_ends() {
        crate::init_test_log();

        let active = Cell::new(false);
        let mut tracker = Tracker {
            active: &active,
            fail_end: false,
        };

        let result: Result<(), Error> = (|| {
            let _scope = RequestScope::new(&mut tracker)?;
            assert!(active.get());
            Err(Error::NxMailbox)
        })();
        assert_matches!(Err(Error::NxMailbox), result);
        assert!(!active.get());

        // A failing end_request must not replace the original error
        let mut tracker = Tracker {
            active: &active,
            fail_end: true,
        };
        let result: Result<(), Error> = (|| {
            let _scope = RequestScope::new(&mut tracker)?;
            Err(Error::MailboxExists)
        })();
        assert_matches!(Err(Error::MailboxExists), result);
        assert!(!active.get());
    }

    #[test]
    fn uid_validity_strictly_increases() {
        let a = next_uid_validity(0);
        assert!(a > 0);
        let b = next_uid_validity(a);
        assert!(b > a);
        assert_eq!(u32::MAX, next_uid_validity(u32::MAX - 1));
        // Wrapping must never produce zero
        assert!(next_uid_validity(u32::MAX) > 0);
    }
}
