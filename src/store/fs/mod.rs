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

//! The filesystem backend.
//!
//! Each mailbox is a directory named by its id. Mailboxes are found by name
//! through a directory of symlinks whose names are the encoded mailbox
//! names; see `layout` for the full picture.
//!
//! Identifier allocation is serialised by `flock`ed counter files, one for
//! the store as a whole (mailbox ids and UID validity) and one per mailbox
//! (UIDs and modseqs). Read-modify-write of message metadata within one
//! mailbox is serialised by that mailbox's `messages.lock`. When both are
//! needed, `messages.lock` is always taken first.
//!
//! Every write is complete and durable when the call that made it returns;
//! there is nothing to commit or roll back.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use serde::{Deserialize, Serialize};

use crate::name::codec::{NameCodec, SearchCodec};
use crate::name::model::{MailboxName, Owner};
use crate::name::resolver::NameResolver;
use crate::store::acl::MailboxAcl;
use crate::store::model::*;
use crate::store::{ModseqProvider, StoreBackend, UidProvider};
use crate::support::counter_file::CounterGuard;
use crate::support::error::Error;
use crate::support::file_ops::ErrorTransforms;
use crate::support::store_config::StoreConfig;

pub mod layout;
mod mailboxes;
mod messages;
mod subscriptions;

pub use self::layout::Layout;
pub use self::mailboxes::FsMailboxMapper;
pub use self::messages::FsMessageMapper;
pub use self::subscriptions::FsSubscriptionMapper;

use self::layout::{HIGHEST_MODSEQ, LAST_UID};

#[derive(Clone, Debug)]
pub struct FsStore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    layout: Layout,
    codec: NameCodec,
    search: SearchCodec,
    resolver: NameResolver,
}

/// The persisted form of a mailbox, without its counters.
///
/// Plain values come before tables so that this can be written as TOML.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct MailboxRecord {
    uid_validity: u32,
    is_owner_group: bool,
    name: MailboxName,
    /// Set while inferiors of this former name are still to be moved below
    /// `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    renaming_from: Option<MailboxName>,
    owner: Owner,
    acl: MailboxAcl,
}

impl MailboxRecord {
    fn from_mailbox(mailbox: &Mailbox) -> Self {
        MailboxRecord {
            uid_validity: mailbox.uid_validity,
            is_owner_group: mailbox.is_owner_group,
            name: mailbox.name.clone(),
            renaming_from: None,
            owner: mailbox.owner.clone(),
            acl: mailbox.acl.clone(),
        }
    }

    fn into_mailbox(self, id: MailboxId) -> Mailbox {
        Mailbox {
            id: Some(id),
            name: self.name,
            owner: self.owner,
            is_owner_group: self.is_owner_group,
            uid_validity: self.uid_validity,
            last_uid: None,
            highest_modseq: None,
            acl: self.acl,
        }
    }
}

impl FsStore {
    /// Create the skeleton of a store at `root` if it does not exist, then
    /// open it.
    pub fn init(
        root: impl Into<PathBuf>,
        config: &StoreConfig,
    ) -> Result<Self, Error> {
        let layout = Layout::new(root);
        layout.init()?;
        info!("Initialised store at {}", layout.root().display());
        FsStore::with_layout(layout, config)
    }

    /// Open an existing store at `root`.
    pub fn open(
        root: impl Into<PathBuf>,
        config: &StoreConfig,
    ) -> Result<Self, Error> {
        let layout = Layout::new(root);
        layout.check()?;
        FsStore::with_layout(layout, config)
    }

    fn with_layout(
        layout: Layout,
        config: &StoreConfig,
    ) -> Result<Self, Error> {
        config.validate()?;
        let codec = NameCodec::from_config(&config.names)?;
        Ok(FsStore {
            inner: Arc::new(Inner {
                layout,
                codec,
                search: SearchCodec::new(codec),
                resolver: NameResolver::new(config.namespace.clone()),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        self.inner.layout.root()
    }

    pub(crate) fn layout(&self) -> &Layout {
        &self.inner.layout
    }

    pub(crate) fn codec(&self) -> &NameCodec {
        &self.inner.codec
    }

    pub(crate) fn search(&self) -> &SearchCodec {
        &self.inner.search
    }

    pub(crate) fn read_record(
        &self,
        id: MailboxId,
    ) -> Result<MailboxRecord, Error> {
        let data = fs::read(self.layout().record(id))
            .on_not_found(Error::NxMailbox)?;
        let record: MailboxRecord = toml::from_slice(&data)?;
        Ok(record)
    }

    pub(crate) fn write_record(
        &self,
        id: MailboxId,
        record: &MailboxRecord,
    ) -> Result<(), Error> {
        let data = toml::to_string(record)?;
        self.layout()
            .staging()
            .spit(self.layout().record(id), true, 0o600, data.as_bytes())
            .on_not_found(Error::NxMailbox)
    }

    /// Lock the counter file of mailbox `id`.
    ///
    /// Fails with `NxMailbox` if the mailbox is gone.
    pub(crate) fn lock_counters(
        &self,
        id: MailboxId,
    ) -> Result<CounterGuard, Error> {
        CounterGuard::lock_existing(self.layout().mailbox_counters(id))
            .on_not_found(Error::NxMailbox)
    }

    /// Fail with `NxMailbox` unless mailbox `id` exists.
    pub(crate) fn require_live(&self, id: MailboxId) -> Result<(), Error> {
        fs::metadata(self.layout().mailbox(id))
            .map(|_| ())
            .on_not_found(Error::NxMailbox)
    }

    /// Fill in the counters of `mailbox` from disk.
    pub(crate) fn load_counters(
        &self,
        mailbox: &mut Mailbox,
    ) -> Result<(), Error> {
        let slots = self.lock_counters(mailbox.require_id()?)?.read()?;
        mailbox.last_uid = uid_slot(slots[LAST_UID])?;
        mailbox.highest_modseq = Modseq::of(slots[HIGHEST_MODSEQ]);
        Ok(())
    }

    /// Resolve a name link to the mailbox it indexes.
    ///
    /// Returns `None` if the link is absent or stale.
    pub(crate) fn resolve_link(
        &self,
        name: &MailboxName,
    ) -> Result<Option<(MailboxId, MailboxRecord)>, Error> {
        let link = self.layout().name_link(&self.codec().encode(name));
        let target = match fs::read_link(&link) {
            Ok(target) => target,
            Err(e) if io::ErrorKind::NotFound == e.kind() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let id = match layout::parse_mailbox_id(&target) {
            Some(id) => id,
            None => {
                return Err(Error::corrupt(format!(
                    "name link {} has unexpected target {}",
                    link.display(),
                    target.display()
                )))
            }
        };

        match self.read_record(id) {
            Ok(record) if record.name == *name => Ok(Some((id, record))),
            Ok(_) | Err(Error::NxMailbox) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn uid_slot(raw: u64) -> Result<Option<Uid>, Error> {
    if raw > u64::from(u32::MAX) {
        Err(Error::corrupt(format!("UID counter {} out of range", raw)))
    } else {
        Ok(Uid::of(raw as u32))
    }
}

impl UidProvider for FsStore {
    fn next_uid(&self, mailbox: &Mailbox) -> Result<Uid, Error> {
        let mut counters = self.lock_counters(mailbox.require_id()?)?;
        let mut slots = counters.read()?;
        let uid = Uid::after(uid_slot(slots[LAST_UID])?)?;
        slots[LAST_UID] = u64::from(uid.0.get());
        counters.write(&slots)?;
        Ok(uid)
    }

    fn last_uid(&self, mailbox: &Mailbox) -> Result<Option<Uid>, Error> {
        let slots = self.lock_counters(mailbox.require_id()?)?.read()?;
        uid_slot(slots[LAST_UID])
    }
}

impl ModseqProvider for FsStore {
    fn next_modseq(&self, mailbox: &Mailbox) -> Result<Modseq, Error> {
        let mut counters = self.lock_counters(mailbox.require_id()?)?;
        let mut slots = counters.read()?;
        let modseq = Modseq::after(Modseq::of(slots[HIGHEST_MODSEQ]))?;
        slots[HIGHEST_MODSEQ] = modseq.raw();
        counters.write(&slots)?;
        Ok(modseq)
    }

    fn highest_modseq(
        &self,
        mailbox: &Mailbox,
    ) -> Result<Option<Modseq>, Error> {
        let slots = self.lock_counters(mailbox.require_id()?)?.read()?;
        Ok(Modseq::of(slots[HIGHEST_MODSEQ]))
    }
}

impl StoreBackend for FsStore {
    type Mailboxes = FsMailboxMapper;
    type Messages = FsMessageMapper;
    type Subscriptions = FsSubscriptionMapper;

    fn mailbox_mapper(&self) -> FsMailboxMapper {
        FsMailboxMapper::new(self.clone())
    }

    fn message_mapper(&self) -> FsMessageMapper {
        FsMessageMapper::new(self.clone())
    }

    fn subscription_mapper(&self) -> FsSubscriptionMapper {
        FsSubscriptionMapper::new(self.clone())
    }

    fn resolver(&self) -> &NameResolver {
        &self.inner.resolver
    }
}

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn open_requires_init() {
        let root = TempDir::new().unwrap();
        let config = StoreConfig::default();
        assert_matches!(
            Err(Error::Io(..)),
            FsStore::open(root.path().join("store"), &config)
        );
        FsStore::init(root.path().join("store"), &config).unwrap();
        FsStore::open(root.path().join("store"), &config).unwrap();
    }

    #[test]
    fn record_is_valid_toml() {
        let mut mailbox = Mailbox::new(
            MailboxName::qualified(vec!["#user", "alice", "INBOX"]).unwrap(),
            Owner::virtual_user("alice", "example.com"),
        );
        mailbox.uid_validity = 42;
        let record = MailboxRecord::from_mailbox(&mailbox);
        let text = toml::to_string(&record).unwrap();
        let back: MailboxRecord = toml::from_str(&text).unwrap();
        let back = back.into_mailbox(MailboxId(1));
        assert_eq!(mailbox.name, back.name);
        assert_eq!(mailbox.owner, back.owner);
        assert_eq!(mailbox.acl, back.acl);
        assert_eq!(42, back.uid_validity);
    }
}
