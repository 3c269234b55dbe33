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

use std::collections::BTreeSet;
use std::fs;
use std::io;

use serde::{Deserialize, Serialize};

use super::FsStore;
use crate::name::model::{MailboxName, Owner};
use crate::store::{RequestScoped, SubscriptionMapper};
use crate::support::error::Error;
use crate::support::file_ops::{FileLock, IgnoreKinds};

#[derive(Debug, Default, Serialize, Deserialize)]
struct SubscriptionFile {
    #[serde(default)]
    mailboxes: BTreeSet<MailboxName>,
}

/// Subscriptions stored as one TOML file per owner.
///
/// Subscriptions are independent of whether the mailboxes exist.
pub struct FsSubscriptionMapper {
    store: FsStore,
}

impl FsSubscriptionMapper {
    pub(super) fn new(store: FsStore) -> Self {
        FsSubscriptionMapper { store }
    }

    fn file_key(&self, owner: &Owner) -> String {
        self.store.codec().encode_segment(&owner.key())
    }

    fn read(&self, key: &str) -> Result<SubscriptionFile, Error> {
        match fs::read(self.store.layout().subscription_file(key)) {
            Ok(data) => Ok(toml::from_slice(&data)?),
            Err(e) if io::ErrorKind::NotFound == e.kind() => {
                Ok(SubscriptionFile::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn modify(
        &self,
        owner: &Owner,
        f: impl FnOnce(&mut BTreeSet<MailboxName>) -> bool,
    ) -> Result<(), Error> {
        let key = self.file_key(owner);
        let layout = self.store.layout();
        let _lock = FileLock::acquire(layout.subscription_lock(&key))?;

        let mut file = self.read(&key)?;
        if !f(&mut file.mailboxes) {
            return Ok(());
        }

        if file.mailboxes.is_empty() {
            fs::remove_file(layout.subscription_file(&key))
                .ignore_not_found()?;
        } else {
            let data = toml::to_string(&file)?;
            layout.staging().spit(
                layout.subscription_file(&key),
                true,
                0o600,
                data.as_bytes(),
            )?;
        }
        Ok(())
    }
}

impl RequestScoped for FsSubscriptionMapper {
    fn begin_request(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn end_request(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

impl SubscriptionMapper for FsSubscriptionMapper {
    fn subscribe(
        &mut self,
        owner: &Owner,
        name: &MailboxName,
    ) -> Result<(), Error> {
        self.modify(owner, |subs| subs.insert(name.clone()))
    }

    fn unsubscribe(
        &mut self,
        owner: &Owner,
        name: &MailboxName,
    ) -> Result<(), Error> {
        self.modify(owner, |subs| subs.remove(name))
    }

    fn subscriptions(
        &mut self,
        owner: &Owner,
    ) -> Result<BTreeSet<MailboxName>, Error> {
        Ok(self.read(&self.file_key(owner))?.mailboxes)
    }
}
