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

use std::collections::{BTreeSet, HashMap};
use std::sync::{MutexGuard, PoisonError};

use super::MemoryStore;
use crate::name::model::{MailboxName, Owner};
use crate::store::{RequestScoped, SubscriptionMapper};
use crate::support::error::Error;

pub struct MemorySubscriptionMapper {
    store: MemoryStore,
}

impl MemorySubscriptionMapper {
    pub(super) fn new(store: MemoryStore) -> Self {
        MemorySubscriptionMapper { store }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, BTreeSet<MailboxName>>> {
        self.store
            .shared
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl RequestScoped for MemorySubscriptionMapper {
    fn begin_request(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn end_request(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

impl SubscriptionMapper for MemorySubscriptionMapper {
    fn subscribe(
        &mut self,
        owner: &Owner,
        name: &MailboxName,
    ) -> Result<(), Error> {
        self.table()
            .entry(owner.key())
            .or_insert_with(BTreeSet::new)
            .insert(name.clone());
        Ok(())
    }

    fn unsubscribe(
        &mut self,
        owner: &Owner,
        name: &MailboxName,
    ) -> Result<(), Error> {
        let mut table = self.table();
        let key = owner.key();
        let now_empty = table.get_mut(&key).map_or(false, |subs| {
            subs.remove(name);
            subs.is_empty()
        });
        if now_empty {
            table.remove(&key);
        }
        Ok(())
    }

    fn subscriptions(
        &mut self,
        owner: &Owner,
    ) -> Result<BTreeSet<MailboxName>, Error> {
        Ok(self.table().get(&owner.key()).cloned().unwrap_or_default())
    }
}
