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

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::info;

use super::{MailboxRecord, MailboxState, MailboxTable, MemoryStore};
use crate::name::model::MailboxName;
use crate::query::MailboxQuery;
use crate::store::acl::MailboxAcl;
use crate::store::model::*;
use crate::store::{
    next_uid_validity, MailboxMapper, RequestScoped, TransactionalMapper,
};
use crate::support::error::Error;

/// The mailbox mapper of `MemoryStore`.
///
/// Every change is applied to the shared table immediately. `begin` and
/// `commit` do nothing, and `rollback` cannot undo anything that was already
/// done; it only exists so that callers written against
/// `TransactionalMapper` work unchanged.
pub struct MemoryMailboxMapper {
    store: MemoryStore,
}

impl MemoryMailboxMapper {
    pub(super) fn new(store: MemoryStore) -> Self {
        MemoryMailboxMapper { store }
    }
}

impl RequestScoped for MemoryMailboxMapper {
    fn begin_request(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn end_request(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

impl TransactionalMapper for MemoryMailboxMapper {
    fn begin(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn commit(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

impl MailboxMapper for MemoryMailboxMapper {
    fn find_mailbox_by_path(
        &mut self,
        name: &MailboxName,
    ) -> Result<Mailbox, Error> {
        let table = self.store.read_table();
        table
            .names
            .get(name)
            .and_then(|id| table.records.get(id))
            .map(MailboxRecord::snapshot)
            .ok_or(Error::NxMailbox)
    }

    fn find_mailbox_by_id(&mut self, id: MailboxId) -> Result<Mailbox, Error> {
        self.store
            .read_table()
            .records
            .get(&id)
            .map(MailboxRecord::snapshot)
            .ok_or(Error::NxMailbox)
    }

    fn find_mailbox_with_path_like(
        &mut self,
        query: &MailboxQuery,
    ) -> Result<Vec<Mailbox>, Error> {
        if let Some(exact) = query.exact_name() {
            return match self.find_mailbox_by_path(&exact) {
                Ok(mb) => Ok(vec![mb]),
                Err(Error::NxMailbox) => Ok(vec![]),
                Err(e) => Err(e),
            };
        }

        let table = self.store.read_table();
        Ok(table
            .names
            .range(query.base().clone()..)
            .take_while(|&(name, _)| name.starts_with(query.base()))
            .filter(|&(name, _)| query.matches(name))
            .filter_map(|(_, id)| table.records.get(id))
            .map(MailboxRecord::snapshot)
            .collect())
    }

    fn save(&mut self, mailbox: &mut Mailbox) -> Result<MailboxId, Error> {
        let mut table = self.store.write_table();
        match mailbox.id {
            None => self.create(&mut table, mailbox),
            Some(id) => self.update(&mut table, id, mailbox),
        }
    }

    fn delete(&mut self, mailbox: &Mailbox) -> Result<(), Error> {
        let id = mailbox.require_id()?;
        let mut table = self.store.write_table();
        let record = table.records.remove(&id).ok_or(Error::NxMailbox)?;
        table.names.remove(&record.mailbox.name);
        info!("Deleted mailbox {} ({})", record.mailbox.name, id);
        Ok(())
    }

    fn list(&mut self) -> Result<Vec<Mailbox>, Error> {
        let table = self.store.read_table();
        Ok(table
            .names
            .values()
            .filter_map(|id| table.records.get(id))
            .map(MailboxRecord::snapshot)
            .collect())
    }
}

impl MemoryMailboxMapper {
    fn create(
        &self,
        table: &mut MailboxTable,
        mailbox: &mut Mailbox,
    ) -> Result<MailboxId, Error> {
        if table.names.contains_key(&mailbox.name) {
            return Err(Error::MailboxExists);
        }

        let id = MailboxId(
            self.store.shared.next_id.fetch_add(1, Ordering::SeqCst) + 1,
        );
        table.last_uid_validity = next_uid_validity(table.last_uid_validity);

        mailbox.id = Some(id);
        mailbox.uid_validity = table.last_uid_validity;
        mailbox.last_uid = None;
        mailbox.highest_modseq = None;
        if mailbox.acl.is_empty() {
            mailbox.acl = MailboxAcl::owned_by(mailbox.owner.key());
        }

        table.names.insert(mailbox.name.clone(), id);
        table.records.insert(
            id,
            MailboxRecord {
                mailbox: mailbox.clone(),
                state: Arc::new(MailboxState::default()),
            },
        );

        info!(
            "Created mailbox {} ({}), UID validity {}",
            mailbox.name, id, mailbox.uid_validity
        );
        Ok(id)
    }

    fn update(
        &self,
        table: &mut MailboxTable,
        id: MailboxId,
        mailbox: &mut Mailbox,
    ) -> Result<MailboxId, Error> {
        let old_name = table
            .records
            .get(&id)
            .ok_or(Error::NxMailbox)?
            .mailbox
            .name
            .clone();

        if old_name != mailbox.name {
            rename_subtree(table, &old_name, &mailbox.name)?;
        }

        let record = table.records.get_mut(&id).ok_or(Error::NxMailbox)?;
        record.mailbox.owner = mailbox.owner.clone();
        record.mailbox.is_owner_group = mailbox.is_owner_group;
        record.mailbox.acl = mailbox.acl.clone();

        *mailbox = record.snapshot();
        Ok(id)
    }
}

fn rename_subtree(
    table: &mut MailboxTable,
    old: &MailboxName,
    new: &MailboxName,
) -> Result<(), Error> {
    if new.starts_with(old) {
        return Err(Error::invalid(format!(
            "cannot move {} below itself",
            old
        )));
    }

    // Inferiors sort immediately after their ancestor
    let moved = table
        .names
        .range(old.clone()..)
        .take_while(|&(name, _)| name.starts_with(old))
        .map(|(name, &id)| (name.clone(), id))
        .collect::<Vec<_>>();
    let vacated = moved
        .iter()
        .map(|&(ref name, _)| name)
        .collect::<HashSet<_>>();

    let mut targets = Vec::with_capacity(moved.len());
    for &(ref name, id) in &moved {
        let target = name
            .rebase(old, new)
            .ok_or_else(|| Error::invalid("rename source moved"))?;
        if table.names.contains_key(&target) && !vacated.contains(&target) {
            return Err(Error::MailboxExists);
        }
        targets.push((target, id));
    }

    for &(ref name, _) in &moved {
        table.names.remove(name);
    }
    for (target, id) in targets {
        if let Some(record) = table.records.get_mut(&id) {
            info!(
                "Renamed mailbox {} to {} ({})",
                record.mailbox.name, target, id
            );
            record.mailbox.name = target.clone();
        }
        table.names.insert(target, id);
    }

    Ok(())
}
