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
use std::fs;
use std::io;
use std::os::unix::fs::{symlink, DirBuilderExt};
use std::path::Path;

use log::{info, warn};
use rand::{rngs::OsRng, Rng};
use tempfile::TempDir;

use super::layout::{self, Layout, LAST_MAILBOX_ID, LAST_UID_VALIDITY};
use super::{FsStore, MailboxRecord};
use crate::name::model::MailboxName;
use crate::query::MailboxQuery;
use crate::store::acl::MailboxAcl;
use crate::store::arena::MailboxArena;
use crate::store::model::*;
use crate::store::{
    next_uid_validity, MailboxMapper, RequestScoped, TransactionalMapper,
};
use crate::support::counter_file::CounterGuard;
use crate::support::error::{Error, RenameStep};
use crate::support::file_ops::{ErrorTransforms, IgnoreKinds};

/// The mailbox mapper of `FsStore`.
///
/// Mailboxes loaded during a request are kept in a `MailboxArena` so that
/// they stay reachable by id even after being renamed; the arena is emptied
/// at both ends of every request.
///
/// `begin` and `rollback` only discard the arena, so that the next operation
/// sees current state. `commit` does nothing. No operation can be undone:
/// each one is durable by the time it returns.
pub struct FsMailboxMapper {
    store: FsStore,
    arena: MailboxArena,
}

impl FsMailboxMapper {
    pub(super) fn new(store: FsStore) -> Self {
        FsMailboxMapper {
            store,
            arena: MailboxArena::new(),
        }
    }

    fn layout(&self) -> &Layout {
        self.store.layout()
    }

    /// Combine a freshly read record with the current counters and remember
    /// the result for the rest of the request.
    fn hydrate(
        &mut self,
        id: MailboxId,
        record: MailboxRecord,
    ) -> Result<Mailbox, Error> {
        let mut mailbox = record.into_mailbox(id);
        if let Err(e) = self.store.load_counters(&mut mailbox) {
            self.arena.evict(id);
            return Err(e);
        }
        self.arena.insert(mailbox.clone());
        Ok(mailbox)
    }

    fn create(&mut self, mailbox: &mut Mailbox) -> Result<MailboxId, Error> {
        if self.store.resolve_link(&mailbox.name)?.is_some() {
            return Err(Error::MailboxExists);
        }

        let (id, uid_validity) = {
            let mut counters = CounterGuard::lock(self.layout().counters())?;
            let mut slots = counters.read()?;
            slots[LAST_MAILBOX_ID] = slots[LAST_MAILBOX_ID]
                .checked_add(1)
                .ok_or_else(|| Error::corrupt("mailbox ids exhausted"))?;
            slots[LAST_UID_VALIDITY] = u64::from(next_uid_validity(
                slots[LAST_UID_VALIDITY] as u32,
            ));
            counters.write(&slots)?;
            (
                MailboxId(slots[LAST_MAILBOX_ID]),
                slots[LAST_UID_VALIDITY] as u32,
            )
        };

        mailbox.id = Some(id);
        mailbox.uid_validity = uid_validity;
        mailbox.last_uid = None;
        mailbox.highest_modseq = None;
        if mailbox.acl.is_empty() {
            mailbox.acl = MailboxAcl::owned_by(mailbox.owner.key());
        }

        // Build the whole mailbox in tmp so it appears fully formed
        let layout = self.layout();
        let stage = TempDir::new_in(layout.tmp())?;
        fs::DirBuilder::new()
            .mode(0o750)
            .create(stage.path().join("messages"))?;
        let record = toml::to_string(&MailboxRecord::from_mailbox(mailbox))?;
        layout.staging().spit(
            stage.path().join("mailbox.toml"),
            false,
            0o600,
            record.as_bytes(),
        )?;
        layout.staging().spit(
            stage.path().join("counters"),
            false,
            0o600,
            &[],
        )?;
        fs::rename(stage.into_path(), layout.mailbox(id))?;

        if let Err(e) = self.publish_name(id, &mailbox.name) {
            if let Err(e2) =
                layout.staging().discard_tree(layout.mailbox(id))
            {
                warn!("Failed to clean up unnamed mailbox {}: {}", id, e2);
            }
            mailbox.id = None;
            return Err(e);
        }

        info!(
            "Created mailbox {} ({}), UID validity {}",
            mailbox.name, id, uid_validity
        );
        self.arena.insert(mailbox.clone());
        Ok(id)
    }

    /// Point the name link for `name` at `id`.
    ///
    /// A stale link is replaced; a live one fails with `MailboxExists`.
    fn publish_name(
        &self,
        id: MailboxId,
        name: &MailboxName,
    ) -> Result<(), Error> {
        let link = self.layout().name_link(&self.store.codec().encode(name));
        match symlink(Layout::link_target(id), &link) {
            Ok(()) => Ok(()),
            Err(e) if io::ErrorKind::AlreadyExists == e.kind() => {
                match self.store.resolve_link(name)? {
                    Some((other, _)) if other != id => {
                        Err(Error::MailboxExists)
                    }
                    _ => self.replace_link(id, &link),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    fn replace_link(&self, id: MailboxId, link: &Path) -> Result<(), Error> {
        let staged = self
            .layout()
            .tmp()
            .join(format!("link.{}", OsRng.gen::<u64>()));
        symlink(Layout::link_target(id), &staged)?;
        if let Err(e) = fs::rename(&staged, link) {
            fs::remove_file(&staged).ignore_not_found()?;
            return Err(e.into());
        }
        Ok(())
    }

    /// Remove the name link for `name` if it still points at `id`.
    fn unlink_name(
        &self,
        id: MailboxId,
        name: &MailboxName,
    ) -> Result<(), Error> {
        let link = self.layout().name_link(&self.store.codec().encode(name));
        match fs::read_link(&link) {
            Ok(target) if Some(id) == layout::parse_mailbox_id(&target) => {
                fs::remove_file(&link).ignore_not_found()?;
            }
            Ok(_) => (),
            Err(e) if io::ErrorKind::NotFound == e.kind() => (),
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn update(
        &mut self,
        id: MailboxId,
        mailbox: &mut Mailbox,
    ) -> Result<MailboxId, Error> {
        let mut record = self.store.read_record(id)?;
        if let Some(interrupted) = record.renaming_from.clone() {
            let current = record.name.clone();
            warn!(
                "Finishing interrupted rename of {} to {} ({})",
                interrupted, current, id
            );
            self.rename_subtree(id, &interrupted, &current)?;
            record = self.store.read_record(id)?;
        }

        if record.name != mailbox.name {
            let old_name = record.name.clone();
            self.rename_subtree(id, &old_name, &mailbox.name)?;
            record = self.store.read_record(id)?;
        }

        record.owner = mailbox.owner.clone();
        record.is_owner_group = mailbox.is_owner_group;
        record.acl = mailbox.acl.clone();
        self.store.write_record(id, &record)?;

        *mailbox = self.hydrate(id, record)?;
        Ok(id)
    }

    /// Rename `old` (which is mailbox `id`) and all its inferiors to be at
    /// and below `new`.
    ///
    /// Each mailbox is moved in three steps: its new name is linked, its
    /// record is rewritten, and its old name is unlinked. If a step fails
    /// after any step has completed, the store is left in that intermediate
    /// state and the completed steps are reported in `PartialRename`. In
    /// every intermediate state, each mailbox is reachable under exactly one
    /// of its names, since the record decides which name link is live.
    ///
    /// While inferiors remain to be moved, the record of `id` remembers
    /// `old`, so that the next update of `id` finishes the move. Running
    /// this again over a partly moved subtree is therefore safe: mailboxes
    /// already moved are no longer found below `old`, and `id` itself is
    /// moved onto the name it already has.
    fn rename_subtree(
        &mut self,
        id: MailboxId,
        old: &MailboxName,
        new: &MailboxName,
    ) -> Result<(), Error> {
        if new.starts_with(old) {
            return Err(Error::invalid(format!(
                "cannot move {} below itself",
                old
            )));
        }

        let mut moved = vec![(id, old.clone())];
        let inferiors = MailboxQuery::children_of(old.clone());
        for inferior in self.find_mailbox_with_path_like(&inferiors)? {
            if let Some(inferior_id) = inferior.id {
                moved.push((inferior_id, inferior.name));
            }
        }

        // Ancestors first, so that when moving up the hierarchy, a name is
        // vacated before it is reused
        moved.sort_by(|a, b| a.1.cmp(&b.1));
        let vacated = moved
            .iter()
            .map(|&(_, ref name)| name.clone())
            .collect::<HashSet<_>>();

        let mut plan = Vec::with_capacity(moved.len());
        for (moved_id, name) in moved {
            let target = name
                .rebase(old, new)
                .ok_or_else(|| Error::invalid("rename source moved"))?;
            match self.store.resolve_link(&target)? {
                Some((holder, _))
                    if holder != moved_id && !vacated.contains(&target) =>
                {
                    return Err(Error::MailboxExists)
                }
                _ => (),
            }
            plan.push((moved_id, name, target));
        }

        let has_inferiors = plan.len() > 1;
        let mut completed = Vec::new();
        for (moved_id, from, to) in plan {
            let renaming_from = if has_inferiors && moved_id == id {
                Some(old)
            } else {
                None
            };
            let result = self.rename_one(
                moved_id,
                &from,
                &to,
                renaming_from,
                &mut completed,
            );
            if let Err(e) = result {
                if completed.is_empty() {
                    return Err(e);
                }
                return Err(Error::PartialRename {
                    from: old.to_string(),
                    to: new.to_string(),
                    completed,
                    source: Box::new(e),
                });
            }
            info!("Renamed mailbox {} to {} ({})", from, to, moved_id);
        }

        if has_inferiors {
            let result = self.store.read_record(id).and_then(|mut record| {
                record.renaming_from = None;
                self.store.write_record(id, &record)
            });
            if let Err(e) = result {
                return Err(Error::PartialRename {
                    from: old.to_string(),
                    to: new.to_string(),
                    completed,
                    source: Box::new(e),
                });
            }
        }

        Ok(())
    }

    fn rename_one(
        &mut self,
        id: MailboxId,
        from: &MailboxName,
        to: &MailboxName,
        renaming_from: Option<&MailboxName>,
        completed: &mut Vec<RenameStep>,
    ) -> Result<(), Error> {
        self.publish_name(id, to)?;
        completed.push(RenameStep::LinkedNewName(to.to_string()));

        let mut record = self.store.read_record(id)?;
        record.name = to.clone();
        record.renaming_from = renaming_from.cloned();
        self.store.write_record(id, &record)?;
        completed.push(RenameStep::UpdatedRecord(to.to_string()));

        self.unlink_name(id, from)?;
        completed.push(RenameStep::UnlinkedOldName(from.to_string()));

        if let Some(handle) = self.arena.find(id) {
            if let Some(mut cached) = self.arena.get(handle).cloned() {
                cached.name = to.clone();
                self.arena.insert(cached);
            }
        }
        Ok(())
    }
}

impl RequestScoped for FsMailboxMapper {
    fn begin_request(&mut self) -> Result<(), Error> {
        self.arena.clear();
        Ok(())
    }

    fn end_request(&mut self) -> Result<(), Error> {
        self.arena.clear();
        Ok(())
    }
}

impl TransactionalMapper for FsMailboxMapper {
    fn begin(&mut self) -> Result<(), Error> {
        self.arena.clear();
        Ok(())
    }

    fn commit(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), Error> {
        self.arena.clear();
        Ok(())
    }
}

impl MailboxMapper for FsMailboxMapper {
    fn find_mailbox_by_path(
        &mut self,
        name: &MailboxName,
    ) -> Result<Mailbox, Error> {
        match self.store.resolve_link(name)? {
            Some((id, record)) => self.hydrate(id, record),
            None => Err(Error::NxMailbox),
        }
    }

    fn find_mailbox_by_id(&mut self, id: MailboxId) -> Result<Mailbox, Error> {
        let mut mailbox = match self.arena.get_by_id(id) {
            Some(cached) => cached.clone(),
            None => {
                let record = self.store.read_record(id)?;
                return self.hydrate(id, record);
            }
        };

        if let Err(e) = self.store.load_counters(&mut mailbox) {
            self.arena.evict(id);
            return Err(e);
        }
        Ok(mailbox)
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

        let pattern = self.store.search().regex(query)?;
        let mut found = Vec::new();
        for entry in fs::read_dir(self.layout().names())? {
            let entry = entry?;
            let encoded = match entry.file_name().into_string() {
                Ok(s) => s,
                Err(_) => continue,
            };
            if !pattern.is_match(&encoded) {
                continue;
            }

            let name = match self.store.codec().decode(&encoded) {
                Ok(name) => name,
                Err(e) => {
                    warn!("Ignoring undecodable name {:?}: {}", encoded, e);
                    continue;
                }
            };

            match self.find_mailbox_by_path(&name) {
                Ok(mailbox) => found.push(mailbox),
                // Stale link, or deleted since the directory was read
                Err(Error::NxMailbox) => (),
                Err(e) => return Err(e),
            }
        }

        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    fn save(&mut self, mailbox: &mut Mailbox) -> Result<MailboxId, Error> {
        // Only qualified names are guaranteed to encode to a usable file name
        if !mailbox.name.is_qualified() {
            return Err(Error::invalid(format!(
                "mailbox name {} is not qualified",
                mailbox.name
            )));
        }

        match mailbox.id {
            None => self.create(mailbox),
            Some(id) => self.update(id, mailbox),
        }
    }

    fn delete(&mut self, mailbox: &Mailbox) -> Result<(), Error> {
        let id = mailbox.require_id()?;
        let record = self.store.read_record(id)?;

        // Once the directory is in the garbage, the mailbox and all its
        // messages are unreachable, even if unlinking the name fails.
        self.layout()
            .staging()
            .discard_tree(self.layout().mailbox(id))
            .on_not_found(Error::NxMailbox)?;
        self.arena.evict(id);
        self.unlink_name(id, &record.name)?;

        info!("Deleted mailbox {} ({})", record.name, id);
        Ok(())
    }

    fn list(&mut self) -> Result<Vec<Mailbox>, Error> {
        let mut found = Vec::new();
        for entry in fs::read_dir(self.layout().mailboxes())? {
            let entry = entry?;
            let id = match layout::parse_mailbox_id(&entry.path()) {
                Some(id) => id,
                None => continue,
            };

            let loaded = self
                .store
                .read_record(id)
                .and_then(|record| self.hydrate(id, record));
            match loaded {
                Ok(mailbox) => found.push(mailbox),
                Err(Error::NxMailbox) => (),
                Err(e) => return Err(e),
            }
        }

        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }
}
