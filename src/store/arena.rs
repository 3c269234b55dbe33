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

//! A request-scoped table of mailboxes addressed by id.
//!
//! Backends whose natural key is the mailbox name use this to keep a renamed
//! mailbox reachable by its stable id for the rest of the request. It is
//! cleared when the request ends; it is not a long-lived cache, and nothing
//! in it survives a request boundary.

use std::collections::HashMap;

use super::model::{Mailbox, MailboxId};

/// Refers to a slot in a `MailboxArena`.
///
/// A handle is only valid until the arena is next cleared; after that, it
/// resolves to nothing rather than to whatever reuses its slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArenaHandle {
    generation: u64,
    index: usize,
}

#[derive(Debug, Default)]
pub struct MailboxArena {
    generation: u64,
    slots: Vec<Option<Mailbox>>,
    by_id: HashMap<MailboxId, ArenaHandle>,
}

impl MailboxArena {
    pub fn new() -> Self {
        MailboxArena::default()
    }

    /// Add `mailbox`, replacing any entry with the same id.
    ///
    /// Mailboxes without an id cannot be cached and yield `None`.
    pub fn insert(&mut self, mailbox: Mailbox) -> Option<ArenaHandle> {
        let id = mailbox.id?;
        if let Some(&handle) = self.by_id.get(&id) {
            self.slots[handle.index] = Some(mailbox);
            return Some(handle);
        }

        let handle = ArenaHandle {
            generation: self.generation,
            index: self.slots.len(),
        };
        self.slots.push(Some(mailbox));
        self.by_id.insert(id, handle);
        Some(handle)
    }

    pub fn find(&self, id: MailboxId) -> Option<ArenaHandle> {
        self.by_id.get(&id).copied()
    }

    pub fn get(&self, handle: ArenaHandle) -> Option<&Mailbox> {
        if handle.generation != self.generation {
            return None;
        }
        self.slots.get(handle.index).and_then(Option::as_ref)
    }

    pub fn get_by_id(&self, id: MailboxId) -> Option<&Mailbox> {
        self.find(id).and_then(|h| self.get(h))
    }

    /// Forget the mailbox with `id`, e.g. because it was deleted.
    pub fn evict(&mut self, id: MailboxId) {
        if let Some(handle) = self.by_id.remove(&id) {
            self.slots[handle.index] = None;
        }
    }

    /// Drop everything and invalidate all outstanding handles.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.by_id.clear();
        self.generation += 1;
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
