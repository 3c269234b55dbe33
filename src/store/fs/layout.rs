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

//! Where everything lives under the root of a filesystem store.
//!
//! ```text
//! counters                        last mailbox id, last UID validity
//! mailboxes/<id>/mailbox.toml     name, owner, UID validity, ACL
//! mailboxes/<id>/counters         last UID, highest modseq
//! mailboxes/<id>/messages.lock
//! mailboxes/<id>/messages/<uid>.meta
//! mailboxes/<id>/messages/<uid>.eml
//! names/<encoded name>            symlink to ../mailboxes/<id>
//! subscriptions/<owner>.toml
//! tmp/
//! garbage/
//! ```
//!
//! The mailbox record is authoritative for a mailbox's name. The `names`
//! directory is an index over the records; an entry whose target is missing
//! or whose record has a different name is stale and is ignored.

use std::fs;
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use crate::store::model::{MailboxId, Uid};
use crate::support::file_ops::{IgnoreKinds, Staging};

/// Slot of the root counter file holding the last allocated mailbox id.
pub const LAST_MAILBOX_ID: usize = 0;
/// Slot of the root counter file holding the last issued UID validity.
pub const LAST_UID_VALIDITY: usize = 1;
/// Slot of a mailbox counter file holding its last UID.
pub const LAST_UID: usize = 0;
/// Slot of a mailbox counter file holding its highest modseq.
pub const HIGHEST_MODSEQ: usize = 1;

const META_EXTENSION: &str = "meta";
const DATA_EXTENSION: &str = "eml";

#[derive(Clone, Debug)]
pub struct Layout {
    root: PathBuf,
    staging: Staging,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Layout {
            staging: Staging {
                tmp: root.join("tmp"),
                garbage: root.join("garbage"),
            },
            root,
        }
    }

    /// Create the directory skeleton. Existing directories are left alone.
    pub fn init(&self) -> io::Result<()> {
        for dir in &[
            self.root.clone(),
            self.mailboxes(),
            self.names(),
            self.subscriptions(),
            self.staging.tmp.clone(),
            self.staging.garbage.clone(),
        ] {
            fs::DirBuilder::new()
                .mode(0o750)
                .create(dir)
                .ignore_already_exists()?;
        }
        Ok(())
    }

    /// Fail with `NotFound` if the skeleton is incomplete.
    pub fn check(&self) -> io::Result<()> {
        for dir in &[
            self.mailboxes(),
            self.names(),
            self.subscriptions(),
            self.staging.tmp.clone(),
            self.staging.garbage.clone(),
        ] {
            if !fs::metadata(dir)?.is_dir() {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{} is not a directory", dir.display()),
                ));
            }
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn staging(&self) -> &Staging {
        &self.staging
    }

    pub fn tmp(&self) -> &Path {
        &self.staging.tmp
    }

    pub fn counters(&self) -> PathBuf {
        self.root.join("counters")
    }

    pub fn mailboxes(&self) -> PathBuf {
        self.root.join("mailboxes")
    }

    pub fn mailbox(&self, id: MailboxId) -> PathBuf {
        self.mailboxes().join(id.to_string())
    }

    pub fn record(&self, id: MailboxId) -> PathBuf {
        self.mailbox(id).join("mailbox.toml")
    }

    pub fn mailbox_counters(&self, id: MailboxId) -> PathBuf {
        self.mailbox(id).join("counters")
    }

    pub fn messages_lock(&self, id: MailboxId) -> PathBuf {
        self.mailbox(id).join("messages.lock")
    }

    pub fn messages(&self, id: MailboxId) -> PathBuf {
        self.mailbox(id).join("messages")
    }

    pub fn message_meta(&self, id: MailboxId, uid: Uid) -> PathBuf {
        self.messages(id)
            .join(format!("{}.{}", uid.0.get(), META_EXTENSION))
    }

    pub fn message_data(&self, id: MailboxId, uid: Uid) -> PathBuf {
        self.messages(id)
            .join(format!("{}.{}", uid.0.get(), DATA_EXTENSION))
    }

    pub fn names(&self) -> PathBuf {
        self.root.join("names")
    }

    pub fn name_link(&self, encoded: &str) -> PathBuf {
        self.names().join(encoded)
    }

    /// The target written into a name link for mailbox `id`.
    pub fn link_target(id: MailboxId) -> PathBuf {
        Path::new("..").join("mailboxes").join(id.to_string())
    }

    pub fn subscriptions(&self) -> PathBuf {
        self.root.join("subscriptions")
    }

    /// `owner_key` must already be safe for use as a file name.
    pub fn subscription_file(&self, owner_key: &str) -> PathBuf {
        self.subscriptions().join(format!("{}.toml", owner_key))
    }

    pub fn subscription_lock(&self, owner_key: &str) -> PathBuf {
        self.subscriptions().join(format!("{}.lock", owner_key))
    }
}

/// Parse the id out of a name link target or mailbox directory name.
pub fn parse_mailbox_id(path: &Path) -> Option<MailboxId> {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.parse::<u64>().ok())
        .map(MailboxId)
}

/// Parse the UID out of the name of a message metadata file.
pub fn parse_meta_name(name: &str) -> Option<Uid> {
    let stem = name.strip_suffix(META_EXTENSION)?.strip_suffix('.')?;
    stem.parse::<Uid>().ok()
}

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn init_is_idempotent() {
        let root = TempDir::new().unwrap();
        let layout = Layout::new(root.path().join("store"));
        assert!(layout.check().is_err());
        layout.init().unwrap();
        layout.init().unwrap();
        layout.check().unwrap();
    }

    #[test]
    fn file_names() {
        let layout = Layout::new("/srv");
        assert_eq!(
            Path::new("/srv/mailboxes/42/messages/7.meta"),
            layout.message_meta(MailboxId(42), Uid::u(7))
        );
        assert_eq!(
            Some(MailboxId(42)),
            parse_mailbox_id(&Layout::link_target(MailboxId(42)))
        );
        assert_eq!(Some(Uid::u(7)), parse_meta_name("7.meta"));
        assert_eq!(None, parse_meta_name("7.eml"));
        assert_eq!(None, parse_meta_name("0.meta"));
        assert_eq!(None, parse_meta_name("x.meta"));
        assert_eq!(None, parse_meta_name("7meta"));
    }
}
