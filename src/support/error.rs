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

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Mailbox does not exist")]
    NxMailbox,
    #[error("Mailbox already exists")]
    MailboxExists,
    #[error("Message does not exist")]
    NxMessage,
    #[error("Cannot resolve owner of mailbox name: {0}")]
    NameResolution(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Mailbox has exhausted its identifier space")]
    MailboxFull,
    #[error("Store is corrupt: {0}")]
    CorruptStore(String),
    #[error(
        "Rename of {from} to {to} stopped after completing {completed:?}: \
         {source}"
    )]
    PartialRename {
        from: String,
        to: String,
        completed: Vec<RenameStep>,
        #[source]
        source: Box<Error>,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Nix(#[from] nix::Error),
    #[error(transparent)]
    Cbor(#[from] serde_cbor::error::Error),
    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
    #[error(transparent)]
    Regex(#[from] regex::Error),
}

/// The coarse classification of an `Error` which callers branch on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    MailboxNotFound,
    MailboxExists,
    MessageNotFound,
    NameResolution,
    InvalidArgument,
    /// Any fault of the underlying storage. The original cause is always
    /// available through `std::error::Error::source` or the variant itself.
    BackendIo,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match *self {
            Error::NxMailbox => ErrorKind::MailboxNotFound,
            Error::MailboxExists => ErrorKind::MailboxExists,
            Error::NxMessage => ErrorKind::MessageNotFound,
            Error::NameResolution(..) => ErrorKind::NameResolution,
            Error::InvalidArgument(..) | Error::MailboxFull => {
                ErrorKind::InvalidArgument
            }
            Error::CorruptStore(..)
            | Error::PartialRename { .. }
            | Error::Io(..)
            | Error::Nix(..)
            | Error::Cbor(..)
            | Error::TomlDe(..)
            | Error::TomlSer(..)
            | Error::Regex(..) => ErrorKind::BackendIo,
        }
    }

    pub(crate) fn invalid(what: impl Into<String>) -> Self {
        Error::InvalidArgument(what.into())
    }

    pub(crate) fn corrupt(what: impl Into<String>) -> Self {
        Error::CorruptStore(what.into())
    }
}

/// One step of a multi-step rename which completed before a failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RenameStep {
    /// The name index entry for the new name was created.
    LinkedNewName(String),
    /// The mailbox record was rewritten with the new name.
    UpdatedRecord(String),
    /// The name index entry for the old name was removed.
    UnlinkedOldName(String),
}

#[cfg(test)]
mod test {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn backend_faults_keep_their_cause() {
        let e: Error =
            io::Error::new(io::ErrorKind::PermissionDenied, "nope").into();
        assert_eq!(ErrorKind::BackendIo, e.kind());
        assert_eq!("nope", e.to_string());

        let e = Error::PartialRename {
            from: "a".to_owned(),
            to: "b".to_owned(),
            completed: vec![RenameStep::LinkedNewName("b".to_owned())],
            source: Box::new(e),
        };
        assert_eq!(ErrorKind::BackendIo, e.kind());
        assert_eq!("nope", e.source().unwrap().to_string());
    }

    #[test]
    fn contract_kinds() {
        assert_eq!(ErrorKind::MailboxNotFound, Error::NxMailbox.kind());
        assert_eq!(ErrorKind::MailboxExists, Error::MailboxExists.kind());
        assert_eq!(
            ErrorKind::NameResolution,
            Error::NameResolution("x".to_owned()).kind()
        );
        assert_eq!(ErrorKind::InvalidArgument, Error::invalid("x").kind());
    }
}
