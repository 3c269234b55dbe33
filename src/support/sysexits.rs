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

//! Exit codes from `sysexits.h`, as used by the command-line tool.

use crate::support::error::{Error, ErrorKind};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Sysexit(pub i32);

pub const EX_USAGE: Sysexit = Sysexit(64);
pub const EX_DATAERR: Sysexit = Sysexit(65);
pub const EX_NOINPUT: Sysexit = Sysexit(66);
pub const EX_NOUSER: Sysexit = Sysexit(67);
pub const EX_CANTCREAT: Sysexit = Sysexit(73);
pub const EX_IOERR: Sysexit = Sysexit(74);
pub const EX_CONFIG: Sysexit = Sysexit(78);

impl Sysexit {
    pub fn exit(self) -> ! {
        std::process::exit(self.0)
    }
}

impl From<&Error> for Sysexit {
    fn from(e: &Error) -> Self {
        match e.kind() {
            ErrorKind::MailboxNotFound | ErrorKind::MessageNotFound => {
                EX_NOINPUT
            }
            ErrorKind::MailboxExists => EX_CANTCREAT,
            ErrorKind::NameResolution => EX_NOUSER,
            ErrorKind::InvalidArgument => EX_DATAERR,
            ErrorKind::BackendIo => EX_IOERR,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn error_exit_codes() {
        assert_eq!(EX_NOINPUT, Sysexit::from(&Error::NxMailbox));
        assert_eq!(EX_CANTCREAT, Sysexit::from(&Error::MailboxExists));
        assert_eq!(
            EX_IOERR,
            Sysexit::from(&Error::corrupt("counter file truncated"))
        );
    }
}
