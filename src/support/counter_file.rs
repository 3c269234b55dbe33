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

//! Persistent counters guarded by `flock(2)`.
//!
//! A counter file is a fixed array of little-endian `u64` slots. A file which
//! is shorter than the array (including a freshly created, empty one) reads
//! the missing slots as zero.
//!
//! The lock is taken on a fresh open file description each time, so it
//! serialises both other processes and other threads of this process. It is
//! not reentrant: a thread holding a `CounterGuard` must not try to lock the
//! same file again.

use std::fs;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::warn;
use nix::fcntl::{flock, FlockArg};

use crate::support::error::Error;

pub const SLOTS: usize = 2;

pub type Slots = [u64; SLOTS];

/// An exclusively locked counter file.
///
/// The lock is released when this is dropped.
#[derive(Debug)]
pub struct CounterGuard {
    file: fs::File,
}

impl CounterGuard {
    /// Open (creating if needed) and exclusively lock the counter file at
    /// `path`, blocking until the lock is available.
    pub fn lock(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .mode(0o600)
            .open(path)?;
        flock(file.as_raw_fd(), FlockArg::LockExclusive)?;
        Ok(CounterGuard { file })
    }

    /// Open and lock an existing counter file, failing with `NotFound` if it
    /// is absent.
    pub fn lock_existing(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = fs::OpenOptions::new().read(true).write(true).open(path)?;
        flock(file.as_raw_fd(), FlockArg::LockExclusive)?;
        Ok(CounterGuard { file })
    }

    pub fn read(&mut self) -> Result<Slots, Error> {
        let mut data = Vec::with_capacity(8 * SLOTS);
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_to_end(&mut data)?;

        let mut slots = [0u64; SLOTS];
        let mut reader = Cursor::new(data);
        for slot in &mut slots {
            *slot = match reader.read_u64::<LittleEndian>() {
                Ok(v) => v,
                Err(e) if io::ErrorKind::UnexpectedEof == e.kind() => break,
                Err(e) => return Err(e.into()),
            };
        }

        Ok(slots)
    }

    /// Durably replace the content of the file with `slots`.
    pub fn write(&mut self, slots: &Slots) -> Result<(), Error> {
        let mut data = Vec::with_capacity(8 * SLOTS);
        for &slot in slots {
            data.write_u64::<LittleEndian>(slot)?;
        }

        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&data)?;
        self.file.set_len(data.len() as u64)?;
        self.file.sync_data()?;
        Ok(())
    }
}

impl Drop for CounterGuard {
    fn drop(&mut self) {
        if let Err(e) = flock(self.file.as_raw_fd(), FlockArg::Unlock) {
            warn!("Failed to release counter lock: {}", e);
        }
    }
}
