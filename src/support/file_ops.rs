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

//! Small helpers for the file-level operations the filesystem backend is
//! built from.

use std::fs;
use std::io::{self, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use log::{error, warn};
use nix::fcntl::{flock, FlockArg};
use rand::{rngs::OsRng, Rng};

use crate::support::error::Error;

/// The scratch directories of a store.
///
/// `tmp` holds files being staged before they are atomically moved into
/// place. `garbage` holds directory trees that have been unlinked from the
/// store but not yet removed from disk. Both must be on the same file system
/// as everything they are used with.
#[derive(Clone, Debug)]
pub struct Staging {
    pub tmp: PathBuf,
    pub garbage: PathBuf,
}

impl Staging {
    /// Atomically write `data` to `path` with the given mode.
    ///
    /// If `overwrite` is false and `path` already exists, fails with
    /// `AlreadyExists` and leaves `path` alone.
    pub fn spit(
        &self,
        path: impl AsRef<Path>,
        overwrite: bool,
        mode: u32,
        data: &[u8],
    ) -> io::Result<()> {
        let mut tf = tempfile::NamedTempFile::new_in(&self.tmp)?;
        tf.as_file_mut().write_all(data)?;
        fs::set_permissions(tf.path(), fs::Permissions::from_mode(mode))?;
        tf.as_file_mut().sync_all()?;
        if overwrite {
            tf.persist(path)?;
        } else {
            tf.persist_noclobber(path)?;
        }
        Ok(())
    }

    /// Move `target` into the garbage directory, then remove it in the
    /// background.
    ///
    /// Once this returns successfully, `target` is no longer reachable at its
    /// old path. Failure to actually free the space is only logged.
    pub fn discard_tree(&self, target: impl AsRef<Path>) -> io::Result<()> {
        let target = target.as_ref();

        loop {
            let dst =
                self.garbage.join(format!("garbage.{}", OsRng.gen::<u64>()));

            match fs::rename(target, &dst) {
                Ok(()) => {
                    std::thread::spawn(move || {
                        if let Err(e) = fs::remove_dir_all(&dst) {
                            error!(
                                "Failed to remove {}: {}",
                                dst.display(),
                                e
                            );
                        }
                    });
                    return Ok(());
                }
                Err(e) if io::ErrorKind::AlreadyExists == e.kind() => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

/// An exclusive `flock` on a file whose only purpose is to be locked.
///
/// The lock is released when this is dropped.
pub struct FileLock {
    file: fs::File,
}

impl FileLock {
    /// Lock `path`, creating it if needed and blocking until the lock is
    /// available.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .mode(0o600)
            .open(path)?;
        flock(file.as_raw_fd(), FlockArg::LockExclusive)?;
        Ok(FileLock { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = flock(self.file.as_raw_fd(), FlockArg::Unlock) {
            warn!("Failed to release file lock: {}", e);
        }
    }
}

pub trait IgnoreKinds {
    fn ignore_already_exists(self) -> Self;
    fn ignore_not_found(self) -> Self;
}

impl<R: Default> IgnoreKinds for Result<R, io::Error> {
    fn ignore_already_exists(self) -> Self {
        match self {
            Err(e) if io::ErrorKind::AlreadyExists == e.kind() => {
                Ok(R::default())
            }
            r => r,
        }
    }

    fn ignore_not_found(self) -> Self {
        match self {
            Err(e) if io::ErrorKind::NotFound == e.kind() => Ok(R::default()),
            r => r,
        }
    }
}

/// Turn the "expected" file system failures into the semantic errors they
/// stand for.
pub trait ErrorTransforms {
    type Coerced;
    fn on_not_found(self, error: Error) -> Self::Coerced;
}

impl<R, E: Into<Error>> ErrorTransforms for Result<R, E> {
    type Coerced = Result<R, Error>;

    fn on_not_found(self, error: Error) -> Result<R, Error> {
        match self.map_err(|e| e.into()) {
            Err(Error::Io(e)) if io::ErrorKind::NotFound == e.kind() => {
                Err(error)
            }
            Err(Error::Nix(nix::Error::Sys(nix::errno::Errno::ENOENT))) => {
                Err(error)
            }
            s => s,
        }
    }
}
