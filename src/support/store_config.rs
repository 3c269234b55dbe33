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

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::support::error::Error;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct StoreConfig {
    /// How mailbox names are spelled in backend keys and queries.
    #[serde(default)]
    pub names: NameConfig,

    /// The layout of the global namespace.
    #[serde(default)]
    pub namespace: NamespaceConfig,

    /// Configuration for the filesystem backend.
    #[serde(default)]
    pub filesystem: FilesystemConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct NameConfig {
    /// The hierarchy delimiter.
    ///
    /// Changing this on an existing filesystem store makes every existing
    /// mailbox unreachable.
    pub delimiter: char,

    /// The character which introduces an escape sequence in encoded names.
    pub escape: char,

    /// The wildcard which matches within a single hierarchy level.
    pub local_wildcard: char,

    /// The wildcard which matches across hierarchy levels.
    pub free_wildcard: char,
}

impl Default for NameConfig {
    fn default() -> Self {
        NameConfig {
            delimiter: '.',
            escape: '\\',
            local_wildcard: '%',
            free_wildcard: '*',
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct NamespaceConfig {
    /// Leading segment of personal namespaces, e.g. `#user.alice`.
    pub user_prefix: String,
    /// Leading segment of virtual-hosted namespaces, e.g.
    /// `#virtual.example.com.alice`.
    pub virtual_prefix: String,
    /// Leading segment of group namespaces, e.g. `#group.staff`.
    pub group_prefix: String,
    /// The name of the INBOX directly under each namespace root.
    pub inbox: String,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        NamespaceConfig {
            user_prefix: "#user".to_owned(),
            virtual_prefix: "#virtual".to_owned(),
            group_prefix: "#group".to_owned(),
            inbox: "INBOX".to_owned(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FilesystemConfig {
    /// The root directory of the store. May be overridden on the command
    /// line.
    pub root: Option<PathBuf>,
}

impl StoreConfig {
    /// Load and validate the configuration at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let data = fs::read(path)?;
        let config: StoreConfig = toml::from_slice(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        let n = &self.names;
        let specials =
            [n.delimiter, n.escape, n.local_wildcard, n.free_wildcard];
        for (ix, &c) in specials.iter().enumerate() {
            if !c.is_ascii()
                || c.is_ascii_control()
                || c.is_ascii_alphanumeric()
            {
                return Err(Error::invalid(format!(
                    "{:?} cannot be used as a special name character",
                    c
                )));
            }

            if specials[..ix].contains(&c) {
                return Err(Error::invalid(format!(
                    "{:?} is configured for more than one purpose",
                    c
                )));
            }
        }

        let ns = &self.namespace;
        let prefixes = [&ns.user_prefix, &ns.virtual_prefix, &ns.group_prefix];
        for (ix, prefix) in prefixes.iter().enumerate() {
            if prefix.is_empty() || prefixes[..ix].contains(prefix) {
                return Err(Error::invalid(format!(
                    "namespace prefix {:?} is empty or duplicated",
                    prefix
                )));
            }
        }

        if ns.inbox.is_empty() {
            return Err(Error::invalid("inbox name is empty"));
        }

        Ok(())
    }
}
