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

//! Mapping between owners and the namespaces they own.
//!
//! The global namespace has three kinds of top-level prefix:
//!
//! - `#user.<name>` for ordinary personal namespaces.
//! - `#virtual.<domain>.<name>` for personal namespaces of virtual-hosted
//!   users.
//! - `#group.<name>` for namespaces shared by a group.
//!
//! Each namespace root has the owner's INBOX directly below it.

use lazy_static::lazy_static;
use regex::Regex;

use crate::name::model::{MailboxName, Owner};
use crate::support::error::Error;
use crate::support::store_config::NamespaceConfig;

lazy_static! {
    static ref DOMAIN_RX: Regex = Regex::new(concat!(
        r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?",
        r"(\.[a-z0-9]([a-z0-9-]*[a-z0-9])?)*$"
    ))
    .expect("Invalid domain regex");
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NamespaceKind {
    Personal,
    Virtual,
    Group,
}

/// Resolves owners to namespaces and back.
///
/// This holds only configuration and can be freely shared between requests
/// and threads.
#[derive(Clone, Debug, Default)]
pub struct NameResolver {
    config: NamespaceConfig,
}

impl NameResolver {
    pub fn new(config: NamespaceConfig) -> Self {
        NameResolver { config }
    }

    /// Classify a leading segment.
    pub fn namespace_kind(&self, segment: &str) -> Option<NamespaceKind> {
        if segment == self.config.user_prefix {
            Some(NamespaceKind::Personal)
        } else if segment == self.config.virtual_prefix {
            Some(NamespaceKind::Virtual)
        } else if segment == self.config.group_prefix {
            Some(NamespaceKind::Group)
        } else {
            None
        }
    }

    /// Whether `segment` introduces a namespace which is not the plain
    /// personal namespace of a local user.
    pub fn is_virtual_prefix(&self, segment: &str) -> bool {
        match self.namespace_kind(segment) {
            Some(NamespaceKind::Virtual) | Some(NamespaceKind::Group) => true,
            Some(NamespaceKind::Personal) | None => false,
        }
    }

    /// Return the root of `owner`'s namespace.
    pub fn namespace_root(&self, owner: &Owner) -> Result<MailboxName, Error> {
        if owner.is_group {
            MailboxName::qualified(vec![
                self.config.group_prefix.as_str(),
                &owner.name,
            ])
        } else if let Some(ref domain) = owner.domain {
            MailboxName::qualified(vec![
                self.config.virtual_prefix.as_str(),
                domain,
                &owner.name,
            ])
        } else {
            MailboxName::qualified(vec![
                self.config.user_prefix.as_str(),
                &owner.name,
            ])
        }
        .map_err(|_| {
            Error::NameResolution(format!(
                "owner {} has no valid namespace",
                owner
            ))
        })
    }

    /// Return the name of `owner`'s INBOX.
    pub fn inbox(&self, owner: &Owner) -> Result<MailboxName, Error> {
        self.namespace_root(owner)?.child(self.config.inbox.as_str())
    }

    /// Determine which owner's namespace contains `name`.
    pub fn owner_of(&self, name: &MailboxName) -> Result<Owner, Error> {
        let fail = |why: &str| {
            Error::NameResolution(format!("{}: {}", name, why))
        };

        if !name.is_qualified() {
            return Err(fail("name is relative to an unknown owner"));
        }

        let prefix = name.segment_at(0).unwrap_or_default();
        let kind = self
            .namespace_kind(prefix)
            .ok_or_else(|| fail("unknown namespace prefix"))?;

        match kind {
            NamespaceKind::Personal => name
                .segment_at(1)
                .map(Owner::user)
                .ok_or_else(|| fail("missing user name")),
            NamespaceKind::Group => name
                .segment_at(1)
                .map(Owner::group)
                .ok_or_else(|| fail("missing group name")),
            NamespaceKind::Virtual => {
                let domain = name
                    .segment_at(1)
                    .ok_or_else(|| fail("missing domain"))?;
                if !DOMAIN_RX.is_match(domain) {
                    return Err(fail("malformed domain"));
                }
                name.segment_at(2)
                    .map(|user| Owner::virtual_user(user, domain))
                    .ok_or_else(|| fail("missing user name"))
            }
        }
    }

    /// Interpret `relative` within `owner`'s namespace.
    ///
    /// A leading `INBOX` segment is matched case-insensitively, as IMAP
    /// requires.
    pub fn qualify(
        &self,
        owner: &Owner,
        relative: &MailboxName,
    ) -> Result<MailboxName, Error> {
        if relative.is_qualified() {
            return Err(Error::invalid(format!(
                "{} is already qualified",
                relative
            )));
        }

        let mut name = self.namespace_root(owner)?;
        for (ix, segment) in relative.segments().enumerate() {
            if 0 == ix && self.config.inbox.eq_ignore_ascii_case(segment) {
                name = name.child(self.config.inbox.as_str())?;
            } else {
                name = name.child(segment)?;
            }
        }

        Ok(name)
    }

    /// The inverse of `qualify`: return `name` relative to the root of the
    /// namespace which contains it, along with that namespace's owner.
    pub fn relativise(
        &self,
        name: &MailboxName,
    ) -> Result<(Owner, MailboxName), Error> {
        let owner = self.owner_of(name)?;
        let root = self.namespace_root(&owner)?;
        let rest = name.strip_prefix(&root).unwrap_or_default();
        let relative = MailboxName::relative(rest.iter().cloned())
            .map_err(|_| {
                Error::NameResolution(format!("{} is a namespace root", name))
            })?;
        Ok((owner, relative))
    }

    /// Interpret a login name as an owner.
    ///
    /// `alice` is a personal owner; `alice@example.com` is the owner `alice`
    /// virtual-hosted on `example.com`.
    pub fn owner_from_login(&self, login: &str) -> Result<Owner, Error> {
        let fail = || {
            Error::NameResolution(format!("malformed login {:?}", login))
        };

        let owner = match login.rfind('@') {
            None => Owner::user(login),
            Some(at) => {
                let owner =
                    Owner::virtual_user(&login[..at], &login[at + 1..]);
                let domain_ok = owner
                    .domain
                    .as_ref()
                    .map_or(false, |d| DOMAIN_RX.is_match(d));
                if !domain_ok {
                    return Err(fail());
                }
                owner
            }
        };

        if owner.name.is_empty() || owner.name.chars().any(char::is_control) {
            return Err(fail());
        }

        Ok(owner)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn q(segments: &[&str]) -> MailboxName {
        MailboxName::qualified(segments.iter().copied()).unwrap()
    }

    fn rel(segments: &[&str]) -> MailboxName {
        MailboxName::relative(segments.iter().copied()).unwrap()
    }

    #[test]
    fn inbox_per_owner_kind() {
        let resolver = NameResolver::default();
        assert_eq!(
            q(&["#user", "alice", "INBOX"]),
            resolver.inbox(&Owner::user("alice")).unwrap()
        );
        assert_eq!(
            q(&["#virtual", "example.com", "alice", "INBOX"]),
            resolver
                .inbox(&Owner::virtual_user("alice", "EXAMPLE.com"))
                .unwrap()
        );
        assert_eq!(
            q(&["#group", "staff", "INBOX"]),
            resolver.inbox(&Owner::group("staff")).unwrap()
        );
    }

    #[test]
    fn owner_of_round_trips() {
        let resolver = NameResolver::default();
        for owner in &[
            Owner::user("alice"),
            Owner::virtual_user("alice", "example.com"),
            Owner::group("staff"),
        ] {
            let inbox = resolver.inbox(owner).unwrap();
            assert_eq!(owner, &resolver.owner_of(&inbox).unwrap());
            assert_eq!(
                owner,
                &resolver
                    .owner_of(&inbox.child("Archive").unwrap())
                    .unwrap()
            );
        }
    }

    #[test]
    fn owner_of_failures() {
        let resolver = NameResolver::default();
        for name in &[
            rel(&["INBOX"]),
            q(&["#nope", "alice"]),
            q(&["alice", "INBOX"]),
            q(&["#user"]),
            q(&["#group"]),
            q(&["#virtual", "example.com"]),
            q(&["#virtual", "not a domain", "alice"]),
        ] {
            assert_matches!(
                Err(Error::NameResolution(..)),
                resolver.owner_of(name)
            );
        }
    }

    #[test]
    fn virtual_prefixes() {
        let resolver = NameResolver::default();
        assert!(!resolver.is_virtual_prefix("#user"));
        assert!(resolver.is_virtual_prefix("#virtual"));
        assert!(resolver.is_virtual_prefix("#group"));
        assert!(!resolver.is_virtual_prefix("INBOX"));
        assert_eq!(None, resolver.namespace_kind("#users"));
    }

    #[test]
    fn qualify_and_relativise() {
        let resolver = NameResolver::default();
        let alice = Owner::user("alice");

        let name = resolver.qualify(&alice, &rel(&["inbox", "Sub"])).unwrap();
        assert_eq!(q(&["#user", "alice", "INBOX", "Sub"]), name);
        assert_eq!(
            (alice.clone(), rel(&["INBOX", "Sub"])),
            resolver.relativise(&name).unwrap()
        );

        // Only the leading INBOX is special
        let name = resolver.qualify(&alice, &rel(&["Work", "inbox"])).unwrap();
        assert_eq!(q(&["#user", "alice", "Work", "inbox"]), name);

        assert_matches!(
            Err(Error::InvalidArgument(..)),
            resolver.qualify(&alice, &name)
        );
        assert_matches!(
            Err(Error::NameResolution(..)),
            resolver.relativise(&q(&["#user", "alice"]))
        );
    }

    #[test]
    fn logins() {
        let resolver = NameResolver::default();
        assert_eq!(
            Owner::user("alice"),
            resolver.owner_from_login("alice").unwrap()
        );
        assert_eq!(
            Owner::virtual_user("alice", "example.com"),
            resolver.owner_from_login("alice@Example.COM").unwrap()
        );
        assert_matches!(
            Err(Error::NameResolution(..)),
            resolver.owner_from_login("@example.com")
        );
        assert_matches!(
            Err(Error::NameResolution(..)),
            resolver.owner_from_login("alice@")
        );
        assert_matches!(
            Err(Error::NameResolution(..)),
            resolver.owner_from_login("")
        );
    }

    #[test]
    fn custom_prefixes() {
        let resolver = NameResolver::new(NamespaceConfig {
            user_prefix: "~".to_owned(),
            inbox: "Inbox".to_owned(),
            ..NamespaceConfig::default()
        });
        let inbox = resolver.inbox(&Owner::user("bob")).unwrap();
        assert_eq!(q(&["~", "bob", "Inbox"]), inbox);
        assert_eq!(Owner::user("bob"), resolver.owner_of(&inbox).unwrap());
    }
}
