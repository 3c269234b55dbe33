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

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::support::error::Error;

/// The identity that roots a mailbox namespace.
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Owner {
    pub name: String,
    pub is_group: bool,
    pub is_virtual: bool,
    /// The virtual-hosting domain, always lower case. Only set for virtual
    /// owners.
    pub domain: Option<String>,
}

impl Owner {
    /// A personal owner without virtual hosting.
    pub fn user(name: impl Into<String>) -> Self {
        Owner {
            name: name.into(),
            is_group: false,
            is_virtual: false,
            domain: None,
        }
    }

    /// A personal owner hosted under `domain`.
    pub fn virtual_user(
        name: impl Into<String>,
        domain: impl AsRef<str>,
    ) -> Self {
        Owner {
            name: name.into(),
            is_group: false,
            is_virtual: true,
            domain: Some(domain.as_ref().to_lowercase()),
        }
    }

    /// A group owner, whose namespace is shared between its members.
    pub fn group(name: impl Into<String>) -> Self {
        Owner {
            name: name.into(),
            is_group: true,
            is_virtual: false,
            domain: None,
        }
    }

    /// A string identifying this owner which is stable and unique across
    /// owner kinds.
    pub fn key(&self) -> String {
        if self.is_group {
            format!("group:{}", self.name)
        } else if let Some(ref domain) = self.domain {
            format!("virtual:{}@{}", self.name, domain)
        } else {
            format!("user:{}", self.name)
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// A hierarchical mailbox name.
///
/// A qualified name starts from the global root (its first segment is a
/// namespace prefix); an unqualified name is relative to some owner's
/// namespace.
///
/// Segments are never empty and never contain ASCII control characters. They
/// may contain any other character, including whatever a backend uses as its
/// hierarchy delimiter; it is the codec's job to keep those apart.
#[derive(
    Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct MailboxName {
    qualified: bool,
    segments: Vec<String>,
}

impl MailboxName {
    pub fn qualified<S: Into<String>>(
        segments: impl IntoIterator<Item = S>,
    ) -> Result<Self, Error> {
        MailboxName::build(true, segments)
    }

    pub fn relative<S: Into<String>>(
        segments: impl IntoIterator<Item = S>,
    ) -> Result<Self, Error> {
        MailboxName::build(false, segments)
    }

    fn build<S: Into<String>>(
        qualified: bool,
        segments: impl IntoIterator<Item = S>,
    ) -> Result<Self, Error> {
        let segments = segments
            .into_iter()
            .map(|s| {
                let s = s.into();
                check_segment(&s)?;
                Ok(s)
            })
            .collect::<Result<Vec<_>, Error>>()?;

        if segments.is_empty() {
            return Err(Error::invalid("mailbox name has no segments"));
        }

        Ok(MailboxName {
            qualified,
            segments,
        })
    }

    pub fn is_qualified(&self) -> bool {
        self.qualified
    }

    /// Return the name of the inferior `segment` of this name.
    pub fn child(&self, segment: impl Into<String>) -> Result<Self, Error> {
        let segment = segment.into();
        check_segment(&segment)?;

        let mut child = self.clone();
        child.segments.push(segment);
        Ok(child)
    }

    /// Return the unqualified name made of the last `n` segments.
    ///
    /// `n` is clamped to `1..=segment_count()`.
    pub fn suffix(&self, n: usize) -> Self {
        let n = n.max(1).min(self.segments.len());
        MailboxName {
            qualified: false,
            segments: self.segments[self.segments.len() - n..].to_vec(),
        }
    }

    /// Return the name one level up, or `None` if this is a top-level name.
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() < 2 {
            None
        } else {
            Some(MailboxName {
                qualified: self.qualified,
                segments: self.segments[..self.segments.len() - 1].to_vec(),
            })
        }
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn segment_at(&self, ix: usize) -> Option<&str> {
        self.segments.get(ix).map(String::as_str)
    }

    pub fn last_segment(&self) -> &str {
        // Construction guarantees at least one segment
        &self.segments[self.segments.len() - 1]
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> + '_ {
        self.segments.iter().map(String::as_str)
    }

    /// Whether `prefix` is this name or one of its ancestors.
    pub fn starts_with(&self, prefix: &MailboxName) -> bool {
        self.strip_prefix(prefix).is_some()
    }

    /// If `prefix` is this name or one of its ancestors, return the segments
    /// of this name below `prefix`.
    pub fn strip_prefix(&self, prefix: &MailboxName) -> Option<&[String]> {
        if self.qualified == prefix.qualified
            && self.segments.starts_with(&prefix.segments)
        {
            Some(&self.segments[prefix.segments.len()..])
        } else {
            None
        }
    }

    /// Replace the `old_prefix` of this name with `new_prefix`.
    ///
    /// Returns `None` if this name is not at or below `old_prefix`.
    pub fn rebase(
        &self,
        old_prefix: &MailboxName,
        new_prefix: &MailboxName,
    ) -> Option<Self> {
        let rest = self.strip_prefix(old_prefix)?;
        let mut segments = new_prefix.segments.clone();
        segments.extend(rest.iter().cloned());
        Some(MailboxName {
            qualified: new_prefix.qualified,
            segments,
        })
    }

    /// Concatenate `relative` below this name.
    pub fn join(&self, relative: &MailboxName) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(relative.segments.iter().cloned());
        MailboxName {
            qualified: self.qualified,
            segments,
        }
    }
}

impl fmt::Display for MailboxName {
    /// Renders the name for diagnostics, with `/` between segments and a
    /// leading `/` on qualified names. This is not a codec and is not
    /// reversible.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (ix, segment) in self.segments.iter().enumerate() {
            if ix > 0 || self.qualified {
                write!(f, "/")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

impl fmt::Debug for MailboxName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "MailboxName({})", self)
    }
}

fn check_segment(segment: &str) -> Result<(), Error> {
    if segment.is_empty() {
        return Err(Error::invalid("empty mailbox name segment"));
    }

    if segment.chars().any(|c| c.is_control()) {
        return Err(Error::invalid(format!(
            "control character in mailbox name segment {:?}",
            segment
        )));
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    fn q(segments: &[&str]) -> MailboxName {
        MailboxName::qualified(segments.iter().copied()).unwrap()
    }

    #[test]
    fn structure() {
        let name = q(&["#user", "alice", "INBOX"]);
        assert_eq!(3, name.segment_count());
        assert_eq!(Some("alice"), name.segment_at(1));
        assert_eq!(None, name.segment_at(3));
        assert_eq!("INBOX", name.last_segment());
        assert_eq!(
            vec!["#user", "alice", "INBOX"],
            name.segments().collect::<Vec<_>>()
        );

        let child = name.child("Archive").unwrap();
        assert_eq!(4, child.segment_count());
        assert_eq!(Some(name.clone()), child.parent());
        assert!(child.starts_with(&name));
        assert!(name.starts_with(&name));
        assert!(!name.starts_with(&child));
        assert_eq!(None, q(&["#user"]).parent());

        assert_eq!(
            MailboxName::relative(vec!["INBOX", "Archive"]).unwrap(),
            child.suffix(2)
        );
        assert_eq!(child.suffix(99).segment_count(), 4);
        assert!(!child.suffix(99).is_qualified());
    }

    #[test]
    fn equality_includes_qualification() {
        assert_ne!(
            MailboxName::relative(vec!["a"]).unwrap(),
            MailboxName::qualified(vec!["a"]).unwrap()
        );
        assert!(!MailboxName::relative(vec!["a", "b"])
            .unwrap()
            .starts_with(&MailboxName::qualified(vec!["a"]).unwrap()));
    }

    #[test]
    fn segments_are_validated() {
        assert_matches!(
            Err(Error::InvalidArgument(..)),
            MailboxName::qualified(Vec::<String>::new())
        );
        assert_matches!(
            Err(Error::InvalidArgument(..)),
            MailboxName::qualified(vec!["a", ""])
        );
        assert_matches!(
            Err(Error::InvalidArgument(..)),
            q(&["a"]).child("b\r\n")
        );
        // Delimiters and wildcards are fine; the codec deals with them
        q(&["a.b", "50%", "*"]);
    }

    #[test]
    fn rebase_and_join() {
        let old = q(&["#user", "alice", "Work"]);
        let new = q(&["#user", "alice", "Archive", "Work"]);
        let child = old.child("2020").unwrap();
        assert_eq!(Some(new.child("2020").unwrap()), child.rebase(&old, &new));
        assert_eq!(None, q(&["#user", "bob"]).rebase(&old, &new));

        let rel = MailboxName::relative(vec!["x", "y"]).unwrap();
        assert_eq!(q(&["#user", "alice", "Work", "x", "y"]), old.join(&rel));
    }

    #[test]
    fn owner_keys() {
        assert_eq!("user:alice", Owner::user("alice").key());
        assert_eq!(
            "virtual:alice@example.com",
            Owner::virtual_user("alice", "Example.COM").key()
        );
        assert_eq!("group:staff", Owner::group("staff").key());
    }
}
