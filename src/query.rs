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

//! Wildcard queries over mailbox names, as used by `LIST`.
//!
//! A query is a base name plus an expression relative to it. The expression
//! is split on the delimiter into hierarchy levels; empty levels are dropped,
//! so `a..b`, `.a.b` and `a.b.` all mean `a.b`. Within the expression, the
//! local wildcard (`%`) matches any run of characters within one level and
//! the free wildcard (`*`) matches any run of characters including
//! delimiters.
//!
//! An empty expression matches the base name and nothing else. A non-empty
//! expression only ever matches names strictly below the base, so `*` does
//! not match the base itself.
//!
//! Candidates are not compared as flat strings. Each name below the base is
//! flattened into a sequence of units, each either a character or a
//! delimiter, so a stored segment which happens to contain the delimiter
//! character is still a single level. Matching is a dynamic program over the
//! pattern and the units, which keeps patterns like `*a*a*a*b` from going
//! exponential.

use crate::name::model::MailboxName;
use crate::support::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Wildcards {
    pub local: char,
    pub free: char,
}

impl Default for Wildcards {
    fn default() -> Self {
        Wildcards {
            local: '%',
            free: '*',
        }
    }
}

/// One element of a compiled expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token {
    Literal(char),
    Delimiter,
    Local,
    Free,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Unit {
    Char(char),
    Delimiter,
}

#[derive(Clone, Debug)]
pub struct MailboxQuery {
    base: MailboxName,
    expression: String,
    tokens: Vec<Token>,
}

impl MailboxQuery {
    /// Create a query using the default wildcards.
    pub fn new(
        base: MailboxName,
        expression: impl Into<String>,
        delimiter: char,
    ) -> Result<Self, Error> {
        MailboxQuery::with_wildcards(
            base,
            expression,
            delimiter,
            Wildcards::default(),
        )
    }

    pub fn with_wildcards(
        base: MailboxName,
        expression: impl Into<String>,
        delimiter: char,
        wildcards: Wildcards,
    ) -> Result<Self, Error> {
        let expression = expression.into();

        if delimiter == wildcards.local
            || delimiter == wildcards.free
            || wildcards.local == wildcards.free
        {
            return Err(Error::invalid(format!(
                "delimiter {:?} and wildcards {:?} overlap",
                delimiter, wildcards
            )));
        }

        if expression.chars().any(char::is_control) {
            return Err(Error::invalid(format!(
                "control character in pattern {:?}",
                expression
            )));
        }

        let tokens = compile(&expression, delimiter, wildcards);
        Ok(MailboxQuery {
            base,
            expression,
            tokens,
        })
    }

    /// A query matching every inferior of `base`, at any depth.
    pub fn children_of(base: MailboxName) -> Self {
        MailboxQuery {
            base,
            expression: Wildcards::default().free.to_string(),
            tokens: vec![Token::Free],
        }
    }

    pub fn base(&self) -> &MailboxName {
        &self.base
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// If this query contains no wildcards, return the only name it can
    /// match.
    pub fn exact_name(&self) -> Option<MailboxName> {
        let mut name = self.base.clone();
        let mut segment = String::new();
        for token in &self.tokens {
            match *token {
                Token::Literal(c) => segment.push(c),
                Token::Delimiter => {
                    name = name.child(std::mem::take(&mut segment)).ok()?;
                }
                Token::Local | Token::Free => return None,
            }
        }

        if !segment.is_empty() {
            name = name.child(segment).ok()?;
        }
        Some(name)
    }

    pub fn matches(&self, candidate: &MailboxName) -> bool {
        let rest = match candidate.strip_prefix(&self.base) {
            Some(rest) => rest,
            None => return false,
        };

        if self.tokens.is_empty() || rest.is_empty() {
            return self.tokens.is_empty() && rest.is_empty();
        }

        let mut units = Vec::new();
        for (ix, segment) in rest.iter().enumerate() {
            if ix > 0 {
                units.push(Unit::Delimiter);
            }
            units.extend(segment.chars().map(Unit::Char));
        }

        match_units(&self.tokens, &units)
    }
}

fn compile(
    expression: &str,
    delimiter: char,
    wildcards: Wildcards,
) -> Vec<Token> {
    let mut tokens = Vec::new();
    for level in expression.split(delimiter).filter(|l| !l.is_empty()) {
        if !tokens.is_empty() {
            tokens.push(Token::Delimiter);
        }

        for c in level.chars() {
            let token = if c == wildcards.free {
                Token::Free
            } else if c == wildcards.local {
                Token::Local
            } else {
                Token::Literal(c)
            };

            // A run of free wildcards means the same as one
            if Token::Free == token && Some(&Token::Free) == tokens.last() {
                continue;
            }
            tokens.push(token);
        }
    }
    tokens
}

fn match_units(tokens: &[Token], text: &[Unit]) -> bool {
    // prev[j] is whether the tokens processed so far match text[..j]
    let mut prev = vec![false; text.len() + 1];
    let mut cur = vec![false; text.len() + 1];
    prev[0] = true;

    for token in tokens {
        match *token {
            Token::Free => {
                cur[0] = prev[0];
                for j in 1..=text.len() {
                    cur[j] = prev[j] || cur[j - 1];
                }
            }
            Token::Local => {
                cur[0] = prev[0];
                for j in 1..=text.len() {
                    cur[j] = prev[j]
                        || (cur[j - 1] && Unit::Delimiter != text[j - 1]);
                }
            }
            Token::Literal(c) => {
                cur[0] = false;
                for j in 1..=text.len() {
                    cur[j] = prev[j - 1] && Unit::Char(c) == text[j - 1];
                }
            }
            Token::Delimiter => {
                cur[0] = false;
                for j in 1..=text.len() {
                    cur[j] = prev[j - 1] && Unit::Delimiter == text[j - 1];
                }
            }
        }

        std::mem::swap(&mut prev, &mut cur);
    }

    prev[text.len()]
}
