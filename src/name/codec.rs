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

//! Conversion of mailbox names to and from flat backend keys.
//!
//! An encoded name is the segments joined by a separator, with a leading
//! separator on qualified names. The separator is the hierarchy delimiter,
//! except that a `/` delimiter is carried as the first of `.`, `:`, `,` and
//! `;` not otherwise taken. Within a segment, the delimiter, the separator,
//! the escape character, both wildcards, `/`, and ASCII control characters
//! are written as the escape character followed by two lower-case hex
//! digits. An encoded name therefore never contains `/` and is a valid
//! single file name (given that it is never `.` or `..`, which the leading
//! separator or escaping rules out for every name the filesystem backend
//! stores).

use std::fmt::Write as _;

use regex::Regex;

use crate::name::model::MailboxName;
use crate::query::{MailboxQuery, Token, Wildcards};
use crate::support::error::Error;
use crate::support::store_config::NameConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NameCodec {
    delimiter: char,
    separator: char,
    escape: char,
    wildcards: Wildcards,
}

impl Default for NameCodec {
    fn default() -> Self {
        NameCodec {
            delimiter: '.',
            separator: '.',
            escape: '\\',
            wildcards: Wildcards::default(),
        }
    }
}

impl NameCodec {
    pub fn new(
        delimiter: char,
        escape: char,
        wildcards: Wildcards,
    ) -> Result<Self, Error> {
        let specials = [delimiter, escape, wildcards.local, wildcards.free];
        for (ix, &c) in specials.iter().enumerate() {
            if !c.is_ascii() || c.is_ascii_control() || c.is_ascii_hexdigit() {
                return Err(Error::invalid(format!(
                    "{:?} cannot be a structural name character",
                    c
                )));
            }
            if specials[..ix].contains(&c) {
                return Err(Error::invalid(format!(
                    "{:?} used for two structural purposes",
                    c
                )));
            }
        }

        let separator = if '/' == delimiter {
            // At most three of the four candidates are taken
            ['.', ':', ',', ';']
                .iter()
                .copied()
                .find(|c| !specials.contains(c))
                .unwrap_or('.')
        } else {
            delimiter
        };

        Ok(NameCodec {
            delimiter,
            separator,
            escape,
            wildcards,
        })
    }

    pub fn from_config(config: &NameConfig) -> Result<Self, Error> {
        NameCodec::new(
            config.delimiter,
            config.escape,
            Wildcards {
                local: config.local_wildcard,
                free: config.free_wildcard,
            },
        )
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    pub fn wildcards(&self) -> Wildcards {
        self.wildcards
    }

    /// The character joining segments in encoded names.
    pub fn separator(&self) -> char {
        self.separator
    }

    fn is_reserved(&self, c: char) -> bool {
        c == self.delimiter
            || c == self.separator
            || c == self.escape
            || c == self.wildcards.local
            || c == self.wildcards.free
            || c == '/'
            || c.is_ascii_control()
    }

    fn push_escaped(&self, dst: &mut String, c: char) {
        if self.is_reserved(c) {
            dst.push(self.escape);
            // Reserved characters are all ASCII
            let _ = write!(dst, "{:02x}", c as u32);
        } else {
            dst.push(c);
        }
    }

    /// Encode a single segment, without any delimiters.
    pub fn encode_segment(&self, segment: &str) -> String {
        let mut out = String::with_capacity(segment.len());
        for c in segment.chars() {
            self.push_escaped(&mut out, c);
        }
        out
    }

    pub fn encode(&self, name: &MailboxName) -> String {
        let mut out = String::new();
        for (ix, segment) in name.segments().enumerate() {
            if ix > 0 || name.is_qualified() {
                out.push(self.separator);
            }
            for c in segment.chars() {
                self.push_escaped(&mut out, c);
            }
        }
        out
    }

    pub fn decode(&self, encoded: &str) -> Result<MailboxName, Error> {
        let (qualified, body) = if encoded.starts_with(self.separator) {
            (true, &encoded[self.separator.len_utf8()..])
        } else {
            (false, encoded)
        };

        let segments = body
            .split(self.separator)
            .map(|part| self.decode_segment(part))
            .collect::<Result<Vec<_>, Error>>()?;

        if qualified {
            MailboxName::qualified(segments)
        } else {
            MailboxName::relative(segments)
        }
    }

    pub fn decode_segment(&self, encoded: &str) -> Result<String, Error> {
        let mut out = String::with_capacity(encoded.len());
        let mut chars = encoded.chars();
        while let Some(c) = chars.next() {
            if c != self.escape {
                out.push(c);
                continue;
            }

            let hi = chars.next().and_then(|h| h.to_digit(16));
            let lo = chars.next().and_then(|l| l.to_digit(16));
            let code = hi
                .zip(lo)
                .and_then(|(hi, lo)| std::char::from_u32(hi * 16 + lo))
                .filter(|&c| self.is_reserved(c))
                .ok_or_else(|| {
                    Error::invalid(format!(
                        "bad escape sequence in encoded name {:?}",
                        encoded
                    ))
                })?;
            out.push(code);
        }

        Ok(out)
    }
}

/// Turns queries into patterns for a backend's own search facility.
///
/// The output is a regular expression over names encoded by the wrapped
/// codec. It is not a name and cannot be decoded into one.
#[derive(Clone, Copy, Debug, Default)]
pub struct SearchCodec {
    codec: NameCodec,
}

impl SearchCodec {
    pub fn new(codec: NameCodec) -> Self {
        SearchCodec { codec }
    }

    pub fn pattern(&self, query: &MailboxQuery) -> String {
        let delim = regex::escape(&self.codec.separator.to_string());
        let esc = regex::escape(&self.codec.escape.to_string());
        // Wildcards must consume whole escape sequences, or a literal after a
        // wildcard could match the tail of one.
        let local =
            format!("(?:[^{e}{d}]|{e}[0-9a-f]{{2}})*", e = esc, d = delim);
        let free = format!("(?:[^{e}]|{e}[0-9a-f]{{2}})*", e = esc);

        let mut rx = "^".to_owned();
        rx.push_str(&regex::escape(&self.codec.encode(query.base())));

        let tokens = query.tokens();
        if !tokens.is_empty() {
            rx.push_str(&delim);
        }

        let mut literal = String::new();
        for token in tokens {
            let wildcard = match *token {
                Token::Literal(c) => {
                    self.codec.push_escaped(&mut literal, c);
                    continue;
                }
                Token::Delimiter => &delim,
                Token::Local => &local,
                Token::Free => &free,
            };

            rx.push_str(&regex::escape(&literal));
            literal.clear();
            rx.push_str(wildcard);
        }
        rx.push_str(&regex::escape(&literal));
        rx.push('$');
        rx
    }

    pub fn regex(&self, query: &MailboxQuery) -> Result<Regex, Error> {
        Ok(Regex::new(&self.pattern(query))?)
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn q(segments: &[&str]) -> MailboxName {
        MailboxName::qualified(segments.iter().copied()).unwrap()
    }

    #[test]
    fn encode_plain_names() {
        let codec = NameCodec::default();
        assert_eq!(
            ".#user.alice.INBOX",
            codec.encode(&q(&["#user", "alice", "INBOX"]))
        );
        assert_eq!(
            "INBOX.sub",
            codec.encode(&MailboxName::relative(vec!["INBOX", "sub"]).unwrap())
        );
    }

    #[test]
    fn encode_escapes_structural_characters() {
        let codec = NameCodec::default();
        let name = q(&["a.b", "50%", "x*y", "back\\slash", "a/b"]);
        let encoded = codec.encode(&name);
        assert_eq!(
            ".a\\2eb.50\\25.x\\2ay.back\\5cslash.a\\2fb",
            encoded
        );
        assert_eq!(name, codec.decode(&encoded).unwrap());
    }

    #[test]
    fn slash_delimiter_uses_another_separator() {
        let codec = NameCodec::new('/', '\\', Wildcards::default()).unwrap();
        assert_eq!('.', codec.separator());
        let name = q(&["#user", "alice", "a.b/c"]);
        let encoded = codec.encode(&name);
        assert_eq!(".#user.alice.a\\2eb\\2fc", encoded);
        assert_eq!(name, codec.decode(&encoded).unwrap());

        let codec = NameCodec::new('/', '.', Wildcards::default()).unwrap();
        assert_eq!(':', codec.separator());
        assert_eq!(":#user:alice", codec.encode(&q(&["#user", "alice"])));

        let search = SearchCodec::new(
            NameCodec::new('/', '\\', Wildcards::default()).unwrap(),
        );
        let rx = search
            .regex(&MailboxQuery::new(q(&["#user"]), "%/a*", '/').unwrap())
            .unwrap();
        assert!(rx.is_match(".#user.alice.ab"));
        assert!(rx.is_match(".#user.alice.a\\2ex"));
        assert!(!rx.is_match(".#user.alice"));
    }

    #[test]
    fn decode_rejects_garbage() {
        let codec = NameCodec::default();
        assert_matches!(Err(Error::InvalidArgument(..)), codec.decode(""));
        assert_matches!(Err(Error::InvalidArgument(..)), codec.decode("."));
        assert_matches!(Err(Error::InvalidArgument(..)), codec.decode("a..b"));
        assert_matches!(Err(Error::InvalidArgument(..)), codec.decode("a\\"));
        assert_matches!(Err(Error::InvalidArgument(..)), codec.decode("a\\2"));
        assert_matches!(Err(Error::InvalidArgument(..)), codec.decode("a\\zz"));
        // Escapes of characters which never need escaping are not canonical
        assert_matches!(Err(Error::InvalidArgument(..)), codec.decode("a\\41"));
    }

    #[test]
    fn codec_characters_must_be_distinct() {
        assert_matches!(
            Err(Error::InvalidArgument(..)),
            NameCodec::new('.', '.', Wildcards::default())
        );
        assert_matches!(
            Err(Error::InvalidArgument(..)),
            NameCodec::new('%', '\\', Wildcards::default())
        );
        assert_matches!(
            Err(Error::InvalidArgument(..)),
            NameCodec::new('.', 'a', Wildcards::default())
        );
        NameCodec::new('/', '~', Wildcards::default()).unwrap();
    }

    #[test]
    fn search_pattern_filters_encoded_names() {
        let codec = NameCodec::default();
        let search = SearchCodec::new(codec);
        let base = q(&["#user", "alice", "INBOX"]);
        let encoded = |segments: &[&str]| {
            codec.encode(&base.join(
                &MailboxName::relative(segments.iter().copied()).unwrap(),
            ))
        };

        let rx = search
            .regex(&MailboxQuery::new(base.clone(), "", '.').unwrap())
            .unwrap();
        assert!(rx.is_match(&codec.encode(&base)));
        assert!(!rx.is_match(&encoded(&["sub"])));

        let rx = search
            .regex(&MailboxQuery::new(base.clone(), "a%.b*", '.').unwrap())
            .unwrap();
        assert!(rx.is_match(&encoded(&["a", "b"])));
        assert!(rx.is_match(&encoded(&["ax.y", "bz", "c"])));
        assert!(!rx.is_match(&encoded(&["a", "x", "b"])));
        assert!(!rx.is_match(&codec.encode(&base)));

        // A literal after a wildcard must not match inside an escape
        let rx = search
            .regex(&MailboxQuery::new(base.clone(), "%a", '.').unwrap())
            .unwrap();
        assert!(!rx.is_match(&encoded(&["a*"])));
        assert!(rx.is_match(&encoded(&["*a"])));
    }

    fn arb_segment() -> impl Strategy<Value = String> {
        "[^\\x00-\\x1f\\x7f-\\x9f]{1,8}"
    }

    proptest! {
        #[test]
        fn codec_round_trip(
            qualified in any::<bool>(),
            segments in prop::collection::vec(arb_segment(), 1..5),
            delimiter in prop::sample::select(vec!['.', '/', ':']),
        ) {
            let codec = NameCodec::new(
                delimiter, '\\', Wildcards::default()).unwrap();
            let name = if qualified {
                MailboxName::qualified(segments)
            } else {
                MailboxName::relative(segments)
            }.unwrap();

            let encoded = codec.encode(&name);
            prop_assert!(!encoded.contains('/'));
            prop_assert_eq!(name, codec.decode(&encoded).unwrap());
        }

        #[test]
        fn search_codec_agrees_with_matcher(
            base_len in 1usize..3,
            candidate in prop::collection::vec("[ab.%*]{1,3}", 1..5),
            expression in "[ab.%*]{0,6}",
        ) {
            let codec = NameCodec::default();
            let search = SearchCodec::new(codec);
            let name = MailboxName::qualified(candidate.clone()).unwrap();
            let base = MailboxName::qualified(
                candidate.into_iter().take(base_len)).unwrap();
            let query = MailboxQuery::new(base, expression, '.').unwrap();

            prop_assert_eq!(
                query.matches(&name),
                search.regex(&query).unwrap().is_match(&codec.encode(&name)),
                "pattern {}", search.pattern(&query)
            );
        }
    }
}
