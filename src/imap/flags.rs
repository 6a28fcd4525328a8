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

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::str::FromStr;

use lazy_static::lazy_static;

use super::lex;
use super::parser::Parser;
use super::response_writer::ContinuationSink;
use crate::support::error::Error;

/// A message flag.
///
/// System flags are represented as top-level enum values. Keywords are in the
/// `Keyword` case.
///
/// The `Display` format of this type is the exact string value that would be
/// sent over the wire. `FromStr` does the reverse conversion, and also
/// understands non-standard casing of the system flags.
#[derive(Clone)]
pub enum Flag {
    Answered,
    Deleted,
    Draft,
    Flagged,
    Seen,
    Recent,
    Keyword(String),
}

lazy_static! {
    /// The flags a client may name in a flag list, keyed by their upper-case
    /// spelling.
    static ref KNOWN_FLAGS: HashMap<&'static str, Flag> = {
        let mut m = HashMap::new();
        m.insert("\\ANSWERED", Flag::Answered);
        m.insert("\\FLAGGED", Flag::Flagged);
        m.insert("\\DELETED", Flag::Deleted);
        m.insert("\\SEEN", Flag::Seen);
        m.insert("\\DRAFT", Flag::Draft);
        m.insert("\\RECENT", Flag::Recent);
        m.insert("$MDNSENT", Flag::Keyword("$MDNSent".to_owned()));
        m.insert("$FORWARDED", Flag::Keyword("$Forwarded".to_owned()));
        m.insert(
            "$SUBMITPENDING",
            Flag::Keyword("$SubmitPending".to_owned()),
        );
        m.insert("$SUBMITTED", Flag::Keyword("$Submitted".to_owned()));
        m
    };
}

impl Flag {
    /// Look `name` up in the table of flags clients may set.
    pub fn known(name: &str) -> Option<Flag> {
        KNOWN_FLAGS.get(name.to_ascii_uppercase().as_str()).cloned()
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            &Flag::Answered => write!(f, "\\Answered"),
            &Flag::Deleted => write!(f, "\\Deleted"),
            &Flag::Draft => write!(f, "\\Draft"),
            &Flag::Flagged => write!(f, "\\Flagged"),
            &Flag::Seen => write!(f, "\\Seen"),
            &Flag::Recent => write!(f, "\\Recent"),
            &Flag::Keyword(ref kw) => write!(f, "{}", kw),
        }
    }
}

impl fmt::Debug for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        <Flag as fmt::Display>::fmt(self, f)
    }
}

impl FromStr for Flag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        if s.eq_ignore_ascii_case("\\answered") {
            Ok(Flag::Answered)
        } else if s.eq_ignore_ascii_case("\\deleted") {
            Ok(Flag::Deleted)
        } else if s.eq_ignore_ascii_case("\\draft") {
            Ok(Flag::Draft)
        } else if s.eq_ignore_ascii_case("\\flagged") {
            Ok(Flag::Flagged)
        } else if s.eq_ignore_ascii_case("\\seen") {
            Ok(Flag::Seen)
        } else if s.eq_ignore_ascii_case("\\recent") {
            Ok(Flag::Recent)
        } else if !s.is_empty()
            && s.bytes().all(|b| !lex::is_atom_special(b, &[]))
        {
            Ok(Flag::Keyword(s.to_owned()))
        } else {
            Err(Error::UnknownFlag(s.to_owned()))
        }
    }
}

impl PartialEq for Flag {
    fn eq(&self, other: &Flag) -> bool {
        match (self, other) {
            (&Flag::Answered, &Flag::Answered) => true,
            (&Flag::Deleted, &Flag::Deleted) => true,
            (&Flag::Draft, &Flag::Draft) => true,
            (&Flag::Flagged, &Flag::Flagged) => true,
            (&Flag::Seen, &Flag::Seen) => true,
            (&Flag::Recent, &Flag::Recent) => true,
            // Keywords are expected to be case-insensitive, though only ASCII
            // case is folded.
            (&Flag::Keyword(ref a), &Flag::Keyword(ref b)) => {
                a.eq_ignore_ascii_case(b)
            },
            _ => false,
        }
    }
}

impl Eq for Flag {}

impl<R: Read, W: ContinuationSink> Parser<R, W> {
    /// Read a parenthesised list of flags, all of which must be known.
    pub fn read_flag_list(&mut self) -> Result<Vec<Flag>, Error> {
        let atoms = self.read_atom_list();
        let mut flags = Vec::with_capacity(atoms.len());
        if self.is_valid() {
            for atom in atoms {
                match Flag::known(&atom) {
                    Some(flag) => flags.push(flag),
                    None => {
                        self.fail(Error::UnknownFlag(atom));
                        break;
                    },
                }
            }
        }

        self.finish(flags)
    }
}
