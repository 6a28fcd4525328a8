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

//! The `SEARCH` query grammar.
//!
//! This deviates from RFC 3501 in a couple of ways which have been found to
//! matter little in practice:
//!
//! - `BODY` and `TEXT` are separate fields, but nothing here distinguishes how
//!   they are searched.
//! - `OR` with `ALL` on either side is simplified to the other side, so
//!   `OR ALL X` is exactly `X`.

use std::fmt;
use std::io::Read;

use chrono::prelude::*;

use super::flags::Flag;
use super::parser::Parser;
use super::response_writer::ContinuationSink;
use super::sequence_set::SequenceSet;
use crate::support::error::Error;

/// The charset assumed when the client does not name one.
pub const DEFAULT_CHARSET: &str = "us-ascii";

/// How deeply `NOT`, `OR` and parenthesised groups may nest.
pub const MAX_SEARCH_DEPTH: u32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    And,
    Or,
    Not,
    Equals,
    Lt,
    Gte,
    Contains,
    In,
}

/// What part of a message a term looks at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Field {
    From,
    To,
    Cc,
    Bcc,
    Subject,
    Body,
    Text,
    /// An arbitrary header, by name.
    Header(String),
    Msn,
    Uid,
    Size,
    Date,
    InternalDate,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Field::From => write!(f, "From"),
            Field::To => write!(f, "To"),
            Field::Cc => write!(f, "Cc"),
            Field::Bcc => write!(f, "Bcc"),
            Field::Subject => write!(f, "Subject"),
            Field::Body => write!(f, "Body"),
            Field::Text => write!(f, "Text"),
            Field::Header(ref name) => write!(f, "header.{}", name),
            Field::Msn => write!(f, "MSN"),
            Field::Uid => write!(f, "UID"),
            Field::Size => write!(f, "Size"),
            Field::Date => write!(f, "Date"),
            Field::InternalDate => write!(f, "InternalDate"),
        }
    }
}

/// A node of a search query.
///
/// `Boolean` and `Unary` are the only nodes with children.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Term {
    /// Matches every message.
    All,
    Boolean {
        op: Op,
        terms: Vec<Term>,
    },
    Unary {
        op: Op,
        term: Box<Term>,
    },
    Flag {
        flag: Flag,
        present: bool,
    },
    String {
        op: Op,
        field: Field,
        value: String,
    },
    Int {
        op: Op,
        field: Field,
        value: u32,
    },
    Set {
        op: Op,
        field: Field,
        set: SequenceSet,
    },
    Date {
        op: Op,
        field: Field,
        date: NaiveDate,
    },
}

impl Term {
    pub fn is_all(&self) -> bool {
        matches!(*self, Term::All)
    }

    fn and(mut terms: Vec<Term>) -> Term {
        if 1 == terms.len() {
            terms.pop().unwrap_or(Term::All)
        } else {
            Term::Boolean {
                op: Op::And,
                terms,
            }
        }
    }

    fn flag(flag: Flag, present: bool) -> Term {
        Term::Flag { flag, present }
    }
}

/// The search keywords, in the order they are tried.
static SEARCH_KEYS: &[&str] = &[
    "ALL",
    "ANSWERED",
    "BCC",
    "BEFORE",
    "BODY",
    "CC",
    "DELETED",
    "FLAGGED",
    "FROM",
    "KEYWORD",
    "NEW",
    "OLD",
    "ON",
    "RECENT",
    "SEEN",
    "SINCE",
    "SUBJECT",
    "TEXT",
    "TO",
    "UNANSWERED",
    "UNDELETED",
    "UNFLAGGED",
    "UNKEYWORD",
    "UNSEEN",
    "DRAFT",
    "HEADER",
    "LARGER",
    "NOT",
    "OR",
    "SENTBEFORE",
    "SENTON",
    "SENTSINCE",
    "SMALLER",
    "UID",
    "UNDRAFT",
];

impl<R: Read, W: ContinuationSink> Parser<R, W> {
    /// Read the arguments of a `SEARCH` command, starting with the space
    /// after the command name.
    ///
    /// Returns the charset and the query. Multiple top-level keys are combined
    /// with `AND`.
    pub fn read_search(&mut self) -> Result<(String, Term), Error> {
        let mut charset = DEFAULT_CHARSET.to_owned();
        self.read_space();
        if self.accept_keyword("CHARSET") {
            self.read_space();
            charset = self.read_string();
            self.read_space();
        }

        let mut terms = vec![self.read_search_key()];
        while self.accept(" ") {
            terms.push(self.read_search_key());
        }

        self.finish((charset, Term::and(terms)))
    }

    /// Like `accept()`, but only matches if `keyword` is followed by the end
    /// of the token.
    fn accept_keyword(&mut self, keyword: &str) -> bool {
        if !self.is_valid() {
            return false;
        }

        // peek() makes sure a line is loaded; an empty one matches nothing.
        if 0 == self.peek() {
            self.clear_mismatch();
            return false;
        }

        let tail = self.tail();
        let len = keyword.len();
        let matches = tail.len() >= len
            && tail[..len].eq_ignore_ascii_case(keyword.as_bytes())
            && tail
                .get(len)
                .map_or(true, |&b| matches!(b, b' ' | b'\r' | b'(' | b')'));

        matches && self.accept(keyword)
    }

    /// Read one `search-key`.
    ///
    /// Keys nested more than `MAX_SEARCH_DEPTH` deep are rejected with
    /// `InvalidSearchKey`.
    pub fn read_search_key(&mut self) -> Term {
        if !self.is_valid()
            || !self.enter_nested(MAX_SEARCH_DEPTH, Error::InvalidSearchKey)
        {
            return Term::All;
        }

        let term = self.read_search_key_at_depth();
        self.leave_nested();
        term
    }

    fn read_search_key_at_depth(&mut self) -> Term {
        if b'(' == self.peek() {
            return self.read_search_group();
        }

        let keyword = SEARCH_KEYS
            .iter()
            .copied()
            .find(|keyword| self.accept_keyword(keyword));
        if !self.is_valid() {
            return Term::All;
        }

        let Some(keyword) = keyword else {
            return self.read_msn_search_key();
        };

        match keyword {
            "ALL" => Term::All,
            "ANSWERED" => Term::flag(Flag::Answered, true),
            "BCC" => self.read_string_term(Field::Bcc),
            "BEFORE" => self.read_date_term(Op::Lt, Field::InternalDate),
            "BODY" => {
                self.read_space();
                let value = self.read_string();
                Term::String {
                    op: Op::Contains,
                    field: Field::Body,
                    value,
                }
            },
            "CC" => self.read_string_term(Field::Cc),
            "DELETED" => Term::flag(Flag::Deleted, true),
            "FLAGGED" => Term::flag(Flag::Flagged, true),
            "FROM" => self.read_string_term(Field::From),
            "KEYWORD" => self.read_keyword_term(true),
            "NEW" => Term::and(vec![
                Term::flag(Flag::Recent, true),
                Term::flag(Flag::Seen, false),
            ]),
            "OLD" => Term::flag(Flag::Recent, false),
            "ON" => self.read_date_term(Op::Equals, Field::InternalDate),
            "RECENT" => Term::flag(Flag::Recent, true),
            "SEEN" => Term::flag(Flag::Seen, true),
            "SINCE" => self.read_date_term(Op::Gte, Field::InternalDate),
            "SUBJECT" => self.read_string_term(Field::Subject),
            "TEXT" => self.read_string_term(Field::Text),
            "TO" => self.read_string_term(Field::To),
            "UNANSWERED" => Term::flag(Flag::Answered, false),
            "UNDELETED" => Term::flag(Flag::Deleted, false),
            "UNFLAGGED" => Term::flag(Flag::Flagged, false),
            "UNKEYWORD" => self.read_keyword_term(false),
            "UNSEEN" => Term::flag(Flag::Seen, false),
            "DRAFT" => Term::flag(Flag::Draft, true),
            "HEADER" => {
                self.read_space();
                let name = self.read_astring();
                self.read_space();
                let value = self.read_string();
                Term::String {
                    op: Op::Contains,
                    field: Field::Header(name),
                    value,
                }
            },
            "LARGER" => self.read_int_term(Op::Gte, Field::Size),
            "NOT" => {
                self.read_space();
                Term::Unary {
                    op: Op::Not,
                    term: Box::new(self.read_search_key()),
                }
            },
            "OR" => {
                self.read_space();
                let a = self.read_search_key();
                self.read_space();
                let b = self.read_search_key();

                if a.is_all() {
                    b
                } else if b.is_all() {
                    a
                } else {
                    Term::Boolean {
                        op: Op::Or,
                        terms: vec![a, b],
                    }
                }
            },
            "SENTBEFORE" => self.read_date_term(Op::Lt, Field::Date),
            "SENTON" => self.read_date_term(Op::Equals, Field::Date),
            "SENTSINCE" => self.read_date_term(Op::Gte, Field::Date),
            "SMALLER" => self.read_int_term(Op::Lt, Field::Size),
            "UID" => {
                self.read_space();
                let set = self.read_sequence_set();
                Term::Set {
                    op: Op::In,
                    field: Field::Uid,
                    set,
                }
            },
            "UNDRAFT" => Term::flag(Flag::Draft, false),
            _ => {
                self.fail(Error::InvalidSearchKey);
                Term::All
            },
        }
    }

    /// A parenthesised group of keys, implicitly combined with `AND`.
    fn read_search_group(&mut self) -> Term {
        self.read_list_start();
        let mut terms = vec![self.read_search_key()];
        while self.accept(" ") {
            terms.push(self.read_search_key());
        }
        self.read_list_end();

        Term::and(terms)
    }

    /// The fallback when no keyword matches: a bare sequence set of message
    /// sequence numbers.
    fn read_msn_search_key(&mut self) -> Term {
        let set = self.read_sequence_set();
        if !self.is_valid() {
            self.replace_error(Error::InvalidSearchKey);
            return Term::All;
        }

        Term::Set {
            op: Op::In,
            field: Field::Msn,
            set,
        }
    }

    fn read_string_term(&mut self, field: Field) -> Term {
        self.read_space();
        let value = self.read_astring();
        Term::String {
            op: Op::Contains,
            field,
            value,
        }
    }

    fn read_date_term(&mut self, op: Op, field: Field) -> Term {
        self.read_space();
        match self.read_date() {
            Some(date) => Term::Date { op, field, date },
            None => Term::All,
        }
    }

    fn read_int_term(&mut self, op: Op, field: Field) -> Term {
        self.read_space();
        let value = self.read_number();
        Term::Int { op, field, value }
    }

    fn read_keyword_term(&mut self, present: bool) -> Term {
        self.read_space();
        let keyword = self.read_raw_atom(&[]);
        if !self.is_valid() {
            return Term::All;
        }

        match keyword.parse::<Flag>() {
            Ok(flag) => Term::flag(flag, present),
            Err(e) => {
                self.fail(e);
                Term::All
            },
        }
    }
}
