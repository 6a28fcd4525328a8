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

//! Whole-line tests which drive the parser the way a command dispatcher
//! would, over a mock connection.
//!
//! The mock client behaves like a real one with respect to synchronising
//! literals: a chunk of input marked as a literal payload is only delivered
//! once the continuation line for it has been flushed. Reading it any earlier
//! fails, which is how a real server would deadlock.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;

use chrono::prelude::*;

use super::fetch::{FetchAttribute, SectionMode, SimpleAttribute};
use super::flags::Flag;
use super::parser::{date, date_time, Parser};
use super::request::Request;
use super::search::{Field, Op, Term};
use super::sequence_set::SequenceSet;
use crate::support::config::ParserConfig;
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Event {
    /// Bytes the server read from the client.
    Received(String),
    /// A flushed write from the server to the client.
    Sent(String),
}

type EventLog = Rc<RefCell<Vec<Event>>>;

fn prompts_sent(log: &EventLog) -> usize {
    log.borrow()
        .iter()
        .filter(|e| matches!(e, Event::Sent(s) if s.starts_with("+ ")))
        .count()
}

struct Chunk {
    data: Vec<u8>,
    /// How many continuation lines the client must have seen before it
    /// sends this chunk.
    prompts_needed: usize,
}

struct MockInput {
    chunks: VecDeque<Chunk>,
    log: EventLog,
}

impl Read for MockInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(chunk) = self.chunks.front_mut() else {
            return Ok(0);
        };

        if prompts_sent(&self.log) < chunk.prompts_needed {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "client is waiting for a continuation line",
            ));
        }

        let n = buf.len().min(chunk.data.len());
        buf[..n].copy_from_slice(&chunk.data[..n]);
        let received = chunk.data.drain(..n).collect::<Vec<u8>>();
        if chunk.data.is_empty() {
            self.chunks.pop_front();
        }

        self.log.borrow_mut().push(Event::Received(
            String::from_utf8_lossy(&received).into_owned(),
        ));
        Ok(n)
    }
}

struct MockOutput {
    pending: Vec<u8>,
    log: EventLog,
}

impl Write for MockOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            let sent = std::mem::take(&mut self.pending);
            self.log.borrow_mut().push(Event::Sent(
                String::from_utf8_lossy(&sent).into_owned(),
            ));
        }
        Ok(())
    }
}

type MockParser = Parser<MockInput, MockOutput>;

/// Set up a connection where the client sends `chunks` in order. Each chunk
/// is paired with the number of continuation lines it waits for.
fn connect_with_config(
    chunks: &[(usize, &[u8])],
    config: ParserConfig,
) -> (MockParser, EventLog) {
    crate::init_test_log();

    let log = EventLog::default();
    let input = MockInput {
        chunks: chunks
            .iter()
            .map(|&(prompts_needed, data)| Chunk {
                data: data.to_vec(),
                prompts_needed,
            })
            .collect(),
        log: Rc::clone(&log),
    };
    let output = MockOutput {
        pending: Vec::new(),
        log: Rc::clone(&log),
    };

    let mut log_prefix = LogPrefix::new("imap".to_owned());
    log_prefix.set_peer("192.0.2.1".to_owned());
    (Parser::new(input, output, config, log_prefix), log)
}

fn connect(chunks: &[(usize, &[u8])]) -> (MockParser, EventLog) {
    connect_with_config(chunks, ParserConfig::default())
}

/// What the dispatcher made of one request.
#[derive(Debug, PartialEq)]
enum Command {
    Noop,
    Search(String, Term),
    Fetch(SequenceSet, Vec<FetchAttribute>),
    Store(SequenceSet, String, Vec<Flag>),
    Append(String, Vec<Flag>, Option<DateTime<FixedOffset>>, Vec<u8>),
    List(String, String),
}

/// Parse the rest of a request once its command is known.
fn dispatch(p: &mut MockParser, request: &Request) -> Result<Command, Error> {
    let command = match request.command.as_str() {
        "NOOP" => Command::Noop,

        "SEARCH" => {
            let (charset, query) = p.read_search()?;
            Command::Search(charset, query)
        },

        "FETCH" => {
            p.read_space();
            let set = p.read_sequence_set();
            p.read_space();
            let attributes = p.read_fetch_attributes()?;
            Command::Fetch(set, attributes)
        },

        "STORE" => {
            p.read_space();
            let set = p.read_sequence_set();
            p.read_space();
            let action = p.read_atom();
            p.read_space();
            let flags = p.read_flag_list()?;
            Command::Store(set, action, flags)
        },

        "APPEND" => {
            p.read_space();
            let mailbox = p.read_astring();
            p.read_space();

            let mut flags = Vec::new();
            if b'(' == p.peek() {
                flags = p.read_flag_list()?;
                p.read_space();
            }

            let mut internal_date = None;
            if b'"' == p.peek() {
                internal_date = p.read_date_time();
                p.read_space();
            }

            let mut data = Vec::new();
            if let Some(mut literal) = p.read_literal_stream() {
                literal.read_to_end(&mut data)?;
            }

            Command::Append(mailbox, flags, internal_date, data)
        },

        "LIST" => {
            p.read_space();
            let reference = p.read_astring();
            p.read_space();
            let pattern = p.read_list_mailbox();
            Command::List(reference, pattern)
        },

        _ => return Err(Error::UnknownField(request.command.clone())),
    };

    p.read_eol();
    p.finish(command)
}

/// Read and dispatch one request, discarding it if it is rejected.
fn next_command(p: &mut MockParser) -> Result<(String, Command), Error> {
    let result = p
        .read_request()
        .and_then(|request| Ok((request.tag.clone(), dispatch(p, &request)?)));
    if result.is_err() {
        p.discard_line();
    }
    result
}

fn set(raw: &str) -> SequenceSet {
    SequenceSet::parse(raw).unwrap()
}

#[test]
fn synchronising_literal_waits_for_prompt() {
    let (mut p, log) = connect(&[
        (
            0,
            b"A1 APPEND saved-messages (\\Seen) \
              \"07-Feb-1994 21:52:25 -0800\" {11}\r\n",
        ),
        (1, b"Hello World\r\n"),
    ]);

    let (tag, command) = next_command(&mut p).unwrap();
    assert_eq!("A1", tag);
    assert_eq!(
        Command::Append(
            "saved-messages".to_owned(),
            vec![Flag::Seen],
            Some(date_time(-8 * 3600, 1994, 2, 7, 21, 52, 25)),
            b"Hello World".to_vec(),
        ),
        command
    );

    let log = log.borrow();
    let prompt_ix = log
        .iter()
        .position(|e| Event::Sent("+ ready\r\n".to_owned()) == *e)
        .unwrap();
    let literal_ix = log
        .iter()
        .position(|e| matches!(e, Event::Received(s) if s.starts_with("Hello")))
        .unwrap();
    assert!(prompt_ix < literal_ix);
    assert_eq!(
        Event::Received("Hello World".to_owned()),
        log[literal_ix]
    );
}

#[test]
fn non_synchronising_literal_sends_nothing() {
    let (mut p, log) = connect(&[(0, b"A2 APPEND INBOX {3+}\r\nabc\r\n")]);

    let (_, command) = next_command(&mut p).unwrap();
    assert_eq!(
        Command::Append("INBOX".to_owned(), vec![], None, b"abc".to_vec()),
        command
    );
    assert_eq!(0, prompts_sent(&log));
}

#[test]
fn pipelined_commands() {
    let (mut p, log) = connect(&[
        (0, b"s1 SEARCH FLAGGED SINCE 1-Feb-1994 NOT FROM \"Smith\"\r\n"),
        (0, b"f1 FETCH 2:4,* (FLAGS BODY.PEEK[HEADER.FIELDS (DATE FROM)])\r\n"),
        (0, b"f2 fetch 1 FAST\r\nw1 STORE 1:* +FLAGS (\\Deleted)\r\n"),
        (0, b"l1 LIST \"\" INBOX/*\r\nn1 NOOP\r\n"),
    ]);

    let (tag, command) = next_command(&mut p).unwrap();
    assert_eq!("s1", tag);
    match command {
        Command::Search(charset, Term::Boolean { op: Op::And, terms }) => {
            assert_eq!("us-ascii", charset);
            assert_eq!(3, terms.len());
            assert_eq!(
                Term::Date {
                    op: Op::Gte,
                    field: Field::InternalDate,
                    date: date(1994, 2, 1),
                },
                terms[1]
            );
        },
        command => panic!("unexpected command: {:?}", command),
    }

    let (_, command) = next_command(&mut p).unwrap();
    match command {
        Command::Fetch(set, attributes) => {
            assert_eq!(vec![2, 3, 4, 9], set.items(9).collect::<Vec<_>>());
            assert_eq!(2, attributes.len());
            assert_matches!(
                FetchAttribute::Body(section)
                    if section.peek
                        && SectionMode::HeaderFields == section.mode
                        && vec!["DATE", "FROM"] == section.header_list,
                &attributes[1]
            );
        },
        command => panic!("unexpected command: {:?}", command),
    }

    let (_, command) = next_command(&mut p).unwrap();
    assert_eq!(
        Command::Fetch(
            set("1"),
            vec![
                FetchAttribute::Simple(SimpleAttribute::Flags),
                FetchAttribute::Simple(SimpleAttribute::InternalDate),
                FetchAttribute::Simple(SimpleAttribute::Rfc822Size),
            ]
        ),
        command
    );

    let (_, command) = next_command(&mut p).unwrap();
    assert_eq!(
        Command::Store(set("1:*"), "+FLAGS".to_owned(), vec![Flag::Deleted]),
        command
    );

    let (_, command) = next_command(&mut p).unwrap();
    assert_eq!(
        Command::List(String::new(), "INBOX/*".to_owned()),
        command
    );

    let (tag, command) = next_command(&mut p).unwrap();
    assert_eq!("n1", tag);
    assert_eq!(Command::Noop, command);

    assert_eq!(0, prompts_sent(&log));
}

#[test]
fn rejected_request_does_not_desynchronise() {
    let (mut p, _) = connect(&[
        (0, b"a1 SEARCH TOKEN foo\r\n"),
        (0, b"a2 FETCH 1 BODY[MIME]\r\n"),
        (0, b"a3 STORE 1 FLAGS (\\Bogus)\r\n"),
        (0, b"a4 FETCH 0 FLAGS\r\n"),
        (0, b"a5 NOOP\r\n"),
    ]);

    assert_matches!(Err(Error::InvalidSearchKey), next_command(&mut p));
    assert_matches!(Err(Error::InvalidPartSpecifier), next_command(&mut p));
    assert_matches!(Err(Error::UnknownFlag(..)), next_command(&mut p));
    assert_matches!(Err(Error::SeqNoOutOfBounds), next_command(&mut p));

    let (tag, command) = next_command(&mut p).unwrap();
    assert_eq!("a5", tag);
    assert_eq!(Command::Noop, command);
}

#[test]
fn oversized_synchronising_literal_is_refused() {
    let (mut p, log) = connect(&[
        (0, b"a1 LIST {99999999}\r\n"),
        (0, b"a2 NOOP\r\n"),
    ]);

    assert_matches!(
        Err(Error::LiteralTooLarge(99999999)),
        next_command(&mut p)
    );
    assert_eq!(0, prompts_sent(&log));

    let (tag, _) = next_command(&mut p).unwrap();
    assert_eq!("a2", tag);
}

#[test]
fn oversized_literal_plus_is_skipped() {
    let mut config = ParserConfig::default();
    config.max_literal_size = 8;
    let (mut p, _) = connect_with_config(
        &[
            (0, b"a1 LIST {10+}\r\n"),
            (0, b"0123456789 {3+}\r\nabc\r\n"),
            (0, b"a2 NOOP\r\n"),
        ],
        config,
    );

    assert_matches!(Err(Error::LiteralTooLarge(10)), next_command(&mut p));
    let (tag, _) = next_command(&mut p).unwrap();
    assert_eq!("a2", tag);
}

#[test]
fn overlong_line_is_skipped() {
    let mut config = ParserConfig::default();
    config.max_line_length = 128;
    let long = format!("a1 SEARCH TEXT {}\r\n", "x".repeat(500));
    let (mut p, _) = connect_with_config(
        &[(0, long.as_bytes()), (0, b"a2 NOOP\r\n")],
        config,
    );

    assert_matches!(Err(Error::LineTooLong), next_command(&mut p));
    let (tag, command) = next_command(&mut p).unwrap();
    assert_eq!("a2", tag);
    assert_eq!(Command::Noop, command);
}

#[test]
fn disconnect_is_fatal() {
    let (mut p, _) = connect(&[(0, b"a1 APPEND INBOX {10+}\r\nabc")]);

    let err = next_command(&mut p).unwrap_err();
    assert!(err.is_fatal());

    let err = next_command(&mut p).unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn client_that_never_sees_prompt_is_not_read() {
    // A LITERAL+ literal never gets a prompt, even if the client waits for
    // one.
    let (mut p, log) = connect(&[
        (0, b"a1 APPEND INBOX {5+}\r\n"),
        (1, b"hello\r\n"),
    ]);

    let err = next_command(&mut p).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(0, prompts_sent(&log));
}
