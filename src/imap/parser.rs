//-
// Copyright (c) 2020, 2023, Jason Lingle
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

//! The cursor over the client's input and the lexical token readers.
//!
//! # Error model
//!
//! Every reader records the first failure it hits in the parser's error slot
//! and returns a zero value (empty string, `0`, `None`). While the slot is
//! occupied, all readers return zero values immediately without consuming
//! anything, so a grammar production can be written as a straight sequence of
//! reads with a single validity check at the end.
//!
//! Productions that use a failure as a signal (the end of a list, an
//! alternative that did not match) clear the slot themselves. Nothing else
//! does; the caller finishes a request with `finish()` to get the result and
//! then `discard_line()` if it was rejected.
//!
//! # Framing
//!
//! The parser holds one line at a time, including its line ending. A literal
//! is announced at the end of a line; once its prefix has been consumed the
//! literal is read straight from the `RequestReader`, and whatever follows it
//! becomes the next "line".

use std::io::{self, Read};

use chrono::prelude::*;
use log::{debug, trace, warn};

use super::lex;
use super::request_reader::{self, RequestReader, SkipState};
use super::response_writer::ContinuationSink;
use crate::support::config::ParserConfig;
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;

pub struct Parser<R, W> {
    reader: RequestReader<R>,
    sink: W,
    config: ParserConfig,
    log_prefix: LogPrefix,

    /// The current line, including the line ending.
    line: Vec<u8>,
    /// The offset of the cursor within `line`.
    pos: usize,
    /// Whether a new line must be read before anything else is.
    is_eol: bool,
    /// Whether the last attempt to read a line found it to be too long.
    overlong: bool,
    /// The size of a LITERAL+ literal that was refused and not read.
    pending_literal: Option<u32>,
    in_section: bool,
    list_depth: u32,
    /// How many recursive constructs (e.g. search keys) are currently open.
    nesting: u32,

    error: Option<Error>,
}

impl<R: Read, W: ContinuationSink> Parser<R, W> {
    pub fn new(
        io: R,
        sink: W,
        config: ParserConfig,
        log_prefix: LogPrefix,
    ) -> Self {
        Parser {
            reader: RequestReader::new(io, config.max_line_length),
            sink,
            config,
            log_prefix,
            line: Vec::new(),
            pos: 0,
            is_eol: true,
            overlong: false,
            pending_literal: None,
            in_section: false,
            list_depth: 0,
            nesting: 0,
            error: None,
        }
    }

    pub fn log_prefix(&self) -> &LogPrefix {
        &self.log_prefix
    }

    pub fn log_prefix_mut(&mut self) -> &mut LogPrefix {
        &mut self.log_prefix
    }

    pub fn sink(&self) -> &W {
        &self.sink
    }

    /// Whether no error has been recorded.
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Clear the error slot, keeping the cursor where it is.
    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Return `value` if no error has been recorded, or a copy of the error.
    ///
    /// The error stays in the slot.
    pub fn finish<T>(&self, value: T) -> Result<T, Error> {
        match self.error {
            Some(ref e) => Err(e.clone()),
            None => Ok(value),
        }
    }

    /// Record `e` unless an error is already recorded.
    pub(crate) fn fail(&mut self, e: Error) {
        if self.error.is_none() {
            self.error = Some(e);
        }
    }

    /// Record `e` in place of any non-fatal error already recorded.
    pub(crate) fn replace_error(&mut self, e: Error) {
        if !self.error.as_ref().map_or(false, Error::is_fatal) {
            self.error = Some(e);
        }
    }

    /// Clear the error slot if it holds an error that a production may treat
    /// as "this alternative did not match".
    ///
    /// I/O errors and refused literals are never cleared this way, since
    /// retrying from the same position cannot succeed. Returns whether the
    /// slot is now empty.
    pub(crate) fn clear_mismatch(&mut self) -> bool {
        match self.error {
            Some(ref e) if e.is_fatal() => false,
            Some(Error::LiteralTooLarge(_)) => false,
            _ => {
                self.error = None;
                true
            },
        }
    }

    /// Enter one level of a recursive construct.
    ///
    /// If `limit` levels are already open, records `error` and returns
    /// `false`; otherwise the caller must pair this with `leave_nested()`.
    pub(crate) fn enter_nested(&mut self, limit: u32, error: Error) -> bool {
        if self.nesting >= limit {
            self.fail(error);
            return false;
        }

        self.nesting += 1;
        true
    }

    pub(crate) fn leave_nested(&mut self) {
        self.nesting = self.nesting.saturating_sub(1);
    }

    /// Abandon the rest of the current request.
    ///
    /// This clears the error slot, drops what is left of the current line,
    /// and skips input belonging to the same command that has not been read
    /// yet: the rest of an overlong line, or LITERAL+ payloads the client will
    /// send regardless of our reply.
    pub fn discard_line(&mut self) {
        let fatal = self.error.as_ref().map_or(false, Error::is_fatal);
        if let Some(ref e) = self.error {
            debug!("{} Discarding request: {}", self.log_prefix, e);
        }

        let skip = if fatal {
            SkipState::Done
        } else if self.overlong {
            warn!("{} Skipping overlong line", self.log_prefix);
            SkipState::Line
        } else if let Some(len) = self.pending_literal {
            warn!("{} Skipping refused {}-byte literal", self.log_prefix, len);
            SkipState::LiteralPlus(len)
        } else if self.is_eol {
            SkipState::Done
        } else {
            match request_reader::literal_at_end(self.tail()) {
                Some((len, true)) => SkipState::LiteralPlus(len),
                _ => SkipState::Done,
            }
        };

        self.error = None;
        self.is_eol = true;
        self.overlong = false;
        self.pending_literal = None;
        self.in_section = false;
        self.list_depth = 0;
        self.nesting = 0;
        self.log_prefix.clear_tag();

        if let Err(e) = self.reader.skip_command(skip) {
            self.error = Some(e.into());
        }
    }

    /// The unconsumed part of the current line.
    pub fn tail(&self) -> &[u8] {
        &self.line[self.pos..]
    }

    /// The whole current line.
    pub fn line(&self) -> &[u8] {
        &self.line
    }

    fn available(&self) -> usize {
        self.line.len() - self.pos
    }

    fn read_line(&mut self) {
        self.pos = 0;
        self.line.clear();

        match self.reader.next_line() {
            Ok(Some(line)) => {
                self.line.extend_from_slice(line);
                self.is_eol = false;
                trace!(
                    "{} Read line of {} bytes",
                    self.log_prefix,
                    self.line.len()
                );
            },
            Ok(None) => {
                self.overlong = true;
                self.error = Some(Error::LineTooLong);
            },
            Err(e) => {
                self.error = Some(e.into());
            },
        }
    }

    /// Ensure that at least `n` bytes are available in the current line,
    /// reading a new line if the last one was finished.
    ///
    /// Records `LineTooShort` if there aren't.
    fn ensure(&mut self, n: usize) -> bool {
        if self.error.is_some() {
            return false;
        }

        if self.is_eol {
            self.read_line();
            if self.error.is_some() {
                return false;
            }
        }

        if self.available() < n {
            self.error = Some(Error::LineTooShort);
            return false;
        }

        true
    }

    /// Return the next byte without consuming it, or 0 if there is none.
    pub fn peek(&mut self) -> u8 {
        if self.ensure(1) {
            self.line[self.pos]
        } else {
            0
        }
    }

    /// If the input continues with `s` (ignoring ASCII case), consume it and
    /// return `true`.
    ///
    /// Running off the end of the line counts as a mismatch rather than an
    /// error.
    pub fn accept(&mut self, s: &str) -> bool {
        if self.error.is_some() {
            return false;
        }

        let expected = s.as_bytes();
        if !self.ensure(expected.len()) {
            if matches!(self.error, Some(Error::LineTooShort)) {
                self.error = None;
            }
            return false;
        }

        if !self.tail()[..expected.len()].eq_ignore_ascii_case(expected) {
            return false;
        }

        self.pos += expected.len();
        true
    }

    /// Like `accept()`, but a mismatch is an error.
    pub fn expect(&mut self, s: &str) {
        if self.error.is_some() {
            return;
        }

        if !self.accept(s) && self.error.is_none() {
            let tail = self.tail();
            let actual = &tail[..tail.len().min(s.len())];
            self.error = Some(Error::Expected {
                expected: s.to_owned(),
                actual: String::from_utf8_lossy(actual).into_owned(),
            });
        }
    }

    pub fn read_space(&mut self) {
        self.expect(" ");
    }

    pub fn read_eol(&mut self) {
        self.expect("\r\n");
        if self.error.is_none() {
            self.is_eol = true;
        }
    }

    fn is_valid_delimiter(&self, b: u8) -> bool {
        match b {
            b' ' | b'\r' => true,
            b']' => self.in_section,
            b')' => self.list_depth > 0,
            _ => false,
        }
    }

    /// Find the extent of the atom at the cursor.
    ///
    /// Returns the length of the atom, or `None` if there is no valid atom
    /// there (which is recorded as an error).
    fn scan_atom(&mut self, extra: &[u8]) -> Option<usize> {
        let mut n = 0;
        let mut flag = false;
        loop {
            if !self.ensure(n + 1) {
                return None;
            }

            let b = self.tail()[n];
            if lex::is_atom_special(b, extra) {
                if b'\\' == b && 0 == n {
                    // flag, e.g. `\Seen`
                    flag = true;
                    n += 1;
                    continue;
                }

                if b'*' == b && 1 == n && flag {
                    // flag-perm, `\*`, which always ends the atom
                    n += 1;
                }

                break;
            }

            n += 1;
        }

        if 0 == n || (flag && n < 2) {
            let e = Error::invalid_token("atom", None, self.tail());
            self.error = Some(e);
            return None;
        }

        if !self.ensure(n + 1) {
            return None;
        }

        let delimiter = self.tail()[n];
        if !self.is_valid_delimiter(delimiter) {
            let e = Error::invalid_token("atom", Some(delimiter), self.tail());
            self.error = Some(e);
            return None;
        }

        Some(n)
    }

    pub fn read_atom(&mut self) -> String {
        self.read_atom_with_extra(&[])
    }

    /// Read an atom which may also contain the bytes in `extra`.
    ///
    /// The atom is normalised: upper case, or title case for flags.
    pub fn read_atom_with_extra(&mut self, extra: &[u8]) -> String {
        let Some(n) = self.scan_atom(extra) else {
            return String::new();
        };

        let atom = lex::normalise(&self.tail()[..n]);
        self.pos += n;
        atom
    }

    /// Read an atom exactly as the client sent it.
    ///
    /// This is what strings and tags use, since their content is data rather
    /// than a keyword.
    pub(crate) fn read_raw_atom(&mut self, extra: &[u8]) -> String {
        let Some(n) = self.scan_atom(extra) else {
            return String::new();
        };

        let atom = String::from_utf8_lossy(&self.tail()[..n]).into_owned();
        self.pos += n;
        atom
    }

    /// Read a run of ASCII digits.
    ///
    /// Unlike other tokens, what follows the number is not checked.
    pub fn read_number(&mut self) -> u32 {
        let mut n = 0;
        loop {
            if !self.ensure(n + 1) {
                return 0;
            }

            if !self.tail()[n].is_ascii_digit() {
                break;
            }

            n += 1;
        }

        let parsed = std::str::from_utf8(&self.tail()[..n])
            .ok()
            .and_then(|s| s.parse::<u32>().ok());
        let Some(value) = parsed else {
            let e = Error::invalid_token("integer", None, self.tail());
            self.error = Some(e);
            return 0;
        };

        self.pos += n;
        value
    }

    pub fn read_quoted_string(&mut self) -> String {
        if b'"' != self.peek() {
            if self.error.is_none() {
                let e = Error::type_mismatch("quoted string", self.tail());
                self.error = Some(e);
            }
            return String::new();
        }

        let mut content = Vec::new();
        let mut n = 1;
        loop {
            if !self.ensure(n + 1) {
                return String::new();
            }

            match self.tail()[n] {
                b'"' => break,

                b'\\' => {
                    if !self.ensure(n + 2) {
                        return String::new();
                    }

                    let escaped = self.tail()[n + 1];
                    if b'\\' != escaped && b'"' != escaped {
                        let e = Error::invalid_token(
                            "quoted string",
                            Some(escaped),
                            self.tail(),
                        );
                        self.error = Some(e);
                        return String::new();
                    }

                    content.push(escaped);
                    n += 2;
                },

                b @ (b'\r' | b'\n') => {
                    let e = Error::invalid_token(
                        "quoted string",
                        Some(b),
                        self.tail(),
                    );
                    self.error = Some(e);
                    return String::new();
                },

                b => {
                    content.push(b);
                    n += 1;
                },
            }
        }

        // Closing quote
        n += 1;

        if !self.ensure(n + 1) {
            return String::new();
        }

        let delimiter = self.tail()[n];
        if !self.is_valid_delimiter(delimiter) {
            let e = Error::invalid_token(
                "quoted string",
                Some(delimiter),
                self.tail(),
            );
            self.error = Some(e);
            return String::new();
        }

        self.pos += n;
        into_string(content)
    }

    /// Read `{size}\r\n` or `{size+}\r\n`.
    ///
    /// Returns the size and whether the literal is synchronising.
    ///
    /// On failure the cursor is left on the `{`, so a list reader does not
    /// mistake the broken prefix for the end of its elements.
    fn read_literal_prefix(&mut self) -> Option<(u32, bool)> {
        let start = self.pos;
        self.expect("{");
        let size = self.read_number();
        let sync = !self.accept("+");
        self.expect("}\r\n");

        if self.error.is_some() {
            self.pos = start;
            None
        } else {
            Some((size, sync))
        }
    }

    /// Send the continuation line if needed and hand the literal over.
    fn start_literal(
        &mut self,
        size: u32,
        sync: bool,
    ) -> Option<io::Take<&mut RequestReader<R>>> {
        if sync {
            let prompt = &self.config.continuation_prompt;
            if let Err(e) = self.sink.continuation(prompt) {
                self.error = Some(e.into());
                return None;
            }

            debug!(
                "{} Sent continuation for {}-byte literal",
                self.log_prefix, size
            );
        }

        // Whatever comes after the literal is read as a new line.
        self.is_eol = true;
        Some(self.reader.read_literal(size))
    }

    /// Read the literal at the cursor as a stream.
    ///
    /// The returned reader MUST be read to the end before anything else is
    /// done with the parser.
    pub fn read_literal_stream(
        &mut self,
    ) -> Option<io::Take<&mut RequestReader<R>>> {
        let (size, sync) = self.read_literal_prefix()?;
        self.start_literal(size, sync)
    }

    /// Read the literal at the cursor into memory.
    pub fn read_literal_string(&mut self) -> String {
        let Some((size, sync)) = self.read_literal_prefix() else {
            return String::new();
        };

        if size > self.config.max_literal_size {
            if !sync {
                self.pending_literal = Some(size);
            }
            self.error = Some(Error::LiteralTooLarge(size));
            return String::new();
        }

        let Some(mut literal) = self.start_literal(size, sync) else {
            return String::new();
        };

        let mut data = Vec::with_capacity(size as usize);
        let result = literal.read_to_end(&mut data);
        if let Err(e) = result {
            self.error = Some(e.into());
            return String::new();
        }

        if data.len() != size as usize {
            self.error = Some(io::ErrorKind::UnexpectedEof.into());
            return String::new();
        }

        debug!("{} Read {}-byte literal", self.log_prefix, size);
        into_string(data)
    }

    pub fn read_string(&mut self) -> String {
        self.read_string_with_extra(&[])
    }

    /// Read a string whose atom form may also contain `]`.
    pub fn read_astring(&mut self) -> String {
        self.read_string_with_extra(b"]")
    }

    /// Read a mailbox pattern, whose atom form may contain wildcards.
    pub fn read_list_mailbox(&mut self) -> String {
        self.read_string_with_extra(b"%*")
    }

    fn read_string_with_extra(&mut self, extra: &[u8]) -> String {
        match self.peek() {
            _ if self.error.is_some() => String::new(),
            b'{' => self.read_literal_string(),
            b'"' => self.read_quoted_string(),
            _ => self.read_raw_atom(extra),
        }
    }

    /// Read a `date`, either bare or quoted.
    pub fn read_date(&mut self) -> Option<NaiveDate> {
        let s = self.read_string();
        if self.error.is_some() {
            return None;
        }

        let date = lex::parse_date(&s);
        if date.is_none() {
            self.error = Some(Error::InvalidDate(s));
        }
        date
    }

    /// Read a (quoted) `date-time`.
    pub fn read_date_time(&mut self) -> Option<DateTime<FixedOffset>> {
        let s = self.read_quoted_string();
        if self.error.is_some() {
            return None;
        }

        let datetime = lex::parse_date_time(&s);
        if datetime.is_none() {
            self.error = Some(Error::InvalidDate(s));
        }
        datetime
    }

    pub fn read_list_start(&mut self) {
        self.expect("(");
        if self.error.is_none() {
            self.list_depth += 1;
        }
    }

    pub fn read_list_end(&mut self) {
        self.expect(")");
        if self.error.is_none() {
            self.list_depth = self.list_depth.saturating_sub(1);
        }
    }

    /// Read a parenthesised, space-separated list of tokens.
    ///
    /// `read_token` is called until it fails; that failure marks the end of
    /// the list and is discarded, after which the closing parenthesis must
    /// follow. A malformed element thus still surfaces as an error, since the
    /// parenthesis will not be where it is expected.
    pub fn read_list<T>(
        &mut self,
        mut read_token: impl FnMut(&mut Self) -> T,
    ) -> Vec<T> {
        self.read_list_start();
        if self.error.is_some() {
            return Vec::new();
        }

        let mut list = Vec::new();
        loop {
            let token = read_token(self);
            if self.error.is_some() {
                if self.clear_mismatch() {
                    self.read_list_end();
                }
                break;
            }

            list.push(token);
            self.read_space();
        }

        list
    }

    pub fn read_atom_list(&mut self) -> Vec<String> {
        self.read_list(Self::read_atom)
    }

    pub fn read_string_list(&mut self) -> Vec<String> {
        self.read_list(Self::read_string)
    }

    pub(crate) fn set_in_section(&mut self, in_section: bool) {
        self.in_section = in_section;
    }
}

fn into_string(data: Vec<u8>) -> String {
    match String::from_utf8(data) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

#[cfg(test)]
pub(crate) type TestParser = Parser<io::Cursor<Vec<u8>>, Vec<u8>>;

/// Create a parser over `input`, which is given a line ending.
#[cfg(test)]
pub(crate) fn parser_for(input: &str) -> TestParser {
    raw_parser_for(format!("{input}\r\n").into_bytes())
}

#[cfg(test)]
pub(crate) fn raw_parser_for(input: Vec<u8>) -> TestParser {
    crate::init_test_log();
    Parser::new(
        io::Cursor::new(input),
        Vec::new(),
        ParserConfig::default(),
        LogPrefix::new("imap".to_owned()),
    )
}

#[cfg(test)]
pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// A date-time in the zone `zone` seconds east of UTC.
#[cfg(test)]
pub(crate) fn date_time(
    zone: i32,
    y: i32,
    mo: u32,
    d: u32,
    h: u32,
    mi: u32,
    s: u32,
) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(zone)
        .unwrap()
        .with_ymd_and_hms(y, mo, d, h, mi, s)
        .unwrap()
}
