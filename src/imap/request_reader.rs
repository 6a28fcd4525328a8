//-
// Copyright (c) 2023, Jason Lingle
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

use std::io::{self, Read};

use lazy_static::lazy_static;
use regex::bytes::Regex;

lazy_static! {
    static ref LITERAL_AT_END: Regex =
        Regex::new(r#"\{([0-9]+)(\+?)\}\r?\n$"#).unwrap();
}

/// Manages the state of the network input.
///
/// The input is a sequence of lines, except that a line ending with a literal
/// prefix is followed by that many raw bytes, after which lines resume.
/// `RequestReader` only knows how to find line boundaries; deciding when a
/// literal follows is up to the parser, which then reads it through the
/// `Read` implementation (usually via `read_literal`).
pub struct RequestReader<R> {
    io: R,
    /// The text buffer. The `Vec` itself is used as a fixed-size array; the
    /// size currently in use is given by `text_len`.
    text: Vec<u8>,
    /// The number of initialised bytes in `text`.
    text_len: usize,
    /// The number of bytes in `text` that have been consumed by reading.
    text_consumed: usize,
}

/// What is left of an abandoned command when it is skipped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipState {
    /// `text` is full with no line feed in sight.
    Line,
    /// The next thing in the stream is a LITERAL+ payload of this size.
    LiteralPlus(u32),
    /// The abandoned line has been consumed completely.
    Done,
}

impl<R: Read> RequestReader<R> {
    /// Create a reader which buffers at most `max_line_length` bytes of line
    /// text at a time.
    pub fn new(io: R, max_line_length: usize) -> Self {
        Self {
            io,
            text: vec![0u8; max_line_length.max(64)],
            text_len: 0,
            text_consumed: 0,
        }
    }

    /// Reads the next line from the input.
    ///
    /// The line includes its line ending. If `None` is returned, the line was
    /// too long to fit in the buffer; nothing is consumed in that case and the
    /// caller should eventually call `skip_command(SkipState::Line)`.
    ///
    /// End of input is reported as `io::ErrorKind::UnexpectedEof`.
    pub fn next_line(&mut self) -> io::Result<Option<&[u8]>> {
        self.drop_consumed();
        self.consume_line()
    }

    /// Return a reader over exactly the next `len` bytes of the stream.
    ///
    /// The reader MUST be consumed in its entirety to maintain protocol
    /// consistency.
    pub fn read_literal(&mut self, len: u32) -> io::Take<&mut Self> {
        self.take(u64::from(len))
    }

    /// Discard everything up to and including the next line feed.
    pub fn skip_line(&mut self) -> io::Result<()> {
        loop {
            self.drop_consumed();
            if self.consume_line()?.is_some() {
                return Ok(());
            }

            self.text_consumed = self.text_len;
        }
    }

    /// Discard the next `len` raw bytes of the stream.
    pub fn skip_bytes(&mut self, len: u32) -> io::Result<()> {
        let skipped = io::copy(&mut self.read_literal(len), &mut io::sink())?;
        if skipped < u64::from(len) {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }

        Ok(())
    }

    /// Skip the rest of an abandoned command.
    ///
    /// LITERAL+ payloads are skipped along with the lines around them. A
    /// synchronising literal stops the skip, since the client will not send it
    /// without a continuation line.
    pub fn skip_command(&mut self, mut state: SkipState) -> io::Result<()> {
        loop {
            match state {
                SkipState::Done => return Ok(()),

                SkipState::Line => {
                    // Shift away all but the last 32 bytes we've buffered. If
                    // `text` ends with the start of a literal declaration,
                    // this will let us find that when we continue the line.
                    self.text_consumed = self.text_len.saturating_sub(32);
                },

                SkipState::LiteralPlus(len) => self.skip_bytes(len)?,
            }

            self.drop_consumed();
            state = match self.consume_line()? {
                None => SkipState::Line,
                Some(line) => match literal_at_end(line) {
                    Some((len, true)) => SkipState::LiteralPlus(len),
                    _ => SkipState::Done,
                },
            };
        }
    }

    /// Advances `text_consumed` to one byte past the next line boundary.
    ///
    /// If no IO error occurs, this returns the line (including the line
    /// ending), or `None` if the buffer filled without finding a line feed.
    /// In the latter case, `text_consumed` is not advanced.
    fn consume_line(&mut self) -> io::Result<Option<&[u8]>> {
        let start = self.text_consumed;
        let mut cursor = start;

        loop {
            if let Some(lf) =
                memchr::memchr(b'\n', &self.text[cursor..self.text_len])
            {
                let end = cursor + lf + 1;
                self.text_consumed = end;
                return Ok(Some(&self.text[start..end]));
            }

            cursor = self.text_len;
            if self.text_len == self.text.len() {
                return Ok(None);
            }

            self.grow_text()?;
        }
    }

    /// Removes all text marked as consumed from the text buffer.
    fn drop_consumed(&mut self) {
        if self.text_consumed < self.text_len {
            self.text.copy_within(self.text_consumed..self.text_len, 0);
        }

        self.text_len -= self.text_consumed;
        self.text_consumed = 0;
    }

    /// Perform a non-empty read into `text`.
    fn grow_text(&mut self) -> io::Result<()> {
        loop {
            match self.io.read(&mut self.text[self.text_len..]) {
                Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
                Ok(nread) => {
                    self.text_len += nread;
                    return Ok(());
                },
                Err(e) if io::ErrorKind::Interrupted == e.kind() => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

/// The `Read` implementation directly reads from the logical byte stream of
/// the request reader.
impl<R: Read> Read for RequestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.text_consumed < self.text_len {
            // Data we've already buffered comes first.
            let len = buf.len().min(self.text_len - self.text_consumed);
            buf[..len]
                .copy_from_slice(&self.text[self.text_consumed..][..len]);
            self.text_consumed += len;
            Ok(len)
        } else {
            // No buffered data, so just pass through the underlying reader.
            self.io.read(buf)
        }
    }
}

/// Check whether `line` ends with a literal prefix.
///
/// Returns the length of the literal and whether it is a LITERAL+ literal.
pub fn literal_at_end(line: &[u8]) -> Option<(u32, bool)> {
    let captures = LITERAL_AT_END.captures(line)?;
    let len = std::str::from_utf8(captures.get(1)?.as_bytes())
        .ok()?
        .parse::<u32>()
        .ok()?;
    let plus = captures.get(2).map_or(false, |m| !m.as_bytes().is_empty());
    Some((len, plus))
}
