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
use std::io::{self, Read};
use std::num::NonZeroU32;

use super::parser::Parser;
use super::response_writer::ContinuationSink;
use crate::support::config::ParserConfig;
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;

/// One endpoint of a sequence range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeqBound {
    Value(NonZeroU32),
    /// `*`, the largest identifier currently in use.
    Largest,
}

impl SeqBound {
    /// Resolve this bound against the largest identifier in use.
    ///
    /// Values above `max` are clamped to it.
    pub fn resolve(self, max: u32) -> u32 {
        match self {
            SeqBound::Value(v) => v.get().min(max),
            SeqBound::Largest => max,
        }
    }
}

impl fmt::Display for SeqBound {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            SeqBound::Value(v) => write!(f, "{}", v),
            SeqBound::Largest => write!(f, "*"),
        }
    }
}

/// A single element of a sequence set, `n` or `n:m`.
///
/// The endpoints are kept in the order the client sent them; either may be
/// the larger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeqRange {
    pub start: SeqBound,
    pub end: SeqBound,
}

impl SeqRange {
    pub fn just(bound: SeqBound) -> Self {
        SeqRange {
            start: bound,
            end: bound,
        }
    }

    pub fn new(start: SeqBound, end: SeqBound) -> Self {
        SeqRange { start, end }
    }

    /// The lowest identifier in this range, given the largest one in use.
    pub fn min(&self, max: u32) -> u32 {
        self.start.resolve(max).min(self.end.resolve(max))
    }

    /// The highest identifier in this range, given the largest one in use.
    pub fn max(&self, max: u32) -> u32 {
        self.start.resolve(max).max(self.end.resolve(max))
    }

    /// Iterate the identifiers in this range in ascending order.
    ///
    /// Nothing is produced if `max` is 0, since then no identifiers exist.
    pub fn items(&self, max: u32) -> impl Iterator<Item = u32> {
        let (start, end) = if 0 == max {
            (1, 0)
        } else {
            (self.min(max), self.max(max))
        };
        start..=end
    }
}

impl fmt::Display for SeqRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

/// A sequence set as the client sent it.
///
/// Unlike a resolved set of identifiers, this keeps the ranges in their
/// original order, with duplicates and `*` intact, until a concrete upper
/// bound is supplied.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SequenceSet {
    ranges: Vec<SeqRange>,
}

impl SequenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, range: SeqRange) {
        self.ranges.push(range);
    }

    pub fn ranges(&self) -> &[SeqRange] {
        &self.ranges
    }

    /// Return whether there are no ranges (invalid for IMAP wire format).
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Call `callback` with every identifier in the set, range by range.
    ///
    /// Identifiers in overlapping ranges are visited once per range. The
    /// first error returned by `callback` stops the enumeration and is
    /// returned.
    pub fn for_each<E>(
        &self,
        max: u32,
        mut callback: impl FnMut(u32) -> Result<(), E>,
    ) -> Result<(), E> {
        for range in &self.ranges {
            for id in range.items(max) {
                callback(id)?;
            }
        }

        Ok(())
    }

    /// Iterate every identifier in the set, in the same order as `for_each`.
    pub fn items(&self, max: u32) -> impl Iterator<Item = u32> + '_ {
        self.ranges.iter().flat_map(move |r| r.items(max))
    }

    /// The number of identifiers `items()` would produce.
    pub fn len(&self, max: u32) -> usize {
        if 0 == max {
            return 0;
        }

        self.ranges
            .iter()
            .map(|r| (r.max(max) - r.min(max)) as usize + 1)
            .sum()
    }

    pub fn contains(&self, id: u32, max: u32) -> bool {
        id >= 1
            && self
                .ranges
                .iter()
                .any(|r| 0 != max && id >= r.min(max) && id <= r.max(max))
    }

    /// Parse the IMAP format of a sequence set.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let mut parser = Parser::new(
            io::Cursor::new(format!("{raw}\r\n").into_bytes()),
            io::sink(),
            ParserConfig::default(),
            LogPrefix::new("imap".to_owned()),
        );
        let set = parser.read_sequence_set();
        parser.read_eol();
        parser.finish(set)
    }
}

impl fmt::Display for SequenceSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (ix, range) in self.ranges.iter().enumerate() {
            if 0 != ix {
                write!(f, ",")?;
            }
            write!(f, "{}", range)?;
        }

        Ok(())
    }
}

impl<R: Read, W: ContinuationSink> Parser<R, W> {
    /// Read a `sequence-set`.
    pub fn read_sequence_set(&mut self) -> SequenceSet {
        let mut set = SequenceSet::new();
        loop {
            let range = self.read_sequence_range();
            if !self.is_valid() {
                return set;
            }

            set.push(range);
            if !self.accept(",") {
                return set;
            }
        }
    }

    fn read_sequence_range(&mut self) -> SeqRange {
        let start = self.read_sequence_bound();
        if !self.accept(":") {
            return SeqRange::just(start);
        }

        let end = self.read_sequence_bound();
        SeqRange::new(start, end)
    }

    fn read_sequence_bound(&mut self) -> SeqBound {
        if self.accept("*") {
            return SeqBound::Largest;
        }

        let n = self.read_number();
        match NonZeroU32::new(n) {
            Some(n) => SeqBound::Value(n),
            None => {
                self.fail(Error::SeqNoOutOfBounds);
                SeqBound::Largest
            },
        }
    }
}
