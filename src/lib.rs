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

//! The request side of an IMAP4rev1 server.
//!
//! This crate turns the bytes a client sends into structured values: request
//! framing (tag and command), sequence sets, search queries, fetch attributes,
//! flag lists, and the lexical tokens they are built from. It executes
//! nothing; a command dispatcher reads the command name with
//! `Parser::read_request()` and then calls the reader for the grammar that
//! command takes.
//!
//! The one thing the parser writes back to the client is the continuation
//! line which precedes a synchronising literal, through a `ContinuationSink`.

#[cfg(test)]
macro_rules! assert_matches {
    ($expected:pat if $guard:expr, $actual:expr) => {
        match $actual {
            $expected if $guard => (),
            unexpected => panic!(
                "Expected {} matches {}, got {:?}",
                stringify!($expected),
                stringify!($actual),
                unexpected
            ),
        }
    };
    ($expected:pat, $actual:expr) => {
        match $actual {
            $expected => (),
            unexpected => panic!(
                "Expected {} matches {}, got {:?}",
                stringify!($expected),
                stringify!($actual),
                unexpected
            ),
        }
    };
}

pub mod imap;
pub mod support;

pub use crate::imap::fetch::{
    BodySection, FetchAttribute, Partial, SectionMode, SimpleAttribute,
};
pub use crate::imap::flags::Flag;
pub use crate::imap::parser::Parser;
pub use crate::imap::request::Request;
pub use crate::imap::request_reader::RequestReader;
pub use crate::imap::response_writer::ContinuationSink;
pub use crate::imap::search::{Field, Op, Term};
pub use crate::imap::sequence_set::{SeqBound, SeqRange, SequenceSet};
pub use crate::support::config::ParserConfig;
pub use crate::support::error::{Error, ErrorKind};
pub use crate::support::log_prefix::LogPrefix;

#[cfg(test)]
static INIT_TEST_LOG: std::sync::Once = std::sync::Once::new();

#[cfg(test)]
fn init_test_log() {
    INIT_TEST_LOG.call_once(|| {
        fern::Dispatch::new()
            .format(|out, message, record| {
                out.finish(format_args!(
                    "{} [{}][{}] {}",
                    chrono::Local::now().format("%H:%M:%S%.3f"),
                    record.level(),
                    record.target(),
                    message,
                ))
            })
            .level(log::LevelFilter::Debug)
            .chain(std::io::stderr())
            .apply()
            .unwrap();
    })
}
