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

use std::io::Read;

use log::debug;

use super::parser::Parser;
use super::response_writer::ContinuationSink;
use crate::support::error::Error;

/// The leading tokens of a client line.
///
/// The arguments are still unread when this is returned; the caller picks the
/// grammar to continue with based on `command`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    /// The tag, exactly as the client sent it.
    pub tag: String,
    /// The command name, upper-cased.
    pub command: String,
}

impl<R: Read, W: ContinuationSink> Parser<R, W> {
    /// Read `tag SP command` from the start of a new line.
    pub fn read_request(&mut self) -> Result<Request, Error> {
        let tag = self.read_raw_atom(&[]);
        self.read_space();
        let command = self.read_atom();
        let request = self.finish(Request { tag, command })?;

        self.log_prefix_mut().set_tag(&request.tag);
        debug!("{} Request: {}", self.log_prefix(), request.command);
        Ok(request)
    }
}
