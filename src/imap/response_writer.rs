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

use std::io::{self, Write};

/// The only output the parser ever produces: the continuation line that tells
/// the client to go ahead and send a synchronising literal.
///
/// Everything else the server says goes through the response writer, which
/// is not this crate's concern.
pub trait ContinuationSink {
    /// Write `+ {prompt}\r\n` to the client.
    ///
    /// The line MUST have reached the client when this returns, since the
    /// caller immediately blocks waiting for the literal.
    fn continuation(&mut self, prompt: &str) -> io::Result<()>;
}

impl<W: Write> ContinuationSink for W {
    fn continuation(&mut self, prompt: &str) -> io::Result<()> {
        self.write_all(b"+ ")?;
        self.write_all(prompt.as_bytes())?;
        self.write_all(b"\r\n")?;
        self.flush()
    }
}
