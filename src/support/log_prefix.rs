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

use std::fmt;

/// Text included at the start of every log statement made by a parser.
///
/// Each connection owns its own parser, so unlike the server-wide prefixes
/// this needs no sharing.
#[derive(Clone, Debug)]
pub struct LogPrefix {
    protocol: String,
    peer: Option<String>,
    tag: Option<String>,
}

impl LogPrefix {
    pub fn new(protocol: String) -> Self {
        Self {
            protocol,
            peer: None,
            tag: None,
        }
    }

    pub fn set_peer(&mut self, peer: String) {
        self.peer = Some(sanitise(peer));
    }

    /// Set the tag of the request currently being parsed.
    pub fn set_tag(&mut self, tag: &str) {
        self.tag = Some(sanitise(tag.to_owned()));
    }

    pub fn clear_tag(&mut self) {
        self.tag = None;
    }
}

impl fmt::Display for LogPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.protocol)?;
        match (&self.peer, &self.tag) {
            (None, None) => Ok(()),
            (Some(peer), None) => write!(f, "[{peer}]"),
            (None, Some(tag)) => write!(f, "[tag={tag}]"),
            (Some(peer), Some(tag)) => write!(f, "[{peer} tag={tag}]"),
        }
    }
}

fn sanitise(mut s: String) -> String {
    s.retain(|c| !c.is_control());
    if let Some((truncate_len, _)) = s.char_indices().nth(64) {
        s.truncate(truncate_len);
    }

    s
}
