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

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Limits and wording used by the request parser.
///
/// This is normally the `[parser]` table of the server configuration, but can
/// also be loaded on its own. All fields are optional.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ParserConfig {
    /// The longest line, including the line ending, that will be buffered.
    ///
    /// Lines longer than this are rejected and skipped. Literals do not count
    /// towards this limit.
    pub max_line_length: usize,

    /// The largest literal that will be read into memory.
    ///
    /// A larger synchronising literal is refused before the client is told to
    /// send it. A larger non-synchronising literal is read and discarded.
    pub max_literal_size: u32,

    /// The text sent after `+ ` when the client must be told to send a
    /// synchronising literal.
    pub continuation_prompt: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            max_line_length: 65536,
            max_literal_size: 64 * 1024 * 1024,
            continuation_prompt: "ready".to_owned(),
        }
    }
}

impl ParserConfig {
    pub fn from_toml(data: &[u8]) -> Result<Self, toml::de::Error> {
        toml::from_slice(data)
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        let data = fs::read(path)?;
        Self::from_toml(&data)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
