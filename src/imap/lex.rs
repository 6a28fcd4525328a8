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

//! Byte classes and conversions for *reading* values under IMAP's "lexical
//! rules".
//!
//! IMAP's lexical syntax is not separable from its grammar, so this only
//! holds the context-free parts: which bytes may appear in an atom, how atoms
//! are normalised, and the textual date formats. Everything that depends on
//! where the cursor is lives in the parser.

use chrono::prelude::*;

/// `atom-specials`, plus `[` so that `BODY[...]` is not swallowed as an atom.
///
/// Bytes at or above 0x80 are never atom characters and are not in the
/// table.
pub const ATOM_SPECIALS: [bool; 128] = atom_specials();

const fn atom_specials() -> [bool; 128] {
    let mut table = [false; 128];
    let mut i = 0;
    while i < 0x20 {
        table[i] = true;
        i += 1;
    }

    let specials = b"(){ %*\"[\\]\x7F";
    let mut i = 0;
    while i < specials.len() {
        table[specials[i] as usize] = true;
        i += 1;
    }

    table
}

/// Whether `b` may not appear in an atom, unless it is one of `extra`.
pub fn is_atom_special(b: u8, extra: &[u8]) -> bool {
    (b >= 0x80 || ATOM_SPECIALS[b as usize]) && !extra.contains(&b)
}

/// Normalise the case of an atom.
///
/// Plain atoms become upper case. Flag atoms (`\seen`) become title case
/// (`\Seen`), which leaves `\*` as it is.
///
/// The input must be ASCII, which is always the case for a scanned atom.
pub fn normalise(atom: &[u8]) -> String {
    let mut s = String::from_utf8_lossy(atom).into_owned();
    if s.len() > 1 && s.starts_with('\\') {
        s[1..].make_ascii_lowercase();
        s[1..2].make_ascii_uppercase();
    } else {
        s.make_ascii_uppercase();
    }

    s
}

static MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov",
    "dec",
];

fn month(name: &str) -> Option<u32> {
    MONTH_NAMES
        .iter()
        .position(|n| n.eq_ignore_ascii_case(name))
        .map(|ix| ix as u32 + 1)
}

/// Parse a run of `min` to `max` ASCII digits.
fn digits(s: &str, min: usize, max: usize) -> Option<u32> {
    if s.len() < min || s.len() > max || !s.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    s.parse().ok()
}

/// Parse `date-text`: `d-Mon-yyyy`, where the day may have one or two digits
/// or be padded with a space.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let mut parts = s.splitn(3, '-');
    let day = digits(parts.next()?.trim_start_matches(' '), 1, 2)?;
    let month = month(parts.next()?)?;
    let year = digits(parts.next()?, 4, 4)?;

    NaiveDate::from_ymd_opt(year as i32, month, day)
}

/// Parse the content of a quoted `date-time`: `dd-Mon-yyyy hh:mm:ss +zzzz`.
pub fn parse_date_time(s: &str) -> Option<DateTime<FixedOffset>> {
    let mut parts = s.rsplitn(3, ' ');
    let zone = parts.next()?;
    let time = parts.next()?;
    let date = parse_date(parts.next()?)?;

    let mut hms = time.splitn(3, ':');
    let h = digits(hms.next()?, 2, 2)?;
    let m = digits(hms.next()?, 2, 2)?;
    let sec = digits(hms.next()?, 2, 2)?;

    let (sign, zone) = match zone.as_bytes().first()? {
        b'+' => (1, &zone[1..]),
        b'-' => (-1, &zone[1..]),
        _ => return None,
    };
    let zone = digits(zone, 4, 4)? as i32;
    let offset = sign * ((zone / 100) * 3600 + (zone % 100) * 60);

    FixedOffset::east_opt(offset)?
        .from_local_datetime(&date.and_hms_opt(h, m, sec)?)
        .single()
}
