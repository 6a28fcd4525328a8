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

//! The `FETCH` attribute grammar.
//!
//! Attributes are plain data. Whatever renders them against a message matches
//! on the variants; the only behaviour here is the response name (`Display`)
//! and the byte-range clamp of `Partial`.

use std::fmt;
use std::io::Read;

use super::parser::Parser;
use super::response_writer::ContinuationSink;
use crate::support::error::Error;

/// A fetch attribute which is fully identified by its name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimpleAttribute {
    Flags,
    InternalDate,
    Rfc822,
    Rfc822Header,
    Rfc822Size,
    Rfc822Text,
    Envelope,
    Uid,
}

impl SimpleAttribute {
    pub fn name(self) -> &'static str {
        match self {
            SimpleAttribute::Flags => "FLAGS",
            SimpleAttribute::InternalDate => "INTERNALDATE",
            SimpleAttribute::Rfc822 => "RFC822",
            SimpleAttribute::Rfc822Header => "RFC822.HEADER",
            SimpleAttribute::Rfc822Size => "RFC822.SIZE",
            SimpleAttribute::Rfc822Text => "RFC822.TEXT",
            SimpleAttribute::Envelope => "ENVELOPE",
            SimpleAttribute::Uid => "UID",
        }
    }
}

/// What part of a body section is requested.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SectionMode {
    /// The entire part, including its headers.
    Full,
    Text,
    Header,
    HeaderFields,
    HeaderFieldsNot,
}

impl SectionMode {
    fn name(self) -> &'static str {
        match self {
            SectionMode::Full => "",
            SectionMode::Text => "TEXT",
            SectionMode::Header => "HEADER",
            SectionMode::HeaderFields => "HEADER.FIELDS",
            SectionMode::HeaderFieldsNot => "HEADER.FIELDS.NOT",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "TEXT" => Some(SectionMode::Text),
            "HEADER" => Some(SectionMode::Header),
            "HEADER.FIELDS" => Some(SectionMode::HeaderFields),
            "HEADER.FIELDS.NOT" => Some(SectionMode::HeaderFieldsNot),
            _ => None,
        }
    }

    /// Whether this mode is followed by a list of header names.
    pub fn has_header_list(self) -> bool {
        matches!(self, SectionMode::HeaderFields | SectionMode::HeaderFieldsNot)
    }
}

/// A `<offset.length>` byte range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Partial {
    pub offset: u32,
    pub length: u32,
}

impl Partial {
    /// Restrict `data` to this range.
    ///
    /// Ranges running past the end of `data` are silently clamped.
    pub fn apply<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        let start = (self.offset as usize).min(data.len());
        let end = start.saturating_add(self.length as usize).min(data.len());
        &data[start..end]
    }
}

/// A `BODY[...]` or `BODY.PEEK[...]` attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BodySection {
    /// Whether to leave `\Seen` alone.
    pub peek: bool,
    /// The dotted part path, such as `1.2`. Empty for the whole message.
    pub part: String,
    pub mode: SectionMode,
    /// Non-empty iff `mode.has_header_list()`.
    pub header_list: Vec<String>,
    pub partial: Option<Partial>,
}

impl fmt::Display for BodySection {
    /// Formats the section the way it is named in the response, which never
    /// includes `.PEEK` and only gives the offset of a partial.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "BODY[{}", self.part)?;
        if SectionMode::Full != self.mode {
            if !self.part.is_empty() {
                write!(f, ".")?;
            }
            write!(f, "{}", self.mode.name())?;
        }

        if !self.header_list.is_empty() {
            write!(f, " (")?;
            for (ix, header) in self.header_list.iter().enumerate() {
                if 0 != ix {
                    write!(f, " ")?;
                }
                write_quoted(f, header)?;
            }
            write!(f, ")")?;
        }

        write!(f, "]")?;
        if let Some(partial) = self.partial {
            write!(f, "<{}>", partial.offset)?;
        }

        Ok(())
    }
}

fn write_quoted(f: &mut fmt::Formatter, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for ch in s.chars() {
        if '"' == ch || '\\' == ch {
            write!(f, "\\")?;
        }
        write!(f, "{}", ch)?;
    }
    write!(f, "\"")
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchAttribute {
    Simple(SimpleAttribute),
    /// `BODY` (without extensions) or `BODYSTRUCTURE` (with).
    BodyStructure {
        extensions: bool,
    },
    Body(BodySection),
}

impl FetchAttribute {
    /// Look up an attribute by its (upper-case) name.
    pub fn from_name(name: &str) -> Option<Self> {
        let simple = match name {
            "BODY" => {
                return Some(FetchAttribute::BodyStructure { extensions: false })
            },
            "BODYSTRUCTURE" => {
                return Some(FetchAttribute::BodyStructure { extensions: true })
            },
            "FLAGS" => SimpleAttribute::Flags,
            "INTERNALDATE" => SimpleAttribute::InternalDate,
            "RFC822" => SimpleAttribute::Rfc822,
            "RFC822.HEADER" => SimpleAttribute::Rfc822Header,
            "RFC822.SIZE" => SimpleAttribute::Rfc822Size,
            "RFC822.TEXT" => SimpleAttribute::Rfc822Text,
            "ENVELOPE" => SimpleAttribute::Envelope,
            "UID" => SimpleAttribute::Uid,
            _ => return None,
        };

        Some(FetchAttribute::Simple(simple))
    }
}

impl fmt::Display for FetchAttribute {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FetchAttribute::Simple(simple) => write!(f, "{}", simple.name()),
            FetchAttribute::BodyStructure { extensions: false } => {
                write!(f, "BODY")
            },
            FetchAttribute::BodyStructure { extensions: true } => {
                write!(f, "BODYSTRUCTURE")
            },
            FetchAttribute::Body(ref section) => write!(f, "{}", section),
        }
    }
}

/// The attributes a fetch macro stands for.
fn expand_macro(name: &str) -> Option<&'static [SimpleAttribute]> {
    use self::SimpleAttribute::*;

    match name {
        "ALL" => Some(&[Flags, InternalDate, Rfc822Size, Envelope]),
        "FAST" => Some(&[Flags, InternalDate, Rfc822Size]),
        // FULL also includes BODY, which is not a simple attribute
        "FULL" => Some(&[Flags, InternalDate, Rfc822Size, Envelope]),
        _ => None,
    }
}

impl<R: Read, W: ContinuationSink> Parser<R, W> {
    /// Read the attribute part of a `FETCH` command: a macro, a single
    /// attribute, or a parenthesised list of attributes.
    pub fn read_fetch_attributes(
        &mut self,
    ) -> Result<Vec<FetchAttribute>, Error> {
        if !self.is_valid() {
            return self.finish(Vec::new());
        }

        let attributes = if b'(' == self.peek() {
            self.read_fetch_attribute_list()
        } else {
            self.read_fetch_macro()
        };

        self.finish(attributes)
    }

    fn read_fetch_macro(&mut self) -> Vec<FetchAttribute> {
        let name = self.read_atom();
        if !self.is_valid() {
            // `BODY[` does not scan as an atom.
            return if self.clear_mismatch() {
                vec![self.read_body_section()]
            } else {
                Vec::new()
            };
        }

        match expand_macro(&name) {
            Some(simple) => {
                let mut attributes = simple
                    .iter()
                    .copied()
                    .map(FetchAttribute::Simple)
                    .collect::<Vec<_>>();
                if "FULL" == name {
                    attributes.push(FetchAttribute::BodyStructure {
                        extensions: false,
                    });
                }
                attributes
            },
            None => self.fetch_attribute_named(name).into_iter().collect(),
        }
    }

    fn read_fetch_attribute_list(&mut self) -> Vec<FetchAttribute> {
        self.read_list_start();
        let mut attributes = vec![self.read_fetch_attribute()];
        while self.is_valid() && self.accept(" ") {
            attributes.push(self.read_fetch_attribute());
        }
        self.read_list_end();

        attributes
    }

    /// Read one attribute, which may not be a macro.
    pub fn read_fetch_attribute(&mut self) -> FetchAttribute {
        if !self.is_valid() {
            return FetchAttribute::Simple(SimpleAttribute::Flags);
        }

        let name = self.read_atom();
        if !self.is_valid() {
            if self.clear_mismatch() {
                return self.read_body_section();
            }
            return FetchAttribute::Simple(SimpleAttribute::Flags);
        }

        self.fetch_attribute_named(name)
            .unwrap_or(FetchAttribute::Simple(SimpleAttribute::Flags))
    }

    fn fetch_attribute_named(
        &mut self,
        name: String,
    ) -> Option<FetchAttribute> {
        let attribute = FetchAttribute::from_name(&name);
        if attribute.is_none() {
            self.fail(Error::UnknownField(name));
        }
        attribute
    }

    /// Read `BODY[section]<partial>` or its `BODY.PEEK` form.
    fn read_body_section(&mut self) -> FetchAttribute {
        let section = self.read_body_section_inner();
        self.set_in_section(false);
        FetchAttribute::Body(section)
    }

    fn read_body_section_inner(&mut self) -> BodySection {
        let mut section = BodySection {
            peek: false,
            part: String::new(),
            mode: SectionMode::Full,
            header_list: Vec::new(),
            partial: None,
        };

        self.expect("BODY");
        section.peek = self.accept(".PEEK");
        self.expect("[");
        if !self.is_valid() {
            return section;
        }
        self.set_in_section(true);

        if b'.' == self.peek() {
            self.fail(Error::InvalidPartSpecifier);
            return section;
        }

        // Whether the last thing consumed was the `.` before a mode.
        let mut dangling_dot = false;
        while (b'1'..=b'9').contains(&self.peek()) {
            let n = self.read_number();
            if !section.part.is_empty() {
                section.part.push('.');
            }
            section.part.push_str(&n.to_string());

            dangling_dot = self.accept(".");
            if !dangling_dot {
                break;
            }
        }

        let next = self.peek();
        if !self.is_valid() {
            return section;
        }

        if dangling_dot || (b' ' != next && b']' != next) {
            let name = self.read_atom();
            if !self.is_valid() {
                self.replace_error(Error::InvalidPartSpecifier);
                return section;
            }

            match SectionMode::from_name(&name) {
                Some(mode) => section.mode = mode,
                None => {
                    self.fail(Error::InvalidPartSpecifier);
                    return section;
                },
            }

            if section.mode.has_header_list() {
                self.read_space();
                section.header_list = self.read_string_list();
                if self.is_valid() && section.header_list.is_empty() {
                    self.fail(Error::InvalidPartSpecifier);
                }
            }
        }

        self.expect("]");
        self.set_in_section(false);

        if self.accept("<") {
            let offset = self.read_number();
            self.expect(".");
            let length = self.read_number();
            self.expect(">");
            section.partial = Some(Partial { offset, length });
        }

        section
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::imap::parser::parser_for;

    fn fetch(input: &str) -> Vec<FetchAttribute> {
        let mut p = parser_for(input);
        let attributes = p.read_fetch_attributes().unwrap();
        p.read_eol();
        p.finish(()).unwrap();
        attributes
    }

    fn fetch_err(input: &str) -> Error {
        parser_for(input).read_fetch_attributes().unwrap_err()
    }

    fn section(input: &str) -> BodySection {
        match fetch(input).pop() {
            Some(FetchAttribute::Body(section)) => section,
            other => panic!("unexpected attribute: {:?}", other),
        }
    }

    #[test]
    fn header_fields() {
        let s = section("BODY[HEADER.FIELDS (DATE FROM)]");
        assert!(!s.peek);
        assert_eq!("", s.part);
        assert_eq!(SectionMode::HeaderFields, s.mode);
        assert_eq!(vec!["DATE", "FROM"], s.header_list);
        assert_eq!(None, s.partial);

        let s = section(
            "body.peek[2.header.fields.not (\"Subject\" {2+}\r\nTo)]",
        );
        assert!(s.peek);
        assert_eq!("2", s.part);
        assert_eq!(SectionMode::HeaderFieldsNot, s.mode);
        assert_eq!(vec!["Subject", "To"], s.header_list);
    }

    #[test]
    fn macros() {
        use super::SimpleAttribute::*;

        assert_eq!(
            vec![
                FetchAttribute::Simple(Flags),
                FetchAttribute::Simple(InternalDate),
                FetchAttribute::Simple(Rfc822Size),
            ],
            fetch("FAST")
        );
        assert_eq!(
            vec![
                FetchAttribute::Simple(Flags),
                FetchAttribute::Simple(InternalDate),
                FetchAttribute::Simple(Rfc822Size),
                FetchAttribute::Simple(Envelope),
            ],
            fetch("all")
        );
        assert_eq!(
            vec![
                FetchAttribute::Simple(Flags),
                FetchAttribute::Simple(InternalDate),
                FetchAttribute::Simple(Rfc822Size),
                FetchAttribute::Simple(Envelope),
                FetchAttribute::BodyStructure { extensions: false },
            ],
            fetch("FULL")
        );
    }

    #[test]
    fn single_attributes() {
        assert_eq!(
            vec![FetchAttribute::Simple(SimpleAttribute::Rfc822Header)],
            fetch("rfc822.header")
        );
        assert_eq!(
            vec![FetchAttribute::BodyStructure { extensions: false }],
            fetch("BODY")
        );
        assert_eq!(
            vec![FetchAttribute::BodyStructure { extensions: true }],
            fetch("BODYSTRUCTURE")
        );
        assert_eq!(SectionMode::Full, section("BODY[]").mode);
    }

    #[test]
    fn lists() {
        let attributes = fetch("(FLAGS BODY.PEEK[1.2.TEXT]<0.100> UID)");
        assert_eq!(3, attributes.len());
        assert_eq!(
            FetchAttribute::Simple(SimpleAttribute::Flags),
            attributes[0]
        );
        assert_eq!(
            FetchAttribute::Body(BodySection {
                peek: true,
                part: "1.2".to_owned(),
                mode: SectionMode::Text,
                header_list: vec![],
                partial: Some(Partial {
                    offset: 0,
                    length: 100,
                }),
            }),
            attributes[1]
        );
        assert_eq!(FetchAttribute::Simple(SimpleAttribute::Uid), attributes[2]);

        assert_eq!(1, fetch("(BODY[3])").len());
        assert_matches!(Error::Expected { .. }, fetch_err("(FLAGS UID"));
        assert_matches!(Error::UnknownField(..), fetch_err("(FLAGS ALL)"));
    }

    #[test]
    fn part_paths() {
        assert_eq!("1", section("BODY[1]").part);
        assert_eq!("4.2.10", section("BODY[4.2.10]").part);
        let s = section("BODY[3.HEADER]");
        assert_eq!("3", s.part);
        assert_eq!(SectionMode::Header, s.mode);
    }

    #[test]
    fn section_errors() {
        assert_matches!(Error::InvalidPartSpecifier, fetch_err("BODY[.TEXT]"));
        assert_matches!(Error::InvalidPartSpecifier, fetch_err("BODY[MIME]"));
        assert_matches!(Error::InvalidPartSpecifier, fetch_err("BODY[1.]"));
        assert_matches!(Error::InvalidPartSpecifier, fetch_err("BODY[0]"));
        assert_matches!(
            Error::InvalidPartSpecifier,
            fetch_err("BODY[HEADER.FIELDS ()]")
        );
        assert_matches!(
            Error::Expected { .. },
            fetch_err("BODY[HEADER.FIELDS]")
        );
        assert_matches!(
            Error::Expected { .. },
            fetch_err("BODY[HEADER.FIELDS (DATE {)]")
        );
        assert_matches!(Error::Expected { .. }, fetch_err("BODY[TEXT"));
        assert_matches!(Error::Expected { .. }, fetch_err("BODY[]<1>"));
        assert_matches!(Error::UnknownField(..), fetch_err("FOO"));
        assert_matches!(Error::Expected { .. }, fetch_err("RFC822[]"));
    }

    #[test]
    fn display() {
        assert_eq!(
            "BODY[1.HEADER.FIELDS (\"DATE\" \"X-\\\"Q\\\"\")]<0>",
            section("BODY.PEEK[1.HEADER.FIELDS (DATE \"X-\\\"Q\\\"\")]<0.10>")
                .to_string()
        );
        assert_eq!("BODY[TEXT]", section("BODY[TEXT]").to_string());
        assert_eq!("BODY[]", section("BODY[]").to_string());
        assert_eq!("BODY[2]", section("BODY[2]").to_string());
        assert_eq!(
            "RFC822.SIZE",
            FetchAttribute::Simple(SimpleAttribute::Rfc822Size).to_string()
        );
        assert_eq!(
            "BODYSTRUCTURE",
            FetchAttribute::BodyStructure { extensions: true }.to_string()
        );
    }

    #[test]
    fn partial_clamping() {
        let data = b"0123456789";
        let partial = |offset, length| Partial { offset, length };
        assert_eq!(b"234", partial(2, 3).apply(data));
        assert_eq!(b"89", partial(8, 100).apply(data));
        assert_eq!(b"", partial(20, 5).apply(data));
        assert_eq!(b"", partial(3, 0).apply(data));
        assert_eq!(data, partial(0, u32::MAX).apply(data));
    }
}
