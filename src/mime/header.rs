//-
// Copyright (c) 2020, 2023, Jason Lingle
//
// This file is part of Letterbox.
//
// Letterbox is free software: you can  redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Letterbox is distributed  in the hope that  it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License
// for more details.
//
// You should have received a copy of the GNU General Public License along with
// Letterbox. If not, see <http://www.gnu.org/licenses/>.

//! Extraction of the RFC 5322 header block at the start of a message.

use std::borrow::Cow;
use std::str;

use log::debug;

use crate::support::error::Error;

/// The default limit on how far into a message the end of the header block
/// is searched for.
pub const MAX_HEADER_BYTES: usize = 32 * 1024;

/// A single header field, with continuation lines unfolded.
///
/// The value is left exactly as written apart from unfolding and trimming;
/// in particular, encoded words are not decoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderField {
    pub name: String,
    pub value: String,
}

/// The header fields of a message, in the order they occur.
///
/// Lookups are case-insensitive on the field name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<HeaderField>,
}

impl Headers {
    /// Return the value of the first field called `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| &f.value[..])
    }

    /// Return the values of every field called `name`.
    pub fn get_all<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |f| f.name.eq_ignore_ascii_case(name))
            .map(|f| &f.value[..])
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderField> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Find the end of the header block in `data`.
///
/// Returns the index just past the blank line which separates the headers
/// from the body. Both DOS and UNIX line endings are understood, as is a
/// message which starts with the blank line (i.e., has no headers at all).
pub fn find_header_end(data: &[u8]) -> Option<usize> {
    if data.starts_with(b"\n") {
        return Some(1);
    }
    if data.starts_with(b"\r\n") {
        return Some(2);
    }

    memchr::memchr_iter(b'\n', data).find_map(|lf| {
        let rest = &data[lf + 1..];
        if rest.starts_with(b"\n") {
            Some(lf + 2)
        } else if rest.starts_with(b"\r\n") {
            Some(lf + 3)
        } else {
            None
        }
    })
}

/// Parse the header block at the start of `data`.
///
/// Only the first `limit` bytes are examined. If no complete header block is
/// found in that window, `Error::HeaderParseIncomplete` is returned.
pub fn parse_header_block(data: &[u8], limit: usize) -> Result<Headers, Error> {
    let window = &data[..data.len().min(limit)];
    let end = find_header_end(window).ok_or(Error::HeaderParseIncomplete)?;
    Ok(split_fields(&window[..end]))
}

fn split_fields(block: &[u8]) -> Headers {
    let mut fields = Vec::<HeaderField>::new();
    // Whether the most recent line started a field that continuation lines
    // may extend
    let mut open = false;

    for line in block.split(|&b| b'\n' == b) {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }

        if b' ' == line[0] || b'\t' == line[0] {
            if !open {
                continue;
            }

            if let Some(field) = fields.last_mut() {
                let continuation = String::from_utf8_lossy(line);
                let continuation = trim_wsp(&continuation);
                if !continuation.is_empty() {
                    if !field.value.is_empty() {
                        field.value.push(' ');
                    }
                    field.value.push_str(continuation);
                }
            }
            continue;
        }

        open = false;
        let mut split = line.splitn(2, |&b| b':' == b);
        let (name, value) = match (split.next(), split.next()) {
            (Some(name), Some(value)) => (name, value),
            _ => {
                debug!("Ignoring header line without colon");
                continue;
            }
        };

        let name = match str::from_utf8(name) {
            Ok(name) => trim_wsp(name),
            Err(_) => {
                debug!("Ignoring header with non-UTF-8 name");
                continue;
            }
        };
        if name.is_empty() || name.contains(|c: char| c.is_whitespace()) {
            debug!("Ignoring header with invalid name {:?}", name);
            continue;
        }

        let value: Cow<str> = String::from_utf8_lossy(value);
        fields.push(HeaderField {
            name: name.to_owned(),
            value: trim_wsp(&value).to_owned(),
        });
        open = true;
    }

    Headers { fields }
}

fn trim_wsp(s: &str) -> &str {
    s.trim_matches(|c| ' ' == c || '\t' == c)
}
