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

//! Conversion of text in arbitrary named charsets to UTF-8.

use std::borrow::Cow;
use std::fmt;

use encoding_rs::Encoding;

use super::utf7;

/// A charset which we know how to transcode to UTF-8.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    /// Anything `encoding_rs` supports, which is everything in the WHATWG
    /// Encoding Standard.
    Whatwg(&'static Encoding),
    /// UTF-7, which the WHATWG standard omits on purpose.
    Utf7,
}

impl Charset {
    /// Look up a charset by its MIME name or any of its aliases.
    ///
    /// Returns `None` for unknown labels, and for labels which the WHATWG
    /// standard maps to the "replacement" encoding (such as ISO-2022-KR),
    /// since decoding those would just produce a single U+FFFD.
    pub fn for_label(label: &str) -> Option<Self> {
        let label = label.trim();
        if "utf-7".eq_ignore_ascii_case(label)
            || "utf7".eq_ignore_ascii_case(label)
        {
            return Some(Charset::Utf7);
        }

        // RFC 2231 allows a language suffix on the charset of an encoded
        // word, e.g. `US-ASCII*EN`.
        let label = label.split('*').next().unwrap_or(label);
        Encoding::for_label_no_replacement(label.as_bytes())
            .map(Charset::Whatwg)
    }

    /// Transcode `content` to UTF-8.
    ///
    /// Malformed input sequences become U+FFFD. A leading byte-order mark is
    /// removed.
    pub fn decode<'a>(&self, content: &'a [u8]) -> Cow<'a, str> {
        match *self {
            Charset::Whatwg(encoding) => {
                encoding.decode_with_bom_removal(content).0
            }
            Charset::Utf7 => utf7::decode(content),
        }
    }

    pub fn name(&self) -> &'static str {
        match *self {
            Charset::Whatwg(encoding) => encoding.name(),
            Charset::Utf7 => "UTF-7",
        }
    }
}

impl fmt::Debug for Charset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Charset({})", self.name())
    }
}

/// Transcode `content` from the charset named `label` to UTF-8.
///
/// Returns `None` if the charset is not known.
pub fn transcode<'a>(label: &str, content: &'a [u8]) -> Option<Cow<'a, str>> {
    Charset::for_label(label).map(|charset| charset.decode(content))
}
