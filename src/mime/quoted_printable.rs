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

use std::borrow::Cow;

/// Decodes the "Q" encoding used in RFC 2047 encoded words.
///
/// This is the quoted-printable encoding from RFC 2045 minus soft line
/// breaks (an encoded word cannot span lines), plus `_` standing for ASCII
/// space regardless of charset.
///
/// This never fails. An `=` not followed by two hex digits is passed through
/// verbatim, as are 8-bit bytes and characters which RFC 2047 says should
/// have been encoded.
pub fn q_decode(s: &[u8]) -> Cow<[u8]> {
    if !s.iter().any(|&b| b'=' == b || b'_' == b) {
        return Cow::Borrowed(s);
    }

    let mut transformed = Vec::with_capacity(s.len());
    let mut ix = 0;
    while ix < s.len() {
        match s[ix] {
            b'_' => {
                transformed.push(b' ');
                ix += 1;
            }

            b'=' => {
                if let Some(byte) = s.get(ix + 1..ix + 3).and_then(hex_pair) {
                    transformed.push(byte);
                    ix += 3;
                } else {
                    transformed.push(b'=');
                    ix += 1;
                }
            }

            b => {
                transformed.push(b);
                ix += 1;
            }
        }
    }

    Cow::Owned(transformed)
}

fn hex_pair(pair: &[u8]) -> Option<u8> {
    let hi = char::from(pair[0]).to_digit(16)?;
    let lo = char::from(pair[1]).to_digit(16)?;
    Some((hi << 4 | lo) as u8)
}
