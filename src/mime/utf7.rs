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

//! Decoding of standard UTF-7 (RFC 2152).
//!
//! `encoding_rs` deliberately does not support UTF-7, but it still turns up
//! in encoded words produced by old agents.

use std::borrow::Cow;

const SHIFT_IN: u8 = b'+';
const SHIFT_OUT: u8 = b'-';

/// Decode `src` from UTF-7.
///
/// Decoding is extremely permissive. 8-bit bytes and other non-direct
/// characters are passed through (lossily, if they are not UTF-8). The
/// shift-out character is not required at the end or before a non-base-64
/// character. A base-64 run which cannot be decoded is passed through
/// verbatim.
pub fn decode(src: &[u8]) -> Cow<str> {
    if !src.contains(&SHIFT_IN) {
        return String::from_utf8_lossy(src);
    }

    let mut transformed = String::with_capacity(src.len());
    let mut utf16 = Vec::new();
    let mut ix = 0;

    while ix < src.len() {
        if SHIFT_IN != src[ix] {
            let end = memchr::memchr(SHIFT_IN, &src[ix..])
                .map_or(src.len(), |off| ix + off);
            transformed.push_str(&String::from_utf8_lossy(&src[ix..end]));
            ix = end;
            continue;
        }

        let base64_start = ix + 1;
        let base64_end = src[base64_start..]
            .iter()
            .position(|&ch| !is_base64_char(ch))
            .map_or(src.len(), |off| base64_start + off);

        if base64_start == base64_end {
            // Either the `+-` escape or a stray `+`; both mean a literal `+`.
            transformed.push('+');
        } else {
            utf16.clear();
            if base64::decode_config_buf(
                &src[base64_start..base64_end],
                base64::STANDARD_NO_PAD.decode_allow_trailing_bits(true),
                &mut utf16,
            )
            .is_ok()
            {
                let units = utf16
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect::<Vec<_>>();
                transformed.push_str(&String::from_utf16_lossy(&units));
            } else {
                transformed
                    .push_str(&String::from_utf8_lossy(&src[ix..base64_end]));
            }
        }

        ix = if Some(&SHIFT_OUT) == src.get(base64_end) {
            base64_end + 1
        } else {
            base64_end
        };
    }

    Cow::Owned(transformed)
}

fn is_base64_char(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || b'+' == ch || b'/' == ch
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::*;

    fn d(s: &str) -> String {
        decode(s.as_bytes()).into_owned()
    }

    #[test]
    fn std_decode() {
        assert_eq!("hello world", d("hello world"));
        assert_eq!("~peter\\lost+found", d("+AH4-peter+AFw-lost+-found"));
        // Examples from RFC 2152
        assert_eq!("Hi Mom ☺!", d("Hi Mom +Jjo-!"));
        assert_eq!("日本語", d("+ZeVnLIqe-"));
        assert_eq!("A≢Α.", d("A+ImIDkQ."));
        assert_eq!("Item 3 is £1.", d("Item 3 is +AKM-1."));
        // Misc
        assert_eq!("\x00𐀀￠¡¡", d("+AADYANwA/+AAoQCh-"));
    }

    #[test]
    fn decode_pathological() {
        assert_eq!("hello+", d("hello+"));
        assert_eq!("hello+.", d("hello+."));
        assert_eq!("hello+ä", d("hello+ä"));
        assert_eq!("hello~", d("hello+AH4"));
        assert_eq!("bad \u{fffd}", decode(b"bad \xff"));
    }

    proptest! {
        #[test]
        fn decoding_never_fails(
            s in prop::collection::vec(prop::num::u8::ANY, 0..40)
        ) {
            decode(&s);
        }
    }
}
