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
use std::str;

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use super::charset::Charset;
use super::quoted_printable::q_decode;

lazy_static! {
    // charset ? encoding ? encoded-text, each made of printable ASCII other
    // than `?` and space.
    static ref ENCODED_WORD: Regex =
        Regex::new(r"^=\?([!->@-~]+)\?([!->@-~]+)\?([!->@-~]*)\?=").unwrap();
}

/// An encoded word which has been found and decoded down to raw bytes, but
/// not yet transcoded out of its charset.
#[derive(Debug)]
struct RawWord<'a> {
    charset: Charset,
    content: Cow<'a, [u8]>,
    /// The length of the encoded word in the source text.
    len: usize,
}

/// Find the extent of an encoded word at the very start of `s`.
///
/// Only the syntax is checked. Returns the length of the word.
fn encoded_word_len(s: &str) -> Option<usize> {
    ENCODED_WORD.find(s).map(|m| m.end())
}

/// Parse and decode the encoded word at the start of `s`.
///
/// Returns `None` if there is no encoded word there, or if it uses an unknown
/// charset or transfer encoding, or if its content is malformed.
fn raw_word(s: &str) -> Option<RawWord<'_>> {
    // RFC 2047 specifies the maximum length of an encoded word as 75
    // characters. However, there are agents that produce longer encoded words,
    // and Thunderbird at least will interpret them, so we do the same.
    let captures = ENCODED_WORD.captures(s)?;
    let whole = captures.get(0)?;
    let charset_label = captures.get(1)?.as_str();
    let transfer_encoding = captures.get(2)?.as_str();
    let payload = captures.get(3)?.as_str().as_bytes();

    let charset = match Charset::for_label(charset_label) {
        Some(charset) => charset,
        None => {
            debug!(
                "Leaving encoded word with unknown charset {:?}",
                charset_label
            );
            return None;
        }
    };

    let content = match transfer_encoding {
        "q" | "Q" => q_decode(payload),
        "b" | "B" => match decode_base64(payload) {
            Some(content) => Cow::Owned(content),
            None => {
                debug!(
                    "Leaving encoded word with bad base64 {:?}",
                    whole.as_str()
                );
                return None;
            }
        },
        _ => {
            debug!(
                "Leaving encoded word with unknown encoding {:?}",
                transfer_encoding
            );
            return None;
        }
    };

    Some(RawWord {
        charset,
        content,
        len: whole.end(),
    })
}

fn decode_base64(payload: &[u8]) -> Option<Vec<u8>> {
    // Some agents drop the padding.
    let unpadded = match payload.iter().position(|&b| b'=' == b) {
        Some(pad) => &payload[..pad],
        None => payload,
    };
    base64::decode_config(
        unpadded,
        base64::STANDARD_NO_PAD.decode_allow_trailing_bits(true),
    )
    .ok()
}

/// Test if `word` (in its entirety) is an RFC 2047 "encoded word".
///
/// If it is, decode it and return its decoded value.
///
/// Returns `None` if it is not an encoded word or if it could not be decoded.
/// A lone encoded word cannot have a character split across a word boundary,
/// so for whole header values use `decode_header_value` instead.
pub fn ew_decode(word: &str) -> Option<Cow<str>> {
    let raw = raw_word(word)?;
    if raw.len != word.len() {
        return None;
    }

    Some(match raw.content {
        Cow::Borrowed(content) => raw.charset.decode(content),
        Cow::Owned(content) => {
            Cow::Owned(raw.charset.decode(&content).into_owned())
        }
    })
}

/// Determine whether another encoded word follows position `pos` of `s`,
/// separated from it by nothing but whitespace.
///
/// `pos` is normally the index just past the end of an encoded word. Returns
/// the index at which the next encoded word starts, or `None` if the
/// whitespace is followed by anything else, including a partial or
/// malformed encoded word.
///
/// Only the syntax of the following word is checked; it may still turn out to
/// be undecodable.
pub fn has_encoded_word_ahead(s: &str, pos: usize) -> Option<usize> {
    let rest = s.get(pos..)?;
    let start = pos + (rest.len() - rest.trim_start_matches(is_lwsp).len());
    encoded_word_len(&s[start..]).map(|_| start)
}

fn is_lwsp(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// A run of adjacent encoded words in the same charset, whose raw bytes are
/// transcoded together.
struct Run {
    charset: Charset,
    content: Vec<u8>,
}

impl Run {
    fn flush(self, dst: &mut String) {
        dst.push_str(&self.charset.decode(&self.content));
    }
}

/// Decode all RFC 2047 encoded words in the header value `s`.
///
/// `s` is expected to be unfolded already. Text outside encoded words is
/// passed through unchanged, as is any encoded word which cannot be decoded.
///
/// Whitespace between two adjacent encoded words is dropped, as RFC 2047
/// requires. The raw bytes of adjacent words in the same charset are joined
/// before being transcoded, since agents frequently split the encoded form
/// of a multi-byte character across two words. Adjacent words in different
/// charsets are transcoded separately.
pub fn decode_header_value(s: &str) -> Cow<str> {
    if !s.contains("=?") {
        return Cow::Borrowed(s);
    }

    let mut transformed = String::with_capacity(s.len());
    // Start of text not yet copied to `transformed`
    let mut plain_start = 0;
    let mut search_start = 0;

    while let Some(offset) = s[search_start..].find("=?") {
        let word_start = search_start + offset;
        let first = match raw_word(&s[word_start..]) {
            Some(word) => word,
            None => {
                search_start = word_start + 2;
                continue;
            }
        };

        transformed.push_str(&s[plain_start..word_start]);
        let mut end = word_start + first.len;
        let mut run = Run {
            charset: first.charset,
            content: first.content.into_owned(),
        };

        while let Some(next_start) = has_encoded_word_ahead(s, end) {
            let next = match raw_word(&s[next_start..]) {
                Some(next) => next,
                None => break,
            };

            if next.charset == run.charset {
                run.content.extend_from_slice(&next.content);
            } else {
                run.flush(&mut transformed);
                run = Run {
                    charset: next.charset,
                    content: next.content.into_owned(),
                };
            }

            end = next_start + next.len;
        }

        run.flush(&mut transformed);
        plain_start = end;
        search_start = end;
    }

    if 0 == plain_start {
        // Nothing was decodable
        Cow::Borrowed(s)
    } else {
        transformed.push_str(&s[plain_start..]);
        Cow::Owned(transformed)
    }
}
