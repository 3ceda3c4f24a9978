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
use std::fmt;

/// Text included at the start of every log statement concerning one mail
/// transaction.
///
/// Renders as `PROTOCOL[queued-id remote=ip helo=name]`. Every component is
/// stripped of control characters and truncated, since most of it comes
/// straight from the peer.
#[derive(Clone, Copy, Debug)]
pub struct LogPrefix<'a> {
    protocol: &'static str,
    queued_id: &'a str,
    remote_ip: &'a str,
    helo: &'a str,
}

impl<'a> LogPrefix<'a> {
    pub fn new(protocol: &'static str) -> Self {
        LogPrefix {
            protocol,
            queued_id: "",
            remote_ip: "",
            helo: "",
        }
    }

    pub fn with_queued_id(self, queued_id: &'a str) -> Self {
        LogPrefix { queued_id, ..self }
    }

    pub fn with_remote_ip(self, remote_ip: &'a str) -> Self {
        LogPrefix { remote_ip, ..self }
    }

    pub fn with_helo(self, helo: &'a str) -> Self {
        LogPrefix { helo, ..self }
    }
}

impl fmt::Display for LogPrefix<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.protocol)?;
        if self.queued_id.is_empty()
            && self.remote_ip.is_empty()
            && self.helo.is_empty()
        {
            return Ok(());
        }

        write!(f, "[")?;
        let mut first = true;
        for (label, value) in &[
            ("", self.queued_id),
            ("remote=", self.remote_ip),
            ("helo=", self.helo),
        ] {
            if value.is_empty() {
                continue;
            }

            if !first {
                write!(f, " ")?;
            }
            first = false;
            write!(f, "{}{}", label, sanitise(value))?;
        }
        write!(f, "]")
    }
}

fn sanitise(s: &str) -> Cow<'_, str> {
    const MAX_CHARS: usize = 64;

    let truncated = match s.char_indices().nth(MAX_CHARS) {
        Some((ix, _)) => &s[..ix],
        None => s,
    };

    if truncated.chars().any(char::is_control) {
        let mut owned = truncated.to_owned();
        owned.retain(|c| !c.is_control());
        Cow::Owned(owned)
    } else {
        Cow::Borrowed(truncated)
    }
}
