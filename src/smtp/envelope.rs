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

//! The state of one mail transaction.

use std::fmt::{self, Write as _};
use std::io::{self, Read};

use chrono::prelude::*;
use log::{debug, info};
use tiny_keccak::{Hasher, Sha3};

use super::address::Address;
use crate::mime::encoded_word::decode_header_value;
use crate::mime::header::{parse_header_block, Headers, MAX_HEADER_BYTES};
use crate::support::error::Error;
use crate::support::log_prefix::LogPrefix;

/// The raw bytes of a message as received in the `DATA` phase.
///
/// The buffer is append-only; line endings and everything else are kept
/// exactly as received.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageData(Vec<u8>);

impl MessageData {
    pub fn extend_from_slice(&mut self, data: &[u8]) {
        self.0.extend_from_slice(data);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn clear(&mut self) {
        self.0.clear();
    }
}

impl io::Write for MessageData {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AsRef<[u8]> for MessageData {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A single mail transaction and the connection it arrived on.
///
/// An envelope belongs to exactly one session. Nothing here is synchronised;
/// the session layer drives it from one thread.
#[derive(Clone, Debug)]
pub struct Envelope {
    /// The peer's IP address, as text.
    pub remote_ip: String,
    pub remote_port: u16,
    /// The host name or address of the listener the connection arrived on.
    pub listen_host: String,
    pub listen_port: u16,
    /// Unique identifier for this transaction, used in logs and the
    /// `Received` header.
    pub queued_id: String,
    /// The name the peer gave in `HELO`/`EHLO`.
    pub helo: String,
    pub mail_from: Address,
    /// Recipients in the order they were accepted. Duplicates are allowed.
    pub rcpt_to: Vec<Address>,
    pub data: MessageData,
    /// Text streamed ahead of `data`. It is never stored inside `data`.
    pub delivery_header: String,
    pub tls: bool,
    /// Whether the peer greeted with `EHLO`.
    pub esmtp: bool,
    /// The login the peer authenticated as, or empty.
    pub authorized_login: String,
    pub opened_at: DateTime<Utc>,

    subject: String,
    headers: Headers,
}

impl Envelope {
    pub fn new(remote_ip: &str, remote_port: u16) -> Self {
        let opened_at = Utc::now();
        Envelope {
            remote_ip: remote_ip.to_owned(),
            remote_port,
            listen_host: String::new(),
            listen_port: 0,
            queued_id: generate_queued_id(opened_at, remote_ip, remote_port),
            helo: String::new(),
            mail_from: Address::default(),
            rcpt_to: Vec::new(),
            data: MessageData::default(),
            delivery_header: String::new(),
            tls: false,
            esmtp: false,
            authorized_login: String::new(),
            opened_at,
            subject: String::new(),
            headers: Headers::default(),
        }
    }

    pub fn log_prefix(&self) -> LogPrefix<'_> {
        LogPrefix::new("SMTP")
            .with_queued_id(&self.queued_id)
            .with_remote_ip(&self.remote_ip)
            .with_helo(&self.helo)
    }

    pub fn push_rcpt(&mut self, rcpt: Address) {
        debug!("{} Recipient <{}>", self.log_prefix(), rcpt);
        self.rcpt_to.push(rcpt);
    }

    /// Remove and return the most recently added recipient.
    pub fn pop_rcpt(&mut self) -> Option<Address> {
        self.rcpt_to.pop()
    }

    /// The exact number of bytes `reader()` will produce.
    pub fn len(&self) -> usize {
        self.delivery_header.len() + self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        0 == self.len()
    }

    /// Stream the delivery header followed by the message data.
    pub fn reader(&self) -> EnvelopeReader<'_> {
        EnvelopeReader {
            header: self.delivery_header.as_bytes(),
            data: self.data.as_bytes(),
        }
    }

    /// Parse the header block at the start of `data` and derive the subject
    /// from it.
    ///
    /// If `data` does not yet hold a complete header block, the derived
    /// values are cleared and `Error::HeaderParseIncomplete` is returned.
    /// This is not fatal and the call may be repeated once more data has
    /// arrived.
    pub fn parse_headers(&mut self) -> Result<(), Error> {
        self.parse_headers_limited(MAX_HEADER_BYTES)
    }

    /// Like `parse_headers()`, but only looks at the first `limit` bytes of
    /// `data`.
    pub fn parse_headers_limited(&mut self, limit: usize) -> Result<(), Error> {
        match parse_header_block(self.data.as_bytes(), limit) {
            Ok(headers) => {
                self.subject = headers
                    .get("Subject")
                    .map(|s| decode_header_value(s).into_owned())
                    .unwrap_or_default();
                self.headers = headers;
                Ok(())
            }
            Err(e) => {
                debug!("{} No header block: {}", self.log_prefix(), e);
                self.subject.clear();
                self.headers = Headers::default();
                Err(e)
            }
        }
    }

    /// The decoded `Subject`, or empty if there is none or `parse_headers()`
    /// has not succeeded.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The header fields found by the last `parse_headers()`.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Discard everything about the current transaction, keeping only what
    /// is known about the connection.
    pub fn reset_transaction(&mut self) {
        self.mail_from = Address::default();
        self.rcpt_to.clear();
        self.data.clear();
        self.delivery_header.clear();
        self.subject.clear();
        self.headers = Headers::default();
    }

    /// Reuse this envelope for a new connection.
    pub fn reseed(&mut self, remote_ip: &str, remote_port: u16) {
        self.opened_at = Utc::now();
        self.remote_ip = remote_ip.to_owned();
        self.remote_port = remote_port;
        self.queued_id =
            generate_queued_id(self.opened_at, remote_ip, remote_port);
        self.helo.clear();
        self.tls = false;
        self.esmtp = false;
        self.authorized_login.clear();
        self.reset_transaction();
    }

    /// Prepend `Delivered-To` and `Received` trace fields to the delivery
    /// header.
    ///
    /// `host_name` is the name this server identifies itself by.
    pub fn add_delivery_header(&mut self, host_name: &str) {
        let mut s = String::new();
        for rcpt in &self.rcpt_to {
            let _ = write!(
                s,
                "Delivered-To: {}\r\n",
                make_header_safe(&rcpt.to_string())
            );
        }

        // RFC 5321 § 4.4
        let _ = write!(s, "Received: from ");
        if self.helo.is_empty() {
            let _ = write!(s, "{}", self.remote_ip);
        } else {
            let _ = write!(
                s,
                "{} ({})",
                make_header_safe(&self.helo),
                self.remote_ip
            );
        }
        let _ = write!(
            s,
            "\r\n\tby {host} ({svc} {ver})\r\n\
             \twith {protocol} id {id}",
            host = make_header_safe(host_name),
            svc = env!("CARGO_PKG_NAME"),
            ver = env!("CARGO_PKG_VERSION"),
            protocol = self.protocol(),
            id = self.queued_id,
        );
        // Only name the recipient when there's exactly one, so that the
        // other recipients of a multi-recipient transaction aren't disclosed
        if let [rcpt] = &self.rcpt_to[..] {
            let _ = write!(
                s,
                "\r\n\tfor <{}>",
                make_header_safe(&rcpt.to_string())
            );
        }
        let _ = write!(s, ";\r\n\t{}\r\n", Utc::now().to_rfc2822());

        info!("{} Adding delivery header for {}", self.log_prefix(), self);
        s.push_str(&self.delivery_header);
        self.delivery_header = s;
    }

    // RFC 3848 protocol names
    fn protocol(&self) -> &'static str {
        match (self.esmtp, self.tls, !self.authorized_login.is_empty()) {
            (false, _, _) => "SMTP",
            (true, false, false) => "ESMTP",
            (true, true, false) => "ESMTPS",
            (true, false, true) => "ESMTPA",
            (true, true, true) => "ESMTPSA",
        }
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: from <{}> to ", self.queued_id, self.mail_from)?;
        for (ix, rcpt) in self.rcpt_to.iter().enumerate() {
            if ix > 0 {
                write!(f, ", ")?;
            }
            write!(f, "<{}>", rcpt)?;
        }
        Ok(())
    }
}

/// Reads an envelope's delivery header and then its data, without joining
/// them into one buffer.
#[derive(Clone, Debug)]
pub struct EnvelopeReader<'a> {
    header: &'a [u8],
    data: &'a [u8],
}

impl EnvelopeReader<'_> {
    /// The number of bytes not yet read.
    pub fn remaining(&self) -> usize {
        self.header.len() + self.data.len()
    }
}

impl Read for EnvelopeReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.header.is_empty() {
            self.header.read(buf)
        } else {
            self.data.read(buf)
        }
    }
}

fn generate_queued_id(
    opened_at: DateTime<Utc>,
    remote_ip: &str,
    remote_port: u16,
) -> String {
    let mut hash = Sha3::v256();
    hash.update(opened_at.to_rfc3339().as_bytes());
    hash.update(remote_ip.as_bytes());
    hash.update(&remote_port.to_be_bytes());
    hash.update(&rand::random::<[u8; 16]>());

    let mut digest = [0u8; 32];
    hash.finalize(&mut digest);

    let mut id = String::with_capacity(32);
    for b in &digest[..16] {
        let _ = write!(id, "{:02x}", b);
    }
    id
}

/// Strip anything from peer-supplied text that could break out of the
/// header field it is written into.
fn make_header_safe(s: &str) -> String {
    const MAX_LEN: usize = 200;

    s.chars()
        .filter(|c| !c.is_control())
        .take(MAX_LEN)
        .collect()
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use proptest::prelude::*;

    use super::*;
    use crate::test_data::*;

    fn address(user: &str, host: &str) -> Address {
        Address {
            user: user.to_owned(),
            host: host.to_owned(),
            ..Address::default()
        }
    }

    fn sample_envelope() -> Envelope {
        let mut e = Envelope::new("127.0.0.1", 22);
        e.queued_id = "abc123".to_owned();
        e.helo = "helo.example.com".to_owned();
        e.mail_from = address("test", "example.com");
        e.tls = true;
        e.remote_ip = "222.111.233.121".to_owned();

        let to = address("test", "example.com");
        assert_eq!("test@example.com", to.to_string());
        e.push_rcpt(to);
        e
    }

    fn drain(e: &Envelope) -> Vec<u8> {
        let mut out = Vec::new();
        e.reader().read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn len_matches_stream() {
        let mut e = sample_envelope();
        e.data.extend_from_slice(
            b"Subject: Test\n\nThis is a test nbnb nbnb hgghgh nnnbnb nbnbnb nbnbn.",
        );
        e.delivery_header = format!(
            "Delivered-To: {}\nReceived: from {} ({}  [{}])\n",
            e.rcpt_to[0], e.helo, e.helo, e.remote_ip
        );

        let data = drain(&e);
        assert_eq!(e.len(), data.len());
        assert!(data.starts_with(b"Delivered-To: test@example.com\n"));
        assert!(data.ends_with(b"nbnbn."));

        e.parse_headers().unwrap();
        assert_eq!("Test", e.subject());
    }

    #[test]
    fn reader_handles_small_buffers() {
        let mut e = sample_envelope();
        e.delivery_header = "X-Head: 1\r\n".to_owned();
        e.data.extend_from_slice(b"Subject: hi\r\n\r\nbody");

        let mut reader = e.reader();
        assert_eq!(e.len(), reader.remaining());

        let mut out = Vec::new();
        let mut buf = [0u8; 3];
        loop {
            let n = reader.read(&mut buf).unwrap();
            if 0 == n {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }

        assert_eq!(0, reader.remaining());
        assert_eq!(&b"X-Head: 1\r\nSubject: hi\r\n\r\nbody"[..], &out[..]);
    }

    #[test]
    fn empty_envelope_streams_nothing() {
        let e = Envelope::new("127.0.0.1", 25);
        assert!(e.is_empty());
        assert!(drain(&e).is_empty());
    }

    #[test]
    fn parse_subject_of_list_message() {
        let mut e = sample_envelope();
        e.data.extend_from_slice(DEBIAN_BUG_1024883);
        e.delivery_header = format!(
            "Delivered-To: {}\nReceived: from {} ({}  [{}])\n",
            e.rcpt_to[0], e.helo, e.helo, e.remote_ip
        );

        assert_eq!(e.len(), drain(&e).len());

        e.parse_headers().unwrap();
        assert_eq!(
            "Bug#1024883: Reconsider versioned dependencies of libpinyin-data",
            e.subject()
        );
        assert_eq!(
            Some("kiq1q69q0x@mail.usemail.dev"),
            e.headers().get("delivered-to")
        );
        assert!(e.headers().get_all("Received").count() > 1);
    }

    #[test]
    fn parse_folded_encoded_subject() {
        let mut e = sample_envelope();
        e.data.extend_from_slice(FOLDED_ENCODED_SUBJECT);

        e.parse_headers().unwrap();
        assert_eq!("[大家好] 最新事项 and café", e.subject());
        assert_eq!(
            Some("multipart/alternative; boundary=\"=_boundary_7f3a\""),
            e.headers().get("content-type")
        );
        assert_eq!(
            Some("=?ISO-8859-1?Q?Andr=E9?= Pirard <PIRARD@vm1.ulg.ac.be>"),
            e.headers().get("from")
        );

        let from: Address = e.headers().get("from").unwrap().parse().unwrap();
        assert_eq!("André Pirard", from.display_name);

        // Parsing is idempotent and doesn't touch the data
        let before = e.data.clone();
        e.parse_headers().unwrap();
        assert_eq!("[大家好] 最新事项 and café", e.subject());
        assert_eq!(before, e.data);
    }

    #[test]
    fn incomplete_headers() {
        let mut e = sample_envelope();
        write!(e.data, "Subject: =?utf-8?Q?caf=C3=A9?=\r\n").unwrap();
        assert_matches!(Err(Error::HeaderParseIncomplete), e.parse_headers());
        assert_eq!("", e.subject());
        assert!(e.headers().is_empty());

        write!(e.data, "\r\nbody").unwrap();
        e.parse_headers().unwrap();
        assert_eq!("café", e.subject());

        // A limit which cuts off the separator clears the derived values
        assert_matches!(
            Err(Error::HeaderParseIncomplete),
            e.parse_headers_limited(10)
        );
        assert_eq!("", e.subject());
    }

    #[test]
    fn message_without_subject() {
        let mut e = sample_envelope();
        e.data.extend_from_slice(b"From: a@example.com\n\nbody\n");
        e.parse_headers().unwrap();
        assert_eq!("", e.subject());
        assert_eq!(1, e.headers().len());
    }

    #[test]
    fn recipients() {
        let mut e = sample_envelope();
        e.push_rcpt(address("second", "example.com"));
        e.push_rcpt(address("test", "example.com"));
        assert_eq!(3, e.rcpt_to.len());
        assert_eq!(
            "abc123: from <test@example.com> to <test@example.com>, \
             <second@example.com>, <test@example.com>",
            e.to_string()
        );

        assert_eq!(Some(address("test", "example.com")), e.pop_rcpt());
        assert_eq!(Some(address("second", "example.com")), e.pop_rcpt());
        assert_eq!(1, e.rcpt_to.len());
    }

    #[test]
    fn delivery_header() {
        crate::init_test_log();

        let mut e = sample_envelope();
        e.esmtp = true;
        e.data.extend_from_slice(b"Subject: x\r\n\r\nbody\r\n");
        e.add_delivery_header("mx.example.net");

        let expected_prefix = format!(
            "Delivered-To: test@example.com\r\n\
             Received: from helo.example.com (222.111.233.121)\r\n\
             \tby mx.example.net ({} {})\r\n\
             \twith ESMTPS id abc123\r\n\
             \tfor <test@example.com>;\r\n\t",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
        );
        assert!(
            e.delivery_header.starts_with(&expected_prefix),
            "Unexpected header: {:?}",
            e.delivery_header
        );
        assert!(e.delivery_header.ends_with("\r\n"));
        assert_eq!(e.len(), drain(&e).len());

        // A second pass goes in front of the first
        let first = e.delivery_header.clone();
        e.add_delivery_header("relay.example.net");
        assert!(e.delivery_header.ends_with(&first));
        assert!(e.delivery_header.starts_with("Delivered-To: "));
        assert_eq!(e.len(), drain(&e).len());
    }

    #[test]
    fn delivery_header_for_many_recipients() {
        let mut e = sample_envelope();
        e.push_rcpt(address("other", "example.com"));
        e.authorized_login = "someone".to_owned();
        e.esmtp = true;
        e.tls = false;
        e.add_delivery_header("mx.example.net");

        assert!(e.delivery_header.starts_with(
            "Delivered-To: test@example.com\r\n\
             Delivered-To: other@example.com\r\n"
        ));
        assert!(e.delivery_header.contains("\twith ESMTPA id abc123;\r\n"));
        assert!(!e.delivery_header.contains("for <"));
    }

    #[test]
    fn delivery_header_resists_injection() {
        let mut e = sample_envelope();
        e.helo = "evil\r\nX-Injected: yes".to_owned();
        e.add_delivery_header("mx.example.net");
        assert!(!e.delivery_header.contains("\r\nX-Injected"));
        assert!(e.delivery_header.contains("from evilX-Injected: yes ("));
        assert!(e.delivery_header.contains("\twith SMTP id"));
    }

    #[test]
    fn delivery_header_resists_recipient_injection() {
        let mut e = sample_envelope();
        e.rcpt_to.clear();
        let rcpt =
            Address::parse("<\"x\\\r\\\nX-Injected: yes\"@example.com>")
                .unwrap();
        assert_eq!("x\r\nX-Injected: yes", rcpt.user);
        e.push_rcpt(rcpt);
        e.add_delivery_header("mx.example.net");

        assert!(!e.delivery_header.contains("\r\nX-Injected"));
        assert!(!e.delivery_header.contains("\nX-Injected"));
        assert!(e.delivery_header.starts_with("Delivered-To: \"x\\"));
        assert!(e.delivery_header.contains("\tfor <\"x\\"));
        assert_eq!(e.len(), drain(&e).len());
    }

    #[test]
    fn queued_ids() {
        let a = Envelope::new("127.0.0.1", 22);
        let b = Envelope::new("127.0.0.1", 22);
        assert_eq!(32, a.queued_id.len());
        assert!(a.queued_id.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_ne!(a.queued_id, b.queued_id);
    }

    #[test]
    fn reset_and_reseed() {
        let mut e = sample_envelope();
        e.esmtp = true;
        e.authorized_login = "someone".to_owned();
        e.data.extend_from_slice(b"Subject: Test\n\nbody");
        e.parse_headers().unwrap();
        e.add_delivery_header("mx.example.net");

        e.reset_transaction();
        assert_eq!(Address::default(), e.mail_from);
        assert!(e.rcpt_to.is_empty());
        assert!(e.data.is_empty());
        assert!(e.delivery_header.is_empty());
        assert_eq!("", e.subject());
        assert!(e.headers().is_empty());
        assert_eq!("helo.example.com", e.helo);
        assert_eq!("abc123", e.queued_id);
        assert!(e.tls);

        e.reseed("192.0.2.1", 2525);
        assert_eq!("192.0.2.1", e.remote_ip);
        assert_eq!(2525, e.remote_port);
        assert_ne!("abc123", e.queued_id);
        assert_eq!(32, e.queued_id.len());
        assert_eq!("", e.helo);
        assert!(!e.tls);
        assert!(!e.esmtp);
        assert_eq!("", e.authorized_login);
        assert!(e.is_empty());
    }

    #[test]
    fn log_prefix_names_transaction() {
        let e = sample_envelope();
        assert_eq!(
            "SMTP[abc123 remote=222.111.233.121 helo=helo.example.com]",
            e.log_prefix().to_string()
        );
    }

    proptest! {
        #[test]
        fn len_always_matches_stream(
            header in ".{0,100}",
            chunks in prop::collection::vec(
                prop::collection::vec(prop::num::u8::ANY, 0..64), 0..8),
            rcpts in 0usize..4,
        ) {
            let mut e = Envelope::new("127.0.0.1", 22);
            e.delivery_header = header.clone();

            let mut expected = header.into_bytes();
            for (ix, chunk) in chunks.iter().enumerate() {
                if ix < rcpts {
                    e.push_rcpt(address("r", "example.com"));
                }
                e.data.extend_from_slice(chunk);
                expected.extend_from_slice(chunk);

                let streamed = drain(&e);
                prop_assert_eq!(e.len(), streamed.len());
            }

            prop_assert_eq!(expected, drain(&e));
            let _ = e.parse_headers();
        }
    }
}
