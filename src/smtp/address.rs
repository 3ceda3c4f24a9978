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

//! Mailbox addresses as found in `MAIL FROM`/`RCPT TO` paths and in the
//! `From`/`To` header fields.
//!
//! The grammar is the union of RFC 5321 `Path` and RFC 5322 `mailbox`: an
//! optional display name, then either a bare `addr-spec` or one in angle
//! brackets (possibly with an obsolete source route). The empty reverse-path
//! `<>` and the domain-less `postmaster` are also accepted.

use std::borrow::Cow;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::{self, FromStr};

use nom::branch::alt;
use nom::bytes::complete::{is_not, take, take_while1};
use nom::character::complete::char;
use nom::combinator::{all_consuming, map, opt, recognize};
use nom::multi::{fold_many0, many0_count, many1, separated_nonempty_list};
use nom::sequence::{delimited, pair, preceded, terminated};
use nom::IResult;

use crate::mime::encoded_word::decode_header_value;
use crate::support::error::Error;

/// A parsed mailbox.
///
/// Exactly one of `null_path` being set or `user` being non-empty holds for
/// any address produced by the parser.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Address {
    /// The local part, with all quoting and escaping removed.
    pub user: String,
    /// The domain, if it was given as a name. Empty for IP literals.
    pub host: String,
    /// The domain, if it was given as an IP literal.
    pub ip: Option<IpAddr>,
    /// Whether this is the empty reverse-path, `<>`.
    pub null_path: bool,
    /// The display name from header-style mailboxes, with encoded words
    /// decoded.
    pub display_name: String,
    /// Whether the local part was written as a quoted string.
    pub quoted: bool,
    /// The domains of an obsolete RFC 5321 source route
    /// (`<@a.example,@b.example:user@host>`). Never rendered.
    pub adl: Vec<String>,
}

impl Address {
    /// The empty reverse-path.
    pub fn null() -> Self {
        Address {
            null_path: true,
            ..Address::default()
        }
    }

    /// Parse a single mailbox.
    ///
    /// An empty (or all-whitespace) string is taken to be the null path, the
    /// same as `<>`.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let malformed = || Error::MalformedAddress(s.to_owned());

        if s.trim().is_empty() {
            return Ok(Address::null());
        }

        let (_, spec) =
            all_consuming(mailbox)(s.as_bytes()).map_err(|_| malformed())?;

        let addr = match spec.addr {
            Some(addr) => addr,
            None => return Ok(Address::null()),
        };

        let user = String::from_utf8(addr.local.text.into_owned())
            .map_err(|_| malformed())?;
        if user.is_empty() {
            return Err(malformed());
        }

        let mut address = Address {
            user,
            quoted: addr.local.quoted,
            display_name: display_name(&spec.name),
            adl: spec
                .route
                .iter()
                .map(|d| String::from_utf8_lossy(d).into_owned())
                .collect(),
            ..Address::default()
        };

        match addr.domain {
            None if address.is_postmaster() => (),
            None => return Err(malformed()),
            Some(DomainSpec::Name(name)) => {
                address.host = str::from_utf8(name)
                    .map_err(|_| malformed())?
                    .to_owned();
            }
            Some(DomainSpec::Literal(literal)) => {
                address.ip = Some(ip_literal(literal).ok_or_else(malformed)?);
            }
        }

        Ok(address)
    }

    pub fn is_null(&self) -> bool {
        self.null_path
    }

    /// Whether this address has neither a local part nor a domain.
    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.host.is_empty() && self.ip.is_none()
    }

    /// Whether this is the special domain-less `postmaster` address.
    pub fn is_postmaster(&self) -> bool {
        self.host.is_empty()
            && self.ip.is_none()
            && self.user.eq_ignore_ascii_case("postmaster")
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        Address::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.null_path {
            return Ok(());
        }

        if is_dot_atom(&self.user) {
            write!(f, "{}", self.user)?;
        } else {
            // Escape exactly what `qtext` rejects; any other escapes present
            // in the original input are dropped.
            write!(f, "\"")?;
            for ch in self.user.chars() {
                if matches!(ch, '"' | '\\' | '\r' | '\n') {
                    write!(f, "\\")?;
                }
                write!(f, "{}", ch)?;
            }
            write!(f, "\"")?;
        }

        match self.ip {
            Some(IpAddr::V4(ip)) => write!(f, "@[{}]", ip),
            Some(IpAddr::V6(ip)) => write!(f, "@[IPv6:{}]", ip),
            None if self.host.is_empty() => Ok(()),
            None => write!(f, "@{}", self.host),
        }
    }
}

fn is_dot_atom(s: &str) -> bool {
    !s.is_empty()
        && s.split('.')
            .all(|atom| !atom.is_empty() && atom.bytes().all(is_atext))
}

fn display_name(words: &[Cow<[u8]>]) -> String {
    let joined = words
        .iter()
        .map(|w| String::from_utf8_lossy(w))
        .collect::<Vec<_>>()
        .join(" ");
    decode_header_value(&joined).into_owned()
}

fn ip_literal(literal: &[u8]) -> Option<IpAddr> {
    let literal = str::from_utf8(literal).ok()?;
    match literal.get(..5) {
        Some(tag) if tag.eq_ignore_ascii_case("IPv6:") => {
            literal[5..].parse::<Ipv6Addr>().ok().map(IpAddr::V6)
        }
        _ => literal.parse::<Ipv4Addr>().ok().map(IpAddr::V4),
    }
}

struct LocalPart<'a> {
    text: Cow<'a, [u8]>,
    quoted: bool,
}

enum DomainSpec<'a> {
    Name(&'a [u8]),
    Literal(&'a [u8]),
}

struct AddrSpec<'a> {
    local: LocalPart<'a>,
    domain: Option<DomainSpec<'a>>,
}

struct MailboxSpec<'a> {
    name: Vec<Cow<'a, [u8]>>,
    route: Vec<&'a [u8]>,
    /// `None` for the null path
    addr: Option<AddrSpec<'a>>,
}

fn is_wsp(b: u8) -> bool {
    b' ' == b || b'\t' == b || b'\r' == b || b'\n' == b
}

// RFC 5322 3.2.3 "Folding white space".
// Unfolding is not required to have happened first, so line-ending
// characters are treated as simple whitespace.
fn fws(i: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while1(is_wsp)(i)
}

// RFC 5322 3.2.1 "quoted-pair", including the 8-bit clean "obsolete" syntax
fn quoted_pair(i: &[u8]) -> IResult<&[u8], &[u8]> {
    preceded(char('\\'), take(1usize))(i)
}

// RFC 5322 3.2.2 "Comment text"
fn ctext(i: &[u8]) -> IResult<&[u8], &[u8]> {
    is_not("()\\ \t\r\n")(i)
}

// RFC 5322 3.2.2 "Comment content".
// FWS is folded in here instead of the comment syntax to keep it simple.
fn ccontent(i: &[u8]) -> IResult<&[u8], ()> {
    alt((
        map(ctext, |_| ()),
        map(quoted_pair, |_| ()),
        map(fws, |_| ()),
        comment,
    ))(i)
}

// RFC 5322 3.2.2 "Comment". Note it is recursive.
fn comment(i: &[u8]) -> IResult<&[u8], ()> {
    map(delimited(char('('), many0_count(ccontent), char(')')), |_| ())(i)
}

// RFC 5322 3.2.2 "Comment or folding white space", which may be empty.
fn cfws(i: &[u8]) -> IResult<&[u8], ()> {
    map(many0_count(alt((map(fws, |_| ()), comment))), |_| ())(i)
}

// RFC 5322 3.2.3 "Atom text"
// Amended by RFC 6531/6532 to include all non-ASCII characters
fn is_atext(ch: u8) -> bool {
    ch.is_ascii_alphanumeric()
        || b"!#$%&'*+-/=?^_`{|}~".contains(&ch)
        || ch >= 0x80
}

fn atext(i: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while1(is_atext)(i)
}

// RFC 5321 4.1.2 "Dot-string"
fn dot_string(i: &[u8]) -> IResult<&[u8], &[u8]> {
    recognize(separated_nonempty_list(char('.'), atext))(i)
}

// RFC 5321 4.1.2 "qtextSMTP", permissive about whitespace since it appears
// verbatim in real-world quoted local parts.
fn qtext(i: &[u8]) -> IResult<&[u8], &[u8]> {
    is_not("\"\\\r\n")(i)
}

// RFC 5321 4.1.2 "Quoted-string", with escapes resolved
fn quoted_string(i: &[u8]) -> IResult<&[u8], Vec<u8>> {
    delimited(
        char('"'),
        fold_many0(
            alt((qtext, quoted_pair)),
            Vec::new(),
            |mut acc: Vec<u8>, item: &[u8]| {
                acc.extend_from_slice(item);
                acc
            },
        ),
        char('"'),
    )(i)
}

// RFC 5321 4.1.2 "Local-part"
fn local_part(i: &[u8]) -> IResult<&[u8], LocalPart> {
    alt((
        map(quoted_string, |text| LocalPart {
            text: Cow::Owned(text),
            quoted: true,
        }),
        map(dot_string, |text| LocalPart {
            text: Cow::Borrowed(text),
            quoted: false,
        }),
    ))(i)
}

// RFC 5321 4.1.2 "Domain", allowing UTF-8 labels (RFC 6531) and the
// underscores some agents put in host names
fn is_domain_char(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || b'-' == ch || b'_' == ch || ch >= 0x80
}

fn domain_name(i: &[u8]) -> IResult<&[u8], &[u8]> {
    recognize(separated_nonempty_list(char('.'), take_while1(is_domain_char)))(
        i,
    )
}

// RFC 5321 4.1.3 "address-literal". The content is validated later.
fn address_literal(i: &[u8]) -> IResult<&[u8], &[u8]> {
    delimited(char('['), is_not("[]\\ \t\r\n"), char(']'))(i)
}

fn domain(i: &[u8]) -> IResult<&[u8], DomainSpec> {
    alt((
        map(address_literal, DomainSpec::Literal),
        map(domain_name, DomainSpec::Name),
    ))(i)
}

fn addr_spec(i: &[u8]) -> IResult<&[u8], AddrSpec> {
    map(
        pair(local_part, opt(preceded(char('@'), domain))),
        |(local, domain)| AddrSpec { local, domain },
    )(i)
}

// RFC 5321 4.1.2 "A-d-l", the obsolete source route
fn source_route(i: &[u8]) -> IResult<&[u8], Vec<&[u8]>> {
    terminated(
        separated_nonempty_list(char(','), preceded(char('@'), domain_name)),
        char(':'),
    )(i)
}

// RFC 5321 4.1.2 "Path", plus the empty reverse-path
fn angle_path(
    i: &[u8],
) -> IResult<&[u8], Option<(Vec<&[u8]>, AddrSpec)>> {
    delimited(
        pair(cfws, char('<')),
        opt(pair(
            map(opt(source_route), Option::unwrap_or_default),
            addr_spec,
        )),
        pair(char('>'), cfws),
    )(i)
}

// RFC 5322 3.2.5 "word", with the "obsolete phrase" allowance for the '.'
// that many agents put unquoted into display names.
fn word(i: &[u8]) -> IResult<&[u8], Cow<[u8]>> {
    delimited(
        cfws,
        alt((
            map(quoted_string, Cow::Owned),
            map(take_while1(|ch| is_atext(ch) || b'.' == ch), Cow::Borrowed),
        )),
        cfws,
    )(i)
}

// RFC 5322 3.2.5 "phrase"
fn phrase(i: &[u8]) -> IResult<&[u8], Vec<Cow<[u8]>>> {
    many1(word)(i)
}

// RFC 5322 3.4 "mailbox", extended with RFC 5321 paths
fn mailbox(i: &[u8]) -> IResult<&[u8], MailboxSpec> {
    alt((
        map(pair(opt(phrase), angle_path), |(name, path)| {
            let (route, addr) = match path {
                Some((route, addr)) => (route, Some(addr)),
                None => (Vec::new(), None),
            };
            MailboxSpec {
                name: name.unwrap_or_default(),
                route,
                addr,
            }
        }),
        map(delimited(cfws, addr_spec, cfws), |addr| MailboxSpec {
            name: Vec::new(),
            route: Vec::new(),
            addr: Some(addr),
        }),
    ))(i)
}
