//! Domain names.
//!
//! This module provides [`Dname`], an owned, absolute domain name kept in
//! its uncompressed wire format. Names are parsed from messages with
//! compression pointers resolved and are always composed uncompressed.
//!
//! Comparison and hashing of names is case insensitive as required by
//! [RFC 4343].
//!
//! [RFC 4343]: https://tools.ietf.org/html/rfc4343

use super::wire::{FormError, ParseError};
use bytes::{BufMut, Bytes, BytesMut};
use core::{fmt, hash, str};
use octseq::parse::Parser;
use std::str::FromStr;

//------------ Module Configuration ------------------------------------------

/// The maximum length of a domain name in its wire format.
const MAX_NAME_LEN: usize = 255;

/// The maximum length of a single label.
const MAX_LABEL_LEN: usize = 63;

/// The maximum number of compression pointers followed for a single name.
///
/// A name has at most 127 labels, each pointer has to lead to at least one
/// label, so anything beyond that is a loop.
const MAX_POINTERS: usize = 127;

//------------ Dname ---------------------------------------------------------

/// An owned, absolute domain name.
///
/// The name is stored as a sequence of length-prefixed labels ending in the
/// empty root label.
#[derive(Clone)]
pub struct Dname {
    octets: Bytes,
}

impl Dname {
    /// Returns the root name.
    pub fn root() -> Self {
        Dname {
            octets: Bytes::from_static(b"\0"),
        }
    }

    /// Creates a name from its uncompressed wire format.
    ///
    /// The octets must contain exactly one complete name.
    pub fn from_octets(octets: Bytes) -> Result<Self, NameError> {
        let mut pos = 0;
        loop {
            let len = *octets.get(pos).ok_or(NameError::ShortInput)? as usize;
            if len > MAX_LABEL_LEN {
                return Err(NameError::LongLabel);
            }
            pos += len + 1;
            if pos > MAX_NAME_LEN {
                return Err(NameError::LongName);
            }
            if len == 0 {
                break;
            }
        }
        if pos != octets.len() {
            return Err(NameError::TrailingData);
        }
        Ok(Dname { octets })
    }

    /// Returns the wire format octets of the name.
    pub fn as_slice(&self) -> &[u8] {
        self.octets.as_ref()
    }

    /// Returns whether this is the root name.
    pub fn is_root(&self) -> bool {
        self.octets.len() == 1
    }

    /// Returns an iterator over the labels of the name.
    ///
    /// The root label is not included.
    pub fn labels(&self) -> LabelIter {
        LabelIter {
            octets: &self.octets[..self.octets.len() - 1],
        }
    }

    /// Returns the number of labels excluding the root label.
    pub fn label_count(&self) -> usize {
        self.labels().count()
    }

    /// Appends `suffix` to this name.
    ///
    /// Since both names are absolute, the root label of `self` is dropped.
    pub fn chain(&self, suffix: &Dname) -> Result<Dname, NameError> {
        let len = self.octets.len() - 1 + suffix.octets.len();
        if len > MAX_NAME_LEN {
            return Err(NameError::LongName);
        }
        let mut res = BytesMut::with_capacity(len);
        res.put_slice(&self.octets[..self.octets.len() - 1]);
        res.put_slice(&suffix.octets);
        Ok(Dname {
            octets: res.freeze(),
        })
    }

    /// Parses a possibly compressed name from a message.
    ///
    /// The parser is advanced to the end of the name as it appears in the
    /// message, i.e., just past the first compression pointer if there is
    /// one.
    pub fn parse<Octs: AsRef<[u8]> + ?Sized>(
        parser: &mut Parser<'_, Octs>,
    ) -> Result<Self, ParseError> {
        let mut res = BytesMut::with_capacity(32);
        let message: &[u8] = parser.octets_ref().as_ref();
        let mut pos = parser.pos();
        let mut end = None;
        let mut pointers = 0;
        loop {
            let ltype = *message.get(pos).ok_or(ParseError::ShortInput)?;
            match ltype {
                0 => {
                    res.put_u8(0);
                    pos += 1;
                    break;
                }
                1..=0x3F => {
                    let label = message
                        .get(pos..pos + 1 + ltype as usize)
                        .ok_or(ParseError::ShortInput)?;
                    if res.len() + label.len() + 1 > MAX_NAME_LEN {
                        return Err(FormError::new("long domain name").into());
                    }
                    res.put_slice(label);
                    pos += label.len();
                }
                0xC0..=0xFF => {
                    let low =
                        *message.get(pos + 1).ok_or(ParseError::ShortInput)?;
                    let target =
                        (usize::from(ltype & 0x3F) << 8) | usize::from(low);
                    if end.is_none() {
                        end = Some(pos + 2);
                    }
                    pointers += 1;
                    if pointers > MAX_POINTERS || target >= pos {
                        return Err(FormError::new(
                            "invalid compression pointer",
                        )
                        .into());
                    }
                    pos = target;
                }
                _ => {
                    return Err(FormError::new("invalid label type").into())
                }
            }
        }
        parser.seek(end.unwrap_or(pos))?;
        Ok(Dname {
            octets: res.freeze(),
        })
    }

    /// Appends the uncompressed wire format of the name to `target`.
    pub fn compose<B: BufMut>(&self, target: &mut B) {
        target.put_slice(&self.octets)
    }

    /// Returns the length of the wire format of the name.
    pub fn compose_len(&self) -> usize {
        self.octets.len()
    }
}

//--- FromStr

impl FromStr for Dname {
    type Err = NameError;

    /// Creates a name from its presentation format.
    ///
    /// A trailing dot is optional, the name is always absolute. The
    /// escape sequences `\c` and `\DDD` are supported.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "." {
            return Ok(Self::root());
        }
        let mut res = BytesMut::with_capacity(s.len() + 2);
        let mut label = Vec::with_capacity(MAX_LABEL_LEN);
        let mut chars = s.bytes();
        loop {
            match chars.next() {
                Some(b'.') => {
                    push_label(&mut res, &label)?;
                    label.clear();
                    if chars.len() == 0 {
                        break;
                    }
                }
                Some(b'\\') => label.push(parse_escape(&mut chars)?),
                Some(ch) => label.push(ch),
                None => {
                    push_label(&mut res, &label)?;
                    break;
                }
            }
        }
        res.put_u8(0);
        if res.len() > MAX_NAME_LEN {
            return Err(NameError::LongName);
        }
        Ok(Dname {
            octets: res.freeze(),
        })
    }
}

/// Appends a label to a name under construction.
fn push_label(target: &mut BytesMut, label: &[u8]) -> Result<(), NameError> {
    if label.is_empty() {
        return Err(NameError::EmptyLabel);
    }
    if label.len() > MAX_LABEL_LEN {
        return Err(NameError::LongLabel);
    }
    target.put_u8(label.len() as u8);
    target.put_slice(label);
    Ok(())
}

/// Parses the remainder of an escape sequence after the backslash.
fn parse_escape(chars: &mut str::Bytes) -> Result<u8, NameError> {
    let first = chars.next().ok_or(NameError::BadEscape)?;
    if !first.is_ascii_digit() {
        return Ok(first);
    }
    let mut value = u32::from(first - b'0');
    for _ in 0..2 {
        match chars.next() {
            Some(ch) if ch.is_ascii_digit() => {
                value = value * 10 + u32::from(ch - b'0')
            }
            _ => return Err(NameError::BadEscape),
        }
    }
    u8::try_from(value).map_err(|_| NameError::BadEscape)
}

//--- PartialEq, Eq, and Hash

impl PartialEq for Dname {
    fn eq(&self, other: &Self) -> bool {
        // Label lengths never exceed 63 and are thus unaffected by ASCII
        // case folding.
        self.octets.eq_ignore_ascii_case(&other.octets)
    }
}

impl Eq for Dname {}

impl hash::Hash for Dname {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        for ch in self.octets.iter() {
            state.write_u8(ch.to_ascii_lowercase())
        }
    }
}

//--- Display and Debug

impl fmt::Display for Dname {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        let mut first = true;
        for label in self.labels() {
            if !first {
                f.write_str(".")?;
            }
            first = false;
            for &ch in label {
                if ch == b'.' || ch == b'\\' {
                    write!(f, "\\{}", ch as char)?;
                } else if ch.is_ascii_graphic() {
                    write!(f, "{}", ch as char)?;
                } else {
                    write!(f, "\\{:03}", ch)?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Dname {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Dname({})", self)
    }
}

//------------ LabelIter -----------------------------------------------------

/// An iterator over the labels of a name.
#[derive(Clone, Debug)]
pub struct LabelIter<'a> {
    octets: &'a [u8],
}

impl<'a> Iterator for LabelIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let (&len, rest) = self.octets.split_first()?;
        let (label, rest) = rest.split_at(len as usize);
        self.octets = rest;
        Some(label)
    }
}

//------------ NameError -----------------------------------------------------

/// A domain name could not be created.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NameError {
    /// A label was empty.
    EmptyLabel,

    /// A label was longer than 63 octets.
    LongLabel,

    /// The name was longer than 255 octets.
    LongName,

    /// An escape sequence was malformed.
    BadEscape,

    /// The wire format ended before the root label.
    ShortInput,

    /// The wire format contained data after the root label.
    TrailingData,
}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            NameError::EmptyLabel => "empty label",
            NameError::LongLabel => "label exceeds 63 octets",
            NameError::LongName => "name exceeds 255 octets",
            NameError::BadEscape => "illegal escape sequence",
            NameError::ShortInput => "unexpected end of name",
            NameError::TrailingData => "trailing data after name",
        })
    }
}

impl std::error::Error for NameError {}

//============ Testing ======================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    fn name(s: &str) -> Dname {
        Dname::from_str(s).unwrap()
    }

    #[test]
    fn from_str() {
        let wire = b"\x03www\x07example\x03com\x00";
        assert_eq!(name("www.example.com").as_slice(), wire);
        assert_eq!(name("www.example.com.").as_slice(), wire);
        assert_eq!(name(".").as_slice(), b"\x00");
        assert_eq!(name("a\\.b.c").as_slice(), b"\x03a.b\x01c\x00");
        assert_eq!(name("\\065b").as_slice(), b"\x02Ab\x00");
        assert_eq!(Dname::from_str(""), Err(NameError::EmptyLabel));
        assert_eq!(Dname::from_str("a..b"), Err(NameError::EmptyLabel));
        assert_eq!(Dname::from_str(".a"), Err(NameError::EmptyLabel));
        assert_eq!(Dname::from_str("a\\2"), Err(NameError::BadEscape));
        assert_eq!(
            Dname::from_str(&"a".repeat(64)),
            Err(NameError::LongLabel)
        );
        let long = ["a".repeat(63).as_str(); 4].join(".");
        assert_eq!(Dname::from_str(&long), Err(NameError::LongName));
    }

    #[test]
    fn display() {
        assert_eq!(
            format!("{}", name("www.example.com.")),
            "www.example.com"
        );
        assert_eq!(format!("{}", Dname::root()), ".");
        assert_eq!(format!("{}", name("a\\.b.c")), "a\\.b.c");
        assert_eq!(format!("{}", name("\\001x")), "\\001x");
    }

    #[test]
    fn eq_and_hash_ignore_case() {
        assert_eq!(name("Example.COM"), name("example.com"));
        assert_ne!(name("example.com"), name("example.org"));
        let mut set = HashSet::new();
        set.insert(name("WWW.example.com"));
        assert!(set.contains(&name("www.EXAMPLE.com")));
    }

    #[test]
    fn chain() {
        let host = name("www");
        assert_eq!(
            host.chain(&name("example.com")).unwrap(),
            name("www.example.com")
        );
        assert_eq!(host.chain(&Dname::root()).unwrap(), host);
        assert_eq!(name("www.example.com").label_count(), 3);
        assert_eq!(Dname::root().label_count(), 0);
    }

    #[test]
    fn parse_compressed() {
        // "example.com" at 2, then "www" + pointer to 2.
        let msg = b"\xff\xff\x07example\x03com\x00\x03www\xc0\x02\x01\x02";
        let mut parser = Parser::from_ref(msg);
        parser.seek(2).unwrap();
        assert_eq!(Dname::parse(&mut parser).unwrap(), name("example.com"));
        assert_eq!(parser.pos(), 15);
        assert_eq!(
            Dname::parse(&mut parser).unwrap(),
            name("www.example.com")
        );
        assert_eq!(parser.pos(), 21);
        assert_eq!(parser.parse_u16_be().unwrap(), 0x0102);
    }

    #[test]
    fn parse_bad_pointers() {
        // Pointer to itself.
        let mut parser = Parser::from_ref(b"\x03www\xc0\x00");
        assert!(matches!(
            Dname::parse(&mut parser),
            Err(ParseError::Form(_))
        ));
        let mut parser = Parser::from_ref(b"\xc0\x00");
        assert!(matches!(
            Dname::parse(&mut parser),
            Err(ParseError::Form(_))
        ));
        // Forward pointer.
        let mut parser = Parser::from_ref(b"\xc0\x02\x00");
        assert!(matches!(
            Dname::parse(&mut parser),
            Err(ParseError::Form(_))
        ));
        // Truncated label.
        let mut parser = Parser::from_ref(b"\x05ab");
        assert_eq!(Dname::parse(&mut parser), Err(ParseError::ShortInput));
    }

    #[test]
    fn from_octets() {
        assert_eq!(
            Dname::from_octets(Bytes::from_static(b"\x03com\x00")).unwrap(),
            name("com")
        );
        assert_eq!(
            Dname::from_octets(Bytes::from_static(b"\x03com")),
            Err(NameError::ShortInput)
        );
        assert_eq!(
            Dname::from_octets(Bytes::from_static(b"\x03com\x00\x00")),
            Err(NameError::TrailingData)
        );
    }
}
