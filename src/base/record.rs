//! Resource records.
//!
//! Only the record types needed for address lookups are interpreted: A,
//! AAAA, and CNAME. The data of every other record type is kept as raw
//! octets.

use super::iana::{Class, Rtype};
use super::name::Dname;
use super::wire::{FormError, ParseError};
use bytes::{BufMut, Bytes};
use core::fmt;
use octseq::builder::ShortBuf;
use octseq::parse::Parser;
use std::net::{Ipv4Addr, Ipv6Addr};

//------------ Record --------------------------------------------------------

/// A DNS resource record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Record {
    owner: Dname,
    class: Class,
    ttl: u32,
    data: RecordData,
}

impl Record {
    /// Creates a new record from its parts.
    pub fn new(
        owner: Dname,
        class: Class,
        ttl: u32,
        data: RecordData,
    ) -> Self {
        Record {
            owner,
            class,
            ttl,
            data,
        }
    }

    /// Returns the owner name of the record.
    pub fn owner(&self) -> &Dname {
        &self.owner
    }

    /// Returns the record type.
    pub fn rtype(&self) -> Rtype {
        self.data.rtype()
    }

    /// Returns the class of the record.
    pub fn class(&self) -> Class {
        self.class
    }

    /// Returns the TTL of the record in seconds.
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// Returns a reference to the record data.
    pub fn data(&self) -> &RecordData {
        &self.data
    }

    /// Parses a record from the current position of a message parser.
    ///
    /// Record data that doesn’t fill its announced length exactly is
    /// rejected as a form error.
    pub fn parse<Octs: AsRef<[u8]> + ?Sized>(
        parser: &mut Parser<'_, Octs>,
    ) -> Result<Self, ParseError> {
        let owner = Dname::parse(parser)?;
        let rtype = Rtype::from_int(parser.parse_u16_be()?);
        let class = Class::from_int(parser.parse_u16_be()?);
        let ttl = parser.parse_u32_be()?;
        let rdlen = usize::from(parser.parse_u16_be()?);
        let mut parser = parser.parse_parser(rdlen)?;
        let data = match RecordData::parse(rtype, &mut parser) {
            Ok(data) => data,
            Err(ParseError::ShortInput) => {
                return Err(ParseError::form_error("short record data"))
            }
            Err(err) => return Err(err),
        };
        if parser.remaining() > 0 {
            return Err(ParseError::form_error("trailing record data"));
        }
        Ok(Record::new(owner, class, ttl, data))
    }

    /// Appends the wire format of the record to `target`.
    ///
    /// Names, including those in the record data, are not compressed.
    ///
    /// Fails if the record data is too long for its length field. Nothing
    /// is appended in this case.
    pub fn compose<B: BufMut>(
        &self,
        target: &mut B,
    ) -> Result<(), ShortBuf> {
        let rdlen =
            u16::try_from(self.data.compose_len()).map_err(|_| ShortBuf)?;
        self.owner.compose(target);
        target.put_u16(self.rtype().to_int());
        target.put_u16(self.class.to_int());
        target.put_u32(self.ttl);
        target.put_u16(rdlen);
        self.data.compose(target);
        Ok(())
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.owner,
            self.ttl,
            self.class,
            self.rtype(),
            self.data
        )
    }
}

//------------ RecordData ----------------------------------------------------

/// The data of a resource record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RecordData {
    /// An IPv4 host address.
    A(Ipv4Addr),

    /// An IPv6 host address.
    Aaaa(Ipv6Addr),

    /// The canonical name for the owner.
    Cname(Dname),

    /// Data of any other type, kept as is.
    Other(Rtype, Bytes),
}

impl RecordData {
    /// Returns the record type of the data.
    pub fn rtype(&self) -> Rtype {
        match *self {
            RecordData::A(_) => Rtype::A,
            RecordData::Aaaa(_) => Rtype::AAAA,
            RecordData::Cname(_) => Rtype::CNAME,
            RecordData::Other(rtype, _) => rtype,
        }
    }

    /// Parses record data of the given type.
    ///
    /// The parser must be limited to the record data.
    fn parse<Octs: AsRef<[u8]> + ?Sized>(
        rtype: Rtype,
        parser: &mut Parser<'_, Octs>,
    ) -> Result<Self, ParseError> {
        let rdlen = parser.remaining();
        match rtype {
            Rtype::A => {
                if rdlen != 4 {
                    return Err(
                        FormError::new("invalid A record length").into()
                    );
                }
                let mut buf = [0u8; 4];
                parser.parse_buf(&mut buf)?;
                Ok(RecordData::A(buf.into()))
            }
            Rtype::AAAA => {
                if rdlen != 16 {
                    return Err(
                        FormError::new("invalid AAAA record length").into()
                    );
                }
                let mut buf = [0u8; 16];
                parser.parse_buf(&mut buf)?;
                Ok(RecordData::Aaaa(buf.into()))
            }
            Rtype::CNAME => Ok(RecordData::Cname(Dname::parse(parser)?)),
            _ => {
                let data = Bytes::copy_from_slice(parser.peek_all());
                parser.advance_to_end();
                Ok(RecordData::Other(rtype, data))
            }
        }
    }

    /// Returns the length of the uncompressed wire format.
    fn compose_len(&self) -> usize {
        match *self {
            RecordData::A(_) => 4,
            RecordData::Aaaa(_) => 16,
            RecordData::Cname(ref name) => name.compose_len(),
            RecordData::Other(_, ref data) => data.len(),
        }
    }

    /// Appends the wire format of the data to `target`.
    fn compose<B: BufMut>(&self, target: &mut B) {
        match *self {
            RecordData::A(addr) => target.put_slice(&addr.octets()),
            RecordData::Aaaa(addr) => target.put_slice(&addr.octets()),
            RecordData::Cname(ref name) => name.compose(target),
            RecordData::Other(_, ref data) => target.put_slice(data),
        }
    }
}

impl fmt::Display for RecordData {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            RecordData::A(addr) => addr.fmt(f),
            RecordData::Aaaa(addr) => addr.fmt(f),
            RecordData::Cname(ref name) => write!(f, "{}.", name),
            RecordData::Other(_, ref data) => {
                write!(f, "\\# {}", data.len())?;
                for ch in data.iter() {
                    write!(f, " {:02x}", ch)?;
                }
                Ok(())
            }
        }
    }
}

//============ Testing ======================================================
