//! A single question in a DNS message.

use super::iana::{Class, Rtype};
use super::name::Dname;
use super::wire::ParseError;
use bytes::BufMut;
use core::fmt;
use octseq::parse::Parser;

//------------ Question ------------------------------------------------------

/// A question in a DNS message.
///
/// In DNS, a question describes what is requested in a query. It consists
/// of three elements: a domain name, a record type, and a class.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Question {
    /// The domain name of the question.
    qname: Dname,

    /// The record type of the question.
    qtype: Rtype,

    /// The class of the quesiton.
    qclass: Class,
}

impl Question {
    /// Creates a new question from its three componets.
    pub fn new(qname: Dname, qtype: Rtype, qclass: Class) -> Self {
        Question {
            qname,
            qtype,
            qclass,
        }
    }

    /// Creates a new question from a name and record type, assuming class IN.
    pub fn new_in(qname: Dname, qtype: Rtype) -> Self {
        Self::new(qname, qtype, Class::IN)
    }

    /// Returns a reference to the domain nmae in the question,
    pub fn qname(&self) -> &Dname {
        &self.qname
    }

    /// Returns the record type of the question.
    pub fn qtype(&self) -> Rtype {
        self.qtype
    }

    /// Returns the class of the question.
    pub fn qclass(&self) -> Class {
        self.qclass
    }

    /// Parses a question from the current position of a message parser.
    pub fn parse<Octs: AsRef<[u8]> + ?Sized>(
        parser: &mut Parser<'_, Octs>,
    ) -> Result<Self, ParseError> {
        Ok(Question::new(
            Dname::parse(parser)?,
            Rtype::from_int(parser.parse_u16_be()?),
            Class::from_int(parser.parse_u16_be()?),
        ))
    }

    /// Appends the wire format of the question to `target`.
    pub fn compose<B: BufMut>(&self, target: &mut B) {
        self.qname.compose(target);
        target.put_u16(self.qtype.to_int());
        target.put_u16(self.qclass.to_int());
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.qname, self.qclass, self.qtype)
    }
}
