//! Accessing existing DNS messages.
//!
//! This module defines the [`Message`] type, a DNS message that has been
//! parsed from its wire format into its header and four sections. Messages
//! are created either by parsing received octets via
//! [`Message::from_octets`] or by assembling them with a
//! [`MessageBuilder`][super::message_builder::MessageBuilder].

use super::header::{Header, HeaderCounts, HeaderSection};
use super::iana::Rtype;
use super::name::Dname;
use super::question::Question;
use super::record::{Record, RecordData};
use super::wire::ParseError;
use bytes::{BufMut, Bytes, BytesMut};
use octseq::builder::ShortBuf;
use octseq::parse::Parser;

//------------ Message -------------------------------------------------------

/// A DNS message.
///
/// The message keeps the octets it was created from next to the parsed
/// sections. The octets are what is sent over the wire while the sections
/// are there for inspecting the content.
///
/// Parsing is strict except for one case: if the TC bit is set, the message
/// has been cut short by the server. Records that are missing at the end
/// are then silently dropped.
#[derive(Clone, Debug)]
pub struct Message {
    octets: Bytes,
    header: HeaderSection,
    question: Vec<Question>,
    answer: Vec<Record>,
    authority: Vec<Record>,
    additional: Vec<Record>,
}

/// # Creation and Conversion
///
impl Message {
    /// Creates a message from its wire format.
    pub fn from_octets(octets: Bytes) -> Result<Self, ParseError> {
        let mut parser = Parser::from_ref(&octets);
        let header = HeaderSection::parse(&mut parser)?;
        let truncated = header.header().tc();
        let counts = *header.counts();

        let mut question = Vec::new();
        for _ in 0..counts.qdcount() {
            question.push(Question::parse(&mut parser)?);
        }
        let mut sections = [Vec::new(), Vec::new(), Vec::new()];
        let limits = [counts.ancount(), counts.nscount(), counts.arcount()];
        'sections: for (section, limit) in sections.iter_mut().zip(limits) {
            for _ in 0..limit {
                match Record::parse(&mut parser) {
                    Ok(record) => section.push(record),
                    Err(ParseError::ShortInput) if truncated => {
                        break 'sections
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        let [answer, authority, additional] = sections;
        Ok(Message {
            octets,
            header,
            question,
            answer,
            authority,
            additional,
        })
    }

    /// Creates a message from already parsed parts.
    pub(super) fn from_parts(
        octets: Bytes,
        header: HeaderSection,
        question: Vec<Question>,
        answer: Vec<Record>,
        authority: Vec<Record>,
        additional: Vec<Record>,
    ) -> Self {
        Message {
            octets,
            header,
            question,
            answer,
            authority,
            additional,
        }
    }

    /// Returns a reference to the wire format of the message.
    pub fn as_slice(&self) -> &[u8] {
        self.octets.as_ref()
    }

    /// Returns the wire format of the message.
    pub fn as_octets(&self) -> &Bytes {
        &self.octets
    }

    /// Returns the wire format for use on a stream transport.
    ///
    /// On streams, each message is preceded by its length as a 16 bit
    /// integer in network byte order. Messages too long for that fail.
    pub fn to_stream_octets(&self) -> Result<Bytes, ShortBuf> {
        let len = u16::try_from(self.octets.len()).map_err(|_| ShortBuf)?;
        let mut buf = BytesMut::with_capacity(self.octets.len() + 2);
        buf.put_u16(len);
        buf.put_slice(&self.octets);
        Ok(buf.freeze())
    }
}

/// # Header Section
///
impl Message {
    /// Returns the message header.
    pub fn header(&self) -> Header {
        *self.header.header()
    }

    /// Returns the header counts of the message.
    ///
    /// These are the counts as they were given in the wire format. For a
    /// truncated message, they may be larger than the number of records
    /// actually present.
    pub fn header_counts(&self) -> HeaderCounts {
        *self.header.counts()
    }

    /// Returns the entire header section.
    pub fn header_section(&self) -> HeaderSection {
        self.header
    }

    /// Returns the message ID.
    pub fn id(&self) -> u16 {
        self.header().id()
    }
}

/// # Sections
///
impl Message {
    /// Returns the question section.
    pub fn question(&self) -> &[Question] {
        &self.question
    }

    /// Returns the first question, if there is any.
    pub fn first_question(&self) -> Option<&Question> {
        self.question.first()
    }

    /// Returns the query type of the first question, if any.
    pub fn qtype(&self) -> Option<Rtype> {
        self.first_question().map(|question| question.qtype())
    }

    /// Returns the answer section.
    pub fn answer(&self) -> &[Record] {
        &self.answer
    }

    /// Returns the authority section.
    pub fn authority(&self) -> &[Record] {
        &self.authority
    }

    /// Returns the additional section.
    pub fn additional(&self) -> &[Record] {
        &self.additional
    }

    /// Returns the OPT record of the message, if there is one.
    pub fn opt(&self) -> Option<&Record> {
        self.additional
            .iter()
            .find(|record| record.rtype() == Rtype::OPT)
    }

    /// Returns the UDP payload size advertised through EDNS, if any.
    pub fn udp_payload_size(&self) -> Option<u16> {
        self.opt().map(|opt| opt.class().to_int())
    }
}

/// # Helpers for Responses
///
impl Message {
    /// Returns whether this message is an answer to `query`.
    ///
    /// This is the case if the QR bit is set, the message ID is the same,
    /// and the question sections are equal. Names are compared ignoring
    /// ASCII case.
    pub fn is_answer(&self, query: &Message) -> bool {
        self.header().qr()
            && self.id() == query.id()
            && self.question == query.question
    }

    /// Returns whether the answer section contains a record of `rtype`.
    pub fn contains_answer(&self, rtype: Rtype) -> bool {
        self.answer.iter().any(|record| record.rtype() == rtype)
    }

    /// Returns the canonical name of the first question.
    ///
    /// This follows the chain of CNAME records in the answer section
    /// starting at the question’s name. If there are no CNAME records for
    /// the name, the name itself is returned. Returns `None` if there is no
    /// question.
    pub fn canonical_name(&self) -> Option<Dname> {
        let mut name = self.first_question()?.qname().clone();
        // Each step consumes one record, so the chain can’t be longer
        // than the answer section.
        for _ in 0..self.answer.len() {
            let next = self.answer.iter().find_map(|record| {
                match *record.data() {
                    RecordData::Cname(ref target)
                        if *record.owner() == name =>
                    {
                        Some(target.clone())
                    }
                    _ => None,
                }
            });
            match next {
                Some(target) => name = target,
                None => break,
            }
        }
        Some(name)
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.octets == other.octets
    }
}

impl Eq for Message {}

//============ Testing ======================================================
