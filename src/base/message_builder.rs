//! Building a new DNS message.
//!
//! A [`MessageBuilder`] collects the header, a question section, and three
//! record sections. Elements can be pushed to any section in any order. When
//! done, [`MessageBuilder::finish`] composes the wire format, updating the
//! section counts in the header, and returns the complete [`Message`]. If a
//! section has more elements than its count can express or the message
//! grows beyond 65535 octets, it fails with a [`PushError`].
//!
//! Domain names are not compressed. Queries contain a single name and
//! compression is of little use there.
//!
//! The builder also provides the OPT record for EDNS through its
//! [`opt`][MessageBuilder::opt] method.

use super::header::{Header, HeaderSection};
use super::iana::{Class, Rcode, Rtype};
use super::message::Message;
use super::name::Dname;
use super::question::Question;
use super::record::{Record, RecordData};
use bytes::{Bytes, BytesMut};
use core::fmt;
use octseq::builder::ShortBuf;

//------------ MessageBuilder ------------------------------------------------

/// Builds a DNS message.
#[derive(Clone, Debug, Default)]
pub struct MessageBuilder {
    header: HeaderSection,
    question: Vec<Question>,
    answer: Vec<Record>,
    authority: Vec<Record>,
    additional: Vec<Record>,
}

impl MessageBuilder {
    /// Creates a new, empty message builder.
    ///
    /// All header fields are zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for a query for a single question.
    ///
    /// The message gets the given ID and has the RD bit set if `recurse` is
    /// true.
    pub fn query(id: u16, question: Question, recurse: bool) -> Self {
        let mut res = Self::new();
        res.header_mut().set_id(id);
        res.header_mut().set_rd(recurse);
        res.push_question(question);
        res
    }

    /// Starts creating an answer for the given query.
    ///
    /// The ID, opcode, RD bit, and question section are copied from the
    /// query. The QR bit is set and the response code is set to `rcode`.
    pub fn start_answer(query: &Message, rcode: Rcode) -> Self {
        let mut res = Self::new();
        let header = res.header_mut();
        header.set_id(query.id());
        header.set_qr(true);
        header.set_opcode(query.header().opcode());
        header.set_rd(query.header().rd());
        header.set_rcode(rcode);
        res.question.extend(query.question().iter().cloned());
        res
    }

    /// Returns a reference to the message header.
    pub fn header(&self) -> &Header {
        self.header.header()
    }

    /// Returns a mutable reference to the message header.
    pub fn header_mut(&mut self) -> &mut Header {
        self.header.header_mut()
    }

    /// Appends a question.
    pub fn push_question(&mut self, question: Question) {
        self.question.push(question)
    }

    /// Appends a record to the answer section.
    pub fn push_answer(&mut self, record: Record) {
        self.answer.push(record)
    }

    /// Appends a record to the authority section.
    pub fn push_authority(&mut self, record: Record) {
        self.authority.push(record)
    }

    /// Appends a record to the additional section.
    pub fn push_additional(&mut self, record: Record) {
        self.additional.push(record)
    }

    /// Adds an OPT record advertising the given UDP payload size.
    ///
    /// Any previously added OPT record is replaced. Extended rcode,
    /// version, and flags are all zero and no options are included.
    pub fn opt(&mut self, udp_payload_size: u16) {
        self.additional.retain(|record| record.rtype() != Rtype::OPT);
        self.additional.push(Record::new(
            Dname::root(),
            Class::from_int(udp_payload_size),
            0,
            RecordData::Other(Rtype::OPT, Bytes::new()),
        ))
    }

    /// Finishes the message and returns it.
    pub fn finish(mut self) -> Result<Message, PushError> {
        let qdcount = section_count(self.question.len())?;
        let ancount = section_count(self.answer.len())?;
        let nscount = section_count(self.authority.len())?;
        let arcount = section_count(self.additional.len())?;
        let counts = self.header.counts_mut();
        counts.set_qdcount(qdcount);
        counts.set_ancount(ancount);
        counts.set_nscount(nscount);
        counts.set_arcount(arcount);

        let mut buf = BytesMut::with_capacity(512);
        self.header.compose(&mut buf);
        for question in &self.question {
            question.compose(&mut buf);
        }
        for record in self
            .answer
            .iter()
            .chain(self.authority.iter())
            .chain(self.additional.iter())
        {
            record.compose(&mut buf)?;
        }
        if buf.len() > usize::from(u16::MAX) {
            return Err(PushError::ShortBuf);
        }
        Ok(Message::from_parts(
            buf.freeze(),
            self.header,
            self.question,
            self.answer,
            self.authority,
            self.additional,
        ))
    }
}

fn section_count(len: usize) -> Result<u16, PushError> {
    u16::try_from(len).map_err(|_| PushError::CountOverflow)
}

//------------ PushError -----------------------------------------------------

/// A message could not be finished.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PushError {
    /// A section has more elements than its count can express.
    CountOverflow,

    /// The message or a record’s data is too long.
    ShortBuf,
}

impl<T: Into<ShortBuf>> From<T> for PushError {
    fn from(_: T) -> Self {
        Self::ShortBuf
    }
}

impl fmt::Display for PushError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            PushError::CountOverflow => f.write_str("counter overflow"),
            PushError::ShortBuf => ShortBuf.fmt(f),
        }
    }
}

impl std::error::Error for PushError {}

//============ Testing ======================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn query_wire_format() {
        let msg = MessageBuilder::query(
            0x1234,
            Question::new_in(
                Dname::from_str("example.com").unwrap(),
                Rtype::A,
            ),
            true,
        )
        .finish()
        .unwrap();
        assert_eq!(
            msg.as_slice(),
            b"\x12\x34\x01\x00\x00\x01\x00\x00\x00\x00\x00\x00\
              \x07example\x03com\x00\x00\x01\x00\x01"
                .as_slice()
        );
    }

    #[test]
    fn opt_is_replaced() {
        let mut builder = MessageBuilder::new();
        builder.opt(4096);
        builder.opt(1232);
        let msg = builder.finish().unwrap();
        assert_eq!(msg.additional().len(), 1);
        assert_eq!(msg.udp_payload_size(), Some(1232));
        assert!(msg
            .as_slice()
            .ends_with(b"\x00\x00\x29\x04\xd0\x00\x00\x00\x00\x00\x00"));
    }

    #[test]
    fn start_answer_copies_query() {
        let mut query = MessageBuilder::query(
            7,
            Question::new_in(Dname::root(), Rtype::AAAA),
            false,
        );
        query.header_mut().set_opcode(crate::base::iana::Opcode::STATUS);
        let query = query.finish().unwrap();
        let answer = MessageBuilder::start_answer(&query, Rcode::REFUSED);
        assert_eq!(answer.header().id(), 7);
        assert!(answer.header().qr());
        assert!(!answer.header().rd());
        assert_eq!(
            answer.header().opcode(),
            crate::base::iana::Opcode::STATUS
        );
        assert_eq!(answer.header().rcode(), Rcode::REFUSED);
        assert_eq!(answer.finish().unwrap().question(), query.question());
    }

    #[test]
    fn overlong_messages() {
        let mut builder = MessageBuilder::new();
        builder.push_answer(Record::new(
            Dname::root(),
            Class::IN,
            0,
            RecordData::Other(Rtype::TXT, Bytes::from(vec![0; 0x10000])),
        ));
        assert_eq!(builder.finish().unwrap_err(), PushError::ShortBuf);

        let mut builder = MessageBuilder::new();
        for _ in 0..3 {
            builder.push_answer(Record::new(
                Dname::root(),
                Class::IN,
                0,
                RecordData::Other(Rtype::TXT, Bytes::from(vec![0; 30000])),
            ));
        }
        assert_eq!(builder.finish().unwrap_err(), PushError::ShortBuf);

        let mut builder = MessageBuilder::new();
        for _ in 0..0x10000 {
            builder.push_question(Question::new_in(Dname::root(), Rtype::A));
        }
        assert_eq!(builder.finish().unwrap_err(), PushError::CountOverflow);
    }
}
