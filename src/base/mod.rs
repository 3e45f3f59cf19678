//! Basics.
//!
//! This module provides the types for working with DNS data in its wire
//! format as needed by a stub resolver: the IANA-assigned values, domain
//! names, questions, resource records, and complete messages.
//!
//!
//! ## Parsing and Composing Messages
//!
//! In order to easily distinguish the process of creating and disecting
//! wire-format messages from other forms of representation conversion, we
//! use the term *parsing* for extracting data from a wire-format
//! representation and *composing* for producing such a representation.
//!
//! Both parsing and composing happen on buffers holding a complete DNS
//! message. A [`Message`] takes the binary data of a DNS message and parses
//! it into its header and four sections. A [`MessageBuilder`] collects the
//! parts of a new message and composes them into a [`Message`].
//!
//! Only the record data types relevant for address lookups are
//! interpreted, see [`RecordData`].

pub use self::header::{Header, HeaderCounts, HeaderSection};
pub use self::iana::{Class, Opcode, Rcode, Rtype};
pub use self::message::Message;
pub use self::message_builder::{MessageBuilder, PushError};
pub use self::name::{Dname, NameError};
pub use self::question::Question;
pub use self::record::{Record, RecordData};
pub use self::wire::{FormError, ParseError};

pub mod header;
pub mod iana;
pub mod message;
pub mod message_builder;
pub mod name;
pub mod question;
pub mod record;
pub mod wire;
