//! The result of an address lookup.
//!
//! A successful lookup results in an [`AddrInfo`]. It contains the chain of
//! CNAME records that was followed and the list of addresses found, both in
//! the order they appeared in the answers. No sorting or de-duplication of
//! addresses happens. The only thing removed are CNAME records repeated in
//! the answers to the A and AAAA queries of the same lookup.
//!
//! What is looked up and how the result is shaped is determined by the
//! [`AddrInfoHints`].

use super::error::Error;
use crate::base::iana::{Class, Rtype};
use crate::base::message::Message;
use crate::base::name::Dname;
use crate::base::record::RecordData;
use core::ops;
use smallvec::{smallvec, SmallVec};
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

//------------ Family --------------------------------------------------------

/// The address family to look up.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Family {
    /// Both IPv4 and IPv6 addresses.
    #[default]
    Unspecified,

    /// IPv4 addresses only.
    Ipv4,

    /// IPv6 addresses only.
    Ipv6,
}

impl Family {
    /// Returns the family of an address.
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Family::Ipv4,
            IpAddr::V6(_) => Family::Ipv6,
        }
    }

    /// Returns whether an address is acceptable for the family.
    pub fn matches(self, addr: &IpAddr) -> bool {
        match self {
            Family::Unspecified => true,
            Family::Ipv4 => addr.is_ipv4(),
            Family::Ipv6 => addr.is_ipv6(),
        }
    }

    /// Returns the record types to query for, in the order to ask for them.
    pub fn rtypes(self) -> SmallVec<[Rtype; 2]> {
        match self {
            Family::Unspecified => smallvec![Rtype::A, Rtype::AAAA],
            Family::Ipv4 => smallvec![Rtype::A],
            Family::Ipv6 => smallvec![Rtype::AAAA],
        }
    }
}

//------------ SockType ------------------------------------------------------

/// The socket type a caller intends to use with the addresses.
///
/// The resolver copies this into every address node.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum SockType {
    #[default]
    Any,
    Stream,
    Datagram,
}

//------------ IpProtocol ----------------------------------------------------

/// The protocol a caller intends to use with the addresses.
///
/// The resolver copies this into every address node.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum IpProtocol {
    #[default]
    Any,
    Tcp,
    Udp,
}

//------------ AiFlags -------------------------------------------------------

/// Flags modifying an address lookup.
#[derive(Clone, Copy, Default, Eq, Hash, PartialEq)]
pub struct AiFlags(u32);

impl AiFlags {
    /// Fill in the canonical name of the result.
    pub const CANONNAME: Self = AiFlags(1 << 0);

    /// The host name must be a numeric address, no query is made.
    pub const NUMERICHOST: Self = AiFlags(1 << 1);

    /// The addresses are meant for binding a listening socket.
    pub const PASSIVE: Self = AiFlags(1 << 2);

    /// The service must be a numeric port.
    pub const NUMERICSERV: Self = AiFlags(1 << 3);

    /// The caller will not sort the addresses.
    pub const NOSORT: Self = AiFlags(1 << 7);

    /// Returns an empty set of flags.
    pub const fn empty() -> Self {
        AiFlags(0)
    }

    /// Creates flags from their raw value.
    pub const fn from_bits(bits: u32) -> Self {
        AiFlags(bits)
    }

    /// Returns the raw value of the flags.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns whether all flags in `other` are set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl ops::BitOr for AiFlags {
    type Output = Self;

    fn bitor(self, other: Self) -> Self {
        AiFlags(self.0 | other.0)
    }
}

impl ops::BitOrAssign for AiFlags {
    fn bitor_assign(&mut self, other: Self) {
        self.0 |= other.0
    }
}

impl core::fmt::Debug for AiFlags {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "AiFlags({:#x})", self.0)
    }
}

//------------ AddrInfoHints -------------------------------------------------

/// Hints for an address lookup.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AddrInfoHints {
    /// The address family to look up.
    pub family: Family,

    /// The socket type to put into the address nodes.
    pub socktype: SockType,

    /// The protocol to put into the address nodes.
    pub protocol: IpProtocol,

    /// Flags for the lookup.
    pub flags: AiFlags,
}

impl AddrInfoHints {
    /// Returns hints for the given family and defaults otherwise.
    pub fn with_family(family: Family) -> Self {
        AddrInfoHints {
            family,
            ..Default::default()
        }
    }
}

//------------ AddrInfoCname -------------------------------------------------

/// A CNAME record that was followed during a lookup.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddrInfoCname {
    ttl: u32,
    alias: Dname,
    name: Dname,
}

impl AddrInfoCname {
    /// Returns the TTL of the record.
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// Returns the alias, the owner of the record.
    pub fn alias(&self) -> &Dname {
        &self.alias
    }

    /// Returns the name the alias points to.
    pub fn name(&self) -> &Dname {
        &self.name
    }
}

//------------ AddrInfoNode --------------------------------------------------

/// A single address found by a lookup.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddrInfoNode {
    ttl: u32,
    flags: AiFlags,
    socktype: SockType,
    protocol: IpProtocol,
    addr: SocketAddr,
}

impl AddrInfoNode {
    fn new(ttl: u32, addr: SocketAddr, hints: &AddrInfoHints) -> Self {
        AddrInfoNode {
            ttl,
            flags: hints.flags,
            socktype: hints.socktype,
            protocol: hints.protocol,
            addr,
        }
    }

    /// Returns the TTL of the address record.
    ///
    /// Numeric host names result in a TTL of zero.
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// Returns the flags of the lookup.
    pub fn flags(&self) -> AiFlags {
        self.flags
    }

    /// Returns the address family.
    pub fn family(&self) -> Family {
        Family::of(&self.addr.ip())
    }

    /// Returns the socket type of the hints.
    pub fn socktype(&self) -> SockType {
        self.socktype
    }

    /// Returns the protocol of the hints.
    pub fn protocol(&self) -> IpProtocol {
        self.protocol
    }

    /// Returns the length of the socket address as a C `sockaddr`.
    pub fn addrlen(&self) -> usize {
        match self.addr {
            SocketAddr::V4(_) => 16,
            SocketAddr::V6(_) => 28,
        }
    }

    /// Returns the socket address.
    ///
    /// The port is taken from the service of the lookup.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the raw octets of the IP address.
    pub fn octets(&self) -> SmallVec<[u8; 16]> {
        match self.addr.ip() {
            IpAddr::V4(addr) => SmallVec::from_slice(&addr.octets()),
            IpAddr::V6(addr) => SmallVec::from_slice(&addr.octets()),
        }
    }
}

//------------ AddrInfo ------------------------------------------------------

/// The result of a successful address lookup.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AddrInfo {
    cnames: Vec<AddrInfoCname>,
    nodes: Vec<AddrInfoNode>,
    name: Option<Dname>,
}

impl AddrInfo {
    /// Creates the result for a numeric host name.
    pub(crate) fn from_numeric(
        addr: IpAddr,
        port: u16,
        hints: &AddrInfoHints,
    ) -> Self {
        AddrInfo {
            cnames: Vec::new(),
            nodes: vec![AddrInfoNode::new(
                0,
                SocketAddr::new(addr, port),
                hints,
            )],
            name: None,
        }
    }

    /// Creates the result from the answers to the lookups.
    ///
    /// The answers must be given in lookup order. In each answer, the
    /// CNAME chain is followed from the question’s name in the order the
    /// records appear. Only CNAME records owned by the chain so far and
    /// address records owned by its final name are used. Everything else
    /// is ignored.
    pub(crate) fn from_answers<'a>(
        answers: impl IntoIterator<Item = &'a Message>,
        port: u16,
        hints: &AddrInfoHints,
    ) -> Self {
        let mut res = AddrInfo::default();
        for answer in answers {
            let mut name = match answer.first_question() {
                Some(question) => question.qname().clone(),
                None => continue,
            };
            for record in answer.answer() {
                if record.class() != Class::IN || *record.owner() != name {
                    continue;
                }
                if let RecordData::Cname(ref target) = *record.data() {
                    res.push_cname(record.ttl(), record.owner(), target);
                    name = target.clone();
                }
            }
            for record in answer.answer() {
                if record.class() != Class::IN || *record.owner() != name {
                    continue;
                }
                let ip = match *record.data() {
                    RecordData::A(addr) => IpAddr::V4(addr),
                    RecordData::Aaaa(addr) => IpAddr::V6(addr),
                    _ => continue,
                };
                if hints.family.matches(&ip) {
                    res.nodes.push(AddrInfoNode::new(
                        record.ttl(),
                        SocketAddr::new(ip, port),
                        hints,
                    ));
                }
            }
            if res.name.is_none() && hints.flags.contains(AiFlags::CANONNAME)
            {
                res.name = Some(name);
            }
        }
        res
    }

    fn push_cname(&mut self, ttl: u32, alias: &Dname, name: &Dname) {
        if self
            .cnames
            .iter()
            .any(|item| item.alias == *alias && item.name == *name)
        {
            return;
        }
        self.cnames.push(AddrInfoCname {
            ttl,
            alias: alias.clone(),
            name: name.clone(),
        })
    }

    /// Returns the CNAME records in the order they were encountered.
    pub fn cnames(&self) -> &[AddrInfoCname] {
        &self.cnames
    }

    /// Returns the addresses in the order they were encountered.
    pub fn nodes(&self) -> &[AddrInfoNode] {
        &self.nodes
    }

    /// Returns the canonical name if it was requested.
    pub fn name(&self) -> Option<&Dname> {
        self.name.as_ref()
    }

    /// Returns whether there are no addresses.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns an iterator over the socket addresses.
    pub fn addrs(&self) -> impl Iterator<Item = SocketAddr> + '_ {
        self.nodes.iter().map(AddrInfoNode::addr)
    }
}

//------------ Services ------------------------------------------------------

/// Well-known services and their ports.
const SERVICES: &[(&str, u16)] = &[
    ("ftp", 21),
    ("ssh", 22),
    ("telnet", 23),
    ("smtp", 25),
    ("domain", 53),
    ("http", 80),
    ("pop3", 110),
    ("ntp", 123),
    ("imap", 143),
    ("ldap", 389),
    ("https", 443),
    ("submission", 587),
    ("imaps", 993),
    ("pop3s", 995),
    ("domain-s", 853),
];

/// Returns the port for the service part of a lookup.
///
/// A missing service results in port 0.
pub fn service_port(
    service: Option<&str>,
    flags: AiFlags,
) -> Result<u16, Error> {
    let service = match service {
        Some(service) => service,
        None => return Ok(0),
    };
    if let Ok(port) = u16::from_str(service) {
        return Ok(port);
    }
    if flags.contains(AiFlags::NUMERICSERV) {
        return Err(Error::UnknownService);
    }
    SERVICES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(service))
        .map(|&(_, port)| port)
        .ok_or(Error::UnknownService)
}

//============ Testing ======================================================
