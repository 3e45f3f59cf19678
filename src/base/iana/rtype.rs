//! Resource Record (RR) TYPEs

//------------ Rtype ---------------------------------------------------------

int_enum! {
    /// Resource Record Types.
    ///
    /// Each resource records has a 16 bit type value indicating what kind of
    /// information is represented by the record. Normal query includes the
    /// type of record information is requested for.
    ///
    /// Only the types a stub resolver deals with are named here. All other
    /// values can still be represented through [`Rtype::from_int`].
    =>
    Rtype, u16, "TYPE";

    /// A host address.
    (A => 1, "A")

    /// An authoritative name server.
    (NS => 2, "NS")

    /// The canonical name for an alias
    (CNAME => 5, "CNAME")

    /// Marks the start of a zone of authority.
    (SOA => 6, "SOA")

    /// A domain name pointer.
    (PTR => 12, "PTR")

    /// Mail exchange.
    (MX => 15, "MX")

    /// Text strings.
    (TXT => 16, "TXT")

    /// IPv6 address.
    ///
    /// See RFC 3596.
    (AAAA => 28, "AAAA")

    /// Option.
    ///
    /// The pseudo-record carrying EDNS information. See RFC 6891.
    (OPT => 41, "OPT")

    /// A request for all records the server has.
    (ANY => 255, "ANY")
}

impl Rtype {
    /// Returns whether this is one of the address record types.
    pub fn is_address(self) -> bool {
        self == Rtype::A || self == Rtype::AAAA
    }
}
