//! IANA Definitions for DNS.
//!
//! This module contains types for parameters defined in IANA registries
//! that are relevant for this crate.
//!
//! All types defined hereunder follow the same basic structure. They wrap
//! the raw integer and provide the well-defined values as associated
//! constants. Since we cannot restrict the integer to only the defined
//! values, the full set of possible values is allowed.
//!
//! There are two methods `from_int()` and `to_int()` to convert from and
//! to raw integer values as well as implementations of the `From` trait
//! for these.

pub use self::class::Class;
pub use self::opcode::Opcode;
pub use self::rcode::Rcode;
pub use self::rtype::Rtype;

#[macro_use]
mod macros;

pub mod class;
pub mod opcode;
pub mod rcode;
pub mod rtype;

//============ Testing ======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mnemonics() {
        assert_eq!(Rtype::from_mnemonic(b"aaaa"), Some(Rtype::AAAA));
        assert_eq!(Rtype::from_mnemonic(b"bogus"), None);
        assert_eq!(Rtype::A.to_mnemonic_str(), Some("A"));
        assert_eq!(Rcode::from_int(3), Rcode::NXDOMAIN);
    }

    #[test]
    fn display() {
        assert_eq!(format!("{}", Rtype::CNAME), "CNAME");
        assert_eq!(format!("{}", Rtype::from_int(65)), "TYPE65");
        assert_eq!(format!("{}", Class::from_int(1232)), "CLASS1232");
        assert_eq!(format!("{:?}", Rcode::SERVFAIL), "Rcode::SERVFAIL");
    }
}
