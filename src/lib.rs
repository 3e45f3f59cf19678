//! An asynchronous DNS stub resolver core.
//!
//! This crate provides the building blocks for looking up the addresses of
//! host names via the DNS: the wire format of the messages exchanged with
//! recursive name servers and a resolver channel driving those exchanges on
//! top of the [Tokio](https://tokio.rs/) async runtime.
//!
//! # Modules
//!
//! * [base] contains the types to deal with DNS data in wire format, such
//!   as domain names, records, and messages, and
//! * [resolv] contains the resolver itself: configuration, the channel and
//!   its queries, the transport, and the result of a lookup.

#![allow(renamed_and_removed_lints)]
#![allow(clippy::unknown_clippy_lints)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod base;
pub mod resolv;
