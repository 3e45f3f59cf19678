//! An asynchronous stub resolver.
//!
//! The resolver looks up the addresses of a host name by sending A and
//! AAAA queries to the configured recursive name servers. Everything
//! revolves around a [`Channel`] which owns a [`ResolvConf`] and all
//! lookups in flight. Lookups are submitted with a host name, an optional
//! service, and [`AddrInfoHints`] and complete with a [`Completion`]
//! carrying either an [`AddrInfo`] or an [`Error`].
//!
//! A channel doesn’t spawn anything. It is driven by its owner through
//! [`Channel::poll_once`] or [`Channel::run_until_idle`]. If that is
//! inconvenient, a [`ThreadedChannel`] runs a channel on a background
//! thread instead.
//!
//! ```no_run
//! use domain_stub::resolv::{AddrInfoHints, Channel, ResolvConf};
//!
//! # async fn lookup() -> Result<(), domain_stub::resolv::Error> {
//! let mut channel = Channel::open(ResolvConf::system())?;
//! let handle = channel.submit(
//!     "www.example.com", Some("https"), &AddrInfoHints::default()
//! );
//! channel.run_until_idle().await;
//! for addr in handle.await.into_result()?.addrs() {
//!     println!("{}", addr);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! How names are looked up and when the resolver gives up is described in
//! the [`query`] module. The network is accessed through the [`Transport`]
//! trait which makes it possible to replace it, for instance in tests.

pub use self::addrinfo::{
    AddrInfo, AddrInfoCname, AddrInfoHints, AddrInfoNode, AiFlags, Family,
    IpProtocol, SockType,
};
pub use self::channel::{Channel, Completion, QueryHandle, QueryId};
pub use self::conf::{
    Backoff, EventModel, Protocol, ResolvConf, ResolvOptions, ServerConf,
};
pub use self::error::{Error, Status};
pub use self::library::{
    initialize, is_initialized, shutdown, threadsafety, InitFlags,
};
pub use self::net::NetTransport;
pub use self::thread::ThreadedChannel;
pub use self::transport::{Event, Request, Transport};

pub mod addrinfo;
pub mod channel;
pub mod conf;
pub mod error;
pub mod library;
pub mod net;
pub mod query;
pub mod search;
pub mod thread;
pub mod transport;
