//! The interface between a channel and the network.
//!
//! A channel hands the messages of its queries to a [`Transport`] and
//! receives responses and failures back as [`Event`]s. The transport owns
//! all sockets. It doesn’t interpret messages beyond framing them for the
//! protocol in use. Matching responses to queries is left to the channel.
//!
//! The crate provides [`NetTransport`][super::net::NetTransport] which talks
//! to real servers. Other implementations can be plugged in, for instance
//! for testing.

use super::conf::Protocol;
use crate::base::message::Message;
use bytes::Bytes;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;

//------------ Transport -----------------------------------------------------

/// Exchanges DNS messages with servers on behalf of a channel.
pub trait Transport {
    /// Sends a request.
    ///
    /// The request is sent right away. Any response will later be returned
    /// by [`recv`][Self::recv]. If sending fails synchronously, the error
    /// is returned and no event will be generated for the request.
    fn send(&mut self, request: Request) -> io::Result<()>;

    /// Releases all resources held for the given transaction ID.
    ///
    /// No more events will be returned for requests with this ID sent
    /// before the call.
    fn release(&mut self, txid: u16);

    /// Returns the next event.
    ///
    /// If there is nothing outstanding, the returned future never resolves.
    /// The future must be cancel safe: dropping it before it resolved must
    /// not lose any events.
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Event> + Send + '_>>;
}

//------------ Request -------------------------------------------------------

/// A message to be sent to a server.
#[derive(Clone, Debug)]
pub struct Request {
    /// The transaction ID of the query the message belongs to.
    pub txid: u16,

    /// The index of the server in the server list.
    pub server: usize,

    /// The address of the server.
    pub addr: SocketAddr,

    /// The protocol to use.
    pub protocol: Protocol,

    /// The message to send.
    pub message: Message,
}

//------------ Event ---------------------------------------------------------

/// Something that happened on the transport.
#[derive(Debug)]
pub enum Event {
    /// A message was received.
    Response {
        /// The index of the server the message came from.
        server: usize,

        /// The protocol the message was received over.
        protocol: Protocol,

        /// The unparsed message.
        message: Bytes,
    },

    /// Exchanging a request with a server failed.
    Failed {
        /// The transaction ID of the request.
        txid: u16,

        /// The index of the server.
        server: usize,

        /// What went wrong.
        error: io::Error,
    },
}
