//! A transport talking to real servers via Tokio sockets.
//!
//! Every UDP request gets its own socket bound to a random port and
//! connected to the server. The request is sent right away; reading the
//! responses happens as part of polling the transport. Every TCP request
//! gets its own connection which is established when the transport is
//! polled.
//!
//! All sockets of a transaction are closed when it is released.

use super::conf::Protocol;
use super::transport::{Event, Request, Transport};
use crate::base::message::Message;
use bytes::Bytes;
use futures_util::future;
use futures_util::stream::{self, BoxStream, StreamExt};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::{fmt, io};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tracing::{debug, trace};

//------------ Configuration Constants ---------------------------------------

/// How many times do we try a new random port if we get ‘address in use.’
const RETRY_RANDOM_PORT: usize = 10;

/// The size of the receive buffer for UDP responses.
///
/// This is the largest payload size we ever advertise.
const RECV_SIZE: usize = 4096;

//------------ NetTransport --------------------------------------------------

/// A transport using UDP and TCP sockets.
///
/// Sockets are driven by whatever Tokio runtime polls
/// [`recv`][Transport::recv].
#[derive(Default)]
pub struct NetTransport {
    /// The event streams of all outstanding requests by transaction ID.
    streams: HashMap<u16, SmallVec<[BoxStream<'static, Event>; 2]>>,
}

impl NetTransport {
    /// Creates a new transport without any outstanding requests.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of transactions with open sockets.
    pub fn open_transactions(&self) -> usize {
        self.streams.len()
    }

    /// Sends a request over UDP and returns the stream of its responses.
    fn udp_stream(
        request: &Request,
    ) -> io::Result<BoxStream<'static, Event>> {
        let sock = Self::udp_bind(request.addr.is_ipv4())?;
        sock.connect(request.addr)?;
        sock.set_nonblocking(true)?;
        let sent = sock.send(request.message.as_slice())?;
        if sent != request.message.as_slice().len() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "short UDP send",
            ));
        }

        let (txid, server) = (request.txid, request.server);
        Ok(stream::unfold(UdpState::Unregistered(sock), move |state| {
            async move {
                let sock = match state {
                    UdpState::Unregistered(sock) => {
                        match UdpSocket::from_std(sock) {
                            Ok(sock) => sock,
                            Err(error) => {
                                return Some((
                                    Event::Failed {
                                        txid,
                                        server,
                                        error,
                                    },
                                    UdpState::Done,
                                ))
                            }
                        }
                    }
                    UdpState::Registered(sock) => sock,
                    UdpState::Done => return None,
                };
                let mut buf = vec![0; RECV_SIZE];
                match sock.recv(&mut buf).await {
                    Ok(len) => {
                        buf.truncate(len);
                        Some((
                            Event::Response {
                                server,
                                protocol: Protocol::Udp,
                                message: buf.into(),
                            },
                            UdpState::Registered(sock),
                        ))
                    }
                    Err(error) => Some((
                        Event::Failed {
                            txid,
                            server,
                            error,
                        },
                        UdpState::Done,
                    )),
                }
            }
        })
        .boxed())
    }

    /// Binds a UDP socket to a random port.
    fn udp_bind(v4: bool) -> io::Result<std::net::UdpSocket> {
        let mut i = 0;
        loop {
            let local: SocketAddr = if v4 {
                ([0u8; 4], 0).into()
            } else {
                ([0u16; 8], 0).into()
            };
            match std::net::UdpSocket::bind(local) {
                Ok(sock) => return Ok(sock),
                Err(err) => {
                    if i == RETRY_RANDOM_PORT {
                        return Err(err);
                    } else {
                        i += 1
                    }
                }
            }
        }
    }

    /// Returns a stream exchanging a request over a new TCP connection.
    fn tcp_stream(request: Request) -> BoxStream<'static, Event> {
        let Request {
            txid,
            server,
            addr,
            message,
            ..
        } = request;
        stream::once(async move {
            match Self::tcp_exchange(addr, message).await {
                Ok(message) => Event::Response {
                    server,
                    protocol: Protocol::Tcp,
                    message,
                },
                Err(error) => Event::Failed {
                    txid,
                    server,
                    error,
                },
            }
        })
        .boxed()
    }

    /// Sends a message over a new TCP connection and reads one response.
    async fn tcp_exchange(
        addr: SocketAddr,
        message: Message,
    ) -> io::Result<Bytes> {
        let octets = message.to_stream_octets().map_err(|err| {
            io::Error::new(io::ErrorKind::InvalidInput, err)
        })?;
        let mut sock = TcpStream::connect(addr).await?;
        sock.write_all(&octets).await?;
        let len = usize::from(sock.read_u16().await?);
        let mut buf = vec![0; len];
        sock.read_exact(&mut buf).await?;
        Ok(buf.into())
    }

    /// Polls all outstanding streams for the next event.
    fn poll_recv(&mut self, cx: &mut Context) -> Poll<Event> {
        let mut res = None;
        for streams in self.streams.values_mut() {
            let mut i = 0;
            while i < streams.len() {
                match streams[i].poll_next_unpin(cx) {
                    Poll::Ready(Some(event)) => {
                        res = Some(event);
                        break;
                    }
                    Poll::Ready(None) => {
                        streams.swap_remove(i);
                    }
                    Poll::Pending => i += 1,
                }
            }
            if res.is_some() {
                break;
            }
        }
        self.streams.retain(|_, streams| !streams.is_empty());
        match res {
            Some(event) => Poll::Ready(event),
            None => Poll::Pending,
        }
    }
}

impl Transport for NetTransport {
    fn send(&mut self, request: Request) -> io::Result<()> {
        trace!(
            txid = request.txid,
            server = %request.addr,
            protocol = %request.protocol,
            "sending request"
        );
        let stream = match request.protocol {
            Protocol::Udp => Self::udp_stream(&request).map_err(|err| {
                debug!(server = %request.addr, "UDP send failed: {}", err);
                err
            })?,
            Protocol::Tcp => Self::tcp_stream(request.clone()),
        };
        self.streams.entry(request.txid).or_default().push(stream);
        Ok(())
    }

    fn release(&mut self, txid: u16) {
        if self.streams.remove(&txid).is_some() {
            trace!(txid, "released sockets");
        }
    }

    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Event> + Send + '_>> {
        Box::pin(future::poll_fn(move |cx| self.poll_recv(cx)))
    }
}

impl fmt::Debug for NetTransport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("NetTransport")
            .field("open_transactions", &self.streams.len())
            .finish()
    }
}

//------------ UdpState ------------------------------------------------------

/// The state of the socket behind a UDP response stream.
enum UdpState {
    /// The socket has not been registered with the runtime yet.
    Unregistered(std::net::UdpSocket),

    /// The socket is ready for reading.
    Registered(UdpSocket),

    /// The socket has failed.
    Done,
}

//============ Testing ======================================================
