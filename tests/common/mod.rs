//! Helpers shared by the integration tests.
#![allow(dead_code)]

use bytes::Bytes;
use domain_stub::base::{
    Class, Dname, Message, MessageBuilder, Rcode, Record, RecordData, Rtype,
};
use domain_stub::resolv::{
    Event, Protocol, Request, ResolvConf, ServerConf, Transport,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::task::{Poll, Waker};

//------------ Logging -------------------------------------------------------

pub fn init_logging() {
    // Initialize tracing based logging. Override with env var RUST_LOG, e.g.
    // RUST_LOG=trace.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_thread_ids(true)
        .without_time()
        .try_init()
        .ok();
}

//------------ Configuration -------------------------------------------------

/// Returns the address of the n-th test server.
pub fn server_addr(n: u8) -> SocketAddr {
    SocketAddr::from(([192, 0, 2, n + 1], 53))
}

/// Returns a configuration with `count` test servers.
pub fn conf(count: u8) -> ResolvConf {
    ResolvConf::with_servers(
        (0..count).map(|n| ServerConf::new(server_addr(n))).collect(),
    )
}

pub fn name(s: &str) -> Dname {
    Dname::from_str(s).unwrap()
}

//------------ Reply ---------------------------------------------------------

/// What the mock does with a request.
pub enum Reply {
    /// Answer with this message.
    Message(Message),

    /// Answer with these raw octets.
    Raw(Bytes),

    /// Fail the exchange asynchronously.
    Fail(io::ErrorKind),

    /// Fail sending synchronously.
    SendError(io::ErrorKind),

    /// Never answer.
    Silence,
}

/// Returns a reply with the given rcode and answer records.
pub fn answer(
    request: &Request,
    rcode: Rcode,
    records: Vec<Record>,
) -> Reply {
    let mut builder = MessageBuilder::start_answer(&request.message, rcode);
    for record in records {
        builder.push_answer(record);
    }
    Reply::Message(builder.finish().unwrap())
}

/// Returns a NOERROR reply with addresses for the question’s type.
///
/// The owner of the records is the question’s name.
pub fn addresses(
    request: &Request,
    v4: &[Ipv4Addr],
    v6: &[Ipv6Addr],
) -> Reply {
    let (qname, qtype) = question(request);
    let mut records = Vec::new();
    if qtype == Rtype::A {
        for addr in v4 {
            records.push(Record::new(
                qname.clone(),
                Class::IN,
                300,
                RecordData::A(*addr),
            ))
        }
    }
    if qtype == Rtype::AAAA {
        for addr in v6 {
            records.push(Record::new(
                qname.clone(),
                Class::IN,
                300,
                RecordData::Aaaa(*addr),
            ))
        }
    }
    answer(request, Rcode::NOERROR, records)
}

/// Returns a reply with the TC bit set and nothing else.
pub fn truncated(request: &Request) -> Reply {
    let mut builder =
        MessageBuilder::start_answer(&request.message, Rcode::NOERROR);
    builder.header_mut().set_tc(true);
    Reply::Message(builder.finish().unwrap())
}

/// Returns the name and type asked for by a request.
pub fn question(request: &Request) -> (Dname, Rtype) {
    let question = request.message.first_question().unwrap();
    (question.qname().clone(), question.qtype())
}

//------------ MockTransport -------------------------------------------------

type Responder = Box<dyn FnMut(&Request) -> Reply + Send>;

/// A transport answering requests through a closure.
///
/// Replies are queued when the request is sent and handed out by `recv` in
/// order. Releasing a transaction drops its queued replies.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

struct MockState {
    responder: Responder,
    requests: Vec<Request>,
    released: Vec<u16>,
    queue: VecDeque<(u16, Event)>,
    flood: Option<Bytes>,
    waker: Option<Waker>,
}

impl MockTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: FnMut(&Request) -> Reply + Send + 'static,
    {
        MockTransport {
            state: Arc::new(Mutex::new(MockState {
                responder: Box::new(responder),
                requests: Vec::new(),
                released: Vec::new(),
                queue: VecDeque::new(),
                flood: None,
                waker: None,
            })),
        }
    }

    /// Returns a transport that never answers.
    pub fn silent() -> Self {
        Self::new(|_| Reply::Silence)
    }

    /// Returns all requests sent so far.
    pub fn requests(&self) -> Vec<Request> {
        self.state.lock().requests.clone()
    }

    /// Returns the transaction IDs released so far.
    pub fn released(&self) -> Vec<u16> {
        self.state.lock().released.clone()
    }

    /// Injects an event as if received from the network.
    pub fn inject(&self, txid: u16, event: Event) {
        let mut state = self.state.lock();
        state.queue.push_back((txid, event));
        if let Some(waker) = state.waker.take() {
            waker.wake()
        }
    }

    /// Makes `recv` return a response with these octets whenever nothing
    /// else is queued.
    pub fn flood(&self, message: Bytes) {
        let mut state = self.state.lock();
        state.flood = Some(message);
        if let Some(waker) = state.waker.take() {
            waker.wake()
        }
    }
}

impl Transport for MockTransport {
    fn send(&mut self, request: Request) -> io::Result<()> {
        let mut state = self.state.lock();
        state.requests.push(request.clone());
        let (txid, server) = (request.txid, request.server);
        let event = match (state.responder)(&request) {
            Reply::Message(message) => Event::Response {
                server,
                protocol: request.protocol,
                message: message.as_octets().clone(),
            },
            Reply::Raw(message) => Event::Response {
                server,
                protocol: request.protocol,
                message,
            },
            Reply::Fail(kind) => Event::Failed {
                txid,
                server,
                error: kind.into(),
            },
            Reply::SendError(kind) => return Err(kind.into()),
            Reply::Silence => return Ok(()),
        };
        state.queue.push_back((txid, event));
        if let Some(waker) = state.waker.take() {
            waker.wake()
        }
        Ok(())
    }

    fn release(&mut self, txid: u16) {
        let mut state = self.state.lock();
        state.released.push(txid);
        state.queue.retain(|(item, _)| *item != txid);
    }

    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Event> + Send + '_>> {
        Box::pin(futures_util::future::poll_fn(move |cx| {
            let mut state = self.state.lock();
            if let Some((_, event)) = state.queue.pop_front() {
                return Poll::Ready(event);
            }
            match state.flood.clone() {
                Some(message) => Poll::Ready(Event::Response {
                    server: 0,
                    protocol: Protocol::Udp,
                    message,
                }),
                None => {
                    state.waker = Some(cx.waker().clone());
                    Poll::Pending
                }
            }
        }))
    }
}

/// Returns the protocol of all requests in order.
pub fn protocols(requests: &[Request]) -> Vec<Protocol> {
    requests.iter().map(|request| request.protocol).collect()
}

/// Returns the server indexes of all requests in order.
pub fn servers(requests: &[Request]) -> Vec<usize> {
    requests.iter().map(|request| request.server).collect()
}
