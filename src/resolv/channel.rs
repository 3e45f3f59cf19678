//! The resolver channel.
//!
//! A [`Channel`] owns the configuration, a transport, and all queries in
//! flight. Queries are submitted via [`Channel::submit`] or
//! [`Channel::submit_with`] and are sent right away. Everything else
//! happens while the channel is polled via [`Channel::poll_once`] or
//! [`Channel::run_until_idle`]: responses are matched to their queries,
//! timers expire, and finished queries are completed.
//!
//! Each submission completes exactly once, either through the
//! [`QueryHandle`] returned by `submit` or by calling the callback given to
//! `submit_with`.
//!
//! The channel is not shared between threads. It is driven by whoever owns
//! it, on whatever Tokio runtime they use. For a channel driven by a
//! background thread, see
//! [`ThreadedChannel`][super::thread::ThreadedChannel].

use super::addrinfo::{service_port, AddrInfo, AddrInfoHints, AiFlags};
use super::conf::{EventModel, ResolvConf};
use super::error::{Error, Status};
use super::library;
use super::net::NetTransport;
use super::query::{Action, Query};
use super::search;
use super::transport::{Event, Transport};
use crate::base::header::HeaderSection;
use crate::base::message::Message;
use futures_util::FutureExt;
use octseq::parse::Parser;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use std::{cmp, fmt};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace};

//------------ Module Configuration ------------------------------------------

/// The maximum number of transport events processed by a single poll.
///
/// Events beyond this are left for the next poll.
pub const MAX_EVENTS: usize = 64;

//------------ Channel -------------------------------------------------------

/// A resolver instance owning configuration and queries in flight.
pub struct Channel<T: Transport = NetTransport> {
    /// The configuration.
    conf: Arc<ResolvConf>,

    /// The transport to talk to servers with.
    transport: T,

    /// The queries in flight by transaction ID.
    queries: HashMap<u16, Entry>,

    /// The transaction IDs of queries in flight by query ID.
    ids: HashMap<QueryId, u16>,

    /// The query ID for the next submission.
    next_id: u64,

    /// The server to start the next query with if rotating.
    rotation: usize,

    /// Whether the channel has been closed.
    closed: bool,
}

impl Channel<NetTransport> {
    /// Opens a channel using the network.
    ///
    /// If the configuration doesn’t contain any servers, the system’s
    /// servers are used. The configuration must use the default event
    /// model.
    pub fn open(conf: ResolvConf) -> Result<Self, Error> {
        if conf.event_model == EventModel::Thread {
            return Err(Error::InvalidOptions(
                "thread event model requires a threaded channel",
            ));
        }
        Self::with_transport(conf, NetTransport::new())
    }
}

impl<T: Transport> Channel<T> {
    /// Opens a channel using the given transport.
    pub fn with_transport(
        mut conf: ResolvConf,
        transport: T,
    ) -> Result<Self, Error> {
        if conf.servers.is_empty() {
            conf.servers = library::system_conf().servers.clone();
        }
        conf.validate()?;
        Ok(Channel {
            conf: Arc::new(conf),
            transport,
            queries: HashMap::new(),
            ids: HashMap::new(),
            next_id: 0,
            rotation: 0,
            closed: false,
        })
    }

    /// Returns a reference to the configuration.
    pub fn conf(&self) -> &ResolvConf {
        &self.conf
    }

    /// Returns a reference to the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the number of queries in flight.
    pub fn pending(&self) -> usize {
        self.queries.len()
    }

    /// Returns whether there are no queries in flight.
    pub fn is_idle(&self) -> bool {
        self.queries.is_empty()
    }

    /// Returns the transaction ID of a query if it is still in flight.
    pub fn txid(&self, id: QueryId) -> Option<u16> {
        self.ids.get(&id).copied()
    }

    /// Returns the earliest deadline of all queries in flight.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queries
            .values()
            .filter_map(|entry| entry.query.deadline())
            .min()
    }

    /// Submits a lookup and returns a handle to its completion.
    ///
    /// The host name can be a domain name or a numeric address. If given,
    /// the service is either a port number or the name of a well-known
    /// service and determines the port of the resulting addresses.
    ///
    /// Errors that can be detected right away, such as an invalid host
    /// name, complete the handle immediately.
    pub fn submit(
        &mut self,
        host: &str,
        service: Option<&str>,
        hints: &AddrInfoHints,
    ) -> QueryHandle {
        let id = self.next_query_id();
        let (tx, rx) = oneshot::channel();
        self.submit_with_id(
            id,
            host,
            service,
            hints,
            Continuation::Handle(tx),
        );
        QueryHandle::new(id, rx)
    }

    /// Submits a lookup and calls `callback` upon its completion.
    ///
    /// The callback is called while the channel is being polled or, for
    /// errors detected right away, before this method returns.
    pub fn submit_with<F>(
        &mut self,
        host: &str,
        service: Option<&str>,
        hints: &AddrInfoHints,
        callback: F,
    ) -> QueryId
    where
        F: FnOnce(Completion) + Send + 'static,
    {
        let id = self.next_query_id();
        self.submit_with_id(
            id,
            host,
            service,
            hints,
            Continuation::Callback(Box::new(callback)),
        );
        id
    }

    /// Cancels a query.
    ///
    /// If the query is still in flight, it completes with
    /// [`Error::Cancelled`] before this method returns `true`. Otherwise
    /// nothing happens.
    pub fn cancel(&mut self, id: QueryId) -> bool {
        let txid = match self.ids.get(&id) {
            Some(txid) => *txid,
            None => return false,
        };
        debug!(%id, txid, "cancelling query");
        self.cancel_txid(txid)
    }

    /// Processes whatever is ready or becomes ready within `timeout`.
    ///
    /// Waits until the transport has an event, the earliest deadline
    /// passes, or `timeout` expires, whichever comes first. Then processes
    /// the events available right away, up to [`MAX_EVENTS`] of them, and
    /// all expired deadlines.
    ///
    /// Returns the number of queries completed. If there are no queries in
    /// flight, returns zero immediately.
    pub async fn poll_once(&mut self, timeout: Duration) -> usize {
        let deadline = match self.next_deadline() {
            Some(deadline) => deadline,
            None => return 0,
        };
        let limit = match Instant::now().checked_add(timeout) {
            Some(limit) => cmp::min(limit, deadline),
            None => deadline,
        };

        let mut completed = 0;
        if let Ok(event) =
            tokio::time::timeout_at(limit, self.transport.recv()).await
        {
            completed += self.handle_event(event);
            for _ in 1..MAX_EVENTS {
                if Instant::now() >= limit {
                    break;
                }
                match self.transport.recv().now_or_never() {
                    Some(event) => completed += self.handle_event(event),
                    None => break,
                }
            }
        }
        completed + self.expire(Instant::now())
    }

    /// Polls the channel until there are no more queries in flight.
    ///
    /// Returns the number of queries completed.
    pub async fn run_until_idle(&mut self) -> usize {
        let mut completed = 0;
        while !self.is_idle() {
            completed += self.poll_once(Duration::MAX).await;
        }
        completed
    }

    /// Closes the channel.
    ///
    /// All queries in flight complete with [`Error::Cancelled`] and all
    /// sockets are released. Lookups submitted afterwards complete with
    /// [`Error::Cancelled`] right away.
    pub fn close(&mut self) {
        if !self.closed {
            debug!(pending = self.queries.len(), "closing channel");
        }
        self.closed = true;
        let txids: SmallVec<[u16; 16]> =
            self.queries.keys().copied().collect();
        for txid in txids {
            self.cancel_txid(txid);
        }
    }

    //--- Internal helpers

    /// Returns a new query ID.
    fn next_query_id(&mut self) -> QueryId {
        let id = QueryId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Starts a lookup with a query ID chosen by the caller.
    ///
    /// The caller needs to make sure that query IDs are not reused.
    pub(crate) fn submit_with_id(
        &mut self,
        id: QueryId,
        host: &str,
        service: Option<&str>,
        hints: &AddrInfoHints,
        continuation: Continuation,
    ) {
        if self.closed {
            return continuation
                .fire(Completion::new(0, Err(Error::Cancelled)));
        }
        let port = match service_port(service, hints.flags) {
            Ok(port) => port,
            Err(err) => {
                return continuation.fire(Completion::new(0, Err(err)))
            }
        };
        if let Ok(addr) = IpAddr::from_str(host) {
            let res = if hints.family.matches(&addr) {
                Ok(AddrInfo::from_numeric(addr, port, hints))
            } else {
                Err(Error::BadFamily)
            };
            return continuation.fire(Completion::new(0, res));
        }
        if hints.flags.contains(AiFlags::NUMERICHOST) {
            return continuation
                .fire(Completion::new(0, Err(Error::NameNotFound)));
        }
        let candidates = match search::candidates(host, &self.conf) {
            Ok(candidates) => candidates,
            Err(err) => {
                return continuation.fire(Completion::new(0, Err(err)))
            }
        };
        let txid = match self.allocate_txid() {
            Some(txid) => txid,
            None => {
                return continuation
                    .fire(Completion::new(0, Err(Error::ResourceExhausted)))
            }
        };
        let start = if self.conf.options.rotate {
            let start = self.rotation % self.conf.servers.len();
            self.rotation = self.rotation.wrapping_add(1);
            start
        } else {
            0
        };

        debug!(%id, txid, host, "starting query");
        let mut query =
            Query::new(txid, candidates, *hints, port, start, &self.conf);
        let action = query.start(&self.conf, Instant::now());
        self.queries.insert(
            txid,
            Entry {
                id,
                query,
                continuation,
            },
        );
        self.ids.insert(id, txid);
        self.apply(txid, action);
    }

    /// Returns a random transaction ID not used by any query in flight.
    fn allocate_txid(&self) -> Option<u16> {
        if self.queries.len() > usize::from(u16::MAX) {
            return None;
        }
        loop {
            let txid: u16 = rand::random();
            if !self.queries.contains_key(&txid) {
                return Some(txid);
            }
        }
    }

    /// Performs an action for the query with the given transaction ID.
    ///
    /// Returns the number of queries completed.
    fn apply(&mut self, txid: u16, mut action: Action) -> usize {
        loop {
            let requests = match action {
                Action::Wait => return 0,
                Action::Complete(res) => {
                    self.complete(txid, res);
                    return 1;
                }
                Action::Transmit(requests) => requests,
            };
            self.transport.release(txid);
            let mut failure = None;
            for request in requests {
                let server = request.server;
                if let Err(err) = self.transport.send(request) {
                    failure = Some((server, err));
                    break;
                }
            }
            let (server, err) = match failure {
                Some(failure) => failure,
                None => return 0,
            };
            let entry = match self.queries.get_mut(&txid) {
                Some(entry) => entry,
                None => return 0,
            };
            action = match entry.query.handle_failure(
                &self.conf,
                server,
                err,
                Instant::now(),
            ) {
                Some(action) => action,
                None => return 0,
            };
        }
    }

    /// Removes a query and delivers its result.
    fn complete(&mut self, txid: u16, res: Result<AddrInfo, Error>) {
        self.transport.release(txid);
        if let Some(entry) = self.queries.remove(&txid) {
            self.ids.remove(&entry.id);
            let completion = Completion::new(entry.query.timeouts(), res);
            debug!(
                id = %entry.id,
                txid,
                status = %completion.status(),
                timeouts = completion.timeouts(),
                "query complete"
            );
            entry.continuation.fire(completion);
        }
    }

    /// Cancels the query with the given transaction ID.
    fn cancel_txid(&mut self, txid: u16) -> bool {
        let mut entry = match self.queries.remove(&txid) {
            Some(entry) => entry,
            None => return false,
        };
        self.ids.remove(&entry.id);
        self.transport.release(txid);
        entry.query.cancel();
        entry.continuation.fire(Completion::new(
            entry.query.timeouts(),
            Err(Error::Cancelled),
        ));
        true
    }

    /// Processes a transport event.
    fn handle_event(&mut self, event: Event) -> usize {
        let now = Instant::now();
        match event {
            Event::Response {
                server,
                protocol,
                message,
            } => {
                let message = match Message::from_octets(message.clone()) {
                    Ok(message) => message,
                    Err(err) => {
                        debug!(
                            server,
                            "dropping malformed response: {}", err
                        );
                        let mut parser = Parser::from_ref(&message);
                        let header = HeaderSection::parse(&mut parser);
                        if let Ok(header) = header {
                            let txid = header.header().id();
                            if let Some(entry) = self.queries.get_mut(&txid)
                            {
                                entry.query.note_malformed();
                            }
                        }
                        return 0;
                    }
                };
                let txid = message.id();
                let action = match self.queries.get_mut(&txid) {
                    Some(entry) => entry.query.handle_response(
                        &self.conf, &message, protocol, now,
                    ),
                    None => None,
                };
                match action {
                    Some(action) => self.apply(txid, action),
                    None => {
                        debug!(txid, server, "dropping unexpected response");
                        0
                    }
                }
            }
            Event::Failed {
                txid,
                server,
                error,
            } => {
                let action = match self.queries.get_mut(&txid) {
                    Some(entry) => entry
                        .query
                        .handle_failure(&self.conf, server, error, now),
                    None => None,
                };
                match action {
                    Some(action) => self.apply(txid, action),
                    None => {
                        trace!(txid, server, "ignoring stale failure");
                        0
                    }
                }
            }
        }
    }

    /// Processes all deadlines that expired at `now`.
    fn expire(&mut self, now: Instant) -> usize {
        let expired: SmallVec<[u16; 8]> = self
            .queries
            .iter()
            .filter(|(_, entry)| {
                entry.query.deadline().map_or(false, |item| item <= now)
            })
            .map(|(txid, _)| *txid)
            .collect();
        let mut completed = 0;
        for txid in expired {
            let action = match self.queries.get_mut(&txid) {
                Some(entry) => entry.query.handle_timeout(&self.conf, now),
                None => None,
            };
            if let Some(action) = action {
                completed += self.apply(txid, action);
            }
        }
        completed
    }
}

impl<T: Transport> Drop for Channel<T> {
    fn drop(&mut self) {
        self.close()
    }
}

impl<T: Transport> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Channel")
            .field("conf", &self.conf)
            .field("pending", &self.queries.len())
            .field("closed", &self.closed)
            .finish()
    }
}

//------------ Entry ---------------------------------------------------------

/// A query in flight together with whoever waits for it.
struct Entry {
    id: QueryId,
    query: Query,
    continuation: Continuation,
}

//------------ QueryId -------------------------------------------------------

/// The identity of a submitted lookup.
///
/// Unlike transaction IDs, query IDs are never reused by a channel.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct QueryId(u64);

impl QueryId {
    pub(crate) fn from_int(id: u64) -> Self {
        QueryId(id)
    }

    /// Returns the raw value of the ID.
    pub fn to_int(self) -> u64 {
        self.0
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

//------------ Completion ----------------------------------------------------

/// The outcome of a lookup.
#[derive(Clone, Debug)]
pub struct Completion {
    status: Status,
    timeouts: usize,
    result: Result<AddrInfo, Error>,
}

impl Completion {
    pub(crate) fn new(
        timeouts: usize,
        result: Result<AddrInfo, Error>,
    ) -> Self {
        Completion {
            status: match result {
                Ok(_) => Status::Success,
                Err(ref err) => err.status(),
            },
            timeouts,
            result,
        }
    }

    /// Returns the status code of the lookup.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Returns the number of transmissions that timed out.
    pub fn timeouts(&self) -> usize {
        self.timeouts
    }

    /// Returns the result of the lookup.
    pub fn result(&self) -> Result<&AddrInfo, &Error> {
        self.result.as_ref()
    }

    /// Converts the completion into the result of the lookup.
    pub fn into_result(self) -> Result<AddrInfo, Error> {
        self.result
    }
}

//------------ Continuation --------------------------------------------------

/// Whoever is waiting for a query to complete.
pub(crate) enum Continuation {
    /// A query handle.
    Handle(oneshot::Sender<Completion>),

    /// A callback.
    Callback(Box<dyn FnOnce(Completion) + Send>),
}

impl Continuation {
    /// Delivers the completion.
    pub(crate) fn fire(self, completion: Completion) {
        match self {
            Continuation::Handle(tx) => {
                // The handle may have been dropped. That’s fine.
                let _ = tx.send(completion);
            }
            Continuation::Callback(callback) => callback(completion),
        }
    }
}

//------------ QueryHandle ---------------------------------------------------

/// A handle to a submitted lookup.
///
/// The handle is a future resolving into the lookup’s [`Completion`].
/// Dropping it does not cancel the lookup; use [`Channel::cancel`] with
/// the handle’s [`id`][Self::id] for that.
#[derive(Debug)]
pub struct QueryHandle {
    id: QueryId,
    rx: oneshot::Receiver<Completion>,
    done: bool,
}

impl QueryHandle {
    pub(crate) fn new(
        id: QueryId,
        rx: oneshot::Receiver<Completion>,
    ) -> Self {
        QueryHandle {
            id,
            rx,
            done: false,
        }
    }

    /// Returns the ID of the lookup.
    pub fn id(&self) -> QueryId {
        self.id
    }

    /// Returns the completion if the lookup has completed.
    ///
    /// The completion is only returned once.
    pub fn try_completion(&mut self) -> Option<Completion> {
        if self.done {
            return None;
        }
        let res = match self.rx.try_recv() {
            Ok(completion) => completion,
            Err(oneshot::error::TryRecvError::Empty) => return None,
            Err(oneshot::error::TryRecvError::Closed) => {
                Completion::new(0, Err(Error::Cancelled))
            }
        };
        self.done = true;
        Some(res)
    }
}

impl Future for QueryHandle {
    type Output = Completion;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Completion> {
        let res = match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(res) => res,
            Poll::Pending => return Poll::Pending,
        };
        self.done = true;
        // A dropped sender means the query was torn down without result.
        Poll::Ready(
            res.unwrap_or_else(|_| Completion::new(0, Err(Error::Cancelled))),
        )
    }
}

//============ Testing ======================================================
