//! The state machine of a single query.
//!
//! A [`Query`] keeps track of one address lookup submitted to a channel. It
//! doesn’t do any I/O itself. Instead, the channel feeds it with what
//! happened, such as a response arriving or a timer expiring, and the query
//! answers with the [`Action`] the channel needs to take next.
//!
//! A query walks through its search candidates one after another. For each
//! candidate, it sends one question for each record type it needs, A and/or
//! AAAA, all with the query’s transaction ID. Transmissions per candidate
//! are limited to the configured number of attempts times the number of
//! servers. The n-th transmission goes to server `(start + n) % servers`.

use super::addrinfo::{AddrInfo, AddrInfoHints};
use super::conf::{Protocol, ResolvConf};
use super::error::Error;
use super::search::Candidates;
use super::transport::Request;
use crate::base::iana::{Class, Rcode, Rtype};
use crate::base::message::Message;
use crate::base::message_builder::{MessageBuilder, PushError};
use crate::base::name::Dname;
use crate::base::question::Question;
use smallvec::SmallVec;
use std::io;
use tokio::time::Instant;
use tracing::debug;

//------------ State ---------------------------------------------------------

/// The processing state of a query.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    /// The query has been created but nothing was sent yet.
    Pending,

    /// The first transmission for the current name is outstanding.
    InFlight,

    /// A retransmission for the current name is outstanding.
    Retrying,

    /// The query completed successfully.
    Completed,

    /// The query failed.
    Failed,

    /// The query was cancelled.
    Cancelled,
}

impl State {
    /// Returns whether the query has ended.
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Completed | State::Failed | State::Cancelled)
    }
}

//------------ Action --------------------------------------------------------

/// What the channel needs to do for a query.
#[derive(Debug)]
pub enum Action {
    /// Release the transaction’s sockets and send these requests.
    Transmit(SmallVec<[Request; 2]>),

    /// Nothing to do until the next event or the deadline.
    Wait,

    /// The query is done, deliver the result.
    Complete(Result<AddrInfo, Error>),
}

//------------ Query ---------------------------------------------------------

/// A single outstanding address lookup.
#[derive(Debug)]
pub struct Query {
    /// The transaction ID used for all messages of this query.
    txid: u16,

    /// The names to try.
    candidates: Candidates,

    /// The index of the name currently tried.
    candidate: usize,

    /// The lookups for the current name.
    lookups: SmallVec<[Lookup; 2]>,

    /// The hints given when submitting.
    hints: AddrInfoHints,

    /// The port of the service given when submitting.
    port: u16,

    state: State,

    /// The server index to start with.
    start: usize,

    /// The number of transmissions made for the current name.
    sent: usize,

    /// The index of the server last sent to.
    server: usize,

    /// Whether a truncated answer forced us onto TCP.
    force_tcp: bool,

    /// Whether to include an OPT record.
    edns: bool,

    /// When the outstanding transmission times out.
    deadline: Option<Instant>,

    /// The number of transmissions that timed out.
    timeouts: usize,

    /// The most relevant error for the current name so far.
    last_error: Option<Error>,

    /// Whether any name existed but had no addresses.
    no_data: bool,
}

impl Query {
    /// Creates a new query.
    ///
    /// The candidates must not be empty.
    pub fn new(
        txid: u16,
        candidates: Candidates,
        hints: AddrInfoHints,
        port: u16,
        start: usize,
        conf: &ResolvConf,
    ) -> Self {
        Query {
            txid,
            candidates,
            candidate: 0,
            lookups: hints
                .family
                .rtypes()
                .into_iter()
                .map(|rtype| Lookup {
                    rtype,
                    answer: None,
                })
                .collect(),
            hints,
            port,
            state: State::Pending,
            start,
            sent: 0,
            server: start,
            force_tcp: false,
            edns: conf.options.use_edns0,
            deadline: None,
            timeouts: 0,
            last_error: None,
            no_data: false,
        }
    }

    /// Returns the transaction ID.
    pub fn txid(&self) -> u16 {
        self.txid
    }

    /// Returns the current state.
    pub fn state(&self) -> State {
        self.state
    }

    /// Returns when the outstanding transmission times out.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the number of transmissions that timed out so far.
    pub fn timeouts(&self) -> usize {
        self.timeouts
    }

    /// Returns the index of the server last sent to.
    pub fn server(&self) -> usize {
        self.server
    }

    /// Returns the name currently tried.
    pub fn current_name(&self) -> &Dname {
        &self.candidates[self.candidate]
    }

    /// Starts the query.
    pub fn start(&mut self, conf: &ResolvConf, now: Instant) -> Action {
        debug_assert_eq!(self.state, State::Pending);
        self.transmit(conf, now)
    }

    /// Processes a response.
    ///
    /// Returns `None` if the response isn’t for an outstanding lookup of
    /// this query, in which case it should be dropped.
    pub fn handle_response(
        &mut self,
        conf: &ResolvConf,
        message: &Message,
        protocol: Protocol,
        now: Instant,
    ) -> Option<Action> {
        if self.state.is_terminal()
            || !message.header().qr()
            || message.id() != self.txid
        {
            return None;
        }
        let question = match message.question() {
            [question] => question,
            _ => return None,
        };
        let qname = &self.candidates[self.candidate];
        let idx = self.lookups.iter().position(|lookup| {
            lookup.answer.is_none()
                && question.qtype() == lookup.rtype
                && question.qclass() == Class::IN
                && question.qname() == qname
        })?;

        let header = message.header();
        if header.tc() && protocol == Protocol::Udp && !conf.options.ign_tc {
            debug!(txid = self.txid, "truncated response, retrying over TCP");
            self.force_tcp = true;
            return Some(self.resend(conf, now));
        }
        let action = match header.rcode() {
            Rcode::NOERROR => {
                self.lookups[idx].answer = Some(message.clone());
                if self.lookups.iter().all(|item| item.answer.is_some()) {
                    self.finish_name(conf, now)
                } else {
                    Action::Wait
                }
            }
            Rcode::NXDOMAIN => self.next_name(conf, now, Error::NameNotFound),
            Rcode::FORMERR if self.edns => {
                debug!(txid = self.txid, "FORMERR, retrying without EDNS");
                self.edns = false;
                self.resend(conf, now)
            }
            rcode => {
                debug!(
                    txid = self.txid,
                    server = self.server,
                    "server answered {}",
                    rcode
                );
                self.last_error = Some(match rcode {
                    Rcode::FORMERR => Error::FormatError,
                    Rcode::NOTIMP => Error::NotImplemented,
                    Rcode::REFUSED => Error::Refused,
                    _ => Error::ServerFailure,
                });
                self.transmit(conf, now)
            }
        };
        Some(action)
    }

    /// Processes a failure to exchange messages with a server.
    ///
    /// Returns `None` if the failure doesn’t concern the server currently
    /// asked.
    pub fn handle_failure(
        &mut self,
        conf: &ResolvConf,
        server: usize,
        error: io::Error,
        now: Instant,
    ) -> Option<Action> {
        if self.state.is_terminal() || server != self.server {
            return None;
        }
        debug!(txid = self.txid, server, "transport failed: {}", error);
        self.last_error = Some(error.into());
        Some(self.transmit(conf, now))
    }

    /// Processes the expiry of the deadline.
    ///
    /// Returns `None` if the deadline hasn’t expired yet.
    pub fn handle_timeout(
        &mut self,
        conf: &ResolvConf,
        now: Instant,
    ) -> Option<Action> {
        match self.deadline {
            Some(deadline)
                if deadline <= now && !self.state.is_terminal() => {}
            _ => return None,
        }
        self.timeouts += 1;
        debug!(txid = self.txid, server = self.server, "request timed out");
        Some(self.transmit(conf, now))
    }

    /// Notes that an unparseable response arrived for this query.
    ///
    /// The query keeps waiting but will report the response as malformed
    /// if nothing better comes along.
    pub fn note_malformed(&mut self) {
        if self.last_error.is_none() {
            self.last_error = Some(Error::MalformedResponse)
        }
    }

    /// Cancels the query.
    ///
    /// Returns whether the query was still running.
    pub fn cancel(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = State::Cancelled;
        self.deadline = None;
        true
    }

    /// Sends the outstanding lookups to the next server.
    fn transmit(&mut self, conf: &ResolvConf, now: Instant) -> Action {
        let count = conf.servers.len();
        if count == 0 || self.sent >= conf.attempts * count {
            let err =
                self.last_error.take().unwrap_or(Error::TimeoutExhausted);
            return self.fail(err);
        }
        self.server = (self.start + self.sent) % count;
        let timeout = conf.attempt_timeout(self.sent / count);
        self.state = if self.sent == 0 {
            State::InFlight
        } else {
            State::Retrying
        };
        self.sent += 1;
        self.deadline = Some(now + timeout);
        self.send(conf)
    }

    /// Sends the outstanding lookups to the same server again.
    ///
    /// This doesn’t count as an attempt.
    fn resend(&mut self, conf: &ResolvConf, now: Instant) -> Action {
        let round = self.sent.saturating_sub(1) / conf.servers.len().max(1);
        self.deadline = Some(now + conf.attempt_timeout(round));
        self.send(conf)
    }

    /// Transmits the requests for all outstanding lookups.
    fn send(&mut self, conf: &ResolvConf) -> Action {
        match self.requests(conf) {
            Ok(requests) => Action::Transmit(requests),
            Err(err) => {
                debug!("cannot build query: {}", err);
                self.fail(Error::BadName)
            }
        }
    }

    /// Creates the requests for all outstanding lookups.
    fn requests(
        &self,
        conf: &ResolvConf,
    ) -> Result<SmallVec<[Request; 2]>, PushError> {
        let server = &conf.servers[self.server];
        let protocol = if self.force_tcp {
            Protocol::Tcp
        } else {
            conf.protocol(server)
        };
        let qname = &self.candidates[self.candidate];
        self.lookups
            .iter()
            .filter(|lookup| lookup.answer.is_none())
            .map(|lookup| -> Result<Request, PushError> {
                let mut builder = MessageBuilder::query(
                    self.txid,
                    Question::new_in(qname.clone(), lookup.rtype),
                    conf.options.recurse,
                );
                if self.edns {
                    builder.opt(conf.udp_payload_size);
                }
                Ok(Request {
                    txid: self.txid,
                    server: self.server,
                    addr: server.addr,
                    protocol,
                    message: builder.finish()?,
                })
            })
            .collect()
    }

    /// All lookups for the current name have an answer.
    fn finish_name(&mut self, conf: &ResolvConf, now: Instant) -> Action {
        let info = AddrInfo::from_answers(
            self.lookups.iter().filter_map(|lookup| lookup.answer.as_ref()),
            self.port,
            &self.hints,
        );
        if info.is_empty() {
            self.next_name(conf, now, Error::NoData)
        } else {
            self.state = State::Completed;
            self.deadline = None;
            Action::Complete(Ok(info))
        }
    }

    /// Moves on to the next candidate or fails with `err`.
    fn next_name(
        &mut self,
        conf: &ResolvConf,
        now: Instant,
        err: Error,
    ) -> Action {
        if matches!(err, Error::NoData) {
            self.no_data = true;
        }
        if self.candidate + 1 >= self.candidates.len() {
            let err = if self.no_data { Error::NoData } else { err };
            return self.fail(err);
        }
        self.candidate += 1;
        debug!(
            txid = self.txid,
            name = %self.candidates[self.candidate],
            "trying next name"
        );
        self.sent = 0;
        self.force_tcp = false;
        self.edns = conf.options.use_edns0;
        self.last_error = None;
        for lookup in &mut self.lookups {
            lookup.answer = None;
        }
        self.transmit(conf, now)
    }

    fn fail(&mut self, err: Error) -> Action {
        self.state = State::Failed;
        self.deadline = None;
        Action::Complete(Err(err))
    }
}

//------------ Lookup --------------------------------------------------------

/// The question for one record type of the current name.
#[derive(Debug)]
struct Lookup {
    rtype: Rtype,

    /// The accepted answer, once it arrived.
    answer: Option<Message>,
}

//============ Testing ======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::record::{Record, RecordData};
    use crate::resolv::addrinfo::Family;
    use crate::resolv::conf::ServerConf;
    use std::net::Ipv4Addr;
    use std::str::FromStr;
    use std::time::Duration;

    fn conf(servers: usize, attempts: usize) -> ResolvConf {
        let mut conf = ResolvConf::with_servers(
            (0..servers)
                .map(|i| {
                    ServerConf::new(([192, 0, 2, i as u8 + 1], 53).into())
                })
                .collect(),
        );
        conf.attempts = attempts;
        conf.timeout = Duration::from_secs(1);
        conf.max_timeout = Duration::from_secs(3);
        conf
    }

    fn query(names: &[&str], family: Family, conf: &ResolvConf) -> Query {
        Query::new(
            0x1234,
            names.iter().map(|n| Dname::from_str(n).unwrap()).collect(),
            AddrInfoHints::with_family(family),
            80,
            0,
            conf,
        )
    }

    fn requests(action: Action) -> SmallVec<[Request; 2]> {
        match action {
            Action::Transmit(requests) => requests,
            other => panic!("expected transmit, got {:?}", other),
        }
    }

    fn error(action: Action) -> Error {
        match action {
            Action::Complete(Err(err)) => err,
            other => panic!("expected error, got {:?}", other),
        }
    }

    fn response(
        request: &Request,
        rcode: Rcode,
        addr: Option<Ipv4Addr>,
    ) -> Message {
        let mut builder =
            MessageBuilder::start_answer(&request.message, rcode);
        if let Some(addr) = addr {
            builder.push_answer(Record::new(
                request.message.first_question().unwrap().qname().clone(),
                Class::IN,
                300,
                RecordData::A(addr),
            ));
        }
        builder.finish().unwrap()
    }

    #[test]
    fn round_robin_with_backoff() {
        let conf = conf(2, 2);
        let mut query = query(&["example.com"], Family::Ipv4, &conf);
        let mut now = Instant::now();

        let mut servers = Vec::new();
        let mut timeouts = Vec::new();
        let mut action = query.start(&conf, now);
        loop {
            match action {
                Action::Transmit(requests) => {
                    assert_eq!(requests.len(), 1);
                    servers.push(requests[0].server);
                    timeouts.push(query.deadline().unwrap() - now);
                }
                Action::Complete(res) => {
                    assert!(matches!(res, Err(Error::TimeoutExhausted)));
                    break;
                }
                Action::Wait => panic!("unexpected wait"),
            }
            assert!(query.handle_timeout(&conf, now).is_none());
            now = query.deadline().unwrap();
            action = query.handle_timeout(&conf, now).unwrap();
        }
        assert_eq!(servers, [0, 1, 0, 1]);
        assert_eq!(
            timeouts,
            [1, 1, 2, 2].map(Duration::from_secs).as_slice()
        );
        assert_eq!(query.timeouts(), 4);
        assert_eq!(query.state(), State::Failed);
    }

    #[test]
    fn both_families() {
        let conf = conf(1, 2);
        let mut query = query(&["example.com"], Family::Unspecified, &conf);
        let now = Instant::now();
        let sent = requests(query.start(&conf, now));
        assert_eq!(query.state(), State::InFlight);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].message.qtype(), Some(Rtype::A));
        assert_eq!(sent[1].message.qtype(), Some(Rtype::AAAA));
        assert!(sent.iter().all(|r| r.message.id() == 0x1234));

        // AAAA is empty, A has the address.
        let empty = response(&sent[1], Rcode::NOERROR, None);
        assert!(matches!(
            query.handle_response(&conf, &empty, Protocol::Udp, now),
            Some(Action::Wait)
        ));
        // The same answer again is no longer outstanding.
        assert!(query
            .handle_response(&conf, &empty, Protocol::Udp, now)
            .is_none());
        let addr = Ipv4Addr::new(192, 0, 2, 7);
        let full = response(&sent[0], Rcode::NOERROR, Some(addr));
        match query.handle_response(&conf, &full, Protocol::Udp, now) {
            Some(Action::Complete(Ok(info))) => {
                assert_eq!(info.nodes().len(), 1);
                assert_eq!(info.nodes()[0].addr().port(), 80);
            }
            other => panic!("{:?}", other),
        }
        assert_eq!(query.state(), State::Completed);
    }

    #[test]
    fn mismatched_responses() {
        let conf = conf(1, 2);
        let mut query = query(&["example.com"], Family::Ipv4, &conf);
        let now = Instant::now();
        let sent = requests(query.start(&conf, now));

        // Wrong ID.
        let mut builder =
            MessageBuilder::start_answer(&sent[0].message, Rcode::NOERROR);
        builder.header_mut().set_id(0x4321);
        let msg = builder.finish().unwrap();
        assert!(query
            .handle_response(&conf, &msg, Protocol::Udp, now)
            .is_none());

        // Wrong question.
        let mut builder = MessageBuilder::new();
        builder.header_mut().set_id(0x1234);
        builder.header_mut().set_qr(true);
        builder.push_question(Question::new_in(
            Dname::from_str("example.net").unwrap(),
            Rtype::A,
        ));
        let msg = builder.finish().unwrap();
        assert!(query
            .handle_response(&conf, &msg, Protocol::Udp, now)
            .is_none());

        // Not a response.
        assert!(query
            .handle_response(&conf, &sent[0].message, Protocol::Udp, now)
            .is_none());
        assert_eq!(query.state(), State::InFlight);
    }

    #[test]
    fn truncated_switches_to_tcp() {
        let conf = conf(2, 1);
        let mut query = query(&["example.com"], Family::Ipv4, &conf);
        let now = Instant::now();
        let sent = requests(query.start(&conf, now));
        assert_eq!(sent[0].protocol, Protocol::Udp);

        let mut builder =
            MessageBuilder::start_answer(&sent[0].message, Rcode::NOERROR);
        builder.header_mut().set_tc(true);
        let msg = builder.finish().unwrap();
        let resent = requests(
            query.handle_response(&conf, &msg, Protocol::Udp, now).unwrap(),
        );
        assert_eq!(resent[0].protocol, Protocol::Tcp);
        assert_eq!(resent[0].server, 0);

        // The resend didn’t use up an attempt: there is still one server.
        let next = requests(
            query
                .handle_timeout(&conf, query.deadline().unwrap())
                .unwrap(),
        );
        assert_eq!(next[0].server, 1);
        assert_eq!(next[0].protocol, Protocol::Tcp);
    }

    #[test]
    fn formerr_disables_edns() {
        let mut conf = conf(1, 1);
        conf.options.use_edns0 = true;
        let mut query = query(&["example.com"], Family::Ipv4, &conf);
        let now = Instant::now();
        let sent = requests(query.start(&conf, now));
        assert_eq!(sent[0].message.udp_payload_size(), Some(1232));

        let msg = response(&sent[0], Rcode::FORMERR, None);
        let resent = requests(
            query.handle_response(&conf, &msg, Protocol::Udp, now).unwrap(),
        );
        assert_eq!(resent[0].message.udp_payload_size(), None);

        // A second FORMERR is final.
        let msg = response(&resent[0], Rcode::FORMERR, None);
        assert!(matches!(
            error(
                query
                    .handle_response(&conf, &msg, Protocol::Udp, now)
                    .unwrap()
            ),
            Error::FormatError
        ));
    }

    #[test]
    fn servfail_fails_over() {
        let conf = conf(2, 1);
        let mut query = query(&["example.com"], Family::Ipv4, &conf);
        let now = Instant::now();
        let sent = requests(query.start(&conf, now));
        let msg = response(&sent[0], Rcode::SERVFAIL, None);
        let next = requests(
            query.handle_response(&conf, &msg, Protocol::Udp, now).unwrap(),
        );
        assert_eq!(next[0].server, 1);
        let msg = response(&next[0], Rcode::REFUSED, None);
        assert!(matches!(
            error(
                query
                    .handle_response(&conf, &msg, Protocol::Udp, now)
                    .unwrap()
            ),
            Error::Refused
        ));
        assert_eq!(query.timeouts(), 0);
    }

    #[test]
    fn nxdomain_walks_candidates() {
        let conf = conf(1, 2);
        let mut query =
            query(&["www.example.com", "www"], Family::Ipv4, &conf);
        let now = Instant::now();
        let sent = requests(query.start(&conf, now));
        let msg = response(&sent[0], Rcode::NXDOMAIN, None);
        let next = requests(
            query.handle_response(&conf, &msg, Protocol::Udp, now).unwrap(),
        );
        assert_eq!(
            next[0].message.first_question().unwrap().qname(),
            &Dname::from_str("www").unwrap()
        );
        assert_eq!(query.state(), State::InFlight);

        // A late answer for the first name is ignored.
        assert!(query
            .handle_response(&conf, &msg, Protocol::Udp, now)
            .is_none());

        let msg = response(&next[0], Rcode::NXDOMAIN, None);
        assert!(matches!(
            error(
                query
                    .handle_response(&conf, &msg, Protocol::Udp, now)
                    .unwrap()
            ),
            Error::NameNotFound
        ));
    }

    #[test]
    fn no_data_wins_over_nxdomain() {
        let conf = conf(1, 2);
        let mut query =
            query(&["a.example", "b.example"], Family::Ipv4, &conf);
        let now = Instant::now();
        let sent = requests(query.start(&conf, now));
        let msg = response(&sent[0], Rcode::NOERROR, None);
        let next = requests(
            query.handle_response(&conf, &msg, Protocol::Udp, now).unwrap(),
        );
        let msg = response(&next[0], Rcode::NXDOMAIN, None);
        assert!(matches!(
            error(
                query
                    .handle_response(&conf, &msg, Protocol::Udp, now)
                    .unwrap()
            ),
            Error::NoData
        ));
    }

    #[test]
    fn transport_failure_moves_on() {
        let conf = conf(2, 1);
        let mut query = query(&["example.com"], Family::Ipv4, &conf);
        let now = Instant::now();
        requests(query.start(&conf, now));
        let refused = || io::Error::from(io::ErrorKind::ConnectionRefused);

        // Failures of other servers are ignored.
        assert!(query.handle_failure(&conf, 1, refused(), now).is_none());
        let next = requests(
            query.handle_failure(&conf, 0, refused(), now).unwrap(),
        );
        assert_eq!(next[0].server, 1);
        assert!(matches!(
            error(query.handle_failure(&conf, 1, refused(), now).unwrap()),
            Error::Connection(_)
        ));
    }

    #[test]
    fn malformed_reported_at_exhaustion() {
        let conf = conf(1, 1);
        let mut query = query(&["example.com"], Family::Ipv4, &conf);
        let now = Instant::now();
        requests(query.start(&conf, now));
        query.note_malformed();
        assert!(matches!(
            error(
                query
                    .handle_timeout(&conf, query.deadline().unwrap())
                    .unwrap()
            ),
            Error::MalformedResponse
        ));
        assert_eq!(query.timeouts(), 1);
    }

    #[test]
    fn cancel() {
        let conf = conf(1, 1);
        let mut query = query(&["example.com"], Family::Ipv4, &conf);
        let now = Instant::now();
        let sent = requests(query.start(&conf, now));
        assert!(query.cancel());
        assert!(!query.cancel());
        assert_eq!(query.state(), State::Cancelled);
        assert_eq!(query.deadline(), None);
        let msg =
            response(&sent[0], Rcode::NOERROR, Some(Ipv4Addr::LOCALHOST));
        assert!(query
            .handle_response(&conf, &msg, Protocol::Udp, now)
            .is_none());
    }
}
