//! Resolver configuration
//!
//! The resolver configuration contains things like the name servers to
//! query, the search list, and a set of options. A configuration can be
//! created from scratch or from the system’s `/etc/resolv.conf` and the
//! `LOCALDOMAIN` and `RES_OPTIONS` environment variables.
//!
//! Options and parsing are modeled along the lines of glibc’s resolver.

use super::error::Error as ResolvError;
use crate::base::name::Dname;
use std::cmp;
use std::fmt;
use std::fs;
use std::io::{self, BufRead, Read};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::str::{FromStr, SplitWhitespace};
use std::time::Duration;
use std::{env, error};
use tracing::debug;

//------------ Configuration Constants ---------------------------------------

/// Time to wait for a response to a single transmission.
const TIMEOUT: DefMinMax<Duration> = DefMinMax::new(
    Duration::from_secs(5),
    Duration::from_millis(10),
    Duration::from_secs(60),
);

/// Upper limit for the transmission timeout when backing off.
const MAX_TIMEOUT: DefMinMax<Duration> = DefMinMax::new(
    Duration::from_secs(30),
    Duration::from_millis(10),
    Duration::from_secs(300),
);

/// Number of transmissions to each server per name.
const ATTEMPTS: DefMinMax<usize> = DefMinMax::new(2, 1, 16);

/// Number of dots before a name is tried as is first.
const NDOTS: DefMinMax<usize> = DefMinMax::new(1, 0, 15);

/// The UDP payload size advertised via EDNS.
const UDP_PAYLOAD_SIZE: DefMinMax<u16> = DefMinMax::new(1232, 512, 4096);

/// The default port for name servers.
const DEFAULT_PORT: u16 = 53;

/// The location of the system configuration file.
const RESOLV_CONF_PATH: &str = "/etc/resolv.conf";

//------------ ResolvOptions ------------------------------------------------

/// Flags for the resolver configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvOptions {
    /// Set the recursion desired bit in queries.
    ///
    /// Enabled by default.
    pub recurse: bool,

    /// Always use TCP.
    pub use_vc: bool,

    /// Ignore truncation errors, don’t retry with TCP.
    pub ign_tc: bool,

    /// Use round-robin selection of name servers.
    pub rotate: bool,

    /// Use EDNS0.
    pub use_edns0: bool,

    /// Search hostnames in the domains of the search list.
    ///
    /// Enabled by default.
    pub dn_search: bool,
}

impl Default for ResolvOptions {
    fn default() -> Self {
        ResolvOptions {
            // enabled by default:
            recurse: true,
            dn_search: true,

            // everthing else is not:
            use_vc: false,
            ign_tc: false,
            rotate: false,
            use_edns0: false,
        }
    }
}

//------------ Protocol ------------------------------------------------------

/// The transport protocol used to talk to a server.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Protocol {
    /// Datagrams over UDP, falling back to TCP for truncated answers.
    #[default]
    Udp,

    /// A TCP connection.
    Tcp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Protocol::Udp => f.write_str("UDP"),
            Protocol::Tcp => f.write_str("TCP"),
        }
    }
}

//------------ ServerConf ----------------------------------------------------

/// Configuration for one upstream DNS server.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ServerConf {
    /// Server address.
    pub addr: SocketAddr,

    /// The protocol to start queries with.
    pub protocol: Protocol,
}

impl ServerConf {
    /// Returns a new server config using UDP.
    pub fn new(addr: SocketAddr) -> Self {
        Self::with_protocol(addr, Protocol::Udp)
    }

    /// Returns a new server config using the given protocol.
    pub fn with_protocol(addr: SocketAddr, protocol: Protocol) -> Self {
        ServerConf { addr, protocol }
    }
}

//------------ Backoff -------------------------------------------------------

/// How the timeout grows with each round through the server list.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Backoff {
    /// Every transmission uses the configured timeout.
    Fixed,

    /// The timeout doubles after each round through all servers.
    ///
    /// It never exceeds the configured maximum timeout.
    #[default]
    Exponential,
}

//------------ EventModel ----------------------------------------------------

/// Who drives the resolver’s I/O.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum EventModel {
    /// The owner of the channel polls it on its own runtime.
    #[default]
    Default,

    /// A dedicated background thread polls the channel.
    Thread,
}

//------------ ResolvConf ---------------------------------------------------

/// Resolver configuration.
#[derive(Clone, Debug)]
pub struct ResolvConf {
    /// Servers to query in this order.
    pub servers: Vec<ServerConf>,

    /// Search list for host-name lookup.
    pub search: Vec<Dname>,

    /// Number of dots before an initial absolute query is made.
    pub ndots: usize,

    /// Timeout to wait for a response.
    pub timeout: Duration,

    /// Upper limit for the timeout when backing off.
    pub max_timeout: Duration,

    /// Number of transmissions to each server before giving up.
    pub attempts: usize,

    /// How the timeout grows with every round through the servers.
    pub backoff: Backoff,

    /// The UDP payload size to advertise if EDNS0 is used.
    pub udp_payload_size: u16,

    /// How the I/O of a channel is driven.
    pub event_model: EventModel,

    /// Default options.
    pub options: ResolvOptions,
}

/// # Management
///
impl ResolvConf {
    /// Creates a new, empty configuration.
    ///
    /// The configuration does not contain any name servers. A channel
    /// opened with it uses the system’s servers instead.
    pub fn new() -> Self {
        ResolvConf {
            servers: Vec::new(),
            search: Vec::new(),
            ndots: NDOTS.default(),
            timeout: TIMEOUT.default(),
            max_timeout: MAX_TIMEOUT.default(),
            attempts: ATTEMPTS.default(),
            backoff: Backoff::default(),
            udp_payload_size: UDP_PAYLOAD_SIZE.default(),
            event_model: EventModel::default(),
            options: ResolvOptions::default(),
        }
    }

    /// Creates a configuration with the given servers and all defaults.
    pub fn with_servers(servers: Vec<ServerConf>) -> Self {
        ResolvConf {
            servers,
            ..Self::new()
        }
    }

    /// Creates the system’s configuration.
    ///
    /// This reads `/etc/resolv.conf`, applies the environment variables,
    /// and finalizes the result. If the file cannot be read, the defaults
    /// are used.
    pub fn system() -> Self {
        let mut res = Self::new();
        if let Err(err) = res.parse_file(RESOLV_CONF_PATH) {
            debug!("failed to read {}: {}", RESOLV_CONF_PATH, err);
        }
        res.apply_env();
        res.finalize();
        res
    }

    /// Finalizes the configuration for actual use.
    ///
    /// If `servers` is empty, adds `127.0.0.1:53`. This is exactly what
    /// glibc does.
    pub fn finalize(&mut self) {
        if self.servers.is_empty() {
            self.servers.push(ServerConf::new(SocketAddr::new(
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                DEFAULT_PORT,
            )));
        }
    }

    /// Checks that all values are within their permitted ranges.
    pub fn validate(&self) -> Result<(), ResolvError> {
        if self.servers.is_empty() {
            return Err(ResolvError::InvalidOptions("no servers"));
        }
        if !TIMEOUT.contains(self.timeout) {
            return Err(ResolvError::InvalidOptions("timeout out of range"));
        }
        if !MAX_TIMEOUT.contains(self.max_timeout)
            || self.max_timeout < self.timeout
        {
            return Err(ResolvError::InvalidOptions(
                "maximum timeout out of range",
            ));
        }
        if !ATTEMPTS.contains(self.attempts) {
            return Err(ResolvError::InvalidOptions("attempts out of range"));
        }
        if !NDOTS.contains(self.ndots) {
            return Err(ResolvError::InvalidOptions("ndots out of range"));
        }
        if !UDP_PAYLOAD_SIZE.contains(self.udp_payload_size) {
            return Err(ResolvError::InvalidOptions(
                "UDP payload size out of range",
            ));
        }
        Ok(())
    }

    /// Returns the timeout for a transmission in the given round.
    ///
    /// A round is one pass through all the servers, starting at zero.
    pub fn attempt_timeout(&self, round: usize) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.timeout,
            Backoff::Exponential => {
                let factor = 1u32 << cmp::min(round, 16);
                cmp::min(
                    self.timeout.saturating_mul(factor),
                    self.max_timeout,
                )
            }
        }
    }

    /// Returns the protocol to start queries to a server with.
    pub fn protocol(&self, server: &ServerConf) -> Protocol {
        if self.options.use_vc {
            Protocol::Tcp
        } else {
            server.protocol
        }
    }
}

impl Default for ResolvConf {
    fn default() -> Self {
        Self::new()
    }
}

/// # Parsing Configuration File
///
impl ResolvConf {
    /// Parses the configuration from a file.
    pub fn parse_file<P: AsRef<Path>>(
        &mut self,
        path: P,
    ) -> Result<(), Error> {
        let mut file = fs::File::open(path)?;
        self.parse(&mut file)
    }

    /// Parses the configuration from a reader.
    ///
    /// The format is that of the /etc/resolv.conf file.
    pub fn parse<R: Read>(&mut self, reader: &mut R) -> Result<(), Error> {
        for line in io::BufReader::new(reader).lines() {
            let line = line?;
            let line = line.trim_end();

            if line.is_empty()
                || line.starts_with(';')
                || line.starts_with('#')
            {
                continue;
            }

            let mut words = line.split_whitespace();
            let keyword = words.next();
            match keyword {
                Some("nameserver") => self.parse_nameserver(words)?,
                Some("domain") => self.parse_domain(words)?,
                Some("search") => self.parse_search(words)?,
                Some("options") => self.parse_options(words)?,
                Some(keyword) => {
                    debug!("ignoring resolv.conf keyword '{}'", keyword)
                }
                None => {}
            }
        }
        Ok(())
    }

    /// Applies the `LOCALDOMAIN` and `RES_OPTIONS` environment variables.
    pub fn apply_env(&mut self) {
        if let Ok(domains) = env::var("LOCALDOMAIN") {
            if let Err(err) = self.apply_local_domain(&domains) {
                debug!("ignoring invalid LOCALDOMAIN: {}", err);
            }
        }
        if let Ok(options) = env::var("RES_OPTIONS") {
            if let Err(err) = self.apply_res_options(&options) {
                debug!("ignoring invalid RES_OPTIONS: {}", err);
            }
        }
    }

    /// Replaces the search list with the domains given in `domains`.
    ///
    /// This is the format of the `LOCALDOMAIN` environment variable.
    pub fn apply_local_domain(&mut self, domains: &str) -> Result<(), Error> {
        self.parse_search(domains.split_whitespace())
    }

    /// Applies the options given in `options`.
    ///
    /// This is the format of the `RES_OPTIONS` environment variable.
    pub fn apply_res_options(&mut self, options: &str) -> Result<(), Error> {
        self.parse_options(options.split_whitespace())
    }

    fn parse_nameserver(
        &mut self,
        mut words: SplitWhitespace,
    ) -> Result<(), Error> {
        let word = next_word(&mut words)?;
        let addr = match SocketAddr::from_str(word) {
            Ok(addr) => addr,
            Err(_) => SocketAddr::new(IpAddr::from_str(word)?, DEFAULT_PORT),
        };
        self.servers.push(ServerConf::new(addr));
        no_more_words(words)
    }

    fn parse_domain(
        &mut self,
        mut words: SplitWhitespace,
    ) -> Result<(), Error> {
        let domain = Dname::from_str(next_word(&mut words)?)?;
        self.search = vec![domain];
        no_more_words(words)
    }

    fn parse_search(&mut self, words: SplitWhitespace) -> Result<(), Error> {
        let mut search = Vec::new();
        for word in words {
            search.push(Dname::from_str(word)?)
        }
        self.search = search;
        Ok(())
    }

    fn parse_options(&mut self, words: SplitWhitespace) -> Result<(), Error> {
        for word in words {
            match split_arg(word)? {
                ("ndots", Some(n)) => self.ndots = NDOTS.limit(n),
                ("timeout", Some(n)) => {
                    self.timeout =
                        TIMEOUT.limit(Duration::from_secs(n as u64))
                }
                ("attempts", Some(n)) => self.attempts = ATTEMPTS.limit(n),
                ("rotate", None) => self.options.rotate = true,
                ("edns0", None) => self.options.use_edns0 = true,
                ("use-vc", None) => self.options.use_vc = true,
                // Ignore unknown or misformated options.
                _ => {}
            }
        }
        Ok(())
    }
}

//------------ Private Helpers ----------------------------------------------

fn next_word<'a>(words: &mut SplitWhitespace<'a>) -> Result<&'a str, Error> {
    words.next().ok_or(Error::Parse)
}

fn no_more_words(mut words: SplitWhitespace) -> Result<(), Error> {
    match words.next() {
        Some(..) => Err(Error::Parse),
        None => Ok(()),
    }
}

fn split_arg(s: &str) -> Result<(&str, Option<usize>), Error> {
    match s.find(':') {
        Some(idx) => {
            let (left, right) = s.split_at(idx);
            Ok((left, Some(usize::from_str(&right[1..])?)))
        }
        None => Ok((s, None)),
    }
}

//------------ DefMinMax -----------------------------------------------------

/// The default, minimum, and maximum values for a config variable.
#[derive(Clone, Copy)]
struct DefMinMax<T> {
    def: T,
    min: T,
    max: T,
}

impl<T: Copy + Ord> DefMinMax<T> {
    const fn new(def: T, min: T, max: T) -> Self {
        Self { def, min, max }
    }

    fn default(self) -> T {
        self.def
    }

    /// Trims the given value to fit into the minimum/maximum range.
    fn limit(self, value: T) -> T {
        cmp::max(self.min, cmp::min(self.max, value))
    }

    fn contains(self, value: T) -> bool {
        self.min <= value && value <= self.max
    }
}

//------------ Error ---------------------------------------------------------

/// Reading a configuration file failed.
#[derive(Debug)]
pub enum Error {
    /// The file contained invalid data.
    Parse,

    /// Reading the file failed.
    Io(io::Error),
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Parse => None,
            Error::Io(err) => Some(err),
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Error {
        Error::Io(error)
    }
}

impl From<crate::base::name::NameError> for Error {
    fn from(_: crate::base::name::NameError) -> Error {
        Error::Parse
    }
}

impl From<std::net::AddrParseError> for Error {
    fn from(_: std::net::AddrParseError) -> Error {
        Error::Parse
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(_: std::num::ParseIntError) -> Error {
        Error::Parse
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Parse => f.write_str("error parsing configuration"),
            Error::Io(err) => err.fmt(f),
        }
    }
}

//============ Testing ======================================================
