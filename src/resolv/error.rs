//! Error type for the resolver.

use std::error;
use std::fmt::{Display, Formatter};
use std::io;
use std::sync::Arc;

//------------ Error ---------------------------------------------------------

/// Error type for the resolver.
///
/// Every query that doesn’t succeed completes with exactly one of these.
#[derive(Clone, Debug)]
pub enum Error {
    /// The configuration was rejected.
    InvalidOptions(&'static str),

    /// The query was cancelled before it completed.
    Cancelled,

    /// All transmissions to all servers timed out.
    TimeoutExhausted,

    /// The name does not exist.
    NameNotFound,

    /// The name exists but has no addresses of the requested family.
    NoData,

    /// The servers failed to process the query.
    ServerFailure,

    /// The servers refused to answer the query.
    Refused,

    /// The servers don’t implement the query.
    NotImplemented,

    /// The servers considered the query malformed.
    FormatError,

    /// The servers only sent responses that could not be parsed.
    MalformedResponse,

    /// There are no free resources, such as transaction IDs.
    ResourceExhausted,

    /// Communicating with the servers failed.
    Connection(Arc<io::Error>),

    /// The host name is not a valid domain name.
    BadName,

    /// The address family hint cannot be satisfied.
    BadFamily,

    /// The service name is not known.
    UnknownService,
}

impl Error {
    /// Returns the status code for the error.
    pub fn status(&self) -> Status {
        match self {
            Error::InvalidOptions(_) => Status::InvalidOptions,
            Error::Cancelled => Status::Cancelled,
            Error::TimeoutExhausted => Status::TimeoutExhausted,
            Error::NameNotFound => Status::NameNotFound,
            Error::NoData => Status::NoData,
            Error::ServerFailure => Status::ServerFailure,
            Error::Refused => Status::Refused,
            Error::NotImplemented => Status::NotImplemented,
            Error::FormatError => Status::FormatError,
            Error::MalformedResponse => Status::MalformedResponse,
            Error::ResourceExhausted => Status::ResourceExhausted,
            Error::Connection(_) => Status::Connection,
            Error::BadName => Status::BadName,
            Error::BadFamily => Status::BadFamily,
            Error::UnknownService => Status::UnknownService,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Connection(Arc::new(err))
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Error::InvalidOptions(msg) => {
                write!(f, "invalid options: {}", msg)
            }
            Error::Cancelled => write!(f, "query cancelled"),
            Error::TimeoutExhausted => {
                write!(f, "timeout waiting for all servers")
            }
            Error::NameNotFound => write!(f, "domain name not found"),
            Error::NoData => write!(f, "no addresses for domain name"),
            Error::ServerFailure => write!(f, "server failure"),
            Error::Refused => write!(f, "query refused"),
            Error::NotImplemented => write!(f, "query not implemented"),
            Error::FormatError => write!(f, "query format error"),
            Error::MalformedResponse => write!(f, "malformed response"),
            Error::ResourceExhausted => write!(f, "out of resources"),
            Error::Connection(err) => write!(f, "connection error: {}", err),
            Error::BadName => write!(f, "invalid host name"),
            Error::BadFamily => write!(f, "unsupported address family"),
            Error::UnknownService => write!(f, "unknown service"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Connection(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

//------------ Status --------------------------------------------------------

/// The status of a completed query.
///
/// This is a plain code mirroring [`Error`] with an additional value for
/// success.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Status {
    Success,
    InvalidOptions,
    Cancelled,
    TimeoutExhausted,
    NameNotFound,
    NoData,
    ServerFailure,
    Refused,
    NotImplemented,
    FormatError,
    MalformedResponse,
    ResourceExhausted,
    Connection,
    BadName,
    BadFamily,
    UnknownService,
}

impl Status {
    /// Returns whether this is the status of a successful query.
    pub fn is_success(self) -> bool {
        matches!(self, Status::Success)
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        // Keep the names of the codes for logging.
        write!(f, "{:?}", self)
    }
}

//============ Testing ======================================================
