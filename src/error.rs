/*
 * Copyright 2017-2024 Ben Ashford
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

//! Error handling

use std::{error, fmt, io};

use crate::protocol::{BufferError, Reply};

#[derive(Debug)]
pub enum Error {
    /// A non-specific internal error that prevented an operation from completing
    Internal(String),

    /// An IO error occurred, the connection it occurred on cannot be reused
    IO(io::Error),

    /// The server sent bytes that are not valid RESP, the connection cannot be reused
    Protocol(String),

    /// A reply could not be converted into the requested type
    RESP(String, Option<Reply>),

    /// A remote error
    Remote(String),

    /// A `MULTI`/`EXEC` block was not executed because a `WATCH`ed key changed.  Sent by the
    /// server as a nil multi-bulk reply.
    Aborted,

    /// The address string could not be understood
    InvalidAddress(String),

    /// Error creating a connection, or an error with a connection being closed unexpectedly
    Connection(ConnectionReason),

    /// An unexpected error.  In this context "unexpected" means
    /// "unexpected because we check ahead of time", it occurring at runtime should be
    /// considered a catastrophic failure.
    Unexpected(String),
}

pub(crate) fn internal(msg: impl Into<String>) -> Error {
    Error::Internal(msg.into())
}

pub(crate) fn unexpected(msg: impl Into<String>) -> Error {
    Error::Unexpected(msg.into())
}

pub(crate) fn protocol(msg: impl Into<String>) -> Error {
    Error::Protocol(msg.into())
}

pub(crate) fn resp(msg: impl Into<String>, reply: Reply) -> Error {
    Error::RESP(msg.into(), Some(reply))
}

impl Error {
    /// True for errors after which the connection's framing can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::IO(_) | Error::Protocol(_))
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IO(err)
    }
}

impl From<BufferError> for Error {
    fn from(err: BufferError) -> Error {
        match err {
            BufferError::Io(err) => Error::IO(err),
            BufferError::Full => unexpected("Read buffer full, line too long for the arena"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::IO(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Internal(s) => write!(f, "{}", s),
            Error::IO(err) => write!(f, "{}", err),
            Error::Protocol(s) => write!(f, "Protocol error: {}", s),
            Error::RESP(s, _) => write!(f, "{}", s),
            Error::Remote(s) => write!(f, "{}", s),
            Error::Aborted => write!(f, "Transaction aborted (nil multi-bulk reply)"),
            Error::InvalidAddress(addr) => write!(f, "Invalid address: {}", addr),
            Error::Connection(ConnectionReason::NotConnected) => {
                write!(f, "Connection has been closed")
            }
            Error::Connection(ConnectionReason::ConnectionFailed) => {
                write!(f, "Connection failed")
            }
            Error::Unexpected(s) => write!(f, "{}", s),
        }
    }
}

/// Details of a `ConnectionError`
#[derive(Debug)]
pub enum ConnectionReason {
    /// The connection is not currently connected, e.g. a closed subscription
    NotConnected,
    /// No connection could be established, e.g. dialing timed out
    ConnectionFailed,
}
