/*
 * Copyright 2020-2024 Ben Ashford
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{self, Error};

use super::connect::Connection;
use super::pool::Pool;
use super::pooled::Client;

/// Pool size used unless `max_connections` says otherwise
pub const DEFAULT_MAX_CONNECTIONS: usize = 50;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 6379;

/// Where the server is.  Parsed from `"tcp:<host>:<port>"` or `"unix:<path>"`, the empty string
/// is `tcp:127.0.0.1:6379`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
}

impl Default for Address {
    fn default() -> Self {
        Address::Tcp {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        if s.is_empty() {
            return Ok(Address::default());
        }

        let invalid = || Error::InvalidAddress(s.to_string());
        let (protocol, rest) = s.split_once(':').ok_or_else(invalid)?;

        match protocol {
            "tcp" => {
                let (host, port) = rest.rsplit_once(':').ok_or_else(invalid)?;
                let port = port.parse().map_err(|_| invalid())?;
                let host = host
                    .strip_prefix('[')
                    .and_then(|h| h.strip_suffix(']'))
                    .unwrap_or(host);
                if host.is_empty() {
                    return Err(invalid());
                }
                Ok(Address::Tcp {
                    host: host.to_string(),
                    port,
                })
            }
            "unix" if !rest.is_empty() => Ok(Address::Unix(PathBuf::from(rest))),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Address::Tcp { host, port } if host.contains(':') => {
                write!(f, "tcp:[{}]:{}", host, port)
            }
            Address::Tcp { host, port } => write!(f, "tcp:{}:{}", host, port),
            Address::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

#[derive(Debug, Clone)]
/// Connection builder
pub struct ConnectionBuilder {
    pub(crate) address: Address,
    pub(crate) db: u32,
    pub(crate) username: Option<Arc<str>>,
    pub(crate) password: Option<Arc<str>>,
    pub(crate) max_connections: usize,
    pub(crate) connect_timeout: Option<Duration>,
    pub(crate) keepalive: Option<Duration>,
}

impl ConnectionBuilder {
    pub fn new(addr: &str) -> Result<Self, error::Error> {
        Ok(Self {
            address: addr.parse()?,
            db: 0,
            username: None,
            password: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout: None,
            keepalive: None,
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Select this database on every new connection, `0` sends nothing
    pub fn db(&mut self, db: u32) -> &mut Self {
        self.db = db;
        self
    }

    /// Set the username used when connecting
    pub fn username<V: Into<Arc<str>>>(&mut self, username: V) -> &mut Self {
        self.username = Some(username.into());
        self
    }

    /// Set the password used when connecting
    pub fn password<V: Into<Arc<str>>>(&mut self, password: V) -> &mut Self {
        self.password = Some(password.into());
        self
    }

    /// The most connections a `Client` will have open, and so the most commands it will have in
    /// flight, at once.  At least one.
    pub fn max_connections(&mut self, max_connections: usize) -> &mut Self {
        self.max_connections = max_connections.max(1);
        self
    }

    /// Give up dialing a new connection after this long
    pub fn connect_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Enable TCP keepalive probes after the connection has been idle for `time`
    pub fn keepalive(&mut self, time: Duration) -> &mut Self {
        self.keepalive = Some(time);
        self
    }

    /// A pooled client.  No connection is made until the first command.
    pub fn client(&self) -> Client {
        Client::from_pool(Pool::new(self.clone()))
    }

    /// A single connection outside of any pool, ready for commands.
    pub async fn connect(&self) -> Result<Connection, Error> {
        Connection::open(self).await
    }
}
