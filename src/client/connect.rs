/*
 * Copyright 2017-2024 Ben Ashford
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::BytesMut;
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio_util::codec::Encoder;

use crate::error::{ConnectionReason, Error};
use crate::protocol::{decode, BufferedReader, Command, CommandCodec, FromReply, Reply, Stats};
use crate::task;

use super::builder::{Address, ConnectionBuilder};

/// The socket under a connection
#[derive(Debug)]
pub(crate) enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(unix)]
            Stream::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(unix)]
            Stream::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_flush(cx),
            #[cfg(unix)]
            Stream::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(unix)]
            Stream::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

async fn open_stream(address: &Address, keepalive: Option<Duration>) -> Result<Stream, Error> {
    match address {
        Address::Tcp { host, port } => {
            let tcp = TcpStream::connect((host.as_str(), *port)).await?;
            tcp.set_nodelay(true)?;
            if let Some(time) = keepalive {
                SockRef::from(&tcp).set_tcp_keepalive(&TcpKeepalive::new().with_time(time))?;
            }
            Ok(Stream::Tcp(tcp))
        }
        #[cfg(unix)]
        Address::Unix(path) => Ok(Stream::Unix(UnixStream::connect(path).await?)),
        #[cfg(not(unix))]
        Address::Unix(_) => Err(Error::InvalidAddress(address.to_string())),
    }
}

pub(crate) type ReadSide = BufferedReader<ReadHalf<Stream>>;
pub(crate) type WriteSide = WriteHalf<Stream>;

/// One socket and the read buffer that belongs to it.
///
/// Requests and replies are strictly first-in first-out, there is nothing on the wire to match
/// one to the other.  After any `Err` from `read`, `write` or `call` the connection must be
/// dropped, whatever is left unread would be taken as the reply to the next command.
pub struct Connection {
    reader: ReadSide,
    writer: WriteSide,
    write_buf: BytesMut,
    codec: CommandCodec,
}

impl Connection {
    /// Dial and run the setup commands: `AUTH` if a password is set, then `SELECT` if a
    /// database is.
    pub(crate) async fn open(config: &ConnectionBuilder) -> Result<Connection, Error> {
        let stream = match task::timeout(
            config.connect_timeout,
            open_stream(&config.address, config.keepalive),
        )
        .await
        {
            Some(stream) => stream?,
            None => {
                log::debug!("Timed out connecting to {}", config.address);
                return Err(Error::Connection(ConnectionReason::ConnectionFailed));
            }
        };

        let (read_half, write_half) = tokio::io::split(stream);
        let mut connection = Connection {
            reader: BufferedReader::new(read_half),
            writer: write_half,
            write_buf: BytesMut::new(),
            codec: CommandCodec,
        };

        if let Some(password) = &config.password {
            let mut auth = Command::new("AUTH");
            if let Some(username) = &config.username {
                auth.push(&**username);
            }
            auth.push(&**password);
            <()>::from_reply(connection.call(&auth).await?)?;
        }

        if config.db != 0 {
            <()>::from_reply(connection.call(&cmd!["SELECT", config.db]).await?)?;
        }

        log::debug!("Connected to {}", config.address);
        Ok(connection)
    }

    /// Send one command.  Nothing is read.
    pub async fn write(&mut self, command: &Command) -> Result<(), Error> {
        self.codec.encode(command, &mut self.write_buf)?;
        let result = self.writer.write_all(&self.write_buf).await;
        self.write_buf.clear();
        Ok(result?)
    }

    /// Send bytes that are already encoded commands
    pub(crate) async fn write_encoded(&mut self, buf: &[u8]) -> Result<(), Error> {
        self.writer.write_all(buf).await?;
        Ok(())
    }

    /// Read the next reply.
    pub async fn read(&mut self) -> Result<Reply, Error> {
        let reply = decode(&mut self.reader).await?;
        self.reader.reset();
        Ok(reply)
    }

    /// Send one command and read its reply.  The reply may be a `Reply::Error`, that is not a
    /// reason to drop the connection.
    pub async fn call(&mut self, command: &Command) -> Result<Reply, Error> {
        self.write(command).await?;
        self.read().await
    }

    /// How often this connection has read from its socket
    pub fn stats(&self) -> Stats {
        self.reader.stats()
    }

    pub(crate) fn into_parts(self) -> (ReadSide, WriteSide) {
        (self.reader, self.writer)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Connection({})", self.reader)
    }
}
