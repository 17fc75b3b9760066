/*
 * Copyright 2017-2024 Ben Ashford
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

mod inner;

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::BytesMut;
use futures_channel::mpsc;
use futures_util::stream::{Stream, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio_util::codec::Encoder;
use tokio_util::sync::CancellationToken;

use crate::error::{self, ConnectionReason, Error};
use crate::protocol::{Arg, Command, CommandCodec, Elem};
use crate::task;

use super::builder::ConnectionBuilder;
use super::connect::{Connection, WriteSide};

use self::inner::SubscriptionInner;

/// Messages waiting to be received before the connection stops being read
const MESSAGE_BUFFER: usize = 64;

/// A message published to a subscribed channel.  For pattern subscriptions `channel` is the
/// channel it was published to, not the pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub channel: String,
    pub elem: Elem,
}

/// Ends a `Subscription` from anywhere, e.g. another task than the one reading messages.
#[derive(Debug, Clone)]
pub struct Closer {
    token: CancellationToken,
}

impl Closer {
    pub fn close(&self) {
        self.token.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// A dedicated connection in subscriber mode.
///
/// A background task reads the connection for as long as the subscription is open; published
/// messages are available from `next_message` or as a `Stream`.  Subscribing and unsubscribing
/// write to the same connection while it is being read.
///
/// Closing sends nothing to the server.  It stops the background task, which stops reading the
/// connection, and the stream ends once any messages already received have been taken.  The
/// socket itself is closed when the `Subscription` is dropped.
pub struct Subscription {
    writer: WriteSide,
    write_buf: BytesMut,
    codec: CommandCodec,
    messages: mpsc::Receiver<Message>,
    closer: Closer,
}

impl Subscription {
    pub(crate) async fn open(config: &ConnectionBuilder) -> Result<Subscription, Error> {
        let (reader, writer) = Connection::open(config).await?.into_parts();
        let (tx, rx) = mpsc::channel(MESSAGE_BUFFER);
        let token = CancellationToken::new();

        task::spawn(SubscriptionInner::new(reader, tx, token.clone()).run());

        Ok(Subscription {
            writer,
            write_buf: BytesMut::new(),
            codec: CommandCodec,
            messages: rx,
            closer: Closer { token },
        })
    }

    async fn send<I, T>(&mut self, name: &str, channels: I, required: bool) -> Result<(), Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<Arg>,
    {
        if self.closer.is_closed() {
            return Err(Error::Connection(ConnectionReason::NotConnected));
        }
        let command = Command::new(name).args(channels);
        if required && command.len() < 2 {
            return Err(error::internal(format!("{} needs at least one channel", name)));
        }

        self.codec.encode(&command, &mut self.write_buf)?;
        let result = self.writer.write_all(&self.write_buf).await;
        self.write_buf.clear();
        if result.is_err() {
            self.closer.close();
        }
        Ok(result?)
    }

    /// Subscribe to more channels
    pub async fn subscribe<I, T>(&mut self, channels: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<Arg>,
    {
        self.send("SUBSCRIBE", channels, true).await
    }

    /// Subscribe to channel patterns, e.g. `news.*`
    pub async fn psubscribe<I, T>(&mut self, patterns: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<Arg>,
    {
        self.send("PSUBSCRIBE", patterns, true).await
    }

    /// Stop receiving messages from `channels`, or from every channel if it is empty.  Messages
    /// already published to them may still arrive.
    pub async fn unsubscribe<I, T>(&mut self, channels: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<Arg>,
    {
        self.send("UNSUBSCRIBE", channels, false).await
    }

    pub async fn punsubscribe<I, T>(&mut self, patterns: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<Arg>,
    {
        self.send("PUNSUBSCRIBE", patterns, false).await
    }

    /// The next message, `None` once the subscription is closed or the connection lost.
    pub async fn next_message(&mut self) -> Option<Message> {
        self.messages.next().await
    }

    /// Stop reading, see `Closer`.  Later subscribe calls fail with `NotConnected`.
    pub fn close(&self) {
        self.closer.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closer.is_closed()
    }

    pub fn closer(&self) -> Closer {
        self.closer.clone()
    }
}

impl Stream for Subscription {
    type Item = Message;

    #[inline]
    fn poll_next(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        self.get_mut().messages.poll_next_unpin(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.closer.close();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}
