/*
 * Copyright 2017-2024 Ben Ashford
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use crate::error::Error;
use crate::protocol::{Arg, Command, FromReply, Reply};

use super::builder::ConnectionBuilder;
use super::pipeline::Pipeline;
use super::pool::Pool;
use super::pubsub::Subscription;

/// A shareable client, cheap to clone.
///
/// Each `call` takes a connection from the pool, sends one command, reads one reply and puts the
/// connection back.  Clones share the same pool.
#[derive(Debug, Clone)]
pub struct Client {
    pool: Pool,
}

impl Client {
    /// A client with default settings for `addr`, see `ConnectionBuilder` for the format
    pub fn new(addr: &str) -> Result<Client, Error> {
        Ok(ConnectionBuilder::new(addr)?.client())
    }

    pub(crate) fn from_pool(pool: Pool) -> Self {
        Client { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Send a command and return its reply.
    ///
    /// A `-ERR` from the server is `Ok(Reply::Error(_))` and the connection goes back into the
    /// pool.  An `Err` means the connection failed, it is closed and its slot returned empty.
    pub async fn call(&self, command: Command) -> Result<Reply, Error> {
        let mut checkout = self.pool.pop().await?;
        let reply = checkout.connection().await?.call(&command).await?;
        checkout.release();
        Ok(reply)
    }

    /// `call`, with the reply converted to `T`.  Server errors become `Error::Remote`.
    pub async fn call_as<T: FromReply>(&self, command: Command) -> Result<T, Error> {
        T::from_reply(self.call(command).await?)
    }

    /// Batch commands on one connection, see `Pipeline`
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.pool.clone())
    }

    /// Open a dedicated connection subscribed to `channels`
    pub async fn subscribe<I, T>(&self, channels: I) -> Result<Subscription, Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<Arg>,
    {
        let mut subscription = Subscription::open(self.pool.config()).await?;
        subscription.subscribe(channels).await?;
        Ok(subscription)
    }

    /// Open a dedicated connection subscribed to the channel `patterns`
    pub async fn psubscribe<I, T>(&self, patterns: I) -> Result<Subscription, Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<Arg>,
    {
        let mut subscription = Subscription::open(self.pool.config()).await?;
        subscription.psubscribe(patterns).await?;
        Ok(subscription)
    }
}
