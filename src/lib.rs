/*
 * Copyright 2017-2024 Ben Ashford
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

//! A client for Redis using Tokio.
//!
//! ## Calls
//!
//! [`Client`](client/struct.Client.html) is used for most Redis commands, those where one command
//! returns one reply.  It is cheap to clone and safe to share between tasks; each call takes a
//! connection from a bounded pool, so at most `max_connections` commands are in flight at once
//! and further calls wait for a connection to be returned.
//!
//! ```no_run
//! # #[macro_use] extern crate redis_call;
//! # async fn run() -> Result<(), redis_call::Error> {
//! let client = redis_call::Client::new("tcp:127.0.0.1:6379")?;
//! client.call(cmd!["SET", "counter", 1]).await?;
//! let counter: i64 = client.call_as(cmd!["INCR", "counter"]).await?;
//! # Ok(())
//! # }
//! ```
//!
//! A server error is not an `Err`: `call` returns it as `Reply::Error` and the connection stays
//! in the pool.  `Err` is reserved for failures of the connection itself (and for replies that
//! can't be converted, with `call_as`).
//!
//! ## Pipelines
//!
//! [`Pipeline`](client/struct.Pipeline.html) queues any number of commands and sends them in a
//! single write, then reads the replies in the order the commands were queued.
//!
//! ## PUBSUB
//!
//! PUBSUB in Redis works differently.  A connection subscribes to one or more channels, then
//! receives everything published to them, so the one-command-one-reply model does not apply.
//! [`Client::subscribe`](client/struct.Client.html#method.subscribe) opens a dedicated
//! connection outside of the pool and returns a
//! [`Subscription`](client/struct.Subscription.html), a `Stream` of the messages published to
//! the subscribed channels.

#[macro_use]
mod protocol;

pub mod client;
pub mod error;

mod task;

pub use crate::client::{
    Address, Client, Closer, Connection, ConnectionBuilder, Message, Pipeline, Pool,
    Subscription,
};
pub use crate::error::Error;
pub use crate::protocol::{
    Arg, BufferError, BufferedReader, Command, CommandCodec, Elem, FromReply, Reply, Stats,
};
