/*
 * Copyright 2020-2024 Ben Ashford
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use bytes::BytesMut;

use crate::error::{self, Error};
use crate::protocol::{encode, Command, Reply};

use super::pool::{Checkout, Pool};

/// Commands sent in one write and answered in order.
///
/// `call` only queues a command, nothing is sent until `flush`, `poll` or `execute`.  Replies
/// come back in the order the commands were queued: Redis answers each connection first-in
/// first-out and there is no other way to tell replies apart.
///
/// A pipeline holds one connection from the client's pool from the first flush until the last
/// pending reply has been read.  If the connection fails the pipeline drops it, along with every
/// queued command and unread reply.  The same happens when a `flush`, `poll` or `execute` future
/// is dropped before it completes: the connection is closed rather than returned to the pool,
/// and the pipeline starts again empty.
pub struct Pipeline {
    pool: Pool,
    checkout: Option<Checkout>,
    buf: BytesMut,
    pending: usize,
    /// Set while the connection is out of `checkout` for a write or a read
    busy: bool,
}

impl Pipeline {
    pub(crate) fn new(pool: Pool) -> Self {
        Pipeline {
            pool,
            checkout: None,
            buf: BytesMut::new(),
            pending: 0,
            busy: false,
        }
    }

    /// Queue a command
    pub fn call(&mut self, command: Command) -> &mut Self {
        self.recover();
        encode(command.as_slice(), &mut self.buf);
        self.pending += 1;
        self
    }

    /// Replies not yet read, including those of commands not yet sent
    pub fn pending(&self) -> usize {
        if self.busy {
            0
        } else {
            self.pending
        }
    }

    /// Send everything queued so far
    pub async fn flush(&mut self) -> Result<(), Error> {
        self.recover();
        if self.buf.is_empty() {
            return Ok(());
        }

        self.busy = true;
        match self.write_queued().await {
            Ok(checkout) => {
                self.checkout = Some(checkout);
                self.buf.clear();
                self.busy = false;
                Ok(())
            }
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }

    /// The connection is owned by this future until the write completes, dropping it part way
    /// closes the connection.
    async fn write_queued(&mut self) -> Result<Checkout, Error> {
        let mut checkout = match self.checkout.take() {
            Some(checkout) => checkout,
            None => self.pool.pop().await?,
        };
        checkout.connection().await?.write_encoded(&self.buf).await?;
        Ok(checkout)
    }

    /// Flush, then read the reply to the oldest command still pending.
    pub async fn poll(&mut self) -> Result<Reply, Error> {
        self.recover();
        if self.pending == 0 {
            return Err(error::internal("No replies pending"));
        }
        self.flush().await?;

        self.busy = true;
        let mut checkout = match self.checkout.take() {
            Some(checkout) => checkout,
            None => {
                self.reset();
                return Err(error::unexpected("Replies pending without a connection"));
            }
        };
        let result = match checkout.connection().await {
            Ok(connection) => connection.read().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(reply) => {
                self.busy = false;
                self.pending -= 1;
                if self.pending == 0 {
                    checkout.release();
                } else {
                    self.checkout = Some(checkout);
                }
                Ok(reply)
            }
            Err(e) => {
                drop(checkout);
                self.reset();
                Err(e)
            }
        }
    }

    /// Flush, then read every pending reply, oldest first.
    pub async fn execute(&mut self) -> Result<Vec<Reply>, Error> {
        self.flush().await?;
        let mut replies = Vec::with_capacity(self.pending);
        while self.pending > 0 {
            replies.push(self.poll().await?);
        }
        Ok(replies)
    }

    /// Forget a batch whose write or read was abandoned, its connection is already gone.
    fn recover(&mut self) {
        if self.busy {
            log::debug!(
                "Pipeline interrupted with {} replies pending, batch dropped",
                self.pending
            );
            self.reset();
        }
    }

    fn reset(&mut self) {
        if self.checkout.take().is_some() {
            log::debug!("Pipeline dropped its connection with {} replies pending", self.pending);
        }
        self.pending = 0;
        self.buf.clear();
        self.busy = false;
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("pending", &self.pending())
            .field("queued_bytes", &self.buf.len())
            .field("connected", &self.checkout.is_some())
            .finish()
    }
}
