/*
 * Copyright 2020-2024 Ben Ashford
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

//! A fixed number of connection slots, handed out one caller at a time.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{self, Error};

use super::builder::ConnectionBuilder;
use super::connect::Connection;

/// A slot holds a connection, or the right to dial one.
enum Slot {
    Live(Connection),
    Vacant,
}

struct Inner {
    config: ConnectionBuilder,
    capacity: usize,
    /// One permit per slot in `slots`
    permits: Arc<Semaphore>,
    slots: Mutex<VecDeque<Slot>>,
    dialed: AtomicUsize,
}

/// A bounded pool of connections.
///
/// The pool starts with `max_connections` vacant slots and never holds more.  Every slot
/// is either in the pool or checked out, so the pool also limits how many commands are in flight:
/// `pop` waits while all slots are checked out.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<Inner>,
}

impl Pool {
    pub(crate) fn new(config: ConnectionBuilder) -> Self {
        let capacity = config.max_connections;
        Pool {
            inner: Arc::new(Inner {
                config,
                capacity,
                permits: Arc::new(Semaphore::new(capacity)),
                slots: Mutex::new((0..capacity).map(|_| Slot::Vacant).collect()),
                dialed: AtomicUsize::new(0),
            }),
        }
    }

    pub(crate) fn config(&self) -> &ConnectionBuilder {
        &self.inner.config
    }

    fn slots(&self) -> MutexGuard<'_, VecDeque<Slot>> {
        self.inner
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a slot, waiting for one to be returned if there are none.  Live connections are
    /// handed out before vacant slots.
    pub async fn pop(&self) -> Result<Checkout, Error> {
        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| error::internal("Pool closed"))?;

        let slot = self
            .slots()
            .pop_front()
            .ok_or_else(|| error::unexpected("Pool permit without a slot"))?;

        Ok(Checkout {
            pool: self.clone(),
            slot: Some(slot),
            _permit: permit,
        })
    }

    fn push(&self, slot: Slot) {
        let mut slots = self.slots();
        match slot {
            Slot::Live(_) => slots.push_front(slot),
            Slot::Vacant => slots.push_back(slot),
        }
    }

    /// The most connections this pool will hold
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Slots that can be popped without waiting
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// Live connections waiting in the pool
    pub fn idle_connections(&self) -> usize {
        self.slots()
            .iter()
            .filter(|slot| matches!(slot, Slot::Live(_)))
            .count()
    }

    /// How many connections this pool has opened since it was created
    pub fn dialed(&self) -> usize {
        self.inner.dialed.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Pool")
            .field("address", &self.inner.config.address)
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .field("dialed", &self.dialed())
            .finish()
    }
}

/// A slot checked out of a `Pool`.
///
/// `release` puts the connection back for the next caller.  Dropping a checkout without
/// releasing it closes the connection and returns an empty slot, which is what has to happen
/// after an error or when a request is abandoned half way.
pub struct Checkout {
    pool: Pool,
    slot: Option<Slot>,
    _permit: OwnedSemaphorePermit,
}

impl Checkout {
    /// Whether this slot came with a connection already open
    pub fn is_live(&self) -> bool {
        matches!(self.slot, Some(Slot::Live(_)))
    }

    /// The connection in this slot, dialing it first if the slot is vacant.
    pub async fn connection(&mut self) -> Result<&mut Connection, Error> {
        if let Some(Slot::Vacant) = self.slot {
            let connection = Connection::open(&self.pool.inner.config).await?;
            let n = self.pool.inner.dialed.fetch_add(1, Ordering::Relaxed) + 1;
            log::debug!(
                "Dialed connection {} of pool for {}",
                n,
                self.pool.inner.config.address
            );
            self.slot = Some(Slot::Live(connection));
        }

        match &mut self.slot {
            Some(Slot::Live(connection)) => Ok(connection),
            _ => Err(error::unexpected("Checkout has no connection")),
        }
    }

    /// Return the slot to the pool as it is.
    pub fn release(mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.push(slot);
        }
    }
}

impl Drop for Checkout {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            if let Slot::Live(connection) = slot {
                log::debug!("Discarding connection to {}", self.pool.inner.config.address);
                log::trace!("Discarded {:?}", connection);
            }
            self.pool.push(Slot::Vacant);
        }
    }
}
