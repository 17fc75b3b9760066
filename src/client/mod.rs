/*
 * Copyright 2017-2024 Ben Ashford
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

//! The client API itself.
//!
//! * `Client` is used for most of the standard Redis commands, where one request results in one
//!   response.  It is backed by a bounded `Pool` of connections.
//! * `Pipeline` sends a batch of commands in one write and reads their replies in order.
//! * `Subscription` is used for Redis's PUBSUB functionality.
//! * `Connection` is a single connection outside of any pool, from `ConnectionBuilder::connect`.

mod builder;
mod connect;
mod pipeline;
mod pool;
mod pooled;
mod pubsub;

pub use self::builder::{Address, ConnectionBuilder, DEFAULT_MAX_CONNECTIONS};
pub use self::connect::Connection;
pub use self::pipeline::Pipeline;
pub use self::pool::{Checkout, Pool};
pub use self::pooled::Client;
pub use self::pubsub::{Closer, Message, Subscription};
