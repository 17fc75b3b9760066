/*
 * Copyright 2020-2024 Ben Ashford
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

#[macro_use]
pub(crate) mod command;

pub(crate) mod buffer;
mod codec;
pub(crate) mod reply;

pub(crate) use codec::{decode, encode};

pub use buffer::{BufferError, BufferedReader, Stats};
pub use codec::CommandCodec;
pub use command::{Arg, Command};
pub use reply::{Elem, FromReply, Reply};
