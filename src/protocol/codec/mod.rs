/*
 * Copyright 2020-2024 Ben Ashford
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

mod decode;
mod encode;

use std::io;

use bytes::BytesMut;
use tokio_util::codec::Encoder;

use super::command::Command;

pub(crate) use decode::decode;
pub(crate) use encode::{encode, encoded_len};

/// Writes commands in their wire form.  Replies are not decoded through a codec but straight
/// from a `BufferedReader`, see `decode`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandCodec;

impl<'a> Encoder<&'a Command> for CommandCodec {
    type Error = io::Error;

    fn encode(&mut self, item: &'a Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode::encode(item.as_slice(), dst);
        Ok(())
    }
}
