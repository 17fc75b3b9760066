/*
 * Copyright 2017-2024 Ben Ashford
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use futures_channel::mpsc;
use futures_util::sink::SinkExt;
use tokio_util::sync::CancellationToken;

use crate::client::connect::ReadSide;
use crate::protocol::{decode, Elem, Reply};

use super::Message;

/// A spawned task that owns the read side of a subscription connection, decoding everything the
/// server pushes and forwarding published messages.
pub(crate) struct SubscriptionInner {
    reader: ReadSide,
    messages: mpsc::Sender<Message>,
    token: CancellationToken,
}

impl SubscriptionInner {
    pub(crate) fn new(
        reader: ReadSide,
        messages: mpsc::Sender<Message>,
        token: CancellationToken,
    ) -> Self {
        SubscriptionInner {
            reader,
            messages,
            token,
        }
    }

    /// Runs until the subscription is closed, the receiver is dropped, or the connection fails.
    /// Dropping `messages` on the way out ends the receiving stream.
    pub(crate) async fn run(mut self) {
        loop {
            let reply = tokio::select! {
                _ = self.token.cancelled() => break,
                reply = decode(&mut self.reader) => reply,
            };

            let reply = match reply {
                Ok(reply) => reply,
                Err(e) => {
                    log::error!("Pub/Sub error: {}", e);
                    break;
                }
            };
            self.reader.reset();

            if let Some(message) = classify(reply) {
                tokio::select! {
                    _ = self.token.cancelled() => break,
                    sent = self.messages.send(message) => {
                        if sent.is_err() {
                            log::debug!("Subscription dropped by the receiver");
                            break;
                        }
                    }
                }
            }
        }

        self.token.cancel();
        log::debug!("Subscription closed");
        log::trace!("Subscription reader: {}", self.reader);
    }
}

fn is_control(kind: &Elem) -> bool {
    matches!(
        kind.as_bytes(),
        b"subscribe" | b"unsubscribe" | b"psubscribe" | b"punsubscribe"
    )
}

/// Published messages become a `Message`, everything else is logged and dropped.
pub(crate) fn classify(reply: Reply) -> Option<Message> {
    let elems = match reply {
        Reply::Elems(elems) => elems,
        Reply::Error(msg) => {
            log::warn!("Error on subscription connection: {}", msg);
            return None;
        }
        other => {
            log::warn!("Unexpected reply on subscription connection: {:?}", other);
            return None;
        }
    };

    let parts: Option<Vec<Elem>> = elems
        .into_iter()
        .map(|reply| match reply {
            Reply::Elem(elem) => Some(elem),
            _ => None,
        })
        .collect();
    let parts = match parts {
        Some(parts) => parts,
        None => {
            log::warn!("Nested array on subscription connection");
            return None;
        }
    };

    match parts.as_slice() {
        [kind, channel, payload] if kind.as_bytes() == b"message" => Some(Message {
            channel: channel.to_string_lossy().into_owned(),
            elem: payload.clone(),
        }),
        [kind, _pattern, channel, payload] if kind.as_bytes() == b"pmessage" => Some(Message {
            channel: channel.to_string_lossy().into_owned(),
            elem: payload.clone(),
        }),
        // An unsubscribe from nothing has a nil channel, which decoding drops
        [kind, rest @ ..] if is_control(kind) && rest.len() <= 2 => {
            log::debug!("{} {:?}", kind, rest);
            None
        }
        _ => {
            log::warn!("Unexpected data on subscription connection: {:?}", parts);
            None
        }
    }
}
