/*
 * Copyright 2020-2024 Ben Ashford
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::future::Future;
use std::time::Duration;

pub(crate) fn spawn<F>(f: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(f);
}

/// `None` if `duration` passed first, no duration means wait as long as it takes.
pub(crate) async fn timeout<T>(duration: Option<Duration>, future: T) -> Option<T::Output>
where
    T: Future,
{
    match duration {
        Some(duration) => tokio::time::timeout(duration, future).await.ok(),
        None => Some(future.await),
    }
}
