/*
 * Copyright 2020-2024 Ben Ashford
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::{io, str};

use bytes::Bytes;
use futures_util::future::{BoxFuture, FutureExt};
use tokio::io::AsyncRead;

use crate::error::{self, Error};
use crate::protocol::buffer::{BufferError, BufferedReader, ARENA_LEN};
use crate::protocol::reply::{Elem, Reply};

/// Redis refuses bulk strings larger than this by default (`proto-max-bulk-len`)
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Arrays nested deeper than this are refused rather than recursed into
const MAX_DEPTH: usize = 512;

/// The first line of a reply, everything that can be known before reading further.
enum Header {
    Error(String),
    /// Simple strings and integers, both are kept as their text
    Elem(Bytes),
    Bulk(i64),
    Array(i64),
}

fn parse_len(body: &[u8]) -> Result<i64, Error> {
    str::from_utf8(body)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            error::protocol(format!(
                "Invalid length: {:?}",
                String::from_utf8_lossy(body)
            ))
        })
}

fn parse_header(line: &[u8]) -> Result<Header, Error> {
    let payload = match line {
        [payload @ .., b'\r', b'\n'] => payload,
        _ => return Err(error::protocol("Line not terminated by CRLF")),
    };
    let (tag, body) = match payload.split_first() {
        Some((tag, body)) => (*tag, body),
        None => return Err(error::protocol("Empty line")),
    };

    match tag {
        b'-' => Ok(Header::Error(String::from_utf8_lossy(body).into_owned())),
        b'+' | b':' => Ok(Header::Elem(Bytes::copy_from_slice(body))),
        b'$' => Ok(Header::Bulk(parse_len(body)?)),
        b'*' => Ok(Header::Array(parse_len(body)?)),
        _ => Err(error::protocol(format!(
            "Unexpected reply type byte: {:?}",
            tag as char
        ))),
    }
}

/// A header line that doesn't fit in the arena.  Drains the arena into an owned buffer until the
/// line ends.
async fn read_long_line<R>(reader: &mut BufferedReader<R>) -> Result<Vec<u8>, Error>
where
    R: AsyncRead + Unpin,
{
    let mut line = Vec::with_capacity(2 * ARENA_LEN);
    loop {
        let n = reader.buffered();
        line.extend_from_slice(reader.buffer());
        reader.consume(n);

        match reader.read_slice(b'\n').await {
            Ok(rest) => {
                line.extend_from_slice(rest);
                return Ok(line);
            }
            Err(BufferError::Full) => (),
            Err(BufferError::Io(err)) => return Err(Error::IO(err)),
        }
    }
}

async fn read_header<R>(reader: &mut BufferedReader<R>) -> Result<Header, Error>
where
    R: AsyncRead + Unpin,
{
    let header = match reader.read_slice(b'\n').await {
        Ok(line) => Some(parse_header(line)?),
        Err(BufferError::Full) => None,
        Err(BufferError::Io(err)) => return Err(Error::IO(err)),
    };

    match header {
        Some(header) => Ok(header),
        None => {
            let line = read_long_line(reader).await?;
            parse_header(&line)
        }
    }
}

/// Reads exactly `len` bytes of payload plus the CRLF that follows it.
async fn read_bulk<R>(reader: &mut BufferedReader<R>, len: usize) -> Result<Bytes, Error>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0; len + 2];
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(Error::IO(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("end of stream after {} of {} bulk bytes", filled, len + 2),
            )));
        }
        filled += n;
    }

    if &buf[len..] != b"\r\n" {
        return Err(error::protocol("Bulk string not terminated by CRLF"));
    }
    buf.truncate(len);
    Ok(Bytes::from(buf))
}

fn checked_len(len: i64) -> Result<usize, Error> {
    if !(0..=MAX_BULK_LEN).contains(&len) {
        return Err(error::protocol(format!("Invalid length: {}", len)));
    }
    usize::try_from(len).map_err(|_| error::protocol(format!("Invalid length: {}", len)))
}

/// Decode exactly one reply, leaving the reader at the start of the next.
///
/// Only transport failures and malformed input are returned as `Err`; after either the
/// connection must not be reused.  Server errors are `Ok(Reply::Error(_))`.
pub(crate) fn decode<'a, R>(reader: &'a mut BufferedReader<R>) -> BoxFuture<'a, Result<Reply, Error>>
where
    R: AsyncRead + Unpin + Send + 'a,
{
    decode_at(reader, 0)
}

fn decode_at<'a, R>(
    reader: &'a mut BufferedReader<R>,
    depth: usize,
) -> BoxFuture<'a, Result<Reply, Error>>
where
    R: AsyncRead + Unpin + Send + 'a,
{
    async move {
        match read_header(reader).await? {
            Header::Error(msg) => Ok(Reply::Error(msg)),
            Header::Elem(bytes) => Ok(Reply::Elem(Elem::new(bytes))),
            Header::Bulk(-1) => Ok(Reply::Nil),
            Header::Bulk(len) => {
                let len = checked_len(len)?;
                Ok(Reply::Elem(Elem::new(read_bulk(reader, len).await?)))
            }
            Header::Array(-1) if depth == 0 => Ok(Reply::Aborted),
            Header::Array(-1) => Ok(Reply::Nil),
            Header::Array(_) if depth >= MAX_DEPTH => Err(error::protocol(format!(
                "Arrays nested more than {} deep",
                MAX_DEPTH
            ))),
            Header::Array(count) => {
                let count = checked_len(count)?;
                let mut elems = Vec::with_capacity(count.min(1024));
                let mut failed = None;

                // All children are read even after an error, so the next reply stays framed
                for _ in 0..count {
                    match decode_at(reader, depth + 1).await? {
                        Reply::Nil => (),
                        Reply::Error(msg) => {
                            failed.get_or_insert(msg);
                        }
                        reply => elems.push(reply),
                    }
                }

                match failed {
                    Some(msg) => Ok(Reply::Error(msg)),
                    None => Ok(Reply::Elems(elems)),
                }
            }
        }
    }
    .boxed()
}
