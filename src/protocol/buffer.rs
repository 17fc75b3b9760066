/*
 * Copyright 2017-2024 Ben Ashford
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

//! A fixed-size read buffer for RESP streams.
//!
//! Replies interleave short `\r\n` terminated header lines with length-prefixed payloads of
//! any size.  `BufferedReader` keeps a single fixed arena with a read and a write cursor: header
//! lines are scanned and handed out as borrowed slices of the arena, and large payloads bypass
//! the arena entirely and are read straight into the caller's buffer.

use std::{fmt, io};

use tokio::io::{AsyncRead, AsyncReadExt};

/// Total size of the arena.
pub const ARENA_LEN: usize = 8 * 1024;

/// The minimum amount of free space a refill needs.  It is also the size above which a read
/// into an empty window skips the arena.
pub const FILL_LEN: usize = 1024;

/// Errors from the buffer itself, as opposed to the bytes it contains.
#[derive(Debug)]
pub enum BufferError {
    /// The unread window takes up so much of the arena that a refill is not possible, happens
    /// when a single line is longer than the arena.  Nothing is consumed.
    Full,
    /// The underlying source failed, or reached end-of-stream during a refill.
    Io(io::Error),
}

impl From<io::Error> for BufferError {
    fn from(err: io::Error) -> BufferError {
        BufferError::Io(err)
    }
}

/// Counters for how hard the buffer is working.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Reads issued against the underlying source
    pub reads: u64,
    /// Times unread bytes were moved back to the start of the arena
    pub moves: u64,
}

pub struct BufferedReader<R> {
    arena: Box<[u8]>,
    inner: R,
    /// Start of the unread window
    r: usize,
    /// End of the unread window
    w: usize,
    stats: Stats,
}

impl<R> BufferedReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(inner: R) -> Self {
        BufferedReader {
            arena: vec![0; ARENA_LEN].into_boxed_slice(),
            inner,
            r: 0,
            w: 0,
            stats: Stats::default(),
        }
    }

    /// Number of bytes read from the source but not yet consumed.
    #[inline]
    pub fn buffered(&self) -> usize {
        self.w - self.r
    }

    /// The unread window.
    #[inline]
    pub fn buffer(&self) -> &[u8] {
        &self.arena[self.r..self.w]
    }

    /// Marks `n` bytes of the window as read, returns the number of bytes actually consumed,
    /// which is zero if fewer than `n` bytes are buffered.
    pub fn consume(&mut self, n: usize) -> usize {
        if n > self.buffered() {
            return 0;
        }
        self.r += n;
        n
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Moves both cursors back to the start of the arena, only possible when the window is
    /// empty.  Returns whether it happened.
    pub fn reset(&mut self) -> bool {
        if self.w == self.r {
            self.r = 0;
            self.w = 0;
            return true;
        }
        false
    }

    /// Reads more bytes from the source into the arena, compacting the window first so it never
    /// wraps.  Returns the number of new bytes, `0` means end-of-stream.
    async fn fill(&mut self) -> Result<usize, BufferError> {
        self.reset();

        if self.r > 0 {
            self.arena.copy_within(self.r..self.w, 0);
            self.w -= self.r;
            self.r = 0;
            self.stats.moves += 1;
        }

        if self.arena.len() - self.w < FILL_LEN {
            return Err(BufferError::Full);
        }

        let n = self.inner.read(&mut self.arena[self.w..]).await?;
        self.w += n;
        self.stats.reads += 1;
        Ok(n)
    }

    /// Reads up to `buf.len()` bytes.
    ///
    /// When nothing is buffered and `buf` is at least `FILL_LEN` long, this reads directly from
    /// the source into `buf`.  Otherwise it serves from the window, refilling it first if it is
    /// empty.  It never waits on more than one read from the source.  `Ok(0)` means the source
    /// is exhausted (or `buf` is empty).
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.w == self.r {
            if buf.len() >= FILL_LEN {
                self.stats.reads += 1;
                return self.inner.read(buf).await;
            }

            match self.fill().await {
                Ok(0) => return Ok(0),
                Ok(_) => (),
                Err(BufferError::Io(err)) => return Err(err),
                // An empty window always leaves the whole arena free
                Err(BufferError::Full) => {
                    return Err(io::Error::new(io::ErrorKind::Other, "refill of an empty buffer"))
                }
            }
        }

        Ok(self.copy(buf))
    }

    /// Copies up to `buf.len()` already buffered bytes into `buf`, never touching the source.
    pub fn copy(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.buffered());
        buf[..n].copy_from_slice(&self.arena[self.r..self.r + n]);
        self.r += n;
        n
    }

    /// Returns the bytes up to and including the first `delim`, refilling as often as needed.
    ///
    /// The slice borrows the arena and is only valid until the next call on this reader.  On
    /// error nothing is consumed, whatever was buffered is still available from `buffer()`;
    /// end-of-stream before `delim` is reported as `UnexpectedEof`.
    pub async fn read_slice(&mut self, delim: u8) -> Result<&[u8], BufferError> {
        let mut scanned = 0;
        loop {
            let found = self.arena[self.r + scanned..self.w]
                .iter()
                .position(|b| *b == delim);

            if let Some(idx) = found {
                let start = self.r;
                self.r += scanned + idx + 1;
                return Ok(&self.arena[start..self.r]);
            }
            scanned = self.buffered();

            if self.fill().await? == 0 {
                return Err(BufferError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "end of stream before delimiter",
                )));
            }
        }
    }
}

impl<R> fmt::Display for BufferedReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "len: {}, read: {}, write: {}, buffered: {}, syscalls: {}, moves: {}",
            self.arena.len(),
            self.r,
            self.w,
            self.w - self.r,
            self.stats.reads,
            self.stats.moves
        )
    }
}
