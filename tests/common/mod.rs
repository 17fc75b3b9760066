/*
 * Copyright 2020-2024 Ben Ashford
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

//! In-process stand-ins for a Redis server.

#![allow(dead_code)]

use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}

async fn read_line<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
    buf: &mut Vec<u8>,
) -> io::Result<bool> {
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(false);
    }
    if !buf.ends_with(b"\r\n") {
        return Err(invalid("line without CRLF"));
    }
    buf.truncate(buf.len() - 2);
    Ok(true)
}

fn parse_len(data: &[u8]) -> io::Result<usize> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| invalid("bad length"))
}

/// One command as sent by a client, `None` when the client hung up.
pub async fn read_command<R: AsyncRead + Unpin>(
    reader: &mut BufReader<R>,
) -> io::Result<Option<Vec<Vec<u8>>>> {
    let mut line = Vec::new();
    if !read_line(reader, &mut line).await? {
        return Ok(None);
    }
    if line.first() != Some(&b'*') {
        return Err(invalid("expected array"));
    }
    let count = parse_len(&line[1..])?;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        if !read_line(reader, &mut line).await? {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        }
        if line.first() != Some(&b'$') {
            return Err(invalid("expected bulk"));
        }
        let len = parse_len(&line[1..])?;
        let mut data = vec![0; len + 2];
        reader.read_exact(&mut data).await?;
        if !data.ends_with(b"\r\n") {
            return Err(invalid("missing crlf"));
        }
        data.truncate(len);
        args.push(data);
    }
    Ok(Some(args))
}

pub fn simple(msg: &str) -> Vec<u8> {
    format!("+{}\r\n", msg).into_bytes()
}

pub fn error(msg: &str) -> Vec<u8> {
    format!("-{}\r\n", msg).into_bytes()
}

pub fn integer(value: i64) -> Vec<u8> {
    format!(":{}\r\n", value).into_bytes()
}

pub fn bulk(data: &[u8]) -> Vec<u8> {
    let mut out = format!("${}\r\n", data.len()).into_bytes();
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
    out
}

pub fn nil() -> Vec<u8> {
    b"$-1\r\n".to_vec()
}

pub fn array(items: &[Vec<u8>]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", items.len()).into_bytes();
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

pub enum Response {
    Reply(Vec<u8>),
    Delayed(Duration, Vec<u8>),
    /// Send the first part now and the rest after a pause
    Split(Vec<u8>, Duration, Vec<u8>),
    /// Hang up without answering
    Close,
}

/// A small subset of Redis, enough to exercise the client:
///
/// * `PING [msg]`, `ECHO msg`
/// * `GET missing` is nil, `GET <other>` is `bar`
/// * `AUTH [user] secret` succeeds, any other password fails
/// * `SELECT n`, `SLOW ms` (answers `+OK` after `ms` milliseconds)
/// * `STALL ms` sends the header of the bulk string `+X\r\n`, the rest after `ms` milliseconds
/// * `HGETALL key` is `a 1 b 2`, `EXEC` is an aborted transaction
/// * `DROP` hangs up, `GARBAGE` answers with an unknown type byte
pub fn redis_like(args: &[Vec<u8>]) -> Response {
    let name = String::from_utf8_lossy(&args[0]).to_uppercase();
    let reply = match (name.as_str(), &args[1..]) {
        ("PING", []) => simple("PONG"),
        ("PING", [msg]) | ("ECHO", [msg]) => bulk(msg),
        ("GET", [key]) if key.as_slice() == b"missing" => nil(),
        ("GET", [_]) => bulk(b"bar"),
        ("AUTH", [password]) | ("AUTH", [_, password]) => {
            if password.as_slice() == b"secret" {
                simple("OK")
            } else {
                error("WRONGPASS invalid username-password pair")
            }
        }
        ("SELECT", [_]) => simple("OK"),
        ("SLOW", [ms]) => {
            let ms = parse_len(ms).unwrap_or(0) as u64;
            return Response::Delayed(Duration::from_millis(ms), simple("OK"));
        }
        ("STALL", [ms]) => {
            let ms = parse_len(ms).unwrap_or(0) as u64;
            return Response::Split(
                b"$4\r\n".to_vec(),
                Duration::from_millis(ms),
                b"+X\r\n\r\n".to_vec(),
            );
        }
        ("HGETALL", [_]) => array(&[bulk(b"a"), integer(1), bulk(b"b"), integer(2)]),
        ("EXEC", []) => b"*-1\r\n".to_vec(),
        ("DROP", []) => return Response::Close,
        ("GARBAGE", []) => b"?oops\r\n".to_vec(),
        _ => error(&format!("ERR unknown command '{}'", name)),
    };
    Response::Reply(reply)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    /// Which accepted connection, starting at 0
    pub connection: usize,
    pub command: String,
}

pub struct MockServer {
    pub addr: String,
    accepted: Arc<AtomicUsize>,
    commands: Arc<Mutex<Vec<Recorded>>>,
}

impl MockServer {
    pub async fn start<F>(handler: F) -> MockServer
    where
        F: Fn(&[Vec<u8>]) -> Response + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = format!("tcp:{}", listener.local_addr().expect("addr"));
        let handler = Arc::new(handler);
        let accepted = Arc::new(AtomicUsize::new(0));
        let commands = Arc::new(Mutex::new(Vec::new()));

        let server = MockServer {
            addr,
            accepted: accepted.clone(),
            commands: commands.clone(),
        };

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let id = accepted.fetch_add(1, Ordering::SeqCst);
                let handler = handler.clone();
                let commands = commands.clone();

                tokio::spawn(async move {
                    let (read, mut write) = stream.into_split();
                    let mut reader = BufReader::new(read);
                    while let Ok(Some(args)) = read_command(&mut reader).await {
                        let command = args
                            .iter()
                            .map(|arg| String::from_utf8_lossy(arg).into_owned())
                            .collect::<Vec<_>>()
                            .join(" ");
                        commands.lock().unwrap().push(Recorded {
                            connection: id,
                            command,
                        });

                        let bytes = match handler(&args) {
                            Response::Reply(bytes) => bytes,
                            Response::Delayed(delay, bytes) => {
                                tokio::time::sleep(delay).await;
                                bytes
                            }
                            Response::Split(first, delay, rest) => {
                                if write.write_all(&first).await.is_err() {
                                    return;
                                }
                                tokio::time::sleep(delay).await;
                                rest
                            }
                            Response::Close => return,
                        };
                        if write.write_all(&bytes).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });

        server
    }

    pub async fn redis_like() -> MockServer {
        MockServer::start(redis_like).await
    }

    /// Connections accepted so far
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<Recorded> {
        self.commands.lock().unwrap().clone()
    }

    /// Just the commands, each as its arguments joined by spaces
    pub fn command_lines(&self) -> Vec<String> {
        self.commands().into_iter().map(|r| r.command).collect()
    }
}

#[derive(Default)]
struct Subscriptions {
    channels: HashSet<Vec<u8>>,
    patterns: HashSet<Vec<u8>>,
}

impl Subscriptions {
    fn count(&self) -> i64 {
        (self.channels.len() + self.patterns.len()) as i64
    }
}

/// `*` at the end of a pattern matches any suffix, that's all the globbing there is
fn pattern_matches(pattern: &[u8], channel: &[u8]) -> bool {
    match pattern.strip_suffix(b"*") {
        Some(prefix) => channel.starts_with(prefix),
        None => pattern == channel,
    }
}

/// A pub/sub server for a single subscriber connection.  Every command it receives is
/// acknowledged the way Redis does and then reported through `seen`, so a test that has seen a
/// command knows its acknowledgement was sent first.
pub struct Broker {
    pub addr: String,
    /// Frames for the subscriber, `None` hangs up
    out: mpsc::UnboundedSender<Option<Vec<u8>>>,
    subscriptions: Arc<Mutex<Subscriptions>>,
    seen: mpsc::UnboundedReceiver<String>,
}

impl Broker {
    pub async fn start() -> Broker {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = format!("tcp:{}", listener.local_addr().expect("addr"));
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Option<Vec<u8>>>();
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();
        let subscriptions = Arc::new(Mutex::new(Subscriptions::default()));

        let acks = out_tx.clone();
        let subs = subscriptions.clone();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let (read, mut write) = stream.into_split();

            tokio::spawn(async move {
                while let Some(Some(frame)) = out_rx.recv().await {
                    if write.write_all(&frame).await.is_err() {
                        break;
                    }
                }
            });

            let mut reader = BufReader::new(read);
            while let Ok(Some(args)) = read_command(&mut reader).await {
                let name = String::from_utf8_lossy(&args[0]).to_lowercase();
                {
                    let mut subs = subs.lock().unwrap();
                    for target in &args[1..] {
                        match name.as_str() {
                            "subscribe" => subs.channels.insert(target.clone()),
                            "psubscribe" => subs.patterns.insert(target.clone()),
                            "unsubscribe" => subs.channels.remove(target),
                            "punsubscribe" => subs.patterns.remove(target),
                            _ => false,
                        };
                        let ack = array(&[
                            bulk(name.as_bytes()),
                            bulk(target),
                            integer(subs.count()),
                        ]);
                        let _ = acks.send(Some(ack));
                    }
                    if args.len() == 1 && name == "unsubscribe" {
                        subs.channels.clear();
                        let _ = acks.send(Some(array(&[
                            bulk(b"unsubscribe"),
                            nil(),
                            integer(subs.count()),
                        ])));
                    }
                }

                let line = args
                    .iter()
                    .map(|arg| String::from_utf8_lossy(arg).into_owned())
                    .collect::<Vec<_>>()
                    .join(" ");
                if seen_tx.send(line).is_err() {
                    break;
                }
            }
        });

        Broker {
            addr,
            out: out_tx,
            subscriptions,
            seen: seen_rx,
        }
    }

    /// Waits for the subscriber to send `command`
    pub async fn expect(&mut self, command: &str) {
        let seen = tokio::time::timeout(Duration::from_secs(5), self.seen.recv())
            .await
            .expect("timed out waiting for a command")
            .expect("subscriber hung up");
        assert_eq!(seen, command);
    }

    /// Sends `payload` to every matching subscription, returns how many it went to
    pub fn publish(&self, channel: &str, payload: &[u8]) -> usize {
        let out = &self.out;
        let subs = self.subscriptions.lock().unwrap();
        let mut delivered = 0;

        if subs.channels.contains(channel.as_bytes()) {
            let _ = out.send(Some(array(&[
                bulk(b"message"),
                bulk(channel.as_bytes()),
                bulk(payload),
            ])));
            delivered += 1;
        }
        for pattern in &subs.patterns {
            if pattern_matches(pattern, channel.as_bytes()) {
                let _ = out.send(Some(array(&[
                    bulk(b"pmessage"),
                    bulk(pattern),
                    bulk(channel.as_bytes()),
                    bulk(payload),
                ])));
                delivered += 1;
            }
        }
        delivered
    }

    /// Hang up on the subscriber once everything sent so far has been written
    pub fn disconnect(&self) {
        let _ = self.out.send(None);
    }
}
