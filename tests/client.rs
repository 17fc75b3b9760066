/*
 * Copyright 2017-2024 Ben Ashford
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

#[macro_use]
extern crate redis_call;

mod common;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use redis_call::{Client, ConnectionBuilder, Elem, Error, Reply};

use common::{init_logging, MockServer};

#[tokio::test]
async fn call_returns_replies() {
    init_logging();
    let server = MockServer::redis_like().await;
    let client = Client::new(&server.addr).unwrap();

    assert_eq!(client.call(cmd!["PING"]).await.unwrap(), Reply::from("PONG"));
    assert_eq!(
        client.call(cmd!["ECHO", &b"\x00\r\n\xff"[..]]).await.unwrap(),
        Reply::Elem(Elem::from(&b"\x00\r\n\xff"[..]))
    );
    assert_eq!(client.call(cmd!["GET", "missing"]).await.unwrap(), Reply::Nil);

    let value: Option<String> = client.call_as(cmd!["GET", "missing"]).await.unwrap();
    assert_eq!(value, None);
    let value: String = client.call_as(cmd!["GET", "foo"]).await.unwrap();
    assert_eq!(value, "bar");

    let hash: HashMap<String, i64> = client.call_as(cmd!["HGETALL", "h"]).await.unwrap();
    assert_eq!(hash.len(), 2);
    assert_eq!(hash["a"], 1);
    assert_eq!(hash["b"], 2);

    // Sequential calls share one connection
    assert_eq!(client.pool().dialed(), 1);
    assert_eq!(server.accepted(), 1);
    assert_eq!(client.pool().idle_connections(), 1);
}

#[tokio::test]
async fn server_errors_keep_the_connection() {
    init_logging();
    let server = MockServer::redis_like().await;
    let client = Client::new(&server.addr).unwrap();

    match client.call(cmd!["NOPE"]).await.unwrap() {
        Reply::Error(msg) => assert!(msg.starts_with("ERR unknown command")),
        other => panic!("Expected an error reply, got: {:?}", other),
    }
    match client.call_as::<()>(cmd!["NOPE"]).await {
        Err(Error::Remote(msg)) => assert!(msg.starts_with("ERR")),
        other => panic!("Expected a remote error, got: {:?}", other),
    }

    assert_eq!(client.call(cmd!["PING"]).await.unwrap(), Reply::from("PONG"));
    assert_eq!(client.pool().dialed(), 1);
}

#[tokio::test]
async fn aborted_transaction_is_not_nil() {
    init_logging();
    let server = MockServer::redis_like().await;
    let client = Client::new(&server.addr).unwrap();

    assert_eq!(client.call(cmd!["EXEC"]).await.unwrap(), Reply::Aborted);
    match client.call_as::<Vec<Reply>>(cmd!["EXEC"]).await {
        Err(Error::Aborted) => (),
        other => panic!("Expected an aborted transaction, got: {:?}", other),
    }
    assert_eq!(client.pool().dialed(), 1);
}

#[tokio::test]
async fn transport_error_discards_the_connection() {
    init_logging();
    let server = MockServer::redis_like().await;
    let client = Client::new(&server.addr).unwrap();

    assert_eq!(client.call(cmd!["PING"]).await.unwrap(), Reply::from("PONG"));
    match client.call(cmd!["DROP"]).await {
        Err(err @ Error::IO(_)) => assert!(err.is_fatal()),
        other => panic!("Expected an IO error, got: {:?}", other),
    }
    let pool = client.pool();
    assert_eq!(pool.available(), pool.capacity());
    assert_eq!(pool.idle_connections(), 0);

    assert_eq!(client.call(cmd!["PING"]).await.unwrap(), Reply::from("PONG"));
    assert_eq!(pool.dialed(), 2);
    assert_eq!(server.accepted(), 2);
}

#[tokio::test]
async fn protocol_error_discards_the_connection() {
    init_logging();
    let server = MockServer::redis_like().await;
    let client = Client::new(&server.addr).unwrap();

    match client.call(cmd!["GARBAGE"]).await {
        Err(err @ Error::Protocol(_)) => assert!(err.is_fatal()),
        other => panic!("Expected a protocol error, got: {:?}", other),
    }
    assert_eq!(client.call(cmd!["PING"]).await.unwrap(), Reply::from("PONG"));
    assert_eq!(server.accepted(), 2);
}

#[tokio::test]
async fn new_connections_authenticate_then_select() {
    init_logging();
    let server = MockServer::redis_like().await;
    let client = ConnectionBuilder::new(&server.addr)
        .unwrap()
        .password("secret")
        .db(2)
        .client();

    client.call(cmd!["PING"]).await.unwrap();
    client.call(cmd!["PING"]).await.unwrap();
    assert_eq!(
        server.command_lines(),
        vec!["AUTH secret", "SELECT 2", "PING", "PING"]
    );

    let server = MockServer::redis_like().await;
    let client = ConnectionBuilder::new(&server.addr)
        .unwrap()
        .username("app")
        .password("secret")
        .client();
    client.call(cmd!["PING"]).await.unwrap();
    assert_eq!(server.command_lines(), vec!["AUTH app secret", "PING"]);
}

#[tokio::test]
async fn failed_setup_returns_the_slot() {
    init_logging();
    let server = MockServer::redis_like().await;
    let client = ConnectionBuilder::new(&server.addr)
        .unwrap()
        .password("wrong")
        .max_connections(1)
        .client();

    for _ in 0..2 {
        match client.call(cmd!["PING"]).await {
            Err(Error::Remote(msg)) => assert!(msg.starts_with("WRONGPASS")),
            other => panic!("Expected the AUTH error, got: {:?}", other),
        }
    }
    assert_eq!(client.pool().available(), 1);
    assert_eq!(client.pool().dialed(), 0);
    assert_eq!(server.command_lines(), vec!["AUTH wrong", "AUTH wrong"]);
}

#[tokio::test]
async fn pool_bounds_concurrent_calls() {
    init_logging();
    let server = MockServer::redis_like().await;
    let client = ConnectionBuilder::new(&server.addr)
        .unwrap()
        .max_connections(2)
        .client();

    let start = Instant::now();
    let calls: Vec<_> = (0..6)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.call(cmd!["SLOW", 100]).await })
        })
        .collect();
    for call in calls {
        assert_eq!(call.await.unwrap().unwrap(), Reply::from("OK"));
    }

    // Two at a time, three rounds
    assert!(start.elapsed() >= Duration::from_millis(300));
    assert_eq!(server.accepted(), 2);
    assert_eq!(client.pool().dialed(), 2);
    assert_eq!(client.pool().idle_connections(), 2);
}

#[tokio::test]
async fn abandoned_call_closes_its_connection() {
    init_logging();
    let server = MockServer::redis_like().await;
    let client = ConnectionBuilder::new(&server.addr)
        .unwrap()
        .max_connections(1)
        .client();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        client.call(cmd!["SLOW", 500]),
    )
    .await;
    assert!(abandoned.is_err());

    // The late reply to SLOW must not be taken as the reply to PING
    assert_eq!(client.call(cmd!["PING"]).await.unwrap(), Reply::from("PONG"));
    assert_eq!(server.accepted(), 2);
}

#[tokio::test]
async fn standalone_connection() {
    init_logging();
    let server = MockServer::redis_like().await;
    let mut connection = ConnectionBuilder::new(&server.addr)
        .unwrap()
        .connect()
        .await
        .unwrap();

    connection.write(&cmd!["ECHO", "one"]).await.unwrap();
    connection.write(&cmd!["ECHO", "two"]).await.unwrap();
    assert_eq!(connection.read().await.unwrap(), Reply::from("one"));
    assert_eq!(connection.read().await.unwrap(), Reply::from("two"));
    assert_eq!(
        connection.call(&cmd!["PING"]).await.unwrap(),
        Reply::from("PONG")
    );
}

#[tokio::test]
async fn unreachable_server() {
    init_logging();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("tcp:{}", listener.local_addr().unwrap());
    drop(listener);

    let client = Client::new(&addr).unwrap();
    match client.call(cmd!["PING"]).await {
        Err(Error::IO(_)) => (),
        other => panic!("Expected a connect error, got: {:?}", other),
    }
    assert_eq!(client.pool().available(), client.pool().capacity());
}

#[test]
fn invalid_address() {
    match Client::new("localhost:6379") {
        Err(Error::InvalidAddress(addr)) => assert_eq!(addr, "localhost:6379"),
        other => panic!("Expected an invalid address, got: {:?}", other.map(|_| ())),
    }
}
