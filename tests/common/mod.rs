//! Scripted remote end for session tests.
//!
//! The peer owns the other side of an in-memory duplex stream and speaks
//! msgpack-rpc through the crate's public codec.

#![allow(dead_code)]

use std::time::Duration;

use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::time::timeout;

use nvim_attach::rpc::{encode, read_message, Message, MAX_MESSAGE_SIZE};
use nvim_attach::{attach_with, Session, SessionConfig, Value};

pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// How long `assert_silent` waits for unexpected traffic.
pub const QUIET_PERIOD: Duration = Duration::from_millis(100);

pub struct FakePeer {
    reader: ReadHalf<DuplexStream>,
    writer: WriteHalf<DuplexStream>,
    buf: Vec<u8>,
}

/// A session attached to a fresh fake peer.
pub fn pair() -> (Session, FakePeer) {
    pair_with(SessionConfig::default())
}

pub fn pair_with(config: SessionConfig) -> (Session, FakePeer) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (client_reader, client_writer) = tokio::io::split(client);
    let session = attach_with(client_writer, client_reader, config).expect("attach failed");

    let (reader, writer) = tokio::io::split(server);
    (
        session,
        FakePeer {
            reader,
            writer,
            buf: Vec::new(),
        },
    )
}

impl FakePeer {
    /// Next message from the session; panics on EOF.
    pub async fn recv(&mut self) -> Message {
        self.try_recv().await.expect("Session closed its stream")
    }

    /// Next message, or `None` once the session has shut its writer.
    pub async fn try_recv(&mut self) -> Option<Message> {
        timeout(TEST_TIMEOUT, read_message(&mut self.reader, &mut self.buf, MAX_MESSAGE_SIZE))
            .await
            .expect("Test timed out waiting for the session")
            .expect("Session sent an undecodable message")
    }

    pub async fn recv_request(&mut self) -> (u32, String, Vec<Value>) {
        match self.recv().await {
            Message::Request { id, method, args } => (id, method, args),
            other => panic!("Expected a request, got {:?}", other),
        }
    }

    pub async fn send(&mut self, message: &Message) {
        let bytes = encode(message).expect("encode failed");
        self.send_raw(&bytes).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write failed");
        self.writer.flush().await.expect("flush failed");
    }

    pub async fn respond(&mut self, id: u32, outcome: Result<Value, Value>) {
        self.send(&Message::Response { id, outcome }).await;
    }

    pub async fn notify(&mut self, event: &str, args: Vec<Value>) {
        self.send(&Message::Notification {
            event: event.to_string(),
            args,
        })
        .await;
    }

    /// Close our sending side; the session sees EOF.
    pub async fn hang_up(&mut self) {
        self.writer.shutdown().await.expect("shutdown failed");
    }

    /// Assert the session writes nothing for a short while. A clean EOF
    /// also counts as silence.
    pub async fn assert_silent(&mut self) {
        match timeout(
            QUIET_PERIOD,
            read_message(&mut self.reader, &mut self.buf, MAX_MESSAGE_SIZE),
        )
        .await
        {
            Err(_) | Ok(Ok(None)) => {}
            Ok(other) => panic!("Expected no traffic, got {:?}", other),
        }
    }
}

/// Await `fut` with the test timeout.
pub async fn within<F: std::future::Future>(fut: F) -> F::Output {
    timeout(TEST_TIMEOUT, fut).await.expect("Test timed out")
}
