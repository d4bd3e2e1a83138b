// Integration tests for `TcpConnector` against a local listener.
//
// The gateway byte format is not part of this crate, so the tests plug in a
// small line-based codec of their own.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use bytes::{BufMut, BytesMut};
use pretty_assertions::assert_eq;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio_util::codec::{Decoder, Encoder};

use ifsei_api::{
    ChannelAddress, Command, CommandSink, Connector, Endpoint, Error, Notification,
    NotificationSource, Operation, SceneId, TcpConnector, TransportConfig,
};

// ── Helpers ─────────────────────────────────────────────────────────

/// `L <module> <channel> <level>` / `S <scene> <0|1>` notifications,
/// `L <module> <channel> <level>` / `T <scene>` commands.
#[derive(Debug, Clone, Default)]
struct LineCodec;

impl Decoder for LineCodec {
    type Item = Notification;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Notification>, Error> {
        let Some(pos) = src.iter().position(|b| *b == b'\n') else {
            return Ok(None);
        };
        let line = src.split_to(pos + 1);
        let text = std::str::from_utf8(&line[..pos]).map_err(|e| Error::Codec(e.to_string()))?;
        let parts: Vec<&str> = text.split_whitespace().collect();
        let num = |s: &str| s.parse::<u16>().map_err(|e| Error::Codec(e.to_string()));
        match parts.as_slice() {
            ["L", m, c, l] => Ok(Some(Notification::level(
                ChannelAddress::new(to_u8(num(m)?)?, to_u8(num(c)?)?),
                to_u8(num(l)?)?,
            ))),
            ["S", id, flag] => Ok(Some(Notification::scene(SceneId(num(id)?), *flag == "1"))),
            _ => Err(Error::Codec(format!("unknown frame: {text}"))),
        }
    }
}

impl Encoder<Command> for LineCodec {
    type Error = Error;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), Error> {
        let line = match (item.target, item.operation) {
            (ifsei_api::Address::Channel(c), Operation::SetLevel(l)) => {
                format!("L {} {} {l}\n", c.module, c.channel)
            }
            (ifsei_api::Address::Scene(s), Operation::Trigger) => format!("T {}\n", s.0),
            other => return Err(Error::Codec(format!("unencodable: {other:?}"))),
        };
        dst.put_slice(line.as_bytes());
        Ok(())
    }
}

fn to_u8(v: u16) -> Result<u8, Error> {
    u8::try_from(v).map_err(|e| Error::Codec(e.to_string()))
}

async fn listener() -> (TcpListener, Endpoint) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, Endpoint::new("127.0.0.1", port))
}

fn connector(config: TransportConfig) -> TcpConnector<LineCodec> {
    TcpConnector::new(LineCodec, config)
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn sends_encoded_commands_to_the_gateway() {
    let (listener, endpoint) = listener().await;

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(socket).lines();
        let first = lines.next_line().await.unwrap().unwrap();
        let second = lines.next_line().await.unwrap().unwrap();
        (first, second)
    });

    let (mut sink, _source) = connector(TransportConfig::default())
        .connect(&endpoint)
        .await
        .unwrap();

    sink.send(&Command::set_level(ChannelAddress::new(1, 2), 50))
        .await
        .unwrap();
    sink.send(&Command::trigger(SceneId(9))).await.unwrap();

    let (first, second) = server.await.unwrap();
    assert_eq!(first, "L 1 2 50");
    assert_eq!(second, "T 9");
}

#[tokio::test]
async fn receives_decoded_notifications() {
    let (listener, endpoint) = listener().await;

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        socket.write_all(b"S 7 1\nL 2 3 40\n").await.unwrap();
        socket.flush().await.unwrap();
        // Keep the socket open until the client has read both frames.
        tokio::time::sleep(Duration::from_millis(200)).await;
    });

    let (_sink, mut source) = connector(TransportConfig::default())
        .connect(&endpoint)
        .await
        .unwrap();

    let first = source.receive().await.unwrap();
    let second = source.receive().await.unwrap();
    assert_eq!(first, Some(Notification::scene(SceneId(7), true)));
    assert_eq!(
        second,
        Some(Notification::level(ChannelAddress::new(2, 3), 40))
    );

    server.await.unwrap();
}

#[tokio::test]
async fn clean_close_yields_none() {
    let (listener, endpoint) = listener().await;

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        drop(socket);
    });

    let (_sink, mut source) = connector(TransportConfig::default())
        .connect(&endpoint)
        .await
        .unwrap();

    server.await.unwrap();
    assert_eq!(source.receive().await.unwrap(), None);
}

#[tokio::test]
async fn silent_gateway_hits_read_timeout() {
    let (listener, endpoint) = listener().await;

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        drop(socket);
    });

    let config = TransportConfig {
        read_timeout: Duration::from_millis(50),
        ..TransportConfig::default()
    };
    let (_sink, mut source) = connector(config).connect(&endpoint).await.unwrap();

    let err = source.receive().await.unwrap_err();
    assert!(
        matches!(err, Error::Timeout { operation: "read", timeout_ms: 50 }),
        "unexpected error: {err:?}"
    );
    assert!(err.is_link_failure());

    server.await.unwrap();
}

#[tokio::test]
async fn refused_connection_is_a_connect_error() {
    let (listener, endpoint) = listener().await;
    drop(listener);

    let result = connector(TransportConfig::default()).connect(&endpoint).await;
    let Err(err) = result else {
        panic!("connect to a closed port should fail");
    };
    assert!(matches!(err, Error::Connect { .. }), "unexpected error: {err:?}");
    assert!(err.is_transient());
}

#[tokio::test]
async fn malformed_frame_is_a_codec_error() {
    let (listener, endpoint) = listener().await;

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        socket.write_all(b"garbage\n").await.unwrap();
        socket.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
    });

    let (_sink, mut source) = connector(TransportConfig::default())
        .connect(&endpoint)
        .await
        .unwrap();

    let err = source.receive().await.unwrap_err();
    assert!(matches!(err, Error::Codec(_)), "unexpected error: {err:?}");

    server.await.unwrap();
}

#[tokio::test]
async fn undecodable_frame_does_not_end_the_session() {
    let (listener, endpoint) = listener().await;

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        socket.write_all(b"garbage\nS 7 1\n").await.unwrap();
        socket.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
    });

    let (_sink, mut source) = connector(TransportConfig::default())
        .connect(&endpoint)
        .await
        .unwrap();

    let err = source.receive().await.unwrap_err();
    assert!(matches!(err, Error::Codec(_)), "unexpected error: {err:?}");
    assert!(!err.is_link_failure());

    let next = source.receive().await.unwrap();
    assert_eq!(next, Some(Notification::scene(SceneId(7), true)));

    server.await.unwrap();
}
