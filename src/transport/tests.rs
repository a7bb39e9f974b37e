use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use futures::future::join_all;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::net::TcpListener;

use super::codec;
use super::connection::{Dispatcher, HandleStatus, Request};
use super::message::{self, Command, HEADER_LEN, Header, Message};
use super::server;
use crate::broker::registry::SubscriptionRegistry;
use crate::client::{RelayClient, SubscriberListener};
use crate::config::{RelaySettings, Settings};
use crate::utils::error::{ProtocolError, RequestError, ServerError};

const WIDTH: usize = 40;

fn relay_settings() -> RelaySettings {
    Settings::default().relay
}

fn dispatcher_with(settings: RelaySettings) -> Dispatcher {
    let registry = Arc::new(SubscriptionRegistry::new(settings.channels));
    Dispatcher::new(registry, settings)
}

/// Header with an arbitrary declared length followed by whatever bytes are given.
fn raw(command: u8, channel: u8, length: u64, body: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u8(command);
    buf.put_u8(channel);
    buf.put_u64_le(length);
    buf.put_slice(body);
    buf.to_vec()
}

/// Feed `request` to the dispatcher over an in-memory stream and collect its answer.
///
/// With `close` the client half-closes after writing, so short requests hit EOF.
async fn exchange(dispatcher: &Dispatcher, request: &[u8], close: bool) -> (HandleStatus, Message) {
    let (mut client, server): (DuplexStream, DuplexStream) = tokio::io::duplex(64 * 1024);
    client.write_all(request).await.unwrap();
    if close {
        client.shutdown().await.unwrap();
    }

    let status = dispatcher.handle(server).await;
    let response = codec::read_message(&mut client, 1024).await.unwrap();
    (status, response)
}

fn assert_failure(response: &Message, text: &str) {
    assert_eq!(response.command, Command::NotifyFailure.as_u8());
    assert_eq!(response.channel, 0);
    assert_eq!(response.text(), text);
}

// ---- wire format ----

#[test]
fn test_encode_layout() {
    let frame = message::encode(Command::NotifySuccess, 3, b"subscribed");
    assert_eq!(frame.len(), HEADER_LEN + 10);
    assert_eq!(frame[0], 2);
    assert_eq!(frame[1], 3);
    assert_eq!(&frame[2..10], &10u64.to_le_bytes());
    assert_eq!(&frame[10..], b"subscribed");

    let empty = message::encode(Command::Subscribe, 0, b"");
    assert_eq!(empty.len(), HEADER_LEN);
}

#[test]
fn test_header_parse() {
    let mut buf = [0u8; HEADER_LEN];
    buf[0] = 1;
    buf[1] = 7;
    buf[2..].copy_from_slice(&300u64.to_le_bytes());

    assert_eq!(
        Header::parse(&buf),
        Header {
            command: 1,
            channel: 7,
            length: 300
        }
    );
}

#[test]
fn test_command_try_from() {
    assert_eq!(Command::try_from(0), Ok(Command::Subscribe));
    assert_eq!(Command::try_from(4), Ok(Command::Unsubscribe));
    assert_eq!(Command::try_from(5), Err(5));
    assert_eq!(Command::Send.as_u8(), 1);
}

#[test]
fn test_filename_field() {
    let field = message::encode_filename("report.txt", WIDTH).unwrap();
    assert_eq!(field.len(), WIDTH);
    assert!(field[10..].iter().all(|b| *b == 0));
    assert_eq!(message::parse_filename(&field), "report.txt");

    let full = "f".repeat(WIDTH);
    let field = message::encode_filename(&full, WIDTH).unwrap();
    assert_eq!(message::parse_filename(&field), full);

    assert!(matches!(
        message::encode_filename("a\0b", WIDTH),
        Err(ProtocolError::FilenameContainsNull)
    ));
    assert!(matches!(
        message::encode_filename(&"f".repeat(WIDTH + 1), WIDTH),
        Err(ProtocolError::FilenameTooLong { .. })
    ));
}

#[test]
fn test_parse_filename_stops_at_first_null() {
    assert_eq!(message::parse_filename(b"abc\0def\0\0"), "abc");
    assert_eq!(message::parse_filename(b"\0abc"), "");
}

#[tokio::test]
async fn test_message_round_trip() {
    let original = Message::new(Command::Send, 5, &b"payload bytes"[..]);
    let (mut writer, mut reader) = tokio::io::duplex(1024);

    codec::write_message(&mut writer, &original).await.unwrap();
    let decoded = codec::read_message(&mut reader, 4).await.unwrap();

    assert_eq!(decoded, original);
}

#[tokio::test]
async fn test_read_header_short_read() {
    let (mut writer, mut reader) = tokio::io::duplex(1024);
    writer.write_all(&[1, 2, 3]).await.unwrap();
    drop(writer);

    let err = codec::read_header(&mut reader).await.unwrap_err();
    assert!(matches!(err, ProtocolError::ShortRead));
}

#[tokio::test]
async fn test_read_body_incomplete() {
    let (mut writer, mut reader) = tokio::io::duplex(1024);
    writer.write_all(b"12345").await.unwrap();
    drop(writer);

    let err = codec::read_body(&mut reader, 8, 2).await.unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::IncompleteBody {
            expected: 8,
            received: 5
        }
    ));
}

#[tokio::test]
async fn test_read_body_in_small_chunks() {
    let (mut writer, mut reader) = tokio::io::duplex(1024);
    writer.write_all(b"abcdefghij-trailing").await.unwrap();

    let body = codec::read_body(&mut reader, 10, 3).await.unwrap();
    assert_eq!(&body[..], b"abcdefghij");

    // Bytes past the declared length are left in the stream.
    let rest = codec::read_field(&mut reader, 9).await.unwrap();
    assert_eq!(&rest[..], b"-trailing");
}

// ---- dispatcher ----

#[tokio::test]
async fn test_subscribe_registers_address() {
    let dispatcher = dispatcher_with(relay_settings());
    let request = message::encode(Command::Subscribe, 3, b"127.0.0.1:9001");

    let (status, response) = exchange(&dispatcher, &request, false).await;

    assert_eq!(status, HandleStatus::Success);
    assert_eq!(response.command, Command::NotifySuccess.as_u8());
    assert_eq!(response.channel, 3);
    assert_eq!(response.text(), "subscribed");

    let registry = dispatcher.registry();
    let channel = registry.channel(3).unwrap();
    assert_eq!(registry.snapshot(channel), vec!["127.0.0.1:9001".to_string()]);
}

#[tokio::test]
async fn test_unsubscribe_absent_pair_succeeds() {
    let dispatcher = dispatcher_with(relay_settings());
    let registry = dispatcher.registry().clone();
    let channel = registry.channel(2).unwrap();
    registry.register("127.0.0.1:9001", channel);

    let request = message::encode(Command::Unsubscribe, 2, b"127.0.0.1:9999");
    let (status, response) = exchange(&dispatcher, &request, false).await;

    assert_eq!(status, HandleStatus::Success);
    assert_eq!(response.channel, 2);
    assert_eq!(response.text(), "unsubscribed");
    assert_eq!(registry.snapshot(channel), vec!["127.0.0.1:9001".to_string()]);
}

#[tokio::test]
async fn test_unsubscribe_removes_address() {
    let dispatcher = dispatcher_with(relay_settings());
    let registry = dispatcher.registry().clone();
    let channel = registry.channel(2).unwrap();
    registry.register("127.0.0.1:9001", channel);

    let request = message::encode(Command::Unsubscribe, 2, b"127.0.0.1:9001");
    let (status, _) = exchange(&dispatcher, &request, false).await;

    assert_eq!(status, HandleStatus::Success);
    assert_eq!(registry.subscriber_count(channel), 0);
}

#[tokio::test]
async fn test_unsubscribe_rejected_when_disabled() {
    let settings = RelaySettings {
        unsubscribe_enabled: false,
        ..relay_settings()
    };
    let dispatcher = dispatcher_with(settings);
    let registry = dispatcher.registry().clone();
    let channel = registry.channel(1).unwrap();
    registry.register("127.0.0.1:9001", channel);

    let request = message::encode(Command::Unsubscribe, 1, b"127.0.0.1:9001");
    let (status, response) = exchange(&dispatcher, &request, false).await;

    assert_eq!(status, HandleStatus::Rejected);
    assert_failure(&response, "invalid command");
    assert_eq!(registry.subscriber_count(channel), 1);
}

#[tokio::test]
async fn test_invalid_commands_are_rejected() {
    let dispatcher = dispatcher_with(relay_settings());

    for command in [2u8, 3, 9, 255] {
        let request = raw(command, 1, 5, b"hello");
        let (status, response) = exchange(&dispatcher, &request, false).await;
        assert_eq!(status, HandleStatus::Rejected, "command {command}");
        assert_failure(&response, "invalid command");
    }
}

#[tokio::test]
async fn test_immediate_close_is_connection_error() {
    let dispatcher = dispatcher_with(relay_settings());

    let (status, response) = exchange(&dispatcher, b"", true).await;

    assert_eq!(status, HandleStatus::ConnectionError);
    assert_failure(&response, "command read error");
}

#[tokio::test]
async fn test_truncated_header_fields() {
    let dispatcher = dispatcher_with(relay_settings());

    let (status, response) = exchange(&dispatcher, &[0], true).await;
    assert_eq!(status, HandleStatus::IoError);
    assert_failure(&response, "channel read error");

    let (status, response) = exchange(&dispatcher, &[1, 1, 50, 0, 0], true).await;
    assert_eq!(status, HandleStatus::IoError);
    assert_failure(&response, "length read error");

    let request = raw(1, 1, 50, b"short-name");
    let (status, response) = exchange(&dispatcher, &request, true).await;
    assert_eq!(status, HandleStatus::IoError);
    assert_failure(&response, "filename read error");
}

#[tokio::test]
async fn test_channel_out_of_range_is_rejected() {
    let dispatcher = dispatcher_with(relay_settings());
    let registry = dispatcher.registry().clone();

    for channel in [0u8, 9] {
        let request = message::encode(Command::Subscribe, channel, b"127.0.0.1:9001");
        let (status, response) = exchange(&dispatcher, &request, false).await;
        assert_eq!(status, HandleStatus::ValidationError);
        assert_failure(&response, "invalid channel");
    }

    let field = message::encode_filename("report.txt", WIDTH).unwrap();
    let request = message::encode_file(9, &field, b"0123456789");
    let (status, response) = exchange(&dispatcher, &request, false).await;
    assert_eq!(status, HandleStatus::ValidationError);
    assert_failure(&response, "invalid channel");

    for raw_channel in 1..=registry.number_of_channels() {
        let channel = registry.channel(raw_channel).unwrap();
        assert_eq!(registry.subscriber_count(channel), 0);
    }
}

#[tokio::test]
async fn test_subscribe_body_validation() {
    let dispatcher = dispatcher_with(relay_settings());

    let (status, response) = exchange(&dispatcher, &raw(0, 1, 0, b""), false).await;
    assert_eq!(status, HandleStatus::ValidationError);
    assert_failure(&response, "invalid content length");

    let (status, response) = exchange(&dispatcher, &raw(0, 1, 20, b"127.0"), true).await;
    assert_eq!(status, HandleStatus::IoError);
    assert_failure(&response, "content incomplete read");

    let (status, response) = exchange(&dispatcher, &raw(0, 1, 2, &[0xff, 0xfe]), false).await;
    assert_eq!(status, HandleStatus::ValidationError);
    assert_failure(&response, "invalid address");
}

#[tokio::test]
async fn test_send_length_floor_checked_before_content() {
    let dispatcher = dispatcher_with(relay_settings());
    let field = message::encode_filename("report.txt", WIDTH).unwrap();

    // Declares no content at all and sends none; the stream stays open, so
    // the dispatcher must answer without trying to read file bytes.
    let request = raw(1, 1, WIDTH as u64, &field);
    let (status, response) = exchange(&dispatcher, &request, false).await;
    assert_eq!(status, HandleStatus::ValidationError);
    assert_failure(&response, "invalid content length");

    let request = raw(1, 1, 10, &field);
    let (status, response) = exchange(&dispatcher, &request, false).await;
    assert_eq!(status, HandleStatus::ValidationError);
    assert_failure(&response, "invalid content length");
}

#[tokio::test]
async fn test_send_empty_filename() {
    let dispatcher = dispatcher_with(relay_settings());
    let field = [0u8; WIDTH];

    let request = message::encode_file(1, &field, b"data");
    let (status, response) = exchange(&dispatcher, &request, false).await;

    assert_eq!(status, HandleStatus::ValidationError);
    assert_failure(&response, "empty filename");
}

#[tokio::test]
async fn test_send_without_subscribers() {
    let dispatcher = dispatcher_with(relay_settings());
    let field = message::encode_filename("report.txt", WIDTH).unwrap();

    let request = message::encode_file(3, &field, b"0123456789");
    let (status, response) = exchange(&dispatcher, &request, false).await;

    assert_eq!(status, HandleStatus::Success);
    assert_eq!(response.command, Command::NotifySuccess.as_u8());
    assert_eq!(response.channel, 3);
    assert_eq!(response.text(), "received");
}

#[tokio::test]
async fn test_incomplete_file_is_not_fanned_out() {
    let dispatcher = dispatcher_with(relay_settings());
    let registry = dispatcher.registry().clone();
    let channel = registry.channel(4).unwrap();

    let subscriber = SubscriberListener::bind("127.0.0.1:0", WIDTH).await.unwrap();
    registry.register(subscriber.local_addr().unwrap().to_string(), channel);

    let field = message::encode_filename("big.bin", WIDTH).unwrap();
    let mut body = field.to_vec();
    body.extend_from_slice(&[7u8; 9]);
    let request = raw(1, 4, (WIDTH + 10) as u64, &body);

    let (status, response) = exchange(&dispatcher, &request, true).await;
    assert_eq!(status, HandleStatus::IoError);
    assert_failure(&response, "file incomplete read");

    let delivery =
        tokio::time::timeout(Duration::from_millis(300), subscriber.accept_delivery()).await;
    assert!(delivery.is_err());
}

#[tokio::test]
async fn test_read_request_decodes_file_transfer() {
    let dispatcher = dispatcher_with(relay_settings());
    let field = message::encode_filename("report.txt", WIDTH).unwrap();
    let frame = message::encode_file(3, &field, b"0123456789");
    let (mut client, mut server) = tokio::io::duplex(1024);
    client.write_all(&frame).await.unwrap();

    let request = dispatcher.read_request(&mut server).await.unwrap();
    match request {
        Request::Send(transfer) => {
            assert_eq!(transfer.channel.get(), 3);
            assert_eq!(transfer.filename, "report.txt");
            assert_eq!(transfer.filename_field, field);
            assert_eq!(&transfer.content[..], b"0123456789");
        }
        other => panic!("unexpected request: {other:?}"),
    }
}

#[tokio::test]
async fn test_read_request_reports_invalid_command() {
    let dispatcher = dispatcher_with(relay_settings());
    let (mut client, mut server) = tokio::io::duplex(1024);
    client.write_all(&[3]).await.unwrap();

    let err = dispatcher.read_request(&mut server).await.unwrap_err();
    assert!(matches!(err, RequestError::InvalidCommand(3)));
}

// ---- listener ----

async fn spawn_relay(settings: RelaySettings) -> (String, Arc<SubscriptionRegistry>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let registry = Arc::new(SubscriptionRegistry::new(settings.channels));
    tokio::spawn(server::serve(listener, registry.clone(), settings));
    (addr, registry)
}

#[tokio::test]
async fn test_bind_reports_address_in_use() {
    let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = taken.local_addr().unwrap().port();
    let settings = crate::config::ServerSettings {
        host: "127.0.0.1".to_string(),
        port,
    };

    let err = server::bind(&settings).await.unwrap_err();
    assert!(matches!(err, ServerError::Bind { .. }));
}

#[tokio::test]
async fn test_send_reaches_live_subscriber_and_keeps_dead_one() {
    let (addr, registry) = spawn_relay(relay_settings()).await;
    let client = RelayClient::new(addr);

    let subscriber = SubscriberListener::bind("127.0.0.1:0", WIDTH).await.unwrap();
    let live = subscriber.local_addr().unwrap().to_string();
    let dead = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    };

    client.subscribe(3, &dead).await.unwrap();
    client.subscribe(3, &live).await.unwrap();

    let response = client
        .send_file(3, "report.txt", b"0123456789", WIDTH)
        .await
        .unwrap();
    assert_eq!(response.channel, 3);
    assert_eq!(response.text(), "received");

    let delivery = subscriber.accept_delivery().await.unwrap();
    assert_eq!(delivery.channel, 3);
    assert_eq!(delivery.filename, "report.txt");
    assert_eq!(&delivery.content[..], b"0123456789");

    let channel = registry.channel(3).unwrap();
    let remaining = registry.snapshot(channel);
    assert_eq!(remaining.len(), 2);
    assert!(remaining.contains(&dead));
}

#[tokio::test]
async fn test_concurrent_mode_delivers_to_all() {
    let settings = RelaySettings {
        send_files_concurrently: true,
        ..relay_settings()
    };
    let (addr, _registry) = spawn_relay(settings).await;
    let client = RelayClient::new(addr);

    let mut subscribers = Vec::new();
    for _ in 0..3 {
        let subscriber = SubscriberListener::bind("127.0.0.1:0", WIDTH).await.unwrap();
        let callback = subscriber.local_addr().unwrap().to_string();
        client.subscribe(7, &callback).await.unwrap();
        subscribers.push(subscriber);
    }

    client
        .send_file(7, "frame.raw", &[1, 2, 3, 4], WIDTH)
        .await
        .unwrap();

    let deliveries = join_all(subscribers.iter().map(|s| s.accept_delivery())).await;
    for delivery in deliveries {
        let delivery = delivery.unwrap();
        assert_eq!(delivery.channel, 7);
        assert_eq!(&delivery.content[..], &[1, 2, 3, 4]);
    }
}

#[tokio::test]
async fn test_parallel_subscribes() {
    let (addr, registry) = spawn_relay(relay_settings()).await;
    let client = RelayClient::new(addr);

    let callbacks: Vec<String> = (0..20).map(|i| format!("127.0.0.1:{}", 20_000 + i)).collect();
    let results = join_all(callbacks.iter().map(|cb| client.subscribe(1, cb))).await;
    assert!(results.iter().all(|r| r.is_ok()));

    let channel = registry.channel(1).unwrap();
    assert_eq!(registry.subscriber_count(channel), 20);
}
