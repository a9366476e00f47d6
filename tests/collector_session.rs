//! End-to-end handshake over a real `UnixStream` pair: a fake collector
//! client writes the raw protobuf frames a real client would send, and a
//! `Collector` instance parses/answers them exactly as it would over a
//! socket accepted from `UnixListener`.

use std::os::unix::net::UnixStream;

use taskmonitor::collector::{Collector, CollectorSink, Stream, Transport};
use taskmonitor::wire::collector::request::Type as RequestType;
use taskmonitor::wire::collector::{Descriptor, Request};
use taskmonitor::wire::envelope::envelope::{Mesg, Recipient};
use taskmonitor::wire::envelope::Envelope;
use taskmonitor::wire::monitor::data::{Payload as DataPayload, What};
use taskmonitor::wire::monitor::message::{Payload as MessagePayload, Type as MessageType};
use taskmonitor::wire::monitor::{Message, ProcEventStats};
use taskmonitor::wire::{read_delimited, write_delimited};

fn send_descriptor(peer: &mut UnixStream, id: &str) {
    write_delimited(peer, &Descriptor { id: id.to_owned() }).unwrap();
}

fn send_request(peer: &mut UnixStream, request_type: RequestType) {
    let envelope = Envelope {
        origin: Recipient::Collector as i32,
        target: Recipient::Monitor as i32,
        mesg: Some(Mesg::Request(Request {
            id: 1,
            r#type: request_type as i32,
        })),
    };
    write_delimited(peer, &envelope).unwrap();
}

fn read_reply(peer: &mut UnixStream) -> Message {
    let envelope: Envelope = read_delimited(peer).unwrap().unwrap();
    match envelope.mesg {
        Some(Mesg::Message(message)) => message,
        other => panic!("expected a Message envelope, got {:?}", other),
    }
}

#[test]
fn handshake_then_create_session_yields_session_info() {
    let (mut peer, server) = UnixStream::pair().unwrap();
    let mut collector = Collector::new(Transport::Uds, Stream::Uds(server), 2_000_000, 5_000_000, 30_000_000);

    send_descriptor(&mut peer, "test-collector");
    collector.read_descriptor().unwrap();
    assert_eq!(collector.descriptor_id, "test-collector");

    send_request(&mut peer, RequestType::CreateSession);
    let routed = collector.read_request().unwrap();
    assert!(routed.is_none(), "CreateSession is handled internally, never routed");

    let reply = read_reply(&mut peer);
    assert_eq!(reply.r#type, MessageType::SetSession as i32);
    let Some(MessagePayload::SessionInfo(info)) = reply.payload else {
        panic!("expected a SessionInfo payload");
    };
    assert!(!info.hash.is_empty());
    assert_eq!(info.fast_lane_interval_usec, 2_000_000);
}

#[test]
fn two_sessions_from_the_same_descriptor_get_different_hashes() {
    let (mut peer_a, server_a) = UnixStream::pair().unwrap();
    let mut collector_a = Collector::new(Transport::Uds, Stream::Uds(server_a), 1, 1, 1);
    let (mut peer_b, server_b) = UnixStream::pair().unwrap();
    let mut collector_b = Collector::new(Transport::Uds, Stream::Uds(server_b), 1, 1, 1);

    for (peer, collector) in [(&mut peer_a, &mut collector_a), (&mut peer_b, &mut collector_b)] {
        send_descriptor(peer, "same-id");
        collector.read_descriptor().unwrap();
        send_request(peer, RequestType::CreateSession);
        collector.read_request().unwrap();
    }

    let hash_a = match read_reply(&mut peer_a).payload {
        Some(MessagePayload::SessionInfo(info)) => info.hash,
        other => panic!("unexpected payload: {:?}", other),
    };
    let hash_b = match read_reply(&mut peer_b).payload {
        Some(MessagePayload::SessionInfo(info)) => info.hash,
        other => panic!("unexpected payload: {:?}", other),
    };
    assert_ne!(hash_a, hash_b, "session hash must not collide across handshakes");
}

#[test]
fn an_envelope_with_the_wrong_origin_is_rejected() {
    let (mut peer, server) = UnixStream::pair().unwrap();
    let mut collector = Collector::new(Transport::Uds, Stream::Uds(server), 1, 1, 1);

    send_descriptor(&mut peer, "test-collector");
    collector.read_descriptor().unwrap();

    let envelope = Envelope {
        origin: Recipient::Client as i32,
        target: Recipient::Monitor as i32,
        mesg: Some(Mesg::Request(Request {
            id: 1,
            r#type: RequestType::GetProcInfo as i32,
        })),
    };
    write_delimited(&mut peer, &envelope).unwrap();

    let err = collector.read_request().unwrap_err();
    assert!(matches!(err, taskmonitor::error::Error::OriginMismatch));
}

#[test]
fn collector_sink_writes_a_data_message_a_peer_can_decode() {
    let (mut peer, server) = UnixStream::pair().unwrap();
    let mut collector = Collector::new(Transport::Uds, Stream::Uds(server), 1, 1, 1);

    collector
        .send_data(What::ProcEvent, DataPayload::ProcEvent(ProcEventStats {
            fork_count: 3,
            ..Default::default()
        }))
        .unwrap();

    let reply = read_reply(&mut peer);
    assert_eq!(reply.r#type, MessageType::Data as i32);
    let Some(MessagePayload::Data(data)) = reply.payload else {
        panic!("expected a Data payload");
    };
    assert_eq!(data.what, What::ProcEvent as i32);
    match data.payload {
        Some(DataPayload::ProcEvent(stats)) => assert_eq!(stats.fork_count, 3),
        other => panic!("unexpected payload: {:?}", other),
    }
}
