use heapless::Vec as HVec;
use libmqtt::network::application::mqtt::codec::{self, PacketType};
use libmqtt::network::application::mqtt::config::SessionConfig;
use libmqtt::network::application::mqtt::{
    ConnectionState, PendingRequest, QoS, Reassembler, Session, Timing,
};
use libmqtt::network::error::Error;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::mock::*;

fn inbound_publish(topic: &str, payload: &[u8], qos: QoS, packet_id: u16) -> Vec<u8> {
    let mut out: HVec<u8, 256> = HVec::new();
    codec::publish(&mut out, topic, payload, qos, false, packet_id).unwrap();
    out.to_vec()
}

fn pending(packet_type: PacketType, packet_id: u16) -> Option<PendingRequest> {
    Some(PendingRequest {
        packet_type,
        packet_id,
    })
}

#[test]
fn test_handshake_reaches_active() {
    let mut session = configured(60);
    session.connect().unwrap();
    assert_eq!(session.state(), ConnectionState::Connecting);
    assert_eq!(session.transport().opens.len(), 1);
    assert_eq!(session.transport().opens[0].to_string(), "192.0.2.10:1883");
    assert!(session.ticker().running);
    assert_eq!(session.ticker().period_ms, 1000);

    session.on_transport_connected();
    assert_eq!(session.state(), ConnectionState::HandshakeSent);
    assert_eq!(session.transport().headers(), [0x10]);
    assert_eq!(session.pending(), pending(PacketType::Connect, 0));

    session.on_send_complete();
    session.on_received(&CONNACK);
    assert_eq!(session.state(), ConnectionState::Active);
    assert_eq!(session.handler().connected, 1);
    assert_eq!(session.pending(), None);
}

#[test]
fn test_connect_carries_last_will() {
    let mut session = configured(60);
    session
        .init_last_will("dev/status", "offline", QoS::AtLeastOnce, true)
        .unwrap();
    session.connect().unwrap();
    session.on_transport_connected();

    let connect = &session.transport().sent[0];
    assert!(connect.windows(10).any(|w| w == b"dev/status"));
    assert!(connect.ends_with(b"offline"));
}

#[test]
fn test_from_config_applies_timing() {
    let config = SessionConfig::from_json(
        br#"{"connection":{"host":"192.0.2.1","port":8883,"security":true},
             "client":{"client_id":"cfg"},
             "timing":{"tick_period_ms":250}}"#,
    )
    .unwrap();
    let mut session: TestSession = Session::from_config(
        config,
        MockTransport::default(),
        MockTicker::default(),
        Recorder::default(),
    );
    session.connect().unwrap();
    assert_eq!(session.ticker().period_ms, 250);
    assert_eq!(session.transport().opens[0].port(), 8883);
}

#[test]
fn test_connect_twice_keeps_one_attempt_outstanding() {
    let mut session = configured(60);
    session.connect().unwrap();
    session.connect().unwrap();
    assert_eq!(session.transport().opens.len(), 2);
    assert_eq!(session.transport().outstanding(), 1);
    assert_eq!(session.state(), ConnectionState::Connecting);
}

#[test]
fn test_keepalive_without_pingresp_forces_reconnect() {
    let mut session = active(10);
    for _ in 1..=10 {
        session.tick();
    }
    assert_eq!(session.transport().headers(), [0x10]);

    // tick 11: first PINGREQ
    session.tick();
    assert_eq!(session.transport().last_sent(), &[0xC0, 0x00]);
    assert_eq!(session.state(), ConnectionState::Active);
    session.on_send_complete();

    for _ in 12..=21 {
        session.tick();
        assert_eq!(session.state(), ConnectionState::Active);
    }

    // tick 22: a full interval without PINGRESP
    session.tick();
    assert_eq!(session.state(), ConnectionState::ReconnectRequested);
    assert_eq!(session.handler().disconnected, 1);
    assert_eq!(session.transport().headers(), [0x10, 0xC0, 0xC0]);
}

#[test]
fn test_pingresp_suppresses_reconnect() {
    let mut session = active(10);
    for _ in 0..5 {
        for _ in 0..11 {
            session.tick();
        }
        assert_eq!(session.state(), ConnectionState::Active);
        assert_eq!(session.pending(), pending(PacketType::PingReq, 0));
        session.on_send_complete();
        session.on_received(&PINGRESP);
        assert_eq!(session.pending(), None);
    }
    assert_eq!(session.handler().disconnected, 0);
    assert_eq!(
        session.transport().headers().iter().filter(|&&h| h == 0xC0).count(),
        5
    );
}

#[test]
fn test_zero_keepalive_never_pings() {
    let mut session = active(0);
    for _ in 0..200 {
        session.tick();
    }
    assert_eq!(session.state(), ConnectionState::Active);
    assert_eq!(session.transport().headers(), [0x10]);
}

#[test]
fn test_keepalive_seconds_scale_with_tick_period() {
    let mut session = configured(10);
    session.set_timing(Timing {
        tick_period_ms: 2000,
        ..Timing::default()
    });
    session.connect().unwrap();
    session.on_transport_connected();
    session.on_send_complete();
    session.on_received(&CONNACK);
    assert_eq!(session.ticker().period_ms, 2000);
    // keepalive field of CONNECT, in seconds
    assert_eq!(&session.transport().sent[0][10..12], &[0x00, 0x0A]);

    for _ in 1..=5 {
        session.tick();
    }
    assert_eq!(session.transport().headers(), [0x10]);

    // tick 6 is 12s in, inside the 10s keepalive plus broker grace
    session.tick();
    assert_eq!(session.transport().last_sent(), &[0xC0, 0x00]);
}

#[test]
fn test_ping_before_publish_completes_still_reports_publish() {
    let mut session = active(10);
    session
        .publish("dev/temp", b"21", QoS::AtMostOnce, false)
        .unwrap();
    assert_eq!(session.transport().headers(), [0x10, 0x30]);

    for _ in 1..=11 {
        session.tick();
    }
    assert_eq!(session.transport().headers(), [0x10, 0x30, 0xC0]);
    assert_eq!(session.handler().published, 0);

    session.on_send_complete();
    assert_eq!(session.handler().published, 1);
    session.on_send_complete();
    assert_eq!(session.handler().published, 1);
}

#[test]
fn test_inbound_qos1_publish_is_acknowledged_once() {
    let mut session = active(0);
    session.on_received(&inbound_publish("cmd", b"go", QoS::AtLeastOnce, 0x0102));

    assert_eq!(session.transport().last_sent(), &[0x40, 0x02, 0x01, 0x02]);
    assert_eq!(
        session.transport().headers().iter().filter(|&&h| h == 0x40).count(),
        1
    );
    assert_eq!(
        session.handler().messages,
        [("cmd".to_string(), b"go".to_vec())]
    );
}

#[test]
fn test_inbound_qos2_exchange() {
    let mut session = active(0);
    session.on_received(&inbound_publish("cmd", b"x", QoS::ExactlyOnce, 5));
    assert_eq!(session.transport().last_sent(), &[0x50, 0x02, 0x00, 0x05]);
    assert_eq!(session.handler().messages.len(), 1);
    session.on_send_complete();

    session.on_received(&[0x50, 0x02, 0x00, 0x05]);
    assert_eq!(session.transport().last_sent(), &[0x62, 0x02, 0x00, 0x05]);
    session.on_send_complete();

    session.on_received(&[0x62, 0x02, 0x00, 0x05]);
    assert_eq!(session.transport().last_sent(), &[0x70, 0x02, 0x00, 0x05]);
    assert_eq!(session.handler().messages.len(), 1);
}

#[test]
fn test_inbound_qos0_publish_needs_no_response() {
    let mut session = active(0);
    session.on_received(&inbound_publish("t", b"0", QoS::AtMostOnce, 0));
    assert_eq!(session.transport().headers(), [0x10]);
    assert_eq!(session.handler().messages.len(), 1);
}

#[test]
fn test_outbound_qos1_publish_completes_on_puback() {
    let mut session = active(0);
    session.publish("dev/t", b"1", QoS::AtLeastOnce, false).unwrap();
    assert_eq!(session.pending(), pending(PacketType::Publish, 1));

    session.on_send_complete();
    assert_eq!(session.handler().published, 1);

    session.on_received(&[0x40, 0x02, 0x00, 0x02]);
    assert_eq!(session.pending(), pending(PacketType::Publish, 1));
    session.on_received(&[0x40, 0x02, 0x00, 0x01]);
    assert_eq!(session.pending(), None);
}

#[test]
fn test_outbound_qos2_publish_completes_on_pubcomp() {
    let mut session = active(0);
    session.publish("dev/t", b"2", QoS::ExactlyOnce, false).unwrap();
    session.on_send_complete();

    session.on_received(&[0x50, 0x02, 0x00, 0x01]);
    assert_eq!(session.transport().last_sent(), &[0x62, 0x02, 0x00, 0x01]);
    assert_eq!(session.pending(), pending(PacketType::Publish, 1));
    session.on_send_complete();
    assert_eq!(session.handler().published, 1);

    session.on_received(&[0x70, 0x02, 0x00, 0x01]);
    assert_eq!(session.pending(), None);
}

#[test]
fn test_subscribe_and_unsubscribe_acks() {
    let mut session = active(0);
    session.subscribe("cmd/#", QoS::AtLeastOnce).unwrap();
    assert_eq!(session.transport().last_sent()[0], 0x82);
    assert_eq!(session.pending(), pending(PacketType::Subscribe, 1));
    session.on_send_complete();
    session.on_received(&[0x90, 0x03, 0x00, 0x01, 0x01]);
    assert_eq!(session.pending(), None);

    session.unsubscribe("cmd/#").unwrap();
    assert_eq!(session.transport().last_sent()[0], 0xA2);
    assert_eq!(session.pending(), pending(PacketType::Unsubscribe, 2));
    session.on_send_complete();
    session.on_received(&[0xB0, 0x02, 0x00, 0x02]);
    assert_eq!(session.pending(), None);
    assert_eq!(session.handler().published, 0);
}

#[test]
fn test_publish_argument_errors() {
    let mut session = active(0);
    assert_eq!(
        session.publish("", b"x", QoS::AtMostOnce, false),
        Err(Error::InvalidArgument)
    );
    assert_eq!(
        session.publish("a/#", b"x", QoS::AtMostOnce, false),
        Err(Error::InvalidArgument)
    );
    assert_eq!(
        session.publish("t", &[0; 300], QoS::AtMostOnce, false),
        Err(Error::PacketTooLarge)
    );
    assert_eq!(session.subscribe("", QoS::AtMostOnce), Err(Error::InvalidArgument));
}

#[test]
fn test_queue_full_evicts_oldest() {
    let mut session = configured(0);
    // 15 byte packets cost 17 queue bytes each: 15 fill 255 of 256
    for i in 0..15u8 {
        session.publish("t", &[i; 10], QoS::AtMostOnce, false).unwrap();
    }
    assert_eq!(session.queue().len(), 15);
    session.publish("t", &[15; 10], QoS::AtMostOnce, false).unwrap();
    assert_eq!(session.queue().len(), 15);

    session.connect().unwrap();
    session.on_transport_connected();
    session.on_send_complete();
    session.on_received(&CONNACK);
    assert!(session.transport().last_sent().ends_with(&[1; 10]));

    let mut delivered = 1;
    while !session.queue().is_empty() {
        session.on_send_complete();
        delivered += 1;
    }
    assert_eq!(delivered, 15);
    assert!(session.transport().last_sent().ends_with(&[15; 10]));
}

#[test]
fn test_oversized_publish_is_a_serious_buffer_error() {
    let mut session = configured(0);
    session.publish("t", b"small", QoS::AtMostOnce, false).unwrap();
    assert_eq!(
        session.publish("t", &[0; 250], QoS::AtMostOnce, false),
        Err(Error::SeriousBufferError)
    );
    assert!(session.queue().is_empty());
}

#[test]
fn test_send_failure_drops_packet_and_reconnects() {
    let mut session = active(0);
    session.transport_mut().fail_send = true;
    session.publish("t", b"lost", QoS::AtLeastOnce, false).unwrap();

    assert_eq!(session.state(), ConnectionState::ReconnectRequested);
    assert_eq!(session.handler().disconnected, 1);
    assert!(session.queue().is_empty());
    assert_eq!(session.pending(), None);
}

#[test]
fn test_reconnect_after_backoff() {
    let mut session = active(60);
    session.on_transport_disconnected();
    assert_eq!(session.state(), ConnectionState::ReconnectRequested);
    assert_eq!(session.handler().disconnected, 1);

    for _ in 0..5 {
        session.tick();
        assert_eq!(session.state(), ConnectionState::ReconnectRequested);
    }
    assert_eq!(session.transport().opens.len(), 1);

    session.tick();
    assert_eq!(session.state(), ConnectionState::Connecting);
    assert_eq!(session.transport().opens.len(), 2);

    session.on_transport_connected();
    session.on_send_complete();
    session.on_received(&CONNACK);
    assert_eq!(session.state(), ConnectionState::Active);
    assert_eq!(session.handler().connected, 2);
}

#[test]
fn test_open_failure_retries_later() {
    let mut session = configured(60);
    session.transport_mut().fail_open = true;
    session.connect().unwrap();
    assert_eq!(session.state(), ConnectionState::ReconnectRequested);
    assert_eq!(session.handler().disconnected, 0);

    session.transport_mut().fail_open = false;
    for _ in 0..6 {
        session.tick();
    }
    assert_eq!(session.state(), ConnectionState::Connecting);
    assert_eq!(session.transport().opens.len(), 1);
}

#[test]
fn test_refused_connack_forces_disconnect() {
    let mut session = configured(60);
    session.connect().unwrap();
    session.on_transport_connected();
    session.on_received(&[0x20, 0x02, 0x00, 0x04]);

    assert_eq!(session.state(), ConnectionState::ReconnectRequested);
    assert_eq!(session.handler().connected, 0);
    assert_eq!(session.handler().disconnected, 1);
    assert_eq!(session.transport().outstanding(), 0);
}

#[test]
fn test_connect_timeout_tears_down_once() {
    let mut session = configured(60);
    session.connect().unwrap();
    for _ in 0..20 {
        session.tick();
        assert_eq!(session.state(), ConnectionState::Connecting);
    }
    session.tick();
    assert_eq!(session.state(), ConnectionState::ConnectFailed);
    assert_eq!(session.handler().errors, 1);
    assert!(!session.ticker().running);
    assert_eq!(session.transport().outstanding(), 0);

    for _ in 0..10 {
        session.tick();
    }
    assert_eq!(session.handler().errors, 1);
    assert_eq!(session.connect(), Err(Error::NotInitialized));
}

#[test]
fn test_missing_connack_times_out() {
    let mut session = configured(60);
    session.connect().unwrap();
    session.on_transport_connected();
    for _ in 0..21 {
        session.tick();
    }
    assert_eq!(session.state(), ConnectionState::ConnectFailed);
    assert_eq!(session.handler().errors, 1);
}

#[test]
fn test_unresolvable_host_waits_for_timeout() {
    let mut session = configured(60);
    session.init_connection("broker.invalid", 1883, false).unwrap();
    session.connect().unwrap();
    assert_eq!(session.state(), ConnectionState::Connecting);
    assert!(session.transport().opens.is_empty());

    for _ in 0..21 {
        session.tick();
    }
    assert_eq!(session.handler().errors, 1);
}

#[test]
fn test_disconnect_is_idempotent() {
    let mut session = active(0);
    session.disconnect();
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(session.transport().last_sent(), &[0xE0, 0x00]);
    assert!(!session.ticker().running);
    let sent = session.transport().sent.len();
    let closed = session.transport().disconnects;

    session.disconnect();
    assert_eq!(session.transport().sent.len(), sent);
    assert_eq!(session.transport().disconnects, closed);
    assert_eq!(session.handler().disconnected, 0);
}

#[test]
fn test_disconnect_mid_handshake() {
    let mut session = configured(60);
    session.connect().unwrap();
    session.on_transport_connected();
    session.disconnect();
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(session.transport().headers(), [0x10]);
    assert_eq!(session.transport().outstanding(), 0);
}

#[test]
fn test_events_on_closed_link_are_ignored() {
    let mut session = configured(60);
    session.on_received(&CONNACK);
    session.on_send_failed();
    session.on_transport_disconnected();
    session.on_send_complete();
    session.on_transport_connected();
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(session.handler().disconnected, 0);
    assert!(session.transport().sent.is_empty());
}

#[test]
fn test_bad_chunks_are_dropped_without_state_change() {
    let mut session = active(0);
    session.on_received(&[]);
    session.on_received(&[0u8; 300]);
    assert_eq!(session.state(), ConnectionState::Active);
    assert_eq!(session.buffered(), 0);

    session.on_received(&PINGRESP);
    assert_eq!(session.state(), ConnectionState::Active);
}

fn stream() -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend(inbound_publish("a/1", b"first", QoS::AtMostOnce, 0));
    bytes.extend(PINGRESP);
    bytes.extend(inbound_publish("a/2", &[0x5A; 150], QoS::AtLeastOnce, 9));
    bytes.extend([0xC0, 0x00]);
    bytes.extend(inbound_publish("a/3", b"", QoS::ExactlyOnce, 10));
    bytes.extend(inbound_publish("b", b"last", QoS::AtMostOnce, 0));
    bytes
}

fn partition(bytes: &[u8], rng: &mut StdRng) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    let mut at = 0;
    while at < bytes.len() {
        let len = rng.gen_range(1..=9).min(bytes.len() - at);
        chunks.push(bytes[at..at + len].to_vec());
        at += len;
    }
    chunks
}

#[test]
fn test_random_partitions_yield_identical_frames() {
    let bytes = stream();
    let mut whole: Reassembler<256> = Reassembler::new();
    let mut expected = Vec::new();
    whole.extend(&bytes).unwrap();
    whole.drain(|frame| expected.push(frame.to_vec())).unwrap();
    assert_eq!(expected.len(), 6);
    assert_eq!(expected.concat(), bytes);

    for seed in 0..64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut inbound: Reassembler<256> = Reassembler::new();
        let mut frames = Vec::new();
        for chunk in partition(&bytes, &mut rng) {
            inbound.extend(&chunk).unwrap();
            inbound.drain(|frame| frames.push(frame.to_vec())).unwrap();
        }
        assert_eq!(frames, expected, "seed {seed}");
        assert_eq!(inbound.buffered(), 0);
    }
}

#[test]
fn test_random_partitions_drive_session_identically() {
    let bytes = stream();
    let mut reference = active(0);
    reference.on_received(&bytes);
    assert_eq!(reference.handler().messages.len(), 4);

    for seed in 0..16 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut session = active(0);
        for chunk in partition(&bytes, &mut rng) {
            session.on_received(&chunk);
        }
        assert_eq!(session.handler().messages, reference.handler().messages);
        assert_eq!(session.transport().sent, reference.transport().sent);
        assert_eq!(session.queue().len(), reference.queue().len());
    }
}
