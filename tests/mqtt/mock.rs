use core::net::SocketAddr;

use libmqtt::network::application::mqtt::{EventHandler, Session};
use libmqtt::network::{Ticker, Transport};

/// Records every request the session makes of the transport.
#[derive(Debug, Default)]
pub struct MockTransport {
    pub opens: Vec<SocketAddr>,
    pub sent: Vec<Vec<u8>>,
    pub disconnects: usize,
    pub fail_open: bool,
    pub fail_send: bool,
}

impl MockTransport {
    /// Connection attempts still outstanding (opened and not yet closed).
    pub fn outstanding(&self) -> usize {
        self.opens.len() - self.disconnects
    }

    /// First byte of every packet sent, in order.
    pub fn headers(&self) -> Vec<u8> {
        self.sent.iter().map(|packet| packet[0]).collect()
    }

    pub fn last_sent(&self) -> &[u8] {
        self.sent.last().map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Transport for MockTransport {
    type Error = ();

    fn open(&mut self, remote: SocketAddr, _secure: bool, _timeout_secs: u8) -> Result<(), ()> {
        if self.fail_open {
            return Err(());
        }
        self.opens.push(remote);
        Ok(())
    }

    fn send(&mut self, bytes: &[u8], _timeout_secs: u8) -> Result<(), ()> {
        if self.fail_send {
            return Err(());
        }
        self.sent.push(bytes.to_vec());
        Ok(())
    }

    fn disconnect(&mut self) {
        self.disconnects += 1;
    }
}

#[derive(Debug, Default)]
pub struct MockTicker {
    pub running: bool,
    pub period_ms: u32,
    pub starts: usize,
}

impl Ticker for MockTicker {
    fn start(&mut self, period_ms: u32) {
        self.running = true;
        self.period_ms = period_ms;
        self.starts += 1;
    }

    fn stop(&mut self) {
        self.running = false;
    }
}

/// Counts every event and keeps every delivered message.
#[derive(Debug, Default)]
pub struct Recorder {
    pub connected: usize,
    pub disconnected: usize,
    pub published: usize,
    pub errors: usize,
    pub messages: Vec<(String, Vec<u8>)>,
}

impl EventHandler for Recorder {
    fn on_connected(&mut self) {
        self.connected += 1;
    }

    fn on_disconnected(&mut self) {
        self.disconnected += 1;
    }

    fn on_published(&mut self) {
        self.published += 1;
    }

    fn on_data_received(&mut self, topic: &str, payload: &[u8]) {
        self.messages.push((topic.to_string(), payload.to_vec()));
    }

    fn on_error(&mut self) {
        self.errors += 1;
    }
}

pub type TestSession = Session<MockTransport, MockTicker, Recorder, 256, 256>;

pub const CONNACK: [u8; 4] = [0x20, 0x02, 0x00, 0x00];
pub const PINGRESP: [u8; 2] = [0xD0, 0x00];

/// A configured session that has not started connecting.
pub fn configured(keepalive: u16) -> TestSession {
    let mut session = TestSession::new(
        MockTransport::default(),
        MockTicker::default(),
        Recorder::default(),
    );
    session.init_connection("192.0.2.10", 1883, false).unwrap();
    session
        .init_client("test-client", "", "", keepalive, true)
        .unwrap();
    session
}

/// A session that completed the handshake and has nothing in flight.
pub fn active(keepalive: u16) -> TestSession {
    let mut session = configured(keepalive);
    session.connect().unwrap();
    session.on_transport_connected();
    session.on_send_complete();
    session.on_received(&CONNACK);
    session
}
