//! Keepalive and reconnect supervision.
//!
//! The [`Supervisor`] owns the tick counters and the send-timeout countdown. It
//! is advanced once per ticker period and answers with a [`Verdict`]; the
//! session turns verdicts into packets and state transitions.

use super::config::Timing;
use super::session::ConnectionState;

/// Action requested by one supervisor tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Verdict {
    /// Nothing due.
    Idle,
    /// The keepalive interval elapsed: send a PINGREQ.
    Ping {
        /// No PINGRESP arrived since the previous ping.
        missed_heartbeat: bool,
    },
    /// The reconnect backoff elapsed.
    Reconnect,
    /// The connect attempt ran out of time.
    ConnectTimedOut,
}

/// Tick counters and send pacing for one session.
#[derive(Debug, Clone)]
pub struct Supervisor {
    timing: Timing,
    keepalive_tick: u32,
    reconnect_tick: u32,
    connect_tick: u32,
    send_countdown: u8,
    heartbeat: bool,
}

impl Supervisor {
    /// Create a supervisor with the given timing.
    pub fn new(timing: Timing) -> Self {
        Self {
            timing,
            keepalive_tick: 0,
            reconnect_tick: 0,
            connect_tick: 0,
            send_countdown: 0,
            heartbeat: true,
        }
    }

    /// Timing currently in use.
    pub fn timing(&self) -> Timing {
        self.timing
    }

    /// Replace the timing. Counters keep running.
    pub fn set_timing(&mut self, timing: Timing) {
        self.timing = timing;
    }

    /// Zero every counter, as at the start of a connect attempt.
    pub fn reset(&mut self) {
        self.keepalive_tick = 0;
        self.reconnect_tick = 0;
        self.connect_tick = 0;
        self.send_countdown = 0;
        self.heartbeat = true;
    }

    /// Restart the reconnect backoff.
    pub fn begin_backoff(&mut self) {
        self.reconnect_tick = 0;
    }

    /// Advance the counter that applies to `state`.
    ///
    /// `keepalive` is the interval in ticks, as given by
    /// [`Timing::keepalive_ticks`]; 0 disables pings.
    pub fn tick(&mut self, state: ConnectionState, keepalive: u32) -> Verdict {
        match state {
            ConnectionState::Active if keepalive > 0 => {
                self.keepalive_tick += 1;
                if self.keepalive_tick <= keepalive {
                    return Verdict::Idle;
                }
                let missed_heartbeat = !self.heartbeat;
                self.keepalive_tick = 0;
                self.heartbeat = false;
                Verdict::Ping { missed_heartbeat }
            }
            ConnectionState::ReconnectRequested => {
                self.reconnect_tick += 1;
                if self.reconnect_tick <= u32::from(self.timing.reconnect_timeout) {
                    return Verdict::Idle;
                }
                self.reconnect_tick = 0;
                Verdict::Reconnect
            }
            ConnectionState::Connecting | ConnectionState::HandshakeSent => {
                self.connect_tick = self.connect_tick.saturating_add(1);
                if self.connect_tick <= u32::from(self.timing.connect_timeout) {
                    return Verdict::Idle;
                }
                Verdict::ConnectTimedOut
            }
            _ => Verdict::Idle,
        }
    }

    /// Step the send-timeout countdown toward zero.
    pub fn countdown(&mut self) {
        self.send_countdown = self.send_countdown.saturating_sub(1);
    }

    /// A send was handed to the transport.
    pub fn arm_send(&mut self) {
        self.send_countdown = self.timing.send_timeout;
    }

    /// The transport finished the outstanding send.
    pub fn send_done(&mut self) {
        self.send_countdown = 0;
    }

    /// Whether no send is outstanding.
    pub fn can_send(&self) -> bool {
        self.send_countdown == 0
    }

    /// Record inbound keepalive traffic.
    pub fn heartbeat(&mut self) {
        self.heartbeat = true;
    }
}
