//! Application-facing session events.
//!
//! A session reports everything that happens on the event path through an
//! [`EventHandler`]. Implement the trait directly for stateful handlers, or use
//! [`Callbacks`] to register plain functions one event at a time:
//!
//! ```rust
//! use libmqtt::network::application::mqtt::{Callbacks, EventHandler};
//!
//! fn connected() {}
//! fn data(_topic: &str, _payload: &[u8]) {}
//!
//! let mut callbacks = Callbacks::new().with_connected(connected).with_data(data);
//! callbacks.on_data_received("cmd/led", b"on");
//! ```

/// Receiver for session events.
///
/// Every method has an empty default, so implementors only override the events
/// they care about. Handlers run synchronously on the thread that drives the
/// session.
pub trait EventHandler {
    /// CONNACK accepted; the session is in the data phase.
    fn on_connected(&mut self) {}

    /// The transport dropped or a send failed; a reconnect is pending.
    fn on_disconnected(&mut self) {}

    /// A PUBLISH packet finished transmitting.
    fn on_published(&mut self) {}

    /// A PUBLISH arrived from the broker.
    fn on_data_received(&mut self, _topic: &str, _payload: &[u8]) {}

    /// The connect attempt timed out and the session was torn down.
    fn on_error(&mut self) {}
}

impl EventHandler for () {}

/// Function called for connection lifecycle events.
pub type Callback = fn();

/// Function called with the topic and payload of an inbound PUBLISH.
pub type DataCallback = fn(&str, &[u8]);

/// An [`EventHandler`] built from optional plain function pointers.
#[derive(Debug, Default, Clone, Copy)]
pub struct Callbacks {
    connected: Option<Callback>,
    disconnected: Option<Callback>,
    published: Option<Callback>,
    data: Option<DataCallback>,
    error: Option<Callback>,
}

impl Callbacks {
    /// Create a set with no callbacks registered.
    pub const fn new() -> Self {
        Self {
            connected: None,
            disconnected: None,
            published: None,
            data: None,
            error: None,
        }
    }

    /// Register the connected callback.
    pub fn with_connected(mut self, callback: Callback) -> Self {
        self.connected = Some(callback);
        self
    }

    /// Register the disconnected callback.
    pub fn with_disconnected(mut self, callback: Callback) -> Self {
        self.disconnected = Some(callback);
        self
    }

    /// Register the published callback.
    pub fn with_published(mut self, callback: Callback) -> Self {
        self.published = Some(callback);
        self
    }

    /// Register the data callback.
    pub fn with_data(mut self, callback: DataCallback) -> Self {
        self.data = Some(callback);
        self
    }

    /// Register the error callback.
    pub fn with_error(mut self, callback: Callback) -> Self {
        self.error = Some(callback);
        self
    }
}

impl EventHandler for Callbacks {
    fn on_connected(&mut self) {
        if let Some(callback) = self.connected {
            callback();
        }
    }

    fn on_disconnected(&mut self) {
        if let Some(callback) = self.disconnected {
            callback();
        }
    }

    fn on_published(&mut self) {
        if let Some(callback) = self.published {
            callback();
        }
    }

    fn on_data_received(&mut self, topic: &str, payload: &[u8]) {
        if let Some(callback) = self.data {
            callback(topic, payload);
        }
    }

    fn on_error(&mut self) {
        if let Some(callback) = self.error {
            callback();
        }
    }
}
