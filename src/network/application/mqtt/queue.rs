//! Bounded outbound packet queue.
//!
//! Packets waiting for the wire are stored back to back in a byte ring, each
//! prefixed with its length as a big-endian `u16`. An entry of `n` bytes
//! therefore occupies `n + 2` bytes of the `N`-byte capacity. A full queue
//! rejects new entries instead of growing.
//!
//! ```rust
//! use heapless::Vec;
//! use libmqtt::network::application::mqtt::OutboundQueue;
//! use libmqtt::network::error::Error;
//!
//! let mut queue: OutboundQueue<8> = OutboundQueue::new();
//! queue.push(&[0xC0, 0x00]).unwrap();
//! queue.push(&[0xE0, 0x00]).unwrap();
//! assert_eq!(queue.push(&[0xD0, 0x00]), Err(Error::QueueFull));
//!
//! let mut out: Vec<u8, 16> = Vec::new();
//! assert_eq!(queue.pop(&mut out), Some(2));
//! assert_eq!(&out[..], &[0xC0, 0x00]);
//! ```

use crate::network::error::Error;
use heapless::{Deque, Vec};

/// Bytes used by each entry's length prefix.
const PREFIX_LEN: usize = 2;

/// FIFO of length-prefixed packets in an `N`-byte ring.
#[derive(Debug, Default)]
pub struct OutboundQueue<const N: usize> {
    ring: Deque<u8, N>,
    entries: usize,
}

impl<const N: usize> OutboundQueue<N> {
    /// Create an empty queue.
    pub const fn new() -> Self {
        Self {
            ring: Deque::new(),
            entries: 0,
        }
    }

    /// Whether no entry is queued.
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Number of queued entries.
    pub fn len(&self) -> usize {
        self.entries
    }

    /// Bytes occupied, length prefixes included.
    pub fn used(&self) -> usize {
        self.ring.len()
    }

    /// Total capacity in bytes.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Drop every queued entry.
    pub fn clear(&mut self) {
        self.ring.clear();
        self.entries = 0;
    }

    /// Append one packet.
    ///
    /// Fails with [`Error::QueueFull`] when fewer than `bytes.len() + 2` bytes
    /// are free, and with [`Error::PacketTooLarge`] when the packet cannot be
    /// described by the length prefix.
    pub fn push(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let len = u16::try_from(bytes.len()).map_err(|_| Error::PacketTooLarge)?;
        if N - self.ring.len() < bytes.len() + PREFIX_LEN {
            return Err(Error::QueueFull);
        }
        for byte in len.to_be_bytes().iter().chain(bytes) {
            self.ring.push_back(*byte).map_err(|_| Error::QueueFull)?;
        }
        self.entries += 1;
        Ok(())
    }

    /// Append one packet, evicting the oldest entries until it fits.
    ///
    /// Fails with [`Error::SeriousBufferError`] if the packet still does not fit
    /// once the queue has been emptied.
    pub fn push_evicting(&mut self, bytes: &[u8]) -> Result<(), Error> {
        loop {
            match self.push(bytes) {
                Err(Error::QueueFull) => {
                    warn!("queue full ({}/{} bytes), evicting oldest entry", self.used(), N);
                    if !self.discard_oldest() {
                        error!("packet of {} bytes cannot fit the queue", bytes.len());
                        return Err(Error::SeriousBufferError);
                    }
                }
                result => return result,
            }
        }
    }

    /// Move the oldest entry into `out`, replacing its contents.
    ///
    /// Returns the entry length, or `None` if the queue is empty. An entry that
    /// does not fit `out` is discarded whole and `None` is returned, so no
    /// packet is ever handed out truncated.
    pub fn pop<const M: usize>(&mut self, out: &mut Vec<u8, M>) -> Option<usize> {
        let len = self.take_prefix()?;
        out.clear();
        let mut fits = true;
        for _ in 0..len {
            let byte = self.ring.pop_front()?;
            if fits && out.push(byte).is_err() {
                fits = false;
            }
        }
        if !fits {
            warn!("dropping {} byte entry larger than the send buffer", len);
            out.clear();
            return None;
        }
        Some(len)
    }

    /// Drop the oldest entry. Returns `false` if the queue was empty.
    pub fn discard_oldest(&mut self) -> bool {
        let Some(len) = self.take_prefix() else {
            return false;
        };
        for _ in 0..len {
            self.ring.pop_front();
        }
        true
    }

    fn take_prefix(&mut self) -> Option<usize> {
        if self.entries == 0 {
            return None;
        }
        let hi = self.ring.pop_front()?;
        let lo = self.ring.pop_front()?;
        self.entries -= 1;
        Some(u16::from_be_bytes([hi, lo]) as usize)
    }
}
