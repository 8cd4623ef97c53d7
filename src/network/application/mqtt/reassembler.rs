//! Inbound byte-stream to frame reassembly.
//!
//! TCP delivers arbitrary slices of the broker's byte stream: a chunk may hold
//! part of a frame, exactly one frame, or several frames back to back. The
//! [`Reassembler`] accumulates chunks in a fixed-capacity buffer and hands out
//! every complete frame exactly once, keeping the unconsumed tail for the next
//! delivery.
//!
//! ```rust
//! use libmqtt::network::application::mqtt::Reassembler;
//!
//! let mut inbound: Reassembler<64> = Reassembler::new();
//! let mut frames = 0;
//!
//! // PINGRESP followed by the first half of a PUBACK
//! inbound.extend(&[0xD0, 0x00, 0x40, 0x02]).unwrap();
//! inbound.drain(|_frame| frames += 1).unwrap();
//! assert_eq!((frames, inbound.buffered()), (1, 2));
//!
//! inbound.extend(&[0x00, 0x07]).unwrap();
//! inbound.drain(|frame| {
//!     assert_eq!(frame, &[0x40, 0x02, 0x00, 0x07]);
//!     frames += 1;
//! }).unwrap();
//! assert_eq!((frames, inbound.buffered()), (2, 0));
//! ```

use crate::network::error::Error;
use heapless::Vec;

use super::codec;

/// Fixed-capacity inbound accumulation buffer.
///
/// Invariant: `buffered() <= N`. Any frame handed out by [`drain`](Self::drain)
/// starts at a frame boundary of the original stream.
#[derive(Debug, Default)]
pub struct Reassembler<const N: usize> {
    buf: Vec<u8, N>,
}

impl<const N: usize> Reassembler<N> {
    /// Create an empty reassembler.
    pub const fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Number of bytes received but not yet resolved into frames.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Total capacity of the accumulation buffer.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Discard everything buffered.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Append a delivered chunk.
    ///
    /// Empty chunks and chunks that would overflow the buffer are rejected with
    /// [`Error::BufferOverflow`] and leave the buffer untouched.
    pub fn extend(&mut self, chunk: &[u8]) -> Result<(), Error> {
        if chunk.is_empty() || chunk.len() > N - self.buf.len() {
            return Err(Error::BufferOverflow);
        }
        self.buf
            .extend_from_slice(chunk)
            .map_err(|_| Error::BufferOverflow)
    }

    /// Length of the complete frame at the start of the buffer, if one is
    /// available.
    ///
    /// Fails with [`Error::MalformedPacket`] if the length header is invalid and
    /// with [`Error::PacketTooLarge`] if the declared frame can never fit.
    pub fn complete_frame_len(&self) -> Result<Option<usize>, Error> {
        let Some(total) = codec::total_length(&self.buf)? else {
            return Ok(None);
        };
        if total > N {
            return Err(Error::PacketTooLarge);
        }
        if self.buf.len() < total {
            return Ok(None);
        }
        Ok(Some(total))
    }

    /// Hand every complete buffered frame to `on_frame`, in stream order, and
    /// keep the incomplete tail.
    ///
    /// Returns the number of frames handed out. On a framing error the buffer is
    /// cleared, since the stream position can no longer be trusted.
    pub fn drain<F>(&mut self, mut on_frame: F) -> Result<usize, Error>
    where
        F: FnMut(&[u8]),
    {
        let mut frames = 0;
        loop {
            let len = match self.complete_frame_len() {
                Ok(Some(len)) => len,
                Ok(None) => return Ok(frames),
                Err(e) => {
                    self.buf.clear();
                    return Err(e);
                }
            };
            on_frame(&self.buf[..len]);
            frames += 1;

            let remainder = self.buf.len() - len;
            if remainder == 0 {
                self.buf.clear();
                return Ok(frames);
            }
            self.buf.copy_within(len.., 0);
            self.buf.truncate(remainder);
        }
    }
}
