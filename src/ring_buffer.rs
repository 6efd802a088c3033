// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-capacity circular buffer for inbound and outbound I/O.
//!
//! `RingBuffer` never reallocates once created: it is sized once (see
//! [`crate::config::IO_BUFFER_CAPACITY`]) and wraps in place. A mark/reset
//! pair lets the message parser speculatively consume bytes and roll back if
//! a full frame isn't available yet.

use crate::error::{Error, Result};
use std::io::{self, Read, Write};

/// A fixed-capacity circular byte buffer.
///
/// Data lives in `[position, position + size)` modulo `capacity`. Reads
/// advance `position`; writes extend `size`. When the live region would wrap
/// and a contiguous span is needed, [`RingBuffer::realign`] relocates it to
/// start at offset 0.
pub struct RingBuffer {
    buf: Vec<u8>,
    capacity: usize,
    position: usize,
    size: usize,
    marked_position: usize,
    marked_size: usize,
}

impl RingBuffer {
    /// Create an empty buffer with the given capacity.
    pub fn new(capacity: usize) -> Self {
        RingBuffer {
            buf: vec![0u8; capacity],
            capacity,
            position: 0,
            size: 0,
            marked_position: 0,
            marked_size: 0,
        }
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of bytes currently stored.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Bytes free for writing (`capacity - size`).
    pub fn remaining_capacity(&self) -> usize {
        self.capacity - self.size
    }

    /// Discard all stored data.
    pub fn empty(&mut self) {
        self.position = 0;
        self.size = 0;
    }

    fn tail_pos(&self) -> usize {
        (self.position + self.size) % self.capacity
    }

    /// Bytes readable in one contiguous span starting at `position`, without
    /// realigning.
    fn readable_len(&self) -> usize {
        let tail = self.tail_pos();
        if tail >= self.position {
            self.size
        } else {
            self.capacity - self.position
        }
    }

    /// Bytes writable in one contiguous span starting at the tail, without
    /// realigning.
    fn writable_len(&self) -> usize {
        let tail = self.tail_pos();
        if tail >= self.position {
            self.capacity - tail
        } else {
            self.position - tail
        }
    }

    /// Relocate the live region so it starts at offset 0, making the whole
    /// live span contiguous. Uses an in-place shift when the data hasn't
    /// wrapped, or a scratch copy when it has.
    fn realign(&mut self) {
        let tail = self.tail_pos();
        if tail >= self.position {
            self.buf.copy_within(self.position..self.position + self.size, 0);
        } else {
            let readable = self.readable_len();
            let mut scratch = vec![0u8; self.capacity];
            scratch[..readable].copy_from_slice(&self.buf[self.position..self.position + readable]);
            scratch[readable..readable + tail].copy_from_slice(&self.buf[..tail]);
            self.buf = scratch;
        }
        self.position = 0;
    }

    /// True if at least `len` bytes are available to read as one contiguous
    /// span, realigning first if necessary.
    pub fn can_read(&mut self, len: usize) -> bool {
        if self.size < len {
            return false;
        }
        if self.readable_len() < len {
            self.realign();
        }
        true
    }

    /// True if at least `len` bytes of contiguous space are free to write,
    /// realigning first if necessary.
    pub fn can_write(&mut self, len: usize) -> bool {
        if self.remaining_capacity() < len {
            return false;
        }
        if self.writable_len() < len {
            self.realign();
        }
        true
    }

    /// A read-only view of the readable span at `position`. Call
    /// [`RingBuffer::can_read`] first to guarantee this span is at least as
    /// long as you need.
    pub fn head(&self) -> &[u8] {
        &self.buf[self.position..self.position + self.readable_len()]
    }

    /// A mutable view of the writable span at the tail. Call
    /// [`RingBuffer::can_write`] first to guarantee this span is at least as
    /// long as you need.
    pub fn tail_mut(&mut self) -> &mut [u8] {
        let tail = self.tail_pos();
        let len = self.writable_len();
        &mut self.buf[tail..tail + len]
    }

    /// Advance `position` past `len` consumed bytes.
    ///
    /// # Errors
    /// Returns `Err` if `len` exceeds the current contiguous readable span.
    pub fn read_update(&mut self, len: usize) -> Result<()> {
        if len > self.readable_len() {
            return Err(Error::NoBufferSpace);
        }
        self.position = (self.position + len) % self.capacity;
        self.size -= len;
        if self.size == 0 {
            self.position = 0;
        }
        Ok(())
    }

    /// Extend `size` past `len` newly written bytes.
    ///
    /// # Errors
    /// Returns `Err` if `len` exceeds the current contiguous writable span.
    pub fn write_update(&mut self, len: usize) -> Result<()> {
        if len > self.writable_len() {
            return Err(Error::NoBufferSpace);
        }
        self.size += len;
        Ok(())
    }

    /// Copy `data` into the buffer's writable span and advance `size`.
    ///
    /// # Errors
    /// Returns `Err` if `data` does not fit in one contiguous writable span
    /// even after realigning.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if !self.can_write(data.len()) {
            return Err(Error::NoBufferSpace);
        }
        self.tail_mut()[..data.len()].copy_from_slice(data);
        self.write_update(data.len())
    }

    /// Copy up to `out.len()` readable bytes into `out`, consuming them.
    /// Returns the number of bytes copied.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let avail = self.size.min(out.len());
        if avail == 0 {
            return 0;
        }
        self.can_read(avail);
        out[..avail].copy_from_slice(&self.head()[..avail]);
        let _ = self.read_update(avail);
        avail
    }

    /// Save the current read position so a speculative parse can roll back
    /// with [`RingBuffer::reset`]. A second `mark()` overwrites the first -
    /// there is no stack of marks.
    pub fn mark(&mut self) {
        self.marked_position = self.position;
        self.marked_size = self.size;
    }

    /// Roll the read position back to the last [`RingBuffer::mark`].
    pub fn reset(&mut self) {
        self.position = self.marked_position;
        self.size = self.marked_size;
    }

    /// Read as many bytes as available (up to [`crate::config::READ_BLOCK`])
    /// from a non-blocking source into the buffer's writable span.
    ///
    /// Returns `Ok(0)` on a clean EOF (peer closed the write side), the
    /// number of bytes read otherwise, or `Err` for anything other than
    /// `WouldBlock`/`Interrupted` (which the caller should treat as "no data
    /// right now" and "retry", respectively).
    pub fn read_from<R: Read>(&mut self, source: &mut R, max: usize) -> io::Result<usize> {
        let want = max.min(self.remaining_capacity());
        if want == 0 || !self.can_write(want) {
            return Ok(0);
        }
        match source.read(&mut self.tail_mut()[..want]) {
            Ok(n) => {
                let _ = self.write_update(n);
                Ok(n)
            }
            Err(e) => Err(e),
        }
    }

    /// Write up to `max` readable bytes to a non-blocking sink.
    pub fn write_to<W: Write>(&mut self, sink: &mut W, max: usize) -> io::Result<usize> {
        let want = max.min(self.size);
        if want == 0 || !self.can_read(want) {
            return Ok(0);
        }
        match sink.write(&self.head()[..want]) {
            Ok(n) => {
                let _ = self.read_update(n);
                Ok(n)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn write_then_read_round_trips() {
        let mut rb = RingBuffer::new(16);
        rb.write(b"hello").unwrap();
        assert_eq!(rb.size(), 5);
        let mut out = [0u8; 5];
        assert_eq!(rb.read(&mut out), 5);
        assert_eq!(&out, b"hello");
        assert_eq!(rb.size(), 0);
    }

    #[test]
    fn wrap_around_realigns_on_can_read() {
        let mut rb = RingBuffer::new(8);
        rb.write(b"123456").unwrap();
        let mut out = [0u8; 4];
        rb.read(&mut out);
        assert_eq!(&out, b"1234");
        rb.write(b"ab").unwrap(); // wraps: position=4, size=2+2=4, tail wraps to 0..2
        assert!(rb.can_read(4));
        let mut out2 = [0u8; 4];
        let n = rb.read(&mut out2);
        assert_eq!(n, 4);
        assert_eq!(&out2, b"56ab");
    }

    #[test]
    fn can_write_fails_when_full() {
        let mut rb = RingBuffer::new(4);
        rb.write(b"abcd").unwrap();
        assert!(!rb.can_write(1));
        assert!(rb.write(b"e").is_err());
    }

    #[test]
    fn mark_and_reset_roll_back_a_speculative_read() {
        let mut rb = RingBuffer::new(16);
        rb.write(b"header+body").unwrap();
        rb.mark();
        let mut discard = [0u8; 6];
        rb.read(&mut discard);
        assert_eq!(rb.size(), 5);
        rb.reset();
        assert_eq!(rb.size(), 11);
        let mut out = [0u8; 11];
        rb.read(&mut out);
        assert_eq!(&out, b"header+body");
    }

    #[test]
    fn reading_more_than_available_truncates() {
        let mut rb = RingBuffer::new(8);
        rb.write(b"ab").unwrap();
        let mut out = [0u8; 8];
        assert_eq!(rb.read(&mut out), 2);
    }

    #[test]
    fn read_from_stops_at_eof() {
        let mut rb = RingBuffer::new(16);
        let mut src = Cursor::new(b"data".to_vec());
        let n = rb.read_from(&mut src, 1024).unwrap();
        assert_eq!(n, 4);
        let n2 = rb.read_from(&mut src, 1024).unwrap();
        assert_eq!(n2, 0);
    }

    #[test]
    fn write_to_drains_into_a_sink() {
        let mut rb = RingBuffer::new(16);
        rb.write(b"payload").unwrap();
        let mut sink = Vec::new();
        let n = rb.write_to(&mut sink, 1024).unwrap();
        assert_eq!(n, 7);
        assert_eq!(sink, b"payload");
        assert_eq!(rb.size(), 0);
    }
}
