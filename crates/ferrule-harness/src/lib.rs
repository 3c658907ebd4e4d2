//! Deterministic test plumbing for the ferrule link.
//!
//! This crate provides in-memory implementations of the byte-stream
//! capabilities, enabling reproducible two-sided tests — a caller and a
//! dispatcher wired back to back — plus fault injection for exercising
//! transport-failure paths.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use std::collections::VecDeque;

use ferrule_core::{ByteSink, ByteSource, Error, Result};

/// An in-memory one-way byte stream: what one side writes, the other
/// side reads, in order.
///
/// Two of these back to back make a full duplex link: the caller writes
/// its request into the forward link and reads the response off the
/// reverse link, the dispatcher does the opposite.
///
/// Reading past the written bytes is a transport failure, the same
/// condition a real transport reports when its peer goes silent.
#[derive(Debug, Default)]
pub struct LoopbackLink {
    queue: VecDeque<u8>,
}

impl LoopbackLink {
    /// An empty link.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written but not yet read.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Whether everything written has been read.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.queue.is_empty()
    }
}

impl ByteSource for LoopbackLink {
    fn next_byte(&mut self) -> Result<u8> {
        self.queue
            .pop_front()
            .ok_or_else(|| Error::transport("reading from loopback link", "link is empty"))
    }
}

impl ByteSink for LoopbackLink {
    fn put_byte(&mut self, byte: u8) -> Result<()> {
        self.queue.push_back(byte);
        Ok(())
    }
}

/// A byte source that fails after a fixed number of bytes.
///
/// Used to exercise the transport-failure paths: the dispatcher should
/// surface the error untouched and keep whatever partial state it had.
#[derive(Debug)]
pub struct FlakySource<'a> {
    bytes: &'a [u8],
    pos: usize,
    fail_after: usize,
}

impl<'a> FlakySource<'a> {
    /// Yield the first `fail_after` bytes of `bytes`, then fail every
    /// call.
    #[must_use]
    pub fn new(bytes: &'a [u8], fail_after: usize) -> Self {
        Self { bytes, pos: 0, fail_after }
    }
}

impl ByteSource for FlakySource<'_> {
    fn next_byte(&mut self) -> Result<u8> {
        if self.pos >= self.fail_after {
            return Err(Error::transport("reading from flaky source", "injected fault"));
        }
        let byte = self
            .bytes
            .get(self.pos)
            .copied()
            .ok_or_else(|| Error::transport("reading from flaky source", "source exhausted"))?;
        self.pos += 1;
        Ok(byte)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_preserves_order() {
        let mut link = LoopbackLink::new();
        for byte in [1u8, 2, 3] {
            link.put_byte(byte).unwrap();
        }
        assert_eq!(link.pending(), 3);
        assert_eq!(link.next_byte(), Ok(1));
        assert_eq!(link.next_byte(), Ok(2));
        assert_eq!(link.next_byte(), Ok(3));
        assert!(link.is_drained());
        assert!(link.next_byte().is_err());
    }

    #[test]
    fn flaky_source_fails_on_schedule() {
        let mut source = FlakySource::new(&[9, 8, 7], 2);
        assert_eq!(source.next_byte(), Ok(9));
        assert_eq!(source.next_byte(), Ok(8));
        assert!(source.next_byte().is_err());
        assert!(source.next_byte().is_err());
    }
}
