//! Caller-side keys: request encoding and response decoding.
//!
//! A [`Key`] is the caller's handle on one entry of a keyring. It knows
//! the entry's index, the width of the index prefix, and the link's
//! [`Format`], and from its type parameters the exact shape of the
//! argument record and the return value. Keys are plain `Copy` values;
//! constructing one costs nothing.
//!
//! Encoding a call produces the request payload: the index, then each
//! argument, gap-free, all under the shared format. Decoding a response
//! is the mirror image. The action registered at the same index of a
//! dispatcher built from the same keyring consumes exactly what the key
//! produces, so compatibility holds by construction.

use std::marker::PhantomData;

use bytes::{Bytes, BytesMut};
use ferrule_proto::{write_unsigned, Fields, Format, WireReturn};

use crate::io::{ByteSink, ByteSource, Result};

/// The caller-side handle on one keyring entry.
///
/// `Args` is the entry's argument record, `Ret` its return value. Both
/// are fixed by the keyring declaration; a key of the wrong shape for an
/// entry simply cannot be produced.
#[derive(Debug, Clone, Copy)]
pub struct Key<Args: Fields, Ret: WireReturn> {
    index: u64,
    index_width: usize,
    format: Format,
    _signature: PhantomData<fn(Args) -> Ret>,
}

impl<Args: Fields, Ret: WireReturn> Key<Args, Ret> {
    /// Build a key from its wire layout.
    ///
    /// Normally called by the code the `keyring!` macro generates, which
    /// is what guarantees the index is in range and the layout matches
    /// the dispatcher on the other side.
    #[must_use]
    pub const fn with_layout(index: u64, index_width: usize, format: Format) -> Self {
        Self { index, index_width, format, _signature: PhantomData }
    }

    /// The entry's position in its keyring.
    #[must_use]
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Width in bytes of the index prefix.
    #[must_use]
    pub fn index_width(&self) -> usize {
        self.index_width
    }

    /// The link's serialization policy.
    #[must_use]
    pub fn format(&self) -> Format {
        self.format
    }

    /// Total request payload length: index prefix plus packed arguments.
    #[must_use]
    pub fn payload_len(&self) -> usize {
        self.index_width + Args::SIZE
    }

    /// Response payload length; zero for a void return.
    #[must_use]
    pub fn response_len(&self) -> usize {
        Ret::SIZE
    }

    /// Serialize a call into a request payload.
    #[must_use]
    pub fn encode(&self, args: Args) -> Request {
        let mut bytes = BytesMut::zeroed(self.payload_len());
        write_unsigned(&mut bytes[..self.index_width], self.index, self.format.endianness);
        args.encode(&mut bytes[self.index_width..], self.format);
        Request { bytes: bytes.freeze() }
    }

    /// Serialize a call straight into a sink, one byte at a time.
    ///
    /// Produces exactly the bytes of [`encode`](Key::encode) without an
    /// intermediate buffer.
    pub fn write_to(&self, sink: &mut dyn ByteSink, args: Args) -> Result<()> {
        let mut prefix = [0u8; 8];
        write_unsigned(&mut prefix[..self.index_width], self.index, self.format.endianness);
        for &byte in &prefix[..self.index_width] {
            sink.put_byte(byte)?;
        }
        args.encode_with(&mut |byte| sink.put_byte(byte), self.format)
    }

    /// Parse a response payload of exactly [`response_len`](Key::response_len) bytes.
    pub fn decode_response(&self, bytes: &[u8]) -> Ret {
        Ret::decode(&bytes[..Ret::SIZE], self.format)
    }

    /// Parse a response by pulling bytes from a source.
    pub fn read_response(&self, source: &mut dyn ByteSource) -> Result<Ret> {
        Ret::decode_with(&mut || source.next_byte(), self.format)
    }
}

/// An encoded request payload: index bytes followed by argument bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    bytes: Bytes,
}

impl Request {
    /// The payload bytes in wire order.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload is empty (never the case for a real request).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Iterate over the payload bytes.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.bytes.iter().copied()
    }

    /// Give up the payload as shared bytes.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

impl AsRef<[u8]> for Request {
    fn as_ref(&self) -> &[u8] {
        self.bytes()
    }
}

#[cfg(test)]
mod tests {
    use ferrule_proto::{Endianness, SignedMode};

    use super::*;
    use crate::io::SliceSource;

    const LE: Format = Format::new(Endianness::Little, SignedMode::TwosComplement);
    const BE: Format = Format::new(Endianness::Big, SignedMode::TwosComplement);

    #[test]
    fn request_is_index_then_args() {
        let key: Key<(u16,), u16> = Key::with_layout(0, 1, LE);
        let request = key.encode((0x1234,));
        assert_eq!(request.bytes(), &[0x00, 0x34, 0x12]);
        assert_eq!(key.payload_len(), 3);
        assert_eq!(key.response_len(), 2);
    }

    #[test]
    fn big_endian_signed_request() {
        let key: Key<(i16,), i16> = Key::with_layout(0, 1, BE);
        let request = key.encode((-1,));
        assert_eq!(request.bytes(), &[0x00, 0xFF, 0xFF]);
    }

    #[test]
    fn wide_index_prefix() {
        let key: Key<(), ()> = Key::with_layout(0x0102, 2, LE);
        assert_eq!(key.encode(()).bytes(), &[0x02, 0x01]);

        let key: Key<(), ()> = Key::with_layout(0x0102, 2, BE);
        assert_eq!(key.encode(()).bytes(), &[0x01, 0x02]);
    }

    #[test]
    fn write_to_matches_encode() {
        let key: Key<(u8, [u8; 3]), ()> = Key::with_layout(5, 1, LE);
        let args = (9, [1, 2, 3]);

        let mut streamed = Vec::new();
        key.write_to(&mut streamed, args).unwrap();
        assert_eq!(streamed, key.encode(args).bytes());
    }

    #[test]
    fn response_round_trip() {
        let key: Key<(), i32> = Key::with_layout(1, 1, BE);
        let payload = [0xFF, 0xFF, 0xFF, 0x9C]; // -100
        assert_eq!(key.decode_response(&payload), -100);

        let mut source = SliceSource::new(&payload);
        assert_eq!(key.read_response(&mut source), Ok(-100));
    }

    #[test]
    fn void_response_is_empty() {
        let key: Key<(u8,), ()> = Key::with_layout(0, 1, LE);
        assert_eq!(key.response_len(), 0);
        key.decode_response(&[]);
    }
}
