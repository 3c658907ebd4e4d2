//! Byte-at-a-time dispatching behind owned (or borrowed) buffers.
//!
//! A plain [`Dispatcher`] wants the whole request available the moment
//! it runs. A [`BufferedDispatcher`] instead accepts the request one
//! byte at a time — the shape of an interrupt handler or a polling loop
//! feeding it off a UART — and buffers the response until the caller
//! drains it.
//!
//! # State machine
//!
//! Letting `M` be the index-prefix width:
//!
//! ```text
//!                put(byte), load_count > 1
//!      ┌──────────────────────────────┐
//!      ▼                              │
//!   READ_INDEX ── last index byte ──► (decode index)
//!      │                                     │
//!      │                                     ├── index ≥ N  → reset both buffers → Dropped
//!      │                                     ├── input size 0 → run action → Resolved
//!      │                                     └── otherwise  → READ_PAYLOAD
//!      ▼
//!   READ_PAYLOAD ── last payload byte ──► run action, reset input → Resolved
//! ```
//!
//! Every `put` stores its byte and decrements `load_count`; the machine
//! only advances when the count hits zero. After `Resolved` the input
//! buffer is empty and the next byte starts a fresh index prefix; the
//! output buffer holds the response until drained with [`get`] or
//! [`drain_into`]. After `Dropped` both buffers are back to their
//! initial state and the stream is re-synchronized on the next byte.
//!
//! [`get`]: BufferedDispatcher::get
//! [`drain_into`]: BufferedDispatcher::drain_into

use crate::action::{Action, Dispatch, WeakAction};
use crate::dispatcher::Dispatcher;
use crate::io::{ByteSink, ByteSource, Channel, Result};
use crate::key::Key;
use ferrule_proto::{read_unsigned, Fields, WireReturn};

/// Externally observable outcome of feeding one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketStatus {
    /// More bytes are needed to complete the current phase.
    Loading,
    /// A complete request was consumed, its action ran, and the response
    /// sits in the output buffer.
    Resolved,
    /// The decoded index was out of range; both buffers were reset and
    /// no action ran.
    Dropped,
}

/// Storage behind a buffered dispatcher.
///
/// The input view receives request bytes; the output view receives the
/// response. A single-buffer layout returns the same array for both,
/// which works because an action consumes all of its input before it
/// produces any output — but it does oblige the caller to drain the
/// output before the next request completes.
pub trait PacketBuffers {
    /// The request-side buffer.
    fn input(&mut self) -> &mut [u8];

    /// The response-side buffer.
    fn output(&mut self) -> &mut [u8];
}

/// One owned array shared by input and output.
#[derive(Debug)]
pub struct SingleBuffer<const LEN: usize> {
    buf: [u8; LEN],
}

impl<const LEN: usize> SingleBuffer<LEN> {
    /// A zeroed buffer.
    #[must_use]
    pub fn new() -> Self {
        Self { buf: [0; LEN] }
    }
}

impl<const LEN: usize> Default for SingleBuffer<LEN> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const LEN: usize> PacketBuffers for SingleBuffer<LEN> {
    fn input(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    fn output(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

/// Separate owned arrays for input and output.
#[derive(Debug)]
pub struct DoubleBuffer<const IN: usize, const OUT: usize> {
    ibuf: [u8; IN],
    obuf: [u8; OUT],
}

impl<const IN: usize, const OUT: usize> DoubleBuffer<IN, OUT> {
    /// Zeroed buffers.
    #[must_use]
    pub fn new() -> Self {
        Self { ibuf: [0; IN], obuf: [0; OUT] }
    }
}

impl<const IN: usize, const OUT: usize> Default for DoubleBuffer<IN, OUT> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const IN: usize, const OUT: usize> PacketBuffers for DoubleBuffer<IN, OUT> {
    fn input(&mut self) -> &mut [u8] {
        &mut self.ibuf
    }

    fn output(&mut self) -> &mut [u8] {
        &mut self.obuf
    }
}

/// Caller-provided buffers, for when the storage lives elsewhere (a DMA
/// region, a static, a bigger arena).
#[derive(Debug)]
pub struct BorrowedBuffers<'a> {
    input: &'a mut [u8],
    output: &'a mut [u8],
}

impl<'a> BorrowedBuffers<'a> {
    /// Borrow distinct input and output slices.
    #[must_use]
    pub fn new(input: &'a mut [u8], output: &'a mut [u8]) -> Self {
        Self { input, output }
    }
}

impl PacketBuffers for BorrowedBuffers<'_> {
    fn input(&mut self) -> &mut [u8] {
        &mut *self.input
    }

    fn output(&mut self) -> &mut [u8] {
        &mut *self.output
    }
}

/// A [`Channel`] over the dispatcher's own buffers: the action reads the
/// payload back out of the input buffer and writes its response into
/// the output buffer. Infallible by construction — capacities are
/// checked when the dispatcher is built.
struct BufferChannel<'a, B: PacketBuffers> {
    buffers: &'a mut B,
    read: usize,
    written: usize,
}

impl<B: PacketBuffers> Channel for BufferChannel<'_, B> {
    fn recv_byte(&mut self) -> Result<u8> {
        let byte = self.buffers.input()[self.read];
        self.read += 1;
        Ok(byte)
    }

    fn send_byte(&mut self, byte: u8) -> Result<()> {
        self.buffers.output()[self.written] = byte;
        self.written += 1;
        Ok(())
    }
}

/// A dispatcher wrapped in input/output buffers and a byte-at-a-time
/// state machine.
///
/// Usually constructed through the `single_buffered` / `double_buffered`
/// helpers a `keyring!` declaration generates, which size the buffers
/// from the ring's largest request and response.
#[derive(Debug)]
pub struct BufferedDispatcher<A, const N: usize, B> {
    dispatcher: Dispatcher<A, N>,
    buffers: B,
    index_loaded: bool,
    load_count: usize,
    ibuf_next: usize,
    obuf_next: usize,
    obuf_bottom: usize,
}

/// A buffered dispatcher over one shared buffer.
pub type SingleBuffered<A, const N: usize, const LEN: usize> =
    BufferedDispatcher<A, N, SingleBuffer<LEN>>;

/// A buffered dispatcher over separate request and response buffers.
pub type DoubleBuffered<A, const N: usize, const IN: usize, const OUT: usize> =
    BufferedDispatcher<A, N, DoubleBuffer<IN, OUT>>;

impl<A: Dispatch, const N: usize, B: PacketBuffers> BufferedDispatcher<A, N, B> {
    /// Wrap `dispatcher` behind `buffers`.
    ///
    /// # Panics
    ///
    /// Panics if a buffer is too small for the dispatcher's largest
    /// request or response; with ring-generated constructors this cannot
    /// happen.
    #[must_use]
    pub fn new(dispatcher: Dispatcher<A, N>, mut buffers: B) -> Self {
        let needed_input = dispatcher.index_width() + dispatcher.max_input_size();
        let needed_output = dispatcher.max_output_size();
        assert!(
            buffers.input().len() >= needed_input,
            "input buffer of {} bytes cannot hold a {needed_input}-byte request",
            buffers.input().len(),
        );
        assert!(
            buffers.output().len() >= needed_output,
            "output buffer of {} bytes cannot hold a {needed_output}-byte response",
            buffers.output().len(),
        );

        let load_count = dispatcher.index_width();
        Self {
            dispatcher,
            buffers,
            index_loaded: false,
            load_count,
            ibuf_next: 0,
            obuf_next: 0,
            obuf_bottom: 0,
        }
    }

    /// The wrapped dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher<A, N> {
        &self.dispatcher
    }

    /// Mutable access to the wrapped dispatcher.
    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher<A, N> {
        &mut self.dispatcher
    }

    /// Whether the output buffer still holds undrained response bytes.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.obuf_next < self.obuf_bottom
    }

    /// Feed one request byte into the state machine.
    pub fn put(&mut self, byte: u8) -> PacketStatus {
        let pos = self.ibuf_next;
        self.buffers.input()[pos] = byte;
        self.ibuf_next += 1;
        self.load_count -= 1;
        if self.load_count > 0 {
            return PacketStatus::Loading;
        }

        if self.index_loaded {
            // Last payload byte.
            return self.resolve();
        }

        // Last index byte.
        let index_width = self.dispatcher.index_width();
        let endianness = self.dispatcher.format().endianness;
        let index = read_unsigned(&self.buffers.input()[..index_width], endianness);

        match self.dispatcher.get(index as usize) {
            None => {
                tracing::warn!(index, size = N, "dropping request with out-of-range index");
                self.reset_input();
                self.obuf_next = 0;
                self.obuf_bottom = 0;
                PacketStatus::Dropped
            }
            Some(entry) => {
                self.index_loaded = true;
                let input_size = entry.input_size();
                if input_size == 0 {
                    self.resolve()
                } else {
                    self.load_count = input_size;
                    PacketStatus::Loading
                }
            }
        }
    }

    /// Run the action named by the buffered index against the buffered
    /// payload, leaving the response in the output buffer.
    fn resolve(&mut self) -> PacketStatus {
        let index_width = self.dispatcher.index_width();
        let endianness = self.dispatcher.format().endianness;
        let index = read_unsigned(&self.buffers.input()[..index_width], endianness) as usize;

        self.obuf_next = 0;
        self.obuf_bottom = 0;

        let mut channel =
            BufferChannel { buffers: &mut self.buffers, read: index_width, written: 0 };
        match self.dispatcher.get_mut(index) {
            Some(entry) => {
                tracing::debug!(index, "dispatching buffered action");
                if let Err(error) = entry.invoke(&mut channel) {
                    unreachable!("in-memory packet buffers cannot fail: {error}");
                }
            }
            // The index was range-checked when its last byte arrived.
            None => unreachable!("resolve reached with out-of-range index {index}"),
        }
        self.obuf_bottom = channel.written;

        self.reset_input();
        PacketStatus::Resolved
    }

    fn reset_input(&mut self) {
        self.index_loaded = false;
        self.load_count = self.dispatcher.index_width();
        self.ibuf_next = 0;
    }

    /// Pop one response byte, or the zero sentinel once drained.
    pub fn get(&mut self) -> u8 {
        if self.is_loaded() {
            let byte = self.buffers.output()[self.obuf_next];
            self.obuf_next += 1;
            byte
        } else {
            0
        }
    }

    /// Feed bytes from `source` until the current packet resolves or
    /// drops.
    ///
    /// # Errors
    ///
    /// Returns the first transport failure from `source`; the machine
    /// keeps the partial state and can be resumed with more bytes.
    pub fn pump(&mut self, source: &mut dyn ByteSource) -> Result<PacketStatus> {
        loop {
            let status = self.put(source.next_byte()?);
            if status != PacketStatus::Loading {
                return Ok(status);
            }
        }
    }

    /// Drain the whole output buffer into `sink`.
    ///
    /// # Errors
    ///
    /// Returns the first transport failure from `sink`.
    pub fn drain_into(&mut self, sink: &mut dyn ByteSink) -> Result<()> {
        while self.is_loaded() {
            let byte = self.get();
            sink.put_byte(byte)?;
        }
        Ok(())
    }

    /// [`pump`](Self::pump), then on `Resolved` drain the response into
    /// `sink`.
    ///
    /// # Errors
    ///
    /// Returns the first transport failure from either side.
    pub fn process(
        &mut self,
        source: &mut dyn ByteSource,
        sink: &mut dyn ByteSink,
    ) -> Result<PacketStatus> {
        let status = self.pump(source)?;
        if status == PacketStatus::Resolved {
            self.drain_into(sink)?;
        }
        Ok(status)
    }

    /// Forward the whole output buffer to a peer dispatcher as the
    /// single byte-array argument of the action `peer` names.
    ///
    /// The receiving action sees exactly the bytes [`drain_into`](Self::drain_into)
    /// would have produced (zero-padded up to the peer's array length)
    /// and can decode them with the key that filled this output buffer.
    ///
    /// Only allowed while the response is complete: nothing drained yet
    /// (`obuf_next == 0`) and everything fits the peer's buffer
    /// (`obuf_bottom <= LEN`). Returns `Ok(false)` without emitting a
    /// byte when either precondition fails; on success the output buffer
    /// is left empty.
    ///
    /// # Errors
    ///
    /// Returns the first transport failure from `sink`.
    pub fn reply<const LEN: usize, Ret>(
        &mut self,
        sink: &mut dyn ByteSink,
        peer: &Key<([u8; LEN],), Ret>,
    ) -> Result<bool>
    where
        Ret: WireReturn,
    {
        if self.obuf_next != 0 || self.obuf_bottom > LEN {
            return Ok(false);
        }

        let filled = self.obuf_bottom;
        let mut payload = [0u8; LEN];
        payload[..filled].copy_from_slice(&self.buffers.output()[..filled]);

        peer.write_to(sink, (payload,))?;
        self.obuf_next = 0;
        self.obuf_bottom = 0;
        Ok(true)
    }
}

impl<const N: usize, B: PacketBuffers> BufferedDispatcher<Action, N, B> {
    /// Swap the callable behind a key's entry; see
    /// [`Dispatcher::replace`].
    pub fn replace<Args, Ret, F>(&mut self, key: &Key<Args, Ret>, handler: F)
    where
        Args: Fields + 'static,
        Ret: WireReturn + 'static,
        F: ferrule_proto::Unpack<Args, Ret> + 'static,
    {
        self.dispatcher.replace(key, handler);
    }
}

impl<const N: usize, B: PacketBuffers> BufferedDispatcher<WeakAction, N, B> {
    /// Swap the target behind a weak entry; see
    /// [`Dispatcher::replace_weak`].
    pub fn replace_weak(&mut self, action: WeakAction) {
        self.dispatcher.replace_weak(action);
    }
}

#[cfg(test)]
mod tests {
    use ferrule_proto::{Endianness, Format, SignedMode};
    use proptest::prelude::*;

    use super::*;
    use crate::io::SliceSource;

    const LE: Format = Format::new(Endianness::Little, SignedMode::TwosComplement);

    fn identity_key() -> Key<(u16,), u16> {
        Key::with_layout(0, 1, LE)
    }

    fn single_buffered() -> SingleBuffered<Action, 1, 3> {
        let dispatcher = Dispatcher::new([Action::new(identity_key(), |x: u16| x)], LE, 1);
        BufferedDispatcher::new(dispatcher, SingleBuffer::new())
    }

    #[test]
    fn resolves_a_request_byte_by_byte() {
        let mut buffered = single_buffered();
        assert_eq!(buffered.put(0x00), PacketStatus::Loading);
        assert_eq!(buffered.put(0x34), PacketStatus::Loading);
        assert_eq!(buffered.put(0x12), PacketStatus::Resolved);

        assert!(buffered.is_loaded());
        assert_eq!(buffered.get(), 0x34);
        assert_eq!(buffered.get(), 0x12);
        assert!(!buffered.is_loaded());
        // Drained: the zero sentinel, with no state change.
        assert_eq!(buffered.get(), 0);
    }

    #[test]
    fn drop_then_resume() {
        let mut buffered = single_buffered();

        assert_eq!(buffered.put(0xFF), PacketStatus::Dropped);
        assert!(!buffered.is_loaded());

        // The very next byte is a fresh index prefix.
        assert_eq!(buffered.put(0x00), PacketStatus::Loading);
        assert_eq!(buffered.put(0x34), PacketStatus::Loading);
        assert_eq!(buffered.put(0x12), PacketStatus::Resolved);

        let mut out = Vec::new();
        buffered.drain_into(&mut out).unwrap();
        assert_eq!(out, vec![0x34, 0x12]);
    }

    #[test]
    fn zero_argument_request_resolves_on_the_index_byte() {
        let key: Key<(), u16> = Key::with_layout(0, 1, LE);
        let dispatcher = Dispatcher::new([Action::new(key, || 0xABCDu16)], LE, 1);
        let mut buffered = BufferedDispatcher::new(dispatcher, SingleBuffer::<2>::new());

        assert_eq!(buffered.put(0x00), PacketStatus::Resolved);
        let mut out = Vec::new();
        buffered.drain_into(&mut out).unwrap();
        assert_eq!(out, vec![0xCD, 0xAB]);
    }

    #[test]
    fn void_response_leaves_output_empty() {
        let key: Key<(u8,), ()> = Key::with_layout(0, 1, LE);
        let dispatcher = Dispatcher::new([Action::new(key, |_x: u8| {})], LE, 1);
        let mut buffered = BufferedDispatcher::new(dispatcher, SingleBuffer::<2>::new());

        assert_eq!(buffered.put(0x00), PacketStatus::Loading);
        assert_eq!(buffered.put(0x07), PacketStatus::Resolved);
        assert!(!buffered.is_loaded());
    }

    #[test]
    fn pump_runs_to_resolution() {
        let mut buffered = single_buffered();
        let mut source = SliceSource::new(&[0x00, 0x34, 0x12]);
        assert_eq!(buffered.pump(&mut source), Ok(PacketStatus::Resolved));

        let mut sink = Vec::new();
        buffered.drain_into(&mut sink).unwrap();
        assert_eq!(sink, vec![0x34, 0x12]);
    }

    #[test]
    fn process_combines_pump_and_drain() {
        let mut buffered = single_buffered();
        let mut source = SliceSource::new(&[0x00, 0x05, 0x00]);
        let mut sink = Vec::new();
        assert_eq!(buffered.process(&mut source, &mut sink), Ok(PacketStatus::Resolved));
        assert_eq!(sink, vec![0x05, 0x00]);
    }

    #[test]
    fn transport_failure_keeps_partial_state() {
        let mut buffered = single_buffered();
        let mut short = SliceSource::new(&[0x00, 0x34]);
        assert!(buffered.pump(&mut short).is_err());

        // Resume with the missing byte.
        assert_eq!(buffered.put(0x12), PacketStatus::Resolved);
    }

    #[test]
    fn double_buffer_layout() {
        let dispatcher = Dispatcher::new([Action::new(identity_key(), |x: u16| x)], LE, 1);
        let mut buffered =
            BufferedDispatcher::new(dispatcher, DoubleBuffer::<3, 2>::new());

        let mut source = SliceSource::new(&[0x00, 0x11, 0x22]);
        let mut sink = Vec::new();
        assert_eq!(buffered.process(&mut source, &mut sink), Ok(PacketStatus::Resolved));
        assert_eq!(sink, vec![0x11, 0x22]);
    }

    #[test]
    fn borrowed_buffers_layout() {
        let mut input = [0u8; 3];
        let mut output = [0u8; 2];
        let dispatcher = Dispatcher::new([Action::new(identity_key(), |x: u16| x)], LE, 1);
        let mut buffered = BufferedDispatcher::new(
            dispatcher,
            BorrowedBuffers::new(&mut input, &mut output),
        );

        let mut source = SliceSource::new(&[0x00, 0x77, 0x00]);
        let mut sink = Vec::new();
        assert_eq!(buffered.process(&mut source, &mut sink), Ok(PacketStatus::Resolved));
        assert_eq!(sink, vec![0x77, 0x00]);
    }

    #[test]
    #[should_panic(expected = "input buffer")]
    fn undersized_buffer_is_rejected_at_construction() {
        let dispatcher = Dispatcher::new([Action::new(identity_key(), |x: u16| x)], LE, 1);
        let _ = BufferedDispatcher::new(dispatcher, SingleBuffer::<2>::new());
    }

    #[test]
    fn reply_packages_the_output_buffer() {
        let mut buffered = single_buffered();
        assert_eq!(buffered.put(0x00), PacketStatus::Loading);
        assert_eq!(buffered.put(0x34), PacketStatus::Loading);
        assert_eq!(buffered.put(0x12), PacketStatus::Resolved);

        // Peer entry taking a 4-byte buffer argument.
        let peer: Key<([u8; 4],), ()> = Key::with_layout(2, 1, LE);
        let mut wire = Vec::new();
        assert_eq!(buffered.reply(&mut wire, &peer), Ok(true));
        assert_eq!(wire, vec![0x02, 0x34, 0x12, 0x00, 0x00]);
        assert!(!buffered.is_loaded());
    }

    #[test]
    fn reply_refuses_partially_drained_output() {
        let mut buffered = single_buffered();
        buffered.put(0x00);
        buffered.put(0x34);
        buffered.put(0x12);
        let _ = buffered.get();

        let peer: Key<([u8; 4],), ()> = Key::with_layout(2, 1, LE);
        let mut wire = Vec::new();
        assert_eq!(buffered.reply(&mut wire, &peer), Ok(false));
        assert!(wire.is_empty());
        // The remaining output byte is untouched.
        assert_eq!(buffered.get(), 0x12);
    }

    #[test]
    fn reply_refuses_an_undersized_peer_buffer() {
        let mut buffered = single_buffered();
        buffered.put(0x00);
        buffered.put(0x34);
        buffered.put(0x12);

        let peer: Key<([u8; 1],), ()> = Key::with_layout(2, 1, LE);
        let mut wire = Vec::new();
        assert_eq!(buffered.reply(&mut wire, &peer), Ok(false));
        assert!(wire.is_empty());
    }

    proptest! {
        #[test]
        fn resets_hold_for_any_stream(stream in prop::collection::vec(any::<u8>(), 0..64)) {
            let mut buffered = single_buffered();
            for byte in stream {
                let status = buffered.put(byte);
                if status != PacketStatus::Loading {
                    prop_assert_eq!(buffered.ibuf_next, 0);
                    prop_assert_eq!(buffered.load_count, 1);
                    prop_assert!(!buffered.index_loaded);
                }
                prop_assert!(buffered.obuf_next <= buffered.obuf_bottom);
                prop_assert!(buffered.obuf_bottom <= 3);
            }
        }
    }
}
