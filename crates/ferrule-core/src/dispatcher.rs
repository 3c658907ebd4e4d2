//! The indexed action table.
//!
//! A dispatcher holds one action per keyring entry, matched by position
//! to the indices the keyring assigned. One invocation is strictly
//! sequential — index bytes, then argument bytes, then response bytes —
//! and no state is held between invocations.
//!
//! An index at or beyond the table size is returned to the caller
//! without touching the stream any further: the payload is *not*
//! drained, and resynchronization is the caller's business (or the
//! buffered dispatcher's, which handles it by dropping the packet).

use ferrule_proto::{read_unsigned, Fields, Format, WireReturn};

use crate::action::{Action, Dispatch, WeakAction};
use crate::io::{ByteSink, ByteSource, Channel, Pipe, Result};
use crate::key::Key;

/// A fixed table of actions, one slot per keyring entry.
///
/// Built through the constructors a `keyring!` declaration generates,
/// which is what guarantees the slot order matches the key indices on
/// the caller side.
#[derive(Debug)]
pub struct Dispatcher<A, const N: usize> {
    entries: [A; N],
    format: Format,
    index_width: usize,
}

impl<A: Dispatch, const N: usize> Dispatcher<A, N> {
    /// Build a dispatcher from its entries, in keyring order.
    #[must_use]
    pub fn new(entries: [A; N], format: Format, index_width: usize) -> Self {
        Self { entries, format, index_width }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        N
    }

    /// Whether the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        N == 0
    }

    /// The link's serialization policy.
    #[must_use]
    pub fn format(&self) -> Format {
        self.format
    }

    /// Width in bytes of the index prefix.
    #[must_use]
    pub fn index_width(&self) -> usize {
        self.index_width
    }

    /// Longest packed argument record over all entries.
    #[must_use]
    pub fn max_input_size(&self) -> usize {
        self.entries.iter().map(Dispatch::input_size).max().unwrap_or(0)
    }

    /// Longest packed return value over all entries.
    #[must_use]
    pub fn max_output_size(&self) -> usize {
        self.entries.iter().map(Dispatch::output_size).max().unwrap_or(0)
    }

    /// Pull and decode an index prefix from `source`.
    pub fn read_index(&self, source: &mut dyn ByteSource) -> Result<u64> {
        self.read_index_with(&mut || source.next_byte())
    }

    fn read_index_with(&self, next: &mut dyn FnMut() -> Result<u8>) -> Result<u64> {
        let mut prefix = [0u8; 8];
        for slot in &mut prefix[..self.index_width] {
            *slot = next()?;
        }
        Ok(read_unsigned(&prefix[..self.index_width], self.format.endianness))
    }

    /// Read an index from `source`, dispatch the matching action, and
    /// return the index that was consumed.
    ///
    /// For an in-range index the action reads its argument bytes from
    /// `source` and writes its response bytes to `sink`. For an
    /// out-of-range index nothing further is read or written.
    ///
    /// # Errors
    ///
    /// Returns the first transport failure from `source` or `sink`.
    pub fn invoke(&mut self, source: &mut dyn ByteSource, sink: &mut dyn ByteSink) -> Result<u64> {
        let mut channel = Pipe { source, sink };
        self.invoke_on(&mut channel)
    }

    /// [`invoke`](Dispatcher::invoke) over a single duplex channel.
    pub fn invoke_on(&mut self, channel: &mut dyn Channel) -> Result<u64> {
        let index = self.read_index_with(&mut || channel.recv_byte())?;
        match self.entries.get_mut(index as usize) {
            Some(entry) => {
                tracing::debug!(index, "dispatching action");
                entry.invoke(channel)?;
            }
            None => {
                tracing::warn!(index, size = N, "request index out of range, payload left unread");
            }
        }
        Ok(index)
    }

    /// Read an index and hand back the matching action without invoking
    /// it; `None` for an out-of-range index.
    pub fn action_for(&mut self, source: &mut dyn ByteSource) -> Result<Option<&mut A>> {
        let index = self.read_index(source)?;
        Ok(self.entries.get_mut(index as usize))
    }

    /// The action in slot `index`, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&A> {
        self.entries.get(index)
    }

    /// Mutable access to the action in slot `index`, if any.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut A> {
        self.entries.get_mut(index)
    }
}

impl<const N: usize> Dispatcher<Action, N> {
    /// Swap the callable behind a key's entry, in place.
    ///
    /// The key pins the entry's signature, so a replacement of the wrong
    /// shape is a compile-time error at this call site.
    ///
    /// # Panics
    ///
    /// Panics if `key` belongs to a different keyring and names an index
    /// this dispatcher does not have.
    pub fn replace<Args, Ret, F>(&mut self, key: &Key<Args, Ret>, handler: F)
    where
        Args: Fields + 'static,
        Ret: WireReturn + 'static,
        F: ferrule_proto::Unpack<Args, Ret> + 'static,
    {
        let slot = key.index() as usize;
        assert!(slot < N, "replacement key index {slot} out of range for dispatcher of size {N}");
        self.entries[slot] = Action::new(*key, handler);
    }
}

impl<const N: usize> Dispatcher<WeakAction, N> {
    /// Build a no-storage dispatcher, verifying that every action sits
    /// in the slot its declaring key names.
    ///
    /// # Panics
    ///
    /// Panics if an action's declared index does not match its position.
    #[must_use]
    pub fn from_weak(entries: [WeakAction; N], format: Format, index_width: usize) -> Self {
        for (slot, entry) in entries.iter().enumerate() {
            assert!(
                entry.index() as usize == slot,
                "weak action declared for index {} placed in slot {slot}",
                entry.index(),
            );
        }
        Self::new(entries, format, index_width)
    }

    /// Swap the target behind a weak action's entry, in place.
    ///
    /// The replacement carries its declaring key's index, which names
    /// the slot.
    ///
    /// # Panics
    ///
    /// Panics if the action's key belongs to a different keyring and
    /// names an index this dispatcher does not have.
    pub fn replace_weak(&mut self, action: WeakAction) {
        let slot = action.index() as usize;
        assert!(slot < N, "replacement key index {slot} out of range for dispatcher of size {N}");
        self.entries[slot] = action;
    }
}
