//! Dispatcher-side actions: the callee counterpart of a key.
//!
//! An action wraps a callable together with the link's [`Format`] and
//! the compiled byte sizes of its argument record and return value.
//! Invoking it pulls exactly `input_size` bytes off a [`Channel`],
//! decodes them into the argument record, calls the callable, and — for
//! a non-void return — pushes exactly `output_size` response bytes back.
//! An action never fails on its own; the only `Err` it can produce is a
//! transport failure from the channel, which passes through untouched.
//!
//! Two variants exist:
//!
//! - [`Action`] owns its callable on the heap and accepts any closure,
//!   captures included.
//! - [`WeakAction`] is the no-storage path: a plain function pointer
//!   plus a few integers, no allocation anywhere. The target function is
//!   bound at compile time through the [`weak_action!`](crate::weak_action)
//!   macro, mirroring how keys pin their entry at compile time.

use ferrule_proto::{Fields, Format, Unpack, WireReturn};

use crate::io::{ByteSink, ByteSource, Channel, Pipe, Result};
use crate::key::Key;

/// The erased invocation shape shared by both action variants.
pub trait Dispatch {
    /// Decode arguments from the channel, call the target, encode the
    /// return value back into the channel.
    fn invoke(&mut self, channel: &mut dyn Channel) -> Result<()>;

    /// [`invoke`](Dispatch::invoke) over a separate byte getter and
    /// putter. Pass [`NullSink`](crate::io::NullSink) to discard the
    /// response.
    fn invoke_split(
        &mut self,
        source: &mut dyn ByteSource,
        sink: &mut dyn ByteSink,
    ) -> Result<()> {
        let mut channel = Pipe { source, sink };
        self.invoke(&mut channel)
    }

    /// Bytes consumed per invocation (the packed argument record).
    fn input_size(&self) -> usize;

    /// Bytes produced per invocation (the packed return value).
    fn output_size(&self) -> usize;
}

/// Decode, call, encode: the shared body of every action invocation.
fn run<Args, Ret, F>(handler: &mut F, channel: &mut dyn Channel, format: Format) -> Result<()>
where
    Args: Fields,
    Ret: WireReturn,
    F: Unpack<Args, Ret>,
{
    let args = Args::decode_with(&mut || channel.recv_byte(), format)?;
    let ret = handler.unpack(args);
    ret.encode_with(&mut |byte| channel.send_byte(byte), format)
}

/// An owning action: heap-backed, accepts any callable.
pub struct Action {
    thunk: Box<dyn FnMut(&mut dyn Channel) -> Result<()>>,
    input_size: usize,
    output_size: usize,
}

impl Action {
    /// Wrap `handler` as the action for the entry `key` refers to.
    ///
    /// The key pins the argument and return types, so a handler whose
    /// signature does not match the keyring entry is rejected at compile
    /// time, right here at the call site.
    pub fn new<Args, Ret, F>(key: Key<Args, Ret>, mut handler: F) -> Self
    where
        Args: Fields + 'static,
        Ret: WireReturn + 'static,
        F: Unpack<Args, Ret> + 'static,
    {
        let format = key.format();
        Self {
            thunk: Box::new(move |channel: &mut dyn Channel| run(&mut handler, channel, format)),
            input_size: Args::SIZE,
            output_size: Ret::SIZE,
        }
    }
}

impl Dispatch for Action {
    fn invoke(&mut self, channel: &mut dyn Channel) -> Result<()> {
        (self.thunk)(channel)
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_size(&self) -> usize {
        self.output_size
    }
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("input_size", &self.input_size)
            .field("output_size", &self.output_size)
            .finish_non_exhaustive()
    }
}

/// The function-pointer shape a [`WeakAction`] stores.
pub type WeakThunk = fn(&mut dyn Channel, Format) -> Result<()>;

/// A no-storage action: a function pointer and three integers.
///
/// The target must have static lifetime and is named at compile time in
/// [`weak_action!`](crate::weak_action); nothing is allocated, which
/// makes this the variant for heap-less targets. The declaring key's
/// index is carried along so dispatcher construction can verify that
/// every action sits in the slot its key names.
#[derive(Debug, Clone, Copy)]
pub struct WeakAction {
    thunk: WeakThunk,
    format: Format,
    index: u64,
    input_size: usize,
    output_size: usize,
}

impl WeakAction {
    /// Bind a trampoline to the entry `key` refers to.
    ///
    /// Use [`weak_action!`](crate::weak_action) instead of calling this
    /// directly: the macro produces the trampoline and type-checks the
    /// target against the key's signature.
    #[must_use]
    pub fn bind<Args, Ret>(key: Key<Args, Ret>, thunk: WeakThunk) -> Self
    where
        Args: Fields,
        Ret: WireReturn,
    {
        Self {
            thunk,
            format: key.format(),
            index: key.index(),
            input_size: Args::SIZE,
            output_size: Ret::SIZE,
        }
    }

    /// The keyring index of the entry this action was declared for.
    #[must_use]
    pub fn index(&self) -> u64 {
        self.index
    }
}

impl Dispatch for WeakAction {
    fn invoke(&mut self, channel: &mut dyn Channel) -> Result<()> {
        (self.thunk)(channel, self.format)
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_size(&self) -> usize {
        self.output_size
    }
}

/// Run a static target inside a [`WeakAction`] trampoline.
///
/// Public for the [`weak_action!`](crate::weak_action) macro; not meant
/// to be called directly.
#[doc(hidden)]
pub fn run_static<Args, Ret, F>(mut target: F, channel: &mut dyn Channel, format: Format) -> Result<()>
where
    Args: Fields,
    Ret: WireReturn,
    F: Unpack<Args, Ret>,
{
    run(&mut target, channel, format)
}

/// Compile-time check that `target` matches the signature of `key`.
///
/// Public for the [`weak_action!`](crate::weak_action) macro; not meant
/// to be called directly.
#[doc(hidden)]
pub fn assert_signature<Args, Ret, F>(_key: &Key<Args, Ret>, _target: F)
where
    Args: Fields,
    Ret: WireReturn,
    F: Unpack<Args, Ret>,
{
}

/// Build a [`WeakAction`] for a keyring entry from a function with
/// static lifetime.
///
/// The first argument is a key expression (usually the generated key
/// constructor), the second a path to the target function. The target's
/// signature is checked against the key's at compile time, and the
/// binding itself is a non-capturing closure, so no state is stored and
/// nothing is allocated.
///
/// ```ignore
/// let entries = [
///     weak_action!(MotorRing::set_speed(), motor::set_speed),
///     weak_action!(MotorRing::read_speed(), motor::read_speed),
/// ];
/// let dispatcher = MotorRing::weak_dispatcher(entries);
/// ```
#[macro_export]
macro_rules! weak_action {
    ($key:expr, $target:path) => {{
        let key = $key;
        $crate::action::assert_signature(&key, $target);
        $crate::action::WeakAction::bind(key, |channel, format| {
            $crate::action::run_static($target, channel, format)
        })
    }};
}
