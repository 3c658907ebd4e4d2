//! # Ferrule Core: RPC over a byte stream
//!
//! This crate implements the calling convention of the ferrule link: a
//! caller serializes a function invocation into a flat byte stream, a
//! dispatcher on the other side finds the function, decodes the
//! arguments, runs it, and streams the return value back.
//!
//! ## Architecture
//!
//! Both sides derive from one shared [`keyring!`] declaration:
//!
//! ```text
//!                    keyring! { … }
//!                   ┌──────┴──────┐
//!            caller │             │ callee
//!                   ▼             ▼
//!      Key::encode(args)      dispatcher(handlers…)
//!            │ bytes                 ▲ bytes
//!            ▼                       │
//!        transport  ──────────►  BufferedDispatcher::put
//!            ▲                       │
//!            │ bytes                 ▼
//!      Key::decode_response ◄── response buffer
//! ```
//!
//! The keyring fixes the index of every entry, the width of the index
//! prefix and the serialization policy, so a key and the action at the
//! same index of any dispatcher built from the same ring are wire
//! compatible by construction.
//!
//! ## Implementation Notes
//!
//! - **No I/O**: the library only ever touches bytes through the
//!   caller's [`ByteSource`] / [`ByteSink`] capabilities. Transports,
//!   framing and retries live outside.
//!
//! - **Synchronous**: a dispatch runs to completion; the only places
//!   execution can pause are inside the user-supplied byte streams.
//!   Nothing here is thread-safe by design — wrap a dispatcher in your
//!   own lock if you must share it.
//!
//! - **Two action flavors**: owning [`Action`]s box any closure; weak
//!   [`WeakAction`]s hold a bare function pointer and never allocate,
//!   which is the path for heap-less targets.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod action;
pub mod buffered;
pub mod dispatcher;
pub mod io;
pub mod key;
pub mod keyring;

pub use action::{Action, Dispatch, WeakAction};
pub use buffered::{
    BorrowedBuffers, BufferedDispatcher, DoubleBuffer, DoubleBuffered, PacketBuffers,
    PacketStatus, SingleBuffer, SingleBuffered,
};
pub use dispatcher::Dispatcher;
pub use io::{
    ByteSink, ByteSource, Channel, Error, FnSink, FnSource, NullSink, Pipe, Result, SliceSource,
};
pub use key::{Key, Request};

pub use ferrule_proto::{
    Endianness, FieldAt, Fields, Format, Record, Scalar, SignedMode, Unpack, WireReturn,
};
