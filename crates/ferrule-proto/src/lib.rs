//! # Ferrule Protocol: Wire Format
//!
//! This crate implements the byte-level encoding layer for the ferrule
//! RPC link.
//!
//! ## Protocol Design
//!
//! Everything on the wire is an unaligned, gap-free byte sequence:
//!
//! - **Scalars**: unsigned and signed integers of fixed width, laid out
//!   under a configurable [`Format`] (byte order + signed-number
//!   representation). There is no padding and no alignment anywhere.
//! - **Records**: heterogeneous field sequences mapped onto native Rust
//!   tuples. A record of `(T0, …, Tn-1)` occupies exactly the sum of its
//!   field widths, with field `i` at the byte offset of the widths before
//!   it.
//!
//! ## Implementation Notes
//!
//! - **Policy at run time**: unlike fixed-layout headers, the byte order
//!   and signed representation are values chosen once per link and
//!   threaded through every encode/decode call. This is what lets one
//!   binary speak to peers with different conventions.
//!
//! - **No partial failure**: encoding and decoding of a value of known
//!   width cannot fail. Sizing is the caller's contract; all fallibility
//!   lives in the byte transports one layer up.
//!
//! - **Streaming twins**: every slice-based operation has a byte-at-a-time
//!   twin (`get_with` / `put_with`, `decode_with` / `encode_with`) so the
//!   no-allocation dispatch path can run straight off a byte getter.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod format;
pub mod record;
pub mod scalar;

pub use format::{Endianness, Format, SignedMode};
pub use record::{FieldAt, Fields, Record, Unpack, WireReturn};
pub use scalar::{decode_signed, encode_signed, read_unsigned, write_unsigned, Scalar};
