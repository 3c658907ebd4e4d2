//! Byte-packed records over native Rust tuples.
//!
//! A record with field types `(T0, …, Tn-1)` serializes to exactly
//! `Σ WIDTH(Ti)` bytes: field `i` sits at the byte offset of the widths
//! before it, with no padding between fields. The traits here are
//! implemented for tuples of up to eight [`Scalar`] fields.
//!
//! [`Record`] is the owning form: a buffer of exactly the packed size
//! plus the [`Format`] it was written under, with typed per-field access
//! and a raw view of the serialized image.

use std::fmt;
use std::marker::PhantomData;

use bytes::{Bytes, BytesMut};

use crate::format::Format;
use crate::scalar::Scalar;

/// A tuple of scalar fields with a fixed packed layout.
pub trait Fields: Copy {
    /// Packed size in bytes: the sum of the field widths.
    const SIZE: usize;

    /// Encode every field in declaration order into the first `SIZE`
    /// bytes of `bytes`.
    fn encode(self, bytes: &mut [u8], format: Format);

    /// Decode every field in declaration order from the first `SIZE`
    /// bytes of `bytes`.
    fn decode(bytes: &[u8], format: Format) -> Self;

    /// Decode by pulling exactly `SIZE` bytes from `next`.
    fn decode_with<E, F>(next: &mut F, format: Format) -> Result<Self, E>
    where
        F: FnMut() -> Result<u8, E>;

    /// Encode by pushing exactly `SIZE` bytes into `put`.
    fn encode_with<E, F>(self, put: &mut F, format: Format) -> Result<(), E>
    where
        F: FnMut(u8) -> Result<(), E>;
}

/// A value that can travel back as a response payload: nothing, or a
/// single packed field.
///
/// Implemented for `()` (an empty response, zero bytes) and for every
/// [`Scalar`] (one packed field). The method set mirrors [`Fields`],
/// with the streaming twins carrying the no-allocation path.
pub trait WireReturn: Copy {
    /// Serialized width of the response in bytes; zero for `()`.
    const SIZE: usize;

    /// Encode into the first `SIZE` bytes of `bytes`.
    fn encode(self, bytes: &mut [u8], format: Format);

    /// Decode from the first `SIZE` bytes of `bytes`.
    fn decode(bytes: &[u8], format: Format) -> Self;

    /// Encode by pushing exactly `SIZE` bytes into `put`.
    fn encode_with<E, F>(self, put: &mut F, format: Format) -> Result<(), E>
    where
        F: FnMut(u8) -> Result<(), E>;

    /// Decode by pulling exactly `SIZE` bytes from `next`.
    fn decode_with<E, F>(next: &mut F, format: Format) -> Result<Self, E>
    where
        F: FnMut() -> Result<u8, E>;
}

impl WireReturn for () {
    const SIZE: usize = 0;

    fn encode(self, _bytes: &mut [u8], _format: Format) {}

    fn decode(_bytes: &[u8], _format: Format) -> Self {}

    fn encode_with<E, F>(self, _put: &mut F, _format: Format) -> Result<(), E>
    where
        F: FnMut(u8) -> Result<(), E>,
    {
        Ok(())
    }

    fn decode_with<E, F>(_next: &mut F, _format: Format) -> Result<Self, E>
    where
        F: FnMut() -> Result<u8, E>,
    {
        Ok(())
    }
}

impl<T: Scalar> WireReturn for T {
    const SIZE: usize = T::WIDTH;

    fn encode(self, bytes: &mut [u8], format: Format) {
        self.put(bytes, format);
    }

    fn decode(bytes: &[u8], format: Format) -> Self {
        T::get(bytes, format)
    }

    fn encode_with<E, F>(self, put: &mut F, format: Format) -> Result<(), E>
    where
        F: FnMut(u8) -> Result<(), E>,
    {
        self.put_with(put, format)
    }

    fn decode_with<E, F>(next: &mut F, format: Format) -> Result<Self, E>
    where
        F: FnMut() -> Result<u8, E>,
    {
        T::get_with(next, format)
    }
}

/// Position of field `I` inside a [`Fields`] tuple.
pub trait FieldAt<const I: usize>: Fields {
    /// The field's type.
    type Field: Scalar;

    /// The field's byte offset: the sum of the widths before it.
    const OFFSET: usize;
}

/// Applies a callable to the unpacked fields of a tuple.
///
/// Implemented for every `FnMut(T0, …, Tn-1) -> R` whose arguments match
/// the field list, so `record.invoke(f)` and the dispatch layer can call
/// plain closures and functions without any by-hand unpacking.
pub trait Unpack<T: Fields, R> {
    /// Call with the fields of `fields` as individual arguments.
    fn unpack(&mut self, fields: T) -> R;
}

impl Fields for () {
    const SIZE: usize = 0;

    fn encode(self, _bytes: &mut [u8], _format: Format) {}

    fn decode(_bytes: &[u8], _format: Format) -> Self {}

    fn decode_with<E, F>(_next: &mut F, _format: Format) -> Result<Self, E>
    where
        F: FnMut() -> Result<u8, E>,
    {
        Ok(())
    }

    fn encode_with<E, F>(self, _put: &mut F, _format: Format) -> Result<(), E>
    where
        F: FnMut(u8) -> Result<(), E>,
    {
        Ok(())
    }
}

impl<Func, R> Unpack<(), R> for Func
where
    Func: FnMut() -> R,
{
    fn unpack(&mut self, _fields: ()) -> R {
        self()
    }
}

macro_rules! fields_impl {
    ($($t:ident),+) => {
        #[allow(non_snake_case)]
        impl<$($t: Scalar),+> Fields for ($($t,)+) {
            const SIZE: usize = 0 $(+ $t::WIDTH)+;

            fn encode(self, bytes: &mut [u8], format: Format) {
                let ($($t,)+) = self;
                let mut offset = 0;
                $(
                    $t.put(&mut bytes[offset..], format);
                    offset += $t::WIDTH;
                )+
                let _ = offset;
            }

            fn decode(bytes: &[u8], format: Format) -> Self {
                let mut offset = 0;
                let fields = ($(
                    {
                        let field = <$t as Scalar>::get(&bytes[offset..], format);
                        offset += $t::WIDTH;
                        field
                    },
                )+);
                let _ = offset;
                fields
            }

            fn decode_with<__RecErr, __RecNext>(next: &mut __RecNext, format: Format) -> Result<Self, __RecErr>
            where
                __RecNext: FnMut() -> Result<u8, __RecErr>,
            {
                Ok(($( <$t as Scalar>::get_with(next, format)?, )+))
            }

            fn encode_with<__RecErr, __RecPut>(self, put: &mut __RecPut, format: Format) -> Result<(), __RecErr>
            where
                __RecPut: FnMut(u8) -> Result<(), __RecErr>,
            {
                let ($($t,)+) = self;
                $( $t.put_with(put, format)?; )+
                Ok(())
            }
        }

        #[allow(non_snake_case)]
        impl<Func, R, $($t: Scalar),+> Unpack<($($t,)+), R> for Func
        where
            Func: FnMut($($t),+) -> R,
        {
            fn unpack(&mut self, fields: ($($t,)+)) -> R {
                let ($($t,)+) = fields;
                self($($t),+)
            }
        }
    };
}

macro_rules! field_at_impl {
    (@step ($($prev:ident)*) ; ($($all:ident),+) ; $idx:expr ;) => {};
    (@step ($($prev:ident)*) ; ($($all:ident),+) ; $idx:expr ; $head:ident $($rest:ident)*) => {
        impl<$($all: Scalar),+> FieldAt<{ $idx }> for ($($all,)+) {
            type Field = $head;
            const OFFSET: usize = 0 $(+ $prev::WIDTH)*;
        }
        field_at_impl!(@step ($($prev)* $head) ; ($($all),+) ; $idx + 1 ; $($rest)*);
    };
}

macro_rules! fields_for {
    ($($t:ident)+) => {
        fields_impl!($($t),+);
        field_at_impl!(@step () ; ($($t),+) ; 0 ; $($t)+);
    };
}

fields_for!(A);
fields_for!(A B);
fields_for!(A B C);
fields_for!(A B C D);
fields_for!(A B C D E);
fields_for!(A B C D E F);
fields_for!(A B C D E F G);
fields_for!(A B C D E F G H);

/// An owning byte-packed record.
///
/// Holds exactly [`Fields::SIZE`] bytes of storage at all times, plus
/// the [`Format`] its fields are written under. Two records with the
/// same field list and format are byte-equal exactly when they are
/// field-equal.
#[derive(Clone)]
pub struct Record<T: Fields> {
    bytes: BytesMut,
    format: Format,
    _fields: PhantomData<T>,
}

impl<T: Fields> Record<T> {
    /// A record with every byte zero.
    #[must_use]
    pub fn zeroed(format: Format) -> Self {
        Self { bytes: BytesMut::zeroed(T::SIZE), format, _fields: PhantomData }
    }

    /// A record holding `values`, each field set in turn.
    #[must_use]
    pub fn of(values: T, format: Format) -> Self {
        let mut record = Self::zeroed(format);
        values.encode(&mut record.bytes, format);
        record
    }

    /// The format the fields are written under.
    #[must_use]
    pub fn format(&self) -> Format {
        self.format
    }

    /// Read field `I`.
    #[must_use]
    pub fn get<const I: usize>(&self) -> <T as FieldAt<I>>::Field
    where
        T: FieldAt<I>,
    {
        <T as FieldAt<I>>::Field::get(&self.bytes[<T as FieldAt<I>>::OFFSET..], self.format)
    }

    /// Write field `I`, leaving every other field untouched.
    pub fn set<const I: usize>(&mut self, value: <T as FieldAt<I>>::Field)
    where
        T: FieldAt<I>,
    {
        value.put(&mut self.bytes[<T as FieldAt<I>>::OFFSET..], self.format);
    }

    /// Decode all fields at once.
    #[must_use]
    pub fn values(&self) -> T {
        T::decode(&self.bytes, self.format)
    }

    /// Call `f` with the decoded fields as individual arguments.
    pub fn invoke<F, R>(&self, mut f: F) -> R
    where
        F: Unpack<T, R>,
    {
        f.unpack(self.values())
    }

    /// The serialized image, in storage order.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the record, keeping only the serialized image.
    #[must_use]
    pub fn freeze(self) -> Bytes {
        self.bytes.freeze()
    }
}

impl<T: Fields> PartialEq for Record<T> {
    fn eq(&self, other: &Self) -> bool {
        self.format == other.format && self.bytes == other.bytes
    }
}

impl<T: Fields> Eq for Record<T> {}

impl<T: Fields> fmt::Debug for Record<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("bytes", &format_args!("{:02x?}", &self.bytes[..]))
            .field("format", &self.format)
            .finish()
    }
}

impl<T: Fields> AsRef<[u8]> for Record<T> {
    fn as_ref(&self) -> &[u8] {
        self.bytes()
    }
}
