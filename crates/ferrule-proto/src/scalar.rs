//! Unaligned integer codec.
//!
//! Integers are written as exactly `WIDTH` bytes at arbitrary offsets,
//! with no alignment and no padding, in the byte order of the link's
//! [`Format`]. Signed integers are first mapped to an unsigned wire
//! representative under the format's [`SignedMode`], then written like
//! any unsigned integer of the same width.
//!
//! This layer performs no bounds checks beyond slice indexing: callers
//! hand in slices of exactly the right length. The round-trip law holds
//! for every value representable at its declared width under the chosen
//! mode; the only exceptions are `iN::MIN` under one's complement and
//! sign-magnitude, which those representations cannot express.

use crate::format::{Endianness, Format, SignedMode};

/// Assemble the bytes of `bytes` into an unsigned integer.
///
/// The width is `bytes.len()` (at most 8); the result is zero-extended
/// to 64 bits.
#[must_use]
pub fn read_unsigned(bytes: &[u8], endianness: Endianness) -> u64 {
    let mut value = 0u64;
    match endianness {
        Endianness::Little => {
            for (i, &byte) in bytes.iter().enumerate() {
                value |= u64::from(byte) << (8 * i);
            }
        }
        Endianness::Big => {
            for &byte in bytes {
                value = (value << 8) | u64::from(byte);
            }
        }
    }
    value
}

/// Emit the low `bytes.len()` bytes of `value` into `bytes`.
pub fn write_unsigned(bytes: &mut [u8], value: u64, endianness: Endianness) {
    let width = bytes.len();
    match endianness {
        Endianness::Little => {
            for (i, slot) in bytes.iter_mut().enumerate() {
                *slot = (value >> (8 * i)) as u8;
            }
        }
        Endianness::Big => {
            for (i, slot) in bytes.iter_mut().enumerate() {
                *slot = (value >> (8 * (width - 1 - i))) as u8;
            }
        }
    }
}

/// All bits of a `width`-byte integer.
const fn width_mask(width: usize) -> u64 {
    if width >= 8 { u64::MAX } else { (1u64 << (8 * width)) - 1 }
}

/// The sign bit of a `width`-byte integer.
const fn sign_bit(width: usize) -> u64 {
    1u64 << (8 * width - 1)
}

/// Map a signed value to its unsigned wire representative at the given
/// byte width.
#[must_use]
pub fn encode_signed(value: i64, width: usize, mode: SignedMode) -> u64 {
    let mask = width_mask(width);
    match mode {
        SignedMode::TwosComplement => (value as u64) & mask,
        SignedMode::OnesComplement => {
            if value < 0 {
                !value.unsigned_abs() & mask
            } else {
                (value as u64) & mask
            }
        }
        SignedMode::SignMagnitude => {
            if value < 0 {
                sign_bit(width) | (value.unsigned_abs() & (mask >> 1))
            } else {
                (value as u64) & mask
            }
        }
    }
}

/// Map an unsigned wire representative back to its signed value at the
/// given byte width.
///
/// `raw` carries the low `width` bytes read off the wire; higher bits
/// are ignored.
#[must_use]
pub fn decode_signed(raw: u64, width: usize, mode: SignedMode) -> i64 {
    let mask = width_mask(width);
    let raw = raw & mask;
    let sign = sign_bit(width);
    match mode {
        SignedMode::TwosComplement => {
            if raw & sign != 0 {
                (raw | !mask) as i64
            } else {
                raw as i64
            }
        }
        SignedMode::OnesComplement => {
            if raw & sign != 0 {
                -((!raw & mask) as i64)
            } else {
                raw as i64
            }
        }
        SignedMode::SignMagnitude => {
            if raw & sign != 0 {
                -((raw & !sign) as i64)
            } else {
                raw as i64
            }
        }
    }
}

/// A value with a fixed wire width that can be read and written at any
/// byte offset.
///
/// Implemented for the unsigned and signed integers up to 64 bits and
/// for fixed-size arrays of any `Scalar`, which lay out element-wise in
/// declaration order with no padding and no length prefix.
///
/// The slice operations [`get`](Scalar::get) / [`put`](Scalar::put) work
/// on the first `WIDTH` bytes of the given slice; the streaming twins
/// [`get_with`](Scalar::get_with) / [`put_with`](Scalar::put_with)
/// consume or produce exactly `WIDTH` bytes one at a time, which is what
/// the no-allocation dispatch path runs on.
pub trait Scalar: Copy {
    /// Serialized width in bytes.
    const WIDTH: usize;

    /// The all-zero value, used to pre-fill storage.
    const ZERO: Self;

    /// Decode from the first `WIDTH` bytes of `bytes`.
    fn get(bytes: &[u8], format: Format) -> Self;

    /// Encode into the first `WIDTH` bytes of `bytes`.
    fn put(self, bytes: &mut [u8], format: Format);

    /// Decode by pulling exactly `WIDTH` bytes from `next`.
    fn get_with<E, F>(next: &mut F, format: Format) -> Result<Self, E>
    where
        F: FnMut() -> Result<u8, E>;

    /// Encode by pushing exactly `WIDTH` bytes into `put`.
    fn put_with<E, F>(self, put: &mut F, format: Format) -> Result<(), E>
    where
        F: FnMut(u8) -> Result<(), E>;
}

macro_rules! unsigned_scalar {
    ($($ty:ty),+) => {$(
        impl Scalar for $ty {
            const WIDTH: usize = std::mem::size_of::<$ty>();
            const ZERO: Self = 0;

            fn get(bytes: &[u8], format: Format) -> Self {
                read_unsigned(&bytes[..Self::WIDTH], format.endianness) as $ty
            }

            fn put(self, bytes: &mut [u8], format: Format) {
                write_unsigned(&mut bytes[..Self::WIDTH], u64::from(self), format.endianness);
            }

            fn get_with<E, F>(next: &mut F, format: Format) -> Result<Self, E>
            where
                F: FnMut() -> Result<u8, E>,
            {
                let mut buf = [0u8; 8];
                for slot in &mut buf[..Self::WIDTH] {
                    *slot = next()?;
                }
                Ok(Self::get(&buf, format))
            }

            fn put_with<E, F>(self, put: &mut F, format: Format) -> Result<(), E>
            where
                F: FnMut(u8) -> Result<(), E>,
            {
                let mut buf = [0u8; 8];
                self.put(&mut buf, format);
                for &byte in &buf[..Self::WIDTH] {
                    put(byte)?;
                }
                Ok(())
            }
        }
    )+};
}

unsigned_scalar!(u8, u16, u32, u64);

macro_rules! signed_scalar {
    ($($ty:ty),+) => {$(
        impl Scalar for $ty {
            const WIDTH: usize = std::mem::size_of::<$ty>();
            const ZERO: Self = 0;

            fn get(bytes: &[u8], format: Format) -> Self {
                let raw = read_unsigned(&bytes[..Self::WIDTH], format.endianness);
                decode_signed(raw, Self::WIDTH, format.signed_mode) as $ty
            }

            fn put(self, bytes: &mut [u8], format: Format) {
                let raw = encode_signed(i64::from(self), Self::WIDTH, format.signed_mode);
                write_unsigned(&mut bytes[..Self::WIDTH], raw, format.endianness);
            }

            fn get_with<E, F>(next: &mut F, format: Format) -> Result<Self, E>
            where
                F: FnMut() -> Result<u8, E>,
            {
                let mut buf = [0u8; 8];
                for slot in &mut buf[..Self::WIDTH] {
                    *slot = next()?;
                }
                Ok(Self::get(&buf, format))
            }

            fn put_with<E, F>(self, put: &mut F, format: Format) -> Result<(), E>
            where
                F: FnMut(u8) -> Result<(), E>,
            {
                let mut buf = [0u8; 8];
                self.put(&mut buf, format);
                for &byte in &buf[..Self::WIDTH] {
                    put(byte)?;
                }
                Ok(())
            }
        }
    )+};
}

signed_scalar!(i8, i16, i32, i64);

impl<T: Scalar, const N: usize> Scalar for [T; N] {
    const WIDTH: usize = N * T::WIDTH;
    const ZERO: Self = [T::ZERO; N];

    fn get(bytes: &[u8], format: Format) -> Self {
        std::array::from_fn(|i| T::get(&bytes[i * T::WIDTH..], format))
    }

    fn put(self, bytes: &mut [u8], format: Format) {
        for (i, element) in self.into_iter().enumerate() {
            element.put(&mut bytes[i * T::WIDTH..], format);
        }
    }

    fn get_with<E, F>(next: &mut F, format: Format) -> Result<Self, E>
    where
        F: FnMut() -> Result<u8, E>,
    {
        let mut out = [T::ZERO; N];
        for element in &mut out {
            *element = T::get_with(next, format)?;
        }
        Ok(out)
    }

    fn put_with<E, F>(self, put: &mut F, format: Format) -> Result<(), E>
    where
        F: FnMut(u8) -> Result<(), E>,
    {
        for element in self {
            element.put_with(put, format)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::format::{Endianness, Format, SignedMode};

    const MODES: [SignedMode; 3] =
        [SignedMode::TwosComplement, SignedMode::OnesComplement, SignedMode::SignMagnitude];
    const ORDERS: [Endianness; 2] = [Endianness::Little, Endianness::Big];

    #[test]
    fn unsigned_little_endian_layout() {
        let mut buf = [0u8; 2];
        0x1234u16.put(&mut buf, Format::new(Endianness::Little, SignedMode::TwosComplement));
        assert_eq!(buf, [0x34, 0x12]);
    }

    #[test]
    fn unsigned_big_endian_layout() {
        let mut buf = [0u8; 2];
        0x1234u16.put(&mut buf, Format::new(Endianness::Big, SignedMode::TwosComplement));
        assert_eq!(buf, [0x12, 0x34]);
    }

    #[test]
    fn minus_one_images_per_mode() {
        let le = Endianness::Little;
        let mut buf = [0u8; 2];

        (-1i16).put(&mut buf, Format::new(le, SignedMode::TwosComplement));
        assert_eq!(buf, [0xFF, 0xFF]);

        (-1i16).put(&mut buf, Format::new(le, SignedMode::OnesComplement));
        assert_eq!(buf, [0xFE, 0xFF]);

        (-1i16).put(&mut buf, Format::new(le, SignedMode::SignMagnitude));
        assert_eq!(buf, [0x01, 0x80]);
    }

    #[test]
    fn big_endian_twos_complement_minus_one() {
        let mut buf = [0u8; 2];
        (-1i16).put(&mut buf, Format::new(Endianness::Big, SignedMode::TwosComplement));
        assert_eq!(buf, [0xFF, 0xFF]);

        (1i16).put(&mut buf, Format::new(Endianness::Big, SignedMode::TwosComplement));
        assert_eq!(buf, [0x00, 0x01]);
    }

    #[test]
    fn negative_zero_decodes_to_zero() {
        // One's complement all-ones and sign-magnitude sign-only are both
        // "negative zero"; reading them back gives plain zero.
        let le = Endianness::Little;
        let ones = Format::new(le, SignedMode::OnesComplement);
        let sm = Format::new(le, SignedMode::SignMagnitude);
        assert_eq!(i16::get(&[0xFF, 0xFF], ones), 0);
        assert_eq!(i16::get(&[0x00, 0x80], sm), 0);
    }

    #[test]
    fn most_negative_value_does_not_panic() {
        for mode in MODES {
            for endianness in ORDERS {
                let format = Format::new(endianness, mode);
                let mut buf = [0u8; 8];
                i64::MIN.put(&mut buf, format);
                let _ = i64::get(&buf, format);
            }
        }
    }

    #[test]
    fn array_layout_is_element_wise() {
        let format = Format::new(Endianness::Little, SignedMode::TwosComplement);
        let mut buf = [0u8; 6];
        [0x0102u16, 0x0304, 0x0506].put(&mut buf, format);
        assert_eq!(buf, [0x02, 0x01, 0x04, 0x03, 0x06, 0x05]);
        assert_eq!(<[u16; 3]>::get(&buf, format), [0x0102, 0x0304, 0x0506]);
    }

    #[test]
    fn streaming_matches_slice_codec() {
        let format = Format::new(Endianness::Big, SignedMode::SignMagnitude);
        let value = -0x1234i32;

        let mut buf = [0u8; 4];
        value.put(&mut buf, format);

        let mut streamed = Vec::new();
        value
            .put_with(&mut |byte| -> Result<(), ()> {
                streamed.push(byte);
                Ok(())
            }, format)
            .unwrap();
        assert_eq!(streamed, buf);

        let mut iter = streamed.iter().copied();
        let back: Result<i32, ()> = i32::get_with(&mut || Ok(iter.next().unwrap()), format);
        assert_eq!(back, Ok(value));
    }

    macro_rules! signed_round_trip {
        ($name:ident, $ty:ty) => {
            proptest! {
                #[test]
                fn $name(value in any::<$ty>(), mode_ix in 0usize..3, order_ix in 0usize..2) {
                    let mode = MODES[mode_ix];
                    let format = Format::new(ORDERS[order_ix], mode);

                    // iN::MIN has no image under one's complement or
                    // sign-magnitude; the law is scoped to representable
                    // values.
                    prop_assume!(
                        mode == SignedMode::TwosComplement || value != <$ty>::MIN
                    );

                    let mut buf = [0u8; 8];
                    value.put(&mut buf, format);
                    prop_assert_eq!(<$ty>::get(&buf, format), value);
                }
            }
        };
    }

    signed_round_trip!(round_trip_i8, i8);
    signed_round_trip!(round_trip_i16, i16);
    signed_round_trip!(round_trip_i32, i32);
    signed_round_trip!(round_trip_i64, i64);

    proptest! {
        #[test]
        fn round_trip_unsigned(value in any::<u64>(), order_ix in 0usize..2) {
            let format = Format::new(ORDERS[order_ix], SignedMode::TwosComplement);
            let mut buf = [0u8; 8];
            value.put(&mut buf, format);
            prop_assert_eq!(u64::get(&buf, format), value);
        }

        #[test]
        fn endianness_symmetry(value in any::<u32>()) {
            // Same value, reversed byte image.
            let le = Format::new(Endianness::Little, SignedMode::TwosComplement);
            let be = Format::new(Endianness::Big, SignedMode::TwosComplement);

            let mut le_buf = [0u8; 4];
            let mut be_buf = [0u8; 4];
            value.put(&mut le_buf, le);
            value.put(&mut be_buf, be);

            let mut reversed = le_buf;
            reversed.reverse();
            prop_assert_eq!(be_buf, reversed);
            prop_assert_eq!(u32::get(&le_buf, le), u32::get(&be_buf, be));
        }
    }
}
