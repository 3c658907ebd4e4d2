//! Serialization policy shared by both ends of a link.
//!
//! A [`Format`] pairs a byte order with a signed-number representation.
//! It is fixed when a keyring is declared and every key, action and
//! dispatcher derived from that keyring carries the same value, so the
//! two sides of a link can never disagree on how integers look on the
//! wire.

/// Byte order of multi-byte integers on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endianness {
    /// Least-significant byte first.
    Little,
    /// Most-significant byte first.
    Big,
}

impl Endianness {
    /// The byte order of the host platform.
    #[must_use]
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") { Self::Big } else { Self::Little }
    }
}

/// Representation of negative integers on the wire.
///
/// All three classic representations are supported on both the read and
/// write paths. Note that one's complement and sign-magnitude cannot
/// represent the most negative value of a width (`iN::MIN`); encoding it
/// under those modes is lossy but never panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignedMode {
    /// Two's complement, the representation used by Rust integers.
    TwosComplement,
    /// One's complement: a negative value is the bitwise inverse of its
    /// magnitude.
    OnesComplement,
    /// Sign-magnitude: the top bit carries the sign, the rest the
    /// magnitude.
    SignMagnitude,
}

impl SignedMode {
    /// The signed representation of the host platform.
    ///
    /// Rust guarantees two's complement, so this is always
    /// [`SignedMode::TwosComplement`].
    #[must_use]
    pub const fn native() -> Self {
        Self::TwosComplement
    }
}

/// The serialization policy of a link: byte order plus signed-number
/// representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Format {
    /// Byte order of multi-byte integers.
    pub endianness: Endianness,
    /// Representation of negative integers.
    pub signed_mode: SignedMode,
}

impl Format {
    /// Whatever the host uses: native byte order, two's complement.
    pub const HOST: Self = Self::new(Endianness::native(), SignedMode::native());

    /// Build a format from its two components.
    #[must_use]
    pub const fn new(endianness: Endianness, signed_mode: SignedMode) -> Self {
        Self { endianness, signed_mode }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_format_is_twos_complement() {
        assert_eq!(Format::HOST.signed_mode, SignedMode::TwosComplement);
    }

    #[test]
    fn native_endianness_matches_target() {
        let expected = if cfg!(target_endian = "big") { Endianness::Big } else { Endianness::Little };
        assert_eq!(Endianness::native(), expected);
        assert_eq!(Format::HOST.endianness, expected);
    }
}
