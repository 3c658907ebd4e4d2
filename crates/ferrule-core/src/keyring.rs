//! Keyring declarations: one shared description, two compatible sides.
//!
//! A keyring enumerates the functions exposed over a link and fixes the
//! serialization policy. Indices are dense and assigned in declaration
//! order; the index prefix is the smallest unsigned width that can name
//! every entry. The [`keyring!`](crate::keyring) macro turns one
//! declaration into everything both sides need — typed key constructors
//! for the caller, checked dispatcher constructors for the callee — so
//! wire compatibility is fixed the moment the ring is written down.

/// Width in bytes of the index prefix for a ring of `size` entries.
///
/// The smallest unsigned width that can represent every index:
/// 1 byte up to 256 entries, 2 up to 65536, then 4 and 8.
#[must_use]
pub const fn index_width(size: usize) -> usize {
    if size as u64 <= 1 << 8 {
        1
    } else if size as u64 <= 1 << 16 {
        2
    } else if size as u64 <= 1 << 32 {
        4
    } else {
        8
    }
}

/// Largest element of `sizes`; zero for an empty slice.
#[must_use]
pub const fn max_len(sizes: &[usize]) -> usize {
    let mut max = 0;
    let mut i = 0;
    while i < sizes.len() {
        if sizes[i] > max {
            max = sizes[i];
        }
        i += 1;
    }
    max
}

/// Declare a keyring: the compile-time list of functions one link
/// exposes, with its serialization policy.
///
/// ```ignore
/// ferrule_core::keyring! {
///     /// Functions exposed over the motor link.
///     pub ring MotorRing(Endianness::Little, SignedMode::TwosComplement) {
///         fn set_speed(i16, i16);
///         fn read_speed() -> i16;
///     }
/// }
/// ```
///
/// The declaration generates, on the ring type:
///
/// - `FORMAT`, `SIZE`, `INDEX_WIDTH`, `MAX_REQUEST_LEN`,
///   `MAX_RESPONSE_LEN` and `BUFFER_LEN` constants;
/// - one `const fn` per entry returning its typed [`Key`](crate::Key)
///   (indices in declaration order);
/// - `dispatcher(…)`, taking one handler per entry in declaration order
///   (annotate closure arguments; the entry's signature is enforced at
///   compile time);
/// - `weak_dispatcher(…)`, taking an array of
///   [`WeakAction`](crate::WeakAction)s built with
///   [`weak_action!`](crate::weak_action);
/// - `single_buffered(…)` / `double_buffered(…)`, wrapping a dispatcher
///   in buffers sized from the ring's largest request and response.
#[macro_export]
macro_rules! keyring {
    (
        $(#[$meta:meta])*
        $vis:vis ring $ring:ident ( $endianness:expr, $signed_mode:expr ) {
            $(
                $(#[$fmeta:meta])*
                fn $fname:ident ( $($arg:ty),* $(,)? ) $(-> $ret:ty)? ;
            )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        $vis struct $ring;

        impl $ring {
            /// Serialization policy shared by every key and dispatcher
            /// derived from this ring.
            pub const FORMAT: $crate::Format = $crate::Format::new($endianness, $signed_mode);

            /// Number of entries.
            pub const SIZE: usize = [$( stringify!($fname) ),+].len();

            /// Width in bytes of the index prefix.
            pub const INDEX_WIDTH: usize = $crate::keyring::index_width(Self::SIZE);

            /// Length in bytes of the longest request payload, index
            /// prefix included.
            pub const MAX_REQUEST_LEN: usize = Self::INDEX_WIDTH
                + $crate::keyring::max_len(&[
                    $( <($($arg,)*) as $crate::Fields>::SIZE ),+
                ]);

            /// Length in bytes of the longest response payload.
            pub const MAX_RESPONSE_LEN: usize = $crate::keyring::max_len(&[
                $( <$crate::__ferrule_ret!($(-> $ret)?) as $crate::WireReturn>::SIZE ),+
            ]);

            /// Buffer length for the single-buffer layout: enough for
            /// any request and any response.
            pub const BUFFER_LEN: usize =
                $crate::keyring::max_len(&[Self::MAX_REQUEST_LEN, Self::MAX_RESPONSE_LEN]);

            /// Build an owning dispatcher, one handler per entry, in
            /// declaration order.
            pub fn dispatcher(
                $( $fname: impl $crate::Unpack<
                    ($($arg,)*),
                    $crate::__ferrule_ret!($(-> $ret)?),
                > + 'static ),+
            ) -> $crate::Dispatcher<$crate::Action, { $ring::SIZE }> {
                $crate::Dispatcher::new(
                    [$( $crate::Action::new(Self::$fname(), $fname) ),+],
                    Self::FORMAT,
                    Self::INDEX_WIDTH,
                )
            }

            /// Build a no-storage dispatcher from weak actions, one per
            /// entry, in declaration order.
            pub fn weak_dispatcher(
                entries: [$crate::WeakAction; $ring::SIZE],
            ) -> $crate::Dispatcher<$crate::WeakAction, { $ring::SIZE }> {
                $crate::Dispatcher::from_weak(entries, Self::FORMAT, Self::INDEX_WIDTH)
            }

            /// Wrap a dispatcher in one shared request/response buffer.
            pub fn single_buffered<A: $crate::Dispatch>(
                dispatcher: $crate::Dispatcher<A, { $ring::SIZE }>,
            ) -> $crate::BufferedDispatcher<
                A,
                { $ring::SIZE },
                $crate::SingleBuffer<{ $ring::BUFFER_LEN }>,
            > {
                $crate::BufferedDispatcher::new(dispatcher, $crate::SingleBuffer::new())
            }

            /// Wrap a dispatcher in separate request and response
            /// buffers.
            pub fn double_buffered<A: $crate::Dispatch>(
                dispatcher: $crate::Dispatcher<A, { $ring::SIZE }>,
            ) -> $crate::BufferedDispatcher<
                A,
                { $ring::SIZE },
                $crate::DoubleBuffer<{ $ring::MAX_REQUEST_LEN }, { $ring::MAX_RESPONSE_LEN }>,
            > {
                $crate::BufferedDispatcher::new(dispatcher, $crate::DoubleBuffer::new())
            }
        }

        $crate::__ferrule_keys! {
            $ring ; 0 ;
            $( $(#[$fmeta])* fn $fname ( $($arg),* ) $(-> $ret)? ; )+
        }
    };
}

/// Resolves an optional `-> Ret` clause to a type, `()` when absent.
#[doc(hidden)]
#[macro_export]
macro_rules! __ferrule_ret {
    () => { () };
    (-> $ret:ty) => { $ret };
}

/// Generates one typed key constructor per ring entry, assigning dense
/// indices in declaration order.
#[doc(hidden)]
#[macro_export]
macro_rules! __ferrule_keys {
    ($ring:ident ; $idx:expr ;) => {};
    (
        $ring:ident ; $idx:expr ;
        $(#[$fmeta:meta])*
        fn $fname:ident ( $($arg:ty),* ) $(-> $ret:ty)? ;
        $($rest:tt)*
    ) => {
        impl $ring {
            $(#[$fmeta])*
            #[doc = concat!("Key for the `", stringify!($fname), "` entry.")]
            pub const fn $fname() -> $crate::Key<($($arg,)*), $crate::__ferrule_ret!($(-> $ret)?)> {
                $crate::Key::with_layout(($idx) as u64, Self::INDEX_WIDTH, Self::FORMAT)
            }
        }

        $crate::__ferrule_keys! {
            $ring ; $idx + 1 ;
            $($rest)*
        }
    };
}

#[cfg(test)]
mod tests {
    use ferrule_proto::{Endianness, SignedMode};

    use crate::io::SliceSource;
    use crate::{weak_action, PacketStatus};

    crate::keyring! {
        /// Exercises every argument shape the wire format supports.
        pub ring TestRing(Endianness::Little, SignedMode::TwosComplement) {
            fn id(u16) -> u16;
            fn nop(u8, u8);
            fn sum4([u8; 4]) -> u16;
        }
    }

    #[test]
    fn derived_constants() {
        assert_eq!(TestRing::SIZE, 3);
        assert_eq!(TestRing::INDEX_WIDTH, 1);
        assert_eq!(TestRing::MAX_REQUEST_LEN, 5);
        assert_eq!(TestRing::MAX_RESPONSE_LEN, 2);
        assert_eq!(TestRing::BUFFER_LEN, 5);
    }

    #[test]
    fn keys_get_dense_indices() {
        assert_eq!(TestRing::id().index(), 0);
        assert_eq!(TestRing::nop().index(), 1);
        assert_eq!(TestRing::sum4().index(), 2);
        assert_eq!(TestRing::id().format(), TestRing::FORMAT);
        assert_eq!(TestRing::sum4().payload_len(), 5);
        assert_eq!(TestRing::nop().response_len(), 0);
    }

    fn owning_dispatcher() -> crate::Dispatcher<crate::Action, { TestRing::SIZE }> {
        TestRing::dispatcher(
            |x: u16| x,
            |_a: u8, _b: u8| {},
            |xs: [u8; 4]| xs.iter().map(|&b| u16::from(b)).sum::<u16>(),
        )
    }

    #[test]
    fn dispatcher_matches_keys_by_position() {
        let mut dispatcher = owning_dispatcher();

        let request = TestRing::sum4().encode(([1, 2, 3, 4],));
        let mut source = SliceSource::new(request.bytes());
        let mut response = Vec::new();

        let index = dispatcher.invoke(&mut source, &mut response).unwrap();
        assert_eq!(index, 2);
        assert_eq!(TestRing::sum4().decode_response(&response), 10);
    }

    fn id_fn(x: u16) -> u16 {
        x
    }

    fn nop_fn(_a: u8, _b: u8) {}

    fn sum4_fn(xs: [u8; 4]) -> u16 {
        xs.iter().map(|&b| u16::from(b)).sum()
    }

    #[test]
    fn weak_dispatcher_round_trip() {
        let mut dispatcher = TestRing::weak_dispatcher([
            weak_action!(TestRing::id(), id_fn),
            weak_action!(TestRing::nop(), nop_fn),
            weak_action!(TestRing::sum4(), sum4_fn),
        ]);

        let request = TestRing::id().encode((0x0102,));
        let mut source = SliceSource::new(request.bytes());
        let mut response = Vec::new();

        assert_eq!(dispatcher.invoke(&mut source, &mut response), Ok(0));
        assert_eq!(TestRing::id().decode_response(&response), 0x0102);
    }

    #[test]
    #[should_panic(expected = "placed in slot")]
    fn misplaced_weak_action_is_rejected() {
        let _ = TestRing::weak_dispatcher([
            weak_action!(TestRing::id(), id_fn),
            weak_action!(TestRing::sum4(), sum4_fn),
            weak_action!(TestRing::nop(), nop_fn),
        ]);
    }

    #[test]
    fn buffered_constructors_size_their_buffers() {
        let mut buffered = TestRing::single_buffered(owning_dispatcher());
        for &byte in TestRing::id().encode((7,)).bytes() {
            let _ = buffered.put(byte);
        }
        assert!(buffered.is_loaded());

        let mut buffered = TestRing::double_buffered(owning_dispatcher());
        let mut statuses = Vec::new();
        for &byte in TestRing::nop().encode((1, 2)).bytes() {
            statuses.push(buffered.put(byte));
        }
        assert_eq!(
            statuses,
            vec![PacketStatus::Loading, PacketStatus::Loading, PacketStatus::Resolved]
        );
    }

    #[test]
    fn index_width_grows_at_the_boundaries() {
        assert_eq!(super::index_width(1), 1);
        assert_eq!(super::index_width(256), 1);
        assert_eq!(super::index_width(257), 2);
        assert_eq!(super::index_width(65536), 2);
        assert_eq!(super::index_width(65537), 4);
    }

    #[test]
    fn max_len_of_slices() {
        assert_eq!(super::max_len(&[]), 0);
        assert_eq!(super::max_len(&[3, 9, 1]), 9);
    }
}
