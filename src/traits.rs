//! Integer width pairing shared by the varint kernels.

use num_traits::{PrimInt, Signed, Unsigned};

/// A signed integer type paired with the unsigned type of the same width.
pub trait SignedWidth: PrimInt + Signed + 'static {
    type Unsigned: PrimInt + Unsigned + 'static;
    const BITS: usize;
}

macro_rules! signed_width {
    ($($s:ty => $u:ty),+ $(,)?) => {
        $(
            impl SignedWidth for $s {
                type Unsigned = $u;
                const BITS: usize = <$s>::BITS as usize;
            }
        )+
    };
}

// Every width an STRF integer column can declare.
signed_width!(i8 => u8, i16 => u16, i32 => u32, i64 => u64);
