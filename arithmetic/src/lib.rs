use core::num::NonZeroU64;

use easy_ext::ext;
use num_integer::Roots as _;
use typenum::{NonZero, Unsigned};

#[ext(NonZeroExt)]
pub impl<N: Unsigned + NonZero> N {
    #[inline]
    #[must_use]
    fn non_zero() -> NonZeroU64 {
        Self::U64
            .try_into()
            .expect("the bound on N ensures that it is nonzero")
    }
}

#[ext(U64Ext)]
pub impl u64 {
    #[inline]
    #[must_use]
    fn div_typenum<N: Unsigned + NonZero>(self) -> Self {
        self / N::U64
    }

    #[inline]
    #[must_use]
    fn mod_typenum<N: Unsigned + NonZero>(self) -> Self {
        self % N::U64
    }
}

#[ext(U128Ext)]
pub impl u128 {
    /// Integer square root rounded down.
    #[inline]
    #[must_use]
    fn integer_sqrt(self) -> Self {
        self.sqrt()
    }

    #[inline]
    #[must_use]
    fn div_increment(self, increment: NonZeroU64) -> Self {
        self / Self::from(increment.get())
    }

    #[inline]
    #[must_use]
    fn saturating_into_u64(self) -> u64 {
        u64::try_from(self).unwrap_or(u64::MAX)
    }
}
