use std::sync::Arc;

use enum_map::EnumMap;
use once_cell::sync::OnceCell;

use crate::{
    nonstandard::{NonZeroGweiSum, RelativeEpoch},
    phase0::primitives::ValidatorIndex,
};

/// Values derived from a state that stay valid until the next epoch boundary.
///
/// The cache is owned by the state it was computed from.
/// Whoever moves a state across an epoch boundary must call [`Cache::advance_epoch`].
#[derive(Clone, Default, Debug)]
pub struct Cache {
    pub active_validator_indices_shuffled: EnumMap<RelativeEpoch, OnceCell<Arc<[ValidatorIndex]>>>,
    pub total_active_balance: EnumMap<RelativeEpoch, OnceCell<NonZeroGweiSum>>,
}

impl Cache {
    pub fn advance_epoch(&mut self) {
        let shuffled = &mut self.active_validator_indices_shuffled;
        let balance = &mut self.total_active_balance;

        shuffled[RelativeEpoch::Previous] = core::mem::take(&mut shuffled[RelativeEpoch::Current]);
        balance[RelativeEpoch::Previous] = core::mem::take(&mut balance[RelativeEpoch::Current]);

        shuffled[RelativeEpoch::Current] = core::mem::take(&mut shuffled[RelativeEpoch::Next]);
        balance[RelativeEpoch::Current] = core::mem::take(&mut balance[RelativeEpoch::Next]);
    }
}

#[cfg(test)]
mod tests {
    use nonzero_ext::nonzero;

    use super::*;

    #[test]
    fn advance_epoch_rotates_entries() {
        let mut cache = Cache::default();

        cache.total_active_balance[RelativeEpoch::Current]
            .set(nonzero!(32_u128))
            .expect("cell is empty");
        cache.active_validator_indices_shuffled[RelativeEpoch::Next]
            .set(Arc::from([2, 0, 1]))
            .expect("cell is empty");

        cache.advance_epoch();

        assert_eq!(
            cache.total_active_balance[RelativeEpoch::Previous].get(),
            Some(&nonzero!(32_u128)),
        );
        assert_eq!(cache.total_active_balance[RelativeEpoch::Current].get(), None);
        assert_eq!(
            cache.active_validator_indices_shuffled[RelativeEpoch::Current]
                .get()
                .map(|indices| &indices[..]),
            Some([2, 0, 1].as_slice()),
        );
        assert_eq!(
            cache.active_validator_indices_shuffled[RelativeEpoch::Next].get(),
            None,
        );
    }
}
