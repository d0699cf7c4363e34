use helper_functions::misc;
use types::{preset::Preset, traits::BeaconState};

/// Moves `state` to the next slot.
///
/// Values cached for the old epoch are rotated once the new slot starts an epoch.
pub fn advance_slot<P: Preset>(state: &mut impl BeaconState<P>) {
    *state.slot_mut() += 1;

    if misc::is_epoch_start::<P>(state.slot()) {
        state.cache_mut().advance_epoch();
    }
}
