use types::{
    altair::primitives::ParticipationFlags,
    phase0::{containers::Validator, primitives::Epoch},
    preset::Preset,
    traits::BeaconState,
};

use crate::accessors;

// > Check if ``validator`` is active.
#[inline]
#[must_use]
pub const fn is_active_validator(validator: &Validator, epoch: Epoch) -> bool {
    validator.activation_epoch <= epoch && epoch < validator.exit_epoch
}

#[must_use]
pub fn is_in_inactivity_leak<P: Preset>(state: &impl BeaconState<P>) -> bool {
    accessors::get_finality_delay(state) > P::MIN_EPOCHS_TO_INACTIVITY_PENALTY
}

#[inline]
#[must_use]
pub const fn has_flag(flags: ParticipationFlags, flag_index: usize) -> bool {
    flags & (1 << flag_index) != 0
}
