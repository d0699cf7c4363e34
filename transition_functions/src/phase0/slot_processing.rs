use core::sync::atomic::AtomicBool;

use anyhow::{ensure, Result};
use helper_functions::misc;
use types::{
    config::Config,
    phase0::{beacon_state::BeaconState, primitives::Slot},
    preset::Preset,
};

use super::epoch_processing;
use crate::unphased::{self, Error};

pub fn process_slots<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    slot: Slot,
) -> Result<()> {
    ensure!(
        state.slot < slot,
        Error::SlotNotLater {
            current: state.slot,
            target: slot,
        },
    );

    while state.slot < slot {
        // > Process epoch on the start slot of the next epoch
        if misc::is_epoch_end::<P>(state.slot) {
            epoch_processing::process_epoch(config, state, &AtomicBool::new(false))?;
        }

        unphased::advance_slot(state);
    }

    Ok(())
}
