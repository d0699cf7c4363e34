use core::sync::atomic::AtomicBool;

use anyhow::{ensure, Result};
use helper_functions::misc;
use types::{
    altair::beacon_state::BeaconState, config::Config, nonstandard::Phase,
    phase0::primitives::Slot, preset::Preset,
};

use super::epoch_processing;
use crate::unphased::{self, Error};

/// Advances a state in `phase` to `slot`.
///
/// Bellatrix and Capella states share the Altair layout and are advanced by this function too.
pub fn process_slots<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    phase: Phase,
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
            epoch_processing::process_epoch(config, state, phase, &AtomicBool::new(false))?;
        }

        unphased::advance_slot(state);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use types::{
        phase0::{consts::FAR_FUTURE_EPOCH, containers::Validator},
        preset::Minimal,
    };

    use super::*;

    #[test]
    fn participation_is_rotated_once_per_epoch() -> Result<()> {
        let validator = Validator {
            effective_balance: 32_000_000_000,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
            ..Validator::default()
        };

        let mut state = BeaconState::<Minimal> {
            slot: 1,
            validators: vec![validator; 4],
            balances: vec![32_000_000_000; 4],
            previous_epoch_participation: vec![0; 4],
            current_epoch_participation: vec![0b111; 4],
            inactivity_scores: vec![0; 4],
            ..BeaconState::default()
        };

        process_slots(&Config::minimal(), &mut state, Phase::Altair, 9)?;

        assert_eq!(state.slot, 9);
        assert_eq!(state.previous_epoch_participation, [0b111; 4]);
        assert_eq!(state.current_epoch_participation, [0; 4]);

        Ok(())
    }
}
