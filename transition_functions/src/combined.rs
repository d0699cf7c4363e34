use core::sync::atomic::AtomicBool;

use anyhow::{ensure, Result};
use helper_functions::fork;
use log::info;
use types::{
    combined::BeaconState, config::Config, nonstandard::Phase, phase0::primitives::Slot,
    preset::Preset,
};

use crate::{
    altair, phase0,
    unphased::{EpochReport, Error},
};

pub fn process_epoch<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
) -> Result<EpochReport> {
    process_epoch_with_cancellation(config, state, &AtomicBool::new(false))
}

/// Runs epoch processing, giving up between steps once `cancelled` is set.
///
/// A cancelled run leaves `state` unmodified.
pub fn process_epoch_with_cancellation<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    cancelled: &AtomicBool,
) -> Result<EpochReport> {
    let phase = state.phase();

    match state {
        BeaconState::Phase0(state) => phase0::process_epoch(config, state, cancelled),
        BeaconState::Altair(state)
        | BeaconState::Bellatrix(state)
        | BeaconState::Capella(state) => altair::process_epoch(config, state, phase, cancelled),
    }
}

pub fn process_slots<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    slot: Slot,
) -> Result<()> {
    ensure!(
        state.slot() < slot,
        Error::SlotNotLater {
            current: state.slot(),
            target: slot,
        },
    );

    // If multiple phases have the same fork slots,
    // the state may need to be upgraded multiple times in the same slot.
    let final_phase = config.phase_at_slot::<P>(slot);

    while state.slot() < slot || state.phase() < final_phase {
        let mut made_progress = false;

        match state {
            BeaconState::Phase0(phase0_state) => {
                let altair_fork_slot = config.fork_slot::<P>(Phase::Altair);
                let last_slot_in_phase = phase_end_slot(slot, altair_fork_slot);

                if phase0_state.slot < last_slot_in_phase {
                    phase0::process_slots(config, phase0_state, last_slot_in_phase)?;

                    made_progress = true;
                }

                if Some(last_slot_in_phase) == altair_fork_slot {
                    // The state is cloned so that it is left intact if the upgrade fails.
                    *state = BeaconState::Altair(fork::upgrade_to_altair(phase0_state.clone())?);

                    log_upgrade(state);

                    made_progress = true;
                }
            }
            BeaconState::Altair(altair_state) => {
                let bellatrix_fork_slot = config.fork_slot::<P>(Phase::Bellatrix);
                let last_slot_in_phase = phase_end_slot(slot, bellatrix_fork_slot);

                if altair_state.slot < last_slot_in_phase {
                    altair::process_slots(config, altair_state, Phase::Altair, last_slot_in_phase)?;

                    made_progress = true;
                }

                if Some(last_slot_in_phase) == bellatrix_fork_slot {
                    *state = BeaconState::Bellatrix(core::mem::take(altair_state));

                    log_upgrade(state);

                    made_progress = true;
                }
            }
            BeaconState::Bellatrix(bellatrix_state) => {
                let capella_fork_slot = config.fork_slot::<P>(Phase::Capella);
                let last_slot_in_phase = phase_end_slot(slot, capella_fork_slot);

                if bellatrix_state.slot < last_slot_in_phase {
                    altair::process_slots(
                        config,
                        bellatrix_state,
                        Phase::Bellatrix,
                        last_slot_in_phase,
                    )?;

                    made_progress = true;
                }

                if Some(last_slot_in_phase) == capella_fork_slot {
                    *state = BeaconState::Capella(core::mem::take(bellatrix_state));

                    log_upgrade(state);

                    made_progress = true;
                }
            }
            BeaconState::Capella(capella_state) => {
                altair::process_slots(config, capella_state, Phase::Capella, slot)?;

                made_progress = true;
            }
        }

        assert!(made_progress);
    }

    Ok(())
}

fn log_upgrade<P: Preset>(state: &BeaconState<P>) {
    info!("upgraded state to {} at slot {}", state.phase(), state.slot());
}

fn phase_end_slot(target_slot: Slot, next_fork_slot: Option<Slot>) -> Slot {
    next_fork_slot.map_or(target_slot, |fork_slot| fork_slot.min(target_slot))
}
