use core::sync::atomic::AtomicBool;
use std::collections::HashMap;

use anyhow::Result;
use helper_functions::accessors;
use log::debug;
use types::{
    config::Config,
    nonstandard::Phase,
    phase0::{
        beacon_state::BeaconState as Phase0BeaconState,
        primitives::{Gwei, ValidatorIndex},
    },
    preset::Preset,
};

use super::epoch_intermediates;
use crate::unphased::{self, Delta, EpochReport};

#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
pub fn process_epoch<P: Preset>(
    config: &Config,
    state: &mut Phase0BeaconState<P>,
    cancelled: &AtomicBool,
) -> Result<EpochReport> {
    unphased::check_cancellation(cancelled)?;

    let (records, balance) = epoch_intermediates::new(state);

    unphased::check_cancellation(cancelled)?;

    let (mut records, balance) =
        epoch_intermediates::process_attestations(state, records, balance)?;

    unphased::check_cancellation(cancelled)?;

    let deltas = if unphased::should_process_rewards_and_penalties(state) {
        epoch_intermediates::epoch_deltas(config, state, &balance, &records)?
    } else {
        vec![Delta::default(); records.len()]
    };

    unphased::check_cancellation(cancelled)?;

    unphased::process_rewards_and_penalties(state, &mut records, &deltas)?;

    let total_active_balance = accessors::total_active_balance(state);

    let slashing_penalties: HashMap<ValidatorIndex, Gwei> = unphased::process_slashings(
        state,
        total_active_balance,
        unphased::proportional_slashing_multiplier::<P>(Phase::Phase0),
    )?;

    process_participation_record_updates(state);

    debug!(
        "processed phase0 epoch {} (active balance: {}, slashed validators penalized: {})",
        accessors::get_current_epoch(state),
        balance.active_current_epoch,
        slashing_penalties.len(),
    );

    Ok(EpochReport {
        balance,
        records,
        deltas,
        slashing_penalties,
    })
}

pub fn process_participation_record_updates<P: Preset>(state: &mut Phase0BeaconState<P>) {
    // > Rotate current/previous epoch attestations
    state.previous_epoch_attestations = core::mem::take(&mut state.current_epoch_attestations);
}

#[cfg(test)]
mod tests {
    use types::{
        nonstandard::RelativeEpoch,
        phase0::{
            consts::FAR_FUTURE_EPOCH,
            containers::{PendingAttestation, Validator},
        },
        preset::Minimal,
    };

    use super::*;

    const ETH: Gwei = 1_000_000_000;

    fn state_at_slot(slot: u64) -> Phase0BeaconState<Minimal> {
        let validator = Validator {
            effective_balance: 32 * ETH,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
            ..Validator::default()
        };

        Phase0BeaconState {
            slot,
            validators: vec![validator; 64],
            balances: vec![32 * ETH; 64],
            ..Phase0BeaconState::default()
        }
    }

    #[test]
    fn idle_validators_are_penalized() -> Result<()> {
        let mut state = state_at_slot(15);

        let report = process_epoch(&Config::minimal(), &mut state, &AtomicBool::new(false))?;

        // See `missed_attestations_cost_three_base_rewards`.
        let penalty = 3 * 357_771;

        assert!(report.deltas.iter().all(|delta| delta.penalty == penalty));
        assert!(state.balances.iter().all(|balance| *balance == 32 * ETH - penalty));
        assert!(report.slashing_penalties.is_empty());
        assert_eq!(report.records[0].before_epoch_transition_balance, 32 * ETH);
        assert_eq!(report.records[0].after_epoch_transition_balance, 32 * ETH - penalty);

        Ok(())
    }

    #[test]
    fn genesis_epoch_has_zero_deltas() -> Result<()> {
        let mut state = state_at_slot(7);

        let report = process_epoch(&Config::minimal(), &mut state, &AtomicBool::new(false))?;

        assert!(report.deltas.iter().all(|delta| *delta == Delta::default()));
        assert_eq!(state.balances, vec![32 * ETH; 64]);

        Ok(())
    }

    #[test]
    fn slashing_sweep_uses_cached_total_active_balance() -> Result<()> {
        let mut state = state_at_slot(15);

        state.validators[3].slashed = true;
        state.validators[3].withdrawable_epoch = 33;
        state.slashings[0] = 512 * ETH;

        let report = process_epoch(&Config::minimal(), &mut state, &AtomicBool::new(false))?;

        assert_eq!(
            state.cache.total_active_balance[RelativeEpoch::Current]
                .get()
                .map(|total| total.get()),
            Some(2048 * u128::from(ETH)),
        );

        // 32 × min(512 × 2, 2048) / 2048
        assert_eq!(report.slashing_penalties, HashMap::from([(3, 16 * ETH)]));
        assert_eq!(state.balances[3], 16 * ETH - 3 * 357_771);

        Ok(())
    }

    #[test]
    fn cancelled_processing_leaves_state_untouched() {
        let mut state = state_at_slot(15);

        process_epoch(&Config::minimal(), &mut state, &AtomicBool::new(true))
            .expect_err("processing was cancelled");

        assert_eq!(state.balances, vec![32 * ETH; 64]);
    }

    #[test]
    fn attestations_are_rotated() {
        let mut state = state_at_slot(7);

        state.current_epoch_attestations = vec![PendingAttestation::default()];

        process_participation_record_updates(&mut state);

        assert_eq!(state.previous_epoch_attestations, [PendingAttestation::default()]);
        assert!(state.current_epoch_attestations.is_empty());
    }
}
