use core::{
    ops::Mul as _,
    sync::atomic::{AtomicBool, Ordering},
};
use std::collections::HashMap;

use anyhow::{ensure, Result};
use arithmetic::U128Ext as _;
use helper_functions::{
    accessors::get_current_epoch,
    mutators::{decrease_balance, increase_balance},
};
use itertools::izip;
use typenum::Unsigned as _;
use types::{
    nonstandard::{GweiSum, Phase},
    phase0::{
        consts::GENESIS_EPOCH,
        primitives::{Gwei, ValidatorIndex},
    },
    preset::Preset,
    traits::BeaconState,
};

use super::{
    epoch_intermediates::{Balance, Delta, ValidatorRecord},
    Error,
};

/// Intermediate values of a single epoch transition.
///
/// `records` include balances before and after rewards and penalties.
/// Slashing penalties are applied after that and are reported separately.
#[derive(Debug)]
pub struct EpochReport {
    pub balance: Balance,
    pub records: Vec<ValidatorRecord>,
    pub deltas: Vec<Delta>,
    pub slashing_penalties: HashMap<ValidatorIndex, Gwei>,
}

pub trait SlashingPenalties: Default {
    fn add(&mut self, validator_index: ValidatorIndex, slashing_penalty: Gwei);
}

impl SlashingPenalties for () {
    fn add(&mut self, _validator_index: ValidatorIndex, _slashing_penalty: Gwei) {}
}

impl SlashingPenalties for HashMap<ValidatorIndex, Gwei> {
    fn add(&mut self, validator_index: ValidatorIndex, slashing_penalty: Gwei) {
        *self.entry(validator_index).or_default() += slashing_penalty;
    }
}

pub fn should_process_rewards_and_penalties<P: Preset>(state: &impl BeaconState<P>) -> bool {
    // > No rewards are applied at the end of `GENESIS_EPOCH` because rewards are for work done in the previous epoch
    GENESIS_EPOCH < get_current_epoch(state)
}

/// Applies `deltas` to validator balances and records the balances before and after.
///
/// New balances are computed in full before any of them are written,
/// so a failure leaves the state unchanged.
pub fn process_rewards_and_penalties<P: Preset>(
    state: &mut impl BeaconState<P>,
    records: &mut [ValidatorRecord],
    deltas: &[Delta],
) -> Result<()> {
    let records_length = records.len();
    let validators_length = state.validators().len();
    let balances_length = state.balances().len();

    ensure!(
        records_length == validators_length
            && records_length == balances_length
            && records_length == deltas.len(),
        Error::RegistryLengthMismatch {
            records: records_length,
            validators: validators_length,
            balances: balances_length,
            deltas: deltas.len(),
        },
    );

    if !should_process_rewards_and_penalties(state) {
        return Ok(());
    }

    let mut new_balances = state.balances().to_vec();

    for (balance, record, delta) in izip!(&mut new_balances, records, deltas) {
        record.before_epoch_transition_balance = *balance;

        increase_balance(balance, delta.reward)?;
        decrease_balance(balance, delta.penalty);

        record.after_epoch_transition_balance = *balance;
    }

    state.balances_mut().copy_from_slice(&new_balances);

    Ok(())
}

/// Penalizes slashed validators halfway through their withdrawal delay.
///
/// `active_current_epoch` must be the same total the rewards were computed with.
pub fn process_slashings<P: Preset, S: SlashingPenalties>(
    state: &mut impl BeaconState<P>,
    active_current_epoch: GweiSum,
    proportional_slashing_multiplier: u64,
) -> Result<S> {
    let validator_count = state.validators().len();
    let balance_count = state.balances().len();

    ensure!(
        validator_count == balance_count,
        Error::ValidatorBalanceCountMismatch {
            validator_count,
            balance_count,
        },
    );

    let current_epoch = get_current_epoch(state);
    let withdrawable_epoch = current_epoch.saturating_add(P::EpochsPerSlashingsVector::U64 / 2);

    let mut slashing_penalties = S::default();

    let any_to_penalize = state
        .validators()
        .iter()
        .any(|validator| validator.slashed && validator.withdrawable_epoch == withdrawable_epoch);

    if !any_to_penalize {
        return Ok(slashing_penalties);
    }

    let adjusted_total_slashing_balance = state
        .slashings()
        .iter()
        .copied()
        .map(GweiSum::from)
        .sum::<GweiSum>()
        .saturating_mul(GweiSum::from(proportional_slashing_multiplier))
        .min(active_current_epoch);

    let increment = P::EFFECTIVE_BALANCE_INCREMENT;
    let (balances, validators) = state.balances_mut_with_validators();

    for (validator_index, balance, validator) in izip!(0.., balances, validators) {
        if !validator.slashed || validator.withdrawable_epoch != withdrawable_epoch {
            continue;
        }

        // > Factored out from penalty numerator to avoid uint64 overflow
        let penalty_numerator =
            GweiSum::from(validator.effective_balance / increment) * adjusted_total_slashing_balance;

        let penalty = penalty_numerator
            .checked_div(active_current_epoch)
            .unwrap_or_default()
            .mul(GweiSum::from(increment.get()))
            .saturating_into_u64();

        decrease_balance(balance, penalty);

        slashing_penalties.add(validator_index, penalty);
    }

    Ok(slashing_penalties)
}

#[must_use]
pub const fn proportional_slashing_multiplier<P: Preset>(phase: Phase) -> u64 {
    match phase {
        Phase::Phase0 => P::PROPORTIONAL_SLASHING_MULTIPLIER,
        Phase::Altair => P::PROPORTIONAL_SLASHING_MULTIPLIER_ALTAIR,
        Phase::Bellatrix | Phase::Capella => P::PROPORTIONAL_SLASHING_MULTIPLIER_BELLATRIX,
    }
}

/// Fails if `cancelled` has been set.
///
/// Epoch processing only checks this before it first writes to the state.
pub fn check_cancellation(cancelled: &AtomicBool) -> Result<()> {
    ensure!(!cancelled.load(Ordering::Relaxed), Error::Cancelled);
    Ok(())
}

#[cfg(test)]
mod tests {
    use types::{
        phase0::{
            beacon_state::BeaconState as Phase0BeaconState, consts::FAR_FUTURE_EPOCH,
            containers::Validator,
        },
        preset::{Mainnet, Minimal},
    };

    use super::*;

    const ETH: Gwei = 1_000_000_000;

    fn validator(effective_balance: Gwei) -> Validator {
        Validator {
            effective_balance,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
            ..Validator::default()
        }
    }

    fn state_at_slot(slot: u64, balances: Vec<Gwei>) -> Phase0BeaconState<Minimal> {
        Phase0BeaconState {
            slot,
            validators: balances.iter().copied().map(validator).collect(),
            balances,
            ..Phase0BeaconState::default()
        }
    }

    #[test]
    fn rewards_and_penalties_are_applied_as_a_batch() -> Result<()> {
        let mut state = state_at_slot(8, vec![10, 20]);
        let mut records = vec![ValidatorRecord::default(); 2];

        let deltas = [
            Delta {
                reward: 5,
                penalty: 3,
            },
            Delta {
                reward: 0,
                penalty: 30,
            },
        ];

        process_rewards_and_penalties(&mut state, &mut records, &deltas)?;

        assert_eq!(state.balances, [12, 0]);
        assert_eq!(records[0].before_epoch_transition_balance, 10);
        assert_eq!(records[0].after_epoch_transition_balance, 12);
        assert_eq!(records[1].before_epoch_transition_balance, 20);
        assert_eq!(records[1].after_epoch_transition_balance, 0);

        Ok(())
    }

    #[test]
    fn rewards_and_penalties_are_skipped_in_genesis_epoch() -> Result<()> {
        let mut state = state_at_slot(7, vec![10]);
        let mut records = vec![ValidatorRecord::default()];

        let deltas = [Delta {
            reward: 5,
            penalty: 0,
        }];

        process_rewards_and_penalties(&mut state, &mut records, &deltas)?;

        assert_eq!(state.balances, [10]);
        assert_eq!(records[0].after_epoch_transition_balance, 0);

        Ok(())
    }

    #[test]
    fn overflowing_reward_leaves_balances_unchanged() {
        let mut state = state_at_slot(8, vec![1, Gwei::MAX]);
        let mut records = vec![ValidatorRecord::default(); 2];

        let deltas = [
            Delta {
                reward: 1,
                penalty: 0,
            },
            Delta {
                reward: 1,
                penalty: 0,
            },
        ];

        let error = process_rewards_and_penalties(&mut state, &mut records, &deltas)
            .expect_err("second balance overflows");

        assert_eq!(error.to_string(), "balance overflowed");
        assert_eq!(state.balances, [1, Gwei::MAX]);
    }

    #[test]
    fn length_mismatch_is_an_error() {
        let mut state = state_at_slot(8, vec![1, 2]);
        let mut records = vec![ValidatorRecord::default(); 3];
        let deltas = [Delta::default(); 3];

        let error = process_rewards_and_penalties(&mut state, &mut records, &deltas)
            .expect_err("there are more records than validators");

        assert!(error.to_string().starts_with("validator registries not the same length"));
        assert_eq!(state.balances, [1, 2]);
    }

    #[test]
    fn length_mismatch_is_an_error_in_genesis_epoch() {
        let mut state = state_at_slot(7, vec![32 * ETH]);
        let mut records = vec![ValidatorRecord::default(); 2];
        let deltas = [Delta::default(); 2];

        state.validators.push(Validator {
            slashed: true,
            withdrawable_epoch: 32,
            ..validator(32 * ETH)
        });
        state.slashings[0] = 32 * ETH;

        let error = process_rewards_and_penalties(&mut state, &mut records, &deltas)
            .expect_err("there are more validators than balances");

        assert!(error.to_string().starts_with("validator registries not the same length"));

        let error = process_slashings::<_, HashMap<_, _>>(
            &mut state,
            GweiSum::from(64 * ETH),
            proportional_slashing_multiplier::<Minimal>(Phase::Phase0),
        )
        .expect_err("slashed validator has no balance");

        assert_eq!(
            error.to_string(),
            "num of validators is different than num of balances (validators: 2, balances: 1)",
        );
        assert_eq!(state.balances, [32 * ETH]);
    }

    #[test]
    fn slashing_sweep_rejects_registries_of_unequal_length() {
        let mut state = state_at_slot(8, vec![32 * ETH, 32 * ETH]);

        state.validators[0].slashed = true;
        state.validators[0].withdrawable_epoch = 33;
        state.validators.pop();
        state.slashings[0] = 32 * ETH;

        let error = process_slashings::<_, ()>(&mut state, GweiSum::from(32 * ETH), 1)
            .expect_err("there are more balances than validators");

        assert!(matches!(
            error.downcast_ref::<Error>(),
            Some(Error::ValidatorBalanceCountMismatch {
                validator_count: 1,
                balance_count: 2,
            }),
        ));
        assert_eq!(state.balances, [32 * ETH, 32 * ETH]);
    }

    #[test]
    fn slashing_penalty_is_proportional_to_total_slashings() -> Result<()> {
        let mut state = state_at_slot(8, vec![32 * ETH, 32 * ETH, 32 * ETH]);

        // Minimal has 64 epochs per slashings vector, so penalties apply at epoch 1 + 32.
        state.validators[0].slashed = true;
        state.validators[0].withdrawable_epoch = 33;
        state.validators[2].slashed = true;
        state.validators[2].withdrawable_epoch = 34;
        state.slashings[0] = 32 * ETH;

        let penalties = process_slashings::<_, HashMap<_, _>>(
            &mut state,
            GweiSum::from(96 * ETH),
            proportional_slashing_multiplier::<Minimal>(Phase::Phase0),
        )?;

        // 32 × min(32 × 2, 96) / 96 = 21.33, rounded down to whole increments.
        assert_eq!(penalties, HashMap::from([(0, 21 * ETH)]));
        assert_eq!(state.balances, [11 * ETH, 32 * ETH, 32 * ETH]);

        Ok(())
    }

    #[test]
    fn slashing_sweep_exits_early_without_matching_validators() -> Result<()> {
        let mut state = state_at_slot(8, vec![32 * ETH]);

        state.validators[0].slashed = true;
        state.slashings[0] = 32 * ETH;

        let penalties =
            process_slashings::<_, HashMap<_, _>>(&mut state, GweiSum::from(32 * ETH), 1)?;

        assert!(penalties.is_empty());
        assert_eq!(state.balances, [32 * ETH]);

        Ok(())
    }

    #[test]
    fn slashing_penalty_is_zero_without_active_balance() -> Result<()> {
        let mut state = state_at_slot(8, vec![32 * ETH]);

        state.validators[0].slashed = true;
        state.validators[0].withdrawable_epoch = 33;
        state.slashings[0] = 32 * ETH;

        let penalties = process_slashings::<_, HashMap<_, _>>(&mut state, 0, 1)?;

        assert_eq!(penalties, HashMap::from([(0, 0)]));
        assert_eq!(state.balances, [32 * ETH]);

        Ok(())
    }

    #[test]
    fn slashing_multiplier_grows_with_phase() {
        assert_eq!(proportional_slashing_multiplier::<Mainnet>(Phase::Phase0), 1);
        assert_eq!(proportional_slashing_multiplier::<Mainnet>(Phase::Altair), 2);
        assert_eq!(proportional_slashing_multiplier::<Mainnet>(Phase::Bellatrix), 3);
        assert_eq!(proportional_slashing_multiplier::<Mainnet>(Phase::Capella), 3);
    }

    #[test]
    fn cancellation_is_reported() -> Result<()> {
        check_cancellation(&AtomicBool::new(false))?;

        let error = check_cancellation(&AtomicBool::new(true)).expect_err("flag is set");

        assert_eq!(error.to_string(), "epoch processing was cancelled");

        Ok(())
    }
}
