use core::num::NonZeroU64;

use anyhow::{ensure, Result};
use arithmetic::U128Ext as _;
use helper_functions::{
    accessors::{
        cache_total_active_balance, compute_base_reward, get_base_reward_per_increment,
        get_current_epoch, get_previous_epoch,
    },
    predicates::{has_flag, is_active_validator, is_in_inactivity_leak},
    rewards::adjust_base_reward,
};
use itertools::izip;
use rayon::iter::{IntoParallelRefIterator as _, ParallelIterator as _};
use types::{
    altair::consts::{
        PARTICIPATION_FLAG_WEIGHTS, TIMELY_HEAD_FLAG_INDEX, TIMELY_SOURCE_FLAG_INDEX,
        TIMELY_TARGET_FLAG_INDEX, WEIGHT_DENOMINATOR,
    },
    config::Config,
    nonstandard::{AttestationEpoch, GweiSum, Phase},
    preset::Preset,
    traits::PostAltairBeaconState,
};

use crate::unphased::{self, AttestationCategory, Balance, Delta, Error, ValidatorRecord};

/// Builds one record per validator and sums active balances.
///
/// Unlike in Phase 0, a validator counts as withdrawable once the current epoch reaches its withdrawable epoch.
pub fn initialize_validator_records<P: Preset>(
    state: &impl PostAltairBeaconState<P>,
) -> Result<(Vec<ValidatorRecord>, Balance)> {
    let validator_count = state.validators().len();
    let inactivity_score_count = state.inactivity_scores().len();

    ensure!(
        validator_count == inactivity_score_count,
        Error::InactivityScoreCountMismatch {
            validator_count,
            inactivity_score_count,
        },
    );

    let current_epoch = get_current_epoch(state);
    let previous_epoch = get_previous_epoch(state);
    let mut balance = Balance::default();

    let records = state
        .validators()
        .iter()
        .zip(state.inactivity_scores().iter().copied())
        .map(|(validator, inactivity_score)| {
            let effective_balance = validator.effective_balance;
            let active_current_epoch = is_active_validator(validator, current_epoch);
            let active_previous_epoch = is_active_validator(validator, previous_epoch);

            if active_current_epoch {
                balance.add_active(AttestationEpoch::Current, effective_balance);
            }

            if active_previous_epoch {
                balance.add_active(AttestationEpoch::Previous, effective_balance);
            }

            ValidatorRecord {
                current_epoch_effective_balance: effective_balance,
                inactivity_score,
                slashed: validator.slashed,
                withdrawable_current_epoch: current_epoch >= validator.withdrawable_epoch,
                active_current_epoch,
                active_previous_epoch,
                ..ValidatorRecord::default()
            }
        })
        .collect();

    cache_total_active_balance(state, balance.active_current_epoch);

    Ok((records, balance))
}

/// Translates participation flags into record flags and adds up attested balances.
///
/// Flags of validators inactive in the corresponding epoch are ignored.
pub fn process_epoch_participation<P: Preset>(
    state: &impl PostAltairBeaconState<P>,
    phase: Phase,
    mut records: Vec<ValidatorRecord>,
    balance: Balance,
) -> Result<(Vec<ValidatorRecord>, Balance)> {
    let previous_participation = state.previous_epoch_participation();
    let current_participation = state.current_epoch_participation();

    ensure!(
        previous_participation.len() == records.len()
            && current_participation.len() == records.len(),
        Error::ParticipationCountMismatch {
            validator_count: records.len(),
            previous_count: previous_participation.len(),
            current_count: current_participation.len(),
        },
    );

    for (record, previous, current) in
        izip!(&mut records, previous_participation, current_participation)
    {
        if record.active_current_epoch {
            if has_flag(*current, TIMELY_SOURCE_FLAG_INDEX) {
                record.current_epoch_attester = true;
            }

            if has_flag(*current, TIMELY_TARGET_FLAG_INDEX) {
                record.current_epoch_attester = true;
                record.current_epoch_target_attester = true;
            }
        }

        if record.active_previous_epoch {
            if has_flag(*previous, TIMELY_SOURCE_FLAG_INDEX) {
                record.previous_epoch_attester = true;
                record.previous_epoch_source_attester = true;
            }

            if has_flag(*previous, TIMELY_TARGET_FLAG_INDEX) {
                record.previous_epoch_attester = true;
                record.previous_epoch_target_attester = true;
            }

            if has_flag(*previous, TIMELY_HEAD_FLAG_INDEX) {
                record.previous_epoch_head_attester = true;
            }
        }
    }

    let balance = unphased::update_balance::<P>(phase, &records, balance);

    Ok((records, balance))
}

/// Sums the balances that justification would see if the epoch ended now.
///
/// Only unslashed validators active in the current epoch count. The result holds the current
/// epoch active balance and the previous and current epoch target balances. Every total,
/// including the ones not filled in here, is floored at one increment.
pub fn unrealized_checkpoint_balances<P: Preset>(
    state: &impl PostAltairBeaconState<P>,
) -> Result<Balance> {
    let validators = state.validators();
    let previous_participation = state.previous_epoch_participation();
    let current_participation = state.current_epoch_participation();

    ensure!(
        previous_participation.len() >= validators.len()
            && current_participation.len() >= validators.len(),
        Error::ParticipationCountMismatch {
            validator_count: validators.len(),
            previous_count: previous_participation.len(),
            current_count: current_participation.len(),
        },
    );

    let current_epoch = get_current_epoch(state);
    let mut balance = Balance::default();

    for (validator, previous, current) in
        izip!(validators, previous_participation, current_participation)
    {
        if validator.slashed || !is_active_validator(validator, current_epoch) {
            continue;
        }

        let effective_balance = validator.effective_balance;

        balance.add_active(AttestationEpoch::Current, effective_balance);

        if has_flag(*previous, TIMELY_TARGET_FLAG_INDEX) {
            balance.add_attested(AttestationCategory::PreviousEpochTarget, effective_balance);
        }

        if has_flag(*current, TIMELY_TARGET_FLAG_INDEX) {
            balance.add_attested(AttestationCategory::CurrentEpochTarget, effective_balance);
        }
    }

    balance.apply_floor::<P>();

    Ok(balance)
}

/// Flag rewards, flag penalties and inactivity penalties for every validator.
///
/// Inactivity scores must already be updated for the epoch being processed.
#[must_use]
pub fn attestation_deltas<P: Preset>(
    config: &Config,
    state: &impl PostAltairBeaconState<P>,
    phase: Phase,
    balance: &Balance,
    records: &[ValidatorRecord],
) -> Vec<Delta> {
    if balance.active_current_epoch == 0 {
        return vec![Delta::default(); records.len()];
    }

    let in_inactivity_leak = is_in_inactivity_leak(state);
    let increment = P::EFFECTIVE_BALANCE_INCREMENT;
    let base_reward_per_increment = get_base_reward_per_increment::<P>(balance.active_current_epoch);

    let weight_denominator = GweiSum::from(WEIGHT_DENOMINATOR.get());
    let reward_denominator = balance.active_current_epoch.div_increment(increment) * weight_denominator;

    let inactivity_penalty_denominator = GweiSum::from(config.inactivity_score_bias.get())
        * GweiSum::from(inactivity_penalty_quotient::<P>(phase).get());

    records
        .par_iter()
        .map(|record| {
            if !record.eligible() {
                return Delta::default();
            }

            let effective_balance = record.current_epoch_effective_balance;
            let base_reward = compute_base_reward::<P>(effective_balance, base_reward_per_increment);
            let base_reward = GweiSum::from(adjust_base_reward(config, base_reward.saturating_into_u64()));
            let unslashed = !record.slashed;

            let mut reward = 0;
            let mut penalty = 0;

            for (flag_index, weight) in PARTICIPATION_FLAG_WEIGHTS {
                let (attested, attested_balance) = match flag_index {
                    TIMELY_SOURCE_FLAG_INDEX => (
                        record.previous_epoch_source_attester,
                        balance.previous_epoch_attested,
                    ),
                    TIMELY_TARGET_FLAG_INDEX => (
                        record.previous_epoch_target_attester,
                        balance.previous_epoch_target_attested,
                    ),
                    _ => (
                        record.previous_epoch_head_attester,
                        balance.previous_epoch_head_attested,
                    ),
                };

                let weight = GweiSum::from(weight);

                if attested && unslashed {
                    if !in_inactivity_leak {
                        let reward_numerator =
                            base_reward * weight * attested_balance.div_increment(increment);

                        reward += reward_numerator
                            .checked_div(reward_denominator)
                            .unwrap_or_default();
                    }
                } else if flag_index != TIMELY_HEAD_FLAG_INDEX {
                    penalty += base_reward * weight / weight_denominator;
                }
            }

            if !record.previous_epoch_target_attester || record.slashed {
                let penalty_numerator =
                    GweiSum::from(effective_balance) * GweiSum::from(record.inactivity_score);

                penalty += penalty_numerator / inactivity_penalty_denominator;
            }

            Delta {
                reward: reward.saturating_into_u64(),
                penalty: penalty.saturating_into_u64(),
            }
        })
        .collect()
}

#[must_use]
pub const fn inactivity_penalty_quotient<P: Preset>(phase: Phase) -> NonZeroU64 {
    match phase {
        Phase::Phase0 => P::INACTIVITY_PENALTY_QUOTIENT,
        Phase::Altair => P::INACTIVITY_PENALTY_QUOTIENT_ALTAIR,
        Phase::Bellatrix | Phase::Capella => P::INACTIVITY_PENALTY_QUOTIENT_BELLATRIX,
    }
}
