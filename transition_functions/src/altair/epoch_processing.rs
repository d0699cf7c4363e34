use core::sync::atomic::AtomicBool;
use std::collections::HashMap;

use anyhow::{ensure, Result};
use helper_functions::{
    accessors::{self, get_current_epoch},
    predicates::is_in_inactivity_leak,
};
use itertools::izip;
use log::debug;
use types::{
    altair::{beacon_state::BeaconState as AltairBeaconState, primitives::InactivityScore},
    config::Config,
    nonstandard::Phase,
    phase0::{
        consts::GENESIS_EPOCH,
        primitives::{Gwei, ValidatorIndex},
    },
    preset::Preset,
    traits::{BeaconState, PostAltairBeaconState},
};

use super::epoch_intermediates;
use crate::unphased::{self, Delta, EpochReport, Error, ValidatorRecord};

/// Processes rewards, penalties and slashings of a state in `phase`.
///
/// Bellatrix and Capella states share the Altair layout and differ only in constants.
#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
pub fn process_epoch<P: Preset>(
    config: &Config,
    state: &mut AltairBeaconState<P>,
    phase: Phase,
    cancelled: &AtomicBool,
) -> Result<EpochReport> {
    unphased::check_cancellation(cancelled)?;

    let (records, balance) = epoch_intermediates::initialize_validator_records(state)?;

    unphased::check_cancellation(cancelled)?;

    let (mut records, balance) =
        epoch_intermediates::process_epoch_participation(state, phase, records, balance)?;

    unphased::check_cancellation(cancelled)?;

    // Deltas depend on the updated scores.
    let inactivity_scores = compute_inactivity_scores(config, state, &mut records)?;

    let deltas = if unphased::should_process_rewards_and_penalties(state) {
        epoch_intermediates::attestation_deltas(config, state, phase, &balance, &records)
    } else {
        vec![Delta::default(); records.len()]
    };

    unphased::process_rewards_and_penalties(state, &mut records, &deltas)?;

    if let Some(inactivity_scores) = inactivity_scores {
        state.inactivity_scores = inactivity_scores;
    }

    let total_active_balance = accessors::total_active_balance(state);

    let slashing_penalties: HashMap<ValidatorIndex, Gwei> = unphased::process_slashings(
        state,
        total_active_balance,
        unphased::proportional_slashing_multiplier::<P>(phase),
    )?;

    process_participation_flag_updates(state);

    debug!(
        "processed {phase} epoch {} (active balance: {}, slashed validators penalized: {})",
        get_current_epoch(state),
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

/// Updates inactivity scores in both `records` and `state`.
///
/// Scores are only written once all of them have been computed.
pub fn process_inactivity_updates<P: Preset>(
    config: &Config,
    state: &mut impl PostAltairBeaconState<P>,
    records: &mut [ValidatorRecord],
) -> Result<()> {
    if let Some(inactivity_scores) = compute_inactivity_scores(config, state, records)? {
        state
            .inactivity_scores_mut()
            .copy_from_slice(&inactivity_scores);
    }

    Ok(())
}

/// Computes new inactivity scores and stores them in `records` but not in `state`.
///
/// Returns `None` in the genesis epoch, when scores are left as they are.
pub fn compute_inactivity_scores<P: Preset>(
    config: &Config,
    state: &impl PostAltairBeaconState<P>,
    records: &mut [ValidatorRecord],
) -> Result<Option<Vec<InactivityScore>>> {
    if !should_process_inactivity_updates(state) {
        return Ok(None);
    }

    let inactivity_score_count = state.inactivity_scores().len();

    ensure!(
        records.len() == inactivity_score_count,
        Error::InactivityScoreCountMismatch {
            validator_count: records.len(),
            inactivity_score_count,
        },
    );

    let in_inactivity_leak = is_in_inactivity_leak(state);
    let mut inactivity_scores = state.inactivity_scores().to_vec();

    for (validator_index, record, inactivity_score) in
        izip!(0.., records.iter(), &mut inactivity_scores)
    {
        if !record.eligible() {
            continue;
        }

        let mut score = record.inactivity_score;

        // > Increase the inactivity score of inactive validators
        if record.previous_epoch_target_attester && !record.slashed {
            score = score.saturating_sub(1);
        } else {
            score = score
                .checked_add(config.inactivity_score_bias.get())
                .ok_or(Error::InactivityScoreOverflow { validator_index })?;
        }

        // > Decrease the inactivity score of all eligible validators during a leak-free epoch
        if !in_inactivity_leak {
            score = score.saturating_sub(config.inactivity_score_recovery_rate);
        }

        *inactivity_score = score;
    }

    for (record, score) in records.iter_mut().zip(inactivity_scores.iter().copied()) {
        record.inactivity_score = score;
    }

    Ok(Some(inactivity_scores))
}

pub fn process_participation_flag_updates<P: Preset>(state: &mut AltairBeaconState<P>) {
    // > Rotate current/previous epoch participation
    let zero_participation = vec![0; state.validators.len()];

    state.previous_epoch_participation =
        core::mem::replace(&mut state.current_epoch_participation, zero_participation);
}

fn should_process_inactivity_updates<P: Preset>(state: &impl BeaconState<P>) -> bool {
    // > Skip the genesis epoch as score updates are based on the previous epoch participation
    GENESIS_EPOCH < get_current_epoch(state)
}
