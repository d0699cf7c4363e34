use anyhow::{ensure, Result};
use arithmetic::U128Ext as _;
use types::{
    nonstandard::GweiSum,
    phase0::{
        consts::BASE_REWARDS_PER_EPOCH,
        containers::{AggregationBits, AttestationData},
        primitives::{Gwei, ValidatorIndex},
    },
    preset::Preset,
    traits::BeaconState,
};

use crate::{accessors::beacon_committee, error::Error};

pub fn get_attesting_indices<'all, P: Preset>(
    state: &'all impl BeaconState<P>,
    attestation_data: AttestationData,
    aggregation_bits: &'all AggregationBits,
) -> Result<impl Iterator<Item = ValidatorIndex> + 'all> {
    let committee = beacon_committee(state, attestation_data.slot, attestation_data.index)?;

    ensure!(
        committee.len() == aggregation_bits.len(),
        Error::CommitteeLengthMismatch {
            aggregation_bitlist_length: aggregation_bits.len(),
            committee_length: committee.len(),
        },
    );

    Ok(aggregation_bits
        .iter()
        .by_vals()
        .zip(committee.iter().copied())
        .filter_map(|(present, validator_index)| present.then_some(validator_index)))
}

/// Phase 0 base reward before any chain-specific adjustment.
///
/// Balances too small to have a nonzero square root are treated as having a square root of 1.
#[must_use]
pub fn get_base_reward<P: Preset>(
    effective_balance: Gwei,
    total_active_balance: GweiSum,
) -> GweiSum {
    let sqrt = total_active_balance.integer_sqrt().max(1);

    GweiSum::from(effective_balance) * GweiSum::from(P::BASE_REWARD_FACTOR)
        / sqrt
        / GweiSum::from(BASE_REWARDS_PER_EPOCH.get())
}
