use core::ops::Mul as _;
use std::sync::Arc;

use anyhow::{bail, ensure, Result};
use arithmetic::U128Ext as _;
use sha2::{Digest as _, Sha256};
use typenum::Unsigned as _;
use types::{
    nonstandard::{AttestationEpoch, GweiSum, NonZeroGweiSum, RelativeEpoch},
    phase0::{
        consts::{DOMAIN_BEACON_ATTESTER, GENESIS_EPOCH},
        primitives::{CommitteeIndex, DomainType, Epoch, Gwei, Slot, ValidatorIndex, H256},
    },
    preset::Preset,
    traits::BeaconState,
};

use crate::{error::Error, misc, predicates, shuffling};

#[must_use]
pub fn get_previous_epoch<P: Preset>(state: &impl BeaconState<P>) -> Epoch {
    get_current_epoch(state)
        .saturating_sub(1)
        .max(GENESIS_EPOCH)
}

#[must_use]
pub fn get_current_epoch<P: Preset>(state: &impl BeaconState<P>) -> Epoch {
    misc::compute_epoch_at_slot::<P>(state.slot())
}

#[must_use]
pub fn get_next_epoch<P: Preset>(state: &impl BeaconState<P>) -> Epoch {
    get_current_epoch(state) + 1
}

#[must_use]
pub fn absolute_epoch<P: Preset>(
    state: &impl BeaconState<P>,
    relative_epoch: RelativeEpoch,
) -> Epoch {
    match relative_epoch {
        RelativeEpoch::Previous => get_previous_epoch(state),
        RelativeEpoch::Current => get_current_epoch(state),
        RelativeEpoch::Next => get_next_epoch(state),
    }
}

pub fn attestation_epoch<P: Preset>(
    state: &impl BeaconState<P>,
    epoch: Epoch,
) -> Result<AttestationEpoch> {
    match get_current_epoch(state).checked_sub(epoch) {
        None => bail!(Error::EpochInTheFuture),
        Some(0) => Ok(AttestationEpoch::Current),
        Some(1) => Ok(AttestationEpoch::Previous),
        Some(_) => bail!(Error::EpochBeforePrevious),
    }
}

pub fn relative_epoch<P: Preset>(
    state: &impl BeaconState<P>,
    epoch: Epoch,
) -> Result<RelativeEpoch> {
    match get_next_epoch(state).checked_sub(epoch) {
        None => bail!(Error::EpochAfterNext),
        Some(0) => Ok(RelativeEpoch::Next),
        Some(1) => Ok(RelativeEpoch::Current),
        Some(2) => Ok(RelativeEpoch::Previous),
        Some(_) => bail!(Error::EpochBeforePrevious),
    }
}

/// Number of epochs between the previous epoch and the last finalized one.
///
/// A finalized checkpoint ahead of the previous epoch counts as no delay.
#[must_use]
pub fn get_finality_delay<P: Preset>(state: &impl BeaconState<P>) -> u64 {
    get_previous_epoch(state).saturating_sub(state.finalized_checkpoint().epoch)
}

/// Root of the block at the start of the previous or current epoch.
pub fn get_block_root<P: Preset>(
    state: &impl BeaconState<P>,
    attestation_epoch: AttestationEpoch,
) -> Result<H256> {
    let epoch = absolute_epoch(state, attestation_epoch.into());
    let slot = misc::compute_start_slot_at_epoch::<P>(epoch);
    get_block_root_at_slot(state, slot)
}

pub fn get_block_root_at_slot<P: Preset>(state: &impl BeaconState<P>, slot: Slot) -> Result<H256> {
    ensure!(slot < state.slot(), Error::SlotOutOfRange { slot });

    ensure!(
        state.slot() <= slot.saturating_add(P::SlotsPerHistoricalRoot::U64),
        Error::SlotOutOfRange { slot },
    );

    let index = usize::try_from(slot % P::SlotsPerHistoricalRoot::U64)?;

    state
        .block_roots()
        .get(index)
        .copied()
        .ok_or_else(|| Error::SlotOutOfRange { slot }.into())
}

pub fn get_randao_mix<P: Preset>(state: &impl BeaconState<P>, epoch: Epoch) -> Result<H256> {
    let index = usize::try_from(epoch % P::EpochsPerHistoricalVector::U64)?;

    state
        .randao_mixes()
        .get(index)
        .copied()
        .ok_or_else(|| Error::RandaoMixOutOfRange { epoch }.into())
}

pub fn get_seed<P: Preset>(
    state: &impl BeaconState<P>,
    epoch: Epoch,
    domain_type: DomainType,
) -> Result<H256> {
    let mix = get_randao_mix(
        state,
        epoch + P::EpochsPerHistoricalVector::U64 - P::MIN_SEED_LOOKAHEAD - 1,
    )?;

    let digest = Sha256::new()
        .chain_update(domain_type)
        .chain_update(epoch.to_le_bytes())
        .chain_update(mix)
        .finalize();

    Ok(H256::from_slice(&digest))
}

pub fn get_active_validator_indices<P: Preset>(
    state: &impl BeaconState<P>,
    epoch: Epoch,
) -> impl Iterator<Item = ValidatorIndex> + '_ {
    (0..)
        .zip(state.validators())
        .filter(move |(_, validator)| predicates::is_active_validator(validator, epoch))
        .map(|(validator_index, _)| validator_index)
}

/// Active validator indices in committee order.
///
/// The result is cached in the state until the next call to [`Cache::advance_epoch`].
///
/// [`Cache::advance_epoch`]: types::cache::Cache::advance_epoch
pub fn active_validator_indices_shuffled<P: Preset>(
    state: &impl BeaconState<P>,
    relative_epoch: RelativeEpoch,
) -> Result<&Arc<[ValidatorIndex]>> {
    state.cache().active_validator_indices_shuffled[relative_epoch].get_or_try_init(|| {
        let epoch = absolute_epoch(state, relative_epoch);
        let seed = get_seed(state, epoch, DOMAIN_BEACON_ATTESTER)?;
        let mut indices = get_active_validator_indices(state, epoch).collect::<Vec<_>>();

        shuffling::shuffle_slice::<P, _>(&mut indices, seed)?;

        Ok(indices.into())
    })
}

pub fn get_committee_count_per_slot<P: Preset>(
    state: &impl BeaconState<P>,
    relative_epoch: RelativeEpoch,
) -> Result<u64> {
    let active_validator_count = active_validator_indices_shuffled(state, relative_epoch)?.len();
    let active_validator_count = u64::try_from(active_validator_count)?;

    Ok(misc::committee_count_from_active_validator_count::<P>(
        active_validator_count,
    ))
}

pub fn beacon_committee<P: Preset>(
    state: &impl BeaconState<P>,
    slot: Slot,
    committee_index: CommitteeIndex,
) -> Result<&[ValidatorIndex]> {
    let epoch = misc::compute_epoch_at_slot::<P>(slot);
    let relative_epoch = relative_epoch(state, epoch)?;
    let committees_per_slot = get_committee_count_per_slot(state, relative_epoch)?;

    ensure!(
        committee_index < committees_per_slot,
        Error::CommitteeIndexOutOfBounds,
    );

    let indices = active_validator_indices_shuffled(state, relative_epoch)?;
    let validator_count = ValidatorIndex::try_from(indices.len())?;
    let committees_in_epoch = committees_per_slot * P::SlotsPerEpoch::U64;
    let slots_since_epoch_start = misc::slots_since_epoch_start::<P>(slot);
    let index_in_epoch = slots_since_epoch_start * committees_per_slot + committee_index;
    let start = usize::try_from(validator_count * index_in_epoch / committees_in_epoch)?;
    let end = usize::try_from(validator_count * (index_in_epoch + 1) / committees_in_epoch)?;

    indices
        .get(start..end)
        .ok_or_else(|| Error::CommitteeIndexOutOfBounds.into())
}

/// Sum of effective balances of validators active in the current epoch.
///
/// The result is at least `P::EFFECTIVE_BALANCE_INCREMENT` and is cached in the state.
pub fn total_active_balance<P: Preset>(state: &impl BeaconState<P>) -> GweiSum {
    let increment = NonZeroGweiSum::from(P::EFFECTIVE_BALANCE_INCREMENT);

    state.cache().total_active_balance[RelativeEpoch::Current]
        .get_or_init(|| {
            let current_epoch = get_current_epoch(state);

            let total = state
                .validators()
                .iter()
                .filter(|validator| predicates::is_active_validator(validator, current_epoch))
                .map(|validator| GweiSum::from(validator.effective_balance))
                .sum();

            NonZeroGweiSum::new(total).unwrap_or(increment).max(increment)
        })
        .get()
}

/// Stores a total computed during a registry scan so later lookups skip the scan.
///
/// A value already in the cache is kept.
pub fn cache_total_active_balance<P: Preset>(state: &impl BeaconState<P>, total: GweiSum) {
    let increment = NonZeroGweiSum::from(P::EFFECTIVE_BALANCE_INCREMENT);
    let total = NonZeroGweiSum::new(total).unwrap_or(increment).max(increment);

    state.cache().total_active_balance[RelativeEpoch::Current].get_or_init(|| total);
}

/// Zero when `total_active_balance` is zero.
#[must_use]
pub fn get_base_reward_per_increment<P: Preset>(total_active_balance: GweiSum) -> GweiSum {
    GweiSum::from(P::EFFECTIVE_BALANCE_INCREMENT.get())
        .mul(GweiSum::from(P::BASE_REWARD_FACTOR))
        .checked_div(total_active_balance.integer_sqrt())
        .unwrap_or_default()
}

#[must_use]
pub fn compute_base_reward<P: Preset>(
    effective_balance: Gwei,
    base_reward_per_increment: GweiSum,
) -> GweiSum {
    let increments = effective_balance / P::EFFECTIVE_BALANCE_INCREMENT;
    GweiSum::from(increments) * base_reward_per_increment
}
