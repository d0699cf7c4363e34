use core::ops::BitOrAssign as _;

use anyhow::Result;
use arithmetic::U128Ext as _;
use itertools::Itertools as _;
use typenum::Unsigned as _;
use types::{
    altair::{
        beacon_state::BeaconState as AltairBeaconState,
        consts::{TIMELY_HEAD_FLAG_INDEX, TIMELY_SOURCE_FLAG_INDEX, TIMELY_TARGET_FLAG_INDEX},
        primitives::ParticipationFlags,
    },
    phase0::{
        beacon_state::BeaconState as Phase0BeaconState,
        containers::{AttestationData, PendingAttestation},
    },
    preset::Preset,
    traits::BeaconState,
};

use crate::{accessors, error::Error, phase0};

/// Converts a Phase 0 state into an Altair one at the first slot of the fork epoch.
///
/// Pending attestations of the previous epoch become participation flags.
/// Attestations of the current epoch are dropped. Epoch processing has already rotated them.
pub fn upgrade_to_altair<P: Preset>(pre: Phase0BeaconState<P>) -> Result<AltairBeaconState<P>> {
    let Phase0BeaconState {
        slot,
        block_roots,
        validators,
        balances,
        randao_mixes,
        slashings,
        previous_epoch_attestations,
        current_epoch_attestations: _,
        finalized_checkpoint,
        cache,
        phantom,
    } = pre;

    let zero_participation = vec![0; validators.len()];
    let inactivity_scores = vec![0; validators.len()];

    let mut post = AltairBeaconState {
        // > Versioning
        slot,
        // > History
        block_roots,
        // > Registry
        validators,
        balances,
        // > Randomness
        randao_mixes,
        // > Slashings
        slashings,
        // > Participation
        previous_epoch_participation: zero_participation.clone(),
        current_epoch_participation: zero_participation,
        // > Finality
        finalized_checkpoint,
        // > Inactivity
        inactivity_scores,
        // Cache
        cache,
        phantom,
    };

    // > Fill in previous epoch participation from the pre state's pending attestations
    translate_participation(&mut post, &previous_epoch_attestations)?;

    Ok(post)
}

fn translate_participation<'attestations, P: Preset>(
    state: &mut AltairBeaconState<P>,
    pending_attestations: impl IntoIterator<Item = &'attestations PendingAttestation>,
) -> Result<()> {
    for attestation in pending_attestations {
        let PendingAttestation {
            ref aggregation_bits,
            data,
            inclusion_delay,
            ..
        } = *attestation;

        let attesting_indices =
            phase0::get_attesting_indices(state, data, aggregation_bits)?.collect_vec();

        // > Translate attestation inclusion info to flag indices
        let participation_flags =
            get_attestation_participation_flags(state, data, inclusion_delay)?;

        // > Apply flags to all attesting validators
        for validator_index in attesting_indices {
            state
                .previous_epoch_participation
                .get_mut(usize::try_from(validator_index)?)
                .ok_or(Error::ValidatorIndexOutOfBounds { validator_index })?
                .bitor_assign(participation_flags);
        }
    }

    Ok(())
}

/// Participation flags earned by an attestation with the given inclusion delay.
///
/// Pending attestations had their source checked when they were included,
/// so only target and head votes are compared against the state here.
pub fn get_attestation_participation_flags<P: Preset>(
    state: &impl BeaconState<P>,
    data: AttestationData,
    inclusion_delay: u64,
) -> Result<ParticipationFlags> {
    let attestation_epoch = accessors::attestation_epoch(state, data.target.epoch)?;

    let is_matching_target =
        data.target.root == accessors::get_block_root(state, attestation_epoch)?;

    let is_matching_head = is_matching_target
        && data.beacon_block_root == accessors::get_block_root_at_slot(state, data.slot)?;

    let max_source_delay = u128::from(P::SlotsPerEpoch::U64).integer_sqrt();

    let mut participation_flags = 0;

    if u128::from(inclusion_delay) <= max_source_delay {
        participation_flags |= 1 << TIMELY_SOURCE_FLAG_INDEX;
    }

    if is_matching_target && inclusion_delay <= P::SlotsPerEpoch::U64 {
        participation_flags |= 1 << TIMELY_TARGET_FLAG_INDEX;
    }

    if is_matching_head && inclusion_delay == P::MIN_ATTESTATION_INCLUSION_DELAY.get() {
        participation_flags |= 1 << TIMELY_HEAD_FLAG_INDEX;
    }

    Ok(participation_flags)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;
    use types::{
        phase0::{
            consts::FAR_FUTURE_EPOCH,
            containers::{AggregationBits, Checkpoint, Validator},
            primitives::H256,
        },
        preset::Minimal,
    };

    use super::*;

    fn phase0_state() -> Phase0BeaconState<Minimal> {
        let validator = Validator {
            effective_balance: 32_000_000_000,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
            ..Validator::default()
        };

        Phase0BeaconState {
            slot: 8,
            validators: vec![validator; 64],
            balances: vec![32_000_000_000; 64],
            ..Phase0BeaconState::default()
        }
    }

    fn committee_attestation(
        state: &Phase0BeaconState<Minimal>,
        target_root: H256,
        inclusion_delay: u64,
    ) -> Result<PendingAttestation> {
        let committee_length = accessors::beacon_committee(state, 0, 0)?.len();

        Ok(PendingAttestation {
            aggregation_bits: AggregationBits::repeat(true, committee_length),
            data: AttestationData {
                target: Checkpoint {
                    epoch: 0,
                    root: target_root,
                },
                ..AttestationData::default()
            },
            inclusion_delay,
            proposer_index: 0,
        })
    }

    #[test_case(1, H256::zero() => 0b111; "timely and correct")]
    #[test_case(2, H256::zero() => 0b011; "late head")]
    #[test_case(3, H256::zero() => 0b010; "late source")]
    #[test_case(9, H256::zero() => 0b000; "late target")]
    #[test_case(1, H256::repeat_byte(1) => 0b001; "wrong target")]
    fn pending_attestations_become_flags(
        inclusion_delay: u64,
        target_root: H256,
    ) -> ParticipationFlags {
        let mut pre = phase0_state();
        let attestation = committee_attestation(&pre, target_root, inclusion_delay)
            .expect("committee exists for the previous epoch");
        let attesters = accessors::beacon_committee(&pre, 0, 0)
            .expect("committee exists for the previous epoch")
            .to_vec();

        pre.previous_epoch_attestations = vec![attestation];

        let post = upgrade_to_altair(pre).expect("attestation is valid");

        let flags = post
            .previous_epoch_participation
            .iter()
            .zip(0..)
            .filter(|(_, index)| attesters.contains(index))
            .map(|(flags, _)| *flags)
            .all_equal_value()
            .expect("all attesters have the same flags");

        let others_are_unset = post
            .previous_epoch_participation
            .iter()
            .zip(0..)
            .filter(|(_, index)| !attesters.contains(index))
            .all(|(flags, _)| *flags == 0);

        assert!(others_are_unset);

        flags
    }

    #[test]
    fn upgrade_keeps_registry_and_zeroes_new_fields() -> Result<()> {
        let mut pre = phase0_state();

        pre.balances[3] = 31_000_000_000;
        pre.current_epoch_attestations = vec![committee_attestation(&pre, H256::zero(), 1)?];

        let post = upgrade_to_altair(pre)?;

        assert_eq!(post.slot, 8);
        assert_eq!(post.balances[3], 31_000_000_000);
        assert_eq!(post.validators.len(), 64);
        assert_eq!(post.previous_epoch_participation, vec![0; 64]);
        assert_eq!(post.current_epoch_participation, vec![0; 64]);
        assert_eq!(post.inactivity_scores, vec![0; 64]);

        Ok(())
    }

    #[test]
    fn attestation_with_mismatched_bits_fails_upgrade() {
        let mut pre = phase0_state();

        pre.previous_epoch_attestations = vec![PendingAttestation {
            aggregation_bits: AggregationBits::repeat(true, 1),
            inclusion_delay: 1,
            ..PendingAttestation::default()
        }];

        upgrade_to_altair(pre).expect_err("bitlist is shorter than the committee");
    }
}
