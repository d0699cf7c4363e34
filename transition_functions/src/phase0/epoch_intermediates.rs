use anyhow::{ensure, Result};
use arithmetic::U128Ext as _;
use helper_functions::{
    accessors::{
        cache_total_active_balance, get_block_root, get_block_root_at_slot, get_current_epoch,
        get_finality_delay, get_previous_epoch,
    },
    phase0::{get_attesting_indices, get_base_reward},
    predicates::{is_active_validator, is_in_inactivity_leak},
    rewards::adjust_base_reward,
};
use once_cell::unsync::OnceCell;
use rayon::iter::{IntoParallelRefIterator as _, ParallelIterator as _};
use types::{
    config::Config,
    nonstandard::{AttestationEpoch, GweiSum, Phase},
    phase0::{
        beacon_state::BeaconState as Phase0BeaconState,
        consts::BASE_REWARDS_PER_EPOCH,
        containers::PendingAttestation,
        primitives::Gwei,
    },
    preset::Preset,
    traits::BeaconState,
};

use crate::unphased::{self, Balance, Delta, Error, ValidatorRecord};

/// Builds one record per validator and sums active balances.
///
/// The current epoch total is also stored in the state cache.
/// No floor is applied here.
pub fn new<P: Preset>(state: &impl BeaconState<P>) -> (Vec<ValidatorRecord>, Balance) {
    let current_epoch = get_current_epoch(state);
    let previous_epoch = get_previous_epoch(state);
    let mut balance = Balance::default();

    let records = state
        .validators()
        .iter()
        .map(|validator| {
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
                slashed: validator.slashed,
                withdrawable_current_epoch: previous_epoch + 1 >= validator.withdrawable_epoch,
                active_current_epoch,
                active_previous_epoch,
                ..ValidatorRecord::default()
            }
        })
        .collect();

    cache_total_active_balance(state, balance.active_current_epoch);

    (records, balance)
}

/// Marks validators included in pending attestations and adds up attested balances.
///
/// Previous epoch attestations are visited before current epoch ones.
/// For previous epoch attesters the earliest inclusion wins.
pub fn process_attestations<P: Preset>(
    state: &Phase0BeaconState<P>,
    mut records: Vec<ValidatorRecord>,
    balance: Balance,
) -> Result<(Vec<ValidatorRecord>, Balance)> {
    let current_epoch = get_current_epoch(state);
    let previous_epoch = get_previous_epoch(state);

    // Roots at epoch boundaries are only needed if some attestation targets that epoch.
    let current_epoch_block_root = OnceCell::new();
    let previous_epoch_block_root = OnceCell::new();

    let attestations = state
        .previous_epoch_attestations
        .iter()
        .chain(&state.current_epoch_attestations);

    for attestation in attestations {
        let PendingAttestation {
            aggregation_bits,
            data,
            inclusion_delay,
            proposer_index,
        } = attestation;

        ensure!(*inclusion_delay > 0, Error::InclusionDelayZero);

        let mut current_epoch_attester = false;
        let mut current_epoch_target_attester = false;
        let mut previous_epoch_attester = false;
        let mut previous_epoch_target_attester = false;
        let mut previous_epoch_head_attester = false;

        if data.target.epoch == current_epoch {
            current_epoch_attester = true;

            let block_root = current_epoch_block_root
                .get_or_try_init(|| get_block_root(state, AttestationEpoch::Current))?;

            current_epoch_target_attester = data.target.root == *block_root;
        }

        if data.target.epoch == previous_epoch {
            previous_epoch_attester = true;

            let block_root = previous_epoch_block_root
                .get_or_try_init(|| get_block_root(state, AttestationEpoch::Previous))?;

            previous_epoch_target_attester = data.target.root == *block_root;

            if previous_epoch_target_attester {
                previous_epoch_head_attester =
                    data.beacon_block_root == get_block_root_at_slot(state, data.slot)?;
            }
        }

        let inclusion_slot = data.slot.saturating_add(*inclusion_delay);

        for validator_index in get_attesting_indices(state, *data, aggregation_bits)? {
            let record = usize::try_from(validator_index)
                .ok()
                .and_then(|index| records.get_mut(index))
                .ok_or(Error::ValidatorIndexOutOfRange { validator_index })?;

            record.current_epoch_attester |= current_epoch_attester;
            record.current_epoch_target_attester |= current_epoch_target_attester;
            record.previous_epoch_attester |= previous_epoch_attester;
            record.previous_epoch_target_attester |= previous_epoch_target_attester;
            record.previous_epoch_head_attester |= previous_epoch_head_attester;

            if previous_epoch_attester && inclusion_slot < record.inclusion_slot {
                record.inclusion_slot = inclusion_slot;
                record.inclusion_distance = *inclusion_delay;
                record.proposer_index = *proposer_index;
            }
        }
    }

    let balance = unphased::update_balance::<P>(Phase::Phase0, &records, balance);

    Ok((records, balance))
}

/// Source, target, head, inclusion delay and inactivity deltas for every validator.
///
/// Proposer rewards are computed separately by [`proposer_deltas`].
#[must_use]
pub fn attestation_deltas<P: Preset>(
    config: &Config,
    state: &impl BeaconState<P>,
    balance: &Balance,
    records: &[ValidatorRecord],
) -> Vec<Delta> {
    let in_inactivity_leak = is_in_inactivity_leak(state);
    let finality_delay = get_finality_delay(state);
    let increment = P::EFFECTIVE_BALANCE_INCREMENT;
    let active_increments = balance.active_current_epoch.div_increment(increment);

    let attested_reward = |base_reward: Gwei, attested_balance: GweiSum| {
        // > Since full base reward will be canceled out by inactivity penalty deltas,
        // > optimal participation receives full base reward compensation here.
        if in_inactivity_leak {
            return base_reward;
        }

        (GweiSum::from(base_reward) * attested_balance.div_increment(increment))
            .checked_div(active_increments)
            .unwrap_or_default()
            .saturating_into_u64()
    };

    records
        .par_iter()
        .map(|record| {
            if !record.eligible() || balance.active_current_epoch == 0 {
                return Delta::default();
            }

            let effective_balance = record.current_epoch_effective_balance;
            let base_reward = get_base_reward::<P>(effective_balance, balance.active_current_epoch);
            let base_reward = adjust_base_reward(config, base_reward.saturating_into_u64());
            let proposer_reward = base_reward / P::PROPOSER_REWARD_QUOTIENT;
            let unslashed = !record.slashed;

            let mut delta = Delta::default();

            let components = [
                (record.previous_epoch_attester, balance.previous_epoch_attested),
                (
                    record.previous_epoch_target_attester,
                    balance.previous_epoch_target_attested,
                ),
                (
                    record.previous_epoch_head_attester,
                    balance.previous_epoch_head_attested,
                ),
            ];

            for (attested, attested_balance) in components {
                if attested && unslashed {
                    let reward = attested_reward(base_reward, attested_balance);
                    delta.reward = delta.reward.saturating_add(reward);
                } else {
                    delta.penalty = delta.penalty.saturating_add(base_reward);
                }
            }

            if record.previous_epoch_attester && unslashed {
                let max_attester_reward = base_reward - proposer_reward;

                let inclusion_delay_reward = max_attester_reward
                    .checked_div(record.inclusion_distance)
                    .unwrap_or_default();

                delta.reward = delta.reward.saturating_add(inclusion_delay_reward);
            }

            if in_inactivity_leak {
                // > If validator is performing optimally, this cancels all rewards for a neutral balance
                let canceling_penalty = BASE_REWARDS_PER_EPOCH
                    .get()
                    .saturating_mul(base_reward)
                    .saturating_sub(proposer_reward);

                delta.penalty = delta.penalty.saturating_add(canceling_penalty);

                if !record.previous_epoch_target_attester || record.slashed {
                    let inactivity_penalty = GweiSum::from(effective_balance)
                        * GweiSum::from(finality_delay)
                        / GweiSum::from(P::INACTIVITY_PENALTY_QUOTIENT.get());

                    delta.penalty = delta
                        .penalty
                        .saturating_add(inactivity_penalty.saturating_into_u64());
                }
            }

            delta
        })
        .collect()
}

/// Rewards proposers for every unslashed previous epoch attester they included.
///
/// The result is index-aligned with `records`.
pub fn proposer_deltas<P: Preset>(
    config: &Config,
    balance: &Balance,
    records: &[ValidatorRecord],
) -> Result<Vec<Gwei>> {
    let validator_count = records.len();
    let mut rewards = vec![0_u64; validator_count];

    for record in records {
        let proposer_index = record.proposer_index;

        let reward = usize::try_from(proposer_index)
            .ok()
            .and_then(|index| rewards.get_mut(index))
            .ok_or(Error::ProposerIndexOutOfRange {
                proposer_index,
                validator_count,
            })?;

        // > Only apply inclusion rewards to proposer only if the attested hasn't been slashed
        if record.previous_epoch_attester && !record.slashed {
            let base_reward = get_base_reward::<P>(
                record.current_epoch_effective_balance,
                balance.active_current_epoch,
            );

            let base_reward = adjust_base_reward(config, base_reward.saturating_into_u64());

            *reward = reward.saturating_add(base_reward / P::PROPOSER_REWARD_QUOTIENT);
        }
    }

    Ok(rewards)
}

/// Attestation and proposer deltas combined into one delta per validator.
pub fn epoch_deltas<P: Preset>(
    config: &Config,
    state: &impl BeaconState<P>,
    balance: &Balance,
    records: &[ValidatorRecord],
) -> Result<Vec<Delta>> {
    let mut deltas = attestation_deltas(config, state, balance, records);
    let proposer_rewards = proposer_deltas::<P>(config, balance, records)?;

    for (delta, proposer_reward) in deltas.iter_mut().zip(proposer_rewards) {
        delta.reward = delta.reward.saturating_add(proposer_reward);
    }

    Ok(deltas)
}

#[cfg(test)]
mod tests {
    use itertools::Itertools as _;
    use types::{
        phase0::{
            consts::{FAR_FUTURE_EPOCH, FAR_FUTURE_SLOT},
            containers::{AggregationBits, AttestationData, Checkpoint, Validator},
            primitives::{Slot, H256},
        },
        preset::Minimal,
    };

    use super::*;

    const ETH: Gwei = 1_000_000_000;

    fn active_validator() -> Validator {
        Validator {
            effective_balance: 32 * ETH,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
            ..Validator::default()
        }
    }

    // 64 active validators at the last slot of epoch 1.
    // Minimal splits them into 2 committees of 4 per slot.
    fn state_with_committees() -> Phase0BeaconState<Minimal> {
        Phase0BeaconState {
            slot: 15,
            block_roots: (0..=63).map(H256::repeat_byte).collect(),
            validators: vec![active_validator(); 64],
            balances: vec![32 * ETH; 64],
            ..Phase0BeaconState::default()
        }
    }

    fn bits(bits: impl IntoIterator<Item = bool>) -> AggregationBits {
        bits.into_iter().collect()
    }

    fn previous_epoch_attestation(
        slot: Slot,
        inclusion_delay: u64,
        proposer_index: u64,
    ) -> PendingAttestation {
        PendingAttestation {
            aggregation_bits: bits([true, false, true, true]),
            data: AttestationData {
                slot,
                index: 0,
                beacon_block_root: H256::repeat_byte(3),
                source: Checkpoint::default(),
                target: Checkpoint {
                    epoch: 0,
                    root: H256::repeat_byte(0),
                },
            },
            inclusion_delay,
            proposer_index,
        }
    }

    fn current_epoch_attestation(target_root: H256) -> PendingAttestation {
        PendingAttestation {
            aggregation_bits: bits([true, true, true, true]),
            data: AttestationData {
                slot: 9,
                index: 1,
                beacon_block_root: H256::repeat_byte(9),
                source: Checkpoint::default(),
                target: Checkpoint {
                    epoch: 1,
                    root: target_root,
                },
            },
            inclusion_delay: 1,
            proposer_index: 0,
        }
    }

    #[test]
    fn new_records_follow_validator_status() {
        let state = Phase0BeaconState::<Minimal> {
            slot: 8,
            validators: vec![
                Validator {
                    slashed: true,
                    withdrawable_epoch: FAR_FUTURE_EPOCH,
                    effective_balance: 100,
                    ..Validator::default()
                },
                Validator {
                    effective_balance: 100,
                    ..Validator::default()
                },
                Validator {
                    withdrawable_epoch: FAR_FUTURE_EPOCH,
                    exit_epoch: FAR_FUTURE_EPOCH,
                    effective_balance: 100,
                    ..Validator::default()
                },
                Validator {
                    withdrawable_epoch: FAR_FUTURE_EPOCH,
                    exit_epoch: 1,
                    effective_balance: 100,
                    ..Validator::default()
                },
            ],
            ..Phase0BeaconState::default()
        };

        let (records, balance) = new(&state);

        let expected_base = ValidatorRecord {
            current_epoch_effective_balance: 100,
            ..ValidatorRecord::default()
        };

        assert_eq!(
            records,
            [
                ValidatorRecord {
                    slashed: true,
                    ..expected_base
                },
                ValidatorRecord {
                    withdrawable_current_epoch: true,
                    ..expected_base
                },
                ValidatorRecord {
                    active_current_epoch: true,
                    active_previous_epoch: true,
                    ..expected_base
                },
                ValidatorRecord {
                    active_previous_epoch: true,
                    ..expected_base
                },
            ],
        );

        assert_eq!(
            balance,
            Balance {
                active_current_epoch: 100,
                active_previous_epoch: 200,
                ..Balance::default()
            },
        );

        assert!(records
            .iter()
            .all(|record| record.inclusion_slot == FAR_FUTURE_SLOT));
    }

    #[test]
    fn new_caches_floored_total_active_balance() {
        let state = Phase0BeaconState::<Minimal> {
            slot: 8,
            validators: vec![
                Validator {
                    effective_balance: 100,
                    exit_epoch: FAR_FUTURE_EPOCH,
                    ..Validator::default()
                };
                3
            ],
            ..Phase0BeaconState::default()
        };

        let (_, balance) = new(&state);

        assert_eq!(balance.active_current_epoch, 300);
        assert_eq!(
            helper_functions::accessors::total_active_balance(&state),
            GweiSum::from(ETH),
        );
    }

    #[test]
    fn previous_epoch_attestation_marks_committee_members() -> Result<()> {
        let mut state = state_with_committees();
        state.previous_epoch_attestations = vec![previous_epoch_attestation(3, 2, 5)];

        let (records, balance) = new(&state);
        let (records, balance) = process_attestations(&state, records, balance)?;

        let committee = helper_functions::accessors::beacon_committee(&state, 3, 0)?;
        let attesters = [committee[0], committee[2], committee[3]];

        for (validator_index, record) in (0..).zip(&records) {
            let attested = attesters.contains(&validator_index);

            assert_eq!(record.previous_epoch_attester, attested);
            assert_eq!(record.previous_epoch_target_attester, attested);
            assert_eq!(record.previous_epoch_head_attester, attested);
            assert!(!record.current_epoch_attester);

            if attested {
                assert_eq!(record.inclusion_slot, 5);
                assert_eq!(record.inclusion_distance, 2);
                assert_eq!(record.proposer_index, 5);
            } else {
                assert_eq!(record.inclusion_slot, FAR_FUTURE_SLOT);
            }
        }

        assert_eq!(balance.previous_epoch_attested, GweiSum::from(96 * ETH));
        assert_eq!(balance.previous_epoch_target_attested, GweiSum::from(96 * ETH));
        assert_eq!(balance.previous_epoch_head_attested, GweiSum::from(96 * ETH));
        assert_eq!(balance.current_epoch_attested, GweiSum::from(ETH));

        Ok(())
    }

    #[test]
    fn earliest_inclusion_wins() -> Result<()> {
        let mut state = state_with_committees();

        state.previous_epoch_attestations = vec![
            previous_epoch_attestation(3, 2, 5),
            previous_epoch_attestation(3, 1, 7),
            previous_epoch_attestation(3, 4, 9),
        ];

        let (records, balance) = new(&state);
        let (records, _) = process_attestations(&state, records, balance)?;

        let committee = helper_functions::accessors::beacon_committee(&state, 3, 0)?;
        let record = records[usize::try_from(committee[0])?];

        assert_eq!(record.inclusion_slot, 4);
        assert_eq!(record.inclusion_distance, 1);
        assert_eq!(record.proposer_index, 7);

        Ok(())
    }

    #[test]
    fn wrong_target_root_only_counts_as_attesting() -> Result<()> {
        let mut state = state_with_committees();

        state.current_epoch_attestations = vec![current_epoch_attestation(H256::repeat_byte(0xff))];

        let (records, balance) = new(&state);
        let (records, balance) = process_attestations(&state, records, balance)?;

        let attesters = records
            .iter()
            .filter(|record| record.current_epoch_attester)
            .collect_vec();

        assert_eq!(attesters.len(), 4);
        assert!(attesters
            .iter()
            .all(|record| !record.current_epoch_target_attester));
        assert_eq!(balance.current_epoch_attested, GweiSum::from(128 * ETH));
        assert_eq!(balance.current_epoch_target_attested, GweiSum::from(ETH));

        Ok(())
    }

    #[test]
    fn current_epoch_target_matches_epoch_start_root() -> Result<()> {
        let mut state = state_with_committees();

        state.current_epoch_attestations = vec![current_epoch_attestation(H256::repeat_byte(8))];

        let (records, balance) = new(&state);
        let (records, balance) = process_attestations(&state, records, balance)?;

        assert_eq!(
            records
                .iter()
                .filter(|record| record.current_epoch_target_attester)
                .count(),
            4,
        );
        assert!(records.iter().all(|record| !record.previous_epoch_attester));
        assert_eq!(balance.current_epoch_target_attested, GweiSum::from(128 * ETH));

        Ok(())
    }

    #[test]
    fn zero_inclusion_delay_is_rejected() {
        let mut state = state_with_committees();
        state.previous_epoch_attestations = vec![previous_epoch_attestation(3, 0, 5)];

        let (records, balance) = new(&state);

        let error = process_attestations(&state, records, balance)
            .expect_err("inclusion delay of 0 is invalid");

        assert_eq!(error.to_string(), "attestation with inclusion delay of 0");
    }

    #[test]
    fn aggregation_bits_must_match_committee() {
        let mut state = state_with_committees();
        let mut attestation = previous_epoch_attestation(3, 1, 5);
        attestation.aggregation_bits = bits([true; 5]);
        state.previous_epoch_attestations = vec![attestation];

        let (records, balance) = new(&state);

        process_attestations(&state, records, balance)
            .expect_err("committee has 4 members, not 5");
    }

    fn eligible_record() -> ValidatorRecord {
        ValidatorRecord {
            current_epoch_effective_balance: 32 * ETH,
            active_current_epoch: true,
            active_previous_epoch: true,
            ..ValidatorRecord::default()
        }
    }

    fn floored(balance: Balance) -> Balance {
        let mut balance = balance;
        balance.apply_floor::<Minimal>();
        balance
    }

    fn active_balance() -> Balance {
        floored(Balance {
            active_current_epoch: GweiSum::from(64 * 32 * ETH),
            active_previous_epoch: GweiSum::from(64 * 32 * ETH),
            ..Balance::default()
        })
    }

    #[test]
    fn missed_attestations_cost_three_base_rewards() {
        let state = state_with_committees();
        let balance = active_balance();
        let base_reward = get_base_reward::<Minimal>(32 * ETH, balance.active_current_epoch);

        let deltas = attestation_deltas(&Config::minimal(), &state, &balance, &[eligible_record()]);

        assert_eq!(base_reward, 357_771);
        assert_eq!(
            deltas,
            [Delta {
                reward: 0,
                penalty: 3 * 357_771,
            }],
        );
    }

    #[test]
    fn optimal_attester_earns_every_component() {
        let state = state_with_committees();

        let record = ValidatorRecord {
            previous_epoch_attester: true,
            previous_epoch_target_attester: true,
            previous_epoch_head_attester: true,
            inclusion_distance: 1,
            ..eligible_record()
        };

        let balance = Balance {
            previous_epoch_attested: GweiSum::from(64 * 32 * ETH),
            previous_epoch_target_attested: GweiSum::from(64 * 32 * ETH),
            previous_epoch_head_attested: GweiSum::from(64 * 32 * ETH),
            ..active_balance()
        };

        let deltas = attestation_deltas(&Config::minimal(), &state, &balance, &[record]);

        // 3 full components plus the inclusion delay reward minus the proposer share.
        let base_reward = 357_771;
        let expected_reward = 3 * base_reward + base_reward - base_reward / 8;

        assert_eq!(
            deltas,
            [Delta {
                reward: expected_reward,
                penalty: 0,
            }],
        );
    }

    #[test]
    fn slashed_validator_in_leak_pays_inactivity_penalty() {
        let state = Phase0BeaconState::<Minimal> {
            slot: 87,
            ..Phase0BeaconState::default()
        };

        let record = ValidatorRecord {
            slashed: true,
            previous_epoch_attester: true,
            previous_epoch_target_attester: true,
            previous_epoch_head_attester: true,
            inclusion_distance: 1,
            ..eligible_record()
        };

        let balance = active_balance();
        let deltas = attestation_deltas(&Config::minimal(), &state, &balance, &[record]);

        let base_reward = 357_771;
        let finality_delay = 9;
        let inactivity_penalty = 32 * ETH * finality_delay / (1 << 25);

        assert_eq!(
            deltas,
            [Delta {
                reward: 0,
                penalty: 3 * base_reward + (4 * base_reward - base_reward / 8) + inactivity_penalty,
            }],
        );
    }

    #[test]
    fn ineligible_validators_have_no_deltas() {
        let state = state_with_committees();

        let record = ValidatorRecord {
            active_previous_epoch: false,
            ..eligible_record()
        };

        let deltas = attestation_deltas(&Config::minimal(), &state, &active_balance(), &[record]);

        assert_eq!(deltas, [Delta::default()]);
    }

    #[test]
    fn burn_reduces_base_reward() {
        let state = state_with_committees();
        let balance = active_balance();

        let deltas = attestation_deltas(&Config::pulsechain(), &state, &balance, &[eligible_record()]);

        // 357_771 × 10 / 12 × 3 / 4
        assert_eq!(deltas[0].penalty, 3 * 223_606);
    }

    #[test]
    fn proposers_earn_an_eighth_of_attester_base_reward() -> Result<()> {
        let attester = ValidatorRecord {
            current_epoch_effective_balance: 32,
            previous_epoch_attester: true,
            proposer_index: 1,
            ..ValidatorRecord::default()
        };

        let slashed_attester = ValidatorRecord {
            slashed: true,
            ..attester
        };

        let balance = Balance {
            active_current_epoch: 1000,
            ..Balance::default()
        };

        // 32 × 64 / isqrt(1000) / 4 = 16
        let rewards = proposer_deltas::<Minimal>(
            &Config::minimal(),
            &balance,
            &[attester, slashed_attester, ValidatorRecord::default()],
        )?;

        assert_eq!(rewards, [0, 2, 0]);

        Ok(())
    }

    #[test]
    fn proposer_index_out_of_range_is_an_error() {
        let record = ValidatorRecord {
            proposer_index: 3,
            ..ValidatorRecord::default()
        };

        let error = proposer_deltas::<Minimal>(
            &Config::minimal(),
            &Balance::default(),
            &[record, ValidatorRecord::default(), ValidatorRecord::default()],
        )
        .expect_err("there are only 3 validators");

        assert_eq!(
            error.to_string(),
            "proposer index out of range (proposer_index: 3, validator_count: 3)",
        );
    }
}
