use thiserror::Error;
use types::phase0::primitives::{Slot, ValidatorIndex};

#[derive(Debug, Error)]
pub enum Error {
    #[error("epoch processing was cancelled")]
    Cancelled,
    #[error(
        "num of validators is different than num of inactivity scores \
         (validators: {validator_count}, inactivity_scores: {inactivity_score_count})"
    )]
    InactivityScoreCountMismatch {
        validator_count: usize,
        inactivity_score_count: usize,
    },
    #[error("inactivity score of validator {validator_index} overflowed")]
    InactivityScoreOverflow { validator_index: ValidatorIndex },
    #[error("attestation with inclusion delay of 0")]
    InclusionDelayZero,
    #[error(
        "participation lists do not match validator registry \
         (validators: {validator_count}, previous: {previous_count}, current: {current_count})"
    )]
    ParticipationCountMismatch {
        validator_count: usize,
        previous_count: usize,
        current_count: usize,
    },
    #[error(
        "proposer index out of range \
         (proposer_index: {proposer_index}, validator_count: {validator_count})"
    )]
    ProposerIndexOutOfRange {
        proposer_index: ValidatorIndex,
        validator_count: usize,
    },
    #[error(
        "validator registries not the same length \
         (records: {records}, validators: {validators}, balances: {balances}, deltas: {deltas})"
    )]
    RegistryLengthMismatch {
        records: usize,
        validators: usize,
        balances: usize,
        deltas: usize,
    },
    #[error("target slot ({target}) is not later than current slot ({current})")]
    SlotNotLater { current: Slot, target: Slot },
    #[error(
        "num of validators is different than num of balances \
         (validators: {validator_count}, balances: {balance_count})"
    )]
    ValidatorBalanceCountMismatch {
        validator_count: usize,
        balance_count: usize,
    },
    #[error("validator index {validator_index} is out of range")]
    ValidatorIndexOutOfRange { validator_index: ValidatorIndex },
}
