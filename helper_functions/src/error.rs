use thiserror::Error;
use types::phase0::primitives::{Epoch, Slot, ValidatorIndex};

#[derive(Debug, Error)]
pub(crate) enum Error {
    #[error("balance overflowed")]
    BalanceOverflow,
    #[error("committee index is out of bounds")]
    CommitteeIndexOutOfBounds,
    #[error("aggregation bitlist length {aggregation_bitlist_length} does not match committee length {committee_length}")]
    CommitteeLengthMismatch {
        aggregation_bitlist_length: usize,
        committee_length: usize,
    },
    #[error("epoch is after next one relative to state")]
    EpochAfterNext,
    #[error("epoch is before previous one relative to state")]
    EpochBeforePrevious,
    #[error("epoch is in the future relative to state")]
    EpochInTheFuture,
    #[error("state has no RANDAO mix for epoch {epoch}")]
    RandaoMixOutOfRange { epoch: Epoch },
    #[error("slot {slot} is out of range")]
    SlotOutOfRange { slot: Slot },
    #[error("validator index {validator_index} is out of bounds")]
    ValidatorIndexOutOfBounds { validator_index: ValidatorIndex },
}
