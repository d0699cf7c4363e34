pub mod combined;

pub mod unphased {
    pub use epoch_intermediates::{
        update_balance, AttestationCategory, Balance, Delta, ValidatorRecord,
    };
    pub use epoch_processing::{
        check_cancellation, process_rewards_and_penalties, process_slashings,
        proportional_slashing_multiplier, should_process_rewards_and_penalties, EpochReport,
        SlashingPenalties,
    };
    pub use error::Error;
    pub use slot_processing::advance_slot;

    mod epoch_intermediates;
    mod epoch_processing;
    mod error;
    mod slot_processing;
}

pub mod phase0 {
    pub use epoch_intermediates::{
        attestation_deltas, epoch_deltas, new, process_attestations, proposer_deltas,
    };
    pub use epoch_processing::{process_epoch, process_participation_record_updates};
    pub use slot_processing::process_slots;

    mod epoch_intermediates;
    mod epoch_processing;
    mod slot_processing;
}

pub mod altair {
    pub use epoch_intermediates::{
        attestation_deltas, inactivity_penalty_quotient, initialize_validator_records,
        process_epoch_participation, unrealized_checkpoint_balances,
    };
    pub use epoch_processing::{
        compute_inactivity_scores, process_epoch, process_inactivity_updates,
        process_participation_flag_updates,
    };
    pub use slot_processing::process_slots;

    mod epoch_intermediates;
    mod epoch_processing;
    mod slot_processing;
}
