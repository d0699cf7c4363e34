use enum_iterator::Sequence;
use types::{
    nonstandard::{AttestationEpoch, GweiSum, Phase},
    phase0::{
        consts::FAR_FUTURE_SLOT,
        primitives::{Gwei, Slot, ValidatorIndex},
    },
    preset::Preset,
};

/// Stake-weighted totals gathered during a single epoch transition.
///
/// All fields are sums of effective balances.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Balance {
    pub active_current_epoch: GweiSum,
    pub active_previous_epoch: GweiSum,
    pub current_epoch_attested: GweiSum,
    pub current_epoch_target_attested: GweiSum,
    pub previous_epoch_attested: GweiSum,
    pub previous_epoch_target_attested: GweiSum,
    pub previous_epoch_head_attested: GweiSum,
}

impl Balance {
    pub fn add_active(&mut self, attestation_epoch: AttestationEpoch, effective_balance: Gwei) {
        let total = match attestation_epoch {
            AttestationEpoch::Previous => &mut self.active_previous_epoch,
            AttestationEpoch::Current => &mut self.active_current_epoch,
        };

        *total += GweiSum::from(effective_balance);
    }

    pub fn add_attested(&mut self, category: AttestationCategory, effective_balance: Gwei) {
        *self.attested_mut(category) += GweiSum::from(effective_balance);
    }

    #[must_use]
    pub const fn attested(&self, category: AttestationCategory) -> GweiSum {
        match category {
            AttestationCategory::CurrentEpoch => self.current_epoch_attested,
            AttestationCategory::CurrentEpochTarget => self.current_epoch_target_attested,
            AttestationCategory::PreviousEpoch => self.previous_epoch_attested,
            AttestationCategory::PreviousEpochTarget => self.previous_epoch_target_attested,
            AttestationCategory::PreviousEpochHead => self.previous_epoch_head_attested,
        }
    }

    /// Raises every total to at least one balance increment.
    ///
    /// Totals are used as divisors, so none of them may be zero.
    pub fn apply_floor<P: Preset>(&mut self) {
        let increment = GweiSum::from(P::EFFECTIVE_BALANCE_INCREMENT.get());

        for total in [
            &mut self.active_current_epoch,
            &mut self.active_previous_epoch,
            &mut self.current_epoch_attested,
            &mut self.current_epoch_target_attested,
            &mut self.previous_epoch_attested,
            &mut self.previous_epoch_target_attested,
            &mut self.previous_epoch_head_attested,
        ] {
            *total = (*total).max(increment);
        }
    }

    fn attested_mut(&mut self, category: AttestationCategory) -> &mut GweiSum {
        match category {
            AttestationCategory::CurrentEpoch => &mut self.current_epoch_attested,
            AttestationCategory::CurrentEpochTarget => &mut self.current_epoch_target_attested,
            AttestationCategory::PreviousEpoch => &mut self.previous_epoch_attested,
            AttestationCategory::PreviousEpochTarget => &mut self.previous_epoch_target_attested,
            AttestationCategory::PreviousEpochHead => &mut self.previous_epoch_head_attested,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Sequence)]
pub enum AttestationCategory {
    CurrentEpoch,
    CurrentEpochTarget,
    PreviousEpoch,
    PreviousEpochTarget,
    PreviousEpochHead,
}

/// What epoch processing needs to know about one validator.
///
/// Records are index-aligned with the validator registry.
#[expect(clippy::struct_excessive_bools)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ValidatorRecord {
    pub current_epoch_effective_balance: Gwei,
    pub inactivity_score: u64,
    pub slashed: bool,
    pub withdrawable_current_epoch: bool,
    pub active_current_epoch: bool,
    pub active_previous_epoch: bool,
    pub current_epoch_attester: bool,
    pub current_epoch_target_attester: bool,
    pub previous_epoch_attester: bool,
    pub previous_epoch_source_attester: bool,
    pub previous_epoch_target_attester: bool,
    pub previous_epoch_head_attester: bool,
    pub inclusion_slot: Slot,
    pub inclusion_distance: Slot,
    pub proposer_index: ValidatorIndex,
    pub before_epoch_transition_balance: Gwei,
    pub after_epoch_transition_balance: Gwei,
}

impl Default for ValidatorRecord {
    fn default() -> Self {
        Self {
            current_epoch_effective_balance: 0,
            inactivity_score: 0,
            slashed: false,
            withdrawable_current_epoch: false,
            active_current_epoch: false,
            active_previous_epoch: false,
            current_epoch_attester: false,
            current_epoch_target_attester: false,
            previous_epoch_attester: false,
            previous_epoch_source_attester: false,
            previous_epoch_target_attester: false,
            previous_epoch_head_attester: false,
            inclusion_slot: FAR_FUTURE_SLOT,
            inclusion_distance: FAR_FUTURE_SLOT,
            proposer_index: 0,
            before_epoch_transition_balance: 0,
            after_epoch_transition_balance: 0,
        }
    }
}

impl ValidatorRecord {
    /// Whether the validator is rewarded or penalized for the previous epoch.
    #[must_use]
    pub const fn eligible(&self) -> bool {
        self.active_previous_epoch || (self.slashed && !self.withdrawable_current_epoch)
    }

    /// Whether the validator counts toward `category` in `phase`.
    ///
    /// Phase 0 has no separate source flag. Any included previous epoch attestation counts.
    #[must_use]
    pub const fn attested(&self, phase: Phase, category: AttestationCategory) -> bool {
        match category {
            AttestationCategory::CurrentEpoch => self.current_epoch_attester,
            AttestationCategory::CurrentEpochTarget => self.current_epoch_target_attester,
            AttestationCategory::PreviousEpoch => match phase {
                Phase::Phase0 => self.previous_epoch_attester,
                Phase::Altair | Phase::Bellatrix | Phase::Capella => {
                    self.previous_epoch_source_attester
                }
            },
            AttestationCategory::PreviousEpochTarget => self.previous_epoch_target_attester,
            AttestationCategory::PreviousEpochHead => self.previous_epoch_head_attester,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Delta {
    pub reward: Gwei,
    pub penalty: Gwei,
}

/// Adds attested balances of unslashed validators to `balance` and floors the result.
#[must_use]
pub fn update_balance<P: Preset>(
    phase: Phase,
    records: &[ValidatorRecord],
    mut balance: Balance,
) -> Balance {
    for record in records.iter().filter(|record| !record.slashed) {
        for category in enum_iterator::all() {
            if record.attested(phase, category) {
                balance.add_attested(category, record.current_epoch_effective_balance);
            }
        }
    }

    balance.apply_floor::<P>();
    balance
}
