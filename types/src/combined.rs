use serde::{Deserialize, Serialize};

use crate::{
    altair::beacon_state::BeaconState as AltairBeaconState,
    nonstandard::Phase,
    phase0::{
        beacon_state::BeaconState as Phase0BeaconState,
        containers::Validator,
        primitives::{Gwei, Slot},
    },
    preset::Preset,
};

/// A beacon state of any supported phase.
///
/// The variant is fixed when the state is deserialized or upgraded.
/// Epoch processing matches on it once and then works with the concrete type.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(bound = "", tag = "phase", content = "state", rename_all = "lowercase")]
pub enum BeaconState<P: Preset> {
    Phase0(Phase0BeaconState<P>),
    Altair(AltairBeaconState<P>),
    Bellatrix(AltairBeaconState<P>),
    Capella(AltairBeaconState<P>),
}

impl<P: Preset> From<Phase0BeaconState<P>> for BeaconState<P> {
    fn from(state: Phase0BeaconState<P>) -> Self {
        Self::Phase0(state)
    }
}

impl<P: Preset> BeaconState<P> {
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self {
            Self::Phase0(_) => Phase::Phase0,
            Self::Altair(_) => Phase::Altair,
            Self::Bellatrix(_) => Phase::Bellatrix,
            Self::Capella(_) => Phase::Capella,
        }
    }

    /// Wraps a post-Altair state in the variant for `phase`.
    ///
    /// Returns `None` for [`Phase::Phase0`], which has a different layout.
    #[must_use]
    pub fn from_post_altair(phase: Phase, state: AltairBeaconState<P>) -> Option<Self> {
        match phase {
            Phase::Phase0 => None,
            Phase::Altair => Some(Self::Altair(state)),
            Phase::Bellatrix => Some(Self::Bellatrix(state)),
            Phase::Capella => Some(Self::Capella(state)),
        }
    }

    #[must_use]
    pub const fn slot(&self) -> Slot {
        match self {
            Self::Phase0(state) => state.slot,
            Self::Altair(state) | Self::Bellatrix(state) | Self::Capella(state) => state.slot,
        }
    }

    #[must_use]
    pub fn validators(&self) -> &[Validator] {
        match self {
            Self::Phase0(state) => &state.validators,
            Self::Altair(state) | Self::Bellatrix(state) | Self::Capella(state) => {
                &state.validators
            }
        }
    }

    #[must_use]
    pub fn balances(&self) -> &[Gwei] {
        match self {
            Self::Phase0(state) => &state.balances,
            Self::Altair(state) | Self::Bellatrix(state) | Self::Capella(state) => {
                &state.balances
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::preset::Minimal;

    use super::*;

    #[test]
    fn phase_matches_variant() {
        let phase0 = BeaconState::from(Phase0BeaconState::<Minimal>::default());
        let capella =
            BeaconState::from_post_altair(Phase::Capella, AltairBeaconState::<Minimal>::default());

        assert_eq!(phase0.phase(), Phase::Phase0);
        assert_eq!(capella.map(|state| state.phase()), Some(Phase::Capella));
        assert!(
            BeaconState::from_post_altair(Phase::Phase0, AltairBeaconState::<Minimal>::default())
                .is_none()
        );
    }

    #[test]
    fn state_deserializes_into_the_tagged_variant() -> anyhow::Result<()> {
        let yaml = concat!(
            "phase: bellatrix\n",
            "state:\n",
            "  slot: 17\n",
            "  block_roots: []\n",
            "  validators:\n",
            "    - effective_balance: 32000000000\n",
            "      slashed: false\n",
            "      activation_eligibility_epoch: 0\n",
            "      activation_epoch: 0\n",
            "      exit_epoch: 18446744073709551615\n",
            "      withdrawable_epoch: 18446744073709551615\n",
            "  balances: [32000000000]\n",
            "  randao_mixes: []\n",
            "  slashings: []\n",
            "  previous_epoch_participation: [7]\n",
            "  current_epoch_participation: [0]\n",
            "  finalized_checkpoint:\n",
            "    epoch: 0\n",
            "    root: '0x0000000000000000000000000000000000000000000000000000000000000000'\n",
            "  inactivity_scores: [3]\n",
        );

        let state = serde_yaml::from_str::<BeaconState<Minimal>>(yaml)?;

        assert_eq!(state.phase(), Phase::Bellatrix);
        assert_eq!(state.slot(), 17);
        assert_eq!(state.balances(), [32_000_000_000]);
        assert_eq!(state.validators().len(), 1);

        Ok(())
    }
}
