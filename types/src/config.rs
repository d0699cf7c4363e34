use core::num::NonZeroU64;
use std::{borrow::Cow, collections::BTreeMap};

use anyhow::Result;
use enum_iterator::Sequence as _;
use nonzero_ext::nonzero;
use serde::{de::IgnoredAny, Deserialize, Serialize};
use thiserror::Error;
use typenum::Unsigned as _;

use crate::{
    nonstandard::Phase,
    phase0::{
        consts::{FAR_FUTURE_EPOCH, GENESIS_EPOCH},
        primitives::{Epoch, Slot},
    },
    preset::{Preset, PresetName},
};

/// Configuration variables customizable at runtime.
///
/// See [configurations in `consensus-specs`](https://github.com/ethereum/consensus-specs/tree/aac851f860fa384916f62027b2dbe3318a354c5b/configs).
/// Only the variables read during epoch accounting are included.
/// Unknown variables in YAML files are accepted and ignored.
#[expect(
    clippy::unsafe_derive_deserialize,
    reason = "A false positive triggered by `nonzero!`. \
              `Config` has no invariants. It is intended to be deserialized from user input."
)]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Config {
    // Meta
    pub config_name: Cow<'static, str>,
    pub preset_base: PresetName,

    // Forking
    pub altair_fork_epoch: Epoch,
    pub bellatrix_fork_epoch: Epoch,
    pub capella_fork_epoch: Epoch,

    // Time parameters
    pub seconds_per_slot: NonZeroU64,

    // Validator cycle
    pub inactivity_score_bias: NonZeroU64,
    pub inactivity_score_recovery_rate: u64,

    // Rewards
    pub base_reward_adjustment: BaseRewardAdjustment,

    #[serde(flatten, skip_serializing)]
    pub unknown: BTreeMap<String, IgnoredAny>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Meta
            //
            // Use `default` as the default `config_name` and override it in `Config::mainnet`.
            config_name: Cow::Borrowed("default"),
            preset_base: PresetName::Mainnet,

            // Forking
            altair_fork_epoch: FAR_FUTURE_EPOCH,
            bellatrix_fork_epoch: FAR_FUTURE_EPOCH,
            capella_fork_epoch: FAR_FUTURE_EPOCH,

            // Time parameters
            seconds_per_slot: nonzero!(12_u64),

            // Validator cycle
            inactivity_score_bias: nonzero!(4_u64),
            inactivity_score_recovery_rate: 16,

            // Rewards
            base_reward_adjustment: BaseRewardAdjustment::None,

            unknown: BTreeMap::new(),
        }
    }
}

impl Config {
    /// [Mainnet configuration](https://github.com/eth-clients/mainnet/blob/978f1794eada6f85bee76e4d2d5959a5fb8e0cc5/metadata/config.yaml).
    #[must_use]
    pub fn mainnet() -> Self {
        Self {
            config_name: Cow::Borrowed("mainnet"),
            altair_fork_epoch: 74240,
            bellatrix_fork_epoch: 144_896,
            capella_fork_epoch: 194_048,
            ..Self::default()
        }
    }

    /// [Minimal configuration](https://github.com/ethereum/consensus-specs/blob/aac851f860fa384916f62027b2dbe3318a354c5b/configs/minimal.yaml).
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            // Meta
            config_name: Cow::Borrowed("minimal"),
            preset_base: PresetName::Minimal,

            // Time parameters
            seconds_per_slot: nonzero!(6_u64),

            ..Self::default()
        }
    }

    /// PulseChain mainnet configuration.
    ///
    /// Base rewards are scaled to 10 second slots and partially burned.
    #[must_use]
    pub fn pulsechain() -> Self {
        Self {
            // Meta
            config_name: Cow::Borrowed("pulsechain"),
            preset_base: PresetName::PulseChain,

            // Forking
            altair_fork_epoch: 1,
            bellatrix_fork_epoch: 2,
            capella_fork_epoch: 3,

            // Time parameters
            seconds_per_slot: nonzero!(10_u64),

            // Rewards
            base_reward_adjustment: BaseRewardAdjustment::PulseChainBurn,

            ..Self::default()
        }
    }

    /// PulseChain testnet v4 configuration.
    #[must_use]
    pub fn pulsechain_testnet_v4() -> Self {
        Self {
            // Meta
            config_name: Cow::Borrowed("pulsechain-testnet-v4"),

            // Forking
            capella_fork_epoch: 4200,

            ..Self::pulsechain()
        }
    }

    /// Parses a configuration in the format used by `config.yaml` files and validates it.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config = serde_yaml::from_str::<Self>(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.config_name.is_empty() {
            return Err(Error::NameEmpty);
        }

        // See <https://github.com/ethereum/consensus-specs/blob/aac851f860fa384916f62027b2dbe3318a354c5b/configs/mainnet.yaml#L10>.
        for character in self.config_name.chars() {
            if !matches!(character, 'a'..='z' | '0'..='9' | '-') {
                return Err(Error::NameContainsIllegalCharacters);
            }
        }

        let fork_epochs = self
            .fork_epochs()
            .map(|(_, epoch)| epoch)
            .collect::<Vec<_>>();

        if !fork_epochs.is_sorted() {
            return Err(Error::ForkEpochsOutOfOrder);
        }

        Ok(())
    }

    #[must_use]
    pub const fn fork_epoch(&self, phase: Phase) -> Epoch {
        match phase {
            Phase::Phase0 => GENESIS_EPOCH,
            Phase::Altair => self.altair_fork_epoch,
            Phase::Bellatrix => self.bellatrix_fork_epoch,
            Phase::Capella => self.capella_fork_epoch,
        }
    }

    /// First slot of `phase` or `None` if it is scheduled too far in the future to have one.
    #[must_use]
    pub fn fork_slot<P: Preset>(&self, phase: Phase) -> Option<Slot> {
        self.fork_epoch(phase).checked_mul(P::SlotsPerEpoch::U64)
    }

    #[must_use]
    pub fn genesis_phase(&self) -> Phase {
        self.phase_at_epoch(GENESIS_EPOCH)
    }

    #[must_use]
    pub fn phase_at_epoch(&self, epoch: Epoch) -> Phase {
        self.fork_epochs()
            .take_while(|(_, fork_epoch)| *fork_epoch <= epoch)
            .map(|(phase, _)| phase)
            .last()
            .unwrap_or(Phase::Phase0)
    }

    #[must_use]
    pub fn phase_at_slot<P: Preset>(&self, slot: Slot) -> Phase {
        enum_iterator::all()
            .map(|phase| (phase, self.fork_slot::<P>(phase)))
            .take_while(|(_, fork_slot)| fork_slot.is_some_and(|fork_slot| fork_slot <= slot))
            .map(|(phase, _)| phase)
            .last()
            .unwrap_or(Phase::Phase0)
    }

    fn fork_epochs(&self) -> impl Iterator<Item = (Phase, Epoch)> {
        // Do not remove the type annotation.
        // It ensures that this method is up to date when new phases are added.
        let fields: [_; Phase::CARDINALITY - 1] = [
            self.altair_fork_epoch,
            self.bellatrix_fork_epoch,
            self.capella_fork_epoch,
        ];

        enum_iterator::all().skip(1).zip(fields)
    }
}

/// Post-processing applied to every base reward before it is used in reward or penalty formulas.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseRewardAdjustment {
    #[default]
    None,
    /// Rescale to the configured slot duration and burn a quarter.
    PulseChainBurn,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration name is empty")]
    NameEmpty,
    #[error("configuration name contains illegal characters")]
    NameContainsIllegalCharacters,
    #[error("fork epochs are not in chronological order")]
    ForkEpochsOutOfOrder,
}
