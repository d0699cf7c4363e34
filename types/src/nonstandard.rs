use core::num::NonZeroU128;

use enum_iterator::Sequence;
use enum_map::Enum;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Sum of balances of arbitrarily many validators.
///
/// 64 bits are not enough for registry-wide sums in presets with large balance increments.
pub type GweiSum = u128;

pub type NonZeroGweiSum = NonZeroU128;

#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Debug,
    Enum,
    Sequence,
    AsRefStr,
    Display,
    EnumString,
    Deserialize,
    Serialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Phase0,
    Altair,
    Bellatrix,
    Capella,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Enum)]
pub enum RelativeEpoch {
    Previous,
    Current,
    Next,
}

impl From<AttestationEpoch> for RelativeEpoch {
    fn from(attestation_epoch: AttestationEpoch) -> Self {
        match attestation_epoch {
            AttestationEpoch::Previous => Self::Previous,
            AttestationEpoch::Current => Self::Current,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AttestationEpoch {
    Previous,
    Current,
}
