use core::num::NonZeroU64;

use hex_literal::hex;
use nonzero_ext::nonzero;

use crate::phase0::primitives::{DomainType, Epoch, Slot, H32};

pub const BASE_REWARDS_PER_EPOCH: NonZeroU64 = nonzero!(4_u64);
pub const DOMAIN_BEACON_ATTESTER: DomainType = H32(hex!("01000000"));
pub const FAR_FUTURE_EPOCH: Epoch = Epoch::MAX;
pub const GENESIS_EPOCH: Epoch = 0;
pub const GENESIS_SLOT: Slot = 0;

/// Sentinel for inclusion fields of validators that have no included attestation.
pub const FAR_FUTURE_SLOT: Slot = Slot::MAX;
