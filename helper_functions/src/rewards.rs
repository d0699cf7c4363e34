use core::num::NonZeroU64;

use arithmetic::U128Ext as _;
use types::{
    config::{BaseRewardAdjustment, Config},
    phase0::primitives::Gwei,
};

/// Slot duration base rewards are calibrated for.
const REFERENCE_SECONDS_PER_SLOT: u64 = 12;

/// Applies the adjustment selected in `config` to a base reward.
#[must_use]
pub fn adjust_base_reward(config: &Config, base_reward: Gwei) -> Gwei {
    match config.base_reward_adjustment {
        BaseRewardAdjustment::None => base_reward,
        BaseRewardAdjustment::PulseChainBurn => apply_burn(base_reward, config.seconds_per_slot),
    }
}

/// Scales a base reward to the slot duration and burns a quarter of the result.
///
/// Both steps round down. Shorter slots mean more epochs per unit of time,
/// so the reward per epoch shrinks in proportion.
#[must_use]
pub fn apply_burn(base_reward: Gwei, seconds_per_slot: NonZeroU64) -> Gwei {
    let scaled = u128::from(base_reward) * u128::from(seconds_per_slot.get())
        / u128::from(REFERENCE_SECONDS_PER_SLOT);

    let after_burn = (scaled * 3 / 4).saturating_into_u64();

    log::debug!("applied reward burn (base_reward: {base_reward}, after_burn: {after_burn})");

    after_burn
}
