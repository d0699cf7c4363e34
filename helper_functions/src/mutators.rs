use anyhow::Result;
use types::phase0::primitives::Gwei;

use crate::error::Error;

#[inline]
pub fn increase_balance(balance: &mut Gwei, delta: Gwei) -> Result<()> {
    *balance = balance.checked_add(delta).ok_or(Error::BalanceOverflow)?;
    Ok(())
}

#[inline]
pub fn decrease_balance(balance: &mut Gwei, delta: Gwei) {
    *balance = balance.saturating_sub(delta);
}
