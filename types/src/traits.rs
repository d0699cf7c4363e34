use duplicate::duplicate_item;

use crate::{
    altair::{
        beacon_state::BeaconState as AltairBeaconState,
        primitives::{InactivityScore, ParticipationFlags},
    },
    cache::Cache,
    phase0::{
        beacon_state::BeaconState as Phase0BeaconState,
        containers::{Checkpoint, Validator},
        primitives::{Gwei, Slot, H256},
    },
    preset::Preset,
};

pub trait BeaconState<P: Preset>: Send + Sync {
    fn slot(&self) -> Slot;
    fn block_roots(&self) -> &[H256];
    fn validators(&self) -> &[Validator];
    fn balances(&self) -> &[Gwei];
    fn randao_mixes(&self) -> &[H256];
    fn slashings(&self) -> &[Gwei];
    fn finalized_checkpoint(&self) -> Checkpoint;
    fn cache(&self) -> &Cache;

    fn slot_mut(&mut self) -> &mut Slot;
    fn balances_mut(&mut self) -> &mut [Gwei];
    fn cache_mut(&mut self) -> &mut Cache;

    // This is needed to split borrows in epoch processing.
    fn balances_mut_with_validators(&mut self) -> (&mut [Gwei], &[Validator]);
}

#[duplicate_item(
    implementor;
    [Phase0BeaconState<P>];
    [AltairBeaconState<P>];
)]
impl<P: Preset> BeaconState<P> for implementor {
    #[duplicate_item(
        field                  return_type;
        [slot]                 [Slot];
        [finalized_checkpoint] [Checkpoint];
    )]
    fn field(&self) -> return_type {
        self.field
    }

    #[duplicate_item(
        field          return_type;
        [block_roots]  [[H256]];
        [validators]   [[Validator]];
        [balances]     [[Gwei]];
        [randao_mixes] [[H256]];
        [slashings]    [[Gwei]];
        [cache]        [Cache];
    )]
    fn field(&self) -> &return_type {
        &self.field
    }

    #[duplicate_item(
        field      method         return_type;
        [slot]     [slot_mut]     [Slot];
        [balances] [balances_mut] [[Gwei]];
        [cache]    [cache_mut]    [Cache];
    )]
    fn method(&mut self) -> &mut return_type {
        &mut self.field
    }

    fn balances_mut_with_validators(&mut self) -> (&mut [Gwei], &[Validator]) {
        (&mut self.balances, &self.validators)
    }
}

pub trait PostAltairBeaconState<P: Preset>: BeaconState<P> {
    fn previous_epoch_participation(&self) -> &[ParticipationFlags];
    fn current_epoch_participation(&self) -> &[ParticipationFlags];
    fn inactivity_scores(&self) -> &[InactivityScore];

    fn inactivity_scores_mut(&mut self) -> &mut [InactivityScore];
}

impl<P: Preset> PostAltairBeaconState<P> for AltairBeaconState<P> {
    #[duplicate_item(
        field                          return_type;
        [previous_epoch_participation] [[ParticipationFlags]];
        [current_epoch_participation]  [[ParticipationFlags]];
        [inactivity_scores]            [[InactivityScore]];
    )]
    fn field(&self) -> &return_type {
        &self.field
    }

    fn inactivity_scores_mut(&mut self) -> &mut [InactivityScore] {
        &mut self.inactivity_scores
    }
}
