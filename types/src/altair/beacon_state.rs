use core::marker::PhantomData;

use serde::{Deserialize, Serialize};
use typenum::Unsigned as _;

use crate::{
    altair::primitives::{InactivityScore, ParticipationFlags},
    cache::Cache,
    phase0::{
        consts::GENESIS_SLOT,
        containers::{Checkpoint, Validator},
        primitives::{Gwei, Slot, H256},
    },
    preset::Preset,
};

/// The parts of an Altair beacon state read or written during epoch accounting.
///
/// Later phases do not change any of these fields, so Bellatrix and Capella states use this type too.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(bound = "", deny_unknown_fields)]
pub struct BeaconState<P: Preset> {
    // > Versioning
    pub slot: Slot,

    // > History
    pub block_roots: Vec<H256>,

    // > Registry
    pub validators: Vec<Validator>,
    pub balances: Vec<Gwei>,

    // > Randomness
    pub randao_mixes: Vec<H256>,

    // > Slashings
    pub slashings: Vec<Gwei>,

    // > Participation
    pub previous_epoch_participation: Vec<ParticipationFlags>,
    pub current_epoch_participation: Vec<ParticipationFlags>,

    // > Finality
    pub finalized_checkpoint: Checkpoint,

    // > Inactivity
    pub inactivity_scores: Vec<InactivityScore>,

    // Cache
    #[serde(skip)]
    pub cache: Cache,

    #[serde(skip)]
    pub phantom: PhantomData<P>,
}

impl<P: Preset> Default for BeaconState<P> {
    fn default() -> Self {
        Self {
            slot: GENESIS_SLOT,
            block_roots: vec![H256::zero(); P::SlotsPerHistoricalRoot::USIZE],
            validators: vec![],
            balances: vec![],
            randao_mixes: vec![H256::zero(); P::EpochsPerHistoricalVector::USIZE],
            slashings: vec![0; P::EpochsPerSlashingsVector::USIZE],
            previous_epoch_participation: vec![],
            current_epoch_participation: vec![],
            finalized_checkpoint: Checkpoint::default(),
            inactivity_scores: vec![],
            cache: Cache::default(),
            phantom: PhantomData,
        }
    }
}
