use core::marker::PhantomData;

use serde::{Deserialize, Serialize};
use typenum::Unsigned as _;

use crate::{
    cache::Cache,
    phase0::{
        consts::GENESIS_SLOT,
        containers::{Checkpoint, PendingAttestation, Validator},
        primitives::{Gwei, Slot, H256},
    },
    preset::Preset,
};

/// The parts of a Phase 0 beacon state read or written during epoch accounting.
///
/// `block_roots`, `randao_mixes` and `slashings` are circular buffers.
/// Their lengths are fixed by the preset.
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

    // > Attestations
    pub previous_epoch_attestations: Vec<PendingAttestation>,
    pub current_epoch_attestations: Vec<PendingAttestation>,

    // > Finality
    pub finalized_checkpoint: Checkpoint,

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
            previous_epoch_attestations: vec![],
            current_epoch_attestations: vec![],
            finalized_checkpoint: Checkpoint::default(),
            cache: Cache::default(),
            phantom: PhantomData,
        }
    }
}
