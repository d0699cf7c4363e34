use core::num::NonZeroU64;

use anyhow::Result;
use sha2::{Digest as _, Sha256};
use types::{phase0::primitives::H256, preset::Preset};

const BITS_PER_HASH: u64 = 256;

/// Swap-or-not shuffle of a whole list in place.
///
/// Element `i` of the result is element `compute_shuffled_index(i)` of the input.
/// Rounds are applied in reverse and every round swaps disjoint pairs,
/// so each round hashes every 256 bit source only once.
/// See <https://github.com/ethereum/consensus-specs/blob/f7da1a38347155589f5e0403ad3290ffb77f4da6/specs/phase0/beacon-chain.md#compute_shuffled_index>.
pub fn shuffle_slice<P: Preset, T>(slice: &mut [T], seed: H256) -> Result<()> {
    let Some(index_count) = NonZeroU64::new(slice.len().try_into()?) else {
        return Ok(());
    };

    let chunk_count = index_count.get().div_ceil(BITS_PER_HASH);

    for round in (0..P::SHUFFLE_ROUND_COUNT).rev() {
        let pivot = compute_pivot(seed, round, index_count);

        let sources = (0..chunk_count)
            .map(|chunk| compute_source(seed, round, chunk))
            .collect::<Result<Vec<_>>>()?;

        for index in 0..index_count.get() {
            let flip = (pivot + index_count.get() - index) % index_count;

            // Pairs are visited from their lower member. The higher member decides the swap.
            if index < flip {
                let source = sources[usize::try_from(flip / BITS_PER_HASH)?];

                if source_bit(source, flip) {
                    slice.swap(index.try_into()?, flip.try_into()?);
                }
            }
        }
    }

    Ok(())
}

fn compute_pivot(seed: H256, round: u8, index_count: NonZeroU64) -> u64 {
    let digest = Sha256::new()
        .chain_update(seed)
        .chain_update([round])
        .finalize();

    let mut bytes = [0; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes) % index_count
}

fn compute_source(seed: H256, round: u8, chunk: u64) -> Result<H256> {
    let chunk = u32::try_from(chunk)?;

    let digest = Sha256::new()
        .chain_update(seed)
        .chain_update([round])
        .chain_update(chunk.to_le_bytes())
        .finalize();

    Ok(H256::from_slice(&digest))
}

fn source_bit(source: H256, position: u64) -> bool {
    // The lowest byte of the position is its offset within the source.
    let [bit_in_source, ..] = position.to_le_bytes();
    let byte = source[usize::from(bit_in_source / 8)];
    (byte >> (bit_in_source % 8)) & 1 == 1
}
