// crc.rs — 64-bit asset name hashes
//
// Names are hashed with CRC-64/ECMA-182. A hash can be seeded with another
// hash so "<map base>" + "*3" chains into the sub-model's asset name.

use crc::{Crc, CRC_64_ECMA_182};

const CRC_CALC: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

/// Hash a byte string.
#[inline]
pub fn hash64(data: &[u8]) -> u64 {
    CRC_CALC.checksum(data)
}

/// Hash a byte string, continuing from `seed`.
///
/// `hash64_seeded(b, hash64(a)) == hash64(a ++ b)`.
pub fn hash64_seeded(data: &[u8], seed: u64) -> u64 {
    let mut digest = CRC_CALC.digest_with_initial(seed);
    digest.update(data);
    digest.finalize()
}
