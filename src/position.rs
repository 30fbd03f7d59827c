//! Mapping of a single 64-bit hash to one block and `k` bits within it.
//!
//! The high 32 bits of the hash select the block using a multiply-shift range
//! reduction, so every bit probed for a key lives in the same cache line.
//!
//! The in-block offsets are derived from the hash using enhanced double
//! hashing, producing `k` offsets from one hash rather than computing `k`
//! independent hashes:
//!
//! ```text
//!     h0   = hash as u32
//!     h1   = hash.rotate_right(21) as u32
//!     g(i) = h0 + i * h1 + i * (i + 1) / 2        (mod 2^32)
//!
//!     offset(i) = fmix32(g(i)) >> 23
//! ```
//!
//! The triangular correction term breaks the short cycles plain double hashing
//! falls into when `h1` shares a factor with the block size.
//!
//! Each term is reduced to the 512-bit block through the murmur3 32-bit
//! finaliser rather than a bitmask or a plain multiply. Both of those preserve
//! the arithmetic progression of `g(i)`: two keys in the same block whose
//! `h0` and `h1` are close would then share most of their probed bits, putting
//! a floor under the false-positive rate that no amount of extra space
//! removes. The finaliser avalanches every term, so the `k` offsets behave as
//! independent uniform draws, which is what
//! [`blocked_fp_rate`](crate::blocked_fp_rate) assumes when sizing a filter.
//!
//! Changing any of the above changes the bit layout of every filter.

use crate::blocks::BLOCK_BITS;

const OFFSET_SHIFT: u32 = u32::BITS - BLOCK_BITS.trailing_zeros();

/// The block and in-block bit offsets for one hash.
#[derive(Debug, Clone)]
pub(crate) struct Position {
    pub(crate) block: usize,
    pub(crate) offsets: Offsets,
}

/// Iterator over the `k` in-block bit offsets of a [`Position`].
#[derive(Debug, Clone)]
pub(crate) struct Offsets {
    h0: u32,
    h1: u32,
    remaining: u32,
}

impl Iterator for Offsets {
    type Item = u32;

    #[inline]
    fn next(&mut self) -> Option<u32> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let offset = fmix32(self.h0) >> OFFSET_SHIFT;

        // Advance g(i) to g(i + 1): the step grows by one each round, adding
        // the triangular term incrementally.
        self.h1 = self.h1.wrapping_add(1);
        self.h0 = self.h0.wrapping_add(self.h1);

        Some(offset)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining as usize, Some(self.remaining as usize))
    }
}

impl ExactSizeIterator for Offsets {}

/// Compute the block (out of `nblocks`) and the `k` bit offsets for `hash`.
///
/// `nblocks` must be non-zero and no more than `u32::MAX`, which
/// [`Filter`](crate::Filter) construction guarantees.
#[inline]
pub(crate) fn locate(hash: u64, nblocks: usize, k: u32) -> Position {
    debug_assert!(nblocks > 0 && nblocks as u64 <= u64::from(u32::MAX));

    Position {
        block: reduce_range(hash >> 32, nblocks as u64) as usize,
        offsets: Offsets {
            h0: hash as u32,
            h1: hash.rotate_right(21) as u32,
            remaining: k,
        },
    }
}

/// The murmur3 32-bit finaliser, a bijection in which every input bit affects
/// every output bit.
#[inline(always)]
fn fmix32(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85EB_CA6B);
    h ^= h >> 13;
    h = h.wrapping_mul(0xC2B2_AE35);
    h ^ (h >> 16)
}

/// Map a 32-bit value uniformly onto `[0, n)` without a division.
///
/// See <https://lemire.me/blog/2016/06/27/a-fast-alternative-to-the-modulo-reduction/>
#[inline(always)]
fn reduce_range(x: u64, n: u64) -> u64 {
    (x * n) >> 32
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_offset_shift() {
        assert_eq!(OFFSET_SHIFT, 23);
    }

    #[test]
    fn test_reduce_range_bounds() {
        assert_eq!(reduce_range(0, 10), 0);
        assert_eq!(reduce_range(u64::from(u32::MAX), 10), 9);
        assert_eq!(reduce_range(u64::from(u32::MAX), 1), 0);
        assert_eq!(reduce_range(1 << 31, 10), 5);
    }

    #[test]
    fn test_block_from_high_word() {
        // Only the high half of the hash selects the block.
        let a = locate(0x8000_0000_0000_0000, 100, 3);
        let b = locate(0x8000_0000_FFFF_FFFF, 100, 3);
        assert_eq!(a.block, 50);
        assert_eq!(b.block, 50);
        assert_eq!(locate(u64::MAX, 100, 3).block, 99);
        assert_eq!(locate(0, 100, 3).block, 0);
    }

    #[test]
    fn test_known_offsets() {
        // h0 = 1 << 21, h1 = 1
        let h0 = 1u32 << 21;
        let got: Vec<_> = locate(1 << 21, 1, 4).offsets.collect();
        let want: Vec<_> = [h0, h0 + 1 + 1, h0 + 2 + 3, h0 + 3 + 6]
            .iter()
            .map(|&g| fmix32(g) >> 23)
            .collect();
        assert_eq!(got, want);
    }

    #[test]
    fn test_offsets_exact_size() {
        let p = locate(42, 8, 7);
        assert_eq!(p.offsets.len(), 7);
        assert_eq!(p.offsets.count(), 7);
        assert_eq!(locate(42, 8, 0).offsets.count(), 0);
    }

    #[test]
    fn test_offsets_spread_over_block() {
        // With enough probes every word of the block is reachable from a
        // single hash.
        let mut words = [false; 8];
        for off in locate(0xDEAD_BEEF_CAFE_F00D, 1, 256).offsets {
            words[(off / 64) as usize] = true;
        }
        assert!(words.iter().all(|&w| w));
    }

    #[test]
    fn test_neighbouring_keys_do_not_share_probes() {
        // Advancing h0 by the inverse of the golden ratio multiplier moves a
        // multiplicatively reduced offset sequence by a single unit, so every
        // probe of the neighbouring key would land on the same bit.
        const NEIGHBOUR: u32 = 0x144C_BC89;
        assert_eq!(NEIGHBOUR.wrapping_mul(0x9E37_79B9), 1);

        let k = 16;
        let shared: usize = (0..100u32)
            .map(|base| {
                let h0 = base.wrapping_mul(0x9E37_79B9);
                let h1 = base.wrapping_mul(0x2545_F491);
                let a = Offsets { h0, h1, remaining: k };
                let b = Offsets {
                    h0: h0.wrapping_add(NEIGHBOUR),
                    h1,
                    remaining: k,
                };
                a.zip(b).filter(|(x, y)| x == y).count()
            })
            .sum();

        // Independent offsets agree at 100 * 16 / 512 positions on average.
        assert!(shared < 20, "{} of 1600 probes shared", shared);
    }

    #[quickcheck]
    fn test_in_range(hash: u64, nblocks: u32, k: u8) -> bool {
        let nblocks = nblocks.max(1) as usize;
        let p = locate(hash, nblocks, u32::from(k));
        p.block < nblocks && p.offsets.clone().all(|o| o < BLOCK_BITS)
    }

    #[quickcheck]
    fn test_deterministic(hash: u64, nblocks: u16) -> bool {
        let nblocks = nblocks.max(1) as usize;
        let a = locate(hash, nblocks, 9);
        let b = locate(hash, nblocks, 9);
        a.block == b.block && a.offsets.eq(b.offsets)
    }
}
