//! Cache-line aligned bit storage backing a [`Filter`](crate::Filter).

use std::hint;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of bits in a single block.
///
/// A block is exactly one 64 byte cache line, so every bit probed for a single
/// key is read from (or written to) one line of memory.
pub const BLOCK_BITS: u32 = 512;

const WORD_BITS: u32 = u64::BITS;
const BLOCK_WORDS: usize = (BLOCK_BITS / WORD_BITS) as usize;

/// One cache line of filter bits.
///
/// The words are atomics so that [`BlockStore::set_bit_atomic`] and
/// [`BlockStore::test_bit`] can operate through a shared reference; exclusive
/// access bypasses the atomic operations entirely.
#[derive(Debug, Default)]
#[repr(C, align(64))]
pub(crate) struct Block([AtomicU64; BLOCK_WORDS]);

/// Returns the word within a block holding `bit`, and the mask selecting it.
#[inline(always)]
fn word_and_mask(bit: u32) -> (usize, u64) {
    debug_assert!(bit < BLOCK_BITS, "bit {} out of block range", bit);
    ((bit / WORD_BITS) as usize, 1 << (bit % WORD_BITS))
}

/// A fixed number of zero-initialised 512-bit blocks.
///
/// The number of blocks never changes after construction. Block and bit
/// indexes are always produced by [`locate`](crate::position::locate) and are
/// only bounds checked in debug builds (plus the slice bounds check on the
/// block index).
pub(crate) struct BlockStore {
    blocks: Box<[Block]>,
}

impl BlockStore {
    /// Allocate `nblocks` blocks with every bit unset.
    pub(crate) fn new(nblocks: usize) -> Self {
        let blocks = (0..nblocks).map(|_| Block::default()).collect();
        Self { blocks }
    }

    /// Construct a store from the flat word representation produced by
    /// [`BlockStore::words`].
    ///
    /// The caller must provide a whole number of blocks.
    #[cfg(feature = "serde")]
    pub(crate) fn from_words(words: &[u64]) -> Self {
        debug_assert_eq!(words.len() % BLOCK_WORDS, 0);

        let blocks = words
            .chunks_exact(BLOCK_WORDS)
            .map(|chunk| {
                let mut block = Block::default();
                for (dst, &src) in block.0.iter_mut().zip(chunk) {
                    *dst.get_mut() = src;
                }
                block
            })
            .collect();

        Self { blocks }
    }

    pub(crate) fn nblocks(&self) -> usize {
        self.blocks.len()
    }

    pub(crate) fn nbits(&self) -> u64 {
        self.blocks.len() as u64 * BLOCK_BITS as u64
    }

    /// Set `bit` of `block` through an exclusive reference.
    #[inline]
    pub(crate) fn set_bit(&mut self, block: usize, bit: u32) {
        let (word, mask) = word_and_mask(bit);
        *self.blocks[block].0[word].get_mut() |= mask;
    }

    /// Set `bit` of `block`, racing safely with any other setter or reader.
    ///
    /// The word is updated with a compare-exchange retry loop. Bits only ever
    /// transition from 0 to 1 outside of [`BlockStore::clear`], so a failed
    /// exchange only needs to retry with the newly observed value, and the
    /// loop exits as soon as any writer has set the bit.
    #[inline]
    pub(crate) fn set_bit_atomic(&self, block: usize, bit: u32) {
        let (word, mask) = word_and_mask(bit);
        let word = &self.blocks[block].0[word];

        let mut current = word.load(Ordering::Relaxed);
        while current & mask == 0 {
            match word.compare_exchange_weak(
                current,
                current | mask,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => {
                    current = actual;
                    hint::spin_loop();
                }
            }
        }
    }

    /// Returns `true` if `bit` of `block` is set.
    #[inline]
    pub(crate) fn test_bit(&self, block: usize, bit: u32) -> bool {
        let (word, mask) = word_and_mask(bit);
        self.blocks[block].0[word].load(Ordering::Acquire) & mask != 0
    }

    /// Unset every bit, keeping the allocation.
    pub(crate) fn clear(&mut self) {
        self.words_mut().for_each(|w| *w = 0);
    }

    /// Merge `other` into `self` with a bitwise OR.
    ///
    /// Both stores must hold the same number of blocks.
    pub(crate) fn or(&mut self, other: &Self) {
        self.merge_with(other, |a, b| a | b)
    }

    /// Merge `other` into `self` with a bitwise AND.
    ///
    /// Both stores must hold the same number of blocks.
    pub(crate) fn and(&mut self, other: &Self) {
        self.merge_with(other, |a, b| a & b)
    }

    fn merge_with<F>(&mut self, other: &Self, op: F)
    where
        F: Fn(u64, u64) -> u64,
    {
        debug_assert_eq!(
            self.blocks.len(),
            other.blocks.len(),
            "merging stores of different sizes"
        );

        for (dst, src) in self.words_mut().zip(other.words()) {
            *dst = op(*dst, src);
        }
    }

    /// Total number of set bits.
    pub(crate) fn count_ones(&self) -> u64 {
        self.words().map(|w| u64::from(w.count_ones())).sum()
    }

    /// Bytes of bit storage held by this store.
    pub(crate) fn byte_size(&self) -> usize {
        self.blocks.len() * mem::size_of::<Block>()
    }

    /// Iterate over a snapshot of every storage word, in block order.
    pub(crate) fn words(&self) -> impl Iterator<Item = u64> + '_ {
        self.blocks
            .iter()
            .flat_map(|b| b.0.iter())
            .map(|w| w.load(Ordering::Relaxed))
    }

    fn words_mut(&mut self) -> impl Iterator<Item = &mut u64> + '_ {
        self.blocks
            .iter_mut()
            .flat_map(|b| b.0.iter_mut())
            .map(|w| w.get_mut())
    }
}

impl Clone for BlockStore {
    fn clone(&self) -> Self {
        let blocks = self
            .blocks
            .iter()
            .map(|b| {
                let mut block = Block::default();
                for (dst, src) in block.0.iter_mut().zip(b.0.iter()) {
                    *dst.get_mut() = src.load(Ordering::Relaxed);
                }
                block
            })
            .collect();

        Self { blocks }
    }
}

impl PartialEq for BlockStore {
    fn eq(&self, other: &Self) -> bool {
        self.blocks.len() == other.blocks.len() && self.words().eq(other.words())
    }
}

impl Eq for BlockStore {}
