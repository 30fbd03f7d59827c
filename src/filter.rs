use crate::blocks::{BlockStore, BLOCK_BITS};
use crate::error::{ConfigError, Result};
use crate::position::{locate, Position};
use crate::sizer::{self, Config, Shape};
use std::fmt;
use tracing::debug;

/// A blocked Bloom filter over caller-supplied 64-bit hashes.
///
/// Every key sets `k` bits within a single 512-bit block, so an insert or
/// lookup touches exactly one cache line regardless of `k`. Keys are provided
/// as a well-distributed 64-bit hash; reducing application values to such a
/// hash (with [`twox-hash`], [`ahash`], etc) is left to the caller.
///
/// ```rust
/// use blockbloom::{Config, Filter};
///
/// let mut f = Filter::new_optimized(Config::new(0.01, 1_000))?;
/// f.add64(0x9E37_79B9_7F4A_7C15);
///
/// assert!(f.contains64(0x9E37_79B9_7F4A_7C15));
/// # Ok::<(), blockbloom::Error>(())
/// ```
///
/// ## Concurrency
///
/// [`Filter::add64`] requires exclusive access, and is the fastest way to
/// populate a filter from a single thread (or behind a `Mutex`).
/// [`Filter::add_atomic64`] and [`Filter::contains64`] take `&self` and are
/// lock-free, so an `Arc<Filter>` can be populated and queried from many
/// threads at once:
///
/// ```rust
/// use std::{sync::Arc, thread};
/// use blockbloom::Filter;
///
/// let f = Arc::new(Filter::new(1 << 16, 7)?);
///
/// let handles: Vec<_> = (0..4u64)
///     .map(|t| {
///         let f = Arc::clone(&f);
///         thread::spawn(move || f.add_atomic64(t.wrapping_mul(0x9E37_79B9_7F4A_7C15)))
///     })
///     .collect();
/// for h in handles {
///     h.join().unwrap();
/// }
///
/// assert!(f.contains64(3u64.wrapping_mul(0x9E37_79B9_7F4A_7C15)));
/// # Ok::<(), blockbloom::Error>(())
/// ```
///
/// A lookup racing an atomic insert of the same key may not observe it. Bits
/// are never unset outside of [`Filter::clear`] (which requires exclusive
/// access), so once an insert returns it is visible to every later lookup.
///
/// ## Features
///
/// If the `serde` feature is enabled, a `Filter` supports (de)serialisation
/// with [serde](https://github.com/serde-rs/serde).
///
/// [`twox-hash`]: https://docs.rs/twox-hash
/// [`ahash`]: https://docs.rs/ahash
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(
        into = "crate::serialisation::FilterRepr",
        try_from = "crate::serialisation::FilterRepr"
    )
)]
pub struct Filter {
    pub(crate) store: BlockStore,
    pub(crate) k: u32,
}

impl Filter {
    /// Construct an empty filter of at least `nbits` bits, setting `k` bits
    /// per key.
    ///
    /// `nbits` is rounded up to a whole number of 512-bit blocks, and is at
    /// least one block.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) if `k` is
    /// 0, or `nbits` needs more than `u32::MAX` blocks.
    pub fn new(nbits: u64, k: u32) -> Result<Self> {
        if k == 0 {
            return Err(ConfigError::ZeroHashes.into());
        }

        let nblocks = nbits.div_ceil(u64::from(BLOCK_BITS)).max(1);
        if nblocks > u64::from(u32::MAX) {
            return Err(ConfigError::TooManyBits(nbits).into());
        }

        let store = BlockStore::new(nblocks as usize);
        debug!(
            nbits = store.nbits(),
            k,
            bytes = store.byte_size(),
            "allocated filter"
        );

        Ok(Self { store, k })
    }

    /// Construct an empty filter sized to hold `config.nkeys` keys at a
    /// false-positive rate of `config.fp_rate`.
    ///
    /// See [`Config::shape`] for how the size is derived.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) if the
    /// rate is not within `(0, 1)`, `nkeys` is 0, or `max_bits` is 0.
    pub fn new_optimized(config: Config) -> Result<Self> {
        let shape = config.shape()?;
        debug!(
            fp_rate = config.fp_rate,
            nkeys = config.nkeys,
            %shape,
            "derived filter shape"
        );
        Self::new(shape.nbits, shape.k)
    }

    /// The number of bits in the filter, a multiple of
    /// [`BLOCK_BITS`](crate::BLOCK_BITS).
    pub fn nbits(&self) -> u64 {
        self.store.nbits()
    }

    /// The number of bits set per key.
    pub fn k(&self) -> u32 {
        self.k
    }

    /// The shape of this filter, which must match for two filters to be
    /// merged.
    pub fn shape(&self) -> Shape {
        Shape {
            nbits: self.nbits(),
            k: self.k,
        }
    }

    /// Insert the key with the given `hash`.
    ///
    /// Any subsequent call to [`contains64`](Filter::contains64) with the same
    /// `hash` will return true until the filter is cleared.
    #[inline]
    pub fn add64(&mut self, hash: u64) {
        let pos = locate(hash, self.store.nblocks(), self.k);
        for bit in pos.offsets {
            self.store.set_bit(pos.block, bit);
        }
    }

    /// Insert the key with the given `hash` through a shared reference.
    ///
    /// Safe to call from any number of threads concurrently with other
    /// inserts and lookups. Concurrent inserts never lose each other's bits.
    #[inline]
    pub fn add_atomic64(&self, hash: u64) {
        let pos = locate(hash, self.store.nblocks(), self.k);
        for bit in pos.offsets {
            self.store.set_bit_atomic(pos.block, bit);
        }
    }

    /// Returns `true` if the key with the given `hash` is **probably** in the
    /// filter, and `false` if it is **definitely not**.
    #[inline]
    pub fn contains64(&self, hash: u64) -> bool {
        let Position { block, mut offsets } = locate(hash, self.store.nblocks(), self.k);
        offsets.all(|bit| self.store.test_bit(block, bit))
    }

    /// Remove every key, retaining the allocated storage.
    pub fn clear(&mut self) {
        self.store.clear();
        debug!(shape = %self.shape(), "cleared filter");
    }

    /// Estimate the false-positive rate of this filter once `nkeys` distinct
    /// keys have been inserted.
    ///
    /// This is the closed form `(1 - e^(-k * n / m))^k` for an unblocked
    /// filter; the blocked layout makes the real rate slightly higher (see
    /// [`blocked_fp_rate`](crate::blocked_fp_rate)).
    pub fn estimate_fp_rate(&self, nkeys: u64) -> f64 {
        sizer::fp_rate(nkeys, self.nbits(), self.k)
    }

    /// Estimate the number of distinct keys inserted into this filter from the
    /// number of set bits.
    ///
    /// Returns [`f64::INFINITY`] when every bit is set.
    pub fn cardinality(&self) -> f64 {
        let m = self.nbits() as f64;
        let ones = self.store.count_ones() as f64;

        // Swamidass & Baldi, "Mathematical correction for fingerprint
        // similarity measures to improve chemical retrieval" (2007).
        -(m / f64::from(self.k)) * (1.0 - ones / m).ln()
    }

    /// The fraction of bits that are set, in `[0, 1]`.
    pub fn fill_ratio(&self) -> f64 {
        self.store.count_ones() as f64 / self.nbits() as f64
    }

    /// Returns `true` if no key has been inserted since construction or the
    /// last [`clear`](Filter::clear).
    pub fn is_empty(&self) -> bool {
        self.store.words().all(|w| w == 0)
    }

    /// Return the byte size of the bit storage of this filter.
    pub fn byte_size(&self) -> usize {
        self.store.byte_size()
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("nbits", &self.nbits())
            .field("k", &self.k)
            .finish_non_exhaustive()
    }
}
