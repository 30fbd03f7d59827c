//! Derivation of a filter [`Shape`] from a target false-positive rate and an
//! expected number of keys.

use crate::blocks::BLOCK_BITS;
use crate::error::{ConfigError, Result};
use std::f64::consts::{LN_2, PI};
use std::fmt;
use tracing::{trace, warn};

/// Upper bound on the number of hash functions (bits probed per key).
///
/// Beyond this the false-positive improvement is negligible, while every
/// extra probe adds to the cost of each insert and lookup.
pub const MAX_HASHES: u32 = 30;

/// Sizing is grown to compensate for uneven block loads by at most this factor.
const MAX_COMPENSATION: u64 = 4;

/// The size and number of hash functions of a filter.
///
/// Two filters can only be merged when their shapes are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Shape {
    /// Number of bits, always a multiple of [`BLOCK_BITS`](crate::BLOCK_BITS).
    pub nbits: u64,
    /// Number of bits set per key.
    pub k: u32,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(nbits={}, k={})", self.nbits, self.k)
    }
}

/// Parameters for [`Filter::new_optimized`](crate::Filter::new_optimized).
///
/// ```rust
/// use blockbloom::{Config, Filter};
///
/// let config = Config::new(0.001, 10_000).max_bits(1 << 20);
/// let filter = Filter::new_optimized(config)?;
///
/// assert!(filter.nbits() <= 1 << 20);
/// # Ok::<(), blockbloom::Error>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Desired false-positive rate once `nkeys` distinct keys are inserted,
    /// in the open interval `(0, 1)`.
    pub fp_rate: f64,

    /// Expected number of distinct keys.
    pub nkeys: u64,

    /// Hard cap on the filter size in bits.
    ///
    /// When the cap is lower than the size needed to reach `fp_rate`, the
    /// filter is built at the cap (rounded down to whole blocks) and the
    /// false-positive rate will be higher than requested.
    pub max_bits: Option<u64>,
}

impl Config {
    /// Target `fp_rate` with `nkeys` distinct keys inserted, without a size
    /// cap.
    pub fn new(fp_rate: f64, nkeys: u64) -> Self {
        Self {
            fp_rate,
            nkeys,
            max_bits: None,
        }
    }

    /// Limit the filter to at most `max_bits` bits.
    pub fn max_bits(self, max_bits: u64) -> Self {
        Self {
            max_bits: Some(max_bits),
            ..self
        }
    }

    /// Derive the shape of a filter satisfying this configuration.
    ///
    /// This starts from [`optimal_shape`], which assumes every bit is equally
    /// likely to be probed. A blocked filter confines each key to one block,
    /// and because the number of keys landing in each block varies, it needs
    /// slightly more space to reach the same rate. The block count is grown
    /// until [`blocked_fp_rate`] meets `fp_rate` (up to 4x the unblocked size),
    /// and the result is then capped by `max_bits`.
    pub fn shape(&self) -> Result<Shape> {
        if self.max_bits == Some(0) {
            return Err(ConfigError::ZeroMaxBits.into());
        }

        let ideal = optimal_shape(self.fp_rate, self.nkeys)?;
        let shape = compensate_blocking(ideal, self.fp_rate, self.nkeys);

        match self.max_bits {
            Some(max_bits) if max_bits < shape.nbits => {
                let nblocks = (max_bits / u64::from(BLOCK_BITS)).max(1);
                let nbits = nblocks * u64::from(BLOCK_BITS);
                let capped = Shape {
                    nbits,
                    k: optimal_k(nbits, self.nkeys),
                };

                warn!(
                    wanted = %shape,
                    capped = %capped,
                    fp_rate = blocked_fp_rate(self.nkeys, capped.nbits, capped.k),
                    "filter size capped by max_bits"
                );

                Ok(capped)
            }
            _ => Ok(shape),
        }
    }
}

/// Compute the optimal shape for an unblocked filter holding `nkeys` keys at
/// a false-positive rate of `fp_rate`.
///
/// ```text
///     nbits = ceil(-n * ln(p) / ln(2)^2)     rounded up to whole blocks
///     k     = round(nbits / n * ln(2))       clamped to [1, 30]
/// ```
///
/// ```rust
/// let shape = blockbloom::optimal_shape(0.01, 1_000_000)?;
///
/// assert_eq!(shape.nbits, 9_585_152);
/// assert_eq!(shape.k, 7);
/// # Ok::<(), blockbloom::Error>(())
/// ```
pub fn optimal_shape(fp_rate: f64, nkeys: u64) -> Result<Shape> {
    // Written to also reject NaN.
    if !(fp_rate > 0.0 && fp_rate < 1.0) {
        return Err(ConfigError::FpRateOutOfRange(fp_rate).into());
    }
    if nkeys == 0 {
        return Err(ConfigError::ZeroKeys.into());
    }

    let bits = (-(nkeys as f64) * fp_rate.ln() / (LN_2 * LN_2)).ceil();
    if bits >= (u64::from(u32::MAX) * u64::from(BLOCK_BITS)) as f64 {
        return Err(ConfigError::TooManyBits(bits as u64).into());
    }

    let nblocks = (bits as u64).div_ceil(u64::from(BLOCK_BITS)).max(1);
    let nbits = nblocks * u64::from(BLOCK_BITS);

    Ok(Shape {
        nbits,
        k: optimal_k(nbits, nkeys),
    })
}

fn optimal_k(nbits: u64, nkeys: u64) -> u32 {
    let k = (nbits as f64 / nkeys as f64 * LN_2).round();
    k.clamp(1.0, f64::from(MAX_HASHES)) as u32
}

fn compensate_blocking(ideal: Shape, fp_rate: f64, nkeys: u64) -> Shape {
    let mut nblocks = ideal.nbits / u64::from(BLOCK_BITS);
    let limit = (nblocks * MAX_COMPENSATION).min(u64::from(u32::MAX));

    while nblocks < limit
        && blocked_fp_rate(nkeys, nblocks * u64::from(BLOCK_BITS), ideal.k) > fp_rate
    {
        nblocks += (nblocks / 256).max(1);
        trace!(nblocks, "growing filter to compensate for block load variance");
    }

    let shape = Shape {
        nbits: nblocks.min(limit) * u64::from(BLOCK_BITS),
        k: ideal.k,
    };

    let estimate = blocked_fp_rate(nkeys, shape.nbits, shape.k);
    if estimate > fp_rate {
        warn!(
            %shape,
            fp_rate,
            estimate,
            "target false-positive rate unreachable with cache-line blocks"
        );
    }

    shape
}

/// The false-positive probability of an unblocked Bloom filter with `nbits`
/// bits and `k` hash functions once `nkeys` distinct keys are inserted:
/// `(1 - e^(-k * n / m))^k`.
pub fn fp_rate(nkeys: u64, nbits: u64, k: u32) -> f64 {
    if nkeys == 0 || nbits == 0 {
        return 0.0;
    }

    let k = f64::from(k);
    (1.0 - (-k * nkeys as f64 / nbits as f64).exp()).powf(k)
}

/// The false-positive probability of a blocked filter.
///
/// The number of keys hashed to any one block is Poisson distributed with mean
/// `nkeys / nblocks`, and a lookup is a false positive when all `k` probed bits
/// of its block are set:
///
/// ```text
///     sum over x of  P(X = x) * E[(ones(k * x) / B)^k]
/// ```
///
/// where `ones(t)` is the number of distinct bits hit by `t` uniform probes
/// into a block of `B` bits. The expectation is taken over the fill of the
/// block, not only its mean.
///
/// This is always higher than [`fp_rate`] for the same shape.
pub fn blocked_fp_rate(nkeys: u64, nbits: u64, k: u32) -> f64 {
    if nkeys == 0 {
        return 0.0;
    }

    let nblocks = (nbits / u64::from(BLOCK_BITS)).max(1);
    let lambda = nkeys as f64 / nblocks as f64;
    let ln_lambda = lambda.ln();

    // Loads more than 20 standard deviations (plus slack for small means) from
    // the mean contribute nothing measurable.
    let spread = 20.0 * lambda.sqrt() + 20.0;
    let lower = (lambda - spread).max(0.0).floor() as u64;
    let upper = (lambda + spread).ceil() as u64;

    // The Poisson pmf is accumulated in log space, as e^-lambda underflows
    // for heavily loaded blocks.
    let mut ln_pmf = -lambda + lower as f64 * ln_lambda - ln_factorial(lower);
    let mut sum = 0.0;
    for x in lower..=upper {
        if x > lower {
            ln_pmf += ln_lambda - (x as f64).ln();
        }
        sum += ln_pmf.exp() * block_fp_rate(x, k);
    }

    sum.min(1.0)
}

/// The probability that `k` uniform probes all hit set bits in a block holding
/// `nkeys` keys.
///
/// The fill of a block is itself random, so the rate is `E[f^k]` rather than
/// `E[f]^k`. It is evaluated to second order around the mean fill `mu`:
///
/// ```text
///     E[f^k] ~ mu^k + k * (k - 1) / 2 * mu^(k - 2) * Var(f)
/// ```
///
/// using the exact mean and variance of the number of occupied bins when
/// `t = k * nkeys` balls are thrown into `B` bins. Dropping the variance term
/// underestimates the rate by around 5% at `k = 13`.
fn block_fp_rate(nkeys: u64, k: u32) -> f64 {
    if nkeys == 0 {
        return 0.0;
    }

    let bins = f64::from(BLOCK_BITS);
    let probes = f64::from(k) * nkeys as f64;

    // Probability a given bit, or a given pair of bits, is never probed.
    let miss_one = (1.0 - 1.0 / bins).powf(probes);
    let miss_two = (1.0 - 2.0 / bins).powf(probes);

    let mean = 1.0 - miss_one;
    let var_ones =
        bins * (bins - 1.0) * miss_two + bins * miss_one - bins * bins * miss_one * miss_one;
    let var = (var_ones / (bins * bins)).max(0.0);

    let k_f = f64::from(k);
    let rate = mean.powi(k as i32) + k_f * (k_f - 1.0) / 2.0 * mean.powi(k as i32 - 2) * var;

    rate.min(1.0)
}

/// `ln(n!)`, using Stirling's series for `n > 0`.
fn ln_factorial(n: u64) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    n * n.ln() - n + 0.5 * (2.0 * PI * n).ln() + 1.0 / (12.0 * n) - 1.0 / (360.0 * n.powi(3))
}
