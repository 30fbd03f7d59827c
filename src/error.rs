use crate::Shape;

/// Result alias used by all fallible operations in this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned when constructing or merging a [`Filter`](crate::Filter).
///
/// Inserting and querying a validly constructed filter never fails.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The construction parameters cannot describe a usable filter. No filter
    /// is produced.
    #[error("invalid filter configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// The operands of a merge have different shapes. Neither operand is
    /// modified.
    #[error("filter shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch {
        /// Shape of the filter being merged into.
        expected: Shape,
        /// Shape of the filter passed as the other operand.
        found: Shape,
    },
}

/// The reason a [`Config`](crate::Config) or explicit shape was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// `k` is zero, so no bits would be set per key.
    #[error("number of hash functions must be at least 1")]
    ZeroHashes,

    /// The target rate is outside `(0, 1)`, or is NaN.
    #[error("false-positive rate {0} is not in the open interval (0, 1)")]
    FpRateOutOfRange(f64),

    /// The expected number of keys is zero.
    #[error("expected number of keys must be at least 1")]
    ZeroKeys,

    /// A size cap of zero bits was requested.
    #[error("maximum filter size must be at least 1 bit")]
    ZeroMaxBits,

    /// The filter would need more than `u32::MAX` blocks.
    #[error("{0} bits exceeds the maximum addressable filter size")]
    TooManyBits(u64),

    /// A serialised size is not a non-zero multiple of the block size.
    #[error("{0} bits is not a whole, non-zero number of blocks")]
    UnalignedBits(u64),

    /// A serialised filter carries the wrong number of storage words for its
    /// size.
    #[error("expected {expected} storage words, found {found}")]
    WordCount {
        /// Words needed for the declared size.
        expected: usize,
        /// Words present in the input.
        found: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = Error::from(ConfigError::FpRateOutOfRange(1.5));
        assert_eq!(
            err.to_string(),
            "invalid filter configuration: false-positive rate 1.5 is not in the open interval (0, 1)"
        );

        let err = Error::ShapeMismatch {
            expected: Shape { nbits: 512, k: 3 },
            found: Shape { nbits: 1024, k: 3 },
        };
        assert_eq!(
            err.to_string(),
            "filter shape mismatch: expected (nbits=512, k=3), found (nbits=1024, k=3)"
        );
    }

    #[test]
    fn test_config_error_display() {
        let cases = [
            (ConfigError::ZeroHashes, "number of hash functions must be at least 1"),
            (ConfigError::ZeroKeys, "expected number of keys must be at least 1"),
            (ConfigError::ZeroMaxBits, "maximum filter size must be at least 1 bit"),
            (
                ConfigError::TooManyBits(u64::MAX),
                "18446744073709551615 bits exceeds the maximum addressable filter size",
            ),
            (
                ConfigError::UnalignedBits(500),
                "500 bits is not a whole, non-zero number of blocks",
            ),
            (
                ConfigError::WordCount {
                    expected: 16,
                    found: 8,
                },
                "expected 16 storage words, found 8",
            ),
        ];

        for (err, want) in cases {
            assert_eq!(err.to_string(), want);
        }
    }
}
