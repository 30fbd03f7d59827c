//! [serde] support for [`Filter`], enabled by the `serde` feature.
//!
//! A filter is represented as its shape followed by the raw storage words in
//! block order:
//!
//! ```text
//!     { "nbits": 1024, "k": 7, "words": [0, 4096, ...] }
//! ```
//!
//! Deserialising validates the shape and the number of words, so a malformed
//! input is rejected instead of producing a filter that could index out of
//! bounds.
//!
//! [serde]: https://github.com/serde-rs/serde

use crate::blocks::{BlockStore, BLOCK_BITS};
use crate::error::{ConfigError, Error};
use crate::Filter;

#[derive(serde::Serialize, serde::Deserialize)]
pub(crate) struct FilterRepr {
    nbits: u64,
    k: u32,
    words: Vec<u64>,
}

impl From<Filter> for FilterRepr {
    fn from(f: Filter) -> Self {
        Self {
            nbits: f.nbits(),
            k: f.k,
            words: f.store.words().collect(),
        }
    }
}

impl TryFrom<FilterRepr> for Filter {
    type Error = Error;

    fn try_from(repr: FilterRepr) -> Result<Self, Self::Error> {
        if repr.k == 0 {
            return Err(ConfigError::ZeroHashes.into());
        }
        if repr.nbits == 0 || repr.nbits % u64::from(BLOCK_BITS) != 0 {
            return Err(ConfigError::UnalignedBits(repr.nbits).into());
        }
        if repr.nbits / u64::from(BLOCK_BITS) > u64::from(u32::MAX) {
            return Err(ConfigError::TooManyBits(repr.nbits).into());
        }

        let expected = (repr.nbits / u64::from(u64::BITS)) as usize;
        if repr.words.len() != expected {
            return Err(ConfigError::WordCount {
                expected,
                found: repr.words.len(),
            }
            .into());
        }

        Ok(Filter {
            store: BlockStore::from_words(&repr.words),
            k: repr.k,
        })
    }
}
