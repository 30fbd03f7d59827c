//! blockbloom implements a cache-line blocked bloom filter over caller-supplied
//! 64-bit hashes, with lock-free concurrent insertion and set-algebra merges.
//!
//! Each key is confined to a single 512-bit block (one cache line): the high
//! half of its hash picks the block, and the `k` bits within it are derived
//! from the same hash using enhanced double hashing. Inserting or looking up a
//! key therefore costs a single cache miss at most, whatever the value of `k`.
//!
//! ```rust
//! use blockbloom::{Config, Filter};
//!
//! // Room for 1 million keys with a 1% false-positive rate.
//! let mut filter = Filter::new_optimized(Config::new(0.01, 1_000_000))?;
//!
//! filter.add64(0x5EED_F00D_CAFE_D00D);
//! assert!(filter.contains64(0x5EED_F00D_CAFE_D00D));
//! # Ok::<(), blockbloom::Error>(())
//! ```
//!
//! Filters with the same [`Shape`] can be combined with [`Filter::union`] and
//! [`Filter::intersect`], allowing a filter to be built in parts (on separate
//! threads, processes or hosts) and merged afterwards.
//!
//! ## Features
//!
//! * `serde` - enable serialisation with [serde], disabled by default
//!
//! [serde]: https://github.com/serde-rs/serde

#![warn(missing_docs)]

mod blocks;
mod error;
mod filter;
mod merge;
mod position;
#[cfg(feature = "serde")]
mod serialisation;
mod sizer;

pub use blocks::BLOCK_BITS;
pub use error::*;
pub use filter::*;
pub use sizer::*;
