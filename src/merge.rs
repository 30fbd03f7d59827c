//! Set operations across filters of the same [`Shape`](crate::Shape).
//!
//! Filters built independently (for example one per partition of a dataset,
//! on different hosts) can be combined into a single filter as long as they
//! were constructed with identical parameters.

use crate::error::{Error, Result};
use crate::Filter;
use tracing::debug;

impl Filter {
    /// Merge every key of `other` into this filter.
    ///
    /// Afterwards this filter contains exactly the bits it would have had if
    /// every key inserted into either filter had been inserted into it
    /// directly, so the false-positive rate is that of a single filter holding
    /// the combined keys.
    ///
    /// ```rust
    /// use blockbloom::Filter;
    ///
    /// let mut a = Filter::new(1 << 16, 5)?;
    /// let mut b = Filter::new(1 << 16, 5)?;
    /// a.add64(1);
    /// b.add64(2);
    ///
    /// a.union(&b)?;
    /// assert!(a.contains64(1));
    /// assert!(a.contains64(2));
    /// # Ok::<(), blockbloom::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] if the filters differ in size or `k`,
    /// in which case neither filter is modified.
    pub fn union(&mut self, other: &Filter) -> Result<()> {
        self.check_shape(other)?;
        self.store.or(&other.store);

        debug!(shape = %self.shape(), "merged filter union");
        Ok(())
    }

    /// Retain only the bits set in both this filter and `other`.
    ///
    /// The result approximates a filter of the keys present in both inputs.
    /// It never reports false negatives for those keys, but its
    /// false-positive rate can be considerably higher than a filter built from
    /// the intersection directly: bits set in both filters by *different* keys
    /// survive the intersection. No bound on this error is offered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] if the filters differ in size or `k`,
    /// in which case neither filter is modified.
    pub fn intersect(&mut self, other: &Filter) -> Result<()> {
        self.check_shape(other)?;
        self.store.and(&other.store);

        debug!(shape = %self.shape(), "merged filter intersection");
        Ok(())
    }

    /// Equal shapes imply equal block counts, so this is the only guard the
    /// word-wise merge needs.
    fn check_shape(&self, other: &Filter) -> Result<()> {
        if self.shape() != other.shape() {
            let err = Error::ShapeMismatch {
                expected: self.shape(),
                found: other.shape(),
            };
            debug!(error = %err, "refusing to merge filters");
            return Err(err);
        }
        Ok(())
    }
}
