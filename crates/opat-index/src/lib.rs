//! opat-index: floating-point index vectors with stable hashing
//!
//! OPAT containers are keyed by vectors of physical parameters (composition
//! fractions and the like). Raw `f64` vectors make unreliable map keys, so
//! `IndexVector` pairs the original values with an integer image rounded to a
//! configurable decimal precision; equality and hashing go through the image,
//! making vectors from different producers collide predictably.
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use opat_index::IndexVector;
//!
//! let stored = IndexVector::new(&[0.35, 0.004], 8)?;
//! let queried = IndexVector::new(&[0.35000000001, 0.004], 8)?;
//!
//! let mut map = HashMap::new();
//! map.insert(stored, "card");
//! assert_eq!(map.get(&queried), Some(&"card"));
//! # Ok::<(), opat_index::Error>(())
//! ```

#![warn(missing_docs)]
#![allow(clippy::manual_range_contains)]

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Index;

use xxhash_rust::xxh64::xxh64;

/// Default decimal precision when none is given
pub const DEFAULT_PRECISION: u8 = 8;

/// Error type for index vector construction
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Input vector was empty
    #[error("index vector cannot be empty")]
    Empty,

    /// Precision outside the supported range
    #[error("hash precision must be in 1..=13, got {0}")]
    InvalidPrecision(u8),

    /// Negative values have no integer image
    #[error("negative value {0} cannot be used as an index")]
    NegativeValue(f64),

    /// Value does not scale to a representable integer image
    #[error("value {0} is not representable at the requested precision")]
    NotRepresentable(f64),
}

/// Result type for index vector operations
pub type Result<T> = std::result::Result<T, Error>;

// Scaled values beyond this cannot be snapped without overflow.
const MAX_SCALED: f64 = (i64::MAX - 10) as f64;

/// A vector of `f64` parameter values usable as a stable hash-map key.
///
/// Each value is scaled by `10^precision`, truncated to an integer, and
/// snapped to the nearest multiple of 10 (discarding the last decimal digit
/// of the scaled integer). Two vectors are equal iff their lengths,
/// precisions, and integer images all match, which gives a matching
/// tolerance of roughly `5e-precision`.
///
/// The vector is immutable once constructed; changing precision means
/// constructing a new key.
#[derive(Debug, Clone)]
pub struct IndexVector {
    values: Vec<f64>,
    image: Vec<u64>,
    precision: u8,
}

impl IndexVector {
    /// Build an index vector from values at the given decimal precision.
    ///
    /// # Errors
    ///
    /// - [`Error::Empty`] for an empty slice
    /// - [`Error::InvalidPrecision`] when `precision` is outside `1..=13`
    /// - [`Error::NegativeValue`] for any negative value
    /// - [`Error::NotRepresentable`] when a scaled value overflows
    pub fn new(values: &[f64], precision: u8) -> Result<Self> {
        if values.is_empty() {
            return Err(Error::Empty);
        }
        if precision < 1 || precision > 13 {
            return Err(Error::InvalidPrecision(precision));
        }

        let scale = 10f64.powi(i32::from(precision));
        let mut image = Vec::with_capacity(values.len());
        for &value in values {
            image.push(image_of(value, scale)?);
        }

        Ok(Self {
            values: values.to_vec(),
            image,
            precision,
        })
    }

    /// Build an index vector at [`DEFAULT_PRECISION`].
    pub fn with_default_precision(values: &[f64]) -> Result<Self> {
        Self::new(values, DEFAULT_PRECISION)
    }

    /// Number of dimensions
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the vector has no dimensions (never true for a constructed key)
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Decimal precision the integer image was computed at
    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// The original floating-point values
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// The rounded integer image used for equality and hashing
    pub fn image(&self) -> &[u64] {
        &self.image
    }

    /// Value at dimension `i`, or `None` out of bounds
    pub fn get(&self, i: usize) -> Option<f64> {
        self.values.get(i).copied()
    }

    /// 64-bit hash of the integer image (xxh64 over its LE bytes, seed 0)
    pub fn hash64(&self) -> u64 {
        let mut bytes = Vec::with_capacity(self.image.len() * 8);
        for word in &self.image {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        xxh64(&bytes, 0)
    }
}

/// Integer image of one value: truncate at `scale`, snap to a multiple of 10.
fn image_of(value: f64, scale: f64) -> Result<u64> {
    if value < 0.0 {
        return Err(Error::NegativeValue(value));
    }
    let scaled = (value * scale).trunc();
    if !scaled.is_finite() || scaled > MAX_SCALED {
        return Err(Error::NotRepresentable(value));
    }
    let scaled = scaled as i64;
    if scaled == 0 {
        return Ok(0);
    }
    // Integer division discards the last decimal digit of the scaled value.
    Ok(((scaled + 5) / 10 * 10) as u64)
}

impl PartialEq for IndexVector {
    fn eq(&self, other: &Self) -> bool {
        self.values.len() == other.values.len()
            && self.precision == other.precision
            && self.image == other.image
    }
}

impl Eq for IndexVector {}

impl Hash for IndexVector {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Image only: must stay consistent with Eq, which never compares
        // the raw float values.
        self.precision.hash(state);
        for word in &self.image {
            state.write_u64(*word);
        }
    }
}

impl Index<usize> for IndexVector {
    type Output = f64;

    fn index(&self, i: usize) -> &f64 {
        &self.values[i]
    }
}

impl fmt::Display for IndexVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, (value, image)) in self.values.iter().zip(&self.image).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "({value}, {image})")?;
        }
        write!(f, "]")
    }
}


#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_values() -> impl Strategy<Value = Vec<f64>> {
        prop::collection::vec(0.0..1e6f64, 1..8)
    }

    proptest! {
        /// Property: construction from the same input is deterministic
        #[test]
        fn construction_is_deterministic(values in arb_values(), precision in 1u8..=13) {
            let a = IndexVector::new(&values, precision).unwrap();
            let b = IndexVector::new(&values, precision).unwrap();

            prop_assert_eq!(&a, &b);
            prop_assert_eq!(a.hash64(), b.hash64());
        }

        /// Property: equal keys hash equally through std::hash::Hash
        #[test]
        fn eq_implies_std_hash_eq(values in arb_values(), precision in 1u8..=13) {
            use std::collections::hash_map::RandomState;
            use std::hash::BuildHasher;

            let a = IndexVector::new(&values, precision).unwrap();
            let b = a.clone();
            let state = RandomState::new();

            prop_assert_eq!(state.hash_one(&a), state.hash_one(&b));
        }

        /// Property: the image is always a multiple of 10 (or zero)
        #[test]
        fn image_snaps_to_tens(values in arb_values(), precision in 1u8..=13) {
            let iv = IndexVector::new(&values, precision).unwrap();
            for word in iv.image() {
                prop_assert_eq!(word % 10, 0);
            }
        }

        /// Property: original values survive construction untouched
        #[test]
        fn values_are_preserved(values in arb_values(), precision in 1u8..=13) {
            let iv = IndexVector::new(&values, precision).unwrap();
            prop_assert_eq!(iv.values(), values.as_slice());
        }
    }
}
