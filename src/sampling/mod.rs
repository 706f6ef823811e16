//! # Weighted Sampling
//!
//! [`Intervals`] turns a set of weighted items into a cumulative-interval
//! index supporting O(log n) random draws: item `i` owns the half-open
//! interval `[c_{i-1}, c_i)` of the cumulative weight line, and sampling
//! binary-searches the interval containing a uniform draw.
//!
//! Construction is O(n) and validates the weights; distributions cache the
//! built index and discard it whenever their backing table mutates.

use rand::Rng;

use crate::errors::DialError;

/// Smallest total weight considered sampleable.
///
/// Below this the weight set is degenerate and construction fails rather
/// than producing a sampler that would divide by (nearly) zero.
pub const MIN_TOTAL_WEIGHT: f64 = 1e-8;

/// Cumulative-interval index over weighted items.
#[derive(Debug, Clone)]
pub struct Intervals<T> {
    items: Vec<T>,
    /// Cumulative upper bounds; `bounds[i]` closes item `i`'s interval.
    bounds: Vec<f64>,
    total: f64,
}

impl<T> Intervals<T> {
    /// Builds the index from `(item, weight)` pairs.
    ///
    /// Fails on NaN or negative weights, and when the total weight is below
    /// [`MIN_TOTAL_WEIGHT`].
    pub fn from_pairs(pairs: impl IntoIterator<Item = (T, f64)>) -> Result<Intervals<T>, DialError> {
        let mut items = Vec::new();
        let mut bounds = Vec::new();
        let mut total = 0.0;
        for (item, weight) in pairs {
            if weight.is_nan() {
                return Err(DialError::Numerical("NaN weight in interval set".to_string()));
            }
            if weight < 0.0 {
                return Err(DialError::Numerical(format!(
                    "negative weight {weight} in interval set"
                )));
            }
            total += weight;
            items.push(item);
            bounds.push(total);
        }
        if total < MIN_TOTAL_WEIGHT {
            return Err(DialError::Sampling(format!(
                "total weight {total} too small to sample from"
            )));
        }
        Ok(Intervals {
            items,
            bounds,
            total,
        })
    }

    /// Builds the index from items and a weight function.
    pub fn from_items(
        items: impl IntoIterator<Item = T>,
        mut weight: impl FnMut(&T) -> f64,
    ) -> Result<Intervals<T>, DialError> {
        Intervals::from_pairs(items.into_iter().map(|i| {
            let w = weight(&i);
            (i, w)
        }))
    }

    /// Draws an item with probability proportional to its weight.
    pub fn sample(&self) -> Result<&T, DialError> {
        self.sample_with(&mut rand::thread_rng())
    }

    /// Draws using a caller-supplied random source.
    pub fn sample_with(&self, rng: &mut impl Rng) -> Result<&T, DialError> {
        if self.items.is_empty() {
            return Err(DialError::Sampling("empty interval set".to_string()));
        }
        let r = rng.gen_range(0.0..self.total);
        let idx = self.bounds.partition_point(|&b| b <= r);
        self.items.get(idx).ok_or_else(|| {
            DialError::Internal(format!("no interval contains draw {r} of {}", self.total))
        })
    }

    pub fn total_weight(&self) -> f64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
