//! # Symmetric Distance Matrix
//!
//! Pairwise squared distances between every example, quantized to 16 bits and
//! stored as a packed lower triangle (row `max(i,j)`, column `min(i,j)`):
//!
//! ```text
//!          j=0   1    2    3
//! i=0    [ 0 ]
//! i=1    [ 1 ][ 2 ]
//! i=2    [ 3 ][ 4 ][ 5 ]
//! i=3    [ 6 ][ 7 ][ 8 ][ 9 ]       index(i,j) = max*(max+1)/2 + min
//! ```
//!
//! Off-diagonal entries are `(self_dot(i) + self_dot(j) - 2*dot(i,j)) >> shift`
//! computed in wrapping `u32` and truncated to `u16`. The diagonal holds
//! [`DIAGONAL_SENTINEL`] so an example is never its own nearest neighbour.
//!
//! The matrix is scratch state: it is rebuilt in full after any tier change and
//! never updated incrementally.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use edgeset_core::error::{Error, Result};
use edgeset_core::utils::{format_bytes, try_alloc};
use edgeset_core::ExampleIndex;
use edgeset_storage::{ExampleStore, PersistentDevice};

use crate::simd::{dot_product_u8, DotProductFn};

/// Diagonal value: larger than any real quantized distance
pub const DIAGONAL_SENTINEL: u16 = 0xFFFF;

/// Number of entries in the packed triangle of an `n x n` matrix
#[inline]
pub const fn packed_len(n: usize) -> usize {
    n * (n + 1) / 2
}

/// Position of `(i, j)` in the packed triangle; symmetric in its arguments
#[inline]
pub fn packed_index(n: usize, i: usize, j: usize) -> Result<usize> {
    if i >= n || j >= n {
        return Err(Error::range(format!(
            "distance matrix index ({}, {}) out of range (n = {})",
            i, j, n
        )));
    }
    let (hi, lo) = if i >= j { (i, j) } else { (j, i) };
    Ok(hi * (hi + 1) / 2 + lo)
}

/// Timing of one full recompute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputeStats {
    pub examples: usize,
    /// Off-diagonal pairs evaluated
    pub pairs: usize,
    pub elapsed: Duration,
}

/// Packed `N x N` matrix of quantized distances
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    n: usize,
    shift: u32,
    data: Vec<u16>,
}

impl DistanceMatrix {
    /// Allocate a zeroed matrix for `n` examples
    pub fn new(n: usize, shift: u32) -> Result<Self> {
        if shift >= 32 {
            return Err(Error::Configuration {
                message: format!("distance shift {} must be below 32", shift),
            });
        }
        let data = try_alloc(packed_len(n), 0u16, "dist_matrix")?;
        debug!(
            "DistanceMatrix: n={}, {} entries ({})",
            n,
            data.len(),
            format_bytes((data.len() * std::mem::size_of::<u16>()) as u64)
        );
        Ok(Self { n, shift, data })
    }

    /// Examples covered (matrix dimension)
    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn shift(&self) -> u32 {
        self.shift
    }

    pub fn get(&self, i: ExampleIndex, j: ExampleIndex) -> Result<u16> {
        Ok(self.data[packed_index(self.n, i, j)?])
    }

    pub fn set(&mut self, i: ExampleIndex, j: ExampleIndex, value: u16) -> Result<()> {
        let idx = packed_index(self.n, i, j)?;
        self.data[idx] = value;
        Ok(())
    }

    /// Raw packed triangle in index order
    pub fn as_slice(&self) -> &[u16] {
        &self.data
    }

    /// Copy `dist(i, subset[p])` into `buf[p]` for every position `p`
    pub fn gather_row(&self, i: ExampleIndex, subset: &[ExampleIndex], buf: &mut [u16]) -> Result<()> {
        if buf.len() != subset.len() {
            return Err(Error::Internal {
                message: format!(
                    "row buffer holds {} entries, subset has {}",
                    buf.len(),
                    subset.len()
                ),
            });
        }
        for (slot, &j) in buf.iter_mut().zip(subset) {
            *slot = self.data[packed_index(self.n, i, j)?];
        }
        Ok(())
    }

    /// Quantize one squared distance
    #[inline]
    pub fn quantize(&self, self_dot_i: u32, self_dot_j: u32, dot: u32) -> u16 {
        let dist = self_dot_i
            .wrapping_add(self_dot_j)
            .wrapping_sub(dot.wrapping_mul(2));
        (dist >> self.shift) as u16
    }

    /// Recompute every entry from the store's current contents
    pub fn compute<D: PersistentDevice>(&mut self, store: &mut ExampleStore<D>) -> Result<ComputeStats> {
        self.compute_with(store, dot_product_u8)
    }

    /// Recompute with a caller-supplied dot-product primitive
    pub fn compute_with<D: PersistentDevice>(
        &mut self,
        store: &mut ExampleStore<D>,
        dot: DotProductFn,
    ) -> Result<ComputeStats> {
        if store.len() != self.n {
            return Err(Error::Internal {
                message: format!(
                    "matrix sized for {} examples, store holds {}",
                    self.n,
                    store.len()
                ),
            });
        }

        let start = Instant::now();
        let f = store.geometry().feature_len;

        // One pass over both tiers; the pair loop then never touches the device
        let mut features = try_alloc(self.n * f, 0u8, "feature_snapshot")?;
        for (idx, row) in features.chunks_exact_mut(f).enumerate() {
            store.read_features_into(idx, row)?;
        }

        let mut self_dots = try_alloc(self.n, 0u32, "self_dots")?;
        for (sd, row) in self_dots.iter_mut().zip(features.chunks_exact(f)) {
            *sd = dot(row, row);
        }

        let mut pos = 0;
        for i in 0..self.n {
            let row_i = &features[i * f..(i + 1) * f];
            for j in 0..i {
                let row_j = &features[j * f..(j + 1) * f];
                self.data[pos] = self.quantize(self_dots[i], self_dots[j], dot(row_i, row_j));
                pos += 1;
            }
            self.data[pos] = DIAGONAL_SENTINEL;
            pos += 1;
        }

        let stats = ComputeStats {
            examples: self.n,
            pairs: packed_len(self.n) - self.n,
            elapsed: start.elapsed(),
        };
        info!(
            "Distance matrix computed: {} examples, {} pairs in {:?}",
            stats.examples, stats.pairs, stats.elapsed
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_index_layout() {
        assert_eq!(packed_index(4, 0, 0).unwrap(), 0);
        assert_eq!(packed_index(4, 1, 0).unwrap(), 1);
        assert_eq!(packed_index(4, 1, 1).unwrap(), 2);
        assert_eq!(packed_index(4, 3, 3).unwrap(), 9);
        assert_eq!(packed_index(4, 0, 3).unwrap(), 6);
        assert!(packed_index(4, 4, 0).is_err());
        assert_eq!(packed_len(1200), 720_600);
    }

    #[test]
    fn test_quantize_truncates() {
        let m = DistanceMatrix::new(2, 12).unwrap();
        // 8191 >> 12 == 1, not rounded up
        assert_eq!(m.quantize(8191, 0, 0), 1);
        assert_eq!(m.quantize(100, 100, 100), 0);
    }

    #[test]
    fn test_bad_shift() {
        assert!(DistanceMatrix::new(2, 32).is_err());
    }
}
