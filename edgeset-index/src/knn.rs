//! # k-NN Classifier
//!
//! Brute-force nearest neighbours of every example against a reference subset,
//! read straight out of the packed distance matrix.
//!
//! ## Ranking
//! Candidates are ordered by `(distance, position in the subset)`, which is the
//! same order a stable ascending sort over the gathered row produces. Ties go to
//! the candidate that appears first in the subset, not the smaller example index.
//!
//! ## Voting
//! Highest count wins; equal counts go to the smallest class id.

use tracing::{debug, trace};

use edgeset_core::error::{Error, Result};
use edgeset_core::utils::{try_alloc, try_with_capacity};
use edgeset_core::{ClassId, ExampleIndex};

use crate::matrix::DistanceMatrix;

/// Positions of the `k` smallest entries of `distances`, nearest first
pub fn nearest_positions(distances: &[u16], k: usize) -> Vec<usize> {
    let mut positions: Vec<usize> = (0..distances.len()).collect();
    select_nearest(distances, k, &mut positions);
    positions
}

/// Fill `positions` with the `k` nearest positions, reusing its allocation
fn select_nearest(distances: &[u16], k: usize, positions: &mut Vec<usize>) {
    positions.clear();
    positions.extend(0..distances.len());
    let k = k.min(positions.len());
    if k == 0 {
        positions.clear();
        return;
    }

    let key = |&p: &usize| (distances[p], p);
    if k < positions.len() {
        positions.select_nth_unstable_by_key(k - 1, key);
        positions.truncate(k);
    }
    positions.sort_unstable_by_key(key);
}

/// k-nearest-neighbour majority vote
#[derive(Debug, Clone)]
pub struct KnnClassifier {
    k: usize,
    num_classes: usize,
}

impl KnnClassifier {
    pub fn new(k: usize, num_classes: usize) -> Result<Self> {
        if k == 0 {
            return Err(Error::Configuration {
                message: "k must be at least 1".to_string(),
            });
        }
        if num_classes == 0 || num_classes > 256 {
            return Err(Error::Configuration {
                message: format!("num_classes {} must be in 1..=256", num_classes),
            });
        }
        Ok(Self { k, num_classes })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Count `labels` into `tallies` and return the winning class
    fn tally<I>(&self, labels: I, tallies: &mut [usize]) -> Result<ClassId>
    where
        I: IntoIterator<Item = ClassId>,
    {
        tallies.iter_mut().for_each(|t| *t = 0);
        for label in labels {
            let slot = tallies.get_mut(label as usize).ok_or_else(|| {
                Error::range(format!(
                    "neighbour label {} outside 0..{}",
                    label, self.num_classes
                ))
            })?;
            *slot += 1;
        }

        let mut best = 0;
        for class in 1..tallies.len() {
            if tallies[class] > tallies[best] {
                best = class;
            }
        }
        Ok(best as ClassId)
    }

    /// Majority class among `labels`; ties go to the smallest class id
    pub fn vote<I>(&self, labels: I) -> Result<ClassId>
    where
        I: IntoIterator<Item = ClassId>,
    {
        let mut tallies = vec![0usize; self.num_classes];
        self.tally(labels, &mut tallies)
    }

    /// Predict a label for every example `0..matrix.len()` using `subset` as references
    pub fn classify_all(
        &self,
        matrix: &DistanceMatrix,
        labels: &[ClassId],
        subset: &[ExampleIndex],
    ) -> Result<Vec<ClassId>> {
        let n = matrix.len();
        if labels.len() != n {
            return Err(Error::Internal {
                message: format!("{} labels for a {}-example matrix", labels.len(), n),
            });
        }
        if subset.is_empty() {
            return Err(Error::range("cannot classify against an empty subset"));
        }
        if let Some(&bad) = subset.iter().find(|&&idx| idx >= n) {
            return Err(Error::range(format!(
                "subset index {} out of range (total {})",
                bad, n
            )));
        }

        let mut row = try_alloc(subset.len(), 0u16, "dist_buffer")?;
        let mut positions = try_with_capacity(subset.len(), "sorted_idxs")?;
        let mut tallies = vec![0usize; self.num_classes];
        let mut predicted = try_with_capacity(n, "predicted_labels")?;

        for i in 0..n {
            matrix.gather_row(i, subset, &mut row)?;
            select_nearest(&row, self.k, &mut positions);

            let class = self.tally(positions.iter().map(|&p| labels[subset[p]]), &mut tallies)?;
            trace!("example {}: tallies {:?} -> {}", i, tallies, class);
            predicted.push(class);
        }

        debug!(
            "Classified {} examples against {} references (k={})",
            n,
            subset.len(),
            self.k
        );
        Ok(predicted)
    }
}
