//! # Subset Sampler
//!
//! Draws the reference subset for classification and migration.
//!
//! - **Uniform**: Fisher-Yates over `[0, n)`, keep the first `m`.
//! - **Balanced**: equal quota `ceil(m / K)` for each of the `K` classes present,
//!   each class shuffled independently, visited in class-id order.
//!
//! The generator is passed in by the caller. Same seed and same labels give the
//! same subset.

use rand::Rng;
use tracing::debug;

use edgeset_core::error::{Error, Result};
use edgeset_core::utils::{div_ceil, try_with_capacity};
use edgeset_core::{ClassId, ExampleIndex, SelectionMode};
use edgeset_storage::LabelVector;

/// In-place shuffle: `i` from `len-1` down to 1, swap with `j` uniform in `[0, i]`
pub fn fisher_yates<T, R: Rng + ?Sized>(rng: &mut R, items: &mut [T]) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

/// `m` distinct indices drawn uniformly from `[0, n)`
pub fn uniform_subset<R: Rng + ?Sized>(rng: &mut R, n: usize, m: usize) -> Result<Vec<ExampleIndex>> {
    if m > n {
        return Err(Error::range(format!(
            "cannot draw {} distinct examples from {}",
            m, n
        )));
    }

    let mut permutation = try_with_capacity(n, "rand_perm")?;
    permutation.extend(0..n);
    fisher_yates(rng, &mut permutation);
    permutation.truncate(m);

    debug!("Uniform subset: {} of {}", m, n);
    Ok(permutation)
}

/// Up to `m` indices with at most `ceil(m / K)` from any class.
///
/// Absent classes take no share of the quota. The result is shorter than `m`
/// when the classes present cannot fill their quotas.
pub fn balanced_subset<R: Rng + ?Sized>(
    rng: &mut R,
    labels: &LabelVector,
    m: usize,
    num_classes: usize,
) -> Result<Vec<ExampleIndex>> {
    let counts = labels.class_counts(num_classes)?;

    let present = counts.iter().filter(|&&c| c > 0).count();
    if present == 0 {
        return Err(Error::range("balanced sampling needs at least one labeled example"));
    }
    let quota = div_ceil(m, present);

    let mut subset = try_with_capacity(m.min(labels.len()), "subset_idxs")?;
    for class in 0..num_classes {
        if counts[class] == 0 {
            continue;
        }
        let mut members = labels.indices_of(class as ClassId);
        fisher_yates(rng, &mut members);

        let take = quota.min(members.len()).min(m - subset.len());
        subset.extend_from_slice(&members[..take]);
        debug!("class {}: {} available, took {}", class, members.len(), take);
    }

    debug!(
        "Balanced subset: {} of {} requested across {} classes (quota {})",
        subset.len(),
        m,
        present,
        quota
    );
    Ok(subset)
}

/// Dispatch on `mode`; uniform draws from every index in `labels`
pub fn select_subset<R: Rng + ?Sized>(
    rng: &mut R,
    mode: SelectionMode,
    labels: &LabelVector,
    m: usize,
    num_classes: usize,
) -> Result<Vec<ExampleIndex>> {
    match mode {
        SelectionMode::Uniform => uniform_subset(rng, labels.len(), m),
        SelectionMode::Balanced => balanced_subset(rng, labels, m, num_classes),
    }
}
