//! Label vector: the last byte of every record, gathered by a full scan of both tiers.
//!
//! Never cached across requests. Either tier may have been rewritten since the
//! previous scan, so callers rebuild it before sampling or classifying.

use tracing::debug;

use edgeset_core::error::{Error, Result};
use edgeset_core::utils::try_alloc;
use edgeset_core::{ClassId, ExampleIndex};

use crate::device::PersistentDevice;
use crate::store::ExampleStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelVector {
    labels: Vec<ClassId>,
}

impl LabelVector {
    /// Read the label byte of every example, volatile tier first
    pub fn scan<D: PersistentDevice>(store: &mut ExampleStore<D>) -> Result<Self> {
        let n = store.len();
        let mut labels = try_alloc(n, 0u8, "labels")?;
        for (idx, label) in labels.iter_mut().enumerate() {
            *label = store.read_label(idx)?;
        }
        debug!("Scanned {} labels", n);
        Ok(Self { labels })
    }

    pub fn from_vec(labels: Vec<ClassId>) -> Self {
        Self { labels }
    }

    pub fn as_slice(&self) -> &[ClassId] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Examples per class. A label outside `0..num_classes` is a range error.
    pub fn class_counts(&self, num_classes: usize) -> Result<Vec<usize>> {
        let mut counts = vec![0usize; num_classes];
        for (idx, &label) in self.labels.iter().enumerate() {
            let slot = counts.get_mut(label as usize).ok_or_else(|| {
                Error::range(format!(
                    "example {} has label {} outside 0..{}",
                    idx, label, num_classes
                ))
            })?;
            *slot += 1;
        }
        Ok(counts)
    }

    /// Indices carrying `class`, ascending
    pub fn indices_of(&self, class: ClassId) -> Vec<ExampleIndex> {
        self.labels
            .iter()
            .enumerate()
            .filter(|&(_, &label)| label == class)
            .map(|(idx, _)| idx)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_indices() {
        let labels = LabelVector::from_vec(vec![0, 2, 2, 0, 2]);
        assert_eq!(labels.class_counts(3).unwrap(), vec![2, 0, 3]);
        assert_eq!(labels.indices_of(2), vec![1, 2, 4]);
        assert!(labels.indices_of(1).is_empty());
    }

    #[test]
    fn test_label_outside_class_range() {
        let labels = LabelVector::from_vec(vec![0, 0xFF]);
        assert!(matches!(labels.class_counts(10), Err(Error::Range { .. })));
    }
}
