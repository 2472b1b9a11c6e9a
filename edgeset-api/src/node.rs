//! # Edge Node
//!
//! Owns the store and all scratch state between requests.
//!
//! ```text
//!  write_* ─────────────┐
//!  migrate ─────────────┼──> distances marked stale
//!                       │
//!  read distances ──┐   │
//!  select_subset ───┴──> ensure_distances: recompute if missing or stale
//!
//!  select_subset: labels ──> sample (rng) ──> classify ──> Selection
//!                 caller streams the result, then calls migrate
//! ```

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use edgeset_core::error::{Error, Result};
use edgeset_core::{ClassId, Config, ExampleIndex, SelectionMode};
use edgeset_index::{select_subset, ComputeStats, DistanceMatrix, KnnClassifier};
use edgeset_storage::{
    index_for_address, migrate_subset, persistent_index, ExampleStore, LabelVector,
    MigrationReport, PersistentDevice,
};

use crate::command::PersistentTarget;

/// Output of one subset-selection round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub mode: SelectionMode,
    pub subset: Vec<ExampleIndex>,
    /// One predicted class per example, in index order
    pub predicted: Vec<ClassId>,
}

pub struct EdgeNode<D: PersistentDevice> {
    config: Config,
    store: ExampleStore<D>,
    matrix: Option<DistanceMatrix>,
    matrix_stale: bool,
    rng: ChaCha8Rng,
    classifier: KnnClassifier,
}

impl<D: PersistentDevice> EdgeNode<D> {
    pub fn new(config: Config, device: D) -> Result<Self> {
        config.validate()?;
        let store = ExampleStore::new(config.geometry.clone(), device)?;
        let classifier = KnnClassifier::new(config.classifier.k, config.geometry.num_classes)?;
        let rng = ChaCha8Rng::seed_from_u64(config.sampling.seed);

        info!(
            "EdgeNode ready: {} examples ({} volatile, {} persistent), k={}, seed={}",
            store.len(),
            config.geometry.volatile_capacity,
            config.geometry.persistent_capacity,
            config.classifier.k,
            config.sampling.seed
        );

        Ok(Self {
            config,
            store,
            matrix: None,
            matrix_stale: true,
            rng,
            classifier,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &ExampleStore<D> {
        &self.store
    }

    pub fn into_store(self) -> ExampleStore<D> {
        self.store
    }

    /// Check that `index` names a volatile slot
    pub fn volatile_index(&self, index: ExampleIndex) -> Result<ExampleIndex> {
        let capacity = self.config.geometry.volatile_capacity;
        if index >= capacity {
            return Err(Error::range(format!(
                "volatile example {} out of range (capacity {})",
                index, capacity
            )));
        }
        Ok(index)
    }

    /// Global index of a persistent slot or raw record address
    pub fn resolve_persistent(&self, target: PersistentTarget) -> Result<ExampleIndex> {
        match target {
            PersistentTarget::Slot(slot) => persistent_index(&self.config.geometry, slot),
            PersistentTarget::Address(address) => index_for_address(&self.config.geometry, address),
        }
    }

    pub fn read_record(&mut self, idx: ExampleIndex) -> Result<Vec<u8>> {
        self.store.read_record(idx)
    }

    pub fn write_record(&mut self, idx: ExampleIndex, record: &[u8]) -> Result<()> {
        self.matrix_stale = true;
        self.store.write_record(idx, record)
    }

    /// Rescan every label byte
    pub fn labels(&mut self) -> Result<LabelVector> {
        LabelVector::scan(&mut self.store)
    }

    pub fn distances_stale(&self) -> bool {
        self.matrix_stale || self.matrix.is_none()
    }

    /// Recompute the full matrix, allocating it on first use
    pub fn compute_distances(&mut self) -> Result<ComputeStats> {
        let matrix = match self.matrix.take() {
            Some(matrix) => matrix,
            None => DistanceMatrix::new(self.store.len(), self.config.distance.shift)?,
        };
        self.matrix_stale = true;
        let matrix = self.matrix.insert(matrix);
        let stats = matrix.compute(&mut self.store)?;
        self.matrix_stale = false;
        Ok(stats)
    }

    /// Current matrix, recomputed first when missing or stale
    pub fn ensure_distances(&mut self) -> Result<&DistanceMatrix> {
        if self.distances_stale() {
            debug!("Distance matrix missing or stale; recomputing");
            self.compute_distances()?;
        }
        self.matrix.as_ref().ok_or_else(|| Error::Internal {
            message: "distance matrix missing after recompute".to_string(),
        })
    }

    /// Replace the sampling generator
    pub fn reseed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
        info!("Random seed set to {}", seed);
    }

    /// Sample a subset and classify every example against it
    pub fn select_subset(&mut self, mode: SelectionMode) -> Result<Selection> {
        let labels = self.labels()?;
        let geometry = &self.config.geometry;
        let subset = select_subset(
            &mut self.rng,
            mode,
            &labels,
            geometry.subset_size(),
            geometry.num_classes,
        )?;

        self.ensure_distances()?;
        let matrix = self.matrix.as_ref().ok_or_else(|| Error::Internal {
            message: "distance matrix missing after recompute".to_string(),
        })?;
        let predicted = self.classifier.classify_all(matrix, labels.as_slice(), &subset)?;

        info!("Selected {} examples ({} mode)", subset.len(), mode);
        Ok(Selection {
            mode,
            subset,
            predicted,
        })
    }

    /// Persist the volatile members of `subset`
    pub fn migrate(&mut self, subset: &[ExampleIndex]) -> Result<MigrationReport> {
        self.matrix_stale = true;
        migrate_subset(&mut self.store, subset)
    }
}
