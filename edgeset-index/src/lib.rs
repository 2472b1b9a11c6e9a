//! # EdgeSet Index
//!
//! Distance computation, subset sampling and nearest-neighbour classification
//! over the examples held by an [`edgeset_storage::ExampleStore`].
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Index Layer                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │    SIMD     │───>│  Distance   │───>│    k-NN     │      │
//! │  │ dot product │    │   Matrix    │    │ Classifier  │      │
//! │  │ (AVX2/NEON) │    │ (packed u16)│    │             │      │
//! │  └─────────────┘    └─────────────┘    └──────▲──────┘      │
//! │                                               │              │
//! │                     ┌─────────────┐           │              │
//! │      labels ───────>│   Subset    │───────────┘              │
//! │                     │   Sampler   │──> migration             │
//! │                     └─────────────┘                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `simd`: byte dot product with runtime CPU dispatch
//! - `matrix`: packed symmetric distance matrix
//! - `sampler`: uniform and class-balanced subsets
//! - `knn`: neighbour ranking and majority vote

pub mod knn;
pub mod matrix;
pub mod sampler;
pub mod simd;

pub use knn::{nearest_positions, KnnClassifier};
pub use matrix::{packed_index, packed_len, ComputeStats, DistanceMatrix, DIAGONAL_SENTINEL};
pub use sampler::{balanced_subset, fisher_yates, select_subset, uniform_subset};
pub use simd::{dot_product_u8, dot_product_u8_scalar, DotProductFn};
