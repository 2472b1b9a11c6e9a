//! # EdgeSet Core
//!
//! Building blocks shared by every EdgeSet crate:
//! - Configuration (tier geometry, quantization, protocol, logging)
//! - Error types
//! - Shared identifiers and locations
//! - Allocation helpers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  edgeset-core                   │
//! ├─────────────────────────────────────────────────┤
//! │  • config  - Geometry and ambient settings     │
//! │  • error   - Error kinds and wire prefixes     │
//! │  • types   - Indices, tiers, locations         │
//! │  • utils   - Fallible allocation, formatting   │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::{Config, GeometryConfig};
pub use error::{Error, Result};
pub use types::{ClassId, ExampleIndex, Location, SelectionMode};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
