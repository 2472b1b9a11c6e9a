//! # EdgeSet Storage
//!
//! Labeled example records split across a small volatile tier and a larger
//! erase-sector persistent tier.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ExampleStore                            │
//! │                                                              │
//! │  global index ──> layout::locate ──┬──> volatile Vec<u8>     │
//! │                                    │                         │
//! │                                    └──> PersistentDevice     │
//! │                                         (MemoryFlash /       │
//! │                                          FileFlash)          │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Derived State                           │
//! │                                                              │
//! │  LabelVector::scan ──> last byte of every record             │
//! │  migrate_subset    ──> volatile subset members copied into   │
//! │                        persistent slots nobody selected      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod device;
pub mod flash_file;
pub mod labels;
pub mod layout;
pub mod migration;
pub mod store;

pub use device::{MemoryFlash, PersistentDevice, ERASED_BYTE};
pub use flash_file::FileFlash;
pub use labels::LabelVector;
pub use layout::{index_for_address, locate, persistent_index};
pub use migration::{migrate_subset, vacated_slots, MigrationReport};
pub use store::ExampleStore;
