//! # Core Types
//!
//! Identifiers and small value types shared by the storage, index and API crates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Dense global example index in `[0, total_examples)`
pub type ExampleIndex = usize;

/// Class id stored in the last byte of every record
pub type ClassId = u8;

/// Resolved physical location of one example record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Slot in the RAM array
    Volatile { slot: usize },
    /// Record inside an erase sector
    Persistent {
        /// Sector number relative to the tier base
        sector: usize,
        /// Device address of the first byte of that sector
        sector_address: u32,
        /// Offset of the record within the sector
        byte_offset: usize,
    },
}

/// How a subset is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Fisher-Yates over every index
    Uniform,
    /// Equal quota per class present
    Balanced,
}

impl FromStr for SelectionMode {
    type Err = Error;

    /// Accepts the names as well as the numeric flag older hosts send (`0`/`1`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "uniform" | "0" => Ok(SelectionMode::Uniform),
            "balanced" | "1" => Ok(SelectionMode::Balanced),
            other => Err(Error::param(
                "select_subset",
                format!("unknown selection mode '{}'", other),
            )),
        }
    }
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionMode::Uniform => write!(f, "uniform"),
            SelectionMode::Balanced => write!(f, "balanced"),
        }
    }
}
