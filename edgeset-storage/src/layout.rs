//! # Tier Layout
//!
//! Every address calculation for example records happens here.
//!
//! ```text
//! global index:  0 ........ R-1 | R .................................. N-1
//!                 volatile slots | persistent slot e = idx - R
//!                                |
//!                                v
//!               sector  = e / per_sector
//!               offset  = (e % per_sector) * record_size
//!               address = base + sector * sector_size + offset
//! ```
//!
//! Records never straddle sectors; the tail of each sector past the last whole
//! record is unused.

use edgeset_core::error::{Error, Result};
use edgeset_core::{ExampleIndex, GeometryConfig, Location};

/// Map a global example index to its tier and physical position
pub fn locate(geometry: &GeometryConfig, idx: ExampleIndex) -> Result<Location> {
    if idx >= geometry.total_examples() {
        return Err(Error::range(format!(
            "example index {} out of range (total {})",
            idx,
            geometry.total_examples()
        )));
    }

    if idx < geometry.volatile_capacity {
        return Ok(Location::Volatile { slot: idx });
    }

    let relative = idx - geometry.volatile_capacity;
    let per_sector = geometry.examples_per_sector();
    let sector = relative / per_sector;
    let byte_offset = (relative % per_sector) * geometry.record_size();
    let sector_address = geometry.base_address + (sector * geometry.sector_size) as u32;

    Ok(Location::Persistent {
        sector,
        sector_address,
        byte_offset,
    })
}

/// Global index of persistent slot `slot` (0-based within the persistent tier)
pub fn persistent_index(geometry: &GeometryConfig, slot: usize) -> Result<ExampleIndex> {
    if slot >= geometry.persistent_capacity {
        return Err(Error::range(format!(
            "persistent slot {} out of range (capacity {})",
            slot, geometry.persistent_capacity
        )));
    }
    Ok(geometry.volatile_capacity + slot)
}

/// Resolve a raw device address to the example whose record starts there
pub fn index_for_address(geometry: &GeometryConfig, address: u32) -> Result<ExampleIndex> {
    let offset = address.checked_sub(geometry.base_address).ok_or_else(|| {
        Error::range(format!(
            "address {:#010x} below persistent tier base {:#010x}",
            address, geometry.base_address
        ))
    })? as usize;

    let sector = offset / geometry.sector_size;
    let in_sector = offset % geometry.sector_size;
    if in_sector % geometry.record_size() != 0 {
        return Err(Error::range(format!(
            "address {:#010x} is not the start of a record",
            address
        )));
    }

    let record = in_sector / geometry.record_size();
    if record >= geometry.examples_per_sector() {
        return Err(Error::range(format!(
            "address {:#010x} falls in the unused tail of sector {}",
            address, sector
        )));
    }

    let slot = sector * geometry.examples_per_sector() + record;
    persistent_index(geometry, slot)
}
