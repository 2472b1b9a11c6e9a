//! # Common Utilities
//!
//! Helpers used throughout EdgeSet.

use crate::error::{Error, Result};

/// Allocate a vector of `len` copies of `value`, reporting failure instead of aborting.
///
/// Scratch buffers (distance matrix, subsets, label arrays) go through here so an
/// out-of-memory condition becomes an `Error::Allocation` at the request boundary.
pub fn try_alloc<T: Clone>(len: usize, value: T, resource: &str) -> Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| Error::Allocation {
        resource: resource.to_string(),
        bytes: len.saturating_mul(std::mem::size_of::<T>()),
    })?;
    buf.resize(len, value);
    Ok(buf)
}

/// Like [`try_alloc`] but only reserves capacity
pub fn try_with_capacity<T>(len: usize, resource: &str) -> Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| Error::Allocation {
        resource: resource.to_string(),
        bytes: len.saturating_mul(std::mem::size_of::<T>()),
    })?;
    Ok(buf)
}

/// Format bytes in human readable format
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f64 = bytes as f64;
    let exp = (bytes_f64.log2() / 10.0).floor() as usize;
    let unit_index = exp.min(UNITS.len() - 1);
    let size = bytes_f64 / (1024_f64).powi(unit_index as i32);

    if size >= 100.0 {
        format!("{:.0} {}", size, UNITS[unit_index])
    } else if size >= 10.0 {
        format!("{:.1} {}", size, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

/// Integer ceiling division
pub fn div_ceil(a: usize, b: usize) -> usize {
    (a + b - 1) / b
}
