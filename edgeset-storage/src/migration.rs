//! # Tier Migration
//!
//! Makes a freshly selected subset the new contents of the persistent tier.
//!
//! ```text
//! sorted subset:  [ v0 v1 .. v(Pv-1) | p0 p1 p2 ... ]
//!                  volatile members    persistent members (stay put)
//!
//! persistent range R..N-1 merged against the tail:
//!     R   R+1  R+2  R+3 ...
//!     p0? skip / else vacated
//!
//! copy v_i ──> vacated_i   for i in 0..Pv   (sector-aware writes)
//! ```
//!
//! Volatile slots are left as they are; the copied examples now exist in both
//! tiers until the host overwrites the volatile tier with new data. Persistent
//! examples that were not selected and received a copy are lost.

use std::collections::BTreeSet;

use tracing::{debug, info};

use edgeset_core::error::{Error, Result, ResultExt};
use edgeset_core::utils::try_with_capacity;
use edgeset_core::{ExampleIndex, GeometryConfig, Location};

use crate::device::PersistentDevice;
use crate::layout::locate;
use crate::store::ExampleStore;

/// Outcome of one migration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// `(volatile source, persistent destination)` in copy order
    pub moves: Vec<(ExampleIndex, ExampleIndex)>,
    /// Distinct erase sectors that were rewritten
    pub sectors_rewritten: usize,
}

/// Sort and check a subset: in range, no duplicates, no larger than the persistent tier
fn sorted_subset(geometry: &GeometryConfig, subset: &[ExampleIndex]) -> Result<Vec<ExampleIndex>> {
    if subset.len() > geometry.persistent_capacity {
        return Err(Error::range(format!(
            "subset of {} examples exceeds persistent capacity {}",
            subset.len(),
            geometry.persistent_capacity
        )));
    }

    let mut sorted = try_with_capacity(subset.len(), "subset_sorted")?;
    sorted.extend_from_slice(subset);
    sorted.sort_unstable();

    if let Some(&last) = sorted.last() {
        if last >= geometry.total_examples() {
            return Err(Error::range(format!(
                "subset index {} out of range (total {})",
                last,
                geometry.total_examples()
            )));
        }
    }
    if let Some(pair) = sorted.windows(2).find(|w| w[0] == w[1]) {
        return Err(Error::range(format!("subset contains {} twice", pair[0])));
    }
    Ok(sorted)
}

/// Persistent indices absent from an ascending, duplicate-free subset.
///
/// Single two-pointer pass over `R..N-1` against the persistent tail of the subset.
pub fn vacated_slots(geometry: &GeometryConfig, sorted: &[ExampleIndex]) -> Result<Vec<ExampleIndex>> {
    let first_persistent = sorted.partition_point(|&idx| idx < geometry.volatile_capacity);
    let tail = &sorted[first_persistent..];

    let mut vacated = try_with_capacity(
        geometry.persistent_capacity.saturating_sub(tail.len()),
        "eeprom_not_in_subset",
    )?;
    let mut next = 0;
    for idx in geometry.volatile_capacity..geometry.total_examples() {
        if next < tail.len() && tail[next] == idx {
            next += 1;
        } else {
            vacated.push(idx);
        }
    }

    if next != tail.len() {
        return Err(Error::Internal {
            message: format!(
                "subset tail not consumed by merge ({} of {} matched); input was not sorted",
                next,
                tail.len()
            ),
        });
    }
    Ok(vacated)
}

/// Copy every volatile member of `subset` into a persistent slot that is not in `subset`
pub fn migrate_subset<D: PersistentDevice>(
    store: &mut ExampleStore<D>,
    subset: &[ExampleIndex],
) -> Result<MigrationReport> {
    let geometry = store.geometry().clone();
    let sorted = sorted_subset(&geometry, subset)?;

    let volatile_members = sorted.partition_point(|&idx| idx < geometry.volatile_capacity);
    let vacated = vacated_slots(&geometry, &sorted)?;

    // Holds by construction whenever len <= P; equality when len == P
    if vacated.len() < volatile_members {
        return Err(Error::Internal {
            message: format!(
                "{} volatile subset members but only {} free persistent slots",
                volatile_members,
                vacated.len()
            ),
        });
    }

    let mut record = vec![0u8; geometry.record_size()];
    let mut sectors = BTreeSet::new();
    let mut moves = try_with_capacity(volatile_members, "migration_moves")?;

    for (&from, &to) in sorted[..volatile_members].iter().zip(&vacated) {
        store
            .read_record_into(from, &mut record)
            .with_context(|| format!("migrating example {}", from))?;
        store
            .write_record(to, &record)
            .with_context(|| format!("migrating example {} to {}", from, to))?;

        if let Location::Persistent { sector, .. } = locate(&geometry, to)? {
            sectors.insert(sector);
        }
        debug!("migrated example {} -> {}", from, to);
        moves.push((from, to));
    }

    store.sync()?;

    info!(
        "Migration complete: {} examples moved, {} sectors rewritten",
        moves.len(),
        sectors.len()
    );

    Ok(MigrationReport {
        moves,
        sectors_rewritten: sectors.len(),
    })
}
