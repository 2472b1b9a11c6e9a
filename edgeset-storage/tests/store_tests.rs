//! # Example Store Tests
//!
//! Record round trips, sector-preserving writes, labels and migration.

use std::collections::HashSet;

use edgeset_core::{Error, GeometryConfig};
use edgeset_storage::{
    index_for_address, locate, migrate_subset, vacated_slots, ExampleStore, FileFlash,
    LabelVector, MemoryFlash, PersistentDevice,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tempfile::TempDir;

/// 4 feature bytes, 3 records per 16-byte sector, 7 persistent slots over 3 sectors
fn small_geometry() -> GeometryConfig {
    GeometryConfig {
        feature_len: 4,
        volatile_capacity: 4,
        persistent_capacity: 7,
        sector_size: 16,
        base_address: 0x1000,
        num_classes: 3,
    }
}

fn memory_store(geometry: GeometryConfig) -> ExampleStore<MemoryFlash> {
    let flash = MemoryFlash::for_geometry(&geometry);
    ExampleStore::new(geometry, flash).unwrap()
}

/// Record whose bytes identify the example it was written to
fn tagged_record(idx: usize, label: u8) -> Vec<u8> {
    vec![idx as u8, (idx * 3) as u8, 0xA5, (idx ^ 0x5A) as u8, label]
}

fn fill(store: &mut ExampleStore<MemoryFlash>) {
    for idx in 0..store.len() {
        let label = (idx % 3) as u8;
        store.write_record(idx, &tagged_record(idx, label)).unwrap();
    }
}

// ============================================================================
// Round trips
// ============================================================================

#[test]
fn test_roundtrip_every_slot() {
    let mut store = memory_store(small_geometry());
    fill(&mut store);

    for idx in 0..store.len() {
        assert_eq!(store.read_record(idx).unwrap(), tagged_record(idx, (idx % 3) as u8));
    }
}

#[test]
fn test_roundtrip_across_sector_boundary() {
    let g = small_geometry();
    let mut store = memory_store(g.clone());

    // 6 is the last record of sector 0, 7 the first of sector 1
    let last = locate(&g, 6).unwrap();
    let first = locate(&g, 7).unwrap();
    assert_ne!(last, first);

    store.write_record(6, &[1, 2, 3, 4, 2]).unwrap();
    store.write_record(7, &[5, 6, 7, 8, 1]).unwrap();

    assert_eq!(store.read_record(6).unwrap(), vec![1, 2, 3, 4, 2]);
    assert_eq!(store.read_record(7).unwrap(), vec![5, 6, 7, 8, 1]);
}

#[test]
fn test_reference_geometry_roundtrip() {
    let g = GeometryConfig::default();
    let mut store = memory_store(g.clone());
    let mut rng = ChaCha8Rng::seed_from_u64(3);

    for idx in [0, 399, 400, 404, 405, 1199] {
        let record: Vec<u8> = (0..g.record_size()).map(|_| rng.gen()).collect();
        store.write_record(idx, &record).unwrap();
        assert_eq!(store.read_record(idx).unwrap(), record);
    }
}

#[test]
fn test_persistent_write_leaves_neighbors_untouched() {
    let mut store = memory_store(small_geometry());
    fill(&mut store);

    store.write_record(8, &[9, 9, 9, 9, 0]).unwrap();

    assert_eq!(store.read_record(7).unwrap(), tagged_record(7, 1));
    assert_eq!(store.read_record(9).unwrap(), tagged_record(9, 0));
    assert_eq!(store.read_record(8).unwrap(), vec![9, 9, 9, 9, 0]);
}

#[test]
fn test_read_byte_and_features() {
    let mut store = memory_store(small_geometry());
    store.write_record(5, &[10, 20, 30, 40, 2]).unwrap();

    assert_eq!(store.read_byte(5, 2).unwrap(), 30);
    assert_eq!(store.read_label(5).unwrap(), 2);

    let mut features = [0u8; 4];
    store.read_features_into(5, &mut features).unwrap();
    assert_eq!(features, [10, 20, 30, 40]);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_out_of_range_index() {
    let mut store = memory_store(small_geometry());
    let err = store.read_record(11).unwrap_err();
    assert!(matches!(err, Error::Range { .. }));
    assert_eq!(err.wire_prefix(), "index_error");
    assert!(store.write_record(11, &[0; 5]).is_err());
}

#[test]
fn test_wrong_record_length() {
    let mut store = memory_store(small_geometry());
    assert!(matches!(store.write_record(0, &[0; 4]), Err(Error::Range { .. })));
    let mut buf = [0u8; 3];
    assert!(store.read_features_into(0, &mut buf).is_err());
}

#[test]
fn test_device_failure_surfaces() {
    let mut store = memory_store(small_geometry());
    store.device_mut().set_write_protected(true);

    let err = store.write_record(5, &[0; 5]).unwrap_err();
    assert!(matches!(err, Error::Device { .. }));
    assert_eq!(err.wire_prefix(), "dev_error");

    // Volatile writes never touch the device
    store.write_record(1, &[1; 5]).unwrap();
}

// ============================================================================
// Raw addresses
// ============================================================================

#[test]
fn test_raw_address_resolution() {
    let g = small_geometry();
    assert_eq!(index_for_address(&g, 0x1000).unwrap(), 4);
    assert_eq!(index_for_address(&g, 0x1005).unwrap(), 5);
    assert_eq!(index_for_address(&g, 0x1010).unwrap(), 7);
    // Unused tail byte of sector 0
    assert!(index_for_address(&g, 0x100F).is_err());
}

// ============================================================================
// Labels
// ============================================================================

#[test]
fn test_label_scan_sees_both_tiers() {
    let mut store = memory_store(small_geometry());
    fill(&mut store);

    let labels = LabelVector::scan(&mut store).unwrap();
    let expected: Vec<u8> = (0..11).map(|i| (i % 3) as u8).collect();
    assert_eq!(labels.as_slice(), expected.as_slice());
    assert_eq!(labels.class_counts(3).unwrap(), vec![4, 4, 3]);

    store.write_record(9, &tagged_record(9, 2)).unwrap();
    let rescanned = LabelVector::scan(&mut store).unwrap();
    assert_eq!(rescanned.as_slice()[9], 2);
}

// ============================================================================
// Migration
// ============================================================================

#[test]
fn test_migration_moves_volatile_members() {
    let g = small_geometry();
    let mut store = memory_store(g.clone());
    fill(&mut store);

    // Full-size subset: volatile 0 and 2, persistent 4, 6, 7, 9, 10
    let subset = vec![10, 2, 6, 0, 4, 9, 7];
    let report = migrate_subset(&mut store, &subset).unwrap();

    // Displaced persistent records = volatile members in the subset
    assert_eq!(report.moves, vec![(0, 5), (2, 8)]);
    assert_eq!(report.sectors_rewritten, 2);

    assert_eq!(store.read_record(5).unwrap(), tagged_record(0, 0));
    assert_eq!(store.read_record(8).unwrap(), tagged_record(2, 2));

    // Selected persistent examples survive in place
    for idx in [4, 6, 7, 9, 10] {
        assert_eq!(store.read_record(idx).unwrap(), tagged_record(idx, (idx % 3) as u8));
    }
    // Volatile slots keep their data
    assert_eq!(store.read_record(0).unwrap(), tagged_record(0, 0));
}

#[test]
fn test_every_volatile_member_readable_after_migration() {
    let g = small_geometry();
    let mut store = memory_store(g.clone());
    fill(&mut store);

    let mut rng = ChaCha8Rng::seed_from_u64(11);
    for _ in 0..20 {
        let mut pool: Vec<usize> = (0..g.total_examples()).collect();
        for i in (1..pool.len()).rev() {
            let j = rng.gen_range(0..=i);
            pool.swap(i, j);
        }
        let subset = &pool[..g.persistent_capacity];

        let before: Vec<Vec<u8>> = subset
            .iter()
            .map(|&idx| store.read_record(idx).unwrap())
            .collect();
        let volatile_members = subset.iter().filter(|&&i| i < g.volatile_capacity).count();

        let report = migrate_subset(&mut store, subset).unwrap();
        assert_eq!(report.moves.len(), volatile_members);

        let mut persistent: Vec<Vec<u8>> = (g.volatile_capacity..g.total_examples())
            .map(|idx| store.read_record(idx).unwrap())
            .collect();
        for record in &before {
            let pos = persistent.iter().position(|r| r == record);
            assert!(pos.is_some(), "record {:?} missing from persistent tier", record);
            persistent.remove(pos.unwrap());
        }

        // Next round brings fresh volatile data
        for idx in 0..g.volatile_capacity {
            let label = rng.gen_range(0..3);
            store.write_record(idx, &tagged_record(idx + 100, label)).unwrap();
        }
    }
}

#[test]
fn test_short_subset_leaves_spare_slots() {
    let g = small_geometry();
    let mut store = memory_store(g.clone());
    fill(&mut store);

    let report = migrate_subset(&mut store, &[1, 3, 8]).unwrap();
    assert_eq!(report.moves, vec![(1, 4), (3, 5)]);
    // Unused vacated slots keep their old contents
    assert_eq!(store.read_record(6).unwrap(), tagged_record(6, 0));
}

#[test]
fn test_vacated_count_matches_volatile_members() {
    let g = small_geometry();
    let sorted = vec![0, 1, 3, 5, 6, 8, 10];
    let vacated = vacated_slots(&g, &sorted).unwrap();
    assert_eq!(vacated, vec![4, 7, 9]);
    assert_eq!(vacated.len(), sorted.iter().filter(|&&i| i < 4).count());

    let unique: HashSet<_> = vacated.iter().collect();
    assert_eq!(unique.len(), vacated.len());
}

#[test]
fn test_migration_rejects_invalid_subset() {
    let mut store = memory_store(small_geometry());
    assert!(migrate_subset(&mut store, &[0, 1, 2, 3, 4, 5, 6, 7]).is_err());
    assert!(migrate_subset(&mut store, &[1, 1]).is_err());
    assert!(migrate_subset(&mut store, &[42]).is_err());
    assert_eq!(store.device().total_erases(), 0);
}

// ============================================================================
// File-backed flash
// ============================================================================

#[test]
fn test_file_flash_store_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("flash.img");
    let g = small_geometry();

    {
        let flash = FileFlash::open(&path, &g).unwrap();
        let mut store = ExampleStore::new(g.clone(), flash).unwrap();
        store.write_record(4, &[1, 2, 3, 4, 1]).unwrap();
        store.write_record(10, &[5, 6, 7, 8, 2]).unwrap();
        store.write_record(0, &[9, 9, 9, 9, 0]).unwrap();
        store.sync().unwrap();
    }

    let flash = FileFlash::open(&path, &g).unwrap();
    let mut store = ExampleStore::new(g.clone(), flash).unwrap();
    assert_eq!(store.read_record(4).unwrap(), vec![1, 2, 3, 4, 1]);
    assert_eq!(store.read_record(10).unwrap(), vec![5, 6, 7, 8, 2]);
    // Volatile tier starts empty on every boot
    assert_eq!(store.read_record(0).unwrap(), vec![0; 5]);
    assert_eq!(store.device().capacity(), g.persistent_span());
}
