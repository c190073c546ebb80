//! End-to-end tests for the binary payload cache.
//!
//! Covers:
//! - Payload round trips under memory pressure
//! - Slicing a large payload read back as a stream
//! - Data file rotation with older handles still readable
//! - Close and drop tearing down the working directory
//! - Concurrent writers sharing one manager

use blobcache_common::config::BinaryDataConfig;
use blobcache_common::page::PAGE_SIZE;
use blobcache_common::CacheError;
use blobcache_storage::{BinaryContentMetaData, BinaryDataManager};
use rand::{Rng, SeedableRng};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;
use test_log::test;

// =============================================================================
// Helpers
// =============================================================================

fn small_cache(dir: &Path, max_pages_in_memory: usize) -> BinaryDataConfig {
    BinaryDataConfig {
        max_pages_in_memory,
        max_bucket_file_size: 8 * PAGE_SIZE as u64,
        ..BinaryDataConfig::new(dir)
    }
}

fn payload(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill(&mut data[..]);
    data
}

// =============================================================================
// Round trips
// =============================================================================

#[test]
fn test_round_trip_under_memory_pressure() {
    let dir = tempdir().unwrap();
    let manager = BinaryDataManager::new(small_cache(dir.path(), 4)).unwrap();

    let sizes = [
        0,
        1,
        PAGE_SIZE - 1,
        PAGE_SIZE,
        PAGE_SIZE + 1,
        3 * PAGE_SIZE + 17,
        10 * PAGE_SIZE,
    ];
    let mut written = Vec::new();
    for (seed, size) in sizes.iter().enumerate() {
        let data = payload(*size, seed as u64);
        let handle = manager.write_bytes(&data).unwrap();
        assert_eq!(handle.size_in_bytes(), *size as u64);
        written.push((handle, data));
    }

    let stats = manager.page_manager().stats();
    assert!(stats.swapped_out > 0);
    assert!(manager.page_manager().size() <= 4);

    // Read back in reverse to force swap-ins
    for (handle, data) in written.iter().rev() {
        let read = manager.read_bytes(handle).unwrap();
        assert_eq!(&read[..], &data[..], "payload {} differs", handle);
    }
    assert!(manager.page_manager().stats().swapped_in > 0);
}

#[test]
fn test_write_from_reader() {
    let dir = tempdir().unwrap();
    let manager = BinaryDataManager::new(small_cache(dir.path(), 8)).unwrap();
    let data = payload(5 * PAGE_SIZE + 3, 11);

    let mut reader = std::io::Cursor::new(data.clone());
    let handle = manager.write(&mut reader).unwrap();

    let mut stream = manager.read(&handle).unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    assert_eq!(out, data);
}

#[test]
fn test_large_payload_slice() {
    let dir = tempdir().unwrap();
    let manager = BinaryDataManager::new(small_cache(dir.path(), 16)).unwrap();
    let data = payload(1024 * 1024, 42);
    let handle = manager.write_bytes(&data).unwrap();

    let mut stream = manager.read(&handle).unwrap();
    stream.seek(SeekFrom::Start(500_000)).unwrap();
    let mut slice = [0u8; 100];
    stream.read_exact(&mut slice).unwrap();
    assert_eq!(&slice[..], &data[500_000..500_100]);
}

#[test]
fn test_handle_survives_json() {
    let dir = tempdir().unwrap();
    let manager = BinaryDataManager::new(small_cache(dir.path(), 8)).unwrap();
    manager.write_bytes(b"padding").unwrap();
    let handle = manager.write_bytes(b"value stored inside a cell").unwrap();

    let json = serde_json::to_string(&handle).unwrap();
    let restored: BinaryContentMetaData = serde_json::from_str(&json).unwrap();
    assert_eq!(
        &manager.read_bytes(&restored).unwrap()[..],
        b"value stored inside a cell"
    );
}

// =============================================================================
// Rotation
// =============================================================================

#[test]
fn test_rotation_keeps_old_handles_readable() {
    let dir = tempdir().unwrap();
    let config = BinaryDataConfig {
        max_data_file_size: 2 * PAGE_SIZE as u64,
        ..small_cache(dir.path(), 6)
    };
    let manager = BinaryDataManager::new(config).unwrap();

    let mut written = Vec::new();
    for seed in 0..6 {
        let data = payload(PAGE_SIZE + 100, seed);
        written.push((manager.write_bytes(&data).unwrap(), data));
    }

    // Two payloads fit before a file reaches the cap
    let files = manager.data_files();
    assert_eq!(files.len(), 3);
    for (index, file) in files.iter().enumerate() {
        assert!(file.ends_with(format!("data_{}.bin", index)));
        assert!(file.exists());
    }

    // A payload is never split across files
    for (handle, data) in &written {
        let file = handle.file_path();
        let in_file: Vec<_> = written
            .iter()
            .filter(|(other, _)| other.file_path() == file)
            .collect();
        assert!(in_file.len() <= 2);
        assert_eq!(&manager.read_bytes(handle).unwrap()[..], &data[..]);
    }

    assert_eq!(written[0].0.file_path(), written[1].0.file_path());
    assert_ne!(written[1].0.file_path(), written[2].0.file_path());
    assert_eq!(written[2].0.offset(), 0);
}

#[test]
fn test_oversized_payload_stays_in_one_file() {
    let dir = tempdir().unwrap();
    let config = BinaryDataConfig {
        max_data_file_size: 1024,
        ..small_cache(dir.path(), 6)
    };
    let manager = BinaryDataManager::new(config).unwrap();

    let big = payload(3 * PAGE_SIZE, 9);
    let first = manager.write_bytes(&big).unwrap();
    let second = manager.write_bytes(b"after").unwrap();

    assert_eq!(first.size_in_bytes(), big.len() as u64);
    assert_ne!(first.file_path(), second.file_path());
    assert_eq!(&manager.read_bytes(&first).unwrap()[..], &big[..]);
    assert_eq!(&manager.read_bytes(&second).unwrap()[..], b"after");
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_close_twice() {
    let dir = tempdir().unwrap();
    let manager = BinaryDataManager::new(small_cache(dir.path(), 4)).unwrap();
    manager.write_bytes(&payload(4 * PAGE_SIZE, 1)).unwrap();
    let working_dir = manager.working_dir().to_path_buf();

    manager.close().unwrap();
    manager.close().unwrap();
    assert!(!working_dir.exists());
    assert!(manager.page_manager().is_closed());
    assert!(matches!(
        manager.write_bytes(b"late"),
        Err(CacheError::Closed(_))
    ));

    // The parent directory is left alone
    assert!(dir.path().exists());
}

#[test]
fn test_drop_removes_working_dir() {
    let dir = tempdir().unwrap();
    let working_dir = {
        let manager = BinaryDataManager::new(small_cache(dir.path(), 4)).unwrap();
        manager.write_bytes(&payload(2 * PAGE_SIZE, 2)).unwrap();
        manager.working_dir().to_path_buf()
    };
    assert!(!working_dir.exists());
}

#[test]
fn test_managers_are_isolated() {
    let dir = tempdir().unwrap();
    let a = BinaryDataManager::new(small_cache(dir.path(), 4)).unwrap();
    let b = BinaryDataManager::new(small_cache(dir.path(), 4)).unwrap();
    assert_ne!(a.working_dir(), b.working_dir());

    let handle = a.write_bytes(b"belongs to a").unwrap();
    assert!(matches!(
        b.read_bytes(&handle),
        Err(CacheError::InvalidParameter { .. })
    ));
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_concurrent_writers() {
    let dir = tempdir().unwrap();
    let config = BinaryDataConfig {
        max_data_file_size: 8 * PAGE_SIZE as u64,
        ..small_cache(dir.path(), 8)
    };
    let manager = Arc::new(BinaryDataManager::new(config).unwrap());

    let handles: Vec<_> = (0..4u64)
        .map(|worker| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                let mut rng = rand::rngs::StdRng::seed_from_u64(worker);
                let mut written = Vec::new();
                for i in 0..10 {
                    let data = payload(rng.gen_range(0..2 * PAGE_SIZE), worker * 100 + i);
                    written.push((manager.write_bytes(&data).unwrap(), data));
                }
                written
            })
        })
        .collect();

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.join().unwrap());
    }
    assert_eq!(all.len(), 40);

    for (handle, data) in &all {
        assert_eq!(&manager.read_bytes(handle).unwrap()[..], &data[..]);
    }
    let stats = manager.page_manager().stats();
    assert_eq!(stats.resident_pages, manager.page_manager().size());
    assert!(stats.resident_pages <= 8);
}
