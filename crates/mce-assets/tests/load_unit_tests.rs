//! Integration tests for load unit pinning and eviction.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use mce_assets::io::{FileReader, FilesystemReader};
use mce_assets::loader::{AssetLoader, LoadUnitLoader};
use mce_assets::*;
use mce_test_utils::{CountingReader, GatedReader, path_string, write_file, write_load_unit};

// ============================================================================
// Helpers
// ============================================================================

const HEIGHTMAP: &[u8] = b"heightmap-bytes";
const SPLAT: &[u8] = b"splat";

fn write_terrain(dir: &Path) {
    write_load_unit(dir, "terrain", &[("heightmap", HEIGHTMAP), ("splat", SPLAT)]);
}

struct Rig {
    loader: Arc<LoadUnitLoader>,
    gate: Arc<GatedReader>,
    counting: Arc<CountingReader>,
}

/// Loader reading through `counting -> gate -> filesystem`, gate closed.
fn gated_rig(dir: &Path, config: LoaderConfig) -> Rig {
    let gate = Arc::new(GatedReader::closed(Arc::new(FilesystemReader::new())));
    let counting = Arc::new(CountingReader::new(Arc::clone(&gate) as Arc<dyn FileReader>));
    let prefix = PathPrefix::new(Arc::clone(&counting) as Arc<dyn FileReader>, path_string(dir));
    Rig {
        loader: Arc::new(LoadUnitLoader::new(vec![prefix], config)),
        gate,
        counting,
    }
}

fn counting_pin(loader: &LoadUnitLoader, name: &str, done: &Arc<AtomicUsize>, failed: &Arc<AtomicUsize>) {
    let done = Arc::clone(done);
    let failed = Arc::clone(failed);
    loader.pin_load_unit(
        name,
        Box::new(move || {
            done.fetch_add(1, Ordering::SeqCst);
        }),
        Box::new(move |_| {
            failed.fetch_add(1, Ordering::SeqCst);
        }),
    );
}

// ============================================================================
// Coalescing
// ============================================================================

#[test]
fn test_concurrent_pins_share_one_load() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_terrain(temp_dir.path());
    let rig = gated_rig(temp_dir.path(), LoaderConfig::default());
    let done = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let first = {
        let loader = Arc::clone(&rig.loader);
        let (done, failed) = (Arc::clone(&done), Arc::clone(&failed));
        thread::spawn(move || counting_pin(&loader, "terrain", &done, &failed))
    };
    assert!(rig.gate.wait_for_parked(1, Duration::from_secs(5)));
    assert_eq!(rig.loader.unit_state("terrain"), Some(LoadUnitState::LoadingMetadata));

    // The second pin joins the in-flight load and returns without I/O.
    let second = {
        let loader = Arc::clone(&rig.loader);
        let (done, failed) = (Arc::clone(&done), Arc::clone(&failed));
        thread::spawn(move || counting_pin(&loader, "terrain", &done, &failed))
    };
    second.join().unwrap();
    assert_eq!(done.load(Ordering::SeqCst), 0);
    assert_eq!(rig.loader.pin_count("terrain"), 2);

    rig.gate.open();
    first.join().unwrap();

    assert_eq!(done.load(Ordering::SeqCst), 2);
    assert_eq!(failed.load(Ordering::SeqCst), 0);
    assert_eq!(rig.counting.count_reads_ending_with(".lum"), 1);
    assert_eq!(rig.counting.count_reads_ending_with(".lup"), 1);
    assert_eq!(rig.counting.call_count(), 2);

    // A third thread gets an asset straight from the resident payload.
    rig.counting.clear_calls();
    let third = {
        let loader = Arc::clone(&rig.loader);
        thread::spawn(move || {
            let asset = Arc::new(Asset::new("terrain/heightmap"));
            assert!(loader.try_load(&asset));
            asset
        })
    };
    let heightmap = third.join().unwrap();
    assert_eq!(heightmap.state(), AssetState::Ready);
    assert_eq!(heightmap.data(), Some(HEIGHTMAP));
    assert_eq!(rig.counting.call_count(), 0);
}

#[test]
fn test_pin_through_server() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_terrain(temp_dir.path());
    write_file(temp_dir.path(), "loose.txt", b"loose");

    let server = AssetServer::new();
    server.register_loader(LoadUnitLoader::new(
        vec![PathPrefix::filesystem(path_string(temp_dir.path()))],
        LoaderConfig::default(),
    ));
    server.register_loader(loader::PerFileLoader::new(vec![PathPrefix::filesystem(
        path_string(temp_dir.path()),
    )]));

    // Not pinned yet: the load unit loader misses and the per-file loader
    // finds nothing either.
    let early = server.load_blocking("terrain/splat").unwrap_err();
    assert!(early.is_not_found());
    server.remove("terrain/splat");

    server.pin_load_unit_blocking("terrain").unwrap();
    let splat = server.load_blocking("terrain/splat").unwrap();
    assert_eq!(splat.data(), Some(SPLAT));
    let loose = server.load_blocking("loose.txt").unwrap();
    assert_eq!(loose.data(), Some(&b"loose"[..]));

    server.unpin_load_unit("terrain");
    let events = server.drain_events();
    assert!(events.contains(&AssetEvent::LoadUnitPinned {
        name: "terrain".to_string()
    }));
    assert!(events.contains(&AssetEvent::LoadUnitUnpinned {
        name: "terrain".to_string()
    }));
}

// ============================================================================
// Unpinning
// ============================================================================

#[test]
fn test_unpin_before_completion() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_terrain(temp_dir.path());
    let rig = gated_rig(temp_dir.path(), LoaderConfig::default());
    let done = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let pinning = {
        let loader = Arc::clone(&rig.loader);
        let (done, failed) = (Arc::clone(&done), Arc::clone(&failed));
        thread::spawn(move || counting_pin(&loader, "terrain", &done, &failed))
    };
    assert!(rig.gate.wait_for_parked(1, Duration::from_secs(5)));

    rig.loader.unpin_load_unit("terrain");
    assert_eq!(rig.loader.pin_count("terrain"), 0);
    assert!(rig.loader.unit("terrain").is_some(), "the read is not aborted");

    rig.gate.open();
    pinning.join().unwrap();

    assert_eq!(done.load(Ordering::SeqCst), 1);
    assert_eq!(rig.counting.call_count(), 2);
    assert!(rig.loader.unit("terrain").is_none());

    let asset = Arc::new(Asset::new("terrain/heightmap"));
    assert!(!rig.loader.try_load(&asset));
}

#[test]
fn test_duplicate_unpin_is_a_noop() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_terrain(temp_dir.path());
    let rig = gated_rig(temp_dir.path(), LoaderConfig::default());
    rig.gate.open();
    let done = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    counting_pin(&rig.loader, "terrain", &done, &failed);
    counting_pin(&rig.loader, "terrain", &done, &failed);
    assert_eq!(done.load(Ordering::SeqCst), 2);
    assert_eq!(rig.counting.call_count(), 2);

    rig.loader.unpin_load_unit("terrain");
    rig.loader.unpin_load_unit("terrain");
    rig.loader.unpin_load_unit("terrain");
    rig.loader.unpin_load_unit("never-pinned");
    assert_eq!(rig.loader.pin_count("terrain"), 0);
    assert!(rig.loader.resident_units().is_empty());

    // Pinning again reloads from disk.
    counting_pin(&rig.loader, "terrain", &done, &failed);
    assert_eq!(rig.counting.call_count(), 4);
}

#[test]
fn test_deferred_eviction_keeps_unit_resident() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_terrain(temp_dir.path());
    let rig = gated_rig(
        temp_dir.path(),
        LoaderConfig::default().with_eviction(EvictionPolicy::Deferred),
    );
    rig.gate.open();
    let done = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    counting_pin(&rig.loader, "terrain", &done, &failed);
    rig.loader.unpin_load_unit("terrain");
    assert_eq!(rig.loader.unit_state("terrain"), Some(LoadUnitState::Ready));

    // Re-pinning a resident unit costs no I/O.
    counting_pin(&rig.loader, "terrain", &done, &failed);
    assert_eq!(done.load(Ordering::SeqCst), 2);
    assert_eq!(rig.counting.call_count(), 2);

    rig.loader.unpin_load_unit("terrain");
    assert_eq!(rig.loader.collect_unpinned(), 1);
    assert!(rig.loader.unit("terrain").is_none());
}

#[test]
fn test_evicted_payload_outlives_readers() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_terrain(temp_dir.path());
    let rig = gated_rig(temp_dir.path(), LoaderConfig::default());
    rig.gate.open();
    let done = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    counting_pin(&rig.loader, "terrain", &done, &failed);
    let unit = rig.loader.unit("terrain").unwrap();
    rig.loader.unpin_load_unit("terrain");
    assert!(rig.loader.unit("terrain").is_none());

    assert_eq!(unit.read_asset("terrain/splat").unwrap(), SPLAT);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_failed_unit_is_retried_on_next_pin() {
    let temp_dir = tempfile::tempdir().unwrap();
    let rig = gated_rig(temp_dir.path(), LoaderConfig::default());
    rig.gate.open();
    let done = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    counting_pin(&rig.loader, "terrain", &done, &failed);
    assert_eq!(failed.load(Ordering::SeqCst), 1);
    assert!(rig.loader.unit("terrain").is_none());

    write_terrain(temp_dir.path());
    counting_pin(&rig.loader, "terrain", &done, &failed);
    assert_eq!(done.load(Ordering::SeqCst), 1);
    assert_eq!(rig.loader.unit_state("terrain"), Some(LoadUnitState::Ready));
}

#[test]
fn test_corrupt_metadata_fails_every_waiter() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_terrain(temp_dir.path());
    let config = LoaderConfig::default();
    let metadata = temp_dir.path().join(config.metadata_file("terrain"));
    let mut bytes = std::fs::read(&metadata).unwrap();
    bytes[0] ^= 0x01;
    std::fs::write(&metadata, bytes).unwrap();

    let rig = gated_rig(temp_dir.path(), config);
    let causes = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let pin = |loader: Arc<LoadUnitLoader>, causes: Arc<parking_lot::Mutex<Vec<String>>>| {
        thread::spawn(move || {
            loader.pin_load_unit(
                "terrain",
                Box::new(|| panic!("corrupt unit reported as loaded")),
                Box::new(move |cause| causes.lock().push(cause.to_string())),
            );
        })
    };

    let first = pin(Arc::clone(&rig.loader), Arc::clone(&causes));
    assert!(rig.gate.wait_for_parked(1, Duration::from_secs(5)));
    pin(Arc::clone(&rig.loader), Arc::clone(&causes)).join().unwrap();
    rig.gate.open();
    first.join().unwrap();

    let causes = causes.lock();
    assert_eq!(causes.len(), 2);
    assert!(causes.iter().all(|c| c.contains("bad magic")), "{causes:?}");
    assert_eq!(rig.counting.count_reads_ending_with(".lup"), 0);
}

#[test]
fn test_out_of_range_record() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_terrain(temp_dir.path());
    let config = LoaderConfig::default();
    write_file(temp_dir.path(), &config.payload_file("terrain"), b"short");

    let server = AssetServer::new();
    server.register_loader(LoadUnitLoader::new(
        vec![PathPrefix::filesystem(path_string(temp_dir.path()))],
        config,
    ));
    let err = server.pin_load_unit_blocking("terrain").unwrap_err();
    assert!(matches!(*err, AssetError::OutOfRange { .. }), "{err}");
}
