//! Streams assets out of a pack file, loose files and a load unit.
//!
//! Run with `RUST_LOG=debug cargo run -p mce-assets --example streaming` to
//! see the loader activity. Add `--features profiling` and attach
//! `puffin_viewer` to inspect archive reads and load-unit loads.

use std::sync::Arc;
use std::thread;

use mce_assets::format::{LoadUnitBuilder, PackFileBuilder};
use mce_assets::io::PackFileReader;
use mce_assets::loader::{LoadUnitLoader, PerFileLoader};
use mce_assets::prelude::*;
use mce_core::profiling::{ProfilingBackend, init_profiling, new_frame};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    mce_core::logging::init();
    init_profiling(ProfilingBackend::PuffinHttp);

    let root = std::env::temp_dir().join(format!("mce-streaming-{}", std::process::id()));
    std::fs::create_dir_all(root.join("loose"))?;

    // Build a pack file with one compressed element.
    let mut pack = PackFileBuilder::new();
    pack.add("textures/grass.png", vec![0x47u8; 256]);
    pack.add_compressed("levels/intro.lvl", b"wall floor floor wall ".repeat(64));
    let pack_path = root.join("data.pack");
    std::fs::write(&pack_path, pack.build()?)?;

    // A loose file that overrides nothing, found after the pack.
    std::fs::write(root.join("loose").join("readme.txt"), b"loose file")?;

    // A load unit.
    let mut unit = LoadUnitBuilder::new();
    unit.add("heightmap", vec![1u8; 1024]);
    unit.add("splat", vec![2u8; 512]);
    let files = unit.build()?;
    let config = LoaderConfig::default();
    std::fs::write(root.join(config.metadata_file("terrain")), files.metadata)?;
    std::fs::write(root.join(config.payload_file("terrain")), files.payload)?;

    let packs = Arc::new(PackFileReader::new());
    let server = Arc::new(AssetServer::new());
    server.register_loader(LoadUnitLoader::new(
        vec![PathPrefix::filesystem(root.to_string_lossy())],
        config,
    ));
    server.register_loader(PerFileLoader::new(vec![
        PathPrefix::pack(&packs, pack_path.to_string_lossy()),
        PathPrefix::filesystem(root.join("loose").to_string_lossy()),
    ]));

    // Load from several threads; each name is read once.
    let names = ["textures/grass.png", "levels/intro.lvl", "readme.txt", "missing.bin"];
    let handles: Vec<_> = names
        .iter()
        .map(|name| {
            let server = Arc::clone(&server);
            let name = name.to_string();
            thread::spawn(move || {
                let asset = server.load(&name);
                asset.wait();
                asset
            })
        })
        .collect();
    for handle in handles {
        let asset = handle.join().map_err(|_| "loader thread panicked")?;
        match asset.error() {
            None => println!("{:<22} {:>6} bytes", asset.name(), asset.size()),
            Some(err) => println!("{:<22} failed: {}", asset.name(), err),
        }
    }

    new_frame();

    server.pin_load_unit_blocking("terrain")?;
    let heightmap = server.load_blocking("terrain/heightmap")?;
    println!("{:<22} {:>6} bytes (load unit)", heightmap.name(), heightmap.size());
    server.unpin_load_unit("terrain");
    new_frame();

    for event in server.drain_events() {
        println!("event: {:?}", event);
    }

    std::fs::remove_dir_all(&root)?;
    Ok(())
}
