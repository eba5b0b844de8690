use std::env;

use blockstore::{BlockStore, DefaultGeometry, Geometry};

/// Builds a device, stores a greeting in a fresh block and dumps the device to
/// the path given on the command line (or a temporary file), then loads it back.
pub fn main() -> blockstore::Result<()> {
    let path = match env::args().nth(1) {
        Some(path) => path.into(),
        None => env::temp_dir().join("blockstore-demo.img"),
    };

    let mut dev = BlockStore::<DefaultGeometry>::create()?;
    let id = dev.allocate().expect("fresh device has free blocks");
    let mut block = vec![0; DefaultGeometry::BLOCK_SIZE];
    block[..13].copy_from_slice(b"hello, world!");
    dev.write(id, &block)?;

    let written = dev.serialize(&path)?;
    println!("wrote {} bytes to {}", written, path.display());

    let loaded = BlockStore::<DefaultGeometry>::deserialize(&path)?;
    let mut out = vec![0; DefaultGeometry::BLOCK_SIZE];
    loaded.read(id, &mut out)?;
    println!(
        "block {}: {:?} ({} of {} blocks used)",
        id,
        String::from_utf8_lossy(&out[..13]),
        loaded.used_count(),
        BlockStore::<DefaultGeometry>::total_count()
    );
    Ok(())
}
