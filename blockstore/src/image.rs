//! Flat device images.
//!
//! An image is the bitmap bytes followed by every block in ascending order:
//!
//! ```text
//! | bitmap (BITMAP_BYTES) | block 0 | block 1 | ... | block BLOCK_COUNT - 1 |
//! ```
//!
//! There is no header, version or checksum, so an image is only meaningful to a
//! store built with the same [`Geometry`]. Writes are not atomic: a failed
//! [`BlockStore::serialize`] can leave a truncated file behind.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use log::{debug, warn};

use crate::error::{Result, StoreError};
use crate::geometry::{self, Geometry};
use crate::store::BlockStore;

impl<G: Geometry> BlockStore<G> {
    /// Writes the device image to `path`, creating or truncating it, and returns
    /// the number of bytes written.
    pub fn serialize<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let path = path.as_ref();
        let written = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .map_err(StoreError::from)
            .and_then(|file| self.write_image(BufWriter::new(file)));

        match &written {
            Ok(bytes) => debug!("wrote {} byte image to {}", bytes, path.display()),
            Err(e) => warn!("failed to write image to {}: {}", path.display(), e),
        }
        written
    }

    /// Writes the device image to any writer and flushes it.
    pub fn write_image<W: Write>(&self, mut w: W) -> Result<usize> {
        let bitmap = self.bitmap();
        w.write_all(bitmap.export())?;
        w.write_all(self.raw())?;
        w.flush()?;
        Ok(bitmap.export().len() + self.raw().len())
    }

    /// Rebuilds the device that [`BlockStore::serialize`] wrote to `path`.
    ///
    /// # Errors
    ///
    /// The file must be exactly `G::IMAGE_BYTES` long and its leading bitmap must
    /// agree with the bitmap stored in its block region.
    pub fn deserialize<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let loaded = File::open(path).map_err(StoreError::from).and_then(|file| {
            let actual = file.metadata()?.len();
            check_image_size::<G>(actual)?;
            Self::read_image(BufReader::new(file))
        });

        match &loaded {
            Ok(store) => debug!("loaded image {}: {:?}", path.display(), store),
            Err(e) => warn!("failed to load image {}: {}", path.display(), e),
        }
        loaded
    }

    /// Reads exactly one device image from `r`.
    ///
    /// The bitmap is taken as written: self-reservation is not re-run, so a loaded
    /// store matches the serialized one bit for bit.
    pub fn read_image<R: Read>(mut r: R) -> Result<Self> {
        geometry::validate::<G>()?;

        let mut bitmap = vec![0; G::BITMAP_BYTES];
        let mut store = Self::zeroed();
        read_exact_or_short::<G, _>(&mut r, &mut bitmap, 0)?;
        read_exact_or_short::<G, _>(&mut r, store.raw_mut(), G::BITMAP_BYTES)?;

        // Anything after the last block means the image came from another geometry.
        let mut probe = [0_u8; 1];
        if r.read(&mut probe)? != 0 {
            return Err(StoreError::ImageSize {
                expected: G::IMAGE_BYTES as u64,
                actual: G::IMAGE_BYTES as u64 + 1,
            });
        }

        if store.bitmap().export() != bitmap.as_slice() {
            return Err(StoreError::Corrupt(
                "bitmap does not match the bitmap blocks".to_string(),
            ));
        }
        Ok(store)
    }
}

fn check_image_size<G: Geometry>(actual: u64) -> Result<()> {
    let expected = G::IMAGE_BYTES as u64;
    if actual != expected {
        return Err(StoreError::ImageSize { expected, actual });
    }
    Ok(())
}

/// Fills `buf`, reporting a short image rather than a bare EOF.
fn read_exact_or_short<G: Geometry, R: Read>(
    r: &mut R,
    buf: &mut [u8],
    offset: usize,
) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(StoreError::ImageSize {
                    expected: G::IMAGE_BYTES as u64,
                    actual: (offset + filled) as u64,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
