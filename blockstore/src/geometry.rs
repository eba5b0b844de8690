use crate::error::{Result, StoreError};

/// Describes the fixed shape of a block device. Every value is an associated
/// constant, so a device's geometry is settled at build time and cannot change
/// for the lifetime of a store.
///
/// Implementors only need to provide the block size and count; the bitmap
/// placement defaults to the front of the device and the remaining values are
/// derived.
pub trait Geometry {
    /// Size of every block in bytes.
    const BLOCK_SIZE: usize;
    /// Number of addressable blocks on the device.
    const BLOCK_COUNT: usize;
    /// First block of the region holding the allocation bitmap.
    const BITMAP_START_BLOCK: usize = 0;

    /// Bytes needed to hold one bit per block.
    const BITMAP_BYTES: usize = Self::BLOCK_COUNT.div_ceil(8);
    /// Blocks reserved for the allocation bitmap.
    const BITMAP_BLOCK_COUNT: usize = Self::BITMAP_BYTES.div_ceil(Self::BLOCK_SIZE);
    /// Size of the raw block array.
    const DEVICE_BYTES: usize = Self::BLOCK_COUNT * Self::BLOCK_SIZE;
    /// Size of a serialized device image: bitmap bytes followed by every block.
    const IMAGE_BYTES: usize = Self::BITMAP_BYTES + Self::DEVICE_BYTES;
}

/// 1024 blocks of 512 bytes with the bitmap in block 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultGeometry;

impl Geometry for DefaultGeometry {
    const BLOCK_SIZE: usize = 512;
    const BLOCK_COUNT: usize = 1024;
}

/// Rejects geometries that cannot host their own bitmap. A zero block size
/// never gets this far: deriving `BITMAP_BLOCK_COUNT` fails const evaluation.
pub(crate) fn validate<G: Geometry>() -> Result<()> {
    if G::BLOCK_COUNT == 0 {
        return Err(StoreError::InvalidGeometry(
            "device must contain at least one block".to_string(),
        ));
    }
    let bitmap_end = G::BITMAP_START_BLOCK
        .checked_add(G::BITMAP_BLOCK_COUNT)
        .filter(|end| *end <= G::BLOCK_COUNT);
    if bitmap_end.is_none() {
        return Err(StoreError::InvalidGeometry(format!(
            "bitmap blocks {}..{} do not fit in a device of {} blocks",
            G::BITMAP_START_BLOCK,
            G::BITMAP_START_BLOCK.saturating_add(G::BITMAP_BLOCK_COUNT),
            G::BLOCK_COUNT
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Tiny;
    impl Geometry for Tiny {
        const BLOCK_SIZE: usize = 16;
        const BLOCK_COUNT: usize = 1024;
    }

    struct Misplaced;
    impl Geometry for Misplaced {
        const BLOCK_SIZE: usize = 4;
        const BLOCK_COUNT: usize = 64;
        const BITMAP_START_BLOCK: usize = 62;
    }

    #[test]
    fn derives_bitmap_region_from_block_count() {
        assert_eq!(Tiny::BITMAP_BYTES, 128);
        assert_eq!(Tiny::BITMAP_BLOCK_COUNT, 8);
        assert_eq!(Tiny::IMAGE_BYTES, 128 + 1024 * 16);

        assert_eq!(DefaultGeometry::BITMAP_BYTES, 128);
        assert_eq!(DefaultGeometry::BITMAP_BLOCK_COUNT, 1);
    }

    #[test]
    fn partial_bitmap_block_rounds_up() {
        struct Odd;
        impl Geometry for Odd {
            const BLOCK_SIZE: usize = 3;
            const BLOCK_COUNT: usize = 33;
        }
        // 33 bits need 5 bytes which need 2 blocks of 3 bytes.
        assert_eq!(Odd::BITMAP_BYTES, 5);
        assert_eq!(Odd::BITMAP_BLOCK_COUNT, 2);
        assert!(validate::<Odd>().is_ok());
    }

    #[test]
    fn empty_device_is_rejected() {
        struct Empty;
        impl Geometry for Empty {
            const BLOCK_SIZE: usize = 8;
            const BLOCK_COUNT: usize = 0;
        }
        assert!(matches!(
            validate::<Empty>(),
            Err(StoreError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn bitmap_must_fit_inside_device() {
        // 64 bits need 8 bytes: two 4 byte blocks, 62 and 63.
        assert!(validate::<Misplaced>().is_ok());

        struct Overhang;
        impl Geometry for Overhang {
            const BLOCK_SIZE: usize = 4;
            const BLOCK_COUNT: usize = 64;
            const BITMAP_START_BLOCK: usize = 63;
        }
        match validate::<Overhang>() {
            Err(StoreError::InvalidGeometry(_)) => (),
            other => panic!("expected invalid geometry, got {:?}", other),
        }
    }
}
