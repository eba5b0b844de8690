use std::fmt;
use std::marker::PhantomData;
use std::ops::Range;

use log::{debug, trace};

use crate::alloc::Bitmap;
use crate::error::{Result, StoreError};
use crate::geometry::{self, DefaultGeometry, Geometry};
use crate::io::{BlockNumber, BlockStorage};

/// An in-memory block device of `G::BLOCK_COUNT` blocks of `G::BLOCK_SIZE` bytes.
///
/// Block occupancy is tracked by a bitmap that lives inside the device itself, in
/// the blocks `G::BITMAP_START_BLOCK..G::BITMAP_START_BLOCK + G::BITMAP_BLOCK_COUNT`.
/// Those blocks are reserved while the store is created, so they are never handed
/// out by [`BlockStore::allocate`].
///
/// # Layout
/// ====================================================================
/// | Data ... | Bitmap (BITMAP_BLOCK_COUNT blocks) | Data ...         |
/// ====================================================================
///
/// Occupancy and data access are independent: any block in range can be read or
/// written whether or not it is allocated.
pub struct BlockStore<G: Geometry = DefaultGeometry> {
    /// Every block back to back, `G::DEVICE_BYTES` long.
    blocks: Vec<u8>,
    geometry: PhantomData<G>,
}

impl<G: Geometry> BlockStore<G> {
    /// Builds a zeroed device and reserves the blocks backing its bitmap.
    pub fn create() -> Result<Self> {
        geometry::validate::<G>()?;

        let mut store = Self::zeroed();
        // Reserve through the same path callers use so there is exactly one way
        // a bit gets set.
        for id in Self::bitmap_blocks() {
            store.request(id)?;
        }

        debug!(
            "created device of {} blocks x {} bytes, bitmap in blocks {:?}",
            G::BLOCK_COUNT,
            G::BLOCK_SIZE,
            Self::bitmap_blocks()
        );
        Ok(store)
    }

    /// Releases a device. Passing `None` does nothing.
    pub fn destroy(store: Option<Self>) {
        if let Some(store) = store {
            debug!("destroying device with {} blocks in use", store.used_count());
            drop(store);
        }
    }

    /// Claims the lowest numbered free block, or `None` once the device is full.
    pub fn allocate(&mut self) -> Option<BlockNumber> {
        let mut map = self.bitmap_mut();
        let id = map.find_first_zero()?;
        map.set(id).ok()?;
        trace!("allocated block {}", id);
        Some(id)
    }

    /// Claims a specific block.
    ///
    /// # Errors
    ///
    /// Fails without touching the bitmap when `id` is out of range or already
    /// allocated.
    pub fn request(&mut self, id: BlockNumber) -> Result<()> {
        let mut map = self.bitmap_mut();
        if map.test(id)? {
            return Err(StoreError::AlreadyAllocated(id));
        }
        map.set(id)?;
        trace!("reserved block {}", id);
        Ok(())
    }

    /// Marks a block as free. Out of range and already free blocks are ignored.
    pub fn release(&mut self, id: BlockNumber) {
        if self.bitmap_mut().reset(id).is_ok() {
            trace!("released block {}", id);
        }
    }

    /// Whether a block is currently allocated.
    pub fn is_allocated(&self, id: BlockNumber) -> Result<bool> {
        self.bitmap().test(id)
    }

    /// Copies one whole block into the front of `dst`, returning the bytes copied.
    pub fn read(&self, id: BlockNumber, dst: &mut [u8]) -> Result<usize> {
        Self::check_buffer(dst.len())?;
        let src = self.block(id)?;
        dst[..G::BLOCK_SIZE].copy_from_slice(src);
        Ok(G::BLOCK_SIZE)
    }

    /// Copies one whole block from the front of `src`, returning the bytes copied.
    pub fn write(&mut self, id: BlockNumber, src: &[u8]) -> Result<usize> {
        Self::check_buffer(src.len())?;
        let dst = self.block_mut(id)?;
        dst.copy_from_slice(&src[..G::BLOCK_SIZE]);
        Ok(G::BLOCK_SIZE)
    }

    pub fn used_count(&self) -> usize {
        self.bitmap().count_set()
    }

    pub fn free_count(&self) -> usize {
        G::BLOCK_COUNT - self.used_count()
    }

    pub fn total_count() -> usize {
        G::BLOCK_COUNT
    }

    /// Blocks that hold the allocation bitmap.
    pub fn bitmap_blocks() -> Range<BlockNumber> {
        G::BITMAP_START_BLOCK..G::BITMAP_START_BLOCK + G::BITMAP_BLOCK_COUNT
    }

    /// A read-only view of the allocation bitmap.
    pub fn bitmap(&self) -> Bitmap<&[u8]> {
        Bitmap::overlay_unchecked(G::BLOCK_COUNT, &self.blocks[Self::bitmap_bytes()])
    }

    fn bitmap_mut(&mut self) -> Bitmap<&mut [u8]> {
        Bitmap::overlay_unchecked(G::BLOCK_COUNT, &mut self.blocks[Self::bitmap_bytes()])
    }

    /// Byte range of the bitmap inside the block array.
    fn bitmap_bytes() -> Range<usize> {
        let start = G::BITMAP_START_BLOCK * G::BLOCK_SIZE;
        start..start + G::BITMAP_BYTES
    }

    fn block(&self, id: BlockNumber) -> Result<&[u8]> {
        let range = Self::block_bytes(id)?;
        Ok(&self.blocks[range])
    }

    fn block_mut(&mut self, id: BlockNumber) -> Result<&mut [u8]> {
        let range = Self::block_bytes(id)?;
        Ok(&mut self.blocks[range])
    }

    fn block_bytes(id: BlockNumber) -> Result<Range<usize>> {
        if id >= G::BLOCK_COUNT {
            return Err(StoreError::OutOfRange {
                id,
                count: G::BLOCK_COUNT,
            });
        }
        let start = id * G::BLOCK_SIZE;
        Ok(start..start + G::BLOCK_SIZE)
    }

    fn check_buffer(len: usize) -> Result<()> {
        if len < G::BLOCK_SIZE {
            return Err(StoreError::BufferTooSmall {
                len,
                need: G::BLOCK_SIZE,
            });
        }
        Ok(())
    }

    /// A device with every byte zeroed and nothing reserved.
    pub(crate) fn zeroed() -> Self {
        Self {
            blocks: vec![0; G::DEVICE_BYTES],
            geometry: PhantomData,
        }
    }

    /// The whole block array, block 0 first.
    pub(crate) fn raw(&self) -> &[u8] {
        &self.blocks
    }

    pub(crate) fn raw_mut(&mut self) -> &mut [u8] {
        &mut self.blocks
    }
}

impl<G: Geometry> BlockStorage for BlockStore<G> {
    fn block_size(&self) -> usize {
        G::BLOCK_SIZE
    }

    fn block_count(&self) -> usize {
        G::BLOCK_COUNT
    }

    fn read_block(&self, blocknr: BlockNumber, buf: &mut [u8]) -> Result<usize> {
        self.read(blocknr, buf)
    }

    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> Result<usize> {
        self.write(blocknr, buf)
    }
}

impl<G: Geometry> fmt::Debug for BlockStore<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockStore")
            .field("block_size", &G::BLOCK_SIZE)
            .field("block_count", &G::BLOCK_COUNT)
            .field("bitmap_blocks", &Self::bitmap_blocks())
            .field("used", &self.used_count())
            .finish()
    }
}
