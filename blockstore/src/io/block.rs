use crate::error::Result;

/// The block number to access ranging from 0 (the first block) to n - 1 (the last
/// block) where n is number of blocks available.
pub type BlockNumber = usize;

/// Whole-block access to a device, independent of how its blocks are allocated.
///
/// File system layers should be written against this trait rather than a concrete
/// store so they can be pointed at any block device.
pub trait BlockStorage {
    /// Size in bytes of every transfer.
    fn block_size(&self) -> usize;
    /// Number of addressable blocks.
    fn block_count(&self) -> usize;
    /// Reads block number into the first `block_size()` bytes of `buf`.
    ///
    /// # Errors
    ///
    /// Reading a block out of range, or into a buffer shorter than one block,
    /// returns an error and leaves `buf` untouched.
    fn read_block(&self, blocknr: BlockNumber, buf: &mut [u8]) -> Result<usize>;
    /// Writes the first `block_size()` bytes of `buf` into the block number.
    ///
    /// # Errors
    ///
    /// Writing a block out of range, or from a buffer shorter than one block,
    /// returns an error and leaves the device untouched.
    fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> Result<usize>;
}
