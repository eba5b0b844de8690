use crate::error::{Result, StoreError};
use zerocopy::byteorder::{LittleEndian, U64};
use zerocopy::FromBytes;

/// Bit `i` lives in byte `i / 8` at position `i % 8`, so eight consecutive
/// bytes read as a little-endian word keep bit `i` at position `i % 64`.
type Word = U64<LittleEndian>;
const WORD_BYTES: usize = 8;
const WORD_BITS: usize = 64;

/// Number of bytes needed to back `bits` bits.
pub const fn byte_len(bits: usize) -> usize {
    bits.div_ceil(8)
}

/// A fixed-length bit vector tracking which blocks are used (1) and free (0).
///
/// The bits live in `B`, which is either an owned buffer (see [`Bitmap::new`])
/// or a borrowed slice of someone else's storage (see [`Bitmap::overlay`]).
/// An overlay never copies: setting a bit writes straight into the borrowed
/// bytes, so whoever owns those bytes persists the bitmap along with them.
#[derive(Debug, Clone)]
pub struct Bitmap<B> {
    /// Number of addressable bits.
    bits: usize,
    storage: B,
}

impl Bitmap<Vec<u8>> {
    /// Allocates a zeroed bitmap of `bits` bits.
    pub fn new(bits: usize) -> Self {
        Self {
            bits,
            storage: vec![0; byte_len(bits)],
        }
    }
}

impl<B: AsRef<[u8]>> Bitmap<B> {
    /// Builds a bitmap of `bits` bits directly on top of `storage`.
    ///
    /// # Errors
    ///
    /// Storage shorter than `ceil(bits / 8)` bytes is rejected.
    pub fn overlay(bits: usize, storage: B) -> Result<Self> {
        let need = byte_len(bits);
        let len = storage.as_ref().len();
        if len < need {
            return Err(StoreError::BufferTooSmall { len, need });
        }
        Ok(Self { bits, storage })
    }

    /// Builds an overlay over storage already known to be long enough.
    pub(crate) fn overlay_unchecked(bits: usize, storage: B) -> Self {
        debug_assert!(storage.as_ref().len() >= byte_len(bits));
        Self { bits, storage }
    }

    pub fn len(&self) -> usize {
        self.bits
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Returns whether bit `i` is set.
    pub fn test(&self, i: usize) -> Result<bool> {
        self.check(i)?;
        Ok(self.export()[i / 8] & (1 << (i % 8)) != 0)
    }

    /// Index of the lowest zero bit, or `None` when every bit is set.
    pub fn find_first_zero(&self) -> Option<usize> {
        let (words, tail) = self.split_words();
        for (w, word) in words.iter().enumerate() {
            let word = word.get();
            if word != u64::MAX {
                return self.in_range(w * WORD_BITS + word.trailing_ones() as usize);
            }
        }
        let base = words.len() * WORD_BITS;
        for (b, byte) in tail.iter().enumerate() {
            if *byte != u8::MAX {
                return self.in_range(base + b * 8 + byte.trailing_ones() as usize);
            }
        }
        None
    }

    /// Number of set bits. Padding bits past `len()` in the last byte never count.
    pub fn count_set(&self) -> usize {
        let (words, tail) = self.split_words();
        let ones = words
            .iter()
            .map(|w| w.get().count_ones() as usize)
            .chain(tail.iter().map(|b| b.count_ones() as usize))
            .sum::<usize>();
        ones - self.padding_ones()
    }

    /// The raw backing bytes, exactly `ceil(len() / 8)` of them.
    pub fn export(&self) -> &[u8] {
        &self.storage.as_ref()[..byte_len(self.bits)]
    }

    /// Releases the backing storage.
    pub fn into_inner(self) -> B {
        self.storage
    }

    fn check(&self, i: usize) -> Result<()> {
        if i >= self.bits {
            return Err(StoreError::OutOfRange {
                id: i,
                count: self.bits,
            });
        }
        Ok(())
    }

    fn in_range(&self, i: usize) -> Option<usize> {
        if i < self.bits {
            Some(i)
        } else {
            None
        }
    }

    /// Splits the exported bytes into whole words and a byte tail.
    fn split_words(&self) -> (&[Word], &[u8]) {
        let bytes = self.export();
        let none: &[Word] = &[];
        Word::slice_from_prefix(bytes, bytes.len() / WORD_BYTES).unwrap_or((none, bytes))
    }

    fn padding_ones(&self) -> usize {
        let used = self.bits % 8;
        if used == 0 {
            return 0;
        }
        match self.export().last() {
            Some(last) => (last & !((1u8 << used) - 1)).count_ones() as usize,
            None => 0,
        }
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Bitmap<B> {
    /// Marks bit `i` as used.
    pub fn set(&mut self, i: usize) -> Result<()> {
        self.check(i)?;
        self.storage.as_mut()[i / 8] |= 1 << (i % 8);
        Ok(())
    }

    /// Marks bit `i` as free.
    pub fn reset(&mut self, i: usize) -> Result<()> {
        self.check(i)?;
        self.storage.as_mut()[i / 8] &= !(1 << (i % 8));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_read_and_write_values_to_bitmap() {
        let mut bmp = Bitmap::new(4096);

        bmp.set(2).unwrap();

        assert!(!bmp.test(0).unwrap());
        assert!(bmp.test(2).unwrap());
        assert_eq!(bmp.count_set(), 1);
    }

    #[test]
    fn can_set_values_at_ends_of_bitmap() {
        let mut bmp = Bitmap::new(4096);

        bmp.set(0).unwrap();
        bmp.set(4095).unwrap();

        assert!(bmp.test(0).unwrap());
        assert!(bmp.test(4095).unwrap());
        assert_eq!(bmp.export()[0], 0b0000_0001);
        assert_eq!(bmp.export()[511], 0b1000_0000);
    }

    #[test]
    fn can_toggle_block_between_free_and_used() {
        let mut bmp = Bitmap::new(64);

        bmp.set(10).unwrap();
        bmp.set(11).unwrap();
        assert!(bmp.test(10).unwrap());

        bmp.reset(10).unwrap();
        assert!(!bmp.test(10).unwrap());
        // Clearing one bit leaves its neighbours alone.
        assert!(bmp.test(11).unwrap());

        // Resetting a free bit is harmless.
        bmp.reset(10).unwrap();
        assert_eq!(bmp.count_set(), 1);
    }

    #[test]
    fn out_of_range_bits_are_rejected() {
        let mut bmp = Bitmap::new(10);

        assert!(matches!(
            bmp.set(10),
            Err(StoreError::OutOfRange { id: 10, count: 10 })
        ));
        assert!(bmp.reset(usize::MAX).is_err());
        assert!(bmp.test(16).is_err());
        assert_eq!(bmp.count_set(), 0);
        assert_eq!(bmp.export(), &[0, 0]);
    }

    #[test]
    fn first_zero_scans_in_ascending_order() {
        let mut bmp = Bitmap::new(200);
        assert_eq!(bmp.find_first_zero(), Some(0));

        // Fill past a whole word so the scan has to cross word boundaries.
        for i in 0..130 {
            bmp.set(i).unwrap();
        }
        assert_eq!(bmp.find_first_zero(), Some(130));

        bmp.reset(65).unwrap();
        assert_eq!(bmp.find_first_zero(), Some(65));
    }

    #[test]
    fn first_zero_reports_none_when_full() {
        // 13 bits: one whole byte plus a 5 bit tail with 3 padding bits.
        let mut bmp = Bitmap::new(13);
        for i in 0..13 {
            bmp.set(i).unwrap();
        }
        assert_eq!(bmp.find_first_zero(), None);
        assert_eq!(bmp.count_set(), 13);

        bmp.reset(12).unwrap();
        assert_eq!(bmp.find_first_zero(), Some(12));
    }

    #[test]
    fn padding_bits_are_never_counted_or_returned() {
        // Bits 0..3 set, padding bits 3..8 set behind the bitmap's back.
        let storage = vec![0xFF_u8];
        let bmp = Bitmap::overlay(3, storage).unwrap();

        assert_eq!(bmp.count_set(), 3);
        assert_eq!(bmp.find_first_zero(), None);
    }

    #[test]
    fn overlay_writes_through_to_borrowed_storage() {
        let mut storage = [0_u8; 32];
        {
            let mut bmp = Bitmap::overlay(100, &mut storage[4..20]).unwrap();
            bmp.set(0).unwrap();
            bmp.set(9).unwrap();
            assert_eq!(bmp.export().len(), 13);
        }
        assert_eq!(storage[4], 0b0000_0001);
        assert_eq!(storage[5], 0b0000_0010);
        assert!(storage[..4].iter().all(|b| *b == 0));
        assert!(storage[6..].iter().all(|b| *b == 0));

        let bmp = Bitmap::overlay(100, &storage[4..20]).unwrap();
        assert_eq!(bmp.count_set(), 2);
        assert_eq!(bmp.find_first_zero(), Some(1));
    }

    #[test]
    fn overlay_rejects_short_storage() {
        let storage = [0_u8; 12];
        match Bitmap::overlay(100, &storage[..]) {
            Err(StoreError::BufferTooSmall { len: 12, need: 13 }) => (),
            other => panic!("expected short buffer error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn export_matches_owned_storage() {
        let mut bmp = Bitmap::new(24);
        bmp.set(8).unwrap();
        bmp.set(23).unwrap();

        assert_eq!(bmp.export(), &[0x00, 0x01, 0x80]);
        assert_eq!(bmp.into_inner(), vec![0x00, 0x01, 0x80]);
    }
}
