//! Free-space bitmap of the backing store.
//! One bit per device block, set when the block is in use. The bitmap is kept in
//! memory while the store is open and persisted to the reserved blocks on close.

use alloc::vec;
use alloc::vec::Vec;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    words: Vec<u64>,
    len: usize,
}

impl Bitmap {
    pub fn new(len: usize) -> Self {
        Bitmap {
            words: vec![0; len.div_ceil(64)],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn test(&self, bit: usize) -> bool {
        bit < self.len && self.words[bit / 64] & (1 << (bit % 64)) != 0
    }

    /// Sets `bit`, returning its previous value.
    pub fn set(&mut self, bit: usize) -> bool {
        let prev = self.test(bit);
        if bit < self.len {
            self.words[bit / 64] |= 1 << (bit % 64);
        }
        prev
    }

    /// Clears `bit`, returning its previous value.
    pub fn clear(&mut self, bit: usize) -> bool {
        let prev = self.test(bit);
        if bit < self.len {
            self.words[bit / 64] &= !(1 << (bit % 64));
        }
        prev
    }

    /// Index of the first clear bit, if any.
    pub fn first_clear(&self) -> Option<usize> {
        self.words
            .iter()
            .enumerate()
            .find_map(|(group, &bits)| {
                (bits != u64::MAX).then(|| group * 64 + bits.trailing_ones() as usize)
            })
            .filter(|&bit| bit < self.len)
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Serializes the bitmap, bit `i` stored at byte `i / 8`, bit `i % 8`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.len.div_ceil(8)];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = (self.words[i / 8] >> ((i % 8) * 8)) as u8;
        }
        bytes
    }

    pub fn from_bytes(len: usize, bytes: &[u8]) -> Self {
        let mut map = Bitmap::new(len);
        for (i, &byte) in bytes.iter().take(len.div_ceil(8)).enumerate() {
            map.words[i / 8] |= (byte as u64) << ((i % 8) * 8);
        }
        // Bits past `len` in the last word are not ours.
        if len % 64 != 0 {
            if let Some(last) = map.words.last_mut() {
                *last &= (1u64 << (len % 64)) - 1;
            }
        }
        map
    }
}
