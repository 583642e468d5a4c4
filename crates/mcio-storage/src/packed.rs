//! Fixed-width unsigned integers packed into a contiguous `u64` bitstream.
//!
//! Cell `i` occupies bits `i * width .. (i + 1) * width` of the stream, where
//! bit 0 is the low bit of word 0. Cells are not aligned to word boundaries:
//! a cell may start near the top of one word and continue in the next. This is
//! the long-array layout chunk sections use before data version 2529; the
//! word-aligned layout used afterwards is converted at the edges through
//! [`PackedIntArray::from_aligned_words`] and [`PackedIntArray::to_aligned_words`].
//!
//! Widths 4 and 5 cover almost every real section, so they take dedicated
//! paths. Both produce exactly the bits the generic path would.

use crate::error::PackedError;

/// Widest supported cell.
pub const MAX_WIDTH: u8 = 32;

#[inline]
fn mask(width: u8) -> u64 {
    (1u64 << width) - 1
}

fn check_width(width: u8) -> Result<u8, PackedError> {
    if (1..=MAX_WIDTH).contains(&width) {
        Ok(width)
    } else {
        Err(PackedError::InvalidWidth(width))
    }
}

/// Number of words needed to hold `len` straddled cells of `width` bits.
pub fn straddled_word_count(len: usize, width: u8) -> usize {
    (len * usize::from(width)).div_ceil(64)
}

/// Number of words needed to hold `len` word-aligned cells of `width` bits.
pub fn aligned_word_count(len: usize, width: u8) -> usize {
    len.div_ceil(64 / usize::from(width))
}

// ---------------------------------------------------------------------------
// PackedIntArray
// ---------------------------------------------------------------------------

/// A fixed-length array of `width`-bit unsigned integers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackedIntArray {
    words: Vec<u64>,
    width: u8,
    len: usize,
}

impl PackedIntArray {
    /// Creates a zero-filled array of `len` cells.
    pub fn new(width: u8, len: usize) -> Result<Self, PackedError> {
        let width = check_width(width)?;
        Ok(Self {
            words: vec![0; straddled_word_count(len, width)],
            width,
            len,
        })
    }

    /// Zero-filled array for a width already known to be valid.
    pub(crate) fn zeroed(width: u8, len: usize) -> Self {
        debug_assert!((1..=MAX_WIDTH).contains(&width));
        Self {
            words: vec![0; straddled_word_count(len, width)],
            width,
            len,
        }
    }

    /// Wraps an existing straddled payload.
    ///
    /// When `width` is `None` it is inferred as `words.len() / 64`, which is
    /// how a 4096-cell section payload encodes its width. The cell count is
    /// `words.len() * 64 / width`; payloads whose bit count is not a whole
    /// number of cells are rejected.
    pub fn from_packed_words(words: Vec<u64>, width: Option<u8>) -> Result<Self, PackedError> {
        let width = match width {
            Some(width) => width,
            None => u8::try_from(words.len() >> 6).unwrap_or(u8::MAX),
        };
        let width = check_width(width)?;
        let bits = words.len() * 64;
        if bits % usize::from(width) != 0 {
            return Err(PackedError::MisalignedPayload {
                words: words.len(),
                width,
            });
        }
        Ok(Self {
            len: bits / usize::from(width),
            words,
            width,
        })
    }

    /// Wraps a straddled payload holding exactly `len` cells.
    pub fn from_raw(words: Vec<u64>, width: u8, len: usize) -> Result<Self, PackedError> {
        let width = check_width(width)?;
        let expected = straddled_word_count(len, width);
        if words.len() != expected {
            return Err(PackedError::LengthMismatch {
                expected,
                actual: words.len(),
            });
        }
        Ok(Self { words, width, len })
    }

    /// Decodes a word-aligned payload: each word holds `64 / width` cells
    /// starting at bit 0 and the leftover high bits are padding.
    pub fn from_aligned_words(words: &[u64], width: u8, len: usize) -> Result<Self, PackedError> {
        let width = check_width(width)?;
        let expected = aligned_word_count(len, width);
        if words.len() != expected {
            return Err(PackedError::LengthMismatch {
                expected,
                actual: words.len(),
            });
        }
        let per_word = 64 / usize::from(width);
        let mask = mask(width);
        let mut out = Self::new(width, len)?;
        for index in 0..len {
            let shift = (index % per_word) * usize::from(width);
            out.set(index, ((words[index / per_word] >> shift) & mask) as u32);
        }
        Ok(out)
    }

    /// Encodes the cells word-aligned at `width` bits each. `width` may
    /// differ from the array's own; values are masked to it.
    pub fn to_aligned_words(&self, width: u8) -> Result<Vec<u64>, PackedError> {
        let width = check_width(width)?;
        let per_word = 64 / usize::from(width);
        let mask = mask(width);
        let mut words = vec![0u64; aligned_word_count(self.len, width)];
        for index in 0..self.len {
            let shift = (index % per_word) * usize::from(width);
            words[index / per_word] |= (u64::from(self.get(index)) & mask) << shift;
        }
        Ok(words)
    }

    /// Copies every cell into a new array of `width` bits.
    ///
    /// Only widening (or keeping the width) is supported; narrowing could
    /// silently truncate stored values.
    pub fn clone_with_width(&self, width: u8) -> Result<Self, PackedError> {
        let width = check_width(width)?;
        if width < self.width {
            return Err(PackedError::NarrowingNotSupported {
                from: self.width,
                to: width,
            });
        }
        if width == self.width {
            return Ok(self.clone());
        }
        let mut out = Self::new(width, self.len)?;
        for index in 0..self.len {
            let value = self.get(index);
            if value != 0 {
                out.set(index, value);
            }
        }
        Ok(out)
    }

    /// Returns the value of cell `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    #[inline]
    pub fn get(&self, index: usize) -> u32 {
        assert!(
            index < self.len,
            "cell {index} out of range for {} cells",
            self.len
        );
        match self.width {
            4 => self.get_nibble(index),
            5 => self.get_five(index),
            _ => self.get_generic(index),
        }
    }

    /// Stores `value & mask(width)` into cell `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    #[inline]
    pub fn set(&mut self, index: usize, value: u32) {
        assert!(
            index < self.len,
            "cell {index} out of range for {} cells",
            self.len
        );
        match self.width {
            4 => self.set_nibble(index, value),
            _ => self.set_generic(index, value),
        }
    }

    /// Bits per cell.
    pub fn width(&self) -> u8 {
        self.width
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the array holds no cells.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The straddled payload.
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Iterates over every cell value in index order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.len).map(|index| self.get(index))
    }

    // -- width-specific paths -------------------------------------------------

    #[inline]
    fn get_nibble(&self, index: usize) -> u32 {
        let shift = (index & 15) << 2;
        ((self.words[index >> 4] >> shift) & 0xF) as u32
    }

    #[inline]
    fn set_nibble(&mut self, index: usize, value: u32) {
        let shift = (index & 15) << 2;
        let word = &mut self.words[index >> 4];
        *word = (*word & !(0xF << shift)) | ((u64::from(value) & 0xF) << shift);
    }

    #[inline]
    fn get_five(&self, index: usize) -> u32 {
        let bit = index * 5;
        let word = bit >> 6;
        let offset = bit & 63;
        if offset <= 59 {
            ((self.words[word] >> offset) & 0x1F) as u32
        } else {
            let low = self.words[word] >> offset;
            let high = self.words[word + 1] << (64 - offset);
            ((low | high) & 0x1F) as u32
        }
    }

    #[inline]
    fn get_generic(&self, index: usize) -> u32 {
        let width = usize::from(self.width);
        let bit = index * width;
        let word = bit >> 6;
        let offset = bit & 63;
        let mut value = self.words[word] >> offset;
        if offset + width > 64 {
            value |= self.words[word + 1] << (64 - offset);
        }
        (value & mask(self.width)) as u32
    }

    #[inline]
    fn set_generic(&mut self, index: usize, value: u32) {
        let width = usize::from(self.width);
        let mask = mask(self.width);
        let value = u64::from(value) & mask;
        let bit = index * width;
        let word = bit >> 6;
        let offset = bit & 63;
        self.words[word] = (self.words[word] & !(mask << offset)) | (value << offset);
        if offset + width > 64 {
            let spilled = 64 - offset;
            let high_mask = mask >> spilled;
            self.words[word + 1] = (self.words[word + 1] & !high_mask) | (value >> spilled);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
