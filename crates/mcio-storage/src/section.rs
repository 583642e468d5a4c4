//! A 16×16×16 section: palette plus packed per-cell palette indices.
//!
//! Committed sections live inside a [`Chunk`](crate::Chunk); a transaction
//! works on private clones of them and writes them back on commit.

use rustc_hash::FxHashSet;

use crate::block::BlockState;
use crate::error::{SectionError, StorageError};
use crate::packed::PackedIntArray;
use crate::palette::{MIN_STORAGE_WIDTH, Palette, required_bits};

/// Side length of a section in blocks.
pub const SECTION_SIZE: usize = 16;

/// Cells per section (16³).
pub const SECTION_VOLUME: usize = SECTION_SIZE * SECTION_SIZE * SECTION_SIZE;

/// Vertical sections in a chunk column.
pub const SECTIONS_PER_CHUNK: usize = 16;

/// Height of a chunk column in blocks.
pub const CHUNK_HEIGHT: usize = SECTION_SIZE * SECTIONS_PER_CHUNK;

/// Cell index of local coordinates: `y` is taken modulo 16, `x` and `z` must
/// be below 16. Iterating cells in index order walks y, then z, then x.
#[inline]
pub fn cell_index(x: u8, y: u8, z: u8) -> usize {
    (usize::from(y & 15) << 8) | (usize::from(z) << 4) | usize::from(x)
}

/// Local `(x, y, z)` of a cell index.
#[inline]
pub fn cell_coords(cell: usize) -> (u8, u8, u8) {
    ((cell & 15) as u8, (cell >> 8) as u8, ((cell >> 4) & 15) as u8)
}

// ---------------------------------------------------------------------------
// Section
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section {
    palette: Palette,
    indices: PackedIntArray,
}

impl Section {
    /// A section where every cell holds `block`.
    pub fn filled(block: &BlockState) -> Self {
        Self {
            palette: Palette::filled(block, SECTION_VOLUME as u32),
            indices: Self::blank_indices(),
        }
    }

    /// A section with no palette entries. Every cell points at index 0, so the
    /// first block added becomes the value of all 4096 cells.
    pub(crate) fn unpopulated() -> Self {
        Self {
            palette: Palette::new(),
            indices: Self::blank_indices(),
        }
    }

    fn blank_indices() -> PackedIntArray {
        PackedIntArray::zeroed(MIN_STORAGE_WIDTH, SECTION_VOLUME)
    }

    /// Assembles a section from decoded parts, tallying palette usage.
    pub fn from_parts(
        entries: Vec<BlockState>,
        indices: PackedIntArray,
    ) -> Result<Self, SectionError> {
        if indices.len() != SECTION_VOLUME {
            return Err(SectionError::WrongCellCount(indices.len()));
        }
        let mut seen = FxHashSet::default();
        for entry in &entries {
            if !seen.insert(entry) {
                return Err(SectionError::DuplicateEntry(entry.to_string()));
            }
        }
        let mut palette = Palette::from_entries(entries);
        for (cell, index) in indices.iter().enumerate() {
            if index as usize >= palette.len() {
                return Err(SectionError::IndexOutOfRange {
                    cell,
                    index,
                    len: palette.len(),
                });
            }
            palette.retain(index);
        }
        Ok(Self { palette, indices })
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn indices(&self) -> &PackedIntArray {
        &self.indices
    }

    /// Bits per stored index.
    pub fn width(&self) -> u8 {
        self.indices.width()
    }

    pub fn index_at(&self, cell: usize) -> u32 {
        self.indices.get(cell)
    }

    /// Block stored at `cell`, or `None` while the palette is unpopulated.
    pub fn block_at(&self, cell: usize) -> Option<&BlockState> {
        self.palette.get(self.indices.get(cell))
    }

    // -- working-copy mutation ------------------------------------------------

    /// Palette index of `block`, appending it if absent. The index array is
    /// widened when the palette outgrows it.
    pub(crate) fn find_or_create(&mut self, block: &BlockState) -> Result<u32, StorageError> {
        let initial = if self.palette.is_empty() {
            SECTION_VOLUME as u32
        } else {
            0
        };
        let (index, inserted) = self.palette.find_or_insert(block, initial);
        if inserted && self.palette.len() as u64 > 1u64 << self.indices.width() {
            let width = required_bits(self.palette.len());
            self.indices = self.indices.clone_with_width(width)?;
        }
        Ok(index)
    }

    /// Points `cell` at palette entry `index`, moving one use between counts.
    pub(crate) fn write(&mut self, cell: usize, index: u32) {
        let previous = self.indices.get(cell);
        if previous == index {
            return;
        }
        self.palette.release(previous);
        self.palette.retain(index);
        self.indices.set(cell, index);
    }

    /// Drops unused palette entries and rewrites every cell against the
    /// shorter palette. Returns `Ok(false)` if nothing was removed.
    pub(crate) fn compact(&mut self) -> Result<bool, StorageError> {
        let Some(map) = self.palette.compaction_map() else {
            return Ok(false);
        };
        let mut remapped = Vec::with_capacity(SECTION_VOLUME);
        for (cell, old) in self.indices.iter().enumerate() {
            match map.get(old as usize).copied().flatten() {
                Some(new) => remapped.push(new),
                None => {
                    return Err(StorageError::Corrupt(format!(
                        "cell {cell} points at palette index {old} which has no recorded uses"
                    )));
                }
            }
        }
        let before = self.palette.len();
        self.palette.drop_unused();
        for (cell, new) in remapped.into_iter().enumerate() {
            self.indices.set(cell, new);
        }
        tracing::trace!(
            before,
            after = self.palette.len(),
            "compacted section palette"
        );
        Ok(true)
    }

    /// Produces the committed form of this working copy.
    ///
    /// When `existing` already has the right width (or is wider and
    /// `compact_width` is off) its index array is overwritten in place;
    /// otherwise a fresh array at the palette's storage width is built.
    pub(crate) fn commit_into(
        &self,
        existing: Option<Section>,
        compact_width: bool,
    ) -> Result<Section, StorageError> {
        let width = self.palette.storage_width();
        match existing {
            Some(mut target)
                if width == target.width() || (!compact_width && width < target.width()) =>
            {
                for (cell, value) in self.indices.iter().enumerate() {
                    if target.indices.get(cell) != value {
                        target.indices.set(cell, value);
                    }
                }
                target.palette = self.palette.clone();
                Ok(target)
            }
            _ => {
                let mut indices = PackedIntArray::new(width, SECTION_VOLUME)?;
                for (cell, value) in self.indices.iter().enumerate() {
                    if value != 0 {
                        indices.set(cell, value);
                    }
                }
                Ok(Section {
                    palette: self.palette.clone(),
                    indices,
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
