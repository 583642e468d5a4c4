//! Explicit conversion between committed sections and the section records of
//! the chunk container format.
//!
//! ## Section record
//!
//! | Key | Type | Meaning |
//! |-----|------|---------|
//! | `Y` | byte | vertical section index `0..16`; `-1` marks a lighting-only record |
//! | `Palette` | list of `{Name, Properties}` | section palette, no duplicates |
//! | `BlockStates` | long array | 4096 packed palette indices |
//!
//! Records with an empty palette and no index data carry only lighting and
//! are skipped, like the `-1` marker.
//!
//! ## Packing
//!
//! Before data version [`ALIGNED_PACKING_DATA_VERSION`] the index payload is
//! straddled and its width is `BlockStates.len() / 64`. From that version on,
//! cells never cross words and the width is `max(4, bits(palette.len()))`.

use serde::{Deserialize, Serialize};

use crate::block::BlockState;
use crate::error::{CodecError, PackedError, SectionError};
use crate::packed::{
    MAX_WIDTH, PackedIntArray, aligned_word_count, straddled_word_count,
};
use crate::palette::storage_width;
use crate::section::{SECTION_VOLUME, SECTIONS_PER_CHUNK, Section};

/// First data version (20w17a) with word-aligned index payloads.
pub const ALIGNED_PACKING_DATA_VERSION: i32 = 2529;

/// Data version written for straddled chunks created from scratch (1.15.2).
pub const STRADDLED_DATA_VERSION: i32 = 2230;

/// Data version written for aligned chunks created from scratch (1.16.5).
pub const ALIGNED_DATA_VERSION: i32 = 2586;

/// Section y value of a lighting-only record.
pub const LIGHTING_ONLY_Y: i8 = -1;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Layout of the `BlockStates` payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackingFormat {
    /// Cells packed back to back, crossing word boundaries.
    #[default]
    Straddled,
    /// `64 / width` cells per word, high bits left as padding.
    Aligned,
}

impl PackingFormat {
    /// Format used by chunks saved at `data_version`.
    pub fn for_data_version(data_version: i32) -> Self {
        if data_version >= ALIGNED_PACKING_DATA_VERSION {
            Self::Aligned
        } else {
            Self::Straddled
        }
    }

    /// Data version stamped on chunks built from scratch in this format.
    pub fn default_data_version(self) -> i32 {
        match self {
            Self::Straddled => STRADDLED_DATA_VERSION,
            Self::Aligned => ALIGNED_DATA_VERSION,
        }
    }
}

/// One vertical section as stored in a chunk record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRecord {
    #[serde(rename = "Y")]
    pub y: i8,
    #[serde(rename = "Palette", default)]
    pub palette: Vec<BlockState>,
    #[serde(rename = "BlockStates", default)]
    pub block_states: Vec<i64>,
}

impl SectionRecord {
    /// `true` for records that carry no block data.
    pub fn is_lighting_only(&self) -> bool {
        self.y == LIGHTING_ONLY_Y || (self.palette.is_empty() && self.block_states.is_empty())
    }
}

/// The block-storage portion of a chunk record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    #[serde(rename = "DataVersion")]
    pub data_version: i32,
    #[serde(rename = "Sections", default)]
    pub sections: Vec<SectionRecord>,
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Section index a record stores, or `None` for lighting-only records.
pub fn section_index(record: &SectionRecord) -> Result<Option<usize>, CodecError> {
    if record.is_lighting_only() {
        return Ok(None);
    }
    let y = record.y;
    let index = usize::try_from(y)
        .ok()
        .filter(|&i| i < SECTIONS_PER_CHUNK)
        .ok_or(CodecError::InvalidY(y))?;
    if record.palette.is_empty() || record.block_states.is_empty() {
        return Err(CodecError::IncompleteSection {
            y,
            palette: record.palette.len(),
            words: record.block_states.len(),
        });
    }
    Ok(Some(index))
}

/// Index width of a record's payload, checked against the word count a full
/// section needs in `format`.
fn payload_width(record: &SectionRecord, format: PackingFormat) -> Result<u8, CodecError> {
    let words = record.block_states.len();
    let width = match format {
        PackingFormat::Straddled => u8::try_from(words >> 6).unwrap_or(u8::MAX),
        PackingFormat::Aligned => storage_width(record.palette.len()),
    };
    if !(1..=MAX_WIDTH).contains(&width) {
        return Err(CodecError::Packed {
            y: record.y,
            source: PackedError::InvalidWidth(width),
        });
    }
    let expected = match format {
        PackingFormat::Straddled => straddled_word_count(SECTION_VOLUME, width),
        PackingFormat::Aligned => aligned_word_count(SECTION_VOLUME, width),
    };
    if words != expected {
        return Err(CodecError::Packed {
            y: record.y,
            source: PackedError::LengthMismatch {
                expected,
                actual: words,
            },
        });
    }
    Ok(width)
}

/// Like [`section_index`], and also rejects payloads whose length does not
/// hold exactly one section in `format`.
pub fn check_section(
    record: &SectionRecord,
    format: PackingFormat,
) -> Result<Option<usize>, CodecError> {
    let Some(index) = section_index(record)? else {
        return Ok(None);
    };
    payload_width(record, format)?;
    Ok(Some(index))
}

/// Decodes a record into its section index and committed section.
///
/// Returns `Ok(None)` for lighting-only records. Rejects duplicate palette
/// entries and indices past the end of the palette.
pub fn decode_section(
    record: &SectionRecord,
    format: PackingFormat,
) -> Result<Option<(usize, Section)>, CodecError> {
    let Some(index) = section_index(record)? else {
        return Ok(None);
    };
    let y = record.y;
    let width = payload_width(record, format)?;
    let words: Vec<u64> = record.block_states.iter().map(|&w| w as u64).collect();
    let indices = match format {
        PackingFormat::Straddled => PackedIntArray::from_raw(words, width, SECTION_VOLUME),
        PackingFormat::Aligned => {
            PackedIntArray::from_aligned_words(&words, width, SECTION_VOLUME)
        }
    }
    .map_err(|source| CodecError::Packed { y, source })?;
    let section = Section::from_parts(record.palette.clone(), indices)
        .map_err(|source| CodecError::Section { y, source })?;
    Ok(Some((index, section)))
}

/// Reads the palette index of one cell straight from a record's payload.
///
/// Used for reads against sections that have not been decoded yet; only the
/// one or two words holding the cell are touched.
pub fn peek_index(
    record: &SectionRecord,
    format: PackingFormat,
    cell: usize,
) -> Result<u32, CodecError> {
    let y = record.y;
    let width = payload_width(record, format)?;
    let width_bits = usize::from(width);
    let mask = (1u64 << width) - 1;
    let truncated = |expected: usize| CodecError::Packed {
        y,
        source: PackedError::LengthMismatch {
            expected,
            actual: record.block_states.len(),
        },
    };
    let word = |i: usize| {
        record
            .block_states
            .get(i)
            .map(|&w| w as u64)
            .ok_or_else(|| truncated(i + 1))
    };
    let index = match format {
        PackingFormat::Straddled => {
            let bit = cell * width_bits;
            let offset = bit & 63;
            let mut value = word(bit >> 6)? >> offset;
            if offset + width_bits > 64 {
                value |= word((bit >> 6) + 1)? << (64 - offset);
            }
            (value & mask) as u32
        }
        PackingFormat::Aligned => {
            let per_word = 64 / width_bits;
            let shift = (cell % per_word) * width_bits;
            ((word(cell / per_word)? >> shift) & mask) as u32
        }
    };
    if index as usize >= record.palette.len() {
        return Err(CodecError::Section {
            y,
            source: SectionError::IndexOutOfRange {
                cell,
                index,
                len: record.palette.len(),
            },
        });
    }
    Ok(index)
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encodes a committed section as the record for section `index`.
pub fn encode_section(
    index: usize,
    section: &Section,
    format: PackingFormat,
) -> Result<SectionRecord, CodecError> {
    let y = index as i8;
    let words = match format {
        PackingFormat::Straddled => section.indices().words().to_vec(),
        PackingFormat::Aligned => section
            .indices()
            .to_aligned_words(storage_width(section.palette().len()))
            .map_err(|source| CodecError::Packed { y, source })?,
    };
    Ok(SectionRecord {
        y,
        palette: section.palette().entries().to_vec(),
        block_states: words.into_iter().map(|w| w as i64).collect(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
