//! Chunk column: sixteen optional sections, each with a commit version.
//!
//! Sections loaded from a [`ChunkRecord`] stay as raw records until something
//! needs their palette or cells; single-cell reads are answered straight from
//! the packed payload. Opening a transaction decodes every section.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::block::BlockState;
use crate::codec::{
    ChunkRecord, PackingFormat, SectionRecord, check_section, decode_section, encode_section,
    peek_index,
};
use crate::error::{CodecError, StorageError};
use crate::section::{
    SECTION_SIZE, SECTION_VOLUME, SECTIONS_PER_CHUNK, Section, cell_coords, cell_index,
};
use crate::transaction::{BlockTransaction, CommitReport, ConcurrencyPolicy, TransactionOptions};

static NEXT_CHUNK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`Chunk`]. Transactions remember it so they
/// can only be committed back into the chunk they were opened on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkId(u64);

impl ChunkId {
    fn next() -> Self {
        Self(NEXT_CHUNK_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Maps chunk-local coordinates to `(section, cell)`.
///
/// `x` and `z` must be below 16; every `y` in `0..=255` is valid.
pub(crate) fn locate(x: u8, y: u8, z: u8) -> Result<(usize, usize), StorageError> {
    if usize::from(x) >= SECTION_SIZE {
        return Err(StorageError::out_of_range("x", x.into(), SECTION_SIZE));
    }
    if usize::from(z) >= SECTION_SIZE {
        return Err(StorageError::out_of_range("z", z.into(), SECTION_SIZE));
    }
    Ok((usize::from(y >> 4), cell_index(x, y, z)))
}

/// A section as held by a chunk: either the raw record it was loaded from, or
/// the decoded form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SectionSlot {
    Unparsed(SectionRecord),
    Parsed(Section),
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// A 16×256×16 column of block storage.
///
/// Absent sections read as air. Every commit that writes a section bumps that
/// section's version, which is how transactions detect concurrent edits.
#[derive(Debug)]
pub struct Chunk {
    id: ChunkId,
    data_version: i32,
    slots: [Option<SectionSlot>; SECTIONS_PER_CHUNK],
    versions: [u32; SECTIONS_PER_CHUNK],
}

impl Chunk {
    /// An all-air chunk in the straddled format.
    pub fn new() -> Self {
        Self::with_format(PackingFormat::Straddled)
    }

    /// An all-air chunk that will be saved in `format`.
    pub fn with_format(format: PackingFormat) -> Self {
        Self {
            id: ChunkId::next(),
            data_version: format.default_data_version(),
            slots: Default::default(),
            versions: [0; SECTIONS_PER_CHUNK],
        }
    }

    /// Loads a chunk record. Sections are validated for placement only; their
    /// payloads are decoded on first use.
    pub fn from_record(record: ChunkRecord) -> Result<Self, CodecError> {
        let mut chunk = Self {
            id: ChunkId::next(),
            data_version: record.data_version,
            slots: Default::default(),
            versions: [0; SECTIONS_PER_CHUNK],
        };
        let format = chunk.format();
        let mut skipped = 0usize;
        for section in record.sections {
            let Some(index) = check_section(&section, format)? else {
                skipped += 1;
                continue;
            };
            if chunk.slots[index].is_some() {
                return Err(CodecError::DuplicateSection(section.y));
            }
            chunk.slots[index] = Some(SectionSlot::Unparsed(section));
        }
        tracing::debug!(
            data_version = chunk.data_version,
            sections = chunk.existing_sections().count(),
            skipped,
            "loaded chunk record"
        );
        Ok(chunk)
    }

    /// Encodes every present section at the chunk's data version.
    pub fn to_record(&self) -> Result<ChunkRecord, CodecError> {
        let format = self.format();
        let mut sections = Vec::new();
        for (index, slot) in self.slots.iter().enumerate() {
            match slot {
                Some(SectionSlot::Parsed(section)) => {
                    sections.push(encode_section(index, section, format)?)
                }
                Some(SectionSlot::Unparsed(record)) => sections.push(record.clone()),
                None => {}
            }
        }
        Ok(ChunkRecord {
            data_version: self.data_version,
            sections,
        })
    }

    pub fn id(&self) -> ChunkId {
        self.id
    }

    pub fn data_version(&self) -> i32 {
        self.data_version
    }

    /// Payload layout implied by the data version.
    pub fn format(&self) -> PackingFormat {
        PackingFormat::for_data_version(self.data_version)
    }

    /// Changes the data version written by [`Chunk::to_record`]. Sections
    /// still in raw form are decoded first when the packing format changes.
    pub fn set_data_version(&mut self, data_version: i32) -> Result<(), StorageError> {
        if PackingFormat::for_data_version(data_version) != self.format() {
            self.ensure_all_parsed()?;
        }
        self.data_version = data_version;
        Ok(())
    }

    // -- sections -------------------------------------------------------------

    pub fn slot(&self, index: usize) -> Option<&SectionSlot> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// The decoded section at `index`, if present and already decoded.
    pub fn section(&self, index: usize) -> Option<&Section> {
        match self.slot(index) {
            Some(SectionSlot::Parsed(section)) => Some(section),
            _ => None,
        }
    }

    /// Decodes section `index` if it is still raw and returns it.
    pub fn ensure_parsed(&mut self, index: usize) -> Result<Option<&Section>, StorageError> {
        if index >= SECTIONS_PER_CHUNK {
            return Err(StorageError::out_of_range(
                "section",
                index,
                SECTIONS_PER_CHUNK,
            ));
        }
        if let Some(SectionSlot::Unparsed(record)) = &self.slots[index] {
            let decoded = decode_section(record, self.format())?;
            self.slots[index] = decoded.map(|(_, section)| SectionSlot::Parsed(section));
        }
        Ok(self.section(index))
    }

    pub fn ensure_all_parsed(&mut self) -> Result<(), StorageError> {
        for index in 0..SECTIONS_PER_CHUNK {
            self.ensure_parsed(index)?;
        }
        Ok(())
    }

    pub fn has_section(&self, index: usize) -> bool {
        self.slot(index).is_some()
    }

    /// Indices of present sections, bottom to top.
    pub fn existing_sections(&self) -> impl Iterator<Item = usize> + '_ {
        (0..SECTIONS_PER_CHUNK).filter(|&index| self.has_section(index))
    }

    pub fn section_version(&self, index: usize) -> u32 {
        self.versions.get(index).copied().unwrap_or(0)
    }

    pub fn section_versions(&self) -> [u32; SECTIONS_PER_CHUNK] {
        self.versions
    }

    // -- committed reads ------------------------------------------------------

    /// Committed block at chunk coordinates. Absent sections read as air.
    pub fn get_block(&self, x: u8, y: u8, z: u8) -> Result<&BlockState, StorageError> {
        let (section, cell) = locate(x, y, z)?;
        match &self.slots[section] {
            None => Ok(BlockState::air()),
            Some(SectionSlot::Parsed(parsed)) => parsed
                .block_at(cell)
                .ok_or_else(|| {
                    StorageError::Corrupt(format!("section {section} has an empty palette"))
                }),
            Some(SectionSlot::Unparsed(record)) => {
                let index = peek_index(record, self.format(), cell)?;
                Ok(&record.palette[index as usize])
            }
        }
    }

    /// Committed palette index at chunk coordinates, `None` for absent sections.
    pub fn get_index(&self, x: u8, y: u8, z: u8) -> Result<Option<u32>, StorageError> {
        let (section, cell) = locate(x, y, z)?;
        match &self.slots[section] {
            None => Ok(None),
            Some(SectionSlot::Parsed(parsed)) => Ok(Some(parsed.index_at(cell))),
            Some(SectionSlot::Unparsed(record)) => {
                Ok(Some(peek_index(record, self.format(), cell)?))
            }
        }
    }

    /// Every committed block of every present section as `((x, y, z), block)`,
    /// bottom section first and y, z, x order within a section.
    pub fn blocks(
        &mut self,
    ) -> Result<impl Iterator<Item = ((u8, u8, u8), &BlockState)> + '_, StorageError> {
        self.ensure_all_parsed()?;
        let this: &Self = self;
        Ok((0..SECTIONS_PER_CHUNK)
            .filter_map(move |index| this.section(index).map(|section| (index, section)))
            .flat_map(|(index, section)| {
                (0..SECTION_VOLUME).filter_map(move |cell| {
                    let (x, y, z) = cell_coords(cell);
                    let y = (index * SECTION_SIZE) as u8 + y;
                    section.block_at(cell).map(|block| ((x, y, z), block))
                })
            }))
    }

    // -- transactions ---------------------------------------------------------

    /// Opens a transaction with default options and the given policy.
    pub fn open_transaction(
        &mut self,
        policy: ConcurrencyPolicy,
    ) -> Result<BlockTransaction, StorageError> {
        self.open_transaction_with(TransactionOptions {
            policy,
            ..TransactionOptions::default()
        })
    }

    /// Snapshots every section into a new transaction.
    pub fn open_transaction_with(
        &mut self,
        options: TransactionOptions,
    ) -> Result<BlockTransaction, StorageError> {
        self.ensure_all_parsed()?;
        Ok(BlockTransaction::snapshot(self, options))
    }

    /// Drops unused palette entries from every section and shrinks index
    /// arrays to the narrowest width their palettes allow.
    pub fn compact_all(&mut self) -> Result<CommitReport, StorageError> {
        self.compact_all_with(&TransactionOptions::default())
    }

    /// Like [`Chunk::compact_all`], taking the width-shrinking choice from
    /// `options`. Palette compaction is always on.
    pub fn compact_all_with(
        &mut self,
        options: &TransactionOptions,
    ) -> Result<CommitReport, StorageError> {
        let mut transaction = self.open_transaction_with(TransactionOptions {
            policy: ConcurrencyPolicy::Ignore,
            compact_before_commit: true,
            compact_bit_width_if_possible: options.compact_bit_width_if_possible,
            fill_block: options.fill_block.clone(),
        })?;
        transaction.mark_all_dirty();
        transaction.commit(self)
    }

    // -- commit plumbing ------------------------------------------------------

    /// Writes a compacted working copy (or its removal) into slot `index`.
    pub(crate) fn store_section(
        &mut self,
        index: usize,
        working: Option<&Section>,
        compact_width: bool,
    ) -> Result<(), StorageError> {
        let Some(working) = working else {
            self.slots[index] = None;
            return Ok(());
        };
        let existing = match self.slots[index].take() {
            Some(SectionSlot::Parsed(section)) => Some(section),
            Some(SectionSlot::Unparsed(record)) => {
                decode_section(&record, self.format())?.map(|(_, section)| section)
            }
            None => None,
        };
        let committed = working.commit_into(existing, compact_width)?;
        self.slots[index] = Some(SectionSlot::Parsed(committed));
        Ok(())
    }

    /// Advances the version of section `index` and returns the new value.
    pub(crate) fn bump_version(&mut self, index: usize) -> u32 {
        self.versions[index] = self.versions[index].wrapping_add(1);
        self.versions[index]
    }
}

impl Default for Chunk {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloning yields an independent chunk with its own identity; transactions
/// opened on the original cannot be committed into the copy.
impl Clone for Chunk {
    fn clone(&self) -> Self {
        Self {
            id: ChunkId::next(),
            data_version: self.data_version,
            slots: self.slots.clone(),
            versions: self.versions,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{ALIGNED_DATA_VERSION, LIGHTING_ONLY_Y};
    use crate::error::PackedError;
    use crate::packed::PackedIntArray;

    fn stone() -> BlockState {
        BlockState::new("minecraft:stone")
    }

    /// Section whose bottom layer (local y = 0) is stone, rest air.
    fn floor_section() -> Section {
        let mut indices = PackedIntArray::new(4, SECTION_VOLUME).unwrap();
        for cell in 0..256 {
            indices.set(cell, 1);
        }
        Section::from_parts(vec![BlockState::air().clone(), stone()], indices).unwrap()
    }

    /// Floor section with 17 extra unused entries, stored at 5 bits.
    fn wide_floor() -> Section {
        let mut entries = vec![BlockState::air().clone(), stone()];
        entries.extend((0..17).map(|i| BlockState::new(format!("test:unused_{i}"))));
        let mut indices = PackedIntArray::new(5, SECTION_VOLUME).unwrap();
        for cell in 0..256 {
            indices.set(cell, 1);
        }
        Section::from_parts(entries, indices).unwrap()
    }

    fn floor_record(y: i8) -> SectionRecord {
        encode_section(y as usize, &floor_section(), PackingFormat::Straddled).unwrap()
    }

    #[test]
    fn test_new_chunk_reads_air() {
        let chunk = Chunk::new();
        assert!(chunk.get_block(3, 200, 7).unwrap().is_air());
        assert_eq!(chunk.get_index(3, 200, 7).unwrap(), None);
        assert_eq!(chunk.existing_sections().count(), 0);
    }

    #[test]
    fn test_out_of_range_coordinates() {
        let chunk = Chunk::new();
        assert_eq!(
            chunk.get_block(16, 0, 0),
            Err(StorageError::OutOfRange {
                what: "x",
                value: 16,
                bound: 16
            })
        );
        assert!(matches!(
            chunk.get_index(0, 0, 200),
            Err(StorageError::OutOfRange { what: "z", .. })
        ));
    }

    #[test]
    fn test_record_sections_stay_raw_until_needed() {
        let record = ChunkRecord {
            data_version: 2230,
            sections: vec![floor_record(2)],
        };
        let mut chunk = Chunk::from_record(record).unwrap();
        assert!(matches!(chunk.slot(2), Some(SectionSlot::Unparsed(_))));
        assert_eq!(chunk.get_block(4, 32, 4).unwrap(), &stone());
        assert!(chunk.get_block(4, 33, 4).unwrap().is_air());
        assert_eq!(chunk.get_index(4, 32, 4).unwrap(), Some(1));
        assert!(chunk.section(2).is_none());

        let section = chunk.ensure_parsed(2).unwrap().unwrap();
        assert_eq!(section.palette().counts(), &[3840, 256]);
        assert!(matches!(chunk.slot(2), Some(SectionSlot::Parsed(_))));
    }

    #[test]
    fn test_lighting_records_skipped() {
        let record = ChunkRecord {
            data_version: 2230,
            sections: vec![
                SectionRecord {
                    y: LIGHTING_ONLY_Y,
                    ..Default::default()
                },
                floor_record(0),
                SectionRecord {
                    y: 15,
                    ..Default::default()
                },
            ],
        };
        let chunk = Chunk::from_record(record).unwrap();
        assert_eq!(chunk.existing_sections().collect::<Vec<_>>(), vec![0]);
    }

    #[test]
    fn test_bad_payload_length_rejected_on_load() {
        let mut section = floor_record(0);
        section.block_states.resize(300, 0);
        let record = ChunkRecord {
            data_version: 2230,
            sections: vec![section],
        };
        assert!(matches!(
            Chunk::from_record(record),
            Err(CodecError::Packed {
                y: 0,
                source: PackedError::LengthMismatch {
                    expected: 256,
                    actual: 300
                }
            })
        ));

        // A straddled-length payload is wrong for an aligned data version.
        let record = ChunkRecord {
            data_version: ALIGNED_DATA_VERSION,
            sections: vec![encode_section(0, &wide_floor(), PackingFormat::Straddled).unwrap()],
        };
        assert!(matches!(
            Chunk::from_record(record),
            Err(CodecError::Packed {
                source: PackedError::LengthMismatch { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_duplicate_section_rejected() {
        let record = ChunkRecord {
            data_version: 2230,
            sections: vec![floor_record(1), floor_record(1)],
        };
        assert_eq!(
            Chunk::from_record(record).err(),
            Some(CodecError::DuplicateSection(1))
        );
    }

    #[test]
    fn test_record_roundtrip() {
        let record = ChunkRecord {
            data_version: 2230,
            sections: vec![floor_record(0), floor_record(9)],
        };
        let mut chunk = Chunk::from_record(record.clone()).unwrap();
        assert_eq!(chunk.to_record().unwrap(), record);
        chunk.ensure_all_parsed().unwrap();
        assert_eq!(chunk.to_record().unwrap(), record);
    }

    #[test]
    fn test_format_conversion() {
        let record = ChunkRecord {
            data_version: 2230,
            sections: vec![floor_record(0)],
        };
        let mut chunk = Chunk::from_record(record).unwrap();
        chunk.set_data_version(ALIGNED_DATA_VERSION).unwrap();
        assert_eq!(chunk.format(), PackingFormat::Aligned);
        let aligned = chunk.to_record().unwrap();
        assert_eq!(aligned.data_version, ALIGNED_DATA_VERSION);

        let reloaded = Chunk::from_record(aligned).unwrap();
        assert_eq!(reloaded.get_block(15, 0, 15).unwrap(), &stone());
        assert!(reloaded.get_block(15, 1, 15).unwrap().is_air());
    }

    #[test]
    fn test_blocks_iteration() {
        let record = ChunkRecord {
            data_version: 2230,
            sections: vec![floor_record(1)],
        };
        let mut chunk = Chunk::from_record(record).unwrap();
        let blocks: Vec<_> = chunk.blocks().unwrap().collect();
        assert_eq!(blocks.len(), SECTION_VOLUME);
        assert_eq!(blocks[0], ((0, 16, 0), &stone()));
        assert_eq!(blocks[1].0, (1, 16, 0));
        assert_eq!(blocks[16].0, (0, 16, 1));
        assert_eq!(blocks[256], ((0, 17, 0), BlockState::air()));
        let stone_count = blocks.iter().filter(|(_, b)| **b == stone()).count();
        assert_eq!(stone_count, 256);
    }

    #[test]
    fn test_clone_has_new_identity() {
        let chunk = Chunk::new();
        let copy = chunk.clone();
        assert_ne!(chunk.id(), copy.id());
    }
}
