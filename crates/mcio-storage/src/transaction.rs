//! Snapshot-isolated block edits over a [`Chunk`].
//!
//! A [`BlockTransaction`] clones every committed section when it opens and
//! applies edits to those private copies. Nothing reaches the chunk until
//! [`BlockTransaction::commit`], which checks per-section versions according
//! to the transaction's [`ConcurrencyPolicy`], compacts the edited sections
//! and writes them back. A commit either writes every dirty section or none.
//!
//! The transaction owns its snapshot and does not borrow the chunk, so any
//! number of transactions can be open against one chunk at once.

use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace, warn};

use crate::block::BlockState;
use crate::chunk::{Chunk, ChunkId, locate};
use crate::error::{InvalidState, StorageError};
use crate::palette::Palette;
use crate::section::{SECTIONS_PER_CHUNK, Section};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// How a commit treats sections that other commits changed after the
/// snapshot was taken.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConcurrencyPolicy {
    /// Every dirty section must still be at its snapshot version.
    #[default]
    OneTimeSnapshot,
    /// Like `OneTimeSnapshot`, and stale untouched sections are reloaded from
    /// the chunk before writing.
    UpdateOtherSection,
    /// Write without checking versions.
    Ignore,
}

/// Per-transaction behaviour.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionOptions {
    pub policy: ConcurrencyPolicy,
    /// Drop unused palette entries from dirty sections before writing them.
    pub compact_before_commit: bool,
    /// Shrink index arrays when the palette allows a narrower width.
    pub compact_bit_width_if_possible: bool,
    /// Block that seeds sections created by the transaction.
    pub fill_block: BlockState,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            policy: ConcurrencyPolicy::OneTimeSnapshot,
            compact_before_commit: true,
            compact_bit_width_if_possible: true,
            fill_block: BlockState::air().clone(),
        }
    }
}

/// One cell update in a [`BlockTransaction::set_batch`] call. `palette_index`
/// points into the palette passed alongside the requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChangeBlockRequest {
    pub x: u8,
    pub y: u8,
    pub z: u8,
    pub palette_index: usize,
}

impl ChangeBlockRequest {
    pub fn new(x: u8, y: u8, z: u8, palette_index: usize) -> Self {
        Self {
            x,
            y,
            z,
            palette_index,
        }
    }
}

/// What a commit did, by section index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// Every section written back, including removed ones.
    pub written: Vec<usize>,
    /// Sections that ended up absent (all air or never populated).
    pub removed: Vec<usize>,
    /// Untouched sections reloaded under [`ConcurrencyPolicy::UpdateOtherSection`].
    pub rebased: Vec<usize>,
}

impl CommitReport {
    /// `true` if the commit had nothing to write.
    pub fn is_empty(&self) -> bool {
        self.written.is_empty() && self.rebased.is_empty()
    }
}

// ---------------------------------------------------------------------------
// BlockTransaction
// ---------------------------------------------------------------------------

/// Private working copies of a chunk's sections plus the bookkeeping needed
/// to commit them back safely.
#[derive(Debug)]
pub struct BlockTransaction {
    chunk: ChunkId,
    options: TransactionOptions,
    sections: [Option<Section>; SECTIONS_PER_CHUNK],
    dirty: [bool; SECTIONS_PER_CHUNK],
    baseline: [u32; SECTIONS_PER_CHUNK],
    modified: bool,
    abandoned: bool,
}

impl BlockTransaction {
    /// Clones every decoded section of `chunk`. Raw sections must have been
    /// decoded beforehand (see [`Chunk::open_transaction_with`]).
    pub(crate) fn snapshot(chunk: &Chunk, options: TransactionOptions) -> Self {
        Self {
            chunk: chunk.id(),
            options,
            sections: std::array::from_fn(|index| chunk.section(index).cloned()),
            dirty: [false; SECTIONS_PER_CHUNK],
            baseline: chunk.section_versions(),
            modified: false,
            abandoned: false,
        }
    }

    /// Discards all working state and snapshots `chunk` again. Also the way
    /// back from a rollback.
    pub fn initialize_data(&mut self, chunk: &mut Chunk) -> Result<(), StorageError> {
        self.check_chunk(chunk)?;
        chunk.ensure_all_parsed()?;
        let options = std::mem::take(&mut self.options);
        *self = Self::snapshot(chunk, options);
        Ok(())
    }

    pub fn options(&self) -> &TransactionOptions {
        &self.options
    }

    pub fn policy(&self) -> ConcurrencyPolicy {
        self.options.policy
    }

    pub fn set_compact_before_commit(&mut self, enabled: bool) {
        self.options.compact_before_commit = enabled;
    }

    pub fn set_compact_bit_width_if_possible(&mut self, enabled: bool) {
        self.options.compact_bit_width_if_possible = enabled;
    }

    // -- checks ---------------------------------------------------------------

    fn check_open(&self) -> Result<(), StorageError> {
        if self.abandoned {
            return Err(InvalidState::Abandoned.into());
        }
        Ok(())
    }

    fn check_chunk(&self, chunk: &Chunk) -> Result<(), StorageError> {
        if chunk.id() != self.chunk {
            return Err(InvalidState::ForeignChunk.into());
        }
        Ok(())
    }

    fn check_section(section: usize) -> Result<(), StorageError> {
        if section >= SECTIONS_PER_CHUNK {
            return Err(StorageError::out_of_range(
                "section",
                section,
                SECTIONS_PER_CHUNK,
            ));
        }
        Ok(())
    }

    fn check_block(block: &BlockState) -> Result<(), StorageError> {
        if !block.has_name() {
            return Err(InvalidState::EmptyBlockName.into());
        }
        Ok(())
    }

    // -- working copies -------------------------------------------------------

    /// Working copy of `section`, created on demand. A new section is filled
    /// with the configured fill block, or left with an empty palette, and is
    /// dirty from the start so the next commit stores what reads observed.
    fn ensure_section(&mut self, section: usize, fill_with_default: bool) -> &mut Section {
        if self.sections[section].is_none() {
            self.mark_dirty(section);
        }
        let fill = &self.options.fill_block;
        self.sections[section].get_or_insert_with(|| {
            if fill_with_default {
                Section::filled(fill)
            } else {
                Section::unpopulated()
            }
        })
    }

    fn mark_dirty(&mut self, section: usize) {
        self.dirty[section] = true;
        self.modified = true;
    }

    /// Marks every present section dirty so the next commit rewrites it.
    pub(crate) fn mark_all_dirty(&mut self) {
        for section in 0..SECTIONS_PER_CHUNK {
            if self.sections[section].is_some() {
                self.dirty[section] = true;
            }
        }
        self.modified = true;
    }

    // -- mutation -------------------------------------------------------------

    /// Palette index of `block` in `section`'s working copy, adding it when
    /// absent.
    ///
    /// With `fill_with_default` off, a section created here starts with an
    /// empty palette and the first block added becomes the value of every
    /// cell.
    pub fn find_or_create(
        &mut self,
        section: usize,
        block: &BlockState,
        fill_with_default: bool,
    ) -> Result<u32, StorageError> {
        self.check_open()?;
        Self::check_section(section)?;
        Self::check_block(block)?;
        let working = self.ensure_section(section, fill_with_default);
        let before = working.palette().len();
        let index = working.find_or_create(block)?;
        let grew = working.palette().len() != before;
        if grew {
            self.mark_dirty(section);
        }
        Ok(index)
    }

    /// Writes `block` at chunk coordinates.
    pub fn set(&mut self, x: u8, y: u8, z: u8, block: &BlockState) -> Result<(), StorageError> {
        self.check_open()?;
        Self::check_block(block)?;
        let (section, cell) = locate(x, y, z)?;
        let working = self.ensure_section(section, true);
        let index = working.find_or_create(block)?;
        working.write(cell, index);
        self.mark_dirty(section);
        Ok(())
    }

    /// Writes a raw palette index, as returned by [`Self::find_or_create`].
    pub fn set_index(&mut self, x: u8, y: u8, z: u8, palette_index: u32) -> Result<(), StorageError> {
        self.check_open()?;
        let (section, cell) = locate(x, y, z)?;
        let len = self.sections[section]
            .as_ref()
            .map_or(0, |working| working.palette().len());
        if palette_index as usize >= len {
            return Err(StorageError::out_of_range(
                "palette index",
                palette_index as usize,
                len,
            ));
        }
        if let Some(working) = self.sections[section].as_mut() {
            working.write(cell, palette_index);
        }
        self.mark_dirty(section);
        Ok(())
    }

    /// Applies many cell updates whose blocks are given by index into
    /// `palette`.
    ///
    /// Every request is validated before anything changes. Updates are then
    /// grouped by section and each palette entry a group uses is resolved
    /// against that section's palette once.
    pub fn set_batch(
        &mut self,
        requests: &[ChangeBlockRequest],
        palette: &[BlockState],
    ) -> Result<(), StorageError> {
        self.check_open()?;
        for block in palette {
            Self::check_block(block)?;
        }
        let mut groups: [Vec<(usize, usize)>; SECTIONS_PER_CHUNK] = Default::default();
        for request in requests {
            let (section, cell) = locate(request.x, request.y, request.z)?;
            if request.palette_index >= palette.len() {
                return Err(StorageError::out_of_range(
                    "batch palette index",
                    request.palette_index,
                    palette.len(),
                ));
            }
            groups[section].push((cell, request.palette_index));
        }

        let mut mapping: Vec<Option<u32>> = vec![None; palette.len()];
        for (section, group) in groups.iter().enumerate() {
            if group.is_empty() {
                continue;
            }
            mapping.fill(None);
            let working = self.ensure_section(section, true);
            for &(_, source) in group {
                if mapping[source].is_none() {
                    mapping[source] = Some(working.find_or_create(&palette[source])?);
                }
            }
            for &(cell, source) in group {
                if let Some(index) = mapping[source] {
                    working.write(cell, index);
                }
            }
            self.mark_dirty(section);
        }
        Ok(())
    }

    // -- reads ----------------------------------------------------------------

    /// Block at chunk coordinates as this transaction sees it.
    pub fn get(&self, x: u8, y: u8, z: u8) -> Result<&BlockState, StorageError> {
        self.check_open()?;
        let (section, cell) = locate(x, y, z)?;
        match &self.sections[section] {
            None => Ok(BlockState::air()),
            Some(working) => working
                .block_at(cell)
                .ok_or_else(|| InvalidState::UnpopulatedSection(section).into()),
        }
    }

    /// Palette index at chunk coordinates, `None` if the section is absent.
    pub fn get_index(&self, x: u8, y: u8, z: u8) -> Result<Option<u32>, StorageError> {
        self.check_open()?;
        let (section, cell) = locate(x, y, z)?;
        Ok(self.sections[section]
            .as_ref()
            .map(|working| working.index_at(cell)))
    }

    /// `(block, count)` pairs of `section`'s working palette; empty when the
    /// section is absent.
    pub fn palette_info(&self, section: usize) -> Result<Vec<(&BlockState, u32)>, StorageError> {
        self.check_open()?;
        Self::check_section(section)?;
        Ok(self.sections[section]
            .as_ref()
            .map(|working| working.palette().iter().collect())
            .unwrap_or_default())
    }

    pub fn palette(&self, section: usize) -> Option<&Palette> {
        self.section(section).map(Section::palette)
    }

    /// Working copy of `section`.
    pub fn section(&self, section: usize) -> Option<&Section> {
        self.sections.get(section).and_then(Option::as_ref)
    }

    /// Indices of sections present in the working state.
    pub fn existing_sections(&self) -> impl Iterator<Item = usize> + '_ {
        (0..SECTIONS_PER_CHUNK).filter(|&section| self.sections[section].is_some())
    }

    // -- state ----------------------------------------------------------------

    /// `true` if there are uncommitted changes.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned
    }

    pub fn is_dirty(&self, section: usize) -> bool {
        self.dirty.get(section).copied().unwrap_or(false)
    }

    /// `true` if any section of `chunk` was committed after this snapshot,
    /// or if `chunk` is not the chunk this transaction was opened on.
    pub fn is_stale(&self, chunk: &Chunk) -> bool {
        chunk.id() != self.chunk || chunk.section_versions() != self.baseline
    }

    /// `true` if the transaction is still usable against `chunk` and, unless
    /// the policy is [`ConcurrencyPolicy::Ignore`], no section of `chunk` was
    /// committed after the snapshot. Stale sections this transaction never
    /// touched count too, even though a commit would still succeed.
    pub fn is_valid(&self, chunk: &Chunk) -> bool {
        !self.abandoned
            && chunk.id() == self.chunk
            && (self.options.policy == ConcurrencyPolicy::Ignore || !self.is_stale(chunk))
    }

    /// Abandons the transaction. Every later use fails until
    /// [`Self::initialize_data`] is called.
    pub fn rollback(&mut self) {
        self.modified = false;
        self.abandoned = true;
        self.dirty = [false; SECTIONS_PER_CHUNK];
        debug!(chunk = ?self.chunk, "rolled back block transaction");
    }

    // -- commit ---------------------------------------------------------------

    /// Reloads untouched sections that `chunk` has moved past. Returns the
    /// reloaded section indices.
    pub fn rebase(&mut self, chunk: &mut Chunk) -> Result<Vec<usize>, StorageError> {
        self.check_open()?;
        self.check_chunk(chunk)?;
        chunk.ensure_all_parsed()?;
        Ok(self.reload_stale(chunk))
    }

    fn reload_stale(&mut self, chunk: &Chunk) -> Vec<usize> {
        let live = chunk.section_versions();
        let mut reloaded = Vec::new();
        for section in 0..SECTIONS_PER_CHUNK {
            if !self.dirty[section] && live[section] != self.baseline[section] {
                self.sections[section] = chunk.section(section).cloned();
                self.baseline[section] = live[section];
                reloaded.push(section);
            }
        }
        if !reloaded.is_empty() {
            trace!(?reloaded, "reloaded stale sections");
        }
        reloaded
    }

    /// Drops unused entries from a working copy and collapses it to absent
    /// when nothing but air is left.
    fn compact_section(&mut self, section: usize) -> Result<(), StorageError> {
        let Some(working) = self.sections[section].as_mut() else {
            return Ok(());
        };
        if let Err(err) = working.compact() {
            error!(section, %err, "palette compaction failed");
            return Err(err);
        }
        if working.palette().is_only_air() {
            trace!(section, "section collapsed to air");
            self.sections[section] = None;
        }
        Ok(())
    }

    /// Validates the dirty sections against `chunk`, compacts them and writes
    /// them back. Sections not dirtied since the last commit are left alone.
    ///
    /// On error nothing has been written and the transaction keeps its state,
    /// so the caller can rebase, retry under another policy or roll back.
    pub fn commit(&mut self, chunk: &mut Chunk) -> Result<CommitReport, StorageError> {
        self.check_open()?;
        self.check_chunk(chunk)?;
        if !self.modified {
            return Ok(CommitReport::default());
        }
        chunk.ensure_all_parsed()?;

        let live = chunk.section_versions();
        let dirty: Vec<usize> = (0..SECTIONS_PER_CHUNK)
            .filter(|&section| self.dirty[section])
            .collect();
        if self.options.policy != ConcurrencyPolicy::Ignore
            && let Some(&section) = dirty
                .iter()
                .find(|&&section| live[section] != self.baseline[section])
        {
            warn!(
                section,
                baseline = self.baseline[section],
                live = live[section],
                "block transaction conflicts with a newer commit"
            );
            return Err(StorageError::ConcurrencyConflict {
                section,
                baseline: self.baseline[section],
                live: live[section],
            });
        }

        let mut report = CommitReport::default();
        if self.options.policy == ConcurrencyPolicy::UpdateOtherSection {
            report.rebased = self.reload_stale(chunk);
        }

        for &section in &dirty {
            if self.options.compact_before_commit {
                self.compact_section(section)?;
            }
            if self.sections[section]
                .as_ref()
                .is_some_and(|working| working.palette().is_empty())
            {
                self.sections[section] = None;
            }
        }

        for &section in &dirty {
            chunk.store_section(
                section,
                self.sections[section].as_ref(),
                self.options.compact_bit_width_if_possible,
            )?;
            self.baseline[section] = chunk.bump_version(section);
            self.dirty[section] = false;
            if self.sections[section].is_none() {
                report.removed.push(section);
            }
            report.written.push(section);
        }
        self.modified = false;

        debug!(
            chunk = ?self.chunk,
            written = ?report.written,
            removed = ?report.removed,
            rebased = ?report.rebased,
            "committed block transaction"
        );
        Ok(report)
    }
}

#[cfg(test)]
#[path = "transaction_tests.rs"]
mod tests;
