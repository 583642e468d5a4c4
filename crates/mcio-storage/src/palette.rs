//! Per-section palette: the distinct block values a section uses, each with
//! the number of cells currently pointing at it.

use crate::block::BlockState;

/// Storage width never drops below this, even for a one-entry palette.
pub const MIN_STORAGE_WIDTH: u8 = 4;

/// Bits needed to address `entries` distinct values (`0` for zero or one).
pub fn required_bits(entries: usize) -> u8 {
    if entries <= 1 {
        0
    } else {
        (usize::BITS - (entries - 1).leading_zeros()) as u8
    }
}

/// Width a section uses for a palette of `entries` values.
pub fn storage_width(entries: usize) -> u8 {
    required_bits(entries).max(MIN_STORAGE_WIDTH)
}

/// Ordered palette entries plus per-entry usage counts.
///
/// A cell's stored index is the position of its block here. Lookups are a
/// linear scan; real palettes rarely exceed a few dozen entries.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Palette {
    entries: Vec<BlockState>,
    counts: Vec<u32>,
}

impl Palette {
    /// An empty palette.
    pub fn new() -> Self {
        Self::default()
    }

    /// A single-entry palette whose block is used by `cells` cells.
    pub fn filled(block: &BlockState, cells: u32) -> Self {
        Self {
            entries: vec![block.clone()],
            counts: vec![cells],
        }
    }

    /// Entries with zero counts; the caller tallies usage afterwards.
    pub(crate) fn from_entries(entries: Vec<BlockState>) -> Self {
        let counts = vec![0; entries.len()];
        Self { entries, counts }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<&BlockState> {
        self.entries.get(index as usize)
    }

    /// Usage count of entry `index`, or `0` if there is no such entry.
    pub fn count(&self, index: u32) -> u32 {
        self.counts.get(index as usize).copied().unwrap_or(0)
    }

    pub fn entries(&self) -> &[BlockState] {
        &self.entries
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// Sum of all counts. A consistent section palette totals 4096.
    pub fn total_usage(&self) -> u64 {
        self.counts.iter().map(|&c| u64::from(c)).sum()
    }

    /// `(block, count)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (&BlockState, u32)> {
        self.entries.iter().zip(self.counts.iter().copied())
    }

    pub fn find(&self, block: &BlockState) -> Option<u32> {
        self.entries
            .iter()
            .position(|entry| entry == block)
            .map(|i| i as u32)
    }

    /// Index of `block`, appending it with `initial` uses when absent.
    /// The second value is `true` if an entry was appended.
    pub(crate) fn find_or_insert(&mut self, block: &BlockState, initial: u32) -> (u32, bool) {
        if let Some(index) = self.find(block) {
            return (index, false);
        }
        self.entries.push(block.clone());
        self.counts.push(initial);
        ((self.entries.len() - 1) as u32, true)
    }

    /// Storage width for the current entry count.
    pub fn storage_width(&self) -> u8 {
        storage_width(self.entries.len())
    }

    pub(crate) fn retain(&mut self, index: u32) {
        self.counts[index as usize] += 1;
    }

    pub(crate) fn release(&mut self, index: u32) {
        let count = &mut self.counts[index as usize];
        debug_assert!(*count > 0, "releasing unused palette entry {index}");
        *count = count.saturating_sub(1);
    }

    /// `true` when the only entry is plain air.
    pub fn is_only_air(&self) -> bool {
        self.entries.len() == 1 && self.entries[0].is_air()
    }

    /// Old-index to new-index table for dropping every zero-count entry,
    /// or `None` if every entry is in use. Removed entries map to `None`.
    pub(crate) fn compaction_map(&self) -> Option<Vec<Option<u32>>> {
        if self.counts.iter().all(|&c| c > 0) {
            return None;
        }
        let mut next = 0u32;
        let map = self
            .counts
            .iter()
            .map(|&count| {
                (count > 0).then(|| {
                    next += 1;
                    next - 1
                })
            })
            .collect();
        Some(map)
    }

    /// Drops every zero-count entry, preserving the order of the rest.
    pub(crate) fn drop_unused(&mut self) {
        let mut kept = 0;
        for i in 0..self.entries.len() {
            if self.counts[i] > 0 {
                self.entries.swap(kept, i);
                self.counts.swap(kept, i);
                kept += 1;
            }
        }
        self.entries.truncate(kept);
        self.counts.truncate(kept);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
