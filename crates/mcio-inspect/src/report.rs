//! Per-section palette statistics.

use std::fmt;

use mcio_storage::{Chunk, StorageError, storage_width};

/// Storage statistics for one populated section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionStats {
    pub index: usize,
    pub palette_len: usize,
    /// Bits per index currently stored.
    pub width: u8,
    /// Narrowest width once unused entries are dropped.
    pub min_width: u8,
    /// Palette entries no cell refers to.
    pub unused_entries: usize,
    pub air_cells: u32,
    pub version: u32,
}

impl SectionStats {
    /// Whether compaction would change this section.
    pub fn is_compactable(&self) -> bool {
        self.unused_entries > 0 || self.width > self.min_width
    }
}

impl fmt::Display for SectionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "section {:>2}: {:>4} entries, {:>2} bits (min {:>2}), {} unused, {:>4} air, version {}",
            self.index,
            self.palette_len,
            self.width,
            self.min_width,
            self.unused_entries,
            self.air_cells,
            self.version,
        )
    }
}

/// Collects statistics for every populated section, parsing lazily loaded
/// sections on the way.
pub fn collect(chunk: &mut Chunk) -> Result<Vec<SectionStats>, StorageError> {
    chunk.ensure_all_parsed()?;
    let indices: Vec<usize> = chunk.existing_sections().collect();
    let mut stats = Vec::with_capacity(indices.len());
    for index in indices {
        let Some(section) = chunk.section(index) else {
            continue;
        };
        let palette = section.palette();
        let unused_entries = palette.counts().iter().filter(|&&count| count == 0).count();
        let air_cells = palette
            .iter()
            .filter(|(block, _)| block.is_air())
            .map(|(_, count)| count)
            .sum();
        stats.push(SectionStats {
            index,
            palette_len: palette.len(),
            width: section.width(),
            min_width: storage_width(palette.len() - unused_entries),
            unused_entries,
            air_cells,
            version: chunk.section_version(index),
        });
    }
    Ok(stats)
}

/// One line per section followed by a totals line.
pub fn render(data_version: i32, stats: &[SectionStats]) -> String {
    let mut out = format!("data version {data_version}\n");
    for section in stats {
        out.push_str(&section.to_string());
        out.push('\n');
    }
    let entries: usize = stats.iter().map(|s| s.palette_len).sum();
    let compactable = stats.iter().filter(|s| s.is_compactable()).count();
    out.push_str(&format!(
        "{} sections, {entries} palette entries, {compactable} compactable\n",
        stats.len()
    ));
    out
}
