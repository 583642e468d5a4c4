//! Palette-compressed block storage for Minecraft chunk columns.
//!
//! A [`Chunk`] holds sixteen 16×16×16 [`Section`]s. Each section stores its
//! distinct blocks in a [`Palette`] and one packed palette index per cell in a
//! [`PackedIntArray`]. Edits go through a [`BlockTransaction`], which works on
//! private copies and writes them back on commit after checking per-section
//! versions.
//!
//! ```
//! use mcio_storage::{BlockState, Chunk, ConcurrencyPolicy};
//!
//! let mut chunk = Chunk::new();
//! let mut tx = chunk.open_transaction(ConcurrencyPolicy::OneTimeSnapshot).unwrap();
//! tx.set(1, 64, 2, &BlockState::new("minecraft:stone")).unwrap();
//! tx.commit(&mut chunk).unwrap();
//! assert_eq!(chunk.get_block(1, 64, 2).unwrap().name, "minecraft:stone");
//! ```

pub mod block;
pub mod chunk;
pub mod codec;
pub mod error;
pub mod packed;
pub mod palette;
pub mod section;
pub mod transaction;

pub use block::{AIR_ID, BlockState};
pub use chunk::{Chunk, ChunkId, SectionSlot};
pub use codec::{ChunkRecord, PackingFormat, SectionRecord, decode_section, encode_section};
pub use error::{CodecError, InvalidState, PackedError, SectionError, StorageError};
pub use packed::PackedIntArray;
pub use palette::{Palette, required_bits, storage_width};
pub use section::{
    CHUNK_HEIGHT, SECTION_SIZE, SECTION_VOLUME, SECTIONS_PER_CHUNK, Section, cell_index,
};
pub use transaction::{
    BlockTransaction, ChangeBlockRequest, CommitReport, ConcurrencyPolicy, TransactionOptions,
};
