//! Error types for packed storage, record decoding, and transactions.

use thiserror::Error;

/// Errors from constructing or converting a [`PackedIntArray`](crate::PackedIntArray).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackedError {
    /// Width outside `1..=32`.
    #[error("unsupported cell width {0} (expected 1..=32)")]
    InvalidWidth(u8),
    /// The payload's bit count is not a whole number of cells.
    #[error("{words} words do not hold a whole number of {width}-bit cells")]
    MisalignedPayload {
        /// Words in the payload.
        words: usize,
        /// Requested or inferred width.
        width: u8,
    },
    /// The payload has the wrong number of words for the requested cell count.
    #[error("payload truncated or oversized: expected {expected} words, got {actual}")]
    LengthMismatch {
        /// Words required.
        expected: usize,
        /// Words supplied.
        actual: usize,
    },
    /// Re-encoding to a narrower width could drop bits.
    #[error("cannot narrow packed array from {from} to {to} bits")]
    NarrowingNotSupported {
        /// Current width.
        from: u8,
        /// Requested width.
        to: u8,
    },
}

/// Errors from assembling a section out of a palette and a packed index array.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SectionError {
    #[error("section holds {0} cells, expected 4096")]
    WrongCellCount(usize),
    #[error("palette lists {0} more than once")]
    DuplicateEntry(String),
    #[error("cell {cell} references palette index {index} but the palette has {len} entries")]
    IndexOutOfRange { cell: usize, index: u32, len: usize },
}

/// Errors from decoding chunk and section records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Section index outside `0..16` (and not the lighting marker `-1`).
    #[error("section Y {0} is outside 0..16")]
    InvalidY(i8),
    /// Two records claim the same section.
    #[error("section Y {0} appears more than once")]
    DuplicateSection(i8),
    /// A palette without index data, or index data without a palette.
    #[error("section Y {y} has a palette of {palette} entries but {words} index words")]
    IncompleteSection { y: i8, palette: usize, words: usize },
    #[error("section Y {y}: {source}")]
    Packed {
        y: i8,
        #[source]
        source: PackedError,
    },
    #[error("section Y {y}: {source}")]
    Section {
        y: i8,
        #[source]
        source: SectionError,
    },
}

/// Why an operation was refused without touching any data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidState {
    #[error("transaction was rolled back")]
    Abandoned,
    #[error("transaction was opened against a different chunk")]
    ForeignChunk,
    #[error("block name is empty")]
    EmptyBlockName,
    /// A section created without a default entry was read before being filled.
    #[error("section {0} has no palette entries yet")]
    UnpopulatedSection(usize),
}

/// Errors surfaced by chunk and transaction operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// A dirty section was committed by someone else after this transaction
    /// took its snapshot.
    #[error(
        "section {section} changed underneath the transaction (snapshot version {baseline}, live version {live})"
    )]
    ConcurrencyConflict {
        section: usize,
        baseline: u32,
        live: u32,
    },
    #[error(transparent)]
    InvalidState(#[from] InvalidState),
    #[error("{what} {value} is out of range (must be below {bound})")]
    OutOfRange {
        what: &'static str,
        value: usize,
        bound: usize,
    },
    /// Internal bookkeeping disagrees with stored data. Not recoverable.
    #[error("corrupt section data: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Packed(#[from] PackedError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl StorageError {
    /// Shorthand for [`StorageError::OutOfRange`].
    pub(crate) fn out_of_range(what: &'static str, value: usize, bound: usize) -> Self {
        Self::OutOfRange { what, value, bound }
    }
}
