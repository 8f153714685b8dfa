//! opat-format: the OPAT binary table container
//!
//! OPAT files hold families of scientific lookup tables (opacity tables and
//! the like), each family keyed by a vector of physical parameters. The
//! format is self-describing and little-endian, with a three-level index:
//! file header -> card catalog -> per-card table index, giving O(1) keyed
//! access to any table.
//!
//! This crate reads the format eagerly into an immutable model:
//! - [`Header`], [`CardCatalog`], [`CardHeader`], [`TableEntry`] mirror the
//!   on-disk layout byte for byte
//! - [`Opat`] is the loaded file: a map from [`opat_index::IndexVector`] to
//!   [`DataCard`], each card a map from tag to [`Table`]
//! - [`Table`] owns its row axis, column axis, and cell block, with
//!   bounds-checked access, slicing, and axis views
//!
//! Producing OPAT files is a separate program's job; the [`testdata`] module
//! only synthesizes small containers for test suites.
//!
//! # Example
//!
//! ```no_run
//! use opat_format::Opat;
//!
//! let opat = Opat::open("gs98hz.opat")?;
//! let card = opat.get_by_values(&[0.35, 0.004])?;
//! let table = card.get("data")?;
//! println!("{} x {} cells", table.num_rows(), table.num_cols());
//! # Ok::<(), opat_format::Error>(())
//! ```

#![warn(missing_docs)]
#![allow(clippy::manual_range_contains)]

pub mod card;
pub mod catalog;
pub mod header;
pub mod model;
pub mod reader;
pub mod table;
pub mod testdata;

pub use card::{CardHeader, DataCard, TableEntry, TableIndex, CARD_MAGIC};
pub use catalog::{CardCatalog, CatalogEntry};
pub use header::{Header, HEADER_SIZE, MAGIC, VERSION};
pub use model::{Bounds, Opat};
pub use reader::has_magic;
pub use table::{Slice, Table};

/// Format error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Magic bytes are not `OPAT` (or a card's are not `CARD`)
    #[error("invalid magic bytes")]
    InvalidMagic,

    /// Format version newer than this reader understands
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u16),

    /// A structurally impossible field value
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// The file ends before a declared structure does
    #[error("truncated file: {what} needs {needed} bytes at offset {offset}, file has {available}")]
    Truncated {
        /// Structure being read when the file ran out
        what: &'static str,
        /// Bytes the structure requires
        needed: usize,
        /// Offset the read started at
        offset: usize,
        /// Bytes actually available in the file
        available: usize,
    },

    /// Underlying OS read failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A card's payload does not hash to its catalog digest
    #[error("checksum mismatch for card {0}")]
    ChecksumMismatch(String),

    /// No card stored under the requested index vector
    #[error("no card for index {0}")]
    CardNotFound(String),

    /// No table stored under the requested tag
    #[error("no table tagged {0:?}")]
    TableNotFound(String),

    /// Index or slice outside a table's extent
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// Invalid index vector (empty, bad precision, negative value)
    #[error("index vector error: {0}")]
    Index(#[from] opat_index::Error),
}

/// Result type for format operations
pub type Result<T> = std::result::Result<T, Error>;
