//! The loaded file model: an immutable tree of cards and tables

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use memmap2::Mmap;
use opat_index::IndexVector;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::card::DataCard;
use crate::catalog::CardCatalog;
use crate::header::Header;
use crate::{reader, Error, Result};

/// Minimum and maximum of one index-vector dimension
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Smallest stored value
    pub min: f64,
    /// Largest stored value
    pub max: f64,
}

impl Bounds {
    /// An empty bound, extended by the first `expand`
    pub fn new() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    /// Widen to include `value`
    pub fn expand(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// True when `value` lies in `[min, max]`
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bounds({}, {})", self.min, self.max)
    }
}

/// A fully loaded OPAT file
///
/// Constructed by [`Opat::open`] and read-only afterwards: the catalog, the
/// cards, and every table buffer are immutable and safely shareable across
/// threads. The raw byte map is retained so checksums can be re-verified
/// without touching the filesystem again.
pub struct Opat {
    pub(crate) header: Header,
    pub(crate) catalog: CardCatalog,
    pub(crate) cards: HashMap<IndexVector, DataCard>,
    pub(crate) bounds: Vec<Bounds>,
    pub(crate) mmap: Mmap,
}

impl Opat {
    /// Open and eagerly parse an OPAT file
    ///
    /// Reads the header, the card catalog, and every card and table into
    /// memory; nothing is read lazily afterwards.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] when the file cannot be opened or mapped
    /// - [`Error::InvalidMagic`] / [`Error::UnsupportedVersion`] /
    ///   [`Error::InvalidFormat`] on malformed content
    /// - [`Error::Truncated`] when any declared structure runs past the end
    ///   of the file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        reader::read(path.as_ref())
    }

    /// The file header
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The card catalog
    pub fn catalog(&self) -> &CardCatalog {
        &self.catalog
    }

    /// Dimensions of the file's index vectors
    pub fn num_index(&self) -> u16 {
        self.header.num_index
    }

    /// Card stored under `key`
    ///
    /// # Errors
    ///
    /// [`Error::CardNotFound`] when no card matches.
    pub fn get(&self, key: &IndexVector) -> Result<&DataCard> {
        self.cards
            .get(key)
            .ok_or_else(|| Error::CardNotFound(key.to_string()))
    }

    /// Card stored under a raw value vector
    ///
    /// The key is built at the file's hash precision.
    ///
    /// # Errors
    ///
    /// [`Error::Index`] when the values are not a valid key,
    /// [`Error::CardNotFound`] when no card matches.
    pub fn get_by_values(&self, values: &[f64]) -> Result<&DataCard> {
        let key = IndexVector::new(values, self.header.hash_precision)?;
        self.get(&key)
    }

    /// Per-dimension min/max over every stored index vector
    ///
    /// Computed once at open time.
    pub fn bounds(&self) -> &[Bounds] {
        &self.bounds
    }

    /// Stored keys in catalog order
    pub fn keys(&self) -> impl Iterator<Item = &IndexVector> {
        self.catalog.keys()
    }

    /// Recompute each card's SHA-256 and compare against the catalog
    ///
    /// Covers exactly the `[byte_start, byte_end)` range each catalog entry
    /// names.
    ///
    /// # Errors
    ///
    /// [`Error::ChecksumMismatch`] naming the first card whose payload does
    /// not hash to its stored digest.
    pub fn verify_checksums(&self) -> Result<()> {
        for entry in self.catalog.iter() {
            let payload = &self.mmap[entry.byte_start as usize..entry.byte_end as usize];
            let digest = Sha256::digest(payload);
            if digest[..] != entry.sha256 {
                return Err(Error::ChecksumMismatch(entry.index.to_string()));
            }
        }
        debug!(cards = self.catalog.len(), "checksums verified");
        Ok(())
    }
}

impl fmt::Display for Opat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opat({}, {})", self.header, self.catalog)
    }
}
