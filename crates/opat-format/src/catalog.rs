//! Card catalog: the file-level index from parameter vectors to cards

use std::collections::HashMap;
use std::fmt;

use opat_index::IndexVector;

use crate::{Error, Result};

/// One catalog entry: where a card lives and what it hashes to
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    /// Parameter vector keying the card
    pub index: IndexVector,
    /// Byte offset of the card in the file
    pub byte_start: u64,
    /// Byte offset one past the card's last byte
    pub byte_end: u64,
    /// SHA-256 of the card's `[byte_start, byte_end)` bytes
    pub sha256: [u8; 32],
}

impl CatalogEntry {
    /// On-disk size of one entry for the given index dimensionality
    pub fn disk_size(num_index: u16) -> usize {
        num_index as usize * 8 + 48
    }

    /// Deserialize from the on-disk layout
    ///
    /// `buf` must be exactly [`CatalogEntry::disk_size`] bytes; the index
    /// values are wrapped at the file's `hash_precision`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidFormat`] on a short buffer, [`Error::Index`] when the
    /// stored values are not a valid index vector, or when the byte range is
    /// reversed.
    pub fn from_bytes(buf: &[u8], num_index: u16, hash_precision: u8) -> Result<Self> {
        if buf.len() != Self::disk_size(num_index) {
            return Err(Error::InvalidFormat(format!(
                "catalog entry is {} bytes, expected {}",
                buf.len(),
                Self::disk_size(num_index)
            )));
        }

        let mut values = Vec::with_capacity(num_index as usize);
        for i in 0..num_index as usize {
            let start = i * 8;
            values.push(f64::from_le_bytes(
                buf[start..start + 8].try_into().unwrap(),
            ));
        }
        let tail = num_index as usize * 8;
        let byte_start = u64::from_le_bytes(buf[tail..tail + 8].try_into().unwrap());
        let byte_end = u64::from_le_bytes(buf[tail + 8..tail + 16].try_into().unwrap());
        let sha256: [u8; 32] = buf[tail + 16..tail + 48].try_into().unwrap();

        if byte_start >= byte_end {
            return Err(Error::InvalidFormat(format!(
                "catalog entry byte range reversed: {byte_start}..{byte_end}"
            )));
        }

        Ok(Self {
            index: IndexVector::new(&values, hash_precision)?,
            byte_start,
            byte_end,
            sha256,
        })
    }

    /// Serialize to the on-disk layout
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::disk_size(self.index.len() as u16));
        for &value in self.index.values() {
            buf.extend_from_slice(&value.to_le_bytes());
        }
        buf.extend_from_slice(&self.byte_start.to_le_bytes());
        buf.extend_from_slice(&self.byte_end.to_le_bytes());
        buf.extend_from_slice(&self.sha256);
        buf
    }
}

impl fmt::Display for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CatalogEntry(index: {}, bytes: {}..{}, sha256: ",
            self.index, self.byte_start, self.byte_end
        )?;
        for byte in &self.sha256[..4] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, "...)")
    }
}

/// The card catalog: keyed entries in file order
///
/// Keys are pairwise unequal under [`IndexVector`] equality; a duplicate in
/// the file is a format error.
#[derive(Debug, Clone, Default)]
pub struct CardCatalog {
    order: Vec<IndexVector>,
    entries: HashMap<IndexVector, CatalogEntry>,
}

impl CardCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, rejecting duplicate keys
    ///
    /// # Errors
    ///
    /// [`Error::InvalidFormat`] when the entry's key collides with one
    /// already in the catalog.
    pub fn insert(&mut self, entry: CatalogEntry) -> Result<()> {
        if self.entries.contains_key(&entry.index) {
            return Err(Error::InvalidFormat(format!(
                "duplicate catalog key {}",
                entry.index
            )));
        }
        self.order.push(entry.index.clone());
        self.entries.insert(entry.index.clone(), entry);
        Ok(())
    }

    /// Entry for a key, if present
    pub fn get(&self, index: &IndexVector) -> Option<&CatalogEntry> {
        self.entries.get(index)
    }

    /// Keys in file order
    pub fn keys(&self) -> impl Iterator<Item = &IndexVector> {
        self.order.iter()
    }

    /// Entries in file order
    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.order.iter().map(|key| &self.entries[key])
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True when the catalog has no entries
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl fmt::Display for CardCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CardCatalog({} entries)", self.len())
    }
}


#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: CatalogEntry encode/decode roundtrip
        #[test]
        fn entry_roundtrip(
            values in prop::collection::vec(0.0..100.0f64, 1..8),
            start in 0u64..1_000_000,
            span in 1u64..1_000_000,
            sha in prop::array::uniform32(any::<u8>()),
        ) {
            let entry = CatalogEntry {
                index: IndexVector::new(&values, 8).unwrap(),
                byte_start: start,
                byte_end: start + span,
                sha256: sha,
            };

            let bytes = entry.to_bytes();
            let decoded = CatalogEntry::from_bytes(&bytes, values.len() as u16, 8).unwrap();

            prop_assert_eq!(&decoded.index, &entry.index);
            prop_assert_eq!(decoded.byte_start, entry.byte_start);
            prop_assert_eq!(decoded.byte_end, entry.byte_end);
            prop_assert_eq!(decoded.sha256, entry.sha256);
        }
    }
}
