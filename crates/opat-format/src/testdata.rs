//! Synthetic container builder for test suites
//!
//! Producing real OPAT files is the job of a separate program; this module
//! only assembles small, fully valid containers in memory so the reader and
//! the interpolation engine can be tested hermetically. It is also the
//! reference encoding of the layout in this repository: offsets, sizes, and
//! digests are computed exactly as the format chapter of the documentation
//! prescribes.
//!
//! Builders here panic on misuse (wrong dimension counts, ragged cell
//! blocks) instead of returning errors; they only ever run under test.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::card::{CardHeader, TableEntry, CARD_HEADER_SIZE};
use crate::catalog::CatalogEntry;
use crate::header::{pad_field, Header};
use opat_index::IndexVector;

/// One table to be written into a card
struct TableSpec {
    tag: String,
    row_name: String,
    column_name: String,
    row_values: Vec<f64>,
    column_values: Vec<f64>,
    data: Vec<f64>,
    vector_size: u64,
}

impl TableSpec {
    fn payload_size(&self) -> u64 {
        ((self.row_values.len() + self.column_values.len() + self.data.len()) * 8) as u64
    }
}

/// One card to be written into a file
pub struct CardSpec {
    values: Vec<f64>,
    comment: String,
    tables: Vec<TableSpec>,
}

impl CardSpec {
    /// Add a scalar table (one value per cell)
    ///
    /// `data` is row-major with `row_values.len() * column_values.len()`
    /// entries. Panics when the lengths disagree.
    pub fn table(
        &mut self,
        tag: &str,
        row_values: &[f64],
        column_values: &[f64],
        data: &[f64],
    ) -> &mut Self {
        self.vector_table(tag, row_values, column_values, data, 1)
    }

    /// Add a table with `vector_size` values per cell
    ///
    /// Panics when `data` is not `rows * cols * vector_size` values long.
    pub fn vector_table(
        &mut self,
        tag: &str,
        row_values: &[f64],
        column_values: &[f64],
        data: &[f64],
        vector_size: u64,
    ) -> &mut Self {
        assert_eq!(
            data.len() as u64,
            row_values.len() as u64 * column_values.len() as u64 * vector_size,
            "cell block length does not match {}x{}x{}",
            row_values.len(),
            column_values.len(),
            vector_size
        );
        self.tables.push(TableSpec {
            tag: tag.to_string(),
            row_name: "rows".to_string(),
            column_name: "cols".to_string(),
            row_values: row_values.to_vec(),
            column_values: column_values.to_vec(),
            data: data.to_vec(),
            vector_size,
        });
        self
    }

    /// Set the card's comment field
    pub fn comment(&mut self, comment: &str) -> &mut Self {
        self.comment = comment.to_string();
        self
    }

    fn encode(&self) -> Vec<u8> {
        let mut entries = Vec::with_capacity(self.tables.len());
        let mut cursor = CARD_HEADER_SIZE as u64;
        for table in &self.tables {
            entries.push(TableEntry {
                tag: pad_field(&table.tag),
                byte_start: cursor,
                byte_end: cursor + table.payload_size(),
                num_columns: table.column_values.len() as u16,
                num_rows: table.row_values.len() as u16,
                column_name: pad_field(&table.column_name),
                row_name: pad_field(&table.row_name),
                vector_size: table.vector_size,
            });
            cursor += table.payload_size();
        }

        let mut header = CardHeader::new(self.tables.len() as u32);
        header.index_offset = cursor;
        header.card_size = cursor + (self.tables.len() * TableEntry::SIZE) as u64;
        header.comment = pad_field(&self.comment);

        let mut bytes = Vec::with_capacity(header.card_size as usize);
        bytes.extend_from_slice(&header.to_bytes());
        for table in &self.tables {
            for value in table
                .row_values
                .iter()
                .chain(&table.column_values)
                .chain(&table.data)
            {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
        }
        for entry in &entries {
            bytes.extend_from_slice(&entry.to_bytes());
        }
        debug_assert_eq!(bytes.len() as u64, header.card_size);
        bytes
    }
}

/// Builds a complete OPAT byte stream card by card
pub struct FileBuilder {
    num_index: u16,
    precision: u8,
    source: String,
    comment: String,
    cards: Vec<CardSpec>,
}

impl FileBuilder {
    /// Start a file whose index vectors have `num_index` dimensions
    pub fn new(num_index: u16) -> Self {
        Self {
            num_index,
            precision: opat_index::DEFAULT_PRECISION,
            source: "opat-format testdata".to_string(),
            comment: String::new(),
            cards: Vec::new(),
        }
    }

    /// Set the hash precision recorded in the header
    pub fn precision(mut self, precision: u8) -> Self {
        self.precision = precision;
        self
    }

    /// Set the header's source-info field
    pub fn source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    /// Set the header's comment field
    pub fn comment(mut self, comment: &str) -> Self {
        self.comment = comment.to_string();
        self
    }

    /// Add a card keyed by `values`, returning it for table additions
    ///
    /// Panics when `values` has the wrong dimension count.
    pub fn card(&mut self, values: &[f64]) -> &mut CardSpec {
        assert_eq!(
            values.len(),
            self.num_index as usize,
            "card key has wrong dimension count"
        );
        // Catch keys that would collide in the catalog early.
        let key = IndexVector::new(values, self.precision).expect("invalid card key");
        for card in &self.cards {
            let existing = IndexVector::new(&card.values, self.precision).unwrap();
            assert_ne!(existing, key, "duplicate card key {key}");
        }
        self.cards.push(CardSpec {
            values: values.to_vec(),
            comment: String::new(),
            tables: Vec::new(),
        });
        self.cards.last_mut().unwrap()
    }

    /// Assemble the byte stream
    pub fn build(&self) -> Vec<u8> {
        let encoded: Vec<Vec<u8>> = self.cards.iter().map(CardSpec::encode).collect();

        let mut header = Header::new(self.cards.len() as u32, self.num_index, self.precision);
        header.creation_date = pad_field("2025-03-07 00:00");
        header.source_info = pad_field(&self.source);
        header.comment = pad_field(&self.comment);
        header.catalog_offset =
            (crate::HEADER_SIZE + encoded.iter().map(Vec::len).sum::<usize>()) as u64;

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&header.to_bytes());

        let mut entries = Vec::with_capacity(self.cards.len());
        for (card, card_bytes) in self.cards.iter().zip(&encoded) {
            let byte_start = bytes.len() as u64;
            bytes.extend_from_slice(card_bytes);
            let digest = Sha256::digest(card_bytes);
            entries.push(CatalogEntry {
                index: IndexVector::new(&card.values, self.precision).unwrap(),
                byte_start,
                byte_end: byte_start + card_bytes.len() as u64,
                sha256: digest.into(),
            });
        }
        for entry in &entries {
            bytes.extend_from_slice(&entry.to_bytes());
        }
        bytes
    }

    /// Assemble and write to `path`
    ///
    /// # Errors
    ///
    /// Any I/O failure writing the file.
    pub fn write_to(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        std::fs::write(path, self.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::HEADER_SIZE;

    #[test]
    fn test_layout_is_self_consistent() {
        let mut builder = FileBuilder::new(2);
        builder
            .card(&[0.2, 0.06])
            .table("data", &[1.0, 2.0], &[10.0, 20.0, 30.0], &[0.0; 6]);
        builder
            .card(&[0.35, 0.06])
            .table("data", &[1.0, 2.0], &[10.0, 20.0, 30.0], &[1.0; 6]);

        let bytes = builder.build();
        assert_eq!(&bytes[0..4], b"OPAT");

        let header = Header::from_bytes(bytes[..HEADER_SIZE].try_into().unwrap()).unwrap();
        assert_eq!(header.num_cards, 2);
        assert_eq!(header.num_index, 2);

        // Catalog sits after both cards, two entries of 64 bytes each
        let entry_size = CatalogEntry::disk_size(2);
        assert_eq!(
            bytes.len(),
            header.catalog_offset as usize + 2 * entry_size
        );

        // Digest in the first entry covers the first card's byte range
        let entry_bytes =
            &bytes[header.catalog_offset as usize..header.catalog_offset as usize + entry_size];
        let entry = CatalogEntry::from_bytes(entry_bytes, 2, 8).unwrap();
        let digest = Sha256::digest(&bytes[entry.byte_start as usize..entry.byte_end as usize]);
        assert_eq!(entry.sha256[..], digest[..]);
    }

    #[test]
    #[should_panic(expected = "duplicate card key")]
    fn test_rejects_duplicate_keys() {
        let mut builder = FileBuilder::new(1);
        builder.card(&[0.5]);
        builder.card(&[0.5]);
    }

    #[test]
    #[should_panic(expected = "cell block length")]
    fn test_rejects_ragged_cells() {
        let mut builder = FileBuilder::new(1);
        builder.card(&[0.5]).table("data", &[1.0], &[1.0], &[0.0, 1.0]);
    }
}
