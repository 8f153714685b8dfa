//! Data cards: card header, per-card table index, and the card itself

use std::collections::HashMap;
use std::fmt;

use crate::header::ascii_field;
use crate::table::Table;
use crate::{Error, Result};

/// Card magic bytes: "CARD"
pub const CARD_MAGIC: [u8; 4] = *b"CARD";

/// Data card header (256 bytes, fixed)
///
/// Same padding discipline as the file header; `index_offset` and every
/// table offset inside the card are relative to the card's first byte.
#[derive(Debug, Clone)]
pub struct CardHeader {
    /// Magic bytes (must be "CARD")
    pub magic: [u8; 4],
    /// Number of tables in the card
    pub num_tables: u32,
    /// Size of this header in bytes (256 in v1)
    pub header_size: u32,
    /// Card-relative offset of the table index
    pub index_offset: u64,
    /// Total card size in bytes
    pub card_size: u64,
    /// Free-form comment
    pub comment: [u8; 128],
}

/// Card header size in bytes
pub const CARD_HEADER_SIZE: usize = 256;

impl CardHeader {
    /// Create a card header with defaults
    pub fn new(num_tables: u32) -> Self {
        Self {
            magic: CARD_MAGIC,
            num_tables,
            header_size: CARD_HEADER_SIZE as u32,
            index_offset: 0,
            card_size: 0,
            comment: [0u8; 128],
        }
    }

    /// Validate structural invariants
    ///
    /// # Errors
    ///
    /// [`Error::InvalidMagic`] on wrong magic, [`Error::InvalidFormat`] when
    /// the header size disagrees with the layout.
    pub fn validate(&self) -> Result<()> {
        if self.magic != CARD_MAGIC {
            return Err(Error::InvalidMagic);
        }
        if self.header_size as usize != CARD_HEADER_SIZE {
            return Err(Error::InvalidFormat(format!(
                "card header size {} does not match the layout ({})",
                self.header_size, CARD_HEADER_SIZE
            )));
        }
        Ok(())
    }

    /// Serialize to the on-disk layout
    pub fn to_bytes(&self) -> [u8; CARD_HEADER_SIZE] {
        let mut buf = [0u8; CARD_HEADER_SIZE];

        buf[0..4].copy_from_slice(&self.magic);
        buf[4..8].copy_from_slice(&self.num_tables.to_le_bytes());
        buf[8..12].copy_from_slice(&self.header_size.to_le_bytes());
        buf[12..20].copy_from_slice(&self.index_offset.to_le_bytes());
        buf[20..28].copy_from_slice(&self.card_size.to_le_bytes());
        buf[28..156].copy_from_slice(&self.comment);
        // bytes 156-255 reserved

        buf
    }

    /// Deserialize from the on-disk layout and validate
    pub fn from_bytes(buf: &[u8; CARD_HEADER_SIZE]) -> Result<Self> {
        let header = Self {
            magic: buf[0..4].try_into().unwrap(),
            num_tables: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            header_size: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            index_offset: u64::from_le_bytes(buf[12..20].try_into().unwrap()),
            card_size: u64::from_le_bytes(buf[20..28].try_into().unwrap()),
            comment: buf[28..156].try_into().unwrap(),
        };

        header.validate()?;
        Ok(header)
    }
}

impl fmt::Display for CardHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CardHeader(tables: {}, index offset: {}, size: {}, comment: {:?})",
            self.num_tables,
            self.index_offset,
            self.card_size,
            ascii_field(&self.comment)
        )
    }
}

/// Table index entry (64 bytes, fixed)
///
/// Offsets are relative to the owning card's first byte. The 8-byte tag is
/// NUL-padded ASCII.
#[derive(Debug, Clone, Copy)]
pub struct TableEntry {
    /// Table tag, NUL-padded
    pub tag: [u8; 8],
    /// Card-relative offset of the table payload
    pub byte_start: u64,
    /// Card-relative offset one past the payload
    pub byte_end: u64,
    /// Number of columns
    pub num_columns: u16,
    /// Number of rows
    pub num_rows: u16,
    /// Column axis name, NUL-padded
    pub column_name: [u8; 8],
    /// Row axis name, NUL-padded
    pub row_name: [u8; 8],
    /// Values per cell (1 for scalar tables)
    pub vector_size: u64,
}

impl TableEntry {
    /// Size of a table index entry in bytes
    pub const SIZE: usize = 64;

    /// Tag with NUL padding stripped
    pub fn tag_str(&self) -> String {
        ascii_field(&self.tag)
    }

    /// Cells in the table payload (`rows * cols * vector_size`)
    pub fn cell_count(&self) -> usize {
        self.num_rows as usize * self.num_columns as usize * self.vector_size as usize
    }

    /// Serialize to bytes (little-endian)
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.tag);
        buf[8..16].copy_from_slice(&self.byte_start.to_le_bytes());
        buf[16..24].copy_from_slice(&self.byte_end.to_le_bytes());
        buf[24..26].copy_from_slice(&self.num_columns.to_le_bytes());
        buf[26..28].copy_from_slice(&self.num_rows.to_le_bytes());
        buf[28..36].copy_from_slice(&self.column_name);
        buf[36..44].copy_from_slice(&self.row_name);
        buf[44..52].copy_from_slice(&self.vector_size.to_le_bytes());
        // bytes 52-63 reserved
        buf
    }

    /// Deserialize from bytes (little-endian)
    ///
    /// # Errors
    ///
    /// [`Error::InvalidFormat`] when the byte range is reversed or the cell
    /// vector size is zero.
    pub fn from_bytes(buf: &[u8; Self::SIZE]) -> Result<Self> {
        let entry = Self {
            tag: buf[0..8].try_into().unwrap(),
            byte_start: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            byte_end: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
            num_columns: u16::from_le_bytes(buf[24..26].try_into().unwrap()),
            num_rows: u16::from_le_bytes(buf[26..28].try_into().unwrap()),
            column_name: buf[28..36].try_into().unwrap(),
            row_name: buf[36..44].try_into().unwrap(),
            vector_size: u64::from_le_bytes(buf[44..52].try_into().unwrap()),
        };

        if entry.byte_start >= entry.byte_end {
            return Err(Error::InvalidFormat(format!(
                "table entry {:?} byte range reversed: {}..{}",
                entry.tag_str(),
                entry.byte_start,
                entry.byte_end
            )));
        }
        if entry.vector_size == 0 {
            return Err(Error::InvalidFormat(format!(
                "table entry {:?} has zero vector size",
                entry.tag_str()
            )));
        }
        Ok(entry)
    }
}

impl fmt::Display for TableEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TableEntry(tag: {:?}, bytes: {}..{}, rows: {}, cols: {}, vector size: {})",
            self.tag_str(),
            self.byte_start,
            self.byte_end,
            self.num_rows,
            self.num_columns,
            self.vector_size
        )
    }
}

/// Per-card table index in discovery order
#[derive(Debug, Clone, Default)]
pub struct TableIndex {
    order: Vec<String>,
    entries: HashMap<String, TableEntry>,
}

impl TableIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry under its tag, rejecting duplicates
    ///
    /// # Errors
    ///
    /// [`Error::InvalidFormat`] when the tag is already present.
    pub fn insert(&mut self, entry: TableEntry) -> Result<()> {
        let tag = entry.tag_str();
        if self.entries.contains_key(&tag) {
            return Err(Error::InvalidFormat(format!("duplicate table tag {tag:?}")));
        }
        self.order.push(tag.clone());
        self.entries.insert(tag, entry);
        Ok(())
    }

    /// Entry for a tag
    ///
    /// # Errors
    ///
    /// [`Error::TableNotFound`] when the tag is absent.
    pub fn get(&self, tag: &str) -> Result<&TableEntry> {
        self.entries
            .get(tag)
            .ok_or_else(|| Error::TableNotFound(tag.to_string()))
    }

    /// Tags in discovery order
    pub fn tags(&self) -> &[String] {
        &self.order
    }

    /// Entries in discovery order
    pub fn iter(&self) -> impl Iterator<Item = &TableEntry> {
        self.order.iter().map(|tag| &self.entries[tag])
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True when the index has no entries
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl fmt::Display for TableIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in self.iter() {
            writeln!(f, "{entry}")?;
        }
        Ok(())
    }
}

/// A data card: one bundle of tables sharing a parameter vector
#[derive(Debug, Clone)]
pub struct DataCard {
    header: CardHeader,
    index: TableIndex,
    tables: HashMap<String, Table>,
}

impl DataCard {
    /// Assemble a card from parts, checking every indexed table is present
    /// with the dimensions its entry declares
    ///
    /// # Errors
    ///
    /// [`Error::TableNotFound`] for an indexed tag with no table,
    /// [`Error::InvalidFormat`] on a dimension mismatch.
    pub fn from_parts(
        header: CardHeader,
        index: TableIndex,
        tables: HashMap<String, Table>,
    ) -> Result<Self> {
        for entry in index.iter() {
            let tag = entry.tag_str();
            let table = tables
                .get(&tag)
                .ok_or_else(|| Error::TableNotFound(tag.clone()))?;
            if table.num_rows() != entry.num_rows as usize
                || table.num_cols() != entry.num_columns as usize
                || table.vector_size() != entry.vector_size as usize
            {
                return Err(Error::InvalidFormat(format!(
                    "table {:?} is {}x{}x{} but its index entry declares {}x{}x{}",
                    tag,
                    table.num_rows(),
                    table.num_cols(),
                    table.vector_size(),
                    entry.num_rows,
                    entry.num_columns,
                    entry.vector_size
                )));
            }
        }
        Ok(Self {
            header,
            index,
            tables,
        })
    }

    /// The card's header
    pub fn header(&self) -> &CardHeader {
        &self.header
    }

    /// The card's table index
    pub fn index(&self) -> &TableIndex {
        &self.index
    }

    /// Table for a tag
    ///
    /// # Errors
    ///
    /// [`Error::TableNotFound`] when the tag is absent.
    pub fn get(&self, tag: &str) -> Result<&Table> {
        self.tables
            .get(tag)
            .ok_or_else(|| Error::TableNotFound(tag.to_string()))
    }

    /// Tags in discovery order
    pub fn tags(&self) -> &[String] {
        self.index.tags()
    }
}

impl fmt::Display for DataCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataCard({}, {} tables)", self.header, self.tables.len())
    }
}


#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_entry() -> impl Strategy<Value = TableEntry> {
        (
            "[a-z]{1,8}",
            0u64..1_000_000,
            1u64..1_000_000,
            1u16..200,
            1u16..200,
            1u64..4,
        )
            .prop_map(|(tag, start, span, cols, rows, vsize)| TableEntry {
                tag: crate::header::pad_field(&tag),
                byte_start: start,
                byte_end: start + span,
                num_columns: cols,
                num_rows: rows,
                column_name: crate::header::pad_field("logT"),
                row_name: crate::header::pad_field("logR"),
                vector_size: vsize,
            })
    }

    proptest! {
        /// Property: TableEntry encode/decode roundtrip
        #[test]
        fn table_entry_roundtrip(entry in arb_entry()) {
            let bytes = entry.to_bytes();
            let decoded = TableEntry::from_bytes(&bytes).unwrap();

            prop_assert_eq!(decoded.tag, entry.tag);
            prop_assert_eq!(decoded.byte_start, entry.byte_start);
            prop_assert_eq!(decoded.byte_end, entry.byte_end);
            prop_assert_eq!(decoded.num_columns, entry.num_columns);
            prop_assert_eq!(decoded.num_rows, entry.num_rows);
            prop_assert_eq!(decoded.vector_size, entry.vector_size);
        }
    }
}
