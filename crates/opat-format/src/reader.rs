//! Eager parser for the OPAT container

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use memmap2::Mmap;
use tracing::{debug, trace};

use crate::card::{CardHeader, DataCard, TableEntry, TableIndex, CARD_HEADER_SIZE};
use crate::catalog::{CardCatalog, CatalogEntry};
use crate::header::{Header, HEADER_SIZE, MAGIC};
use crate::model::{Bounds, Opat};
use crate::table::Table;
use crate::{Error, Result};

/// Cheap probe: does the file start with the OPAT magic bytes?
///
/// Returns `false` for unreadable or short files rather than erroring; use
/// [`Opat::open`] for diagnostics.
pub fn has_magic(path: impl AsRef<Path>) -> bool {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(_) => return false,
    };
    let mut magic = [0u8; 4];
    match file.read_exact(&mut magic) {
        Ok(()) => magic == MAGIC,
        Err(_) => false,
    }
}

/// A bounds-checked view of `len` bytes at `offset`
fn take<'a>(bytes: &'a [u8], offset: usize, len: usize, what: &'static str) -> Result<&'a [u8]> {
    let end = offset.checked_add(len).ok_or(Error::Truncated {
        what,
        needed: len,
        offset,
        available: bytes.len(),
    })?;
    if end > bytes.len() {
        return Err(Error::Truncated {
            what,
            needed: len,
            offset,
            available: bytes.len(),
        });
    }
    Ok(&bytes[offset..end])
}

/// `count` little-endian doubles at `offset`
fn read_f64s(bytes: &[u8], offset: usize, count: usize, what: &'static str) -> Result<Vec<f64>> {
    let raw = take(bytes, offset, count * 8, what)?;
    Ok(raw
        .chunks_exact(8)
        .map(|chunk| f64::from_le_bytes(chunk.try_into().unwrap()))
        .collect())
}

fn to_usize(value: u64, what: &'static str) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| Error::InvalidFormat(format!("{what} {value} does not fit in memory")))
}

pub(crate) fn read(path: &Path) -> Result<Opat> {
    let file = File::open(path)?;
    // SAFETY: the file handle was just opened and stays alive inside the
    // returned Opat together with the map. The mapping is read-only, so
    // external modification can at worst surface stale data.
    let mmap = unsafe { Mmap::map(&file)? };
    debug!(path = %path.display(), bytes = mmap.len(), "opening container");

    let header_bytes = take(&mmap, 0, HEADER_SIZE, "file header")?;
    let header = Header::from_bytes(header_bytes.try_into().unwrap())?;

    let catalog = read_catalog(&mmap, &header)?;

    let mut cards = HashMap::with_capacity(catalog.len());
    for entry in catalog.iter() {
        let card = read_card(&mmap, entry)?;
        trace!(index = %entry.index, tables = card.tags().len(), "card parsed");
        cards.insert(entry.index.clone(), card);
    }

    let mut bounds = vec![Bounds::new(); header.num_index as usize];
    for key in catalog.keys() {
        for (dim, &value) in key.values().iter().enumerate() {
            bounds[dim].expand(value);
        }
    }

    debug!(cards = cards.len(), num_index = header.num_index, "container loaded");
    Ok(Opat {
        header,
        catalog,
        cards,
        bounds,
        mmap,
    })
}

fn read_catalog(data: &[u8], header: &Header) -> Result<CardCatalog> {
    let entry_size = CatalogEntry::disk_size(header.num_index);
    let catalog_offset = to_usize(header.catalog_offset, "catalog offset")?;

    let mut catalog = CardCatalog::new();
    for i in 0..header.num_cards as usize {
        let offset = catalog_offset + i * entry_size;
        let bytes = take(data, offset, entry_size, "catalog entry")?;
        let entry = CatalogEntry::from_bytes(bytes, header.num_index, header.hash_precision)?;

        if to_usize(entry.byte_end, "card end offset")? > data.len() {
            return Err(Error::Truncated {
                what: "data card",
                needed: (entry.byte_end - entry.byte_start) as usize,
                offset: entry.byte_start as usize,
                available: data.len(),
            });
        }
        catalog.insert(entry)?;
    }
    Ok(catalog)
}

fn read_card(data: &[u8], entry: &CatalogEntry) -> Result<DataCard> {
    // Offsets inside the card are card-relative; work on its byte range.
    let card_bytes = &data[entry.byte_start as usize..entry.byte_end as usize];

    let header_bytes = take(card_bytes, 0, CARD_HEADER_SIZE, "card header")?;
    let card_header = CardHeader::from_bytes(header_bytes.try_into().unwrap())?;
    if card_header.card_size as usize != card_bytes.len() {
        return Err(Error::InvalidFormat(format!(
            "card at {} declares {} bytes but the catalog gives it {}",
            entry.byte_start,
            card_header.card_size,
            card_bytes.len()
        )));
    }

    let index_offset = to_usize(card_header.index_offset, "table index offset")?;
    let mut table_index = TableIndex::new();
    for i in 0..card_header.num_tables as usize {
        let offset = index_offset + i * TableEntry::SIZE;
        let bytes = take(card_bytes, offset, TableEntry::SIZE, "table index entry")?;
        table_index.insert(TableEntry::from_bytes(bytes.try_into().unwrap())?)?;
    }

    let mut tables = HashMap::with_capacity(table_index.len());
    for table_entry in table_index.iter() {
        tables.insert(table_entry.tag_str(), read_table(card_bytes, table_entry)?);
    }

    DataCard::from_parts(card_header, table_index, tables)
}

fn read_table(card_bytes: &[u8], entry: &TableEntry) -> Result<Table> {
    let rows = entry.num_rows as usize;
    let cols = entry.num_columns as usize;
    let cells = entry.cell_count();

    let declared = (entry.byte_end - entry.byte_start) as usize;
    let expected = (rows + cols + cells) * 8;
    if declared != expected {
        return Err(Error::InvalidFormat(format!(
            "table {:?} spans {} bytes but its axes and cells need {}",
            entry.tag_str(),
            declared,
            expected
        )));
    }

    let start = to_usize(entry.byte_start, "table offset")?;
    let row_values = read_f64s(card_bytes, start, rows, "table row axis")?;
    let column_values = read_f64s(card_bytes, start + rows * 8, cols, "table column axis")?;
    let data = read_f64s(card_bytes, start + (rows + cols) * 8, cells, "table cells")?;

    Table::new(
        row_values,
        column_values,
        data,
        entry.vector_size as usize,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_bounds() {
        let bytes = [0u8; 16];
        assert!(take(&bytes, 0, 16, "x").is_ok());
        assert!(take(&bytes, 8, 8, "x").is_ok());
        assert!(matches!(
            take(&bytes, 8, 9, "x"),
            Err(Error::Truncated { .. })
        ));
        assert!(matches!(
            take(&bytes, usize::MAX, 2, "x"),
            Err(Error::Truncated { .. })
        ));
    }

    #[test]
    fn test_read_f64s() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1.5f64.to_le_bytes());
        bytes.extend_from_slice(&(-2.5f64).to_le_bytes());

        let values = read_f64s(&bytes, 0, 2, "x").unwrap();
        assert_eq!(values, vec![1.5, -2.5]);
        assert!(read_f64s(&bytes, 0, 3, "x").is_err());
    }
}
