//! OPAT file header (256 bytes, fixed)

use std::fmt;

use crate::{Error, Result};

/// Magic bytes: "OPAT"
pub const MAGIC: [u8; 4] = *b"OPAT";

/// Current format version
pub const VERSION: u16 = 1;

/// Header size in bytes
pub const HEADER_SIZE: usize = 256;

/// OPAT file header
///
/// Fixed 256-byte layout at offset 0, integers little-endian, text fields
/// ASCII and NUL-padded.
#[derive(Debug, Clone)]
pub struct Header {
    /// Magic bytes (must be "OPAT")
    pub magic: [u8; 4],
    /// Format version
    pub version: u16,
    /// Number of data cards in the file
    pub num_cards: u32,
    /// Size of this header in bytes (256 in v1)
    pub header_size: u32,
    /// Byte offset of the card catalog
    pub catalog_offset: u64,
    /// Creation timestamp, typically "YYYY-MM-DD HH:MM"
    pub creation_date: [u8; 16],
    /// Producing software or author
    pub source_info: [u8; 64],
    /// Free-form comment
    pub comment: [u8; 128],
    /// Dimensions of every index vector in the file
    pub num_index: u16,
    /// Decimal precision index vectors are hashed at
    pub hash_precision: u8,
}

impl Header {
    /// Create a header with the given card count and index geometry,
    /// remaining fields defaulted
    pub fn new(num_cards: u32, num_index: u16, hash_precision: u8) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            num_cards,
            header_size: HEADER_SIZE as u32,
            catalog_offset: 0,
            creation_date: [0u8; 16],
            source_info: [0u8; 64],
            comment: [0u8; 128],
            num_index,
            hash_precision,
        }
    }

    /// Validate structural invariants
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidMagic`] on wrong magic bytes
    /// - [`Error::UnsupportedVersion`] when the version is newer than this
    ///   reader
    /// - [`Error::InvalidFormat`] on impossible field values (zero index
    ///   dimensions, hash precision outside `1..=13`, mismatched header
    ///   size, a card count of zero alongside a nonzero catalog offset)
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(Error::InvalidMagic);
        }
        if self.version > VERSION {
            return Err(Error::UnsupportedVersion(self.version));
        }
        if self.header_size as usize != HEADER_SIZE {
            return Err(Error::InvalidFormat(format!(
                "header size {} does not match the v{} layout ({})",
                self.header_size, self.version, HEADER_SIZE
            )));
        }
        if self.num_index == 0 {
            return Err(Error::InvalidFormat(
                "index vectors cannot have zero dimensions".into(),
            ));
        }
        if self.hash_precision < 1 || self.hash_precision > 13 {
            return Err(Error::InvalidFormat(format!(
                "hash precision {} outside 1..=13",
                self.hash_precision
            )));
        }
        if self.num_cards == 0 && self.catalog_offset != 0 {
            return Err(Error::InvalidFormat(
                "catalog offset set but card count is zero".into(),
            ));
        }
        Ok(())
    }

    /// Serialize to the on-disk layout
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];

        buf[0..4].copy_from_slice(&self.magic);
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6..10].copy_from_slice(&self.num_cards.to_le_bytes());
        buf[10..14].copy_from_slice(&self.header_size.to_le_bytes());
        buf[14..22].copy_from_slice(&self.catalog_offset.to_le_bytes());
        buf[22..38].copy_from_slice(&self.creation_date);
        buf[38..102].copy_from_slice(&self.source_info);
        buf[102..230].copy_from_slice(&self.comment);
        buf[230..232].copy_from_slice(&self.num_index.to_le_bytes());
        buf[232] = self.hash_precision;
        // bytes 233-255 reserved

        buf
    }

    /// Deserialize from the on-disk layout and validate
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        let header = Self {
            magic: buf[0..4].try_into().unwrap(),
            version: u16::from_le_bytes(buf[4..6].try_into().unwrap()),
            num_cards: u32::from_le_bytes(buf[6..10].try_into().unwrap()),
            header_size: u32::from_le_bytes(buf[10..14].try_into().unwrap()),
            catalog_offset: u64::from_le_bytes(
                buf[14..22].try_into().unwrap(),
            ),
            creation_date: buf[22..38].try_into().unwrap(),
            source_info: buf[38..102].try_into().unwrap(),
            comment: buf[102..230].try_into().unwrap(),
            num_index: u16::from_le_bytes(buf[230..232].try_into().unwrap()),
            hash_precision: buf[232],
        };

        header.validate()?;
        Ok(header)
    }
}

/// ASCII text field with NUL padding stripped
pub(crate) fn ascii_field(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Copy a string into a fixed NUL-padded field, truncating if needed
pub(crate) fn pad_field<const N: usize>(text: &str) -> [u8; N] {
    let mut buf = [0u8; N];
    let bytes = text.as_bytes();
    let len = bytes.len().min(N);
    buf[..len].copy_from_slice(&bytes[..len]);
    buf
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Header(magic: {}, version: {}, cards: {}, catalog offset: {}, index dims: {}, hash precision: {})",
            String::from_utf8_lossy(&self.magic),
            self.version,
            self.num_cards,
            self.catalog_offset,
            self.num_index,
            self.hash_precision
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let mut header = Header::new(126, 2, 8);
        header.catalog_offset = 4096;
        header.creation_date = pad_field("2025-03-07 12:00");
        header.source_info = pad_field("unit test");

        let bytes = header.to_bytes();
        let parsed = Header::from_bytes(&bytes).unwrap();

        assert_eq!(parsed.magic, MAGIC);
        assert_eq!(parsed.version, VERSION);
        assert_eq!(parsed.num_cards, 126);
        assert_eq!(parsed.catalog_offset, 4096);
        assert_eq!(parsed.num_index, 2);
        assert_eq!(parsed.hash_precision, 8);
        assert_eq!(ascii_field(&parsed.creation_date), "2025-03-07 12:00");
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut header = Header::new(1, 2, 8);
        header.magic = *b"ELF\0";
        assert!(matches!(
            Header::from_bytes(&header.to_bytes()),
            Err(Error::InvalidMagic)
        ));
    }

    #[test]
    fn test_rejects_future_version() {
        let mut header = Header::new(1, 2, 8);
        header.version = VERSION + 1;
        assert!(matches!(
            Header::from_bytes(&header.to_bytes()),
            Err(Error::UnsupportedVersion(v)) if v == VERSION + 1
        ));
    }

    #[test]
    fn test_rejects_impossible_fields() {
        let mut header = Header::new(1, 0, 8);
        assert!(header.validate().is_err());

        header = Header::new(1, 2, 0);
        assert!(header.validate().is_err());
        header = Header::new(1, 2, 14);
        assert!(header.validate().is_err());

        header = Header::new(0, 2, 8);
        header.catalog_offset = 256;
        assert!(header.validate().is_err());
    }

    #[test]
    fn test_ascii_helpers() {
        let field: [u8; 8] = pad_field("data");
        assert_eq!(&field, b"data\0\0\0\0");
        assert_eq!(ascii_field(&field), "data");

        let overlong: [u8; 4] = pad_field("abcdef");
        assert_eq!(&overlong, b"abcd");
    }
}

#[cfg(test)]
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_header() -> impl Strategy<Value = Header> {
        (
            1u32..1_000_000,                     // num_cards
            any::<u64>(),                        // catalog_offset
            prop::array::uniform16(any::<u8>()), // creation_date
            1u16..=8,                            // num_index
            1u8..=13,                            // hash_precision
        )
            .prop_map(
                |(num_cards, catalog_offset, creation_date, num_index, hash_precision)| {
                    let mut header = Header::new(num_cards, num_index, hash_precision);
                    header.catalog_offset = catalog_offset;
                    header.creation_date = creation_date;
                    header
                },
            )
    }

    proptest! {
        /// Property: encode then decode recovers every header field
        #[test]
        fn header_roundtrip(header in arb_header()) {
            let bytes = header.to_bytes();
            let decoded = Header::from_bytes(&bytes).unwrap();

            prop_assert_eq!(decoded.magic, header.magic);
            prop_assert_eq!(decoded.version, header.version);
            prop_assert_eq!(decoded.num_cards, header.num_cards);
            prop_assert_eq!(decoded.catalog_offset, header.catalog_offset);
            prop_assert_eq!(decoded.creation_date, header.creation_date);
            prop_assert_eq!(decoded.num_index, header.num_index);
            prop_assert_eq!(decoded.hash_precision, header.hash_precision);
        }
    }
}
