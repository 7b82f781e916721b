//! Pack file ("archive") metadata and builder.
//!
//! Layout: `magic: u64`, `version: [u8; 3]`, `element_count: u64`, then one
//! record per element. Element offsets are absolute offsets into the pack
//! file; payload bytes follow the table.

use std::io::{Read, Write};

use mce_core::profiling::profile_function;

use crate::bstream::{
    BinaryReader, BinaryWriter, Decode, Encode, MalformedReason, StreamError, StreamResult,
};

use super::truncated;

/// Magic number at the start of every pack file.
pub const PACK_FILE_MAGIC: u64 = 0x4D43_4550_5342_2015;

/// Pack file version understood by this reader.
pub const PACK_FILE_VERSION: [u8; 3] = [0, 2, 0];

/// Encoded size of a record without its name bytes.
const ELEMENT_FIXED_LEN: u64 = 8 + 8 + 8 + 8;

/// Encoded size of the header without any records.
const HEADER_FIXED_LEN: u64 = 8 + 3 + 8;

/// One named byte range inside a pack file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackFileElementMetaData {
    /// Absolute offset of the stored bytes.
    pub offset: u64,
    /// Uncompressed size.
    pub size: u64,
    /// Stored size when compressed, `0` when stored as-is.
    pub compressed_size: u64,
    /// Logical name, `/`-separated.
    pub name: String,
}

impl PackFileElementMetaData {
    /// Whether the stored bytes are LZ4 compressed.
    pub fn is_compressed(&self) -> bool {
        self.compressed_size != 0
    }

    /// Number of bytes occupied in the pack file.
    pub fn stored_size(&self) -> u64 {
        if self.is_compressed() {
            self.compressed_size
        } else {
            self.size
        }
    }

    /// End offset of the stored bytes, `None` on overflow.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.stored_size())
    }

    fn encoded_len(&self) -> u64 {
        ELEMENT_FIXED_LEN + self.name.len() as u64
    }
}

impl Encode for PackFileElementMetaData {
    fn encode<W: Write>(&self, writer: &mut BinaryWriter<W>) -> StreamResult<()> {
        writer.write(&self.offset)?;
        writer.write(&self.size)?;
        writer.write(&self.compressed_size)?;
        writer.write(&self.name)
    }
}

impl Decode for PackFileElementMetaData {
    fn decode<R: Read>(reader: &mut BinaryReader<R>) -> StreamResult<Self> {
        Ok(Self {
            offset: reader.read()?,
            size: reader.read()?,
            compressed_size: reader.read()?,
            name: reader.read()?,
        })
    }
}

/// The element table at the start of a pack file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackFileMetaData {
    /// Elements in file order. Readers never rely on the order.
    pub elements: Vec<PackFileElementMetaData>,
}

impl PackFileMetaData {
    /// Encoded size of the header plus table.
    pub fn encoded_len(&self) -> u64 {
        HEADER_FIXED_LEN
            + self
                .elements
                .iter()
                .map(PackFileElementMetaData::encoded_len)
                .sum::<u64>()
    }

    /// Find an element by name.
    pub fn find(&self, name: &str) -> Option<&PackFileElementMetaData> {
        self.elements.iter().find(|e| e.name == name)
    }
}

impl Encode for PackFileMetaData {
    fn encode<W: Write>(&self, writer: &mut BinaryWriter<W>) -> StreamResult<()> {
        writer.write(&PACK_FILE_MAGIC)?;
        writer.write(&PACK_FILE_VERSION)?;
        writer.write(&self.elements)
    }
}

impl Decode for PackFileMetaData {
    fn decode<R: Read>(reader: &mut BinaryReader<R>) -> StreamResult<Self> {
        profile_function!();
        let magic: u64 = reader.read().map_err(truncated)?;
        if magic != PACK_FILE_MAGIC {
            return Err(StreamError::Malformed(MalformedReason::BadMagic {
                expected: PACK_FILE_MAGIC,
                found: magic,
            }));
        }

        let version: [u8; 3] = reader.read().map_err(truncated)?;
        if version != PACK_FILE_VERSION {
            return Err(StreamError::Malformed(MalformedReason::BadVersion {
                expected: format_version(PACK_FILE_VERSION),
                found: format_version(version),
            }));
        }

        let elements = reader.read().map_err(truncated)?;
        Ok(Self { elements })
    }
}

fn format_version(version: [u8; 3]) -> String {
    format!("{}.{}.{}", version[0], version[1], version[2])
}

struct PendingElement {
    name: String,
    data: Vec<u8>,
    compress: bool,
}

/// Produces pack files readable by [`PackFileReader`](crate::io::PackFileReader).
///
/// ```
/// use mce_assets::format::PackFileBuilder;
///
/// let mut builder = PackFileBuilder::new();
/// builder.add("shaders/basic.vert", b"void main() {}".to_vec());
/// let bytes = builder.build().unwrap();
/// assert!(!bytes.is_empty());
/// ```
#[derive(Default)]
pub struct PackFileBuilder {
    pending: Vec<PendingElement>,
}

impl PackFileBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element stored as-is.
    pub fn add(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> &mut Self {
        self.pending.push(PendingElement {
            name: name.into(),
            data: data.into(),
            compress: false,
        });
        self
    }

    /// Add an element stored LZ4 compressed when that makes it smaller.
    pub fn add_compressed(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> &mut Self {
        self.pending.push(PendingElement {
            name: name.into(),
            data: data.into(),
            compress: true,
        });
        self
    }

    /// Number of elements added so far.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no element has been added.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Write the complete pack file into `sink`, returning the bytes written.
    pub fn write_to<W: Write>(&self, sink: W) -> StreamResult<u64> {
        profile_function!();
        let mut stored: Vec<(PackFileElementMetaData, std::borrow::Cow<'_, [u8]>)> =
            Vec::with_capacity(self.pending.len());

        for element in &self.pending {
            let compressed = element
                .compress
                .then(|| lz4_flex::block::compress(&element.data))
                .filter(|c| !c.is_empty() && c.len() < element.data.len());
            let (compressed_size, bytes) = match compressed {
                Some(c) => (c.len() as u64, std::borrow::Cow::Owned(c)),
                None => (0, std::borrow::Cow::Borrowed(element.data.as_slice())),
            };
            stored.push((
                PackFileElementMetaData {
                    offset: 0,
                    size: element.data.len() as u64,
                    compressed_size,
                    name: element.name.clone(),
                },
                bytes,
            ));
        }

        let mut table = PackFileMetaData {
            elements: stored.iter().map(|(meta, _)| meta.clone()).collect(),
        };
        let mut offset = table.encoded_len();
        for meta in &mut table.elements {
            meta.offset = offset;
            offset += meta.stored_size();
        }

        let mut writer = BinaryWriter::new(sink);
        writer.write(&table)?;
        if writer.position() != table.encoded_len() {
            return Err(StreamError::invalid("pack header length mismatch"));
        }
        for (_, bytes) in &stored {
            writer.write_bytes(bytes)?;
        }
        writer.flush()?;
        Ok(writer.position())
    }

    /// Build the complete pack file in memory.
    pub fn build(&self) -> StreamResult<Vec<u8>> {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes)?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bstream::{StreamErrorKind, from_bytes, to_bytes};

    fn sample_table() -> PackFileMetaData {
        PackFileMetaData {
            elements: vec![
                PackFileElementMetaData {
                    offset: 100,
                    size: 50,
                    compressed_size: 0,
                    name: "foo.png".to_string(),
                },
                PackFileElementMetaData {
                    offset: 150,
                    size: 4096,
                    compressed_size: 312,
                    name: "models/cube".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_element_round_trip() {
        let element = PackFileElementMetaData {
            offset: 100,
            size: 50,
            compressed_size: 0,
            name: "foo.png".to_string(),
        };
        let bytes = to_bytes(&element).unwrap();
        let decoded: PackFileElementMetaData = from_bytes(&bytes).unwrap();
        assert_eq!(decoded, element);
        assert_eq!(decoded.offset, 100);
        assert_eq!(decoded.size, 50);
        assert_eq!(decoded.compressed_size, 0);
        assert_eq!(decoded.name, "foo.png");
    }

    #[test]
    fn test_table_round_trip_and_length() {
        let table = sample_table();
        let bytes = to_bytes(&table).unwrap();
        assert_eq!(bytes.len() as u64, table.encoded_len());
        let decoded: PackFileMetaData = from_bytes(&bytes).unwrap();
        assert_eq!(decoded, table);
    }

    #[test]
    fn test_header_layout() {
        let bytes = to_bytes(&PackFileMetaData::default()).unwrap();
        assert_eq!(&bytes[..8], &PACK_FILE_MAGIC.to_le_bytes());
        assert_eq!(&bytes[8..11], &[0, 2, 0]);
        assert_eq!(&bytes[11..19], &0u64.to_le_bytes());
    }

    #[test]
    fn test_flipped_magic_bit_is_rejected() {
        let mut bytes = to_bytes(&sample_table()).unwrap();
        bytes[3] ^= 0x10;

        let mut reader = BinaryReader::new(&bytes[..]);
        let mut out = PackFileMetaData::default();
        let err = reader.read_into(&mut out).unwrap_err();
        assert!(matches!(
            err.malformed_reason(),
            Some(MalformedReason::BadMagic { .. })
        ));
        assert!(reader.is_invalid());
        assert!(out.elements.is_empty());
    }

    #[test]
    fn test_version_mismatch_is_rejected() {
        let mut bytes = to_bytes(&sample_table()).unwrap();
        bytes[9] = 3;

        let mut reader = BinaryReader::new(&bytes[..]);
        let err = reader.read::<PackFileMetaData>().unwrap_err();
        match err.malformed_reason() {
            Some(MalformedReason::BadVersion { expected, found }) => {
                assert_eq!(expected, "0.2.0");
                assert_eq!(found, "0.3.0");
            }
            other => panic!("unexpected reason: {:?}", other),
        }
        assert!(reader.is_invalid());
    }

    #[test]
    fn test_truncated_table() {
        let bytes = to_bytes(&sample_table()).unwrap();
        let cut = &bytes[..bytes.len() - 3];
        let mut reader = BinaryReader::new(cut);
        let err = reader.read::<PackFileMetaData>().unwrap_err();
        assert_eq!(err.kind(), StreamErrorKind::Malformed);
        assert_eq!(err.malformed_reason(), Some(&MalformedReason::Truncated));
        assert!(reader.is_eof());
        assert!(reader.is_invalid());
    }

    #[test]
    fn test_builder_offsets_are_absolute() {
        let mut builder = PackFileBuilder::new();
        builder.add("a", b"first".to_vec());
        builder.add("b/c", b"second!".to_vec());
        let bytes = builder.build().unwrap();

        let table: PackFileMetaData = from_bytes(&bytes).unwrap();
        for (name, expected) in [("a", &b"first"[..]), ("b/c", &b"second!"[..])] {
            let element = table.find(name).unwrap();
            let start = element.offset as usize;
            let end = element.end().unwrap() as usize;
            assert_eq!(&bytes[start..end], expected);
        }
        assert_eq!(table.find("a").unwrap().offset, table.encoded_len());
    }

    #[test]
    fn test_builder_skips_compression_that_does_not_help() {
        let mut builder = PackFileBuilder::new();
        builder.add_compressed("tiny", vec![1u8, 2, 3]);
        builder.add_compressed("zeros", vec![0u8; 8192]);
        let bytes = builder.build().unwrap();

        let table: PackFileMetaData = from_bytes(&bytes).unwrap();
        assert!(!table.find("tiny").unwrap().is_compressed());
        let zeros = table.find("zeros").unwrap();
        assert!(zeros.is_compressed());
        assert!(zeros.compressed_size < zeros.size);
    }
}
