//! Load unit metadata and builder.
//!
//! A load unit is two files: a metadata table (`magic: u64`, `version: u64`,
//! `asset_count: u64`, records) and a payload file of raw concatenated bytes
//! addressed by the records' offsets. The payload has no header.

use std::io::{Read, Write};

use mce_core::profiling::profile_function;

use crate::bstream::{
    BinaryReader, BinaryWriter, Decode, Encode, MalformedReason, StreamError, StreamResult,
};

use super::truncated;

/// Magic number of load unit metadata: the ASCII bytes `mceldunt`, little-endian.
pub const LOAD_UNIT_MAGIC: u64 = u64::from_le_bytes(*b"mceldunt");

/// Load unit version understood by this reader.
pub const LOAD_UNIT_VERSION: u64 = load_unit_version(0, 1);

/// Pack a `(major, minor)` pair into the 64-bit version tag.
pub const fn load_unit_version(major: u32, minor: u32) -> u64 {
    ((major as u64) << 32) | minor as u64
}

fn format_version(version: u64) -> String {
    format!("{}.{}", version >> 32, version & u64::from(u32::MAX))
}

/// One asset inside a load unit payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadUnitAssetMetaData {
    /// Offset into the payload file.
    pub offset: u64,
    /// Size in bytes.
    pub size: u64,
    /// Name relative to the load unit.
    pub name: String,
}

impl LoadUnitAssetMetaData {
    /// End offset in the payload, `None` on overflow.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.size)
    }
}

impl Encode for LoadUnitAssetMetaData {
    fn encode<W: Write>(&self, writer: &mut BinaryWriter<W>) -> StreamResult<()> {
        writer.write(&self.offset)?;
        writer.write(&self.size)?;
        writer.write(&self.name)
    }
}

impl Decode for LoadUnitAssetMetaData {
    fn decode<R: Read>(reader: &mut BinaryReader<R>) -> StreamResult<Self> {
        Ok(Self {
            offset: reader.read()?,
            size: reader.read()?,
            name: reader.read()?,
        })
    }
}

/// The asset table of a load unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadUnitMetaData {
    /// Assets in payload order. Readers never rely on the order.
    pub assets: Vec<LoadUnitAssetMetaData>,
}

impl Encode for LoadUnitMetaData {
    fn encode<W: Write>(&self, writer: &mut BinaryWriter<W>) -> StreamResult<()> {
        writer.write(&LOAD_UNIT_MAGIC)?;
        writer.write(&LOAD_UNIT_VERSION)?;
        writer.write(&self.assets)
    }
}

impl Decode for LoadUnitMetaData {
    fn decode<R: Read>(reader: &mut BinaryReader<R>) -> StreamResult<Self> {
        profile_function!();
        let magic: u64 = reader.read().map_err(truncated)?;
        if magic != LOAD_UNIT_MAGIC {
            return Err(StreamError::Malformed(MalformedReason::BadMagic {
                expected: LOAD_UNIT_MAGIC,
                found: magic,
            }));
        }

        let version: u64 = reader.read().map_err(truncated)?;
        if version != LOAD_UNIT_VERSION {
            return Err(StreamError::Malformed(MalformedReason::BadVersion {
                expected: format_version(LOAD_UNIT_VERSION),
                found: format_version(version),
            }));
        }

        let assets = reader.read().map_err(truncated)?;
        Ok(Self { assets })
    }
}

/// The two encoded files of a load unit.
#[derive(Debug, Clone, Default)]
pub struct LoadUnitFiles {
    /// Encoded [`LoadUnitMetaData`].
    pub metadata: Vec<u8>,
    /// Concatenated asset bytes.
    pub payload: Vec<u8>,
}

/// Produces load unit metadata/payload pairs.
#[derive(Default)]
pub struct LoadUnitBuilder {
    assets: Vec<(String, Vec<u8>)>,
}

impl LoadUnitBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an asset under a name relative to the unit.
    pub fn add(&mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> &mut Self {
        self.assets.push((name.into(), data.into()));
        self
    }

    /// Number of assets added so far.
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Whether no asset has been added.
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Encode the metadata table and payload.
    pub fn build(&self) -> StreamResult<LoadUnitFiles> {
        let mut payload = Vec::with_capacity(self.assets.iter().map(|(_, d)| d.len()).sum());
        let mut table = LoadUnitMetaData::default();
        for (name, data) in &self.assets {
            table.assets.push(LoadUnitAssetMetaData {
                offset: payload.len() as u64,
                size: data.len() as u64,
                name: name.clone(),
            });
            payload.extend_from_slice(data);
        }

        let mut writer = BinaryWriter::new(Vec::new());
        writer.write(&table)?;
        Ok(LoadUnitFiles {
            metadata: writer.into_inner(),
            payload,
        })
    }
}
