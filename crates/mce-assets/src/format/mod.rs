//! On-disk metadata tables for pack files and load units.
//!
//! Both formats start with a fixed magic number and a version tag that must
//! match the constants compiled into this crate exactly. No forward or
//! backward compatibility is attempted.

mod load_unit;
mod pack;

pub use load_unit::{
    LOAD_UNIT_MAGIC, LOAD_UNIT_VERSION, LoadUnitAssetMetaData, LoadUnitBuilder, LoadUnitFiles,
    LoadUnitMetaData, load_unit_version,
};
pub use pack::{
    PACK_FILE_MAGIC, PACK_FILE_VERSION, PackFileBuilder, PackFileElementMetaData, PackFileMetaData,
};

use crate::bstream::{MalformedReason, StreamError};

/// Inside a header, running out of data means the table is truncated.
pub(crate) fn truncated(err: StreamError) -> StreamError {
    match err {
        StreamError::Eof => StreamError::Malformed(MalformedReason::Truncated),
        other => other,
    }
}
