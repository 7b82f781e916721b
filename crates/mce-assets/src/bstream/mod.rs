//! Binary codec used by every on-disk table.
//!
//! The codec reads and writes little-endian fixed-width integers and floats,
//! `u64`-length-prefixed strings, `u64`-count-prefixed sequences and
//! fixed-size arrays. Each stream records sticky soft-error bits
//! ([`StreamState`]) in addition to returning a [`StreamResult`] per
//! operation, so callers can either propagate with `?` or check
//! [`BinaryReader::is_ok`] after a batch of operations.
//!
//! Format validation (magic/version) is reported as
//! [`StreamError::Malformed`], which also raises the `INVALID` bit.

mod error;
mod reader;
mod writer;

pub use error::{MalformedReason, StreamError, StreamErrorKind, StreamResult, StreamState};
pub use reader::{BinaryReader, DEFAULT_MAX_CONTAINER_LEN, DEFAULT_MAX_STRING_LEN, Decode};
pub use writer::{BinaryWriter, Encode};

/// Encode a value into a fresh byte vector.
pub fn to_bytes<T: Encode + ?Sized>(value: &T) -> StreamResult<Vec<u8>> {
    let mut writer = BinaryWriter::new(Vec::new());
    writer.write(value)?;
    Ok(writer.into_inner())
}

/// Decode a value from a byte slice, ignoring any trailing bytes.
pub fn from_bytes<T: Decode>(bytes: &[u8]) -> StreamResult<T> {
    BinaryReader::new(bytes).read()
}
