//! Typed sequential reader.

use std::io::Read;

use super::error::{StreamError, StreamResult, StreamState};

/// Upper bound on speculative preallocation for decoded containers.
///
/// Containers larger than this grow as data actually arrives, so a corrupt
/// count on a short stream ends in `Eof` instead of a huge allocation.
const PREALLOC_LIMIT: usize = 64 * 1024;

/// Default container limit: the largest allocation a `Vec` may describe.
pub const DEFAULT_MAX_CONTAINER_LEN: usize = isize::MAX as usize;

/// Default byte limit for a decoded string.
pub const DEFAULT_MAX_STRING_LEN: usize = isize::MAX as usize;

/// A value that can be decoded from a [`BinaryReader`].
pub trait Decode: Sized {
    /// Decode one value, advancing the reader.
    fn decode<R: Read>(reader: &mut BinaryReader<R>) -> StreamResult<Self>;
}

/// Sequential little-endian reader over any byte source.
///
/// Every operation returns a [`StreamResult`]; failures also raise sticky
/// [`StreamState`] bits so a caller can run a sequence of reads and check
/// [`is_ok`](Self::is_ok) once at the end.
///
/// ```
/// use mce_assets::bstream::BinaryReader;
///
/// let bytes = [7u8, 0, 0, 0];
/// let mut reader = BinaryReader::new(&bytes[..]);
/// assert_eq!(reader.read::<u32>().unwrap(), 7);
/// assert!(reader.read::<u8>().is_err());
/// assert!(reader.is_eof());
/// ```
#[derive(Debug)]
pub struct BinaryReader<R> {
    inner: R,
    state: StreamState,
    max_container_len: usize,
    max_string_len: usize,
}

impl<R: Read> BinaryReader<R> {
    /// Create a reader over a byte source.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            state: StreamState::empty(),
            max_container_len: DEFAULT_MAX_CONTAINER_LEN,
            max_string_len: DEFAULT_MAX_STRING_LEN,
        }
    }

    /// Limit the element count accepted for sequences.
    pub fn with_max_container_len(mut self, max_container_len: usize) -> Self {
        self.max_container_len = max_container_len;
        self
    }

    /// The element count limit for sequences.
    pub fn max_container_len(&self) -> usize {
        self.max_container_len
    }

    /// Limit the byte length accepted for strings.
    pub fn with_max_string_len(mut self, max_string_len: usize) -> Self {
        self.max_string_len = max_string_len;
        self
    }

    /// The byte length limit for strings.
    pub fn max_string_len(&self) -> usize {
        self.max_string_len
    }

    /// Read one value of type `T`.
    pub fn read<T: Decode>(&mut self) -> StreamResult<T> {
        let result = T::decode(self);
        self.track(result)
    }

    /// Read one value into `out`. `out` is left untouched on failure.
    pub fn read_into<T: Decode>(&mut self, out: &mut T) -> StreamResult<()> {
        *out = self.read()?;
        Ok(())
    }

    /// Fill `buf` completely from the source.
    pub fn read_exact_bytes(&mut self, buf: &mut [u8]) -> StreamResult<()> {
        let result = self.inner.read_exact(buf).map_err(StreamError::from);
        self.track(result)
    }

    /// Read a `u64` element count and check it against the platform and the
    /// configured container limit.
    pub fn read_len(&mut self) -> StreamResult<usize> {
        let limit = self.max_container_len;
        self.read_bounded_len("count", limit)
    }

    /// Read a `u64` string byte length and check it against the configured
    /// string limit.
    pub fn read_string_len(&mut self) -> StreamResult<usize> {
        let limit = self.max_string_len;
        self.read_bounded_len("string length", limit)
    }

    fn read_bounded_len(&mut self, what: &str, limit: usize) -> StreamResult<usize> {
        let raw: u64 = self.read()?;
        let result = match usize::try_from(raw) {
            Ok(len) if len <= limit => Ok(len),
            Ok(len) => Err(StreamError::invalid(format!("{} {} exceeds limit {}", what, len, limit))),
            Err(_) => Err(StreamError::invalid(format!("{} {} does not fit in usize", what, raw))),
        };
        self.track(result)
    }

    /// Read exactly `len` raw bytes into a fresh buffer.
    pub fn read_byte_vec(&mut self, len: usize) -> StreamResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(len.min(PREALLOC_LIMIT));
        let result = match (&mut self.inner).take(len as u64).read_to_end(&mut buf) {
            Ok(read) if read < len => Err(StreamError::Eof),
            Ok(_) => Ok(buf),
            Err(err) => Err(StreamError::from(err)),
        };
        self.track(result)
    }

    fn track<T>(&mut self, result: StreamResult<T>) -> StreamResult<T> {
        if let Err(err) = &result {
            self.raise(err.state_bits());
        }
        result
    }

    /// Capacity hint for a container of `len` elements.
    pub(crate) fn prealloc_hint(len: usize) -> usize {
        len.min(PREALLOC_LIMIT)
    }

    /// Current soft-error bits.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// `true` when no soft-error bit is set.
    pub fn is_ok(&self) -> bool {
        self.state.is_empty()
    }

    /// `true` when a read could not complete fully.
    pub fn is_eof(&self) -> bool {
        self.state.contains(StreamState::EOF)
    }

    /// `true` when malformed data was encountered.
    pub fn is_invalid(&self) -> bool {
        self.state.contains(StreamState::INVALID)
    }

    /// Raise soft-error bits.
    pub fn raise(&mut self, bits: StreamState) {
        self.state |= bits;
    }

    /// Clear all soft-error bits.
    pub fn clear(&mut self) {
        self.state = StreamState::empty();
    }

    /// Borrow the underlying source.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Mutably borrow the underlying source.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Unwrap the underlying source.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

macro_rules! impl_decode_le {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Decode for $ty {
                fn decode<R: Read>(reader: &mut BinaryReader<R>) -> StreamResult<Self> {
                    let mut bytes = [0u8; std::mem::size_of::<$ty>()];
                    reader.read_exact_bytes(&mut bytes)?;
                    Ok(<$ty>::from_le_bytes(bytes))
                }
            }
        )*
    };
}

impl_decode_le!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

impl Decode for bool {
    fn decode<R: Read>(reader: &mut BinaryReader<R>) -> StreamResult<Self> {
        match reader.read::<u8>()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(StreamError::invalid(format!("{} is not a bool", other))),
        }
    }
}

impl Decode for String {
    fn decode<R: Read>(reader: &mut BinaryReader<R>) -> StreamResult<Self> {
        let len = reader.read_string_len()?;
        let bytes = reader.read_byte_vec(len)?;
        String::from_utf8(bytes).map_err(|e| StreamError::invalid(format!("string is not UTF-8: {}", e)))
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode<R: Read>(reader: &mut BinaryReader<R>) -> StreamResult<Self> {
        let len = reader.read_len()?;
        let mut items = Vec::with_capacity(BinaryReader::<R>::prealloc_hint(len));
        for _ in 0..len {
            items.push(reader.read::<T>()?);
        }
        Ok(items)
    }
}

impl<T: Decode, const N: usize> Decode for [T; N] {
    fn decode<R: Read>(reader: &mut BinaryReader<R>) -> StreamResult<Self> {
        let mut items = Vec::with_capacity(N);
        for _ in 0..N {
            items.push(reader.read::<T>()?);
        }
        items
            .try_into()
            .map_err(|_| StreamError::invalid("fixed array length mismatch"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bstream::StreamErrorKind;

    #[test]
    fn test_read_primitives_little_endian() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0x1122_3344u32.to_le_bytes());
        bytes.extend_from_slice(&(-5i16).to_le_bytes());
        bytes.extend_from_slice(&1.5f64.to_le_bytes());
        bytes.push(1);

        let mut reader = BinaryReader::new(&bytes[..]);
        assert_eq!(reader.read::<u32>().unwrap(), 0x1122_3344);
        assert_eq!(reader.read::<i16>().unwrap(), -5);
        assert_eq!(reader.read::<f64>().unwrap(), 1.5);
        assert!(reader.read::<bool>().unwrap());
        assert!(reader.is_ok());
    }

    #[test]
    fn test_short_read_sets_eof() {
        let bytes = [1u8, 2, 3];
        let mut reader = BinaryReader::new(&bytes[..]);
        let err = reader.read::<u64>().unwrap_err();
        assert_eq!(err.kind(), StreamErrorKind::Eof);
        assert!(reader.is_eof());
        assert!(!reader.is_invalid());
    }

    #[test]
    fn test_flags_are_sticky_until_cleared() {
        let bytes = [2u8, 0];
        let mut reader = BinaryReader::new(&bytes[..]);
        assert!(reader.read::<bool>().is_err());
        assert!(reader.is_invalid());
        // A later successful read does not reset the flag.
        assert_eq!(reader.read::<u8>().unwrap(), 0);
        assert!(!reader.is_ok());
        reader.clear();
        assert!(reader.is_ok());
    }

    #[test]
    fn test_string_length_prefix() {
        let mut bytes = 3u64.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"abc");
        let mut reader = BinaryReader::new(&bytes[..]);
        assert_eq!(reader.read::<String>().unwrap(), "abc");
    }

    #[test]
    fn test_huge_count_on_short_data_fails_cleanly() {
        let mut bytes = (u64::MAX / 2).to_le_bytes().to_vec();
        bytes.extend_from_slice(b"only a few bytes");
        let mut reader = BinaryReader::new(&bytes[..]);
        let err = reader.read::<String>().unwrap_err();
        assert!(matches!(err.kind(), StreamErrorKind::Eof | StreamErrorKind::Invalid));
        assert!(!reader.is_ok());
    }

    #[test]
    fn test_container_limit() {
        let mut bytes = 10u64.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 10]);
        let mut reader = BinaryReader::new(&bytes[..]).with_max_container_len(4);
        let err = reader.read::<Vec<u8>>().unwrap_err();
        assert_eq!(err.kind(), StreamErrorKind::Invalid);
        assert!(reader.is_invalid());
    }

    #[test]
    fn test_container_limit_does_not_cap_strings() {
        let mut bytes = 1u64.to_le_bytes().to_vec();
        bytes.extend_from_slice(&18u64.to_le_bytes());
        bytes.extend_from_slice(b"textures/grass.png");
        let mut reader = BinaryReader::new(&bytes[..]).with_max_container_len(4);
        assert_eq!(reader.read::<Vec<String>>().unwrap(), vec!["textures/grass.png".to_string()]);
        assert!(reader.is_ok());
    }

    #[test]
    fn test_string_limit() {
        let mut bytes = 5u64.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"hello");
        let mut reader = BinaryReader::new(&bytes[..]).with_max_string_len(4);
        assert_eq!(reader.read::<String>().unwrap_err().kind(), StreamErrorKind::Invalid);
        assert!(reader.is_invalid());
    }

    #[test]
    fn test_invalid_utf8_string() {
        let mut bytes = 2u64.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe]);
        let mut reader = BinaryReader::new(&bytes[..]);
        assert_eq!(reader.read::<String>().unwrap_err().kind(), StreamErrorKind::Invalid);
    }

    #[test]
    fn test_read_into_leaves_output_on_failure() {
        let bytes = [9u8];
        let mut reader = BinaryReader::new(&bytes[..]);
        let mut out = 42u32;
        assert!(reader.read_into(&mut out).is_err());
        assert_eq!(out, 42);
    }

    #[test]
    fn test_fixed_array() {
        let bytes = [0u8, 2, 0, 9];
        let mut reader = BinaryReader::new(&bytes[..]);
        assert_eq!(reader.read::<[u8; 3]>().unwrap(), [0, 2, 0]);
        assert_eq!(reader.read::<u8>().unwrap(), 9);
    }
}
