//! Typed sequential writer.

use std::io::Write;

use super::error::{StreamError, StreamResult, StreamState};

/// A value that can be encoded into a [`BinaryWriter`].
pub trait Encode {
    /// Encode this value, advancing the writer.
    fn encode<W: Write>(&self, writer: &mut BinaryWriter<W>) -> StreamResult<()>;
}

/// Sequential little-endian writer over any byte sink.
///
/// Mirrors [`BinaryReader`](super::BinaryReader): per-operation results plus
/// sticky [`StreamState`] bits. Writing into a fixed-size sink that fills up
/// raises `EOF`.
#[derive(Debug)]
pub struct BinaryWriter<W> {
    inner: W,
    state: StreamState,
    position: u64,
}

impl<W: Write> BinaryWriter<W> {
    /// Create a writer over a byte sink.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            state: StreamState::empty(),
            position: 0,
        }
    }

    /// Write one value.
    pub fn write<T: Encode + ?Sized>(&mut self, value: &T) -> StreamResult<()> {
        let result = value.encode(self);
        self.track(result)
    }

    /// Write raw bytes with no length prefix.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> StreamResult<()> {
        let result = self.inner.write_all(bytes).map_err(StreamError::from);
        if result.is_ok() {
            self.position += bytes.len() as u64;
        }
        self.track(result)
    }

    /// Write an element count as `u64`.
    pub fn write_len(&mut self, len: usize) -> StreamResult<()> {
        let result = u64::try_from(len)
            .map_err(|_| StreamError::invalid(format!("count {} does not fit in u64", len)));
        let len = self.track(result)?;
        self.write(&len)
    }

    /// Flush the underlying sink.
    pub fn flush(&mut self) -> StreamResult<()> {
        let result = self.inner.flush().map_err(StreamError::from);
        self.track(result)
    }

    fn track<T>(&mut self, result: StreamResult<T>) -> StreamResult<T> {
        if let Err(err) = &result {
            self.state |= err.state_bits();
        }
        result
    }

    /// Number of bytes successfully written so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Current soft-error bits.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// `true` when no soft-error bit is set.
    pub fn is_ok(&self) -> bool {
        self.state.is_empty()
    }

    /// `true` when a write could not complete fully.
    pub fn is_eof(&self) -> bool {
        self.state.contains(StreamState::EOF)
    }

    /// `true` when a value could not be represented.
    pub fn is_invalid(&self) -> bool {
        self.state.contains(StreamState::INVALID)
    }

    /// Clear all soft-error bits.
    pub fn clear(&mut self) {
        self.state = StreamState::empty();
    }

    /// Borrow the underlying sink.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Unwrap the underlying sink.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

macro_rules! impl_encode_le {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Encode for $ty {
                fn encode<W: Write>(&self, writer: &mut BinaryWriter<W>) -> StreamResult<()> {
                    writer.write_bytes(&self.to_le_bytes())
                }
            }
        )*
    };
}

impl_encode_le!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

impl Encode for bool {
    fn encode<W: Write>(&self, writer: &mut BinaryWriter<W>) -> StreamResult<()> {
        writer.write(&u8::from(*self))
    }
}

impl Encode for str {
    fn encode<W: Write>(&self, writer: &mut BinaryWriter<W>) -> StreamResult<()> {
        writer.write_len(self.len())?;
        writer.write_bytes(self.as_bytes())
    }
}

impl Encode for String {
    fn encode<W: Write>(&self, writer: &mut BinaryWriter<W>) -> StreamResult<()> {
        self.as_str().encode(writer)
    }
}

impl<T: Encode> Encode for [T] {
    fn encode<W: Write>(&self, writer: &mut BinaryWriter<W>) -> StreamResult<()> {
        writer.write_len(self.len())?;
        for item in self {
            writer.write(item)?;
        }
        Ok(())
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode<W: Write>(&self, writer: &mut BinaryWriter<W>) -> StreamResult<()> {
        self.as_slice().encode(writer)
    }
}

impl<T: Encode, const N: usize> Encode for [T; N] {
    fn encode<W: Write>(&self, writer: &mut BinaryWriter<W>) -> StreamResult<()> {
        // Fixed arrays carry no count.
        for item in self {
            writer.write(item)?;
        }
        Ok(())
    }
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode<W: Write>(&self, writer: &mut BinaryWriter<W>) -> StreamResult<()> {
        (**self).encode(writer)
    }
}
